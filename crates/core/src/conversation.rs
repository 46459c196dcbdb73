//! Conversation-related types.

use tool_agent_model::{ModelMessage, ToolCallRequest, ToolCallResult};

/// Who produced a conversation item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The system instructions.
    System,
    /// The human user.
    User,
    /// The model.
    Assistant,
    /// A tool result.
    Tool,
}

/// Represents a conversation.
///
/// Items can only be appended, and a tool result is always preceded by
/// the assistant item that requested it.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    items: Vec<Item>,
}

impl Conversation {
    /// Returns all items, oldest first.
    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Returns the number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the conversation has no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the newest item.
    #[inline]
    pub fn last(&self) -> Option<&Item> {
        self.items.last()
    }

    /// Returns every tool call in request order, paired with its result if
    /// one was produced.
    pub fn tool_steps(&self) -> Vec<ToolStep<'_>> {
        let mut steps: Vec<ToolStep<'_>> = self
            .items
            .iter()
            .flat_map(|item| item.tool_calls())
            .map(|request| ToolStep {
                request,
                result: None,
            })
            .collect();
        for item in &self.items {
            let ModelMessage::Tool(result) = &item.msg else {
                continue;
            };
            if let Some(step) =
                steps.iter_mut().find(|step| step.request.id == result.id)
            {
                step.result = Some(&result.content);
            }
        }
        steps
    }

    pub(crate) fn messages(&self) -> Vec<ModelMessage> {
        self.items.iter().map(|item| item.msg.clone()).collect()
    }

    pub(crate) fn push(&mut self, msg: ModelMessage) {
        debug_assert!(
            match &msg {
                ModelMessage::Tool(result) => self.is_requested(&result.id),
                _ => true,
            },
            "tool result without a matching request"
        );
        self.items.push(Item { msg });
    }

    pub(crate) fn push_tool_result(&mut self, id: &str, content: String) {
        self.push(ModelMessage::Tool(ToolCallResult {
            id: id.to_owned(),
            content,
        }));
    }

    fn is_requested(&self, call_id: &str) -> bool {
        self.items
            .iter()
            .flat_map(|item| item.tool_calls())
            .any(|call| call.id == call_id)
    }
}

/// An item in the conversation.
#[derive(Clone, Debug)]
pub struct Item {
    msg: ModelMessage,
}

impl Item {
    /// Returns who produced this item.
    pub fn role(&self) -> Role {
        match &self.msg {
            ModelMessage::System(_) => Role::System,
            ModelMessage::User(_) => Role::User,
            ModelMessage::Assistant { .. } => Role::Assistant,
            ModelMessage::Tool(_) => Role::Tool,
        }
    }

    /// Returns the transcript of this item.
    ///
    /// The transcript is the text content of the message. Tool calls of an
    /// assistant item are not part of it, see [`Item::tool_calls`].
    #[inline]
    pub fn transcript(&self) -> &str {
        match &self.msg {
            ModelMessage::System(text) | ModelMessage::User(text) => text,
            ModelMessage::Assistant { content, .. } => content,
            ModelMessage::Tool(result) => &result.content,
        }
    }

    /// Returns the tool calls requested by this item.
    #[inline]
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match &self.msg {
            ModelMessage::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Returns the call id this item answers, for tool results.
    #[inline]
    pub fn tool_call_id(&self) -> Option<&str> {
        match &self.msg {
            ModelMessage::Tool(result) => Some(&result.id),
            _ => None,
        }
    }

    /// Returns the underlying message.
    #[inline]
    pub fn message(&self) -> &ModelMessage {
        &self.msg
    }
}

/// A tool call and its result, see [`Conversation::tool_steps`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolStep<'a> {
    /// The request issued by the model.
    pub request: &'a ToolCallRequest,
    /// The result content, `None` if the call never produced one.
    pub result: Option<&'a str>,
}
