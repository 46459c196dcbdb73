use serde_json::{Map, Value};
use tool_agent_model::ModelMessage;

use crate::conversation::Conversation;

/// The state shared by the agent loop and the hooks during one invocation.
///
/// It holds the conversation and a set of named fields. The loop is the
/// only writer of the conversation; hooks write the fields through a
/// [`StatePatch`].
#[derive(Clone, Debug, Default)]
pub struct AgentState {
    conversation: Conversation,
    values: Map<String, Value>,
}

impl AgentState {
    pub(crate) fn seeded(system_prompt: Option<&str>, input: String) -> Self {
        let mut conversation = Conversation::default();
        if let Some(system_prompt) = system_prompt {
            conversation.push(ModelMessage::System(system_prompt.to_owned()));
        }
        conversation.push(ModelMessage::User(input));
        Self {
            conversation,
            values: Map::new(),
        }
    }

    /// Returns the conversation so far.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns all fields set by hooks.
    #[inline]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Returns a field set by hooks.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[inline]
    pub(crate) fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    pub(crate) fn apply(&mut self, patch: StatePatch) {
        self.values.extend(patch.values);
    }
}

/// A partial update of the [`AgentState`] fields.
///
/// Keys in the patch overwrite the same keys in the state, other keys are
/// left untouched. An empty patch is valid and changes nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatePatch {
    values: Map<String, Value>,
}

impl StatePatch {
    /// Creates an empty patch.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field.
    #[inline]
    pub fn set<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the patch sets no field.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
