use std::sync::Arc;

use futures_util::future::join_all;
use tokio::task::JoinError;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tool_agent_model::{ModelMessage, ModelRequest, ToolCallRequest};
use tracing::Instrument;

use super::{Agent, Completion, Failure, Stage, TranscriptSource};
use crate::config::ToolErrorPolicy;
use crate::error::AgentError;
use crate::hook::HookContext;
use crate::model_client::{ModelClientResponse, TranscriptFn};
use crate::state::AgentState;
use crate::tool::{Error as ToolError, ErrorKind as ToolErrorKind, ToolResult};

/// A stage together with what it carries over to the next one.
enum Step {
    AwaitingModel,
    AwaitingTools(Vec<ToolCallRequest>),
    Done(String),
    Failed(AgentError),
}

impl Step {
    fn stage(&self) -> Stage {
        match self {
            Step::AwaitingModel => Stage::AwaitingModel,
            Step::AwaitingTools(_) => Stage::AwaitingTools,
            Step::Done(_) => Stage::Done,
            Step::Failed(_) => Stage::Failed,
        }
    }
}

/// One invocation of an [`Agent`].
pub(super) struct Run<'a> {
    agent: &'a Agent,
    state: AgentState,
    cancel: CancellationToken,
    model_calls: u32,
}

impl<'a> Run<'a> {
    pub fn new(
        agent: &'a Agent,
        state: AgentState,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            agent,
            state,
            cancel,
            model_calls: 0,
        }
    }

    pub async fn drive(mut self) -> Result<Completion, Failure> {
        let mut step = Step::AwaitingModel;
        loop {
            self.agent.notify_stage(step.stage());
            step = match step {
                Step::AwaitingModel => self.call_model().await,
                Step::AwaitingTools(calls) => self.run_tools(calls).await,
                Step::Done(answer) => {
                    debug!("done after {} model call(s)", self.model_calls);
                    return Ok(Completion {
                        state: self.state,
                        answer,
                        model_calls: self.model_calls,
                    });
                }
                Step::Failed(error) => {
                    warn!("invocation failed: {error}");
                    return Err(Failure {
                        error,
                        state: self.state,
                        model_calls: self.model_calls,
                    });
                }
            };
        }
    }

    async fn call_model(&mut self) -> Step {
        if self.cancel.is_cancelled() {
            return Step::Failed(AgentError::Cancelled);
        }
        let max_iterations = self.agent.config.max_iterations;
        if self.model_calls >= max_iterations {
            return Step::Failed(AgentError::MaxIterationsExceeded(
                max_iterations,
            ));
        }
        self.model_calls += 1;
        let iteration = self.model_calls;

        self.agent
            .hooks
            .run(&mut self.state, &HookContext::before_model(iteration));

        let request = ModelRequest {
            messages: self.state.conversation().messages(),
            tools: self.agent.registry.definitions(),
        };
        let on_transcript = self.agent.on_transcript.clone().map(|f| {
            let f: TranscriptFn =
                Arc::new(move |delta: &str| f(delta, TranscriptSource::Assistant));
            f
        });
        let resp = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Step::Failed(AgentError::Cancelled);
            }
            resp = self.agent.model_client.send_request(request, on_transcript) => resp,
        };
        let ModelClientResponse {
            transcript,
            tool_calls,
            finish_reason,
            attempts,
        } = match resp {
            Ok(resp) => resp,
            Err(err) => return Step::Failed(err.into()),
        };
        debug!(
            "model call #{iteration} finished ({finish_reason:?}) after \
             {attempts} attempt(s) with {} tool call(s)",
            tool_calls.len()
        );

        let has_tool_calls = !tool_calls.is_empty();
        self.state.conversation_mut().push(ModelMessage::Assistant {
            content: transcript.clone(),
            tool_calls: tool_calls.clone(),
        });
        self.agent.hooks.run(
            &mut self.state,
            &HookContext::after_model(iteration, has_tool_calls),
        );

        if has_tool_calls {
            Step::AwaitingTools(tool_calls)
        } else {
            Step::Done(transcript)
        }
    }

    async fn run_tools(&mut self, calls: Vec<ToolCallRequest>) -> Step {
        if self.cancel.is_cancelled() {
            return Step::Failed(AgentError::Cancelled);
        }

        let span = debug_span!("tool dispatch", calls = calls.len());
        let tool_timeout = self.agent.config.tool_timeout;
        let mut tasks: Vec<_> = calls
            .iter()
            .map(|call| {
                trace!("spawning a tool ({}) with args: {:?}", call.id, call.arguments);
                let fut = self
                    .agent
                    .registry
                    .invoke(&call.name, call.arguments.clone());
                tokio::spawn(
                    async move {
                        let Some(duration) = tool_timeout else {
                            return fut.await;
                        };
                        match timeout(duration, fut).await {
                            Ok(result) => result,
                            Err(_) => Err(ToolError::timeout().with_reason(
                                format!("no result after {duration:?}"),
                            )),
                        }
                    }
                    .instrument(span.clone()),
                )
            })
            .collect();

        let results = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            results = join_all(tasks.iter_mut()) => Some(results),
        };
        let Some(results) = results else {
            for task in &tasks {
                task.abort();
            }
            return Step::Failed(AgentError::Cancelled);
        };

        let policy = self.agent.config.tool_error_policy;
        let mut failure = None;
        for (call, result) in calls.iter().zip(results) {
            let content = match flatten_join_result(result) {
                Ok(content) => content,
                Err(err) => match fatal_error(policy, call, &err) {
                    Some(error) => {
                        debug!("tool call {} failed: {err}", call.id);
                        failure.get_or_insert(error);
                        continue;
                    }
                    None => format!("Error: {err}"),
                },
            };
            if let Some(on_transcript) = &self.agent.on_transcript {
                on_transcript(&content, TranscriptSource::Tool);
            }
            self.state
                .conversation_mut()
                .push_tool_result(&call.id, content);
        }

        match failure {
            Some(error) => Step::Failed(error),
            None => Step::AwaitingModel,
        }
    }
}

fn flatten_join_result(result: Result<ToolResult, JoinError>) -> ToolResult {
    result.unwrap_or_else(|err| {
        Err(ToolError::execution_error()
            .with_reason(format!("tool task failed: {err}")))
    })
}

/// Returns the error that ends the invocation, if `err` is not to be
/// reported back to the model.
fn fatal_error(
    policy: ToolErrorPolicy,
    call: &ToolCallRequest,
    err: &ToolError,
) -> Option<AgentError> {
    if policy == ToolErrorPolicy::Surface {
        return None;
    }
    match err.kind() {
        ToolErrorKind::NotFound => Some(AgentError::ToolNotFound {
            call_id: call.id.clone(),
            name: call.name.clone(),
        }),
        ToolErrorKind::InvalidInput => Some(AgentError::ToolValidation {
            call_id: call.id.clone(),
            name: call.name.clone(),
            reason: err.reason().into_owned(),
        }),
        ToolErrorKind::ExecutionError | ToolErrorKind::Timeout => None,
    }
}
