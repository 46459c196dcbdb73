mod builder;
mod run;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::hook::Hooks;
use crate::model_client::ModelClient;
use crate::state::AgentState;
use crate::tool::Registry;
pub use builder::AgentBuilder;
use run::Run;

pub(crate) type OnTranscriptFn = Arc<dyn Fn(&str, TranscriptSource) + Send + Sync>;
pub(crate) type OnStageFn = Box<dyn Fn(Stage) + Send + Sync>;

/// The source of a transcript reported by [`AgentBuilder::on_transcript`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranscriptSource {
    /// The input of the invocation.
    User,
    /// A streamed delta of a model response.
    Assistant,
    /// The content of a tool result.
    Tool,
}

/// The stages an invocation goes through.
///
/// An invocation starts in `AwaitingModel` and alternates with
/// `AwaitingTools` until it ends in `Done` or `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Running hooks and waiting for the model.
    AwaitingModel,
    /// Waiting for the requested tool calls.
    AwaitingTools,
    /// The model produced a final answer.
    Done,
    /// The invocation failed.
    Failed,
}

impl Stage {
    /// Returns `true` for `Done` and `Failed`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

/// An agent that answers one user input at a time by calling the model and
/// the registered tools until the model gives a final answer.
///
/// The agent holds no per-invocation state. Every call to
/// [`invoke`](Agent::invoke) owns its own [`AgentState`], so one agent can
/// serve concurrent invocations.
pub struct Agent {
    model_client: ModelClient,
    registry: Registry,
    hooks: Hooks,
    system_prompt: Option<String>,
    config: AgentConfig,
    on_transcript: Option<OnTranscriptFn>,
    on_stage: Option<OnStageFn>,
}

impl Agent {
    /// Runs the loop for one user input.
    #[inline]
    pub async fn invoke<S: Into<String>>(
        &self,
        input: S,
    ) -> Result<Completion, Failure> {
        self.invoke_with_cancellation(input, CancellationToken::new())
            .await
    }

    /// Runs the loop for one user input, until it finishes or `cancel` is
    /// triggered.
    ///
    /// Cancellation is checked between stages. An in-flight model call is
    /// dropped and running tool tasks are aborted.
    pub async fn invoke_with_cancellation<S: Into<String>>(
        &self,
        input: S,
        cancel: CancellationToken,
    ) -> Result<Completion, Failure> {
        let input = input.into();
        if let Some(on_transcript) = &self.on_transcript {
            on_transcript(&input, TranscriptSource::User);
        }
        let state = AgentState::seeded(self.system_prompt.as_deref(), input);
        Run::new(self, state, cancel)
            .drive()
            .instrument(debug_span!("agent invoke"))
            .await
    }

    /// Returns the tools of this agent.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the loop configuration.
    #[inline]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn notify_stage(&self, stage: Stage) {
        debug!("entering stage {stage:?}");
        if let Some(on_stage) = &self.on_stage {
            on_stage(stage);
        }
    }
}

/// A successful invocation.
#[derive(Clone, Debug)]
pub struct Completion {
    /// The final state. Its last conversation item is the answer.
    pub state: AgentState,
    /// The final answer of the model.
    pub answer: String,
    /// How many model calls were made, not counting retries.
    pub model_calls: u32,
}

/// A failed invocation, with everything that happened before the failure.
#[derive(Clone, Debug, Error)]
#[error("{error}")]
pub struct Failure {
    /// Why the invocation failed.
    pub error: AgentError,
    /// The state at the time of the failure.
    pub state: AgentState,
    /// How many model calls were made, not counting retries.
    pub model_calls: u32,
}
