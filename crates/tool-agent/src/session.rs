use tool_agent_core::tool::{RegisterError, Tool};
use tool_agent_core::{
    Agent, AgentBuilder, AgentConfig, CancellationToken, Completion, Failure,
    TranscriptSource,
};
use tool_agent_model::ModelProvider;

use crate::hooks::{log_after_model, log_before_model};
use crate::tools::*;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    with_add_numbers: bool,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let agent_builder = AgentBuilder::with_model_provider(provider);
        Self {
            agent_builder,
            with_add_numbers: false,
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Sets the loop configuration.
    #[inline]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.agent_builder = self.agent_builder.with_config(config);
        self
    }

    /// Offers [`AddNumbersTool`] next to the weather tool.
    #[inline]
    pub fn with_add_numbers(mut self) -> Self {
        self.with_add_numbers = true;
        self
    }

    /// Installs the hooks of [`crate::hooks`] around every model call.
    #[inline]
    pub fn with_logging_hooks(mut self) -> Self {
        self.agent_builder = self
            .agent_builder
            .before_model(log_before_model)
            .after_model(log_after_model);
        self
    }

    /// Attaches a callback to be invoked when a transcript is generated.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_transcript(on_transcript);
        self
    }

    /// Registers an extra tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Result<Self, RegisterError> {
        self.agent_builder = self.agent_builder.with_tool(tool)?;
        Ok(self)
    }

    /// Builds a new session.
    ///
    /// Fails if an extra tool took the name of a built-in one.
    pub fn build(self) -> Result<Session, RegisterError> {
        let mut agent_builder =
            self.agent_builder.with_tool(GetCurrentWeatherTool::new())?;
        if self.with_add_numbers {
            agent_builder = agent_builder.with_tool(AddNumbersTool::new())?;
        }
        let agent = agent_builder.build();
        debug!(
            "session ready with tools: {:?}",
            agent.registry().definitions().iter().map(|t| &t.name).collect::<Vec<_>>()
        );

        Ok(Session { agent })
    }
}

/// A session that answers questions with the built-in tools.
///
/// The session holds a fully configured agent, and it is basically a wrapper
/// around [`Agent`]. Every question is an independent invocation, nothing
/// is carried over from one answer to the next.
pub struct Session {
    agent: Agent,
}

impl Session {
    /// Asks a question and waits for the final answer.
    #[inline]
    pub async fn ask(&self, question: &str) -> Result<Completion, Failure> {
        self.agent.invoke(question).await
    }

    /// Asks a question, giving up when `cancel` is triggered.
    #[inline]
    pub async fn ask_with_cancellation(
        &self,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<Completion, Failure> {
        self.agent.invoke_with_cancellation(question, cancel).await
    }

    /// Returns the underlying agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}
