use std::sync::Arc;

use tool_agent_model::ModelProvider;

use super::{Agent, Stage, TranscriptSource};
use crate::config::AgentConfig;
use crate::hook::{Hook, HookContext, HookOutcome, HookPhase, Hooks};
use crate::model_client::ModelClient;
use crate::state::AgentState;
use crate::tool::{RegisterError, Registry, Tool};

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    registry: Registry,
    hooks: Hooks,
    system_prompt: Option<String>,
    config: AgentConfig,
    on_transcript: Option<super::OnTranscriptFn>,
    on_stage: Option<super::OnStageFn>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            registry: Registry::default(),
            hooks: Hooks::default(),
            system_prompt: None,
            config: AgentConfig::default(),
            on_transcript: None,
            on_stage: None,
        }
    }

    /// Sets the system prompt placed before the user input.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Replaces the loop configuration.
    #[inline]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a tool.
    ///
    /// Fails if a tool with the same name is already registered.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Result<Self, RegisterError> {
        self.registry.register(tool)?;
        Ok(self)
    }

    /// Replaces the tools with a prepared registry.
    #[inline]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Adds a hook that runs before every model call.
    #[inline]
    pub fn before_model<F>(self, hook: F) -> Self
    where
        F: Fn(&AgentState, &HookContext) -> HookOutcome + Send + Sync + 'static,
    {
        self.with_hook(HookPhase::BeforeModel, hook)
    }

    /// Adds a hook that runs after every model call.
    #[inline]
    pub fn after_model<F>(self, hook: F) -> Self
    where
        F: Fn(&AgentState, &HookContext) -> HookOutcome + Send + Sync + 'static,
    {
        self.with_hook(HookPhase::AfterModel, hook)
    }

    /// Adds a hook for the given phase. Hooks of a phase run in the order
    /// they are added.
    #[inline]
    pub fn with_hook<H: Hook>(mut self, phase: HookPhase, hook: H) -> Self {
        self.hooks.add(phase, Box::new(hook));
        self
    }

    /// Attaches a callback to be invoked when a new transcript is available,
    /// including every streamed delta of the model responses.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Arc::new(on_transcript));
        self
    }

    /// Attaches a callback to be invoked when an invocation enters a stage.
    #[inline]
    pub fn on_stage(
        mut self,
        on_stage: impl Fn(Stage) + Send + Sync + 'static,
    ) -> Self {
        self.on_stage = Some(Box::new(on_stage));
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let Self {
            model_client,
            registry,
            hooks,
            system_prompt,
            config,
            on_transcript,
            on_stage,
        } = self;
        let model_client = model_client
            .with_retry(config.retry.clone())
            .with_timeout(config.model_timeout);
        Agent {
            model_client,
            registry,
            hooks,
            system_prompt,
            config,
            on_transcript,
            on_stage,
        }
    }
}
