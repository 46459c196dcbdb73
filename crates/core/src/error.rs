use thiserror::Error;
use tool_agent_model::ErrorKind as ModelErrorKind;

use crate::model_client::ModelClientError;

/// Why an invocation ended in the failed stage.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AgentError {
    /// The model could not be reached, and retries were exhausted.
    #[error("model request failed after {attempts} attempt(s): {message}")]
    Transport {
        /// Attempts made, including the first one.
        attempts: u32,
        /// The last failure.
        message: String,
    },
    /// The model provider rejected the credential.
    #[error("model provider rejected the credential: {0}")]
    Auth(String),
    /// The model provider failed for a reason retrying won't fix.
    #[error("model request failed ({kind}): {message}")]
    Model {
        /// Classification reported by the provider.
        kind: ModelErrorKind,
        /// The provider message.
        message: String,
    },
    /// The model called a tool that is not registered.
    #[error("tool `{name}` requested by call `{call_id}` is not registered")]
    ToolNotFound {
        /// Id of the offending call.
        call_id: String,
        /// The requested tool name.
        name: String,
    },
    /// The model called a tool with arguments that don't match its schema.
    #[error("invalid arguments for tool `{name}` in call `{call_id}`: {reason}")]
    ToolValidation {
        /// Id of the offending call.
        call_id: String,
        /// The requested tool name.
        name: String,
        /// What is wrong with the arguments.
        reason: String,
    },
    /// The model kept requesting tools.
    #[error("no final answer after {0} model calls")]
    MaxIterationsExceeded(u32),
    /// The caller cancelled the invocation.
    #[error("invocation cancelled")]
    Cancelled,
}

impl AgentError {
    /// Returns a short, stable label of the error class.
    pub fn classification(&self) -> &'static str {
        match self {
            AgentError::Transport { .. } => "TransportError",
            AgentError::Auth(_) => "AuthError",
            AgentError::Model { .. } => "ModelError",
            AgentError::ToolNotFound { .. } => "ToolNotFound",
            AgentError::ToolValidation { .. } => "ToolValidationError",
            AgentError::MaxIterationsExceeded(_) => "MaxIterationsExceeded",
            AgentError::Cancelled => "Cancelled",
        }
    }
}

impl From<ModelClientError> for AgentError {
    fn from(err: ModelClientError) -> Self {
        let kind = err.kind();
        let attempts = err.attempts();
        let message = err.into_message();
        match kind {
            ModelErrorKind::Auth => AgentError::Auth(message),
            kind if kind.is_retryable() => {
                AgentError::Transport { attempts, message }
            }
            kind => AgentError::Model { kind, message },
        }
    }
}
