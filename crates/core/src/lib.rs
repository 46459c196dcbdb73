//! Core logic including agent loop, tool registry, hooks, configurations,
//! etc.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod config;
pub mod conversation;
mod error;
pub mod hook;
mod model_client;
mod state;
pub mod tool;

pub use agent::{Agent, AgentBuilder, Completion, Failure, Stage, TranscriptSource};
pub use config::{AgentConfig, RetryPolicy, ToolErrorPolicy};
pub use error::AgentError;
pub use hook::{Hook, HookContext, HookOutcome, HookPhase};
pub use state::{AgentState, StatePatch};
pub use tokio_util::sync::CancellationToken;
