//! Ready-made pieces for running a tool-calling agent against an
//! OpenAI-compatible endpoint: demo tools, logging hooks, trace printing and
//! settings read from the environment.
//!
//! The crate ships two programs, `simple-agent` and `hooked-agent`, and can
//! also be used as a library.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod hooks;
mod session;
mod settings;
pub mod tools;
pub mod trace;

pub use session::{Session, SessionBuilder};
pub use settings::{Settings, SettingsError};

/// Re-exports of [`tool_agent_core`] crate.
pub mod core {
    pub use tool_agent_core::*;
}
