//! An abstraction layer for chat-completion models that can call tools.
//!
//! This crate establishes an unified protocol for the agent loop to talk
//! to any supported model provider, so that the loop never needs to know
//! which service is on the other side of the wire.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
