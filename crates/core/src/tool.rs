//! Tool call supports.

mod error;
mod object;
mod registry;
mod schema;

use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::{Error, ErrorKind};
pub use registry::{RegisterError, Registry, ToolHandle};

/// The result of a tool call.
pub type ToolResult = Result<String, Error>;

/// A type-erased tool execution, see [`Registry::invoke`].
pub type BoxedToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// A tool that can be called by the model.
///
/// Arguments sent by the model are checked against
/// [`parameter_schema`](Tool::parameter_schema) and then deserialized into
/// [`Input`](Tool::Input) before [`execute`](Tool::execute) is called, so the
/// tool only ever sees well-formed input.
///
/// Tools should be free of hidden state. Configuration the tool needs (an
/// API endpoint, a data table) belongs in immutable fields set when the tool
/// is constructed, and is copied into the future returned by `execute`.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the JSON schema of the tool parameters.
    ///
    /// `Value::Null` disables schema validation.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}
