use std::collections::HashMap;
use std::fmt;
use std::future::ready;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tool_agent_model::ModelTool;

use super::object::{ToolObject, ToolObjectImpl};
use super::{BoxedToolFuture, Error, Tool};

/// Error returned by [`Registry::register`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// A tool with the same name is already registered.
    #[error("tool `{0}` is already registered")]
    Duplicate(String),
}

/// A set of tools the model can call, keyed by name.
///
/// Tools are immutable once registered, and the registry is shared between
/// concurrent invocations of an agent.
#[derive(Default)]
pub struct Registry {
    tools: Vec<Arc<dyn ToolObject>>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    /// Registers a tool under its name.
    pub fn register<T: Tool>(&mut self, tool: T) -> Result<(), RegisterError> {
        let name = tool.name().to_owned();
        if self.by_name.contains_key(&name) {
            return Err(RegisterError::Duplicate(name));
        }
        debug!("registered tool: {name}");
        self.by_name.insert(name, self.tools.len());
        self.tools.push(Arc::new(ToolObjectImpl(tool)));
        Ok(())
    }

    /// Looks up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<ToolHandle, Error> {
        self.by_name
            .get(name)
            .map(|&idx| ToolHandle(Arc::clone(&self.tools[idx])))
            .ok_or_else(|| {
                Error::not_found().with_reason(format!("no tool named `{name}`"))
            })
    }

    /// Resolves a tool and invokes it with the given JSON arguments.
    ///
    /// The returned future does not borrow the registry.
    pub fn invoke(&self, name: &str, arguments: Value) -> BoxedToolFuture {
        match self.resolve(name) {
            Ok(handle) => handle.invoke(arguments),
            Err(err) => Box::pin(ready(Err(err))),
        }
    }

    /// Returns the descriptors of all tools, in registration order.
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools.iter().map(|tool| definition_of(&**tool)).collect()
    }

    /// Returns the number of registered tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|tool| tool.name()))
            .finish()
    }
}

/// A resolved tool.
#[derive(Clone)]
pub struct ToolHandle(Arc<dyn ToolObject>);

impl ToolHandle {
    /// Returns the name of the tool.
    #[inline]
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Returns the descriptor of the tool.
    #[inline]
    pub fn definition(&self) -> ModelTool {
        definition_of(&*self.0)
    }

    /// Returns `true` if both handles refer to the same registered tool.
    #[inline]
    pub fn same_as(&self, other: &ToolHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Validates the arguments and executes the tool.
    #[inline]
    pub fn invoke(&self, arguments: Value) -> BoxedToolFuture {
        self.0.execute(arguments)
    }
}

impl fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ToolHandle").field(&self.name()).finish()
    }
}

fn definition_of(tool: &dyn ToolObject) -> ModelTool {
    ModelTool {
        name: tool.name().to_owned(),
        description: tool.description().to_owned(),
        parameters: tool.parameter_schema().clone(),
    }
}
