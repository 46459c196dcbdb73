use std::future::ready;

use serde_json::Value;
use tracing::Instrument;

use super::{BoxedToolFuture, Error, Tool, schema};

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    fn execute(&self, arguments: Value) -> BoxedToolFuture;
}

pub(crate) struct ToolObjectImpl<T: Tool>(pub T);

impl<T: Tool> ToolObject for ToolObjectImpl<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    fn execute(&self, arguments: Value) -> BoxedToolFuture {
        if let Err(reason) = schema::validate(self.0.parameter_schema(), &arguments)
        {
            return Box::pin(ready(Err(Error::invalid_input().with_reason(reason))));
        }
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(ready(Err(
                    Error::invalid_input().with_reason(reason)
                )));
            }
        };

        let name = self.0.name().to_owned();
        Box::pin(
            self.0
                .execute(input)
                .instrument(debug_span!("tool execute", tool = %name)),
        )
    }
}
