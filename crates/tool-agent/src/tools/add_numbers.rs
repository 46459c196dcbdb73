use std::future::ready;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use tool_agent_core::tool::{Error as ToolError, Tool, ToolResult};

#[derive(Deserialize, JsonSchema)]
pub struct AddNumbersParameters {
    #[schemars(description = "The first addend.")]
    a: f64,
    #[schemars(description = "The second addend.")]
    b: f64,
}

/// A tool that adds two numbers.
pub struct AddNumbersTool {
    parameter_schema: Value,
}

impl AddNumbersTool {
    /// Creates a new add tool.
    #[inline]
    pub fn new() -> Self {
        AddNumbersTool {
            parameter_schema: schema_for!(AddNumbersParameters).to_value(),
        }
    }
}

impl Default for AddNumbersTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for AddNumbersTool {
    type Input = AddNumbersParameters;

    fn name(&self) -> &str {
        "add_numbers"
    }

    fn description(&self) -> &str {
        "Returns the sum of two numbers. Pass a negative `b` to subtract."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: AddNumbersParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let sum = input.a + input.b;
        let result = if sum.is_finite() {
            Ok(format!("{sum}"))
        } else {
            Err(ToolError::execution_error()
                .with_reason(format!("the sum of {} and {} overflows", input.a, input.b)))
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add() {
        let tool = AddNumbersTool::new();
        let result = tool
            .execute(AddNumbersParameters { a: 12.5, b: 7.3 })
            .await;
        assert_eq!(result, Ok("19.8".to_owned()));

        let result = tool
            .execute(AddNumbersParameters { a: 100.0, b: -37.5 })
            .await;
        assert_eq!(result, Ok("62.5".to_owned()));
    }

    #[tokio::test]
    async fn test_overflow() {
        let tool = AddNumbersTool::new();
        let err = tool
            .execute(AddNumbersParameters {
                a: f64::MAX,
                b: f64::MAX,
            })
            .await
            .unwrap_err();
        assert!(err.reason().contains("overflows"));
    }
}
