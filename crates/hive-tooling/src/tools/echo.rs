use crate::registry::{Tool, ToolError};
use async_trait::async_trait;
use serde_json::Value;

/// Returns its input unchanged. Useful for wiring up a graph before the
/// real tool catalogue exists, and as a fixture in node-kernel tests.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        Ok(arguments)
    }
}
