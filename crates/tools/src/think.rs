//! Think tool: a scratchpad the model can write to without side effects.

use async_trait::async_trait;
use proctor_core::error::ToolError;
use proctor_core::tool::Tool;
use serde_json::{Map, Value};

pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Write down a plan or intermediate conclusion. Has no effect on the outside world; \
         use it to organize your reasoning before acting."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "The note to record"
                }
            },
            "required": ["thought"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let thought = arguments
            .get("thought")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'thought' argument".into()))?;
        Ok(format!("Noted: {}", thought.trim()))
    }
}
