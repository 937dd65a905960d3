//! Send-message tool: talks to the system under test over HTTP.
//!
//! POSTs `{"message": ..., "session_id": ...}` to the configured target and
//! returns the status line and response body. Non-2xx responses fail the call
//! so the agent sees them as errors.

use async_trait::async_trait;
use proctor_config::TargetConfig;
use proctor_core::error::ToolError;
use proctor_core::tool::Tool;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

const TOOL_NAME: &str = "send_message";

pub struct SendMessageTool {
    url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl SendMessageTool {
    pub fn new(target: &TargetConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(target.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            url: target.url.clone(),
            headers: target.headers.clone(),
            client,
        }
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Send a message to the system under test and return its reply. \
         Pass the same session_id to continue a conversation."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to send"
                },
                "session_id": {
                    "type": "string",
                    "description": "Optional conversation id to continue"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'message' argument".into()))?;

        let mut body = serde_json::json!({ "message": message });
        if let Some(session_id) = arguments.get("session_id").and_then(Value::as_str) {
            body["session_id"] = Value::String(session_id.to_string());
        }

        let mut request = self.client.post(&self.url).json(&body);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let start = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Self::failed(format!("request to {} timed out", self.url))
            } else {
                Self::failed(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Self::failed(format!("failed to read response body: {e}")))?;
        debug!(url = %self.url, status = status.as_u16(), elapsed_ms = start.elapsed().as_millis() as u64, "Target replied");

        if !status.is_success() {
            return Err(Self::failed(format!("HTTP {}: {}", status.as_u16(), text.trim())));
        }

        Ok(format!("HTTP {}\n{}", status.as_u16(), text))
    }
}
