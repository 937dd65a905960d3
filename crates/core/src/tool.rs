//! Tool trait: the abstraction over in-process agent capabilities.
//!
//! A [`Tool`] is a *Local Tool*: stateless, described statically, executed
//! in-process. Remote tool servers live behind `proctor_tools::RemoteToolHost`
//! and advertise the same [`ToolDescriptor`] shape dynamically.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;

/// Default character limit applied to tool output before it is re-fed to the LLM.
pub const DEFAULT_MAX_RESULT_CHARS: usize = 4000;

/// A request to execute a tool, as produced by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    #[serde(alias = "name")]
    pub tool_name: String,

    /// Arguments as a JSON object. Malformed input deserializes to an empty map.
    #[serde(default, deserialize_with = "lenient_arguments")]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: arguments_from_value(arguments),
        }
    }
}

/// Coerce an arbitrary JSON value into an argument map.
///
/// Objects are taken as-is, strings holding a JSON object are parsed once,
/// everything else yields an empty map.
pub fn arguments_from_value(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        _ => Map::new(),
    }
}

fn lenient_arguments<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(arguments_from_value(value.unwrap_or(Value::Null)))
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The tool that produced this result
    pub tool_name: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// Compacted output text, suitable for a future prompt
    pub content: String,

    /// Error description when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// A successful result.
    pub fn success(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            content: content.into(),
            error: None,
        }
    }

    /// A failed result with no output.
    pub fn failure(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            content: String::new(),
            error: Some(error.into()),
        }
    }

    /// A failed result that still carries the tool's output.
    pub fn failure_with_content(
        tool_name: impl Into<String>,
        content: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            content: content.into(),
            error: Some(error.into()),
        }
    }

    /// The result reported when no tool source claims a name.
    pub fn not_found(tool_name: &str) -> Self {
        Self::failure(tool_name, format!("Tool '{tool_name}' not found"))
    }

    /// Return a copy whose content is compacted to `max_chars`.
    pub fn compacted(mut self, max_chars: usize) -> Self {
        self.content = compact_content(&self.content, max_chars);
        self
    }

    /// One-line observation text used in prompts and traces.
    pub fn observation(&self) -> String {
        match (&self.error, self.content.is_empty()) {
            (Some(err), true) => format!("Error: {err}"),
            (Some(err), false) => format!("Error: {err}\n{}", self.content),
            (None, _) => self.content.clone(),
        }
    }
}

/// Trim `text` and cut it to at most `max_chars` characters.
pub fn compact_content(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let total = trimmed.chars().count();
    if total <= max_chars {
        return trimmed.to_string();
    }
    let kept: String = trimmed.chars().take(max_chars).collect();
    format!("{kept}\n... [truncated {} chars]", total - max_chars)
}

/// A tool description advertised to the LLM.
///
/// Serialized with the MCP `inputSchema` key so remote discovery payloads
/// deserialize directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's parameters
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    /// Parameter names and their schema fragments, in schema order.
    pub fn parameters(&self) -> Vec<(&str, &Value)> {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.iter().map(|(k, v)| (k.as_str(), v)).collect())
            .unwrap_or_default()
    }

    /// Whether the schema marks `param` as required.
    pub fn is_required(&self, param: &str) -> bool {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .is_some_and(|req| req.iter().any(|r| r.as_str() == Some(param)))
    }
}

/// The core Tool trait.
///
/// Local tools are registered with the tool router and made available to the
/// agent loop. Returning `Err` marks the call as failed; the error text is
/// shown to the LLM so it can adapt.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "think", "send_message").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments, returning its text output.
    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError>;

    /// Convert this tool into a descriptor for the LLM.
    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
            arguments
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))
        }
    }

    #[test]
    fn tool_call_accepts_object_arguments() {
        let call: ToolCall =
            serde_json::from_str(r#"{"tool_name":"echo","arguments":{"text":"hi"}}"#).unwrap();
        assert_eq!(call.tool_name, "echo");
        assert_eq!(call.arguments["text"], "hi");
    }

    #[test]
    fn tool_call_parses_stringified_arguments_once() {
        let call: ToolCall =
            serde_json::from_str(r#"{"name":"echo","arguments":"{\"text\":\"hi\"}"}"#).unwrap();
        assert_eq!(call.tool_name, "echo");
        assert_eq!(call.arguments["text"], "hi");
    }

    #[test]
    fn malformed_arguments_become_empty_map() {
        for raw in [
            r#"{"tool_name":"echo","arguments":"{not json"}"#,
            r#"{"tool_name":"echo","arguments":[1,2]}"#,
            r#"{"tool_name":"echo","arguments":null}"#,
            r#"{"tool_name":"echo"}"#,
        ] {
            let call: ToolCall = serde_json::from_str(raw).unwrap();
            assert!(call.arguments.is_empty(), "expected empty map for {raw}");
        }
    }

    #[test]
    fn compaction_truncates_long_output() {
        let long = "x".repeat(50);
        let out = compact_content(&long, 10);
        assert!(out.starts_with("xxxxxxxxxx\n"));
        assert!(out.contains("truncated 40 chars"));
        assert_eq!(compact_content("  short  ", 10), "short");
    }

    #[test]
    fn not_found_result_names_tool() {
        let result = ToolResult::not_found("ghost");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool 'ghost' not found"));
        assert_eq!(result.observation(), "Error: Tool 'ghost' not found");
    }

    #[test]
    fn descriptor_uses_input_schema_key() {
        let desc = EchoTool.to_descriptor();
        let json = serde_json::to_value(&desc).unwrap();
        assert!(json.get("inputSchema").is_some());
        assert_eq!(desc.parameters().len(), 1);
        assert!(desc.is_required("text"));
        assert!(!desc.is_required("other"));
    }

    #[test]
    fn descriptor_without_schema_gets_empty_object() {
        let desc: ToolDescriptor = serde_json::from_str(r#"{"name":"bare"}"#).unwrap();
        assert!(desc.parameters().is_empty());
        assert_eq!(desc.description, "");
    }

    #[tokio::test]
    async fn echo_tool_executes() {
        let mut args = Map::new();
        args.insert("text".into(), Value::String("hello world".into()));
        assert_eq!(EchoTool.execute(args).await.unwrap(), "hello world");

        let err = EchoTool.execute(Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
