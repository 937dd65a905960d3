//! The action schema: the contract between the execution loop and the LLM.
//!
//! Every iteration the LLM returns one [`Action`]: either a batch of tool
//! calls or a final answer, always with its reasoning.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ResponseParseError;
use crate::generator::GeneratedOutput;
use crate::step::ERROR_ACTION;
use crate::tool::ToolCall;

/// Name under which the action schema is sent to the generator.
pub const ACTION_SCHEMA_NAME: &str = "agent_action";

/// What the LLM decided to do this iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    CallTool,
    Finish,
    /// Any value outside the schema, kept verbatim for the audit trail.
    Other(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CallTool => "call_tool",
            Self::Finish => "finish",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for ActionKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "call_tool" => Self::CallTool,
            "finish" => Self::Finish,
            _ => Self::Other(raw),
        }
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The LLM's structured decision for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,

    pub action: ActionKind,

    #[serde(default, deserialize_with = "null_as_default")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Action {
    /// A `call_tool` action.
    pub fn call_tools(reasoning: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            reasoning: reasoning.into(),
            action: ActionKind::CallTool,
            tool_calls,
            final_answer: None,
        }
    }

    /// Placeholder for a response that could not be parsed.
    pub fn invalid() -> Self {
        Self {
            reasoning: String::new(),
            action: ActionKind::Other(ERROR_ACTION.to_string()),
            tool_calls: Vec::new(),
            final_answer: None,
        }
    }

    /// A `finish` action.
    pub fn finish(reasoning: impl Into<String>, final_answer: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            action: ActionKind::Finish,
            tool_calls: Vec::new(),
            final_answer: Some(final_answer.into()),
        }
    }

    /// Parse and validate a raw generator output.
    ///
    /// Unknown action names are accepted here; the loop records them as an
    /// error step. Missing tool calls or a missing final answer are schema
    /// violations.
    pub fn from_output(output: GeneratedOutput) -> Result<Self, ResponseParseError> {
        let action: Action = output.parse()?;
        action.validate()?;
        Ok(action)
    }

    fn validate(&self) -> Result<(), ResponseParseError> {
        match self.action {
            ActionKind::CallTool if self.tool_calls.is_empty() => {
                Err(ResponseParseError::MissingToolCalls)
            }
            ActionKind::Finish if self.final_answer.is_none() => {
                Err(ResponseParseError::MissingFinalAnswer)
            }
            _ => Ok(()),
        }
    }
}

/// JSON Schema for [`Action`], handed to the generator.
pub fn action_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "reasoning": {
                "type": "string",
                "description": "Your step-by-step thinking about what to do next"
            },
            "action": {
                "type": "string",
                "enum": ["call_tool", "finish"],
                "description": "'call_tool' to invoke tools, 'finish' to give the final answer"
            },
            "tool_calls": {
                "type": "array",
                "description": "Tools to call, executed in order (required for call_tool)",
                "items": {
                    "type": "object",
                    "properties": {
                        "tool_name": { "type": "string" },
                        "arguments": { "type": "object" }
                    },
                    "required": ["tool_name", "arguments"]
                }
            },
            "final_answer": {
                "type": "string",
                "description": "The final answer (required for finish)"
            }
        },
        "required": ["reasoning", "action"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_tool_action() {
        let out = GeneratedOutput::Structured(serde_json::json!({
            "reasoning": "need data",
            "action": "call_tool",
            "tool_calls": [{"tool_name": "search", "arguments": {"q": "rust"}}]
        }));
        let action = Action::from_output(out).unwrap();
        assert_eq!(action.action, ActionKind::CallTool);
        assert_eq!(action.tool_calls.len(), 1);
        assert_eq!(action.tool_calls[0].arguments["q"], "rust");
    }

    #[test]
    fn parses_finish_from_text() {
        let out = GeneratedOutput::Text(
            r#"{"reasoning":"done","action":"finish","final_answer":"42","tool_calls":null}"#.into(),
        );
        let action = Action::from_output(out).unwrap();
        assert_eq!(action.action, ActionKind::Finish);
        assert_eq!(action.final_answer.as_deref(), Some("42"));
        assert!(action.tool_calls.is_empty());
    }

    #[test]
    fn unknown_action_is_kept_verbatim() {
        let out = GeneratedOutput::Structured(serde_json::json!({
            "reasoning": "hmm",
            "action": "dance"
        }));
        let action = Action::from_output(out).unwrap();
        assert_eq!(action.action, ActionKind::Other("dance".into()));
        assert_eq!(action.action.as_str(), "dance");
    }

    #[test]
    fn invalid_action_is_labelled_error() {
        let action = Action::invalid();
        assert_eq!(action.action.as_str(), ERROR_ACTION);
        assert!(action.reasoning.is_empty());
        assert!(action.tool_calls.is_empty());
    }

    #[test]
    fn call_tool_without_calls_is_rejected() {
        let out = GeneratedOutput::Structured(serde_json::json!({
            "reasoning": "x",
            "action": "call_tool",
            "tool_calls": []
        }));
        assert_eq!(
            Action::from_output(out).unwrap_err(),
            ResponseParseError::MissingToolCalls
        );
    }

    #[test]
    fn finish_without_answer_is_rejected() {
        let out = GeneratedOutput::Structured(serde_json::json!({
            "reasoning": "x",
            "action": "finish"
        }));
        assert_eq!(
            Action::from_output(out).unwrap_err(),
            ResponseParseError::MissingFinalAnswer
        );
    }

    #[test]
    fn missing_action_field_is_schema_violation() {
        let out = GeneratedOutput::Structured(serde_json::json!({"reasoning": "x"}));
        assert!(matches!(
            Action::from_output(out).unwrap_err(),
            ResponseParseError::SchemaViolation(_)
        ));
    }

    #[test]
    fn action_kind_serializes_as_string() {
        let action = Action::finish("r", "a");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "finish");
    }

    #[test]
    fn schema_lists_both_actions() {
        let schema = action_schema();
        let values = schema["properties"]["action"]["enum"].as_array().unwrap();
        assert_eq!(values.len(), 2);
    }
}
