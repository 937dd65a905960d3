//! Generator trait: the abstraction over structured LLM calls.
//!
//! A Generator receives a rendered prompt, a system prompt and a JSON Schema,
//! and returns data that should match the schema. The agent loop never sees
//! which backend answered.
//!
//! Implementations: OpenAI-compatible endpoints (see `proctor-providers`),
//! scripted doubles in tests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GenerationError, ResponseParseError};

/// One structured generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The user-turn prompt (tool listing, history, task)
    pub prompt: String,

    /// System instructions
    pub system_prompt: String,

    /// JSON Schema the response must satisfy
    pub schema: Value,

    /// A short identifier for the schema (sent as the structured-output name)
    pub schema_name: String,
}

/// The raw value returned by a generator.
///
/// Backends with native structured output hand back a JSON value; others
/// return text that still needs one parse step.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedOutput {
    Structured(Value),
    Text(String),
}

impl GeneratedOutput {
    /// Resolve the output into a JSON value, parsing text once if needed.
    pub fn into_value(self) -> Result<Value, ResponseParseError> {
        match self {
            Self::Structured(value) => Ok(value),
            Self::Text(text) => serde_json::from_str(strip_code_fence(&text))
                .map_err(|e| ResponseParseError::InvalidJson(e.to_string())),
        }
    }

    /// Resolve and deserialize the output into `T`.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, ResponseParseError> {
        let value = self.into_value()?;
        serde_json::from_value(value).map_err(|e| ResponseParseError::SchemaViolation(e.to_string()))
    }
}

impl From<Value> for GeneratedOutput {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

impl From<String> for GeneratedOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// The core Generator trait.
///
/// Every LLM backend implements this trait. The agent loop and the goal
/// evaluator call `generate()` without knowing which backend is used.
#[async_trait]
pub trait Generator: Send + Sync {
    /// A human-readable name for this generator (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Produce a response matching `request.schema`.
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedOutput, GenerationError>;
}
