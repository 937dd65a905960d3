//! OpenAI-compatible structured-output generator.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/chat/completions` with `response_format: json_schema`.
//!
//! The model's message content is returned as [`GeneratedOutput::Text`]; the
//! caller parses it once against the schema it asked for.

use async_trait::async_trait;
use proctor_config::LlmConfig;
use proctor_core::error::GenerationError;
use proctor_core::generator::{GeneratedOutput, GenerationRequest, Generator};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// A structured-output generator backed by an OpenAI-compatible API.
pub struct OpenAiCompatGenerator {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatGenerator {
    /// Create a new generator for `model` at `base_url`.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            temperature: 0.2,
            max_tokens: 2048,
            client: build_client(Duration::from_secs(120)),
        }
    }

    /// Build a generator from the `[llm]` config section.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut generator = Self::new(
            "openai-compat",
            config.api_url.clone(),
            config.api_key.clone(),
            config.model.clone(),
        )
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);
        generator.client = build_client(Duration::from_secs(config.timeout_secs));
        generator
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the chat-completions request body.
    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let messages = vec![
            ApiMessage {
                role: "system".into(),
                content: Some(request.system_prompt.clone()),
            },
            ApiMessage {
                role: "user".into(),
                content: Some(request.prompt.clone()),
            },
        ];

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                },
            },
        })
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

#[async_trait]
impl Generator for OpenAiCompatGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GeneratedOutput, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(
            generator = %self.name,
            model = %self.model,
            schema = %request.schema_name,
            "Sending structured generation request"
        );

        let mut http = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            http = http.header("Authorization", format!("Bearer {key}"));
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(e.to_string())
            } else {
                GenerationError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(GenerationError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(GenerationError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Generator returned error");
            return Err(GenerationError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            GenerationError::MalformedResponse(format!("Failed to parse response: {e}"))
        })?;

        extract_content(api_response).map(GeneratedOutput::Text)
    }
}

/// Pull the first choice's message content out of a completion response.
fn extract_content(response: ApiResponse) -> Result<String, GenerationError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(GenerationError::EmptyResponse)?;

    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(GenerationError::EmptyResponse),
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}
