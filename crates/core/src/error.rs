//! Error types for the Proctor domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Only the variants of [`Error`] ever escape an agent invocation. Tool-level
//! failures ([`ToolError`]) and malformed LLM output ([`ResponseParseError`]) are
//! folded into the returned result instead.

use thiserror::Error;

/// The top-level error type for all Proctor operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- LLM generation errors ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Remote tool transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Fatal application errors reported by a remote tool ---
    #[error("Remote tool '{tool_name}' failed with status {status_code}: {message}")]
    RemoteApplication {
        tool_name: String,
        status_code: u16,
        message: String,
    },

    // --- Authentication failures (aggregated per iteration) ---
    #[error("Authentication failed for {}: {message}", .tool_names.join(", "))]
    Authentication {
        tool_names: Vec<String>,
        message: String,
    },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Merge several authentication failures into one error.
    ///
    /// Non-authentication errors in `errors` are ignored. Returns `None` when
    /// there is nothing to merge.
    pub fn merge_authentication(errors: Vec<Error>) -> Option<Error> {
        let mut tool_names = Vec::new();
        let mut messages: Vec<String> = Vec::new();
        for err in errors {
            if let Error::Authentication {
                tool_names: names,
                message,
            } = err
            {
                tool_names.extend(names);
                if !messages.contains(&message) {
                    messages.push(message);
                }
            }
        }
        if tool_names.is_empty() {
            return None;
        }
        Some(Error::Authentication {
            tool_names,
            message: messages.join("; "),
        })
    }

    /// Whether this is an authentication failure.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Malformed response from model: {0}")]
    MalformedResponse(String),
}

impl GenerationError {
    /// The model answered, but with nothing usable. The loop records this as
    /// an error step instead of failing the invocation.
    pub fn is_malformed_response(&self) -> bool {
        matches!(self, Self::EmptyResponse | Self::MalformedResponse(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Failed to connect to '{host}': {reason}")]
    Connect { host: String, reason: String },

    #[error("I/O failure talking to '{host}': {reason}")]
    Io { host: String, reason: String },

    #[error("Session with '{0}' is closed")]
    Closed(String),

    #[error("Protocol error from '{host}': {reason}")]
    Protocol { host: String, reason: String },
}

/// Raised by a local [`Tool`](crate::tool::Tool); the router turns it into a
/// failed result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// A structured LLM response that could not be parsed or violates its schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseParseError {
    #[error("Response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Response does not match the expected schema: {0}")]
    SchemaViolation(String),

    #[error("Action 'call_tool' requires at least one tool call")]
    MissingToolCalls,

    #[error("Action 'finish' requires a final_answer")]
    MissingFinalAnswer,
}
