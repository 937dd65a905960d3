//! Agent-level progress events.
//!
//! `AgentStreamEvent` is what [`ChannelHooks`](crate::hooks::ChannelHooks)
//! forwards to live progress UIs, e.g. over SSE or WebSocket.

use proctor_core::RunStatus;
use serde::{Deserialize, Serialize};

/// Events emitted by the agent while a run is in progress.
///
/// - `agent_start`: a run began
/// - `iteration_start`: a loop iteration began
/// - `thought`: the LLM's reasoning for the iteration
/// - `tool_call`: the agent is invoking a tool
/// - `tool_result`: tool execution completed
/// - `iteration_end`: the iteration's step was recorded
/// - `done`: the run reached a terminal state
/// - `error`: an error escaped the run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    AgentStart { query: String },

    IterationStart { iteration: usize },

    /// Reasoning behind the iteration's action.
    Thought { iteration: usize, content: String },

    ToolCall {
        name: String,
        input: serde_json::Value,
    },

    ToolResult {
        name: String,
        output: String,
        success: bool,
    },

    IterationEnd { iteration: usize, action: String },

    Done {
        status: RunStatus,
        iterations: usize,
        tool_calls_made: usize,
        success: bool,
    },

    Error { message: String },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AgentStart { .. } => "agent_start",
            Self::IterationStart { .. } => "iteration_start",
            Self::Thought { .. } => "thought",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::IterationEnd { .. } => "iteration_end",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
