//! Agent lifecycle hooks for progress reporting.
//!
//! Notifications arrive in loop order:
//! `on_agent_start` → (`on_iteration_start` → `on_llm_start` → `on_llm_end` →
//! (`on_tool_start` → `on_tool_end`)* → `on_iteration_end`)* → `on_agent_end`.
//!
//! When an error escapes the run, `on_agent_error` replaces `on_agent_end`
//! and the interrupted iteration gets no further notifications.
//!
//! A failing hook is logged and ignored; it never aborts the run.
//!
//! # Built-in Implementations
//!
//! - [`NoopHooks`] - Ignore everything (default)
//! - [`LoggingHooks`] - Debug logging for all events
//! - [`ChannelHooks`] - Forward [`AgentStreamEvent`]s over an mpsc channel

use async_trait::async_trait;
use proctor_core::action::{Action, ActionKind};
use proctor_core::error::Error;
use proctor_core::step::RunStatus;
use proctor_core::tool::ToolResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::warn;

use crate::stream_event::AgentStreamEvent;

pub type HookResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Terminal summary handed to `on_agent_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub success: bool,
    pub iterations: usize,
    pub tool_executions: usize,
    pub stop_reason: Option<String>,
    pub final_answer: Option<String>,
}

/// Lifecycle hooks for the execution loop.
/// Implement this trait to observe runs; every method defaults to a no-op.
#[async_trait]
pub trait AgentHooks: Send + Sync {
    async fn on_agent_start(&self, _query: &str) -> HookResult {
        Ok(())
    }

    async fn on_iteration_start(&self, _iteration: usize) -> HookResult {
        Ok(())
    }

    async fn on_llm_start(&self, _iteration: usize) -> HookResult {
        Ok(())
    }

    /// Called with the parsed action. A malformed response is reported as
    /// [`Action::invalid`].
    async fn on_llm_end(&self, _iteration: usize, _action: &Action) -> HookResult {
        Ok(())
    }

    async fn on_tool_start(&self, _tool_name: &str, _arguments: &Map<String, Value>) -> HookResult {
        Ok(())
    }

    async fn on_tool_end(&self, _tool_name: &str, _result: &ToolResult) -> HookResult {
        Ok(())
    }

    async fn on_iteration_end(&self, _iteration: usize, _action: &ActionKind) -> HookResult {
        Ok(())
    }

    async fn on_agent_end(&self, _summary: &RunSummary) -> HookResult {
        Ok(())
    }

    async fn on_agent_error(&self, _error: &Error) -> HookResult {
        Ok(())
    }
}

/// Log a hook failure and carry on.
pub(crate) fn tolerate(hook: &'static str, result: HookResult) {
    if let Err(e) = result {
        warn!(hook, error = %e, "Agent hook failed, continuing");
    }
}

/// Hooks that do nothing.
pub struct NoopHooks;

#[async_trait]
impl AgentHooks for NoopHooks {}

/// Hooks that log all events (useful for debugging).
pub struct LoggingHooks;

#[async_trait]
impl AgentHooks for LoggingHooks {
    async fn on_agent_start(&self, query: &str) -> HookResult {
        tracing::debug!(query, "Agent start");
        Ok(())
    }

    async fn on_iteration_start(&self, iteration: usize) -> HookResult {
        tracing::debug!(iteration, "Iteration start");
        Ok(())
    }

    async fn on_llm_end(&self, iteration: usize, action: &Action) -> HookResult {
        tracing::debug!(
            iteration,
            action = %action.action,
            tool_calls = action.tool_calls.len(),
            reasoning = %action.reasoning,
            "LLM decided"
        );
        Ok(())
    }

    async fn on_tool_start(&self, tool_name: &str, arguments: &Map<String, Value>) -> HookResult {
        tracing::debug!(tool = tool_name, ?arguments, "Tool start");
        Ok(())
    }

    async fn on_tool_end(&self, tool_name: &str, result: &ToolResult) -> HookResult {
        tracing::debug!(tool = tool_name, success = result.success, "Tool end");
        Ok(())
    }

    async fn on_agent_end(&self, summary: &RunSummary) -> HookResult {
        tracing::debug!(
            status = %summary.status,
            iterations = summary.iterations,
            tool_executions = summary.tool_executions,
            "Agent end"
        );
        Ok(())
    }

    async fn on_agent_error(&self, error: &Error) -> HookResult {
        tracing::debug!(%error, "Agent error");
        Ok(())
    }
}

/// Hooks that forward progress as [`AgentStreamEvent`]s.
///
/// Never blocks the loop: a full or closed channel is reported as a hook
/// failure and the event is dropped.
pub struct ChannelHooks {
    tx: mpsc::Sender<AgentStreamEvent>,
}

impl ChannelHooks {
    pub fn new(tx: mpsc::Sender<AgentStreamEvent>) -> Self {
        Self { tx }
    }

    /// A hooks instance plus the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AgentStreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    fn send(&self, event: AgentStreamEvent) -> HookResult {
        self.tx.try_send(event).map_err(|e| e.to_string().into())
    }
}

#[async_trait]
impl AgentHooks for ChannelHooks {
    async fn on_agent_start(&self, query: &str) -> HookResult {
        self.send(AgentStreamEvent::AgentStart {
            query: query.to_string(),
        })
    }

    async fn on_iteration_start(&self, iteration: usize) -> HookResult {
        self.send(AgentStreamEvent::IterationStart { iteration })
    }

    async fn on_llm_end(&self, iteration: usize, action: &Action) -> HookResult {
        if action.reasoning.is_empty() {
            return Ok(());
        }
        self.send(AgentStreamEvent::Thought {
            iteration,
            content: action.reasoning.clone(),
        })
    }

    async fn on_tool_start(&self, tool_name: &str, arguments: &Map<String, Value>) -> HookResult {
        self.send(AgentStreamEvent::ToolCall {
            name: tool_name.to_string(),
            input: Value::Object(arguments.clone()),
        })
    }

    async fn on_tool_end(&self, tool_name: &str, result: &ToolResult) -> HookResult {
        self.send(AgentStreamEvent::ToolResult {
            name: tool_name.to_string(),
            output: result.observation(),
            success: result.success,
        })
    }

    async fn on_iteration_end(&self, iteration: usize, action: &ActionKind) -> HookResult {
        self.send(AgentStreamEvent::IterationEnd {
            iteration,
            action: action.to_string(),
        })
    }

    async fn on_agent_end(&self, summary: &RunSummary) -> HookResult {
        self.send(AgentStreamEvent::Done {
            status: summary.status,
            iterations: summary.iterations,
            tool_calls_made: summary.tool_executions,
            success: summary.success,
        })
    }

    async fn on_agent_error(&self, error: &Error) -> HookResult {
        self.send(AgentStreamEvent::Error {
            message: error.to_string(),
        })
    }
}
