//! Execution steps and run outcomes: the agent's audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::tool::{ToolCall, ToolResult};

/// Action label recorded for iterations that ended in an error before any
/// action could be taken (e.g. an unparseable LLM response).
pub const ERROR_ACTION: &str = "error";

/// One loop iteration: what the LLM thought, what it did, what came back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// 1-indexed, contiguous iteration number
    pub iteration: usize,

    pub reasoning: String,

    pub action: ActionKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,

    /// Final answer, present only on `finish` steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,

    /// Why this step is terminal, for error and unknown-action steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,

    pub duration_ms: u64,
}

impl ExecutionStep {
    /// An error step recorded in place of an action.
    pub fn error(iteration: usize, error: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            iteration,
            reasoning: String::new(),
            action: ActionKind::Other(ERROR_ACTION.into()),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            final_answer: None,
            error: Some(error.into()),
            started_at,
            duration_ms: 0,
        }
    }

    pub fn is_finish(&self) -> bool {
        self.action == ActionKind::Finish
    }

    /// Number of tool results that reported failure.
    pub fn failed_tool_calls(&self) -> usize {
        self.tool_results.iter().filter(|r| !r.success).count()
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The LLM produced a `finish` action
    Finished,
    /// The goal evaluator reported the goal achieved
    GoalAchieved,
    /// Wall-clock budget exhausted
    TimedOut,
    /// Iteration budget exhausted
    MaxIterations,
    /// Internal tool-call failsafe tripped
    MaxToolCalls,
    /// Stopped by any other condition
    Failed,
    /// Malformed LLM response or unknown action
    Error,
}

impl RunStatus {
    /// Classify a stopping-condition reason by its keywords.
    pub fn from_stop_reason(reason: &str) -> Self {
        let reason = reason.to_lowercase();
        if reason.contains("goal achieved") {
            Self::GoalAchieved
        } else if reason.contains("timeout") {
            Self::TimedOut
        } else if reason.contains("max iterations") {
            Self::MaxIterations
        } else {
            Self::Failed
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Finished | Self::GoalAchieved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::GoalAchieved => "goal_achieved",
            Self::TimedOut => "timed_out",
            Self::MaxIterations => "max_iterations",
            Self::MaxToolCalls => "max_tool_calls",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal summary of one generic agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub final_answer: Option<String>,

    pub execution_history: Vec<ExecutionStep>,

    /// Always equal to `execution_history.len()`
    pub iterations_used: usize,

    /// True iff the iteration budget ran out without a `finish` step
    pub max_iterations_reached: bool,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub status: RunStatus,

    /// The stopping-condition reason, when a condition ended the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Total tool calls executed across all steps
    pub tool_executions: usize,

    pub duration_ms: u64,
}
