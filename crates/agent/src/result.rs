//! Result aggregation: terminal loop state into caller-facing results.

use proctor_core::step::{AgentResult, ExecutionStep, RunStatus};
use serde::{Deserialize, Serialize};

use crate::goal::GoalEvaluation;
use crate::loop_runner::LoopOutcome;

/// Answer reported when the iteration budget ran out without a `finish`.
pub const MAX_ITERATIONS_ANSWER: &str =
    "I've reached the maximum number of reasoning iterations. Here's what I found so far.";

const REASONING_EXCERPT_CHARS: usize = 200;

/// Build the generic agent's result.
pub fn agent_result(outcome: LoopOutcome, history: Vec<ExecutionStep>) -> AgentResult {
    let max_iterations_reached =
        outcome.status == RunStatus::MaxIterations && !history.iter().any(|s| s.is_finish());
    let final_answer = match outcome.final_answer {
        Some(answer) => Some(answer),
        None if max_iterations_reached => Some(MAX_ITERATIONS_ANSWER.to_string()),
        None => None,
    };

    AgentResult {
        final_answer,
        iterations_used: history.len(),
        execution_history: history,
        max_iterations_reached,
        success: outcome.status.is_success(),
        error: outcome.error,
        status: outcome.status,
        stop_reason: outcome.stop_reason,
        tool_executions: outcome.tool_executions,
        duration_ms: outcome.duration.as_millis() as u64,
    }
}

/// Timing and tool usage for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetrics {
    pub iteration: usize,
    pub duration_ms: u64,
    pub tool_calls: usize,
    pub failed_tool_calls: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub tool_calls: usize,
    pub failed_tool_calls: usize,
    pub evaluations: usize,
    pub turns: Vec<TurnMetrics>,
}

impl TestMetrics {
    pub fn from_history(history: &[ExecutionStep], evaluations: usize) -> Self {
        let turns: Vec<TurnMetrics> = history
            .iter()
            .map(|step| TurnMetrics {
                iteration: step.iteration,
                duration_ms: step.duration_ms,
                tool_calls: step.tool_results.len(),
                failed_tool_calls: step.failed_tool_calls(),
            })
            .collect();
        Self {
            tool_calls: turns.iter().map(|t| t.tool_calls).sum(),
            failed_tool_calls: turns.iter().map(|t| t.failed_tool_calls).sum(),
            evaluations,
            turns,
        }
    }
}

/// Outcome of one goal-driven test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub run_id: String,
    pub goal: String,
    pub status: RunStatus,
    pub goal_achieved: bool,
    pub turns_used: usize,
    pub duration_seconds: f64,

    /// Short human-readable digest. Criterion detail lives in `goal_evaluation`.
    pub findings: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_evaluation: Option<GoalEvaluation>,

    pub metrics: TestMetrics,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,

    pub history: Vec<ExecutionStep>,
}

impl TestResult {
    pub fn new(
        run_id: impl Into<String>,
        goal: impl Into<String>,
        outcome: LoopOutcome,
        history: Vec<ExecutionStep>,
    ) -> Self {
        let goal_achieved = outcome
            .goal_evaluation
            .as_ref()
            .is_some_and(GoalEvaluation::is_achieved);
        let findings = findings(outcome.status, outcome.goal_evaluation.as_ref());

        Self {
            run_id: run_id.into(),
            goal: goal.into(),
            status: outcome.status,
            goal_achieved,
            turns_used: history.len(),
            duration_seconds: outcome.duration.as_secs_f64(),
            findings,
            goal_evaluation: outcome.goal_evaluation,
            metrics: TestMetrics::from_history(&history, outcome.evaluations),
            stop_reason: outcome.stop_reason,
            error: outcome.error,
            final_answer: outcome.final_answer,
            history,
        }
    }
}

/// Outcome line, criteria tally, reasoning excerpt.
fn findings(status: RunStatus, verdict: Option<&GoalEvaluation>) -> Vec<String> {
    let Some(verdict) = verdict else {
        return vec![format!(
            "Test run completed with status '{status}' without a goal evaluation."
        )];
    };

    let outcome = if verdict.is_achieved() {
        "Goal achieved"
    } else {
        "Goal not achieved"
    };
    let mut lines = vec![
        format!(
            "{outcome} (status '{status}', confidence {:.2}).",
            verdict.confidence
        ),
        format!(
            "{} of {} criteria met.",
            verdict.criteria_met(),
            verdict.criteria.len()
        ),
    ];
    let reasoning = verdict.reasoning.trim();
    if !reasoning.is_empty() {
        lines.push(excerpt(reasoning, REASONING_EXCERPT_CHARS));
    }
    lines
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
