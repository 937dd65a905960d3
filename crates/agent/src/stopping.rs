//! Stopping conditions: ordered predicates that end a run early.
//!
//! Conditions are checked in registration order at every iteration boundary;
//! the first one that fires supplies the stop reason. Reason strings are
//! matched by keyword downstream ("goal achieved", "timeout", "max
//! iterations"), so they must stay stable.

use std::time::{Duration, Instant};

use crate::goal::GoalEvaluation;

/// What the conditions can see of a running loop.
#[derive(Debug, Clone, Copy)]
pub struct RunState {
    /// Completed iterations
    pub iterations: usize,
    /// Tool calls executed so far
    pub tool_executions: usize,
    pub started_at: Instant,
}

impl RunState {
    pub fn new(started_at: Instant) -> Self {
        Self {
            iterations: 0,
            tool_executions: 0,
            started_at,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[derive(Debug, Clone)]
pub enum StoppingCondition {
    MaxIterations(usize),
    /// Checked at iteration boundaries only; an in-flight call can overrun it.
    Timeout(Duration),
    MaxToolExecutions(usize),
    /// Holds the latest evaluator verdict.
    GoalAchieved { verdict: Option<GoalEvaluation> },
}

impl StoppingCondition {
    pub fn goal_achieved() -> Self {
        Self::GoalAchieved { verdict: None }
    }

    pub fn should_stop(&self, state: &RunState) -> Option<String> {
        match self {
            Self::MaxIterations(max) => {
                (state.iterations >= *max).then(|| format!("Reached max iterations ({max})"))
            }
            Self::Timeout(limit) => {
                let elapsed = state.elapsed();
                (elapsed > *limit).then(|| {
                    format!(
                        "Execution timeout after {:.1}s (limit {:.1}s)",
                        elapsed.as_secs_f64(),
                        limit.as_secs_f64()
                    )
                })
            }
            Self::MaxToolExecutions(max) => (state.tool_executions >= *max)
                .then(|| format!("Tool execution limit reached ({max})")),
            Self::GoalAchieved { verdict } => verdict
                .as_ref()
                .filter(|v| v.is_achieved())
                .map(|v| {
                    let summary = if v.reasoning.trim().is_empty() {
                        format!("{} of {} criteria met", v.criteria_met(), v.criteria.len())
                    } else {
                        v.reasoning.trim().to_string()
                    };
                    format!("Goal achieved: {summary}")
                }),
        }
    }
}

/// An ordered list of conditions.
#[derive(Debug, Clone, Default)]
pub struct StoppingConditionSet {
    conditions: Vec<StoppingCondition>,
}

impl StoppingConditionSet {
    pub fn new(conditions: Vec<StoppingCondition>) -> Self {
        Self { conditions }
    }

    pub fn push(&mut self, condition: StoppingCondition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[StoppingCondition] {
        &self.conditions
    }

    /// First firing condition's reason, in registration order.
    pub fn check(&self, state: &RunState) -> Option<String> {
        self.conditions.iter().find_map(|c| c.should_stop(state))
    }

    /// The tightest `MaxIterations` in the set, if any.
    pub fn iteration_limit(&self) -> Option<usize> {
        self.conditions
            .iter()
            .filter_map(|c| match c {
                StoppingCondition::MaxIterations(max) => Some(*max),
                _ => None,
            })
            .min()
    }

    /// Store `verdict` in every goal condition.
    pub fn record_evaluation(&mut self, evaluation: &GoalEvaluation) {
        for condition in &mut self.conditions {
            if let StoppingCondition::GoalAchieved { verdict } = condition {
                *verdict = Some(evaluation.clone());
            }
        }
    }

    /// Forget cached verdicts before a new run.
    pub fn reset(&mut self) {
        for condition in &mut self.conditions {
            if let StoppingCondition::GoalAchieved { verdict } = condition {
                *verdict = None;
            }
        }
    }

    pub fn has_goal_condition(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| matches!(c, StoppingCondition::GoalAchieved { .. }))
    }
}
