//! Goal evaluation: judging whether a test goal has been met.
//!
//! The evaluator runs once per loop iteration. Its verdict feeds every
//! `GoalAchieved` stopping condition and the final test result.

use async_trait::async_trait;
use proctor_core::error::{GenerationError, ResponseParseError};
use proctor_core::generator::{GenerationRequest, Generator};
use proctor_core::step::ExecutionStep;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::context::PromptAssembler;

/// Name under which the verdict schema is sent to the generator.
pub const GOAL_SCHEMA_NAME: &str = "goal_evaluation";

/// One success criterion and whether it was met.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionEvaluation {
    pub criterion: String,
    pub met: bool,
    #[serde(default)]
    pub evidence: String,
}

/// A structured verdict on a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalEvaluation {
    #[serde(default)]
    pub criteria: Vec<CriterionEvaluation>,

    pub all_criteria_met: bool,

    /// Always reported, clamped to `[0, 1]`
    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub reasoning: String,

    #[serde(default)]
    pub evidence: Vec<String>,
}

impl GoalEvaluation {
    /// Achieved iff every criterion is met. Confidence never decides.
    pub fn is_achieved(&self) -> bool {
        self.all_criteria_met
    }

    pub fn criteria_met(&self) -> usize {
        self.criteria.iter().filter(|c| c.met).count()
    }

    /// Clamp confidence into range; NaN becomes 0.
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Goal evaluation request failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Goal evaluation response invalid: {0}")]
    Response(#[from] ResponseParseError),
}

/// Judges a goal against the steps taken so far.
#[async_trait]
pub trait GoalEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        goal: &str,
        history: &[ExecutionStep],
    ) -> Result<GoalEvaluation, EvaluationError>;
}

const EVALUATOR_SYSTEM_PROMPT: &str = "You are a strict test judge. Break the goal into concrete \
success criteria and decide, from the transcript only, whether each one is met. Cite evidence \
from tool results. Set all_criteria_met to true only if every criterion is met. Report your \
confidence between 0 and 1 even when criteria fail.";

/// A [`GoalEvaluator`] that asks an LLM for a structured verdict.
pub struct LlmGoalEvaluator {
    generator: Arc<dyn Generator>,
    system_prompt: String,
}

impl LlmGoalEvaluator {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            system_prompt: EVALUATOR_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    fn build_prompt(goal: &str, history: &[ExecutionStep]) -> String {
        format!(
            "# Goal\n{goal}\n\n# Transcript\n{}\n\n# Verdict\nEvaluate the goal against the transcript.",
            PromptAssembler::render_steps(history)
        )
    }
}

#[async_trait]
impl GoalEvaluator for LlmGoalEvaluator {
    async fn evaluate(
        &self,
        goal: &str,
        history: &[ExecutionStep],
    ) -> Result<GoalEvaluation, EvaluationError> {
        let request = GenerationRequest {
            prompt: Self::build_prompt(goal, history),
            system_prompt: self.system_prompt.clone(),
            schema: goal_schema(),
            schema_name: GOAL_SCHEMA_NAME.to_string(),
        };
        let output = self.generator.generate(request).await?;
        let verdict: GoalEvaluation = output.parse()?;
        let verdict = verdict.normalized();
        debug!(
            achieved = verdict.is_achieved(),
            confidence = verdict.confidence,
            met = verdict.criteria_met(),
            total = verdict.criteria.len(),
            "Goal evaluated"
        );
        Ok(verdict)
    }
}

/// JSON Schema for [`GoalEvaluation`].
pub fn goal_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "criteria": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "criterion": { "type": "string" },
                        "met": { "type": "boolean" },
                        "evidence": { "type": "string" }
                    },
                    "required": ["criterion", "met"]
                }
            },
            "all_criteria_met": { "type": "boolean" },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "reasoning": { "type": "string" },
            "evidence": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["criteria", "all_criteria_met", "confidence", "reasoning"]
    })
}
