//! Goal-driven testing agent.
//!
//! Drives a system under test (usually through `send_message`) until a goal
//! evaluator reports the goal achieved or a budget runs out, then returns a
//! [`TestResult`] with a findings digest and per-turn metrics.

use chrono::Utc;
use proctor_core::agent::LoopSettings;
use proctor_core::error::Result;
use proctor_core::event::{DomainEvent, EventBus};
use proctor_core::generator::Generator;
use proctor_core::step::ExecutionStep;
use proctor_tools::router::ToolRouter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::goal::{GoalEvaluator, LlmGoalEvaluator};
use crate::hooks::{AgentHooks, NoopHooks};
use crate::loop_runner::ExecutionLoop;
use crate::patterns::react::push_optional_limits;
use crate::result::TestResult;
use crate::stopping::{StoppingCondition, StoppingConditionSet};

/// System prompt for the testing agent.
pub const TEST_SYSTEM_PROMPT: &str = "You are a QA engineer testing a live system. Work toward \
the goal by exercising the system with your tools, one realistic interaction at a time. Read \
every response closely and adapt. Do not claim success without evidence from tool results. \
Finish with a short report of what you observed.";

/// What to test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRequest {
    /// Outcome the system under test should reach
    pub goal: String,

    /// How to go about testing, e.g. a persona or constraints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Background the tester should assume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
}

impl TestRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Self::default()
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    /// The task text handed to the loop.
    pub fn task(&self) -> String {
        let mut task = format!("Goal: {}", self.goal);
        if let Some(scenario) = &self.scenario {
            task.push_str(&format!("\n\nScenario: {scenario}"));
        }
        if let Some(instructions) = &self.instructions {
            task.push_str(&format!("\n\nInstructions: {instructions}"));
        }
        task
    }
}

/// The goal-driven testing agent.
pub struct TestAgent {
    generator: Arc<dyn Generator>,
    router: ToolRouter,
    evaluator: Arc<dyn GoalEvaluator>,
    settings: LoopSettings,
    system_prompt: String,
    hooks: Arc<dyn AgentHooks>,
    event_bus: Option<Arc<EventBus>>,
    conditions: Option<StoppingConditionSet>,
    history: Mutex<Vec<ExecutionStep>>,
}

impl TestAgent {
    /// A testing agent judged by an [`LlmGoalEvaluator`] on the same generator.
    pub fn new(generator: Arc<dyn Generator>, router: ToolRouter) -> Self {
        let evaluator = Arc::new(LlmGoalEvaluator::new(Arc::clone(&generator)));
        Self {
            generator,
            router,
            evaluator,
            settings: LoopSettings::default(),
            system_prompt: TEST_SYSTEM_PROMPT.to_string(),
            hooks: Arc::new(NoopHooks),
            event_bus: None,
            conditions: None,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn GoalEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn AgentHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Replace the default `[GoalAchieved, MaxIterations, ...]` order.
    pub fn with_stopping_conditions(mut self, conditions: StoppingConditionSet) -> Self {
        self.conditions = Some(conditions);
        self
    }

    fn stopping_conditions(&self) -> StoppingConditionSet {
        let mut conditions = match &self.conditions {
            Some(explicit) => explicit.clone(),
            None => test_conditions(&self.settings),
        };
        conditions.reset();
        conditions
    }

    /// Run one test.
    ///
    /// Remote hosts are disconnected before this returns, on every path.
    pub async fn run(&self, request: &TestRequest) -> Result<TestResult> {
        let mut history = self.history.lock().await;
        history.clear();

        let run_id = uuid::Uuid::new_v4().to_string();
        info!(%run_id, goal = %request.goal, "Test run starting");
        self.publish(DomainEvent::RunStarted {
            run_id: run_id.clone(),
            agent: "test".into(),
            timestamp: Utc::now(),
        });

        let task = request.task();
        let mut conditions = self.stopping_conditions();
        let outcome = ExecutionLoop::new(
            self.generator.as_ref(),
            &self.router,
            &self.settings,
            &self.system_prompt,
        )
        .with_hooks(self.hooks.as_ref())
        .with_evaluator(self.evaluator.as_ref(), &request.goal)
        .run(&task, &mut conditions, &mut history)
        .await;

        self.router.disconnect_all().await;

        match outcome {
            Ok(outcome) => {
                let result = TestResult::new(run_id.clone(), &request.goal, outcome, history.clone());
                info!(
                    %run_id,
                    status = %result.status,
                    goal_achieved = result.goal_achieved,
                    turns = result.turns_used,
                    "Test run finished"
                );
                self.publish(DomainEvent::RunCompleted {
                    run_id,
                    status: result.status.to_string(),
                    iterations: result.turns_used,
                    timestamp: Utc::now(),
                });
                Ok(result)
            }
            Err(e) => {
                warn!(%run_id, error = %e, "Test run failed");
                self.publish(DomainEvent::ErrorOccurred {
                    context: format!("test run {run_id}"),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    /// [`run`](Self::run) on a runtime built for this call only.
    pub fn run_blocking(&self, request: &TestRequest) -> Result<TestResult> {
        crate::blocking::block_on(self.run(request))?
    }

    /// Steps recorded by the most recent run, including failed ones.
    pub async fn last_history(&self) -> Vec<ExecutionStep> {
        self.history.lock().await.clone()
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// `[GoalAchieved, MaxIterations, Timeout?, MaxToolExecutions?]`.
pub fn test_conditions(settings: &LoopSettings) -> StoppingConditionSet {
    let mut conditions = StoppingConditionSet::new(vec![
        StoppingCondition::goal_achieved(),
        StoppingCondition::MaxIterations(settings.max_iterations),
    ]);
    push_optional_limits(&mut conditions, settings);
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::test_helpers::*;
    use proctor_core::generator::GeneratedOutput;
    use proctor_core::step::RunStatus;

    fn echo_router() -> ToolRouter {
        ToolRouter::builder().local(Arc::new(EchoTool)).build()
    }

    #[test]
    fn task_includes_scenario_and_instructions() {
        let request = TestRequest::new("book a table")
            .with_scenario("restaurant chatbot")
            .with_instructions("be polite");
        let task = request.task();
        assert!(task.starts_with("Goal: book a table"));
        assert!(task.contains("Scenario: restaurant chatbot"));
        assert!(task.contains("Instructions: be polite"));
        assert!(!TestRequest::new("x").task().contains("Scenario"));
    }

    #[tokio::test]
    async fn goal_achieved_ends_test() {
        let evaluator = Arc::new(ScriptedEvaluator::new(vec![
            Ok(verdict(false)),
            Ok(verdict(true)),
        ]));
        let agent = TestAgent::new(
            Arc::new(ScriptedGenerator::new(
                (0..5).map(|_| echo_calls(1)).collect(),
            )),
            echo_router(),
        )
        .with_evaluator(evaluator.clone());

        let result = agent.run(&TestRequest::new("target replies")).await.unwrap();
        assert_eq!(result.status, RunStatus::GoalAchieved);
        assert!(result.goal_achieved);
        assert_eq!(result.turns_used, 2);
        assert_eq!(evaluator.call_count(), 2);
        assert_eq!(result.metrics.tool_calls, 2);
        assert_eq!(result.metrics.turns.len(), 2);
        assert!(result.findings[0].starts_with("Goal achieved"));
        assert_eq!(result.goal, "target replies");
    }

    #[tokio::test]
    async fn budget_exhausted_without_goal() {
        let settings = LoopSettings {
            max_iterations: 2,
            ..LoopSettings::default()
        };
        let agent = TestAgent::new(
            Arc::new(ScriptedGenerator::new(vec![echo_calls(1), echo_calls(1)])),
            echo_router(),
        )
        .with_evaluator(Arc::new(ScriptedEvaluator::new(vec![])))
        .with_settings(settings);

        let result = agent.run(&TestRequest::new("unreachable")).await.unwrap();
        assert_eq!(result.status, RunStatus::MaxIterations);
        assert!(!result.goal_achieved);
        assert_eq!(result.stop_reason.as_deref(), Some("Reached max iterations (2)"));
        assert_eq!(result.findings[1], "0 of 1 criteria met.");
    }

    #[tokio::test]
    async fn default_evaluator_uses_generator() {
        let verdict_json = serde_json::to_value(verdict(true)).unwrap();
        let generator = Arc::new(ScriptedGenerator::new(vec![
            echo_calls(1),
            GeneratedOutput::Structured(verdict_json),
        ]));
        let agent = TestAgent::new(generator.clone(), echo_router());

        let result = agent.run(&TestRequest::new("greet")).await.unwrap();
        assert!(result.goal_achieved);
        assert_eq!(result.status, RunStatus::GoalAchieved);
        let schemas: Vec<String> = generator
            .requests()
            .into_iter()
            .map(|r| r.schema_name)
            .collect();
        assert_eq!(schemas, vec!["agent_action", "goal_evaluation"]);
    }

    #[tokio::test]
    async fn custom_condition_order_is_respected() {
        let settings = LoopSettings {
            max_iterations: 1,
            ..LoopSettings::default()
        };
        let conditions = StoppingConditionSet::new(vec![
            StoppingCondition::MaxIterations(1),
            StoppingCondition::goal_achieved(),
        ]);
        let agent = TestAgent::new(
            Arc::new(ScriptedGenerator::new(vec![echo_calls(1)])),
            echo_router(),
        )
        .with_evaluator(Arc::new(ScriptedEvaluator::new(vec![Ok(verdict(true))])))
        .with_settings(settings)
        .with_stopping_conditions(conditions);

        let result = agent.run(&TestRequest::new("g")).await.unwrap();
        assert_eq!(result.status, RunStatus::MaxIterations);
        // The verdict is still reported even though another condition won.
        assert!(result.goal_achieved);
    }

    #[tokio::test]
    async fn verdicts_do_not_leak_between_runs() {
        let evaluator = Arc::new(ScriptedEvaluator::new(vec![
            Ok(verdict(true)),
            Ok(verdict(false)),
        ]));
        let settings = LoopSettings {
            max_iterations: 1,
            ..LoopSettings::default()
        };
        let agent = TestAgent::new(
            Arc::new(ScriptedGenerator::new(vec![echo_calls(1), echo_calls(1)])),
            echo_router(),
        )
        .with_evaluator(evaluator)
        .with_settings(settings);

        let first = agent.run(&TestRequest::new("g")).await.unwrap();
        assert_eq!(first.status, RunStatus::GoalAchieved);
        let second = agent.run(&TestRequest::new("g")).await.unwrap();
        assert_eq!(second.status, RunStatus::MaxIterations);
        assert!(!second.goal_achieved);
    }

    #[test]
    fn test_conditions_put_goal_first() {
        let conditions = test_conditions(&LoopSettings {
            timeout_secs: Some(60),
            ..LoopSettings::default()
        });
        assert!(matches!(
            conditions.conditions()[0],
            StoppingCondition::GoalAchieved { .. }
        ));
        assert!(matches!(
            conditions.conditions()[2],
            StoppingCondition::Timeout(_)
        ));
    }

    #[test]
    fn run_blocking_twice() {
        let agent = TestAgent::new(
            Arc::new(ScriptedGenerator::new(vec![echo_calls(1), echo_calls(1)])),
            echo_router(),
        )
        .with_evaluator(Arc::new(ScriptedEvaluator::new(vec![Ok(verdict(true))])));

        let request = TestRequest::new("g");
        assert!(agent.run_blocking(&request).unwrap().goal_achieved);
        assert!(agent.run_blocking(&request).unwrap().goal_achieved);
    }
}
