//! ReAct pattern: Thought → Action → Observation until the LLM finishes.
//!
//! The general-purpose agent: answers a query with whatever tools its router
//! provides and returns an [`AgentResult`] with the full step trail.
//!
//! # Reentrancy
//!
//! The history lives behind a `tokio::sync::Mutex` held for the whole run, so
//! concurrent `run()` calls on one agent serialize instead of interleaving.

use chrono::Utc;
use proctor_core::agent::LoopSettings;
use proctor_core::error::Result;
use proctor_core::event::{DomainEvent, EventBus};
use proctor_core::generator::Generator;
use proctor_core::step::{AgentResult, ExecutionStep};
use proctor_tools::router::ToolRouter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::hooks::{AgentHooks, NoopHooks};
use crate::loop_runner::ExecutionLoop;
use crate::result::agent_result;
use crate::stopping::{StoppingCondition, StoppingConditionSet};

/// System prompt for the general-purpose agent.
pub const REACT_SYSTEM_PROMPT: &str = "You are a careful assistant that solves tasks step by \
step. Think about what you know, call tools when you need information or need to act, and read \
their results before deciding again. When you have enough to answer, finish with a complete, \
self-contained final answer.";

/// The general-purpose tool-using agent.
pub struct ReactAgent {
    generator: Arc<dyn Generator>,
    router: ToolRouter,
    settings: LoopSettings,
    system_prompt: String,
    hooks: Arc<dyn AgentHooks>,
    event_bus: Option<Arc<EventBus>>,
    conditions: Option<StoppingConditionSet>,
    history: Mutex<Vec<ExecutionStep>>,
}

impl ReactAgent {
    pub fn new(generator: Arc<dyn Generator>, router: ToolRouter) -> Self {
        Self {
            generator,
            router,
            settings: LoopSettings::default(),
            system_prompt: REACT_SYSTEM_PROMPT.to_string(),
            hooks: Arc::new(NoopHooks),
            event_bus: None,
            conditions: None,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set max iterations.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.settings.max_iterations = max;
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

    /// Publish run lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Replace the conditions derived from the settings.
    pub fn with_stopping_conditions(mut self, conditions: StoppingConditionSet) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Conditions for a fresh run: explicit ones, or derived from settings.
    fn stopping_conditions(&self) -> StoppingConditionSet {
        let mut conditions = match &self.conditions {
            Some(explicit) => explicit.clone(),
            None => default_conditions(&self.settings),
        };
        conditions.reset();
        conditions
    }

    /// Answer `query`.
    ///
    /// Remote hosts are disconnected before this returns, on every path.
    pub async fn run(&self, query: &str) -> Result<AgentResult> {
        let mut history = self.history.lock().await;
        history.clear();

        let run_id = uuid::Uuid::new_v4().to_string();
        info!(%run_id, generator = self.generator.name(), "ReAct run starting");
        self.publish(DomainEvent::RunStarted {
            run_id: run_id.clone(),
            agent: "react".into(),
            timestamp: Utc::now(),
        });

        let mut conditions = self.stopping_conditions();
        let outcome = ExecutionLoop::new(
            self.generator.as_ref(),
            &self.router,
            &self.settings,
            &self.system_prompt,
        )
        .with_hooks(self.hooks.as_ref())
        .run(query, &mut conditions, &mut history)
        .await;

        self.router.disconnect_all().await;

        match outcome {
            Ok(outcome) => {
                self.publish(DomainEvent::RunCompleted {
                    run_id,
                    status: outcome.status.to_string(),
                    iterations: history.len(),
                    timestamp: Utc::now(),
                });
                Ok(agent_result(outcome, history.clone()))
            }
            Err(e) => {
                warn!(%run_id, error = %e, "ReAct run failed");
                self.publish(DomainEvent::ErrorOccurred {
                    context: format!("react run {run_id}"),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    /// [`run`](Self::run) on a runtime built for this call only.
    pub fn run_blocking(&self, query: &str) -> Result<AgentResult> {
        crate::blocking::block_on(self.run(query))?
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

/// `[MaxIterations, Timeout?, MaxToolExecutions?]` from the settings.
pub fn default_conditions(settings: &LoopSettings) -> StoppingConditionSet {
    let mut conditions =
        StoppingConditionSet::new(vec![StoppingCondition::MaxIterations(settings.max_iterations)]);
    push_optional_limits(&mut conditions, settings);
    conditions
}

pub(crate) fn push_optional_limits(conditions: &mut StoppingConditionSet, settings: &LoopSettings) {
    if let Some(secs) = settings.timeout_secs {
        conditions.push(StoppingCondition::Timeout(Duration::from_secs(secs)));
    }
    if let Some(max) = settings.max_tool_executions {
        conditions.push(StoppingCondition::MaxToolExecutions(max));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::test_helpers::*;
    use proctor_core::error::Error;
    use proctor_core::step::RunStatus;
    use proctor_tools::remote::{ConnectionState, RemoteToolHost};

    fn agent(generator: ScriptedGenerator) -> ReactAgent {
        ReactAgent::new(
            Arc::new(generator),
            ToolRouter::builder().local(Arc::new(EchoTool)).build(),
        )
    }

    #[tokio::test]
    async fn react_three_iteration_run() {
        let agent = agent(ScriptedGenerator::new(vec![
            echo_calls(1),
            echo_calls(1),
            finish_output("done"),
        ]));
        let result = agent.run("do the thing").await.unwrap();

        assert_eq!(result.final_answer.as_deref(), Some("done"));
        assert!(result.success);
        assert_eq!(result.status, RunStatus::Finished);
        assert_eq!(result.iterations_used, 3);
        assert_eq!(result.execution_history[2].action.as_str(), "finish");
        assert_eq!(result.tool_executions, 2);
    }

    #[tokio::test]
    async fn max_iterations_result() {
        let agent = agent(ScriptedGenerator::new(vec![echo_calls(1), echo_calls(1)]))
            .with_max_iterations(2);
        let result = agent.run("loop").await.unwrap();

        assert!(result.max_iterations_reached);
        assert!(!result.success);
        assert_eq!(result.status, RunStatus::MaxIterations);
        assert_eq!(
            result.final_answer.as_deref(),
            Some(crate::result::MAX_ITERATIONS_ANSWER)
        );
    }

    #[tokio::test]
    async fn history_is_cleared_between_runs() {
        let agent = agent(ScriptedGenerator::new(vec![
            echo_calls(1),
            finish_output("first"),
            finish_output("second"),
        ]));
        agent.run("one").await.unwrap();
        assert_eq!(agent.last_history().await.len(), 2);

        let second = agent.run("two").await.unwrap();
        assert_eq!(second.iterations_used, 1);
        assert_eq!(agent.last_history().await.len(), 1);
        assert_eq!(second.execution_history[0].iteration, 1);
    }

    #[tokio::test]
    async fn concurrent_runs_serialize() {
        let generator = Arc::new(
            ScriptedGenerator::new(vec![
                echo_calls(1),
                finish_output("a"),
                echo_calls(1),
                finish_output("b"),
            ])
            .with_delay(Duration::from_millis(20)),
        );
        let agent = ReactAgent::new(
            generator.clone(),
            ToolRouter::builder().local(Arc::new(EchoTool)).build(),
        );

        let (first, second) = tokio::join!(agent.run("one"), agent.run("two"));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(generator.max_in_flight(), 1);
        assert_eq!(first.iterations_used, 2);
        assert_eq!(second.iterations_used, 2);
        assert_eq!(first.final_answer.as_deref(), Some("a"));
        assert_eq!(second.final_answer.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn remote_hosts_disconnected_after_success_and_error() {
        let connector = Arc::new(StatusConnector::new(&[("lookup", 200), ("broken", 500)]));
        let host = Arc::new(RemoteToolHost::new("remote", connector.clone()));
        let router = ToolRouter::builder().remote(Arc::clone(&host)).build();
        let generator = ScriptedGenerator::new(vec![
            call_tool_output(vec![("lookup", serde_json::json!({}))]),
            finish_output("ok"),
            call_tool_output(vec![("broken", serde_json::json!({}))]),
        ]);
        let agent = ReactAgent::new(Arc::new(generator), router);

        agent.run("first").await.unwrap();
        assert_eq!(host.connection_state().await, ConnectionState::Disconnected);
        assert!(!connector.session_open());

        let err = agent.run("second").await.unwrap_err();
        assert!(matches!(err, Error::RemoteApplication { status_code: 500, .. }));
        assert_eq!(host.connection_state().await, ConnectionState::Disconnected);
        assert!(!connector.session_open());
        assert_eq!(connector.connects(), 2);

        // Partial trail stays readable after an error; the failing call is
        // reported through the error, not the step.
        let history = agent.last_history().await;
        assert_eq!(history.len(), 1);
        assert!(history[0].tool_results.is_empty());
    }

    #[tokio::test]
    async fn explicit_iteration_limit_beats_default_settings() {
        let agent = agent(ScriptedGenerator::new((0..15).map(|_| echo_calls(1)).collect()))
            .with_stopping_conditions(StoppingConditionSet::new(vec![
                StoppingCondition::MaxIterations(15),
            ]));
        let result = agent.run("long haul").await.unwrap();

        assert_eq!(agent.settings().max_iterations, 10);
        assert_eq!(result.iterations_used, 15);
        assert_eq!(
            result.stop_reason.as_deref(),
            Some("Reached max iterations (15)")
        );
        assert!(result.max_iterations_reached);
    }

    #[tokio::test]
    async fn run_events_are_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let agent = agent(ScriptedGenerator::new(vec![finish_output("x")]))
            .with_event_bus(Arc::clone(&bus));
        agent.run("q").await.unwrap();

        assert!(matches!(*rx.recv().await.unwrap(), DomainEvent::RunStarted { .. }));
        match &*rx.recv().await.unwrap() {
            DomainEvent::RunCompleted {
                status, iterations, ..
            } => {
                assert_eq!(status, "finished");
                assert_eq!(*iterations, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn default_conditions_follow_settings() {
        let settings = LoopSettings {
            timeout_secs: Some(30),
            max_tool_executions: Some(8),
            ..LoopSettings::default()
        };
        let conditions = default_conditions(&settings);
        assert_eq!(conditions.conditions().len(), 3);
        assert!(matches!(
            conditions.conditions()[0],
            StoppingCondition::MaxIterations(10)
        ));
        assert_eq!(default_conditions(&LoopSettings::default()).conditions().len(), 1);
    }

    #[test]
    fn run_blocking_works_twice_with_remote_host() {
        let connector = Arc::new(StatusConnector::new(&[("lookup", 200)]));
        let host = Arc::new(RemoteToolHost::new("remote", connector.clone()));
        let router = ToolRouter::builder().remote(host).build();
        let generator = ScriptedGenerator::new(vec![
            call_tool_output(vec![("lookup", serde_json::json!({}))]),
            finish_output("first"),
            call_tool_output(vec![("lookup", serde_json::json!({}))]),
            finish_output("second"),
        ]);
        let agent = ReactAgent::new(Arc::new(generator), router);

        let first = agent.run_blocking("one").unwrap();
        let second = agent.run_blocking("two").unwrap();
        assert_eq!(first.final_answer.as_deref(), Some("first"));
        assert_eq!(second.final_answer.as_deref(), Some("second"));
        assert!(second.execution_history[0].tool_results[0].success);
        assert_eq!(connector.connects(), 2);
    }
}
