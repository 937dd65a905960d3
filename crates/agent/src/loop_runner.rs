//! The execution loop: stopping conditions, prompt, action, dispatch, record.
//!
//! Each iteration:
//!
//! 1. **Check** stopping conditions in registration order
//! 2. **Build** the prompt from the tool listing and recent steps
//! 3. **Ask** the generator for a structured [`Action`]
//! 4. **Act**: record a final answer, or run every tool call in order
//! 5. **Evaluate** the goal, when an evaluator is attached
//!
//! Exactly one [`ExecutionStep`] is appended per iteration, including the
//! iteration that trips the tool-call failsafe.

use chrono::Utc;
use proctor_core::action::{ACTION_SCHEMA_NAME, Action, ActionKind, action_schema};
use proctor_core::agent::LoopSettings;
use proctor_core::error::{Error, Result};
use proctor_core::generator::{GenerationRequest, Generator};
use proctor_core::step::{ERROR_ACTION, ExecutionStep, RunStatus};
use proctor_core::tool::{ToolCall, ToolResult};
use proctor_tools::router::ToolRouter;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::context::PromptAssembler;
use crate::goal::{GoalEvaluation, GoalEvaluator};
use crate::hooks::{AgentHooks, NoopHooks, RunSummary, tolerate};
use crate::stopping::{RunState, StoppingCondition, StoppingConditionSet};

/// Terminal state of one loop run, before aggregation into a result.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub final_answer: Option<String>,
    pub status: RunStatus,
    /// Reason given by the stopping condition or failsafe that ended the run
    pub stop_reason: Option<String>,
    pub error: Option<String>,
    pub tool_executions: usize,
    /// Latest successful goal verdict
    pub goal_evaluation: Option<GoalEvaluation>,
    /// Number of evaluator invocations, successful or not
    pub evaluations: usize,
    pub duration: Duration,
}

struct Terminal {
    status: RunStatus,
    stop_reason: Option<String>,
    final_answer: Option<String>,
    error: Option<String>,
}

impl Terminal {
    fn error(message: String) -> Self {
        Self {
            status: RunStatus::Error,
            stop_reason: None,
            final_answer: None,
            error: Some(message),
        }
    }
}

/// Results of one iteration's tool batch.
#[derive(Default)]
struct Batch {
    results: Vec<ToolResult>,
    auth_errors: Vec<Error>,
    fatal: Option<Error>,
    failsafe: Option<String>,
}

#[derive(Default)]
struct Verdicts {
    latest: Option<GoalEvaluation>,
    calls: usize,
}

static NOOP_HOOKS: NoopHooks = NoopHooks;

/// One configured loop. Borrowed pieces only; cheap to build per run.
pub struct ExecutionLoop<'a> {
    generator: &'a dyn Generator,
    router: &'a ToolRouter,
    settings: &'a LoopSettings,
    system_prompt: &'a str,
    hooks: &'a dyn AgentHooks,
    evaluator: Option<(&'a dyn GoalEvaluator, &'a str)>,
}

impl<'a> ExecutionLoop<'a> {
    pub fn new(
        generator: &'a dyn Generator,
        router: &'a ToolRouter,
        settings: &'a LoopSettings,
        system_prompt: &'a str,
    ) -> Self {
        Self {
            generator,
            router,
            settings,
            system_prompt,
            hooks: &NOOP_HOOKS,
            evaluator: None,
        }
    }

    pub fn with_hooks(mut self, hooks: &'a dyn AgentHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Judge `goal` after every recorded step.
    pub fn with_evaluator(mut self, evaluator: &'a dyn GoalEvaluator, goal: &'a str) -> Self {
        self.evaluator = Some((evaluator, goal));
        self
    }

    /// Run until a condition fires or the LLM finishes.
    ///
    /// Steps are appended to `history` as they are recorded, so it holds the
    /// partial trail even when an error escapes. Errors that escape: tool
    /// discovery failures, generator failures other than a malformed reply,
    /// remote transport and fatal application errors, and the iteration's
    /// merged authentication error.
    pub async fn run(
        &self,
        task: &str,
        conditions: &mut StoppingConditionSet,
        history: &mut Vec<ExecutionStep>,
    ) -> Result<LoopOutcome> {
        let started = Instant::now();
        tolerate("on_agent_start", self.hooks.on_agent_start(task).await);

        let mut state = RunState::new(started);
        let mut verdicts = Verdicts::default();
        let terminal = match self
            .drive(task, conditions, history, &mut state, &mut verdicts)
            .await
        {
            Ok(terminal) => terminal,
            Err(e) => {
                warn!(error = %e, iterations = history.len(), "Execution loop failed");
                tolerate("on_agent_error", self.hooks.on_agent_error(&e).await);
                return Err(e);
            }
        };

        let outcome = LoopOutcome {
            final_answer: terminal.final_answer,
            status: terminal.status,
            stop_reason: terminal.stop_reason,
            error: terminal.error,
            tool_executions: state.tool_executions,
            goal_evaluation: verdicts.latest,
            evaluations: verdicts.calls,
            duration: started.elapsed(),
        };

        info!(
            status = %outcome.status,
            iterations = history.len(),
            tool_executions = outcome.tool_executions,
            duration_ms = outcome.duration.as_millis() as u64,
            "Execution loop finished"
        );

        let summary = RunSummary {
            status: outcome.status,
            success: outcome.status.is_success(),
            iterations: history.len(),
            tool_executions: outcome.tool_executions,
            stop_reason: outcome.stop_reason.clone(),
            final_answer: outcome.final_answer.clone(),
        };
        tolerate("on_agent_end", self.hooks.on_agent_end(&summary).await);

        Ok(outcome)
    }

    async fn drive(
        &self,
        task: &str,
        conditions: &mut StoppingConditionSet,
        history: &mut Vec<ExecutionStep>,
        state: &mut RunState,
        verdicts: &mut Verdicts,
    ) -> Result<Terminal> {
        let descriptors = self.router.list_tools().await?;
        let tool_listing = PromptAssembler::render_tools(&descriptors);
        let assembler = PromptAssembler::new(self.settings.history_window);
        // An explicit iteration limit wins over the settings; the settings
        // only back up condition sets that have none.
        let max_iterations = conditions
            .iteration_limit()
            .unwrap_or(self.settings.max_iterations);
        let backstop = conditions
            .iteration_limit()
            .is_none()
            .then_some(StoppingCondition::MaxIterations(max_iterations));
        let ceiling = self.settings.tool_call_ceiling_for(max_iterations);

        info!(
            max_iterations,
            ceiling,
            tools = descriptors.len(),
            "Execution loop starting"
        );

        loop {
            state.iterations = history.len();
            if let Some(reason) = conditions
                .check(state)
                .or_else(|| backstop.as_ref().and_then(|b| b.should_stop(state)))
            {
                let status = RunStatus::from_stop_reason(&reason);
                info!(%reason, %status, "Stopping condition met");
                return Ok(Terminal {
                    status,
                    stop_reason: Some(reason),
                    final_answer: None,
                    error: None,
                });
            }

            let iteration = history.len() + 1;
            let step_clock = Instant::now();
            let started_at = Utc::now();
            debug!(iteration, "Loop iteration");
            tolerate(
                "on_iteration_start",
                self.hooks.on_iteration_start(iteration).await,
            );

            let request = GenerationRequest {
                prompt: assembler.assemble(task, &tool_listing, history),
                system_prompt: self.system_prompt.to_string(),
                schema: action_schema(),
                schema_name: ACTION_SCHEMA_NAME.to_string(),
            };
            tolerate("on_llm_start", self.hooks.on_llm_start(iteration).await);
            let parsed = match self.generator.generate(request).await {
                Ok(output) => Action::from_output(output).map_err(|e| e.to_string()),
                Err(e) if e.is_malformed_response() => Err(e.to_string()),
                Err(e) => return Err(e.into()),
            };

            let action = match parsed {
                Ok(action) => action,
                Err(reason) => {
                    warn!(iteration, error = %reason, "Malformed LLM response");
                    tolerate(
                        "on_llm_end",
                        self.hooks.on_llm_end(iteration, &Action::invalid()).await,
                    );
                    let message = format!("Invalid LLM response: {reason}");
                    let mut step = ExecutionStep::error(iteration, &message, started_at);
                    step.duration_ms = elapsed_ms(step_clock);
                    history.push(step);
                    self.end_iteration(iteration, &ActionKind::Other(ERROR_ACTION.into()))
                        .await;
                    return Ok(Terminal::error(message));
                }
            };
            tolerate("on_llm_end", self.hooks.on_llm_end(iteration, &action).await);

            match &action.action {
                ActionKind::Finish => {
                    history.push(ExecutionStep {
                        iteration,
                        reasoning: action.reasoning.clone(),
                        action: ActionKind::Finish,
                        tool_calls: Vec::new(),
                        tool_results: Vec::new(),
                        final_answer: action.final_answer.clone(),
                        error: None,
                        started_at,
                        duration_ms: elapsed_ms(step_clock),
                    });
                    self.end_iteration(iteration, &ActionKind::Finish).await;
                    self.evaluate(conditions, history, verdicts).await;
                    return Ok(Terminal {
                        status: RunStatus::Finished,
                        stop_reason: None,
                        final_answer: action.final_answer,
                        error: None,
                    });
                }
                ActionKind::CallTool => {
                    let batch = self
                        .execute_batch(&action.tool_calls, &mut state.tool_executions, ceiling)
                        .await;
                    let executed = batch.results.len();
                    history.push(ExecutionStep {
                        iteration,
                        reasoning: action.reasoning.clone(),
                        action: ActionKind::CallTool,
                        tool_calls: action.tool_calls[..executed].to_vec(),
                        tool_results: batch.results,
                        final_answer: None,
                        error: batch.failsafe.clone(),
                        started_at,
                        duration_ms: elapsed_ms(step_clock),
                    });
                    self.end_iteration(iteration, &ActionKind::CallTool).await;

                    if let Some(e) = batch.fatal {
                        warn!(iteration, error = %e, "Fatal tool error, aborting run");
                        return Err(e);
                    }
                    if let Some(e) = Error::merge_authentication(batch.auth_errors) {
                        warn!(iteration, error = %e, "Authentication failed, aborting run");
                        return Err(e);
                    }
                    if let Some(reason) = batch.failsafe {
                        return Ok(Terminal {
                            status: RunStatus::MaxToolCalls,
                            stop_reason: Some(reason.clone()),
                            final_answer: None,
                            error: Some(reason),
                        });
                    }
                    self.evaluate(conditions, history, verdicts).await;
                }
                ActionKind::Other(name) => {
                    warn!(iteration, action = %name, "LLM chose an unknown action");
                    let message = format!("Unknown action '{name}'");
                    history.push(ExecutionStep {
                        iteration,
                        reasoning: action.reasoning.clone(),
                        action: action.action.clone(),
                        tool_calls: Vec::new(),
                        tool_results: Vec::new(),
                        final_answer: None,
                        error: Some(message.clone()),
                        started_at,
                        duration_ms: elapsed_ms(step_clock),
                    });
                    self.end_iteration(iteration, &action.action).await;
                    return Ok(Terminal::error(message));
                }
            }
        }
    }

    /// Run `calls` in order through the router.
    ///
    /// Authentication failures are collected, leave a failed result in place
    /// of the call, and the batch continues. Any other escaping error stops
    /// the batch and its call is left out of the results.
    async fn execute_batch(
        &self,
        calls: &[ToolCall],
        executed: &mut usize,
        ceiling: usize,
    ) -> Batch {
        let mut batch = Batch::default();
        for call in calls {
            if *executed + 1 > ceiling {
                let reason = format!("Reached maximum number of tool calls ({ceiling})");
                warn!(ceiling, "Tool-call failsafe tripped");
                batch.failsafe = Some(reason);
                break;
            }
            *executed += 1;

            debug!(tool = %call.tool_name, "Executing tool call");
            tolerate(
                "on_tool_start",
                self.hooks
                    .on_tool_start(&call.tool_name, &call.arguments)
                    .await,
            );
            let (result, error) = match self.router.execute(call).await {
                Ok(result) => (result, None),
                Err(e) => (ToolResult::failure(&call.tool_name, e.to_string()), Some(e)),
            };
            tolerate(
                "on_tool_end",
                self.hooks.on_tool_end(&call.tool_name, &result).await,
            );

            match error {
                None => batch.results.push(result),
                Some(e) if e.is_authentication() => {
                    batch.auth_errors.push(e);
                    batch.results.push(result);
                }
                Some(e) => {
                    batch.fatal = Some(e);
                    break;
                }
            }
        }
        batch
    }

    /// Ask the evaluator, if any, about the goal. Failures keep the previous
    /// verdict.
    async fn evaluate(
        &self,
        conditions: &mut StoppingConditionSet,
        history: &[ExecutionStep],
        verdicts: &mut Verdicts,
    ) {
        let Some((evaluator, goal)) = self.evaluator else {
            return;
        };
        verdicts.calls += 1;
        match evaluator.evaluate(goal, history).await {
            Ok(verdict) => {
                debug!(
                    achieved = verdict.is_achieved(),
                    confidence = verdict.confidence,
                    "Goal verdict"
                );
                conditions.record_evaluation(&verdict);
                verdicts.latest = Some(verdict);
            }
            Err(e) => warn!(error = %e, "Goal evaluation failed, keeping previous verdict"),
        }
    }

    async fn end_iteration(&self, iteration: usize, action: &ActionKind) {
        tolerate(
            "on_iteration_end",
            self.hooks.on_iteration_end(iteration, action).await,
        );
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
