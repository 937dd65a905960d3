//! The Proctor agent engine: a ReAct loop over a tool router.
//!
//! Each run follows a **Think → Act → Observe** cycle:
//!
//! 1. **Check** stopping conditions (iterations, timeout, tool budget, goal)
//! 2. **Build** a prompt from the tool listing and a window of recent steps
//! 3. **Ask** the LLM for a structured action
//! 4. **If `call_tool`**: run each call in order, record the step, loop
//! 5. **If `finish`**: record the final answer and stop
//!
//! [`ReactAgent`] returns an `AgentResult`; [`TestAgent`] adds a goal
//! evaluator and returns a [`TestResult`].

pub mod blocking;
pub mod context;
pub mod goal;
pub mod hooks;
pub mod loop_runner;
pub mod patterns;
pub mod result;
pub mod stopping;
pub mod stream_event;

pub use context::PromptAssembler;
pub use goal::{CriterionEvaluation, EvaluationError, GoalEvaluation, GoalEvaluator, LlmGoalEvaluator};
pub use hooks::{AgentHooks, ChannelHooks, HookResult, LoggingHooks, NoopHooks, RunSummary};
pub use loop_runner::{ExecutionLoop, LoopOutcome};
pub use patterns::{ReactAgent, TestAgent, TestRequest};
pub use result::{TestMetrics, TestResult, TurnMetrics, agent_result};
pub use stopping::{RunState, StoppingCondition, StoppingConditionSet};
pub use stream_event::AgentStreamEvent;
