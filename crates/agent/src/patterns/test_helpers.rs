//! Shared test helpers for loop and pattern tests.

use async_trait::async_trait;
use proctor_core::action::Action;
use proctor_core::error::{GenerationError, ToolError, TransportError};
use proctor_core::generator::{GeneratedOutput, GenerationRequest, Generator};
use proctor_core::step::ExecutionStep;
use proctor_core::tool::{Tool, ToolCall, ToolDescriptor, ToolResult};
use proctor_tools::remote::{CallOutcome, RemoteCallResult, RemoteSession, SessionConnector};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::goal::{CriterionEvaluation, EvaluationError, GoalEvaluation, GoalEvaluator};
use crate::hooks::{AgentHooks, HookResult, RunSummary};

/// A generator that returns a sequence of scripted outputs.
///
/// Each call to `generate` pops the next entry in the queue.
/// Panics if more calls are made than outputs provided.
pub struct ScriptedGenerator {
    outputs: Mutex<VecDeque<Result<GeneratedOutput, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(outputs: Vec<GeneratedOutput>) -> Self {
        Self::with_results(outputs.into_iter().map(Ok).collect())
    }

    pub fn with_results(outputs: Vec<Result<GeneratedOutput, GenerationError>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every call, so overlapping runs would show.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of simultaneous `generate` calls seen.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedOutput, GenerationError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.outputs.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match next {
            Some(output) => output,
            None => panic!("ScriptedGenerator: no more outputs (call #{call})"),
        }
    }
}

/// A `call_tool` output with one call per `(name, arguments)` pair.
pub fn call_tool_output(calls: Vec<(&str, Value)>) -> GeneratedOutput {
    let calls = calls
        .into_iter()
        .map(|(name, args)| ToolCall::new(name, args))
        .collect();
    GeneratedOutput::Structured(
        serde_json::to_value(Action::call_tools("using tools", calls)).unwrap(),
    )
}

/// A `finish` output, delivered as text like most providers do.
pub fn finish_output(answer: &str) -> GeneratedOutput {
    GeneratedOutput::Text(serde_json::to_string(&Action::finish("done reasoning", answer)).unwrap())
}

/// `n` calls to the echo tool.
pub fn echo_calls(n: usize) -> GeneratedOutput {
    call_tool_output(
        (0..n)
            .map(|i| ("echo", serde_json::json!({ "text": format!("call {i}") })))
            .collect(),
    )
}

/// A verdict with one criterion.
pub fn verdict(achieved: bool) -> GoalEvaluation {
    GoalEvaluation {
        criteria: vec![CriterionEvaluation {
            criterion: "target replied".into(),
            met: achieved,
            evidence: "HTTP 200".into(),
        }],
        all_criteria_met: achieved,
        confidence: 0.9,
        reasoning: if achieved {
            "target replied as expected".into()
        } else {
            "no reply yet".into()
        },
        evidence: vec![],
    }
}

/// An evaluator that returns scripted verdicts and counts its calls.
///
/// When the script runs out, the last verdict repeats.
pub struct ScriptedEvaluator {
    verdicts: Mutex<VecDeque<Result<GoalEvaluation, EvaluationError>>>,
    last: Mutex<Option<GoalEvaluation>>,
    calls: AtomicUsize,
    history_lengths: Mutex<Vec<usize>>,
}

impl ScriptedEvaluator {
    pub fn new(verdicts: Vec<Result<GoalEvaluation, EvaluationError>>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            history_lengths: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// History length seen by each call.
    pub fn history_lengths(&self) -> Vec<usize> {
        self.history_lengths.lock().unwrap().clone()
    }
}

#[async_trait]
impl GoalEvaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        _goal: &str,
        history: &[ExecutionStep],
    ) -> Result<GoalEvaluation, EvaluationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.history_lengths.lock().unwrap().push(history.len());
        match self.verdicts.lock().unwrap().pop_front() {
            Some(Ok(v)) => {
                *self.last.lock().unwrap() = Some(v.clone());
                Ok(v)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last.lock().unwrap().clone().unwrap_or_else(|| verdict(false))),
        }
    }
}

/// Echoes its `text` argument. Fails when `fail` is true.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "Text to echo"},
                "fail": {"type": "boolean"}
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        if arguments.get("fail").and_then(Value::as_bool) == Some(true) {
            return Err(ToolError::ExecutionFailed {
                tool_name: "echo".into(),
                reason: "asked to fail".into(),
            });
        }
        Ok(arguments
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Records every hook invocation by name; optionally fails all of them.
#[derive(Default)]
pub struct RecordingHooks {
    pub events: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingHooks {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) -> HookResult {
        self.events.lock().unwrap().push(event);
        if self.fail {
            Err("hook exploded".into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AgentHooks for RecordingHooks {
    async fn on_agent_start(&self, _query: &str) -> HookResult {
        self.record("agent_start".into())
    }

    async fn on_iteration_start(&self, iteration: usize) -> HookResult {
        self.record(format!("iteration_start:{iteration}"))
    }

    async fn on_llm_start(&self, iteration: usize) -> HookResult {
        self.record(format!("llm_start:{iteration}"))
    }

    async fn on_llm_end(&self, iteration: usize, action: &Action) -> HookResult {
        self.record(format!("llm_end:{iteration}:{}", action.action))
    }

    async fn on_tool_start(&self, tool_name: &str, _arguments: &Map<String, Value>) -> HookResult {
        self.record(format!("tool_start:{tool_name}"))
    }

    async fn on_tool_end(&self, tool_name: &str, result: &ToolResult) -> HookResult {
        self.record(format!("tool_end:{tool_name}:{}", result.success))
    }

    async fn on_iteration_end(
        &self,
        iteration: usize,
        action: &proctor_core::ActionKind,
    ) -> HookResult {
        self.record(format!("iteration_end:{iteration}:{action}"))
    }

    async fn on_agent_end(&self, summary: &RunSummary) -> HookResult {
        self.record(format!("agent_end:{}", summary.status))
    }

    async fn on_agent_error(&self, _error: &proctor_core::Error) -> HookResult {
        self.record("agent_error".into())
    }
}

/// Remote tools that answer with a fixed HTTP-style status code each.
pub struct StatusConnector {
    tools: Vec<(String, u16)>,
    connects: AtomicUsize,
    last_alive: Mutex<Option<Arc<AtomicBool>>>,
}

impl StatusConnector {
    pub fn new(tools: &[(&str, u16)]) -> Self {
        Self {
            tools: tools.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
            connects: AtomicUsize::new(0),
            last_alive: Mutex::new(None),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Whether the most recent session is still open.
    pub fn session_open(&self) -> bool {
        self.last_alive
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|alive| alive.load(Ordering::SeqCst))
    }
}

struct StatusSession {
    tools: Vec<(String, u16)>,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl RemoteSession for StatusSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        Ok(self
            .tools
            .iter()
            .map(|(name, _)| ToolDescriptor {
                name: name.clone(),
                description: format!("remote {name}"),
                input_schema: serde_json::json!({"type": "object", "properties": {}}),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        _arguments: Map<String, Value>,
    ) -> Result<CallOutcome, TransportError> {
        let Some((_, status)) = self.tools.iter().find(|(n, _)| n == name) else {
            return Ok(CallOutcome::UnknownTool);
        };
        Ok(CallOutcome::Completed(RemoteCallResult {
            is_error: *status >= 400,
            content: vec![format!("{name} answered {status}")],
            structured_content: Some(serde_json::json!({ "status_code": status })),
        }))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SessionConnector for StatusConnector {
    async fn connect(&self) -> Result<Arc<dyn RemoteSession>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(AtomicBool::new(true));
        *self.last_alive.lock().unwrap() = Some(Arc::clone(&alive));
        Ok(Arc::new(StatusSession {
            tools: self.tools.clone(),
            alive,
        }))
    }
}
