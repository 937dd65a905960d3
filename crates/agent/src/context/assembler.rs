//! Renders tool listings and execution history into an iteration prompt.
//!
//! # Determinism
//!
//! Assembly is deterministic: identical inputs always produce identical
//! prompts. Step timestamps are never rendered.

use proctor_core::step::ExecutionStep;
use proctor_core::tool::ToolDescriptor;
use serde_json::Value;
use std::fmt::Write;

/// Default number of recent steps kept in each prompt.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Builds iteration prompts with a bounded history window.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    history_window: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl PromptAssembler {
    pub fn new(history_window: usize) -> Self {
        Self { history_window }
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Human-readable documentation for every tool.
    ///
    /// Rendered once per run; descriptors do not change mid-run.
    pub fn render_tools(tools: &[ToolDescriptor]) -> String {
        if tools.is_empty() {
            return "No tools are available.".to_string();
        }

        let mut out = String::new();
        for tool in tools {
            let _ = writeln!(out, "### {}", tool.name);
            if !tool.description.trim().is_empty() {
                let _ = writeln!(out, "{}", tool.description.trim());
            }
            let params = tool.parameters();
            if params.is_empty() {
                let _ = writeln!(out, "Parameters: none");
            } else {
                let _ = writeln!(out, "Parameters:");
                for (name, schema) in params {
                    let kind = schema.get("type").and_then(Value::as_str).unwrap_or("any");
                    let required = if tool.is_required(name) {
                        "required"
                    } else {
                        "optional"
                    };
                    let description = schema
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if description.is_empty() {
                        let _ = writeln!(out, "- `{name}` ({kind}, {required})");
                    } else {
                        let _ = writeln!(out, "- `{name}` ({kind}, {required}): {description}");
                    }
                }
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }

    /// One step as Thought / Action / Observation text.
    pub fn render_step(step: &ExecutionStep) -> String {
        let mut out = format!("## Step {}\n", step.iteration);
        if !step.reasoning.is_empty() {
            let _ = writeln!(out, "Thought: {}", step.reasoning);
        }
        let _ = writeln!(out, "Action: {}", step.action);

        for (i, call) in step.tool_calls.iter().enumerate() {
            let args = Value::Object(call.arguments.clone());
            let _ = writeln!(out, "- Call `{}` with {args}", call.tool_name);
            match step.tool_results.get(i) {
                Some(result) => {
                    let status = if result.success { "ok" } else { "failed" };
                    let _ = writeln!(out, "  Observation ({status}): {}", result.observation());
                }
                None => {
                    let _ = writeln!(out, "  Observation: not executed");
                }
            }
        }
        if let Some(answer) = &step.final_answer {
            let _ = writeln!(out, "Final answer: {answer}");
        }
        if let Some(error) = &step.error {
            let _ = writeln!(out, "Error: {error}");
        }
        out.trim_end().to_string()
    }

    /// Every step, unbounded. Used for transcripts the evaluator judges.
    pub fn render_steps(history: &[ExecutionStep]) -> String {
        if history.is_empty() {
            return "No steps taken yet.".to_string();
        }
        history
            .iter()
            .map(Self::render_step)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The last `history_window` steps, preceded by an omission marker when
    /// older steps were dropped.
    pub fn render_history(&self, history: &[ExecutionStep]) -> String {
        if history.len() <= self.history_window {
            return Self::render_steps(history);
        }
        let omitted = history.len() - self.history_window;
        let noun = if omitted == 1 { "step" } else { "steps" };
        format!(
            "... {omitted} earlier {noun} omitted ...\n\n{}",
            Self::render_steps(&history[omitted..])
        )
    }

    /// The full prompt for one iteration.
    pub fn assemble(&self, task: &str, tool_listing: &str, history: &[ExecutionStep]) -> String {
        format!(
            "# Task\n{task}\n\n\
             # Available Tools\n{tool_listing}\n\n\
             # Previous Steps\n{}\n\n\
             # Next Action\n\
             Decide what to do next. Use `call_tool` with one or more tool calls to gather \
             information or act, or `finish` with a final answer once the task is complete.",
            self.render_history(history)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proctor_core::action::ActionKind;
    use proctor_core::tool::{ToolCall, ToolResult};

    fn tool_step(iteration: usize) -> ExecutionStep {
        ExecutionStep {
            iteration,
            reasoning: format!("thinking {iteration}"),
            action: ActionKind::CallTool,
            tool_calls: vec![ToolCall::new("search", serde_json::json!({"q": "rust"}))],
            tool_results: vec![ToolResult::success("search", "found it")],
            final_answer: None,
            error: None,
            started_at: Utc::now(),
            duration_ms: 3,
        }
    }

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "search".into(),
            description: "Search the web".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "q": {"type": "string", "description": "Query text"},
                    "limit": {"type": "integer"}
                },
                "required": ["q"]
            }),
        }
    }

    #[test]
    fn renders_tool_parameters() {
        let listing = PromptAssembler::render_tools(&[descriptor()]);
        assert!(listing.contains("### search"));
        assert!(listing.contains("- `q` (string, required): Query text"));
        assert!(listing.contains("- `limit` (integer, optional)"));
    }

    #[test]
    fn empty_tool_list_is_explicit() {
        assert_eq!(PromptAssembler::render_tools(&[]), "No tools are available.");
    }

    #[test]
    fn renders_observations_and_failures() {
        let mut step = tool_step(1);
        step.tool_calls.push(ToolCall::new("missing", serde_json::json!({})));
        step.tool_results.push(ToolResult::not_found("missing"));
        let text = PromptAssembler::render_step(&step);
        assert!(text.starts_with("## Step 1"));
        assert!(text.contains("Thought: thinking 1"));
        assert!(text.contains("Observation (ok): found it"));
        assert!(text.contains("Observation (failed): Error: Tool 'missing' not found"));
    }

    #[test]
    fn history_within_window_has_no_marker() {
        let assembler = PromptAssembler::new(3);
        let history: Vec<_> = (1..=3).map(tool_step).collect();
        let text = assembler.render_history(&history);
        assert!(!text.contains("omitted"));
        assert!(text.contains("## Step 1"));
    }

    #[test]
    fn history_beyond_window_keeps_latest_with_one_marker() {
        let assembler = PromptAssembler::new(2);
        let history: Vec<_> = (1..=5).map(tool_step).collect();
        let text = assembler.render_history(&history);
        assert!(text.starts_with("... 3 earlier steps omitted ..."));
        assert_eq!(text.matches("omitted").count(), 1);
        assert!(!text.contains("## Step 3"));
        assert!(text.contains("## Step 4"));
        assert!(text.contains("## Step 5"));
    }

    #[test]
    fn single_omitted_step_is_singular() {
        let assembler = PromptAssembler::new(1);
        let history: Vec<_> = (1..=2).map(tool_step).collect();
        assert!(
            assembler
                .render_history(&history)
                .starts_with("... 1 earlier step omitted ...")
        );
    }

    #[test]
    fn assemble_is_deterministic() {
        let assembler = PromptAssembler::default();
        let history = vec![tool_step(1)];
        let tools = PromptAssembler::render_tools(&[descriptor()]);
        let a = assembler.assemble("find rust", &tools, &history);
        let b = assembler.assemble("find rust", &tools, &history);
        assert_eq!(a, b);
        assert!(a.starts_with("# Task\nfind rust"));
        assert!(!a.contains("No tools"));
    }

    #[test]
    fn empty_history_is_explicit() {
        let text = PromptAssembler::default().assemble("t", "No tools are available.", &[]);
        assert!(text.contains("No steps taken yet."));
    }
}
