//! Loop budgets shared by every agent variant.

use serde::{Deserialize, Serialize};

use crate::tool::DEFAULT_MAX_RESULT_CHARS;

/// Budgets and limits for one execution loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSettings {
    /// Maximum iterations per invocation
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Number of most recent steps rendered into each prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Failsafe: abort once tool executions exceed `max_iterations * multiplier`
    #[serde(default = "default_tool_call_multiplier")]
    pub tool_call_multiplier: usize,

    /// Wall-clock budget, checked at iteration boundaries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Explicit tool-execution stopping condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_executions: Option<usize>,

    /// Character limit for each tool result fed back to the LLM
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
}

fn default_max_iterations() -> usize {
    10
}
fn default_history_window() -> usize {
    20
}
fn default_tool_call_multiplier() -> usize {
    3
}
fn default_max_result_chars() -> usize {
    DEFAULT_MAX_RESULT_CHARS
}

impl LoopSettings {
    /// The failsafe ceiling on tool executions for one invocation.
    pub fn tool_call_ceiling(&self) -> usize {
        self.tool_call_ceiling_for(self.max_iterations)
    }

    /// The failsafe ceiling when the run's iteration budget is `max_iterations`.
    pub fn tool_call_ceiling_for(&self, max_iterations: usize) -> usize {
        max_iterations.saturating_mul(self.tool_call_multiplier)
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_window: default_history_window(),
            tool_call_multiplier: default_tool_call_multiplier(),
            timeout_secs: None,
            max_tool_executions: None,
            max_result_chars: default_max_result_chars(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_constants() {
        let settings = LoopSettings::default();
        assert_eq!(settings.history_window, 20);
        assert_eq!(settings.tool_call_multiplier, 3);
        assert_eq!(settings.tool_call_ceiling(), 30);
        assert_eq!(settings.tool_call_ceiling_for(15), 45);
        assert!(settings.timeout_secs.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let settings: LoopSettings = serde_json::from_str(r#"{"max_iterations": 5}"#).unwrap();
        assert_eq!(settings.max_iterations, 5);
        assert_eq!(settings.tool_call_ceiling(), 15);
        assert_eq!(settings.max_result_chars, DEFAULT_MAX_RESULT_CHARS);
    }
}
