//! Agent patterns built on the execution loop.
//!
//! 1. **ReAct**: answer a query with tools until the LLM finishes
//! 2. **Test**: drive a system under test until a goal evaluator is satisfied
//!
//! Both hold their history behind an async mutex (one run at a time per
//! instance) and disconnect remote hosts at the end of every run.

pub mod react;
pub mod test_agent;

pub use react::{ReactAgent, default_conditions};
pub use test_agent::{TestAgent, TestRequest, test_conditions};

#[cfg(test)]
pub(crate) mod test_helpers;
