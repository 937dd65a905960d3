//! # Proctor Core
//!
//! Domain types, traits, and error definitions for the Proctor agent engine.
//! This crate has **zero framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here (`Tool`, `Generator`). Implementations live in
//! their respective crates, so tests can swap in scripted doubles and the
//! dependency graph points inward on core.

pub mod action;
pub mod agent;
pub mod error;
pub mod event;
pub mod generator;
pub mod step;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use action::{Action, ActionKind, action_schema};
pub use agent::LoopSettings;
pub use error::{Error, GenerationError, ResponseParseError, Result, ToolError, TransportError};
pub use event::{DomainEvent, EventBus};
pub use generator::{GeneratedOutput, GenerationRequest, Generator};
pub use step::{AgentResult, ExecutionStep, RunStatus};
pub use tool::{Tool, ToolCall, ToolDescriptor, ToolResult};
