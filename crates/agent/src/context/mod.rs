//! Prompt assembly for the execution loop.
//!
//! Each iteration's prompt is rebuilt from three parts:
//!
//! | Part | Source | Trim Strategy |
//! |------|--------|---------------|
//! | Task | caller query or test goal | Never trimmed |
//! | Tools | router descriptors | Never trimmed |
//! | History | execution steps | Oldest steps dropped past the window |

pub mod assembler;

pub use assembler::PromptAssembler;
