//! LLM generator implementations for Proctor.
//!
//! All generators implement the `proctor_core::Generator` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatGenerator;
