//! Language model provider implementations for SandPilot.
//!
//! All providers implement the `sandpilot_core::Provider` trait. The agent
//! loop only ever sees the trait object.

pub mod gemini;

pub use gemini::GeminiProvider;
