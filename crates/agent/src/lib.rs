//! The agent loop: model call, tool dispatch, repeat.
//!
//! 1. **Send** the whole conversation to the model with the tool schema
//! 2. **If tool requests**: dispatch each in order, append the responses, go to 1
//! 3. **If text only**: stop with the final answer
//!
//! Every invocation is bounded by a step budget (`MAX_STEPS` model calls by
//! default). Running out of steps is an outcome, not an error.

pub mod loop_runner;
pub mod prompt;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{AgentError, AgentLoop, AgentOutcome, MAX_STEPS, StepCounter};
pub use prompt::SYSTEM_INSTRUCTION;
pub use stream_event::AgentEvent;
