//! Agent-level progress events.
//!
//! `AgentEvent` describes what the loop is doing step by step. The CLI turns
//! these into its verbose and non-verbose output; nothing in the loop prints.

use sandpilot_core::tool::{ToolRequest, ToolResponseEnvelope};
use serde::{Deserialize, Serialize};

/// Events emitted by the agent while running one invocation.
///
/// - `step_started`: a model call is about to be made
/// - `model_text`: the model produced text alongside (or instead of) calls
/// - `tool_call`: the agent is dispatching a tool request
/// - `tool_response`: the dispatcher answered
/// - `finished`: the loop stopped
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StepStarted { step: u32 },

    ModelText { step: u32, text: String },

    ToolCall { step: u32, request: ToolRequest },

    ToolResponse {
        step: u32,
        envelope: ToolResponseEnvelope,
    },

    /// `completed` is false when the step budget ran out.
    Finished { steps: u32, completed: bool },
}

impl AgentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StepStarted { .. } => "step_started",
            Self::ModelText { .. } => "model_text",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResponse { .. } => "tool_response",
            Self::Finished { .. } => "finished",
        }
    }
}
