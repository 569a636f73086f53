//! # SandPilot Core
//!
//! Domain types, traits, and error definitions for the SandPilot coding agent.
//! This crate defines the conversation model, the tool request/response
//! envelope, and the `Provider` abstraction that the other crates implement
//! against.
//!
//! ## Design Philosophy
//!
//! - The model backend is a trait here, implemented in `sandpilot-providers`.
//! - Tools never see the conversation; they only consume a [`ToolRequest`]
//!   and produce a [`ToolResponseEnvelope`].
//! - The conversation is an append-only log of [`Turn`]s.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Part, Role, Turn};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{ToolExecutor, ToolRequest, ToolResponse, ToolResponseEnvelope, ToolResult};
