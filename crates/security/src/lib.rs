//! Security module for SandPilot: filesystem containment.
//!
//! Provides:
//! - **WorkingRoot**: the canonical directory every tool is confined to
//! - **Path resolution**: resolve a model-supplied relative path and reject
//!   anything that escapes the root, following symlinks first

pub mod path;

pub use path::{resolve, SandboxError, WorkingRoot};
