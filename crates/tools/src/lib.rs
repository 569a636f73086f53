//! Sandboxed tool implementations for SandPilot.
//!
//! Four capabilities give the agent the ability to act on its working
//! directory: list a directory, read a file, write a file, and run a Python
//! script. Every capability takes the [`WorkingRoot`] as an explicit
//! parameter and resolves paths through the sandbox guard before touching the
//! filesystem. The root is never part of the model-visible schema.
//!
//! The [`ToolDispatcher`] maps a model's tool request onto one of these
//! capabilities and normalizes every outcome into a response envelope.

pub mod dispatcher;
pub mod file_read;
pub mod file_write;
pub mod list_files;
pub mod run_python;

use std::path::PathBuf;
use std::time::Duration;

use sandpilot_core::error::ToolError;
use sandpilot_security::{SandboxError, WorkingRoot};

pub use dispatcher::{Capability, ToolDispatcher};

/// Resource limits shared by all capabilities.
#[derive(Debug, Clone)]
pub struct ToolLimits {
    /// Character cap on file contents and process output
    pub max_read_chars: usize,

    /// Wall-clock limit for script execution
    pub exec_timeout: Duration,

    /// Interpreter used to run scripts
    pub python_interpreter: String,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            max_read_chars: 10_000,
            exec_timeout: Duration::from_secs(30),
            python_interpreter: "python3".into(),
        }
    }
}

/// Resolve a model-supplied path inside the root, mapping guard failures to
/// tool errors.
pub(crate) fn guard(root: &WorkingRoot, path: &str) -> Result<PathBuf, ToolError> {
    sandpilot_security::resolve(root, path).map_err(|e| match e {
        SandboxError::OutsideRoot { path } => ToolError::SandboxViolation { path },
        other => ToolError::Io {
            path: path.to_string(),
            reason: other.to_string(),
        },
    })
}

/// Bytes to read so that more than `max_chars` characters can still be seen.
///
/// A UTF-8 character is at most four bytes, so anything past this many bytes
/// is guaranteed to be cut by [`truncate_chars`].
pub(crate) fn byte_budget(max_chars: usize) -> u64 {
    (max_chars as u64).saturating_mul(4).saturating_add(1)
}

/// Cut `text` to at most `max` characters. Returns whether anything was cut.
pub(crate) fn truncate_chars(text: &mut String, max: usize) -> bool {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => {
            text.truncate(byte_idx);
            true
        }
        None => false,
    }
}
