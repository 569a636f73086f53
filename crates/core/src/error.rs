//! Error types for the SandPilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

// --- Bounded context errors ---

/// Failures of the external model call. All of these are step-fatal.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Tool-local failures. These never stop the agent loop: the dispatcher
/// turns every variant into an `{"error": ...}` envelope for the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Cannot access \"{path}\" as it is outside the permitted working directory")]
    SandboxViolation { path: String },

    #[error("File \"{path}\" not found")]
    NotFound { path: String },

    #[error("\"{path}\" is not a directory")]
    NotADirectory { path: String },

    #[error("\"{path}\" is not a regular file")]
    NotAFile { path: String },

    #[error("\"{path}\" is not a {expected} file")]
    InvalidExtension { path: String, expected: String },

    #[error("Execution of \"{path}\" timed out after {timeout_secs}s")]
    Timeout { path: String, timeout_secs: u64 },

    #[error("Failed to start process for \"{path}\": {reason}")]
    SpawnFailed { path: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("I/O error on \"{path}\": {reason}")]
    Io { path: String, reason: String },

    #[error("Tool panicked: {0}")]
    Panicked(String),
}
