//! Tool request/response types: the contract between the model and the
//! tool dispatcher.
//!
//! The model emits a [`ToolRequest`]; the dispatcher answers with exactly one
//! [`ToolResponseEnvelope`]. The envelope's `response` object is what goes
//! back over the wire, and it must carry either a `"result"` or an `"error"`
//! key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Outcome of a single capability invocation.
pub type ToolResult = std::result::Result<String, ToolError>;

/// A request to execute a tool, produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Call ID. Providers that don't assign one get a locally generated UUID.
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolRequest {
    /// Create a request with a freshly generated call ID.
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// Typed view of an envelope's response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolResponse<'a> {
    Result(&'a str),
    Error(&'a str),
}

impl ToolResponse<'_> {
    pub fn text(&self) -> &str {
        match self {
            Self::Result(s) | Self::Error(s) => s,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// The unit appended back into the conversation, one per [`ToolRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponseEnvelope {
    /// The call ID this response answers
    pub call_id: String,

    /// Name of the tool that was requested (echoed even if unknown)
    pub tool_name: String,

    /// Wire payload: `{"result": ...}` or `{"error": ...}`
    pub response: serde_json::Map<String, serde_json::Value>,
}

impl ToolResponseEnvelope {
    /// Build a success envelope.
    pub fn result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::with_key(call_id, tool_name, "result", payload.into())
    }

    /// Build an error envelope.
    pub fn error(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::with_key(call_id, tool_name, "error", message.into())
    }

    fn with_key(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        key: &str,
        text: String,
    ) -> Self {
        let mut response = serde_json::Map::new();
        response.insert(key.to_string(), serde_json::Value::String(text));
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            response,
        }
    }

    /// Typed view of the payload. `None` means the envelope carries neither a
    /// string `"result"` nor a string `"error"`, which is a protocol violation.
    pub fn outcome(&self) -> Option<ToolResponse<'_>> {
        if let Some(text) = self.response.get("result").and_then(|v| v.as_str()) {
            return Some(ToolResponse::Result(text));
        }
        self.response
            .get("error")
            .and_then(|v| v.as_str())
            .map(ToolResponse::Error)
    }

    /// The payload rendered as compact JSON (used for verbose tracing).
    pub fn raw_payload(&self) -> String {
        serde_json::Value::Object(self.response.clone()).to_string()
    }
}

/// Anything that can answer tool requests on the agent's behalf.
///
/// Implementations must be total: every request yields exactly one envelope
/// and no failure escapes as a panic or an `Err`.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tool definitions to declare to the model.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute one request.
    async fn execute(&self, request: &ToolRequest) -> ToolResponseEnvelope;
}
