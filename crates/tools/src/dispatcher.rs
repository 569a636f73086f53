//! Tool dispatcher: maps a model's tool request onto a capability.
//!
//! The registry is a closed set of four capabilities plus an explicit unknown
//! case. The dispatcher owns the working root and injects it into every call,
//! so the model can never choose the sandbox boundary. Every request yields
//! exactly one [`ToolResponseEnvelope`]; capability errors and panics are
//! converted into `{"error": ...}` payloads at this boundary.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sandpilot_core::error::ToolError;
use sandpilot_core::provider::ToolDefinition;
use sandpilot_core::tool::{ToolExecutor, ToolRequest, ToolResponseEnvelope, ToolResult};
use sandpilot_security::WorkingRoot;
use tracing::{debug, warn};

use crate::{ToolLimits, file_read, file_write, list_files, run_python};

/// The closed set of capabilities the model may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ListFiles,
    ReadFile,
    WriteFile,
    Execute,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::ListFiles,
        Capability::ReadFile,
        Capability::Execute,
        Capability::WriteFile,
    ];

    /// Look up a capability by its model-facing name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ListFiles => "get_files_info",
            Self::ReadFile => "get_file_content",
            Self::WriteFile => "write_file",
            Self::Execute => "run_python_file",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ListFiles => {
                "Lists files in the specified directory along with their sizes, constrained to the working directory."
            }
            Self::ReadFile => {
                "Reads the contents of a file, constrained to the working directory. Long files are truncated."
            }
            Self::WriteFile => {
                "Writes or overwrites a file, constrained to the working directory. Creates parent directories as needed."
            }
            Self::Execute => {
                "Executes a Python file with optional arguments, constrained to the working directory, and returns its output."
            }
        }
    }

    pub fn parameters_schema(self) -> serde_json::Value {
        match self {
            Self::ListFiles => list_files::parameters_schema(),
            Self::ReadFile => file_read::parameters_schema(),
            Self::WriteFile => file_write::parameters_schema(),
            Self::Execute => run_python::parameters_schema(),
        }
    }

    pub fn to_definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }

    /// Decode the model's arguments and run the capability against `root`.
    pub async fn invoke(
        self,
        root: &WorkingRoot,
        limits: &ToolLimits,
        arguments: serde_json::Value,
    ) -> ToolResult {
        match self {
            Self::ListFiles => list_files::run(root, parse_args(arguments)?).await,
            Self::ReadFile => file_read::run(root, limits, parse_args(arguments)?).await,
            Self::WriteFile => file_write::run(root, parse_args(arguments)?).await,
            Self::Execute => run_python::run(root, limits, parse_args(arguments)?).await,
        }
    }
}

fn parse_args<T: DeserializeOwned>(arguments: serde_json::Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Run a capability future on its own task so a panic becomes a `ToolError`.
async fn run_isolated<F>(fut: F) -> ToolResult
where
    F: Future<Output = ToolResult> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(join_err) => {
            let reason = match join_err.try_into_panic() {
                Ok(payload) => payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into()),
                Err(join_err) => join_err.to_string(),
            };
            Err(ToolError::Panicked(reason))
        }
    }
}

/// Stateless dispatcher over the capability set.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    root: WorkingRoot,
    limits: Arc<ToolLimits>,
}

impl ToolDispatcher {
    pub fn new(root: WorkingRoot, limits: ToolLimits) -> Self {
        Self {
            root,
            limits: Arc::new(limits),
        }
    }

    pub fn root(&self) -> &WorkingRoot {
        &self.root
    }

    pub fn limits(&self) -> &ToolLimits {
        &self.limits
    }

    /// Tool definitions for the model. None of them mention the root.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        Capability::ALL.iter().map(|c| c.to_definition()).collect()
    }

    /// Execute one request and wrap the outcome in an envelope.
    pub async fn dispatch(&self, request: &ToolRequest) -> ToolResponseEnvelope {
        let Some(capability) = Capability::from_name(&request.name) else {
            warn!(tool = %request.name, "Model requested unknown tool");
            return ToolResponseEnvelope::error(
                &request.id,
                &request.name,
                format!("Unknown function: {}", request.name),
            );
        };

        debug!(tool = %request.name, call_id = %request.id, "Dispatching tool call");
        let start = Instant::now();

        let root = self.root.clone();
        let limits = Arc::clone(&self.limits);
        let arguments = request.arguments.clone();
        let result =
            run_isolated(async move { capability.invoke(&root, &limits, arguments).await }).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(payload) => {
                debug!(tool = %request.name, duration_ms, "Tool call succeeded");
                ToolResponseEnvelope::result(&request.id, &request.name, payload)
            }
            Err(e) => {
                warn!(tool = %request.name, duration_ms, error = %e, "Tool call failed");
                ToolResponseEnvelope::error(
                    &request.id,
                    &request.name,
                    format!("Error while executing '{}': {e}", request.name),
                )
            }
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolDispatcher {
    fn definitions(&self) -> Vec<ToolDefinition> {
        ToolDispatcher::definitions(self)
    }

    async fn execute(&self, request: &ToolRequest) -> ToolResponseEnvelope {
        self.dispatch(request).await
    }
}
