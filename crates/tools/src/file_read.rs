//! File read tool: `get_file_content`.

use serde::Deserialize;
use sandpilot_core::error::ToolError;
use sandpilot_core::tool::ToolResult;
use sandpilot_security::WorkingRoot;
use tokio::io::AsyncReadExt;

use crate::{byte_budget, guard, truncate_chars, ToolLimits};

#[derive(Debug, Deserialize)]
pub struct ReadArgs {
    pub file_path: String,
}

pub fn parameters_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "file_path": {
                "type": "string",
                "description": "Path of the file to read, relative to the working directory."
            }
        },
        "required": ["file_path"]
    })
}

/// Read a file inside the root, capped at `limits.max_read_chars` characters.
pub async fn run(root: &WorkingRoot, limits: &ToolLimits, args: ReadArgs) -> ToolResult {
    let target = guard(root, &args.file_path)?;

    let meta = match tokio::fs::metadata(&target).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolError::NotFound {
                path: args.file_path,
            });
        }
        Err(e) => {
            return Err(ToolError::Io {
                path: args.file_path,
                reason: e.to_string(),
            });
        }
    };
    if !meta.is_file() {
        return Err(ToolError::NotAFile {
            path: args.file_path,
        });
    }

    let io_err = |e: std::io::Error| ToolError::Io {
        path: args.file_path.clone(),
        reason: e.to_string(),
    };
    let file = tokio::fs::File::open(&target).await.map_err(io_err)?;
    let mut bytes = Vec::new();
    file.take(byte_budget(limits.max_read_chars))
        .read_to_end(&mut bytes)
        .await
        .map_err(io_err)?;

    let mut content = String::from_utf8_lossy(&bytes).into_owned();
    if truncate_chars(&mut content, limits.max_read_chars) {
        tracing::debug!(path = %args.file_path, limit = limits.max_read_chars, "File content truncated");
        content.push_str(&format!(
            "[...File \"{}\" truncated at {} characters]",
            args.file_path, limits.max_read_chars
        ));
    }
    Ok(content)
}
