//! File write tool: `write_file`.

use serde::Deserialize;
use sandpilot_core::error::ToolError;
use sandpilot_core::tool::ToolResult;
use sandpilot_security::WorkingRoot;

use crate::guard;

#[derive(Debug, Deserialize)]
pub struct WriteArgs {
    pub file_path: String,
    pub content: String,
}

pub fn parameters_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "file_path": {
                "type": "string",
                "description": "Path of the file to write, relative to the working directory. Missing parent directories are created."
            },
            "content": {
                "type": "string",
                "description": "The full content to write. Existing files are overwritten."
            }
        },
        "required": ["file_path", "content"]
    })
}

/// Create or overwrite a file inside the root.
pub async fn run(root: &WorkingRoot, args: WriteArgs) -> ToolResult {
    // Resolve before any mutation so escaping paths never create directories
    let target = guard(root, &args.file_path)?;

    if tokio::fs::metadata(&target)
        .await
        .is_ok_and(|m| m.is_dir())
    {
        return Err(ToolError::NotAFile {
            path: args.file_path,
        });
    }

    let io_err = |e: std::io::Error| ToolError::Io {
        path: args.file_path.clone(),
        reason: e.to_string(),
    };

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(&target, args.content.as_bytes())
        .await
        .map_err(io_err)?;

    let written = args.content.chars().count();
    tracing::debug!(path = %args.file_path, chars = written, "Wrote file");
    Ok(format!(
        "Successfully wrote to \"{}\" ({written} characters written)",
        args.file_path
    ))
}
