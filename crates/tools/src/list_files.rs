//! Directory listing tool: `get_files_info`.

use serde::Deserialize;
use sandpilot_core::error::ToolError;
use sandpilot_core::tool::ToolResult;
use sandpilot_security::WorkingRoot;

use crate::guard;

#[derive(Debug, Deserialize)]
pub struct ListArgs {
    #[serde(default = "default_directory")]
    pub directory: String,
}

fn default_directory() -> String {
    ".".into()
}

pub fn parameters_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "directory": {
                "type": "string",
                "description": "The directory to list files from, relative to the working directory. If not provided, lists files in the working directory itself."
            }
        }
    })
}

/// List a directory, one line per entry, sorted by name.
pub async fn run(root: &WorkingRoot, args: ListArgs) -> ToolResult {
    let target = guard(root, &args.directory)?;

    let is_dir = tokio::fs::metadata(&target)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(ToolError::NotADirectory {
            path: args.directory,
        });
    }

    let io_err = |e: std::io::Error| ToolError::Io {
        path: args.directory.clone(),
        reason: e.to_string(),
    };

    let mut reader = tokio::fs::read_dir(&target).await.map_err(io_err)?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(io_err)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        // metadata() follows symlinks, so a link to a directory reports is_dir=true
        let line = match tokio::fs::metadata(entry.path()).await {
            Ok(meta) => format!(
                "- {name}: file_size={} bytes, is_dir={}",
                meta.len(),
                meta.is_dir()
            ),
            Err(e) => format!("- {name}: Error retrieving info: {e}"),
        };
        entries.push((name, line));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    tracing::debug!(directory = %args.directory, count = entries.len(), "Listed directory");

    Ok(entries
        .into_iter()
        .map(|(_, line)| line)
        .collect::<Vec<_>>()
        .join("\n"))
}
