//! Script execution tool: `run_python_file`.
//!
//! Runs a `.py` file inside the root with the configured interpreter, under a
//! wall-clock timeout. The child is killed when the timeout fires. A non-zero
//! exit code is reported in the payload; only a failed spawn or a timeout is
//! an error.

use std::process::{ExitStatus, Stdio};

use serde::Deserialize;
use sandpilot_core::error::ToolError;
use sandpilot_core::tool::ToolResult;
use sandpilot_security::WorkingRoot;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::{byte_budget, guard, truncate_chars, ToolLimits};

const SCRIPT_EXTENSION: &str = "py";

#[derive(Debug, Deserialize)]
pub struct RunArgs {
    pub file_path: String,
    #[serde(default)]
    pub args: Vec<String>,
}

pub fn parameters_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "file_path": {
                "type": "string",
                "description": "Path of the Python file to execute, relative to the working directory."
            },
            "args": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Optional command-line arguments passed to the script."
            }
        },
        "required": ["file_path"]
    })
}

pub async fn run(root: &WorkingRoot, limits: &ToolLimits, args: RunArgs) -> ToolResult {
    let target = guard(root, &args.file_path)?;

    let is_file = tokio::fs::metadata(&target)
        .await
        .is_ok_and(|m| m.is_file());
    if !is_file {
        return Err(ToolError::NotFound {
            path: args.file_path,
        });
    }
    if target.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
        return Err(ToolError::InvalidExtension {
            path: args.file_path,
            expected: "Python".into(),
        });
    }

    debug!(
        path = %args.file_path,
        interpreter = %limits.python_interpreter,
        argc = args.args.len(),
        "Executing script"
    );

    let mut child = Command::new(&limits.python_interpreter)
        .arg(&target)
        .args(&args.args)
        .current_dir(root.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolError::SpawnFailed {
            path: args.file_path.clone(),
            reason: e.to_string(),
        })?;

    let cap = byte_budget(limits.max_read_chars);
    let waited = tokio::time::timeout(limits.exec_timeout, collect_output(&mut child, cap)).await;
    let output = match waited {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ToolError::Io {
                path: args.file_path,
                reason: e.to_string(),
            });
        }
        Err(_) => {
            let _ = child.start_kill();
            warn!(
                path = %args.file_path,
                timeout_secs = limits.exec_timeout.as_secs(),
                "Script timed out and was killed"
            );
            return Err(ToolError::Timeout {
                path: args.file_path,
                timeout_secs: limits.exec_timeout.as_secs(),
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut sections = Vec::new();
    if !stdout.is_empty() {
        sections.push(format!("STDOUT:\n{stdout}"));
    }
    if !stderr.is_empty() {
        sections.push(format!("STDERR:\n{stderr}"));
    }
    match output.status.code() {
        Some(0) => {}
        Some(code) => sections.push(format!("Process exited with code {code}")),
        None => sections.push("Process terminated by a signal".into()),
    }

    let mut report = if sections.is_empty() {
        "No output produced.".to_string()
    } else {
        sections.join("\n")
    };
    if truncate_chars(&mut report, limits.max_read_chars) {
        report.push_str(&format!(
            "\n[...output truncated at {} characters]",
            limits.max_read_chars
        ));
    }
    Ok(report)
}

struct CapturedOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Read both pipes concurrently, keeping at most `cap` bytes of each, then
/// wait for the child to exit.
async fn collect_output(child: &mut Child, cap: u64) -> std::io::Result<CapturedOutput> {
    let (stdout, stderr) = tokio::try_join!(
        read_capped(child.stdout.take(), cap),
        read_capped(child.stderr.take(), cap)
    )?;
    let status = child.wait().await?;
    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
    })
}

/// Keep the first `cap` bytes and discard the rest so the child never blocks
/// on a full pipe.
async fn read_capped<R>(reader: Option<R>, cap: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };
    let mut kept = Vec::new();
    (&mut reader).take(cap).read_to_end(&mut kept).await?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(kept)
}
