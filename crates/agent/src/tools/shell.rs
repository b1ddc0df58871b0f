//! TOOLKIT: Terminal Operations

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::workspace::resolve_in_workspace;
use super::{ToolCatalog, ToolDefinition, ToolError, ToolTrait};
use crate::context::ToolCallContext;

const MAX_OUTPUT: usize = 10_000;

pub fn register(catalog: &mut ToolCatalog) {
    catalog.add(ToolDefinition::new(
        ExecTool::NAME,
        ExecTool::DESCRIPTION,
        ExecTool::schema(),
        |env| {
            Ok(Arc::new(ExecTool::new(
                env.exec_timeout,
                env.workspace.clone(),
            )))
        },
    ));
}

/// Runs a shell command inside the workspace
#[derive(Debug)]
pub struct ExecTool {
    timeout: Duration,
    workspace: PathBuf,
}

#[derive(Deserialize)]
struct ExecArgs {
    command: String,
    working_dir: Option<String>,
}

impl ExecTool {
    pub const NAME: &'static str = "exec";
    pub const DESCRIPTION: &'static str = "Execute a shell command in the workspace.";

    pub fn new(timeout: Duration, workspace: PathBuf) -> Self {
        Self { timeout, workspace }
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command" },
                "working_dir": { "type": "string", "description": "Directory relative to the workspace" }
            },
            "required": ["command"]
        })
    }
}

#[async_trait]
impl ToolTrait for ExecTool {
    fn name(&self) -> &str {
        Self::NAME
    }
    fn description(&self) -> &str {
        Self::DESCRIPTION
    }
    fn parameters(&self) -> Value {
        Self::schema()
    }
    async fn execute(&self, ctx: &ToolCallContext, args: Value) -> Result<String, ToolError> {
        let args: ExecArgs = serde_json::from_value(args)?;

        let working_dir = match args.working_dir.as_deref() {
            Some(dir) => resolve_in_workspace(dir, &self.workspace)?,
            None => self.workspace.clone(),
        };

        debug!("◆ EXECUTING: {}", args.command);
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&args.command)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::select! {
            result = tokio::time::timeout(self.timeout, cmd.output()) => match result {
                Ok(output) => output?,
                Err(_) => {
                    return Err(format!("command timed out after {} seconds", self.timeout.as_secs()).into())
                }
            },
            _ = ctx.cancellation.cancelled() => return Err("command cancelled".into()),
        };

        let mut parts = Vec::new();
        if !output.stdout.is_empty() {
            parts.push(String::from_utf8_lossy(&output.stdout).to_string());
        }
        if !output.stderr.is_empty() {
            parts.push(format!("STDERR:\n{}", String::from_utf8_lossy(&output.stderr)));
        }
        if output.status.code() != Some(0) {
            parts.push(format!("EXIT CODE: {}", output.status.code().unwrap_or(-1)));
        }
        let result = if parts.is_empty() {
            "(NO OUTPUT)".to_string()
        } else {
            parts.join("\n")
        };

        if result.len() > MAX_OUTPUT {
            let mut cut = MAX_OUTPUT;
            while !result.is_char_boundary(cut) {
                cut -= 1;
            }
            Ok(format!(
                "{}\n◆ OUTPUT TRUNCATED: {} BYTES REMAINING",
                &result[..cut],
                result.len() - cut
            ))
        } else {
            Ok(result)
        }
    }
}
