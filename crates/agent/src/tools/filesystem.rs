//! TOOLKIT: File System Operations

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use warden_bus::{Event, EventBus, EventKind};

use super::workspace::resolve_in_workspace;
use super::{ToolCatalog, ToolDefinition, ToolError, ToolTrait};
use crate::context::{ToolCallContext, BUS_EXTENSION};

pub fn register(catalog: &mut ToolCatalog) {
    catalog.add(ToolDefinition::new(
        WriteFileTool::NAME,
        WriteFileTool::DESCRIPTION,
        WriteFileTool::schema(),
        |env| Ok(Arc::new(WriteFileTool::new(env.workspace.clone()))),
    ));
}

/// Writes a file inside the workspace and announces it on the bus
#[derive(Debug)]
pub struct WriteFileTool {
    workspace: PathBuf,
}

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

impl WriteFileTool {
    pub const NAME: &'static str = "write_file";
    pub const DESCRIPTION: &'static str =
        "Write content to a file in the workspace. Creates parent directories if needed.";

    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path relative to the workspace" },
                "content": { "type": "string", "description": "Content to write" }
            },
            "required": ["path", "content"]
        })
    }
}

#[async_trait]
impl ToolTrait for WriteFileTool {
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
        let args: WriteFileArgs = serde_json::from_value(args)?;
        let path = resolve_in_workspace(&args.path, &self.workspace)?;

        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
        debug!("◆ WRITING: {:?}", path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &args.content).await?;

        if let Some(bus) = ctx.extension::<EventBus>(BUS_EXTENSION) {
            let kind = if existed {
                EventKind::FileUpdated
            } else {
                EventKind::FileCreated
            };
            let mut event = Event::new(kind)
                .with_payload("path", path.display().to_string())
                .with_payload("bytes", args.content.len())
                .with_payload("call_id", &ctx.call_id);
            if let Some(session) = ctx.metadata.get("session_id").and_then(Value::as_str) {
                event = event.with_session(session);
            }
            bus.publish(event).await;
        }

        Ok(format!(
            "Wrote {} bytes to {}",
            args.content.len(),
            args.path
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_publishes_created_then_updated() {
        let dir = TempDir::new().unwrap();
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for kind in [EventKind::FileCreated, EventKind::FileUpdated] {
            let log = seen.clone();
            bus.subscribe_fn(kind, "record", move |e| {
                log.lock().unwrap().push(e.kind);
                Ok(())
            });
        }

        let tool = WriteFileTool::new(dir.path().to_path_buf());
        let ctx = ToolCallContext::new("c1", "write_file", json!({}))
            .with_extension(BUS_EXTENSION, Arc::new(bus));
        let args = json!({"path": "notes/todo.md", "content": "- ship"});

        let out = tool.execute(&ctx, args.clone()).await.unwrap();
        assert_eq!(out, "Wrote 6 bytes to notes/todo.md");
        tool.execute(&ctx, args).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes/todo.md")).unwrap(),
            "- ship"
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::FileCreated, EventKind::FileUpdated]
        );
    }

    #[tokio::test]
    async fn test_write_outside_workspace_fails() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFileTool::new(dir.path().to_path_buf());
        let ctx = ToolCallContext::new("c1", "write_file", json!({}));

        let err = tool
            .execute(&ctx, json!({"path": "../escape.txt", "content": "x"}))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("permission denied"));
    }
}
