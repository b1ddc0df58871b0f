//! TOOLKIT: Basic tools

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{ToolCatalog, ToolDefinition, ToolError, ToolTrait};
use crate::context::ToolCallContext;

pub fn register(catalog: &mut ToolCatalog) {
    catalog.add(ToolDefinition::from_tool(Arc::new(EchoTool)));
    catalog.add(ToolDefinition::new(
        SleepTool::NAME,
        SleepTool::DESCRIPTION,
        SleepTool::schema(),
        |_| Ok(Arc::new(SleepTool::default())),
    ));
}

/// Returns its input
#[derive(Debug, Default)]
pub struct EchoTool;

#[derive(Deserialize)]
struct EchoArgs {
    text: String,
    #[serde(default)]
    repeat: Option<u64>,
}

#[async_trait]
impl ToolTrait for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echo the given text back."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to echo" },
                "repeat": { "type": "integer", "description": "Times to repeat the text", "default": 1 }
            },
            "required": ["text"]
        })
    }
    async fn execute(&self, _ctx: &ToolCallContext, args: Value) -> Result<String, ToolError> {
        let args: EchoArgs = serde_json::from_value(args)?;
        let repeat = args.repeat.unwrap_or(1).clamp(1, 100) as usize;
        Ok(vec![args.text; repeat].join("\n"))
    }
}

/// Waits, honouring cancellation
#[derive(Debug)]
pub struct SleepTool {
    max_seconds: f64,
}

impl Default for SleepTool {
    fn default() -> Self {
        Self { max_seconds: 600.0 }
    }
}

#[derive(Deserialize)]
struct SleepArgs {
    seconds: f64,
}

impl SleepTool {
    pub const NAME: &'static str = "sleep";
    pub const DESCRIPTION: &'static str = "Wait for the given number of seconds.";

    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "seconds": { "type": "number", "description": "Seconds to wait" }
            },
            "required": ["seconds"]
        })
    }
}

#[async_trait]
impl ToolTrait for SleepTool {
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
        let args: SleepArgs = serde_json::from_value(args)?;
        if !(0.0..=self.max_seconds).contains(&args.seconds) {
            return Err(format!(
                "invalid value for seconds: must be between 0 and {}",
                self.max_seconds
            )
            .into());
        }

        debug!("◆ SLEEPING {}s", args.seconds);
        let wait = Duration::from_secs_f64(args.seconds);
        tokio::select! {
            _ = tokio::time::sleep(wait) => Ok(format!("Slept {} seconds", args.seconds)),
            _ = ctx.cancellation.cancelled() => Err("sleep interrupted by cancellation".into()),
        }
    }
}
