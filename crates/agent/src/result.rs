//! Outcome of one tool call

use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_provider::Message;

/// Result handed back to the task loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time, serialized as fractional seconds
    #[serde(with = "secs_f64")]
    pub execution_time: Duration,
    pub tool_call_id: String,
    pub name: String,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            ok: true,
            content: content.into(),
            error: None,
            execution_time: Duration::ZERO,
            tool_call_id: String::new(),
            name: String::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let mut result = Self::success(String::new());
        result.set_error(error);
        result
    }

    /// Mark as failed; content is cleared
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.ok = false;
        self.content.clear();
        self.error = Some(error.into());
    }

    /// Stamp the tool name and originating call id
    pub fn stamped(mut self, name: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        self.name = name.into();
        self.tool_call_id = tool_call_id.into();
        self
    }

    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time = elapsed;
        self
    }

    /// Transcript entry for the model
    pub fn to_message(&self) -> Message {
        let text = if self.ok {
            self.content.clone()
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("unknown error"))
        };
        Message::tool(&self.tool_call_id, &self.name, text)
    }
}

mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
