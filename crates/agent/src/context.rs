//! Per-call execution context

use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use warden_provider::ToolCall;

/// Extension name under which the task's event bus is attached
pub const BUS_EXTENSION: &str = "bus";

type Extension = Arc<dyn Any + Send + Sync>;

/// Everything a tool sees about the call it is serving
#[derive(Clone)]
pub struct ToolCallContext {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub metadata: HashMap<String, Value>,
    extensions: HashMap<String, Extension>,
    /// Advisory; tools check it at their own await points
    pub cancellation: CancellationToken,
    pub timeout: Option<Duration>,
}

impl ToolCallContext {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
            metadata: HashMap::new(),
            extensions: HashMap::new(),
            cancellation: CancellationToken::new(),
            timeout: None,
        }
    }

    pub fn from_call(call: &ToolCall) -> Self {
        Self::new(&call.id, &call.name, call.arguments.clone())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach a shared object tools can look up by name
    pub fn with_extension<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: Arc<T>) -> Self {
        self.extensions.insert(name.into(), value);
        self
    }

    /// Typed extension lookup; `None` if absent or of another type
    pub fn extension<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.extensions
            .get(name)
            .and_then(|ext| ext.clone().downcast::<T>().ok())
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl std::fmt::Debug for ToolCallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&String> = self.extensions.keys().collect();
        extensions.sort();
        f.debug_struct("ToolCallContext")
            .field("call_id", &self.call_id)
            .field("tool_name", &self.tool_name)
            .field("arguments", &self.arguments)
            .field("metadata", &self.metadata)
            .field("extensions", &extensions)
            .field("timeout", &self.timeout)
            .finish()
    }
}
