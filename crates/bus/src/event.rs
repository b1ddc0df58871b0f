//! Event records carried by the bus

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Named event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A connection completed its init handshake
    Initialized,
    FileCreated,
    FileUpdated,
    /// Generic error surfaced to observers
    Error,
    TaskStarted,
    TaskFinished,
    TaskFailed,
    /// A running task was interrupted without replacement
    TaskSuspended,
    ToolCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Initialized => "initialized",
            EventKind::FileCreated => "file_created",
            EventKind::FileUpdated => "file_updated",
            EventKind::Error => "error",
            EventKind::TaskStarted => "task_started",
            EventKind::TaskFinished => "task_finished",
            EventKind::TaskFailed => "task_failed",
            EventKind::TaskSuspended => "task_suspended",
            EventKind::ToolCompleted => "tool_completed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification raised by one component and observed by listeners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// Collaborator-defined payload
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    /// Originating session, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub timestamp: DateTime<Local>,
    #[serde(default)]
    stoppable: bool,
    #[serde(default)]
    stopped: bool,
}

impl Event {
    /// Create an event that always reaches every listener
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            payload: HashMap::new(),
            session_id: None,
            timestamp: Local::now(),
            stoppable: false,
            stopped: false,
        }
    }

    /// Create an event whose propagation a listener may stop
    pub fn stoppable(kind: EventKind) -> Self {
        Self {
            stoppable: true,
            ..Self::new(kind)
        }
    }

    /// Add payload data
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.payload.insert(key.into(), value);
        }
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Stop propagation to later listeners. No effect unless stoppable.
    pub fn stop(&mut self) {
        if self.stoppable {
            self.stopped = true;
        }
    }

    pub fn is_stoppable(&self) -> bool {
        self.stoppable
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Payload value as a string slice
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}
