//! Seam between a session and the code that runs a task

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use warden_bus::{ContextType, Event, EventBus, EventKind, Outbound, ServerMessage};
use warden_provider::Message;

/// Error a task body may return
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// Everything a task needs to know about the message that started it
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task_id: u64,
    pub session_id: String,
    pub message_id: String,
    pub prompt: String,
    pub attachments: Vec<Value>,
    pub task_mode: Option<String>,
    pub context_type: ContextType,
    /// Prior turns; empty for a normal chat
    pub history: Vec<Message>,
}

/// Result of a task that ran to completion
#[derive(Debug, Clone, Default)]
pub struct TaskOutcome {
    pub reply: Option<String>,
    /// Turns to append to the session history
    pub transcript: Vec<Message>,
}

impl TaskOutcome {
    pub fn reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            transcript: Vec::new(),
        }
    }

    pub fn with_transcript(mut self, transcript: Vec<Message>) -> Self {
        self.transcript = transcript;
        self
    }
}

/// Handles a running task receives from its session
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: u64,
    pub session_id: String,
    pub message_id: String,
    /// Cancellation is advisory; task code checks it at its own await points
    pub cancel: CancellationToken,
    pub bus: EventBus,
    pub outbound: Outbound,
}

impl TaskContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Notify the client
    pub fn notify(&self, kind: EventKind, data: Value) -> bool {
        self.outbound.send(ServerMessage::event(
            kind,
            Some(self.message_id.clone()),
            Some(self.task_id),
            data,
        ))
    }

    /// Publish on the bus, tagged with this session
    pub async fn publish(&self, event: Event) -> Event {
        self.bus
            .publish(event.with_session(self.session_id.clone()))
            .await
    }
}

/// Body of a task
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, request: TaskRequest, ctx: TaskContext) -> Result<TaskOutcome, TaskError>;
}
