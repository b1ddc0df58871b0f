//! Wire envelopes exchanged over a client connection

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::event::EventKind;

/// Malformed or unknown inbound message
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message has no type")]
    MissingType,

    #[error("unknown message type '{0}'")]
    UnknownType(String),
}

/// How a chat message relates to the task already running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    /// Start over with a fresh conversation
    #[default]
    Normal,
    /// Continue the current conversation
    FollowUp,
    /// Cancel the running task without starting another
    Interrupt,
}

/// User chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub attachments: Vec<Value>,
    #[serde(default)]
    pub context_type: ContextType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_mode: Option<String>,
}

impl ChatMessage {
    pub fn new(message_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            prompt: prompt.into(),
            attachments: Vec::new(),
            context_type: ContextType::Normal,
            task_mode: None,
        }
    }

    pub fn follow_up(mut self) -> Self {
        self.context_type = ContextType::FollowUp;
        self
    }

    pub fn interrupt(mut self) -> Self {
        self.context_type = ContextType::Interrupt;
        self
    }

    pub fn with_attachment(mut self, attachment: Value) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_task_mode(mut self, mode: impl Into<String>) -> Self {
        self.task_mode = Some(mode.into());
        self
    }
}

/// Connection handshake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitMessage {
    pub message_id: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Inbound envelope, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Chat(ChatMessage),
    Init(InitMessage),
}

impl ClientMessage {
    const KNOWN_TYPES: &'static [&'static str] = &["chat", "init"];

    /// Parse one raw frame
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        if !Self::KNOWN_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn message_id(&self) -> &str {
        match self {
            ClientMessage::Chat(chat) => &chat.message_id,
            ClientMessage::Init(init) => &init.message_id,
        }
    }
}

/// Outbound envelope, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ack {
        message_id: String,
    },
    Event {
        event: EventKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<u64>,
        #[serde(default)]
        data: Value,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
}

impl ServerMessage {
    pub fn ack(message_id: impl Into<String>) -> Self {
        ServerMessage::Ack {
            message_id: message_id.into(),
        }
    }

    pub fn event(event: EventKind, message_id: Option<String>, task_id: Option<u64>, data: Value) -> Self {
        ServerMessage::Event {
            event,
            message_id,
            task_id,
            data,
        }
    }

    pub fn error(message: impl Into<String>, message_id: Option<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            message_id,
        }
    }

    /// Event kind, if this is an event notification
    pub fn event_kind(&self) -> Option<EventKind> {
        match self {
            ServerMessage::Event { event, .. } => Some(*event),
            _ => None,
        }
    }
}
