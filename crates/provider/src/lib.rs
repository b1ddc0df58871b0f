//! Model provider seam
//!
//! The agent loop talks to a language model only through [`Provider`]. The
//! types here are provider-neutral; mapping them onto a concrete API is the
//! job of the provider implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod loopback;

pub use loopback::LoopbackProvider;

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider rejected request: {0}")]
    Api(String),

    #[error("provider response could not be decoded: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider is not configured")]
    NotConfigured,

    #[error("provider returned an invalid response")]
    InvalidResponse,

    #[error("provider rate limited the request")]
    RateLimited,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Model turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    pub fn tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls,
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        }
    }
}

/// Token accounting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Conversation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: &str, content: Option<String>) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", Some(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", Some(content.into()))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", Some(content.into()))
    }

    /// Assistant turn that requested tool calls
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role("assistant", content)
        }
    }

    pub fn tool(
        call_id: impl Into<String>,
        name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
            ..Self::with_role("tool", Some(result.into()))
        }
    }
}

/// Call signature of a tool, as offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSignature {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSignature {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Request parameters
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSignature>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tool_choice: ToolChoice,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: 4096,
            temperature: 0.7,
            tool_choice: ToolChoice::Auto,
        }
    }
}

/// Tool selection mode
#[derive(Debug, Clone)]
pub enum ToolChoice {
    Auto,
    Required(String),
    None,
}

/// Language model backend
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse>;
    fn default_model(&self) -> String;
    fn is_configured(&self) -> bool;
}
