//! Offline provider
//!
//! Stands in for a real model so the runtime can be driven without network
//! access. It echoes the last user turn. Lines of the form
//! `/call <tool> <json args>` become tool calls; once tool results come back
//! they are joined into the final answer.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::{ChatParams, ChatResponse, Message, Provider, Result, ToolCall};

const CALL_PREFIX: &str = "/call ";

#[derive(Debug, Default)]
pub struct LoopbackProvider {
    calls: AtomicU64,
}

impl LoopbackProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_calls(&self, prompt: &str) -> Vec<ToolCall> {
        prompt
            .lines()
            .filter_map(|line| line.trim().strip_prefix(CALL_PREFIX))
            .filter_map(|rest| {
                let rest = rest.trim();
                let (name, args) = match rest.split_once(char::is_whitespace) {
                    Some((name, args)) => (name, args.trim()),
                    None => (rest, ""),
                };
                if name.is_empty() {
                    return None;
                }
                let arguments = if args.is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(args).unwrap_or_else(|_| Value::String(args.to_string()))
                };
                let n = self.calls.fetch_add(1, Ordering::Relaxed);
                Some(ToolCall::new(format!("call_{}", n), name, arguments))
            })
            .collect()
    }
}

#[async_trait]
impl Provider for LoopbackProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        let trailing_tools: Vec<&Message> = params
            .messages
            .iter()
            .rev()
            .take_while(|m| m.role == "tool")
            .collect();

        if !trailing_tools.is_empty() {
            let content = trailing_tools
                .iter()
                .rev()
                .filter_map(|m| m.content.as_deref())
                .collect::<Vec<_>>()
                .join("\n");
            debug!("loopback answering with {} tool result(s)", trailing_tools.len());
            return Ok(ChatResponse::text(content));
        }

        let prompt = params
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .and_then(|m| m.content.clone())
            .unwrap_or_default();

        let calls = self.parse_calls(&prompt);
        if !calls.is_empty() {
            debug!("loopback requesting {} tool call(s)", calls.len());
            return Ok(ChatResponse::tool_calls(None, calls));
        }

        Ok(ChatResponse::text(prompt))
    }

    fn default_model(&self) -> String {
        "loopback".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}
