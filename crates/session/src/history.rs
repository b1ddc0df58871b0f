//! Bounded conversation history for one connection

use chrono::{DateTime, Local};
use tracing::debug;
use warden_provider::Message;

/// Default maximum number of messages kept
pub const DEFAULT_MAX_MESSAGES: usize = 100;

/// Conversation carried across follow-up tasks
#[derive(Debug, Clone)]
pub struct History {
    messages: Vec<Message>,
    max_messages: usize,
    pub updated_at: DateTime<Local>,
}

impl Default for History {
    fn default() -> Self {
        Self::with_max_messages(DEFAULT_MAX_MESSAGES)
    }
}

impl History {
    pub fn with_max_messages(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages,
            updated_at: Local::now(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Local::now();
        self.enforce_max_messages();
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        self.updated_at = Local::now();
        self.enforce_max_messages();
    }

    /// Drop the oldest messages beyond the limit
    fn enforce_max_messages(&mut self) {
        if self.messages.len() > self.max_messages {
            let to_remove = self.messages.len() - self.max_messages;
            self.messages.drain(0..to_remove);
            debug!("History truncated to {} messages", self.messages.len());
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Local::now();
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn set_max_messages(&mut self, max_messages: usize) {
        self.max_messages = max_messages;
        self.enforce_max_messages();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_truncates_oldest() {
        let mut history = History::with_max_messages(3);
        for i in 0..5 {
            history.push(Message::user(format!("m{}", i)));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.messages()[0].content.as_deref(), Some("m2"));
    }

    #[test]
    fn test_extend_and_clear() {
        let mut history = History::default();
        history.extend(vec![Message::user("a"), Message::assistant("b")]);
        assert_eq!(history.len(), 2);
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.max_messages(), DEFAULT_MAX_MESSAGES);
    }

    #[test]
    fn test_shrinking_limit_truncates() {
        let mut history = History::with_max_messages(10);
        history.extend((0..6).map(|i| Message::user(i.to_string())));
        history.set_max_messages(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[1].content.as_deref(), Some("5"));
    }
}
