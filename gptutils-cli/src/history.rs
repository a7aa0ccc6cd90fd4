// gptutils-cli/src/history.rs
use gptutils_core::{Message, Role};

/// In-memory conversation for one REPL session. The first message is always
/// the system prompt.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    messages: Vec<Message>,
}

impl ChatHistory {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Drops the trailing user message after a failed turn.
    pub fn discard_last_user(&mut self) -> Option<Message> {
        match self.messages.last() {
            Some(last) if last.role == Role::User => self.messages.pop(),
            _ => None,
        }
    }

    /// Resets the conversation to just the system prompt.
    pub fn clear(&mut self) {
        self.messages.truncate(1);
    }

    /// Everything except the system prompt.
    pub fn turns(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }
}
