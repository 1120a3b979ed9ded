//! UI-agnostic conversation types
//!
//! These are shared by the session state machine, the inference client (which
//! sends them on the wire as-is) and the presentation layer.

use serde::{Deserialize, Serialize};

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Ordered conversation history.
///
/// Holds at most one system message, and only ever at index 0. Everything
/// else keeps the order it was pushed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
    }

    /// Messages the user actually sees (everything but the system message)
    pub fn visible(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| m.role != ChatRole::System)
    }

    pub(crate) fn set_system(&mut self, content: &str) {
        match self.messages.first_mut() {
            Some(first) if first.role == ChatRole::System => {
                first.content = content.to_string();
            }
            _ => self.messages.insert(0, ChatMessage::system(content)),
        }
    }

    /// Append a conversational turn. System messages go through `set_system`.
    pub(crate) fn push(&mut self, message: ChatMessage) {
        debug_assert_ne!(message.role, ChatRole::System);
        self.messages.push(message);
    }

    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_count(t: &Transcript) -> usize {
        t.messages().iter().filter(|m| m.role == ChatRole::System).count()
    }

    #[test]
    fn test_set_system_on_empty_transcript() {
        let mut t = Transcript::new();
        t.set_system("be brief");
        assert_eq!(t.messages(), &[ChatMessage::system("be brief")]);
    }

    #[test]
    fn test_set_system_replaces_existing() {
        let mut t = Transcript::new();
        t.set_system("one");
        t.push(ChatMessage::user("hi"));
        t.set_system("two");

        assert_eq!(t.len(), 2);
        assert_eq!(t.system_prompt(), Some("two"));
        assert_eq!(t.messages()[1], ChatMessage::user("hi"));
    }

    #[test]
    fn test_set_system_inserts_before_conversation() {
        let mut t = Transcript::new();
        t.push(ChatMessage::user("hi"));
        t.push(ChatMessage::assistant("hello"));
        t.set_system("sys");

        assert_eq!(t.messages()[0], ChatMessage::system("sys"));
        assert_eq!(t.messages()[1], ChatMessage::user("hi"));
        assert_eq!(t.messages()[2], ChatMessage::assistant("hello"));
    }

    #[test]
    fn test_repeated_system_updates_keep_single_system_message() {
        let mut t = Transcript::new();
        for (i, text) in ["a", "", "b", "c"].iter().enumerate() {
            if i % 2 == 1 {
                t.push(ChatMessage::user(format!("msg {}", i)));
            }
            t.set_system(text);
            assert_eq!(system_count(&t), 1);
            assert_eq!(t.messages()[0].role, ChatRole::System);
        }
        assert_eq!(t.system_prompt(), Some("c"));
    }

    #[test]
    fn test_visible_skips_system() {
        let mut t = Transcript::new();
        t.set_system("sys");
        t.push(ChatMessage::user("hi"));
        let visible: Vec<_> = t.visible().collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].role, ChatRole::User);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
