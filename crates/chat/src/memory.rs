//! Conversation memory: a sliding window of recent exchanges.

use care_llm::{ChatMessage, ChatRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One remembered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub role: ChatRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Bounded history of the last `max_exchanges` user/assistant exchanges.
///
/// Holds at most `2 * max_exchanges` messages; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    entries: VecDeque<MemoryEntry>,
    max_exchanges: usize,
}

impl ConversationMemory {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_exchanges,
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(ChatRole::User, text.into());
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(ChatRole::Assistant, text.into());
    }

    fn push(&mut self, role: ChatRole, text: String) {
        self.entries.push_back(MemoryEntry {
            role,
            text,
            at: Utc::now(),
        });

        while self.entries.len() > self.capacity() {
            self.entries.pop_front();
        }
    }

    /// Maximum number of messages held.
    pub fn capacity(&self) -> usize {
        self.max_exchanges * 2
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&MemoryEntry> {
        self.entries.back()
    }

    /// Render as `Human: ..` / `AI: ..` lines for prompt templates.
    pub fn format_history(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let speaker = match entry.role {
                    ChatRole::User => "Human",
                    ChatRole::Assistant => "AI",
                    ChatRole::System => "System",
                };
                format!("{}: {}", speaker, entry.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Messages in chat form, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.entries
            .iter()
            .map(|entry| ChatMessage::new(entry.role, entry.text.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest_first() {
        let mut memory = ConversationMemory::new(2);
        for i in 0..3 {
            memory.push_user(format!("q{}", i));
            memory.push_assistant(format!("a{}", i));
        }

        assert_eq!(memory.len(), 4);
        let texts: Vec<&str> = memory.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["q1", "a1", "q2", "a2"]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut memory = ConversationMemory::new(10);
        for i in 0..100 {
            memory.push_user(format!("q{}", i));
            assert!(memory.len() <= 20);
        }
        assert_eq!(memory.len(), 20);
        assert_eq!(memory.entries().next().unwrap().text, "q80");
    }

    #[test]
    fn test_format_history() {
        let mut memory = ConversationMemory::new(10);
        memory.push_assistant("Hi there!");
        memory.push_user("My dad keeps getting lost.");

        assert_eq!(
            memory.format_history(),
            "AI: Hi there!\nHuman: My dad keeps getting lost."
        );
    }

    #[test]
    fn test_messages_keep_roles() {
        let mut memory = ConversationMemory::new(10);
        memory.push_user("hello");
        memory.push_assistant("hi");

        let messages = memory.messages();
        assert_eq!(messages[0], ChatMessage::user("hello"));
        assert_eq!(messages[1], ChatMessage::assistant("hi"));
    }

    #[test]
    fn test_empty_memory() {
        let memory = ConversationMemory::new(10);
        assert!(memory.is_empty());
        assert_eq!(memory.format_history(), "");
        assert!(memory.last().is_none());
    }
}
