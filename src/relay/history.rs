//! Per-chat conversation state.
//!
//! Each chat owns a FIFO-capped log of turns. The store hands out one handle
//! per chat; handlers hold that chat's lock for the whole request/response
//! cycle, so updates within a chat are processed strictly in arrival order
//! while other chats proceed in parallel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged message in a chat's history.
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Bounded history for one chat. Oldest turns are evicted first.
pub struct ChatLog {
    turns: VecDeque<Turn>,
    cap: usize,
}

impl ChatLog {
    pub fn new(cap: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        if self.turns.len() == self.cap {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Snapshot of the stored turns, oldest first.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}

/// Process-wide map of chat id → conversation log.
pub struct ConversationStore {
    chats: Mutex<HashMap<i64, Arc<Mutex<ChatLog>>>>,
    cap: usize,
}

impl ConversationStore {
    pub fn new(cap: usize) -> Self {
        Self {
            chats: Mutex::new(HashMap::new()),
            cap,
        }
    }

    /// Handle for one chat's log, created empty on first access. The outer
    /// map lock is released before the caller locks the log itself.
    pub async fn chat(&self, chat_id: i64) -> Arc<Mutex<ChatLog>> {
        let mut chats = self.chats.lock().await;
        chats
            .entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(ChatLog::new(self.cap))))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_snapshot() {
        let mut log = ChatLog::new(4);
        log.push(Turn::user("hello"));
        log.push(Turn::assistant("hi there"));

        let turns = log.snapshot();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "hello");
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let mut log = ChatLog::new(3);
        for i in 0..5 {
            log.push(Turn::user(format!("msg {i}")));
        }

        assert_eq!(log.len(), 3);
        let turns = log.snapshot();
        assert_eq!(turns[0].content, "msg 2");
        assert_eq!(turns[2].content, "msg 4");
    }

    #[test]
    fn test_never_exceeds_cap() {
        let mut log = ChatLog::new(2);
        for i in 0..100 {
            log.push(Turn::assistant(format!("{i}")));
            assert!(log.len() <= 2);
        }
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut log = ChatLog::new(4);
        log.push(Turn::user("hello"));
        log.clear();
        assert!(log.is_empty());
        log.clear();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_store_creates_log_on_first_access() {
        let store = ConversationStore::new(4);
        let chat = store.chat(42).await;
        assert!(chat.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_returns_same_log_per_chat() {
        let store = ConversationStore::new(4);
        let a = store.chat(42).await;
        a.lock().await.push(Turn::user("hello"));

        let b = store.chat(42).await;
        assert_eq!(b.lock().await.len(), 1);

        let other = store.chat(7).await;
        assert!(other.lock().await.is_empty());
    }
}
