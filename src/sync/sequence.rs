//! Newest-first message sequence with id deduplication.

use std::collections::HashSet;

use crate::model::message::{Message, MessageId};

/// Ordered, duplicate-free list of server messages. Index 0 is the newest.
#[derive(Clone, Debug, Default)]
pub struct MessageSequence {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageSequence {
    /// Create an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole sequence. Returns the number of rows kept.
    pub fn replace_with(&mut self, rows: Vec<Message>) -> usize {
        self.clear();
        self.extend_older(rows)
    }

    /// Append newest-first rows at the oldest end. Returns the number of rows kept.
    pub fn extend_older(&mut self, rows: Vec<Message>) -> usize {
        let before = self.messages.len();
        for row in rows {
            if self.ids.insert(row.id.clone()) {
                self.messages.push(row);
            }
        }
        self.messages.len() - before
    }

    /// Place newest-first rows at the newest end. Returns the number of rows kept.
    pub fn prepend_newer(&mut self, rows: Vec<Message>) -> usize {
        let fresh: Vec<Message> = rows
            .into_iter()
            .filter(|row| self.ids.insert(row.id.clone()))
            .collect();
        let inserted = fresh.len();
        if inserted > 0 {
            let mut merged = Vec::with_capacity(inserted + self.messages.len());
            merged.extend(fresh);
            merged.append(&mut self.messages);
            self.messages = merged;
        }
        inserted
    }

    /// Whether a message with this id is present.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the sequence is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Newest message.
    #[must_use]
    pub fn newest(&self) -> Option<&Message> {
        self.messages.first()
    }

    /// Oldest loaded message.
    #[must_use]
    pub fn oldest(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Messages, newest first.
    #[must_use]
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// Drop every message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}
