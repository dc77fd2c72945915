//! Optimistic local echoes of sent messages.
//!
//! An echo is shown as soon as the user submits, before the server has
//! assigned an id. It is then either confirmed in place by the send response,
//! marked failed, or dropped when a newer poll brings the authoritative copy.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::message::{Message, MessageId, Sender};

/// Prefix of locally generated echo ids.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Delivery state of a local echo.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EchoStatus {
    /// Waiting for the send response.
    Pending,
    /// Confirmed by the server; the echo carries the server id.
    Confirmed,
    /// The send failed.
    Failed {
        /// Error reported by the transport.
        reason: String,
    },
}

/// A provisional message shown before the server copy surfaces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEcho {
    /// Local id while pending, server id once confirmed.
    pub id: MessageId,
    /// Message body.
    pub text: String,
    /// Author (the local user).
    pub sender: Sender,
    /// Local creation time, or the server timestamp once confirmed.
    pub created_at: DateTime<Utc>,
    /// Delivery state.
    pub status: EchoStatus,
}

impl LocalEcho {
    /// Create a pending echo.
    #[must_use]
    pub fn pending(id: MessageId, text: String, sender: Sender, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            text,
            sender,
            created_at,
            status: EchoStatus::Pending,
        }
    }

    /// Wrap a server-confirmed message.
    #[must_use]
    pub fn confirmed(message: Message) -> Self {
        Self {
            id: message.id,
            text: message.text,
            sender: message.sender,
            created_at: message.created_at,
            status: EchoStatus::Confirmed,
        }
    }

    /// Whether the server confirmed this echo.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self.status, EchoStatus::Confirmed)
    }

    /// Whether the send for this echo failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.status, EchoStatus::Failed { .. })
    }
}

/// How a send response was applied to the pending list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The pending echo was replaced in place.
    Replaced,
    /// The echo was gone (cleared by a poll); the confirmed message was put back at the head.
    Reinserted,
}

/// Pending echoes, newest first.
#[derive(Clone, Debug, Default)]
pub struct EchoQueue {
    entries: VecDeque<LocalEcho>,
    last_stamp: Option<i64>,
    same_stamp: u32,
}

impl EchoQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a `local-<millis>` id, suffixed when several are issued in the same millisecond.
    ///
    /// Ids never repeat within a queue, even if the wall clock steps backwards:
    /// a stamp at or before the last one reuses that stamp with the next suffix.
    pub fn next_local_id(&mut self, now: DateTime<Utc>) -> MessageId {
        let stamp = now.timestamp_millis();
        match self.last_stamp {
            Some(last) if stamp <= last => {
                self.same_stamp += 1;
                MessageId::new(format!("{LOCAL_ID_PREFIX}{last}-{}", self.same_stamp))
            }
            _ => {
                self.last_stamp = Some(stamp);
                self.same_stamp = 0;
                MessageId::new(format!("{LOCAL_ID_PREFIX}{stamp}"))
            }
        }
    }

    /// Insert an echo at the head.
    pub fn push_front(&mut self, echo: LocalEcho) {
        self.entries.push_front(echo);
    }

    /// Apply a successful send response for `local_id`.
    pub fn confirm(&mut self, local_id: &MessageId, message: Message) -> Reconciled {
        let confirmed = LocalEcho::confirmed(message);
        if let Some(slot) = self.entries.iter_mut().find(|echo| &echo.id == local_id) {
            *slot = confirmed;
            Reconciled::Replaced
        } else {
            self.entries.push_front(confirmed);
            Reconciled::Reinserted
        }
    }

    /// Mark the echo for `local_id` as failed. Returns false if it is gone.
    pub fn mark_failed(&mut self, local_id: &MessageId, reason: impl Into<String>) -> bool {
        match self.entries.iter_mut().find(|echo| &echo.id == local_id) {
            Some(echo) => {
                echo.status = EchoStatus::Failed {
                    reason: reason.into(),
                };
                true
            }
            None => false,
        }
    }

    /// Remove one echo by id.
    pub fn remove(&mut self, id: &MessageId) -> Option<LocalEcho> {
        let index = self.entries.iter().position(|echo| &echo.id == id)?;
        self.entries.remove(index)
    }

    /// Drop every echo. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Echo at the head of the list.
    #[must_use]
    pub fn head(&self) -> Option<&LocalEcho> {
        self.entries.front()
    }

    /// Number of echoes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl Iterator<Item = &LocalEcho> {
        self.entries.iter()
    }
}
