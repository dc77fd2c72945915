//! Conversation messages and the identifiers that address them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::errors::{FeedResult, SyncError};

/// Server-assigned message identifier, unique within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap an identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Author of a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Sender identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl Sender {
    /// Create a sender.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A message as returned by the server. Never mutated once received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned identifier.
    pub id: MessageId,
    /// Message body.
    pub text: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Author.
    pub sender: Sender,
}

/// The `(account, conversation)` pair a feed is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationTarget {
    account_id: String,
    conversation_id: String,
}

impl ConversationTarget {
    /// Validate and build a target.
    ///
    /// # Errors
    /// Returns [`SyncError::InvalidTarget`] if either identifier is empty.
    pub fn new(
        account_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> FeedResult<Self> {
        let account_id = account_id.into().trim().to_string();
        let conversation_id = conversation_id.into().trim().to_string();

        if account_id.is_empty() {
            return Err(SyncError::InvalidTarget("account id is empty".to_string()));
        }
        if conversation_id.is_empty() {
            return Err(SyncError::InvalidTarget(
                "conversation id is empty".to_string(),
            ));
        }

        Ok(Self {
            account_id,
            conversation_id,
        })
    }

    /// Account identifier.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Conversation identifier.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Path segments of the messages endpoint, relative to the base URL.
    #[must_use]
    pub fn path_segments(&self) -> [&str; 6] {
        [
            "api",
            "account",
            self.account_id.as_str(),
            "conversation",
            self.conversation_id.as_str(),
            "messages",
        ]
    }
}

impl fmt::Display for ConversationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_rejects_blank_ids() {
        assert!(matches!(
            ConversationTarget::new("", "c1"),
            Err(SyncError::InvalidTarget(_))
        ));
        assert!(matches!(
            ConversationTarget::new("a1", "   "),
            Err(SyncError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_target_path() {
        let target = ConversationTarget::new(" 1 ", "42").unwrap();
        assert_eq!(target.account_id(), "1");
        assert_eq!(
            target.path_segments(),
            ["api", "account", "1", "conversation", "42", "messages"]
        );
        assert_eq!(target.to_string(), "1/42");
    }

    #[test]
    fn test_message_wire_names() {
        let json = r#"{
            "id": "m1",
            "text": "hello",
            "createdAt": "2024-03-01T10:00:00Z",
            "sender": { "id": "u1", "name": "Ada" }
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.id.as_str(), "m1");
        assert_eq!(message.sender.name, "Ada");

        let value = serde_json::to_value(&message).unwrap();
        assert!(value.get("createdAt").is_some());
    }
}
