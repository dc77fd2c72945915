//! Wire format of one page of conversation history.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::model::message::Message;

/// Opaque pagination token handed out by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Order in which the server returned a page's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    /// Rows are newest-first (canonical order).
    NewestFirst,
    /// Rows are oldest-first and must be reversed.
    OldestFirst,
}

/// Raw server response for one page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Messages in `sort` order.
    pub rows: Vec<Message>,
    /// Order of `rows`.
    pub sort: SortOrder,
    /// Raw "next" cursor; its direction depends on `sort`.
    #[serde(default, deserialize_with = "non_empty_cursor")]
    pub cursor_next: Option<Cursor>,
    /// Raw "prev" cursor; its direction depends on `sort`.
    #[serde(default, deserialize_with = "non_empty_cursor")]
    pub cursor_prev: Option<Cursor>,
}

impl Page {
    /// Build a page.
    #[must_use]
    pub const fn new(
        rows: Vec<Message>,
        sort: SortOrder,
        cursor_next: Option<Cursor>,
        cursor_prev: Option<Cursor>,
    ) -> Self {
        Self {
            rows,
            sort,
            cursor_next,
            cursor_prev,
        }
    }
}

/// An empty token means "no page in that direction", same as null.
fn non_empty_cursor<'de, D>(deserializer: D) -> Result<Option<Cursor>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|token| !token.is_empty()).map(Cursor))
}
