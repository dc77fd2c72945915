//! Request/response boundary between the sync engine and the server.

pub mod http;

pub use http::HttpTransport;

use async_trait::async_trait;

use crate::model::errors::FeedResult;
use crate::model::message::{ConversationTarget, Message};
use crate::model::page::{Cursor, Page};

/// Fetches pages and sends messages for a conversation.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Fetch one page. `None` requests the initial (latest) page.
    ///
    /// # Errors
    /// Returns a transport error on network failure or non-2xx status, and
    /// [`crate::SyncError::MalformedResponse`] if the body is not a page.
    async fn fetch_page(
        &self,
        target: &ConversationTarget,
        cursor: Option<&Cursor>,
    ) -> FeedResult<Page>;

    /// Post a message and return the server's copy.
    ///
    /// # Errors
    /// Returns a transport error on network failure or non-2xx status, and
    /// [`crate::SyncError::MalformedResponse`] if the body is not a message.
    async fn send_message(&self, target: &ConversationTarget, text: &str) -> FeedResult<Message>;
}
