//! Data model shared by the sync engine and its transports.

pub mod config;
pub mod errors;
pub mod message;
pub mod page;

pub use config::{FeedConfig, RetryConfig};
pub use errors::{FeedResult, SyncError};
pub use message::{ConversationTarget, Message, MessageId, Sender};
pub use page::{Cursor, Page, SortOrder};
