//! Async side of the synchronizer: the feed, its background poller and the
//! near-top watcher.

pub mod feed;
pub mod poller;
pub mod sentry;

mod scope;

pub use feed::{ConversationFeed, LoadOutcome};
pub use poller::{NewerPoller, PollerHandle, poll_with_retry};
pub use sentry::NearTopTrigger;
