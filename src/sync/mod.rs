//! Reconciliation core: cursors, canonical ordering, merge rules and echoes.

pub mod cursor_store;
pub mod echo;
pub mod merge;
pub mod sequence;
pub mod state;

pub use cursor_store::CursorStore;
pub use echo::{EchoQueue, EchoStatus, LocalEcho, Reconciled};
pub use merge::{CanonicalPage, Direction, canonicalize, resolve_cursor};
pub use sequence::MessageSequence;
pub use state::{FeedState, FeedView, NewerMerge};
