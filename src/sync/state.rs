//! Owned feed state and its transitions.
//!
//! All mutation of cursors, messages and echoes goes through the methods
//! below. The engine captures [`FeedState::generation`] before every fetch
//! and refuses to apply the result if the generation moved on, so a page
//! from a previous conversation can never land in the current one.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::message::{ConversationTarget, Message, MessageId, Sender};
use crate::model::page::{Cursor, Page};
use crate::sync::cursor_store::CursorStore;
use crate::sync::echo::{EchoQueue, LocalEcho, Reconciled};
use crate::sync::merge::canonicalize;
use crate::sync::sequence::MessageSequence;

/// Result of merging one newer page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewerMerge {
    /// Rows added at the newest end.
    pub inserted: usize,
    /// Echoes dropped after the merge.
    pub echoes_cleared: usize,
}

/// Everything the feed knows about the current conversation.
#[derive(Debug, Default)]
pub struct FeedState {
    target: Option<ConversationTarget>,
    generation: u64,
    cursors: CursorStore,
    messages: MessageSequence,
    echoes: EchoQueue,
}

impl FeedState {
    /// Create an empty state bound to no conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversation currently bound, if any.
    #[must_use]
    pub const fn target(&self) -> Option<&ConversationTarget> {
        self.target.as_ref()
    }

    /// Counter bumped on every conversation switch.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Pagination cursors.
    #[must_use]
    pub const fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    /// Server messages, newest first.
    #[must_use]
    pub const fn messages(&self) -> &MessageSequence {
        &self.messages
    }

    /// Pending local echoes.
    #[must_use]
    pub const fn echoes(&self) -> &EchoQueue {
        &self.echoes
    }

    /// Bind to a new conversation, dropping everything from the old one.
    /// Returns the new generation.
    pub fn switch_to(&mut self, target: ConversationTarget) -> u64 {
        self.generation += 1;
        self.target = Some(target);
        self.cursors.reset();
        self.messages.clear();
        self.echoes.clear();
        self.generation
    }

    /// Apply the initial snapshot: rows are taken as returned (newest first
    /// by convention), `cursor_prev` leads older and `cursor_next` newer.
    pub fn apply_snapshot(&mut self, page: Page) -> usize {
        let Page {
            rows,
            cursor_next,
            cursor_prev,
            ..
        } = page;
        self.cursors.seed(cursor_prev, cursor_next);
        self.messages.replace_with(rows)
    }

    /// Merge an older page at the oldest end and advance the older cursor.
    pub fn apply_older(&mut self, page: Page) -> usize {
        let canonical = canonicalize(page);
        self.cursors.advance_older(canonical.older);
        self.messages.extend_older(canonical.rows)
    }

    /// Merge a newer page at the newest end, advance the newer cursor and
    /// drop every pending echo.
    pub fn apply_newer(&mut self, page: Page) -> NewerMerge {
        let canonical = canonicalize(page);
        self.cursors.advance_newer(canonical.newer);
        let inserted = self.messages.prepend_newer(canonical.rows);
        let echoes_cleared = self.echoes.clear();
        NewerMerge {
            inserted,
            echoes_cleared,
        }
    }

    /// Queue a pending echo at the head. Returns its local id.
    pub fn push_echo(&mut self, text: String, sender: Sender, now: DateTime<Utc>) -> MessageId {
        let id = self.echoes.next_local_id(now);
        self.echoes
            .push_front(LocalEcho::pending(id.clone(), text, sender, now));
        id
    }

    /// Apply a successful send response.
    pub fn confirm_echo(&mut self, local_id: &MessageId, message: Message) -> Reconciled {
        self.echoes.confirm(local_id, message)
    }

    /// Flag a failed send. Returns false if the echo is gone.
    pub fn fail_echo(&mut self, local_id: &MessageId, reason: impl Into<String>) -> bool {
        self.echoes.mark_failed(local_id, reason)
    }

    /// Drop one echo, typically a failed one the user dismissed.
    pub fn dismiss_echo(&mut self, id: &MessageId) -> Option<LocalEcho> {
        self.echoes.remove(id)
    }

    /// Snapshot for consumers.
    #[must_use]
    pub fn view(&self) -> FeedView {
        FeedView {
            target: self.target.clone(),
            messages: self.messages.as_slice().to_vec(),
            pending: self.echoes.iter().cloned().collect(),
            older_cursor: self.cursors.older().cloned(),
            newer_cursor: self.cursors.newer().cloned(),
        }
    }
}

/// Read-only snapshot published to the rendering layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FeedView {
    /// Conversation the view belongs to.
    pub target: Option<ConversationTarget>,
    /// Server messages, newest first.
    pub messages: Vec<Message>,
    /// Local echoes, newest first; render them ahead of `messages`.
    pub pending: Vec<LocalEcho>,
    /// Cursor leading to older messages.
    pub older_cursor: Option<Cursor>,
    /// Cursor leading to newer messages.
    pub newer_cursor: Option<Cursor>,
}

impl FeedView {
    /// Whether older pages may still be loaded.
    #[must_use]
    pub const fn has_older(&self) -> bool {
        self.older_cursor.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::page::SortOrder;
    use crate::test_support::{ids, message, page};

    fn seeded() -> FeedState {
        let mut state = FeedState::new();
        state.switch_to(ConversationTarget::new("1", "1").unwrap());
        state.apply_snapshot(page(
            vec![message("m1", "one"), message("m2", "two")],
            SortOrder::NewestFirst,
            Some("n1"),
            Some("p1"),
        ));
        state
    }

    #[test]
    fn test_initial_snapshot_seeds_cursors() {
        let state = seeded();
        assert_eq!(ids(state.messages().as_slice()), ["m1", "m2"]);
        assert_eq!(state.cursors().older(), Some(&Cursor::from("p1")));
        assert_eq!(state.cursors().newer(), Some(&Cursor::from("n1")));
    }

    #[test]
    fn test_older_page_oldest_first() {
        let mut state = seeded();
        let appended = state.apply_older(page(
            vec![message("m3", "three")],
            SortOrder::OldestFirst,
            Some("p2"),
            None,
        ));

        assert_eq!(appended, 1);
        assert_eq!(ids(state.messages().as_slice()), ["m1", "m2", "m3"]);
        assert_eq!(state.cursors().older(), Some(&Cursor::from("p2")));
        assert_eq!(state.cursors().newer(), Some(&Cursor::from("n1")));
    }

    #[test]
    fn test_newer_page_clears_echoes() {
        let mut state = seeded();
        let now = Utc::now();
        state.push_echo("a".to_string(), Sender::new("me", "Me"), now);
        state.push_echo("b".to_string(), Sender::new("me", "Me"), now);
        assert_eq!(state.echoes().len(), 2);

        let merge = state.apply_newer(page(
            vec![message("m0", "zero"), message("m-1", "minus one")],
            SortOrder::OldestFirst,
            Some("x"),
            Some("n2"),
        ));

        assert_eq!(merge.inserted, 2);
        assert_eq!(merge.echoes_cleared, 2);
        assert!(state.echoes().is_empty());
        assert_eq!(ids(state.messages().as_slice()), ["m-1", "m0", "m1", "m2"]);
        assert_eq!(state.cursors().newer(), Some(&Cursor::from("n2")));
    }

    #[test]
    fn test_switch_resets_everything() {
        let mut state = seeded();
        let before = state.generation();
        state.push_echo("a".to_string(), Sender::new("me", "Me"), Utc::now());

        let generation = state.switch_to(ConversationTarget::new("1", "2").unwrap());

        assert_eq!(generation, before + 1);
        assert!(state.messages().is_empty());
        assert!(state.echoes().is_empty());
        assert_eq!(state.view().older_cursor, None);
        assert_eq!(
            state.target().map(ConversationTarget::conversation_id),
            Some("2")
        );
    }

    #[test]
    fn test_view_lists_pending_ahead() {
        let mut state = seeded();
        let id = state.push_echo("hi".to_string(), Sender::new("me", "Me"), Utc::now());
        let view = state.view();

        assert_eq!(view.pending.len(), 1);
        assert_eq!(view.pending[0].id, id);
        assert!(view.has_older());
        assert_eq!(view.messages.len(), 2);
    }
}
