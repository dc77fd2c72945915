//! Older/newer pagination cursors.

use crate::model::page::Cursor;

/// Current pagination cursors. `None` means no page exists in that direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CursorStore {
    older: Option<Cursor>,
    newer: Option<Cursor>,
}

impl CursorStore {
    /// Create an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            older: None,
            newer: None,
        }
    }

    /// Cursor leading to older messages.
    #[must_use]
    pub const fn older(&self) -> Option<&Cursor> {
        self.older.as_ref()
    }

    /// Cursor leading to newer messages.
    #[must_use]
    pub const fn newer(&self) -> Option<&Cursor> {
        self.newer.as_ref()
    }

    /// Replace the older cursor with the one resolved from the latest older page.
    pub fn advance_older(&mut self, cursor: Option<Cursor>) {
        self.older = cursor;
    }

    /// Replace the newer cursor with the one resolved from the latest newer page.
    pub fn advance_newer(&mut self, cursor: Option<Cursor>) {
        self.newer = cursor;
    }

    /// Set both cursors from an initial snapshot.
    pub fn seed(&mut self, older: Option<Cursor>, newer: Option<Cursor>) {
        self.older = older;
        self.newer = newer;
    }

    /// Forget both cursors.
    pub fn reset(&mut self) {
        self.older = None;
        self.newer = None;
    }
}
