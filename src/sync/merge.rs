//! Page canonicalization.
//!
//! Every page is brought to newest-first order before it touches the
//! message sequence, and its raw `cursor_next`/`cursor_prev` pair is mapped
//! to semantic older/newer roles:
//!
//! | sort           | rows     | older         | newer         |
//! |----------------|----------|---------------|---------------|
//! | `NEWEST_FIRST` | as-is    | `cursor_prev` | `cursor_next` |
//! | `OLDEST_FIRST` | reversed | `cursor_next` | `cursor_prev` |

use crate::model::message::Message;
use crate::model::page::{Cursor, Page, SortOrder};

/// Pagination direction relative to canonical (newest-first) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Toward older messages.
    Older,
    /// Toward newer messages.
    Newer,
}

/// A page in canonical order with its cursors resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalPage {
    /// Rows, newest first.
    pub rows: Vec<Message>,
    /// Cursor leading to older messages.
    pub older: Option<Cursor>,
    /// Cursor leading to newer messages.
    pub newer: Option<Cursor>,
}

/// Pick the raw cursor that moves in `direction` for a page sorted by `sort`.
#[must_use]
pub const fn resolve_cursor<'a>(
    sort: SortOrder,
    cursor_next: Option<&'a Cursor>,
    cursor_prev: Option<&'a Cursor>,
    direction: Direction,
) -> Option<&'a Cursor> {
    match (sort, direction) {
        (SortOrder::NewestFirst, Direction::Older) | (SortOrder::OldestFirst, Direction::Newer) => {
            cursor_prev
        }
        (SortOrder::NewestFirst, Direction::Newer) | (SortOrder::OldestFirst, Direction::Older) => {
            cursor_next
        }
    }
}

/// Normalize a page to newest-first order and resolve both cursors.
#[must_use]
pub fn canonicalize(page: Page) -> CanonicalPage {
    let Page {
        mut rows,
        sort,
        cursor_next,
        cursor_prev,
    } = page;

    let older = resolve_cursor(sort, cursor_next.as_ref(), cursor_prev.as_ref(), Direction::Older)
        .cloned();
    let newer = resolve_cursor(sort, cursor_next.as_ref(), cursor_prev.as_ref(), Direction::Newer)
        .cloned();

    if sort == SortOrder::OldestFirst {
        rows.reverse();
    }

    CanonicalPage { rows, older, newer }
}
