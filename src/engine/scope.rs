//! In-flight flags and cancellation scopes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// At most one load per direction.
#[derive(Debug, Default)]
pub(crate) struct InFlight(AtomicBool);

impl InFlight {
    /// Claim the slot, or `None` if a load is already running.
    pub(crate) fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.0))
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the slot on drop, including when the owning future is abandoned.
#[derive(Debug)]
pub(crate) struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cancellation tokens for one feed.
///
/// The root token lives as long as the current conversation; every fetch
/// runs under a child of it. The initial load additionally owns its own
/// slot so that a second initial load supersedes the first.
#[derive(Debug, Default)]
pub(crate) struct Scopes {
    root: Mutex<CancellationToken>,
    initial: Mutex<Option<CancellationToken>>,
}

impl Scopes {
    /// Cancel everything from the previous conversation and open a fresh root.
    pub(crate) fn renew(&self) {
        let mut root = lock(&self.root);
        root.cancel();
        *root = CancellationToken::new();
        lock(&self.initial).take();
    }

    /// Token for one fetch under the current conversation.
    pub(crate) fn child(&self) -> CancellationToken {
        lock(&self.root).child_token()
    }

    /// Token for an initial load, cancelling the previous initial load.
    pub(crate) fn begin_initial(&self) -> CancellationToken {
        let token = self.child();
        if let Some(previous) = lock(&self.initial).replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Tear down: cancel every scope. Later children are born cancelled.
    pub(crate) fn cancel_all(&self) {
        lock(&self.root).cancel();
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.root).is_cancelled()
    }
}
