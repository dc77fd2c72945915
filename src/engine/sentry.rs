//! "Near top of list" signal driving older-page loads.
//!
//! The rendering layer flips a [`NearTopTrigger`] whenever the load-older
//! sentry enters or leaves the viewport. While it stays visible the watcher
//! waits a short debounce, loads one older page, and repeats. A visibility
//! flip during the debounce cancels the pending load; signals arriving while
//! a load runs are ignored until it completes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::feed::{ConversationFeed, LoadOutcome};
use crate::sync::state::FeedView;
use crate::transport::FeedTransport;

/// Producer side of the near-top signal.
#[derive(Debug, Clone)]
pub struct NearTopTrigger {
    visible: Arc<watch::Sender<bool>>,
}

impl Default for NearTopTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl NearTopTrigger {
    /// Create a trigger, initially not visible.
    #[must_use]
    pub fn new() -> Self {
        Self {
            visible: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Report whether the load-older sentry is visible.
    pub fn set_visible(&self, visible: bool) {
        self.visible.send_if_modified(|current| {
            let changed = *current != visible;
            *current = visible;
            changed
        });
    }

    /// Whether the sentry is currently reported visible.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    /// Spawn a watcher loading older pages of `feed` while the sentry is visible.
    #[must_use]
    pub fn spawn_watcher<T: FeedTransport + 'static>(
        &self,
        feed: Arc<ConversationFeed<T>>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let debounce = feed.config().near_top_debounce;
        let watcher = NearTopWatcher {
            visible: self.visible.subscribe(),
            updates: feed.subscribe(),
            feed,
            debounce,
            shutdown,
        };
        tokio::spawn(watcher.run())
    }
}

/// What the watcher waits for before looking at the sentry again.
enum Wake {
    Visibility,
    VisibilityOrFeed,
}

struct NearTopWatcher<T> {
    feed: Arc<ConversationFeed<T>>,
    visible: watch::Receiver<bool>,
    updates: watch::Receiver<FeedView>,
    debounce: Duration,
    shutdown: CancellationToken,
}

impl<T: FeedTransport + 'static> NearTopWatcher<T> {
    async fn run(mut self) {
        info!(debounce = ?self.debounce, "starting near-top watcher");
        while self.step().await {}
        info!("near-top watcher shutting down");
    }

    /// One debounce/load cycle. Returns false once the watcher should stop.
    async fn step(&mut self) -> bool {
        if !*self.visible.borrow_and_update() {
            return self.wait(Wake::Visibility).await;
        }

        tokio::select! {
            () = self.shutdown.cancelled() => return false,
            changed = self.visible.changed() => return changed.is_ok(),
            () = tokio::time::sleep(self.debounce) => {}
        }

        let outcome = tokio::select! {
            () = self.shutdown.cancelled() => return false,
            outcome = self.feed.load_older() => outcome,
        };

        drop(self.updates.borrow_and_update());
        match outcome {
            Ok(LoadOutcome::Applied { rows }) => {
                debug!(rows, "near-top load applied");
                true
            }
            Ok(LoadOutcome::Cancelled) => !self.feed.is_closed(),
            Ok(outcome) => {
                debug!(?outcome, "near-top load skipped");
                self.wait(Wake::VisibilityOrFeed).await
            }
            Err(err) => {
                warn!(error = %err, "near-top load failed");
                self.wait(Wake::Visibility).await
            }
        }
    }

    async fn wait(&mut self, wake: Wake) -> bool {
        match wake {
            Wake::Visibility => tokio::select! {
                () = self.shutdown.cancelled() => false,
                changed = self.visible.changed() => changed.is_ok(),
            },
            Wake::VisibilityOrFeed => tokio::select! {
                () = self.shutdown.cancelled() => false,
                changed = self.visible.changed() => changed.is_ok(),
                changed = self.updates.changed() => changed.is_ok(),
            },
        }
    }
}
