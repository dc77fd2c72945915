//! Background poller for newer messages.
//!
//! Ticks on a fixed interval and runs [`ConversationFeed::poll_newer`] with
//! bounded retries. A tick never overlaps the previous one: ticks missed
//! while a fetch is outstanding are skipped. Shutdown or an interval change
//! abandons the tick in flight and its result is discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::feed::{ConversationFeed, LoadOutcome};
use crate::model::config::RetryConfig;
use crate::model::errors::{FeedResult, SyncError};
use crate::transport::FeedTransport;

/// Background worker polling a feed for newer messages.
pub struct NewerPoller<T> {
    feed: Arc<ConversationFeed<T>>,
    retry: RetryConfig,
    interval: watch::Receiver<Duration>,
    shutdown: CancellationToken,
}

/// Control handle for a spawned [`NewerPoller`].
#[derive(Debug)]
pub struct PollerHandle {
    interval: watch::Sender<Duration>,
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl PollerHandle {
    /// Change the tick interval. A tick in flight is abandoned.
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] for a zero interval; the running interval is kept.
    pub fn set_interval(&self, interval: Duration) -> FeedResult<()> {
        check_interval(interval)?;
        self.interval.send_replace(interval);
        Ok(())
    }

    /// Current tick interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        *self.interval.borrow()
    }

    /// Token that stops the poller when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether the worker task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the poller and wait for the worker to exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(err) = self.join.await {
            warn!(?err, "poller task ended abnormally");
        }
    }
}

impl<T: FeedTransport + 'static> NewerPoller<T> {
    /// Spawn a poller using the feed's configured interval and retry policy.
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] if the configured interval is zero.
    pub fn spawn(feed: Arc<ConversationFeed<T>>) -> FeedResult<PollerHandle> {
        let interval = feed.config().poll_interval;
        let retry = feed.config().poll_retry.clone();
        Self::spawn_with(feed, interval, retry)
    }

    /// Spawn a poller with an explicit interval and retry policy.
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] if `interval` is zero.
    pub fn spawn_with(
        feed: Arc<ConversationFeed<T>>,
        interval: Duration,
        retry: RetryConfig,
    ) -> FeedResult<PollerHandle> {
        check_interval(interval)?;
        let (interval_tx, interval_rx) = watch::channel(interval);
        let shutdown = CancellationToken::new();
        let poller = Self {
            feed,
            retry,
            interval: interval_rx,
            shutdown: shutdown.clone(),
        };
        let join = tokio::spawn(poller.run());
        Ok(PollerHandle {
            interval: interval_tx,
            shutdown,
            join,
        })
    }

    /// Run the poll loop until shutdown is signaled.
    async fn run(self) {
        let Self {
            feed,
            retry,
            interval: mut interval_rx,
            shutdown,
        } = self;

        let mut period = *interval_rx.borrow_and_update();
        info!(?period, "starting newer-message poller");
        let mut ticker = fixed_interval(period);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    period = *interval_rx.borrow_and_update();
                    debug!(?period, "poll interval changed");
                    ticker = fixed_interval(period);
                    continue;
                }
                _ = ticker.tick() => {}
            }

            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("abandoning poll tick on shutdown");
                    break;
                }
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    period = *interval_rx.borrow_and_update();
                    debug!(?period, "poll interval changed mid-tick; abandoning fetch");
                    ticker = fixed_interval(period);
                }
                result = poll_with_retry(&feed, &retry) => log_tick(result),
            }

            if feed.is_closed() {
                debug!("feed closed; stopping poller");
                break;
            }
        }

        info!("newer-message poller shutting down");
    }
}

fn check_interval(interval: Duration) -> FeedResult<()> {
    if interval.is_zero() {
        return Err(SyncError::Config("poll interval must be > 0".to_string()));
    }
    Ok(())
}

/// Interval whose first tick fires one full period from now. `period` is non-zero.
fn fixed_interval(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Run one poll, retrying retryable failures with backoff.
///
/// # Errors
/// Returns the last error once retries are exhausted, or the first
/// non-retryable one.
pub async fn poll_with_retry<T: FeedTransport>(
    feed: &ConversationFeed<T>,
    retry: &RetryConfig,
) -> FeedResult<LoadOutcome> {
    let mut attempt = 0;
    loop {
        match feed.poll_newer().await {
            Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                let delay = retry.delay_for(attempt);
                attempt += 1;
                warn!(error = %err, attempt, ?delay, "poll failed; retrying");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

fn log_tick(result: FeedResult<LoadOutcome>) {
    match result {
        Ok(LoadOutcome::Applied { rows }) => debug!(rows, "poll tick applied"),
        Ok(outcome) => debug!(?outcome, "poll tick skipped"),
        Err(err) => warn!(error = %err, "poll tick failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::FeedConfig;
    use crate::model::page::{Cursor, SortOrder};
    use crate::test_support::{ScriptedTransport, ids, message, page, target};

    const PERIOD: Duration = Duration::from_secs(10);

    async fn seeded(transport: &Arc<ScriptedTransport>) -> Arc<ConversationFeed<ScriptedTransport>> {
        transport.push_page(page(
            vec![message("m1", "one")],
            SortOrder::NewestFirst,
            Some("n1"),
            Some("p1"),
        ));
        ConversationFeed::open(Arc::clone(transport), FeedConfig::default(), target("c1"))
            .await
            .unwrap()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_merges_newer_page() {
        let transport = Arc::new(ScriptedTransport::default());
        let feed = seeded(&transport).await;
        transport.push_page(page(
            vec![message("m2", "two")],
            SortOrder::OldestFirst,
            None,
            Some("n2"),
        ));

        let handle = NewerPoller::spawn_with(Arc::clone(&feed), PERIOD, RetryConfig::disabled()).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.fetch_count(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let view = feed.snapshot();
        assert_eq!(ids(&view.messages), ["m2", "m1"]);
        assert_eq!(view.newer_cursor, Some(Cursor::from("n2")));
        assert_eq!(transport.fetched_cursors()[1].as_deref(), Some("n1"));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_is_retried() {
        let transport = Arc::new(ScriptedTransport::default());
        let feed = seeded(&transport).await;
        transport.push_page_error(SyncError::Transport {
            status: 503,
            reason: "Service Unavailable".to_string(),
        });
        transport.push_page(page(vec![message("m2", "two")], SortOrder::NewestFirst, Some("n2"), None));

        let outcome = poll_with_retry(&feed, &fast_retry()).await.unwrap();

        assert_eq!(outcome, LoadOutcome::Applied { rows: 1 });
        assert_eq!(transport.fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_response_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::default());
        let feed = seeded(&transport).await;
        transport.push_page_error(SyncError::MalformedResponse("missing field `rows`".into()));

        let err = poll_with_retry(&feed, &fast_retry()).await.unwrap_err();

        assert!(matches!(err, SyncError::MalformedResponse(_)));
        assert_eq!(transport.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let transport = Arc::new(ScriptedTransport::default());
        let feed = seeded(&transport).await;
        for _ in 0..5 {
            transport.push_page_error(SyncError::Transport {
                status: 500,
                reason: "Internal Server Error".to_string(),
            });
        }

        let err = poll_with_retry(&feed, &fast_retry()).await.unwrap_err();

        assert!(err.is_transport());
        assert_eq!(transport.fetch_count(), 1 + 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_abandons_tick() {
        let transport = Arc::new(ScriptedTransport::default());
        let feed = seeded(&transport).await;
        let gate = transport.push_gated_page();

        let handle = NewerPoller::spawn_with(Arc::clone(&feed), PERIOD, RetryConfig::disabled()).unwrap();
        transport.wait_for_fetches(2).await;

        handle.set_interval(Duration::from_secs(5)).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let late = gate.send(Ok(page(
            vec![message("m2", "two")],
            SortOrder::NewestFirst,
            Some("n2"),
            None,
        )));
        assert!(late.is_err(), "abandoned fetch should have dropped its receiver");
        let view = feed.snapshot();
        assert_eq!(ids(&view.messages), ["m1"]);
        assert_eq!(view.newer_cursor, Some(Cursor::from("n1")));
        assert_eq!(handle.interval(), Duration::from_secs(5));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_tick_and_exits() {
        let transport = Arc::new(ScriptedTransport::default());
        let feed = seeded(&transport).await;
        let gate = transport.push_gated_page();

        let handle = NewerPoller::spawn_with(Arc::clone(&feed), PERIOD, RetryConfig::disabled()).unwrap();
        transport.wait_for_fetches(2).await;
        handle.stop().await;

        assert!(gate.send(Ok(page(vec![], SortOrder::NewestFirst, None, None))).is_err());
        assert_eq!(feed.snapshot().newer_cursor, Some(Cursor::from("n1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_exits_when_feed_closes() {
        let transport = Arc::new(ScriptedTransport::default());
        let feed = seeded(&transport).await;
        transport.push_page(page(vec![], SortOrder::NewestFirst, Some("n1"), None));

        let handle = NewerPoller::spawn(Arc::clone(&feed)).unwrap();
        feed.close();
        tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;

        assert!(handle.is_finished());
        assert_eq!(transport.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_rejected() {
        let transport = Arc::new(ScriptedTransport::default());
        let feed = seeded(&transport).await;

        let err = NewerPoller::spawn_with(Arc::clone(&feed), Duration::ZERO, RetryConfig::disabled())
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));

        let handle = NewerPoller::spawn_with(Arc::clone(&feed), PERIOD, RetryConfig::disabled()).unwrap();
        assert!(matches!(
            handle.set_interval(Duration::ZERO),
            Err(SyncError::Config(_))
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!handle.is_finished());
        assert_eq!(handle.interval(), PERIOD);
        handle.stop().await;
    }
}
