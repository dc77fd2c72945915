//! Conversation feed: the synchronization engine.
//!
//! Three sources feed one ordered view: the initial snapshot, older pages
//! pulled when the reader nears the top, and newer pages pulled by the
//! poller. Local echoes of sent messages sit in a separate pending list.
//!
//! State is only touched between fetches, under a lock that is never held
//! across an await. Before applying a fetched page the engine re-checks both
//! the fetch's cancellation token and the state generation it captured, so
//! results from a superseded scope are dropped silently.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::scope::{InFlight, Scopes, lock};
use crate::model::config::FeedConfig;
use crate::model::errors::{FeedResult, SyncError};
use crate::model::message::{ConversationTarget, Message, MessageId};
use crate::model::page::{Cursor, Page};
use crate::sync::echo::Reconciled;
use crate::sync::state::{FeedState, FeedView};
use crate::transport::FeedTransport;

/// What a load call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was fetched and merged.
    Applied {
        /// Rows that made it into the sequence after deduplication.
        rows: usize,
    },
    /// No cursor in that direction; nothing was fetched.
    Exhausted,
    /// A load in the same direction is still running; nothing was fetched.
    InFlight,
    /// The fetch was superseded; its result was discarded.
    Cancelled,
}

/// Synchronized view of one conversation at a time.
pub struct ConversationFeed<T> {
    transport: Arc<T>,
    config: FeedConfig,
    state: Mutex<FeedState>,
    view: watch::Sender<FeedView>,
    scopes: Scopes,
    older_flight: InFlight,
    newer_flight: InFlight,
}

impl<T: FeedTransport> ConversationFeed<T> {
    /// Create a feed bound to no conversation.
    #[must_use]
    pub fn new(transport: Arc<T>, config: FeedConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::new(FeedState::new()),
            view: watch::Sender::new(FeedView::default()),
            scopes: Scopes::default(),
            older_flight: InFlight::default(),
            newer_flight: InFlight::default(),
        }
    }

    /// Create a feed and load the first page of `target`.
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] if `config` is invalid, or the error of
    /// the initial load.
    pub async fn open(
        transport: Arc<T>,
        config: FeedConfig,
        target: ConversationTarget,
    ) -> FeedResult<Arc<Self>> {
        config.validate()?;
        let feed = Arc::new(Self::new(transport, config));
        feed.switch_conversation(target).await?;
        Ok(feed)
    }

    /// Configuration the feed was built with.
    #[must_use]
    pub const fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Subscribe to view updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.view.subscribe()
    }

    /// Current view.
    #[must_use]
    pub fn snapshot(&self) -> FeedView {
        self.lock_state().view()
    }

    /// Whether [`ConversationFeed::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.scopes.is_closed()
    }

    /// Cancel every in-flight fetch. Their results are discarded.
    pub fn close(&self) {
        info!("closing conversation feed");
        self.scopes.cancel_all();
    }

    /// Bind to another conversation: cancel everything in flight for the
    /// previous one, reset state, then load the initial snapshot.
    ///
    /// # Errors
    /// Returns an error if the initial load fails.
    pub async fn switch_conversation(&self, target: ConversationTarget) -> FeedResult<LoadOutcome> {
        self.scopes.renew();
        {
            let mut state = self.lock_state();
            let generation = state.switch_to(target.clone());
            info!(%target, generation, "switched conversation");
            self.publish(&state);
        }
        self.load_initial().await
    }

    /// Fetch the latest page of the current conversation and replace the
    /// sequence with it.
    ///
    /// # Errors
    /// Returns [`SyncError::NoConversation`] if no conversation is bound, or
    /// the transport error.
    pub async fn load_initial(&self) -> FeedResult<LoadOutcome> {
        let (target, generation) = {
            let state = self.lock_state();
            let target = state.target().cloned().ok_or(SyncError::NoConversation)?;
            (target, state.generation())
        };
        let token = self.scopes.begin_initial();

        let page = match self.fetch_scoped(&token, &target, None).await {
            Err(SyncError::Cancelled) => {
                debug!(%target, "initial load cancelled");
                return Ok(LoadOutcome::Cancelled);
            }
            other => other?,
        };

        let mut state = self.lock_state();
        if !Self::still_current(&state, generation, &token) {
            debug!(%target, "discarding superseded initial page");
            return Ok(LoadOutcome::Cancelled);
        }
        let rows = state.apply_snapshot(page);
        debug!(%target, rows, "initial snapshot applied");
        self.publish(&state);
        Ok(LoadOutcome::Applied { rows })
    }

    /// Fetch one older page and append it at the oldest end.
    ///
    /// A no-op while another older load runs or when no older cursor exists.
    ///
    /// # Errors
    /// Returns the transport or decoding error; state is left untouched.
    pub async fn load_older(&self) -> FeedResult<LoadOutcome> {
        let Some(_flight) = self.older_flight.try_begin() else {
            debug!("older load already in flight");
            return Ok(LoadOutcome::InFlight);
        };

        let Some((target, cursor, generation)) =
            self.capture(|state| state.cursors().older().cloned())
        else {
            debug!("no older cursor; nothing to load");
            return Ok(LoadOutcome::Exhausted);
        };
        let token = self.scopes.child();

        let page = match self.fetch_scoped(&token, &target, Some(&cursor)).await {
            Err(SyncError::Cancelled) => {
                debug!(%target, "older load cancelled");
                return Ok(LoadOutcome::Cancelled);
            }
            other => other?,
        };

        let mut state = self.lock_state();
        if !Self::still_current(&state, generation, &token) {
            debug!(%target, "discarding superseded older page");
            return Ok(LoadOutcome::Cancelled);
        }
        let rows = state.apply_older(page);
        debug!(
            %target,
            %cursor,
            rows,
            exhausted = state.cursors().older().is_none(),
            "older page applied"
        );
        self.publish(&state);
        Ok(LoadOutcome::Applied { rows })
    }

    /// Fetch one newer page, merge it at the newest end and drop pending echoes.
    ///
    /// A no-op while another newer load runs or when no newer cursor exists.
    ///
    /// # Errors
    /// Returns the transport or decoding error; state is left untouched.
    pub async fn poll_newer(&self) -> FeedResult<LoadOutcome> {
        let Some(_flight) = self.newer_flight.try_begin() else {
            debug!("newer poll already in flight");
            return Ok(LoadOutcome::InFlight);
        };

        let Some((target, cursor, generation)) =
            self.capture(|state| state.cursors().newer().cloned())
        else {
            debug!("no newer cursor; skipping poll");
            return Ok(LoadOutcome::Exhausted);
        };
        let token = self.scopes.child();

        let page = match self.fetch_scoped(&token, &target, Some(&cursor)).await {
            Err(SyncError::Cancelled) => {
                debug!(%target, "newer poll cancelled");
                return Ok(LoadOutcome::Cancelled);
            }
            other => other?,
        };

        let mut state = self.lock_state();
        if !Self::still_current(&state, generation, &token) {
            debug!(%target, "discarding superseded newer page");
            return Ok(LoadOutcome::Cancelled);
        }
        let merge = state.apply_newer(page);
        if merge.inserted > 0 || merge.echoes_cleared > 0 {
            info!(
                %target,
                rows = merge.inserted,
                echoes_cleared = merge.echoes_cleared,
                "newer page applied"
            );
        }
        self.publish(&state);
        Ok(LoadOutcome::Applied {
            rows: merge.inserted,
        })
    }

    /// Show `text` immediately as a pending echo, send it, and reconcile the
    /// echo with the server's answer.
    ///
    /// On failure the echo stays in the pending list flagged as failed.
    ///
    /// # Errors
    /// Returns [`SyncError::EmptyMessage`], [`SyncError::NoConversation`] or
    /// the send error.
    pub async fn submit(&self, text: impl Into<String>) -> FeedResult<Message> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SyncError::EmptyMessage);
        }

        let (target, generation, local_id) = {
            let mut state = self.lock_state();
            let target = state.target().cloned().ok_or(SyncError::NoConversation)?;
            let local_id =
                state.push_echo(text.clone(), self.config.local_sender.clone(), Utc::now());
            self.publish(&state);
            (target, state.generation(), local_id)
        };
        debug!(%target, %local_id, "local echo queued");

        let result = self.transport.send_message(&target, &text).await;

        let mut state = self.lock_state();
        let current = state.generation() == generation;
        match result {
            Ok(message) => {
                if current {
                    let reconciled = state.confirm_echo(&local_id, message.clone());
                    debug!(
                        %local_id,
                        server_id = %message.id,
                        reinserted = reconciled == Reconciled::Reinserted,
                        "local echo confirmed"
                    );
                    self.publish(&state);
                } else {
                    debug!(%local_id, "conversation changed; confirmed send not applied");
                }
                Ok(message)
            }
            Err(err) => {
                warn!(%target, %local_id, error = %err, "send failed");
                if current && state.fail_echo(&local_id, err.to_string()) {
                    self.publish(&state);
                }
                Err(err)
            }
        }
    }

    /// Remove an echo from the pending list, typically after a failed send.
    pub fn dismiss_echo(&self, id: &MessageId) -> bool {
        let mut state = self.lock_state();
        let removed = state.dismiss_echo(id).is_some();
        if removed {
            self.publish(&state);
        }
        removed
    }

    fn lock_state(&self) -> MutexGuard<'_, FeedState> {
        lock(&self.state)
    }

    fn publish(&self, state: &FeedState) {
        self.view.send_replace(state.view());
    }

    /// Target, cursor and generation for a directional load, if a cursor exists.
    fn capture<F>(&self, cursor: F) -> Option<(ConversationTarget, Cursor, u64)>
    where
        F: FnOnce(&FeedState) -> Option<Cursor>,
    {
        let state = self.lock_state();
        let target = state.target().cloned()?;
        let cursor = cursor(&state)?;
        Some((target, cursor, state.generation()))
    }

    fn still_current(state: &FeedState, generation: u64, token: &CancellationToken) -> bool {
        state.generation() == generation && !token.is_cancelled()
    }

    async fn fetch_scoped(
        &self,
        token: &CancellationToken,
        target: &ConversationTarget,
        cursor: Option<&Cursor>,
    ) -> FeedResult<Page> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(SyncError::Cancelled),
            page = self.transport.fetch_page(target, cursor) => page,
        }
    }
}
