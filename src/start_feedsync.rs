//! Startup helpers for the `feedsync` binary.
//!
//! Follows one conversation over HTTP: loads the latest page, polls for
//! newer messages, and logs every message as it becomes visible.

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;

use crate::engine::{ConversationFeed, NewerPoller};
use crate::model::config::FeedConfig;
use crate::model::errors::{FeedResult, SyncError};
use crate::model::message::{ConversationTarget, Message, MessageId};
use crate::sync::FeedView;
use crate::transport::HttpTransport;

/// Environment variable naming the account to follow.
pub const ENV_ACCOUNT_ID: &str = "FEEDSYNC_ACCOUNT_ID";
/// Environment variable naming the conversation to follow.
pub const ENV_CONVERSATION_ID: &str = "FEEDSYNC_CONVERSATION_ID";

/// Run the follower until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting feedsync v{}", env!("CARGO_PKG_VERSION"));

    let config = match FeedConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };
    tracing::info!("Messages API: {}", config.base_url);

    let target = match target_from_lookup(|key| std::env::var(key).ok()) {
        Ok(target) => target,
        Err(e) => {
            tracing::error!("Invalid conversation: {e}");
            return ExitCode::from(1);
        }
    };

    let transport = match HttpTransport::new(&config) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            tracing::error!("Failed to create HTTP client: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(follow(transport, config, target)) {
        tracing::error!("Feed error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Read the conversation to follow from `FEEDSYNC_ACCOUNT_ID` and
/// `FEEDSYNC_CONVERSATION_ID`.
///
/// # Errors
/// Returns an error if either variable is missing or blank.
pub fn target_from_lookup<F>(lookup: F) -> FeedResult<ConversationTarget>
where
    F: Fn(&str) -> Option<String>,
{
    let account = lookup(ENV_ACCOUNT_ID)
        .ok_or_else(|| SyncError::Config(format!("{ENV_ACCOUNT_ID} is not set")))?;
    let conversation = lookup(ENV_CONVERSATION_ID)
        .ok_or_else(|| SyncError::Config(format!("{ENV_CONVERSATION_ID} is not set")))?;
    ConversationTarget::new(account, conversation)
}

/// Open the conversation, poll it, and log new messages until Ctrl-C.
///
/// # Errors
/// Returns an error if the initial load fails.
pub async fn follow(
    transport: Arc<HttpTransport>,
    config: FeedConfig,
    target: ConversationTarget,
) -> FeedResult<()> {
    tracing::info!(%target, "opening conversation");
    let feed = ConversationFeed::open(transport, config, target).await?;
    let poller = NewerPoller::spawn(Arc::clone(&feed))?;

    let mut updates = feed.subscribe();
    let mut seen = HashSet::new();
    log_messages(&fresh_messages(&updates.borrow_and_update(), &mut seen));

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!("Failed to listen for Ctrl-C: {e}");
                }
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = updates.borrow_and_update().clone();
                log_messages(&fresh_messages(&view, &mut seen));
            }
        }
    }

    tracing::info!("Shutting down");
    feed.close();
    poller.stop().await;
    Ok(())
}

/// Messages in `view` not seen before, oldest first.
fn fresh_messages<'a>(view: &'a FeedView, seen: &mut HashSet<MessageId>) -> Vec<&'a Message> {
    view.messages
        .iter()
        .rev()
        .filter(|message| seen.insert(message.id.clone()))
        .collect()
}

fn log_messages(messages: &[&Message]) {
    for message in messages {
        tracing::info!(
            id = %message.id,
            sender = %message.sender.name,
            at = %message.created_at,
            "{}",
            message.text
        );
    }
}
