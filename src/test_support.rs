//! Fixtures and a scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{oneshot, watch};

use crate::model::errors::{FeedResult, SyncError};
use crate::model::message::{ConversationTarget, Message, MessageId, Sender};
use crate::model::page::{Cursor, Page, SortOrder};
use crate::transport::FeedTransport;

pub fn message(id: &str, text: &str) -> Message {
    Message {
        id: MessageId::from(id),
        text: text.to_string(),
        created_at: Utc
            .timestamp_opt(1_700_000_000, 0)
            .single()
            .unwrap_or_default(),
        sender: Sender::new("u1", "Ada"),
    }
}

pub fn page(rows: Vec<Message>, sort: SortOrder, next: Option<&str>, prev: Option<&str>) -> Page {
    Page::new(rows, sort, next.map(Cursor::from), prev.map(Cursor::from))
}

pub fn ids(rows: &[Message]) -> Vec<&str> {
    rows.iter().map(|row| row.id.as_str()).collect()
}

pub fn target(conversation: &str) -> ConversationTarget {
    ConversationTarget::new("1", conversation).unwrap()
}

enum Step<T> {
    Ready(FeedResult<T>),
    Gated(oneshot::Receiver<FeedResult<T>>),
}

impl<T> Step<T> {
    async fn resolve(self) -> FeedResult<T> {
        match self {
            Self::Ready(result) => result,
            Self::Gated(rx) => rx.await.unwrap_or(Err(SyncError::Cancelled)),
        }
    }
}

/// Transport that replays queued responses in order and records requests.
pub struct ScriptedTransport {
    pages: Mutex<VecDeque<Step<Page>>>,
    sends: Mutex<VecDeque<Step<Message>>>,
    fetched: Mutex<Vec<(ConversationTarget, Option<Cursor>)>>,
    sent: Mutex<Vec<String>>,
    fetch_count: watch::Sender<usize>,
    send_count: watch::Sender<usize>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            sends: Mutex::new(VecDeque::new()),
            fetched: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            fetch_count: watch::Sender::new(0),
            send_count: watch::Sender::new(0),
        }
    }
}

impl ScriptedTransport {
    pub fn push_page(&self, page: Page) {
        self.pages.lock().unwrap().push_back(Step::Ready(Ok(page)));
    }

    pub fn push_page_error(&self, err: SyncError) {
        self.pages.lock().unwrap().push_back(Step::Ready(Err(err)));
    }

    /// Queue a page that resolves only when the returned sender fires.
    pub fn push_gated_page(&self) -> oneshot::Sender<FeedResult<Page>> {
        let (tx, rx) = oneshot::channel();
        self.pages.lock().unwrap().push_back(Step::Gated(rx));
        tx
    }

    pub fn push_send(&self, result: FeedResult<Message>) {
        self.sends.lock().unwrap().push_back(Step::Ready(result));
    }

    pub fn push_gated_send(&self) -> oneshot::Sender<FeedResult<Message>> {
        let (tx, rx) = oneshot::channel();
        self.sends.lock().unwrap().push_back(Step::Gated(rx));
        tx
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetch_count.borrow()
    }

    pub fn fetched_cursors(&self) -> Vec<Option<String>> {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cursor)| cursor.as_ref().map(ToString::to_string))
            .collect()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub async fn wait_for_fetches(&self, count: usize) {
        let mut rx = self.fetch_count.subscribe();
        rx.wait_for(|seen| *seen >= count).await.unwrap();
    }

    pub async fn wait_for_sends(&self, count: usize) {
        let mut rx = self.send_count.subscribe();
        rx.wait_for(|seen| *seen >= count).await.unwrap();
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn fetch_page(
        &self,
        target: &ConversationTarget,
        cursor: Option<&Cursor>,
    ) -> FeedResult<Page> {
        self.fetched
            .lock()
            .unwrap()
            .push((target.clone(), cursor.cloned()));
        let step = self.pages.lock().unwrap().pop_front();
        self.fetch_count.send_modify(|count| *count += 1);
        match step {
            Some(step) => step.resolve().await,
            None => Err(SyncError::MalformedResponse("script exhausted".to_string())),
        }
    }

    async fn send_message(&self, _target: &ConversationTarget, text: &str) -> FeedResult<Message> {
        self.sent.lock().unwrap().push(text.to_string());
        let step = self.sends.lock().unwrap().pop_front();
        self.send_count.send_modify(|count| *count += 1);
        match step {
            Some(step) => step.resolve().await,
            None => Err(SyncError::MalformedResponse("script exhausted".to_string())),
        }
    }
}
