//! HTTP transport backed by `reqwest`.
//!
//! `GET  <base>/api/account/<a>/conversation/<c>/messages[?cursor=<token>]`
//! `POST <base>/api/account/<a>/conversation/<c>/messages` with `{"text": ...}`

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::model::config::FeedConfig;
use crate::model::errors::{FeedResult, SyncError};
use crate::model::message::{ConversationTarget, Message};
use crate::model::page::{Cursor, Page};
use crate::transport::FeedTransport;

/// Query parameter carrying the pagination token.
const CURSOR_PARAM: &str = "cursor";

/// Body of a send request.
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    text: &'a str,
}

/// Messages API client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport from the feed configuration.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &FeedConfig) -> FeedResult<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Config(format!(
                "base_url cannot be a base: {}",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Build the messages URL for a target, with an optional cursor.
    ///
    /// # Errors
    /// Returns an error if the base URL cannot take path segments.
    pub fn messages_url(
        &self,
        target: &ConversationTarget,
        cursor: Option<&Cursor>,
    ) -> FeedResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::Config(format!("base_url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(target.path_segments());

        if let Some(cursor) = cursor {
            url.query_pairs_mut()
                .append_pair(CURSOR_PARAM, cursor.as_str());
        }

        Ok(url)
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn fetch_page(
        &self,
        target: &ConversationTarget,
        cursor: Option<&Cursor>,
    ) -> FeedResult<Page> {
        let url = self.messages_url(target, cursor)?;
        tracing::debug!(%url, "fetching page");

        let response = self.client.get(url).send().await?;
        let body = read_success_body(response).await?;
        decode(&body)
    }

    async fn send_message(&self, target: &ConversationTarget, text: &str) -> FeedResult<Message> {
        let url = self.messages_url(target, None)?;
        tracing::debug!(%url, len = text.len(), "sending message");

        let response = self
            .client
            .post(url)
            .json(&SendRequest { text })
            .send()
            .await?;
        let body = read_success_body(response).await?;
        decode(&body)
    }
}

/// Turn a non-2xx status into [`SyncError::Transport`], otherwise read the body.
async fn read_success_body(response: reqwest::Response) -> FeedResult<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Transport {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        });
    }
    Ok(response.text().await?)
}

fn decode<T: DeserializeOwned>(body: &str) -> FeedResult<T> {
    serde_json::from_str(body).map_err(|err| SyncError::MalformedResponse(err.to_string()))
}
