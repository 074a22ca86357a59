//! HTTP transport and credential plumbing.
//!
//! The client never talks to `reqwest` directly: it goes through the
//! [`ChatTransport`] trait, so the projector can be driven by any byte source.
//! [`HttpTransport`] is the production implementation.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use log::{debug, warn};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::{CLEAR_PATH, LIST_PATH, PREVIEW_PATH, STREAM_PATH};
use crate::types::{ChatOptions, ChatRequest, Message, PreviewData};
use crate::{Error, Result};

/// Ordered body chunks of one streamed response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Backend operations the client depends on.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Starts a streamed chat response.
    ///
    /// Must fail before yielding anything if the backend refuses the request.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream>;

    /// Fetches the stored conversation.
    async fn list_messages(&self) -> Result<Vec<Message>>;

    /// Deletes the stored conversation.
    async fn clear_history(&self) -> Result<()>;

    /// Fetches the data behind a stored query.
    async fn fetch_preview(&self, query_id: u64) -> Result<PreviewData>;
}

/// Source of the bearer token, consulted on every request.
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` to send the request unauthenticated.
    fn token(&self) -> Option<String>;

    /// Called when the backend answers 401.
    fn invalidate(&self) {}
}

/// Never authenticates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn token(&self) -> Option<String> {
        None
    }
}

/// A fixed token that is forgotten after the backend rejects it.
#[derive(Debug, Default)]
pub struct StaticToken {
    token: Mutex<Option<String>>,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn invalidate(&self) {
        self.token.lock().take();
    }
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    options: ChatOptions,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.options.base_url)
            .finish()
    }
}

impl HttpTransport {
    /// Builds the transport.
    ///
    /// No overall request timeout is set: a streamed response may legitimately
    /// run for minutes. Stalls are caught by the client's idle read timeout.
    pub fn new(options: ChatOptions, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(options.connect_timeout))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            options,
            credentials,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            debug!("backend rejected credentials; invalidating token");
            self.credentials.invalidate();
        }

        let body = response.text().await.unwrap_or_else(|e| {
            warn!("Failed to read error response body: {}", e);
            String::new()
        });
        let body = if body.is_empty() {
            status.canonical_reason().unwrap_or("").to_string()
        } else {
            body
        };
        Err(Error::api(status.as_u16(), body))
    }

    /// Reads the whole body and decodes it as JSON.
    ///
    /// A body that arrives intact but does not parse is [`Error::Json`], not a
    /// transport failure, so it is never retried.
    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response.bytes().await.map_err(Error::Http)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        let url = self.options.endpoint(STREAM_PATH);
        debug!("POST {}", url);

        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await
            .map_err(Error::Http)?;
        let response = self.check_status(response).await?;

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(Error::Http)),
        ))
    }

    async fn list_messages(&self) -> Result<Vec<Message>> {
        let url = self.options.endpoint(LIST_PATH);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(Error::Http)?;
        let response = self.check_status(response).await?;
        Self::read_json(response).await
    }

    async fn clear_history(&self) -> Result<()> {
        let url = self.options.endpoint(CLEAR_PATH);
        let response = self
            .authorize(self.client.post(&url))
            .send()
            .await
            .map_err(Error::Http)?;
        self.check_status(response).await?;
        Ok(())
    }

    async fn fetch_preview(&self, query_id: u64) -> Result<PreviewData> {
        let url = self
            .options
            .endpoint(&format!("{}/{}", PREVIEW_PATH, query_id));
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(Error::Http)?;
        let response = self.check_status(response).await?;
        Self::read_json(response).await
    }
}
