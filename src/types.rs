//! Core types for the chat client

use crate::config;
use crate::frame::DEFAULT_MAX_FRAME_BYTES;
use crate::hooks::Hooks;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Name reported for a tool call whose start event carried no name.
pub const UNKNOWN_TOOL: &str = "unknown";

/// Tool whose result points at a stored query preview.
pub const SHOW_QUERY_STORE: &str = "show_query_store";

/// Options for configuring a chat client
#[derive(Clone)]
pub struct ChatOptions {
    /// API root, e.g. "http://localhost:8000/api/v1"
    pub base_url: String,

    /// Owner recorded on messages created locally
    pub owner_id: u64,

    /// TCP/TLS connect timeout in seconds
    pub connect_timeout: u64,

    /// Longest wait for the next body chunk, in seconds
    pub read_timeout: u64,

    /// Largest unterminated NDJSON frame accepted
    pub max_frame_bytes: usize,

    /// Backoff for idempotent history and preview fetches
    pub retry: RetryConfig,

    /// Lifecycle hooks for prompt and tool-result interception
    pub hooks: Hooks,
}

impl fmt::Debug for ChatOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatOptions")
            .field("base_url", &self.base_url)
            .field("owner_id", &self.owner_id)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .field("retry", &self.retry)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            base_url: config::DEFAULT_BASE_URL.to_string(),
            owner_id: 0,
            connect_timeout: config::DEFAULT_CONNECT_TIMEOUT,
            read_timeout: config::DEFAULT_READ_TIMEOUT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            retry: RetryConfig::default(),
            hooks: Hooks::new(),
        }
    }
}

impl ChatOptions {
    /// Create a new builder for ChatOptions
    pub fn builder() -> ChatOptionsBuilder {
        ChatOptionsBuilder::default()
    }

    /// Joins an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Builder for ChatOptions
#[derive(Debug, Default)]
pub struct ChatOptionsBuilder {
    base_url: Option<String>,
    owner_id: Option<u64>,
    connect_timeout: Option<u64>,
    read_timeout: Option<u64>,
    max_frame_bytes: Option<usize>,
    retry: Option<RetryConfig>,
    hooks: Hooks,
}

impl ChatOptionsBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn owner_id(mut self, owner_id: u64) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout = Some(seconds);
        self
    }

    pub fn read_timeout(mut self, seconds: u64) -> Self {
        self.read_timeout = Some(seconds);
        self
    }

    pub fn max_frame_bytes(mut self, limit: usize) -> Self {
        self.max_frame_bytes = Some(limit);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validates and builds the options.
    ///
    /// Unset values fall back to the environment (see [`crate::config`]) and
    /// then to the built-in defaults.
    pub fn build(self) -> crate::Result<ChatOptions> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => config::get_base_url(None),
        };
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        if base_url.is_empty() {
            return Err(crate::Error::config("base_url must not be empty"));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(crate::Error::config(format!(
                "base_url must be an http(s) URL, got '{}'",
                base_url
            )));
        }

        let connect_timeout = self
            .connect_timeout
            .unwrap_or(config::DEFAULT_CONNECT_TIMEOUT);
        let read_timeout = self
            .read_timeout
            .unwrap_or_else(|| config::get_read_timeout(config::DEFAULT_READ_TIMEOUT));
        if connect_timeout == 0 || read_timeout == 0 {
            return Err(crate::Error::config("timeouts must be at least one second"));
        }

        let max_frame_bytes = self.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES);
        if max_frame_bytes == 0 {
            return Err(crate::Error::config("max_frame_bytes must be positive"));
        }

        Ok(ChatOptions {
            base_url,
            owner_id: self.owner_id.unwrap_or(0),
            connect_timeout,
            read_timeout,
            max_frame_bytes,
            retry: self.retry.unwrap_or_default(),
            hooks: self.hooks,
        })
    }
}

/// Message author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Message identifier.
///
/// The backend hands out numeric ids; messages created on this side get a
/// UUID so they can never collide with each other or with server ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Numeric(u64),
    Text(String),
}

impl MessageId {
    /// Fresh locally-unique id.
    pub fn generate() -> Self {
        MessageId::Text(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Numeric(id) => write!(f, "{}", id),
            MessageId::Text(id) => f.write_str(id),
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub role: MessageRole,
    pub content: String,
    #[serde(rename = "user_id", default)]
    pub owner_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>, owner_id: u64) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content: content.into(),
            owner_id,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn user(content: impl Into<String>, owner_id: u64) -> Self {
        Self::new(MessageRole::User, content, owner_id)
    }

    pub fn assistant(content: impl Into<String>, owner_id: u64) -> Self {
        Self::new(MessageRole::Assistant, content, owner_id)
    }
}

/// Lifecycle of a server-side tool invocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Running,
    Completed,
    Error,
}

/// A tool invocation reported by the stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub status: ToolCallStatus,
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolCall {
    pub fn running(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ToolCallStatus::Running,
            arguments,
            result: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ToolCallStatus::Running
    }

    /// Stored query behind a finished `show_query_store` call.
    pub fn query_id(&self) -> Option<u64> {
        if self.name != SHOW_QUERY_STORE {
            return None;
        }
        self.result.as_ref()?.get("query_id")?.as_u64()
    }
}

/// Body of a streaming chat request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub query: String,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

/// How a query preview should be presented
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreviewResponseType {
    Sentence,
    Table,
    BarChart,
    LineChart,
    PieChart,
}

/// Data behind a stored query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewData {
    pub response_type: PreviewResponseType,
    pub status: String,
    #[serde(default)]
    pub output_text: Option<String>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub data: Option<Vec<serde_json::Map<String, Value>>>,
}
