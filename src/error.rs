//! Error types for the chat client

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the client
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Non-2xx response from the chat backend
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Byte stream failed mid-read
    #[error("Streaming error: {0}")]
    Stream(String),

    /// The server reported an `error` event
    #[error("{message} ({code})")]
    Protocol { message: String, code: String },

    /// A send is already in flight
    #[error("A response is already streaming")]
    Busy,

    /// The active send was cancelled
    #[error("Request cancelled")]
    Cancelled,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A prompt hook refused the query
    #[error("Prompt blocked by hook: {0}")]
    Blocked(String),

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error from a status code and response body
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Error::Api {
            status,
            body: body.into(),
        }
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new protocol error
    pub fn protocol(message: impl Into<String>, code: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new blocked error
    pub fn blocked(reason: impl Into<String>) -> Self {
        Error::Blocked(reason.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// True for failures of the byte transport itself: bad status, network
    /// failure, broken stream, or timeout.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Api { .. } | Error::Stream(_) | Error::Timeout
        )
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// A single NDJSON frame that could not be decoded into a stream event.
///
/// Decode errors are recovered locally: they are logged and reported in the
/// send outcome, and the stream moves on to the next frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to decode frame ({reason}): {frame}")]
pub struct DecodeError {
    /// The offending frame text
    pub frame: String,
    /// What was wrong with it
    pub reason: String,
}

impl DecodeError {
    pub fn new(frame: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            frame: frame.into(),
            reason: reason.into(),
        }
    }
}
