//! # Carabao Chat
//!
//! Client for a chat backend that streams its answers as newline-delimited
//! JSON. Each line of the response body is one event: text fragments, tool
//! calls and their results, an optional authoritative completion, and a
//! terminal `end` or `error`.
//!
//! ## Pipeline
//!
//! ```text
//! bytes ──> FrameReassembler ──> decode ──> StreamSession ──> ChatClient
//!           (lines, UTF-8)       (events)   (state machine)   (conversation)
//! ```
//!
//! - **frame**: turns arbitrary byte chunks into complete text lines, holding
//!   back partial lines and split multi-byte characters
//! - **event**: parses a line into a [`StreamEvent`]; malformed lines become a
//!   [`DecodeError`] and the stream goes on
//! - **session**: applies events to the transient state of one response
//! - **client**: owns the conversation, drives sends, exposes live state
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use carabao_chat::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let options = ChatOptions::builder()
//!         .base_url("http://localhost:8000/api/v1")
//!         .read_timeout(30)
//!         .build()?;
//!
//!     let client = ChatClient::new(options)?;
//!     let mut live = client.subscribe();
//!
//!     tokio::spawn(async move {
//!         while live.changed().await.is_ok() {
//!             let snapshot = live.borrow_and_update().clone();
//!             print!("\r{}", snapshot.text);
//!         }
//!     });
//!
//!     let outcome = client.send("How many orders shipped last week?").await?;
//!     println!("\n{}", outcome.message.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the `log` facade and installs no logger. Frames that
//! fail to decode are reported at `warn`, state transitions at `debug`.

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Session projector: `ChatClient` and the send lifecycle.
mod client;

/// Environment-driven defaults and endpoint paths.
mod config;

/// `Error`, `Result`, and the frame-level `DecodeError`.
mod error;

/// Prompt and tool-result interception.
mod hooks;

/// Options, messages, tool calls, and preview payloads.
mod types;

/// Byte chunks to NDJSON lines.
pub mod frame;

/// NDJSON lines to typed events.
pub mod event;

/// Per-response state machine.
pub mod session;

/// HTTP transport and credential providers.
pub mod transport;

/// Exponential backoff used for history and preview fetches.
pub mod retry;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

// --- Client ---

pub use client::{ChatClient, SendOutcome};

// --- Configuration ---

pub use config::{
    BASE_URL_ENV, CLEAR_PATH, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT,
    LIST_PATH, PREVIEW_PATH, READ_TIMEOUT_ENV, STREAM_PATH, get_base_url, get_read_timeout,
};

// --- Error Handling ---

pub use error::{DecodeError, Error, Result};

// --- Stream Pipeline ---

pub use event::{StreamEvent, decode};
pub use frame::{DEFAULT_MAX_FRAME_BYTES, FrameReassembler};
pub use session::{Applied, StreamPhase, StreamSession, StreamSnapshot};

// --- Lifecycle Hooks ---

pub use hooks::{HookDecision, Hooks, PromptSubmitEvent, ToolCallResultEvent};

// --- Transport ---

pub use transport::{
    ByteStream, ChatTransport, CredentialProvider, HttpTransport, NoCredentials, StaticToken,
};

// --- Core Types ---

pub use types::{
    ChatOptions, ChatOptionsBuilder, ChatRequest, Message, MessageId, MessageRole, PreviewData,
    PreviewResponseType, SHOW_QUERY_STORE, ToolCall, ToolCallStatus, UNKNOWN_TOOL,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The types most callers need.
///
/// ```rust
/// use carabao_chat::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ChatClient, ChatOptions, ChatOptionsBuilder, Error, HookDecision, Hooks, Message,
        MessageRole, PromptSubmitEvent, Result, SendOutcome, StaticToken, StreamSnapshot, ToolCall,
        ToolCallResultEvent, ToolCallStatus,
    };
}
