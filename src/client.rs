//! Session projector: drives a send and owns the conversation
//!
//! [`ChatClient`] is the only component that holds user-visible state. A send
//! runs through these steps:
//!
//! ```text
//! send(query)
//!     │
//!     ├─> reject if empty (InvalidInput) or the client is busy (Busy)
//!     │
//!     ├─> UserPromptSubmit hooks (can block or rewrite the query)
//!     │
//!     ├─> optimistic user message appended, session enters Streaming
//!     │
//!     ├─> POST /chat/stream, body read chunk by chunk
//!     │       │
//!     │       └─> FrameReassembler → decode → ToolCallResult hooks → StreamSession::apply
//!     │
//!     ├─> Completed: assistant message appended
//!     ├─> Failed:    Error::Protocol, nothing appended
//!     │
//!     └─> session reset and active flag cleared on every exit path
//! ```
//!
//! # State and Locking
//!
//! Shared state sits behind one `parking_lot::Mutex`. The lock is only taken
//! between suspension points and never held across an `.await`, so events are
//! applied strictly in arrival order and readers never see a half-applied
//! event. Exclusivity is enforced by an `AtomicBool` rather than the lock: a
//! send, a history refresh, and a history clear each claim it for their whole
//! duration, so a rejected call never touches the conversation.
//!
//! # Cancellation and Timeouts
//!
//! [`ChatClient::cancel`] trips a `CancellationToken` watched by every read.
//! Dropping the `send` future has the same effect. In both cases the cleanup
//! guard resets the session and no partial assistant text is persisted. Each
//! read waits at most `read_timeout` seconds before failing with
//! [`Error::Timeout`].
//!
//! # Observing Progress
//!
//! [`ChatClient::subscribe`] hands out a `tokio::sync::watch` receiver that
//! gets a fresh [`StreamSnapshot`] after every applied event.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use log::{debug, error, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::DecodeError;
use crate::event::{self, StreamEvent};
use crate::frame::FrameReassembler;
use crate::hooks::{PromptSubmitEvent, ToolCallResultEvent};
use crate::retry::{is_retryable_error, retry_with_backoff_conditional};
use crate::session::{Applied, StreamPhase, StreamSession, StreamSnapshot};
use crate::transport::{ChatTransport, CredentialProvider, HttpTransport, NoCredentials};
use crate::types::{ChatOptions, ChatRequest, Message, PreviewData, ToolCall};
use crate::{Error, Result};

/// Result of a send that reached `end` (or a clean end of body).
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Assistant message appended to the conversation
    pub message: Message,
    /// Tool calls as they stood when the stream finished
    pub tool_calls: Vec<ToolCall>,
    /// Frames that could not be decoded and were skipped
    pub decode_errors: Vec<DecodeError>,
}

#[derive(Debug, Default)]
struct ChatState {
    conversation: Vec<Message>,
    session: StreamSession,
    input: String,
    last_error: Option<String>,
    cancel: Option<CancellationToken>,
}

struct Inner {
    options: ChatOptions,
    transport: Arc<dyn ChatTransport>,
    state: Mutex<ChatState>,
    /// Held by a send or a history operation
    busy: AtomicBool,
    /// Held by a send only
    active: AtomicBool,
    live: watch::Sender<StreamSnapshot>,
}

impl Inner {
    fn claim(&self) -> Result<()> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| Error::Busy)
    }

    fn publish(&self, state: &ChatState) {
        self.live
            .send_replace(state.session.snapshot(state.last_error.clone()));
    }
}

/// Resets transient state when a send ends, however it ends.
struct ActiveGuard<'a> {
    inner: &'a Inner,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.session.reset();
            state.cancel = None;
            self.inner.publish(&state);
        }
        self.inner.active.store(false, Ordering::SeqCst);
        self.inner.busy.store(false, Ordering::SeqCst);
    }
}

/// Releases the exclusive claim taken by a history operation.
struct ClaimGuard<'a> {
    inner: &'a Inner,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.inner.busy.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct StreamReport {
    events: usize,
    decode_errors: Vec<DecodeError>,
}

/// Streaming chat client bound to one conversation.
///
/// Clones are cheap and share the conversation, the session, and the input
/// buffer, so one clone can stream while another cancels or renders.
///
/// # Examples
///
/// ```rust,no_run
/// use carabao_chat::{ChatClient, ChatOptions};
///
/// # async fn example() -> carabao_chat::Result<()> {
/// let client = ChatClient::new(
///     ChatOptions::builder()
///         .base_url("http://localhost:8000/api/v1")
///         .build()?,
/// )?;
///
/// let outcome = client.send("Top 5 customers by revenue").await?;
/// println!("{}", outcome.message.content);
/// for call in &outcome.tool_calls {
///     println!("{} -> {:?}", call.name, call.status);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("options", &self.inner.options)
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

impl ChatClient {
    /// Client talking HTTP to `options.base_url` without credentials.
    pub fn new(options: ChatOptions) -> Result<Self> {
        Self::with_credentials(options, Arc::new(NoCredentials))
    }

    /// Client talking HTTP, attaching a bearer token from `credentials`.
    pub fn with_credentials(
        options: ChatOptions,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let transport = HttpTransport::new(options.clone(), credentials)?;
        Ok(Self::with_transport(options, Arc::new(transport)))
    }

    /// Client driven by any transport.
    pub fn with_transport(options: ChatOptions, transport: Arc<dyn ChatTransport>) -> Self {
        let (live, _) = watch::channel(StreamSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                options,
                transport,
                state: Mutex::new(ChatState::default()),
                busy: AtomicBool::new(false),
                active: AtomicBool::new(false),
                live,
            }),
        }
    }

    pub fn options(&self) -> &ChatOptions {
        &self.inner.options
    }

    // ------------------------------------------------------------------
    // Presentation surface
    // ------------------------------------------------------------------

    pub fn set_input(&self, input: impl Into<String>) {
        self.inner.state.lock().input = input.into();
    }

    pub fn input(&self) -> String {
        self.inner.state.lock().input.clone()
    }

    /// True when the stored input has something besides whitespace.
    pub fn input_is_valid(&self) -> bool {
        !self.inner.state.lock().input.trim().is_empty()
    }

    /// True from the moment a send is accepted until its cleanup has run.
    pub fn is_streaming(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn streaming_text(&self) -> String {
        self.inner.state.lock().session.text().to_string()
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.inner.state.lock().session.tool_calls().to_vec()
    }

    /// Message shown for the last failed send, cleared when a new one starts.
    pub fn last_error(&self) -> Option<String> {
        self.inner.state.lock().last_error.clone()
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        let state = self.inner.state.lock();
        state.session.snapshot(state.last_error.clone())
    }

    /// Receiver updated after every applied event and on every reset.
    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.inner.live.subscribe()
    }

    pub fn conversation(&self) -> Vec<Message> {
        self.inner.state.lock().conversation.clone()
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Sends the stored input, clearing it.
    ///
    /// Whitespace-only input is left in place and rejected with
    /// [`Error::InvalidInput`]. If the client is busy the input is put back and
    /// [`Error::Busy`] is returned.
    pub async fn send_input(&self) -> Result<SendOutcome> {
        let input = {
            let mut state = self.inner.state.lock();
            if state.input.trim().is_empty() {
                return Err(Error::invalid_input("query is empty"));
            }
            std::mem::take(&mut state.input)
        };
        let result = self.send(&input).await;
        if matches!(result, Err(Error::Busy)) {
            let mut state = self.inner.state.lock();
            if state.input.is_empty() {
                state.input = input;
            }
        }
        result
    }

    /// Sends `query` and streams the response into the conversation.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`]: empty or whitespace-only query
    /// - [`Error::Busy`]: another send or a history operation is running;
    ///   nothing is changed
    /// - [`Error::Blocked`]: a prompt hook refused the query
    /// - [`Error::Protocol`]: the server sent an `error` event
    /// - [`Error::Cancelled`]: [`ChatClient::cancel`] was called
    /// - [`Error::Timeout`], [`Error::Api`], [`Error::Http`], [`Error::Stream`]:
    ///   transport failures
    ///
    /// Every error except `InvalidInput` and `Busy` is also recorded as
    /// [`ChatClient::last_error`]. The optimistic user message stays in the
    /// conversation whatever happens after it was appended.
    pub async fn send(&self, query: &str) -> Result<SendOutcome> {
        if query.trim().is_empty() {
            return Err(Error::invalid_input("query is empty"));
        }

        if let Err(e) = self.inner.claim() {
            debug!("send rejected: client is busy");
            return Err(e);
        }
        self.inner.active.store(true, Ordering::SeqCst);
        let _guard = ActiveGuard { inner: &self.inner };

        let cancel = CancellationToken::new();
        {
            let mut state = self.inner.state.lock();
            state.last_error = None;
            state.cancel = Some(cancel.clone());
        }

        let result = self.run_send(query.to_string(), &cancel).await;

        if let Err(e) = &result {
            error!("send failed: {}", e);
            let mut state = self.inner.state.lock();
            state.last_error = Some(format!("Error: {}", e));
            self.inner.publish(&state);
        }
        result
    }

    /// Cancels the active send. Returns false if there was nothing to cancel.
    pub fn cancel(&self) -> bool {
        match self.inner.state.lock().cancel.as_ref() {
            Some(token) if !token.is_cancelled() => {
                debug!("cancelling active send");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    async fn run_send(&self, mut query: String, cancel: &CancellationToken) -> Result<SendOutcome> {
        let hooks = &self.inner.options.hooks;
        if !hooks.prompt_submit.is_empty() {
            let history = self.conversation();
            let event = PromptSubmitEvent::new(query.clone(), history);
            if let Some(decision) = hooks.execute_user_prompt_submit(event).await {
                if !decision.continue_execution() {
                    return Err(Error::blocked(
                        decision.reason().unwrap_or("no reason given"),
                    ));
                }
                if let Some(prompt) = decision.modified_prompt() {
                    debug!("prompt rewritten by hook");
                    query = prompt.to_string();
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        {
            let mut state = self.inner.state.lock();
            state
                .conversation
                .push(Message::user(query.clone(), self.inner.options.owner_id));
            state.session.begin();
            self.inner.publish(&state);
        }

        let report = self
            .stream_response(&ChatRequest::new(query), cancel)
            .await?;
        self.commit(report)
    }

    async fn stream_response(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamReport> {
        let read_timeout = Duration::from_secs(self.inner.options.read_timeout);

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            opened = tokio::time::timeout(read_timeout, self.inner.transport.open_stream(request)) => {
                opened.map_err(|_| Error::timeout())??
            }
        };

        let mut frames = FrameReassembler::with_max_frame_bytes(self.inner.options.max_frame_bytes);
        let mut report = StreamReport::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = tokio::time::timeout(read_timeout, stream.next()) => {
                    next.map_err(|_| Error::timeout())?
                }
            };

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            for frame in frames.feed(&chunk)? {
                if self.process_frame(&frame, &mut report).await == Applied::Finished {
                    return Ok(report);
                }
            }
        }

        if let Some(frame) = frames.flush() {
            self.process_frame(&frame, &mut report).await;
        }
        Ok(report)
    }

    async fn process_frame(&self, frame: &str, report: &mut StreamReport) -> Applied {
        let event = match event::decode(frame) {
            Ok(Some(event)) => event,
            Ok(None) => return Applied::Ignored,
            Err(e) => {
                warn!("{}", e);
                report.decode_errors.push(e);
                return Applied::Ignored;
            }
        };
        report.events += 1;

        let Some(event) = self.intercept(event).await else {
            return Applied::Ignored;
        };

        let mut state = self.inner.state.lock();
        let applied = state.session.apply(event);
        if applied != Applied::Ignored {
            self.inner.publish(&state);
        }
        applied
    }

    /// Runs tool-result hooks. `None` means a hook dropped the event.
    async fn intercept(&self, event: StreamEvent) -> Option<StreamEvent> {
        let hooks = &self.inner.options.hooks;
        match event {
            StreamEvent::ToolCallResult {
                tool_id,
                tool_name,
                content,
                status,
            } if !hooks.tool_call_result.is_empty() => {
                let hook_event = ToolCallResultEvent::new(
                    tool_id.clone(),
                    tool_name.clone(),
                    content.clone(),
                    status.clone(),
                );
                let content = match hooks.execute_tool_call_result(hook_event).await {
                    Some(decision) if !decision.continue_execution() => {
                        debug!(
                            "tool result {:?} dropped by hook: {}",
                            tool_id,
                            decision.reason().unwrap_or("")
                        );
                        return None;
                    }
                    Some(decision) => decision.modified_result().cloned().unwrap_or(content),
                    None => content,
                };
                Some(StreamEvent::ToolCallResult {
                    tool_id,
                    tool_name,
                    content,
                    status,
                })
            }
            other => Some(other),
        }
    }

    fn commit(&self, report: StreamReport) -> Result<SendOutcome> {
        let mut state = self.inner.state.lock();

        if state.session.is_active() {
            if report.events == 0 {
                return Err(Error::stream("response ended before any event arrived"));
            }
            warn!(
                "response ended without an `end` event after {} events",
                report.events
            );
            state.session.close();
        }

        match state.session.phase().clone() {
            StreamPhase::Completed => {
                let message =
                    Message::assistant(state.session.final_text(), self.inner.options.owner_id);
                let tool_calls = state.session.tool_calls().to_vec();
                state.conversation.push(message.clone());
                debug!(
                    "committed assistant message ({} chars, {} tool calls)",
                    message.content.len(),
                    tool_calls.len()
                );
                Ok(SendOutcome {
                    message,
                    tool_calls,
                    decode_errors: report.decode_errors,
                })
            }
            StreamPhase::Failed { message, code } => Err(Error::protocol(message, code)),
            StreamPhase::Idle | StreamPhase::Streaming => {
                Err(Error::stream("stream session was reset mid-flight"))
            }
        }
    }

    // ------------------------------------------------------------------
    // History and previews
    // ------------------------------------------------------------------

    /// Replaces the local conversation with the server's copy.
    ///
    /// Returns the number of messages loaded. Transient failures are retried
    /// per `options.retry`. Sends are rejected with [`Error::Busy`] until the
    /// refresh has finished.
    pub async fn refresh_history(&self) -> Result<usize> {
        self.inner.claim()?;
        let _guard = ClaimGuard { inner: &self.inner };

        let messages = retry_with_backoff_conditional(
            self.inner.options.retry.clone(),
            || self.inner.transport.list_messages(),
            is_retryable_error,
        )
        .await?;

        let mut state = self.inner.state.lock();
        let count = messages.len();
        state.conversation = messages;
        debug!("loaded {} messages", count);
        Ok(count)
    }

    /// Deletes the conversation on the server, then locally.
    ///
    /// Sends are rejected with [`Error::Busy`] until the clear has finished.
    pub async fn clear_history(&self) -> Result<()> {
        self.inner.claim()?;
        let _guard = ClaimGuard { inner: &self.inner };

        self.inner.transport.clear_history().await?;

        let mut state = self.inner.state.lock();
        state.conversation.clear();
        state.last_error = None;
        self.inner.publish(&state);
        Ok(())
    }

    /// Fetches the data behind a `show_query_store` tool result.
    ///
    /// See [`ToolCall::query_id`].
    pub async fn fetch_preview(&self, query_id: u64) -> Result<PreviewData> {
        retry_with_backoff_conditional(
            self.inner.options.retry.clone(),
            || self.inner.transport.fetch_preview(query_id),
            is_retryable_error,
        )
        .await
    }
}
