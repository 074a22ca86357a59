//! Stream state machine.
//!
//! A [`StreamSession`] holds everything transient about one in-flight
//! response: the text accumulated from deltas, an authoritative completion
//! text if the server sent one, and the tool calls reported so far. It moves
//! through four phases:
//!
//! ```text
//!            begin()                    end
//!   Idle ───────────────▶ Streaming ──────────▶ Completed
//!     ▲                      │
//!     │                      │ error
//!     │      reset()         ▼
//!     └──────────────────  Failed
//! ```
//!
//! [`StreamSession::apply`] is the only place that mutates it in response to
//! an event, so text, tool calls, and phase can never disagree.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::StreamEvent;
use crate::types::{ToolCall, ToolCallStatus, UNKNOWN_TOOL};

/// Error code used when an `error` event carries none.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

/// Message used when an `error` event carries none.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Idle,
    Streaming,
    Completed,
    Failed { message: String, code: String },
}

impl StreamPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamPhase::Completed | StreamPhase::Failed { .. })
    }
}

/// What [`StreamSession::apply`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// State changed; the stream goes on.
    Updated,
    /// Nothing changed.
    Ignored,
    /// The event ended the stream (`end` or `error`).
    Finished,
}

/// Live view of a session for presentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub is_active: bool,
    pub error: Option<String>,
}

/// Transient state of one streamed response.
#[derive(Debug, Default)]
pub struct StreamSession {
    phase: StreamPhase,
    text: String,
    completion: Option<String>,
    tool_calls: Vec<ToolCall>,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh session, discarding whatever the previous one held.
    pub fn begin(&mut self) {
        self.reset();
        self.phase = StreamPhase::Streaming;
    }

    /// Back to `Idle` with nothing buffered.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Marks a session whose byte stream ended without an `end` event as
    /// completed. Returns false if the session was not streaming.
    pub fn close(&mut self) -> bool {
        if self.phase == StreamPhase::Streaming {
            self.phase = StreamPhase::Completed;
            true
        } else {
            false
        }
    }

    /// Applies one event.
    ///
    /// Events are only taken while `Streaming`; the first `end` or `error`
    /// wins and everything after it is ignored.
    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        match self.phase {
            StreamPhase::Streaming => {}
            StreamPhase::Idle => {
                debug!("ignoring `{}` event: no active session", event.kind());
                return Applied::Ignored;
            }
            StreamPhase::Completed | StreamPhase::Failed { .. } => {
                debug!("ignoring `{}` event after stream finished", event.kind());
                return Applied::Ignored;
            }
        }

        match event {
            StreamEvent::Start { message } => {
                debug!("stream started: {}", message.as_deref().unwrap_or(""));
                self.text.clear();
                self.completion = None;
                self.tool_calls.clear();
                Applied::Updated
            }
            StreamEvent::TextDelta { text } => {
                self.text.push_str(&text);
                Applied::Updated
            }
            StreamEvent::ToolCallStart {
                tool_id,
                tool_name,
                arguments,
            } => {
                let id = tool_id.unwrap_or_else(|| format!("tool-{}", uuid::Uuid::new_v4()));
                let name = tool_name.unwrap_or_else(|| UNKNOWN_TOOL.to_string());
                let arguments = Value::Object(arguments.unwrap_or_else(Map::new));
                self.start_tool_call(ToolCall::running(id, name, arguments));
                Applied::Updated
            }
            StreamEvent::ToolCallResult {
                tool_id,
                tool_name,
                content,
                status,
            } => {
                let Some(index) = self.find_tool_call(tool_id.as_deref(), tool_name.as_deref())
                else {
                    debug!(
                        "no tool call matches result (id={:?}, name={:?})",
                        tool_id, tool_name
                    );
                    return Applied::Ignored;
                };
                let call = &mut self.tool_calls[index];
                call.status = match status.as_deref() {
                    Some("error") | Some("failed") => ToolCallStatus::Error,
                    _ => ToolCallStatus::Completed,
                };
                call.result = Some(content);
                Applied::Updated
            }
            StreamEvent::Completion { content } => {
                debug!("message completed");
                if let Some(content) = content.filter(|c| !c.is_empty()) {
                    self.completion = Some(content);
                }
                Applied::Updated
            }
            StreamEvent::Error { message, code } => {
                let message = message.unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string());
                let code = code.unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string());
                debug!("stream error: {} ({})", message, code);
                self.phase = StreamPhase::Failed { message, code };
                Applied::Finished
            }
            StreamEvent::End { message } => {
                debug!("stream ended: {}", message.as_deref().unwrap_or(""));
                self.phase = StreamPhase::Completed;
                Applied::Finished
            }
            StreamEvent::Unknown { kind, raw } => {
                debug!("unknown event type `{}`: {}", kind, raw);
                Applied::Ignored
            }
        }
    }

    pub fn phase(&self) -> &StreamPhase {
        &self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == StreamPhase::Streaming
    }

    /// Text accumulated from `text_delta` events.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    /// Text to persist: the `completion` content when one arrived, otherwise
    /// the accumulated deltas.
    pub fn final_text(&self) -> &str {
        self.completion.as_deref().unwrap_or(&self.text)
    }

    /// Copies the live state out for display.
    pub fn snapshot(&self, error: Option<String>) -> StreamSnapshot {
        StreamSnapshot {
            text: self.text.clone(),
            tool_calls: self.tool_calls.clone(),
            is_active: self.is_active(),
            error,
        }
    }

    fn start_tool_call(&mut self, call: ToolCall) {
        match self.tool_calls.iter_mut().find(|c| c.id == call.id) {
            Some(existing) => {
                debug!("tool call {} restarted", call.id);
                *existing = call;
            }
            None => self.tool_calls.push(call),
        }
    }

    // Id first; otherwise the earliest still-running call with that name.
    fn find_tool_call(&self, id: Option<&str>, name: Option<&str>) -> Option<usize> {
        if let Some(id) = id {
            if let Some(index) = self.tool_calls.iter().position(|c| c.id == id) {
                return Some(index);
            }
        }
        let name = name?;
        self.tool_calls
            .iter()
            .position(|c| c.is_running() && c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn streaming() -> StreamSession {
        let mut session = StreamSession::new();
        session.begin();
        session
    }

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::TextDelta {
            text: text.to_string(),
        }
    }

    fn tool_start(id: Option<&str>, name: Option<&str>) -> StreamEvent {
        StreamEvent::ToolCallStart {
            tool_id: id.map(str::to_string),
            tool_name: name.map(str::to_string),
            arguments: None,
        }
    }

    fn tool_result(id: Option<&str>, name: Option<&str>, content: Value) -> StreamEvent {
        StreamEvent::ToolCallResult {
            tool_id: id.map(str::to_string),
            tool_name: name.map(str::to_string),
            content,
            status: Some("success".to_string()),
        }
    }

    #[test]
    fn test_deltas_accumulate_without_completion() {
        let mut session = streaming();
        session.apply(StreamEvent::Start { message: None });
        session.apply(delta("Hello "));
        session.apply(delta("world"));
        assert_eq!(session.apply(StreamEvent::End { message: None }), Applied::Finished);

        assert_eq!(session.phase(), &StreamPhase::Completed);
        assert_eq!(session.final_text(), "Hello world");
    }

    #[test]
    fn test_completion_overrides_accumulated_text() {
        let mut session = streaming();
        session.apply(StreamEvent::Start { message: None });
        session.apply(delta("partial"));
        session.apply(StreamEvent::Completion {
            content: Some("final answer".to_string()),
        });
        assert!(session.is_active());
        session.apply(StreamEvent::End { message: None });

        assert_eq!(session.text(), "partial");
        assert_eq!(session.final_text(), "final answer");
    }

    #[test]
    fn test_empty_completion_does_not_override() {
        let mut session = streaming();
        session.apply(delta("kept"));
        session.apply(StreamEvent::Completion {
            content: Some(String::new()),
        });
        session.apply(StreamEvent::Completion { content: None });
        assert_eq!(session.final_text(), "kept");
    }

    #[test]
    fn test_start_clears_previous_content() {
        let mut session = streaming();
        session.apply(delta("stale"));
        session.apply(tool_start(Some("t0"), Some("lookup")));
        session.apply(StreamEvent::Start { message: None });

        assert_eq!(session.text(), "");
        assert!(session.tool_calls().is_empty());
    }

    #[test]
    fn test_tool_call_lifecycle_by_id() {
        let mut session = streaming();
        session.apply(StreamEvent::ToolCallStart {
            tool_id: Some("t1".to_string()),
            tool_name: Some("show_query_store".to_string()),
            arguments: Some(json!({"sql": "select 1"}).as_object().unwrap().clone()),
        });
        assert_eq!(session.tool_calls()[0].status, ToolCallStatus::Running);

        session.apply(tool_result(Some("t1"), None, json!({"query_id": 6})));

        let call = &session.tool_calls()[0];
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert_eq!(call.result, Some(json!({"query_id": 6})));
        assert_eq!(call.arguments["sql"], "select 1");
    }

    #[test]
    fn test_tool_call_result_matches_by_name() {
        let mut session = streaming();
        session.apply(tool_start(Some("t1"), Some("show_query_store")));
        session.apply(tool_result(None, Some("show_query_store"), json!({"query_id": 6})));

        assert_eq!(session.tool_calls()[0].status, ToolCallStatus::Completed);
    }

    #[test]
    fn test_unmatched_id_falls_back_to_name() {
        let mut session = streaming();
        session.apply(tool_start(Some("t1"), Some("lookup")));
        let applied = session.apply(tool_result(Some("other"), Some("lookup"), json!(1)));

        assert_eq!(applied, Applied::Updated);
        assert_eq!(session.tool_calls()[0].result, Some(json!(1)));
    }

    #[test]
    fn test_name_fallback_is_first_in_first_out() {
        let mut session = streaming();
        session.apply(tool_start(Some("a"), Some("lookup")));
        session.apply(tool_start(Some("b"), Some("lookup")));

        session.apply(tool_result(None, Some("lookup"), json!("first")));
        session.apply(tool_result(None, Some("lookup"), json!("second")));

        assert_eq!(session.tool_calls()[0].result, Some(json!("first")));
        assert_eq!(session.tool_calls()[1].result, Some(json!("second")));
    }

    #[test]
    fn test_unknown_tool_result_is_noop() {
        let mut session = streaming();
        session.apply(tool_start(Some("t1"), Some("lookup")));
        let applied = session.apply(tool_result(Some("nope"), Some("missing"), json!({})));

        assert_eq!(applied, Applied::Ignored);
        assert_eq!(session.tool_calls().len(), 1);
        assert!(session.tool_calls()[0].is_running());
    }

    #[test]
    fn test_tool_call_defaults() {
        let mut session = streaming();
        session.apply(tool_start(None, None));

        let call = &session.tool_calls()[0];
        assert!(call.id.starts_with("tool-"));
        assert_eq!(call.name, UNKNOWN_TOOL);
        assert_eq!(call.arguments, json!({}));
    }

    #[test]
    fn test_generated_tool_ids_are_distinct() {
        let mut session = streaming();
        session.apply(tool_start(None, Some("a")));
        session.apply(tool_start(None, Some("b")));
        assert_ne!(session.tool_calls()[0].id, session.tool_calls()[1].id);
    }

    #[test]
    fn test_duplicate_tool_id_replaces_record() {
        let mut session = streaming();
        session.apply(tool_start(Some("t1"), Some("lookup")));
        session.apply(tool_result(Some("t1"), None, json!(1)));
        session.apply(tool_start(Some("t1"), Some("lookup")));

        assert_eq!(session.tool_calls().len(), 1);
        assert!(session.tool_calls()[0].is_running());
    }

    #[test]
    fn test_error_status_marks_tool_call_failed() {
        let mut session = streaming();
        session.apply(tool_start(Some("t1"), Some("lookup")));
        session.apply(StreamEvent::ToolCallResult {
            tool_id: Some("t1".to_string()),
            tool_name: None,
            content: json!({"detail": "timeout"}),
            status: Some("error".to_string()),
        });
        assert_eq!(session.tool_calls()[0].status, ToolCallStatus::Error);
    }

    #[test]
    fn test_error_event_fails_with_default_code() {
        let mut session = streaming();
        let applied = session.apply(StreamEvent::Error {
            message: Some("boom".to_string()),
            code: None,
        });

        assert_eq!(applied, Applied::Finished);
        assert_eq!(
            session.phase(),
            &StreamPhase::Failed {
                message: "boom".to_string(),
                code: UNKNOWN_ERROR_CODE.to_string(),
            }
        );
    }

    #[test]
    fn test_events_after_terminal_phase_are_ignored() {
        let mut session = streaming();
        session.apply(StreamEvent::End { message: None });
        assert_eq!(session.apply(delta("late")), Applied::Ignored);
        assert_eq!(
            session.apply(StreamEvent::Error {
                message: None,
                code: None
            }),
            Applied::Ignored
        );
        assert_eq!(session.phase(), &StreamPhase::Completed);
        assert_eq!(session.final_text(), "");
    }

    #[test]
    fn test_idle_session_ignores_events() {
        let mut session = StreamSession::new();
        assert_eq!(session.apply(delta("x")), Applied::Ignored);
        assert_eq!(session.text(), "");
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let mut session = streaming();
        let applied = session.apply(StreamEvent::Unknown {
            kind: "heartbeat".to_string(),
            raw: json!({"type": "heartbeat"}),
        });
        assert_eq!(applied, Applied::Ignored);
        assert!(session.is_active());
    }

    #[test]
    fn test_close_and_reset() {
        let mut session = streaming();
        session.apply(delta("text"));
        assert!(session.close());
        assert!(!session.close());
        assert_eq!(session.phase(), &StreamPhase::Completed);

        session.reset();
        assert_eq!(session.phase(), &StreamPhase::Idle);
        assert_eq!(session.final_text(), "");

        session.begin();
        assert!(session.is_active());
    }

    #[test]
    fn test_snapshot_reflects_live_state() {
        let mut session = streaming();
        session.apply(delta("Hi"));
        session.apply(tool_start(Some("t1"), Some("lookup")));

        let snapshot = session.snapshot(None);
        assert_eq!(snapshot.text, "Hi");
        assert_eq!(snapshot.tool_calls.len(), 1);
        assert!(snapshot.is_active);
        assert!(snapshot.error.is_none());
    }
}
