//! Stream event decoding.
//!
//! Each NDJSON frame carries one event, tagged by its `type` field:
//!
//! ```text
//! {"type":"start","content":{"message":"..."}}
//! {"type":"text_delta","content":"..."}
//! {"type":"tool_call_start","tool_id":"...","tool_name":"...","arguments":{...}}
//! {"type":"tool_call_result","tool_id":"...","tool_name":"...","content":<any>,"status":"..."}
//! {"type":"completion","content":"..."}
//! {"type":"error","content":"...","error_code":"..."}
//! {"type":"end","content":{"message":"..."}}
//! ```
//!
//! [`decode`] validates the payload shape per kind, so the state machine only
//! ever sees well-typed [`StreamEvent`]s.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// One decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A new response begins.
    Start { message: Option<String> },
    /// Incremental assistant text.
    TextDelta { text: String },
    /// The server started a tool invocation.
    ToolCallStart {
        tool_id: Option<String>,
        tool_name: Option<String>,
        arguments: Option<Map<String, Value>>,
    },
    /// A tool invocation finished.
    ToolCallResult {
        tool_id: Option<String>,
        tool_name: Option<String>,
        content: Value,
        status: Option<String>,
    },
    /// Authoritative final text for the response.
    Completion { content: Option<String> },
    /// The server gave up on the response.
    Error {
        message: Option<String>,
        code: Option<String>,
    },
    /// The response is over.
    End { message: Option<String> },
    /// Well-formed event of a kind this client does not know.
    Unknown { kind: String, raw: Value },
}

impl StreamEvent {
    /// Wire tag of this event.
    pub fn kind(&self) -> &str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::TextDelta { .. } => "text_delta",
            StreamEvent::ToolCallStart { .. } => "tool_call_start",
            StreamEvent::ToolCallResult { .. } => "tool_call_result",
            StreamEvent::Completion { .. } => "completion",
            StreamEvent::Error { .. } => "error",
            StreamEvent::End { .. } => "end",
            StreamEvent::Unknown { kind, .. } => kind,
        }
    }
}

const KNOWN_KINDS: [&str; 7] = [
    "start",
    "text_delta",
    "tool_call_start",
    "tool_call_result",
    "completion",
    "error",
    "end",
];

#[derive(Debug, Deserialize)]
struct StatusContent {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Start {
        #[serde(default)]
        content: Option<StatusContent>,
    },
    TextDelta {
        content: String,
    },
    ToolCallStart {
        #[serde(default)]
        tool_id: Option<String>,
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        arguments: Option<Map<String, Value>>,
    },
    ToolCallResult {
        #[serde(default)]
        tool_id: Option<String>,
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        status: Option<String>,
    },
    Completion {
        #[serde(default)]
        content: Option<String>,
    },
    Error {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        error_code: Option<String>,
    },
    End {
        #[serde(default)]
        content: Option<StatusContent>,
    },
}

impl From<WireEvent> for StreamEvent {
    fn from(wire: WireEvent) -> Self {
        match wire {
            WireEvent::Start { content } => StreamEvent::Start {
                message: content.and_then(|c| c.message),
            },
            WireEvent::TextDelta { content } => StreamEvent::TextDelta { text: content },
            WireEvent::ToolCallStart {
                tool_id,
                tool_name,
                arguments,
            } => StreamEvent::ToolCallStart {
                tool_id,
                tool_name,
                arguments,
            },
            WireEvent::ToolCallResult {
                tool_id,
                tool_name,
                content,
                status,
            } => StreamEvent::ToolCallResult {
                tool_id,
                tool_name,
                content,
                status,
            },
            WireEvent::Completion { content } => StreamEvent::Completion { content },
            WireEvent::Error {
                content,
                error_code,
            } => StreamEvent::Error {
                message: content,
                code: error_code,
            },
            WireEvent::End { content } => StreamEvent::End {
                message: content.and_then(|c| c.message),
            },
        }
    }
}

/// Decodes one frame.
///
/// Returns `Ok(None)` for blank frames. Unknown `type` values decode to
/// [`StreamEvent::Unknown`] rather than failing.
///
/// # Errors
///
/// A [`DecodeError`] carrying the frame when the text is not JSON, is not an
/// object, lacks a string `type`, or has a payload of the wrong shape for its
/// kind.
pub fn decode(frame: &str) -> Result<Option<StreamEvent>, DecodeError> {
    let text = frame.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::new(frame, e.to_string()))?;

    let kind = match value.as_object().map(|obj| obj.get("type")) {
        None => return Err(DecodeError::new(frame, "frame is not a JSON object")),
        Some(None) => return Err(DecodeError::new(frame, "missing `type` field")),
        Some(Some(Value::String(kind))) => kind.clone(),
        Some(Some(_)) => return Err(DecodeError::new(frame, "`type` is not a string")),
    };

    if !KNOWN_KINDS.contains(&kind.as_str()) {
        return Ok(Some(StreamEvent::Unknown { kind, raw: value }));
    }

    let wire: WireEvent = serde_json::from_value(value)
        .map_err(|e| DecodeError::new(frame, format!("invalid `{}` payload: {}", kind, e)))?;

    Ok(Some(wire.into()))
}
