//! Configuration helpers for the chat client

use std::env;

/// API root used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Idle read timeout in seconds
pub const DEFAULT_READ_TIMEOUT: u64 = 60;

/// Environment variable overriding the API root
pub const BASE_URL_ENV: &str = "CARABAO_CHAT_BASE_URL";

/// Environment variable overriding the idle read timeout (seconds)
pub const READ_TIMEOUT_ENV: &str = "CARABAO_CHAT_READ_TIMEOUT";

/// Streaming chat endpoint (POST, NDJSON response)
pub const STREAM_PATH: &str = "/chat/stream";

/// Conversation history endpoint (GET)
pub const LIST_PATH: &str = "/chat/list";

/// Conversation reset endpoint (POST)
pub const CLEAR_PATH: &str = "/chat/clear-chat";

/// Query preview endpoint prefix (GET `{PREVIEW_PATH}/{query_id}`)
pub const PREVIEW_PATH: &str = "/preview/data";

/// Get the base URL from environment variable or fallback
///
/// Priority:
/// 1. CARABAO_CHAT_BASE_URL environment variable
/// 2. fallback parameter
/// 3. [`DEFAULT_BASE_URL`]
///
/// # Examples
///
/// ```rust,no_run
/// use carabao_chat::get_base_url;
///
/// let url = get_base_url(Some("http://127.0.0.1:8000/api/v1"));
/// ```
pub fn get_base_url(fallback: Option<&str>) -> String {
    resolve_base_url(env::var(BASE_URL_ENV).ok(), fallback)
}

/// Get the idle read timeout (seconds) from environment variable or fallback
///
/// Unparseable or zero values are ignored with a warning.
pub fn get_read_timeout(fallback: u64) -> u64 {
    resolve_read_timeout(env::var(READ_TIMEOUT_ENV).ok(), fallback)
}

fn resolve_base_url(from_env: Option<String>, fallback: Option<&str>) -> String {
    if let Some(url) = from_env.filter(|u| !u.trim().is_empty()) {
        return url;
    }

    fallback.unwrap_or(DEFAULT_BASE_URL).to_string()
}

fn resolve_read_timeout(from_env: Option<String>, fallback: u64) -> u64 {
    match from_env {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(seconds) if seconds > 0 => seconds,
            _ => {
                log::warn!(
                    "ignoring {}={:?}: expected a positive number of seconds",
                    READ_TIMEOUT_ENV,
                    raw
                );
                fallback
            }
        },
        None => fallback,
    }
}
