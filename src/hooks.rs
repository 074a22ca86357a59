//! Lifecycle hooks for intercepting a send.
//!
//! Two interception points are available:
//!
//! 1. **PromptSubmit**: fired before the user's query is appended to the
//!    conversation or sent. A hook can block the send or rewrite the query.
//! 2. **ToolCallResult**: fired for every `tool_call_result` event before it
//!    reaches the state machine. A hook can rewrite the result payload (for
//!    example to redact a column) or discard the event.
//!
//! # Execution Model
//!
//! Hooks run sequentially in registration order and the **first hook that
//! returns `Some(HookDecision)` wins**; later hooks are skipped. If every hook
//! returns `None`, processing continues unchanged.
//!
//! ```rust,no_run
//! use carabao_chat::{HookDecision, Hooks};
//!
//! let hooks = Hooks::new().add_user_prompt_submit(|event| async move {
//!     if event.prompt.to_lowercase().contains("drop table") {
//!         return Some(HookDecision::block("destructive request"));
//!     }
//!     None
//! });
//! ```
//!
//! Hooks never run while the client's state lock is held, so they may take
//! their time; the stream simply waits.

use crate::types::Message;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Fired before a query is sent.
#[derive(Debug, Clone)]
pub struct PromptSubmitEvent {
    /// Query as typed (or as rewritten by an earlier send path)
    pub prompt: String,
    /// Conversation as it stood before this send
    pub history: Vec<Message>,
}

impl PromptSubmitEvent {
    pub fn new(prompt: String, history: Vec<Message>) -> Self {
        Self { prompt, history }
    }
}

/// Fired for each tool result before it is attached to its tool call.
#[derive(Debug, Clone)]
pub struct ToolCallResultEvent {
    pub tool_id: Option<String>,
    pub tool_name: Option<String>,
    pub result: Value,
    pub status: Option<String>,
}

impl ToolCallResultEvent {
    pub fn new(
        tool_id: Option<String>,
        tool_name: Option<String>,
        result: Value,
        status: Option<String>,
    ) -> Self {
        Self {
            tool_id,
            tool_name,
            result,
            status,
        }
    }
}

/// Outcome of a hook.
#[derive(Debug, Clone, Default)]
pub struct HookDecision {
    continue_execution: bool,
    modified_prompt: Option<String>,
    modified_result: Option<Value>,
    reason: Option<String>,
}

impl HookDecision {
    /// Let processing continue unchanged.
    pub fn continue_() -> Self {
        Self {
            continue_execution: true,
            ..Self::default()
        }
    }

    /// Stop: a blocked prompt is never sent; a blocked tool result is dropped.
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            continue_execution: false,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Send `prompt` instead of the typed query.
    pub fn modify_prompt(prompt: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            continue_execution: true,
            modified_prompt: Some(prompt.into()),
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Attach `result` instead of the payload the server sent.
    pub fn modify_result(result: Value, reason: impl Into<String>) -> Self {
        Self {
            continue_execution: true,
            modified_result: Some(result),
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn continue_execution(&self) -> bool {
        self.continue_execution
    }

    pub fn modified_prompt(&self) -> Option<&str> {
        self.modified_prompt.as_deref()
    }

    pub fn modified_result(&self) -> Option<&Value> {
        self.modified_result.as_ref()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

pub type PromptSubmitHandler = Arc<
    dyn Fn(PromptSubmitEvent) -> Pin<Box<dyn Future<Output = Option<HookDecision>> + Send>>
        + Send
        + Sync,
>;

pub type ToolCallResultHandler = Arc<
    dyn Fn(ToolCallResultEvent) -> Pin<Box<dyn Future<Output = Option<HookDecision>> + Send>>
        + Send
        + Sync,
>;

/// Registered hooks.
#[derive(Clone, Default)]
pub struct Hooks {
    pub prompt_submit: Vec<PromptSubmitHandler>,
    pub tool_call_result: Vec<ToolCallResultHandler>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user_prompt_submit<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(PromptSubmitEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<HookDecision>> + Send + 'static,
    {
        self.prompt_submit
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    pub fn add_tool_call_result<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ToolCallResultEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<HookDecision>> + Send + 'static,
    {
        self.tool_call_result
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_submit.is_empty() && self.tool_call_result.is_empty()
    }

    pub async fn execute_user_prompt_submit(&self, event: PromptSubmitEvent) -> Option<HookDecision> {
        for handler in &self.prompt_submit {
            let decision = handler(event.clone()).await;
            if decision.is_some() {
                return decision;
            }
        }
        None
    }

    pub async fn execute_tool_call_result(
        &self,
        event: ToolCallResultEvent,
    ) -> Option<HookDecision> {
        for handler in &self.tool_call_result {
            let decision = handler(event.clone()).await;
            if decision.is_some() {
                return decision;
            }
        }
        None
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field(
                "prompt_submit",
                &format!("{} handlers", self.prompt_submit.len()),
            )
            .field(
                "tool_call_result",
                &format!("{} handlers", self.tool_call_result.len()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hook_decision_builders() {
        let cont = HookDecision::continue_();
        assert!(cont.continue_execution());
        assert!(cont.reason().is_none());

        let block = HookDecision::block("nope");
        assert!(!block.continue_execution());
        assert_eq!(block.reason(), Some("nope"));

        let prompt = HookDecision::modify_prompt("rewritten", "policy");
        assert_eq!(prompt.modified_prompt(), Some("rewritten"));

        let result = HookDecision::modify_result(json!({"rows": []}), "redacted");
        assert!(result.continue_execution());
        assert_eq!(result.modified_result(), Some(&json!({"rows": []})));
    }

    #[tokio::test]
    async fn test_prompt_submit_first_decision_wins() {
        let hooks = Hooks::new()
            .add_user_prompt_submit(|event| async move {
                if event.prompt.contains("DELETE") {
                    return Some(HookDecision::block("dangerous prompt"));
                }
                None
            })
            .add_user_prompt_submit(|_| async move { Some(HookDecision::modify_prompt("x", "late")) });

        let blocked = hooks
            .execute_user_prompt_submit(PromptSubmitEvent::new("DELETE rows".to_string(), vec![]))
            .await
            .unwrap();
        assert!(!blocked.continue_execution());

        let rewritten = hooks
            .execute_user_prompt_submit(PromptSubmitEvent::new("hello".to_string(), vec![]))
            .await
            .unwrap();
        assert_eq!(rewritten.modified_prompt(), Some("x"));
    }

    #[tokio::test]
    async fn test_tool_call_result_hook_passthrough() {
        let hooks = Hooks::new().add_tool_call_result(|_event| async move { None });
        let event = ToolCallResultEvent::new(
            Some("t1".to_string()),
            None,
            json!({"query_id": 1}),
            None,
        );
        assert!(hooks.execute_tool_call_result(event).await.is_none());
        assert!(!hooks.is_empty());
    }
}
