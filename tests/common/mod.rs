//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use carabao_chat::transport::{ByteStream, ChatTransport};
use carabao_chat::{ChatOptions, ChatRequest, Error, Message, PreviewData, Result};
use futures::stream;
use tokio::sync::{Notify, mpsc};
use tokio_stream::wrappers::ReceiverStream;

/// What one `open_stream` call produces.
pub enum Script {
    /// Body delivered as these chunks, then EOF
    Chunks(Vec<Vec<u8>>),
    /// Body fed by the test through a channel
    Channel(mpsc::Receiver<Result<Bytes>>),
    /// Backend refuses the request with this status
    Status(u16),
    /// Headers arrive, body never does
    Stall,
}

impl Script {
    /// Splits `body` into chunks of at most `size` bytes.
    pub fn chunked(body: &str, size: usize) -> Self {
        Script::Chunks(body.as_bytes().chunks(size).map(<[u8]>::to_vec).collect())
    }

    pub fn lines(lines: &[&str]) -> Self {
        let mut body = lines.join("\n");
        body.push('\n');
        Script::Chunks(vec![body.into_bytes()])
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub history: Mutex<Vec<Message>>,
    pub preview: Mutex<Option<PreviewData>>,
    /// Number of upcoming `list_messages` calls that fail with 503
    pub list_failures: AtomicU32,
    pub list_calls: AtomicU32,
    pub clear_calls: AtomicU32,
    /// When set, history calls wait here until the test releases them
    pub history_gate: Mutex<Option<Arc<Notify>>>,
    /// Signalled each time a history call starts
    pub history_entered: Notify,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        }
    }

    /// Holds every later history call until `notify_one` on the returned gate.
    pub fn gate_history(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.history_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    async fn pass_history_gate(&self) {
        self.history_entered.notify_one();
        let gate = self.history_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    pub fn sent_queries(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.query.clone())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front();

        match script {
            Some(Script::Chunks(chunks)) => Ok(Box::pin(stream::iter(
                chunks.into_iter().map(|c| Ok::<_, Error>(Bytes::from(c))),
            ))),
            Some(Script::Channel(rx)) => Ok(Box::pin(ReceiverStream::new(rx))),
            Some(Script::Status(status)) => Err(Error::api(status, "scripted failure")),
            Some(Script::Stall) => Ok(Box::pin(stream::pending::<Result<Bytes>>())),
            None => Err(Error::other("no scripted response left")),
        }
    }

    async fn list_messages(&self) -> Result<Vec<Message>> {
        self.pass_history_gate().await;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.list_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.list_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::api(503, "service unavailable"));
        }
        Ok(self.history.lock().unwrap().clone())
    }

    async fn clear_history(&self) -> Result<()> {
        self.pass_history_gate().await;
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.history.lock().unwrap().clear();
        Ok(())
    }

    async fn fetch_preview(&self, query_id: u64) -> Result<PreviewData> {
        self.preview
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::api(404, format!("no preview for {}", query_id)))
    }
}

/// Options tuned for tests: short read timeout, near-instant retries.
pub fn test_options() -> ChatOptions {
    ChatOptions::builder()
        .base_url("http://localhost:8000/api/v1")
        .owner_id(7)
        .read_timeout(1)
        .retry(
            carabao_chat::retry::RetryConfig::default()
                .with_max_attempts(3)
                .with_initial_delay(std::time::Duration::from_millis(1))
                .with_jitter_factor(0.0),
        )
        .build()
        .unwrap()
}

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}
