use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::api::ChatMessage;
use crate::core::chat_stream::ChunkSink;
use crate::core::message::TranscriptRole;
use crate::core::providers::{ChatBackend, ProviderError};
use crate::core::session::SessionId;
use crate::core::store::{Database, HistoryEntry, SessionStore, StoreError};

/// Backend that replays canned chunks and records what it was sent.
#[derive(Clone)]
pub struct ScriptedBackend {
    model: String,
    chunks: Vec<String>,
    failure: Option<String>,
    panics: bool,
    gate: Option<Arc<Notify>>,
    calls: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedBackend {
    pub fn replying<I, S>(model: &str, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model: model.to_string(),
            chunks: chunks.into_iter().map(Into::into).collect(),
            failure: None,
            panics: false,
            gate: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail with an API error once every chunk has been sent.
    pub fn failing_after(mut self, error: &str) -> Self {
        self.failure = Some(error.to_string());
        self
    }

    /// Panic once every chunk has been sent.
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Wait for `gate` to be notified before replying.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Message lists received so far, one per request.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    async fn begin(&self, messages: &[ChatMessage]) {
        self.calls.lock().unwrap().push(messages.to_vec());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }

    fn finish(&self) -> Result<String, ProviderError> {
        if self.panics {
            panic!("scripted backend panicked");
        }
        match &self.failure {
            Some(error) => Err(ProviderError::Api(error.clone())),
            None => Ok(self.chunks.concat()),
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.begin(messages).await;
        self.finish()
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        sink: &ChunkSink,
    ) -> Result<String, ProviderError> {
        self.begin(messages).await;
        for chunk in &self.chunks {
            sink.send(chunk.as_str())
                .await
                .map_err(|_| ProviderError::Cancelled)?;
        }
        self.finish()
    }
}

/// History store that rejects appends for one role.
pub struct FailingStore {
    inner: Database,
    fail_role: TranscriptRole,
}

impl FailingStore {
    pub fn rejecting(fail_role: TranscriptRole) -> Self {
        Self {
            inner: Database::open_in_memory().unwrap(),
            fail_role,
        }
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn append(
        &self,
        session_id: SessionId,
        role: TranscriptRole,
        content: &str,
    ) -> Result<(), StoreError> {
        if role == self.fail_role {
            return Err(StoreError::InvalidData("disk full".into()));
        }
        self.inner.append(session_id, role, content).await
    }

    async fn history(&self, session_id: SessionId) -> Result<Vec<HistoryEntry>, StoreError> {
        self.inner.history(session_id).await
    }

    async fn clear(&self, session_id: SessionId) -> Result<(), StoreError> {
        self.inner.clear(session_id).await
    }
}

/// History store whose appends land on a detached task after `delay`, the
/// way a blocking-pool write keeps going once its caller is dropped.
#[derive(Clone)]
pub struct SlowStore {
    inner: Database,
    delay: Duration,
    started: Arc<AtomicUsize>,
}

impl SlowStore {
    pub fn new(inner: Database, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Appends begun so far.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for SlowStore {
    async fn append(
        &self,
        session_id: SessionId,
        role: TranscriptRole,
        content: &str,
    ) -> Result<(), StoreError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();
        let delay = self.delay;
        let content = content.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.append(session_id, role, &content).await
        })
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
    }

    async fn history(&self, session_id: SessionId) -> Result<Vec<HistoryEntry>, StoreError> {
        self.inner.history(session_id).await
    }

    async fn clear(&self, session_id: SessionId) -> Result<(), StoreError> {
        self.inner.clear(session_id).await
    }
}
