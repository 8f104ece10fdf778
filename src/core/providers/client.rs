//! A backend bound to one session's persisted history.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use super::{ChatBackend, HistoryStage, ProviderError};
use crate::api::ChatMessage;
use crate::core::chat_stream::{spawn_relay, ChunkSink, ChunkStream, DEFAULT_STREAM_BUFFER};
use crate::core::message::TranscriptRole;
use crate::core::session::SessionId;
use crate::core::store::{SessionStore, StoreError};

/// Sends prompts for one session, keeping its history in the store.
///
/// Every call appends the prompt to history before the request and the
/// reply after it, so the provider always sees the full conversation.
/// History writes and the streaming relay run on the client's task
/// tracker; a write that has started finishes even if its request is
/// cancelled.
#[derive(Clone)]
pub struct ChatClient {
    backend: Arc<dyn ChatBackend>,
    history: Arc<dyn SessionStore>,
    session_id: SessionId,
    stream_buffer: usize,
    tasks: TaskTracker,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("provider", &self.backend.provider_name())
            .field("model", &self.backend.model())
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl ChatClient {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        history: Arc<dyn SessionStore>,
        session_id: SessionId,
    ) -> Self {
        Self {
            backend,
            history,
            session_id,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            tasks: TaskTracker::new(),
        }
    }

    /// Spawn this client's background work on `tasks`.
    pub fn with_tasks(mut self, tasks: TaskTracker) -> Self {
        self.tasks = tasks;
        self
    }

    /// Capacity of the relay queue used by [`ChatClient::stream_complete`].
    pub fn with_stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer.max(1);
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn provider_name(&self) -> &str {
        self.backend.provider_name()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Send `prompt` and wait for the whole reply.
    ///
    /// A failed history write aborts the call.
    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let messages = self.record_prompt(prompt).await?;
        info!(session_id = %self.session_id, provider = %self.provider_name(), model = %self.model(), "sending completion request");

        let reply = self.backend.complete(&messages).await?;
        self.record_reply(&reply).await?;
        Ok(reply)
    }

    /// Send `prompt` and return the reply as a stream of chunks.
    ///
    /// The request runs on a task of the client's tracker. Failures after
    /// this returns, history writes and panics included, arrive as the
    /// stream's final error item. Cancelling `cancel` or dropping the
    /// stream aborts the request.
    pub fn stream_complete(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, ProviderError> {
        if prompt.trim().is_empty() {
            return Err(ProviderError::EmptyPrompt);
        }
        info!(session_id = %self.session_id, provider = %self.provider_name(), model = %self.model(), "starting streaming request");

        let client = self.clone();
        let prompt = prompt.to_owned();
        Ok(spawn_relay(
            self.stream_buffer,
            cancel,
            &self.tasks,
            move |sink| async move { client.run_stream(&prompt, &sink).await },
        ))
    }

    async fn run_stream(&self, prompt: &str, sink: &ChunkSink) -> Result<(), ProviderError> {
        let messages = self.record_prompt(prompt).await?;
        let reply = self.backend.stream(&messages, sink).await?;
        self.record_reply(&reply).await?;
        debug!(session_id = %self.session_id, chars = reply.chars().count(), "stream finished");
        Ok(())
    }

    /// Append the prompt and return the full context to send.
    async fn record_prompt(&self, prompt: &str) -> Result<Vec<ChatMessage>, ProviderError> {
        if prompt.trim().is_empty() {
            return Err(ProviderError::EmptyPrompt);
        }
        self.persist(TranscriptRole::User, prompt)
            .await
            .map_err(|source| ProviderError::History {
                stage: HistoryStage::SaveUser,
                source,
            })?;

        let entries = self
            .history
            .history(self.session_id)
            .await
            .map_err(|source| ProviderError::History {
                stage: HistoryStage::Load,
                source,
            })?;
        Ok(entries
            .into_iter()
            .map(|entry| ChatMessage::new(entry.role.as_str(), entry.content))
            .collect())
    }

    async fn record_reply(&self, reply: &str) -> Result<(), ProviderError> {
        self.persist(TranscriptRole::Assistant, reply)
            .await
            .map_err(|source| ProviderError::History {
                stage: HistoryStage::SaveResponse,
                source,
            })
    }

    /// Write one history entry on a tracked task, so dropping the caller
    /// does not leave an untracked write behind.
    async fn persist(&self, role: TranscriptRole, content: &str) -> Result<(), StoreError> {
        let history = Arc::clone(&self.history);
        let session_id = self.session_id;
        let content = content.to_owned();
        let write = self.tasks.spawn(async move {
            match role {
                TranscriptRole::User => history.add_user_message(session_id, &content).await,
                _ => history.add_ai_message(session_id, &content).await,
            }
        });
        write
            .await
            .map_err(|err| StoreError::Task(err.to_string()))?
    }
}
