//! Multi-session chat orchestration.
//!
//! [`ChatManager`] owns every live session, routes input to the right one
//! and runs each reply on its own task. Output reaches the front end only
//! through [`PresentationEvent`]s, tagged with the session they belong to,
//! so a reply keeps landing in its session while another one is displayed.


use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::core::chat_stream::{StreamMessage, PRODUCER_PANICKED};
use crate::core::message::Turn;
use crate::core::providers::{ClientSource, ProviderError};
use crate::core::session::{SessionId, SessionRegistry, SessionSummary};

/// System turn text for a reply that was stopped before it finished.
pub const CANCELLED_NOTICE: &str = "Response cancelled.";

/// What the front end is told about session changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationEvent {
    TurnAppended { session_id: SessionId, turn: Turn },
    /// The full text received so far for an in-flight reply.
    StreamUpdate {
        session_id: SessionId,
        partial_text: String,
    },
    TitleChanged { session_id: SessionId, title: String },
    SessionRemoved { session_id: SessionId },
}

/// Result of handing user input to a session.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Blank input; nothing happened.
    Ignored,
    /// The session is still streaming its previous reply.
    Busy,
    NoActiveSession,
    UnknownSession,
    ShuttingDown,
    Started(RequestHandle),
}

impl SubmitOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, SubmitOutcome::Started(_))
    }
}

/// A session's display state at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub title: String,
    pub turns: Vec<Turn>,
    pub pending: Option<String>,
}

/// Handle on one in-flight reply.
#[derive(Debug)]
pub struct RequestHandle {
    session_id: SessionId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RequestHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until the reply has been written into the transcript.
    pub async fn wait(self) {
        if let Err(err) = self.task.await {
            warn!(session_id = %self.session_id, "request supervisor failed: {err}");
        }
    }
}

/// Session events are emitted while the registry lock is held, so the
/// queue order matches the order of the changes it reports.
struct Inner {
    registry: Mutex<SessionRegistry>,
    clients: Arc<dyn ClientSource>,
    events: mpsc::UnboundedSender<PresentationEvent>,
    root: CancellationToken,
    tracker: TaskTracker,
    greeting: String,
}

impl Inner {
    fn sessions(&self) -> MutexGuard<'_, SessionRegistry> {
        // Registry updates are single assignments, so state behind a
        // poisoned lock is still consistent.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PresentationEvent) {
        if self.events.send(event).is_err() {
            debug!("presentation receiver dropped; event discarded");
        }
    }

    fn apply_chunk(&self, session_id: SessionId, chunk: &str) {
        let mut sessions = self.sessions();
        let partial_text = match sessions.get_mut(session_id) {
            Some(session) if session.is_streaming() => session.append_chunk(chunk).to_owned(),
            _ => return,
        };
        self.emit(PresentationEvent::StreamUpdate {
            session_id,
            partial_text,
        });
    }

    /// Freeze the accumulated reply as an assistant turn.
    fn finish_reply(&self, session_id: SessionId) {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(session_id) else {
            return;
        };
        let turn = Turn::assistant(session.end_stream());
        session.push_turn(turn.clone());
        self.emit(PresentationEvent::TurnAppended { session_id, turn });
    }

    /// End the stream with a single system turn, dropping any partial text.
    fn finish_with_notice(&self, session_id: SessionId, notice: String) {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(session_id) else {
            return;
        };
        if !session.is_streaming() {
            return;
        }
        let discarded = session.end_stream();
        if !discarded.is_empty() {
            debug!(session_id = %session_id, chars = discarded.chars().count(), "partial reply discarded");
        }
        let turn = Turn::system(notice);
        session.push_turn(turn.clone());
        self.emit(PresentationEvent::TurnAppended { session_id, turn });
    }
}

/// Text of the system turn reporting `error`.
pub fn error_notice(error: &str) -> String {
    if error.starts_with("API Error") {
        error.to_string()
    } else {
        format!("Error: {error}")
    }
}

async fn run_request(
    inner: Arc<Inner>,
    session_id: SessionId,
    prompt: String,
    cancel: CancellationToken,
    tasks: TaskTracker,
) {
    let client = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            inner.finish_with_notice(session_id, CANCELLED_NOTICE.to_string());
            return;
        }
        client = inner.clients.client_for(session_id) => client,
    };

    let stream = client.and_then(|client| {
        debug!(session_id = %session_id, provider = %client.provider_name(), model = %client.model(), "client resolved");
        client.with_tasks(tasks).stream_complete(&prompt, &cancel)
    });
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            warn!(session_id = %session_id, "request could not start: {err}");
            inner.finish_with_notice(session_id, error_notice(&err.to_string()));
            return;
        }
    };

    while let Some(message) = stream.next_message().await {
        match message {
            StreamMessage::Chunk(chunk) => inner.apply_chunk(session_id, &chunk),
            StreamMessage::Error(error) => {
                warn!(session_id = %session_id, "stream failed: {error}");
                inner.finish_with_notice(session_id, error_notice(&error));
                return;
            }
        }
    }

    if cancel.is_cancelled() {
        info!(session_id = %session_id, "stream cancelled");
        inner.finish_with_notice(session_id, CANCELLED_NOTICE.to_string());
    } else {
        inner.finish_reply(session_id);
    }
}

/// Owns the live sessions and their in-flight replies.
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Clone)]
pub struct ChatManager {
    inner: Arc<Inner>,
}

impl ChatManager {
    /// Create a manager and the receiver its presentation events go to.
    pub fn new(
        clients: Arc<dyn ClientSource>,
        greeting: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<PresentationEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            registry: Mutex::new(SessionRegistry::new()),
            clients,
            events,
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
            greeting: greeting.into(),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Start a new session with the greeting turn and make it active.
    pub fn create_session(&self) -> SessionId {
        let mut sessions = self.inner.sessions();
        let session = sessions.create();
        let session_id = session.id();
        let turn = Turn::assistant(self.inner.greeting.clone());
        session.push_turn(turn.clone());
        self.inner
            .emit(PresentationEvent::TurnAppended { session_id, turn });
        drop(sessions);
        info!(session_id = %session_id, "session created");
        session_id
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.inner.sessions().active_id()
    }

    /// Send `text` to the active session.
    pub fn submit(&self, text: &str) -> SubmitOutcome {
        match self.active_session() {
            Some(session_id) => self.submit_to(session_id, text),
            None if text.trim().is_empty() => SubmitOutcome::Ignored,
            None => SubmitOutcome::NoActiveSession,
        }
    }

    /// Send `text` to a specific session and start streaming the reply.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_to(&self, session_id: SessionId, text: &str) -> SubmitOutcome {
        if text.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }
        if self.inner.tracker.is_closed() {
            return SubmitOutcome::ShuttingDown;
        }

        let cancel = self.inner.root.child_token();
        let tasks = TaskTracker::new();
        {
            let mut sessions = self.inner.sessions();
            let Some(session) = sessions.get_mut(session_id) else {
                return SubmitOutcome::UnknownSession;
            };
            if session.is_streaming() {
                return SubmitOutcome::Busy;
            }
            let turn = Turn::user(text);
            let title = session.push_turn(turn.clone());
            session.begin_stream(cancel.clone(), tasks.clone());
            self.inner
                .emit(PresentationEvent::TurnAppended { session_id, turn });
            if let Some(title) = title {
                self.inner
                    .emit(PresentationEvent::TitleChanged { session_id, title });
            }
        }

        // The supervisor is the only tracked task per request; it outlives
        // the worker and everything the worker's client spawned.
        let worker = tokio::spawn(run_request(
            Arc::clone(&self.inner),
            session_id,
            text.to_string(),
            cancel.clone(),
            tasks.clone(),
        ));
        let inner = Arc::clone(&self.inner);
        let task = self.inner.tracker.spawn(async move {
            if let Err(err) = worker.await {
                if err.is_panic() {
                    error!(session_id = %session_id, "response task panicked");
                    inner.finish_with_notice(
                        session_id,
                        error_notice(PRODUCER_PANICKED),
                    );
                }
            }
            tasks.close();
            tasks.wait().await;
        });

        SubmitOutcome::Started(RequestHandle {
            session_id,
            cancel,
            task,
        })
    }

    /// Make `session_id` the displayed session and capture what to show
    /// for it. In-flight replies in other sessions keep running.
    ///
    /// `discard_queued` runs while no session can change. Every event
    /// already queued at that point is reflected in the snapshot, so the
    /// caller can drop them; later events describe later changes.
    pub fn activate(
        &self,
        session_id: SessionId,
        discard_queued: impl FnOnce(),
    ) -> Option<SessionSnapshot> {
        let mut sessions = self.inner.sessions();
        if !sessions.set_active(session_id) {
            return None;
        }
        let session = sessions.get(session_id)?;
        let snapshot = SessionSnapshot {
            session_id,
            title: session.title().to_owned(),
            turns: session.turns().to_vec(),
            pending: session.pending_text().map(str::to_owned),
        };
        discard_queued();
        Some(snapshot)
    }

    /// Session at a 1-based position in [`ChatManager::sessions`].
    pub fn session_at(&self, position: usize) -> Option<SessionId> {
        self.inner.sessions().id_at(position)
    }

    pub fn transcript(&self, session_id: SessionId) -> Option<Vec<Turn>> {
        self.inner
            .sessions()
            .get(session_id)
            .map(|session| session.turns().to_vec())
    }

    pub fn pending_text(&self, session_id: SessionId) -> Option<String> {
        self.inner
            .sessions()
            .get(session_id)
            .and_then(|session| session.pending_text().map(str::to_owned))
    }

    pub fn title(&self, session_id: SessionId) -> Option<String> {
        self.inner
            .sessions()
            .get(session_id)
            .map(|session| session.title().to_owned())
    }

    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.inner.sessions().summaries()
    }

    /// Give a session a user-chosen title. Blank titles are rejected.
    pub fn rename_session(&self, session_id: SessionId, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        let mut sessions = self.inner.sessions();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        session.set_custom_title(title);
        self.inner.emit(PresentationEvent::TitleChanged {
            session_id,
            title: title.to_string(),
        });
        true
    }

    /// Stop a session's in-flight reply. Returns false if nothing was
    /// streaming.
    pub fn cancel_stream(&self, session_id: SessionId) -> bool {
        let sessions = self.inner.sessions();
        match sessions.get(session_id) {
            Some(session) if session.is_streaming() => {
                session.cancel_stream();
                true
            }
            _ => false,
        }
    }

    /// Remove a session, stopping its reply and clearing its history.
    ///
    /// History is cleared only after every write the reply had started
    /// has landed. If the session was active, the most recently created
    /// remaining session becomes active. Returns `Ok(false)` for unknown ids.
    pub async fn delete_session(&self, session_id: SessionId) -> Result<bool, ProviderError> {
        let session = {
            let mut sessions = self.inner.sessions();
            let Some(session) = sessions.remove(session_id) else {
                return Ok(false);
            };
            self.inner
                .emit(PresentationEvent::SessionRemoved { session_id });
            session
        };
        session.cancel_stream();
        info!(session_id = %session_id, "session deleted");

        if let Some(tasks) = session.request_tasks() {
            tasks.close();
            tasks.wait().await;
        }
        self.inner.clients.forget_session(session_id).await?;
        Ok(true)
    }

    /// Number of submitted requests whose work has not finished yet.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Stop accepting input, give in-flight replies `grace` to finish,
    /// then cancel whatever is left and wait for it to wind down.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.tracker.close();
        if tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.inner.tracker.len(),
                "cancelling replies still running at shutdown"
            );
            self.inner.root.cancel();
            self.inner.tracker.wait().await;
        }
        self.inner.root.cancel();
        debug!("chat manager shut down");
    }
}
