//! Conversation sessions and the registry that owns them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::core::message::Turn;

/// Greeting injected into every new session.
pub const DEFAULT_GREETING: &str = "How can I help you today?";

const TITLE_MAX_CHARS: usize = 30;
const TITLE_KEEP_CHARS: usize = 27;
const TITLE_DELIMITERS: [char; 4] = ['?', '.', '!', '\n'];

/// Stable identity of a session; also the key of its persisted history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Derive a session title from the first user message.
///
/// The text is cut at the first sentence delimiter and capped at 30
/// characters (27 plus an ellipsis). Returns `None` when nothing usable
/// precedes the delimiter.
pub fn derive_title(text: &str) -> Option<String> {
    let head = text
        .split(TITLE_DELIMITERS.as_slice())
        .next()
        .unwrap_or_default()
        .trim();
    if head.is_empty() {
        return None;
    }

    if head.chars().count() > TITLE_MAX_CHARS {
        let kept: String = head.chars().take(TITLE_KEEP_CHARS).collect();
        Some(format!("{kept}..."))
    } else {
        Some(head.to_string())
    }
}

fn default_title(index: usize) -> String {
    format!("Chat {index}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Instantiated, greeting not yet injected.
    Empty,
    AwaitingInput,
    StreamingResponse,
}

/// One independent conversation thread.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    index: usize,
    title: String,
    custom_title: bool,
    turns: Vec<Turn>,
    pending: Option<String>,
    state: SessionState,
    stream_cancel: Option<CancellationToken>,
    /// Tasks of the latest request; kept after the reply ends so history
    /// writes it started can be waited on.
    request_tasks: Option<TaskTracker>,
}

impl Session {
    fn new(index: usize) -> Self {
        Self {
            id: SessionId::new(),
            index,
            title: default_title(index),
            custom_title: false,
            turns: Vec::new(),
            pending: None,
            state: SessionState::Empty,
            stream_cancel: None,
            request_tasks: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// 1-based creation index, used for the default title.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Text accumulated so far for the in-flight assistant reply.
    pub fn pending_text(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::StreamingResponse
    }

    /// Append a completed turn. Returns the new title when the turn caused
    /// the title to be derived.
    pub(crate) fn push_turn(&mut self, turn: Turn) -> Option<String> {
        let derived = if turn.role.is_user() && self.uses_default_title() {
            derive_title(&turn.text)
        } else {
            None
        };

        self.turns.push(turn);
        if self.state == SessionState::Empty {
            self.state = SessionState::AwaitingInput;
        }

        let title = derived?;
        self.title = title.clone();
        Some(title)
    }

    pub(crate) fn set_custom_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.custom_title = true;
    }

    fn uses_default_title(&self) -> bool {
        !self.custom_title && self.title == default_title(self.index)
    }

    pub(crate) fn begin_stream(&mut self, cancel: CancellationToken, tasks: TaskTracker) {
        self.pending = Some(String::new());
        self.stream_cancel = Some(cancel);
        self.request_tasks = Some(tasks);
        self.state = SessionState::StreamingResponse;
    }

    /// Concatenate a chunk onto the pending reply and return the full
    /// partial text.
    pub(crate) fn append_chunk(&mut self, chunk: &str) -> &str {
        let pending = self.pending.get_or_insert_with(String::new);
        pending.push_str(chunk);
        pending
    }

    /// Leave the streaming state, handing back whatever had accumulated.
    pub(crate) fn end_stream(&mut self) -> String {
        self.stream_cancel = None;
        self.state = SessionState::AwaitingInput;
        self.pending.take().unwrap_or_default()
    }

    pub(crate) fn cancel_stream(&self) {
        if let Some(token) = &self.stream_cancel {
            token.cancel();
        }
    }

    pub(crate) fn request_tasks(&self) -> Option<&TaskTracker> {
        self.request_tasks.as_ref()
    }
}

/// Lightweight view of a session for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub index: usize,
    pub title: String,
    pub turn_count: usize,
    pub streaming: bool,
    pub active: bool,
}

/// The set of live sessions plus the one currently displayed.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
    active: Option<SessionId>,
    created: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty session and make it active.
    pub fn create(&mut self) -> &mut Session {
        self.created += 1;
        let session = Session::new(self.created);
        self.active = Some(session.id);
        self.sessions.push(session);
        let last = self.sessions.len() - 1;
        &mut self.sessions[last]
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    /// Make `id` the displayed session. Returns false for unknown ids.
    pub fn set_active(&mut self, id: SessionId) -> bool {
        if self.get(id).is_some() {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    /// Remove a session. If it was active, the most recently created
    /// remaining session takes its place.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let position = self.sessions.iter().position(|s| s.id == id)?;
        let session = self.sessions.remove(position);
        if self.active == Some(id) {
            self.active = self.sessions.last().map(|s| s.id);
        }
        Some(session)
    }

    /// Look up a session by its 1-based position in the listing.
    pub fn id_at(&self, position: usize) -> Option<SessionId> {
        position
            .checked_sub(1)
            .and_then(|i| self.sessions.get(i))
            .map(|s| s.id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|s| SessionSummary {
                id: s.id,
                index: s.index,
                title: s.title.clone(),
                turn_count: s.turns.len(),
                streaming: s.is_streaming(),
                active: self.active == Some(s.id),
            })
            .collect()
    }
}
