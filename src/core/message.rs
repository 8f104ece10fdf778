use std::fmt;

use serde::{Deserialize, Serialize};

/// Who authored a turn in a session transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TranscriptRole {
    User,
    Assistant,
    /// App-authored notices, mostly errors. Never sent to the provider.
    System,
}

impl TranscriptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptRole::User => "user",
            TranscriptRole::Assistant => "assistant",
            TranscriptRole::System => "system",
        }
    }

    /// Label shown next to the turn by the front end.
    pub fn sender_label(self) -> &'static str {
        match self {
            TranscriptRole::User => "You",
            TranscriptRole::Assistant => "AI",
            TranscriptRole::System => "System",
        }
    }

    pub fn is_user(self) -> bool {
        self == TranscriptRole::User
    }

    pub fn is_assistant(self) -> bool {
        self == TranscriptRole::Assistant
    }
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for TranscriptRole {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for TranscriptRole {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" | "human" => Ok(TranscriptRole::User),
            "assistant" | "ai" => Ok(TranscriptRole::Assistant),
            "system" => Ok(TranscriptRole::System),
            _ => Err(format!("invalid transcript role: {value}")),
        }
    }
}

impl TryFrom<String> for TranscriptRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<TranscriptRole> for String {
    fn from(value: TranscriptRole) -> Self {
        value.as_str().to_string()
    }
}

/// One completed message in a session transcript.
///
/// Turns are frozen once appended; the in-progress assistant reply lives in
/// the session's pending accumulator until its stream ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TranscriptRole,
    pub text: String,
}

impl Turn {
    pub fn new(role: TranscriptRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TranscriptRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(TranscriptRole::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(TranscriptRole::System, text)
    }

    /// True for turns rendered on the assistant side of the transcript,
    /// which includes app-authored system notices.
    pub fn is_assistant(&self) -> bool {
        !self.role.is_user()
    }

    pub fn sender(&self) -> &'static str {
        self.role.sender_label()
    }
}
