//! Conversation history keyed by session, replayed as provider context.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{Database, StoreError};
use crate::core::message::TranscriptRole;
use crate::core::session::SessionId;

/// One persisted message of a session's provider context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: TranscriptRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Durable mapping from a session to its ordered message history.
///
/// Writes for one session are issued by that session's own request cycle,
/// one at a time, so implementations need no conflict handling.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(
        &self,
        session_id: SessionId,
        role: TranscriptRole,
        content: &str,
    ) -> Result<(), StoreError>;

    /// History in the order it was appended.
    async fn history(&self, session_id: SessionId) -> Result<Vec<HistoryEntry>, StoreError>;

    async fn clear(&self, session_id: SessionId) -> Result<(), StoreError>;

    async fn add_user_message(&self, session_id: SessionId, content: &str) -> Result<(), StoreError> {
        self.append(session_id, TranscriptRole::User, content).await
    }

    async fn add_ai_message(&self, session_id: SessionId, content: &str) -> Result<(), StoreError> {
        self.append(session_id, TranscriptRole::Assistant, content)
            .await
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn append(
        &self,
        session_id: SessionId,
        role: TranscriptRole,
        content: &str,
    ) -> Result<(), StoreError> {
        let content = content.to_owned();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    session_id.to_string(),
                    role.as_str(),
                    content,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn history(&self, session_id: SessionId) -> Result<Vec<HistoryEntry>, StoreError> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content, created_at FROM messages WHERE session_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![session_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (role, content, created_at) = row?;
                let role = TranscriptRole::try_from(role).map_err(StoreError::InvalidData)?;
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|err| {
                        StoreError::InvalidData(format!("bad message timestamp {created_at}: {err}"))
                    })?
                    .with_timezone(&Utc);
                entries.push(HistoryEntry {
                    role,
                    content,
                    created_at,
                });
            }
            Ok(entries)
        })
        .await
    }

    async fn clear(&self, session_id: SessionId) -> Result<(), StoreError> {
        self.call(move |conn| {
            conn.execute(
                "DELETE FROM messages WHERE session_id = ?1",
                params![session_id.to_string()],
            )?;
            Ok(())
        })
        .await
    }
}
