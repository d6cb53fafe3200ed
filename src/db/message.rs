//! Message repository: the append-only dialogue log

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;

use super::{DbPool, checkout};
use crate::Result;

/// Sender label persisted for user turns
pub const USER_LABEL: &str = "User";

/// A persisted dialogue turn
///
/// Immutable once written; the store never updates or deletes rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Store-assigned, monotonic identifier
    pub id: i64,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
}

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    Assistant,
}

/// Content kind of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum MessageKind {
    #[default]
    Text,
}

impl MessageKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "text" => Self::Text,
            other => {
                tracing::warn!(kind = other, "unknown message kind, treating as text");
                Self::Text
            }
        }
    }
}

/// Message repository
///
/// User turns are stored with the sender label `"User"`, assistant turns
/// with the persona's name.
#[derive(Clone)]
pub struct MessageRepo {
    pool: DbPool,
    assistant_name: Arc<str>,
}

impl MessageRepo {
    /// Create a new message repository
    #[must_use]
    pub fn new(pool: DbPool, assistant_name: impl Into<Arc<str>>) -> Self {
        Self {
            pool,
            assistant_name: assistant_name.into(),
        }
    }

    /// Label persisted for a sender
    #[must_use]
    pub fn label(&self, sender: Sender) -> &str {
        match sender {
            Sender::User => USER_LABEL,
            Sender::Assistant => &self.assistant_name,
        }
    }

    fn sender_from_label(&self, label: &str) -> Sender {
        if label == &*self.assistant_name {
            Sender::Assistant
        } else {
            Sender::User
        }
    }

    /// Append a turn to the log
    ///
    /// # Errors
    ///
    /// Returns error if the database is unavailable
    pub fn append(&self, sender: Sender, content: &str, kind: MessageKind) -> Result<Message> {
        let conn = checkout(&self.pool)?;

        let now = Utc::now();
        conn.execute(
            "INSERT INTO messages (sender, content, created_at, kind) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                self.label(sender),
                content,
                format_timestamp(&now),
                kind.as_str()
            ],
        )?;
        let id = conn.last_insert_rowid();

        tracing::debug!(message_id = id, ?sender, "message appended");

        Ok(Message {
            id,
            sender,
            content: content.to_string(),
            created_at: now,
            kind,
        })
    }

    /// Get the most recent turns, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the database is unavailable
    pub fn recent(&self, limit: usize) -> Result<Vec<Message>> {
        self.query_recent(None, limit)
    }

    /// Get the most recent turns written before `id`, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the database is unavailable
    pub fn recent_before(&self, id: i64, limit: usize) -> Result<Vec<Message>> {
        self.query_recent(Some(id), limit)
    }

    fn query_recent(&self, before: Option<i64>, limit: usize) -> Result<Vec<Message>> {
        let conn = checkout(&self.pool)?;

        let mut stmt = conn.prepare(
            "SELECT id, sender, content, created_at, kind FROM messages
             WHERE ?1 IS NULL OR id < ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut messages = stmt
            .query_map(rusqlite::params![before, limit], |row| self.map_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // Reverse to get chronological order
        messages.reverse();
        Ok(messages)
    }

    /// Count all persisted turns
    ///
    /// # Errors
    ///
    /// Returns error if the database is unavailable
    pub fn count(&self) -> Result<usize> {
        let conn = checkout(&self.pool)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn map_row(&self, row: &Row<'_>) -> rusqlite::Result<Message> {
        Ok(Message {
            id: row.get(0)?,
            sender: self.sender_from_label(&row.get::<_, String>(1)?),
            content: row.get(2)?,
            created_at: parse_datetime(&row.get::<_, String>(3)?),
            kind: MessageKind::parse(&row.get::<_, String>(4)?),
        })
    }
}

/// Fixed-width RFC3339 so that lexical order matches chronological order
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn setup() -> MessageRepo {
        MessageRepo::new(init_memory().unwrap(), "Mimi")
    }

    #[test]
    fn test_append_and_recent() {
        let repo = setup();

        repo.append(Sender::User, "Hello", MessageKind::Text).unwrap();
        repo.append(Sender::Assistant, "Hi there!", MessageKind::Text)
            .unwrap();

        let messages = repo.recent(10).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].content, "Hi there!");
        assert_eq!(messages[1].sender, Sender::Assistant);
        assert!(messages[0].id < messages[1].id);
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let repo = setup();
        for i in 0..10 {
            repo.append(Sender::User, &format!("m{i}"), MessageKind::Text)
                .unwrap();
        }

        let tail: Vec<String> = repo
            .recent(3)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(tail, ["m7", "m8", "m9"]);

        // Reads are stable
        let again: Vec<String> = repo
            .recent(3)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(tail, again);
    }

    #[test]
    fn test_recent_before_excludes_pivot() {
        let repo = setup();
        repo.append(Sender::User, "a", MessageKind::Text).unwrap();
        repo.append(Sender::Assistant, "b", MessageKind::Text).unwrap();
        let pivot = repo.append(Sender::User, "c", MessageKind::Text).unwrap();

        let before = repo.recent_before(pivot.id, 15).unwrap();
        assert_eq!(before.len(), 2);
        assert_eq!(before[0].content, "a");
        assert_eq!(before[1].content, "b");
    }

    #[test]
    fn test_ties_broken_by_id() {
        let repo = setup();
        let conn = repo.pool.get().unwrap();
        let ts = "2026-01-01T00:00:00.000000Z";
        for body in ["first", "second", "third"] {
            conn.execute(
                "INSERT INTO messages (sender, content, created_at) VALUES ('User', ?1, ?2)",
                [body, ts],
            )
            .unwrap();
        }
        drop(conn);

        let contents: Vec<String> = repo
            .recent(2)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["second", "third"]);
    }

    #[test]
    fn test_sender_labels() {
        let repo = setup();
        repo.append(Sender::Assistant, "hey", MessageKind::Text).unwrap();

        let conn = repo.pool.get().unwrap();
        let label: String = conn
            .query_row("SELECT sender FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(label, "Mimi");

        // Anything that is not the assistant's name reads back as a user turn
        conn.execute(
            "INSERT INTO messages (sender, content, created_at) VALUES ('Toi', 'x', '2099-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();
        drop(conn);

        let last = repo.recent(1).unwrap().pop().unwrap();
        assert_eq!(last.sender, Sender::User);
        assert_eq!(last.kind, MessageKind::Text);
    }

    #[test]
    fn test_count() {
        let repo = setup();
        assert_eq!(repo.count().unwrap(), 0);

        repo.append(Sender::User, "Test", MessageKind::Text).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_append_fails_when_storage_unavailable() {
        let repo = setup();
        repo.pool
            .get()
            .unwrap()
            .execute_batch("DROP TABLE messages")
            .unwrap();

        let err = repo
            .append(Sender::User, "lost?", MessageKind::Text)
            .unwrap_err();
        assert!(err.is_persistence());
    }
}
