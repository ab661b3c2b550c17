use chrono::Utc;
use tracing::instrument;

use relay_core::StoredMessage;

use crate::database::Database;
use crate::error::StoreError;
use crate::schema::MAX_MESSAGE_CHARS;

/// Durable append-only log of chat messages.
///
/// The two operations the room needs: `append` a message and fetch the
/// `recent` tail for history replay. Ordering is insertion order (rowid);
/// timestamps are RFC 3339 strings assigned at append time.
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a message and return the stored row.
    ///
    /// Rejects bodies over 1000 characters; callers are expected to have
    /// trimmed the text already.
    #[instrument(skip(self, text), fields(username = %username))]
    pub fn append(&self, username: &str, text: &str) -> Result<StoredMessage, StoreError> {
        let chars = text.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            return Err(StoreError::TooLong {
                limit: MAX_MESSAGE_CHARS,
                actual: chars,
            });
        }

        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (username, message, timestamp) VALUES (?1, ?2, ?3)",
                rusqlite::params![username, text, now],
            )?;

            Ok(StoredMessage {
                username: username.to_owned(),
                message: text.to_owned(),
                timestamp: now.clone(),
            })
        })
    }

    /// Fetch up to `limit` most recent messages, oldest first.
    ///
    /// Reads the tail newest-first then reverses, so the result is the last
    /// `limit` messages in the order they were appended.
    #[instrument(skip(self))]
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredMessage>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, message, timestamp FROM messages
                 ORDER BY id DESC LIMIT ?1",
            )?;

            let mut rows: Vec<StoredMessage> = stmt
                .query_map([limit as i64], |row| {
                    Ok(StoredMessage {
                        username: row.get(0)?,
                        message: row.get(1)?,
                        timestamp: row.get(2)?,
                    })
                })?
                .collect::<Result<_, _>>()?;

            rows.reverse();
            Ok(rows)
        })
    }

    /// Total number of stored messages.
    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
                .map_err(StoreError::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> MessageRepo {
        MessageRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn append_returns_stored_row() {
        let repo = repo();
        let msg = repo.append("alice", "hello").unwrap();
        assert_eq!(msg.username, "alice");
        assert_eq!(msg.message, "hello");
        assert!(!msg.timestamp.is_empty());
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn recent_is_oldest_first() {
        let repo = repo();
        for i in 0..5 {
            repo.append("alice", &format!("msg {i}")).unwrap();
        }

        let messages = repo.recent(50).unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].message, "msg 0");
        assert_eq!(messages[4].message, "msg 4");
    }

    #[test]
    fn recent_bounds_to_limit_keeping_newest() {
        let repo = repo();
        for i in 0..60 {
            repo.append("bob", &format!("msg {i}")).unwrap();
        }

        let messages = repo.recent(50).unwrap();
        assert_eq!(messages.len(), 50);
        // The 10 oldest fall off; order within the window stays append order.
        assert_eq!(messages[0].message, "msg 10");
        assert_eq!(messages[49].message, "msg 59");
    }

    #[test]
    fn recent_on_empty_store() {
        let repo = repo();
        assert!(repo.recent(50).unwrap().is_empty());
    }

    #[test]
    fn append_rejects_oversized_message() {
        let repo = repo();
        let long = "x".repeat(1001);
        let err = repo.append("alice", &long).unwrap_err();
        assert!(matches!(
            err,
            StoreError::TooLong {
                limit: 1000,
                actual: 1001
            }
        ));
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn append_accepts_exactly_max_length() {
        let repo = repo();
        let max = "x".repeat(1000);
        repo.append("alice", &max).unwrap();
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn timestamps_parse_as_rfc3339() {
        let repo = repo();
        let msg = repo.append("alice", "hi").unwrap();
        chrono::DateTime::parse_from_rfc3339(&msg.timestamp).unwrap();
    }
}
