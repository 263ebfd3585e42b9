//! Append-only audit trails: duplicates, activity, health history, and chat.
//!
//! The synced-fingerprint registry records every entity the sync pipeline has
//! pushed; the duplicate log records each time an already-registered
//! fingerprint is seen again. Registry membership is what makes a re-run
//! idempotent, the log is the audit trail of the skips.

use anyhow::{Context, Result};
use rusqlite::params;

use crate::records::{ActivityLogEntry, ChatMessageRecord, ChatSender, DuplicateLogEntry, HealthHistoryEntry};
use crate::store::RexStore;

impl RexStore {
    // Synced-fingerprint registry

    pub fn has_synced_fingerprint(&self, user_id: &str, fingerprint: &str) -> Result<bool> {
        let count: u64 = self
            .conn()
            .query_row(
                r#"
                SELECT COUNT(1) FROM synced_fingerprints
                WHERE user_id = ?1 AND fingerprint = ?2
                "#,
                params![user_id, fingerprint],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to probe fingerprint registry for user {user_id}"))?;
        Ok(count > 0)
    }

    pub fn record_synced_fingerprint(&self, user_id: &str, fingerprint: &str) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT OR IGNORE INTO synced_fingerprints (user_id, fingerprint, created_at)
                VALUES (?1, ?2, ?3)
                "#,
                params![user_id, fingerprint, rex_core::current_unix_timestamp()],
            )
            .with_context(|| format!("failed to register fingerprint for user {user_id}"))?;
        Ok(())
    }

    // Duplicate log

    pub fn log_duplicate(&self, user_id: &str, fingerprint: &str, entity_payload: &str) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT INTO duplicates_log (user_id, fingerprint, entity_payload, created_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    user_id,
                    fingerprint,
                    entity_payload,
                    rex_core::current_unix_timestamp()
                ],
            )
            .with_context(|| format!("failed to log duplicate for user {user_id}"))?;
        Ok(())
    }

    pub fn count_duplicates(&self, user_id: &str) -> Result<u64> {
        self.conn()
            .query_row(
                "SELECT COUNT(1) FROM duplicates_log WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to count duplicates for user {user_id}"))
    }

    /// Newest-first duplicate entries, bounded by `limit`.
    pub fn recent_duplicates(&self, user_id: &str, limit: u32) -> Result<Vec<DuplicateLogEntry>> {
        let conn = self.conn();
        let mut statement = conn
            .prepare(
                r#"
                SELECT id, user_id, fingerprint, entity_payload, created_at
                FROM duplicates_log
                WHERE user_id = ?1
                ORDER BY id DESC
                LIMIT ?2
                "#,
            )
            .context("failed to prepare duplicate listing")?;
        let mut rows = statement.query(params![user_id, limit])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(DuplicateLogEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                fingerprint: row.get(2)?,
                entity_payload: row.get(3)?,
                created_at: row.get(4)?,
            });
        }
        Ok(entries)
    }

    // Activity log

    pub fn log_activity(&self, user_id: &str, action: &str, details: &str) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT INTO activity_log (user_id, action, details, created_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![user_id, action, details, rex_core::current_unix_timestamp()],
            )
            .with_context(|| format!("failed to log activity '{action}' for user {user_id}"))?;
        Ok(())
    }

    /// Newest-first activity entries, bounded by `limit`.
    pub fn recent_activity(&self, user_id: &str, limit: u32) -> Result<Vec<ActivityLogEntry>> {
        let conn = self.conn();
        let mut statement = conn
            .prepare(
                r#"
                SELECT id, user_id, action, details, created_at
                FROM activity_log
                WHERE user_id = ?1
                ORDER BY id DESC
                LIMIT ?2
                "#,
            )
            .context("failed to prepare activity listing")?;
        let mut rows = statement.query(params![user_id, limit])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(ActivityLogEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                action: row.get(2)?,
                details: row.get(3)?,
                created_at: row.get(4)?,
            });
        }
        Ok(entries)
    }

    pub fn count_activity(&self, user_id: &str, action: &str) -> Result<u64> {
        self.conn()
            .query_row(
                "SELECT COUNT(1) FROM activity_log WHERE user_id = ?1 AND action = ?2",
                params![user_id, action],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to count '{action}' activity for user {user_id}"))
    }

    // Health history

    pub fn log_health(
        &self,
        user_id: &str,
        contact_id: &str,
        email_score: u8,
        phone_score: u8,
    ) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT INTO health_history (user_id, contact_id, email_score, phone_score, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    user_id,
                    contact_id,
                    email_score,
                    phone_score,
                    rex_core::current_unix_timestamp()
                ],
            )
            .with_context(|| format!("failed to log health for contact {contact_id}"))?;
        Ok(())
    }

    /// Newest-first health entries, bounded by `limit`.
    pub fn recent_health(&self, user_id: &str, limit: u32) -> Result<Vec<HealthHistoryEntry>> {
        let conn = self.conn();
        let mut statement = conn
            .prepare(
                r#"
                SELECT id, user_id, contact_id, email_score, phone_score, created_at
                FROM health_history
                WHERE user_id = ?1
                ORDER BY id DESC
                LIMIT ?2
                "#,
            )
            .context("failed to prepare health listing")?;
        let mut rows = statement.query(params![user_id, limit])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(HealthHistoryEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                contact_id: row.get(2)?,
                email_score: row.get(3)?,
                phone_score: row.get(4)?,
                created_at: row.get(5)?,
            });
        }
        Ok(entries)
    }

    // Chat history

    pub fn append_chat_message(
        &self,
        user_id: &str,
        sender: ChatSender,
        message: &str,
    ) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT INTO chat_messages (user_id, sender, message, created_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    user_id,
                    sender.as_str(),
                    message,
                    rex_core::current_unix_timestamp()
                ],
            )
            .with_context(|| format!("failed to append chat message for user {user_id}"))?;
        Ok(())
    }

    /// Newest-first chat messages, bounded by `limit`.
    pub fn recent_chat_messages(&self, user_id: &str, limit: u32) -> Result<Vec<ChatMessageRecord>> {
        let conn = self.conn();
        let mut statement = conn
            .prepare(
                r#"
                SELECT id, user_id, sender, message, created_at
                FROM chat_messages
                WHERE user_id = ?1
                ORDER BY id DESC
                LIMIT ?2
                "#,
            )
            .context("failed to prepare chat listing")?;
        let mut rows = statement.query(params![user_id, limit])?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            let raw_sender: String = row.get(2)?;
            let sender = ChatSender::parse(&raw_sender).with_context(|| {
                format!("unrecognized chat sender '{raw_sender}' stored for user {user_id}")
            })?;
            messages.push(ChatMessageRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                sender,
                message: row.get(3)?,
                created_at: row.get(4)?,
            });
        }
        Ok(messages)
    }
}
