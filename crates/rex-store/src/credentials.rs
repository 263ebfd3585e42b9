//! Per-user, per-service credential lookup and per-user settings.
//!
//! Tokens are read through a write-through side cache with a fixed TTL; the
//! cache entry is overwritten whenever the underlying token is re-saved, so
//! staleness is bounded by the TTL only for out-of-band revocation.

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::records::SettingsRecord;
use crate::store::{CachedToken, RexStore};

/// Token cache entries older than this are refreshed from the store.
pub const TOKEN_CACHE_TTL_SECS: u64 = 3600;

impl RexStore {
    /// Stores (overwriting) the token for `(user_id, service)` and refreshes
    /// the cache entry.
    pub fn save_token(&self, user_id: &str, service: &str, token: &str) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT OR REPLACE INTO tokens (user_id, service, token)
                VALUES (?1, ?2, ?3)
                "#,
                params![user_id, service, token],
            )
            .with_context(|| format!("failed to save {service} token for user {user_id}"))?;
        let mut cache = match self.token_cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.insert(
            (user_id.to_string(), service.to_string()),
            CachedToken {
                value: token.to_string(),
                cached_at: rex_core::current_unix_timestamp(),
            },
        );
        tracing::debug!(user_id, service, "saved provider token");
        Ok(())
    }

    /// Returns the token for `(user_id, service)`, serving from the cache
    /// while the entry is within TTL.
    pub fn token(&self, user_id: &str, service: &str) -> Result<Option<String>> {
        self.token_at(user_id, service, rex_core::current_unix_timestamp())
    }

    /// TTL-aware token lookup against an explicit clock.
    pub fn token_at(&self, user_id: &str, service: &str, now_unix: u64) -> Result<Option<String>> {
        let key = (user_id.to_string(), service.to_string());
        {
            let cache = match self.token_cache.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(entry) = cache.get(&key) {
                let expires = entry.cached_at.saturating_add(TOKEN_CACHE_TTL_SECS);
                if !rex_core::is_expired_unix(Some(expires), now_unix) {
                    tracing::debug!(user_id, service, source = "cache", "resolved token");
                    return Ok(Some(entry.value.clone()));
                }
            }
        }
        let stored: Option<String> = self
            .conn()
            .query_row(
                "SELECT token FROM tokens WHERE user_id = ?1 AND service = ?2",
                params![user_id, service],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read {service} token for user {user_id}"))?;
        if let Some(value) = &stored {
            let mut cache = match self.token_cache.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            cache.insert(
                key,
                CachedToken {
                    value: value.clone(),
                    cached_at: now_unix,
                },
            );
            tracing::debug!(user_id, service, source = "store", "resolved token");
        }
        Ok(stored)
    }

    /// Returns the user's settings, inserting the defaults on first read.
    pub fn settings(&self, user_id: &str) -> Result<SettingsRecord> {
        let existing = self
            .conn()
            .query_row(
                r#"
                SELECT user_id, subject_generator_enabled, deal_alerts_enabled,
                       email_notifications, sms_notifications, phone_number,
                       realnex_group_id, mailchimp_audience_id, constant_contact_list_id,
                       apollo_list_id, seamless_list_id, zoominfo_list_id
                FROM settings
                WHERE user_id = ?1
                "#,
                params![user_id],
                |row| {
                    Ok(SettingsRecord {
                        user_id: row.get(0)?,
                        subject_generator_enabled: row.get(1)?,
                        deal_alerts_enabled: row.get(2)?,
                        email_notifications: row.get(3)?,
                        sms_notifications: row.get(4)?,
                        phone_number: row.get(5)?,
                        realnex_group_id: row.get(6)?,
                        mailchimp_audience_id: row.get(7)?,
                        constant_contact_list_id: row.get(8)?,
                        apollo_list_id: row.get(9)?,
                        seamless_list_id: row.get(10)?,
                        zoominfo_list_id: row.get(11)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("failed to read settings for user {user_id}"))?;
        if let Some(settings) = existing {
            return Ok(settings);
        }
        let defaults = SettingsRecord::default_for_user(user_id);
        self.update_settings(&defaults)
            .with_context(|| format!("failed to seed default settings for user {user_id}"))?;
        tracing::debug!(user_id, "seeded default settings");
        Ok(defaults)
    }

    /// Overwrites the user's settings record.
    pub fn update_settings(&self, settings: &SettingsRecord) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT OR REPLACE INTO settings
                    (user_id, subject_generator_enabled, deal_alerts_enabled,
                     email_notifications, sms_notifications, phone_number,
                     realnex_group_id, mailchimp_audience_id, constant_contact_list_id,
                     apollo_list_id, seamless_list_id, zoominfo_list_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    settings.user_id,
                    settings.subject_generator_enabled,
                    settings.deal_alerts_enabled,
                    settings.email_notifications,
                    settings.sms_notifications,
                    settings.phone_number,
                    settings.realnex_group_id,
                    settings.mailchimp_audience_id,
                    settings.constant_contact_list_id,
                    settings.apollo_list_id,
                    settings.seamless_list_id,
                    settings.zoominfo_list_id
                ],
            )
            .with_context(|| format!("failed to store settings for user {}", settings.user_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_store(dir: &tempfile::TempDir) -> RexStore {
        RexStore::open(&dir.path().join("rex-state.sqlite3")).expect("open store")
    }

    #[test]
    fn functional_token_round_trip_and_overwrite() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_test_store(&tempdir);
        assert_eq!(store.token("user-1", "realnex").expect("miss"), None);
        store
            .save_token("user-1", "realnex", "secret-a")
            .expect("save");
        assert_eq!(
            store.token("user-1", "realnex").expect("hit"),
            Some("secret-a".to_string())
        );
        store
            .save_token("user-1", "realnex", "secret-b")
            .expect("resave");
        assert_eq!(
            store.token("user-1", "realnex").expect("refreshed"),
            Some("secret-b".to_string())
        );
    }

    #[test]
    fn unit_token_cache_expires_after_ttl() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_test_store(&tempdir);
        let now = rex_core::current_unix_timestamp();
        store
            .save_token("user-1", "mailchimp", "cached-value")
            .expect("save");
        // Mutate the row behind the cache's back; a within-TTL read must
        // still serve the cached value, a post-TTL read must not.
        store
            .conn()
            .execute(
                "UPDATE tokens SET token = 'rotated-value' WHERE user_id = 'user-1'",
                [],
            )
            .expect("rotate row");
        assert_eq!(
            store
                .token_at("user-1", "mailchimp", now + TOKEN_CACHE_TTL_SECS - 1)
                .expect("within ttl"),
            Some("cached-value".to_string())
        );
        assert_eq!(
            store
                .token_at("user-1", "mailchimp", now + TOKEN_CACHE_TTL_SECS + 1)
                .expect("past ttl"),
            Some("rotated-value".to_string())
        );
    }

    #[test]
    fn functional_settings_seed_defaults_once_and_persist_updates() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_test_store(&tempdir);
        let defaults = store.settings("user-1").expect("seed");
        assert_eq!(defaults, SettingsRecord::default_for_user("user-1"));
        let mut updated = defaults.clone();
        updated.realnex_group_id = Some("group-9".to_string());
        updated.sms_notifications = true;
        store.update_settings(&updated).expect("update");
        assert_eq!(store.settings("user-1").expect("reread"), updated);
        // A different user still sees pristine defaults.
        assert_eq!(
            store.settings("user-2").expect("other user"),
            SettingsRecord::default_for_user("user-2")
        );
    }
}
