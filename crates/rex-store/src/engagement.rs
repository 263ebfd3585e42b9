//! Deal alerts, two-factor codes, webhooks, and send credits.

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::records::{AlertKind, CreditDebit, DealAlertRecord, SendCreditsRecord, TwoFactorCodeRecord};
use crate::store::RexStore;

impl RexStore {
    // Deal alerts

    /// At most one alert per `(user_id, kind)`; re-setting overwrites the
    /// threshold.
    pub fn upsert_deal_alert(&self, user_id: &str, kind: AlertKind, threshold: f64) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT OR REPLACE INTO deal_alerts (user_id, alert_kind, threshold)
                VALUES (?1, ?2, ?3)
                "#,
                params![user_id, kind.as_str(), threshold],
            )
            .with_context(|| format!("failed to store {} alert for user {user_id}", kind.as_str()))?;
        Ok(())
    }

    pub fn deal_alerts(&self, user_id: &str) -> Result<Vec<DealAlertRecord>> {
        let conn = self.conn();
        let mut statement = conn
            .prepare(
                r#"
                SELECT user_id, alert_kind, threshold
                FROM deal_alerts
                WHERE user_id = ?1
                ORDER BY alert_kind ASC
                "#,
            )
            .context("failed to prepare alert listing")?;
        let mut rows = statement.query(params![user_id])?;
        let mut alerts = Vec::new();
        while let Some(row) = rows.next()? {
            let raw_kind: String = row.get(1)?;
            let kind = AlertKind::parse(&raw_kind).with_context(|| {
                format!("unrecognized alert kind '{raw_kind}' stored for user {user_id}")
            })?;
            alerts.push(DealAlertRecord {
                user_id: row.get(0)?,
                kind,
                threshold: row.get(2)?,
            });
        }
        Ok(alerts)
    }

    // Two-factor codes

    /// Stores the live code for a user, replacing any prior one.
    pub fn store_two_factor_code(&self, user_id: &str, code: &str, expires_at: u64) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT OR REPLACE INTO two_factor_codes (user_id, code, expires_at)
                VALUES (?1, ?2, ?3)
                "#,
                params![user_id, code, expires_at],
            )
            .with_context(|| format!("failed to store two-factor code for user {user_id}"))?;
        Ok(())
    }

    pub fn two_factor_code(&self, user_id: &str) -> Result<Option<TwoFactorCodeRecord>> {
        self.conn()
            .query_row(
                "SELECT user_id, code, expires_at FROM two_factor_codes WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(TwoFactorCodeRecord {
                        user_id: row.get(0)?,
                        code: row.get(1)?,
                        expires_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("failed to read two-factor code for user {user_id}"))
    }

    /// Removes the live code; a verified code is consumed through this.
    pub fn clear_two_factor_code(&self, user_id: &str) -> Result<()> {
        self.conn()
            .execute(
                "DELETE FROM two_factor_codes WHERE user_id = ?1",
                params![user_id],
            )
            .with_context(|| format!("failed to clear two-factor code for user {user_id}"))?;
        Ok(())
    }

    // Webhooks

    /// At most one webhook per user; re-registration overwrites.
    pub fn register_webhook(&self, user_id: &str, webhook_url: &str) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT OR REPLACE INTO webhooks (user_id, webhook_url)
                VALUES (?1, ?2)
                "#,
                params![user_id, webhook_url],
            )
            .with_context(|| format!("failed to register webhook for user {user_id}"))?;
        Ok(())
    }

    pub fn webhook_url(&self, user_id: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT webhook_url FROM webhooks WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read webhook for user {user_id}"))
    }

    // Send credits

    /// Returns the user's entitlements, seeding a zeroed row on first read.
    pub fn send_credits(&self, user_id: &str) -> Result<SendCreditsRecord> {
        let existing = self
            .conn()
            .query_row(
                "SELECT user_id, email_credits, has_msa FROM send_credits WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(SendCreditsRecord {
                        user_id: row.get(0)?,
                        email_credits: row.get(1)?,
                        has_msa: row.get(2)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("failed to read send credits for user {user_id}"))?;
        if let Some(record) = existing {
            return Ok(record);
        }
        let seeded = SendCreditsRecord {
            user_id: user_id.to_string(),
            email_credits: 0,
            has_msa: false,
        };
        self.set_send_credits(user_id, 0, false)
            .with_context(|| format!("failed to seed send credits for user {user_id}"))?;
        Ok(seeded)
    }

    pub fn set_send_credits(&self, user_id: &str, email_credits: u64, has_msa: bool) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT OR REPLACE INTO send_credits (user_id, email_credits, has_msa)
                VALUES (?1, ?2, ?3)
                "#,
                params![user_id, email_credits, has_msa],
            )
            .with_context(|| format!("failed to store send credits for user {user_id}"))?;
        Ok(())
    }

    /// Debits one campaign send, preferring the one-time MSA entitlement over
    /// metered credits.
    pub fn debit_send_credit(&self, user_id: &str) -> Result<CreditDebit> {
        let current = self.send_credits(user_id)?;
        if current.has_msa {
            self.set_send_credits(user_id, current.email_credits, false)?;
            tracing::debug!(user_id, "consumed msa entitlement");
            return Ok(CreditDebit::Msa);
        }
        if current.email_credits > 0 {
            self.set_send_credits(user_id, current.email_credits - 1, false)?;
            tracing::debug!(
                user_id,
                remaining = current.email_credits - 1,
                "consumed metered send credit"
            );
            return Ok(CreditDebit::Metered);
        }
        Ok(CreditDebit::Insufficient)
    }
}
