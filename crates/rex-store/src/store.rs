//! SQLite-backed keyed store for Rex state.
//!
//! One file-backed database holds every persisted table described in the data
//! model: users, contacts, deals, tokens, settings, audit logs, deal alerts,
//! two-factor codes, webhooks, send credits, and chat history. Access is
//! serialized through an internal mutex around the connection; every mutation
//! commits at single-statement granularity.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::records::{ContactRecord, DealRecord, DealType, UserRecord};

pub(crate) const STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug)]
pub(crate) struct CachedToken {
    pub value: String,
    pub cached_at: u64,
}

/// SQLite-backed store scoping every record by `user_id`.
pub struct RexStore {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) token_cache: Mutex<BTreeMap<(String, String), CachedToken>>,
    path: PathBuf,
}

impl RexStore {
    /// Opens (creating if necessary) the store at `path` and validates the
    /// schema version.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create store directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open rex store {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("failed to configure store busy timeout")?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )
        .context("failed to configure store pragmas")?;
        initialize_schema(&conn)
            .with_context(|| format!("failed to initialize store schema {}", path.display()))?;
        check_schema_version(&conn, path)?;
        tracing::debug!(path = %path.display(), "opened rex store");
        Ok(Self {
            conn: Mutex::new(conn),
            token_cache: Mutex::new(BTreeMap::new()),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // Users

    /// Returns the stored user, creating it on first sight (first login).
    pub fn ensure_user(&self, user_id: &str, email: &str) -> Result<UserRecord> {
        if let Some(existing) = self.user(user_id)? {
            return Ok(existing);
        }
        let record = UserRecord {
            id: user_id.to_string(),
            email: email.to_string(),
            created_at: rex_core::current_unix_timestamp(),
        };
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO users (id, email, created_at) VALUES (?1, ?2, ?3)",
                params![record.id, record.email, record.created_at],
            )
            .with_context(|| format!("failed to create user {user_id}"))?;
        Ok(record)
    }

    pub fn user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        self.conn()
            .query_row(
                "SELECT id, email, created_at FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("failed to read user {user_id}"))
    }

    // Contacts

    pub fn upsert_contact(&self, contact: &ContactRecord) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT OR REPLACE INTO contacts (id, user_id, name, email, phone)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    contact.id,
                    contact.user_id,
                    contact.name,
                    contact.email,
                    contact.phone
                ],
            )
            .with_context(|| {
                format!(
                    "failed to store contact {} for user {}",
                    contact.id, contact.user_id
                )
            })?;
        Ok(())
    }

    pub fn contact(&self, user_id: &str, contact_id: &str) -> Result<Option<ContactRecord>> {
        self.conn()
            .query_row(
                r#"
                SELECT id, user_id, name, email, phone
                FROM contacts
                WHERE user_id = ?1 AND id = ?2
                "#,
                params![user_id, contact_id],
                |row| {
                    Ok(ContactRecord {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        email: row.get(3)?,
                        phone: row.get(4)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("failed to read contact {contact_id} for user {user_id}"))
    }

    pub fn list_contacts(&self, user_id: &str) -> Result<Vec<ContactRecord>> {
        let conn = self.conn();
        let mut statement = conn
            .prepare(
                r#"
                SELECT id, user_id, name, email, phone
                FROM contacts
                WHERE user_id = ?1
                ORDER BY id ASC
                "#,
            )
            .context("failed to prepare contact listing")?;
        let mut rows = statement.query(params![user_id])?;
        let mut contacts = Vec::new();
        while let Some(row) = rows.next()? {
            contacts.push(ContactRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                email: row.get(3)?,
                phone: row.get(4)?,
            });
        }
        Ok(contacts)
    }

    /// Deletes one contact; returns true when a row was removed.
    pub fn delete_contact(&self, user_id: &str, contact_id: &str) -> Result<bool> {
        let changed = self
            .conn()
            .execute(
                "DELETE FROM contacts WHERE user_id = ?1 AND id = ?2",
                params![user_id, contact_id],
            )
            .with_context(|| format!("failed to delete contact {contact_id} for user {user_id}"))?;
        Ok(changed > 0)
    }

    // Deals

    pub fn upsert_deal(&self, deal: &DealRecord) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT OR REPLACE INTO deals
                    (id, user_id, amount, close_date, sq_ft, rent_month, sale_price, deal_type)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    deal.id,
                    deal.user_id,
                    deal.amount,
                    deal.close_date,
                    deal.sq_ft,
                    deal.rent_month,
                    deal.sale_price,
                    deal.deal_type.as_str()
                ],
            )
            .with_context(|| {
                format!("failed to store deal {} for user {}", deal.id, deal.user_id)
            })?;
        Ok(())
    }

    /// Deals come back oldest close date first; ISO dates sort correctly
    /// as text.
    pub fn list_deals(&self, user_id: &str) -> Result<Vec<DealRecord>> {
        self.query_deals(
            user_id,
            r#"
            SELECT id, user_id, amount, close_date, sq_ft, rent_month, sale_price, deal_type
            FROM deals
            WHERE user_id = ?1
            ORDER BY close_date ASC, id ASC
            "#,
            None,
        )
    }

    pub fn list_deals_of_type(&self, user_id: &str, deal_type: DealType) -> Result<Vec<DealRecord>> {
        self.query_deals(
            user_id,
            r#"
            SELECT id, user_id, amount, close_date, sq_ft, rent_month, sale_price, deal_type
            FROM deals
            WHERE user_id = ?1 AND deal_type = ?2
            ORDER BY close_date ASC, id ASC
            "#,
            Some(deal_type),
        )
    }

    /// Deletes one deal; returns true when a row was removed.
    pub fn delete_deal(&self, user_id: &str, deal_id: &str) -> Result<bool> {
        let changed = self
            .conn()
            .execute(
                "DELETE FROM deals WHERE user_id = ?1 AND id = ?2",
                params![user_id, deal_id],
            )
            .with_context(|| format!("failed to delete deal {deal_id} for user {user_id}"))?;
        Ok(changed > 0)
    }

    fn query_deals(
        &self,
        user_id: &str,
        sql: &str,
        deal_type: Option<DealType>,
    ) -> Result<Vec<DealRecord>> {
        let conn = self.conn();
        let mut statement = conn.prepare(sql).context("failed to prepare deal listing")?;
        let mut rows = match deal_type {
            Some(kind) => statement.query(params![user_id, kind.as_str()])?,
            None => statement.query(params![user_id])?,
        };
        let mut deals = Vec::new();
        while let Some(row) = rows.next()? {
            let raw_type: String = row.get(7)?;
            let deal_type = DealType::parse(&raw_type).with_context(|| {
                format!("unrecognized deal type '{raw_type}' stored for user {user_id}")
            })?;
            deals.push(DealRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                amount: row.get(2)?,
                close_date: row.get(3)?,
                sq_ft: row.get(4)?,
                rent_month: row.get(5)?,
                sale_price: row.get(6)?,
                deal_type,
            });
        }
        Ok(deals)
    }
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NULL,
            phone TEXT NULL,
            PRIMARY KEY (id, user_id)
        );
        CREATE TABLE IF NOT EXISTS deals (
            id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            amount REAL NOT NULL,
            close_date TEXT NOT NULL,
            sq_ft REAL NOT NULL,
            rent_month REAL NULL,
            sale_price REAL NULL,
            deal_type TEXT NOT NULL,
            PRIMARY KEY (id, user_id)
        );
        CREATE TABLE IF NOT EXISTS tokens (
            user_id TEXT NOT NULL,
            service TEXT NOT NULL,
            token TEXT NOT NULL,
            PRIMARY KEY (user_id, service)
        );
        CREATE TABLE IF NOT EXISTS settings (
            user_id TEXT PRIMARY KEY,
            subject_generator_enabled INTEGER NOT NULL,
            deal_alerts_enabled INTEGER NOT NULL,
            email_notifications INTEGER NOT NULL,
            sms_notifications INTEGER NOT NULL,
            phone_number TEXT NULL,
            realnex_group_id TEXT NULL,
            mailchimp_audience_id TEXT NULL,
            constant_contact_list_id TEXT NULL,
            apollo_list_id TEXT NULL,
            seamless_list_id TEXT NULL,
            zoominfo_list_id TEXT NULL
        );
        CREATE TABLE IF NOT EXISTS synced_fingerprints (
            user_id TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, fingerprint)
        );
        CREATE TABLE IF NOT EXISTS duplicates_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            entity_payload TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_duplicates_log_user
            ON duplicates_log(user_id, fingerprint);
        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            action TEXT NOT NULL,
            details TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_activity_log_user
            ON activity_log(user_id, id);
        CREATE TABLE IF NOT EXISTS health_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            contact_id TEXT NOT NULL,
            email_score INTEGER NOT NULL,
            phone_score INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS deal_alerts (
            user_id TEXT NOT NULL,
            alert_kind TEXT NOT NULL,
            threshold REAL NOT NULL,
            PRIMARY KEY (user_id, alert_kind)
        );
        CREATE TABLE IF NOT EXISTS two_factor_codes (
            user_id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS webhooks (
            user_id TEXT PRIMARY KEY,
            webhook_url TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS send_credits (
            user_id TEXT PRIMARY KEY,
            email_credits INTEGER NOT NULL,
            has_msa INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            sender TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_messages_user
            ON chat_messages(user_id, id);
        "#,
    )?;
    Ok(())
}

fn check_schema_version(conn: &Connection, path: &Path) -> Result<()> {
    let stored: Option<u32> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .context("failed to read store schema version")?;
    match stored {
        Some(version) if version > STORE_SCHEMA_VERSION => {
            bail!(
                "unsupported rex store schema version {} in {} (supported up to {})",
                version,
                path.display(),
                STORE_SCHEMA_VERSION
            );
        }
        Some(_) => Ok(()),
        None => {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES ('schema_version', ?1)",
                params![STORE_SCHEMA_VERSION],
            )
            .context("failed to record store schema version")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_store(dir: &tempfile::TempDir) -> RexStore {
        RexStore::open(&dir.path().join("rex-state.sqlite3")).expect("open store")
    }

    #[test]
    fn unit_open_creates_parent_directories_and_reopens() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("nested").join("state.sqlite3");
        let store = RexStore::open(&path).expect("first open");
        drop(store);
        RexStore::open(&path).expect("reopen with existing schema");
    }

    #[test]
    fn functional_ensure_user_creates_once_and_keeps_created_at() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_test_store(&tempdir);
        let first = store.ensure_user("user-1", "jane@x.com").expect("create");
        let second = store.ensure_user("user-1", "other@x.com").expect("read");
        assert_eq!(first, second);
        assert_eq!(second.email, "jane@x.com");
    }

    #[test]
    fn functional_contacts_are_scoped_by_user() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_test_store(&tempdir);
        let contact = ContactRecord {
            id: "c-1".to_string(),
            user_id: "user-1".to_string(),
            name: "Jane Doe".to_string(),
            email: Some("jane@x.com".to_string()),
            phone: None,
        };
        store.upsert_contact(&contact).expect("store contact");
        assert_eq!(
            store.contact("user-1", "c-1").expect("read"),
            Some(contact)
        );
        assert_eq!(store.contact("user-2", "c-1").expect("read"), None);
        assert!(store.list_contacts("user-2").expect("list").is_empty());
    }

    #[test]
    fn functional_contact_upsert_overwrites_and_delete_reports_removal() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_test_store(&tempdir);
        let mut contact = ContactRecord {
            id: "c-1".to_string(),
            user_id: "user-1".to_string(),
            name: "Jane Doe".to_string(),
            email: None,
            phone: None,
        };
        store.upsert_contact(&contact).expect("store contact");
        contact.phone = Some("555-0100".to_string());
        store.upsert_contact(&contact).expect("overwrite contact");
        let listed = store.list_contacts("user-1").expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].phone.as_deref(), Some("555-0100"));
        assert!(store.delete_contact("user-1", "c-1").expect("delete"));
        assert!(!store.delete_contact("user-1", "c-1").expect("redelete"));
    }

    #[test]
    fn functional_deals_filter_by_type() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_test_store(&tempdir);
        let lease = DealRecord {
            id: "d-1".to_string(),
            user_id: "user-1".to_string(),
            amount: 5000.0,
            close_date: "2026-01-15".to_string(),
            sq_ft: 1200.0,
            rent_month: Some(4500.0),
            sale_price: None,
            deal_type: DealType::Lease,
        };
        let sale = DealRecord {
            id: "d-2".to_string(),
            user_id: "user-1".to_string(),
            amount: 250000.0,
            close_date: "2026-02-01".to_string(),
            sq_ft: 4800.0,
            rent_month: None,
            sale_price: Some(250000.0),
            deal_type: DealType::Sale,
        };
        store.upsert_deal(&lease).expect("store lease");
        store.upsert_deal(&sale).expect("store sale");
        assert_eq!(store.list_deals("user-1").expect("list").len(), 2);
        let leases = store
            .list_deals_of_type("user-1", DealType::Lease)
            .expect("list leases");
        assert_eq!(leases, vec![lease]);
        assert!(store.delete_deal("user-1", "d-2").expect("delete sale"));
        assert_eq!(store.list_deals("user-1").expect("list").len(), 1);
    }
}
