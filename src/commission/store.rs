//! Commission storage
//!
//! SQLite-backed reads over the payment domain plus the two things this
//! engine owns: CommissionEntry idempotency rows and the journal
//! document-number sequence. A partial unique index on
//! `payment_split_id WHERE status != 'voided'` makes the loser of a
//! concurrent double-post fail at the storage layer instead of silently
//! duplicating a remote document.

use crate::commission::models::{
    Broker, CommissionEntry, CommissionMapping, Deal, EntryStatus, Payment, PaymentSplit,
    PostingType,
};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tokio::sync::Mutex;

const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct CommissionStore {
    conn: Arc<Mutex<Connection>>,
}

impl CommissionStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open commission db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS brokers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS deals (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                deal_id TEXT NOT NULL,
                name TEXT NOT NULL,
                paid_date TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS payment_splits (
                id TEXT PRIMARY KEY,
                payment_id TEXT NOT NULL,
                broker_id TEXT,
                amount REAL NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS commission_mappings (
                id TEXT PRIMARY KEY,
                broker_id TEXT NOT NULL,
                posting_type TEXT NOT NULL,
                vendor_id TEXT,
                debit_account_id TEXT NOT NULL,
                debit_account_name TEXT NOT NULL,
                credit_account_id TEXT,
                credit_account_name TEXT,
                description_template TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS commission_entries (
                id TEXT PRIMARY KEY,
                payment_split_id TEXT NOT NULL,
                remote_doc_type TEXT NOT NULL,
                remote_doc_id TEXT NOT NULL,
                doc_number TEXT NOT NULL,
                amount REAL NOT NULL,
                txn_date TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        // At-most-once posting guarantee, enforced at the storage layer
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_commission_entries_split_live
             ON commission_entries(payment_split_id) WHERE status != 'voided'",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS journal_doc_sequence (
                prefix TEXT PRIMARY KEY,
                next_value INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---- payment domain reads -------------------------------------------

    pub async fn get_split(&self, id: &str) -> Result<Option<PaymentSplit>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, payment_id, broker_id, amount FROM payment_splits WHERE id = ?1",
        )?;
        let split = stmt
            .query_row(params![id], |row| {
                Ok(PaymentSplit {
                    id: row.get(0)?,
                    payment_id: row.get(1)?,
                    broker_id: row.get(2)?,
                    amount: row.get(3)?,
                })
            })
            .optional()?;
        Ok(split)
    }

    pub async fn get_payment(&self, id: &str) -> Result<Option<Payment>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached("SELECT id, deal_id, name, paid_date FROM payments WHERE id = ?1")?;
        let payment = stmt
            .query_row(params![id], |row| {
                let paid_date: Option<String> = row.get(3)?;
                Ok(Payment {
                    id: row.get(0)?,
                    deal_id: row.get(1)?,
                    name: row.get(2)?,
                    paid_date: paid_date
                        .and_then(|d| NaiveDate::parse_from_str(&d, DATE_FMT).ok()),
                })
            })
            .optional()?;
        Ok(payment)
    }

    pub async fn get_deal(&self, id: &str) -> Result<Option<Deal>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT id, name FROM deals WHERE id = ?1")?;
        let deal = stmt
            .query_row(params![id], |row| {
                Ok(Deal {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()?;
        Ok(deal)
    }

    pub async fn get_broker(&self, id: &str) -> Result<Option<Broker>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT id, name, email FROM brokers WHERE id = ?1")?;
        let broker = stmt
            .query_row(params![id], |row| {
                Ok(Broker {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                })
            })
            .optional()?;
        Ok(broker)
    }

    pub async fn get_active_mapping(&self, broker_id: &str) -> Result<Option<CommissionMapping>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, broker_id, posting_type, vendor_id, debit_account_id,
                    debit_account_name, credit_account_id, credit_account_name,
                    description_template, active
             FROM commission_mappings WHERE broker_id = ?1 AND active = 1 LIMIT 1",
        )?;
        type Row = (String, String, String, Option<String>, String, String,
            Option<String>, Option<String>, String, i64);
        let row: Option<Row> = stmt
            .query_row(params![broker_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            })
            .optional()?;

        let Some((id, broker_id, raw_type, vendor_id, debit_account_id, debit_account_name,
            credit_account_id, credit_account_name, description_template, active)) = row
        else {
            return Ok(None);
        };

        let Some(posting_type) = PostingType::from_str(&raw_type) else {
            bail!("mapping {} has unknown posting type '{}'", id, raw_type);
        };

        Ok(Some(CommissionMapping {
            id,
            broker_id,
            posting_type,
            vendor_id,
            debit_account_id,
            debit_account_name,
            credit_account_id,
            credit_account_name,
            description_template,
            active: active != 0,
        }))
    }

    /// Cache a discovered remote vendor id back onto the mapping
    pub async fn cache_mapping_vendor(&self, mapping_id: &str, vendor_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE commission_mappings SET vendor_id = ?1 WHERE id = ?2",
            params![vendor_id, mapping_id],
        )?;
        Ok(())
    }

    // ---- idempotency records --------------------------------------------

    pub async fn find_live_entry(&self, payment_split_id: &str) -> Result<Option<CommissionEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, payment_split_id, remote_doc_type, remote_doc_id, doc_number,
                    amount, txn_date, status, created_at
             FROM commission_entries
             WHERE payment_split_id = ?1 AND status != 'voided' LIMIT 1",
        )?;
        let entry = stmt
            .query_row(params![payment_split_id], Self::row_to_entry)
            .optional()?;
        Ok(entry)
    }

    pub async fn insert_entry(&self, entry: &CommissionEntry) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO commission_entries
             (id, payment_split_id, remote_doc_type, remote_doc_id, doc_number,
              amount, txn_date, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &entry.id,
                &entry.payment_split_id,
                &entry.remote_doc_type,
                &entry.remote_doc_id,
                &entry.doc_number,
                entry.amount,
                entry.txn_date.format(DATE_FMT).to_string(),
                entry.status.as_str(),
                entry.created_at,
            ],
        )
        .context("insert commission entry")?;
        Ok(())
    }

    pub async fn void_entry(&self, entry_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "UPDATE commission_entries SET status = 'voided' WHERE id = ?1",
            params![entry_id],
        )?;
        if rows == 0 {
            bail!("commission entry {} not found", entry_id);
        }
        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CommissionEntry> {
        let txn_date: String = row.get(6)?;
        let status: String = row.get(7)?;
        Ok(CommissionEntry {
            id: row.get(0)?,
            payment_split_id: row.get(1)?,
            remote_doc_type: row.get(2)?,
            remote_doc_id: row.get(3)?,
            doc_number: row.get(4)?,
            amount: row.get(5)?,
            txn_date: NaiveDate::parse_from_str(&txn_date, DATE_FMT)
                .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
            status: EntryStatus::from_str(&status),
            created_at: row.get(8)?,
        })
    }

    // ---- journal document numbers ---------------------------------------

    /// Atomically hand out the next document number under a prefix,
    /// starting at 100. The upsert-returning statement makes concurrent
    /// callers get distinct values.
    pub async fn next_doc_number(&self, prefix: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        let value: i64 = conn.query_row(
            "INSERT INTO journal_doc_sequence (prefix, next_value) VALUES (?1, 100)
             ON CONFLICT(prefix) DO UPDATE SET next_value = next_value + 1
             RETURNING next_value",
            params![prefix],
            |row| row.get(0),
        )?;
        Ok(value)
    }

    // ---- seeding (admin import & tests) ----------------------------------

    pub async fn insert_broker(&self, broker: &Broker) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO brokers (id, name, email) VALUES (?1, ?2, ?3)",
            params![&broker.id, &broker.name, broker.email.as_deref()],
        )?;
        Ok(())
    }

    pub async fn insert_deal(&self, deal: &Deal) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO deals (id, name) VALUES (?1, ?2)",
            params![&deal.id, &deal.name],
        )?;
        Ok(())
    }

    pub async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO payments (id, deal_id, name, paid_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &payment.id,
                &payment.deal_id,
                &payment.name,
                payment.paid_date.map(|d| d.format(DATE_FMT).to_string()),
            ],
        )?;
        Ok(())
    }

    pub async fn insert_split(&self, split: &PaymentSplit) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO payment_splits (id, payment_id, broker_id, amount)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &split.id,
                &split.payment_id,
                split.broker_id.as_deref(),
                split.amount,
            ],
        )?;
        Ok(())
    }

    pub async fn insert_mapping(&self, mapping: &CommissionMapping) -> Result<()> {
        if mapping.posting_type == PostingType::JournalEntry
            && mapping.credit_account_id.is_none()
        {
            bail!(
                "journal_entry mapping {} must carry a credit account",
                mapping.id
            );
        }
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO commission_mappings
             (id, broker_id, posting_type, vendor_id, debit_account_id,
              debit_account_name, credit_account_id, credit_account_name,
              description_template, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &mapping.id,
                &mapping.broker_id,
                mapping.posting_type.as_str(),
                mapping.vendor_id.as_deref(),
                &mapping.debit_account_id,
                &mapping.debit_account_name,
                mapping.credit_account_id.as_deref(),
                mapping.credit_account_name.as_deref(),
                &mapping.description_template,
                mapping.active as i64,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::NamedTempFile;
    use uuid::Uuid;

    fn test_store() -> (CommissionStore, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = CommissionStore::new(temp.path().to_str().unwrap()).unwrap();
        (store, temp)
    }

    fn entry_for(split_id: &str) -> CommissionEntry {
        CommissionEntry {
            id: Uuid::new_v4().to_string(),
            payment_split_id: split_id.to_string(),
            remote_doc_type: "Bill".into(),
            remote_doc_id: "777".into(),
            doc_number: "777".into(),
            amount: 1250.0,
            txn_date: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            status: EntryStatus::Created,
            created_at: Utc::now().timestamp(),
        }
    }

    #[tokio::test]
    async fn test_live_entry_unique_per_split() {
        let (store, _temp) = test_store();
        store.insert_entry(&entry_for("split-1")).await.unwrap();

        // Second live entry for the same split hits the partial index
        assert!(store.insert_entry(&entry_for("split-1")).await.is_err());

        // A different split is fine
        store.insert_entry(&entry_for("split-2")).await.unwrap();
    }

    #[tokio::test]
    async fn test_void_reopens_split() {
        let (store, _temp) = test_store();
        let first = entry_for("split-1");
        store.insert_entry(&first).await.unwrap();
        store.void_entry(&first.id).await.unwrap();

        assert!(store.find_live_entry("split-1").await.unwrap().is_none());
        store.insert_entry(&entry_for("split-1")).await.unwrap();
        assert!(store.find_live_entry("split-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_doc_number_sequence() {
        let (store, _temp) = test_store();
        assert_eq!(store.next_doc_number("BC-").await.unwrap(), 100);
        assert_eq!(store.next_doc_number("BC-").await.unwrap(), 101);
        assert_eq!(store.next_doc_number("BC-").await.unwrap(), 102);
        // Independent prefixes get independent counters
        assert_eq!(store.next_doc_number("JE-").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_journal_mapping_requires_credit_account() {
        let (store, _temp) = test_store();
        let mapping = CommissionMapping {
            id: "m1".into(),
            broker_id: "b1".into(),
            posting_type: PostingType::JournalEntry,
            vendor_id: None,
            debit_account_id: "60".into(),
            debit_account_name: "Commission Expense".into(),
            credit_account_id: None,
            credit_account_name: None,
            description_template: "{deal}".into(),
            active: true,
        };
        assert!(store.insert_mapping(&mapping).await.is_err());
    }

    #[tokio::test]
    async fn test_vendor_cache_roundtrip() {
        let (store, _temp) = test_store();
        let mapping = CommissionMapping {
            id: "m1".into(),
            broker_id: "b1".into(),
            posting_type: PostingType::Bill,
            vendor_id: None,
            debit_account_id: "60".into(),
            debit_account_name: "Commission Expense".into(),
            credit_account_id: None,
            credit_account_name: None,
            description_template: "{deal}".into(),
            active: true,
        };
        store.insert_mapping(&mapping).await.unwrap();
        store.cache_mapping_vendor("m1", "42").await.unwrap();

        let loaded = store.get_active_mapping("b1").await.unwrap().unwrap();
        assert_eq!(loaded.vendor_id.as_deref(), Some("42"));
    }
}
