//! Ledger connection storage
//!
//! One row per authorized remote account. A partial unique index keeps at
//! most one row in `connected` status. Updates go through compare-and-swap
//! on `updated_at` so two concurrent refreshes cannot both win.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Expired,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "connected" => ConnectionStatus::Connected,
            _ => ConnectionStatus::Expired,
        }
    }
}

/// The active credential/session record for one remote account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConnection {
    pub id: String,
    pub realm_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub access_expires_at: i64,
    /// Unix seconds
    pub refresh_expires_at: i64,
    pub status: ConnectionStatus,
    /// Unix seconds; doubles as the compare-and-swap guard
    pub updated_at: i64,
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// The single connected record, if any
    async fn load_connected(&self) -> Result<Option<LedgerConnection>>;

    /// Persist a freshly authorized connection
    async fn insert(&self, conn: &LedgerConnection) -> Result<()>;

    /// Replace credentials only if the row is still at `expected_updated_at`.
    /// Returns false when another writer got there first.
    async fn compare_and_swap(
        &self,
        expected_updated_at: i64,
        updated: &LedgerConnection,
    ) -> Result<bool>;

    /// Flip the record to expired after a rejected refresh
    async fn mark_expired(&self, id: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteConnectionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConnectionStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open connection db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger_connections (
                id TEXT PRIMARY KEY,
                realm_id TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                access_expires_at INTEGER NOT NULL,
                refresh_expires_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        // At most one live session across all realms
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_connections_connected
             ON ledger_connections(status) WHERE status = 'connected'",
            [],
        )?;
        Ok(())
    }

    fn row_to_connection(row: &rusqlite::Row) -> rusqlite::Result<LedgerConnection> {
        let status: String = row.get(6)?;
        Ok(LedgerConnection {
            id: row.get(0)?,
            realm_id: row.get(1)?,
            access_token: row.get(2)?,
            refresh_token: row.get(3)?,
            access_expires_at: row.get(4)?,
            refresh_expires_at: row.get(5)?,
            status: ConnectionStatus::from_str(&status),
            updated_at: row.get(7)?,
        })
    }
}

#[async_trait]
impl ConnectionStore for SqliteConnectionStore {
    async fn load_connected(&self) -> Result<Option<LedgerConnection>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, realm_id, access_token, refresh_token, access_expires_at,
                    refresh_expires_at, status, updated_at
             FROM ledger_connections WHERE status = 'connected' LIMIT 1",
        )?;
        let result = stmt.query_row([], Self::row_to_connection);
        match result {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert(&self, record: &LedgerConnection) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO ledger_connections
             (id, realm_id, access_token, refresh_token, access_expires_at,
              refresh_expires_at, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &record.id,
                &record.realm_id,
                &record.access_token,
                &record.refresh_token,
                record.access_expires_at,
                record.refresh_expires_at,
                record.status.as_str(),
                record.updated_at,
            ],
        )
        .context("insert ledger connection")?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected_updated_at: i64,
        updated: &LedgerConnection,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "UPDATE ledger_connections SET
                access_token = ?1,
                refresh_token = ?2,
                access_expires_at = ?3,
                refresh_expires_at = ?4,
                status = ?5,
                updated_at = ?6
             WHERE id = ?7 AND updated_at = ?8",
            params![
                &updated.access_token,
                &updated.refresh_token,
                updated.access_expires_at,
                updated.refresh_expires_at,
                updated.status.as_str(),
                updated.updated_at,
                &updated.id,
                expected_updated_at,
            ],
        )?;
        Ok(rows == 1)
    }

    async fn mark_expired(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE ledger_connections SET status = 'expired', updated_at = ?1 WHERE id = ?2",
            params![Utc::now().timestamp(), id],
        )?;
        Ok(())
    }
}

/// Convenience constructor for a freshly authorized connection
pub fn new_connection(
    realm_id: &str,
    access_token: &str,
    refresh_token: &str,
    access_expires_at: i64,
    refresh_expires_at: i64,
) -> LedgerConnection {
    LedgerConnection {
        id: Uuid::new_v4().to_string(),
        realm_id: realm_id.to_string(),
        access_token: access_token.to_string(),
        refresh_token: refresh_token.to_string(),
        access_expires_at,
        refresh_expires_at,
        status: ConnectionStatus::Connected,
        updated_at: Utc::now().timestamp(),
    }
}
