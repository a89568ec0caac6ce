//! Credential lifecycle management
//!
//! Keeps the single remote session live: refreshes the access credential
//! ahead of expiry, persists the rotated pair, and flips the connection to
//! expired when the remote side rejects the refresh credential. Refreshes
//! are serialized so two callers cannot rotate the refresh credential out
//! from under each other.

use crate::config::Config;
use crate::ledger::connection::{ConnectionStatus, ConnectionStore, LedgerConnection};
use crate::ledger::error::{LedgerError, LedgerResult};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Access credential lifetime in seconds
    expires_in: i64,
}

pub struct CredentialManager {
    http: Client,
    store: Arc<dyn ConnectionStore>,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_margin_secs: i64,
    refresh_window_days: i64,
    refresh_lock: Mutex<()>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn ConnectionStore>, config: &Config) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Brokerdesk/1.0 (Ledger Sync)")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            store,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_margin_secs: config.refresh_margin_secs,
            refresh_window_days: config.refresh_window_days,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Return a connection whose access credential is good for at least the
    /// configured margin, refreshing it first if necessary.
    pub async fn ensure_live(&self) -> LedgerResult<LedgerConnection> {
        let conn = self
            .store
            .load_connected()
            .await?
            .ok_or_else(|| LedgerError::NotFound("no connected ledger account".into()))?;

        if !needs_refresh(&conn, Utc::now().timestamp(), self.refresh_margin_secs) {
            return Ok(conn);
        }

        // Serialize refreshes; re-check after acquiring in case another
        // task already rotated the credentials.
        let _guard = self.refresh_lock.lock().await;
        let conn = self
            .store
            .load_connected()
            .await?
            .ok_or_else(|| LedgerError::NotFound("no connected ledger account".into()))?;
        if !needs_refresh(&conn, Utc::now().timestamp(), self.refresh_margin_secs) {
            return Ok(conn);
        }

        self.refresh(conn).await
    }

    async fn refresh(&self, conn: LedgerConnection) -> LedgerResult<LedgerConnection> {
        info!("Refreshing ledger access credential for realm {}", conn.realm_id);

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", conn.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Refresh rejected for realm {} ({}): {}",
                conn.realm_id, status, body
            );
            self.store.mark_expired(&conn.id).await?;
            return Err(LedgerError::ReauthorizationRequired {
                realm_id: conn.realm_id,
            });
        }

        let token: TokenResponse = response.json().await?;
        let now = Utc::now().timestamp();

        let mut rotated = conn.clone();
        rotated.access_token = token.access_token;
        rotated.refresh_token = token.refresh_token;
        rotated.access_expires_at = now + token.expires_in;
        rotated.refresh_expires_at = now + self.refresh_window_days * 86_400;
        rotated.status = ConnectionStatus::Connected;
        rotated.updated_at = now.max(conn.updated_at + 1);

        let swapped = self.store.compare_and_swap(conn.updated_at, &rotated).await?;
        if !swapped {
            // Someone else rotated while we held the token exchange; use
            // whatever they persisted.
            warn!("Lost credential refresh race for realm {}", rotated.realm_id);
            return self
                .store
                .load_connected()
                .await?
                .ok_or_else(|| LedgerError::NotFound("no connected ledger account".into()));
        }

        info!(
            "Ledger credential refreshed for realm {}, valid {}s",
            rotated.realm_id, token.expires_in
        );
        Ok(rotated)
    }
}

/// True when the access credential expires within the safety margin
pub fn needs_refresh(conn: &LedgerConnection, now: i64, margin_secs: i64) -> bool {
    conn.access_expires_at - now <= margin_secs
}
