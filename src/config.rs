//! Service configuration
//!
//! Everything is env-tunable with sane defaults so the binary runs against
//! the sandbox out of the box.

use serde::{Deserialize, Serialize};
use std::env;

/// Which remote ledger environment to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => "https://sandbox-quickbooks.api.intuit.com",
            Environment::Production => "https://quickbooks.api.intuit.com",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Sandbox,
        }
    }
}

/// Main configuration for the ledger sync backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// sandbox or production
    pub environment: Environment,
    /// OAuth2 token endpoint used for refresh-token exchanges
    pub token_url: String,
    /// OAuth2 client credentials for the token exchange
    pub client_id: String,
    pub client_secret: String,
    /// SQLite file holding connections, domain records and idempotency rows
    pub db_path: String,
    /// Refresh the access credential when it expires within this margin
    pub refresh_margin_secs: i64,
    /// Lifetime assigned to a rotated refresh credential
    pub refresh_window_days: i64,
    /// HTTP bind address for the API server
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Sandbox,
            token_url: "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            db_path: "brokerdesk.db".to_string(),
            refresh_margin_secs: 300,
            refresh_window_days: 100,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    /// Build config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            environment: env::var("LEDGER_ENVIRONMENT")
                .map(|v| Environment::from_str(&v))
                .unwrap_or(defaults.environment),
            token_url: env::var("LEDGER_TOKEN_URL").unwrap_or(defaults.token_url),
            client_id: env::var("LEDGER_CLIENT_ID").unwrap_or(defaults.client_id),
            client_secret: env::var("LEDGER_CLIENT_SECRET").unwrap_or(defaults.client_secret),
            db_path: env::var("BROKERDESK_DB_PATH").unwrap_or(defaults.db_path),
            refresh_margin_secs: env::var("LEDGER_REFRESH_MARGIN_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.refresh_margin_secs),
            refresh_window_days: env::var("LEDGER_REFRESH_WINDOW_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.refresh_window_days),
            bind_addr: env::var("BROKERDESK_BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }
}
