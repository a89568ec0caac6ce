//! External accounting ledger integration
//!
//! Credential lifecycle, authenticated gateway, entity reconciliation and
//! the typed views over remote resources.

pub mod connection;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod reconcile;
pub mod types;

pub use connection::{ConnectionStatus, ConnectionStore, LedgerConnection, SqliteConnectionStore};
pub use credentials::CredentialManager;
pub use error::{LedgerError, LedgerResult};
pub use gateway::{LedgerGateway, RemoteLedger};
pub use reconcile::{EntityAttrs, EntityReconciler};
pub use types::EntityKind;
