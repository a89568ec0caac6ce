//! Brokerdesk Backend Library
//!
//! Ledger synchronization core for the brokerage operations platform:
//! credential lifecycle, entity reconciliation, commission posting and
//! general-ledger report parsing against the external accounting system.

pub mod api;
pub mod commission;
pub mod config;
pub mod ledger;
pub mod report;
