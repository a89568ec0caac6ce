//! Commission posting: local payment domain, idempotency store, and the
//! posting engine.

pub mod engine;
pub mod models;
pub mod store;

pub use engine::{CommissionPostingEngine, JOURNAL_DOC_PREFIX};
pub use models::{
    Broker, CommissionEntry, CommissionMapping, Deal, EntryStatus, Payment, PaymentSplit,
    PostCommissionResult, PostingType,
};
pub use store::CommissionStore;
