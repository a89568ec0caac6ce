//! General-ledger report parsing and the account-activity operation.

pub mod parser;
pub mod service;

pub use parser::{parse_general_ledger, LedgerTransactionLine, ParseDiagnostics};
pub use service::{AccountTransactions, ReportService, TransactionSummary};
