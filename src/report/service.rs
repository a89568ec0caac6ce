//! Account activity reporting
//!
//! Fetches the remote general-ledger report for one account and turns it
//! into the normalized transaction list callers render.

use crate::ledger::error::LedgerResult;
use crate::ledger::gateway::{LedgerGateway, RemoteLedger};
use crate::report::parser::{parse_general_ledger, LedgerTransactionLine, ParseDiagnostics};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionSummary {
    pub total_debits: f64,
    pub total_credits: f64,
    pub net_change: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountTransactions {
    pub transactions: Vec<LedgerTransactionLine>,
    pub summary: TransactionSummary,
    pub account_balance: f64,
    pub diagnostics: ParseDiagnostics,
}

pub struct ReportService {
    gateway: Arc<LedgerGateway>,
}

impl ReportService {
    pub fn new(gateway: Arc<LedgerGateway>) -> Self {
        Self { gateway }
    }

    pub async fn get_account_transactions(
        &self,
        account_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<AccountTransactions> {
        // Ascending date order keeps the running-balance fold valid
        let resource = format!(
            "reports/GeneralLedger?account={}&start_date={}&end_date={}&sort_order=ascend",
            account_id,
            start_date.format("%Y-%m-%d"),
            end_date.format("%Y-%m-%d"),
        );
        let report = self.gateway.get(&resource).await?;

        let (transactions, diagnostics) = parse_general_ledger(&report);
        info!(
            "Parsed ledger report for account {}: {} rows, {} skipped",
            account_id, diagnostics.rows_processed, diagnostics.rows_skipped
        );

        let summary = summarize(&transactions);
        let account_balance = transactions
            .last()
            .map(|line| line.balance)
            .or(diagnostics.beginning_balance)
            .unwrap_or(0.0);

        Ok(AccountTransactions {
            transactions,
            summary,
            account_balance,
            diagnostics,
        })
    }
}

pub fn summarize(transactions: &[LedgerTransactionLine]) -> TransactionSummary {
    let total_debits: f64 = transactions.iter().map(|line| line.debit).sum();
    let total_credits: f64 = transactions.iter().map(|line| line.credit).sum();
    TransactionSummary {
        total_debits,
        total_credits,
        net_change: total_debits - total_credits,
    }
}
