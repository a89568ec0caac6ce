//! Local payment-domain records
//!
//! These mirror the brokerage platform's tables the posting engine reads,
//! plus the CommissionEntry idempotency record it owns.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broker {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub deal_id: String,
    pub name: String,
    pub paid_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSplit {
    pub id: String,
    pub payment_id: String,
    pub broker_id: Option<String>,
    pub amount: f64,
}

/// Which remote document shape a broker's commissions post as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingType {
    Bill,
    JournalEntry,
}

impl PostingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostingType::Bill => "bill",
            PostingType::JournalEntry => "journal_entry",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bill" => Some(PostingType::Bill),
            "journal_entry" => Some(PostingType::JournalEntry),
            _ => None,
        }
    }

    /// Remote document type name, also the response wrapper key
    pub fn document_type(&self) -> &'static str {
        match self {
            PostingType::Bill => "Bill",
            PostingType::JournalEntry => "JournalEntry",
        }
    }
}

/// Per-broker posting policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionMapping {
    pub id: String,
    pub broker_id: String,
    pub posting_type: PostingType,
    /// Remote vendor id, discovered lazily and cached back here
    pub vendor_id: Option<String>,
    pub debit_account_id: String,
    pub debit_account_name: String,
    /// Required when posting_type is journal_entry
    pub credit_account_id: Option<String>,
    pub credit_account_name: Option<String>,
    /// Placeholders: {deal}, {payment}, {broker}, {date}
    pub description_template: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Created,
    Voided,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Created => "created",
            EntryStatus::Voided => "voided",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "voided" => EntryStatus::Voided,
            _ => EntryStatus::Created,
        }
    }
}

/// The idempotency marker: one non-voided entry per payment split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionEntry {
    pub id: String,
    pub payment_split_id: String,
    pub remote_doc_type: String,
    pub remote_doc_id: String,
    pub doc_number: String,
    pub amount: f64,
    pub txn_date: NaiveDate,
    pub status: EntryStatus,
    /// Unix seconds
    pub created_at: i64,
}

/// Caller-facing result of a posting request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCommissionResult {
    pub remote_id: String,
    pub document_type: String,
    pub document_number: String,
    pub amount: f64,
    pub already_exists: bool,
}
