//! Commission posting engine
//!
//! Takes one local payment split through
//! requested → idempotency-checked → entity-resolved → document-created →
//! recorded. Exactly one remote document (Bill or balanced JournalEntry)
//! comes out per split; the CommissionEntry row is the at-most-once
//! marker. Document bodies are built by pure functions so the invariants
//! are testable without touching the network.

use crate::commission::models::{
    Broker, CommissionEntry, CommissionMapping, Deal, EntryStatus, Payment, PostCommissionResult,
    PostingType,
};
use crate::commission::store::CommissionStore;
use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::gateway::{LedgerGateway, RemoteLedger};
use crate::ledger::reconcile::{EntityAttrs, EntityReconciler};
use crate::ledger::types::{decode_attachable_id, decode_created_document, EntityKind};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Journal entries carry generated document numbers under this prefix
pub const JOURNAL_DOC_PREFIX: &str = "BC-";

pub struct CommissionPostingEngine {
    store: CommissionStore,
    gateway: Arc<LedgerGateway>,
    reconciler: EntityReconciler,
}

impl CommissionPostingEngine {
    pub fn new(
        store: CommissionStore,
        gateway: Arc<LedgerGateway>,
        reconciler: EntityReconciler,
    ) -> Self {
        Self {
            store,
            gateway,
            reconciler,
        }
    }

    pub async fn post(
        &self,
        payment_split_id: &str,
        paid_date: Option<NaiveDate>,
    ) -> LedgerResult<PostCommissionResult> {
        // Idempotency: an existing live entry makes this call a no-op
        if let Some(entry) = self.store.find_live_entry(payment_split_id).await? {
            info!(
                "Split {} already posted as {} {} ({})",
                payment_split_id, entry.remote_doc_type, entry.doc_number, entry.remote_doc_id
            );
            return Ok(PostCommissionResult {
                remote_id: entry.remote_doc_id,
                document_type: entry.remote_doc_type,
                document_number: entry.doc_number,
                amount: entry.amount,
                already_exists: true,
            });
        }

        // Load the local context
        let split = self
            .store
            .get_split(payment_split_id)
            .await?
            .ok_or_else(|| {
                LedgerError::NotFound(format!("payment split {}", payment_split_id))
            })?;
        let payment = self
            .store
            .get_payment(&split.payment_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("payment {}", split.payment_id)))?;
        let deal = self
            .store
            .get_deal(&payment.deal_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("deal {}", payment.deal_id)))?;

        let broker_id = split.broker_id.as_deref().ok_or_else(|| {
            LedgerError::InvalidInput(format!("split {} has no broker attached", split.id))
        })?;
        let broker = self
            .store
            .get_broker(broker_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("broker {}", broker_id)))?;

        let amount = round2(split.amount);
        if amount <= 0.0 {
            return Err(LedgerError::InvalidInput(format!(
                "split {} amount {} is not positive",
                split.id, split.amount
            )));
        }

        // Posting policy is a hard requirement; guessing accounts would
        // corrupt the books
        let mapping = self
            .store
            .get_active_mapping(&broker.id)
            .await?
            .ok_or_else(|| LedgerError::PolicyMissing {
                broker: broker.name.clone(),
            })?;

        let vendor_id = self.resolve_vendor(&broker, &mapping).await?;

        let txn_date = choose_txn_date(paid_date, payment.paid_date);
        let description = render_description(
            &mapping.description_template,
            &deal,
            &payment,
            &broker,
            txn_date,
        );

        let (resource, doc_type, body, generated_number) = match mapping.posting_type {
            PostingType::Bill => {
                let body = build_bill_body(&vendor_id, &broker.name, &mapping, amount, txn_date, &description);
                ("bill", "Bill", body, None)
            }
            PostingType::JournalEntry => {
                let number = self.store.next_doc_number(JOURNAL_DOC_PREFIX).await?;
                let doc_number = format!("{}{}", JOURNAL_DOC_PREFIX, number);
                let body = build_journal_body(
                    &doc_number,
                    &vendor_id,
                    &broker.name,
                    &mapping,
                    amount,
                    txn_date,
                    &description,
                )?;
                ensure_journal_balanced(&doc_number, &body)?;
                ("journalentry", "JournalEntry", body, Some(doc_number))
            }
        };

        let response = self.gateway.post_json(resource, &body).await?;
        let created = decode_created_document(doc_type, &response)?;

        let document_number = generated_number
            .or(created.doc_number)
            .unwrap_or_else(|| created.id.clone());

        info!(
            "Posted {} {} ({}) for split {}: {} {:.2}",
            doc_type, document_number, created.id, split.id, broker.name, amount
        );

        // The remote document is the source of truth; a persist failure
        // must not make the caller retry and double-post.
        let entry = CommissionEntry {
            id: Uuid::new_v4().to_string(),
            payment_split_id: split.id.clone(),
            remote_doc_type: doc_type.to_string(),
            remote_doc_id: created.id.clone(),
            doc_number: document_number.clone(),
            amount,
            txn_date,
            status: EntryStatus::Created,
            created_at: Utc::now().timestamp(),
        };
        if let Err(err) = self.store.insert_entry(&entry).await {
            error!(
                "Remote {} {} posted but local entry for split {} failed to persist: {}",
                doc_type, created.id, split.id, err
            );
        }

        Ok(PostCommissionResult {
            remote_id: created.id,
            document_type: doc_type.to_string(),
            document_number,
            amount,
            already_exists: false,
        })
    }

    /// Upload a receipt file against the remote document already posted
    /// for a split.
    pub async fn attach_receipt(
        &self,
        payment_split_id: &str,
        file_name: &str,
        content_type: &str,
        content: &[u8],
    ) -> LedgerResult<String> {
        if content.is_empty() {
            return Err(LedgerError::InvalidInput(
                "attachment content is empty".into(),
            ));
        }
        let entry = self
            .store
            .find_live_entry(payment_split_id)
            .await?
            .ok_or_else(|| {
                LedgerError::NotFound(format!("no posted entry for split {}", payment_split_id))
            })?;

        let metadata =
            build_attachment_metadata(&entry.remote_doc_type, &entry.remote_doc_id, file_name);
        let response = self
            .gateway
            .upload_attachment(&metadata, file_name, content_type, content)
            .await?;
        let attachment_id = decode_attachable_id(&response)?;
        info!(
            "Attached {} ({}) to {} {} for split {}",
            file_name, attachment_id, entry.remote_doc_type, entry.remote_doc_id, payment_split_id
        );
        Ok(attachment_id)
    }

    async fn resolve_vendor(
        &self,
        broker: &Broker,
        mapping: &CommissionMapping,
    ) -> LedgerResult<String> {
        if let Some(vendor_id) = mapping.vendor_id.as_deref() {
            return Ok(vendor_id.to_string());
        }

        let attrs = EntityAttrs {
            email: broker.email.clone(),
            contact_name: Some(broker.name.clone()),
            ..Default::default()
        };
        let vendor_id = self
            .reconciler
            .resolve(EntityKind::Vendor, &broker.name, Some(&attrs))
            .await?;

        if let Err(err) = self.store.cache_mapping_vendor(&mapping.id, &vendor_id).await {
            warn!(
                "Resolved vendor {} for broker '{}' but caching onto mapping {} failed: {}",
                vendor_id, broker.name, mapping.id, err
            );
        }
        Ok(vendor_id)
    }
}

/// Priority: explicit paid date, then the payment's recorded date, then
/// today
pub fn choose_txn_date(paid_date: Option<NaiveDate>, recorded: Option<NaiveDate>) -> NaiveDate {
    paid_date
        .or(recorded)
        .unwrap_or_else(|| Utc::now().date_naive())
}

pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Fill the policy's description template
pub fn render_description(
    template: &str,
    deal: &Deal,
    payment: &Payment,
    broker: &Broker,
    date: NaiveDate,
) -> String {
    template
        .replace("{deal}", &deal.name)
        .replace("{payment}", &payment.name)
        .replace("{broker}", &broker.name)
        .replace("{date}", &date.format("%Y-%m-%d").to_string())
}

/// One expense line for the full amount against the policy's debit account
pub fn build_bill_body(
    vendor_id: &str,
    vendor_name: &str,
    mapping: &CommissionMapping,
    amount: f64,
    txn_date: NaiveDate,
    description: &str,
) -> Value {
    json!({
        "VendorRef": { "value": vendor_id, "name": vendor_name },
        "TxnDate": txn_date.format("%Y-%m-%d").to_string(),
        "PrivateNote": description,
        "Line": [{
            "Amount": round2(amount),
            "Description": description,
            "DetailType": "AccountBasedExpenseLineDetail",
            "AccountBasedExpenseLineDetail": {
                "AccountRef": {
                    "value": mapping.debit_account_id,
                    "name": mapping.debit_account_name,
                }
            }
        }]
    })
}

/// Debit and credit lines for the full amount, both tagged with the vendor.
/// Rejects out-of-balance lines before anything leaves the process.
pub fn build_journal_body(
    doc_number: &str,
    vendor_id: &str,
    vendor_name: &str,
    mapping: &CommissionMapping,
    amount: f64,
    txn_date: NaiveDate,
    description: &str,
) -> LedgerResult<Value> {
    let credit_account_id = mapping.credit_account_id.as_deref().ok_or_else(|| {
        LedgerError::InvalidInput(format!(
            "journal_entry mapping {} has no credit account",
            mapping.id
        ))
    })?;
    let credit_account_name = mapping.credit_account_name.as_deref().unwrap_or("");

    let amount = round2(amount);
    let entity = json!({ "Type": "Vendor", "EntityRef": { "value": vendor_id, "name": vendor_name } });

    Ok(json!({
        "DocNumber": doc_number,
        "TxnDate": txn_date.format("%Y-%m-%d").to_string(),
        "PrivateNote": description,
        "Line": [
            {
                "Amount": amount,
                "Description": description,
                "DetailType": "JournalEntryLineDetail",
                "JournalEntryLineDetail": {
                    "PostingType": "Debit",
                    "AccountRef": {
                        "value": mapping.debit_account_id,
                        "name": mapping.debit_account_name,
                    },
                    "Entity": entity,
                }
            },
            {
                "Amount": amount,
                "Description": description,
                "DetailType": "JournalEntryLineDetail",
                "JournalEntryLineDetail": {
                    "PostingType": "Credit",
                    "AccountRef": {
                        "value": credit_account_id,
                        "name": credit_account_name,
                    },
                    "Entity": entity,
                }
            }
        ]
    }))
}

/// Metadata part for an upload: the file name plus a reference tying the
/// attachment to the posted document
pub fn build_attachment_metadata(doc_type: &str, doc_id: &str, file_name: &str) -> Value {
    json!({
        "FileName": file_name,
        "AttachableRef": [{
            "EntityRef": { "value": doc_id, "type": doc_type }
        }]
    })
}

/// Last gate before the network: a journal body whose lines do not
/// balance must never leave the process.
pub fn ensure_journal_balanced(doc_number: &str, body: &Value) -> LedgerResult<()> {
    if journal_lines_balanced(body) {
        Ok(())
    } else {
        Err(LedgerError::InvalidInput(format!(
            "journal entry {} lines do not balance",
            doc_number
        )))
    }
}

/// Sanity check a composed journal body: debit lines must equal credit
/// lines to the cent.
pub fn journal_lines_balanced(body: &Value) -> bool {
    let Some(lines) = body.get("Line").and_then(Value::as_array) else {
        return false;
    };
    let mut debits = 0i64;
    let mut credits = 0i64;
    for line in lines {
        let amount = line.get("Amount").and_then(Value::as_f64).unwrap_or(0.0);
        match line
            .pointer("/JournalEntryLineDetail/PostingType")
            .and_then(Value::as_str)
        {
            Some("Debit") => debits += cents(amount),
            Some("Credit") => credits += cents(amount),
            _ => return false,
        }
    }
    debits == credits
}
