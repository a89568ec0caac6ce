//! End-to-end posting-flow properties that hold without touching the
//! remote system: idempotent retry, hard-stop policy errors, and local
//! input validation all resolve before any network call.

use brokerdesk_backend::commission::{
    Broker, CommissionEntry, CommissionMapping, CommissionPostingEngine, CommissionStore, Deal,
    EntryStatus, Payment, PaymentSplit, PostingType,
};
use brokerdesk_backend::config::Config;
use brokerdesk_backend::ledger::{
    CredentialManager, EntityReconciler, LedgerError, LedgerGateway, SqliteConnectionStore,
};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    store: CommissionStore,
    engine: CommissionPostingEngine,
    _dir: TempDir,
}

/// Engine wired against an empty connection store: any code path that
/// reaches the gateway fails loudly, so these tests prove which paths
/// never go remote.
fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("brokerdesk.db");
    let db_path = db_path.to_str().unwrap();

    let store = CommissionStore::new(db_path).unwrap();
    let connection_store = Arc::new(SqliteConnectionStore::new(db_path).unwrap());
    let credentials = Arc::new(CredentialManager::new(connection_store, &Config::default()));
    let gateway = Arc::new(LedgerGateway::new(
        credentials,
        Config::default().environment,
    ));
    let reconciler = EntityReconciler::new(gateway.clone());
    let engine = CommissionPostingEngine::new(store.clone(), gateway, reconciler);

    Fixture {
        store,
        engine,
        _dir: dir,
    }
}

async fn seed_domain(store: &CommissionStore, split_amount: f64, broker_id: Option<&str>) {
    store
        .insert_broker(&Broker {
            id: "b1".into(),
            name: "Dana Reyes".into(),
            email: Some("dana@example.com".into()),
        })
        .await
        .unwrap();
    store
        .insert_deal(&Deal {
            id: "d1".into(),
            name: "Harborview Lease".into(),
        })
        .await
        .unwrap();
    store
        .insert_payment(&Payment {
            id: "p1".into(),
            deal_id: "d1".into(),
            name: "First Installment".into(),
            paid_date: Some(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()),
        })
        .await
        .unwrap();
    store
        .insert_split(&PaymentSplit {
            id: "s1".into(),
            payment_id: "p1".into(),
            broker_id: broker_id.map(String::from),
            amount: split_amount,
        })
        .await
        .unwrap();
}

fn bill_mapping() -> CommissionMapping {
    CommissionMapping {
        id: "m1".into(),
        broker_id: "b1".into(),
        posting_type: PostingType::Bill,
        vendor_id: Some("42".into()),
        debit_account_id: "60".into(),
        debit_account_name: "Commission Expense".into(),
        credit_account_id: None,
        credit_account_name: None,
        description_template: "{deal} - {broker}".into(),
        active: true,
    }
}

#[tokio::test]
async fn repeat_post_returns_existing_entry() {
    let fix = fixture();
    seed_domain(&fix.store, 1250.0, Some("b1")).await;

    let existing = CommissionEntry {
        id: "e1".into(),
        payment_split_id: "s1".into(),
        remote_doc_type: "Bill".into(),
        remote_doc_id: "777".into(),
        doc_number: "777".into(),
        amount: 1250.0,
        txn_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
        status: EntryStatus::Created,
        created_at: Utc::now().timestamp(),
    };
    fix.store.insert_entry(&existing).await.unwrap();

    // Two retries, identical answers, no network involved
    for _ in 0..2 {
        let result = fix.engine.post("s1", None).await.unwrap();
        assert!(result.already_exists);
        assert_eq!(result.remote_id, "777");
        assert_eq!(result.document_type, "Bill");
        assert_eq!(result.document_number, "777");
    }

    // Still exactly one live entry
    let live = fix.store.find_live_entry("s1").await.unwrap().unwrap();
    assert_eq!(live.id, "e1");
}

#[tokio::test]
async fn missing_split_is_not_found() {
    let fix = fixture();
    let err = fix.engine.post("nope", None).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn split_without_broker_is_invalid() {
    let fix = fixture();
    seed_domain(&fix.store, 1250.0, None).await;

    let err = fix.engine.post("s1", None).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
}

#[tokio::test]
async fn non_positive_amount_is_invalid() {
    let fix = fixture();
    seed_domain(&fix.store, 0.0, Some("b1")).await;
    fix.store.insert_mapping(&bill_mapping()).await.unwrap();

    let err = fix.engine.post("s1", None).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
}

#[tokio::test]
async fn missing_mapping_is_a_policy_hard_stop() {
    let fix = fixture();
    seed_domain(&fix.store, 1250.0, Some("b1")).await;

    let err = fix.engine.post("s1", None).await.unwrap_err();
    match err {
        LedgerError::PolicyMissing { broker } => assert_eq!(broker, "Dana Reyes"),
        other => panic!("expected PolicyMissing, got {:?}", other),
    }
}

#[tokio::test]
async fn attach_without_posted_entry_is_not_found() {
    let fix = fixture();
    seed_domain(&fix.store, 1250.0, Some("b1")).await;

    let err = fix
        .engine
        .attach_receipt("s1", "receipt.pdf", "application/pdf", b"%PDF-1.4")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn empty_attachment_is_rejected_up_front() {
    let fix = fixture();
    let err = fix
        .engine
        .attach_receipt("s1", "receipt.pdf", "application/pdf", b"")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
}

#[tokio::test]
async fn voided_entry_reopens_the_split() {
    let fix = fixture();
    seed_domain(&fix.store, 1250.0, Some("b1")).await;

    let entry = CommissionEntry {
        id: "e1".into(),
        payment_split_id: "s1".into(),
        remote_doc_type: "Bill".into(),
        remote_doc_id: "777".into(),
        doc_number: "777".into(),
        amount: 1250.0,
        txn_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
        status: EntryStatus::Created,
        created_at: Utc::now().timestamp(),
    };
    fix.store.insert_entry(&entry).await.unwrap();
    fix.store.void_entry("e1").await.unwrap();

    // With the marker voided the engine proceeds past the idempotency
    // check and stops at the missing posting policy instead
    let err = fix.engine.post("s1", None).await.unwrap_err();
    assert!(matches!(err, LedgerError::PolicyMissing { .. }));
}
