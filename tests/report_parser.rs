//! Parser properties over synthetic general-ledger reports, exercised
//! through the crate surface the report service uses.

use brokerdesk_backend::report::{parse_general_ledger, service::summarize};
use serde_json::{json, Value};

fn report(column_titles: &[&str], rows: Vec<Value>) -> Value {
    let columns: Vec<Value> = column_titles
        .iter()
        .map(|t| json!({"ColTitle": t, "ColType": ""}))
        .collect();
    json!({
        "Columns": {"Column": columns},
        "Rows": {"Row": rows}
    })
}

fn row(cells: &[&str]) -> Value {
    json!({
        "type": "Data",
        "ColData": cells.iter().map(|v| json!({"value": v})).collect::<Vec<_>>()
    })
}

const PRIMARY: &[&str] = &[
    "Date", "Transaction Type", "Num", "Name", "Memo/Description", "Debit", "Credit", "Balance",
];
const SYNONYMS: &[&str] = &[
    "DATE", "Type", "No.", "Payee", "Description", "Debit Amount", "Credit Amount",
    "Running Balance",
];

fn synthetic_rows() -> Vec<Value> {
    vec![
        row(&["", "Beginning Balance", "", "", "", "", "", "1000.00"]),
        row(&["2026-03-01", "Payment", "101", "Acme", "deposit", "200.00", "", "1200.00"]),
        row(&["2026-03-05", "Expense", "102", "Vendor Co", "fee", "", "50.00", "1150.00"]),
    ]
}

#[test]
fn running_balance_reconstructed_from_beginning_balance() {
    let (lines, diagnostics) = parse_general_ledger(&report(PRIMARY, synthetic_rows()));

    assert_eq!(lines.len(), 2);
    assert_eq!(diagnostics.beginning_balance, Some(1000.0));

    assert_eq!(lines[0].debit, 200.0);
    assert_eq!(lines[0].credit, 0.0);
    assert_eq!(lines[0].balance, 1200.0);

    assert_eq!(lines[1].debit, 0.0);
    assert_eq!(lines[1].credit, 50.0);
    assert_eq!(lines[1].balance, 1150.0);
}

#[test]
fn synonym_titles_parse_identically_to_primary_vocabulary() {
    let (primary, _) = parse_general_ledger(&report(PRIMARY, synthetic_rows()));
    let (synonym, diagnostics) = parse_general_ledger(&report(SYNONYMS, synthetic_rows()));

    assert_eq!(primary.len(), synonym.len());
    for (a, b) in primary.iter().zip(synonym.iter()) {
        assert_eq!(a.date, b.date);
        assert_eq!(a.txn_type, b.txn_type);
        assert_eq!(a.doc_number, b.doc_number);
        assert_eq!(a.debit, b.debit);
        assert_eq!(a.credit, b.credit);
        assert_eq!(a.balance, b.balance);
    }

    // Proves the mapping was heuristic, not positional
    assert_eq!(diagnostics.column_map.debit, Some(5));
    assert_eq!(diagnostics.column_map.credit, Some(6));
    assert_eq!(diagnostics.fallback_signed_amount, 0);
    assert_eq!(diagnostics.fallback_positional_scan, 0);
}

#[test]
fn summary_matches_parsed_lines() {
    let (lines, _) = parse_general_ledger(&report(PRIMARY, synthetic_rows()));
    let summary = summarize(&lines);

    assert_eq!(summary.total_debits, 200.0);
    assert_eq!(summary.total_credits, 50.0);
    assert_eq!(summary.net_change, 150.0);
}

#[test]
fn grouped_sub_accounts_flatten_in_order() {
    let rows = vec![
        row(&["", "Beginning Balance", "", "", "", "", "", "500.00"]),
        json!({
            "type": "Section",
            "Header": {"ColData": [{"value": "Commissions:West"}]},
            "Rows": {"Row": [
                row(&["2026-03-01", "Payment", "1", "Acme", "", "100.00", "", ""]),
                row(&["Total for Commissions:West", "", "", "", "", "100.00", "", ""]),
            ]}
        }),
        row(&["2026-03-02", "Expense", "2", "Vendor", "", "", "25.00", ""]),
    ];

    let (lines, diagnostics) = parse_general_ledger(&report(PRIMARY, rows));
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].balance, 600.0);
    assert_eq!(lines[1].balance, 575.0);
    assert_eq!(diagnostics.rows_skipped, 1);
}
