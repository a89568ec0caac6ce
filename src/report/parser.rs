//! General-ledger report parsing
//!
//! The remote report schema is not contractual: column titles vary in
//! casing and wording, data rows hide under nested grouping sections, and
//! amounts show up as debit/credit pairs, a single signed amount, or an
//! unlabeled trailing column. Extraction therefore runs a strategy chain
//! and records which fallbacks fired, so a silent misparse of money is
//! always visible in the diagnostics.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

/// One normalized transaction row with its running balance
#[derive(Debug, Clone, Serialize)]
pub struct LedgerTransactionLine {
    pub date: NaiveDate,
    pub txn_type: String,
    pub doc_number: String,
    pub name: String,
    pub memo: String,
    pub debit: f64,
    pub credit: f64,
    pub balance: f64,
}

/// Column index per role, discovered from the declared column headers
#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnMap {
    pub date: Option<usize>,
    pub txn_type: Option<usize>,
    pub doc_number: Option<usize>,
    pub name: Option<usize>,
    pub memo: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    /// Single signed-amount column (positive = credit by domain convention)
    pub amount: Option<usize>,
    pub balance: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseDiagnostics {
    pub column_map: ColumnMap,
    pub rows_processed: u32,
    pub rows_skipped: u32,
    /// Rows whose amount came from the signed-amount column
    pub fallback_signed_amount: u32,
    /// Rows whose amount came from the trailing-column scan
    pub fallback_positional_scan: u32,
    pub beginning_balance: Option<f64>,
}

/// Parse a raw general-ledger report payload into ordered transaction
/// lines with a reconstructed running balance. The report is requested
/// date-ascending, so document order is chronological.
pub fn parse_general_ledger(report: &Value) -> (Vec<LedgerTransactionLine>, ParseDiagnostics) {
    let mut diagnostics = ParseDiagnostics {
        column_map: build_column_map(report),
        ..Default::default()
    };

    let mut lines = Vec::new();
    let mut balance = 0.0;

    if let Some(rows) = report.pointer("/Rows/Row").and_then(Value::as_array) {
        walk_rows(rows, &mut lines, &mut balance, &mut diagnostics);
    }

    (lines, diagnostics)
}

/// Map each declared column onto a role by matching its title and type
/// against a fixed synonym vocabulary. First match per role wins.
fn build_column_map(report: &Value) -> ColumnMap {
    let mut map = ColumnMap::default();
    let Some(columns) = report.pointer("/Columns/Column").and_then(Value::as_array) else {
        return map;
    };

    for (index, column) in columns.iter().enumerate() {
        let title = column
            .get("ColTitle")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();
        let col_type = column
            .get("ColType")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();

        // Debit/credit checks come first: "Debit Amount" must not land on
        // the signed-amount role
        if map.debit.is_none() && title.contains("debit") {
            map.debit = Some(index);
        } else if map.credit.is_none() && title.contains("credit") {
            map.credit = Some(index);
        } else if map.balance.is_none() && title.contains("balance") {
            map.balance = Some(index);
        } else if map.date.is_none() && (col_type == "tx_date" || title.contains("date")) {
            map.date = Some(index);
        } else if map.txn_type.is_none()
            && (col_type == "txn_type" || title.contains("transaction type") || title == "type")
        {
            map.txn_type = Some(index);
        } else if map.doc_number.is_none()
            && (col_type == "doc_num"
                || title.contains("num")
                || title.contains("no.")
                || title.contains("doc"))
        {
            map.doc_number = Some(index);
        } else if map.name.is_none()
            && (title.contains("name")
                || title.contains("payee")
                || title.contains("customer")
                || title.contains("vendor"))
        {
            map.name = Some(index);
        } else if map.memo.is_none() && (title.contains("memo") || title.contains("description")) {
            map.memo = Some(index);
        } else if map.amount.is_none()
            && (col_type == "subt_nat_amount" || col_type == "nat_amount" || title.contains("amount"))
        {
            map.amount = Some(index);
        }
    }

    map
}

fn walk_rows(
    rows: &[Value],
    lines: &mut Vec<LedgerTransactionLine>,
    balance: &mut f64,
    diagnostics: &mut ParseDiagnostics,
) {
    for row in rows {
        // Grouping rows nest their data one level down
        if let Some(nested) = row.pointer("/Rows/Row").and_then(Value::as_array) {
            walk_rows(nested, lines, balance, diagnostics);
            continue;
        }

        let Some(cells) = row.get("ColData").and_then(Value::as_array) else {
            continue;
        };
        let cells: Vec<String> = cells
            .iter()
            .map(|cell| {
                cell.get("value")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string()
            })
            .collect();

        process_candidate_row(&cells, lines, balance, diagnostics);
    }
}

fn process_candidate_row(
    cells: &[String],
    lines: &mut Vec<LedgerTransactionLine>,
    balance: &mut f64,
    diagnostics: &mut ParseDiagnostics,
) {
    if cells.is_empty() {
        return;
    }

    let label = cells
        .iter()
        .find(|c| !c.trim().is_empty())
        .map(|c| c.trim().to_lowercase())
        .unwrap_or_default();

    // Beginning-balance rows seed the fold instead of becoming lines
    if label.contains("beginning balance") {
        if let Some(seed) = seed_balance(cells, &diagnostics.column_map) {
            *balance = seed;
            diagnostics.beginning_balance = Some(seed);
        }
        return;
    }

    // Subtotal/total rows are not transactions
    if label.starts_with("total") {
        diagnostics.rows_skipped += 1;
        return;
    }

    let map = diagnostics.column_map.clone();
    let Some(date) = cell_at(cells, map.date.or(Some(0))).and_then(parse_date) else {
        diagnostics.rows_skipped += 1;
        return;
    };

    let txn_type = cell_at(cells, map.txn_type.or(Some(1))).unwrap_or_default();
    let doc_number = cell_at(cells, map.doc_number.or(Some(2))).unwrap_or_default();
    let name = cell_at(cells, map.name.or(Some(3))).unwrap_or_default();
    let memo = cell_at(cells, map.memo.or(Some(4))).unwrap_or_default();

    let Some((debit, credit)) = extract_amounts(cells, &map, diagnostics) else {
        diagnostics.rows_skipped += 1;
        return;
    };

    *balance += debit - credit;
    diagnostics.rows_processed += 1;
    lines.push(LedgerTransactionLine {
        date,
        txn_type,
        doc_number,
        name,
        memo,
        debit,
        credit,
        balance: *balance,
    });
}

/// Strategy chain: explicit debit/credit columns, then the signed-amount
/// column (positive = credit), then a last-resort scan of trailing
/// columns for the first currency-like cell.
fn extract_amounts(
    cells: &[String],
    map: &ColumnMap,
    diagnostics: &mut ParseDiagnostics,
) -> Option<(f64, f64)> {
    if map.debit.is_some() || map.credit.is_some() {
        let debit = cell_at(cells, map.debit).and_then(|c| parse_money(&c));
        let credit = cell_at(cells, map.credit).and_then(|c| parse_money(&c));
        if debit.is_some() || credit.is_some() {
            return Some((debit.unwrap_or(0.0), credit.unwrap_or(0.0)));
        }
    }

    if let Some(amount) = cell_at(cells, map.amount).and_then(|c| parse_money(&c)) {
        diagnostics.fallback_signed_amount += 1;
        return Some(split_signed(amount));
    }

    // Trailing scan, right to left, skipping the balance column
    for index in (0..cells.len()).rev() {
        if Some(index) == map.balance {
            continue;
        }
        if index < 5 && cells.len() > 5 {
            break;
        }
        if let Some(amount) = parse_money(&cells[index]) {
            diagnostics.fallback_positional_scan += 1;
            return Some(split_signed(amount));
        }
    }

    None
}

/// Domain convention: positive = credit (money earned/owed to the
/// account), negative = debit
fn split_signed(amount: f64) -> (f64, f64) {
    if amount >= 0.0 {
        (0.0, amount)
    } else {
        (-amount, 0.0)
    }
}

fn seed_balance(cells: &[String], map: &ColumnMap) -> Option<f64> {
    if let Some(value) = cell_at(cells, map.balance).and_then(|c| parse_money(&c)) {
        return Some(value);
    }
    if let Some(value) = cell_at(cells, map.amount).and_then(|c| parse_money(&c)) {
        return Some(value);
    }
    cells.iter().rev().find_map(|c| parse_money(c))
}

fn cell_at(cells: &[String], index: Option<usize>) -> Option<String> {
    let cell = cells.get(index?)?.trim();
    if cell.is_empty() {
        None
    } else {
        Some(cell.to_string())
    }
}

fn parse_date(cell: String) -> Option<NaiveDate> {
    let cell = cell.trim();
    NaiveDate::parse_from_str(cell, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(cell, "%m/%d/%Y"))
        .ok()
}

/// Accept "$1,234.56", "(200.00)" and plain numbers; reject anything
/// without a digit
fn parse_money(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() || !trimmed.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let negative_parens = trimmed.starts_with('(') && trimmed.ends_with(')');
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    let value: f64 = cleaned.parse().ok()?;
    Some(if negative_parens { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report_with_columns(titles: &[(&str, &str)], rows: Value) -> Value {
        let columns: Vec<Value> = titles
            .iter()
            .map(|(title, col_type)| json!({"ColTitle": title, "ColType": col_type}))
            .collect();
        json!({
            "Columns": {"Column": columns},
            "Rows": {"Row": rows}
        })
    }

    fn data_row(cells: &[&str]) -> Value {
        let col_data: Vec<Value> = cells.iter().map(|v| json!({"value": v})).collect();
        json!({"ColData": col_data, "type": "Data"})
    }

    const PRIMARY_COLUMNS: &[(&str, &str)] = &[
        ("Date", "tx_date"),
        ("Transaction Type", "txn_type"),
        ("Num", "doc_num"),
        ("Name", "string"),
        ("Memo/Description", "string"),
        ("Debit", "money"),
        ("Credit", "money"),
        ("Balance", "money"),
    ];

    #[test]
    fn test_running_balance_round_trip() {
        let report = report_with_columns(
            PRIMARY_COLUMNS,
            json!([
                data_row(&["", "Beginning Balance", "", "", "", "", "", "1000.00"]),
                data_row(&["2026-03-01", "Payment", "101", "Acme", "deposit", "200.00", "", ""]),
                data_row(&["2026-03-05", "Expense", "102", "Vendor Co", "fee", "", "50.00", ""]),
            ]),
        );

        let (lines, diagnostics) = parse_general_ledger(&report);
        assert_eq!(lines.len(), 2);
        assert_eq!(diagnostics.beginning_balance, Some(1000.0));
        assert_eq!(lines[0].debit, 200.0);
        assert_eq!(lines[0].balance, 1200.0);
        assert_eq!(lines[1].credit, 50.0);
        assert_eq!(lines[1].balance, 1150.0);
        assert_eq!(diagnostics.rows_processed, 2);
        assert_eq!(diagnostics.fallback_signed_amount, 0);
        assert_eq!(diagnostics.fallback_positional_scan, 0);
    }

    #[test]
    fn test_synonym_columns_parse_identically() {
        let synonyms: &[(&str, &str)] = &[
            ("DATE", ""),
            ("Type", ""),
            ("No.", ""),
            ("Payee", ""),
            ("Description", ""),
            ("Debit Amount", ""),
            ("Credit Amount", ""),
            ("Running Balance", ""),
        ];
        let rows = json!([
            data_row(&["", "Beginning Balance", "", "", "", "", "", "1000.00"]),
            data_row(&["2026-03-01", "Payment", "101", "Acme", "deposit", "200.00", "", ""]),
            data_row(&["2026-03-05", "Expense", "102", "Vendor Co", "fee", "", "50.00", ""]),
        ]);

        let (primary, _) = parse_general_ledger(&report_with_columns(PRIMARY_COLUMNS, rows.clone()));
        let (synonym, diagnostics) = parse_general_ledger(&report_with_columns(synonyms, rows));

        assert_eq!(primary.len(), synonym.len());
        for (a, b) in primary.iter().zip(synonym.iter()) {
            assert_eq!(a.date, b.date);
            assert_eq!(a.debit, b.debit);
            assert_eq!(a.credit, b.credit);
            assert_eq!(a.balance, b.balance);
        }
        assert!(diagnostics.column_map.debit.is_some());
        assert!(diagnostics.column_map.credit.is_some());
    }

    #[test]
    fn test_signed_amount_fallback() {
        let columns: &[(&str, &str)] = &[
            ("Date", "tx_date"),
            ("Transaction Type", ""),
            ("Num", ""),
            ("Name", ""),
            ("Memo", ""),
            ("Amount", "subt_nat_amount"),
        ];
        let report = report_with_columns(
            columns,
            json!([
                data_row(&["2026-03-01", "Invoice", "1", "Acme", "", "150.00"]),
                data_row(&["2026-03-02", "Check", "2", "Acme", "", "-40.00"]),
            ]),
        );

        let (lines, diagnostics) = parse_general_ledger(&report);
        assert_eq!(lines.len(), 2);
        // Positive = credit, negative = debit
        assert_eq!(lines[0].credit, 150.0);
        assert_eq!(lines[0].debit, 0.0);
        assert_eq!(lines[1].debit, 40.0);
        assert_eq!(diagnostics.fallback_signed_amount, 2);
        assert_eq!(lines[1].balance, 40.0 - 150.0);
    }

    #[test]
    fn test_positional_scan_fallback() {
        // No usable headers at all
        let report = json!({
            "Columns": {"Column": []},
            "Rows": {"Row": [
                data_row(&["2026-03-01", "Invoice", "1", "Acme", "memo", "$1,250.00"]),
            ]}
        });

        let (lines, diagnostics) = parse_general_ledger(&report);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].credit, 1250.0);
        assert_eq!(lines[0].doc_number, "1");
        assert_eq!(diagnostics.fallback_positional_scan, 1);
    }

    #[test]
    fn test_nested_sections_flattened_and_totals_skipped() {
        let report = report_with_columns(
            PRIMARY_COLUMNS,
            json!([
                {
                    "Header": {"ColData": [{"value": "Checking:Operations"}]},
                    "type": "Section",
                    "Rows": {"Row": [
                        data_row(&["2026-03-01", "Payment", "101", "Acme", "", "200.00", "", ""]),
                        data_row(&["Total for Operations", "", "", "", "", "200.00", "", ""]),
                    ]}
                },
                data_row(&["2026-03-02", "Expense", "102", "Vendor", "", "", "75.00", ""]),
            ]),
        );

        let (lines, diagnostics) = parse_general_ledger(&report);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].balance, 200.0);
        assert_eq!(lines[1].balance, 125.0);
        assert_eq!(diagnostics.rows_skipped, 1);
    }

    #[test]
    fn test_dateless_rows_skipped() {
        let report = report_with_columns(
            PRIMARY_COLUMNS,
            json!([
                data_row(&["not a date", "Payment", "1", "Acme", "", "10.00", "", ""]),
                data_row(&["2026-03-01", "Payment", "2", "Acme", "", "10.00", "", ""]),
            ]),
        );

        let (lines, diagnostics) = parse_general_ledger(&report);
        assert_eq!(lines.len(), 1);
        assert_eq!(diagnostics.rows_skipped, 1);
        assert_eq!(diagnostics.rows_processed, 1);
    }

    #[test]
    fn test_parse_money_shapes() {
        assert_eq!(parse_money("$1,234.56"), Some(1234.56));
        assert_eq!(parse_money("(200.00)"), Some(-200.0));
        assert_eq!(parse_money("-40"), Some(-40.0));
        assert_eq!(parse_money(""), None);
        assert_eq!(parse_money("Acme Corp"), None);
    }

    #[test]
    fn test_us_date_format_accepted() {
        let report = report_with_columns(
            PRIMARY_COLUMNS,
            json!([
                data_row(&["03/01/2026", "Payment", "1", "Acme", "", "10.00", "", ""]),
            ]),
        );
        let (lines, _) = parse_general_ledger(&report);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }
}
