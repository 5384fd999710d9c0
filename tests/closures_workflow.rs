//! End-to-end closures workflow: close a month, finalize the year, open
//! the next year and verify balance-sheet accounts carry forward while
//! income-statement accounts are zeroed against equity.

use ledger_core::services::closures::{close_period, finalize_year, open_new_period};
use ledger_core::{post, Entry, Line, SeedAccount, StatementType, Storage};
use rust_decimal::Decimal;
use std::str::FromStr;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn fresh_storage() -> Storage {
    let storage = Storage::open_in_memory().unwrap();
    storage
        .initialize(&[
            SeedAccount { code: "1000", name: "Cash", statement_type: StatementType::Asset },
            SeedAccount { code: "4100", name: "Sales", statement_type: StatementType::Revenue },
            SeedAccount { code: "6100", name: "Rent expense", statement_type: StatementType::Expense },
            SeedAccount { code: "9999", name: "Retained earnings", statement_type: StatementType::Equity },
        ])
        .unwrap();
    storage.insert_period("2025", Some("2025-01"), "2025-01-01", "2025-01-31", "open").unwrap();
    storage.insert_period("2025", None, "2025-01-01", "2025-12-31", "open").unwrap();
    storage
}

#[test]
fn close_finalize_open_carries_balance_sheet_into_the_new_year() {
    let storage = fresh_storage();

    let capital = Entry::new("2025-01-01", "capitale sociale", vec![Line::debit("1000", d("10000")), Line::credit("9999", d("10000"))]);
    assert!(post(&storage, &capital, "alice", None, None).success);

    let sale = Entry::new("2025-01-10", "vendita", vec![Line::debit("1000", d("3000")), Line::credit("4100", d("3000"))]);
    assert!(post(&storage, &sale, "alice", None, None).success);

    let rent = Entry::new("2025-01-12", "affitto", vec![Line::debit("6100", d("1200")), Line::credit("1000", d("1200"))]);
    assert!(post(&storage, &rent, "alice", None, None).success);

    let closing = close_period(&storage, "2025", Some("2025-01"), "alice", "chiusura gennaio", &[], &[], &[]);
    assert!(closing.success, "{:?}", closing.error_details);
    assert!(closing.entry_id.is_some(), "profit of 1800 should produce a closing entry");

    let finalized = finalize_year(&storage, "2025", "alice", "finalizzazione 2025");
    assert!(finalized.success, "{:?}", finalized.error_details);

    let opening = open_new_period(&storage, "2026", "alice", "apertura 2026");
    assert!(opening.success, "{:?}", opening.error_details);
    assert!(opening.entry_id.is_some(), "balance-sheet accounts should carry forward");
}

#[test]
fn finalize_year_blocked_while_a_month_remains_open() {
    let storage = fresh_storage();
    let result = finalize_year(&storage, "2025", "alice", "x");
    assert!(!result.success);
}
