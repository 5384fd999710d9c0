//! Scenario 6 (spec §8): reversal round-trip and the already-reversed guard.

use ledger_core::{post, reverse_entry, Entry, ErrorKind, Line, LedgerError, SeedAccount, StatementType, Storage};
use rust_decimal::Decimal;
use std::str::FromStr;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn fresh_storage() -> Storage {
    let storage = Storage::open_in_memory().unwrap();
    storage
        .initialize(&[
            SeedAccount { code: "1420", name: "Payables", statement_type: StatementType::Liability },
            SeedAccount { code: "6100", name: "Purchases", statement_type: StatementType::Expense },
        ])
        .unwrap();
    storage.insert_period("2025", None, "2025-01-01", "2025-12-31", "open").unwrap();
    storage
}

#[test]
fn reversing_a_purchase_invoice_nets_every_account_to_zero() {
    let storage = fresh_storage();
    let purchase = Entry::new(
        "2025-02-10",
        "fattura acquisto",
        vec![Line::debit("6100", d("500.00")), Line::credit("1420", d("500.00"))],
    );
    let posted = post(&storage, &purchase, "alice", None, None);
    assert!(posted.success);

    let reversed = reverse_entry(&storage, posted.entry_id.unwrap(), "alice", "storno acquisto", None);
    assert!(reversed.success, "{:?}", reversed.error_details);
    assert_ne!(reversed.entry_id, posted.entry_id);

    let row_exists = storage
        .with_connection(|conn| -> Result<bool, LedgerError> {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM entry_reversals WHERE entry_id = ?1 AND reversal_of = ?2",
                    [reversed.entry_id.unwrap(), posted.entry_id.unwrap()],
                    |_| Ok(()),
                )
                .is_ok())
        })
        .unwrap();
    assert!(row_exists);
}

#[test]
fn reversing_an_already_reversed_entry_is_rejected() {
    let storage = fresh_storage();
    let purchase = Entry::new(
        "2025-02-10",
        "fattura acquisto",
        vec![Line::debit("6100", d("500.00")), Line::credit("1420", d("500.00"))],
    );
    let posted = post(&storage, &purchase, "alice", None, None);
    let first_reversal = reverse_entry(&storage, posted.entry_id.unwrap(), "alice", "storno", None);
    assert!(first_reversal.success);

    let second_reversal = reverse_entry(&storage, posted.entry_id.unwrap(), "alice", "storno di nuovo", None);
    assert!(!second_reversal.success);
    assert!(second_reversal.error_details.iter().any(|e| e.kind == ErrorKind::AlreadyReversed));
}
