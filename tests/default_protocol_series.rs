//! `Storage`'s configured `default_protocol_series` must actually drive
//! the protocol allocated when a post call supplies no series override
//! (spec.md §9: `default_protocol_series` is a recognized, env-driven
//! configuration option).

use ledger_core::{post, Entry, Line, SeedAccount, StatementType, Storage};
use rust_decimal::Decimal;
use std::str::FromStr;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[test]
fn post_without_an_explicit_series_uses_the_configured_default() {
    let storage = Storage::open(":memory:", 5, 150, "9999", "VEN").unwrap();
    storage
        .initialize(&[
            SeedAccount { code: "1410", name: "Receivables", statement_type: StatementType::Asset },
            SeedAccount { code: "4100", name: "Sales", statement_type: StatementType::Revenue },
        ])
        .unwrap();
    storage.insert_period("2025", None, "2025-01-01", "2025-12-31", "open").unwrap();

    let entry = Entry::new(
        "2025-01-15",
        "fattura vendita",
        vec![Line::debit("1410", d("100.00")), Line::credit("4100", d("100.00"))],
    );

    let result = post(&storage, &entry, "alice", None, None);
    assert!(result.success, "{:?}", result.error_details);
    assert!(result.protocol.unwrap().starts_with("2025/VEN/"));
}
