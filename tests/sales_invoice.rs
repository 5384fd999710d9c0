//! Scenario 1 (spec §8): sales invoice posts successfully with a
//! well-formed protocol and a non-null audit hash.

use ledger_core::{post, verify_chain, Entry, Line, SeedAccount, StatementType, Storage};
use rust_decimal::Decimal;
use std::str::FromStr;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn fresh_storage() -> Storage {
    let storage = Storage::open_in_memory().unwrap();
    storage
        .initialize(&[
            SeedAccount { code: "1410", name: "Receivables", statement_type: StatementType::Asset },
            SeedAccount { code: "4100", name: "Sales", statement_type: StatementType::Revenue },
            SeedAccount { code: "2321", name: "VAT payable", statement_type: StatementType::Liability },
        ])
        .unwrap();
    storage.insert_period("2025", None, "2025-01-01", "2025-12-31", "open").unwrap();
    storage
}

#[test]
fn sales_invoice_posts_with_matching_protocol_and_verifiable_audit() {
    let storage = fresh_storage();
    let mut entry = Entry::new(
        "2025-01-15",
        "fattura vendita",
        vec![
            Line::debit("1410", d("122.00")),
            Line::credit("4100", d("100.00")),
            Line::credit("2321", d("22.00")),
        ],
    );
    entry.taxable_amount = Some(d("100.00"));
    entry.vat_rate = Some(d("0.22"));
    entry.vat_amount = Some(d("22.00"));

    let result = post(&storage, &entry, "alice", None, None);
    assert!(result.success, "{:?}", result.error_details);

    let protocol = result.protocol.clone().unwrap();
    assert!(protocol.starts_with("2025/GEN/"));
    let seq = protocol.rsplit('/').next().unwrap();
    assert_eq!(seq.len(), 6);
    assert!(seq.chars().all(|c| c.is_ascii_digit()));

    let entry_id = result.entry_id.unwrap();
    assert!(storage.with_connection(|conn| -> Result<_, ledger_core::LedgerError> { Ok(verify_chain(conn, entry_id).unwrap()) }).unwrap());
}
