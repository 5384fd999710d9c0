//! Reversal builder & posting (C8).
//!
//! Grounded on `original_source/services/ledger_query_repo.py::build_reversal`
//! (swap dare/avere, copy doc/party/VAT metadata) composed with
//! `services/ledger_service.py::reverse_entry`'s default idempotence key.
//! Legality (existence, not-already-reversed, period-open) is enforced
//! by C4/C6, not duplicated here (spec §4.6).

use chrono::Utc;

use crate::error::{ErrorKind, LedgerError};
use crate::model::PostResult;
use crate::repos::query_repo::QueryRepoImpl;
use crate::services::posting;
use crate::storage::Storage;

/// Build a reversing entry for `original_entry_id` and post it through
/// the posting engine (spec §4.6).
pub fn reverse_entry(
    storage: &Storage,
    original_entry_id: i64,
    user_id: &str,
    descrizione: &str,
    protocol_series: Option<&str>,
) -> PostResult {
    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();

    let reversal = storage.with_connection(|conn| -> Result<_, LedgerError> {
        QueryRepoImpl::new(conn).build_reversal(original_entry_id, &today, descrizione)
    });

    let entry = match reversal {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            return PostResult::single_failure(LedgerError::new(
                ErrorKind::NotFound,
                format!("entry {original_entry_id} does not exist"),
            ))
        }
        Err(e) => return PostResult::single_failure(e),
    };

    let idempotence_key = format!(
        "REV:{}:{}:{}",
        entry.date,
        entry.documento.as_deref().unwrap_or(""),
        descrizione
    );

    posting::post(storage, &entry, user_id, protocol_series, Some(&idempotence_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entry, Line, StatementType};
    use crate::storage::{SeedAccount, Storage};
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
            ])
            .unwrap();
        storage
            .insert_period("2025", None, "2025-01-01", "2025-12-31", "open")
            .unwrap();
        storage
    }

    #[test]
    fn reversal_round_trips_debit_and_credit() {
        let storage = fresh_storage();
        let entry = Entry::new(
            "2025-01-15",
            "purchase invoice",
            vec![Line::debit("1410", d("50")), Line::credit("4100", d("50"))],
        );
        let posted = posting::post(&storage, &entry, "alice", None, None);
        assert!(posted.success);

        let reversed = reverse_entry(&storage, posted.entry_id.unwrap(), "alice", "storno", None);
        assert!(reversed.success);
        assert_ne!(reversed.entry_id, posted.entry_id);
    }

    #[test]
    fn reversing_twice_is_rejected() {
        let storage = fresh_storage();
        let entry = Entry::new(
            "2025-01-15",
            "purchase invoice",
            vec![Line::debit("1410", d("50")), Line::credit("4100", d("50"))],
        );
        let posted = posting::post(&storage, &entry, "alice", None, None);
        let first_reversal = reverse_entry(&storage, posted.entry_id.unwrap(), "alice", "storno", None);
        assert!(first_reversal.success);

        let second_reversal = reverse_entry(&storage, posted.entry_id.unwrap(), "alice", "storno again", None);
        assert!(!second_reversal.success);
        assert!(second_reversal
            .error_details
            .iter()
            .any(|e| e.kind == ErrorKind::AlreadyReversed));
    }

    #[test]
    fn reversing_unknown_entry_is_not_found() {
        let storage = fresh_storage();
        let result = reverse_entry(&storage, 9999, "alice", "storno", None);
        assert!(!result.success);
        assert!(result.error_details.iter().any(|e| e.kind == ErrorKind::NotFound));
    }
}
