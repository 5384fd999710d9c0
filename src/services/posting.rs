//! Posting engine (C6): validate -> idempotence check -> protocol
//! allocation -> persist -> audit -> idempotence record, in one
//! transaction.
//!
//! Grounded on `original_source/core/posting_engine.py::PostingEngine.post`
//! step for step; teacher's `services/reversal_service.rs` grounds the
//! "single transaction, tracing::info! on success" shape.

use tracing::{info, warn};

use crate::error::{ErrorKind, LedgerError};
use crate::hash::payload_hash;
use crate::model::{Entry, PostResult};
use crate::repos::accounts_repo::AccountsRepoImpl;
use crate::repos::entries_repo::EntriesRepoImpl;
use crate::repos::periods_repo::PeriodsRepoImpl;
use crate::repos::protocol_repo::{IdempotenceRepoImpl, ProtocolRepoImpl};
use crate::services::audit;
use crate::storage::Storage;
use crate::validation::validate;

/// Post a journal entry through the single write path (spec §4.4).
pub fn post(
    storage: &Storage,
    entry: &Entry,
    user_id: &str,
    protocol_series: Option<&str>,
    idempotence_key: Option<&str>,
) -> PostResult {
    // 1) Validate, read-only, outside any transaction.
    let validation = storage.with_connection(|conn| {
        let accounts = AccountsRepoImpl::new(conn);
        let periods = PeriodsRepoImpl::new(conn);
        let entries = EntriesRepoImpl::new(conn);
        validate(entry, &accounts, &periods, &entries)
    });

    let errors = match validation {
        Ok(errors) => errors,
        Err(storage_err) => return PostResult::single_failure(storage_err),
    };

    if !errors.is_empty() {
        return PostResult::failure(errors);
    }

    let year = entry.date[0..4].to_string();
    let series = protocol_series
        .or(entry.protocol_series.as_deref())
        .unwrap_or_else(|| storage.default_protocol_series())
        .to_uppercase();

    let result: Result<PostResult, LedgerError> = storage.transaction(|tx| {
        // 4) Idempotence pre-check (before any mutation).
        if let Some(key) = idempotence_key {
            let content_hash = payload_hash(&entry.idempotence_payload(user_id));
            let idempotence = IdempotenceRepoImpl::new(tx);
            if let Some(existing) = idempotence.find(key)? {
                if existing.payload_hash == content_hash {
                    return Ok(PostResult::ok(Some(existing.entry_id), Some(existing.protocol)));
                }
                return Ok(PostResult::single_failure(LedgerError::new(
                    ErrorKind::IdempotenceConflict,
                    format!("idempotence conflict for key {key}"),
                )));
            }
        }

        // 5) Protocol allocation.
        let protocol_repo = ProtocolRepoImpl::new(tx);
        let (protocol_no, protocol_str) = protocol_repo.next_protocol(&year, &series)?;

        // 6) Insert entry.
        let entries = EntriesRepoImpl::new(tx);
        let entry_id = entries.insert_entry(
            entry,
            &year,
            &protocol_str,
            &series,
            protocol_no,
            user_id,
            entry.client_reference_id.as_deref().or(idempotence_key),
        )?;

        // 7) Insert lines.
        entries.insert_lines(entry_id, entry)?;

        // 8) Reversal linkage.
        if let Some(reversal_of) = entry.reversal_of {
            entries.insert_reversal_link(entry_id, reversal_of)?;
        }

        // 9) Audit.
        let payload = entry.audit_payload(user_id, &protocol_str);
        audit::log_action(tx, "POST", user_id, payload, Some(entry_id))?;

        // 10) Idempotence record.
        if let Some(key) = idempotence_key {
            let content_hash = payload_hash(&entry.idempotence_payload(user_id));
            IdempotenceRepoImpl::new(tx).insert(key, &content_hash, entry_id, &protocol_str)?;
        }

        Ok(PostResult::ok(Some(entry_id), Some(protocol_str)))
    });

    match result {
        Ok(post_result) => {
            if post_result.success {
                info!(
                    entry_id = ?post_result.entry_id,
                    protocol = ?post_result.protocol,
                    user_id,
                    "entry posted"
                );
            } else {
                warn!(user_id, errors = ?post_result.error_details, "post rejected");
            }
            post_result
        }
        Err(e) => {
            warn!(user_id, error = %e, "post failed at storage boundary");
            PostResult::single_failure(e)
        }
    }
}
