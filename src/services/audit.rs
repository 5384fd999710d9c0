//! Audit chain (C7): append-only, hash-linked log per entry.
//!
//! Grounded on `original_source/services/audit_service.py` almost
//! verbatim: attach a UTC timestamp, hash the payload, chain to the
//! previous row's `curr_hash` for the same `entry_id`.

use chrono::Utc;
use rusqlite::Connection;
use serde_json::Value;

use crate::error::{ErrorKind, LedgerError};
use crate::hash::{canonical_json, payload_hash};

/// Append one audit row, attaching a timestamp and chaining to the
/// previous row for the same `entry_id` (or `prev_hash = NULL` if none).
pub fn log_action(
    conn: &Connection,
    action: &str,
    user_id: &str,
    mut payload: Value,
    entry_id: Option<i64>,
) -> Result<(), LedgerError> {
    if let Value::Object(ref mut map) = payload {
        map.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
    }

    let curr_hash = payload_hash(&payload);

    let prev_hash: Option<String> = match entry_id {
        Some(id) => conn
            .query_row(
                "SELECT curr_hash FROM audit_log WHERE entry_id = ?1 ORDER BY id DESC LIMIT 1",
                [id],
                |row| row.get(0),
            )
            .ok(),
        None => None,
    };

    conn.execute(
        "INSERT INTO audit_log (entry_id, action, user_id, payload, prev_hash, curr_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            entry_id,
            action,
            user_id,
            canonical_json(&payload),
            prev_hash,
            curr_hash,
        ],
    )
    .map_err(db_error)?;

    Ok(())
}

/// Recompute the chain for `entry_id` and verify it has not been
/// altered or removed (spec §4.5).
pub fn verify_chain(conn: &Connection, entry_id: i64) -> Result<bool, LedgerError> {
    let mut stmt = conn
        .prepare("SELECT payload, curr_hash, prev_hash FROM audit_log WHERE entry_id = ?1 ORDER BY id ASC")
        .map_err(db_error)?;
    let rows = stmt
        .query_map([entry_id], |row| {
            let payload: String = row.get(0)?;
            let curr_hash: String = row.get(1)?;
            let prev_hash: Option<String> = row.get(2)?;
            Ok((payload, curr_hash, prev_hash))
        })
        .map_err(db_error)?;

    let mut expected_prev: Option<String> = None;
    for r in rows {
        let (payload, curr_hash, prev_hash) = r.map_err(db_error)?;
        let value: Value = serde_json::from_str(&payload)
            .map_err(|e| LedgerError::new(ErrorKind::DbError, format!("corrupt audit payload: {e}")))?;
        let recomputed = payload_hash(&value);
        if recomputed != curr_hash {
            return Ok(false);
        }
        if prev_hash != expected_prev {
            return Ok(false);
        }
        expected_prev = Some(curr_hash);
    }
    Ok(true)
}

fn db_error(e: rusqlite::Error) -> LedgerError {
    LedgerError::new(ErrorKind::DbError, format!("Sqlite: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use serde_json::json;

    #[test]
    fn chain_verifies_after_sequential_log_actions() {
        let storage = Storage::open_in_memory().unwrap();
        storage.initialize(&[]).unwrap();
        storage
            .transaction(|tx| -> Result<(), LedgerError> {
                log_action(tx, "POST", "alice", json!({"a": 1}), Some(1))?;
                log_action(tx, "POST", "alice", json!({"a": 2}), Some(1))?;
                Ok(())
            })
            .unwrap();
        storage
            .with_connection(|conn| -> Result<(), LedgerError> { Ok(assert!(verify_chain(conn, 1).unwrap())) })
            .unwrap();
    }

    #[test]
    fn tampered_payload_breaks_verification() {
        let storage = Storage::open_in_memory().unwrap();
        storage.initialize(&[]).unwrap();
        storage
            .transaction(|tx| log_action(tx, "POST", "alice", json!({"a": 1}), Some(1)))
            .unwrap();
        storage
            .with_connection(|conn| -> Result<(), LedgerError> {
                conn.execute("UPDATE audit_log SET payload = '{\"a\":999}' WHERE entry_id = 1", [])
                    .unwrap();
                Ok(())
            })
            .unwrap();
        storage
            .with_connection(|conn| -> Result<(), LedgerError> { Ok(assert!(!verify_chain(conn, 1).unwrap())) })
            .unwrap();
    }
}
