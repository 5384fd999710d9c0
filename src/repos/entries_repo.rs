//! Entries repository: existence and reversal-linkage checks consumed by
//! the validator, plus the entry/line/reversal-link writers used by the
//! posting engine (C6).
//!
//! Grounded on `original_source/kernel/validator_adapter.py::EntriesRepoDB`
//! and `core/posting_engine.py`'s raw `entries`/`entry_lines`/
//! `entry_reversals` inserts; teacher's `repos/journal_repo.rs` for the
//! insert-header-then-bulk-insert-lines shape.

use rusqlite::Connection;

use crate::error::{ErrorKind, LedgerError};
use crate::model::Entry;
use crate::validation::EntriesRepo;

pub struct EntriesRepoImpl<'a> {
    conn: &'a Connection,
}

impl<'a> EntriesRepoImpl<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert_entry(
        &self,
        entry: &Entry,
        year: &str,
        protocol: &str,
        series: &str,
        protocol_no: i64,
        created_by: &str,
        client_reference_id: Option<&str>,
    ) -> Result<i64, LedgerError> {
        self.conn
            .execute(
                "INSERT INTO entries (
                    date, year, protocol, protocol_series, protocol_no,
                    document, document_date, party, description,
                    created_by, reversal_of, client_reference_id,
                    taxable_amount, vat_rate, vat_amount
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                rusqlite::params![
                    entry.date,
                    year,
                    protocol,
                    series,
                    protocol_no,
                    entry.documento,
                    entry.document_date,
                    entry.cliente_fornitore,
                    entry.descrizione,
                    created_by,
                    entry.reversal_of,
                    client_reference_id,
                    entry.taxable_amount.map(|v| v.to_string()),
                    entry.vat_rate.map(|v| v.to_string()),
                    entry.vat_amount.map(|v| v.to_string()),
                ],
            )
            .map_err(db_error)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_lines(&self, entry_id: i64, entry: &Entry) -> Result<(), LedgerError> {
        use crate::amount::cents;
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO entry_lines (entry_id, account_code, dare_cents, avere_cents)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(db_error)?;
        for line in &entry.lines {
            stmt.execute(rusqlite::params![
                entry_id,
                line.account_code,
                cents(line.dare),
                cents(line.avere),
            ])
            .map_err(db_error)?;
        }
        Ok(())
    }

    pub fn insert_reversal_link(&self, entry_id: i64, reversal_of: i64) -> Result<(), LedgerError> {
        self.conn
            .execute(
                "INSERT INTO entry_reversals (entry_id, reversal_of) VALUES (?1, ?2)",
                rusqlite::params![entry_id, reversal_of],
            )
            .map_err(db_error)?;
        Ok(())
    }
}

impl<'a> EntriesRepo for EntriesRepoImpl<'a> {
    fn exists(&self, entry_id: i64) -> Result<bool, LedgerError> {
        self.conn
            .query_row("SELECT 1 FROM entries WHERE id = ?1", [entry_id], |_| Ok(()))
            .map(|_| true)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(db_error(other)),
            })
    }

    fn has_reversal_for(&self, original_entry_id: i64) -> Result<bool, LedgerError> {
        self.conn
            .query_row(
                "SELECT 1 FROM entry_reversals WHERE reversal_of = ?1",
                [original_entry_id],
                |_| Ok(()),
            )
            .map(|_| true)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(db_error(other)),
            })
    }
}

fn db_error(e: rusqlite::Error) -> LedgerError {
    LedgerError::new(ErrorKind::DbError, format!("Sqlite: {e}"))
}
