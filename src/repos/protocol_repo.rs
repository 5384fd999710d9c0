//! Protocol counter allocation and the idempotence table (part of C6's
//! transactional steps).
//!
//! Grounded on `original_source/core/posting_engine.py::_next_protocol`
//! (upsert-then-increment-then-read) and its inline idempotence
//! `SELECT`/`INSERT` statements.

use rusqlite::Connection;

use crate::error::{ErrorKind, LedgerError};

pub struct ProtocolRepoImpl<'a> {
    conn: &'a Connection,
}

impl<'a> ProtocolRepoImpl<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Atomic per-(year, series) increment. Returns (protocol_no, protocol_str).
    /// Protocol string format is bit-exact: `YYYY/SERIES/NNNNNN` (spec §6).
    pub fn next_protocol(&self, year: &str, series: &str) -> Result<(i64, String), LedgerError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO protocol_counters (year, series, counter) VALUES (?1, ?2, 0)",
                rusqlite::params![year, series],
            )
            .map_err(db_error)?;
        self.conn
            .execute(
                "UPDATE protocol_counters SET counter = counter + 1 WHERE year = ?1 AND series = ?2",
                rusqlite::params![year, series],
            )
            .map_err(db_error)?;
        let protocol_no: i64 = self
            .conn
            .query_row(
                "SELECT counter FROM protocol_counters WHERE year = ?1 AND series = ?2",
                rusqlite::params![year, series],
                |row| row.get(0),
            )
            .map_err(db_error)?;
        let protocol_str = format!("{year}/{series}/{protocol_no:06}");
        Ok((protocol_no, protocol_str))
    }
}

/// An idempotence record, as stored.
pub struct IdempotenceRow {
    pub payload_hash: String,
    pub entry_id: i64,
    pub protocol: String,
}

pub struct IdempotenceRepoImpl<'a> {
    conn: &'a Connection,
}

impl<'a> IdempotenceRepoImpl<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn find(&self, key: &str) -> Result<Option<IdempotenceRow>, LedgerError> {
        self.conn
            .query_row(
                "SELECT payload_hash, entry_id, protocol FROM idempotence WHERE key = ?1",
                [key],
                |row| {
                    Ok(IdempotenceRow {
                        payload_hash: row.get(0)?,
                        entry_id: row.get(1)?,
                        protocol: row.get(2)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_error(other)),
            })
    }

    pub fn insert(
        &self,
        key: &str,
        payload_hash: &str,
        entry_id: i64,
        protocol: &str,
    ) -> Result<(), LedgerError> {
        self.conn
            .execute(
                "INSERT INTO idempotence (key, payload_hash, entry_id, protocol) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![key, payload_hash, entry_id, protocol],
            )
            .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(e: rusqlite::Error) -> LedgerError {
    LedgerError::new(ErrorKind::DbError, format!("Sqlite: {e}"))
}
