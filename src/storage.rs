//! Storage contract and its SQLite reference implementation (C3/A2).
//!
//! Mirrors the original source's `db_manager.py`: a single cached
//! connection behind a mutex, `BEGIN IMMEDIATE` for every write
//! transaction, and busy/locked retry with exponential backoff. SQLite's
//! single-writer model means a connection pool buys nothing here, unlike
//! the teacher's `sqlx` `PgPool`.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use rusqlite::{Connection, Transaction};
use tracing::warn;

use crate::config::Config;
use crate::error::StorageError;
use crate::model::{Account, StatementType};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    statement_type TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS periods (
    year TEXT NOT NULL,
    month TEXT,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    status TEXT NOT NULL,
    UNIQUE (year, month)
);

CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    year TEXT NOT NULL,
    protocol TEXT NOT NULL,
    protocol_series TEXT NOT NULL,
    protocol_no INTEGER NOT NULL,
    document TEXT,
    document_date TEXT,
    party TEXT,
    description TEXT,
    created_by TEXT,
    reversal_of INTEGER,
    client_reference_id TEXT,
    taxable_amount TEXT,
    vat_rate TEXT,
    vat_amount TEXT
);

CREATE INDEX IF NOT EXISTS idx_entries_protocol ON entries(protocol);
CREATE INDEX IF NOT EXISTS idx_entries_date ON entries(date);

CREATE TABLE IF NOT EXISTS entry_lines (
    entry_id INTEGER NOT NULL REFERENCES entries(id),
    account_code TEXT NOT NULL,
    dare_cents INTEGER NOT NULL,
    avere_cents INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entry_lines_entry ON entry_lines(entry_id);

CREATE TABLE IF NOT EXISTS protocol_counters (
    year TEXT NOT NULL,
    series TEXT NOT NULL,
    counter INTEGER NOT NULL,
    PRIMARY KEY (year, series)
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id INTEGER,
    action TEXT NOT NULL,
    user_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    prev_hash TEXT,
    curr_hash TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_audit_log_entry ON audit_log(entry_id);

CREATE TABLE IF NOT EXISTS idempotence (
    key TEXT PRIMARY KEY,
    payload_hash TEXT NOT NULL,
    entry_id INTEGER NOT NULL,
    protocol TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entry_reversals (
    entry_id INTEGER NOT NULL,
    reversal_of INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entry_reversals_entry ON entry_reversals(entry_id);
CREATE INDEX IF NOT EXISTS idx_entry_reversals_of ON entry_reversals(reversal_of);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now')),
    description TEXT
);
"#;

/// A seed account row for `Storage::initialize`.
pub struct SeedAccount {
    pub code: &'static str,
    pub name: &'static str,
    pub statement_type: StatementType,
}

/// Embedded single-writer SQLite storage handle.
pub struct Storage {
    conn: Mutex<Connection>,
    busy_retry_max: u32,
    busy_retry_initial_ms: u64,
    equity_account_code: String,
    default_protocol_series: String,
}

impl Storage {
    /// Open (or create) the database file at `path`.
    pub fn open(
        path: &str,
        busy_retry_max: u32,
        busy_retry_initial_ms: u64,
        equity_account_code: impl Into<String>,
        default_protocol_series: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let conn = Self::open_connection(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            busy_retry_max,
            busy_retry_initial_ms,
            equity_account_code: equity_account_code.into(),
            default_protocol_series: default_protocol_series.into(),
        })
    }

    /// Open from a `Config` (spec.md §9 options).
    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        Self::open(
            &config.storage_path,
            config.busy_retry_max,
            config.busy_retry_initial_ms,
            config.equity_account_code.clone(),
            config.default_protocol_series.clone(),
        )
    }

    /// Open a private in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            busy_retry_max: 5,
            busy_retry_initial_ms: 150,
            equity_account_code: "9999".to_string(),
            default_protocol_series: "GEN".to_string(),
        })
    }

    /// The account that absorbs the period's profit/loss on close, and
    /// that opening balances are carried forward against (spec §9).
    pub fn equity_account_code(&self) -> &str {
        &self.equity_account_code
    }

    /// The protocol series used when a post call supplies none (spec §9).
    pub fn default_protocol_series(&self) -> &str {
        &self.default_protocol_series
    }

    fn open_connection(path: &str) -> Result<Connection, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(conn)
    }

    /// Create the schema (idempotent) and ensure the given seed accounts
    /// are present, without touching rows that already exist. Resolves
    /// spec.md §9(a): always `INSERT OR IGNORE`, regardless of whether
    /// the accounts table was previously empty.
    pub fn initialize(&self, seed_accounts: &[SeedAccount]) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute_batch(SCHEMA_SQL)?;
        for seed in seed_accounts {
            conn.execute(
                "INSERT OR IGNORE INTO accounts (code, name, statement_type) VALUES (?1, ?2, ?3)",
                rusqlite::params![seed.code, seed.name, seed.statement_type.as_str()],
            )?;
        }
        Ok(())
    }

    pub fn insert_account(&self, account: &Account) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            "INSERT OR IGNORE INTO accounts (code, name, statement_type) VALUES (?1, ?2, ?3)",
            rusqlite::params![account.code, account.name, account.statement_type.as_str()],
        )?;
        Ok(())
    }

    pub fn insert_period(
        &self,
        year: &str,
        month: Option<&str>,
        start_date: &str,
        end_date: &str,
        status: &str,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            "INSERT OR IGNORE INTO periods (year, month, start_date, end_date, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![year, month, start_date, end_date, status],
        )?;
        Ok(())
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction, retrying on
    /// SQLITE_BUSY/SQLITE_LOCKED with exponential backoff (spec §4.4
    /// step 2, §5). Commits on `Ok`, rolls back on `Err`.
    ///
    /// Generic over the closure's error type so callers can propagate
    /// business errors (e.g. `LedgerError`) directly instead of being
    /// forced through `StorageError`; `E` only needs to be constructible
    /// from a `StorageError` for the transaction-management failure
    /// paths (busy-retry exhaustion, commit failure).
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let mut attempt = 0u32;
        let tx = loop {
            match conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate) {
                Ok(tx) => break tx,
                Err(e) if Self::is_busy_or_locked(&e) => {
                    if attempt >= self.busy_retry_max {
                        return Err(StorageError::BusyRetriesExhausted { attempts: attempt }.into());
                    }
                    let backoff = self.busy_retry_initial_ms * 2u64.pow(attempt);
                    warn!(attempt, backoff, "storage busy, retrying BEGIN IMMEDIATE");
                    thread::sleep(Duration::from_millis(backoff));
                    attempt += 1;
                }
                Err(e) => return Err(StorageError::from(e).into()),
            }
        };

        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(StorageError::from)?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }

    fn is_busy_or_locked(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
        )
    }

    /// Borrow the connection for a read-only query outside a transaction.
    pub fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StorageError>,
    {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        f(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_creates_schema_and_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        storage.initialize(&[]).unwrap();
        storage.initialize(&[]).unwrap();
        storage
            .with_connection(|conn| -> Result<(), StorageError> {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM accounts", [], |r| r.get(0))
                    .unwrap();
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn seed_accounts_are_inserted_once() {
        let storage = Storage::open_in_memory().unwrap();
        let seeds = [SeedAccount {
            code: "1000",
            name: "Cash",
            statement_type: StatementType::Asset,
        }];
        storage.initialize(&seeds).unwrap();
        storage.initialize(&seeds).unwrap();
        storage
            .with_connection(|conn| -> Result<(), StorageError> {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM accounts", [], |r| r.get(0))
                    .unwrap();
                assert_eq!(count, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let storage = Storage::open_in_memory().unwrap();
        storage.initialize(&[]).unwrap();
        let result: Result<(), StorageError> = storage.transaction(|tx| {
            tx.execute(
                "INSERT INTO accounts (code, name, statement_type) VALUES ('9', 'x', 'ASSET')",
                [],
            )?;
            Err(StorageError::Poisoned)
        });
        assert!(result.is_err());
        storage
            .with_connection(|conn| -> Result<(), StorageError> {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM accounts", [], |r| r.get(0))
                    .unwrap();
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }
}
