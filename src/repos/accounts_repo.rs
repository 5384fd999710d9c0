//! Accounts repository: existence checks used by the validator.
//!
//! Grounded on `original_source/kernel/validator_adapter.py::AccountsRepoDB`
//! and the teacher's `repos/account_repo.rs` plain/`_tx` pairing.

use rusqlite::Connection;

use crate::error::{ErrorKind, LedgerError};
use crate::model::{Account, StatementType};
use crate::validation::AccountsRepo;

/// Borrowed-connection implementation, usable both against a plain
/// connection and against an open transaction (`Transaction` derefs to
/// `Connection`).
pub struct AccountsRepoImpl<'a> {
    conn: &'a Connection,
}

impl<'a> AccountsRepoImpl<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn find_by_code(&self, code: &str) -> Result<Option<Account>, LedgerError> {
        self.conn
            .query_row(
                "SELECT code, name, statement_type FROM accounts WHERE code = ?1",
                [code],
                |row| {
                    let statement_type: String = row.get(2)?;
                    Ok(Account {
                        code: row.get(0)?,
                        name: row.get(1)?,
                        statement_type: StatementType::from_str(&statement_type)
                            .unwrap_or(StatementType::Asset),
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_error(other)),
            })
    }
}

impl<'a> AccountsRepo for AccountsRepoImpl<'a> {
    fn exists(&self, account_code: &str) -> Result<bool, LedgerError> {
        self.conn
            .query_row(
                "SELECT 1 FROM accounts WHERE code = ?1",
                [account_code],
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
