//! Stable error kinds and the structured error/result types that cross the
//! engine boundary (spec §6, §7).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Stable, serializable error kind. Strings are part of the external
/// contract — do not rename variants without updating `as_str`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Unbalanced,
    NegativeAmount,
    InvalidAccount,
    PeriodClosed,
    AlreadyReversed,
    AmbiguousLine,
    EmptyLines,
    DbError,
    IdempotenceConflict,
    ProtocolError,
    InvalidDate,
    NotFound,
    VatMismatch,
    InvalidInput,
    /// Not in the original enumeration. Resolves the open ambiguity in
    /// spec.md §9(b): a period-state precondition failure (unclosed
    /// months at year-finalize, or a non-finalized prior year at
    /// year-open), distinct from protocol allocation.
    PeriodNotClosed,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unbalanced => "UNBALANCED",
            ErrorKind::NegativeAmount => "NEGATIVE_AMOUNT",
            ErrorKind::InvalidAccount => "INVALID_ACCOUNT",
            ErrorKind::PeriodClosed => "PERIOD_CLOSED",
            ErrorKind::AlreadyReversed => "ALREADY_REVERSED",
            ErrorKind::AmbiguousLine => "AMBIGUOUS_LINE",
            ErrorKind::EmptyLines => "EMPTY_LINES",
            ErrorKind::DbError => "DB_ERROR",
            ErrorKind::IdempotenceConflict => "IDEMPOTENCE_CONFLICT",
            ErrorKind::ProtocolError => "PROTOCOL_ERROR",
            ErrorKind::InvalidDate => "INVALID_DATE",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::VatMismatch => "VAT_MISMATCH",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::PeriodNotClosed => "PERIOD_NOT_CLOSED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured validation/engine error: a kind, a human message, and
/// optional machine-readable details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl LedgerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: HashMap<String, Value>) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Errors raised by the storage layer before they are normalized to a
/// `LedgerError` at the service boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage busy: exceeded {attempts} retries")]
    BusyRetriesExhausted { attempts: u32 },

    #[error("poisoned connection mutex")]
    Poisoned,
}

impl StorageError {
    /// Normalize any storage failure to `DB_ERROR`, preserving the
    /// underlying error text (spec §7: "message includes the exception's
    /// type-name and text").
    pub fn into_ledger_error(self) -> LedgerError {
        let type_name = match &self {
            StorageError::Sqlite(_) => "Sqlite",
            StorageError::BusyRetriesExhausted { .. } => "BusyRetriesExhausted",
            StorageError::Poisoned => "Poisoned",
        };
        LedgerError::new(ErrorKind::DbError, format!("{type_name}: {self}"))
    }
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        e.into_ledger_error()
    }
}
