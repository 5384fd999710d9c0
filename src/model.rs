//! Entry/line value types and the posting result (C2).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::amount::{cents, q2};
use crate::error::LedgerError;

/// Statement classification of an account, matching spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl StatementType {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementType::Asset => "ASSET",
            StatementType::Liability => "LIABILITY",
            StatementType::Equity => "EQUITY",
            StatementType::Revenue => "REVENUE",
            StatementType::Expense => "EXPENSE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ASSET" => Some(StatementType::Asset),
            "LIABILITY" => Some(StatementType::Liability),
            "EQUITY" => Some(StatementType::Equity),
            "REVENUE" => Some(StatementType::Revenue),
            "EXPENSE" => Some(StatementType::Expense),
            _ => None,
        }
    }
}

/// A chart-of-accounts entry.
#[derive(Debug, Clone)]
pub struct Account {
    pub code: String,
    pub name: String,
    pub statement_type: StatementType,
}

/// Period status (spec.md §3). Transitions are monotone: Open -> Closed -> Finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodStatus {
    Open,
    Closed,
    Finalized,
}

impl PeriodStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodStatus::Open => "open",
            PeriodStatus::Closed => "closed",
            PeriodStatus::Finalized => "finalized",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PeriodStatus::Open),
            "closed" => Some(PeriodStatus::Closed),
            "finalized" => Some(PeriodStatus::Finalized),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Period {
    pub year: String,
    pub month: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub status: PeriodStatus,
}

/// One debit-or-credit leg of an entry, as supplied by a caller. Exactly
/// one of `dare`/`avere` should be nonzero — the validator, not this
/// type, enforces that.
#[derive(Debug, Clone, Default)]
pub struct Line {
    pub account_code: String,
    pub dare: Decimal,
    pub avere: Decimal,
}

impl Line {
    pub fn debit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            dare: amount,
            avere: Decimal::ZERO,
        }
    }

    pub fn credit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            dare: Decimal::ZERO,
            avere: amount,
        }
    }
}

/// A journal entry as submitted for posting. Immutable once posted.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub date: String,
    pub descrizione: String,
    pub lines: Vec<Line>,
    pub documento: Option<String>,
    pub document_date: Option<String>,
    pub cliente_fornitore: Option<String>,
    pub reversal_of: Option<i64>,
    pub client_reference_id: Option<String>,
    pub taxable_amount: Option<Decimal>,
    pub vat_rate: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub protocol_series: Option<String>,
}

impl Entry {
    pub fn new(date: impl Into<String>, descrizione: impl Into<String>, lines: Vec<Line>) -> Self {
        Self {
            date: date.into(),
            descrizione: descrizione.into(),
            lines,
            ..Default::default()
        }
    }

    /// Build the canonical idempotence-check payload: entry content plus
    /// the acting user, protocol and timestamp excluded (spec §4.3).
    pub fn idempotence_payload(&self, user_id: &str) -> Value {
        json!({
            "entry": self.content_fields(),
            "user": user_id,
        })
    }

    /// Build the canonical audit payload: idempotence payload fields plus
    /// the allocated protocol (spec §4.3). A timestamp is attached by the
    /// audit chain (C7), not here.
    pub fn audit_payload(&self, user_id: &str, protocol: &str) -> Value {
        json!({
            "entry": self.content_fields(),
            "protocol": protocol,
            "user": user_id,
        })
    }

    fn content_fields(&self) -> Value {
        json!({
            "date": self.date,
            "descrizione": self.descrizione,
            "documento": self.documento,
            "document_date": self.document_date,
            "cliente_fornitore": self.cliente_fornitore,
            "reversal_of": self.reversal_of,
            "client_reference_id": self.client_reference_id,
            "taxable_amount": self.taxable_amount.map(|v| q2(v).to_string()),
            "vat_rate": self.vat_rate.map(|v| q2(v).to_string()),
            "vat_amount": self.vat_amount.map(|v| q2(v).to_string()),
            "lines": self.lines.iter().map(|l| json!({
                "account_code": l.account_code,
                "dare_cents": cents(l.dare),
                "avere_cents": cents(l.avere),
            })).collect::<Vec<_>>(),
        })
    }
}

/// A stored line, restored from integer cents (C10).
#[derive(Debug, Clone)]
pub struct StoredLine {
    pub account_code: String,
    pub dare: Option<Decimal>,
    pub avere: Option<Decimal>,
}

/// A stored entry, reconstructed from the database (C10).
#[derive(Debug, Clone)]
pub struct PostedEntry {
    pub id: i64,
    pub date: String,
    pub descrizione: String,
    pub lines: Vec<StoredLine>,
    pub documento: Option<String>,
    pub document_date: Option<String>,
    pub cliente_fornitore: Option<String>,
    pub taxable_amount: Option<Decimal>,
    pub vat_rate: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub reversal_of: Option<i64>,
}

/// The outcome of `post`/`reverse_entry`/closures operations (spec §7).
#[derive(Debug, Clone)]
pub struct PostResult {
    pub success: bool,
    pub entry_id: Option<i64>,
    pub protocol: Option<String>,
    pub error_details: Vec<LedgerError>,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl PostResult {
    pub fn ok(entry_id: Option<i64>, protocol: Option<String>) -> Self {
        Self {
            success: true,
            entry_id,
            protocol,
            error_details: Vec::new(),
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(errors: Vec<LedgerError>) -> Self {
        Self {
            success: false,
            entry_id: None,
            protocol: None,
            errors: errors.iter().map(|e| e.message.clone()).collect(),
            error_details: errors,
            timestamp: Utc::now(),
        }
    }

    pub fn single_failure(err: LedgerError) -> Self {
        Self::failure(vec![err])
    }
}
