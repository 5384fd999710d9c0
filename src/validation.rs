//! Validator (C4): a pure function over an `Entry` and three read-only
//! repository capabilities. Emits every applicable error; never
//! short-circuits, never writes.

use rust_decimal::Decimal;

use crate::amount::q2;
use crate::error::{ErrorKind, LedgerError};
use crate::model::Entry;

/// Read-only capability: does an account code exist.
pub trait AccountsRepo {
    fn exists(&self, account_code: &str) -> Result<bool, LedgerError>;
}

/// Read-only capability: is a given ISO date inside an open period.
pub trait PeriodsRepo {
    fn is_open_by_date(&self, iso_date: &str) -> Result<bool, LedgerError>;
}

/// Read-only capability: entry existence and reversal-linkage lookups.
pub trait EntriesRepo {
    fn exists(&self, entry_id: i64) -> Result<bool, LedgerError>;
    fn has_reversal_for(&self, original_entry_id: i64) -> Result<bool, LedgerError>;
}

fn is_iso_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes[0..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
}

fn validate_balanced(entry: &Entry) -> Vec<LedgerError> {
    let mut total_dare = Decimal::ZERO;
    let mut total_avere = Decimal::ZERO;
    for line in &entry.lines {
        total_dare += q2(line.dare);
        total_avere += q2(line.avere);
    }
    if total_dare != total_avere {
        vec![LedgerError::new(
            ErrorKind::Unbalanced,
            format!("entry not balanced: dare={total_dare}, avere={total_avere}"),
        )]
    } else {
        Vec::new()
    }
}

fn validate_no_negative(entry: &Entry) -> Vec<LedgerError> {
    let mut errors = Vec::new();
    for line in &entry.lines {
        if line.dare < Decimal::ZERO || line.avere < Decimal::ZERO {
            errors.push(LedgerError::new(
                ErrorKind::NegativeAmount,
                format!("negative value on account {}", line.account_code),
            ));
        }
        if line.dare > Decimal::ZERO && line.avere > Decimal::ZERO {
            errors.push(LedgerError::new(
                ErrorKind::AmbiguousLine,
                format!("ambiguous line on account {}: dare and avere > 0", line.account_code),
            ));
        }
        if line.dare == Decimal::ZERO && line.avere == Decimal::ZERO {
            errors.push(LedgerError::new(
                ErrorKind::EmptyLines,
                format!("empty line on account {}: dare and avere = 0", line.account_code),
            ));
        }
    }
    errors
}

fn validate_accounts_exist(
    entry: &Entry,
    accounts: &dyn AccountsRepo,
) -> Result<Vec<LedgerError>, LedgerError> {
    let mut errors = Vec::new();
    for line in &entry.lines {
        if !accounts.exists(&line.account_code)? {
            errors.push(LedgerError::new(
                ErrorKind::InvalidAccount,
                format!("account {} does not exist", line.account_code),
            ));
        }
    }
    Ok(errors)
}

fn validate_period_open(
    entry: &Entry,
    periods: &dyn PeriodsRepo,
) -> Result<Vec<LedgerError>, LedgerError> {
    if !is_iso_date(&entry.date) {
        return Ok(vec![LedgerError::new(
            ErrorKind::InvalidDate,
            format!("invalid date: {}", entry.date),
        )]);
    }
    if !periods.is_open_by_date(&entry.date)? {
        return Ok(vec![LedgerError::new(
            ErrorKind::PeriodClosed,
            format!("period closed for date {}", entry.date),
        )]);
    }
    Ok(Vec::new())
}

fn validate_not_already_reversed(
    entry: &Entry,
    entries: &dyn EntriesRepo,
) -> Result<Vec<LedgerError>, LedgerError> {
    let Some(original_id) = entry.reversal_of else {
        return Ok(Vec::new());
    };
    if !entries.exists(original_id)? {
        return Ok(vec![LedgerError::new(
            ErrorKind::NotFound,
            format!("entry {original_id} does not exist"),
        )]);
    }
    if entries.has_reversal_for(original_id)? {
        return Ok(vec![LedgerError::new(
            ErrorKind::AlreadyReversed,
            format!("entry {original_id} has already been reversed"),
        )]);
    }
    Ok(Vec::new())
}

fn validate_vat_consistency(entry: &Entry) -> Vec<LedgerError> {
    let (Some(taxable), Some(rate), Some(amount)) =
        (entry.taxable_amount, entry.vat_rate, entry.vat_amount)
    else {
        return Vec::new();
    };
    let expected = q2(q2(taxable) * q2(rate));
    let actual = q2(amount);
    if expected != actual {
        vec![LedgerError::new(
            ErrorKind::VatMismatch,
            format!("VAT mismatch: expected={expected}, found={actual}"),
        )]
    } else {
        Vec::new()
    }
}

/// Run every rule and return the combined list of errors (spec §4.2).
pub fn validate(
    entry: &Entry,
    accounts: &dyn AccountsRepo,
    periods: &dyn PeriodsRepo,
    entries: &dyn EntriesRepo,
) -> Result<Vec<LedgerError>, LedgerError> {
    let mut errors = Vec::new();
    errors.extend(validate_balanced(entry));
    errors.extend(validate_no_negative(entry));
    errors.extend(validate_accounts_exist(entry, accounts)?);
    errors.extend(validate_period_open(entry, periods)?);
    errors.extend(validate_not_already_reversed(entry, entries)?);
    errors.extend(validate_vat_consistency(entry));
    Ok(errors)
}
