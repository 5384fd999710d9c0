//! Closures engine (C9): period state machine, trial balance, the
//! income-statement closing entry, year finalize, and opening-balance
//! carry-forward.
//!
//! Grounded on `original_source/services/closures_service.py` method for
//! method. Each adjustment, the closing entry and the opening entry are
//! posted through C6 in their own transaction, matching the original's
//! "status flip, then several independent posts" shape rather than one
//! wrapping transaction (spec §9, "Closures atomicity").

use rust_decimal::Decimal;
use rusqlite::{Connection, OptionalExtension};

use crate::amount::from_cents;
use crate::error::{ErrorKind, LedgerError};
use crate::model::{Entry, Line, PostResult, StatementType};
use crate::repos::periods_repo::PeriodsRepoImpl;
use crate::services::{audit, posting};
use crate::storage::Storage;

/// Rateo: expense recognized before the supporting document arrives.
/// Dr expense_account, Cr payable_account.
pub struct AccrualItem {
    pub descrizione: String,
    pub date: String,
    pub expense_account: String,
    pub payable_account: String,
    pub amount: Decimal,
}

/// Risconto: an already-recorded cost deferred to a later period.
/// Dr prepaid_account, Cr expense_account.
pub struct DeferralItem {
    pub descrizione: String,
    pub date: String,
    pub prepaid_account: String,
    pub expense_account: String,
    pub amount: Decimal,
}

/// Ammortamento: one period's depreciation/amortization charge.
/// Dr amortization_expense_account, Cr asset_account.
pub struct AmortizationItem {
    pub descrizione: String,
    pub date: String,
    pub asset_account: String,
    pub amortization_expense_account: String,
    pub amount: Decimal,
}

struct PeriodRow {
    status: String,
    start_date: String,
    end_date: String,
}

struct AccountBalance {
    account_code: String,
    statement_type: StatementType,
    debit_side: bool,
    amount: Decimal,
}

/// Close a period: flip it to `closed`, post any explicit adjustments,
/// then close revenue/expense accounts to equity (spec §4.7).
pub fn close_period(
    storage: &Storage,
    year: &str,
    month: Option<&str>,
    user_id: &str,
    descrizione: &str,
    accruals: &[AccrualItem],
    deferrals: &[DeferralItem],
    amortizations: &[AmortizationItem],
) -> PostResult {
    let period = match storage.with_connection(|conn| find_period(conn, year, month)) {
        Ok(Some(p)) => p,
        Ok(None) => {
            return PostResult::single_failure(LedgerError::new(
                ErrorKind::NotFound,
                format!("period {year}-{} does not exist", month.unwrap_or("")),
            ))
        }
        Err(e) => return PostResult::single_failure(e),
    };

    if period.status == "closed" {
        return PostResult::single_failure(LedgerError::new(
            ErrorKind::PeriodClosed,
            format!("period {year}-{} already closed", month.unwrap_or("")),
        ));
    }
    if period.status == "finalized" {
        return PostResult::single_failure(LedgerError::new(
            ErrorKind::PeriodClosed,
            format!("period {year}-{} already finalized", month.unwrap_or("")),
        ));
    }

    let flipped = storage.transaction(|tx| -> Result<(), LedgerError> {
        tx.execute(
            "UPDATE periods SET status = 'closed' WHERE year = ?1 AND (month IS ?2 OR month = ?2)",
            rusqlite::params![year, month],
        )
        .map_err(|e| LedgerError::new(ErrorKind::DbError, format!("Sqlite: {e}")))?;
        Ok(())
    });
    if let Err(e) = flipped {
        return PostResult::single_failure(e);
    }

    for item in accruals {
        let entry = Entry::new(
            &item.date,
            &item.descrizione,
            vec![
                Line::debit(&item.expense_account, item.amount),
                Line::credit(&item.payable_account, item.amount),
            ],
        );
        posting::post(storage, &entry, user_id, Some("ADJ"), None);
    }
    for item in deferrals {
        let entry = Entry::new(
            &item.date,
            &item.descrizione,
            vec![
                Line::debit(&item.prepaid_account, item.amount),
                Line::credit(&item.expense_account, item.amount),
            ],
        );
        posting::post(storage, &entry, user_id, Some("ADJ"), None);
    }
    for item in amortizations {
        let entry = Entry::new(
            &item.date,
            &item.descrizione,
            vec![
                Line::debit(&item.amortization_expense_account, item.amount),
                Line::credit(&item.asset_account, item.amount),
            ],
        );
        posting::post(storage, &entry, user_id, Some("ADJ"), None);
    }

    let closing_result = post_income_closing_entry(storage, &period, user_id, descrizione);

    let audit_result = storage.with_connection(|conn| -> Result<(), LedgerError> {
        audit::log_action(
            conn,
            "CLOSE_PERIOD",
            user_id,
            serde_json::json!({
                "year": year,
                "month": month,
                "descrizione": descrizione,
                "period_start": period.start_date,
                "period_end": period.end_date,
            }),
            if closing_result.success { closing_result.entry_id } else { None },
        )
    });
    if let Err(e) = audit_result {
        return PostResult::single_failure(e);
    }

    closing_result
}

/// Transition a year's annual period to `finalized`; requires every
/// monthly row for that year to already be `closed` (spec §4.7).
pub fn finalize_year(storage: &Storage, year: &str, user_id: &str, descrizione: &str) -> PostResult {
    let months = storage.with_connection(|conn| PeriodsRepoImpl::new(conn).month_statuses_for_year(year));
    let months = match months {
        Ok(m) => m,
        Err(e) => return PostResult::single_failure(e),
    };
    if months.iter().any(|s| s.as_str() != "closed") {
        return PostResult::single_failure(LedgerError::new(
            ErrorKind::PeriodNotClosed,
            format!("year {year} cannot finalize: open or non-closed months remain"),
        ));
    }

    let updated = storage.transaction(|tx| -> Result<(), LedgerError> {
        tx.execute(
            "UPDATE periods SET status = 'finalized' WHERE year = ?1 AND month IS NULL",
            [year],
        )
        .map_err(|e| LedgerError::new(ErrorKind::DbError, format!("Sqlite: {e}")))?;
        Ok(())
    });
    if let Err(e) = updated {
        return PostResult::single_failure(e);
    }

    let audit_result = storage.with_connection(|conn| -> Result<(), LedgerError> {
        audit::log_action(
            conn,
            "FINALIZE_YEAR",
            user_id,
            serde_json::json!({"year": year, "descrizione": descrizione}),
            None,
        )
    });
    if let Err(e) = audit_result {
        return PostResult::single_failure(e);
    }

    PostResult::ok(None, None)
}

/// Ensure the annual row for `year` exists and is `open`, then post the
/// opening-balance entry carried forward from the previous (finalized)
/// year (spec §4.7).
pub fn open_new_period(storage: &Storage, year: &str, user_id: &str, descrizione: &str) -> PostResult {
    let prev_year = match year.parse::<i64>() {
        Ok(y) => (y - 1).to_string(),
        Err(_) => {
            return PostResult::single_failure(LedgerError::new(
                ErrorKind::InvalidInput,
                format!("invalid year: {year}"),
            ))
        }
    };

    let ensured = storage.transaction(|tx| -> Result<(), LedgerError> {
        tx.execute(
            "INSERT OR IGNORE INTO periods (year, month, start_date, end_date, status)
             VALUES (?1, NULL, ?1 || '-01-01', ?1 || '-12-31', 'open')",
            [year],
        )
        .map_err(|e| LedgerError::new(ErrorKind::DbError, format!("Sqlite: {e}")))?;
        Ok(())
    });
    if let Err(e) = ensured {
        return PostResult::single_failure(e);
    }

    let opening_result = post_opening_balance_entry(storage, &prev_year, year, user_id, descrizione);

    let audit_result = storage.with_connection(|conn| -> Result<(), LedgerError> {
        audit::log_action(
            conn,
            "OPEN_PERIOD",
            user_id,
            serde_json::json!({"year": year, "descrizione": descrizione}),
            if opening_result.success { opening_result.entry_id } else { None },
        )
    });
    if let Err(e) = audit_result {
        return PostResult::single_failure(e);
    }

    opening_result
}

fn post_income_closing_entry(storage: &Storage, period: &PeriodRow, user_id: &str, descrizione: &str) -> PostResult {
    let equity_account = storage.equity_account_code().to_string();
    let balances = match storage.with_connection(|conn| trial_balance(conn, &period.start_date, &period.end_date)) {
        Ok(b) => b,
        Err(e) => return PostResult::single_failure(e),
    };

    let mut lines = Vec::new();
    let mut debit_total = Decimal::ZERO;
    let mut credit_total = Decimal::ZERO;

    for bal in &balances {
        match bal.statement_type {
            StatementType::Revenue | StatementType::Expense => {}
            _ => continue,
        }
        if bal.amount.is_zero() {
            continue;
        }
        match (bal.statement_type, bal.debit_side) {
            (StatementType::Revenue, false) => {
                lines.push(Line::debit(&bal.account_code, bal.amount));
                debit_total += bal.amount;
            }
            (StatementType::Revenue, true) => {
                lines.push(Line::credit(&bal.account_code, bal.amount));
                credit_total += bal.amount;
            }
            (StatementType::Expense, true) => {
                lines.push(Line::credit(&bal.account_code, bal.amount));
                credit_total += bal.amount;
            }
            (StatementType::Expense, false) => {
                lines.push(Line::debit(&bal.account_code, bal.amount));
                debit_total += bal.amount;
            }
            _ => unreachable!(),
        }
    }

    if debit_total > credit_total {
        lines.push(Line::credit(&equity_account, debit_total - credit_total));
    } else if credit_total > debit_total {
        lines.push(Line::debit(&equity_account, credit_total - debit_total));
    }

    if lines.is_empty() {
        return PostResult::ok(None, None);
    }

    let entry = Entry::new(&period.end_date, descrizione, lines);
    posting::post(storage, &entry, user_id, Some("CLOSE"), None)
}

fn post_opening_balance_entry(
    storage: &Storage,
    prev_year: &str,
    year: &str,
    user_id: &str,
    descrizione: &str,
) -> PostResult {
    let prev_period = match storage.with_connection(|conn| find_period(conn, prev_year, None)) {
        Ok(Some(p)) => p,
        Ok(None) => {
            return PostResult::single_failure(LedgerError::new(
                ErrorKind::NotFound,
                format!("previous year {prev_year} not found"),
            ))
        }
        Err(e) => return PostResult::single_failure(e),
    };
    if prev_period.status != "finalized" {
        return PostResult::single_failure(LedgerError::new(
            ErrorKind::PeriodNotClosed,
            format!("previous year {prev_year} is not finalized"),
        ));
    }

    let balances = match storage.with_connection(|conn| trial_balance(conn, &prev_period.start_date, &prev_period.end_date)) {
        Ok(b) => b,
        Err(e) => return PostResult::single_failure(e),
    };

    let mut lines = Vec::new();
    let mut debit_total = Decimal::ZERO;
    let mut credit_total = Decimal::ZERO;

    for bal in &balances {
        match bal.statement_type {
            StatementType::Asset | StatementType::Liability | StatementType::Equity => {}
            _ => continue,
        }
        if bal.amount.is_zero() {
            continue;
        }
        if bal.debit_side {
            lines.push(Line::debit(&bal.account_code, bal.amount));
            debit_total += bal.amount;
        } else {
            lines.push(Line::credit(&bal.account_code, bal.amount));
            credit_total += bal.amount;
        }
    }

    if debit_total != credit_total {
        return PostResult::single_failure(LedgerError::new(
            ErrorKind::Unbalanced,
            format!("opening balance not balanced: dare={debit_total}, avere={credit_total}"),
        ));
    }

    if lines.is_empty() {
        return PostResult::ok(None, None);
    }

    let entry = Entry::new(format!("{year}-01-01"), descrizione, lines);
    posting::post(storage, &entry, user_id, Some("OPEN"), None)
}

fn find_period(conn: &Connection, year: &str, month: Option<&str>) -> Result<Option<PeriodRow>, LedgerError> {
    conn.query_row(
        "SELECT status, start_date, end_date FROM periods WHERE year = ?1 AND (month IS ?2 OR month = ?2)",
        rusqlite::params![year, month],
        |row| {
            Ok(PeriodRow {
                status: row.get(0)?,
                start_date: row.get(1)?,
                end_date: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| LedgerError::new(ErrorKind::DbError, format!("Sqlite: {e}")))
}

/// Net balance per account over `[start_date, end_date]` inclusive, by
/// posted-entry date. Accounts with no activity in the window do not
/// appear (spec §4.7: "compute a trial balance").
fn trial_balance(conn: &Connection, start_date: &str, end_date: &str) -> Result<Vec<AccountBalance>, LedgerError> {
    let mut stmt = conn
        .prepare(
            "SELECT a.code, a.statement_type,
                    COALESCE(SUM(el.dare_cents), 0) AS dare_cents,
                    COALESCE(SUM(el.avere_cents), 0) AS avere_cents
             FROM accounts a
             JOIN entry_lines el ON el.account_code = a.code
             JOIN entries e ON e.id = el.entry_id
             WHERE e.date BETWEEN ?1 AND ?2
             GROUP BY a.code, a.statement_type",
        )
        .map_err(db_error)?;

    let rows = stmt
        .query_map(rusqlite::params![start_date, end_date], |row| {
            let code: String = row.get(0)?;
            let statement_type: String = row.get(1)?;
            let dare_cents: i64 = row.get(2)?;
            let avere_cents: i64 = row.get(3)?;
            Ok((code, statement_type, dare_cents, avere_cents))
        })
        .map_err(db_error)?;

    let mut out = Vec::new();
    for r in rows {
        let (code, statement_type, dare_cents, avere_cents) = r.map_err(db_error)?;
        let statement_type = StatementType::from_str(&statement_type)
            .ok_or_else(|| LedgerError::new(ErrorKind::DbError, format!("unknown statement_type {statement_type}")))?;
        let dare = from_cents(dare_cents);
        let avere = from_cents(avere_cents);

        let natural_debit = matches!(statement_type, StatementType::Asset | StatementType::Expense);
        let net = if natural_debit { dare - avere } else { avere - dare };
        let (debit_side, amount) = if net >= Decimal::ZERO {
            (natural_debit, net)
        } else {
            (!natural_debit, -net)
        };

        out.push(AccountBalance {
            account_code: code,
            statement_type,
            debit_side,
            amount,
        });
    }
    Ok(out)
}

fn db_error(e: rusqlite::Error) -> LedgerError {
    LedgerError::new(ErrorKind::DbError, format!("Sqlite: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Line as L, StatementType as ST};
    use crate::storage::{SeedAccount, Storage};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn fresh_storage() -> Storage {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .initialize(&[
                SeedAccount { code: "1000", name: "Cash", statement_type: ST::Asset },
                SeedAccount { code: "4100", name: "Sales", statement_type: ST::Revenue },
                SeedAccount { code: "6100", name: "Rent expense", statement_type: ST::Expense },
                SeedAccount { code: "9999", name: "Retained earnings", statement_type: ST::Equity },
            ])
            .unwrap();
        storage
            .insert_period("2025", Some("2025-01"), "2025-01-01", "2025-01-31", "open")
            .unwrap();
        storage
            .insert_period("2025", None, "2025-01-01", "2025-12-31", "open")
            .unwrap();
        storage
    }

    #[test]
    fn close_period_zeroes_revenue_and_expense_into_equity() {
        let storage = fresh_storage();
        let sale = Entry::new("2025-01-10", "sale", vec![L::debit("1000", d("1000")), L::credit("4100", d("1000"))]);
        posting::post(&storage, &sale, "alice", None, None);
        let rent = Entry::new("2025-01-12", "rent", vec![L::debit("6100", d("400")), L::credit("1000", d("400"))]);
        posting::post(&storage, &rent, "alice", None, None);

        let result = close_period(&storage, "2025", Some("2025-01"), "alice", "Chiusura gennaio", &[], &[], &[]);
        assert!(result.success);
        assert!(result.entry_id.is_some());
    }

    #[test]
    fn close_period_on_already_closed_period_is_rejected() {
        let storage = fresh_storage();
        close_period(&storage, "2025", Some("2025-01"), "alice", "x", &[], &[], &[]);
        let second = close_period(&storage, "2025", Some("2025-01"), "alice", "x", &[], &[], &[]);
        assert!(!second.success);
        assert!(second.error_details.iter().any(|e| e.kind == ErrorKind::PeriodClosed));
    }

    #[test]
    fn finalize_year_requires_all_months_closed() {
        let storage = fresh_storage();
        let result = finalize_year(&storage, "2025", "alice", "x");
        assert!(!result.success);
        assert!(result.error_details.iter().any(|e| e.kind == ErrorKind::PeriodNotClosed));
    }

    #[test]
    fn finalize_year_succeeds_once_month_is_closed() {
        let storage = fresh_storage();
        close_period(&storage, "2025", Some("2025-01"), "alice", "x", &[], &[], &[]);
        let result = finalize_year(&storage, "2025", "alice", "x");
        assert!(result.success);
    }

    #[test]
    fn open_new_period_requires_previous_year_finalized() {
        let storage = fresh_storage();
        let result = open_new_period(&storage, "2026", "alice", "x");
        assert!(!result.success);
        assert!(result
            .error_details
            .iter()
            .any(|e| e.kind == ErrorKind::NotFound || e.kind == ErrorKind::PeriodNotClosed));
    }

    #[test]
    fn open_new_period_carries_forward_balance_sheet_accounts() {
        let storage = fresh_storage();
        let capital = Entry::new("2025-01-01", "capitale", vec![L::debit("1000", d("5000")), L::credit("9999", d("5000"))]);
        posting::post(&storage, &capital, "alice", None, None);

        close_period(&storage, "2025", Some("2025-01"), "alice", "x", &[], &[], &[]);
        finalize_year(&storage, "2025", "alice", "x");

        let result = open_new_period(&storage, "2026", "alice", "apertura");
        assert!(result.success);
        assert!(result.entry_id.is_some());
    }
}
