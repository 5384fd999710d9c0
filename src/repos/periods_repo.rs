//! Periods repository: period lookup and the "is this date open" check
//! consumed by the validator and closures engine.
//!
//! Grounded on `original_source/kernel/validator_adapter.py::PeriodsRepoDB`
//! and `closures_service.py`'s raw `periods` queries; teacher's
//! `repos/period_repo.rs` for the struct/error shape.

use rusqlite::Connection;

use crate::error::{ErrorKind, LedgerError};
use crate::model::{Period, PeriodStatus};
use crate::validation::PeriodsRepo;

pub struct PeriodsRepoImpl<'a> {
    conn: &'a Connection,
}

impl<'a> PeriodsRepoImpl<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// The finest covering period for a date: prefer a month row over
    /// the annual row if both exist (spec §3: "a date belongs to the
    /// finest covering period").
    pub fn find_covering(&self, iso_date: &str) -> Result<Option<Period>, LedgerError> {
        let year = &iso_date[0..4];
        let month_row = self.conn.query_row(
            "SELECT year, month, start_date, end_date, status FROM periods
             WHERE year = ?1 AND month IS NOT NULL AND ?2 BETWEEN start_date AND end_date",
            rusqlite::params![year, iso_date],
            row_to_period,
        );
        match month_row {
            Ok(p) => return Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(db_error(e)),
        }
        let year_row = self.conn.query_row(
            "SELECT year, month, start_date, end_date, status FROM periods
             WHERE year = ?1 AND month IS NULL AND ?2 BETWEEN start_date AND end_date",
            rusqlite::params![year, iso_date],
            row_to_period,
        );
        match year_row {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_error(e)),
        }
    }

    pub fn find_by_year(&self, year: &str) -> Result<Option<Period>, LedgerError> {
        self.conn
            .query_row(
                "SELECT year, month, start_date, end_date, status FROM periods
                 WHERE year = ?1 AND month IS NULL",
                [year],
                row_to_period,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_error(other)),
            })
    }

    pub fn month_statuses_for_year(&self, year: &str) -> Result<Vec<PeriodStatus>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT status FROM periods WHERE year = ?1 AND month IS NOT NULL")
            .map_err(db_error)?;
        let rows = stmt
            .query_map([year], |row| row.get::<_, String>(0))
            .map_err(db_error)?;
        let mut out = Vec::new();
        for r in rows {
            let s = r.map_err(db_error)?;
            out.push(PeriodStatus::from_str(&s).unwrap_or(PeriodStatus::Open));
        }
        Ok(out)
    }
}

fn row_to_period(row: &rusqlite::Row) -> rusqlite::Result<Period> {
    let status: String = row.get(4)?;
    Ok(Period {
        year: row.get(0)?,
        month: row.get(1)?,
        start_date: row.get(2)?,
        end_date: row.get(3)?,
        status: PeriodStatus::from_str(&status).unwrap_or(PeriodStatus::Open),
    })
}

impl<'a> PeriodsRepo for PeriodsRepoImpl<'a> {
    fn is_open_by_date(&self, iso_date: &str) -> Result<bool, LedgerError> {
        match self.find_covering(iso_date)? {
            // "Open" is defined by absence of any closed/finalized period
            // covering the date (spec §4.2 rule 4).
            Some(period) => Ok(period.status == PeriodStatus::Open),
            None => Ok(true),
        }
    }
}

fn db_error(e: rusqlite::Error) -> LedgerError {
    LedgerError::new(ErrorKind::DbError, format!("Sqlite: {e}"))
}
