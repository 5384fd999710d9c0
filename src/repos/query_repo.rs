//! Read-only reconstruction of stored entries (C10).
//!
//! Grounded on `original_source/services/ledger_query_repo.py`
//! (`get_entry`, `get_entry_lines`, `build_reversal`).

use rusqlite::Connection;

use crate::amount::from_cents;
use crate::error::{ErrorKind, LedgerError};
use crate::model::{Entry, Line, PostedEntry, StoredLine};
use std::str::FromStr;

pub struct QueryRepoImpl<'a> {
    conn: &'a Connection,
}

impl<'a> QueryRepoImpl<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get_entry(&self, entry_id: i64) -> Result<Option<PostedEntry>, LedgerError> {
        let header = self.conn.query_row(
            "SELECT id, date, document, document_date, party, description,
                    taxable_amount, vat_rate, vat_amount, reversal_of
             FROM entries WHERE id = ?1",
            [entry_id],
            |row| {
                let taxable: Option<String> = row.get(6)?;
                let rate: Option<String> = row.get(7)?;
                let amount: Option<String> = row.get(8)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    taxable,
                    rate,
                    amount,
                    row.get::<_, Option<i64>>(9)?,
                ))
            },
        );

        let (id, date, documento, document_date, party, descrizione, taxable, rate, amount, reversal_of) =
            match header {
                Ok(row) => row,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(db_error(e)),
            };

        let lines = self.get_entry_lines(entry_id)?;

        Ok(Some(PostedEntry {
            id,
            date,
            descrizione: descrizione.unwrap_or_default(),
            lines,
            documento,
            document_date,
            cliente_fornitore: party,
            taxable_amount: taxable.map(|s| rust_decimal::Decimal::from_str(&s).unwrap_or_default()),
            vat_rate: rate.map(|s| rust_decimal::Decimal::from_str(&s).unwrap_or_default()),
            vat_amount: amount.map(|s| rust_decimal::Decimal::from_str(&s).unwrap_or_default()),
            reversal_of,
        }))
    }

    pub fn get_entry_lines(&self, entry_id: i64) -> Result<Vec<StoredLine>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT account_code, dare_cents, avere_cents FROM entry_lines WHERE entry_id = ?1")
            .map_err(db_error)?;
        let rows = stmt
            .query_map([entry_id], |row| {
                let account_code: String = row.get(0)?;
                let dare_cents: i64 = row.get(1)?;
                let avere_cents: i64 = row.get(2)?;
                Ok((account_code, dare_cents, avere_cents))
            })
            .map_err(db_error)?;

        let mut lines = Vec::new();
        for r in rows {
            let (account_code, dare_cents, avere_cents) = r.map_err(db_error)?;
            lines.push(StoredLine {
                account_code,
                dare: if dare_cents != 0 { Some(from_cents(dare_cents)) } else { None },
                avere: if avere_cents != 0 { Some(from_cents(avere_cents)) } else { None },
            });
        }
        Ok(lines)
    }

    /// Build (but do not post) a reversing entry: dare/avere swapped per
    /// line, doc/party/VAT metadata copied, `reversal_of` set (spec §4.6,
    /// §4.8).
    pub fn build_reversal(
        &self,
        original_entry_id: i64,
        date: &str,
        descrizione: &str,
    ) -> Result<Option<Entry>, LedgerError> {
        let Some(original) = self.get_entry(original_entry_id)? else {
            return Ok(None);
        };

        let lines = original
            .lines
            .iter()
            .map(|l| Line {
                account_code: l.account_code.clone(),
                dare: l.avere.unwrap_or_default(),
                avere: l.dare.unwrap_or_default(),
            })
            .collect();

        Ok(Some(Entry {
            date: date.to_string(),
            descrizione: descrizione.to_string(),
            lines,
            documento: original.documento,
            document_date: original.document_date,
            cliente_fornitore: original.cliente_fornitore,
            reversal_of: Some(original_entry_id),
            client_reference_id: None,
            taxable_amount: original.taxable_amount,
            vat_rate: original.vat_rate,
            vat_amount: original.vat_amount,
            protocol_series: None,
        }))
    }
}

fn db_error(e: rusqlite::Error) -> LedgerError {
    LedgerError::new(ErrorKind::DbError, format!("Sqlite: {e}"))
}
