// Transaction Log - append-mostly store of billed service events
//
// Rows are written and removed only inside an atomic unit owned by the
// ledger core. A row is never updated in place; new_balance stays the
// snapshot taken at creation time.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::db::parse_utc;
use crate::error::{LedgerError, LedgerResult};

// ============================================================================
// TRANSACTION RECORD
// ============================================================================

/// One billed service event debiting an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable identity (UUID)
    pub id: String,

    /// Owning account, by id only (non-owning back-reference)
    pub account_id: String,

    /// Service/invoice identifier; duplicate key together with account_id
    pub service: String,

    /// Debit amount in cents, always positive
    pub amount: i64,

    /// Account balance immediately after this transaction was applied.
    /// A point-in-time fact; later operations never recompute it.
    pub new_balance: i64,

    /// Recorded handling agent, display only
    pub attended_by: String,

    pub department: String,

    /// Commit timestamp, UTC. Immutable; drives the retention window.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Age of this transaction in whole days at `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }
}

// ============================================================================
// ROW ACCESS
// ============================================================================

const TRANSACTION_COLUMNS: &str =
    "id, account_id, service, amount, new_balance, attended_by, department, created_at";

fn transaction_from_row(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let created_at: String = row.get(7)?;

    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        service: row.get(2)?,
        amount: row.get(3)?,
        new_balance: row.get(4)?,
        attended_by: row.get(5)?,
        department: row.get(6)?,
        created_at: parse_utc(&created_at)?,
    })
}

/// Insert a transaction row. Must run inside an open transaction; the caller
/// owns atomicity. The department is validated here against the configured
/// set, so an out-of-set value aborts the whole unit.
pub fn insert_transaction(
    conn: &Connection,
    tx: &Transaction,
    config: &LedgerConfig,
) -> LedgerResult<()> {
    if !config.is_known_department(&tx.department) {
        return Err(LedgerError::InvalidCategory(tx.department.clone()));
    }

    conn.execute(
        "INSERT INTO transactions (id, account_id, service, amount, new_balance, attended_by, department, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            tx.id,
            tx.account_id,
            tx.service,
            tx.amount,
            tx.new_balance,
            tx.attended_by,
            tx.department,
            tx.created_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

pub fn get_transaction(conn: &Connection, id: &str) -> rusqlite::Result<Option<Transaction>> {
    conn.query_row(
        &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
        params![id],
        transaction_from_row,
    )
    .optional()
}

/// Probe for a live transaction billing the same (account, service) pair.
/// The service string is compared exactly, untrimmed.
pub fn find_by_account_and_service(
    conn: &Connection,
    account_id: &str,
    service: &str,
) -> rusqlite::Result<Option<Transaction>> {
    conn.query_row(
        &format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE account_id = ?1 AND service = ?2
             LIMIT 1"
        ),
        params![account_id, service],
        transaction_from_row,
    )
    .optional()
}

/// Remove a transaction row. Must run inside an open transaction.
pub fn delete_transaction_row(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM transactions WHERE id = ?1", params![id])
}

/// Remove every transaction referencing an account (cascade path).
pub fn delete_all_for_account(conn: &Connection, account_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM transactions WHERE account_id = ?1",
        params![account_id],
    )
}

/// Per-account history, newest first, optionally clamped to a UTC date range
/// (both ends inclusive).
pub fn history_for_account(
    conn: &Connection,
    account_id: &str,
    range: Option<(NaiveDate, NaiveDate)>,
) -> rusqlite::Result<Vec<Transaction>> {
    match range {
        Some((start, end)) => {
            let (start_at, end_before) = range_bounds(start, end);
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE account_id = ?1 AND created_at >= ?2 AND created_at < ?3
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map(params![account_id, start_at, end_before], transaction_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE account_id = ?1
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map(params![account_id], transaction_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
    }
}

/// Sum of live transaction amounts for an account.
pub fn sum_amounts_for_account(conn: &Connection, account_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE account_id = ?1",
        params![account_id],
        |row| row.get(0),
    )
}

// ============================================================================
// UTC DAY BOUNDARIES
// ============================================================================

// Day semantics are UTC throughout: a "day" is [00:00:00Z, next day 00:00:00Z).
// RFC 3339 UTC strings compare lexicographically, so the bounds are passed as
// strings straight into the SQL comparison.

pub(crate) fn day_bounds(date: NaiveDate) -> (String, String) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    let end = start + Duration::days(1);
    (start.to_rfc3339(), end.to_rfc3339())
}

pub(crate) fn range_bounds(start: NaiveDate, end: NaiveDate) -> (String, String) {
    let start_at = start.and_time(NaiveTime::MIN).and_utc();
    let end_before = end.and_time(NaiveTime::MIN).and_utc() + Duration::days(1);
    (start_at.to_rfc3339(), end_before.to_rfc3339())
}

// ============================================================================
// TESTS
// ============================================================================
