// 📊 Reporting - daily sheets, date-range reports, CSV export
//
// All "by day" and "date range" semantics use UTC day boundaries; see the
// bounds helpers in the transaction log.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::io::Write;

use crate::db::parse_utc;
use crate::transactions::{day_bounds, range_bounds};

// ============================================================================
// REPORT ENTRY
// ============================================================================

/// One transaction row decorated with its account's name and school.
///
/// The account fields are optional: a row can outlive its join partner only
/// transiently (cascade deletion removes rows first), but the report never
/// fails on it.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub transaction_id: String,
    pub account_id: String,
    pub full_name: Option<String>,
    pub school: Option<String>,
    pub service: String,
    pub amount: i64,
    pub new_balance: i64,
    pub attended_by: String,
    pub department: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate line of a department summary.
#[derive(Debug, Clone, Serialize)]
pub struct DepartmentTotal {
    pub department: String,
    pub transaction_count: i64,
    pub total_amount: i64,
}

const ENTRY_SELECT: &str = "SELECT t.id, t.account_id, a.full_name, a.school,
            t.service, t.amount, t.new_balance, t.attended_by, t.department, t.created_at
     FROM transactions t
     LEFT JOIN accounts a ON a.id = t.account_id";

fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<ReportEntry> {
    let created_at: String = row.get(9)?;

    Ok(ReportEntry {
        transaction_id: row.get(0)?,
        account_id: row.get(1)?,
        full_name: row.get(2)?,
        school: row.get(3)?,
        service: row.get(4)?,
        amount: row.get(5)?,
        new_balance: row.get(6)?,
        attended_by: row.get(7)?,
        department: row.get(8)?,
        created_at: parse_utc(&created_at)?,
    })
}

// ============================================================================
// QUERIES
// ============================================================================

/// All transactions of one UTC calendar day, newest first.
pub fn transactions_by_day(conn: &Connection, date: NaiveDate) -> rusqlite::Result<Vec<ReportEntry>> {
    let (start_at, end_before) = day_bounds(date);

    let mut stmt = conn.prepare(&format!(
        "{ENTRY_SELECT}
         WHERE t.created_at >= ?1 AND t.created_at < ?2
         ORDER BY t.created_at DESC"
    ))?;

    let entries = stmt
        .query_map(params![start_at, end_before], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

/// Date-range report (both ends inclusive, UTC days), optionally filtered to
/// one department, newest first.
pub fn report(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
    department: Option<&str>,
) -> rusqlite::Result<Vec<ReportEntry>> {
    let (start_at, end_before) = range_bounds(start, end);

    let entries = match department {
        Some(department) => {
            let mut stmt = conn.prepare(&format!(
                "{ENTRY_SELECT}
                 WHERE t.created_at >= ?1 AND t.created_at < ?2 AND t.department = ?3
                 ORDER BY t.created_at DESC"
            ))?;
            let rows = stmt
                .query_map(params![start_at, end_before, department], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "{ENTRY_SELECT}
                 WHERE t.created_at >= ?1 AND t.created_at < ?2
                 ORDER BY t.created_at DESC"
            ))?;
            let rows = stmt
                .query_map(params![start_at, end_before], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };

    Ok(entries)
}

/// Per-department transaction counts and totals over a date range.
pub fn department_totals(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
) -> rusqlite::Result<Vec<DepartmentTotal>> {
    let (start_at, end_before) = range_bounds(start, end);

    let mut stmt = conn.prepare(
        "SELECT department, COUNT(*) as count, SUM(amount) as total
         FROM transactions
         WHERE created_at >= ?1 AND created_at < ?2
         GROUP BY department
         ORDER BY department",
    )?;

    let totals = stmt
        .query_map(params![start_at, end_before], |row| {
            Ok(DepartmentTotal {
                department: row.get(0)?,
                transaction_count: row.get(1)?,
                total_amount: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(totals)
}

// ============================================================================
// CSV EXPORT
// ============================================================================

/// Write report entries as CSV. Amounts are emitted in cents.
pub fn write_report_csv<W: Write>(entries: &[ReportEntry], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record([
        "date",
        "full_name",
        "school",
        "service",
        "amount_cents",
        "new_balance_cents",
        "attended_by",
        "department",
    ])?;

    for entry in entries {
        wtr.write_record([
            entry.created_at.to_rfc3339().as_str(),
            entry.full_name.as_deref().unwrap_or(""),
            entry.school.as_deref().unwrap_or(""),
            entry.service.as_str(),
            entry.amount.to_string().as_str(),
            entry.new_balance.to_string().as_str(),
            entry.attended_by.as_str(),
            entry.department.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{insert_account, Account};
    use crate::config::LedgerConfig;
    use crate::db::setup_database;
    use crate::transactions::{insert_transaction, Transaction};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn seed_account(conn: &Connection, name: &str, external_id: &str) -> Account {
        let account = Account::new(
            name.to_string(),
            external_id.to_string(),
            None,
            "900".to_string(),
            "Escola Central".to_string(),
            50_000,
        );
        insert_account(conn, &account).unwrap();
        account
    }

    fn seed_tx(
        conn: &Connection,
        account_id: &str,
        service: &str,
        department: &str,
        amount: i64,
        at: DateTime<Utc>,
    ) {
        let tx = Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            service: service.to_string(),
            amount,
            new_balance: 50_000 - amount,
            attended_by: "Nurse Silva".to_string(),
            department: department.to_string(),
            created_at: at,
        };
        insert_transaction(conn, &tx, &LedgerConfig::with_secret("s")).unwrap();
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_by_day_uses_utc_boundaries() {
        let conn = test_conn();
        let account = seed_account(&conn, "Ana Martins", "BI-001");

        seed_tx(&conn, &account.id, "INV-1", "Pharmacy", 100, at(2026, 4, 9, 23));
        seed_tx(&conn, &account.id, "INV-2", "Pharmacy", 200, at(2026, 4, 10, 0));
        seed_tx(&conn, &account.id, "INV-3", "Pharmacy", 300, at(2026, 4, 10, 23));
        seed_tx(&conn, &account.id, "INV-4", "Pharmacy", 400, at(2026, 4, 11, 0));

        let day = transactions_by_day(&conn, NaiveDate::from_ymd_opt(2026, 4, 10).unwrap()).unwrap();
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].service, "INV-3");
        assert_eq!(day[1].service, "INV-2");
        assert_eq!(day[0].full_name.as_deref(), Some("Ana Martins"));
    }

    #[test]
    fn test_report_filters_by_department() {
        let conn = test_conn();
        let account = seed_account(&conn, "Ana Martins", "BI-001");

        seed_tx(&conn, &account.id, "INV-1", "Pharmacy", 100, at(2026, 4, 10, 9));
        seed_tx(&conn, &account.id, "INV-2", "Medical Center", 200, at(2026, 4, 10, 10));
        seed_tx(&conn, &account.id, "INV-3", "Pharmacy", 300, at(2026, 4, 12, 11));

        let start = NaiveDate::from_ymd_opt(2026, 4, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 4, 12).unwrap();

        let all = report(&conn, start, end, None).unwrap();
        assert_eq!(all.len(), 3);

        let pharmacy = report(&conn, start, end, Some("Pharmacy")).unwrap();
        assert_eq!(pharmacy.len(), 2);
        assert!(pharmacy.iter().all(|e| e.department == "Pharmacy"));
    }

    #[test]
    fn test_department_totals() {
        let conn = test_conn();
        let account = seed_account(&conn, "Ana Martins", "BI-001");

        seed_tx(&conn, &account.id, "INV-1", "Pharmacy", 100, at(2026, 4, 10, 9));
        seed_tx(&conn, &account.id, "INV-2", "Pharmacy", 250, at(2026, 4, 10, 10));
        seed_tx(&conn, &account.id, "INV-3", "Medical Center", 300, at(2026, 4, 10, 11));

        let start = NaiveDate::from_ymd_opt(2026, 4, 10).unwrap();
        let totals = department_totals(&conn, start, start).unwrap();

        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].department, "Medical Center");
        assert_eq!(totals[0].total_amount, 300);
        assert_eq!(totals[1].department, "Pharmacy");
        assert_eq!(totals[1].transaction_count, 2);
        assert_eq!(totals[1].total_amount, 350);
    }

    #[test]
    fn test_csv_export() {
        let conn = test_conn();
        let account = seed_account(&conn, "Ana Martins", "BI-001");
        seed_tx(&conn, &account.id, "INV-1", "Pharmacy", 2_500, at(2026, 4, 10, 9));

        let start = NaiveDate::from_ymd_opt(2026, 4, 10).unwrap();
        let entries = report(&conn, start, start, None).unwrap();

        let mut buf = Vec::new();
        write_report_csv(&entries, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();

        let mut lines = out.lines();
        assert!(lines.next().unwrap().starts_with("date,full_name"));
        let row = lines.next().unwrap();
        assert!(row.contains("Ana Martins"));
        assert!(row.contains("INV-1"));
        assert!(row.contains("2500"));
    }
}
