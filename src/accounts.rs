// 🧑‍⚕️ Account Store - patient/student records with a running balance
//
// Row-level access only. Balance movement is the ledger core's job; this
// module exposes `apply_balance_delta` for use inside an open transaction
// and never exposes a direct balance setter.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::parse_utc;
use crate::error::{LedgerError, LedgerResult};

// ============================================================================
// ACCOUNT RECORD
// ============================================================================

/// A patient/student billing record.
///
/// Identity: UUID string, never changes. `balance` is integer cents and is
/// written only by the ledger core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Stable identity (UUID)
    pub id: String,

    pub full_name: String,

    /// Unique external id number (the B.I./student number)
    pub external_id: String,

    pub date_of_birth: Option<NaiveDate>,

    pub phone: String,

    /// Affiliated organization
    pub school: String,

    /// Current balance in cents. Signed; privileged debits may go negative.
    pub balance: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account record with a fresh UUID.
    pub fn new(
        full_name: String,
        external_id: String,
        date_of_birth: Option<NaiveDate>,
        phone: String,
        school: String,
        initial_balance: i64,
    ) -> Self {
        let now = Utc::now();

        Account {
            id: uuid::Uuid::new_v4().to_string(),
            full_name,
            external_id,
            date_of_birth,
            phone,
            school,
            balance: initial_balance,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// FIELD PATCH
// ============================================================================

/// Partial update of an account's descriptive fields.
///
/// `balance` is deliberately absent: all balance movement flows through the
/// ledger core's create/delete operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPatch {
    pub full_name: Option<String>,
    pub external_id: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    pub school: Option<String>,
}

impl AccountPatch {
    /// Build a patch from a caller-supplied JSON object.
    ///
    /// Rejects `balance` and `id` keys before deserializing; the rest of the
    /// object is treated as an ordinary field patch, unknown keys ignored.
    pub fn from_json(value: serde_json::Value) -> LedgerResult<Self> {
        if let Some(map) = value.as_object() {
            if map.contains_key("balance") {
                return Err(LedgerError::ImmutableField("balance"));
            }
            if map.contains_key("id") {
                return Err(LedgerError::ImmutableField("id"));
            }
        }

        serde_json::from_value(value)
            .map_err(|e| LedgerError::ConflictCommitFailure(format!("bad patch payload: {e}")))
    }

    /// Apply this patch to an account in memory.
    pub fn apply_to(&self, account: &mut Account) {
        if let Some(full_name) = &self.full_name {
            account.full_name = full_name.clone();
        }
        if let Some(external_id) = &self.external_id {
            account.external_id = external_id.clone();
        }
        if let Some(dob) = self.date_of_birth {
            account.date_of_birth = Some(dob);
        }
        if let Some(phone) = &self.phone {
            account.phone = phone.clone();
        }
        if let Some(school) = &self.school {
            account.school = school.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.external_id.is_none()
            && self.date_of_birth.is_none()
            && self.phone.is_none()
            && self.school.is_none()
    }
}

// ============================================================================
// ROW ACCESS
// ============================================================================

const ACCOUNT_COLUMNS: &str =
    "id, full_name, external_id, date_of_birth, phone, school, balance, created_at, updated_at";

fn account_from_row(row: &rusqlite::Row) -> rusqlite::Result<Account> {
    let dob: Option<String> = row.get(3)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Account {
        id: row.get(0)?,
        full_name: row.get(1)?,
        external_id: row.get(2)?,
        date_of_birth: dob
            .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
            .transpose()
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        phone: row.get(4)?,
        school: row.get(5)?,
        balance: row.get(6)?,
        created_at: parse_utc(&created_at)?,
        updated_at: parse_utc(&updated_at)?,
    })
}

pub fn insert_account(conn: &Connection, account: &Account) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO accounts (id, full_name, external_id, date_of_birth, phone, school, balance, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            account.id,
            account.full_name,
            account.external_id,
            account.date_of_birth.map(|d| d.to_string()),
            account.phone,
            account.school,
            account.balance,
            account.created_at.to_rfc3339(),
            account.updated_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

pub fn get_account(conn: &Connection, id: &str) -> rusqlite::Result<Option<Account>> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
        params![id],
        account_from_row,
    )
    .optional()
}

pub fn find_by_external_id(conn: &Connection, external_id: &str) -> rusqlite::Result<Option<Account>> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE external_id = ?1"),
        params![external_id],
        account_from_row,
    )
    .optional()
}

/// Find an account by exact full name, case-insensitive.
pub fn search_by_name(conn: &Connection, full_name: &str) -> rusqlite::Result<Option<Account>> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE full_name = ?1 COLLATE NOCASE"),
        params![full_name],
        account_from_row,
    )
    .optional()
}

/// Name suggestions for a partial search term. At most 10 results,
/// substring match, case-insensitive.
pub fn autocomplete_names(conn: &Connection, term: &str) -> rusqlite::Result<Vec<(String, String)>> {
    if term.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT id, full_name FROM accounts
         WHERE full_name LIKE '%' || ?1 || '%'
         ORDER BY full_name
         LIMIT 10",
    )?;

    let names = stmt
        .query_map(params![term], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(names)
}

pub fn count_active(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))
}

/// Shift an account's balance by `delta` cents. Must run inside an open
/// transaction; the caller owns atomicity. Returns the number of rows
/// touched (0 when the account no longer exists).
pub fn apply_balance_delta(conn: &Connection, id: &str, delta: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE accounts SET balance = balance + ?1, updated_at = ?2 WHERE id = ?3",
        params![delta, Utc::now().to_rfc3339(), id],
    )
}

/// Persist an account's descriptive fields and balance snapshot.
pub fn update_account_row(conn: &Connection, account: &Account) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE accounts
         SET full_name = ?1, external_id = ?2, date_of_birth = ?3,
             phone = ?4, school = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            account.full_name,
            account.external_id,
            account.date_of_birth.map(|d| d.to_string()),
            account.phone,
            account.school,
            account.updated_at.to_rfc3339(),
            account.id,
        ],
    )
}

pub fn delete_account_row(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])
}

pub fn list_accounts(conn: &Connection) -> rusqlite::Result<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY full_name"
    ))?;

    let accounts = stmt
        .query_map([], account_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(accounts)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn sample_account(name: &str, external_id: &str) -> Account {
        Account::new(
            name.to_string(),
            external_id.to_string(),
            NaiveDate::from_ymd_opt(2004, 5, 17),
            "+244 900 000 000".to_string(),
            "Escola Central".to_string(),
            10_000,
        )
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let conn = test_conn();
        let account = sample_account("Ana Martins", "BI-001");
        insert_account(&conn, &account).unwrap();

        let loaded = get_account(&conn, &account.id).unwrap().unwrap();
        assert_eq!(loaded.full_name, "Ana Martins");
        assert_eq!(loaded.external_id, "BI-001");
        assert_eq!(loaded.balance, 10_000);
        assert_eq!(loaded.date_of_birth, NaiveDate::from_ymd_opt(2004, 5, 17));
    }

    #[test]
    fn test_get_missing_account_is_none() {
        let conn = test_conn();
        assert!(get_account(&conn, "no-such-id").unwrap().is_none());
    }

    #[test]
    fn test_find_by_external_id() {
        let conn = test_conn();
        let account = sample_account("Ana Martins", "BI-001");
        insert_account(&conn, &account).unwrap();

        let found = find_by_external_id(&conn, "BI-001").unwrap();
        assert_eq!(found.unwrap().id, account.id);

        assert!(find_by_external_id(&conn, "BI-999").unwrap().is_none());
    }

    #[test]
    fn test_search_by_name_is_case_insensitive() {
        let conn = test_conn();
        insert_account(&conn, &sample_account("Ana Martins", "BI-001")).unwrap();

        assert!(search_by_name(&conn, "ana martins").unwrap().is_some());
        assert!(search_by_name(&conn, "ANA MARTINS").unwrap().is_some());
        assert!(search_by_name(&conn, "Ana").unwrap().is_none());
    }

    #[test]
    fn test_autocomplete_limits_and_matches_substring() {
        let conn = test_conn();
        for i in 0..15 {
            insert_account(&conn, &sample_account(&format!("Maria {i:02}"), &format!("BI-{i:03}")))
                .unwrap();
        }
        insert_account(&conn, &sample_account("Pedro Costa", "BI-100")).unwrap();

        let hits = autocomplete_names(&conn, "Maria").unwrap();
        assert_eq!(hits.len(), 10);

        let hits = autocomplete_names(&conn, "costa").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, "Pedro Costa");

        assert!(autocomplete_names(&conn, "").unwrap().is_empty());
    }

    #[test]
    fn test_apply_balance_delta() {
        let conn = test_conn();
        let account = sample_account("Ana Martins", "BI-001");
        insert_account(&conn, &account).unwrap();

        let touched = apply_balance_delta(&conn, &account.id, -2_500).unwrap();
        assert_eq!(touched, 1);
        assert_eq!(get_account(&conn, &account.id).unwrap().unwrap().balance, 7_500);

        // Missing account touches nothing
        let touched = apply_balance_delta(&conn, "no-such-id", 100).unwrap();
        assert_eq!(touched, 0);
    }

    #[test]
    fn test_patch_from_json_rejects_balance() {
        let err = AccountPatch::from_json(serde_json::json!({
            "full_name": "New Name",
            "balance": 99_999,
        }))
        .unwrap_err();
        assert_eq!(err.code(), "IMMUTABLE_FIELD");

        let err = AccountPatch::from_json(serde_json::json!({ "id": "other" })).unwrap_err();
        assert_eq!(err.code(), "IMMUTABLE_FIELD");
    }

    #[test]
    fn test_patch_applies_only_present_fields() {
        let patch = AccountPatch::from_json(serde_json::json!({
            "phone": "+244 911 111 111",
            "school": "Escola Nova",
        }))
        .unwrap();

        let mut account = sample_account("Ana Martins", "BI-001");
        patch.apply_to(&mut account);

        assert_eq!(account.phone, "+244 911 111 111");
        assert_eq!(account.school, "Escola Nova");
        assert_eq!(account.full_name, "Ana Martins");
        assert_eq!(account.balance, 10_000);
    }
}
