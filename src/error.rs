// Ledger error taxonomy
// Every failure the core can surface, one stable code per kind so API
// consumers and tests branch on the code, never on message text.

use thiserror::Error;

/// Result type used across the ledger core.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Caller-visible ledger failure.
///
/// Domain failures only; infrastructure failures (a commit that cannot be
/// made durable, a poisoned connection) collapse into `ConflictCommitFailure`.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Account or transaction does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A live transaction already bills this (account, service) pair.
    #[error("invoice '{invoice}' already billed for this account")]
    DuplicateInvoice { invoice: String },

    /// Another account already holds this external id number.
    #[error("external id '{0}' is already registered")]
    DuplicateExternalId(String),

    /// The debit would drive the balance negative on the standard path.
    #[error("insufficient balance: have {balance}, need {amount}")]
    InsufficientBalance { balance: i64, amount: i64 },

    /// Department is not a member of the configured set.
    #[error("unknown department '{0}'")]
    InvalidCategory(String),

    /// Deletion attempted on a transaction older than the retention window
    /// without a valid maintenance override.
    #[error("transaction is {age_days} days old, outside the {window_days}-day window")]
    RetentionWindowExceeded { age_days: i64, window_days: i64 },

    /// Registration would exceed the active-account cap.
    #[error("account limit of {0} reached")]
    CapacityExceeded(usize),

    /// Generic update tried to touch a field only the ledger may write.
    #[error("field '{0}' cannot be patched directly")]
    ImmutableField(&'static str),

    /// The atomic unit failed to commit for infrastructure reasons.
    #[error("storage failure: {0}")]
    ConflictCommitFailure(String),
}

impl LedgerError {
    /// Stable machine-readable code for this failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::DuplicateInvoice { .. } => "DUPLICATE_INVOICE",
            LedgerError::DuplicateExternalId(_) => "DUPLICATE_EXTERNAL_ID",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::InvalidCategory(_) => "INVALID_CATEGORY",
            LedgerError::RetentionWindowExceeded { .. } => "RETENTION_WINDOW_EXCEEDED",
            LedgerError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            LedgerError::ImmutableField(_) => "IMMUTABLE_FIELD",
            LedgerError::ConflictCommitFailure(_) => "CONFLICT_COMMIT_FAILURE",
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::ConflictCommitFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            LedgerError::NotFound("account"),
            LedgerError::DuplicateInvoice {
                invoice: "INV-1".to_string(),
            },
            LedgerError::DuplicateExternalId("B123".to_string()),
            LedgerError::InsufficientBalance {
                balance: 50,
                amount: 100,
            },
            LedgerError::InvalidCategory("Cafeteria".to_string()),
            LedgerError::RetentionWindowExceeded {
                age_days: 31,
                window_days: 30,
            },
            LedgerError::CapacityExceeded(390),
            LedgerError::ImmutableField("balance"),
            LedgerError::ConflictCommitFailure("disk full".to_string()),
        ];

        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len(), "every failure kind has its own code");
    }

    #[test]
    fn test_sqlite_errors_map_to_commit_failure() {
        let err: LedgerError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.code(), "CONFLICT_COMMIT_FAILURE");
    }
}
