// Clinic Ledger - Core Library
// Exposes all modules for use in the CLI and tests

pub mod accounts;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod reports;
pub mod transactions;

// Re-export commonly used types
pub use accounts::{Account, AccountPatch};
pub use config::{DeleteOverride, LedgerConfig, DEFAULT_ACCOUNT_CAP, DEFAULT_RETENTION_DAYS};
pub use db::{open_database, setup_database};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{AgentRole, CreateTransaction, LedgerCore, NewAccount};
pub use notify::{ChangeNotifier, NullNotifier, RecordingNotifier, TracingNotifier};
pub use reports::{write_report_csv, DepartmentTotal, ReportEntry};
pub use transactions::Transaction;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
