// ⚙️ Ledger Configuration - Deployment settings as data
// Account cap, retention window, maintenance secret, department set

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Default active-account cap (the clinic's licensed seat count).
pub const DEFAULT_ACCOUNT_CAP: usize = 390;

/// Default retention window for transaction deletion, in days (inclusive).
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Deployment-time configuration for the ledger core.
///
/// All values are explicit construction inputs; nothing is read from ambient
/// process state at call time. The maintenance secret is held as a SHA-256
/// digest, never in the clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Maximum number of active accounts accepted at registration.
    #[serde(default = "default_account_cap")]
    pub max_active_accounts: usize,

    /// Days within which a transaction may be freely deleted (inclusive).
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Hex SHA-256 digest of the administrator maintenance secret.
    pub maintenance_secret_sha256: String,

    /// Closed set of billable departments. Versionable per deployment.
    #[serde(default = "default_departments")]
    pub departments: Vec<String>,
}

fn default_account_cap() -> usize {
    DEFAULT_ACCOUNT_CAP
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

fn default_departments() -> Vec<String> {
    vec![
        "Medical Center".to_string(),
        "Pharmacy".to_string(),
        "Administration".to_string(),
    ]
}

impl LedgerConfig {
    /// Build a config with defaults and the given maintenance secret.
    pub fn with_secret(secret: &str) -> Self {
        LedgerConfig {
            max_active_accounts: DEFAULT_ACCOUNT_CAP,
            retention_days: DEFAULT_RETENTION_DAYS,
            maintenance_secret_sha256: digest_secret(secret),
            departments: default_departments(),
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: LedgerConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// Write configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Check whether a department is a member of the configured set.
    /// Exact string match; the set is closed per deployment.
    pub fn is_known_department(&self, department: &str) -> bool {
        self.departments.iter().any(|d| d == department)
    }

    /// Check a caller-supplied secret against the stored digest.
    pub fn verify_secret(&self, candidate: &str) -> bool {
        digest_secret(candidate) == self.maintenance_secret_sha256
    }
}

/// Hex SHA-256 digest of a maintenance secret.
pub fn digest_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// MAINTENANCE OVERRIDE
// ============================================================================

/// Caller-supplied proof for bypassing the retention window on deletion.
///
/// The override is valid only when maintenance mode is flagged AND the
/// supplied secret matches the configured digest, both at once.
#[derive(Debug, Clone, Default)]
pub struct DeleteOverride {
    /// Maintenance-mode flag asserted by the caller.
    pub maintenance_mode: bool,

    /// Plain administrator secret, compared by digest.
    pub secret: Option<String>,
}

impl DeleteOverride {
    /// No override: the normal retention window applies.
    pub fn none() -> Self {
        DeleteOverride::default()
    }

    /// Maintenance override with the given secret.
    pub fn maintenance(secret: &str) -> Self {
        DeleteOverride {
            maintenance_mode: true,
            secret: Some(secret.to_string()),
        }
    }

    /// Whether this context proves a privileged maintenance override.
    pub fn authorizes(&self, config: &LedgerConfig) -> bool {
        self.maintenance_mode
            && self
                .secret
                .as_deref()
                .map(|s| config.verify_secret(s))
                .unwrap_or(false)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::with_secret("hunter2");
        assert_eq!(config.max_active_accounts, 390);
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.departments.len(), 3);
        assert!(config.is_known_department("Pharmacy"));
        assert!(!config.is_known_department("Cafeteria"));
    }

    #[test]
    fn test_department_match_is_exact() {
        let config = LedgerConfig::with_secret("hunter2");
        assert!(config.is_known_department("Medical Center"));
        assert!(!config.is_known_department("medical center"));
        assert!(!config.is_known_department("Medical Center "));
    }

    #[test]
    fn test_secret_verification() {
        let config = LedgerConfig::with_secret("hunter2");
        assert!(config.verify_secret("hunter2"));
        assert!(!config.verify_secret("hunter3"));
        assert!(!config.verify_secret(""));
    }

    #[test]
    fn test_override_requires_both_flag_and_secret() {
        let config = LedgerConfig::with_secret("hunter2");

        assert!(DeleteOverride::maintenance("hunter2").authorizes(&config));

        // Secret alone is not enough
        let secret_only = DeleteOverride {
            maintenance_mode: false,
            secret: Some("hunter2".to_string()),
        };
        assert!(!secret_only.authorizes(&config));

        // Flag alone is not enough
        let flag_only = DeleteOverride {
            maintenance_mode: true,
            secret: None,
        };
        assert!(!flag_only.authorizes(&config));

        // Wrong secret fails even in maintenance mode
        assert!(!DeleteOverride::maintenance("wrong").authorizes(&config));
    }

    #[test]
    fn test_config_round_trip_through_file() {
        let mut config = LedgerConfig::with_secret("hunter2");
        config.departments.push("Dentistry".to_string());

        let dir = std::env::temp_dir().join("clinic_ledger_config_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        config.to_file(&path).unwrap();
        let loaded = LedgerConfig::from_file(&path).unwrap();

        assert_eq!(loaded.max_active_accounts, config.max_active_accounts);
        assert_eq!(loaded.departments, config.departments);
        assert!(loaded.verify_secret("hunter2"));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let json = r#"{ "maintenance_secret_sha256": "abc123" }"#;
        let config: LedgerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_active_accounts, DEFAULT_ACCOUNT_CAP);
        assert_eq!(config.retention_days, DEFAULT_RETENTION_DAYS);
        assert!(config.is_known_department("Administration"));
    }
}
