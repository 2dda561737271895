// 💳 Balance Ledger Core - atomic balance/transaction consistency
//
// Every mutation here is one SQLite transaction (IMMEDIATE, so the write
// lock is taken up front): the account balance and the transaction log
// either both change or neither does. Concurrent operations on the same
// account serialize on the shared connection; dropping an uncommitted unit
// rolls it back, so an aborted caller leaves no partial state.
//
// The change notifier runs strictly after commit and cannot fail or undo a
// committed mutation.

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::accounts::{self, Account, AccountPatch};
use crate::config::{DeleteOverride, LedgerConfig};
use crate::error::{LedgerError, LedgerResult};
use crate::notify::ChangeNotifier;
use crate::reports::{self, DepartmentTotal, ReportEntry};
use crate::transactions::{self, Transaction};

// ============================================================================
// INPUTS
// ============================================================================

/// Privilege of the calling agent for a create operation.
///
/// `PrivilegedOverride` skips the duplicate-invoice and balance checks:
/// such debits may overdraft the account and re-bill an invoice. The
/// recorded `attended_by` string carries no privilege semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Standard,
    PrivilegedOverride,
}

/// Registration input for a new account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub full_name: String,
    pub external_id: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: String,
    pub school: String,
    /// Prepaid top-up at registration, in cents.
    pub initial_balance: i64,
}

/// Input for billing one service against an account.
#[derive(Debug, Clone)]
pub struct CreateTransaction {
    pub account_id: String,
    /// Invoice/service identifier; duplicate key together with the account.
    pub service: String,
    /// Debit in cents, positive.
    pub amount: i64,
    pub attended_by: String,
    pub department: String,
}

// ============================================================================
// LEDGER CORE
// ============================================================================

/// Orchestrates atomic create/delete of transactions against account
/// balances, plus account lifecycle (register, patch, cascade delete).
pub struct LedgerCore {
    db: Arc<Mutex<Connection>>,
    config: LedgerConfig,
    notifier: Arc<dyn ChangeNotifier>,
}

impl LedgerCore {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        config: LedgerConfig,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        LedgerCore {
            db,
            config,
            notifier,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| LedgerError::ConflictCommitFailure("connection lock poisoned".to_string()))
    }

    // ========================================================================
    // ACCOUNT LIFECYCLE
    // ========================================================================

    /// Register a new account, enforcing the active-account cap and the
    /// external-id uniqueness constraint.
    pub fn register_account(&self, input: NewAccount) -> LedgerResult<Account> {
        let account = {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let active = accounts::count_active(&tx)?;
            if active as usize >= self.config.max_active_accounts {
                return Err(LedgerError::CapacityExceeded(self.config.max_active_accounts));
            }

            if accounts::find_by_external_id(&tx, &input.external_id)?.is_some() {
                return Err(LedgerError::DuplicateExternalId(input.external_id));
            }

            let account = Account::new(
                input.full_name,
                input.external_id,
                input.date_of_birth,
                input.phone,
                input.school,
                input.initial_balance,
            );
            accounts::insert_account(&tx, &account)?;

            tx.commit()?;
            account
        };

        tracing::info!(account = %account.id, "account registered");
        self.notifier
            .notify(&format!("A new patient was added: {}", account.full_name));
        Ok(account)
    }

    /// Patch an account's descriptive fields. Balance is not patchable;
    /// see `AccountPatch`. External-id patches keep the uniqueness rule.
    pub fn update_account(&self, id: &str, patch: AccountPatch) -> LedgerResult<Account> {
        let account = {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let mut account =
                accounts::get_account(&tx, id)?.ok_or(LedgerError::NotFound("account"))?;

            if let Some(new_external) = &patch.external_id {
                if let Some(other) = accounts::find_by_external_id(&tx, new_external)? {
                    if other.id != account.id {
                        return Err(LedgerError::DuplicateExternalId(new_external.clone()));
                    }
                }
            }

            patch.apply_to(&mut account);
            account.updated_at = Utc::now();
            accounts::update_account_row(&tx, &account)?;

            tx.commit()?;
            account
        };

        self.notifier
            .notify(&format!("{}'s information was updated.", account.full_name));
        Ok(account)
    }

    /// Delete an account and every transaction referencing it, as one atomic
    /// unit. Transactions go first so no orphan rows can survive; their
    /// balance effect is not reversed since the account itself is discarded.
    pub fn delete_account(&self, id: &str) -> LedgerResult<Account> {
        let account = {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let account =
                accounts::get_account(&tx, id)?.ok_or(LedgerError::NotFound("account"))?;

            transactions::delete_all_for_account(&tx, id)?;
            accounts::delete_account_row(&tx, id)?;

            tx.commit()?;
            account
        };

        tracing::info!(account = %account.id, "account deleted with its transactions");
        self.notifier
            .notify(&format!("The record of {} was removed.", account.full_name));
        Ok(account)
    }

    // ========================================================================
    // TRANSACTION CREATE / DELETE
    // ========================================================================

    /// Bill a service against an account.
    ///
    /// Standard-role validation: the (account, service) pair must not be
    /// billed yet, and the balance must cover the amount. A privileged
    /// override skips both. The balance write and the log insert commit
    /// together or not at all.
    pub fn create_transaction(
        &self,
        input: CreateTransaction,
        role: AgentRole,
    ) -> LedgerResult<Transaction> {
        let (record, full_name) = {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let account = accounts::get_account(&tx, &input.account_id)?
                .ok_or(LedgerError::NotFound("account"))?;

            if role == AgentRole::Standard {
                if transactions::find_by_account_and_service(&tx, &account.id, &input.service)?
                    .is_some()
                {
                    // The raw string is the key; trim only for the message
                    return Err(LedgerError::DuplicateInvoice {
                        invoice: input.service.trim().to_string(),
                    });
                }

                if account.balance < input.amount {
                    return Err(LedgerError::InsufficientBalance {
                        balance: account.balance,
                        amount: input.amount,
                    });
                }
            }

            let new_balance = account.balance - input.amount;
            accounts::apply_balance_delta(&tx, &account.id, -input.amount)?;

            let record = Transaction {
                id: uuid::Uuid::new_v4().to_string(),
                account_id: account.id.clone(),
                service: input.service,
                amount: input.amount,
                new_balance,
                attended_by: input.attended_by,
                department: input.department,
                created_at: Utc::now(),
            };
            transactions::insert_transaction(&tx, &record, &self.config)?;

            tx.commit()?;
            (record, account.full_name)
        };

        tracing::info!(
            account = %record.account_id,
            amount = record.amount,
            new_balance = record.new_balance,
            "transaction committed"
        );
        self.notifier
            .notify(&format!("New transaction for {full_name}."));
        Ok(record)
    }

    /// Void a transaction, restoring its amount to the owning account.
    ///
    /// Without a valid maintenance override the transaction must be at most
    /// `retention_days` old (inclusive). If the owning account was deleted
    /// independently the restoration is silently skipped. Returns the voided
    /// record.
    pub fn delete_transaction(
        &self,
        id: &str,
        override_ctx: &DeleteOverride,
    ) -> LedgerResult<Transaction> {
        let (record, full_name) = {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let record = transactions::get_transaction(&tx, id)?
                .ok_or(LedgerError::NotFound("transaction"))?;

            if !override_ctx.authorizes(&self.config) {
                let age_days = record.age_days(Utc::now());
                if age_days > self.config.retention_days {
                    return Err(LedgerError::RetentionWindowExceeded {
                        age_days,
                        window_days: self.config.retention_days,
                    });
                }
            }

            // The account may be gone; restoration is skipped, never an error
            let account = accounts::get_account(&tx, &record.account_id)?;
            if account.is_some() {
                accounts::apply_balance_delta(&tx, &record.account_id, record.amount)?;
            }

            transactions::delete_transaction_row(&tx, id)?;

            tx.commit()?;
            let full_name = account.map(|a| a.full_name).unwrap_or_default();
            (record, full_name)
        };

        tracing::info!(
            account = %record.account_id,
            amount = record.amount,
            "transaction voided"
        );
        self.notifier
            .notify(&format!("Transaction for {full_name} was removed."));
        Ok(record)
    }

    // ========================================================================
    // READ SIDE
    // ========================================================================

    pub fn account(&self, id: &str) -> LedgerResult<Option<Account>> {
        Ok(accounts::get_account(&*self.lock()?, id)?)
    }

    pub fn find_by_external_id(&self, external_id: &str) -> LedgerResult<Option<Account>> {
        Ok(accounts::find_by_external_id(&*self.lock()?, external_id)?)
    }

    pub fn search_by_name(&self, full_name: &str) -> LedgerResult<Option<Account>> {
        Ok(accounts::search_by_name(&*self.lock()?, full_name)?)
    }

    pub fn autocomplete_names(&self, term: &str) -> LedgerResult<Vec<(String, String)>> {
        Ok(accounts::autocomplete_names(&*self.lock()?, term)?)
    }

    pub fn accounts(&self) -> LedgerResult<Vec<Account>> {
        Ok(accounts::list_accounts(&*self.lock()?)?)
    }

    pub fn history(
        &self,
        account_id: &str,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> LedgerResult<Vec<Transaction>> {
        Ok(transactions::history_for_account(
            &*self.lock()?,
            account_id,
            range,
        )?)
    }

    pub fn transactions_by_day(&self, date: NaiveDate) -> LedgerResult<Vec<ReportEntry>> {
        Ok(reports::transactions_by_day(&*self.lock()?, date)?)
    }

    pub fn report(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        department: Option<&str>,
    ) -> LedgerResult<Vec<ReportEntry>> {
        Ok(reports::report(&*self.lock()?, start, end, department)?)
    }

    pub fn department_totals(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> LedgerResult<Vec<DepartmentTotal>> {
        Ok(reports::department_totals(&*self.lock()?, start, end)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
