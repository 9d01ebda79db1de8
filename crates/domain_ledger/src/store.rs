//! Ledger storage port
//!
//! Every ledger operation runs inside one unit of work obtained from a
//! `LedgerStore`. The transaction exposes typed record access and row
//! locks; `commit` makes all of its writes visible at once, and dropping
//! an uncommitted transaction rolls everything back.
//!
//! # Lock discipline
//!
//! - Journal rows are locked exclusively while the entry counter advances.
//! - Entry rows are locked exclusively while their status changes.
//! - Account rows and `(account, period)` roll-up rows are locked by the
//!   balance service, the only writer of balance state.
//! - Period close locks the period row exclusively; posting takes a shared
//!   lock on its period so the two serialise.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut tx = store.begin().await?;
//! let entry = posting::post(&mut tx, entry_id, &actor, Utc::now()).await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;

use core_kernel::{
    AccountId, DomainPort, ExpenseCategoryId, ExpenseId, JournalEntryId, JournalId, LineId,
    PayableId, PeriodId, PortError, StatementId,
};

use crate::account::{Account, AccountFilter};
use crate::balance::AccountBalance;
use crate::entry::{EntryQuery, JournalEntry, JournalEntryLine, LedgerLine, LineQuery};
use crate::journal::Journal;
use crate::period::AccountingPeriod;
use crate::statements::{FinancialStatement, StatementType};
use crate::subledger::expense::{Expense, ExpenseCategory};
use crate::subledger::payable::{AccountsPayable, PayableStatus};

/// Row lock taken when reading a record inside a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    /// Plain read
    None,
    /// Blocks exclusive lockers until commit (`FOR SHARE`)
    Shared,
    /// Blocks all other lockers until commit (`FOR UPDATE`)
    Exclusive,
}

/// Source of ledger units of work
#[async_trait]
pub trait LedgerStore: DomainPort {
    type Tx: LedgerTx;

    /// Starts a serialisable unit of work
    ///
    /// # Errors
    ///
    /// Returns `PortError::Contention` if the store cannot start a unit of
    /// work within its lock timeout.
    async fn begin(&self) -> Result<Self::Tx, PortError>;
}

/// One serialisable unit of work over ledger state
#[async_trait]
pub trait LedgerTx: Send {
    /// Makes every write of this unit of work durable
    async fn commit(self) -> Result<(), PortError>;

    // Accounts

    async fn insert_account(&mut self, account: &Account) -> Result<(), PortError>;

    async fn update_account(&mut self, account: &Account) -> Result<(), PortError>;

    async fn find_account(&mut self, id: AccountId, lock: RowLock) -> Result<Option<Account>, PortError>;

    /// Looks an account up by code, ignoring case
    async fn find_account_by_code(&mut self, code: &str) -> Result<Option<Account>, PortError>;

    /// Lists matching accounts ordered by code
    async fn list_accounts(&mut self, filter: &AccountFilter) -> Result<Vec<Account>, PortError>;

    // Periods

    async fn insert_period(&mut self, period: &AccountingPeriod) -> Result<(), PortError>;

    async fn update_period(&mut self, period: &AccountingPeriod) -> Result<(), PortError>;

    async fn find_period(&mut self, id: PeriodId, lock: RowLock) -> Result<Option<AccountingPeriod>, PortError>;

    /// Lists every period in ledger order
    async fn list_periods(&mut self) -> Result<Vec<AccountingPeriod>, PortError>;

    // Journals

    async fn insert_journal(&mut self, journal: &Journal) -> Result<(), PortError>;

    async fn update_journal(&mut self, journal: &Journal) -> Result<(), PortError>;

    async fn find_journal(&mut self, id: JournalId, lock: RowLock) -> Result<Option<Journal>, PortError>;

    async fn find_journal_by_code(&mut self, code: &str) -> Result<Option<Journal>, PortError>;

    async fn list_journals(&mut self) -> Result<Vec<Journal>, PortError>;

    // Entries and lines

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError>;

    async fn update_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError>;

    async fn find_entry(&mut self, id: JournalEntryId, lock: RowLock) -> Result<Option<JournalEntry>, PortError>;

    /// Lists matching entries ordered by date then number
    async fn list_entries(&mut self, query: &EntryQuery) -> Result<Vec<JournalEntry>, PortError>;

    async fn insert_line(&mut self, line: &JournalEntryLine) -> Result<(), PortError>;

    async fn delete_line(&mut self, id: LineId) -> Result<(), PortError>;

    /// Lines of one entry ordered by line number
    async fn lines_for_entry(&mut self, entry_id: JournalEntryId) -> Result<Vec<JournalEntryLine>, PortError>;

    /// Lines joined with their entry header, filtered by `query`
    async fn ledger_lines(&mut self, query: &LineQuery) -> Result<Vec<LedgerLine>, PortError>;

    // Balance roll-ups

    async fn find_balance(
        &mut self,
        account_id: AccountId,
        period_id: PeriodId,
        lock: RowLock,
    ) -> Result<Option<AccountBalance>, PortError>;

    async fn upsert_balance(&mut self, balance: &AccountBalance) -> Result<(), PortError>;

    async fn balances_for_account(
        &mut self,
        account_id: AccountId,
        lock: RowLock,
    ) -> Result<Vec<AccountBalance>, PortError>;

    async fn balances_for_period(&mut self, period_id: PeriodId) -> Result<Vec<AccountBalance>, PortError>;

    // Financial statements (insert only)

    async fn insert_statement(&mut self, statement: &FinancialStatement) -> Result<(), PortError>;

    async fn find_statement(&mut self, id: StatementId) -> Result<Option<FinancialStatement>, PortError>;

    async fn list_statements(
        &mut self,
        statement_type: Option<StatementType>,
    ) -> Result<Vec<FinancialStatement>, PortError>;

    // Expense subledger

    async fn insert_expense_category(&mut self, category: &ExpenseCategory) -> Result<(), PortError>;

    async fn find_expense_category(&mut self, id: ExpenseCategoryId) -> Result<Option<ExpenseCategory>, PortError>;

    async fn insert_expense(&mut self, expense: &Expense) -> Result<(), PortError>;

    async fn update_expense(&mut self, expense: &Expense) -> Result<(), PortError>;

    async fn find_expense(&mut self, id: ExpenseId, lock: RowLock) -> Result<Option<Expense>, PortError>;

    // Payables subledger

    async fn insert_payable(&mut self, payable: &AccountsPayable) -> Result<(), PortError>;

    async fn update_payable(&mut self, payable: &AccountsPayable) -> Result<(), PortError>;

    async fn find_payable(&mut self, id: PayableId, lock: RowLock) -> Result<Option<AccountsPayable>, PortError>;

    async fn list_payables(&mut self, status: Option<PayableStatus>) -> Result<Vec<AccountsPayable>, PortError>;
}
