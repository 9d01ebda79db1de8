//! In-memory ledger store
//!
//! Stores ledger state in process memory and is useful for tests and
//! tooling that need no database. A unit of work holds the store's lock
//! for its whole life and edits a private copy of the state; `commit`
//! swaps the copy in, dropping the transaction discards it. Units of work
//! therefore run one at a time, which trivially satisfies every row-lock
//! mode.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use core_kernel::{
    AccountId, DomainPort, ExpenseCategoryId, ExpenseId, JournalEntryId, JournalId, LineId,
    PayableId, PeriodId, PortError, StatementId,
};

use crate::account::{normalize_code, Account, AccountFilter};
use crate::balance::AccountBalance;
use crate::entry::{EntryQuery, JournalEntry, JournalEntryLine, LedgerLine, LineQuery};
use crate::journal::Journal;
use crate::period::{sort_periods, AccountingPeriod};
use crate::statements::{FinancialStatement, StatementType};
use crate::store::{LedgerStore, LedgerTx, RowLock};
use crate::subledger::expense::{Expense, ExpenseCategory};
use crate::subledger::payable::{AccountsPayable, PayableStatus};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    periods: HashMap<PeriodId, AccountingPeriod>,
    journals: HashMap<JournalId, Journal>,
    entries: HashMap<JournalEntryId, JournalEntry>,
    lines: HashMap<LineId, JournalEntryLine>,
    balances: HashMap<(AccountId, PeriodId), AccountBalance>,
    statements: HashMap<StatementId, FinancialStatement>,
    expense_categories: HashMap<ExpenseCategoryId, ExpenseCategory>,
    expenses: HashMap<ExpenseId, Expense>,
    payables: HashMap<PayableId, AccountsPayable>,
}

/// Ledger store held in process memory
#[derive(Debug, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
    lock_timeout: Duration,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long `begin` waits for a running unit of work to finish
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

impl DomainPort for InMemoryLedgerStore {}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryLedgerTx;

    async fn begin(&self) -> Result<Self::Tx, PortError> {
        let started = Instant::now();
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| PortError::contention("begin unit of work", started.elapsed().as_millis() as u64))?;
        let working = guard.clone();
        Ok(InMemoryLedgerTx { guard, working })
    }
}

/// Unit of work over [`InMemoryLedgerStore`]
pub struct InMemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

impl std::fmt::Debug for InMemoryLedgerTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedgerTx")
            .field("entries", &self.working.entries.len())
            .field("lines", &self.working.lines.len())
            .finish()
    }
}

impl InMemoryLedgerTx {
    fn ledger_line(&self, line: &JournalEntryLine) -> Option<LedgerLine> {
        self.working.entries.get(&line.entry_id).map(|entry| LedgerLine {
            line: line.clone(),
            entry_number: entry.number.clone(),
            journal_id: entry.journal_id,
            period_id: entry.period_id,
            date: entry.date,
            status: entry.status,
        })
    }
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn commit(self) -> Result<(), PortError> {
        let InMemoryLedgerTx { mut guard, working } = self;
        *guard = working;
        debug!("Committed in-memory unit of work");
        Ok(())
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), PortError> {
        let code = normalize_code(&account.code);
        if self.working.accounts.values().any(|a| normalize_code(&a.code) == code) {
            return Err(PortError::conflict(format!("account code {} exists", account.code)));
        }
        self.working.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), PortError> {
        match self.working.accounts.get_mut(&account.id) {
            Some(stored) => {
                *stored = account.clone();
                Ok(())
            }
            None => Err(PortError::not_found("Account", account.id)),
        }
    }

    async fn find_account(&mut self, id: AccountId, _lock: RowLock) -> Result<Option<Account>, PortError> {
        Ok(self.working.accounts.get(&id).cloned())
    }

    async fn find_account_by_code(&mut self, code: &str) -> Result<Option<Account>, PortError> {
        let code = normalize_code(code);
        Ok(self
            .working
            .accounts
            .values()
            .find(|a| normalize_code(&a.code) == code)
            .cloned())
    }

    async fn list_accounts(&mut self, filter: &AccountFilter) -> Result<Vec<Account>, PortError> {
        let mut accounts: Vec<Account> = self
            .working
            .accounts
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn insert_period(&mut self, period: &AccountingPeriod) -> Result<(), PortError> {
        self.working.periods.insert(period.id, period.clone());
        Ok(())
    }

    async fn update_period(&mut self, period: &AccountingPeriod) -> Result<(), PortError> {
        match self.working.periods.get_mut(&period.id) {
            Some(stored) => {
                *stored = period.clone();
                Ok(())
            }
            None => Err(PortError::not_found("AccountingPeriod", period.id)),
        }
    }

    async fn find_period(&mut self, id: PeriodId, _lock: RowLock) -> Result<Option<AccountingPeriod>, PortError> {
        Ok(self.working.periods.get(&id).cloned())
    }

    async fn list_periods(&mut self) -> Result<Vec<AccountingPeriod>, PortError> {
        let mut periods: Vec<AccountingPeriod> = self.working.periods.values().cloned().collect();
        sort_periods(&mut periods);
        Ok(periods)
    }

    async fn insert_journal(&mut self, journal: &Journal) -> Result<(), PortError> {
        if self
            .working
            .journals
            .values()
            .any(|j| j.code.eq_ignore_ascii_case(&journal.code))
        {
            return Err(PortError::conflict(format!("journal code {} exists", journal.code)));
        }
        self.working.journals.insert(journal.id, journal.clone());
        Ok(())
    }

    async fn update_journal(&mut self, journal: &Journal) -> Result<(), PortError> {
        match self.working.journals.get_mut(&journal.id) {
            Some(stored) => {
                *stored = journal.clone();
                Ok(())
            }
            None => Err(PortError::not_found("Journal", journal.id)),
        }
    }

    async fn find_journal(&mut self, id: JournalId, _lock: RowLock) -> Result<Option<Journal>, PortError> {
        Ok(self.working.journals.get(&id).cloned())
    }

    async fn find_journal_by_code(&mut self, code: &str) -> Result<Option<Journal>, PortError> {
        Ok(self
            .working
            .journals
            .values()
            .find(|j| j.code.eq_ignore_ascii_case(code.trim()))
            .cloned())
    }

    async fn list_journals(&mut self) -> Result<Vec<Journal>, PortError> {
        let mut journals: Vec<Journal> = self.working.journals.values().cloned().collect();
        journals.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(journals)
    }

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        if self.working.entries.values().any(|e| e.number == entry.number) {
            return Err(PortError::conflict(format!("entry number {} exists", entry.number)));
        }
        self.working.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn update_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        match self.working.entries.get_mut(&entry.id) {
            Some(stored) => {
                *stored = entry.clone();
                Ok(())
            }
            None => Err(PortError::not_found("JournalEntry", entry.id)),
        }
    }

    async fn find_entry(&mut self, id: JournalEntryId, _lock: RowLock) -> Result<Option<JournalEntry>, PortError> {
        Ok(self.working.entries.get(&id).cloned())
    }

    async fn list_entries(&mut self, query: &EntryQuery) -> Result<Vec<JournalEntry>, PortError> {
        let mut entries: Vec<JournalEntry> = self
            .working
            .entries
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        entries.sort_by(|a, b| (a.date, &a.number).cmp(&(b.date, &b.number)));
        Ok(entries)
    }

    async fn insert_line(&mut self, line: &JournalEntryLine) -> Result<(), PortError> {
        if !self.working.entries.contains_key(&line.entry_id) {
            return Err(PortError::not_found("JournalEntry", line.entry_id));
        }
        self.working.lines.insert(line.id, line.clone());
        Ok(())
    }

    async fn delete_line(&mut self, id: LineId) -> Result<(), PortError> {
        self.working
            .lines
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PortError::not_found("JournalEntryLine", id))
    }

    async fn lines_for_entry(&mut self, entry_id: JournalEntryId) -> Result<Vec<JournalEntryLine>, PortError> {
        let mut lines: Vec<JournalEntryLine> = self
            .working
            .lines
            .values()
            .filter(|l| l.entry_id == entry_id)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.line_no);
        Ok(lines)
    }

    async fn ledger_lines(&mut self, query: &LineQuery) -> Result<Vec<LedgerLine>, PortError> {
        let mut lines: Vec<LedgerLine> = self
            .working
            .lines
            .values()
            .filter_map(|l| self.ledger_line(l))
            .filter(|l| query.matches(l))
            .collect();
        lines.sort_by(|a, b| {
            (a.date, &a.entry_number, a.line.line_no).cmp(&(b.date, &b.entry_number, b.line.line_no))
        });
        Ok(lines)
    }

    async fn find_balance(
        &mut self,
        account_id: AccountId,
        period_id: PeriodId,
        _lock: RowLock,
    ) -> Result<Option<AccountBalance>, PortError> {
        Ok(self.working.balances.get(&(account_id, period_id)).cloned())
    }

    async fn upsert_balance(&mut self, balance: &AccountBalance) -> Result<(), PortError> {
        self.working
            .balances
            .insert((balance.account_id, balance.period_id), balance.clone());
        Ok(())
    }

    async fn balances_for_account(
        &mut self,
        account_id: AccountId,
        _lock: RowLock,
    ) -> Result<Vec<AccountBalance>, PortError> {
        Ok(self
            .working
            .balances
            .values()
            .filter(|b| b.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn balances_for_period(&mut self, period_id: PeriodId) -> Result<Vec<AccountBalance>, PortError> {
        Ok(self
            .working
            .balances
            .values()
            .filter(|b| b.period_id == period_id)
            .cloned()
            .collect())
    }

    async fn insert_statement(&mut self, statement: &FinancialStatement) -> Result<(), PortError> {
        if self.working.statements.contains_key(&statement.id) {
            return Err(PortError::conflict(format!("statement {} exists", statement.id)));
        }
        self.working.statements.insert(statement.id, statement.clone());
        Ok(())
    }

    async fn find_statement(&mut self, id: StatementId) -> Result<Option<FinancialStatement>, PortError> {
        Ok(self.working.statements.get(&id).cloned())
    }

    async fn list_statements(
        &mut self,
        statement_type: Option<StatementType>,
    ) -> Result<Vec<FinancialStatement>, PortError> {
        Ok(self
            .working
            .statements
            .values()
            .filter(|s| statement_type.map_or(true, |t| s.statement_type == t))
            .cloned()
            .collect())
    }

    async fn insert_expense_category(&mut self, category: &ExpenseCategory) -> Result<(), PortError> {
        self.working.expense_categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn find_expense_category(&mut self, id: ExpenseCategoryId) -> Result<Option<ExpenseCategory>, PortError> {
        Ok(self.working.expense_categories.get(&id).cloned())
    }

    async fn insert_expense(&mut self, expense: &Expense) -> Result<(), PortError> {
        self.working.expenses.insert(expense.id, expense.clone());
        Ok(())
    }

    async fn update_expense(&mut self, expense: &Expense) -> Result<(), PortError> {
        match self.working.expenses.get_mut(&expense.id) {
            Some(stored) => {
                *stored = expense.clone();
                Ok(())
            }
            None => Err(PortError::not_found("Expense", expense.id)),
        }
    }

    async fn find_expense(&mut self, id: ExpenseId, _lock: RowLock) -> Result<Option<Expense>, PortError> {
        Ok(self.working.expenses.get(&id).cloned())
    }

    async fn insert_payable(&mut self, payable: &AccountsPayable) -> Result<(), PortError> {
        self.working.payables.insert(payable.id, payable.clone());
        Ok(())
    }

    async fn update_payable(&mut self, payable: &AccountsPayable) -> Result<(), PortError> {
        match self.working.payables.get_mut(&payable.id) {
            Some(stored) => {
                *stored = payable.clone();
                Ok(())
            }
            None => Err(PortError::not_found("AccountsPayable", payable.id)),
        }
    }

    async fn find_payable(&mut self, id: PayableId, _lock: RowLock) -> Result<Option<AccountsPayable>, PortError> {
        Ok(self.working.payables.get(&id).cloned())
    }

    async fn list_payables(&mut self, status: Option<PayableStatus>) -> Result<Vec<AccountsPayable>, PortError> {
        let mut payables: Vec<AccountsPayable> = self
            .working
            .payables
            .values()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        payables.sort_by(|a, b| (a.invoice_date, a.created_at).cmp(&(b.invoice_date, b.created_at)));
        Ok(payables)
    }
}
