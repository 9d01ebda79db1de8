//! Ledger facade
//!
//! `Ledger` wraps each operation in its own unit of work: begin, run,
//! commit. A unit of work that aborts on contention is re-run from the
//! start up to `max_contention_retries` times; every other error is
//! returned as is, after the uncommitted transaction is dropped.

use chrono::{NaiveDate, Utc};
use std::future::Future;
use tracing::{instrument, warn};

use core_kernel::{AccountId, Actor, Amount, ExpenseCategoryId, ExpenseId, JournalEntryId, LineId, PayableId, PeriodId, StatementId};

use crate::account::{Account, AccountFilter, AccountUpdate, NewAccount};
use crate::balance::{self, AccountBalance, RecomputeOutcome};
use crate::chart;
use crate::close::{self, CloseOutcome};
use crate::config::LedgerConfig;
use crate::entry::{DraftEntry, EntryDetail, EntryQuery, JournalEntry, JournalEntryLine, NewLine};
use crate::error::{LedgerError, LedgerResult};
use crate::journal::{self, Journal, NewJournal, StandardJournals};
use crate::period::{self, AccountingPeriod, NewPeriod, PeriodFrequency, PeriodStatus};
use crate::posting;
use crate::statements::{
    self, BalanceSheet, FinancialStatement, IncomeStatement, StatementRequest, StatementType, TrialBalance,
};
use crate::store::{LedgerStore, LedgerTx};
use crate::subledger::expense::{self, Expense, ExpenseCategory, NewExpense};
use crate::subledger::payable::{self, AccountsPayable, NewPayable, PayableStatus, PaymentRequest};

/// Runs `$body` in a fresh unit of work, retrying on contention
///
/// Owned arguments used by the body must be cloned inside it, since the
/// body may run more than once.
macro_rules! unit_of_work {
    ($ledger:expr, $operation:expr, |$tx:ident| $body:expr) => {{
        let mut attempt: u32 = 0;
        loop {
            let outcome: LedgerResult<_> = async {
                let mut $tx = $ledger.begin().await?;
                let value = $body;
                $tx.commit().await?;
                Ok(value)
            }
            .await;
            match outcome {
                Err(err) if $ledger.should_retry(&err, attempt, $operation) => attempt += 1,
                other => break other,
            }
        }
    }};
}

/// Entry point to the accounting core
#[derive(Debug, Clone)]
pub struct Ledger<S: LedgerStore> {
    store: S,
    config: LedgerConfig,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Starts a unit of work for callers composing several operations
    pub async fn begin(&self) -> LedgerResult<S::Tx> {
        Ok(self.store.begin().await?)
    }

    /// Re-runs `attempt` while it fails with `ContentionAborted`, up to the
    /// configured number of retries
    ///
    /// Each call of `attempt` must open, run and commit its own unit of work.
    pub async fn retry_on_contention<F, Fut, R>(&self, operation: &str, mut attempt: F) -> LedgerResult<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<R>>,
    {
        let mut retries: u32 = 0;
        loop {
            match attempt().await {
                Err(err) if self.should_retry(&err, retries, operation) => retries += 1,
                other => return other,
            }
        }
    }

    fn should_retry(&self, err: &LedgerError, attempt: u32, operation: &str) -> bool {
        if !err.is_retryable() || attempt >= self.config.max_contention_retries {
            return false;
        }
        warn!(operation, attempt = attempt + 1, error = %err, "Retrying unit of work after contention");
        true
    }

    // Chart of accounts

    #[instrument(skip(self, new, actor), fields(code = %new.code))]
    pub async fn create_account(&self, new: NewAccount, actor: &Actor) -> LedgerResult<Account> {
        unit_of_work!(self, "create_account", |tx| {
            chart::create_account(&mut tx, new.clone(), actor, Utc::now()).await?
        })
    }

    /// Creates a set of accounts in one unit of work, parents first
    pub async fn create_accounts(&self, accounts: Vec<NewAccount>, actor: &Actor) -> LedgerResult<Vec<Account>> {
        unit_of_work!(self, "create_accounts", |tx| {
            let mut created = Vec::with_capacity(accounts.len());
            for new in &accounts {
                created.push(chart::create_account(&mut tx, new.clone(), actor, Utc::now()).await?);
            }
            created
        })
    }

    pub async fn update_account(&self, code: &str, update: AccountUpdate) -> LedgerResult<Account> {
        unit_of_work!(self, "update_account", |tx| {
            chart::update_account(&mut tx, code, update.clone(), Utc::now()).await?
        })
    }

    pub async fn deactivate_account(&self, code: &str, actor: &Actor) -> LedgerResult<Account> {
        unit_of_work!(self, "deactivate_account", |tx| {
            chart::deactivate_account(&mut tx, code, actor, Utc::now()).await?
        })
    }

    pub async fn reactivate_account(&self, code: &str, actor: &Actor) -> LedgerResult<Account> {
        unit_of_work!(self, "reactivate_account", |tx| {
            chart::reactivate_account(&mut tx, code, actor, Utc::now()).await?
        })
    }

    pub async fn account(&self, code: &str) -> LedgerResult<Account> {
        unit_of_work!(self, "account", |tx| chart::get_account_by_code(&mut tx, code).await?)
    }

    pub async fn accounts(&self, filter: &AccountFilter) -> LedgerResult<Vec<Account>> {
        unit_of_work!(self, "accounts", |tx| chart::iterate_accounts(&mut tx, filter).await?)
    }

    pub async fn child_accounts(&self, code: &str) -> LedgerResult<Vec<Account>> {
        unit_of_work!(self, "child_accounts", |tx| chart::child_accounts(&mut tx, code).await?)
    }

    // Periods

    pub async fn create_period(&self, new: NewPeriod, actor: &Actor) -> LedgerResult<AccountingPeriod> {
        unit_of_work!(self, "create_period", |tx| {
            period::create_period(&mut tx, new.clone(), actor, Utc::now()).await?
        })
    }

    pub async fn generate_fiscal_year(
        &self,
        year: i32,
        frequency: PeriodFrequency,
        with_adjustment: bool,
        allow_gap: bool,
        actor: &Actor,
    ) -> LedgerResult<Vec<AccountingPeriod>> {
        unit_of_work!(self, "generate_fiscal_year", |tx| {
            period::generate_fiscal_year(&mut tx, year, frequency, with_adjustment, allow_gap, actor, Utc::now())
                .await?
        })
    }

    pub async fn set_current_period(&self, id: PeriodId) -> LedgerResult<AccountingPeriod> {
        unit_of_work!(self, "set_current_period", |tx| period::set_current(&mut tx, id).await?)
    }

    pub async fn clear_current_period(&self) -> LedgerResult<()> {
        unit_of_work!(self, "clear_current_period", |tx| period::clear_current(&mut tx).await?)
    }

    pub async fn period(&self, id: PeriodId) -> LedgerResult<AccountingPeriod> {
        unit_of_work!(self, "period", |tx| period::get_period(&mut tx, id).await?)
    }

    pub async fn periods(&self, status: Option<PeriodStatus>) -> LedgerResult<Vec<AccountingPeriod>> {
        unit_of_work!(self, "periods", |tx| period::list_periods(&mut tx, status).await?)
    }

    pub async fn period_for_date(&self, date: NaiveDate) -> LedgerResult<Option<AccountingPeriod>> {
        unit_of_work!(self, "period_for_date", |tx| period::find_period_for_date(&mut tx, date).await?)
    }

    pub async fn lock_period(&self, id: PeriodId, actor: &Actor) -> LedgerResult<AccountingPeriod> {
        unit_of_work!(self, "lock_period", |tx| period::lock_period(&mut tx, id, actor).await?)
    }

    // Journals

    pub async fn create_journal(&self, new: NewJournal, actor: &Actor) -> LedgerResult<Journal> {
        unit_of_work!(self, "create_journal", |tx| {
            journal::create_journal(&mut tx, new.clone(), actor, Utc::now()).await?
        })
    }

    /// Creates the standard journals that do not exist yet
    pub async fn bootstrap_journals(&self, actor: &Actor) -> LedgerResult<Vec<Journal>> {
        unit_of_work!(self, "bootstrap_journals", |tx| {
            let mut created = Vec::new();
            for definition in StandardJournals::definitions() {
                if tx.find_journal_by_code(&definition.code).await?.is_none() {
                    created.push(journal::create_journal(&mut tx, definition, actor, Utc::now()).await?);
                }
            }
            created
        })
    }

    pub async fn journals(&self) -> LedgerResult<Vec<Journal>> {
        unit_of_work!(self, "journals", |tx| journal::list_journals(&mut tx).await?)
    }

    // Entries

    pub async fn open_draft(&self, draft: DraftEntry, actor: &Actor) -> LedgerResult<JournalEntry> {
        unit_of_work!(self, "open_draft", |tx| {
            posting::open_draft(&mut tx, draft.clone(), actor, Utc::now()).await?
        })
    }

    pub async fn add_line(&self, entry_id: JournalEntryId, line: NewLine) -> LedgerResult<JournalEntryLine> {
        unit_of_work!(self, "add_line", |tx| posting::add_line(&mut tx, entry_id, line.clone()).await?)
    }

    pub async fn remove_line(&self, entry_id: JournalEntryId, line_id: LineId) -> LedgerResult<()> {
        unit_of_work!(self, "remove_line", |tx| posting::remove_line(&mut tx, entry_id, line_id).await?)
    }

    #[instrument(skip(self, actor))]
    pub async fn post(&self, entry_id: JournalEntryId, actor: &Actor) -> LedgerResult<JournalEntry> {
        unit_of_work!(self, "post", |tx| posting::post(&mut tx, entry_id, actor, Utc::now()).await?)
    }

    /// Opens, fills and posts an entry in one unit of work
    ///
    /// Nothing is kept if any step fails, including the entry number.
    #[instrument(skip(self, draft, lines, actor), fields(journal = %draft.journal_code, date = %draft.date))]
    pub async fn record_entry(&self, draft: DraftEntry, lines: Vec<NewLine>, actor: &Actor) -> LedgerResult<JournalEntry> {
        unit_of_work!(self, "record_entry", |tx| {
            let now = Utc::now();
            let entry = posting::open_draft(&mut tx, draft.clone(), actor, now).await?;
            for line in &lines {
                posting::add_line(&mut tx, entry.id, line.clone()).await?;
            }
            posting::post(&mut tx, entry.id, actor, now).await?
        })
    }

    #[instrument(skip(self, actor, reason))]
    pub async fn reverse(
        &self,
        entry_id: JournalEntryId,
        actor: &Actor,
        reason: &str,
        effective_date: NaiveDate,
    ) -> LedgerResult<JournalEntry> {
        unit_of_work!(self, "reverse", |tx| {
            posting::reverse(&mut tx, entry_id, actor, reason, effective_date, Utc::now()).await?
        })
    }

    pub async fn void(&self, entry_id: JournalEntryId, actor: &Actor) -> LedgerResult<JournalEntry> {
        unit_of_work!(self, "void", |tx| posting::void(&mut tx, entry_id, actor, Utc::now()).await?)
    }

    pub async fn entry(&self, entry_id: JournalEntryId) -> LedgerResult<EntryDetail> {
        unit_of_work!(self, "entry", |tx| posting::entry_detail(&mut tx, entry_id).await?)
    }

    pub async fn entries(&self, query: &EntryQuery) -> LedgerResult<Vec<JournalEntry>> {
        unit_of_work!(self, "entries", |tx| posting::list_entries(&mut tx, query).await?)
    }

    // Balances

    /// Balance of an account as of a date, in normal-balance terms
    pub async fn balance_as_of(&self, code: &str, date: NaiveDate) -> LedgerResult<Amount> {
        unit_of_work!(self, "balance_as_of", |tx| {
            let account = chart::get_account_by_code(&mut tx, code).await?;
            balance::balance_as_of(&mut tx, account.id, date).await?
        })
    }

    /// Debits and credits posted to an account in a period
    pub async fn period_movement(&self, code: &str, period_id: PeriodId) -> LedgerResult<(Amount, Amount)> {
        unit_of_work!(self, "period_movement", |tx| {
            let account = chart::get_account_by_code(&mut tx, code).await?;
            balance::period_movement(&mut tx, account.id, period_id).await?
        })
    }

    pub async fn recompute(&self, account_id: AccountId, period_id: PeriodId) -> LedgerResult<RecomputeOutcome> {
        unit_of_work!(self, "recompute", |tx| {
            balance::recompute(&mut tx, account_id, period_id, Utc::now()).await?
        })
    }

    pub async fn verify(&self, account_id: AccountId, period_id: PeriodId) -> LedgerResult<AccountBalance> {
        unit_of_work!(self, "verify", |tx| balance::verify(&mut tx, account_id, period_id).await?)
    }

    pub async fn recompute_account(&self, account_id: AccountId) -> LedgerResult<Vec<RecomputeOutcome>> {
        unit_of_work!(self, "recompute_account", |tx| {
            balance::recompute_account(&mut tx, account_id, Utc::now()).await?
        })
    }

    pub async fn balances_for_period(&self, period_id: PeriodId) -> LedgerResult<Vec<AccountBalance>> {
        unit_of_work!(self, "balances_for_period", |tx| {
            balance::balances_for_period(&mut tx, period_id).await?
        })
    }

    // Period close

    #[instrument(skip(self, actor, notes))]
    pub async fn close_period(&self, period_id: PeriodId, actor: &Actor, notes: Option<String>) -> LedgerResult<CloseOutcome> {
        unit_of_work!(self, "close_period", |tx| {
            close::close_period(
                &mut tx,
                period_id,
                actor,
                notes.clone(),
                &self.config.retained_earnings_code,
                Utc::now(),
            )
            .await?
        })
    }

    #[instrument(skip(self, actor, reason))]
    pub async fn reopen_period(&self, period_id: PeriodId, actor: &Actor, reason: &str) -> LedgerResult<AccountingPeriod> {
        unit_of_work!(self, "reopen_period", |tx| {
            close::reopen_period(&mut tx, period_id, actor, reason, Utc::now()).await?
        })
    }

    // Statements

    pub async fn trial_balance(&self, as_of: NaiveDate, comparative: Option<PeriodId>) -> LedgerResult<TrialBalance> {
        unit_of_work!(self, "trial_balance", |tx| {
            statements::trial_balance(&mut tx, as_of, comparative).await?
        })
    }

    pub async fn income_statement(&self, period_id: PeriodId, comparative: Option<PeriodId>) -> LedgerResult<IncomeStatement> {
        unit_of_work!(self, "income_statement", |tx| {
            statements::income_statement(&mut tx, period_id, comparative).await?
        })
    }

    pub async fn balance_sheet(&self, as_of: NaiveDate, comparative: Option<PeriodId>) -> LedgerResult<BalanceSheet> {
        unit_of_work!(self, "balance_sheet", |tx| {
            statements::balance_sheet(&mut tx, as_of, comparative, &self.config.retained_earnings_code).await?
        })
    }

    pub async fn generate_statement(&self, request: StatementRequest, actor: &Actor) -> LedgerResult<FinancialStatement> {
        unit_of_work!(self, "generate_statement", |tx| {
            statements::generate_statement(&mut tx, request, &self.config.retained_earnings_code, actor, Utc::now())
                .await?
        })
    }

    pub async fn statement(&self, id: StatementId) -> LedgerResult<FinancialStatement> {
        unit_of_work!(self, "statement", |tx| statements::get_statement(&mut tx, id).await?)
    }

    pub async fn statements(&self, statement_type: Option<StatementType>) -> LedgerResult<Vec<FinancialStatement>> {
        unit_of_work!(self, "statements", |tx| statements::list_statements(&mut tx, statement_type).await?)
    }

    // Expenses

    pub async fn create_expense_category(
        &self,
        name: &str,
        account_code: &str,
        description: Option<String>,
    ) -> LedgerResult<ExpenseCategory> {
        unit_of_work!(self, "create_expense_category", |tx| {
            expense::create_expense_category(&mut tx, name, account_code, description.clone(), Utc::now()).await?
        })
    }

    pub async fn record_expense(&self, new: NewExpense, actor: &Actor) -> LedgerResult<Expense> {
        unit_of_work!(self, "record_expense", |tx| {
            expense::record_expense(&mut tx, new.clone(), actor, Utc::now()).await?
        })
    }

    pub async fn submit_expense(&self, id: ExpenseId, actor: &Actor) -> LedgerResult<Expense> {
        unit_of_work!(self, "submit_expense", |tx| expense::submit_expense(&mut tx, id, actor, Utc::now()).await?)
    }

    pub async fn approve_expense(&self, id: ExpenseId, actor: &Actor) -> LedgerResult<Expense> {
        unit_of_work!(self, "approve_expense", |tx| expense::approve_expense(&mut tx, id, actor, Utc::now()).await?)
    }

    pub async fn reject_expense(&self, id: ExpenseId, actor: &Actor, reason: &str) -> LedgerResult<Expense> {
        unit_of_work!(self, "reject_expense", |tx| {
            expense::reject_expense(&mut tx, id, actor, reason, Utc::now()).await?
        })
    }

    pub async fn cancel_expense(&self, id: ExpenseId) -> LedgerResult<Expense> {
        unit_of_work!(self, "cancel_expense", |tx| expense::cancel_expense(&mut tx, id, Utc::now()).await?)
    }

    #[instrument(skip(self, actor))]
    pub async fn pay_expense(
        &self,
        id: ExpenseId,
        payment_account_code: &str,
        payment_date: NaiveDate,
        actor: &Actor,
    ) -> LedgerResult<(Expense, JournalEntry)> {
        unit_of_work!(self, "pay_expense", |tx| {
            expense::pay_expense(
                &mut tx,
                id,
                payment_account_code,
                payment_date,
                &self.config.tax_control_code,
                actor,
                Utc::now(),
            )
            .await?
        })
    }

    pub async fn expense(&self, id: ExpenseId) -> LedgerResult<Expense> {
        unit_of_work!(self, "expense", |tx| expense::get_expense(&mut tx, id).await?)
    }

    pub async fn expense_category(&self, id: ExpenseCategoryId) -> LedgerResult<Option<ExpenseCategory>> {
        unit_of_work!(self, "expense_category", |tx| tx.find_expense_category(id).await?)
    }

    // Payables

    pub async fn create_payable(&self, new: NewPayable, actor: &Actor) -> LedgerResult<AccountsPayable> {
        unit_of_work!(self, "create_payable", |tx| {
            payable::create_payable(&mut tx, new.clone(), actor, Utc::now()).await?
        })
    }

    pub async fn submit_payable(&self, id: PayableId) -> LedgerResult<AccountsPayable> {
        unit_of_work!(self, "submit_payable", |tx| payable::submit_payable(&mut tx, id, Utc::now()).await?)
    }

    #[instrument(skip(self, actor))]
    pub async fn approve_payable(
        &self,
        id: PayableId,
        entry_date: NaiveDate,
        actor: &Actor,
    ) -> LedgerResult<(AccountsPayable, JournalEntry)> {
        unit_of_work!(self, "approve_payable", |tx| {
            payable::approve_payable(
                &mut tx,
                id,
                entry_date,
                &self.config.accounts_payable_code,
                &self.config.tax_control_code,
                actor,
                Utc::now(),
            )
            .await?
        })
    }

    #[instrument(skip(self, request, actor))]
    pub async fn record_payment(
        &self,
        id: PayableId,
        request: PaymentRequest,
        actor: &Actor,
    ) -> LedgerResult<(AccountsPayable, JournalEntry)> {
        unit_of_work!(self, "record_payment", |tx| {
            payable::record_payment(
                &mut tx,
                id,
                request.clone(),
                &self.config.accounts_payable_code,
                actor,
                Utc::now(),
            )
            .await?
        })
    }

    pub async fn cancel_payable(
        &self,
        id: PayableId,
        reason: &str,
        effective_date: NaiveDate,
        actor: &Actor,
    ) -> LedgerResult<AccountsPayable> {
        unit_of_work!(self, "cancel_payable", |tx| {
            payable::cancel_payable(&mut tx, id, reason, effective_date, actor, Utc::now()).await?
        })
    }

    pub async fn payable(&self, id: PayableId) -> LedgerResult<AccountsPayable> {
        unit_of_work!(self, "payable", |tx| payable::get_payable(&mut tx, id).await?)
    }

    pub async fn payables(&self, status: Option<PayableStatus>) -> LedgerResult<Vec<AccountsPayable>> {
        unit_of_work!(self, "payables", |tx| payable::list_payables(&mut tx, status).await?)
    }

    pub async fn overdue_payables(&self, today: NaiveDate) -> LedgerResult<Vec<AccountsPayable>> {
        unit_of_work!(self, "overdue_payables", |tx| payable::list_overdue(&mut tx, today).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedgerStore;
    use core_kernel::PortError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ledger(retries: u32) -> Ledger<InMemoryLedgerStore> {
        let config = LedgerConfig {
            max_contention_retries: retries,
            ..LedgerConfig::default()
        };
        Ledger::new(InMemoryLedgerStore::new(), config)
    }

    #[tokio::test]
    async fn test_retry_stops_after_configured_attempts() {
        let ledger = ledger(2);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: LedgerResult<()> = ledger
            .retry_on_contention("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LedgerError::from(PortError::contention("test", 5)))
            })
            .await;

        assert!(matches!(result, Err(LedgerError::ContentionAborted { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let ledger = ledger(3);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: LedgerResult<()> = ledger
            .retry_on_contention("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LedgerError::validation("bad input"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_returns_first_success() {
        let ledger = ledger(3);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = ledger
            .retry_on_contention("test", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LedgerError::from(PortError::contention("test", 5)))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
    }
}
