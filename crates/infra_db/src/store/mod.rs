//! PostgreSQL Ledger Store
//!
//! This module provides the database adapter for the ledger storage port.
//! Each unit of work is a `SERIALIZABLE` transaction with a `lock_timeout`
//! equal to the configured ledger lock timeout. Row locks map onto
//! `FOR SHARE` and `FOR UPDATE`.
//!
//! # Error Handling
//!
//! Database errors are translated to `PortError` variants:
//! - serialization failure, deadlock, lock timeout -> `PortError::Contention`
//! - unique violation -> `PortError::Conflict`
//! - undecodable rows -> `PortError::Transformation`
//! - other errors -> `PortError::Internal`
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PgLedgerStore};
//! use domain_ledger::{Ledger, LedgerConfig};
//!
//! let pool = create_pool(DatabaseConfig::from_env()?).await?;
//! let config = LedgerConfig::from_env()?;
//! let ledger = Ledger::new(PgLedgerStore::new(pool, config.lock_timeout()), config);
//! ```

mod rows;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    AccountId, DomainPort, ExpenseCategoryId, ExpenseId, JournalEntryId, JournalId, LineId, PayableId, PeriodId,
    PortError, StatementId,
};
use domain_ledger::balance::AccountBalance;
use domain_ledger::entry::{LedgerLine, LineQuery};
use domain_ledger::{
    Account, AccountFilter, AccountingPeriod, AccountsPayable, EntryQuery, Expense, ExpenseCategory,
    FinancialStatement, Journal, JournalEntry, JournalEntryLine, LedgerStore, LedgerTx, PayableStatus, RowLock,
    StatementType,
};

use crate::error::DatabaseError;
use rows::{
    actor_text, convert_all, enum_text, AccountRow, BalanceRow, EntryRow, ExpenseCategoryRow, ExpenseRow,
    JournalRow, LedgerLineRow, LineRow, PayableRow, PeriodRow, StatementRow,
};

const ACCOUNT_COLUMNS: &str = "id, code, name, account_type, category, normal_balance, parent_id, description, \
     opening_balance, current_balance, status, is_cash, is_bank, is_contra, created_by, created_at, updated_at";

const PERIOD_COLUMNS: &str = "id, name, start_date, end_date, status, is_current, is_adjustment, opening_equity, \
     closing_equity, closing_entry_id, closed_by, closed_at, closing_notes, created_by, created_at";

/// Ledger order of periods
const PERIOD_ORDER: &str = "end_date, is_adjustment, start_date";

const JOURNAL_COLUMNS: &str = "id, code, name, journal_type, description, status, next_number, created_by, created_at";

const ENTRY_COLUMNS: &str = "id, number, journal_id, period_id, entry_date, description, reference, status, \
     total_debit, total_credit, reverses, reversed_by_entry, created_by, created_at, posted_by, posted_at, \
     reversed_by, reversed_at, reversal_reason, voided_by, voided_at";

const LINE_COLUMNS: &str = "id, entry_id, line_no, account_id, description, debit, credit, is_adjustment, is_closing";

const BALANCE_COLUMNS: &str =
    "account_id, period_id, opening_balance, period_debits, period_credits, closing_balance, updated_at";

const STATEMENT_COLUMNS: &str =
    "id, statement_type, as_of_date, period_id, comparative_period_id, payload, generated_by, generated_at";

const EXPENSE_COLUMNS: &str = "id, title, description, category_id, expense_date, vendor, invoice_number, \
     net_amount, tax_amount, gross_amount, status, submitted_by, submitted_at, approved_by, approved_at, \
     rejection_reason, paid_by, paid_at, payment_account_id, journal_entry_id, created_by, created_at, updated_at";

const PAYABLE_COLUMNS: &str = "id, vendor, vendor_invoice_number, invoice_date, due_date, payment_terms, \
     description, lines, subtotal, tax_amount, total_amount, amount_paid, status, payments, approval_entry_id, \
     approved_by, approved_at, cancellation_reason, created_by, created_at, updated_at";

fn port_error(operation: &str, waited_ms: u64, error: sqlx::Error) -> PortError {
    DatabaseError::from(&error).into_port_error(operation, waited_ms)
}

fn lock_clause(lock: RowLock) -> &'static str {
    match lock {
        RowLock::None => "",
        RowLock::Shared => " FOR SHARE",
        RowLock::Exclusive => " FOR UPDATE",
    }
}

fn ensure_found(rows_affected: u64, entity: &str, id: impl std::fmt::Display) -> Result<(), PortError> {
    if rows_affected == 0 {
        return Err(PortError::not_found(entity, id));
    }
    Ok(())
}

/// PostgreSQL-backed source of ledger units of work
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    /// Creates a store over `pool`; `lock_timeout` bounds every lock wait
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DomainPort for PgLedgerStore {}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    #[instrument(skip(self))]
    async fn begin(&self) -> Result<PgLedgerTx, PortError> {
        let waited_ms = u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| port_error("begin", waited_ms, e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| port_error("begin", waited_ms, e))?;
        let set_timeout = format!("SET LOCAL lock_timeout = {}", waited_ms);
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| port_error("begin", waited_ms, e))?;

        debug!("Started serializable unit of work");
        Ok(PgLedgerTx { tx, waited_ms })
    }
}

/// One serializable PostgreSQL transaction
///
/// Dropping the value without calling `commit` rolls the transaction back.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
    waited_ms: u64,
}

impl std::fmt::Debug for PgLedgerTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgLedgerTx").field("lock_timeout_ms", &self.waited_ms).finish()
    }
}

impl PgLedgerTx {
    fn failed(&self, operation: &'static str) -> impl Fn(sqlx::Error) -> PortError {
        let waited_ms = self.waited_ms;
        move |error| port_error(operation, waited_ms, error)
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    #[instrument(skip(self))]
    async fn commit(self) -> Result<(), PortError> {
        let waited_ms = self.waited_ms;
        self.tx
            .commit()
            .await
            .map_err(|e| port_error("commit", waited_ms, e))
    }

    // Accounts

    async fn insert_account(&mut self, account: &Account) -> Result<(), PortError> {
        let statement = format!(
            "INSERT INTO ledger_accounts ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            ACCOUNT_COLUMNS
        );
        sqlx::query(&statement)
            .bind(*account.id.as_uuid())
            .bind(&account.code)
            .bind(&account.name)
            .bind(enum_text(&account.account_type)?)
            .bind(enum_text(&account.category)?)
            .bind(enum_text(&account.normal_balance)?)
            .bind(account.parent_id.map(|id| *id.as_uuid()))
            .bind(&account.description)
            .bind(account.opening_balance.value())
            .bind(account.current_balance.value())
            .bind(enum_text(&account.status)?)
            .bind(account.is_cash)
            .bind(account.is_bank)
            .bind(account.is_contra)
            .bind(account.created_by.as_str())
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(self.failed("insert_account"))?;
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE ledger_accounts SET code = $2, name = $3, category = $4, normal_balance = $5, \
             parent_id = $6, description = $7, opening_balance = $8, current_balance = $9, status = $10, \
             is_cash = $11, is_bank = $12, is_contra = $13, updated_at = $14 WHERE id = $1",
        )
        .bind(*account.id.as_uuid())
        .bind(&account.code)
        .bind(&account.name)
        .bind(enum_text(&account.category)?)
        .bind(enum_text(&account.normal_balance)?)
        .bind(account.parent_id.map(|id| *id.as_uuid()))
        .bind(&account.description)
        .bind(account.opening_balance.value())
        .bind(account.current_balance.value())
        .bind(enum_text(&account.status)?)
        .bind(account.is_cash)
        .bind(account.is_bank)
        .bind(account.is_contra)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(self.failed("update_account"))?;
        ensure_found(result.rows_affected(), "Account", account.id)
    }

    async fn find_account(&mut self, id: AccountId, lock: RowLock) -> Result<Option<Account>, PortError> {
        let statement = format!(
            "SELECT {} FROM ledger_accounts WHERE id = $1{}",
            ACCOUNT_COLUMNS,
            lock_clause(lock)
        );
        sqlx::query_as::<_, AccountRow>(&statement)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(self.failed("find_account"))?
            .map(Account::try_from)
            .transpose()
    }

    async fn find_account_by_code(&mut self, code: &str) -> Result<Option<Account>, PortError> {
        let statement = format!("SELECT {} FROM ledger_accounts WHERE lower(code) = lower($1)", ACCOUNT_COLUMNS);
        sqlx::query_as::<_, AccountRow>(&statement)
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(self.failed("find_account_by_code"))?
            .map(Account::try_from)
            .transpose()
    }

    async fn list_accounts(&mut self, filter: &AccountFilter) -> Result<Vec<Account>, PortError> {
        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM ledger_accounts WHERE TRUE", ACCOUNT_COLUMNS));
        if let Some(account_type) = filter.account_type {
            query.push(" AND account_type = ").push_bind(enum_text(&account_type)?);
        }
        if let Some(category) = filter.category {
            query.push(" AND category = ").push_bind(enum_text(&category)?);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(enum_text(&status)?);
        }
        query.push(" ORDER BY code");

        let rows: Vec<AccountRow> = query
            .build_query_as()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(self.failed("list_accounts"))?;
        convert_all(rows)
    }

    // Periods

    async fn insert_period(&mut self, period: &AccountingPeriod) -> Result<(), PortError> {
        let statement = format!(
            "INSERT INTO accounting_periods ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            PERIOD_COLUMNS
        );
        sqlx::query(&statement)
            .bind(*period.id.as_uuid())
            .bind(&period.name)
            .bind(period.start_date)
            .bind(period.end_date)
            .bind(enum_text(&period.status)?)
            .bind(period.is_current)
            .bind(period.is_adjustment)
            .bind(period.opening_equity.value())
            .bind(period.closing_equity.map(|a| a.value()))
            .bind(period.closing_entry_id.map(|id| *id.as_uuid()))
            .bind(actor_text(&period.closed_by))
            .bind(period.closed_at)
            .bind(&period.closing_notes)
            .bind(period.created_by.as_str())
            .bind(period.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(self.failed("insert_period"))?;
        Ok(())
    }

    async fn update_period(&mut self, period: &AccountingPeriod) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE accounting_periods SET name = $2, status = $3, is_current = $4, opening_equity = $5, \
             closing_equity = $6, closing_entry_id = $7, closed_by = $8, closed_at = $9, closing_notes = $10 \
             WHERE id = $1",
        )
        .bind(*period.id.as_uuid())
        .bind(&period.name)
        .bind(enum_text(&period.status)?)
        .bind(period.is_current)
        .bind(period.opening_equity.value())
        .bind(period.closing_equity.map(|a| a.value()))
        .bind(period.closing_entry_id.map(|id| *id.as_uuid()))
        .bind(actor_text(&period.closed_by))
        .bind(period.closed_at)
        .bind(&period.closing_notes)
        .execute(&mut *self.tx)
        .await
        .map_err(self.failed("update_period"))?;
        ensure_found(result.rows_affected(), "AccountingPeriod", period.id)
    }

    async fn find_period(&mut self, id: PeriodId, lock: RowLock) -> Result<Option<AccountingPeriod>, PortError> {
        let statement = format!(
            "SELECT {} FROM accounting_periods WHERE id = $1{}",
            PERIOD_COLUMNS,
            lock_clause(lock)
        );
        sqlx::query_as::<_, PeriodRow>(&statement)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(self.failed("find_period"))?
            .map(AccountingPeriod::try_from)
            .transpose()
    }

    async fn list_periods(&mut self) -> Result<Vec<AccountingPeriod>, PortError> {
        let statement = format!("SELECT {} FROM accounting_periods ORDER BY {}", PERIOD_COLUMNS, PERIOD_ORDER);
        let rows = sqlx::query_as::<_, PeriodRow>(&statement)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(self.failed("list_periods"))?;
        convert_all(rows)
    }

    // Journals

    async fn insert_journal(&mut self, journal: &Journal) -> Result<(), PortError> {
        let statement = format!(
            "INSERT INTO journals ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            JOURNAL_COLUMNS
        );
        sqlx::query(&statement)
            .bind(*journal.id.as_uuid())
            .bind(&journal.code)
            .bind(&journal.name)
            .bind(enum_text(&journal.journal_type)?)
            .bind(&journal.description)
            .bind(enum_text(&journal.status)?)
            .bind(sequence(journal.next_number)?)
            .bind(journal.created_by.as_str())
            .bind(journal.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(self.failed("insert_journal"))?;
        Ok(())
    }

    async fn update_journal(&mut self, journal: &Journal) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE journals SET name = $2, description = $3, status = $4, next_number = $5 WHERE id = $1",
        )
        .bind(*journal.id.as_uuid())
        .bind(&journal.name)
        .bind(&journal.description)
        .bind(enum_text(&journal.status)?)
        .bind(sequence(journal.next_number)?)
        .execute(&mut *self.tx)
        .await
        .map_err(self.failed("update_journal"))?;
        ensure_found(result.rows_affected(), "Journal", journal.id)
    }

    async fn find_journal(&mut self, id: JournalId, lock: RowLock) -> Result<Option<Journal>, PortError> {
        let statement = format!("SELECT {} FROM journals WHERE id = $1{}", JOURNAL_COLUMNS, lock_clause(lock));
        sqlx::query_as::<_, JournalRow>(&statement)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(self.failed("find_journal"))?
            .map(Journal::try_from)
            .transpose()
    }

    async fn find_journal_by_code(&mut self, code: &str) -> Result<Option<Journal>, PortError> {
        let statement = format!("SELECT {} FROM journals WHERE lower(code) = lower($1)", JOURNAL_COLUMNS);
        sqlx::query_as::<_, JournalRow>(&statement)
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(self.failed("find_journal_by_code"))?
            .map(Journal::try_from)
            .transpose()
    }

    async fn list_journals(&mut self) -> Result<Vec<Journal>, PortError> {
        let statement = format!("SELECT {} FROM journals ORDER BY code", JOURNAL_COLUMNS);
        let rows = sqlx::query_as::<_, JournalRow>(&statement)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(self.failed("list_journals"))?;
        convert_all(rows)
    }

    // Entries and lines

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        let statement = format!(
            "INSERT INTO journal_entries ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)",
            ENTRY_COLUMNS
        );
        sqlx::query(&statement)
            .bind(*entry.id.as_uuid())
            .bind(&entry.number)
            .bind(*entry.journal_id.as_uuid())
            .bind(*entry.period_id.as_uuid())
            .bind(entry.date)
            .bind(&entry.description)
            .bind(&entry.reference)
            .bind(enum_text(&entry.status)?)
            .bind(entry.total_debit.value())
            .bind(entry.total_credit.value())
            .bind(entry.reverses.map(|id| *id.as_uuid()))
            .bind(entry.reversed_by_entry.map(|id| *id.as_uuid()))
            .bind(entry.created_by.as_str())
            .bind(entry.created_at)
            .bind(actor_text(&entry.posted_by))
            .bind(entry.posted_at)
            .bind(actor_text(&entry.reversed_by))
            .bind(entry.reversed_at)
            .bind(&entry.reversal_reason)
            .bind(actor_text(&entry.voided_by))
            .bind(entry.voided_at)
            .execute(&mut *self.tx)
            .await
            .map_err(self.failed("insert_entry"))?;
        Ok(())
    }

    async fn update_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE journal_entries SET period_id = $2, entry_date = $3, description = $4, reference = $5, \
             status = $6, total_debit = $7, total_credit = $8, reversed_by_entry = $9, posted_by = $10, \
             posted_at = $11, reversed_by = $12, reversed_at = $13, reversal_reason = $14, voided_by = $15, \
             voided_at = $16 WHERE id = $1",
        )
        .bind(*entry.id.as_uuid())
        .bind(*entry.period_id.as_uuid())
        .bind(entry.date)
        .bind(&entry.description)
        .bind(&entry.reference)
        .bind(enum_text(&entry.status)?)
        .bind(entry.total_debit.value())
        .bind(entry.total_credit.value())
        .bind(entry.reversed_by_entry.map(|id| *id.as_uuid()))
        .bind(actor_text(&entry.posted_by))
        .bind(entry.posted_at)
        .bind(actor_text(&entry.reversed_by))
        .bind(entry.reversed_at)
        .bind(&entry.reversal_reason)
        .bind(actor_text(&entry.voided_by))
        .bind(entry.voided_at)
        .execute(&mut *self.tx)
        .await
        .map_err(self.failed("update_entry"))?;
        ensure_found(result.rows_affected(), "JournalEntry", entry.id)
    }

    async fn find_entry(&mut self, id: JournalEntryId, lock: RowLock) -> Result<Option<JournalEntry>, PortError> {
        let statement = format!(
            "SELECT {} FROM journal_entries WHERE id = $1{}",
            ENTRY_COLUMNS,
            lock_clause(lock)
        );
        sqlx::query_as::<_, EntryRow>(&statement)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(self.failed("find_entry"))?
            .map(JournalEntry::try_from)
            .transpose()
    }

    async fn list_entries(&mut self, query: &EntryQuery) -> Result<Vec<JournalEntry>, PortError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM journal_entries WHERE TRUE", ENTRY_COLUMNS));
        if let Some(journal_id) = query.journal_id {
            builder.push(" AND journal_id = ").push_bind(*journal_id.as_uuid());
        }
        if let Some(period_id) = query.period_id {
            builder.push(" AND period_id = ").push_bind(*period_id.as_uuid());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(enum_text(&status)?);
        }
        if let Some(from) = query.date_from {
            builder.push(" AND entry_date >= ").push_bind(from);
        }
        if let Some(to) = query.date_to {
            builder.push(" AND entry_date <= ").push_bind(to);
        }
        builder.push(" ORDER BY entry_date, number");

        let rows: Vec<EntryRow> = builder
            .build_query_as()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(self.failed("list_entries"))?;
        convert_all(rows)
    }

    async fn insert_line(&mut self, line: &JournalEntryLine) -> Result<(), PortError> {
        let statement = format!(
            "INSERT INTO journal_entry_lines ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            LINE_COLUMNS
        );
        let line_no = i32::try_from(line.line_no).map_err(|_| PortError::transformation("line_no out of range"))?;
        sqlx::query(&statement)
            .bind(*line.id.as_uuid())
            .bind(*line.entry_id.as_uuid())
            .bind(line_no)
            .bind(*line.account_id.as_uuid())
            .bind(&line.description)
            .bind(line.debit.value())
            .bind(line.credit.value())
            .bind(line.is_adjustment)
            .bind(line.is_closing)
            .execute(&mut *self.tx)
            .await
            .map_err(self.failed("insert_line"))?;
        Ok(())
    }

    async fn delete_line(&mut self, id: LineId) -> Result<(), PortError> {
        let result = sqlx::query("DELETE FROM journal_entry_lines WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(self.failed("delete_line"))?;
        ensure_found(result.rows_affected(), "JournalEntryLine", id)
    }

    async fn lines_for_entry(&mut self, entry_id: JournalEntryId) -> Result<Vec<JournalEntryLine>, PortError> {
        let statement = format!(
            "SELECT {} FROM journal_entry_lines WHERE entry_id = $1 ORDER BY line_no",
            LINE_COLUMNS
        );
        let rows = sqlx::query_as::<_, LineRow>(&statement)
            .bind(*entry_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(self.failed("lines_for_entry"))?;
        convert_all(rows)
    }

    #[instrument(skip(self))]
    async fn ledger_lines(&mut self, query: &LineQuery) -> Result<Vec<LedgerLine>, PortError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT l.id, l.entry_id, l.line_no, l.account_id, l.description, l.debit, l.credit, \
             l.is_adjustment, l.is_closing, e.number AS entry_number, e.journal_id, e.period_id, \
             e.entry_date, e.status AS entry_status \
             FROM journal_entry_lines l JOIN journal_entries e ON e.id = l.entry_id WHERE TRUE",
        );
        if let Some(account_id) = query.account_id {
            builder.push(" AND l.account_id = ").push_bind(*account_id.as_uuid());
        }
        if let Some(period_ids) = &query.period_ids {
            let ids: Vec<Uuid> = period_ids.iter().map(|id| *id.as_uuid()).collect();
            builder.push(" AND e.period_id = ANY(").push_bind(ids).push(")");
        }
        if let Some(from) = query.date_from {
            builder.push(" AND e.entry_date >= ").push_bind(from);
        }
        if let Some(to) = query.date_to {
            builder.push(" AND e.entry_date <= ").push_bind(to);
        }
        if !query.statuses.is_empty() {
            let statuses = query
                .statuses
                .iter()
                .map(enum_text)
                .collect::<Result<Vec<String>, PortError>>()?;
            builder.push(" AND e.status = ANY(").push_bind(statuses).push(")");
        }
        if query.exclude_closing {
            builder.push(" AND NOT l.is_closing");
        }
        builder.push(" ORDER BY e.entry_date, e.number, l.line_no");

        let rows: Vec<LedgerLineRow> = builder
            .build_query_as()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(self.failed("ledger_lines"))?;
        debug!(count = rows.len(), "Read ledger lines");
        convert_all(rows)
    }

    // Balance roll-ups

    async fn find_balance(
        &mut self,
        account_id: AccountId,
        period_id: PeriodId,
        lock: RowLock,
    ) -> Result<Option<AccountBalance>, PortError> {
        let statement = format!(
            "SELECT {} FROM account_balances WHERE account_id = $1 AND period_id = $2{}",
            BALANCE_COLUMNS,
            lock_clause(lock)
        );
        sqlx::query_as::<_, BalanceRow>(&statement)
            .bind(*account_id.as_uuid())
            .bind(*period_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(self.failed("find_balance"))?
            .map(AccountBalance::try_from)
            .transpose()
    }

    async fn upsert_balance(&mut self, balance: &AccountBalance) -> Result<(), PortError> {
        let statement = format!(
            "INSERT INTO account_balances ({}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (account_id, period_id) DO UPDATE SET \
             opening_balance = EXCLUDED.opening_balance, period_debits = EXCLUDED.period_debits, \
             period_credits = EXCLUDED.period_credits, closing_balance = EXCLUDED.closing_balance, \
             updated_at = EXCLUDED.updated_at",
            BALANCE_COLUMNS
        );
        sqlx::query(&statement)
            .bind(*balance.account_id.as_uuid())
            .bind(*balance.period_id.as_uuid())
            .bind(balance.opening_balance.value())
            .bind(balance.period_debits.value())
            .bind(balance.period_credits.value())
            .bind(balance.closing_balance.value())
            .bind(balance.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(self.failed("upsert_balance"))?;
        Ok(())
    }

    async fn balances_for_account(
        &mut self,
        account_id: AccountId,
        lock: RowLock,
    ) -> Result<Vec<AccountBalance>, PortError> {
        let lock = match lock {
            RowLock::None => "",
            RowLock::Shared => " FOR SHARE OF b",
            RowLock::Exclusive => " FOR UPDATE OF b",
        };
        let statement = format!(
            "SELECT b.account_id, b.period_id, b.opening_balance, b.period_debits, b.period_credits, \
             b.closing_balance, b.updated_at \
             FROM account_balances b JOIN accounting_periods p ON p.id = b.period_id \
             WHERE b.account_id = $1 ORDER BY p.end_date, p.is_adjustment, p.start_date{}",
            lock
        );
        let rows = sqlx::query_as::<_, BalanceRow>(&statement)
            .bind(*account_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(self.failed("balances_for_account"))?;
        convert_all(rows)
    }

    async fn balances_for_period(&mut self, period_id: PeriodId) -> Result<Vec<AccountBalance>, PortError> {
        let statement = format!("SELECT {} FROM account_balances WHERE period_id = $1", BALANCE_COLUMNS);
        let rows = sqlx::query_as::<_, BalanceRow>(&statement)
            .bind(*period_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(self.failed("balances_for_period"))?;
        convert_all(rows)
    }

    // Financial statements (insert only)

    async fn insert_statement(&mut self, statement: &FinancialStatement) -> Result<(), PortError> {
        let sql = format!(
            "INSERT INTO financial_statements ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            STATEMENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(*statement.id.as_uuid())
            .bind(enum_text(&statement.statement_type)?)
            .bind(statement.as_of_date)
            .bind(statement.period_id.map(|id| *id.as_uuid()))
            .bind(statement.comparative_period_id.map(|id| *id.as_uuid()))
            .bind(&statement.payload)
            .bind(statement.generated_by.as_str())
            .bind(statement.generated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(self.failed("insert_statement"))?;
        Ok(())
    }

    async fn find_statement(&mut self, id: StatementId) -> Result<Option<FinancialStatement>, PortError> {
        let sql = format!("SELECT {} FROM financial_statements WHERE id = $1", STATEMENT_COLUMNS);
        sqlx::query_as::<_, StatementRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(self.failed("find_statement"))?
            .map(FinancialStatement::try_from)
            .transpose()
    }

    async fn list_statements(
        &mut self,
        statement_type: Option<StatementType>,
    ) -> Result<Vec<FinancialStatement>, PortError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM financial_statements WHERE TRUE",
            STATEMENT_COLUMNS
        ));
        if let Some(statement_type) = statement_type {
            builder.push(" AND statement_type = ").push_bind(enum_text(&statement_type)?);
        }
        builder.push(" ORDER BY generated_at DESC");

        let rows: Vec<StatementRow> = builder
            .build_query_as()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(self.failed("list_statements"))?;
        convert_all(rows)
    }

    // Expense subledger

    async fn insert_expense_category(&mut self, category: &ExpenseCategory) -> Result<(), PortError> {
        sqlx::query(
            "INSERT INTO expense_categories (id, name, account_id, description, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(*category.id.as_uuid())
        .bind(&category.name)
        .bind(*category.account_id.as_uuid())
        .bind(&category.description)
        .bind(category.is_active)
        .bind(category.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(self.failed("insert_expense_category"))?;
        Ok(())
    }

    async fn find_expense_category(&mut self, id: ExpenseCategoryId) -> Result<Option<ExpenseCategory>, PortError> {
        let row = sqlx::query_as::<_, ExpenseCategoryRow>(
            "SELECT id, name, account_id, description, is_active, created_at FROM expense_categories WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(self.failed("find_expense_category"))?;
        Ok(row.map(ExpenseCategory::from))
    }

    async fn insert_expense(&mut self, expense: &Expense) -> Result<(), PortError> {
        let statement = format!(
            "INSERT INTO expenses ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
             $15, $16, $17, $18, $19, $20, $21, $22, $23)",
            EXPENSE_COLUMNS
        );
        sqlx::query(&statement)
            .bind(*expense.id.as_uuid())
            .bind(&expense.title)
            .bind(&expense.description)
            .bind(*expense.category_id.as_uuid())
            .bind(expense.expense_date)
            .bind(&expense.vendor)
            .bind(&expense.invoice_number)
            .bind(expense.net_amount.value())
            .bind(expense.tax_amount.value())
            .bind(expense.gross_amount.value())
            .bind(enum_text(&expense.status)?)
            .bind(actor_text(&expense.submitted_by))
            .bind(expense.submitted_at)
            .bind(actor_text(&expense.approved_by))
            .bind(expense.approved_at)
            .bind(&expense.rejection_reason)
            .bind(actor_text(&expense.paid_by))
            .bind(expense.paid_at)
            .bind(expense.payment_account_id.map(|id| *id.as_uuid()))
            .bind(expense.journal_entry_id.map(|id| *id.as_uuid()))
            .bind(expense.created_by.as_str())
            .bind(expense.created_at)
            .bind(expense.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(self.failed("insert_expense"))?;
        Ok(())
    }

    async fn update_expense(&mut self, expense: &Expense) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE expenses SET status = $2, submitted_by = $3, submitted_at = $4, approved_by = $5, \
             approved_at = $6, rejection_reason = $7, paid_by = $8, paid_at = $9, payment_account_id = $10, \
             journal_entry_id = $11, updated_at = $12 WHERE id = $1",
        )
        .bind(*expense.id.as_uuid())
        .bind(enum_text(&expense.status)?)
        .bind(actor_text(&expense.submitted_by))
        .bind(expense.submitted_at)
        .bind(actor_text(&expense.approved_by))
        .bind(expense.approved_at)
        .bind(&expense.rejection_reason)
        .bind(actor_text(&expense.paid_by))
        .bind(expense.paid_at)
        .bind(expense.payment_account_id.map(|id| *id.as_uuid()))
        .bind(expense.journal_entry_id.map(|id| *id.as_uuid()))
        .bind(expense.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(self.failed("update_expense"))?;
        ensure_found(result.rows_affected(), "Expense", expense.id)
    }

    async fn find_expense(&mut self, id: ExpenseId, lock: RowLock) -> Result<Option<Expense>, PortError> {
        let statement = format!("SELECT {} FROM expenses WHERE id = $1{}", EXPENSE_COLUMNS, lock_clause(lock));
        sqlx::query_as::<_, ExpenseRow>(&statement)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(self.failed("find_expense"))?
            .map(Expense::try_from)
            .transpose()
    }

    // Payables subledger

    async fn insert_payable(&mut self, payable: &AccountsPayable) -> Result<(), PortError> {
        let statement = format!(
            "INSERT INTO accounts_payable ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
             $13, $14, $15, $16, $17, $18, $19, $20, $21)",
            PAYABLE_COLUMNS
        );
        sqlx::query(&statement)
            .bind(*payable.id.as_uuid())
            .bind(&payable.vendor)
            .bind(&payable.vendor_invoice_number)
            .bind(payable.invoice_date)
            .bind(payable.due_date)
            .bind(enum_text(&payable.payment_terms)?)
            .bind(&payable.description)
            .bind(Json(&payable.lines))
            .bind(payable.subtotal.value())
            .bind(payable.tax_amount.value())
            .bind(payable.total_amount.value())
            .bind(payable.amount_paid.value())
            .bind(enum_text(&payable.status)?)
            .bind(Json(&payable.payments))
            .bind(payable.approval_entry_id.map(|id| *id.as_uuid()))
            .bind(actor_text(&payable.approved_by))
            .bind(payable.approved_at)
            .bind(&payable.cancellation_reason)
            .bind(payable.created_by.as_str())
            .bind(payable.created_at)
            .bind(payable.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(self.failed("insert_payable"))?;
        Ok(())
    }

    async fn update_payable(&mut self, payable: &AccountsPayable) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE accounts_payable SET amount_paid = $2, status = $3, payments = $4, approval_entry_id = $5, \
             approved_by = $6, approved_at = $7, cancellation_reason = $8, updated_at = $9 WHERE id = $1",
        )
        .bind(*payable.id.as_uuid())
        .bind(payable.amount_paid.value())
        .bind(enum_text(&payable.status)?)
        .bind(Json(&payable.payments))
        .bind(payable.approval_entry_id.map(|id| *id.as_uuid()))
        .bind(actor_text(&payable.approved_by))
        .bind(payable.approved_at)
        .bind(&payable.cancellation_reason)
        .bind(payable.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(self.failed("update_payable"))?;
        ensure_found(result.rows_affected(), "AccountsPayable", payable.id)
    }

    async fn find_payable(&mut self, id: PayableId, lock: RowLock) -> Result<Option<AccountsPayable>, PortError> {
        let statement = format!(
            "SELECT {} FROM accounts_payable WHERE id = $1{}",
            PAYABLE_COLUMNS,
            lock_clause(lock)
        );
        sqlx::query_as::<_, PayableRow>(&statement)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(self.failed("find_payable"))?
            .map(AccountsPayable::try_from)
            .transpose()
    }

    async fn list_payables(&mut self, status: Option<PayableStatus>) -> Result<Vec<AccountsPayable>, PortError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM accounts_payable WHERE TRUE", PAYABLE_COLUMNS));
        if let Some(status) = status {
            builder.push(" AND status = ").push_bind(enum_text(&status)?);
        }
        builder.push(" ORDER BY invoice_date, created_at");

        let rows: Vec<PayableRow> = builder
            .build_query_as()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(self.failed("list_payables"))?;
        convert_all(rows)
    }
}

/// Journal sequence as stored in a `BIGINT` column
fn sequence(next_number: u64) -> Result<i64, PortError> {
    i64::try_from(next_number).map_err(|_| PortError::transformation("journal sequence out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_clause() {
        assert_eq!(lock_clause(RowLock::None), "");
        assert_eq!(lock_clause(RowLock::Shared), " FOR SHARE");
        assert_eq!(lock_clause(RowLock::Exclusive), " FOR UPDATE");
    }

    #[test]
    fn test_ensure_found() {
        assert!(ensure_found(1, "Account", "x").is_ok());
        assert!(matches!(ensure_found(0, "Account", "x"), Err(PortError::NotFound { .. })));
    }
}
