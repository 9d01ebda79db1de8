//! Statement builder
//!
//! Builds trial balances, income statements and balance sheets from
//! effective ledger lines. Builders return structured payloads with
//! per-section lines and totals; presentation is left to the caller.
//!
//! # Sign conventions
//!
//! - Trial balance: each balance sits on the account's own normal side,
//!   sign kept, so a contra account shows on its contra side.
//! - Income statement and balance sheet: amounts are signed by account
//!   type, so contra accounts reduce their section.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use core_kernel::{AccountId, Actor, Amount, PeriodId, PortError, StatementId};

use crate::account::{Account, AccountFilter, AccountType, BalanceSide};
use crate::close::income_contribution;
use crate::entry::{LedgerLine, LineQuery};
use crate::error::{LedgerError, LedgerResult};
use crate::period;
use crate::store::LedgerTx;

/// Kinds of persisted statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    TrialBalance,
    BalanceSheet,
    IncomeStatement,
}

impl StatementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementType::TrialBalance => "trial_balance",
            StatementType::BalanceSheet => "balance_sheet",
            StatementType::IncomeStatement => "income_statement",
        }
    }
}

/// One account row of a trial balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceLine {
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit_balance: Amount,
    pub credit_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub as_of: NaiveDate,
    pub lines: Vec<TrialBalanceLine>,
    pub total_debits: Amount,
    pub total_credits: Amount,
    pub is_balanced: bool,
    pub comparative: Option<Box<TrialBalance>>,
}

impl TrialBalance {
    /// Row for an account code, if the account is listed
    pub fn line(&self, code: &str) -> Option<&TrialBalanceLine> {
        self.lines.iter().find(|l| l.code.eq_ignore_ascii_case(code))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    /// `None` for computed rows such as current earnings
    pub account_id: Option<AccountId>,
    pub code: Option<String>,
    pub name: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementSection {
    pub title: String,
    pub lines: Vec<StatementLine>,
    pub total: Amount,
}

impl StatementSection {
    fn new(title: &str, lines: Vec<StatementLine>) -> LedgerResult<Self> {
        let total = Amount::checked_sum(lines.iter().map(|l| &l.amount))?;
        Ok(Self {
            title: title.to_string(),
            lines,
            total,
        })
    }

    /// Amount on the row for an account code
    pub fn amount_for(&self, code: &str) -> Option<Amount> {
        self.lines
            .iter()
            .find(|l| l.code.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(code)))
            .map(|l| l.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub period_id: PeriodId,
    pub period_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub revenue: StatementSection,
    pub expenses: StatementSection,
    pub net_income: Amount,
    pub comparative: Option<Box<IncomeStatement>>,
}

/// Where the equity section's earnings come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetainedEarningsBreakdown {
    /// Net income moved into retained earnings by closing entries dated on
    /// or before the statement date
    pub closed_periods: Amount,
    /// Revenue less expenses not yet closed
    pub current_earnings: Amount,
    /// Retained earnings account balance plus current earnings
    pub total: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub as_of: NaiveDate,
    pub assets: StatementSection,
    pub liabilities: StatementSection,
    /// Includes a computed current-earnings row
    pub equity: StatementSection,
    pub retained_earnings: RetainedEarningsBreakdown,
    pub total_liabilities_and_equity: Amount,
    pub comparative: Option<Box<BalanceSheet>>,
}

/// A generated statement, stored write-once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatement {
    pub id: StatementId,
    pub statement_type: StatementType,
    pub as_of_date: NaiveDate,
    /// Set for income statements
    pub period_id: Option<PeriodId>,
    pub comparative_period_id: Option<PeriodId>,
    pub payload: serde_json::Value,
    pub generated_by: Actor,
    pub generated_at: DateTime<Utc>,
}

/// What to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementRequest {
    TrialBalance {
        as_of: NaiveDate,
        comparative: Option<PeriodId>,
    },
    IncomeStatement {
        period_id: PeriodId,
        comparative: Option<PeriodId>,
    },
    BalanceSheet {
        as_of: NaiveDate,
        comparative: Option<PeriodId>,
    },
}

/// Trial balance as of `as_of`
///
/// Lists every active account, plus any inactive account still carrying a
/// balance on that date so the columns stay complete. With `comparative`,
/// the same listing as of that period's end date is attached.
#[instrument(skip(tx))]
pub async fn trial_balance<T: LedgerTx>(
    tx: &mut T,
    as_of: NaiveDate,
    comparative: Option<PeriodId>,
) -> LedgerResult<TrialBalance> {
    let mut current = build_trial_balance(tx, as_of).await?;
    if let Some(period_id) = comparative {
        let prior = period::get_period(tx, period_id).await?;
        current.comparative = Some(Box::new(build_trial_balance(tx, prior.end_date).await?));
    }
    Ok(current)
}

async fn build_trial_balance<T: LedgerTx>(tx: &mut T, as_of: NaiveDate) -> LedgerResult<TrialBalance> {
    let accounts = tx.list_accounts(&AccountFilter::all()).await?;
    let lines = tx.ledger_lines(&LineQuery::effective().through(as_of)).await?;
    let balances = natural_balances(&accounts, &lines)?;

    let mut rows = Vec::new();
    let mut total_debits = Amount::ZERO;
    let mut total_credits = Amount::ZERO;
    for account in &accounts {
        let natural = balances.get(&account.id).copied().unwrap_or(Amount::ZERO);
        if !account.is_active() && natural.is_zero() {
            continue;
        }
        let (debit_balance, credit_balance) = match account.normal_balance {
            BalanceSide::Debit => (natural, Amount::ZERO),
            BalanceSide::Credit => (Amount::ZERO, natural),
        };
        total_debits = total_debits.checked_add(&debit_balance)?;
        total_credits = total_credits.checked_add(&credit_balance)?;
        rows.push(TrialBalanceLine {
            account_id: account.id,
            code: account.code.clone(),
            name: account.name.clone(),
            account_type: account.account_type,
            debit_balance,
            credit_balance,
        });
    }

    let is_balanced = total_debits == total_credits;
    if !is_balanced {
        warn!(
            as_of = %as_of,
            total_debits = %total_debits,
            total_credits = %total_credits,
            "Trial balance does not balance"
        );
    }
    Ok(TrialBalance {
        as_of,
        lines: rows,
        total_debits,
        total_credits,
        is_balanced,
        comparative: None,
    })
}

/// Income statement for a period
///
/// Counts effective lines belonging to the period, leaving out closing
/// lines so the statement reads the same before and after close.
#[instrument(skip(tx))]
pub async fn income_statement<T: LedgerTx>(
    tx: &mut T,
    period_id: PeriodId,
    comparative: Option<PeriodId>,
) -> LedgerResult<IncomeStatement> {
    let mut current = build_income_statement(tx, period_id).await?;
    if let Some(prior) = comparative {
        current.comparative = Some(Box::new(build_income_statement(tx, prior).await?));
    }
    Ok(current)
}

async fn build_income_statement<T: LedgerTx>(tx: &mut T, period_id: PeriodId) -> LedgerResult<IncomeStatement> {
    let period = period::get_period(tx, period_id).await?;
    let accounts = temporary_accounts(tx).await?;
    let lines = tx
        .ledger_lines(&LineQuery::effective().in_periods(vec![period.id]).excluding_closing())
        .await?;
    let movements = natural_movements(&accounts, &lines)?;

    let mut revenue = Vec::new();
    let mut expenses = Vec::new();
    for account in &accounts {
        let Some(natural) = movements.get(&account.id).copied() else {
            continue;
        };
        let line = account_line(account, account.type_signed(natural));
        match account.account_type {
            AccountType::Revenue => revenue.push(line),
            _ => expenses.push(line),
        }
    }
    let revenue = StatementSection::new("Revenue", revenue)?;
    let expenses = StatementSection::new("Expenses", expenses)?;
    let net_income = revenue.total.checked_sub(&expenses.total)?;

    Ok(IncomeStatement {
        period_id: period.id,
        period_name: period.name,
        start_date: period.start_date,
        end_date: period.end_date,
        revenue,
        expenses,
        net_income,
        comparative: None,
    })
}

/// Balance sheet as of `as_of`
///
/// # Errors
///
/// Returns `BalanceSheetImbalance` if assets differ from liabilities plus
/// equity; an imbalanced sheet is never returned.
#[instrument(skip(tx))]
pub async fn balance_sheet<T: LedgerTx>(
    tx: &mut T,
    as_of: NaiveDate,
    comparative: Option<PeriodId>,
    retained_earnings_code: &str,
) -> LedgerResult<BalanceSheet> {
    let mut current = build_balance_sheet(tx, as_of, retained_earnings_code).await?;
    if let Some(period_id) = comparative {
        let prior = period::get_period(tx, period_id).await?;
        current.comparative = Some(Box::new(
            build_balance_sheet(tx, prior.end_date, retained_earnings_code).await?,
        ));
    }
    Ok(current)
}

async fn build_balance_sheet<T: LedgerTx>(
    tx: &mut T,
    as_of: NaiveDate,
    retained_earnings_code: &str,
) -> LedgerResult<BalanceSheet> {
    let accounts = tx.list_accounts(&AccountFilter::all()).await?;
    let lines = tx.ledger_lines(&LineQuery::effective().through(as_of)).await?;
    let balances = natural_balances(&accounts, &lines)?;

    let mut assets = Vec::new();
    let mut liabilities = Vec::new();
    let mut equity = Vec::new();
    let mut current_earnings = Amount::ZERO;
    let mut retained_balance = Amount::ZERO;
    let mut retained_id = None;

    for account in &accounts {
        let natural = balances.get(&account.id).copied().unwrap_or(Amount::ZERO);
        if account.code.eq_ignore_ascii_case(retained_earnings_code.trim()) {
            retained_balance = account.type_signed(natural);
            retained_id = Some(account.id);
        }
        if account.account_type.is_temporary() {
            current_earnings = current_earnings.checked_add(&income_contribution(account, natural))?;
            continue;
        }
        if natural.is_zero() && !account.is_active() {
            continue;
        }
        let line = account_line(account, account.type_signed(natural));
        match account.account_type {
            AccountType::Asset => assets.push(line),
            AccountType::Liability => liabilities.push(line),
            _ => equity.push(line),
        }
    }

    let closed_periods = match retained_id {
        Some(id) => closed_income(&lines, id)?,
        None => Amount::ZERO,
    };
    equity.push(StatementLine {
        account_id: None,
        code: None,
        name: "Current earnings".to_string(),
        amount: current_earnings,
    });

    let assets = StatementSection::new("Assets", assets)?;
    let liabilities = StatementSection::new("Liabilities", liabilities)?;
    let equity = StatementSection::new("Equity", equity)?;
    let total_liabilities_and_equity = liabilities.total.checked_add(&equity.total)?;

    if assets.total != total_liabilities_and_equity {
        return Err(LedgerError::BalanceSheetImbalance {
            as_of,
            assets: assets.total,
            liabilities_and_equity: total_liabilities_and_equity,
        });
    }

    Ok(BalanceSheet {
        as_of,
        assets,
        liabilities,
        equity,
        retained_earnings: RetainedEarningsBreakdown {
            closed_periods,
            current_earnings,
            total: retained_balance.checked_add(&current_earnings)?,
        },
        total_liabilities_and_equity,
        comparative: None,
    })
}

/// Builds a statement and stores it
///
/// Stored statements are never updated; generating again stores a new one.
#[instrument(skip(tx, actor))]
pub async fn generate_statement<T: LedgerTx>(
    tx: &mut T,
    request: StatementRequest,
    retained_earnings_code: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<FinancialStatement> {
    let (statement_type, as_of_date, period_id, comparative_period_id, payload) = match request {
        StatementRequest::TrialBalance { as_of, comparative } => {
            let statement = trial_balance(tx, as_of, comparative).await?;
            (StatementType::TrialBalance, as_of, None, comparative, to_payload(&statement)?)
        }
        StatementRequest::IncomeStatement { period_id, comparative } => {
            let statement = income_statement(tx, period_id, comparative).await?;
            (
                StatementType::IncomeStatement,
                statement.end_date,
                Some(period_id),
                comparative,
                to_payload(&statement)?,
            )
        }
        StatementRequest::BalanceSheet { as_of, comparative } => {
            let statement = balance_sheet(tx, as_of, comparative, retained_earnings_code).await?;
            (StatementType::BalanceSheet, as_of, None, comparative, to_payload(&statement)?)
        }
    };

    let statement = FinancialStatement {
        id: StatementId::new_v7(),
        statement_type,
        as_of_date,
        period_id,
        comparative_period_id,
        payload,
        generated_by: actor.clone(),
        generated_at: now,
    };
    tx.insert_statement(&statement).await?;

    info!(
        statement = %statement.id,
        kind = statement_type.as_str(),
        as_of = %as_of_date,
        "Generated financial statement"
    );
    Ok(statement)
}

pub async fn get_statement<T: LedgerTx>(tx: &mut T, id: StatementId) -> LedgerResult<FinancialStatement> {
    tx.find_statement(id).await?.ok_or_else(|| LedgerError::UnknownRecord {
        entity: "financial statement",
        id: id.to_string(),
    })
}

/// Stored statements, newest first
pub async fn list_statements<T: LedgerTx>(
    tx: &mut T,
    statement_type: Option<StatementType>,
) -> LedgerResult<Vec<FinancialStatement>> {
    let mut statements = tx.list_statements(statement_type).await?;
    statements.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
    Ok(statements)
}

fn to_payload<S: Serialize>(statement: &S) -> LedgerResult<serde_json::Value> {
    serde_json::to_value(statement)
        .map_err(|e| LedgerError::Store(PortError::transformation(format!("statement payload: {}", e))))
}

fn account_line(account: &Account, amount: Amount) -> StatementLine {
    StatementLine {
        account_id: Some(account.id),
        code: Some(account.code.clone()),
        name: account.name.clone(),
        amount,
    }
}

async fn temporary_accounts<T: LedgerTx>(tx: &mut T) -> LedgerResult<Vec<Account>> {
    let mut accounts = tx.list_accounts(&AccountFilter::all().of_type(AccountType::Revenue)).await?;
    accounts.extend(tx.list_accounts(&AccountFilter::all().of_type(AccountType::Expense)).await?);
    Ok(accounts)
}

/// Opening balance plus line movement per account, in normal-balance terms
fn natural_balances(accounts: &[Account], lines: &[LedgerLine]) -> LedgerResult<HashMap<AccountId, Amount>> {
    let movements = natural_movements(accounts, lines)?;
    let mut balances = HashMap::with_capacity(accounts.len());
    for account in accounts {
        let movement = movements.get(&account.id).copied().unwrap_or(Amount::ZERO);
        balances.insert(account.id, account.opening_balance.checked_add(&movement)?);
    }
    Ok(balances)
}

/// Line movement per account, in normal-balance terms; accounts without
/// lines are absent
fn natural_movements(accounts: &[Account], lines: &[LedgerLine]) -> LedgerResult<HashMap<AccountId, Amount>> {
    let by_id: HashMap<AccountId, &Account> = accounts.iter().map(|a| (a.id, a)).collect();
    let mut movements: HashMap<AccountId, Amount> = HashMap::new();
    for line in lines {
        let Some(account) = by_id.get(&line.line.account_id) else {
            continue;
        };
        let delta = account.signed_movement(line.line.debit, line.line.credit);
        let total = movements.entry(account.id).or_insert(Amount::ZERO);
        *total = total.checked_add(&delta)?;
    }
    Ok(movements)
}

/// Net income closed into retained earnings: credits less debits of
/// closing lines on that account
fn closed_income(lines: &[LedgerLine], retained_id: AccountId) -> LedgerResult<Amount> {
    let mut total = Amount::ZERO;
    for line in lines
        .iter()
        .filter(|l| l.line.is_closing && l.line.account_id == retained_id)
    {
        total = total.checked_add(&line.line.credit)?.checked_sub(&line.line.debit)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountCategory, AccountStatus};
    use crate::entry::{EntryStatus, JournalEntryLine};
    use core_kernel::{JournalEntryId, JournalId, LineId};

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn account(code: &str, account_type: AccountType, contra: bool) -> Account {
        let default = account_type.default_normal_balance();
        Account {
            id: AccountId::new(),
            code: code.to_string(),
            name: code.to_string(),
            account_type,
            category: AccountCategory::default_for(account_type),
            normal_balance: if contra { default.opposite() } else { default },
            parent_id: None,
            description: None,
            opening_balance: Amount::ZERO,
            current_balance: Amount::ZERO,
            status: AccountStatus::Active,
            is_cash: false,
            is_bank: false,
            is_contra: contra,
            created_by: Actor::system(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(account: &Account, debit: &str, credit: &str, is_closing: bool) -> LedgerLine {
        LedgerLine {
            line: JournalEntryLine {
                id: LineId::new(),
                entry_id: JournalEntryId::new(),
                line_no: 1,
                account_id: account.id,
                description: None,
                debit: amount(debit),
                credit: amount(credit),
                is_adjustment: false,
                is_closing,
            },
            entry_number: "GJ-000001".to_string(),
            journal_id: JournalId::new(),
            period_id: PeriodId::new(),
            date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            status: EntryStatus::Posted,
        }
    }

    #[test]
    fn test_contra_movement_is_natural_to_the_contra_side() {
        let discounts = account("4090", AccountType::Revenue, true);
        let lines = vec![line(&discounts, "25.00", "0", false)];

        let movements = natural_movements(&[discounts.clone()], &lines).unwrap();

        assert_eq!(movements[&discounts.id], amount("25.00"));
        assert_eq!(discounts.type_signed(movements[&discounts.id]), amount("-25.00"));
    }

    #[test]
    fn test_closed_income_nets_closing_and_reopen_lines() {
        let retained = account("3000", AccountType::Equity, false);
        let lines = vec![
            line(&retained, "0", "300.00", true),
            line(&retained, "300.00", "0", true),
            line(&retained, "0", "120.00", true),
            line(&retained, "0", "50.00", false),
        ];
        assert_eq!(closed_income(&lines, retained.id).unwrap(), amount("120.00"));
    }

    #[test]
    fn test_section_total_and_lookup() {
        let cash = account("1000", AccountType::Asset, false);
        let depreciation = account("1510", AccountType::Asset, true);
        let section = StatementSection::new(
            "Assets",
            vec![account_line(&cash, amount("900.00")), account_line(&depreciation, amount("-100.00"))],
        )
        .unwrap();
        assert_eq!(section.total, amount("800.00"));
        assert_eq!(section.amount_for("1510"), Some(amount("-100.00")));
        assert_eq!(section.amount_for("9999"), None);
    }
}
