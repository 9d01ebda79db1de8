//! Balance service
//!
//! The single writer of balance state. Each posted line moves the
//! `(account, period)` roll-up and the account's current balance in the
//! same unit of work. Roll-ups are a cache: they can always be rebuilt
//! from the account's opening balance and its effective lines.
//!
//! # Roll-up arithmetic
//!
//! All amounts are in the account's normal-balance terms:
//!
//! ```text
//! opening(P) = account.opening_balance + Σ movement(Q) for Q before P
//! closing(P) = opening(P) + signed_movement(debits(P), credits(P))
//! ```
//!
//! Periods are ordered by end date with an adjustment period after the
//! regular period it shares a date with.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use core_kernel::{AccountId, Amount, PeriodId};

use crate::account::Account;
use crate::entry::{LedgerLine, LineQuery};
use crate::error::{LedgerError, LedgerResult};
use crate::period::{sort_periods, AccountingPeriod};
use crate::store::{LedgerTx, RowLock};

/// Memoised balance of one account in one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub period_id: PeriodId,
    pub opening_balance: Amount,
    pub period_debits: Amount,
    pub period_credits: Amount,
    pub closing_balance: Amount,
    pub updated_at: DateTime<Utc>,
}

impl AccountBalance {
    fn empty(account_id: AccountId, period_id: PeriodId, opening: Amount, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            period_id,
            opening_balance: opening,
            period_debits: Amount::ZERO,
            period_credits: Amount::ZERO,
            closing_balance: opening,
            updated_at: now,
        }
    }

    /// Movement within the period in normal-balance terms
    pub fn net_movement(&self) -> Amount {
        self.closing_balance - self.opening_balance
    }

    /// True when both rows describe the same balances
    pub fn agrees_with(&self, other: &AccountBalance) -> bool {
        self.opening_balance == other.opening_balance
            && self.period_debits == other.period_debits
            && self.period_credits == other.period_credits
            && self.closing_balance == other.closing_balance
    }
}

/// Result of rebuilding one roll-up from lines
#[derive(Debug, Clone, PartialEq)]
pub struct RecomputeOutcome {
    pub balance: AccountBalance,
    /// Stored row before the rebuild, if any
    pub previous: Option<AccountBalance>,
    pub drifted: bool,
}

/// Applies a posted line's amounts to the roll-up and the current balance
///
/// Later periods' roll-ups for the account shift by the same movement so
/// their opening balances stay consistent.
pub async fn apply_delta<T: LedgerTx>(
    tx: &mut T,
    account_id: AccountId,
    period_id: PeriodId,
    debit: Amount,
    credit: Amount,
    now: DateTime<Utc>,
) -> LedgerResult<AccountBalance> {
    let mut account = tx
        .find_account(account_id, RowLock::Exclusive)
        .await?
        .ok_or_else(|| LedgerError::UnknownAccount(account_id.to_string()))?;
    let periods = ordered_periods(tx).await?;
    let period = find_in(&periods, period_id)?;
    let rows = tx.balances_for_account(account_id, RowLock::Exclusive).await?;
    let delta = account.signed_movement(debit, credit);

    let mut row = match rows.iter().find(|r| r.period_id == period_id) {
        Some(existing) => existing.clone(),
        None => {
            let opening = opening_from_rows(&account, period, &periods, &rows)?;
            AccountBalance::empty(account_id, period_id, opening, now)
        }
    };
    row.period_debits = row.period_debits.checked_add(&debit)?;
    row.period_credits = row.period_credits.checked_add(&credit)?;
    row.closing_balance = row.closing_balance.checked_add(&delta)?;
    row.updated_at = now;
    tx.upsert_balance(&row).await?;

    if !delta.is_zero() {
        for later in &rows {
            let later_period = find_in(&periods, later.period_id)?;
            if period.precedes(later_period) {
                let mut shifted = later.clone();
                shifted.opening_balance = shifted.opening_balance.checked_add(&delta)?;
                shifted.closing_balance = shifted.closing_balance.checked_add(&delta)?;
                shifted.updated_at = now;
                tx.upsert_balance(&shifted).await?;
            }
        }
    }

    account.current_balance = account.current_balance.checked_add(&delta)?;
    account.updated_at = now;
    tx.update_account(&account).await?;

    debug!(
        account = %account.code,
        period = %period.name,
        debit = %debit,
        credit = %credit,
        closing = %row.closing_balance,
        "Applied balance delta"
    );
    Ok(row)
}

/// Balance of an account over effective lines dated on or before `date`,
/// in normal-balance terms
pub async fn balance_as_of<T: LedgerTx>(tx: &mut T, account_id: AccountId, date: NaiveDate) -> LedgerResult<Amount> {
    let account = tx
        .find_account(account_id, RowLock::None)
        .await?
        .ok_or_else(|| LedgerError::UnknownAccount(account_id.to_string()))?;
    let lines = tx
        .ledger_lines(&LineQuery::effective().for_account(account_id).through(date))
        .await?;
    let (debits, credits) = totals(lines.iter())?;
    Ok(account.opening_balance.checked_add(&account.signed_movement(debits, credits))?)
}

/// Debits and credits posted to an account in a period
pub async fn period_movement<T: LedgerTx>(
    tx: &mut T,
    account_id: AccountId,
    period_id: PeriodId,
) -> LedgerResult<(Amount, Amount)> {
    if tx.find_account(account_id, RowLock::None).await?.is_none() {
        return Err(LedgerError::UnknownAccount(account_id.to_string()));
    }
    if tx.find_period(period_id, RowLock::None).await?.is_none() {
        return Err(LedgerError::UnknownPeriod(period_id.to_string()));
    }
    Ok(tx
        .find_balance(account_id, period_id, RowLock::None)
        .await?
        .map_or((Amount::ZERO, Amount::ZERO), |b| (b.period_debits, b.period_credits)))
}

/// Closing balance of an account through `period_id` in ledger order,
/// read from the stored roll-ups
pub async fn closing_balance_through<T: LedgerTx>(
    tx: &mut T,
    account: &Account,
    period_id: PeriodId,
) -> LedgerResult<Amount> {
    if let Some(row) = tx.find_balance(account.id, period_id, RowLock::None).await? {
        return Ok(row.closing_balance);
    }
    let periods = ordered_periods(tx).await?;
    let period = find_in(&periods, period_id)?;
    let rows = tx.balances_for_account(account.id, RowLock::None).await?;
    opening_from_rows(account, period, &periods, &rows)
}

/// Rebuilds one roll-up from the account's effective lines
///
/// A row whose stored values disagree with the rebuilt values is logged at
/// `warn` and overwritten.
pub async fn recompute<T: LedgerTx>(
    tx: &mut T,
    account_id: AccountId,
    period_id: PeriodId,
    now: DateTime<Utc>,
) -> LedgerResult<RecomputeOutcome> {
    let account = tx
        .find_account(account_id, RowLock::Exclusive)
        .await?
        .ok_or_else(|| LedgerError::UnknownAccount(account_id.to_string()))?;
    let periods = ordered_periods(tx).await?;
    let lines = tx
        .ledger_lines(&LineQuery::effective().for_account(account_id))
        .await?;
    let computed = computed_rollups(&account, &periods, &lines, now)?;
    let balance = computed
        .get(&period_id)
        .cloned()
        .ok_or_else(|| LedgerError::UnknownPeriod(period_id.to_string()))?;

    let previous = tx.find_balance(account_id, period_id, RowLock::Exclusive).await?;
    store_rollup(tx, &account, balance, previous).await
}

/// Checks a stored roll-up against its lines without writing
///
/// # Errors
///
/// Returns `ConsistencyFailure` if the stored row disagrees with the
/// rebuilt values, or if lines exist for a period with no stored row.
pub async fn verify<T: LedgerTx>(tx: &mut T, account_id: AccountId, period_id: PeriodId) -> LedgerResult<AccountBalance> {
    let account = tx
        .find_account(account_id, RowLock::None)
        .await?
        .ok_or_else(|| LedgerError::UnknownAccount(account_id.to_string()))?;
    let periods = ordered_periods(tx).await?;
    let lines = tx
        .ledger_lines(&LineQuery::effective().for_account(account_id))
        .await?;
    let computed = computed_rollups(&account, &periods, &lines, Utc::now())?;
    let expected = computed
        .get(&period_id)
        .cloned()
        .ok_or_else(|| LedgerError::UnknownPeriod(period_id.to_string()))?;

    match tx.find_balance(account_id, period_id, RowLock::None).await? {
        Some(stored) if stored.agrees_with(&expected) => Ok(stored),
        Some(stored) => Err(LedgerError::ConsistencyFailure(format!(
            "account {} period {}: stored closing {} but lines give {}",
            account.code, period_id, stored.closing_balance, expected.closing_balance
        ))),
        None if has_movement(&expected) => Err(LedgerError::ConsistencyFailure(format!(
            "account {} period {}: lines exist but no roll-up is stored",
            account.code, period_id
        ))),
        None => Ok(expected),
    }
}

/// Rebuilds every roll-up of an account and its current balance
pub async fn recompute_account<T: LedgerTx>(
    tx: &mut T,
    account_id: AccountId,
    now: DateTime<Utc>,
) -> LedgerResult<Vec<RecomputeOutcome>> {
    let mut account = tx
        .find_account(account_id, RowLock::Exclusive)
        .await?
        .ok_or_else(|| LedgerError::UnknownAccount(account_id.to_string()))?;
    let periods = ordered_periods(tx).await?;
    let lines = tx
        .ledger_lines(&LineQuery::effective().for_account(account_id))
        .await?;
    let computed = computed_rollups(&account, &periods, &lines, now)?;
    let mut stored: HashMap<PeriodId, AccountBalance> = tx
        .balances_for_account(account_id, RowLock::Exclusive)
        .await?
        .into_iter()
        .map(|b| (b.period_id, b))
        .collect();

    let mut outcomes = Vec::new();
    for period in &periods {
        let previous = stored.remove(&period.id);
        if let Some(balance) = computed.get(&period.id).cloned() {
            if previous.is_some() || has_movement(&balance) {
                outcomes.push(store_rollup(tx, &account, balance, previous).await?);
            }
        }
    }

    let (debits, credits) = totals(lines.iter())?;
    let current = account.opening_balance.checked_add(&account.signed_movement(debits, credits))?;
    if current != account.current_balance {
        warn!(
            account = %account.code,
            stored = %account.current_balance,
            recomputed = %current,
            "Current balance drift repaired"
        );
        account.current_balance = current;
        account.updated_at = now;
        tx.update_account(&account).await?;
    }
    Ok(outcomes)
}

/// Stored roll-ups of a period
pub async fn balances_for_period<T: LedgerTx>(tx: &mut T, period_id: PeriodId) -> LedgerResult<Vec<AccountBalance>> {
    Ok(tx.balances_for_period(period_id).await?)
}

async fn store_rollup<T: LedgerTx>(
    tx: &mut T,
    account: &Account,
    balance: AccountBalance,
    previous: Option<AccountBalance>,
) -> LedgerResult<RecomputeOutcome> {
    let drifted = match &previous {
        Some(stored) => !stored.agrees_with(&balance),
        None => has_movement(&balance),
    };
    if drifted {
        warn!(
            account = %account.code,
            period = %balance.period_id,
            stored = ?previous.as_ref().map(|p| p.closing_balance),
            recomputed = %balance.closing_balance,
            "Balance roll-up drift repaired"
        );
    }
    if previous.is_some() || has_movement(&balance) {
        tx.upsert_balance(&balance).await?;
    }
    Ok(RecomputeOutcome {
        balance,
        previous,
        drifted,
    })
}

fn has_movement(balance: &AccountBalance) -> bool {
    !balance.period_debits.is_zero() || !balance.period_credits.is_zero()
}

/// Builds the roll-up of every period from an account's effective lines
pub(crate) fn computed_rollups(
    account: &Account,
    periods: &[AccountingPeriod],
    lines: &[LedgerLine],
    now: DateTime<Utc>,
) -> LedgerResult<HashMap<PeriodId, AccountBalance>> {
    let mut by_period: HashMap<PeriodId, (Amount, Amount)> = HashMap::new();
    for line in lines.iter().filter(|l| l.line.account_id == account.id) {
        let totals = by_period.entry(line.period_id).or_insert((Amount::ZERO, Amount::ZERO));
        totals.0 = totals.0.checked_add(&line.line.debit)?;
        totals.1 = totals.1.checked_add(&line.line.credit)?;
    }

    let mut running = account.opening_balance;
    let mut rollups = HashMap::with_capacity(periods.len());
    for period in periods {
        let (debits, credits) = by_period.get(&period.id).copied().unwrap_or((Amount::ZERO, Amount::ZERO));
        let closing = running.checked_add(&account.signed_movement(debits, credits))?;
        rollups.insert(
            period.id,
            AccountBalance {
                account_id: account.id,
                period_id: period.id,
                opening_balance: running,
                period_debits: debits,
                period_credits: credits,
                closing_balance: closing,
                updated_at: now,
            },
        );
        running = closing;
    }
    Ok(rollups)
}

fn opening_from_rows(
    account: &Account,
    period: &AccountingPeriod,
    periods: &[AccountingPeriod],
    rows: &[AccountBalance],
) -> LedgerResult<Amount> {
    let mut opening = account.opening_balance;
    for row in rows {
        if find_in(periods, row.period_id)?.precedes(period) {
            opening = opening.checked_add(&row.net_movement())?;
        }
    }
    Ok(opening)
}

pub(crate) async fn ordered_periods<T: LedgerTx>(tx: &mut T) -> LedgerResult<Vec<AccountingPeriod>> {
    let mut periods = tx.list_periods().await?;
    sort_periods(&mut periods);
    Ok(periods)
}

fn find_in(periods: &[AccountingPeriod], id: PeriodId) -> LedgerResult<&AccountingPeriod> {
    periods
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| LedgerError::UnknownPeriod(id.to_string()))
}

/// Debit and credit totals of ledger lines
pub(crate) fn totals<'a, I>(lines: I) -> LedgerResult<(Amount, Amount)>
where
    I: Iterator<Item = &'a LedgerLine>,
{
    Ok(crate::entry::line_totals(lines.map(|l| &l.line))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountCategory, AccountStatus, AccountType, BalanceSide};
    use crate::entry::{EntryStatus, JournalEntryLine};
    use crate::period::PeriodStatus;
    use chrono::NaiveDate;
    use core_kernel::{Actor, JournalEntryId, JournalId, LineId};

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn account(normal_balance: BalanceSide, opening: &str) -> Account {
        Account {
            id: AccountId::new(),
            code: "1000".to_string(),
            name: "Cash".to_string(),
            account_type: AccountType::Asset,
            category: AccountCategory::CurrentAsset,
            normal_balance,
            parent_id: None,
            description: None,
            opening_balance: amount(opening),
            current_balance: amount(opening),
            status: AccountStatus::Active,
            is_cash: true,
            is_bank: false,
            is_contra: false,
            created_by: Actor::system(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn period(month: u32) -> AccountingPeriod {
        let range = core_kernel::DateRange::month(2024, month).unwrap();
        AccountingPeriod {
            id: PeriodId::new(),
            name: format!("2024-{:02}", month),
            start_date: range.start,
            end_date: range.end,
            status: PeriodStatus::Open,
            is_current: false,
            is_adjustment: false,
            opening_equity: Amount::ZERO,
            closing_equity: None,
            closing_entry_id: None,
            closed_by: None,
            closed_at: None,
            closing_notes: None,
            created_by: Actor::system(),
            created_at: Utc::now(),
        }
    }

    fn line(account: &Account, period: &AccountingPeriod, debit: &str, credit: &str) -> LedgerLine {
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
                is_closing: false,
            },
            entry_number: "GJ-000001".to_string(),
            journal_id: JournalId::new(),
            period_id: period.id,
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            status: EntryStatus::Posted,
        }
    }

    #[test]
    fn test_rollups_carry_opening_forward() {
        let cash = account(BalanceSide::Debit, "1000.00");
        let jan = period(1);
        let feb = period(2);
        let mar = period(3);
        let lines = vec![
            line(&cash, &jan, "500.00", "0"),
            line(&cash, &jan, "0", "200.00"),
            line(&cash, &mar, "0", "50.00"),
        ];

        let rollups = computed_rollups(&cash, &[jan.clone(), feb.clone(), mar.clone()], &lines, Utc::now()).unwrap();

        let january = &rollups[&jan.id];
        assert_eq!(january.opening_balance, amount("1000.00"));
        assert_eq!(january.closing_balance, amount("1300.00"));
        assert_eq!(rollups[&feb.id].opening_balance, amount("1300.00"));
        assert_eq!(rollups[&feb.id].net_movement(), Amount::ZERO);
        assert_eq!(rollups[&mar.id].closing_balance, amount("1250.00"));
    }

    #[test]
    fn test_credit_normal_rollup_signs() {
        let revenue = account(BalanceSide::Credit, "0");
        let jan = period(1);
        let lines = vec![line(&revenue, &jan, "0", "500.00"), line(&revenue, &jan, "20.00", "0")];

        let rollups = computed_rollups(&revenue, &[jan.clone()], &lines, Utc::now()).unwrap();
        assert_eq!(rollups[&jan.id].closing_balance, amount("480.00"));
    }

    #[test]
    fn test_opening_from_rows_uses_preceding_periods_only() {
        let cash = account(BalanceSide::Debit, "100.00");
        let jan = period(1);
        let feb = period(2);
        let mar = period(3);
        let now = Utc::now();
        let mut jan_row = AccountBalance::empty(cash.id, jan.id, amount("100.00"), now);
        jan_row.period_debits = amount("40.00");
        jan_row.closing_balance = amount("140.00");
        let mut mar_row = AccountBalance::empty(cash.id, mar.id, amount("140.00"), now);
        mar_row.period_credits = amount("10.00");
        mar_row.closing_balance = amount("130.00");

        let periods = vec![jan, feb.clone(), mar];
        let opening = opening_from_rows(&cash, &feb, &periods, &[jan_row, mar_row]).unwrap();
        assert_eq!(opening, amount("140.00"));
    }
}
