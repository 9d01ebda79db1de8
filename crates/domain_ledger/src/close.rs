//! Period close
//!
//! Closing a period moves the period's revenue and expense movement into
//! retained earnings through a single posted entry in the closing journal,
//! then freezes the period. Reopening reverses that entry, so a reopen
//! followed by a new close reproduces the same closing amounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use core_kernel::{Actor, Amount, PeriodId};

use crate::account::{Account, AccountFilter, AccountType};
use crate::balance;
use crate::chart;
use crate::entry::{DraftEntry, EntryQuery, EntryStatus, JournalEntry, NewLine};
use crate::error::{LedgerError, LedgerResult};
use crate::journal::{self, JournalType};
use crate::period::{AccountingPeriod, PeriodStatus};
use crate::posting;
use crate::store::{LedgerTx, RowLock};

/// Result of closing a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseOutcome {
    pub period: AccountingPeriod,
    /// `None` when every revenue and expense balance was already zero
    pub closing_entry: Option<JournalEntry>,
    pub net_income: Amount,
}

/// Closes an open, non-current period
///
/// # Errors
///
/// - `PeriodAlreadyClosed` / `PeriodLocked` if the period is not open
/// - `InvalidStateTransition` if the period is current or an earlier
///   regular period is still open
/// - `DraftEntriesPending` if draft entries remain in the period
#[instrument(skip(tx, actor, notes))]
pub async fn close_period<T: LedgerTx>(
    tx: &mut T,
    period_id: PeriodId,
    actor: &Actor,
    notes: Option<String>,
    retained_earnings_code: &str,
    now: DateTime<Utc>,
) -> LedgerResult<CloseOutcome> {
    let mut period = lock_period(tx, period_id).await?;
    match period.status {
        PeriodStatus::Open => {}
        PeriodStatus::Closed => return Err(LedgerError::PeriodAlreadyClosed(period.name)),
        PeriodStatus::Locked => return Err(LedgerError::PeriodLocked(period.name)),
    }
    if period.is_current {
        return Err(LedgerError::InvalidStateTransition(format!(
            "period {} is the current period",
            period.name
        )));
    }
    let periods = balance::ordered_periods(tx).await?;
    if let Some(earlier) = periods
        .iter()
        .find(|p| !p.is_adjustment && p.precedes(&period) && p.is_open())
    {
        return Err(LedgerError::InvalidStateTransition(format!(
            "period {} cannot close while earlier period {} is open",
            period.name, earlier.name
        )));
    }

    let drafts = tx
        .list_entries(&EntryQuery::default().in_period(period.id).with_status(EntryStatus::Draft))
        .await?;
    if !drafts.is_empty() {
        return Err(LedgerError::DraftEntriesPending {
            period: period.name,
            count: drafts.len(),
        });
    }

    let retained = chart::get_account_by_code(tx, retained_earnings_code).await?;
    if retained.account_type != AccountType::Equity || !retained.is_active() {
        return Err(LedgerError::validation(format!(
            "retained earnings account {} must be an active equity account",
            retained.code
        )));
    }

    let mut lines = Vec::new();
    let mut net_income = Amount::ZERO;
    for account in temporary_accounts(tx).await? {
        let movement = tx
            .find_balance(account.id, period.id, RowLock::None)
            .await?
            .map_or(Amount::ZERO, |b| b.net_movement());
        if movement.is_zero() {
            continue;
        }
        // Zero the period's movement by posting it to the opposite side.
        let side = if movement.is_positive() {
            account.normal_balance.opposite()
        } else {
            account.normal_balance
        };
        lines.push(
            NewLine::on_side(account.code.clone(), side, movement.abs())
                .with_description(format!("Close {} for {}", account.name, period.name))
                .closing(),
        );
        net_income = net_income.checked_add(&income_contribution(&account, movement))?;
    }

    let closing_entry = if lines.is_empty() {
        None
    } else {
        if net_income.is_positive() {
            lines.push(NewLine::credit(retained.code.clone(), net_income).closing());
        } else if net_income.is_negative() {
            lines.push(NewLine::debit(retained.code.clone(), net_income.abs()).closing());
        }
        for line in lines.iter_mut().filter(|l| l.description.is_none()) {
            line.description = Some(format!("Net income for {}", period.name));
        }

        let journal = journal::journal_for_type(tx, JournalType::Closing).await?;
        let draft = DraftEntry::new(
            journal.code.clone(),
            period.end_date,
            format!("Closing entry for {}", period.name),
        )
        .in_period(period.id);
        let entry = posting::open_draft(tx, draft, actor, now).await?;
        for line in lines {
            posting::add_line(tx, entry.id, line).await?;
        }
        Some(posting::post(tx, entry.id, actor, now).await?)
    };

    let closing_equity = equity_through(tx, &period).await?;
    period.status = PeriodStatus::Closed;
    period.closed_by = Some(actor.clone());
    period.closed_at = Some(now);
    period.closing_notes = notes;
    period.closing_entry_id = closing_entry.as_ref().map(|e| e.id);
    period.closing_equity = Some(closing_equity);
    tx.update_period(&period).await?;

    if let Some(mut next) = next_regular_period(tx, &period).await? {
        next.opening_equity = closing_equity;
        tx.update_period(&next).await?;
    }

    info!(
        period = %period.name,
        net_income = %net_income,
        closing_equity = %closing_equity,
        closing_entry = ?closing_entry.as_ref().map(|e| e.number.as_str()),
        "Closed accounting period"
    );
    Ok(CloseOutcome {
        period,
        closing_entry,
        net_income,
    })
}

/// Reopens a closed period by reversing its closing entry
///
/// # Errors
///
/// - `PeriodLocked` if the period is locked
/// - `InvalidStateTransition` if it is open or a later period is closed
#[instrument(skip(tx, actor, reason))]
pub async fn reopen_period<T: LedgerTx>(
    tx: &mut T,
    period_id: PeriodId,
    actor: &Actor,
    reason: &str,
    now: DateTime<Utc>,
) -> LedgerResult<AccountingPeriod> {
    let mut period = lock_period(tx, period_id).await?;
    match period.status {
        PeriodStatus::Closed => {}
        PeriodStatus::Locked => return Err(LedgerError::PeriodLocked(period.name)),
        PeriodStatus::Open => {
            return Err(LedgerError::InvalidStateTransition(format!(
                "period {} is not closed",
                period.name
            )))
        }
    }
    let periods = balance::ordered_periods(tx).await?;
    if let Some(later) = periods
        .iter()
        .find(|p| period.precedes(p) && p.status != PeriodStatus::Open)
    {
        return Err(LedgerError::InvalidStateTransition(format!(
            "period {} cannot reopen while later period {} is {}",
            period.name,
            later.name,
            later.status.as_str()
        )));
    }

    period.status = PeriodStatus::Open;
    tx.update_period(&period).await?;

    if let Some(entry_id) = period.closing_entry_id {
        posting::reverse_into(
            tx,
            entry_id,
            actor,
            &format!("Reopen {}: {}", period.name, reason),
            period.end_date,
            Some(period.id),
            now,
        )
        .await?;
    }

    period.closed_by = None;
    period.closed_at = None;
    period.closing_entry_id = None;
    period.closing_equity = None;
    period.closing_notes = None;
    tx.update_period(&period).await?;

    warn!(period = %period.name, actor = %actor, reason = %reason, "Reopened accounting period");
    Ok(period)
}

async fn lock_period<T: LedgerTx>(tx: &mut T, period_id: PeriodId) -> LedgerResult<AccountingPeriod> {
    tx.find_period(period_id, RowLock::Exclusive)
        .await?
        .ok_or_else(|| LedgerError::UnknownPeriod(period_id.to_string()))
}

async fn temporary_accounts<T: LedgerTx>(tx: &mut T) -> LedgerResult<Vec<Account>> {
    let mut accounts = tx.list_accounts(&AccountFilter::all().of_type(AccountType::Revenue)).await?;
    accounts.extend(tx.list_accounts(&AccountFilter::all().of_type(AccountType::Expense)).await?);
    Ok(accounts)
}

/// Contribution of a temporary account's natural balance to net income
pub(crate) fn income_contribution(account: &Account, natural: Amount) -> Amount {
    let type_signed = account.type_signed(natural);
    match account.account_type {
        AccountType::Expense => -type_signed,
        _ => type_signed,
    }
}

/// Total equity after the period, credit-positive
async fn equity_through<T: LedgerTx>(tx: &mut T, period: &AccountingPeriod) -> LedgerResult<Amount> {
    let mut total = Amount::ZERO;
    for account in tx.list_accounts(&AccountFilter::all().of_type(AccountType::Equity)).await? {
        let closing = balance::closing_balance_through(tx, &account, period.id).await?;
        total = total.checked_add(&account.type_signed(closing))?;
    }
    Ok(total)
}

async fn next_regular_period<T: LedgerTx>(
    tx: &mut T,
    period: &AccountingPeriod,
) -> LedgerResult<Option<AccountingPeriod>> {
    let periods = balance::ordered_periods(tx).await?;
    Ok(periods
        .into_iter()
        .find(|p| !p.is_adjustment && p.start_date > period.end_date))
}
