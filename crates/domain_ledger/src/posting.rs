//! Journal entry engine
//!
//! Drafts are opened against a journal and a period, collect lines, and
//! are posted atomically: validation, the status change and every balance
//! delta happen in the caller's unit of work. Posted entries are never
//! edited; they are neutralised by a reversing entry.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use core_kernel::{Actor, Amount, JournalEntryId, LineId, PeriodId};

use crate::balance;
use crate::entry::{
    line_totals, DraftEntry, EntryDetail, EntryQuery, EntryStatus, JournalEntry, JournalEntryLine,
    NewLine,
};
use crate::error::{LedgerError, LedgerResult};
use crate::journal::{self, JournalType};
use crate::period::{self, AccountingPeriod};
use crate::store::{LedgerTx, RowLock};

/// Opens a draft entry and issues its number
///
/// The period is resolved from the date unless the draft pins one; either
/// way it must be open and contain the date.
#[instrument(skip(tx, draft, actor), fields(journal = %draft.journal_code, date = %draft.date))]
pub async fn open_draft<T: LedgerTx>(
    tx: &mut T,
    draft: DraftEntry,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<JournalEntry> {
    if draft.description.trim().is_empty() {
        return Err(LedgerError::validation("entry description is required"));
    }
    let journal = journal::journal_by_code(tx, &draft.journal_code).await?;
    let period = match draft.period_id {
        Some(period_id) => {
            let period = period::get_period(tx, period_id).await?;
            period.ensure_postable(draft.date)?;
            period
        }
        None => period::require_postable_period(tx, draft.date).await?,
    };
    let number = journal::next_entry_number(tx, journal.id).await?;

    let entry = JournalEntry {
        id: JournalEntryId::new_v7(),
        number,
        journal_id: journal.id,
        period_id: period.id,
        date: draft.date,
        description: draft.description.trim().to_string(),
        reference: draft.reference,
        status: EntryStatus::Draft,
        total_debit: Amount::ZERO,
        total_credit: Amount::ZERO,
        reverses: None,
        reversed_by_entry: None,
        created_by: actor.clone(),
        created_at: now,
        posted_by: None,
        posted_at: None,
        reversed_by: None,
        reversed_at: None,
        reversal_reason: None,
        voided_by: None,
        voided_at: None,
    };
    tx.insert_entry(&entry).await?;

    debug!(number = %entry.number, period = %period.name, "Opened draft entry");
    Ok(entry)
}

/// Adds a line to a draft entry
///
/// # Errors
///
/// - `EntryNotDraft` if the entry has left draft
/// - `InvalidLine` for a negative amount, a line with both or neither side
///   non-zero, an inactive account, or a closing line outside the closing journal
/// - `UnknownAccount` if the account code does not exist
pub async fn add_line<T: LedgerTx>(
    tx: &mut T,
    entry_id: JournalEntryId,
    line: NewLine,
) -> LedgerResult<JournalEntryLine> {
    let entry = lock_entry(tx, entry_id).await?;
    ensure_draft(&entry)?;
    check_amounts(line.debit, line.credit)?;

    let account = tx
        .find_account_by_code(line.account_code.trim())
        .await?
        .ok_or_else(|| LedgerError::UnknownAccount(line.account_code.clone()))?;
    if !account.is_active() {
        return Err(LedgerError::invalid_line(format!("account {} is not active", account.code)));
    }
    if line.is_closing {
        ensure_closing_journal(tx, &entry).await?;
    }

    let existing = tx.lines_for_entry(entry_id).await?;
    let line_no = existing.iter().map(|l| l.line_no).max().unwrap_or(0) + 1;
    let record = JournalEntryLine {
        id: LineId::new_v7(),
        entry_id,
        line_no,
        account_id: account.id,
        description: line.description,
        debit: line.debit,
        credit: line.credit,
        is_adjustment: line.is_adjustment,
        is_closing: line.is_closing,
    };
    tx.insert_line(&record).await?;
    Ok(record)
}

/// Removes a line from a draft entry
pub async fn remove_line<T: LedgerTx>(tx: &mut T, entry_id: JournalEntryId, line_id: LineId) -> LedgerResult<()> {
    let entry = lock_entry(tx, entry_id).await?;
    ensure_draft(&entry)?;
    let lines = tx.lines_for_entry(entry_id).await?;
    if !lines.iter().any(|l| l.id == line_id) {
        return Err(LedgerError::UnknownRecord {
            entity: "journal entry line",
            id: line_id.to_string(),
        });
    }
    tx.delete_line(line_id).await?;
    Ok(())
}

/// Posts a draft entry
///
/// # Errors
///
/// - `EntryNotDraft` if the entry is not a draft
/// - `PeriodClosed` / `PeriodLocked` if its period no longer accepts postings
/// - `InvalidLine` if any line fails validation
/// - `UnbalancedEntry` if total debits differ from total credits
#[instrument(skip(tx, actor))]
pub async fn post<T: LedgerTx>(
    tx: &mut T,
    entry_id: JournalEntryId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<JournalEntry> {
    let entry = lock_entry(tx, entry_id).await?;
    post_locked(tx, entry, actor, now).await
}

async fn post_locked<T: LedgerTx>(
    tx: &mut T,
    mut entry: JournalEntry,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<JournalEntry> {
    ensure_draft(&entry)?;

    let period = tx
        .find_period(entry.period_id, RowLock::Shared)
        .await?
        .ok_or_else(|| LedgerError::UnknownPeriod(entry.period_id.to_string()))?;
    period.ensure_postable(entry.date)?;

    let lines = tx.lines_for_entry(entry.id).await?;
    if lines.is_empty() {
        return Err(LedgerError::invalid_line(format!("entry {} has no lines", entry.number)));
    }
    let mut closing_checked = false;
    for line in &lines {
        check_amounts(line.debit, line.credit)?;
        let account = tx
            .find_account(line.account_id, RowLock::None)
            .await?
            .ok_or_else(|| LedgerError::UnknownAccount(line.account_id.to_string()))?;
        if !account.is_active() {
            return Err(LedgerError::invalid_line(format!(
                "line {} uses inactive account {}",
                line.line_no, account.code
            )));
        }
        if line.is_closing && !closing_checked {
            ensure_closing_journal(tx, &entry).await?;
            closing_checked = true;
        }
    }

    let (total_debit, total_credit) = line_totals(&lines)?;
    if total_debit != total_credit {
        return Err(LedgerError::UnbalancedEntry {
            number: entry.number,
            debits: total_debit,
            credits: total_credit,
        });
    }

    entry.status = EntryStatus::Posted;
    entry.total_debit = total_debit;
    entry.total_credit = total_credit;
    entry.posted_by = Some(actor.clone());
    entry.posted_at = Some(now);
    tx.update_entry(&entry).await?;

    for line in &lines {
        balance::apply_delta(tx, line.account_id, period.id, line.debit, line.credit, now).await?;
    }

    info!(
        number = %entry.number,
        period = %period.name,
        total = %entry.total_debit,
        actor = %actor,
        "Posted journal entry"
    );
    Ok(entry)
}

/// Reverses a posted entry with an equal and opposite entry
///
/// The reversal is numbered in the original's journal, dated
/// `effective_date`, and posted into the open period covering that date.
/// Returns the reversing entry.
///
/// # Errors
///
/// - `AlreadyReversed` if the entry was reversed before
/// - `EntryNotPosted` for drafts and void entries
/// - `PeriodClosed` / `PeriodLocked` / `NoPeriodForDate` for the effective date
#[instrument(skip(tx, actor, reason))]
pub async fn reverse<T: LedgerTx>(
    tx: &mut T,
    entry_id: JournalEntryId,
    actor: &Actor,
    reason: &str,
    effective_date: NaiveDate,
    now: DateTime<Utc>,
) -> LedgerResult<JournalEntry> {
    reverse_into(tx, entry_id, actor, reason, effective_date, None, now).await
}

/// Reverses into an explicit period, used when reopening adjustment periods
pub(crate) async fn reverse_into<T: LedgerTx>(
    tx: &mut T,
    entry_id: JournalEntryId,
    actor: &Actor,
    reason: &str,
    effective_date: NaiveDate,
    period_id: Option<PeriodId>,
    now: DateTime<Utc>,
) -> LedgerResult<JournalEntry> {
    let mut original = lock_entry(tx, entry_id).await?;
    match original.status {
        EntryStatus::Posted => {}
        EntryStatus::Reversed => return Err(LedgerError::AlreadyReversed(original.number)),
        status => {
            return Err(LedgerError::EntryNotPosted {
                number: original.number,
                status: status.to_string(),
            })
        }
    }
    if reason.trim().is_empty() {
        return Err(LedgerError::validation("a reversal reason is required"));
    }

    let period: AccountingPeriod = match period_id {
        Some(id) => {
            let period = period::get_period(tx, id).await?;
            period.ensure_postable(effective_date)?;
            period
        }
        None => period::require_postable_period(tx, effective_date).await?,
    };
    let number = journal::next_entry_number(tx, original.journal_id).await?;

    let reversal = JournalEntry {
        id: JournalEntryId::new_v7(),
        number,
        journal_id: original.journal_id,
        period_id: period.id,
        date: effective_date,
        description: format!("Reversal of {}: {}", original.number, reason.trim()),
        reference: Some(original.number.clone()),
        status: EntryStatus::Draft,
        total_debit: Amount::ZERO,
        total_credit: Amount::ZERO,
        reverses: Some(original.id),
        reversed_by_entry: None,
        created_by: actor.clone(),
        created_at: now,
        posted_by: None,
        posted_at: None,
        reversed_by: None,
        reversed_at: None,
        reversal_reason: None,
        voided_by: None,
        voided_at: None,
    };
    tx.insert_entry(&reversal).await?;

    for line in tx.lines_for_entry(original.id).await? {
        let swapped = JournalEntryLine {
            id: LineId::new_v7(),
            entry_id: reversal.id,
            line_no: line.line_no,
            account_id: line.account_id,
            description: line.description,
            debit: line.credit,
            credit: line.debit,
            is_adjustment: line.is_adjustment,
            is_closing: line.is_closing,
        };
        tx.insert_line(&swapped).await?;
    }
    let reversal = post_locked(tx, reversal, actor, now).await?;

    original.status = EntryStatus::Reversed;
    original.reversed_by = Some(actor.clone());
    original.reversed_at = Some(now);
    original.reversal_reason = Some(reason.trim().to_string());
    original.reversed_by_entry = Some(reversal.id);
    tx.update_entry(&original).await?;

    info!(
        original = %original.number,
        reversal = %reversal.number,
        effective_date = %effective_date,
        "Reversed journal entry"
    );
    Ok(reversal)
}

/// Voids a draft entry; its number stays consumed
pub async fn void<T: LedgerTx>(
    tx: &mut T,
    entry_id: JournalEntryId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<JournalEntry> {
    let mut entry = lock_entry(tx, entry_id).await?;
    ensure_draft(&entry)?;
    entry.status = EntryStatus::Void;
    entry.voided_by = Some(actor.clone());
    entry.voided_at = Some(now);
    tx.update_entry(&entry).await?;

    info!(number = %entry.number, actor = %actor, "Voided draft entry");
    Ok(entry)
}

/// Loads an entry with its lines
pub async fn entry_detail<T: LedgerTx>(tx: &mut T, entry_id: JournalEntryId) -> LedgerResult<EntryDetail> {
    let entry = tx
        .find_entry(entry_id, RowLock::None)
        .await?
        .ok_or_else(|| LedgerError::UnknownEntry(entry_id.to_string()))?;
    let lines = tx.lines_for_entry(entry_id).await?;
    Ok(EntryDetail { entry, lines })
}

pub async fn list_entries<T: LedgerTx>(tx: &mut T, query: &EntryQuery) -> LedgerResult<Vec<JournalEntry>> {
    Ok(tx.list_entries(query).await?)
}

async fn lock_entry<T: LedgerTx>(tx: &mut T, entry_id: JournalEntryId) -> LedgerResult<JournalEntry> {
    tx.find_entry(entry_id, RowLock::Exclusive)
        .await?
        .ok_or_else(|| LedgerError::UnknownEntry(entry_id.to_string()))
}

fn ensure_draft(entry: &JournalEntry) -> LedgerResult<()> {
    if entry.status != EntryStatus::Draft {
        return Err(LedgerError::EntryNotDraft {
            number: entry.number.clone(),
            status: entry.status.to_string(),
        });
    }
    Ok(())
}

/// Exactly one of debit and credit is positive and neither is negative
fn check_amounts(debit: Amount, credit: Amount) -> LedgerResult<()> {
    if debit.is_negative() || credit.is_negative() {
        return Err(LedgerError::invalid_line("amounts must not be negative"));
    }
    match (debit.is_positive(), credit.is_positive()) {
        (true, false) | (false, true) => Ok(()),
        (false, false) => Err(LedgerError::invalid_line("either debit or credit must be non-zero")),
        (true, true) => Err(LedgerError::invalid_line("a line cannot carry both a debit and a credit")),
    }
}

async fn ensure_closing_journal<T: LedgerTx>(tx: &mut T, entry: &JournalEntry) -> LedgerResult<()> {
    let journal = tx
        .find_journal(entry.journal_id, RowLock::None)
        .await?
        .ok_or_else(|| LedgerError::UnknownJournal(entry.journal_id.to_string()))?;
    if journal.journal_type != JournalType::Closing {
        return Err(LedgerError::invalid_line(format!(
            "closing lines require a closing journal, not {}",
            journal.code
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_one_sided_lines_pass() {
        assert!(check_amounts(amount("10.00"), Amount::ZERO).is_ok());
        assert!(check_amounts(Amount::ZERO, amount("0.01")).is_ok());
    }

    #[test]
    fn test_zero_line_rejected() {
        let err = check_amounts(Amount::ZERO, Amount::ZERO).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidLine(_)));
    }

    #[test]
    fn test_two_sided_line_rejected() {
        assert!(check_amounts(amount("1.00"), amount("1.00")).is_err());
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(check_amounts(amount("-5.00"), Amount::ZERO).is_err());
        assert!(check_amounts(amount("5.00"), amount("-5.00")).is_err());
    }
}
