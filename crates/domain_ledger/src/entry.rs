//! Journal entry and line types
//!
//! This module defines the records the entry engine works on and the
//! queries used to read them back.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AccountId, Actor, Amount, JournalEntryId, JournalId, LineId, PeriodId};

use crate::account::BalanceSide;

/// Lifecycle status of a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Draft,
    Posted,
    /// Posted and later neutralised by a reversing entry
    Reversed,
    Void,
}

impl EntryStatus {
    /// Statuses whose lines count towards balances
    ///
    /// A reversed entry stays effective; its reversing entry carries the
    /// cancelling lines.
    pub const EFFECTIVE: [EntryStatus; 2] = [EntryStatus::Posted, EntryStatus::Reversed];

    pub fn is_effective(&self) -> bool {
        Self::EFFECTIVE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Draft => "draft",
            EntryStatus::Posted => "posted",
            EntryStatus::Reversed => "reversed",
            EntryStatus::Void => "void",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single balanced transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    /// `<journal code>-<seq>`, unique
    pub number: String,
    pub journal_id: JournalId,
    pub period_id: PeriodId,
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub status: EntryStatus,
    pub total_debit: Amount,
    pub total_credit: Amount,
    /// Entry this one reverses
    pub reverses: Option<JournalEntryId>,
    /// Entry that reversed this one
    pub reversed_by_entry: Option<JournalEntryId>,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub posted_by: Option<Actor>,
    pub posted_at: Option<DateTime<Utc>>,
    pub reversed_by: Option<Actor>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversal_reason: Option<String>,
    pub voided_by: Option<Actor>,
    pub voided_at: Option<DateTime<Utc>>,
}

impl JournalEntry {
    pub fn is_draft(&self) -> bool {
        self.status == EntryStatus::Draft
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}

/// One debit or credit against one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub id: LineId,
    pub entry_id: JournalEntryId,
    /// Position within the entry, from 1
    pub line_no: u32,
    pub account_id: AccountId,
    pub description: Option<String>,
    pub debit: Amount,
    pub credit: Amount,
    pub is_adjustment: bool,
    pub is_closing: bool,
}

impl JournalEntryLine {
    pub fn side(&self) -> BalanceSide {
        if self.debit.is_positive() {
            BalanceSide::Debit
        } else {
            BalanceSide::Credit
        }
    }

    pub fn amount(&self) -> Amount {
        match self.side() {
            BalanceSide::Debit => self.debit,
            BalanceSide::Credit => self.credit,
        }
    }
}

/// Header fields for a new draft entry
#[derive(Debug, Clone)]
pub struct DraftEntry {
    pub journal_code: String,
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    /// Pins the entry to a period instead of resolving it from the date
    pub period_id: Option<PeriodId>,
}

impl DraftEntry {
    pub fn new(journal_code: impl Into<String>, date: NaiveDate, description: impl Into<String>) -> Self {
        Self {
            journal_code: journal_code.into(),
            date,
            description: description.into(),
            reference: None,
            period_id: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn in_period(mut self, period_id: PeriodId) -> Self {
        self.period_id = Some(period_id);
        self
    }
}

/// A line to add to a draft entry
///
/// Both amounts are carried so invalid combinations can be reported
/// rather than made unrepresentable at the call site.
#[derive(Debug, Clone)]
pub struct NewLine {
    pub account_code: String,
    pub debit: Amount,
    pub credit: Amount,
    pub description: Option<String>,
    pub is_adjustment: bool,
    pub is_closing: bool,
}

impl NewLine {
    /// Creates a debit line
    ///
    /// # Arguments
    ///
    /// * `account_code` - Account to debit
    /// * `amount` - Amount to debit
    pub fn debit(account_code: impl Into<String>, amount: Amount) -> Self {
        Self {
            account_code: account_code.into(),
            debit: amount,
            credit: Amount::ZERO,
            description: None,
            is_adjustment: false,
            is_closing: false,
        }
    }

    /// Creates a credit line
    ///
    /// # Arguments
    ///
    /// * `account_code` - Account to credit
    /// * `amount` - Amount to credit
    pub fn credit(account_code: impl Into<String>, amount: Amount) -> Self {
        Self {
            account_code: account_code.into(),
            debit: Amount::ZERO,
            credit: amount,
            description: None,
            is_adjustment: false,
            is_closing: false,
        }
    }

    /// Creates a line on `side`
    pub fn on_side(account_code: impl Into<String>, side: BalanceSide, amount: Amount) -> Self {
        match side {
            BalanceSide::Debit => Self::debit(account_code, amount),
            BalanceSide::Credit => Self::credit(account_code, amount),
        }
    }

    /// Adds a description to the line
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn adjustment(mut self) -> Self {
        self.is_adjustment = true;
        self
    }

    pub fn closing(mut self) -> Self {
        self.is_closing = true;
        self
    }
}

/// An entry together with its lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDetail {
    pub entry: JournalEntry,
    pub lines: Vec<JournalEntryLine>,
}

/// Filter for listing entries
#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
    pub journal_id: Option<JournalId>,
    pub period_id: Option<PeriodId>,
    pub status: Option<EntryStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl EntryQuery {
    pub fn in_journal(mut self, journal_id: JournalId) -> Self {
        self.journal_id = Some(journal_id);
        self
    }

    pub fn in_period(mut self, period_id: PeriodId) -> Self {
        self.period_id = Some(period_id);
        self
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn matches(&self, entry: &JournalEntry) -> bool {
        self.journal_id.map_or(true, |j| entry.journal_id == j)
            && self.period_id.map_or(true, |p| entry.period_id == p)
            && self.status.map_or(true, |s| entry.status == s)
            && self.date_from.map_or(true, |d| entry.date >= d)
            && self.date_to.map_or(true, |d| entry.date <= d)
    }
}

/// A line joined with the header fields of its entry
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerLine {
    pub line: JournalEntryLine,
    pub entry_number: String,
    pub journal_id: JournalId,
    pub period_id: PeriodId,
    pub date: NaiveDate,
    pub status: EntryStatus,
}

/// Filter for reading ledger lines
#[derive(Debug, Clone, Default)]
pub struct LineQuery {
    pub account_id: Option<AccountId>,
    pub period_ids: Option<Vec<PeriodId>>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Empty matches every status
    pub statuses: Vec<EntryStatus>,
    pub exclude_closing: bool,
}

impl LineQuery {
    /// Lines of posted and reversed entries
    pub fn effective() -> Self {
        Self {
            statuses: EntryStatus::EFFECTIVE.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_statuses(statuses: &[EntryStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    pub fn for_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn in_periods(mut self, period_ids: Vec<PeriodId>) -> Self {
        self.period_ids = Some(period_ids);
        self
    }

    pub fn through(mut self, date: NaiveDate) -> Self {
        self.date_to = Some(date);
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn excluding_closing(mut self) -> Self {
        self.exclude_closing = true;
        self
    }

    pub fn matches(&self, line: &LedgerLine) -> bool {
        self.account_id.map_or(true, |a| line.line.account_id == a)
            && self
                .period_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&line.period_id))
            && self.date_from.map_or(true, |d| line.date >= d)
            && self.date_to.map_or(true, |d| line.date <= d)
            && (self.statuses.is_empty() || self.statuses.contains(&line.status))
            && !(self.exclude_closing && line.line.is_closing)
    }
}

/// Debit and credit totals of a set of lines
pub fn line_totals<'a, I>(lines: I) -> Result<(Amount, Amount), core_kernel::MoneyError>
where
    I: IntoIterator<Item = &'a JournalEntryLine>,
{
    lines.into_iter().try_fold((Amount::ZERO, Amount::ZERO), |(d, c), line| {
        Ok((d.checked_add(&line.debit)?, c.checked_add(&line.credit)?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(debit: &str, credit: &str, is_closing: bool) -> JournalEntryLine {
        JournalEntryLine {
            id: LineId::new(),
            entry_id: JournalEntryId::new(),
            line_no: 1,
            account_id: AccountId::new(),
            description: None,
            debit: debit.parse().unwrap(),
            credit: credit.parse().unwrap(),
            is_adjustment: false,
            is_closing,
        }
    }

    #[test]
    fn test_line_side_and_amount() {
        let debit = line("12.50", "0", false);
        assert_eq!(debit.side(), BalanceSide::Debit);
        assert_eq!(debit.amount().to_string(), "12.50");

        let credit = line("0", "7.25", false);
        assert_eq!(credit.side(), BalanceSide::Credit);
    }

    #[test]
    fn test_line_totals() {
        let lines = vec![line("100.00", "0", false), line("0", "60.00", false), line("0", "40.00", false)];
        let (debits, credits) = line_totals(&lines).unwrap();
        assert_eq!(debits, credits);
    }

    #[test]
    fn test_line_query_excludes_closing() {
        let ledger_line = LedgerLine {
            line: line("0", "10.00", true),
            entry_number: "CLOSING-000001".to_string(),
            journal_id: JournalId::new(),
            period_id: PeriodId::new(),
            date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            status: EntryStatus::Posted,
        };
        assert!(LineQuery::effective().matches(&ledger_line));
        assert!(!LineQuery::effective().excluding_closing().matches(&ledger_line));
        assert!(!LineQuery::with_statuses(&[EntryStatus::Draft]).matches(&ledger_line));
    }
}
