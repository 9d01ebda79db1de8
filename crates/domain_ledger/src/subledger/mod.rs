//! Subledger adapters
//!
//! Expense and payable records move through their own state machines.
//! Transitions that touch the ledger describe their entry through
//! [`LedgerEmitter`] and hand it to [`post_emitted`], which drives the
//! entry engine in the caller's unit of work. Subledgers never write
//! accounts or balances themselves.

pub mod expense;
pub mod payable;

use chrono::{DateTime, NaiveDate, Utc};

use core_kernel::{Actor, Amount};

use crate::entry::{DraftEntry, JournalEntry, NewLine};
use crate::error::{LedgerError, LedgerResult};
use crate::journal::{self, JournalType};
use crate::posting;
use crate::store::LedgerTx;

/// Header and lines of an entry a subledger wants posted
#[derive(Debug, Clone, Default)]
pub struct EntryBuilder {
    journal_type: Option<JournalType>,
    date: Option<NaiveDate>,
    description: Option<String>,
    reference: Option<String>,
    lines: Vec<NewLine>,
}

impl EntryBuilder {
    pub fn journal(&mut self, journal_type: JournalType) -> &mut Self {
        self.journal_type = Some(journal_type);
        self
    }

    pub fn dated(&mut self, date: NaiveDate) -> &mut Self {
        self.date = Some(date);
        self
    }

    pub fn describe(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    pub fn reference(&mut self, reference: impl Into<String>) -> &mut Self {
        self.reference = Some(reference.into());
        self
    }

    /// Adds a debit line; zero amounts are skipped
    pub fn debit(&mut self, account_code: &str, amount: Amount, description: impl Into<String>) -> &mut Self {
        if !amount.is_zero() {
            self.lines.push(NewLine::debit(account_code, amount).with_description(description));
        }
        self
    }

    /// Adds a credit line; zero amounts are skipped
    pub fn credit(&mut self, account_code: &str, amount: Amount, description: impl Into<String>) -> &mut Self {
        if !amount.is_zero() {
            self.lines.push(NewLine::credit(account_code, amount).with_description(description));
        }
        self
    }

    pub fn lines(&self) -> &[NewLine] {
        &self.lines
    }

    fn into_parts(self) -> LedgerResult<(JournalType, DraftEntry, Vec<NewLine>)> {
        let journal_type = self
            .journal_type
            .ok_or_else(|| LedgerError::validation("emitted entry has no journal"))?;
        let date = self
            .date
            .ok_or_else(|| LedgerError::validation("emitted entry has no date"))?;
        let description = self
            .description
            .ok_or_else(|| LedgerError::validation("emitted entry has no description"))?;

        // Journal code is filled in once the journal is resolved.
        let mut draft = DraftEntry::new(String::new(), date, description);
        draft.reference = self.reference;
        Ok((journal_type, draft, self.lines))
    }
}

/// A subledger transition that produces a ledger entry
pub trait LedgerEmitter {
    /// Describes the entry into `builder`
    fn emit(&self, builder: &mut EntryBuilder) -> LedgerResult<()>;
}

/// Opens, fills and posts the entry described by `emitter`
///
/// Runs entirely in the caller's unit of work, so a failure anywhere
/// leaves neither the entry nor the subledger change behind once the
/// caller drops the transaction.
pub async fn post_emitted<T, E>(tx: &mut T, emitter: &E, actor: &Actor, now: DateTime<Utc>) -> LedgerResult<JournalEntry>
where
    T: LedgerTx,
    E: LedgerEmitter + ?Sized,
{
    let mut builder = EntryBuilder::default();
    emitter.emit(&mut builder)?;
    let (journal_type, mut draft, lines) = builder.into_parts()?;

    let journal = journal::journal_for_type(tx, journal_type).await?;
    draft.journal_code = journal.code;
    let entry = posting::open_draft(tx, draft, actor, now).await?;
    for line in lines {
        posting::add_line(tx, entry.id, line).await?;
    }
    posting::post(tx, entry.id, actor, now).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_skips_zero_lines() {
        let mut builder = EntryBuilder::default();
        builder
            .journal(JournalType::CashDisbursements)
            .dated(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
            .describe("Payment")
            .debit("5100", "100.00".parse().unwrap(), "Rent")
            .debit("2060", Amount::ZERO, "Tax")
            .credit("1010", "100.00".parse().unwrap(), "Bank");

        assert_eq!(builder.lines().len(), 2);
    }

    #[test]
    fn test_builder_requires_header() {
        let mut builder = EntryBuilder::default();
        builder.describe("No journal");
        assert!(matches!(builder.into_parts(), Err(LedgerError::Validation(_))));
    }
}
