//! Ledger domain errors

use chrono::NaiveDate;
use thiserror::Error;

use core_kernel::{Amount, MoneyError, PortError, TemporalError};

use crate::account::AccountType;

/// Classification of ledger errors for callers and transport layers
///
/// Several concrete errors share a kind; the web layer maps kinds to
/// responses and treats `ContentionAborted` as a retry hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ValidationFailure,
    UnbalancedEntry,
    PeriodClosed,
    PeriodLocked,
    InvalidStateTransition,
    AccountInUse,
    IncompatibleParentType,
    OverlappingPeriod,
    GapNotAllowed,
    ContentionAborted,
    ConsistencyFailure,
    NotFound,
    Conflict,
    Storage,
}

/// Errors that can occur in the ledger domain
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Input shape or basic constraint violated
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Temporal(#[from] TemporalError),

    /// Account code already used (case-insensitive)
    #[error("Account code already in use: {0}")]
    CodeConflict(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Account {code} is in use: {reason}")]
    AccountInUse { code: String, reason: String },

    #[error("Parent account {parent} is {parent_type}, expected {expected}")]
    IncompatibleParentType {
        parent: String,
        parent_type: AccountType,
        expected: AccountType,
    },

    #[error("Period {name} overlaps existing period {existing}")]
    OverlappingPeriod { name: String, existing: String },

    #[error("Gap between periods: expected {expected}, got {found}")]
    GapNotAllowed { expected: NaiveDate, found: NaiveDate },

    #[error("Unknown period: {0}")]
    UnknownPeriod(String),

    #[error("No accounting period covers {0}")]
    NoPeriodForDate(NaiveDate),

    #[error("Period {0} is already closed")]
    PeriodAlreadyClosed(String),

    #[error("Period {period} is closed for {date}")]
    PeriodClosed { period: String, date: NaiveDate },

    #[error("Period {0} is locked")]
    PeriodLocked(String),

    #[error("Period {period} still has {count} draft entries")]
    DraftEntriesPending { period: String, count: usize },

    #[error("Unknown journal: {0}")]
    UnknownJournal(String),

    #[error("Journal code already in use: {0}")]
    DuplicateJournal(String),

    #[error("No active {0} journal")]
    MissingJournal(String),

    #[error("Journal {0} is inactive")]
    JournalInactive(String),

    #[error("Unknown journal entry: {0}")]
    UnknownEntry(String),

    #[error("Unbalanced entry {number}: debits={debits}, credits={credits}")]
    UnbalancedEntry {
        number: String,
        debits: Amount,
        credits: Amount,
    },

    #[error("Invalid line: {0}")]
    InvalidLine(String),

    #[error("Entry {number} is {status}, expected draft")]
    EntryNotDraft { number: String, status: String },

    #[error("Entry {number} is {status}, expected posted")]
    EntryNotPosted { number: String, status: String },

    #[error("Entry {0} has already been reversed")]
    AlreadyReversed(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Unknown {entity}: {id}")]
    UnknownRecord { entity: &'static str, id: String },

    /// Lock timeout or serialization retry exhausted
    #[error("Contention aborted {operation} after {waited_ms}ms")]
    ContentionAborted { operation: String, waited_ms: u64 },

    /// Stored roll-up disagrees with the lines it summarises
    #[error("Consistency failure: {0}")]
    ConsistencyFailure(String),

    #[error("Balance sheet out of balance as of {as_of}: assets={assets}, liabilities and equity={liabilities_and_equity}")]
    BalanceSheetImbalance {
        as_of: NaiveDate,
        assets: Amount,
        liabilities_and_equity: Amount,
    },

    #[error("Storage error: {0}")]
    Store(PortError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Maps this error onto its reported kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_)
            | LedgerError::Money(_)
            | LedgerError::Temporal(_)
            | LedgerError::InvalidLine(_)
            | LedgerError::NoPeriodForDate(_)
            | LedgerError::JournalInactive(_)
            | LedgerError::Config(_) => ErrorKind::ValidationFailure,
            LedgerError::UnbalancedEntry { .. } => ErrorKind::UnbalancedEntry,
            LedgerError::PeriodClosed { .. } => ErrorKind::PeriodClosed,
            LedgerError::PeriodLocked(_) => ErrorKind::PeriodLocked,
            LedgerError::PeriodAlreadyClosed(_)
            | LedgerError::DraftEntriesPending { .. }
            | LedgerError::EntryNotDraft { .. }
            | LedgerError::EntryNotPosted { .. }
            | LedgerError::AlreadyReversed(_)
            | LedgerError::InvalidStateTransition(_) => ErrorKind::InvalidStateTransition,
            LedgerError::AccountInUse { .. } => ErrorKind::AccountInUse,
            LedgerError::IncompatibleParentType { .. } => ErrorKind::IncompatibleParentType,
            LedgerError::OverlappingPeriod { .. } => ErrorKind::OverlappingPeriod,
            LedgerError::GapNotAllowed { .. } => ErrorKind::GapNotAllowed,
            LedgerError::ContentionAborted { .. } => ErrorKind::ContentionAborted,
            LedgerError::ConsistencyFailure(_) | LedgerError::BalanceSheetImbalance { .. } => {
                ErrorKind::ConsistencyFailure
            }
            LedgerError::UnknownAccount(_)
            | LedgerError::UnknownPeriod(_)
            | LedgerError::UnknownJournal(_)
            | LedgerError::MissingJournal(_)
            | LedgerError::UnknownEntry(_)
            | LedgerError::UnknownRecord { .. } => ErrorKind::NotFound,
            LedgerError::CodeConflict(_) | LedgerError::DuplicateJournal(_) => ErrorKind::Conflict,
            LedgerError::Store(_) => ErrorKind::Storage,
        }
    }

    /// Returns true if the whole unit of work may be retried
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ContentionAborted
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub(crate) fn invalid_line(message: impl Into<String>) -> Self {
        LedgerError::InvalidLine(message.into())
    }
}

impl From<PortError> for LedgerError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::Contention {
                operation,
                waited_ms,
            } => LedgerError::ContentionAborted {
                operation,
                waited_ms,
            },
            other => LedgerError::Store(other),
        }
    }
}

/// Result alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_maps_to_retryable_kind() {
        let error: LedgerError = PortError::contention("post", 250).into();
        assert_eq!(error.kind(), ErrorKind::ContentionAborted);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_state_errors_share_kind() {
        let not_draft = LedgerError::EntryNotDraft {
            number: "GJ-000001".to_string(),
            status: "posted".to_string(),
        };
        let reversed = LedgerError::AlreadyReversed("GJ-000001".to_string());
        assert_eq!(not_draft.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(reversed.kind(), ErrorKind::InvalidStateTransition);
        assert!(!reversed.is_retryable());
    }

    #[test]
    fn test_money_errors_are_validation_failures() {
        let error: LedgerError = MoneyError::Overflow.into();
        assert_eq!(error.kind(), ErrorKind::ValidationFailure);
    }
}
