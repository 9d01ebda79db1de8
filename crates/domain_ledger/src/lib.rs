//! Ledger Domain - Double-Entry Accounting Core
//!
//! This crate implements the general ledger of a law-firm practice
//! management system: chart of accounts, accounting periods, journals,
//! the entry engine, balance roll-ups, period close, financial statements
//! and the expense and payables subledgers.
//!
//! # Double-Entry Invariants
//!
//! - Every posted entry has equal debit and credit totals
//! - Only the entry engine writes lines; only the balance service writes roll-ups
//! - Posted entries are never edited; corrections are reversing entries
//! - Closed periods accept no new entries except through reopen
//!
//! # Units of Work
//!
//! All operations are generic over [`LedgerTx`] and run inside one unit of
//! work obtained from a [`LedgerStore`]. [`Ledger`] wraps each operation
//! in its own unit of work and retries on contention.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{DraftEntry, InMemoryLedgerStore, Ledger, LedgerConfig, NewLine};
//!
//! let ledger = Ledger::new(InMemoryLedgerStore::new(), LedgerConfig::default());
//!
//! // Record a retainer deposit
//! let entry = ledger
//!     .record_entry(
//!         DraftEntry::new("CRJ", date, "Retainer received"),
//!         vec![NewLine::debit("1010", amount), NewLine::credit("2100", amount)],
//!         &actor,
//!     )
//!     .await?;
//! ```

pub mod account;
pub mod balance;
pub mod chart;
pub mod close;
pub mod config;
pub mod entry;
pub mod error;
pub mod journal;
pub mod memory;
pub mod period;
pub mod posting;
pub mod service;
pub mod statements;
pub mod store;
pub mod subledger;

pub use account::{
    Account, AccountCategory, AccountFilter, AccountStatus, AccountType, AccountUpdate, BalanceSide,
    LawFirmChartOfAccounts, NewAccount,
};
pub use balance::{AccountBalance, RecomputeOutcome};
pub use close::CloseOutcome;
pub use config::LedgerConfig;
pub use entry::{DraftEntry, EntryDetail, EntryQuery, EntryStatus, JournalEntry, JournalEntryLine, NewLine};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use journal::{Journal, JournalStatus, JournalType, NewJournal, StandardJournals};
pub use memory::{InMemoryLedgerStore, InMemoryLedgerTx};
pub use period::{AccountingPeriod, NewPeriod, PeriodFrequency, PeriodStatus};
pub use service::Ledger;
pub use statements::{
    BalanceSheet, FinancialStatement, IncomeStatement, StatementRequest, StatementType, TrialBalance,
    TrialBalanceLine,
};
pub use store::{LedgerStore, LedgerTx, RowLock};
pub use subledger::expense::{Expense, ExpenseCategory, ExpenseStatus, NewExpense};
pub use subledger::payable::{
    AccountsPayable, NewPayable, NewPayableLine, PayableStatus, PaymentRequest, PaymentTerms,
};
pub use subledger::{EntryBuilder, LedgerEmitter};
