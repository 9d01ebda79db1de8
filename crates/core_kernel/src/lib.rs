//! Core Kernel - Foundational types shared by the ledger crates
//!
//! This crate provides the fundamental building blocks used by the accounting core:
//! - Exact monetary amounts at scale 2 (rounding is never performed)
//! - Inclusive civil date ranges for accounting periods
//! - Strongly-typed identifiers and actor references
//! - Port error types shared by storage adapters

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;

pub use money::{Amount, MoneyError};
pub use temporal::{DateRange, TemporalError};
pub use identifiers::{
    AccountId, Actor, ExpenseCategoryId, ExpenseId, JournalEntryId, JournalId, LineId,
    PayableId, PayableLineId, PayablePaymentId, PeriodId, StatementId,
};
pub use ports::{DomainPort, PortError};
