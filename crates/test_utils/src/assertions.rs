//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for ledger types that give
//! more meaningful error messages than standard assertions.

use core_kernel::Amount;
use domain_ledger::{BalanceSheet, EntryDetail, ErrorKind, LedgerResult, TrialBalance};
use std::fmt::Debug;

use crate::fixtures::AmountFixtures;

/// Asserts that an amount equals a two-decimal literal
///
/// # Panics
///
/// Panics if the amounts differ
pub fn assert_amount_eq(actual: Amount, expected: &str) {
    let expected = AmountFixtures::amount(expected);
    assert_eq!(actual, expected, "Expected amount {}, got {}", expected, actual);
}

/// Asserts that an entry's lines have equal debit and credit totals
pub fn assert_entry_balanced(detail: &EntryDetail) {
    let debits: Amount = detail.lines.iter().map(|line| line.debit).sum();
    let credits: Amount = detail.lines.iter().map(|line| line.credit).sum();
    assert_eq!(
        debits, credits,
        "Entry {} is unbalanced: debits={}, credits={}",
        detail.entry.number, debits, credits
    );
}

/// Asserts that every line of an entry has exactly one positive side
pub fn assert_lines_single_sided(detail: &EntryDetail) {
    for line in &detail.lines {
        let debit_only = line.debit.is_positive() && line.credit.is_zero();
        let credit_only = line.credit.is_positive() && line.debit.is_zero();
        assert!(
            debit_only || credit_only,
            "Line {} of entry {} has debit={} and credit={}",
            line.line_no,
            detail.entry.number,
            line.debit,
            line.credit
        );
    }
}

/// Asserts that a trial balance reports equal totals
pub fn assert_trial_balance_balanced(trial_balance: &TrialBalance) {
    assert!(
        trial_balance.is_balanced && trial_balance.total_debits == trial_balance.total_credits,
        "Trial balance as of {} is out of balance: debits={}, credits={}",
        trial_balance.as_of,
        trial_balance.total_debits,
        trial_balance.total_credits
    );
}

/// Asserts that assets equal liabilities plus equity
pub fn assert_balance_sheet_balances(sheet: &BalanceSheet) {
    assert_eq!(
        sheet.assets.total, sheet.total_liabilities_and_equity,
        "Balance sheet as of {} does not balance: assets={}, liabilities and equity={}",
        sheet.as_of, sheet.assets.total, sheet.total_liabilities_and_equity
    );
}

/// Asserts that a result failed with the given error kind
///
/// # Panics
///
/// Panics if the result succeeded or failed with another kind
pub fn assert_error_kind<T: Debug>(result: &LedgerResult<T>, expected: ErrorKind) {
    match result {
        Ok(value) => panic!("Expected {:?} error, got Ok({:?})", expected, value),
        Err(err) => assert_eq!(err.kind(), expected, "Expected {:?} error, got {}", expected, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_ledger::LedgerError;

    #[test]
    fn test_assert_amount_eq() {
        assert_amount_eq("12.50".parse().unwrap(), "12.50");
    }

    #[test]
    #[should_panic(expected = "Expected amount")]
    fn test_assert_amount_eq_fails() {
        assert_amount_eq("12.50".parse().unwrap(), "12.51");
    }

    #[test]
    fn test_assert_error_kind() {
        let result: LedgerResult<()> = Err(LedgerError::UnknownAccount("9999".to_string()));
        assert_error_kind(&result, ErrorKind::NotFound);
    }

    #[test]
    #[should_panic(expected = "got Ok")]
    fn test_assert_error_kind_on_success() {
        let result: LedgerResult<u32> = Ok(1);
        assert_error_kind(&result, ErrorKind::NotFound);
    }
}
