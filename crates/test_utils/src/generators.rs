//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains ledger invariants.

use core_kernel::Amount;
use domain_ledger::NewLine;
use proptest::prelude::*;
use proptest::sample::select;

/// Debit-normal codes from the standard chart that accept ad-hoc postings
pub const DEBIT_CODES: &[&str] = &["1000", "1010", "1040", "1050", "5000", "5100", "5200", "5300"];

/// Credit-normal codes from the standard chart that accept ad-hoc postings
pub const CREDIT_CODES: &[&str] = &["2000", "2020", "2050", "3010", "4000", "4010", "4020", "4100"];

/// Strategy for generating valid positive amounts in minor units
pub fn positive_minor_units_strategy() -> impl Strategy<Value = i64> {
    1i64..10_000_000i64
}

/// Strategy for generating positive amounts up to 100,000.00
pub fn positive_amount_strategy() -> impl Strategy<Value = Amount> {
    positive_minor_units_strategy()
        .prop_map(|minor| Amount::from_minor(minor).expect("in range"))
}

/// Strategy for generating balanced line sets
///
/// Each generated pair debits one account and credits another for the
/// same amount, so debit and credit totals always agree.
pub fn balanced_lines_strategy() -> impl Strategy<Value = Vec<NewLine>> {
    prop::collection::vec(
        (select(DEBIT_CODES), select(CREDIT_CODES), positive_amount_strategy()),
        1..6,
    )
    .prop_map(|pairs| {
        pairs
            .into_iter()
            .flat_map(|(debit, credit, amount)| [NewLine::debit(debit, amount), NewLine::credit(credit, amount)])
            .collect()
    })
}

/// Strategy for generating line sets whose totals differ by at least one cent
pub fn unbalanced_lines_strategy() -> impl Strategy<Value = Vec<NewLine>> {
    (balanced_lines_strategy(), select(DEBIT_CODES), positive_amount_strategy())
        .prop_map(|(mut lines, code, extra)| {
            lines.push(NewLine::debit(code, extra));
            lines
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(lines: &[NewLine]) -> (Amount, Amount) {
        let debits = lines.iter().map(|l| l.debit).sum();
        let credits = lines.iter().map(|l| l.credit).sum();
        (debits, credits)
    }

    proptest! {
        #[test]
        fn test_balanced_lines_balance(lines in balanced_lines_strategy()) {
            let (debits, credits) = totals(&lines);
            prop_assert_eq!(debits, credits);
        }

        #[test]
        fn test_unbalanced_lines_differ(lines in unbalanced_lines_strategy()) {
            let (debits, credits) = totals(&lines);
            prop_assert!(debits > credits);
        }
    }
}
