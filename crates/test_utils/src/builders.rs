//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::NaiveDate;
use domain_ledger::{DraftEntry, NewLine, NewPayable, NewPayableLine, PaymentTerms};
use rust_decimal::Decimal;

use crate::fixtures::{AmountFixtures, DateFixtures};

/// Builder for constructing test journal entries
pub struct TestEntryBuilder {
    journal_code: String,
    date: NaiveDate,
    description: String,
    reference: Option<String>,
    lines: Vec<NewLine>,
}

impl Default for TestEntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEntryBuilder {
    /// Creates a general journal entry dated 15 January 2024
    pub fn new() -> Self {
        Self {
            journal_code: "GJ".to_string(),
            date: DateFixtures::jan_15(),
            description: "Test entry".to_string(),
            reference: None,
            lines: Vec::new(),
        }
    }

    pub fn in_journal(mut self, code: impl Into<String>) -> Self {
        self.journal_code = code.into();
        self
    }

    pub fn dated(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Adds a debit line; `amount` is parsed as a two-decimal amount
    pub fn debit(mut self, code: &str, amount: &str) -> Self {
        self.lines.push(NewLine::debit(code, AmountFixtures::amount(amount)));
        self
    }

    /// Adds a credit line; `amount` is parsed as a two-decimal amount
    pub fn credit(mut self, code: &str, amount: &str) -> Self {
        self.lines.push(NewLine::credit(code, AmountFixtures::amount(amount)));
        self
    }

    /// Adds a prepared line as is
    pub fn line(mut self, line: NewLine) -> Self {
        self.lines.push(line);
        self
    }

    /// Builds the draft header and its lines
    pub fn build(self) -> (DraftEntry, Vec<NewLine>) {
        let mut draft = DraftEntry::new(self.journal_code, self.date, self.description);
        if let Some(reference) = self.reference {
            draft = draft.with_reference(reference);
        }
        (draft, self.lines)
    }
}

/// Builder for constructing test vendor bills
pub struct TestPayableBuilder {
    vendor: String,
    invoice_number: Option<String>,
    invoice_date: NaiveDate,
    terms: PaymentTerms,
    due_date: Option<NaiveDate>,
    tax: Option<String>,
    lines: Vec<NewPayableLine>,
}

impl Default for TestPayableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPayableBuilder {
    /// Creates a net-30 bill from a stationery vendor dated 15 January 2024
    pub fn new() -> Self {
        Self {
            vendor: "Legal Stationers Ltd".to_string(),
            invoice_number: Some("INV-1001".to_string()),
            invoice_date: DateFixtures::jan_15(),
            terms: PaymentTerms::Net30,
            due_date: None,
            tax: None,
            lines: Vec::new(),
        }
    }

    pub fn from_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn with_invoice_number(mut self, number: impl Into<String>) -> Self {
        self.invoice_number = Some(number.into());
        self
    }

    pub fn dated(mut self, date: NaiveDate) -> Self {
        self.invoice_date = date;
        self
    }

    pub fn with_terms(mut self, terms: PaymentTerms) -> Self {
        self.terms = terms;
        self
    }

    /// Sets an explicit due date, used with custom terms
    pub fn due_on(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn with_tax(mut self, amount: &str) -> Self {
        self.tax = Some(amount.to_string());
        self
    }

    /// Adds a bill line of `quantity` units at `unit_price`
    pub fn line(mut self, description: &str, account_code: &str, quantity: Decimal, unit_price: &str) -> Self {
        self.lines.push(NewPayableLine::new(
            description,
            account_code,
            quantity,
            AmountFixtures::amount(unit_price),
        ));
        self
    }

    pub fn build(self) -> NewPayable {
        let mut payable = NewPayable::new(self.vendor, self.invoice_date, self.terms);
        if let Some(number) = self.invoice_number {
            payable = payable.with_invoice_number(number);
        }
        if let Some(due_date) = self.due_date {
            payable = payable.due_on(due_date);
        }
        if let Some(tax) = self.tax {
            payable = payable.with_tax(AmountFixtures::amount(&tax));
        }
        for line in self.lines {
            payable = payable.line(line);
        }
        payable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_entry_builder_defaults() {
        let (draft, lines) = TestEntryBuilder::new()
            .debit("1010", "50.00")
            .credit("4000", "50.00")
            .build();

        assert_eq!(draft.journal_code, "GJ");
        assert_eq!(draft.date, DateFixtures::jan_15());
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_payable_builder_collects_lines() {
        let payable = TestPayableBuilder::new()
            .line("Paper", "5300", dec!(10), "12.50")
            .with_tax("25.00")
            .build();

        assert_eq!(payable.lines.len(), 1);
        assert_eq!(payable.vendor, "Legal Stationers Ltd");
    }
}
