//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data and a bootstrapped in-memory ledger.
//! These fixtures are designed to be consistent and predictable for tests.

use chrono::NaiveDate;
use core_kernel::{Actor, Amount};
use domain_ledger::{
    AccountingPeriod, DraftEntry, InMemoryLedgerStore, JournalEntry, LawFirmChartOfAccounts, Ledger,
    LedgerConfig, LedgerResult, NewLine, PeriodFrequency,
};

/// Fixture for amounts
pub struct AmountFixtures;

impl AmountFixtures {
    /// Parses a two-decimal amount such as `"500.00"`
    pub fn amount(value: &str) -> Amount {
        value.parse().expect("valid test amount")
    }

    pub fn hundred() -> Amount {
        Self::amount("100.00")
    }

    /// One minor unit, for off-by-a-cent cases
    pub fn one_cent() -> Amount {
        Self::amount("0.01")
    }
}

/// Fixture for dates in fiscal year 2024
pub struct DateFixtures;

impl DateFixtures {
    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
    }

    pub fn jan_15() -> NaiveDate {
        Self::date(2024, 1, 15)
    }

    pub fn jan_31() -> NaiveDate {
        Self::date(2024, 1, 31)
    }

    pub fn feb_10() -> NaiveDate {
        Self::date(2024, 2, 10)
    }

    pub fn mar_31() -> NaiveDate {
        Self::date(2024, 3, 31)
    }
}

/// Fixture for actors
pub struct ActorFixtures;

impl ActorFixtures {
    pub fn bookkeeper() -> Actor {
        Actor::new("bookkeeper@firm.test")
    }

    pub fn partner() -> Actor {
        Actor::new("partner@firm.test")
    }
}

/// An in-memory ledger with the standard journals, the law-firm chart of
/// accounts and monthly periods for 2024
pub struct LedgerFixture {
    pub ledger: Ledger<InMemoryLedgerStore>,
    pub actor: Actor,
    pub periods: Vec<AccountingPeriod>,
}

impl LedgerFixture {
    /// Creates the standard fixture with default configuration
    pub async fn standard() -> Self {
        Self::with_config(LedgerConfig::default()).await
    }

    pub async fn with_config(config: LedgerConfig) -> Self {
        let ledger = Ledger::new(InMemoryLedgerStore::new(), config);
        let actor = ActorFixtures::bookkeeper();

        ledger
            .bootstrap_journals(&actor)
            .await
            .expect("standard journals");
        ledger
            .create_accounts(LawFirmChartOfAccounts::standard(), &actor)
            .await
            .expect("standard chart");
        let periods = ledger
            .generate_fiscal_year(2024, PeriodFrequency::Monthly, false, false, &actor)
            .await
            .expect("fiscal year 2024");

        Self { ledger, actor, periods }
    }

    /// Period for a month of 2024, 1-based
    pub fn period(&self, month: usize) -> &AccountingPeriod {
        &self.periods[month - 1]
    }

    /// Records and posts an entry, returning the error if posting fails
    pub async fn try_post(
        &self,
        journal_code: &str,
        date: NaiveDate,
        description: &str,
        lines: Vec<NewLine>,
    ) -> LedgerResult<JournalEntry> {
        self.ledger
            .record_entry(DraftEntry::new(journal_code, date, description), lines, &self.actor)
            .await
    }

    /// Records and posts an entry, panicking if posting fails
    pub async fn post(&self, journal_code: &str, date: NaiveDate, description: &str, lines: Vec<NewLine>) -> JournalEntry {
        self.try_post(journal_code, date, description, lines)
            .await
            .expect("entry posts")
    }

    /// Posts a two-line general journal entry
    pub async fn post_simple(&self, date: NaiveDate, debit_code: &str, credit_code: &str, amount: &str) -> JournalEntry {
        let amount = AmountFixtures::amount(amount);
        self.post(
            "GJ",
            date,
            "Test entry",
            vec![NewLine::debit(debit_code, amount), NewLine::credit(credit_code, amount)],
        )
        .await
    }

    /// Balance of an account as of a date, in normal-balance terms
    pub async fn balance(&self, code: &str, as_of: NaiveDate) -> Amount {
        self.ledger
            .balance_as_of(code, as_of)
            .await
            .expect("balance lookup")
    }
}
