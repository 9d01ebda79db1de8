//! Account types for the chart of accounts
//!
//! This module defines the account structure for double-entry bookkeeping,
//! the normal-balance rule, and the practice's standard chart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AccountId, Actor, Amount};

/// Types of accounts in the chart of accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Asset accounts (debit normal balance)
    Asset,
    /// Liability accounts (credit normal balance)
    Liability,
    /// Equity accounts (credit normal balance)
    Equity,
    /// Revenue accounts (credit normal balance)
    Revenue,
    /// Expense accounts (debit normal balance)
    Expense,
}

impl AccountType {
    /// Returns true if this account type has a debit normal balance
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }

    /// The normal balance of a non-contra account of this type
    pub fn default_normal_balance(&self) -> BalanceSide {
        if self.is_debit_normal() {
            BalanceSide::Debit
        } else {
            BalanceSide::Credit
        }
    }

    /// Revenue and expense balances are closed into equity each period
    pub fn is_temporary(&self) -> bool {
        matches!(self, AccountType::Revenue | AccountType::Expense)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Equity => "equity",
            AccountType::Revenue => "revenue",
            AccountType::Expense => "expense",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The side on which an account carries a positive balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSide {
    Debit,
    Credit,
}

impl BalanceSide {
    pub fn opposite(&self) -> BalanceSide {
        match self {
            BalanceSide::Debit => BalanceSide::Credit,
            BalanceSide::Credit => BalanceSide::Debit,
        }
    }

    /// Movement in this side's terms: `debits - credits` for debit-normal,
    /// `credits - debits` for credit-normal.
    pub fn signed_movement(&self, debits: Amount, credits: Amount) -> Amount {
        match self {
            BalanceSide::Debit => debits - credits,
            BalanceSide::Credit => credits - debits,
        }
    }
}

/// Refined subtype of an account for financial reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountCategory {
    CurrentAsset,
    FixedAsset,
    IntangibleAsset,
    CurrentLiability,
    LongTermLiability,
    OwnersEquity,
    RetainedEarnings,
    OperatingRevenue,
    NonOperatingRevenue,
    OperatingExpense,
    NonOperatingExpense,
    /// Usable with any account type
    Other,
}

impl AccountCategory {
    /// The account type this category refines, or `None` for `Other`
    pub fn account_type(&self) -> Option<AccountType> {
        match self {
            AccountCategory::CurrentAsset
            | AccountCategory::FixedAsset
            | AccountCategory::IntangibleAsset => Some(AccountType::Asset),
            AccountCategory::CurrentLiability | AccountCategory::LongTermLiability => {
                Some(AccountType::Liability)
            }
            AccountCategory::OwnersEquity | AccountCategory::RetainedEarnings => {
                Some(AccountType::Equity)
            }
            AccountCategory::OperatingRevenue | AccountCategory::NonOperatingRevenue => {
                Some(AccountType::Revenue)
            }
            AccountCategory::OperatingExpense | AccountCategory::NonOperatingExpense => {
                Some(AccountType::Expense)
            }
            AccountCategory::Other => None,
        }
    }

    /// Returns true if this category may be used for `account_type`
    pub fn fits(&self, account_type: AccountType) -> bool {
        self.account_type().map_or(true, |t| t == account_type)
    }

    /// Default category for a new account of `account_type`
    pub fn default_for(account_type: AccountType) -> Self {
        match account_type {
            AccountType::Asset => AccountCategory::CurrentAsset,
            AccountType::Liability => AccountCategory::CurrentLiability,
            AccountType::Equity => AccountCategory::OwnersEquity,
            AccountType::Revenue => AccountCategory::OperatingRevenue,
            AccountType::Expense => AccountCategory::OperatingExpense,
        }
    }
}

/// Lifecycle status of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
    Closed,
}

/// An account in the chart of accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: AccountId,
    /// Account code (e.g., "1000"), unique ignoring case
    pub code: String,
    /// Account name
    pub name: String,
    /// Account type
    pub account_type: AccountType,
    /// Account category
    pub category: AccountCategory,
    /// Side carrying a positive balance, inverted for contra accounts
    pub normal_balance: BalanceSide,
    /// Parent account ID (same type)
    pub parent_id: Option<AccountId>,
    /// Description
    pub description: Option<String>,
    /// Balance at onboarding, in normal-balance terms
    pub opening_balance: Amount,
    /// Balance over every effective line, in normal-balance terms
    pub current_balance: Amount,
    pub status: AccountStatus,
    pub is_cash: bool,
    pub is_bank: bool,
    pub is_contra: bool,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Movement in this account's normal-balance terms
    pub fn signed_movement(&self, debits: Amount, credits: Amount) -> Amount {
        self.normal_balance.signed_movement(debits, credits)
    }

    /// Converts a normal-balance amount into the sign convention of the
    /// account's type, so contra balances reduce their section.
    pub fn type_signed(&self, natural: Amount) -> Amount {
        if self.normal_balance == self.account_type.default_normal_balance() {
            natural
        } else {
            -natural
        }
    }

    /// Returns true if the account may be used as a payment source
    pub fn is_cash_or_bank(&self) -> bool {
        self.is_cash || self.is_bank
    }
}

/// Normalises an account code for case-insensitive comparison
pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// Request to create an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub category: Option<AccountCategory>,
    pub parent_code: Option<String>,
    pub description: Option<String>,
    pub opening_balance: Amount,
    pub is_cash: bool,
    pub is_bank: bool,
    pub is_contra: bool,
}

impl NewAccount {
    /// Creates a new account request
    ///
    /// # Arguments
    ///
    /// * `code` - Account code
    /// * `name` - Account name
    /// * `account_type` - Type of account
    pub fn new(code: impl Into<String>, name: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            account_type,
            category: None,
            parent_code: None,
            description: None,
            opening_balance: Amount::ZERO,
            is_cash: false,
            is_bank: false,
            is_contra: false,
        }
    }

    /// Sets the account category
    pub fn with_category(mut self, category: AccountCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the parent account by code
    pub fn with_parent(mut self, parent_code: impl Into<String>) -> Self {
        self.parent_code = Some(parent_code.into());
        self
    }

    /// Sets the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the onboarding balance, in normal-balance terms
    pub fn with_opening_balance(mut self, opening_balance: Amount) -> Self {
        self.opening_balance = opening_balance;
        self
    }

    /// Marks the account as a contra account
    pub fn contra(mut self) -> Self {
        self.is_contra = true;
        self
    }

    pub fn cash(mut self) -> Self {
        self.is_cash = true;
        self
    }

    pub fn bank(mut self) -> Self {
        self.is_bank = true;
        self
    }

    /// Normal balance fixed by type, inverted for contra accounts
    pub fn normal_balance(&self) -> BalanceSide {
        let side = self.account_type.default_normal_balance();
        if self.is_contra {
            side.opposite()
        } else {
            side
        }
    }
}

/// Changes applied by `update_account`; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub category: Option<AccountCategory>,
    pub description: Option<Option<String>>,
    pub parent_code: Option<Option<String>>,
    pub is_cash: Option<bool>,
    pub is_bank: Option<bool>,
    pub opening_balance: Option<Amount>,
}

/// Filter for iterating the chart
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub account_type: Option<AccountType>,
    pub category: Option<AccountCategory>,
    pub status: Option<AccountStatus>,
}

impl AccountFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, account_type: AccountType) -> Self {
        self.account_type = Some(account_type);
        self
    }

    pub fn in_category(mut self, category: AccountCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, account: &Account) -> bool {
        self.account_type.map_or(true, |t| account.account_type == t)
            && self.category.map_or(true, |c| account.category == c)
            && self.status.map_or(true, |s| account.status == s)
    }
}

/// Standard chart of accounts for a law practice
pub struct LawFirmChartOfAccounts;

impl LawFirmChartOfAccounts {
    /// Creates the standard account requests, parents before children
    pub fn standard() -> Vec<NewAccount> {
        use AccountCategory::*;
        use AccountType::*;

        vec![
            // Assets
            NewAccount::new("1000", "Cash on Hand", Asset).with_category(CurrentAsset).cash(),
            NewAccount::new("1010", "Operating Bank Account", Asset).with_category(CurrentAsset).bank(),
            NewAccount::new("1020", "Client Trust Account", Asset)
                .with_category(CurrentAsset)
                .bank()
                .with_description("Client funds held in trust"),
            NewAccount::new("1040", "Accounts Receivable - Legal Fees", Asset).with_category(CurrentAsset),
            NewAccount::new("1050", "Unbilled Disbursements", Asset).with_category(CurrentAsset),
            NewAccount::new("1500", "Office Equipment", Asset).with_category(FixedAsset),
            NewAccount::new("1510", "Accumulated Depreciation - Office Equipment", Asset)
                .with_category(FixedAsset)
                .with_parent("1500")
                .contra(),
            NewAccount::new("1520", "Computer Equipment", Asset).with_category(FixedAsset),
            NewAccount::new("1530", "Accumulated Depreciation - Computer Equipment", Asset)
                .with_category(FixedAsset)
                .with_parent("1520")
                .contra(),
            NewAccount::new("1700", "Practice Management Software", Asset).with_category(IntangibleAsset),

            // Liabilities
            NewAccount::new("2000", "Accounts Payable - Vendors", Liability).with_category(CurrentLiability),
            NewAccount::new("2020", "Client Trust Liability", Liability).with_category(CurrentLiability),
            NewAccount::new("2050", "Income Tax Payable", Liability).with_category(CurrentLiability),
            NewAccount::new("2060", "Sales Tax Payable", Liability).with_category(CurrentLiability),
            NewAccount::new("2500", "Long-Term Loans", Liability).with_category(LongTermLiability),

            // Equity
            NewAccount::new("3000", "Retained Earnings", Equity).with_category(RetainedEarnings),
            NewAccount::new("3010", "Partner Capital", Equity).with_category(OwnersEquity),
            NewAccount::new("3020", "Partner Withdrawals", Equity)
                .with_category(OwnersEquity)
                .contra(),

            // Revenue
            NewAccount::new("4000", "Legal Services Revenue", Revenue).with_category(OperatingRevenue),
            NewAccount::new("4010", "Litigation Fees", Revenue)
                .with_category(OperatingRevenue)
                .with_parent("4000"),
            NewAccount::new("4020", "Advisory Fees", Revenue)
                .with_category(OperatingRevenue)
                .with_parent("4000"),
            NewAccount::new("4090", "Fee Discounts and Write-offs", Revenue)
                .with_category(OperatingRevenue)
                .contra(),
            NewAccount::new("4100", "Interest Income", Revenue).with_category(NonOperatingRevenue),

            // Expenses
            NewAccount::new("5000", "Salaries and Wages", Expense).with_category(OperatingExpense),
            NewAccount::new("5100", "Office Rent", Expense).with_category(OperatingExpense),
            NewAccount::new("5200", "Court Filing Fees", Expense).with_category(OperatingExpense),
            NewAccount::new("5210", "Travel Expense", Expense).with_category(OperatingExpense),
            NewAccount::new("5300", "Professional Subscriptions", Expense).with_category(OperatingExpense),
            NewAccount::new("5390", "Depreciation Expense", Expense).with_category(OperatingExpense),
            NewAccount::new("5900", "Bank Charges and Interest", Expense).with_category(NonOperatingExpense),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_normal_balance_by_type() {
        assert_eq!(NewAccount::new("1", "a", AccountType::Asset).normal_balance(), BalanceSide::Debit);
        assert_eq!(NewAccount::new("2", "l", AccountType::Liability).normal_balance(), BalanceSide::Credit);
        assert_eq!(NewAccount::new("3", "e", AccountType::Equity).normal_balance(), BalanceSide::Credit);
        assert_eq!(NewAccount::new("4", "r", AccountType::Revenue).normal_balance(), BalanceSide::Credit);
        assert_eq!(NewAccount::new("5", "x", AccountType::Expense).normal_balance(), BalanceSide::Debit);
    }

    #[test]
    fn test_contra_inverts_normal_balance() {
        let depreciation = NewAccount::new("1510", "Acc Dep", AccountType::Asset).contra();
        assert_eq!(depreciation.normal_balance(), BalanceSide::Credit);
    }

    #[test]
    fn test_signed_movement() {
        let hundred: Amount = "100.00".parse().unwrap();
        let forty: Amount = "40.00".parse().unwrap();
        assert_eq!(BalanceSide::Debit.signed_movement(hundred, forty).to_string(), "60.00");
        assert_eq!(BalanceSide::Credit.signed_movement(hundred, forty).to_string(), "-60.00");
    }

    #[test]
    fn test_category_fits_type() {
        assert!(AccountCategory::FixedAsset.fits(AccountType::Asset));
        assert!(!AccountCategory::FixedAsset.fits(AccountType::Expense));
        assert!(AccountCategory::Other.fits(AccountType::Revenue));
    }

    #[test]
    fn test_code_normalisation() {
        assert_eq!(normalize_code(" AR-100 "), "ar-100");
    }

    #[test]
    fn test_standard_chart_is_consistent() {
        let chart = LawFirmChartOfAccounts::standard();
        let mut seen = HashSet::new();
        for account in &chart {
            assert!(seen.insert(normalize_code(&account.code)), "duplicate code {}", account.code);
            if let Some(category) = account.category {
                assert!(category.fits(account.account_type), "{} category mismatch", account.code);
            }
            if let Some(parent) = &account.parent_code {
                let parent = chart.iter().find(|a| &a.code == parent).unwrap();
                assert_eq!(parent.account_type, account.account_type);
            }
        }
        assert!(chart.iter().any(|a| a.code == "3000"));
    }
}
