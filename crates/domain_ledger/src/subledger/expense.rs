//! Expense subledger
//!
//! `draft → submitted → approved → paid`, with `rejected` and `cancelled`
//! as terminal branches. Paying an expense posts a cash disbursement:
//!
//! ```text
//! Dr  expense account      net
//! Dr  tax control          tax
//!     Cr  cash / bank          gross = net + tax
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use core_kernel::{AccountId, Actor, Amount, ExpenseCategoryId, ExpenseId, JournalEntryId};

use crate::account::AccountType;
use crate::chart;
use crate::entry::JournalEntry;
use crate::error::{LedgerError, LedgerResult};
use crate::journal::JournalType;
use crate::store::{LedgerTx, RowLock};
use crate::subledger::{post_emitted, EntryBuilder, LedgerEmitter};

/// Maps a spending category onto an expense account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseCategory {
    pub id: ExpenseCategoryId,
    pub name: String,
    pub account_id: AccountId,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Draft,
    Submitted,
    Approved,
    Paid,
    Rejected,
    Cancelled,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Draft => "draft",
            ExpenseStatus::Submitted => "submitted",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::Paid => "paid",
            ExpenseStatus::Rejected => "rejected",
            ExpenseStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true if the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: ExpenseStatus) -> bool {
        use ExpenseStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Draft, Cancelled)
                | (Submitted, Approved)
                | (Submitted, Rejected)
                | (Submitted, Cancelled)
                | (Approved, Paid)
                | (Approved, Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub title: String,
    pub description: Option<String>,
    pub category_id: ExpenseCategoryId,
    pub expense_date: NaiveDate,
    pub vendor: Option<String>,
    pub invoice_number: Option<String>,
    pub net_amount: Amount,
    pub tax_amount: Amount,
    /// Always `net_amount + tax_amount`
    pub gross_amount: Amount,
    pub status: ExpenseStatus,
    pub submitted_by: Option<Actor>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Actor>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub paid_by: Option<Actor>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_account_id: Option<AccountId>,
    pub journal_entry_id: Option<JournalEntryId>,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    fn transition(&mut self, next: ExpenseStatus, now: DateTime<Utc>) -> LedgerResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidStateTransition(format!(
                "expense {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// Request to record an expense
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub title: String,
    pub category_id: ExpenseCategoryId,
    pub expense_date: NaiveDate,
    pub net_amount: Amount,
    pub tax_amount: Amount,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub invoice_number: Option<String>,
}

impl NewExpense {
    pub fn new(title: impl Into<String>, category_id: ExpenseCategoryId, expense_date: NaiveDate, net_amount: Amount) -> Self {
        Self {
            title: title.into(),
            category_id,
            expense_date,
            net_amount,
            tax_amount: Amount::ZERO,
            description: None,
            vendor: None,
            invoice_number: None,
        }
    }

    pub fn with_tax(mut self, tax_amount: Amount) -> Self {
        self.tax_amount = tax_amount;
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>, invoice_number: Option<String>) -> Self {
        self.vendor = Some(vendor.into());
        self.invoice_number = invoice_number;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Cash disbursement for an approved expense
pub struct ExpensePayment<'a> {
    pub expense: &'a Expense,
    pub expense_account_code: String,
    pub tax_control_code: String,
    pub payment_account_code: String,
    pub payment_date: NaiveDate,
}

impl LedgerEmitter for ExpensePayment<'_> {
    fn emit(&self, builder: &mut EntryBuilder) -> LedgerResult<()> {
        let expense = self.expense;
        let reference = expense
            .invoice_number
            .clone()
            .unwrap_or_else(|| expense.id.to_string());
        builder
            .journal(JournalType::CashDisbursements)
            .dated(self.payment_date)
            .describe(format!("Expense paid: {}", expense.title))
            .reference(reference)
            .debit(&self.expense_account_code, expense.net_amount, expense.title.clone())
            .debit(&self.tax_control_code, expense.tax_amount, format!("Tax on {}", expense.title))
            .credit(&self.payment_account_code, expense.gross_amount, format!("Payment for {}", expense.title));
        Ok(())
    }
}

/// Creates an expense category mapped to an active expense account
pub async fn create_expense_category<T: LedgerTx>(
    tx: &mut T,
    name: &str,
    account_code: &str,
    description: Option<String>,
    now: DateTime<Utc>,
) -> LedgerResult<ExpenseCategory> {
    if name.trim().is_empty() {
        return Err(LedgerError::validation("category name is required"));
    }
    let account = chart::get_account_by_code(tx, account_code).await?;
    if account.account_type != AccountType::Expense || !account.is_active() {
        return Err(LedgerError::validation(format!(
            "expense categories must map to an active expense account, not {}",
            account.code
        )));
    }

    let category = ExpenseCategory {
        id: ExpenseCategoryId::new_v7(),
        name: name.trim().to_string(),
        account_id: account.id,
        description,
        is_active: true,
        created_at: now,
    };
    tx.insert_expense_category(&category).await?;
    Ok(category)
}

/// Records a draft expense
#[instrument(skip(tx, new, actor), fields(title = %new.title))]
pub async fn record_expense<T: LedgerTx>(
    tx: &mut T,
    new: NewExpense,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<Expense> {
    if new.title.trim().is_empty() {
        return Err(LedgerError::validation("expense title is required"));
    }
    if !new.net_amount.is_positive() {
        return Err(LedgerError::validation("expense net amount must be positive"));
    }
    if new.tax_amount.is_negative() {
        return Err(LedgerError::validation("expense tax must not be negative"));
    }
    let category = find_category(tx, new.category_id).await?;
    if !category.is_active {
        return Err(LedgerError::validation(format!("category {} is inactive", category.name)));
    }
    let gross_amount = new.net_amount.checked_add(&new.tax_amount)?;

    let expense = Expense {
        id: ExpenseId::new_v7(),
        title: new.title.trim().to_string(),
        description: new.description,
        category_id: category.id,
        expense_date: new.expense_date,
        vendor: new.vendor,
        invoice_number: new.invoice_number,
        net_amount: new.net_amount,
        tax_amount: new.tax_amount,
        gross_amount,
        status: ExpenseStatus::Draft,
        submitted_by: None,
        submitted_at: None,
        approved_by: None,
        approved_at: None,
        rejection_reason: None,
        paid_by: None,
        paid_at: None,
        payment_account_id: None,
        journal_entry_id: None,
        created_by: actor.clone(),
        created_at: now,
        updated_at: now,
    };
    tx.insert_expense(&expense).await?;

    info!(expense = %expense.id, gross = %expense.gross_amount, "Recorded expense");
    Ok(expense)
}

pub async fn submit_expense<T: LedgerTx>(
    tx: &mut T,
    id: ExpenseId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<Expense> {
    let mut expense = lock_expense(tx, id).await?;
    expense.transition(ExpenseStatus::Submitted, now)?;
    expense.submitted_by = Some(actor.clone());
    expense.submitted_at = Some(now);
    tx.update_expense(&expense).await?;
    Ok(expense)
}

pub async fn approve_expense<T: LedgerTx>(
    tx: &mut T,
    id: ExpenseId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<Expense> {
    let mut expense = lock_expense(tx, id).await?;
    expense.transition(ExpenseStatus::Approved, now)?;
    expense.approved_by = Some(actor.clone());
    expense.approved_at = Some(now);
    tx.update_expense(&expense).await?;

    info!(expense = %expense.id, actor = %actor, "Approved expense");
    Ok(expense)
}

pub async fn reject_expense<T: LedgerTx>(
    tx: &mut T,
    id: ExpenseId,
    actor: &Actor,
    reason: &str,
    now: DateTime<Utc>,
) -> LedgerResult<Expense> {
    if reason.trim().is_empty() {
        return Err(LedgerError::validation("a rejection reason is required"));
    }
    let mut expense = lock_expense(tx, id).await?;
    expense.transition(ExpenseStatus::Rejected, now)?;
    expense.rejection_reason = Some(format!("Rejected by {}: {}", actor, reason.trim()));
    tx.update_expense(&expense).await?;

    info!(expense = %expense.id, actor = %actor, "Rejected expense");
    Ok(expense)
}

pub async fn cancel_expense<T: LedgerTx>(
    tx: &mut T,
    id: ExpenseId,
    now: DateTime<Utc>,
) -> LedgerResult<Expense> {
    let mut expense = lock_expense(tx, id).await?;
    expense.transition(ExpenseStatus::Cancelled, now)?;
    tx.update_expense(&expense).await?;
    Ok(expense)
}

/// Pays an approved expense and posts the disbursement
///
/// # Errors
///
/// - `InvalidStateTransition` unless the expense is approved; a paid
///   expense cannot be paid again
/// - `Validation` if the payment account is not an active cash or bank account
#[instrument(skip(tx, actor))]
pub async fn pay_expense<T: LedgerTx>(
    tx: &mut T,
    id: ExpenseId,
    payment_account_code: &str,
    payment_date: NaiveDate,
    tax_control_code: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<(Expense, JournalEntry)> {
    let mut expense = lock_expense(tx, id).await?;
    if !expense.status.can_transition_to(ExpenseStatus::Paid) {
        return Err(LedgerError::InvalidStateTransition(format!(
            "expense {} is {}, only approved expenses can be paid",
            expense.id,
            expense.status.as_str()
        )));
    }

    let category = find_category(tx, expense.category_id).await?;
    let expense_account = chart::get_account(tx, category.account_id).await?;
    let payment_account = chart::get_account_by_code(tx, payment_account_code).await?;
    if !payment_account.is_cash_or_bank() || !payment_account.is_active() {
        return Err(LedgerError::validation(format!(
            "{} is not an active cash or bank account",
            payment_account.code
        )));
    }

    let emitter = ExpensePayment {
        expense: &expense,
        expense_account_code: expense_account.code,
        tax_control_code: tax_control_code.to_string(),
        payment_account_code: payment_account.code.clone(),
        payment_date,
    };
    let entry = post_emitted(tx, &emitter, actor, now).await?;

    expense.transition(ExpenseStatus::Paid, now)?;
    expense.paid_by = Some(actor.clone());
    expense.paid_at = Some(now);
    expense.payment_account_id = Some(payment_account.id);
    expense.journal_entry_id = Some(entry.id);
    tx.update_expense(&expense).await?;

    info!(
        expense = %expense.id,
        entry = %entry.number,
        gross = %expense.gross_amount,
        "Paid expense"
    );
    Ok((expense, entry))
}

pub async fn get_expense<T: LedgerTx>(tx: &mut T, id: ExpenseId) -> LedgerResult<Expense> {
    tx.find_expense(id, RowLock::None)
        .await?
        .ok_or_else(|| LedgerError::UnknownRecord {
            entity: "expense",
            id: id.to_string(),
        })
}

async fn lock_expense<T: LedgerTx>(tx: &mut T, id: ExpenseId) -> LedgerResult<Expense> {
    tx.find_expense(id, RowLock::Exclusive)
        .await?
        .ok_or_else(|| LedgerError::UnknownRecord {
            entity: "expense",
            id: id.to_string(),
        })
}

async fn find_category<T: LedgerTx>(tx: &mut T, id: ExpenseCategoryId) -> LedgerResult<ExpenseCategory> {
    tx.find_expense_category(id)
        .await?
        .ok_or_else(|| LedgerError::UnknownRecord {
            entity: "expense category",
            id: id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_edges() {
        use ExpenseStatus::*;
        assert!(Draft.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Paid));
        assert!(!Draft.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Paid));
        assert!(!Rejected.can_transition_to(Submitted));
        assert!(!Cancelled.can_transition_to(Draft));
    }

    #[test]
    fn test_payment_emits_net_tax_and_gross() {
        let now = Utc::now();
        let expense = Expense {
            id: ExpenseId::new(),
            title: "Court filing".to_string(),
            description: None,
            category_id: ExpenseCategoryId::new(),
            expense_date: NaiveDate::from_ymd_opt(2024, 2, 5).unwrap(),
            vendor: None,
            invoice_number: Some("INV-77".to_string()),
            net_amount: "100.00".parse().unwrap(),
            tax_amount: "15.00".parse().unwrap(),
            gross_amount: "115.00".parse().unwrap(),
            status: ExpenseStatus::Approved,
            submitted_by: None,
            submitted_at: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            paid_by: None,
            paid_at: None,
            payment_account_id: None,
            journal_entry_id: None,
            created_by: Actor::system(),
            created_at: now,
            updated_at: now,
        };
        let emitter = ExpensePayment {
            expense: &expense,
            expense_account_code: "5200".to_string(),
            tax_control_code: "2060".to_string(),
            payment_account_code: "1010".to_string(),
            payment_date: expense.expense_date,
        };

        let mut builder = EntryBuilder::default();
        emitter.emit(&mut builder).unwrap();

        let lines = builder.lines();
        assert_eq!(lines.len(), 3);
        let debits: Vec<Amount> = lines.iter().map(|l| l.debit).collect();
        let credits = lines.iter().map(|l| l.credit).fold(Amount::ZERO, |a, b| a + b);
        assert_eq!(debits[0] + debits[1], credits);
        assert_eq!(lines[2].account_code, "1010");
    }
}
