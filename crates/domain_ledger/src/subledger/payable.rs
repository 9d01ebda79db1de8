//! Accounts payable subledger
//!
//! `draft → pending_approval → approved → partially_paid → paid`, with
//! `cancelled` as a terminal branch. Approval accrues the bill in the
//! purchase journal; every payment relieves accounts payable through the
//! cash disbursements journal. Overdue is derived from the due date and
//! the balance due, never stored.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use core_kernel::{AccountId, Actor, Amount, JournalEntryId, PayableId, PayableLineId, PayablePaymentId};

use crate::account::AccountType;
use crate::chart;
use crate::entry::JournalEntry;
use crate::error::{LedgerError, LedgerResult};
use crate::journal::JournalType;
use crate::posting;
use crate::store::{LedgerTx, RowLock};
use crate::subledger::{post_emitted, EntryBuilder, LedgerEmitter};

/// Stored payable status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayableStatus {
    Draft,
    PendingApproval,
    Approved,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl PayableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayableStatus::Draft => "draft",
            PayableStatus::PendingApproval => "pending_approval",
            PayableStatus::Approved => "approved",
            PayableStatus::PartiallyPaid => "partially_paid",
            PayableStatus::Paid => "paid",
            PayableStatus::Cancelled => "cancelled",
        }
    }

    /// Approved bills with money still owed
    pub fn is_open_liability(&self) -> bool {
        matches!(self, PayableStatus::Approved | PayableStatus::PartiallyPaid)
    }
}

/// Vendor payment terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTerms {
    Immediate,
    Net15,
    Net30,
    Net45,
    Net60,
    Net90,
    /// Due date supplied by the caller
    Custom,
}

impl PaymentTerms {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentTerms::Immediate => "immediate",
            PaymentTerms::Net15 => "net_15",
            PaymentTerms::Net30 => "net_30",
            PaymentTerms::Net45 => "net_45",
            PaymentTerms::Net60 => "net_60",
            PaymentTerms::Net90 => "net_90",
            PaymentTerms::Custom => "custom",
        }
    }

    fn days(&self) -> Option<u64> {
        match self {
            PaymentTerms::Immediate => Some(0),
            PaymentTerms::Net15 => Some(15),
            PaymentTerms::Net30 => Some(30),
            PaymentTerms::Net45 => Some(45),
            PaymentTerms::Net60 => Some(60),
            PaymentTerms::Net90 => Some(90),
            PaymentTerms::Custom => None,
        }
    }

    /// Computes the due date of an invoice
    ///
    /// `Custom` terms require `custom_due_date`, which may not precede the
    /// invoice date.
    pub fn due_date(&self, invoice_date: NaiveDate, custom_due_date: Option<NaiveDate>) -> LedgerResult<NaiveDate> {
        match (self.days(), custom_due_date) {
            (Some(days), _) => invoice_date
                .checked_add_days(Days::new(days))
                .ok_or_else(|| LedgerError::validation("due date out of range")),
            (None, Some(due)) if due >= invoice_date => Ok(due),
            (None, Some(due)) => Err(LedgerError::validation(format!(
                "due date {} precedes invoice date {}",
                due, invoice_date
            ))),
            (None, None) => Err(LedgerError::validation("custom payment terms need a due date")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayableLine {
    pub id: PayableLineId,
    pub description: String,
    pub account_id: AccountId,
    pub quantity: Decimal,
    pub unit_price: Amount,
    /// `quantity × unit_price`, exact
    pub line_total: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayablePayment {
    pub id: PayablePaymentId,
    pub amount: Amount,
    pub payment_date: NaiveDate,
    pub payment_account_id: AccountId,
    pub method: String,
    pub reference: Option<String>,
    pub journal_entry_id: JournalEntryId,
    pub recorded_by: Actor,
    pub recorded_at: DateTime<Utc>,
}

/// A vendor bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountsPayable {
    pub id: PayableId,
    pub vendor: String,
    pub vendor_invoice_number: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub payment_terms: PaymentTerms,
    pub description: Option<String>,
    pub lines: Vec<PayableLine>,
    pub subtotal: Amount,
    pub tax_amount: Amount,
    pub total_amount: Amount,
    pub amount_paid: Amount,
    pub status: PayableStatus,
    pub payments: Vec<PayablePayment>,
    pub approval_entry_id: Option<JournalEntryId>,
    pub approved_by: Option<Actor>,
    pub approved_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountsPayable {
    /// Amount still owed
    pub fn balance_due(&self) -> Amount {
        self.total_amount - self.amount_paid
    }

    /// Returns true if money is owed past the due date
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status.is_open_liability() && today > self.due_date && self.balance_due().is_positive()
    }

    /// Status for display, reporting `overdue` where it applies
    pub fn display_status(&self, today: NaiveDate) -> &'static str {
        if self.is_overdue(today) {
            "overdue"
        } else {
            self.status.as_str()
        }
    }

    fn reference(&self) -> String {
        self.vendor_invoice_number
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// A bill line to record
#[derive(Debug, Clone)]
pub struct NewPayableLine {
    pub description: String,
    pub account_code: String,
    pub quantity: Decimal,
    pub unit_price: Amount,
}

impl NewPayableLine {
    pub fn new(description: impl Into<String>, account_code: impl Into<String>, quantity: Decimal, unit_price: Amount) -> Self {
        Self {
            description: description.into(),
            account_code: account_code.into(),
            quantity,
            unit_price,
        }
    }
}

/// Request to record a vendor bill
#[derive(Debug, Clone)]
pub struct NewPayable {
    pub vendor: String,
    pub vendor_invoice_number: Option<String>,
    pub invoice_date: NaiveDate,
    pub payment_terms: PaymentTerms,
    pub custom_due_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub tax_amount: Amount,
    pub lines: Vec<NewPayableLine>,
}

impl NewPayable {
    pub fn new(vendor: impl Into<String>, invoice_date: NaiveDate, payment_terms: PaymentTerms) -> Self {
        Self {
            vendor: vendor.into(),
            vendor_invoice_number: None,
            invoice_date,
            payment_terms,
            custom_due_date: None,
            description: None,
            tax_amount: Amount::ZERO,
            lines: Vec::new(),
        }
    }

    pub fn with_invoice_number(mut self, number: impl Into<String>) -> Self {
        self.vendor_invoice_number = Some(number.into());
        self
    }

    pub fn due_on(mut self, due_date: NaiveDate) -> Self {
        self.custom_due_date = Some(due_date);
        self
    }

    pub fn with_tax(mut self, tax_amount: Amount) -> Self {
        self.tax_amount = tax_amount;
        self
    }

    pub fn line(mut self, line: NewPayableLine) -> Self {
        self.lines.push(line);
        self
    }
}

/// A payment to record against an approved bill
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: Amount,
    pub payment_date: NaiveDate,
    pub payment_account_code: String,
    pub method: String,
    pub reference: Option<String>,
}

/// Accrual of an approved bill
pub struct PayableApproval<'a> {
    pub payable: &'a AccountsPayable,
    /// Account code of each bill line, in line order
    pub line_account_codes: Vec<String>,
    pub accounts_payable_code: String,
    pub tax_control_code: String,
    pub entry_date: NaiveDate,
}

impl LedgerEmitter for PayableApproval<'_> {
    fn emit(&self, builder: &mut EntryBuilder) -> LedgerResult<()> {
        let payable = self.payable;
        if self.line_account_codes.len() != payable.lines.len() {
            return Err(LedgerError::validation("every bill line needs an account"));
        }
        builder
            .journal(JournalType::Purchase)
            .dated(self.entry_date)
            .describe(format!("Bill from {}", payable.vendor))
            .reference(payable.reference());
        for (line, code) in payable.lines.iter().zip(&self.line_account_codes) {
            builder.debit(code, line.line_total, line.description.clone());
        }
        builder
            .debit(&self.tax_control_code, payable.tax_amount, format!("Tax on bill from {}", payable.vendor))
            .credit(&self.accounts_payable_code, payable.total_amount, payable.vendor.clone());
        Ok(())
    }
}

/// Cash disbursement against a bill
pub struct PayableSettlement<'a> {
    pub payable: &'a AccountsPayable,
    pub request: &'a PaymentRequest,
    pub accounts_payable_code: String,
}

impl LedgerEmitter for PayableSettlement<'_> {
    fn emit(&self, builder: &mut EntryBuilder) -> LedgerResult<()> {
        let payable = self.payable;
        let reference = self.request.reference.clone().unwrap_or_else(|| payable.reference());
        builder
            .journal(JournalType::CashDisbursements)
            .dated(self.request.payment_date)
            .describe(format!("Payment to {}", payable.vendor))
            .reference(reference)
            .debit(&self.accounts_payable_code, self.request.amount, payable.vendor.clone())
            .credit(
                &self.request.payment_account_code,
                self.request.amount,
                format!("{} payment", self.request.method),
            );
        Ok(())
    }
}

/// Records a draft bill
///
/// Line accounts must be active expense or asset accounts; every line
/// total must be exact at two decimal places.
#[instrument(skip(tx, new, actor), fields(vendor = %new.vendor))]
pub async fn create_payable<T: LedgerTx>(
    tx: &mut T,
    new: NewPayable,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<AccountsPayable> {
    if new.vendor.trim().is_empty() {
        return Err(LedgerError::validation("vendor is required"));
    }
    if new.lines.is_empty() {
        return Err(LedgerError::validation("a bill needs at least one line"));
    }
    if new.tax_amount.is_negative() {
        return Err(LedgerError::validation("tax must not be negative"));
    }
    let due_date = new.payment_terms.due_date(new.invoice_date, new.custom_due_date)?;

    let mut lines = Vec::with_capacity(new.lines.len());
    for line in new.lines {
        if line.quantity <= Decimal::ZERO {
            return Err(LedgerError::validation(format!("quantity for '{}' must be positive", line.description)));
        }
        if !line.unit_price.is_positive() {
            return Err(LedgerError::validation(format!("unit price for '{}' must be positive", line.description)));
        }
        let account = chart::get_account_by_code(tx, &line.account_code).await?;
        if !account.is_active() || !matches!(account.account_type, AccountType::Expense | AccountType::Asset) {
            return Err(LedgerError::validation(format!(
                "{} is not an active expense or asset account",
                account.code
            )));
        }
        lines.push(PayableLine {
            id: PayableLineId::new_v7(),
            line_total: line.unit_price.checked_mul(line.quantity)?,
            description: line.description,
            account_id: account.id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        });
    }
    let subtotal = Amount::checked_sum(lines.iter().map(|l| &l.line_total))?;
    let total_amount = subtotal.checked_add(&new.tax_amount)?;

    let payable = AccountsPayable {
        id: PayableId::new_v7(),
        vendor: new.vendor.trim().to_string(),
        vendor_invoice_number: new.vendor_invoice_number,
        invoice_date: new.invoice_date,
        due_date,
        payment_terms: new.payment_terms,
        description: new.description,
        lines,
        subtotal,
        tax_amount: new.tax_amount,
        total_amount,
        amount_paid: Amount::ZERO,
        status: PayableStatus::Draft,
        payments: Vec::new(),
        approval_entry_id: None,
        approved_by: None,
        approved_at: None,
        cancellation_reason: None,
        created_by: actor.clone(),
        created_at: now,
        updated_at: now,
    };
    tx.insert_payable(&payable).await?;

    info!(payable = %payable.id, total = %payable.total_amount, due = %payable.due_date, "Recorded payable");
    Ok(payable)
}

/// Sends a draft bill for approval
pub async fn submit_payable<T: LedgerTx>(tx: &mut T, id: PayableId, now: DateTime<Utc>) -> LedgerResult<AccountsPayable> {
    let mut payable = lock_payable(tx, id).await?;
    expect_status(&payable, PayableStatus::Draft, "submitted")?;
    payable.status = PayableStatus::PendingApproval;
    payable.updated_at = now;
    tx.update_payable(&payable).await?;
    Ok(payable)
}

/// Approves a bill and accrues it
///
/// Posts `Dr` each line account and the tax control, `Cr` accounts
/// payable for the total, dated `entry_date`.
#[instrument(skip(tx, actor))]
pub async fn approve_payable<T: LedgerTx>(
    tx: &mut T,
    id: PayableId,
    entry_date: NaiveDate,
    accounts_payable_code: &str,
    tax_control_code: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<(AccountsPayable, JournalEntry)> {
    let mut payable = lock_payable(tx, id).await?;
    expect_status(&payable, PayableStatus::PendingApproval, "approved")?;

    let mut line_account_codes = Vec::with_capacity(payable.lines.len());
    for line in &payable.lines {
        line_account_codes.push(chart::get_account(tx, line.account_id).await?.code);
    }
    let emitter = PayableApproval {
        payable: &payable,
        line_account_codes,
        accounts_payable_code: accounts_payable_code.to_string(),
        tax_control_code: tax_control_code.to_string(),
        entry_date,
    };
    let entry = post_emitted(tx, &emitter, actor, now).await?;

    payable.status = PayableStatus::Approved;
    payable.approval_entry_id = Some(entry.id);
    payable.approved_by = Some(actor.clone());
    payable.approved_at = Some(now);
    payable.updated_at = now;
    tx.update_payable(&payable).await?;

    info!(payable = %payable.id, entry = %entry.number, actor = %actor, "Approved payable");
    Ok((payable, entry))
}

/// Records a payment against an approved bill
///
/// # Errors
///
/// - `InvalidStateTransition` unless the bill is approved or partially paid
/// - `Validation` unless `0 < amount ≤ balance_due` and the payment account
///   is an active cash or bank account
#[instrument(skip(tx, request, actor), fields(amount = %request.amount))]
pub async fn record_payment<T: LedgerTx>(
    tx: &mut T,
    id: PayableId,
    request: PaymentRequest,
    accounts_payable_code: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<(AccountsPayable, JournalEntry)> {
    let mut payable = lock_payable(tx, id).await?;
    if !payable.status.is_open_liability() {
        return Err(LedgerError::InvalidStateTransition(format!(
            "payable {} is {}, payments need an approved bill",
            payable.id,
            payable.status.as_str()
        )));
    }
    if !request.amount.is_positive() {
        return Err(LedgerError::validation("payment amount must be positive"));
    }
    let balance_due = payable.balance_due();
    if request.amount > balance_due {
        return Err(LedgerError::validation(format!(
            "payment {} exceeds balance due {}",
            request.amount, balance_due
        )));
    }
    let payment_account = chart::get_account_by_code(tx, &request.payment_account_code).await?;
    if !payment_account.is_cash_or_bank() || !payment_account.is_active() {
        return Err(LedgerError::validation(format!(
            "{} is not an active cash or bank account",
            payment_account.code
        )));
    }

    let emitter = PayableSettlement {
        payable: &payable,
        request: &request,
        accounts_payable_code: accounts_payable_code.to_string(),
    };
    let entry = post_emitted(tx, &emitter, actor, now).await?;

    payable.amount_paid = payable.amount_paid.checked_add(&request.amount)?;
    payable.status = if payable.balance_due().is_zero() {
        PayableStatus::Paid
    } else {
        PayableStatus::PartiallyPaid
    };
    payable.payments.push(PayablePayment {
        id: PayablePaymentId::new_v7(),
        amount: request.amount,
        payment_date: request.payment_date,
        payment_account_id: payment_account.id,
        method: request.method,
        reference: request.reference,
        journal_entry_id: entry.id,
        recorded_by: actor.clone(),
        recorded_at: now,
    });
    payable.updated_at = now;
    tx.update_payable(&payable).await?;

    info!(
        payable = %payable.id,
        entry = %entry.number,
        balance_due = %payable.balance_due(),
        status = payable.status.as_str(),
        "Recorded payable payment"
    );
    Ok((payable, entry))
}

/// Cancels a bill
///
/// An approved bill without payments has its accrual reversed, dated
/// `effective_date`. Bills with payments cannot be cancelled.
#[instrument(skip(tx, actor, reason))]
pub async fn cancel_payable<T: LedgerTx>(
    tx: &mut T,
    id: PayableId,
    reason: &str,
    effective_date: NaiveDate,
    actor: &Actor,
    now: DateTime<Utc>,
) -> LedgerResult<AccountsPayable> {
    if reason.trim().is_empty() {
        return Err(LedgerError::validation("a cancellation reason is required"));
    }
    let mut payable = lock_payable(tx, id).await?;
    match payable.status {
        PayableStatus::Draft | PayableStatus::PendingApproval => {}
        PayableStatus::Approved => {
            if let Some(entry_id) = payable.approval_entry_id {
                posting::reverse(tx, entry_id, actor, reason, effective_date, now).await?;
            }
        }
        status => {
            return Err(LedgerError::InvalidStateTransition(format!(
                "payable {} is {} and cannot be cancelled",
                payable.id,
                status.as_str()
            )))
        }
    }

    payable.status = PayableStatus::Cancelled;
    payable.cancellation_reason = Some(reason.trim().to_string());
    payable.updated_at = now;
    tx.update_payable(&payable).await?;

    info!(payable = %payable.id, actor = %actor, "Cancelled payable");
    Ok(payable)
}

pub async fn get_payable<T: LedgerTx>(tx: &mut T, id: PayableId) -> LedgerResult<AccountsPayable> {
    tx.find_payable(id, RowLock::None)
        .await?
        .ok_or_else(|| LedgerError::UnknownRecord {
            entity: "payable",
            id: id.to_string(),
        })
}

pub async fn list_payables<T: LedgerTx>(
    tx: &mut T,
    status: Option<PayableStatus>,
) -> LedgerResult<Vec<AccountsPayable>> {
    Ok(tx.list_payables(status).await?)
}

/// Bills past due on `today`, oldest due date first
pub async fn list_overdue<T: LedgerTx>(tx: &mut T, today: NaiveDate) -> LedgerResult<Vec<AccountsPayable>> {
    let mut overdue: Vec<AccountsPayable> = tx
        .list_payables(None)
        .await?
        .into_iter()
        .filter(|p| p.is_overdue(today))
        .collect();
    overdue.sort_by_key(|p| p.due_date);
    Ok(overdue)
}

async fn lock_payable<T: LedgerTx>(tx: &mut T, id: PayableId) -> LedgerResult<AccountsPayable> {
    tx.find_payable(id, RowLock::Exclusive)
        .await?
        .ok_or_else(|| LedgerError::UnknownRecord {
            entity: "payable",
            id: id.to_string(),
        })
}

fn expect_status(payable: &AccountsPayable, expected: PayableStatus, action: &str) -> LedgerResult<()> {
    if payable.status != expected {
        return Err(LedgerError::InvalidStateTransition(format!(
            "payable {} is {} and cannot be {}",
            payable.id,
            payable.status.as_str(),
            action
        )));
    }
    Ok(())
}
