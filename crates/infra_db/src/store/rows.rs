//! Row types for the ledger tables and their mapping onto domain records
//!
//! Enumerations are stored as their snake_case serde names, amounts as
//! `NUMERIC(15, 2)` and actors as plain text.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use core_kernel::{
    AccountId, Actor, Amount, ExpenseCategoryId, ExpenseId, JournalEntryId, JournalId, LineId, PayableId,
    PeriodId, PortError, StatementId,
};
use domain_ledger::balance::AccountBalance;
use domain_ledger::entry::LedgerLine;
use domain_ledger::subledger::payable::{PayableLine, PayablePayment};
use domain_ledger::{
    Account, AccountingPeriod, AccountsPayable, Expense, ExpenseCategory, FinancialStatement, Journal,
    JournalEntry, JournalEntryLine,
};

/// Text stored for an enumeration value
pub(crate) fn enum_text<T: Serialize>(value: &T) -> Result<String, PortError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(text)) => Ok(text),
        Ok(other) => Err(PortError::transformation(format!("expected a unit variant, got {}", other))),
        Err(e) => Err(PortError::transformation(e.to_string())),
    }
}

fn parse_enum<T: DeserializeOwned>(column: &str, text: String) -> Result<T, PortError> {
    serde_json::from_value(serde_json::Value::String(text))
        .map_err(|e| PortError::transformation(format!("{}: {}", column, e)))
}

fn amount(column: &str, value: Decimal) -> Result<Amount, PortError> {
    Amount::new(value).map_err(|e| PortError::transformation(format!("{}: {}", column, e)))
}

fn optional_amount(column: &str, value: Option<Decimal>) -> Result<Option<Amount>, PortError> {
    value.map(|v| amount(column, v)).transpose()
}

fn actor(value: Option<String>) -> Option<Actor> {
    value.map(Actor::new)
}

pub(crate) fn actor_text(value: &Option<Actor>) -> Option<String> {
    value.as_ref().map(|a| a.as_str().to_string())
}

#[derive(Debug, FromRow)]
pub(crate) struct AccountRow {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: String,
    pub category: String,
    pub normal_balance: String,
    pub parent_id: Option<Uuid>,
    pub description: Option<String>,
    pub opening_balance: Decimal,
    pub current_balance: Decimal,
    pub status: String,
    pub is_cash: bool,
    pub is_bank: bool,
    pub is_contra: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = PortError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: AccountId::from_uuid(row.id),
            code: row.code,
            name: row.name,
            account_type: parse_enum("account_type", row.account_type)?,
            category: parse_enum("category", row.category)?,
            normal_balance: parse_enum("normal_balance", row.normal_balance)?,
            parent_id: row.parent_id.map(AccountId::from_uuid),
            description: row.description,
            opening_balance: amount("opening_balance", row.opening_balance)?,
            current_balance: amount("current_balance", row.current_balance)?,
            status: parse_enum("status", row.status)?,
            is_cash: row.is_cash,
            is_bank: row.is_bank,
            is_contra: row.is_contra,
            created_by: Actor::new(row.created_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PeriodRow {
    pub id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub is_current: bool,
    pub is_adjustment: bool,
    pub opening_equity: Decimal,
    pub closing_equity: Option<Decimal>,
    pub closing_entry_id: Option<Uuid>,
    pub closed_by: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closing_notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PeriodRow> for AccountingPeriod {
    type Error = PortError;

    fn try_from(row: PeriodRow) -> Result<Self, Self::Error> {
        Ok(AccountingPeriod {
            id: PeriodId::from_uuid(row.id),
            name: row.name,
            start_date: row.start_date,
            end_date: row.end_date,
            status: parse_enum("status", row.status)?,
            is_current: row.is_current,
            is_adjustment: row.is_adjustment,
            opening_equity: amount("opening_equity", row.opening_equity)?,
            closing_equity: optional_amount("closing_equity", row.closing_equity)?,
            closing_entry_id: row.closing_entry_id.map(JournalEntryId::from_uuid),
            closed_by: actor(row.closed_by),
            closed_at: row.closed_at,
            closing_notes: row.closing_notes,
            created_by: Actor::new(row.created_by),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct JournalRow {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub journal_type: String,
    pub description: Option<String>,
    pub status: String,
    pub next_number: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<JournalRow> for Journal {
    type Error = PortError;

    fn try_from(row: JournalRow) -> Result<Self, Self::Error> {
        Ok(Journal {
            id: JournalId::from_uuid(row.id),
            code: row.code,
            name: row.name,
            journal_type: parse_enum("journal_type", row.journal_type)?,
            description: row.description,
            status: parse_enum("status", row.status)?,
            next_number: u64::try_from(row.next_number)
                .map_err(|_| PortError::transformation("next_number is negative"))?,
            created_by: Actor::new(row.created_by),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct EntryRow {
    pub id: Uuid,
    pub number: String,
    pub journal_id: Uuid,
    pub period_id: Uuid,
    pub entry_date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub status: String,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub reverses: Option<Uuid>,
    pub reversed_by_entry: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub posted_by: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub reversed_by: Option<String>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversal_reason: Option<String>,
    pub voided_by: Option<String>,
    pub voided_at: Option<DateTime<Utc>>,
}

impl TryFrom<EntryRow> for JournalEntry {
    type Error = PortError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(JournalEntry {
            id: JournalEntryId::from_uuid(row.id),
            number: row.number,
            journal_id: JournalId::from_uuid(row.journal_id),
            period_id: PeriodId::from_uuid(row.period_id),
            date: row.entry_date,
            description: row.description,
            reference: row.reference,
            status: parse_enum("status", row.status)?,
            total_debit: amount("total_debit", row.total_debit)?,
            total_credit: amount("total_credit", row.total_credit)?,
            reverses: row.reverses.map(JournalEntryId::from_uuid),
            reversed_by_entry: row.reversed_by_entry.map(JournalEntryId::from_uuid),
            created_by: Actor::new(row.created_by),
            created_at: row.created_at,
            posted_by: actor(row.posted_by),
            posted_at: row.posted_at,
            reversed_by: actor(row.reversed_by),
            reversed_at: row.reversed_at,
            reversal_reason: row.reversal_reason,
            voided_by: actor(row.voided_by),
            voided_at: row.voided_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct LineRow {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub line_no: i32,
    pub account_id: Uuid,
    pub description: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub is_adjustment: bool,
    pub is_closing: bool,
}

impl TryFrom<LineRow> for JournalEntryLine {
    type Error = PortError;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        Ok(JournalEntryLine {
            id: LineId::from_uuid(row.id),
            entry_id: JournalEntryId::from_uuid(row.entry_id),
            line_no: u32::try_from(row.line_no).map_err(|_| PortError::transformation("line_no is negative"))?,
            account_id: AccountId::from_uuid(row.account_id),
            description: row.description,
            debit: amount("debit", row.debit)?,
            credit: amount("credit", row.credit)?,
            is_adjustment: row.is_adjustment,
            is_closing: row.is_closing,
        })
    }
}

/// A line row joined with its entry header
#[derive(Debug, FromRow)]
pub(crate) struct LedgerLineRow {
    #[sqlx(flatten)]
    pub line: LineRow,
    pub entry_number: String,
    pub journal_id: Uuid,
    pub period_id: Uuid,
    pub entry_date: NaiveDate,
    pub entry_status: String,
}

impl TryFrom<LedgerLineRow> for LedgerLine {
    type Error = PortError;

    fn try_from(row: LedgerLineRow) -> Result<Self, Self::Error> {
        Ok(LedgerLine {
            line: row.line.try_into()?,
            entry_number: row.entry_number,
            journal_id: JournalId::from_uuid(row.journal_id),
            period_id: PeriodId::from_uuid(row.period_id),
            date: row.entry_date,
            status: parse_enum("status", row.entry_status)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct BalanceRow {
    pub account_id: Uuid,
    pub period_id: Uuid,
    pub opening_balance: Decimal,
    pub period_debits: Decimal,
    pub period_credits: Decimal,
    pub closing_balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BalanceRow> for AccountBalance {
    type Error = PortError;

    fn try_from(row: BalanceRow) -> Result<Self, Self::Error> {
        Ok(AccountBalance {
            account_id: AccountId::from_uuid(row.account_id),
            period_id: PeriodId::from_uuid(row.period_id),
            opening_balance: amount("opening_balance", row.opening_balance)?,
            period_debits: amount("period_debits", row.period_debits)?,
            period_credits: amount("period_credits", row.period_credits)?,
            closing_balance: amount("closing_balance", row.closing_balance)?,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct StatementRow {
    pub id: Uuid,
    pub statement_type: String,
    pub as_of_date: NaiveDate,
    pub period_id: Option<Uuid>,
    pub comparative_period_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub generated_by: String,
    pub generated_at: DateTime<Utc>,
}

impl TryFrom<StatementRow> for FinancialStatement {
    type Error = PortError;

    fn try_from(row: StatementRow) -> Result<Self, Self::Error> {
        Ok(FinancialStatement {
            id: StatementId::from_uuid(row.id),
            statement_type: parse_enum("statement_type", row.statement_type)?,
            as_of_date: row.as_of_date,
            period_id: row.period_id.map(PeriodId::from_uuid),
            comparative_period_id: row.comparative_period_id.map(PeriodId::from_uuid),
            payload: row.payload,
            generated_by: Actor::new(row.generated_by),
            generated_at: row.generated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ExpenseCategoryRow {
    pub id: Uuid,
    pub name: String,
    pub account_id: Uuid,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ExpenseCategoryRow> for ExpenseCategory {
    fn from(row: ExpenseCategoryRow) -> Self {
        ExpenseCategory {
            id: ExpenseCategoryId::from_uuid(row.id),
            name: row.name,
            account_id: AccountId::from_uuid(row.account_id),
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ExpenseRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Uuid,
    pub expense_date: NaiveDate,
    pub vendor: Option<String>,
    pub invoice_number: Option<String>,
    pub net_amount: Decimal,
    pub tax_amount: Decimal,
    pub gross_amount: Decimal,
    pub status: String,
    pub submitted_by: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub paid_by: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_account_id: Option<Uuid>,
    pub journal_entry_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ExpenseRow> for Expense {
    type Error = PortError;

    fn try_from(row: ExpenseRow) -> Result<Self, Self::Error> {
        Ok(Expense {
            id: ExpenseId::from_uuid(row.id),
            title: row.title,
            description: row.description,
            category_id: ExpenseCategoryId::from_uuid(row.category_id),
            expense_date: row.expense_date,
            vendor: row.vendor,
            invoice_number: row.invoice_number,
            net_amount: amount("net_amount", row.net_amount)?,
            tax_amount: amount("tax_amount", row.tax_amount)?,
            gross_amount: amount("gross_amount", row.gross_amount)?,
            status: parse_enum("status", row.status)?,
            submitted_by: actor(row.submitted_by),
            submitted_at: row.submitted_at,
            approved_by: actor(row.approved_by),
            approved_at: row.approved_at,
            rejection_reason: row.rejection_reason,
            paid_by: actor(row.paid_by),
            paid_at: row.paid_at,
            payment_account_id: row.payment_account_id.map(AccountId::from_uuid),
            journal_entry_id: row.journal_entry_id.map(JournalEntryId::from_uuid),
            created_by: Actor::new(row.created_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PayableRow {
    pub id: Uuid,
    pub vendor: String,
    pub vendor_invoice_number: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub payment_terms: String,
    pub description: Option<String>,
    pub lines: Json<Vec<PayableLine>>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub status: String,
    pub payments: Json<Vec<PayablePayment>>,
    pub approval_entry_id: Option<Uuid>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PayableRow> for AccountsPayable {
    type Error = PortError;

    fn try_from(row: PayableRow) -> Result<Self, Self::Error> {
        Ok(AccountsPayable {
            id: PayableId::from_uuid(row.id),
            vendor: row.vendor,
            vendor_invoice_number: row.vendor_invoice_number,
            invoice_date: row.invoice_date,
            due_date: row.due_date,
            payment_terms: parse_enum("payment_terms", row.payment_terms)?,
            description: row.description,
            lines: row.lines.0,
            subtotal: amount("subtotal", row.subtotal)?,
            tax_amount: amount("tax_amount", row.tax_amount)?,
            total_amount: amount("total_amount", row.total_amount)?,
            amount_paid: amount("amount_paid", row.amount_paid)?,
            status: parse_enum("status", row.status)?,
            payments: row.payments.0,
            approval_entry_id: row.approval_entry_id.map(JournalEntryId::from_uuid),
            approved_by: actor(row.approved_by),
            approved_at: row.approved_at,
            cancellation_reason: row.cancellation_reason,
            created_by: Actor::new(row.created_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Converts every row, failing on the first that does not map
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, PortError>
where
    T: TryFrom<R, Error = PortError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_ledger::{AccountType, EntryStatus, PayableStatus, PaymentTerms};

    #[test]
    fn test_enum_text_uses_serde_names() {
        assert_eq!(enum_text(&PayableStatus::PendingApproval).unwrap(), "pending_approval");
        assert_eq!(enum_text(&PaymentTerms::Net30).unwrap(), "net30");
        assert_eq!(enum_text(&EntryStatus::Reversed).unwrap(), "reversed");
    }

    #[test]
    fn test_parse_enum_rejects_unknown_text() {
        let parsed: Result<AccountType, _> = parse_enum("account_type", "asset".to_string());
        assert_eq!(parsed.unwrap(), AccountType::Asset);
        assert!(parse_enum::<AccountType>("account_type", "capital".to_string()).is_err());
    }

    #[test]
    fn test_amount_columns_keep_two_places() {
        let value = amount("debit", Decimal::new(50000, 2)).unwrap();
        assert_eq!(value.to_string(), "500.00");
    }
}
