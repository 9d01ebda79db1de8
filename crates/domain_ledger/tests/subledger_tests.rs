//! Expense and accounts-payable flows posting through the ledger

use rust_decimal_macros::dec;

use core_kernel::Amount;
use domain_ledger::{ErrorKind, ExpenseStatus, NewExpense, PayableStatus, PaymentRequest, PaymentTerms};
use test_utils::{
    assert_amount_eq, assert_entry_balanced, assert_error_kind, AmountFixtures, DateFixtures, LedgerFixture,
    TestPayableBuilder,
};

fn amount(value: &str) -> Amount {
    AmountFixtures::amount(value)
}

fn payment(value: &str, date: chrono::NaiveDate) -> PaymentRequest {
    PaymentRequest {
        amount: amount(value),
        payment_date: date,
        payment_account_code: "1010".to_string(),
        method: "bank_transfer".to_string(),
        reference: None,
    }
}

/// Funds the operating bank account so payments leave positive balances
async fn funded_fixture() -> LedgerFixture {
    let fx = LedgerFixture::standard().await;
    fx.post_simple(DateFixtures::date(2024, 1, 2), "1010", "3010", "10000.00").await;
    fx
}

mod expenses {
    use super::*;

    #[tokio::test]
    async fn test_expense_paid_posts_net_tax_and_gross() {
        let fx = funded_fixture().await;
        let category = fx
            .ledger
            .create_expense_category("Subscriptions", "5300", None)
            .await
            .unwrap();

        let expense = fx
            .ledger
            .record_expense(
                NewExpense::new("Case law database", category.id, DateFixtures::feb_10(), amount("100.00"))
                    .with_tax(amount("15.00"))
                    .with_vendor("LexData", Some("LD-2024-02".to_string())),
                &fx.actor,
            )
            .await
            .unwrap();
        assert_eq!(expense.status, ExpenseStatus::Draft);
        assert_amount_eq(expense.gross_amount, "115.00");

        fx.ledger.submit_expense(expense.id, &fx.actor).await.unwrap();
        fx.ledger.approve_expense(expense.id, &fx.actor).await.unwrap();
        let (paid, entry) = fx
            .ledger
            .pay_expense(expense.id, "1010", DateFixtures::feb_10(), &fx.actor)
            .await
            .unwrap();

        assert_eq!(paid.status, ExpenseStatus::Paid);
        assert_eq!(paid.journal_entry_id, Some(entry.id));
        assert_amount_eq(entry.total_debit, "115.00");
        assert_entry_balanced(&fx.ledger.entry(entry.id).await.unwrap());

        assert_amount_eq(fx.balance("5300", DateFixtures::feb_10()).await, "100.00");
        assert_amount_eq(fx.balance("1010", DateFixtures::feb_10()).await, "9885.00");
        let (tax_debits, tax_credits) = fx.ledger.period_movement("2060", fx.period(2).id).await.unwrap();
        assert_amount_eq(tax_debits, "15.00");
        assert_eq!(tax_credits, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_unapproved_expense_cannot_be_paid() {
        let fx = funded_fixture().await;
        let category = fx
            .ledger
            .create_expense_category("Subscriptions", "5300", None)
            .await
            .unwrap();
        let expense = fx
            .ledger
            .record_expense(
                NewExpense::new("Journal renewal", category.id, DateFixtures::feb_10(), amount("80.00")),
                &fx.actor,
            )
            .await
            .unwrap();
        fx.ledger.submit_expense(expense.id, &fx.actor).await.unwrap();

        let result = fx
            .ledger
            .pay_expense(expense.id, "1010", DateFixtures::feb_10(), &fx.actor)
            .await;
        assert_error_kind(&result, ErrorKind::InvalidStateTransition);
        assert_eq!(fx.balance("5300", DateFixtures::feb_10()).await, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_rejection_needs_submission_and_reason() {
        let fx = funded_fixture().await;
        let category = fx
            .ledger
            .create_expense_category("Subscriptions", "5300", None)
            .await
            .unwrap();
        let expense = fx
            .ledger
            .record_expense(
                NewExpense::new("Conference", category.id, DateFixtures::feb_10(), amount("450.00")),
                &fx.actor,
            )
            .await
            .unwrap();

        let early = fx.ledger.reject_expense(expense.id, &fx.actor, "Not budgeted").await;
        assert_error_kind(&early, ErrorKind::InvalidStateTransition);

        fx.ledger.submit_expense(expense.id, &fx.actor).await.unwrap();
        let blank = fx.ledger.reject_expense(expense.id, &fx.actor, "").await;
        assert_error_kind(&blank, ErrorKind::ValidationFailure);

        let rejected = fx
            .ledger
            .reject_expense(expense.id, &fx.actor, "Not budgeted")
            .await
            .unwrap();
        assert_eq!(rejected.status, ExpenseStatus::Rejected);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("Rejected by bookkeeper@firm.test: Not budgeted")
        );
    }

    #[tokio::test]
    async fn test_category_must_map_to_expense_account() {
        let fx = LedgerFixture::standard().await;

        let result = fx.ledger.create_expense_category("Cash", "1000", None).await;
        assert_error_kind(&result, ErrorKind::ValidationFailure);
    }

    #[tokio::test]
    async fn test_cancelled_expense_posts_nothing() {
        let fx = funded_fixture().await;
        let category = fx
            .ledger
            .create_expense_category("Subscriptions", "5300", None)
            .await
            .unwrap();
        let expense = fx
            .ledger
            .record_expense(
                NewExpense::new("Duplicate claim", category.id, DateFixtures::feb_10(), amount("60.00")),
                &fx.actor,
            )
            .await
            .unwrap();

        let cancelled = fx.ledger.cancel_expense(expense.id).await.unwrap();
        assert_eq!(cancelled.status, ExpenseStatus::Cancelled);
        assert!(cancelled.journal_entry_id.is_none());
    }
}

mod payables {
    use super::*;

    fn stationery_bill() -> TestPayableBuilder {
        TestPayableBuilder::new()
            .with_terms(PaymentTerms::Net30)
            .with_tax("15.00")
            .line("Archive boxes", "5300", dec!(2), "50.00")
    }

    #[tokio::test]
    async fn test_bill_lifecycle_through_partial_and_final_payment() {
        let fx = funded_fixture().await;

        let bill = fx.ledger.create_payable(stationery_bill().build(), &fx.actor).await.unwrap();
        assert_eq!(bill.status, PayableStatus::Draft);
        assert_amount_eq(bill.subtotal, "100.00");
        assert_amount_eq(bill.total_amount, "115.00");
        assert_eq!(bill.due_date, DateFixtures::date(2024, 2, 14));

        fx.ledger.submit_payable(bill.id).await.unwrap();
        let (approved, accrual) = fx
            .ledger
            .approve_payable(bill.id, DateFixtures::jan_15(), &fx.actor)
            .await
            .unwrap();
        assert_eq!(approved.status, PayableStatus::Approved);
        assert_eq!(approved.approval_entry_id, Some(accrual.id));
        assert_entry_balanced(&fx.ledger.entry(accrual.id).await.unwrap());
        assert_amount_eq(fx.balance("2000", DateFixtures::jan_31()).await, "115.00");
        assert_amount_eq(fx.balance("5300", DateFixtures::jan_31()).await, "100.00");

        let (partial, _) = fx
            .ledger
            .record_payment(bill.id, payment("50.00", DateFixtures::feb_10()), &fx.actor)
            .await
            .unwrap();
        assert_eq!(partial.status, PayableStatus::PartiallyPaid);
        assert_amount_eq(partial.balance_due(), "65.00");
        assert_eq!(partial.payments.len(), 1);

        let today = DateFixtures::date(2024, 2, 20);
        let overdue = fx.ledger.overdue_payables(today).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].display_status(today), "overdue");

        let (paid, _) = fx
            .ledger
            .record_payment(bill.id, payment("65.00", today), &fx.actor)
            .await
            .unwrap();
        assert_eq!(paid.status, PayableStatus::Paid);
        assert_eq!(paid.balance_due(), Amount::ZERO);
        assert_eq!(fx.balance("2000", today).await, Amount::ZERO);
        assert_amount_eq(fx.balance("1010", today).await, "9885.00");
        assert!(fx.ledger.overdue_payables(today).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overpayment_is_rejected() {
        let fx = funded_fixture().await;
        let bill = fx.ledger.create_payable(stationery_bill().build(), &fx.actor).await.unwrap();
        fx.ledger.submit_payable(bill.id).await.unwrap();
        fx.ledger
            .approve_payable(bill.id, DateFixtures::jan_15(), &fx.actor)
            .await
            .unwrap();

        let result = fx
            .ledger
            .record_payment(bill.id, payment("115.01", DateFixtures::feb_10()), &fx.actor)
            .await;
        assert_error_kind(&result, ErrorKind::ValidationFailure);
        assert_amount_eq(fx.ledger.payable(bill.id).await.unwrap().amount_paid, "0.00");
    }

    #[tokio::test]
    async fn test_payment_requires_approval() {
        let fx = funded_fixture().await;
        let bill = fx.ledger.create_payable(stationery_bill().build(), &fx.actor).await.unwrap();

        let result = fx
            .ledger
            .record_payment(bill.id, payment("10.00", DateFixtures::feb_10()), &fx.actor)
            .await;
        assert_error_kind(&result, ErrorKind::InvalidStateTransition);
    }

    #[tokio::test]
    async fn test_cancelling_approved_bill_reverses_accrual() {
        let fx = funded_fixture().await;
        let bill = fx.ledger.create_payable(stationery_bill().build(), &fx.actor).await.unwrap();
        fx.ledger.submit_payable(bill.id).await.unwrap();
        fx.ledger
            .approve_payable(bill.id, DateFixtures::jan_15(), &fx.actor)
            .await
            .unwrap();

        let cancelled = fx
            .ledger
            .cancel_payable(bill.id, "Goods returned", DateFixtures::feb_10(), &fx.actor)
            .await
            .unwrap();
        assert_eq!(cancelled.status, PayableStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Goods returned"));
        assert_eq!(fx.balance("2000", DateFixtures::feb_10()).await, Amount::ZERO);
        assert_eq!(fx.balance("5300", DateFixtures::feb_10()).await, Amount::ZERO);
        // The accrual stays in January
        assert_amount_eq(fx.balance("2000", DateFixtures::jan_31()).await, "115.00");
    }

    #[tokio::test]
    async fn test_paid_bill_cannot_be_cancelled() {
        let fx = funded_fixture().await;
        let bill = fx.ledger.create_payable(stationery_bill().build(), &fx.actor).await.unwrap();
        fx.ledger.submit_payable(bill.id).await.unwrap();
        fx.ledger
            .approve_payable(bill.id, DateFixtures::jan_15(), &fx.actor)
            .await
            .unwrap();
        fx.ledger
            .record_payment(bill.id, payment("115.00", DateFixtures::feb_10()), &fx.actor)
            .await
            .unwrap();

        let result = fx
            .ledger
            .cancel_payable(bill.id, "Too late", DateFixtures::feb_10(), &fx.actor)
            .await;
        assert_error_kind(&result, ErrorKind::InvalidStateTransition);
    }

    #[tokio::test]
    async fn test_custom_terms_need_due_date() {
        let fx = LedgerFixture::standard().await;

        let missing = fx
            .ledger
            .create_payable(stationery_bill().with_terms(PaymentTerms::Custom).build(), &fx.actor)
            .await;
        assert_error_kind(&missing, ErrorKind::ValidationFailure);

        let bill = fx
            .ledger
            .create_payable(
                stationery_bill()
                    .with_terms(PaymentTerms::Custom)
                    .due_on(DateFixtures::mar_31())
                    .build(),
                &fx.actor,
            )
            .await
            .unwrap();
        assert_eq!(bill.due_date, DateFixtures::mar_31());
    }

    #[tokio::test]
    async fn test_bill_without_lines_is_rejected() {
        let fx = LedgerFixture::standard().await;

        let result = fx
            .ledger
            .create_payable(TestPayableBuilder::new().build(), &fx.actor)
            .await;
        assert_error_kind(&result, ErrorKind::ValidationFailure);
    }
}
