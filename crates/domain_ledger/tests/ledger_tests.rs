//! End-to-end tests for the ledger over the in-memory store

use std::sync::Arc;

use proptest::prelude::*;

use core_kernel::Amount;
use domain_ledger::{DraftEntry, EntryQuery, EntryStatus, ErrorKind, NewLine, PeriodStatus};
use test_utils::{
    assert_amount_eq, assert_balance_sheet_balances, assert_entry_balanced, assert_error_kind,
    assert_lines_single_sided, assert_trial_balance_balanced, balanced_lines_strategy, unbalanced_lines_strategy,
    AmountFixtures, DateFixtures, LedgerFixture, TestEntryBuilder,
};

fn amount(value: &str) -> Amount {
    AmountFixtures::amount(value)
}

// ============================================================================
// Scenarios
// ============================================================================

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_simple_sale() {
        let fx = LedgerFixture::standard().await;

        fx.post_simple(DateFixtures::jan_15(), "1000", "4000", "500.00").await;

        let cash = fx.ledger.account("1000").await.unwrap();
        assert_amount_eq(cash.current_balance, "500.00");
        assert_amount_eq(fx.balance("4000", DateFixtures::jan_31()).await, "500.00");

        let statement = fx.ledger.income_statement(fx.period(1).id, None).await.unwrap();
        assert_amount_eq(statement.revenue.total, "500.00");
        assert_amount_eq(statement.expenses.total, "0.00");
        assert_amount_eq(statement.net_income, "500.00");
    }

    #[tokio::test]
    async fn test_unbalanced_entry_is_rejected_without_side_effects() {
        let fx = LedgerFixture::standard().await;

        let result = fx
            .try_post(
                "GJ",
                DateFixtures::jan_15(),
                "Off by a cent",
                vec![NewLine::debit("1000", amount("100.00")), NewLine::credit("4000", amount("99.99"))],
            )
            .await;

        assert_error_kind(&result, ErrorKind::UnbalancedEntry);
        assert!(fx.ledger.entries(&EntryQuery::default()).await.unwrap().is_empty());
        assert_eq!(fx.balance("1000", DateFixtures::jan_31()).await, Amount::ZERO);
        assert_eq!(fx.ledger.account("4000").await.unwrap().current_balance, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_posting_into_closed_period_is_rejected() {
        let fx = LedgerFixture::standard().await;
        fx.ledger
            .close_period(fx.period(1).id, &fx.actor, None)
            .await
            .unwrap();

        let result = fx
            .try_post(
                "GJ",
                DateFixtures::date(2024, 1, 20),
                "Late invoice",
                vec![NewLine::debit("1000", amount("50.00")), NewLine::credit("4000", amount("50.00"))],
            )
            .await;

        assert_error_kind(&result, ErrorKind::PeriodClosed);
    }

    #[tokio::test]
    async fn test_reversal_restores_prior_state() {
        let fx = LedgerFixture::standard().await;
        let before = fx.ledger.trial_balance(DateFixtures::feb_10(), None).await.unwrap();

        let original = fx.post_simple(DateFixtures::date(2024, 2, 5), "5000", "2000", "200.00").await;
        let reversal = fx
            .ledger
            .reverse(original.id, &fx.actor, "Posted to the wrong vendor", DateFixtures::feb_10())
            .await
            .unwrap();

        assert_eq!(reversal.journal_id, original.journal_id);
        assert_eq!(reversal.reverses, Some(original.id));
        assert_eq!(reversal.status, EntryStatus::Posted);
        assert_eq!(reversal.date, DateFixtures::feb_10());

        let original = fx.ledger.entry(original.id).await.unwrap().entry;
        assert_eq!(original.status, EntryStatus::Reversed);
        assert_eq!(original.reversed_by_entry, Some(reversal.id));

        assert_eq!(fx.balance("5000", DateFixtures::feb_10()).await, Amount::ZERO);
        assert_eq!(fx.balance("2000", DateFixtures::feb_10()).await, Amount::ZERO);

        let after = fx.ledger.trial_balance(DateFixtures::feb_10(), None).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_period_close_moves_net_income_to_retained_earnings() {
        let fx = LedgerFixture::standard().await;
        let march = fx.period(3).clone();
        fx.post_simple(DateFixtures::date(2024, 3, 10), "1000", "4000", "10000.00").await;
        fx.post_simple(DateFixtures::date(2024, 3, 20), "5000", "1000", "7000.00").await;

        let income_before = fx.ledger.income_statement(march.id, None).await.unwrap();
        let sheet_before = fx.ledger.balance_sheet(DateFixtures::mar_31(), None).await.unwrap();
        let retained_before = sheet_before.equity.amount_for("3000").unwrap_or(Amount::ZERO);

        for month in 1..=2 {
            fx.ledger
                .close_period(fx.period(month).id, &fx.actor, None)
                .await
                .unwrap();
        }
        let outcome = fx.ledger.close_period(march.id, &fx.actor, None).await.unwrap();
        assert_amount_eq(outcome.net_income, "3000.00");
        assert_eq!(outcome.period.status, PeriodStatus::Closed);

        let closing = outcome.closing_entry.expect("closing entry");
        let detail = fx.ledger.entry(closing.id).await.unwrap();
        assert_entry_balanced(&detail);
        let revenue = fx.ledger.account("4000").await.unwrap();
        let expense = fx.ledger.account("5000").await.unwrap();
        let retained = fx.ledger.account("3000").await.unwrap();
        let line_for = |account_id| {
            detail
                .lines
                .iter()
                .find(|l| l.account_id == account_id)
                .expect("closing line")
        };
        assert_amount_eq(line_for(revenue.id).debit, "10000.00");
        assert_amount_eq(line_for(expense.id).credit, "7000.00");
        assert_amount_eq(line_for(retained.id).credit, "3000.00");
        assert!(detail.lines.iter().all(|l| l.is_closing));

        let sheet = fx.ledger.balance_sheet(DateFixtures::mar_31(), None).await.unwrap();
        assert_balance_sheet_balances(&sheet);
        let retained_after = sheet.equity.amount_for("3000").unwrap_or(Amount::ZERO);
        assert_eq!(retained_after - retained_before, amount("3000.00"));

        let income_after = fx.ledger.income_statement(march.id, None).await.unwrap();
        assert_eq!(income_after.revenue.total, income_before.revenue.total);
        assert_eq!(income_after.expenses.total, income_before.expenses.total);
        assert_eq!(income_after.net_income, income_before.net_income);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_posts_receive_consecutive_numbers() {
        let fx = LedgerFixture::standard().await;
        let ledger = Arc::new(fx.ledger.clone());

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                let actor = fx.actor.clone();
                tokio::spawn(async move {
                    let draft = DraftEntry::new("GJ", DateFixtures::jan_15(), format!("Concurrent fee {}", i));
                    let lines = vec![
                        NewLine::debit("1000", AmountFixtures::hundred()),
                        NewLine::credit("4000", AmountFixtures::hundred()),
                    ];
                    ledger.record_entry(draft, lines, &actor).await
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            let entry = handle.await.unwrap().unwrap();
            assert_eq!(entry.status, EntryStatus::Posted);
            numbers.push(entry.number);
        }
        numbers.sort();
        assert_eq!(numbers, vec!["GJ-000001".to_string(), "GJ-000002".to_string()]);

        let general = fx
            .ledger
            .journals()
            .await
            .unwrap()
            .into_iter()
            .find(|j| j.code == "GJ")
            .unwrap();
        assert_eq!(general.next_number, 3);
        assert_amount_eq(fx.balance("1000", DateFixtures::jan_31()).await, "200.00");
    }
}

// ============================================================================
// Ledger invariants
// ============================================================================

mod invariants {
    use super::*;

    async fn post_mixed_activity(fx: &LedgerFixture) {
        fx.post_simple(DateFixtures::date(2024, 1, 2), "1010", "3010", "25000.00").await;
        fx.post_simple(DateFixtures::jan_15(), "1010", "4000", "4200.00").await;
        fx.post_simple(DateFixtures::jan_31(), "5000", "1010", "1800.00").await;
        fx.post_simple(DateFixtures::feb_10(), "5300", "2000", "240.00").await;
        fx.post_simple(DateFixtures::date(2024, 2, 20), "2000", "1010", "240.00").await;
    }

    #[tokio::test]
    async fn test_every_posted_entry_balances() {
        let fx = LedgerFixture::standard().await;
        post_mixed_activity(&fx).await;

        let entries = fx.ledger.entries(&EntryQuery::default()).await.unwrap();
        assert_eq!(entries.len(), 5);
        for entry in entries {
            let detail = fx.ledger.entry(entry.id).await.unwrap();
            assert_entry_balanced(&detail);
            assert_lines_single_sided(&detail);
        }
    }

    #[tokio::test]
    async fn test_trial_balance_balances() {
        let fx = LedgerFixture::standard().await;
        post_mixed_activity(&fx).await;

        let trial_balance = fx.ledger.trial_balance(DateFixtures::mar_31(), None).await.unwrap();
        assert_trial_balance_balanced(&trial_balance);
        let bank = trial_balance.line("1010").unwrap();
        assert_amount_eq(bank.debit_balance, "27160.00");
        assert_eq!(bank.credit_balance, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_trial_balance_comparative_uses_period_end() {
        let fx = LedgerFixture::standard().await;
        post_mixed_activity(&fx).await;

        let trial_balance = fx
            .ledger
            .trial_balance(DateFixtures::mar_31(), Some(fx.period(1).id))
            .await
            .unwrap();
        let january = trial_balance.comparative.as_ref().unwrap();
        assert_eq!(january.as_of, DateFixtures::jan_31());
        assert_amount_eq(january.line("1010").unwrap().debit_balance, "27400.00");
    }

    #[tokio::test]
    async fn test_roll_ups_match_lines() {
        let fx = LedgerFixture::standard().await;
        post_mixed_activity(&fx).await;

        for code in ["1010", "2000", "3010", "4000", "5000", "5300"] {
            let account = fx.ledger.account(code).await.unwrap();
            for period in &fx.periods[..3] {
                fx.ledger.verify(account.id, period.id).await.unwrap();
            }
        }

        let (debits, credits) = fx.ledger.period_movement("1010", fx.period(1).id).await.unwrap();
        assert_amount_eq(debits, "29200.00");
        assert_amount_eq(credits, "1800.00");
    }

    #[tokio::test]
    async fn test_recompute_reports_no_drift_for_consistent_ledger() {
        let fx = LedgerFixture::standard().await;
        post_mixed_activity(&fx).await;

        let bank = fx.ledger.account("1010").await.unwrap();
        let outcomes = fx.ledger.recompute_account(bank.id).await.unwrap();
        assert!(!outcomes.is_empty());
        assert!(outcomes.iter().all(|o| !o.drifted));
    }

    #[tokio::test]
    async fn test_balance_as_of_follows_entry_dates() {
        let fx = LedgerFixture::standard().await;
        post_mixed_activity(&fx).await;

        assert_amount_eq(fx.balance("1010", DateFixtures::date(2024, 1, 1)).await, "0.00");
        assert_amount_eq(fx.balance("1010", DateFixtures::jan_15()).await, "29200.00");
        assert_amount_eq(fx.balance("1010", DateFixtures::jan_31()).await, "27400.00");
        assert_amount_eq(fx.balance("1010", DateFixtures::mar_31()).await, "27160.00");
    }

    #[tokio::test]
    async fn test_reversing_twice_is_rejected() {
        let fx = LedgerFixture::standard().await;
        let entry = fx.post_simple(DateFixtures::jan_15(), "1000", "4000", "75.00").await;
        fx.ledger
            .reverse(entry.id, &fx.actor, "Duplicate", DateFixtures::jan_31())
            .await
            .unwrap();

        let again = fx
            .ledger
            .reverse(entry.id, &fx.actor, "Duplicate", DateFixtures::jan_31())
            .await;
        assert_error_kind(&again, ErrorKind::InvalidStateTransition);
    }

    #[tokio::test]
    async fn test_reversal_requires_reason() {
        let fx = LedgerFixture::standard().await;
        let entry = fx.post_simple(DateFixtures::jan_15(), "1000", "4000", "75.00").await;

        let result = fx.ledger.reverse(entry.id, &fx.actor, "  ", DateFixtures::jan_31()).await;
        assert_error_kind(&result, ErrorKind::ValidationFailure);
    }

    #[tokio::test]
    async fn test_voided_draft_keeps_its_number() {
        let fx = LedgerFixture::standard().await;
        let draft = fx
            .ledger
            .open_draft(DraftEntry::new("GJ", DateFixtures::jan_15(), "Abandoned"), &fx.actor)
            .await
            .unwrap();
        let voided = fx.ledger.void(draft.id, &fx.actor).await.unwrap();
        assert_eq!(voided.status, EntryStatus::Void);

        let next = fx.post_simple(DateFixtures::jan_15(), "1000", "4000", "10.00").await;
        assert_eq!(draft.number, "GJ-000001");
        assert_eq!(next.number, "GJ-000002");

        let post_voided = fx.ledger.post(draft.id, &fx.actor).await;
        assert_error_kind(&post_voided, ErrorKind::InvalidStateTransition);
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let fx = LedgerFixture::standard().await;
        let (draft, lines) = TestEntryBuilder::new()
            .debit("9999", "10.00")
            .credit("4000", "10.00")
            .build();

        let result = fx.ledger.record_entry(draft, lines, &fx.actor).await;
        assert_error_kind(&result, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_draft_lines_can_be_edited_before_posting() {
        let fx = LedgerFixture::standard().await;
        let draft = fx
            .ledger
            .open_draft(DraftEntry::new("GJ", DateFixtures::jan_15(), "Retainer"), &fx.actor)
            .await
            .unwrap();
        fx.ledger
            .add_line(draft.id, NewLine::debit("1000", amount("300.00")))
            .await
            .unwrap();
        let wrong = fx
            .ledger
            .add_line(draft.id, NewLine::credit("4000", amount("250.00")))
            .await
            .unwrap();
        fx.ledger.remove_line(draft.id, wrong.id).await.unwrap();
        fx.ledger
            .add_line(draft.id, NewLine::credit("4000", amount("300.00")))
            .await
            .unwrap();

        let posted = fx.ledger.post(draft.id, &fx.actor).await.unwrap();
        assert_amount_eq(posted.total_debit, "300.00");
        assert_amount_eq(posted.total_credit, "300.00");

        let late_edit = fx
            .ledger
            .add_line(draft.id, NewLine::debit("1000", amount("1.00")))
            .await;
        assert_error_kind(&late_edit, ErrorKind::InvalidStateTransition);
    }
}

// ============================================================================
// Period close
// ============================================================================

mod period_close {
    use super::*;

    #[tokio::test]
    async fn test_close_reopen_close_reproduces_closing_entry() {
        let fx = LedgerFixture::standard().await;
        let january = fx.period(1).clone();
        fx.post_simple(DateFixtures::jan_15(), "1000", "4000", "1500.00").await;
        fx.post_simple(DateFixtures::jan_31(), "5000", "1000", "400.00").await;

        let first = fx.ledger.close_period(january.id, &fx.actor, None).await.unwrap();
        let reopened = fx
            .ledger
            .reopen_period(january.id, &fx.actor, "Missed accrual")
            .await
            .unwrap();
        assert_eq!(reopened.status, PeriodStatus::Open);
        assert_eq!(reopened.closing_entry_id, None);
        assert_eq!(fx.ledger.account("4000").await.unwrap().current_balance, amount("1500.00"));

        let second = fx
            .ledger
            .close_period(january.id, &fx.actor, Some("Second close".to_string()))
            .await
            .unwrap();
        assert_eq!(first.net_income, second.net_income);
        assert_amount_eq(second.net_income, "1100.00");
        assert_eq!(second.period.closing_notes.as_deref(), Some("Second close"));

        let first_lines = fx.ledger.entry(first.closing_entry.unwrap().id).await.unwrap().lines;
        let second_lines = fx.ledger.entry(second.closing_entry.unwrap().id).await.unwrap().lines;
        let shape = |lines: &[domain_ledger::JournalEntryLine]| {
            lines
                .iter()
                .map(|l| (l.account_id, l.debit, l.credit))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&first_lines), shape(&second_lines));
        assert_amount_eq(fx.balance("3000", DateFixtures::jan_31()).await, "1100.00");
    }

    #[tokio::test]
    async fn test_closing_twice_is_rejected() {
        let fx = LedgerFixture::standard().await;
        fx.ledger.close_period(fx.period(1).id, &fx.actor, None).await.unwrap();

        let again = fx.ledger.close_period(fx.period(1).id, &fx.actor, None).await;
        assert_error_kind(&again, ErrorKind::InvalidStateTransition);
    }

    #[tokio::test]
    async fn test_close_without_activity_posts_no_entry() {
        let fx = LedgerFixture::standard().await;

        let outcome = fx.ledger.close_period(fx.period(1).id, &fx.actor, None).await.unwrap();
        assert!(outcome.closing_entry.is_none());
        assert_eq!(outcome.net_income, Amount::ZERO);
        assert_eq!(outcome.net_income.to_string(), "0.00");
        assert_eq!(
            outcome.period.closing_equity.map(|equity| equity.to_string()).as_deref(),
            Some("0.00")
        );
    }

    #[tokio::test]
    async fn test_close_waits_for_earlier_open_period() {
        let fx = LedgerFixture::standard().await;
        let (january, february, march) = (fx.period(1).id, fx.period(2).id, fx.period(3).id);

        let early = fx.ledger.close_period(february, &fx.actor, None).await;
        assert_error_kind(&early, ErrorKind::InvalidStateTransition);
        assert_eq!(fx.ledger.period(february).await.unwrap().status, PeriodStatus::Open);

        fx.post_simple(DateFixtures::jan_15(), "1000", "4000", "1000.00").await;
        let closed_january = fx.ledger.close_period(january, &fx.actor, None).await.unwrap();
        let closed_february = fx.ledger.close_period(february, &fx.actor, None).await.unwrap();

        assert_eq!(closed_january.period.closing_equity, Some(amount("1000.00")));
        assert_eq!(closed_february.period.opening_equity, amount("1000.00"));
        assert_eq!(closed_february.period.closing_equity, Some(amount("1000.00")));
        assert_amount_eq(fx.ledger.period(march).await.unwrap().opening_equity, "1000.00");
    }

    #[tokio::test]
    async fn test_current_period_cannot_close() {
        let fx = LedgerFixture::standard().await;
        fx.ledger.set_current_period(fx.period(1).id).await.unwrap();

        let result = fx.ledger.close_period(fx.period(1).id, &fx.actor, None).await;
        assert_error_kind(&result, ErrorKind::InvalidStateTransition);
    }

    #[tokio::test]
    async fn test_pending_drafts_block_close() {
        let fx = LedgerFixture::standard().await;
        fx.ledger
            .open_draft(DraftEntry::new("GJ", DateFixtures::jan_15(), "Unfinished"), &fx.actor)
            .await
            .unwrap();

        let result = fx.ledger.close_period(fx.period(1).id, &fx.actor, None).await;
        assert_error_kind(&result, ErrorKind::InvalidStateTransition);
    }

    #[tokio::test]
    async fn test_earlier_period_cannot_reopen_past_closed_successor() {
        let fx = LedgerFixture::standard().await;
        fx.ledger.close_period(fx.period(1).id, &fx.actor, None).await.unwrap();
        fx.ledger.close_period(fx.period(2).id, &fx.actor, None).await.unwrap();

        let result = fx.ledger.reopen_period(fx.period(1).id, &fx.actor, "Audit").await;
        assert_error_kind(&result, ErrorKind::InvalidStateTransition);
    }
}

// ============================================================================
// Chart of accounts
// ============================================================================

mod chart_rules {
    use super::*;
    use domain_ledger::{AccountType, AccountUpdate, NewAccount};

    #[tokio::test]
    async fn test_duplicate_code_conflicts_ignoring_case() {
        let fx = LedgerFixture::standard().await;
        fx.ledger
            .create_account(NewAccount::new("AR-CLIENT", "Client Receivables", AccountType::Asset), &fx.actor)
            .await
            .unwrap();

        let exact = fx
            .ledger
            .create_account(NewAccount::new("1000", "Petty Cash", AccountType::Asset), &fx.actor)
            .await;
        assert_error_kind(&exact, ErrorKind::Conflict);

        let other_case = fx
            .ledger
            .create_account(NewAccount::new("ar-client", "Receivables Again", AccountType::Asset), &fx.actor)
            .await;
        assert_error_kind(&other_case, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_parent_must_share_account_type() {
        let fx = LedgerFixture::standard().await;

        let result = fx
            .ledger
            .create_account(
                NewAccount::new("4030", "Mediation Fees", AccountType::Revenue).with_parent("5000"),
                &fx.actor,
            )
            .await;
        assert_error_kind(&result, ErrorKind::IncompatibleParentType);

        let child = fx
            .ledger
            .create_account(
                NewAccount::new("4030", "Mediation Fees", AccountType::Revenue).with_parent("4000"),
                &fx.actor,
            )
            .await
            .unwrap();
        let children = fx.ledger.child_accounts("4000").await.unwrap();
        assert!(children.iter().any(|a| a.id == child.id));
    }

    #[tokio::test]
    async fn test_account_cannot_move_under_its_descendant() {
        let fx = LedgerFixture::standard().await;

        let update = AccountUpdate {
            parent_code: Some(Some("4010".to_string())),
            ..AccountUpdate::default()
        };
        let result = fx.ledger.update_account("4000", update).await;
        assert_error_kind(&result, ErrorKind::ValidationFailure);

        let unchanged = fx.ledger.account("4000").await.unwrap();
        assert_eq!(unchanged.parent_id, None);
    }

    #[tokio::test]
    async fn test_account_with_balance_cannot_deactivate() {
        let fx = LedgerFixture::standard().await;
        fx.post_simple(DateFixtures::jan_15(), "1000", "4000", "120.00").await;

        let result = fx.ledger.deactivate_account("1000", &fx.actor).await;
        assert_error_kind(&result, ErrorKind::AccountInUse);
        assert!(fx.ledger.account("1000").await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_account_on_draft_cannot_deactivate() {
        let fx = LedgerFixture::standard().await;
        let draft = fx
            .ledger
            .open_draft(DraftEntry::new("GJ", DateFixtures::jan_15(), "Filing fee"), &fx.actor)
            .await
            .unwrap();
        fx.ledger
            .add_line(draft.id, NewLine::debit("5200", amount("35.00")))
            .await
            .unwrap();

        let result = fx.ledger.deactivate_account("5200", &fx.actor).await;
        assert_error_kind(&result, ErrorKind::AccountInUse);

        fx.ledger.void(draft.id, &fx.actor).await.unwrap();
        let inactive = fx.ledger.deactivate_account("5200", &fx.actor).await.unwrap();
        assert!(!inactive.is_active());
        let active = fx.ledger.reactivate_account("5200", &fx.actor).await.unwrap();
        assert!(active.is_active());
    }

    #[tokio::test]
    async fn test_opening_balance_is_fixed_once_posted() {
        let fx = LedgerFixture::standard().await;
        fx.post_simple(DateFixtures::jan_15(), "1010", "3010", "900.00").await;

        let update = AccountUpdate {
            opening_balance: Some(amount("50.00")),
            ..AccountUpdate::default()
        };
        let result = fx.ledger.update_account("1010", update).await;
        assert_error_kind(&result, ErrorKind::AccountInUse);
    }
}

// ============================================================================
// Period registry
// ============================================================================

mod period_registry {
    use super::*;
    use domain_ledger::NewPeriod;

    #[tokio::test]
    async fn test_overlapping_period_is_rejected() {
        let fx = LedgerFixture::standard().await;

        let result = fx
            .ledger
            .create_period(
                NewPeriod::new("Mid January", DateFixtures::jan_15(), DateFixtures::date(2024, 2, 14)),
                &fx.actor,
            )
            .await;
        assert_error_kind(&result, ErrorKind::OverlappingPeriod);
    }

    #[tokio::test]
    async fn test_gap_requires_explicit_allowance() {
        let fx = LedgerFixture::standard().await;
        let start = DateFixtures::date(2025, 2, 1);
        let end = DateFixtures::date(2025, 2, 28);

        let result = fx
            .ledger
            .create_period(NewPeriod::new("February 2025", start, end), &fx.actor)
            .await;
        assert_error_kind(&result, ErrorKind::GapNotAllowed);

        let period = fx
            .ledger
            .create_period(NewPeriod::new("February 2025", start, end).allow_gap(), &fx.actor)
            .await
            .unwrap();
        assert_eq!(period.start_date, start);
    }

    #[tokio::test]
    async fn test_adjustment_period_must_share_a_regular_closing_date() {
        let fx = LedgerFixture::standard().await;

        let spanning = fx
            .ledger
            .create_period(
                NewPeriod::new("ADJ-Q1", DateFixtures::date(2024, 1, 1), DateFixtures::mar_31()).adjustment(),
                &fx.actor,
            )
            .await;
        assert_error_kind(&spanning, ErrorKind::ValidationFailure);

        let mid_month = fx
            .ledger
            .create_period(
                NewPeriod::new("ADJ-June", DateFixtures::date(2024, 6, 15), DateFixtures::date(2024, 6, 20))
                    .adjustment(),
                &fx.actor,
            )
            .await;
        assert_error_kind(&mid_month, ErrorKind::ValidationFailure);

        let adjustment = fx
            .ledger
            .create_period(
                NewPeriod::new("ADJ-March", DateFixtures::mar_31(), DateFixtures::mar_31()).adjustment(),
                &fx.actor,
            )
            .await
            .unwrap();
        assert!(adjustment.is_adjustment);

        let found = fx.ledger.period_for_date(DateFixtures::mar_31()).await.unwrap().unwrap();
        assert_eq!(found.id, fx.period(3).id);
    }

    #[tokio::test]
    async fn test_posting_into_locked_period_reports_locked() {
        let fx = LedgerFixture::standard().await;
        let january = fx.period(1).id;
        fx.ledger.close_period(january, &fx.actor, None).await.unwrap();
        fx.ledger.lock_period(january, &fx.actor).await.unwrap();

        let result = fx
            .try_post(
                "GJ",
                DateFixtures::jan_15(),
                "Late adjustment",
                vec![NewLine::debit("1000", amount("20.00")), NewLine::credit("4000", amount("20.00"))],
            )
            .await;
        assert_error_kind(&result, ErrorKind::PeriodLocked);

        let reopen = fx.ledger.reopen_period(january, &fx.actor, "Audit").await;
        assert_error_kind(&reopen, ErrorKind::PeriodLocked);
    }
}

// ============================================================================
// Property tests
// ============================================================================

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_balanced_lines_always_post(lines in balanced_lines_strategy()) {
        let rt = runtime();
        rt.block_on(async {
            let fx = LedgerFixture::standard().await;
            let entry = fx.post("GJ", DateFixtures::jan_15(), "Generated", lines).await;
            assert_eq!(entry.total_debit, entry.total_credit);

            let trial_balance = fx.ledger.trial_balance(DateFixtures::jan_31(), None).await.unwrap();
            assert_trial_balance_balanced(&trial_balance);
        });
    }

    #[test]
    fn prop_unbalanced_lines_never_post(lines in unbalanced_lines_strategy()) {
        let rt = runtime();
        rt.block_on(async {
            let fx = LedgerFixture::standard().await;
            let result = fx.try_post("GJ", DateFixtures::jan_15(), "Generated", lines).await;
            assert_error_kind(&result, ErrorKind::UnbalancedEntry);
            assert!(fx.ledger.entries(&EntryQuery::default()).await.unwrap().is_empty());
        });
    }
}
