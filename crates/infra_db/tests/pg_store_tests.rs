//! PostgreSQL store tests
//!
//! These start a PostgreSQL container and are ignored by default.
//! Run with: cargo test -p infra_db -- --ignored

use rust_decimal_macros::dec;

use core_kernel::{Amount, PortError};
use domain_ledger::{
    EntryStatus, ErrorKind, LawFirmChartOfAccounts, Ledger, LedgerConfig, LedgerStore, LedgerTx, NewLine,
    PayableStatus, PaymentRequest, PeriodFrequency, RowLock,
};
use infra_db::PgLedgerStore;
use test_utils::{assert_amount_eq, assert_error_kind, ActorFixtures, DateFixtures, TestDatabase, TestPayableBuilder};

async fn bootstrapped(db: &TestDatabase) -> Ledger<PgLedgerStore> {
    let ledger = db.ledger(LedgerConfig::default());
    let actor = ActorFixtures::bookkeeper();
    ledger.bootstrap_journals(&actor).await.unwrap();
    ledger
        .create_accounts(LawFirmChartOfAccounts::standard(), &actor)
        .await
        .unwrap();
    ledger
        .generate_fiscal_year(2024, PeriodFrequency::Monthly, true, false, &actor)
        .await
        .unwrap();
    ledger
}

fn amount(value: &str) -> Amount {
    value.parse().unwrap()
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_post_reverse_and_read_back() {
    let db = TestDatabase::new().await.unwrap();
    let ledger = bootstrapped(&db).await;
    let actor = ActorFixtures::bookkeeper();

    let entry = ledger
        .record_entry(
            domain_ledger::DraftEntry::new("GJ", DateFixtures::jan_15(), "Retainer received"),
            vec![NewLine::debit("1000", amount("500.00")), NewLine::credit("4000", amount("500.00"))],
            &actor,
        )
        .await
        .unwrap();
    assert_eq!(entry.number, "GJ-000001");
    assert_amount_eq(ledger.balance_as_of("1000", DateFixtures::jan_31()).await.unwrap(), "500.00");

    let reversal = ledger
        .reverse(entry.id, &actor, "Refunded", DateFixtures::feb_10())
        .await
        .unwrap();
    let original = ledger.entry(entry.id).await.unwrap();
    assert_eq!(original.entry.status, EntryStatus::Reversed);
    assert_eq!(original.entry.reversed_by_entry, Some(reversal.id));
    assert_eq!(original.lines.len(), 2);
    assert_eq!(ledger.balance_as_of("1000", DateFixtures::feb_10()).await.unwrap(), Amount::ZERO);

    let trial_balance = ledger.trial_balance(DateFixtures::mar_31(), None).await.unwrap();
    assert!(trial_balance.is_balanced);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_unbalanced_entry_rolls_back() {
    let db = TestDatabase::new().await.unwrap();
    let ledger = bootstrapped(&db).await;
    let actor = ActorFixtures::bookkeeper();

    let result = ledger
        .record_entry(
            domain_ledger::DraftEntry::new("GJ", DateFixtures::jan_15(), "Off by a cent"),
            vec![NewLine::debit("1000", amount("100.00")), NewLine::credit("4000", amount("99.99"))],
            &actor,
        )
        .await;
    assert_error_kind(&result, ErrorKind::UnbalancedEntry);

    let (entries,): (i64,) = sqlx::query_as("SELECT count(*) FROM journal_entries")
        .fetch_one(db.pool())
        .await
        .unwrap();
    let (lines,): (i64,) = sqlx::query_as("SELECT count(*) FROM journal_entry_lines")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(entries, 0);
    assert_eq!(lines, 0);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_close_and_payable_flow_round_trip_through_tables() {
    let db = TestDatabase::new().await.unwrap();
    let ledger = bootstrapped(&db).await;
    let actor = ActorFixtures::bookkeeper();
    let january = ledger.period_for_date(DateFixtures::jan_15()).await.unwrap().unwrap();

    let bill = ledger
        .create_payable(
            TestPayableBuilder::new()
                .with_tax("15.00")
                .line("Archive boxes", "5300", dec!(2), "50.00")
                .build(),
            &actor,
        )
        .await
        .unwrap();
    ledger.submit_payable(bill.id).await.unwrap();
    ledger
        .approve_payable(bill.id, DateFixtures::jan_15(), &actor)
        .await
        .unwrap();
    let (paid, _) = ledger
        .record_payment(
            bill.id,
            PaymentRequest {
                amount: amount("115.00"),
                payment_date: DateFixtures::jan_31(),
                payment_account_code: "1000".to_string(),
                method: "cheque".to_string(),
                reference: Some("CHQ-100".to_string()),
            },
            &actor,
        )
        .await
        .unwrap();
    assert_eq!(paid.status, PayableStatus::Paid);

    let stored = ledger.payable(bill.id).await.unwrap();
    assert_eq!(stored.lines, paid.lines);
    assert_eq!(stored.payments.len(), 1);
    assert_eq!(stored.payments[0].reference.as_deref(), Some("CHQ-100"));

    let outcome = ledger.close_period(january.id, &actor, None).await.unwrap();
    assert_amount_eq(outcome.net_income, "-100.00");
    assert!(outcome.closing_entry.is_some());

    let closed = ledger.period(january.id).await.unwrap();
    assert_eq!(closed.closing_entry_id, outcome.closing_entry.map(|e| e.id));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_exclusive_lock_times_out_as_contention() {
    let db = TestDatabase::new().await.unwrap();
    let ledger = bootstrapped(&db).await;
    let store = PgLedgerStore::new(db.pool().clone(), std::time::Duration::from_millis(200));
    let journal = ledger
        .journals()
        .await
        .unwrap()
        .into_iter()
        .find(|j| j.code == "GJ")
        .unwrap();

    let mut holder = store.begin().await.unwrap();
    holder.find_journal(journal.id, RowLock::Exclusive).await.unwrap();

    let mut waiter = store.begin().await.unwrap();
    let blocked = waiter.find_journal(journal.id, RowLock::Exclusive).await;
    assert!(matches!(blocked, Err(PortError::Contention { waited_ms: 200, .. })));

    holder.commit().await.unwrap();
}
