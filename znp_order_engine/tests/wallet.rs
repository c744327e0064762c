use chrono::{Duration, Utc};
use znp_common::Cents;
use znp_order_engine::{
    db_types::{NewBalanceTransaction, TransactionType},
    engine_api::order_objects::TransactionQuery,
    metrics::{OUTCOME_ERROR, OUTCOME_OK},
    traits::WalletManagement,
    ErrorKind,
};

mod support;

use support::Harness;

#[tokio::test]
async fn recharge_creates_wallet() {
    let h = Harness::new().await;
    let alice = h.user("alice@example.com").await;
    assert_eq!(h.balance(alice.user_id).await, 0);
    let receipt = h.recharge(alice.user_id, 5000).await;
    assert_eq!(receipt.balance.balance_cents, Cents::from(5000));
    assert_eq!(receipt.balance.currency, "CNY");
    assert_eq!(receipt.transaction.tx_type, TransactionType::Recharge);
    assert_eq!(receipt.transaction.balance_after_cents, Cents::from(5000));
    assert_eq!(receipt.balance.last_transaction_id, Some(receipt.transaction.id));
    h.assert_wallet_consistent(alice.user_id).await;
    assert_eq!(h.ctx.metrics().wallet_transaction_count(TransactionType::Recharge, OUTCOME_OK), 1);
    h.tear_down().await;
}

#[tokio::test]
async fn rejected_movements_leave_no_trace() {
    let h = Harness::new().await;
    let bob = h.user("bob@example.com").await;
    h.recharge(bob.user_id, 1000).await;

    let debit = NewBalanceTransaction::new(TransactionType::Adjustment, Cents::from(-1001), "adj-1");
    let err = h.wallet.apply_transaction(bob.user_id, debit).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let zero = NewBalanceTransaction::new(TransactionType::Adjustment, Cents::from(0), "adj-2");
    let err = h.wallet.apply_transaction(bob.user_id, zero).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let usd = NewBalanceTransaction::recharge(Cents::from(100), "usd-1").with_currency("USD");
    let err = h.wallet.apply_transaction(bob.user_id, usd).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let refund = NewBalanceTransaction::new(TransactionType::Refund, Cents::from(-5), "bad-refund");
    let err = h.wallet.record_refund(bob.user_id, refund).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(h.balance(bob.user_id).await, 1000);
    assert_eq!(h.ledger(bob.user_id).await.len(), 1);
    h.assert_wallet_consistent(bob.user_id).await;
    assert_eq!(h.ctx.metrics().wallet_transaction_count(TransactionType::Adjustment, OUTCOME_ERROR), 2);
    h.tear_down().await;
}

// A request that read the clock first may still commit second. Its ledger row must not sort before the earlier commit.
#[tokio::test]
async fn ledger_time_follows_commit_order() {
    let h = Harness::new().await;
    let frank = h.user("frank@example.com").await;
    let t = Utc::now();
    let first = NewBalanceTransaction::recharge(Cents::from(100), "late-clock");
    let first = h.db.apply_transaction(frank.user_id, first, t + Duration::seconds(5)).await.unwrap();
    let second = NewBalanceTransaction::recharge(Cents::from(50), "early-clock");
    let second = h.db.apply_transaction(frank.user_id, second, t).await.unwrap();
    assert!(second.transaction.created_at >= first.transaction.created_at);
    assert_eq!(second.balance.updated_at, second.transaction.created_at);

    let ledger = h.ledger(frank.user_id).await;
    assert_eq!(ledger[0].reference, "early-clock");
    assert_eq!(ledger[0].balance_after_cents, Cents::from(150));
    assert_eq!(h.balance(frank.user_id).await, 150);
    h.assert_wallet_consistent(frank.user_id).await;
    h.tear_down().await;
}

#[tokio::test]
async fn debit_to_exactly_zero() {
    let h = Harness::new().await;
    let carol = h.user("carol@example.com").await;
    h.recharge(carol.user_id, 700).await;
    let debit = NewBalanceTransaction::new(TransactionType::Adjustment, Cents::from(-700), "adj-zero");
    let receipt = h.wallet.apply_transaction(carol.user_id, debit).await.unwrap();
    assert!(receipt.balance.balance_cents.is_zero());
    let refund = NewBalanceTransaction::new(TransactionType::Adjustment, Cents::from(250), "goodwill");
    let receipt = h.wallet.record_refund(carol.user_id, refund).await.unwrap();
    assert_eq!(receipt.transaction.tx_type, TransactionType::Refund);
    assert_eq!(h.balance(carol.user_id).await, 250);
    h.assert_wallet_consistent(carol.user_id).await;
    h.tear_down().await;
}

#[tokio::test]
async fn statement_pages_and_filters() {
    let h = Harness::new().await;
    let dave = h.user("dave@example.com").await;
    for _ in 0..5 {
        h.recharge(dave.user_id, 100).await;
    }
    let debit = NewBalanceTransaction::new(TransactionType::Adjustment, Cents::from(-50), "adj");
    h.wallet.apply_transaction(dave.user_id, debit).await.unwrap();

    let statement = h.accounts.get_balance(&dave, TransactionQuery::new(1, 4)).await.unwrap();
    assert_eq!(statement.balance.balance_cents, Cents::from(450));
    assert_eq!(statement.transactions.len(), 4);
    assert_eq!(statement.pagination.total, 6);
    assert_eq!(statement.pagination.total_pages(), 2);
    assert_eq!(statement.transactions[0].tx_type, TransactionType::Adjustment);

    let page_two = h.accounts.get_balance(&dave, TransactionQuery::new(2, 4)).await.unwrap();
    assert_eq!(page_two.transactions.len(), 2);

    let far_away = h.accounts.get_balance(&dave, TransactionQuery::new(i64::MAX, 20)).await.unwrap();
    assert!(far_away.transactions.is_empty());
    assert_eq!(far_away.pagination.total, 6);

    let recharges = TransactionQuery::new(1, 20).with_type(TransactionType::Recharge);
    let statement = h.accounts.get_balance(&dave, recharges).await.unwrap();
    assert_eq!(statement.pagination.total, 5);
    assert!(statement.transactions.iter().all(|t| t.tx_type == TransactionType::Recharge));
    h.tear_down().await;
}

#[tokio::test]
async fn concurrent_debits_never_overdraw() {
    let h = Harness::new().await;
    let erin = h.user("erin@example.com").await;
    h.recharge(erin.user_id, 1000).await;
    let debits = (0..10).map(|i| {
        let tx = NewBalanceTransaction::new(TransactionType::Adjustment, Cents::from(-300), format!("burst-{i}"));
        h.wallet.apply_transaction(erin.user_id, tx)
    });
    let results = futures_util::future::join_all(debits).await;
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 3);
    for err in results.into_iter().filter_map(Result::err) {
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "unexpected error: {err}");
    }
    assert_eq!(h.balance(erin.user_id).await, 100);
    h.assert_wallet_consistent(erin.user_id).await;
    h.tear_down().await;
}
