use std::time::Duration;

use chrono::{TimeZone, Utc};
use sqlx::{Connection, SqliteConnection};
use znp_common::Cents;
use znp_order_engine::{
    db_types::{NewPlan, OrderStatus, PaymentMethod, PaymentStatus, PlanStatus, TransactionType},
    engine_api::order_objects::{
        AdminCancelRequest,
        CreateOrderRequest,
        MarkPaidRequest,
        OrderQueryFilter,
        OrderSort,
        PaymentCallback,
        RefundRequest,
        SortDirection,
    },
    test_utils::seed::{disable_user, seed_pending_order, seed_plan},
    ErrorKind,
};

mod support;

use support::Harness;

#[tokio::test]
async fn recharge_then_purchase() {
    let h = Harness::new().await;
    let alice = h.user("alice@example.com").await;
    let plan = h.plan("basic", 1500).await;
    h.recharge(alice.user_id, 5000).await;

    let created = h.orders.create_order(&alice, CreateOrderRequest::new(plan.id)).await.unwrap();
    let order = &created.order.order;
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_status, PaymentStatus::Succeeded);
    assert_eq!(order.total_cents, Cents::from(1500));
    assert!(order.paid_at.is_some());
    assert!(order.number.starts_with("ORD-"));
    assert_eq!(created.order.items.len(), 1);
    assert_eq!(created.order.items[0].quantity, 1);
    assert_eq!(created.balance.balance_cents, Cents::from(3500));
    assert!(!created.replayed);

    let purchase = created.transaction.expect("no ledger row for a balance purchase");
    assert_eq!(purchase.tx_type, TransactionType::Purchase);
    assert_eq!(purchase.amount_cents, Cents::from(-1500));
    assert_eq!(purchase.balance_after_cents, Cents::from(3500));
    let purchases = h.ledger(alice.user_id).await.into_iter().filter(|t| t.tx_type == TransactionType::Purchase);
    assert_eq!(purchases.count(), 1);
    h.assert_wallet_consistent(alice.user_id).await;
    h.tear_down().await;
}

// Another writer holds the database lock, so the purchase is still waiting for it when the deadline passes.
#[tokio::test]
async fn expired_deadline_rolls_everything_back() {
    let h = Harness::new().await;
    let olga = h.user("olga@example.com").await;
    let plan = h.plan("basic", 1500).await;
    h.recharge(olga.user_id, 5000).await;

    let mut blocker = SqliteConnection::connect(h.db.url()).await.unwrap();
    sqlx::query("BEGIN IMMEDIATE").execute(&mut blocker).await.unwrap();
    let hurried = olga.clone().with_timeout(Duration::from_millis(300));
    let request = CreateOrderRequest::new(plan.id).with_idempotency_key("slow-1");
    let err = h.orders.create_order(&hurried, request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    sqlx::query("ROLLBACK").execute(&mut blocker).await.unwrap();
    blocker.close().await.unwrap();

    let orders = h.accounts.list_orders(&olga, OrderQueryFilter::default()).await.unwrap();
    assert_eq!(orders.pagination.total, 0);
    assert_eq!(h.balance(olga.user_id).await, 5000);
    let ledger = h.ledger(olga.user_id).await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].tx_type, TransactionType::Recharge);
    let bindings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_idempotency_keys")
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(bindings, 0);

    // The key was never bound, so a retry creates the order for real
    let request = CreateOrderRequest::new(plan.id).with_idempotency_key("slow-1");
    let created = h.orders.create_order(&olga, request).await.unwrap();
    assert!(!created.replayed);
    assert_eq!(created.order.order.status, OrderStatus::Paid);
    assert_eq!(h.balance(olga.user_id).await, 3500);
    h.assert_wallet_consistent(olga.user_id).await;
    h.tear_down().await;
}

#[tokio::test]
async fn insufficient_balance_changes_nothing() {
    let h = Harness::new().await;
    let bob = h.user("bob@example.com").await;
    let plan = h.plan("premium", 4000).await;
    h.recharge(bob.user_id, 3500).await;

    let err = h.orders.create_order(&bob, CreateOrderRequest::new(plan.id)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(h.balance(bob.user_id).await, 3500);
    assert_eq!(h.ledger(bob.user_id).await.len(), 1);
    let orders = h.accounts.list_orders(&bob, OrderQueryFilter::default()).await.unwrap();
    assert_eq!(orders.pagination.total, 0);
    h.tear_down().await;
}

#[tokio::test]
async fn idempotent_create() {
    let h = Harness::new().await;
    let carol = h.user("carol@example.com").await;
    let plan = h.plan("basic", 1500).await;
    h.recharge(carol.user_id, 3500).await;

    let request = CreateOrderRequest::new(plan.id).with_quantity(2).with_idempotency_key("k1");
    let first = h.orders.create_order(&carol, request).await.unwrap();
    assert_eq!(first.order.order.status, OrderStatus::Paid);
    assert_eq!(first.balance.balance_cents, Cents::from(500));

    let request = CreateOrderRequest::new(plan.id).with_quantity(9).with_idempotency_key("k1");
    let second = h.orders.create_order(&carol, request).await.unwrap();
    assert!(second.replayed);
    assert!(second.transaction.is_none());
    assert_eq!(second.order.order.id, first.order.order.id);
    assert_eq!(second.order.order.number, first.order.order.number);
    assert_eq!(second.order.items[0].quantity, 2);
    assert_eq!(second.balance.balance_cents, Cents::from(500));
    let purchases = h.ledger(carol.user_id).await.into_iter().filter(|t| t.tx_type == TransactionType::Purchase);
    assert_eq!(purchases.count(), 1);

    // Keys are scoped to the user
    let dave = h.user("dave@example.com").await;
    h.recharge(dave.user_id, 1500).await;
    let request = CreateOrderRequest::new(plan.id).with_idempotency_key("k1");
    let other = h.orders.create_order(&dave, request).await.unwrap();
    assert!(!other.replayed);
    assert_ne!(other.order.order.id, first.order.order.id);
    h.tear_down().await;
}

#[tokio::test]
async fn concurrent_requests_with_one_key_create_one_order() {
    let h = Harness::new().await;
    let erin = h.user("erin@example.com").await;
    let plan = h.plan("basic", 1000).await;
    h.recharge(erin.user_id, 10_000).await;

    let requests = (0..6).map(|_| {
        let request = CreateOrderRequest::new(plan.id).with_idempotency_key("double-click");
        h.orders.create_order(&erin, request)
    });
    let results = futures_util::future::join_all(requests).await;
    let ids = results.into_iter().map(|r| r.unwrap().order.order.id).collect::<Vec<_>>();
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(h.balance(erin.user_id).await, 9000);
    let orders = h.accounts.list_orders(&erin, OrderQueryFilter::default()).await.unwrap();
    assert_eq!(orders.pagination.total, 1);
    h.assert_wallet_consistent(erin.user_id).await;
    h.tear_down().await;
}

#[tokio::test]
async fn external_payment_succeeds() {
    let h = Harness::new().await;
    let frank = h.user("frank@example.com").await;
    let plan = h.plan("basic", 1500).await;

    let request =
        CreateOrderRequest::new(plan.id).with_external_payment("alipay").with_return_url("https://znp/return");
    let created = h.orders.create_order(&frank, request).await.unwrap();
    let order = &created.order.order;
    assert_eq!(order.status, OrderStatus::PendingPayment);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(order.payment_intent_id.as_deref().is_some_and(|id| id.starts_with("PI-")));
    assert_eq!(order.metadata_str("payment_channel"), Some("alipay"));
    assert_eq!(order.metadata_str("payment_return_url"), Some("https://znp/return"));
    assert!(created.transaction.is_none());
    assert_eq!(created.order.payments.len(), 1);
    let payment = &created.order.payments[0];
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.provider, "alipay");
    assert_eq!(payment.amount_cents, Cents::from(1500));

    let paid_at = Utc.timestamp_opt(1_722_470_400, 0).unwrap();
    let callback =
        PaymentCallback::succeeded(order.id, payment.id).with_reference("gw-1").with_paid_at(paid_at.timestamp());
    let result = h.orders.payment_callback(callback.clone()).await.unwrap();
    assert!(!result.replayed);
    assert_eq!(result.order.status, OrderStatus::Paid);
    assert_eq!(result.order.payment_status, PaymentStatus::Succeeded);
    assert_eq!(result.order.payment_reference.as_deref(), Some("gw-1"));
    assert_eq!(result.order.paid_at, Some(paid_at));
    assert_eq!(result.payment.status, PaymentStatus::Succeeded);
    assert_eq!(result.payment.reference.as_deref(), Some("gw-1"));

    // The gateway retries. Nothing changes.
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let replay = h.orders.payment_callback(callback.clone()).await.unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.order, result.order);
        assert_eq!(replay.payment, result.payment);
    }
    assert_eq!(h.balance(frank.user_id).await, 0);
    assert!(h.ledger(frank.user_id).await.is_empty());

    // A contradicting callback is rejected
    let contradiction = PaymentCallback::failed(order.id, payment.id, "timeout");
    let err = h.orders.payment_callback(contradiction).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    h.tear_down().await;
}

#[tokio::test]
async fn external_payment_fails() {
    let h = Harness::new().await;
    let grace = h.user("grace@example.com").await;
    let admin = h.admin("admin@example.com").await;
    let plan = h.plan("basic", 1500).await;
    let created =
        h.orders.create_order(&grace, CreateOrderRequest::new(plan.id).with_external_payment("stripe")).await.unwrap();
    let order_id = created.order.order.id;
    let payment_id = created.order.payments[0].id;

    let mut callback = PaymentCallback::failed(order_id, payment_id, "timeout");
    callback.failure_message = Some("The customer did not complete the payment".into());
    let result = h.orders.payment_callback(callback.clone()).await.unwrap();
    assert_eq!(result.order.status, OrderStatus::PaymentFailed);
    assert_eq!(result.order.payment_status, PaymentStatus::Failed);
    assert_eq!(result.order.payment_failure_code.as_deref(), Some("timeout"));
    assert_eq!(result.payment.status, PaymentStatus::Failed);
    assert_eq!(result.payment.failure_code.as_deref(), Some("timeout"));
    assert!(h.orders.payment_callback(callback).await.unwrap().replayed);

    // Users cannot close a failed order, admins can
    let err = h.orders.cancel_order(&grace, order_id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let cancelled_at = Utc.timestamp_opt(1_722_500_000, 0).unwrap();
    let request = AdminCancelRequest { order_id, reason: Some("abandoned".into()), cancelled_at: Some(cancelled_at) };
    let order = h.orders.admin_cancel_order(&admin, request).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.cancelled_at, Some(cancelled_at));
    assert_eq!(order.metadata_str("cancelled_by"), Some("admin@example.com"));
    assert_eq!(order.metadata_str("cancel_reason"), Some("abandoned"));
    h.tear_down().await;
}

#[tokio::test]
async fn callbacks_must_match_their_order() {
    let h = Harness::new().await;
    let heidi = h.user("heidi@example.com").await;
    let plan = h.plan("basic", 1500).await;
    let a = h.orders.create_order(&heidi, CreateOrderRequest::new(plan.id).with_external_payment("alipay")).await;
    let b = h.orders.create_order(&heidi, CreateOrderRequest::new(plan.id).with_external_payment("alipay")).await;
    let (a, b) = (a.unwrap().order, b.unwrap().order);

    let err = h.orders.payment_callback(PaymentCallback::succeeded(a.order.id, b.payments[0].id)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = h.orders.payment_callback(PaymentCallback::succeeded(9999, a.payments[0].id)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let mut pending = PaymentCallback::succeeded(a.order.id, a.payments[0].id);
    pending.status = PaymentStatus::Pending;
    let err = h.orders.payment_callback(pending).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let unchanged = h.accounts.get_order(&heidi, a.order.id).await.unwrap();
    assert_eq!(unchanged.order.status, OrderStatus::PendingPayment);
    h.tear_down().await;
}

#[tokio::test]
async fn partial_then_full_refund() {
    let h = Harness::new().await;
    let ivan = h.user("ivan@example.com").await;
    let admin = h.admin("admin@example.com").await;
    let plan = h.plan("pro", 2000).await;
    h.recharge(ivan.user_id, 2000).await;
    let order = h.orders.create_order(&ivan, CreateOrderRequest::new(plan.id)).await.unwrap().order.order;
    assert_eq!(h.balance(ivan.user_id).await, 0);

    // Paid orders cannot simply be closed
    let err = h.orders.admin_cancel_order(&admin, AdminCancelRequest { order_id: order.id, ..Default::default() });
    assert_eq!(err.await.unwrap_err().kind(), ErrorKind::InvalidArgument);
    let err = h.orders.refund_order(&ivan, RefundRequest::new(order.id, Cents::from(800))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let request = RefundRequest::new(order.id, Cents::from(800)).with_reason("service outage");
    let first = h.orders.refund_order(&admin, request).await.unwrap();
    assert_eq!(first.order.status, OrderStatus::PartiallyRefunded);
    assert_eq!(first.order.refunded_cents, Cents::from(800));
    assert_eq!(first.refund.amount_cents, Cents::from(800));
    assert_eq!(first.transaction.tx_type, TransactionType::Refund);
    assert_eq!(first.transaction.amount_cents, Cents::from(800));
    assert_eq!(first.balance.balance_cents, Cents::from(800));
    assert_eq!(first.refund.balance_transaction_id, Some(first.transaction.id));

    let err = h.orders.refund_order(&admin, RefundRequest::new(order.id, Cents::from(1201))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let second = h.orders.refund_order(&admin, RefundRequest::new(order.id, Cents::from(1200))).await.unwrap();
    assert_eq!(second.order.refunded_cents, Cents::from(2000));
    assert_eq!(second.order.status, OrderStatus::Cancelled);
    assert_eq!(second.order.metadata_str("cancel_reason"), Some("refund_completed"));
    assert!(second.order.refunded_at.is_some());
    assert!(second.order.cancelled_at.is_some());
    assert_eq!(second.balance.balance_cents, Cents::from(2000));

    let err = h.orders.refund_order(&admin, RefundRequest::new(order.id, Cents::from(1))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = h.orders.refund_order(&admin, RefundRequest::new(4242, Cents::from(1))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let detail = h.accounts.get_order(&ivan, order.id).await.unwrap();
    assert_eq!(detail.refunds.len(), 2);
    let refunds = h.ledger(ivan.user_id).await.into_iter().filter(|t| t.tx_type == TransactionType::Refund).count();
    assert_eq!(refunds, 2);
    h.assert_wallet_consistent(ivan.user_id).await;
    h.tear_down().await;
}

#[tokio::test]
async fn user_cancellation() {
    let h = Harness::new().await;
    let judy = h.user("judy@example.com").await;
    let mallory = h.user("mallory@example.com").await;
    let plan = h.plan("basic", 1500).await;
    let free = h.plan("trial", 0).await;

    let pending = seed_pending_order(&h.db, judy.user_id, &plan).await;
    let err = h.orders.cancel_order(&mallory, pending.id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let err = h.orders.cancel_order(&judy, 31337, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let cancelled = h.orders.cancel_order(&judy, pending.id, Some("changed my mind".into())).await.unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.order.metadata_str("cancelled_by"), Some("user"));
    assert_eq!(cancelled.order.metadata_str("cancel_reason"), Some("changed my mind"));
    let again = h.orders.cancel_order(&judy, pending.id, None).await.unwrap();
    assert_eq!(again.order.updated_at, cancelled.order.updated_at);
    assert_eq!(again.order.metadata_str("cancel_reason"), Some("changed my mind"));

    // Free orders are paid on creation and can be cancelled without a refund
    let trial = h.orders.create_order(&judy, CreateOrderRequest::new(free.id)).await.unwrap();
    assert_eq!(trial.order.order.status, OrderStatus::Paid);
    assert!(trial.transaction.is_none());
    let cancelled = h.orders.cancel_order(&judy, trial.order.order.id, None).await.unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);

    // Paid orders cannot
    h.recharge(judy.user_id, 1500).await;
    let paid = h.orders.create_order(&judy, CreateOrderRequest::new(plan.id)).await.unwrap().order.order;
    let err = h.orders.cancel_order(&judy, paid.id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(h.ledger(judy.user_id).await.iter().all(|t| t.tx_type != TransactionType::Refund));
    h.tear_down().await;
}

#[tokio::test]
async fn admin_marks_order_paid() {
    let h = Harness::new().await;
    let ken = h.user("ken@example.com").await;
    let admin = h.admin("ops@example.com").await;
    let plan = h.plan("basic", 1500).await;
    let pending = seed_pending_order(&h.db, ken.user_id, &plan).await;

    let request = MarkPaidRequest { order_id: pending.id, ..Default::default() };
    let err = h.orders.mark_paid(&ken, request.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let paid_at = Utc.timestamp_opt(1_722_000_000, 0).unwrap();
    let request = MarkPaidRequest {
        order_id: pending.id,
        payment_method: Some(PaymentMethod::External),
        paid_at: Some(paid_at),
        note: Some("bank transfer".into()),
        reference: Some("BT-778".into()),
    };
    let order = h.orders.mark_paid(&admin, request.clone()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_status, PaymentStatus::Succeeded);
    assert_eq!(order.payment_method, PaymentMethod::External);
    assert_eq!(order.paid_at, Some(paid_at));
    assert_eq!(order.payment_reference.as_deref(), Some("BT-778"));
    assert_eq!(order.metadata_str("marked_paid_by"), Some("ops@example.com"));
    assert_eq!(order.metadata_str("marked_paid_note"), Some("bank transfer"));
    assert!(h.ledger(ken.user_id).await.is_empty());

    let err = h.orders.mark_paid(&admin, request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    h.tear_down().await;
}

#[tokio::test]
async fn create_order_validation() {
    let h = Harness::new().await;
    let leo = h.user("leo@example.com").await;
    let plan = h.plan("basic", 100).await;
    let draft = seed_plan(&h.db, NewPlan::new("beta", "beta", Cents::from(100)).with_status(PlanStatus::Draft)).await;
    let hidden = seed_plan(&h.db, NewPlan::new("secret", "secret", Cents::from(100)).hidden()).await;
    h.recharge(leo.user_id, 10_000).await;

    for quantity in [0, -1, 11] {
        let request = CreateOrderRequest::new(plan.id).with_quantity(quantity);
        let err = h.orders.create_order(&leo, request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "quantity {quantity}");
    }
    let ten = h.orders.create_order(&leo, CreateOrderRequest::new(plan.id).with_quantity(10)).await.unwrap();
    assert_eq!(ten.order.order.total_cents, Cents::from(1000));

    for plan_id in [draft.id, hidden.id, 555] {
        let err = h.orders.create_order(&leo, CreateOrderRequest::new(plan_id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "plan {plan_id}");
    }
    let mut no_channel = CreateOrderRequest::new(plan.id).with_external_payment(" ");
    let err = h.orders.create_order(&leo, no_channel.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    no_channel.payment_channel = None;
    let err = h.orders.create_order(&leo, no_channel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    disable_user(&h.db, leo.user_id).await;
    let err = h.orders.create_order(&leo, CreateOrderRequest::new(plan.id)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(h.balance(leo.user_id).await, 9000);
    h.tear_down().await;
}

#[tokio::test]
async fn order_queries() {
    let h = Harness::new().await;
    let mia = h.user("mia@example.com").await;
    let nick = h.user("nick@example.com").await;
    let admin = h.admin("admin@example.com").await;
    let cheap = h.plan("cheap", 500).await;
    let dear = h.plan("dear", 2500).await;
    h.recharge(mia.user_id, 10_000).await;
    h.recharge(nick.user_id, 10_000).await;

    let a = h.orders.create_order(&mia, CreateOrderRequest::new(cheap.id)).await.unwrap().order.order;
    let b = h.orders.create_order(&mia, CreateOrderRequest::new(dear.id)).await.unwrap().order.order;
    let c = h.orders.create_order(&mia, CreateOrderRequest::new(cheap.id).with_external_payment("alipay")).await;
    let c = c.unwrap().order.order;
    let d = h.orders.create_order(&nick, CreateOrderRequest::new(dear.id)).await.unwrap().order.order;

    let all = h.accounts.list_orders(&mia, OrderQueryFilter::default()).await.unwrap();
    assert_eq!(all.pagination.total, 3);
    assert_eq!(all.orders.iter().map(|o| o.id).collect::<Vec<_>>(), vec![c.id, b.id, a.id]);

    // Users never see other users' orders, whatever they ask for
    let sneaky = OrderQueryFilter::default().with_user_id(nick.user_id);
    let mine = h.accounts.list_orders(&mia, sneaky).await.unwrap();
    assert!(mine.orders.iter().all(|o| o.user_id == mia.user_id));

    let paid =
        OrderQueryFilter::default().with_status(OrderStatus::Paid).sorted_by(OrderSort::Total, SortDirection::Asc);
    let paid = h.accounts.list_orders(&mia, paid).await.unwrap();
    assert_eq!(paid.orders.iter().map(|o| o.id).collect::<Vec<_>>(), vec![a.id, b.id]);

    let external = OrderQueryFilter::default().with_payment_method(PaymentMethod::External);
    let external = h.accounts.list_orders(&mia, external).await.unwrap();
    assert_eq!(external.orders.len(), 1);
    assert_eq!(external.orders[0].payment_status, PaymentStatus::Pending);

    let by_number = OrderQueryFilter::default().with_number(b.number.clone());
    assert_eq!(h.accounts.list_orders(&mia, by_number).await.unwrap().orders[0].id, b.id);

    let paged = h.accounts.list_orders(&mia, OrderQueryFilter::default().with_page(2, 2)).await.unwrap();
    assert_eq!(paged.orders.len(), 1);
    assert_eq!(paged.pagination.total_pages(), 2);
    let beyond = h.accounts.list_orders(&mia, OrderQueryFilter::default().with_page(i64::MAX, 2)).await.unwrap();
    assert!(beyond.orders.is_empty());

    let err = h.accounts.get_order(&mia, d.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let err = h.accounts.get_order(&mia, 8080).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h.accounts.admin_list_orders(&mia, OrderQueryFilter::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let everything = h.accounts.admin_list_orders(&admin, OrderQueryFilter::default()).await.unwrap();
    assert_eq!(everything.pagination.total, 4);
    let nicks = OrderQueryFilter::default().with_user_id(nick.user_id);
    let nicks = h.accounts.admin_list_orders(&admin, nicks).await.unwrap();
    assert_eq!(nicks.orders.len(), 1);
    assert_eq!(nicks.orders[0].user.as_ref().map(|u| u.email.as_str()), Some("nick@example.com"));

    let detail = h.accounts.admin_get_order(&admin, c.id).await.unwrap();
    assert_eq!(detail.detail.payments.len(), 1);
    assert_eq!(detail.user.map(|u| u.id), Some(mia.user_id));
    h.tear_down().await;
}
