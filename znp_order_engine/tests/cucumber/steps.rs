use std::str::FromStr;

use cucumber::{then, when};
use znp_common::Cents;
use znp_order_engine::{
    db_types::{OrderStatus, PaymentStatus, TransactionType},
    engine_api::order_objects::{CreateOrderRequest, PaymentCallback, RefundRequest},
};

use crate::cucumber::EngineWorld;

#[when(expr = "{word} recharges {int} cents")]
async fn recharge(world: &mut EngineWorld, name: String, amount: i64) {
    world.recharge(&name, amount).await;
}

#[when(expr = "{word} buys {int} x {string} from the wallet")]
async fn buy_from_wallet(world: &mut EngineWorld, name: String, quantity: i64, plan: String) {
    let request = CreateOrderRequest::new(world.plan(&plan).id).with_quantity(quantity);
    create_order(world, &name, request).await;
}

#[when(expr = "{word} buys {int} x {string} from the wallet with idempotency key {string}")]
async fn buy_with_key(world: &mut EngineWorld, name: String, quantity: i64, plan: String, key: String) {
    let request = CreateOrderRequest::new(world.plan(&plan).id).with_quantity(quantity).with_idempotency_key(key);
    create_order(world, &name, request).await;
}

#[when(expr = "{word} buys {string} through {string}")]
async fn buy_externally(world: &mut EngineWorld, name: String, plan: String, channel: String) {
    let request = CreateOrderRequest::new(world.plan(&plan).id).with_external_payment(channel);
    create_order(world, &name, request).await;
}

async fn create_order(world: &mut EngineWorld, name: &str, request: CreateOrderRequest) {
    let caller = world.caller(name);
    let result = world.system().orders.create_order(&caller, request).await.map(|r| r.order);
    world.record(result);
}

#[when(expr = "the gateway reports success with reference {string} at {int}")]
async fn gateway_success(world: &mut EngineWorld, reference: String, paid_at: i64) {
    let order = world.last_order();
    let payment = order.payments.first().expect("The order has no payment attempt");
    let callback =
        PaymentCallback::succeeded(order.order.id, payment.id).with_reference(reference).with_paid_at(paid_at);
    apply_callback(world, callback).await;
}

#[when(expr = "the gateway reports failure {string}")]
async fn gateway_failure(world: &mut EngineWorld, code: String) {
    let order = world.last_order();
    let payment = order.payments.first().expect("The order has no payment attempt");
    let callback = PaymentCallback::failed(order.order.id, payment.id, &code);
    apply_callback(world, callback).await;
}

async fn apply_callback(world: &mut EngineWorld, callback: PaymentCallback) {
    match world.system().orders.payment_callback(callback).await {
        Ok(_) => {
            world.last_error = None;
            world.refresh_last_order().await;
        },
        Err(e) => world.last_error = Some(e),
    }
}

#[when(expr = "{word} refunds {int} cents of the order")]
async fn refund(world: &mut EngineWorld, name: String, amount: i64) {
    let caller = world.caller(&name);
    let request = RefundRequest::new(world.last_order().order.id, Cents::from(amount));
    match world.system().orders.refund_order(&caller, request).await {
        Ok(_) => {
            world.last_error = None;
            world.refresh_last_order().await;
        },
        Err(e) => world.last_error = Some(e),
    }
}

#[then(expr = "the request fails with {word}")]
async fn request_fails(world: &mut EngineWorld, kind: String) {
    let err = world.last_error.take().expect("The last request did not fail");
    assert_eq!(err.kind().to_string(), kind, "Unexpected error: {err}");
}

#[then(expr = "the order is {word}")]
async fn order_status(world: &mut EngineWorld, status: String) {
    assert!(world.last_error.is_none(), "The last request failed: {:?}", world.last_error);
    let expected = OrderStatus::from_str(&status).expect("Not an order status");
    assert_eq!(world.last_order().order.status, expected);
}

#[then(expr = "the order payment status is {word}")]
async fn order_payment_status(world: &mut EngineWorld, status: String) {
    let expected = PaymentStatus::from_str(&status).expect("Not a payment status");
    assert_eq!(world.last_order().order.payment_status, expected);
}

#[then(expr = "the order has {int} payment attempt(s) that is/are {word}")]
async fn payment_attempts(world: &mut EngineWorld, count: usize, status: String) {
    let expected = PaymentStatus::from_str(&status).expect("Not a payment status");
    let payments = &world.last_order().payments;
    assert_eq!(payments.len(), count);
    assert!(payments.iter().all(|p| p.status == expected), "Payments: {payments:?}");
}

#[then(expr = "the payment reference is {string}")]
async fn payment_reference(world: &mut EngineWorld, reference: String) {
    assert_eq!(world.last_order().order.payment_reference.as_deref(), Some(reference.as_str()));
}

#[then(expr = "the order has refunded {int} cents")]
async fn refunded(world: &mut EngineWorld, amount: i64) {
    assert_eq!(world.last_order().order.refunded_cents, Cents::from(amount));
}

#[then(expr = "the order metadata has {word} = {string}")]
async fn order_metadata(world: &mut EngineWorld, key: String, value: String) {
    assert_eq!(world.last_order().order.metadata_str(&key), Some(value.as_str()));
}

#[then("the last two orders are the same order")]
async fn same_order(world: &mut EngineWorld) {
    let n = world.orders.len();
    assert!(n >= 2, "Only {n} order(s) recorded");
    let (a, b) = (&world.orders[n - 2].order, &world.orders[n - 1].order);
    assert_eq!((a.id, &a.number), (b.id, &b.number));
}

#[then(expr = "{word} has a balance of {int} cents")]
async fn balance(world: &mut EngineWorld, name: String, amount: i64) {
    assert_eq!(world.balance(&name).await, Cents::from(amount));
}

#[then(expr = "{word} has {int} {word} ledger row(s)")]
async fn ledger_rows(world: &mut EngineWorld, name: String, count: usize, tx_type: String) {
    let tx_type = TransactionType::from_str(&tx_type).expect("Not a transaction type");
    let rows = world.ledger(&name).await.into_iter().filter(|t| t.tx_type == tx_type).count();
    assert_eq!(rows, count);
}

#[then(expr = "the latest ledger row of {word} is {int} cents with a running balance of {int} cents")]
async fn latest_ledger_row(world: &mut EngineWorld, name: String, amount: i64, balance_after: i64) {
    let ledger = world.ledger(&name).await;
    let row = ledger.first().expect("The ledger is empty");
    assert_eq!(row.amount_cents, Cents::from(amount));
    assert_eq!(row.balance_after_cents, Cents::from(balance_after));
}
