//! `SqliteDatabase` is a concrete implementation of an order and wallet engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Each mutating method opens one transaction, takes the relevant row lock first, re-checks the request
//! against the locked row and commits. Any early return drops the transaction, which rolls it back.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde_json::json;
use sqlx::SqlitePool;
use znp_common::DEFAULT_CURRENCY_CODE;

use super::db::{
    balances,
    db_url,
    idempotency,
    is_unique_violation,
    ledger,
    new_pool,
    orders,
    orders::OrderUpdate,
    payments,
    plans,
    refunds,
    settings,
    users,
};
use crate::{
    db_types::{
        ApiSecuritySetting,
        BalanceTransaction,
        Metadata,
        MetadataPatch,
        NewBalanceTransaction,
        Order,
        OrderPayment,
        OrderRefund,
        OrderStatus,
        PaymentMethod,
        PaymentStatus,
        Plan,
        TransactionType,
        UserBalance,
        UserSummary,
    },
    engine_api::order_objects::{OrderDetail, OrderQueryFilter, TransactionQuery},
    order_state::{self, CallbackDecision, CancelDecision},
    traits::{
        BalanceStore,
        CallbackOutcome,
        CancelActor,
        CancelOrderRequest,
        CancelOutcome,
        CreateOrderOutcome,
        LedgerStore,
        MarkPaidUpdate,
        NewOrderRequest,
        OrderGatewayDatabase,
        OrderGatewayError,
        OrderStore,
        PaymentCallbackUpdate,
        PaymentStore,
        PlanCatalog,
        RefundOrderRequest,
        RefundOutcome,
        SecuritySettingsStore,
        StoreError,
        UserDirectory,
        WalletError,
        WalletManagement,
        WalletReceipt,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    default_currency: String,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl OrderGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order(&self, request: NewOrderRequest) -> Result<CreateOrderOutcome, OrderGatewayError> {
        let is_wallet_purchase = request.is_wallet_purchase();
        let NewOrderRequest { order: new_order, item, payment, idempotency } = request;
        let now = new_order.created_at;
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(&new_order, &mut tx).await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", order.number, order.id);
        let item = orders::insert_item(order.id, &item, order.total_cents, now, &mut tx).await?;
        let mut attempts = vec![];
        let mut transaction = None;
        let order = match order.payment_method {
            PaymentMethod::Balance if is_wallet_purchase => {
                let purchase =
                    NewBalanceTransaction::new(TransactionType::Purchase, -order.total_cents, order.ledger_reference())
                        .with_currency(order.currency.clone())
                        .with_description(format!("Order {}", order.number))
                        .with_metadata(order_link(&order));
                let receipt =
                    balances::apply_transaction(order.user_id, &purchase, &self.default_currency, now, &mut tx).await?;
                let paid_at = receipt.transaction.created_at;
                transaction = Some(receipt.transaction);
                orders::update_order(order.id, OrderUpdate::paid(paid_at), now, &mut tx).await?
            },
            PaymentMethod::Balance => {
                debug!("🗃️ Order {} is free. Marking it paid without touching the wallet", order.number);
                orders::update_order(order.id, OrderUpdate::paid(now), now, &mut tx).await?
            },
            PaymentMethod::External => {
                if let Some(payment) = payment {
                    attempts.push(payments::insert_payment(order.id, &payment, now, &mut tx).await?);
                }
                orders::update_order(order.id, OrderUpdate::status(OrderStatus::PendingPayment), now, &mut tx).await?
            },
        };
        if let Some(binding) = idempotency {
            let user_id = order.user_id;
            match idempotency::bind_key(user_id, &binding.endpoint, &binding.key, order.id, now, &mut tx).await {
                Ok(_) => {},
                Err(e) if is_unique_violation(&e) => {
                    // Roll back everything written above before looking up the winner
                    drop(tx);
                    info!("🗃️ Idempotency key {} was bound by a concurrent request. Rolling back", binding.key);
                    let mut conn = self.pool.acquire().await?;
                    let record =
                        idempotency::fetch_record(new_order.user_id, &binding.endpoint, &binding.key, &mut conn)
                            .await?
                            .ok_or_else(|| {
                                OrderGatewayError::DatabaseError(format!(
                                    "Idempotency key {} collided, but no binding exists",
                                    binding.key
                                ))
                            })?;
                    return Ok(CreateOrderOutcome::AlreadyBound(record.order_id));
                },
                Err(e) => return Err(e.into()),
            }
        }
        tx.commit().await?;
        info!("🗃️ Order {} created with status {}", order.number, order.status);
        let detail = OrderDetail { order, items: vec![item], refunds: vec![], payments: attempts };
        Ok(CreateOrderOutcome::Created { order: detail, transaction })
    }

    async fn cancel_order(&self, request: CancelOrderRequest) -> Result<CancelOutcome, OrderGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(request.order_id, &mut tx).await?;
        let decision = match request.actor {
            CancelActor::User => order_state::check_user_cancel(&order)?,
            CancelActor::Admin => order_state::check_admin_cancel(&order)?,
        };
        if decision == CancelDecision::AlreadyCancelled {
            debug!("🗃️ Order {} is already cancelled", order.number);
            return Ok(CancelOutcome::AlreadyCancelled(order));
        }
        let mut metadata = order.metadata.0.clone();
        MetadataPatch::Cancelled { by: request.cancelled_by.clone(), reason: request.reason.clone() }
            .apply(&mut metadata);
        let update = OrderUpdate::status(OrderStatus::Cancelled)
            .with_cancelled_at(request.cancelled_at)
            .with_metadata(metadata);
        let order = orders::update_order(order.id, update, request.now, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Order {} cancelled by {}", order.number, request.cancelled_by);
        Ok(CancelOutcome::Cancelled(order))
    }

    async fn mark_order_paid(&self, update: MarkPaidUpdate) -> Result<Order, OrderGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(update.order_id, &mut tx).await?;
        order_state::check_mark_paid(&order)?;
        let mut metadata = order.metadata.0.clone();
        MetadataPatch::MarkedPaid { by: update.marked_by.clone(), note: update.note.clone() }.apply(&mut metadata);
        let changes = OrderUpdate::paid(update.paid_at)
            .with_payment_method(update.payment_method)
            .with_reference(update.reference.clone())
            .with_metadata(metadata);
        let order = orders::update_order(order.id, changes, update.now, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Order {} was marked as paid by {}", order.number, update.marked_by);
        Ok(order)
    }

    async fn refund_order(&self, request: RefundOrderRequest) -> Result<RefundOutcome, OrderGatewayError> {
        let now = request.now;
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(request.order_id, &mut tx).await?;
        let plan = order_state::plan_refund(&order, request.amount)?;
        let reference = order.ledger_reference();
        let credit = NewBalanceTransaction::new(TransactionType::Refund, request.amount, reference.clone())
            .with_currency(order.currency.clone())
            .with_description(format!("Refund for order {}", order.number))
            .with_metadata(ledger::refund_metadata(&request.metadata, order.id, request.reason.as_deref()));
        let receipt = balances::record_refund(order.user_id, credit, &self.default_currency, now, &mut tx).await?;
        let refunded_at = receipt.transaction.created_at;
        let now = refunded_at;
        let refund = refunds::insert_refund(
            order.id,
            request.amount,
            request.reason.as_deref(),
            &reference,
            receipt.transaction.id,
            &request.metadata,
            now,
            &mut tx,
        )
        .await?;
        let mut metadata = order.metadata.0.clone();
        MetadataPatch::Refunded {
            amount: request.amount,
            transaction_id: receipt.transaction.id,
            by: request.refunded_by.clone(),
            reason: request.reason.clone(),
        }
        .apply(&mut metadata);
        let order = if plan.completes_refund {
            let update = OrderUpdate::status(OrderStatus::Refunded).with_refunded(plan.refunded_cents, refunded_at);
            let refunded = orders::update_order(order.id, update, now, &mut tx).await?;
            MetadataPatch::Cancelled { by: request.refunded_by.clone(), reason: None }.apply(&mut metadata);
            MetadataPatch::RefundCompleted.apply(&mut metadata);
            let close = OrderUpdate::status(OrderStatus::Cancelled).with_cancelled_at(now).with_metadata(metadata);
            debug!("🗃️ Order {} has been refunded in full. Closing it", refunded.number);
            orders::update_order(refunded.id, close, now, &mut tx).await?
        } else {
            let update = OrderUpdate::status(plan.final_status)
                .with_refunded(plan.refunded_cents, refunded_at)
                .with_metadata(metadata);
            orders::update_order(order.id, update, now, &mut tx).await?
        };
        tx.commit().await?;
        info!(
            "🗃️ Refunded {} of order {}. {} of {} has now been refunded",
            request.amount, order.number, order.refunded_cents, order.total_cents
        );
        Ok(RefundOutcome { order, refund, receipt })
    }

    async fn apply_payment_callback(
        &self,
        update: PaymentCallbackUpdate,
    ) -> Result<CallbackOutcome, OrderGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(update.order_id, &mut tx).await?;
        let (order_id, payment_id) = (update.order_id, update.payment_id);
        let not_found = || OrderGatewayError::PaymentNotFound { order_id, payment_id };
        let existing = payments::fetch_payment(update.payment_id, &mut tx).await?.ok_or_else(not_found)?;
        if existing.order_id != order.id {
            return Err(not_found());
        }
        let decision = order_state::plan_callback(&order, update.status)?;
        let payment = payments::update_payment_result(
            existing.id,
            update.status,
            update.reference.as_deref(),
            update.failure_code.as_deref(),
            update.failure_message.as_deref(),
            update.now,
            &mut tx,
        )
        .await?
        .ok_or_else(not_found)?;
        let (order, replayed) = match decision {
            CallbackDecision::Replay => {
                debug!("🗃️ Order {} already reflects a {} payment. Callback is a replay", order.number, update.status);
                (order, true)
            },
            CallbackDecision::Apply(OrderStatus::Paid) => {
                let changes = OrderUpdate::paid(update.paid_at.unwrap_or(update.now)).with_reference(update.reference);
                (orders::update_order(order.id, changes, update.now, &mut tx).await?, false)
            },
            CallbackDecision::Apply(status) => {
                let changes = OrderUpdate::status(status)
                    .with_payment_status(PaymentStatus::Failed)
                    .with_failure(update.failure_code, update.failure_message);
                (orders::update_order(order.id, changes, update.now, &mut tx).await?, false)
            },
        };
        tx.commit().await?;
        info!("🗃️ Payment #{} for order {} is {}. Order is {}", payment.id, order.number, payment.status, order.status);
        Ok(CallbackOutcome { order, payment, replayed })
    }

    async fn close(&mut self) -> Result<(), OrderGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl WalletManagement for SqliteDatabase {
    async fn apply_transaction(
        &self,
        user_id: i64,
        tx: NewBalanceTransaction,
        now: DateTime<Utc>,
    ) -> Result<WalletReceipt, WalletError> {
        let mut db_tx = self.pool.begin().await?;
        let receipt = balances::apply_transaction(user_id, &tx, &self.default_currency, now, &mut db_tx).await?;
        db_tx.commit().await?;
        Ok(receipt)
    }
}

impl BalanceStore for SqliteDatabase {
    async fn fetch_balance(&self, user_id: i64) -> Result<UserBalance, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let balance = balances::fetch_balance(user_id, &mut conn).await?;
        Ok(balance.unwrap_or_else(|| UserBalance::zero(user_id, &self.default_currency, Utc::now())))
    }
}

impl LedgerStore for SqliteDatabase {
    async fn fetch_transactions(
        &self,
        user_id: i64,
        query: &TransactionQuery,
    ) -> Result<(Vec<BalanceTransaction>, i64), StoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = ledger::fetch_transactions(user_id, query, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<BalanceTransaction>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let tx = ledger::fetch_transaction(id, &mut conn).await?;
        Ok(tx)
    }
}

impl OrderStore for SqliteDatabase {
    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_detail(&self, order_id: i64) -> Result<Option<OrderDetail>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = match orders::fetch_order(order_id, &mut conn).await? {
            Some(order) => order,
            None => return Ok(None),
        };
        let items = orders::fetch_items(order_id, &mut conn).await?;
        let refunds = refunds::fetch_refunds_for_order(order_id, &mut conn).await?;
        let payments = payments::fetch_payments_for_order(order_id, &mut conn).await?;
        Ok(Some(OrderDetail { order, items, refunds, payments }))
    }

    async fn fetch_order_by_number(&self, number: &str) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_number(number, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, query: &OrderQueryFilter) -> Result<(Vec<Order>, i64), StoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::search_orders(query, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_order_for_idempotency_key(
        &self,
        user_id: i64,
        endpoint: &str,
        key: &str,
    ) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = match idempotency::fetch_record(user_id, endpoint, key, &mut conn).await? {
            Some(record) => orders::fetch_order(record.order_id, &mut conn).await?,
            None => None,
        };
        Ok(order)
    }
}

impl PaymentStore for SqliteDatabase {
    async fn fetch_payment(&self, payment_id: i64) -> Result<Option<OrderPayment>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment(payment_id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<OrderPayment>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let payments = payments::fetch_payments_for_order(order_id, &mut conn).await?;
        Ok(payments)
    }

    async fn fetch_refunds_for_order(&self, order_id: i64) -> Result<Vec<OrderRefund>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let refunds = refunds::fetch_refunds_for_order(order_id, &mut conn).await?;
        Ok(refunds)
    }
}

impl PlanCatalog for SqliteDatabase {
    async fn fetch_plan(&self, plan_id: i64) -> Result<Option<Plan>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let plan = plans::fetch_plan(plan_id, &mut conn).await?;
        Ok(plan)
    }
}

impl UserDirectory for SqliteDatabase {
    async fn fetch_user(&self, user_id: i64) -> Result<Option<UserSummary>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::fetch_user(user_id, &mut conn).await?;
        Ok(user)
    }

    async fn fetch_users(&self, user_ids: &[i64]) -> Result<Vec<UserSummary>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let users = users::fetch_users(user_ids, &mut conn).await?;
        Ok(users)
    }
}

impl SecuritySettingsStore for SqliteDatabase {
    async fn fetch_security_setting(&self) -> Result<Option<ApiSecuritySetting>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let setting = settings::fetch_latest(&mut conn).await?;
        Ok(setting)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool, default_currency: DEFAULT_CURRENCY_CODE.to_string() })
    }

    /// Sets the currency given to wallets that are created by a transaction that does not name one.
    pub fn with_default_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.default_currency = currency.into();
        self
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn default_currency(&self) -> &str {
        self.default_currency.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn order_link(order: &Order) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("order_id".into(), json!(order.id));
    metadata.insert("order_number".into(), json!(order.number));
    metadata
}
