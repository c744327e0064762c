use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde_json::json;

use crate::{
    db_types::{
        Metadata,
        NewOrder,
        NewOrderItem,
        NewOrderPayment,
        Order,
        OrderStatus,
        PaymentMethod,
        Plan,
        TransactionType,
    },
    engine_api::{
        caller::Caller,
        context::EngineContext,
        errors::EngineError,
        order_objects::{
            AdminCancelRequest,
            CancelOrderResult,
            CreateOrderRequest,
            CreateOrderResult,
            MarkPaidRequest,
            PaymentCallback,
            PaymentCallbackResult,
            RefundRequest,
            RefundResult,
        },
    },
    events::{OrderCancelledEvent, OrderPaidEvent, OrderRefundedEvent, PaymentFailedEvent},
    traits::{
        CancelActor,
        CancelOrderRequest,
        CancelOutcome,
        CreateOrderOutcome,
        IdempotencyBinding,
        MarkPaidUpdate,
        NewOrderRequest,
        OrderGatewayDatabase,
        PaymentCallbackUpdate,
        RefundOrderRequest,
    },
};

/// The endpoint name idempotency keys for order creation are scoped to.
pub const CREATE_ORDER_ENDPOINT: &str = "create_order";
/// Recorded as `cancelled_by` when the order owner cancels.
pub const USER_CANCELLER: &str = "user";

/// `OrderFlowApi` is the primary API for the order lifecycle: creating orders, paying for them from the wallet or an
/// external gateway, and cancelling or refunding them.
///
/// Every operation runs under the caller's deadline (or the configured default), is timed in the engine metrics, and
/// publishes its events only after the backend transaction has committed.
pub struct OrderFlowApi<B> {
    db: B,
    ctx: EngineContext,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, ctx: EngineContext) -> Self {
        Self { db, ctx }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }
}

impl<B> OrderFlowApi<B>
where B: OrderGatewayDatabase
{
    /// Creates an order for one plan on behalf of the caller.
    ///
    /// Balance orders are charged in the same transaction and come back `paid`. External orders come back
    /// `pending_payment` with a pending payment attempt. If the request carries an idempotency key that the caller has
    /// already used, the original order is returned with `replayed = true` and nothing is written, even if the rest of
    /// the request differs.
    pub async fn create_order(
        &self,
        caller: &Caller,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResult, EngineError> {
        let deadline = self.ctx.deadline_for(Some(caller));
        let result = self.ctx.run_order_operation("create", deadline, self.create(caller, request)).await;
        match &result {
            Ok(created) if !created.replayed => {
                debug!("📦️ Order {} created for user #{}", created.order.order.number, caller.user_id);
                if created.order.order.status == OrderStatus::Paid {
                    self.ctx.producers().publish_order_paid(OrderPaidEvent::new(created.order.order.clone())).await;
                }
            },
            Ok(created) => debug!("📦️ Order {} returned for a repeated request", created.order.order.number),
            Err(e) => debug!("📦️ Could not create an order for user #{}. {e}", caller.user_id),
        }
        result
    }

    async fn create(&self, caller: &Caller, request: CreateOrderRequest) -> Result<CreateOrderResult, EngineError> {
        let quantity = request.quantity.unwrap_or(1);
        let max_quantity = self.ctx.config().max_quantity;
        if !(1..=max_quantity).contains(&quantity) {
            return Err(EngineError::InvalidArgument(format!(
                "Quantity must be between 1 and {max_quantity}, but was {quantity}"
            )));
        }
        let method = request.payment_method.unwrap_or_default();
        let channel = non_blank(request.payment_channel);
        if method == PaymentMethod::External && channel.is_none() {
            return Err(EngineError::InvalidArgument("External payments require a payment channel".into()));
        }
        let key = non_blank(request.idempotency_key);
        if let Some(key) = &key {
            let existing = self.db.fetch_order_for_idempotency_key(caller.user_id, CREATE_ORDER_ENDPOINT, key).await?;
            if let Some(order) = existing {
                info!("📦️ Idempotency key {key} is already bound to order {}", order.number);
                return self.replay(order.id).await;
            }
        }
        let user = self
            .db
            .fetch_user(caller.user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("User {}", caller.user_id)))?;
        if user.is_disabled() {
            return Err(EngineError::Forbidden(format!("User {} is disabled", user.email)));
        }
        let plan = self
            .db
            .fetch_plan(request.plan_id)
            .await?
            .filter(Plan::is_purchasable)
            .ok_or_else(|| EngineError::InvalidArgument(format!("Plan {} is not available", request.plan_id)))?;
        let item = NewOrderItem::for_plan(&plan, quantity);
        let total = item
            .subtotal()
            .ok_or_else(|| EngineError::InvalidArgument(format!("{quantity} × {} is too large", plan.price_cents)))?;
        let now = self.ctx.now();
        let numbers = self.ctx.numbers();
        let mut metadata = Metadata::new();
        metadata.insert("quantity".into(), json!(quantity));
        let (payment_intent_id, payment) = match (method, channel) {
            (PaymentMethod::External, Some(channel)) => {
                let intent_id = numbers.payment_intent_id(now);
                metadata.insert("payment_channel".into(), json!(channel));
                if let Some(url) = non_blank(request.payment_return_url) {
                    metadata.insert("payment_return_url".into(), json!(url));
                }
                let payment = NewOrderPayment {
                    provider: channel,
                    method: PaymentMethod::External.to_string(),
                    intent_id: Some(intent_id.clone()),
                    amount_cents: total,
                    currency: plan.currency.clone(),
                    metadata: Metadata::new(),
                };
                (Some(intent_id), Some(payment))
            },
            _ => (None, None),
        };
        let order = NewOrder {
            number: numbers.order_number(now),
            user_id: caller.user_id,
            plan_id: Some(plan.id),
            payment_method: method,
            total_cents: total,
            currency: plan.currency.clone(),
            payment_intent_id,
            metadata,
            plan_snapshot: plan.snapshot(),
            created_at: now,
        };
        let idempotency = key.map(|key| IdempotencyBinding { endpoint: CREATE_ORDER_ENDPOINT.to_string(), key });
        trace!("📦️ Creating order {} for {total} {} ({method})", order.number, order.currency);
        match self.db.create_order(NewOrderRequest { order, item, payment, idempotency }).await? {
            CreateOrderOutcome::Created { order, transaction } => {
                let balance = self.db.fetch_balance(caller.user_id).await?;
                Ok(CreateOrderResult { order, balance, transaction, replayed: false })
            },
            CreateOrderOutcome::AlreadyBound(order_id) => {
                info!("📦️ A concurrent request bound the idempotency key first. Returning order #{order_id}");
                self.replay(order_id).await
            },
        }
    }

    async fn replay(&self, order_id: i64) -> Result<CreateOrderResult, EngineError> {
        let order = self
            .db
            .fetch_order_detail(order_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Order {order_id}")))?;
        let balance = self.db.fetch_balance(order.order.user_id).await?;
        Ok(CreateOrderResult { order, balance, transaction: None, replayed: true })
    }

    /// Cancels one of the caller's own orders. Only unpaid orders and free orders can be cancelled this way, and no
    /// money moves. Cancelling an order that is already cancelled returns it unchanged.
    pub async fn cancel_order(
        &self,
        caller: &Caller,
        order_id: i64,
        reason: Option<String>,
    ) -> Result<CancelOrderResult, EngineError> {
        let deadline = self.ctx.deadline_for(Some(caller));
        let work = async {
            let order = self.fetch_order(order_id).await?;
            if order.user_id != caller.user_id {
                return Err(EngineError::Forbidden(format!("Order {} belongs to another user", order.number)));
            }
            let now = self.ctx.now();
            let request = CancelOrderRequest {
                order_id,
                actor: CancelActor::User,
                cancelled_by: USER_CANCELLER.to_string(),
                reason: non_blank(reason),
                cancelled_at: now,
                now,
            };
            let outcome = self.db.cancel_order(request).await?;
            let balance = self.db.fetch_balance(caller.user_id).await?;
            Ok::<_, EngineError>((outcome, balance))
        };
        let (outcome, balance) = self.ctx.run_order_operation("cancel", deadline, work).await?;
        self.publish_cancelled(&outcome, USER_CANCELLER).await;
        Ok(CancelOrderResult { order: outcome.into_order(), balance })
    }

    /// Closes an order as an admin. Orders that were paid must be refunded in full first.
    pub async fn admin_cancel_order(&self, caller: &Caller, request: AdminCancelRequest) -> Result<Order, EngineError> {
        caller.require_admin()?;
        let deadline = self.ctx.deadline_for(Some(caller));
        let now = self.ctx.now();
        let update = CancelOrderRequest {
            order_id: request.order_id,
            actor: CancelActor::Admin,
            cancelled_by: caller.email.clone(),
            reason: non_blank(request.reason),
            cancelled_at: request.cancelled_at.unwrap_or(now),
            now,
        };
        let outcome = self.ctx.run_order_operation("admin_cancel", deadline, self.db.cancel_order(update)).await?;
        self.publish_cancelled(&outcome, &caller.email).await;
        Ok(outcome.into_order())
    }

    /// Manually settles a `pending` order, e.g. after an offline payment. No money moves.
    pub async fn mark_paid(&self, caller: &Caller, request: MarkPaidRequest) -> Result<Order, EngineError> {
        caller.require_admin()?;
        let deadline = self.ctx.deadline_for(Some(caller));
        let now = self.ctx.now();
        let update = MarkPaidUpdate {
            order_id: request.order_id,
            payment_method: request.payment_method,
            paid_at: request.paid_at.unwrap_or(now),
            note: non_blank(request.note),
            reference: non_blank(request.reference),
            marked_by: caller.email.clone(),
            now,
        };
        let order = self.ctx.run_order_operation("mark_paid", deadline, self.db.mark_order_paid(update)).await?;
        info!("📦️ Order {} was marked as paid by {}", order.number, caller.email);
        self.ctx.producers().publish_order_paid(OrderPaidEvent::new(order.clone())).await;
        Ok(order)
    }

    /// Refunds part or all of a balance-paid order back to the owner's wallet. A refund that completes the order total
    /// also closes the order.
    pub async fn refund_order(&self, caller: &Caller, request: RefundRequest) -> Result<RefundResult, EngineError> {
        caller.require_admin()?;
        let deadline = self.ctx.deadline_for(Some(caller));
        let update = RefundOrderRequest {
            order_id: request.order_id,
            amount: request.amount_cents,
            reason: non_blank(request.reason),
            metadata: request.metadata.unwrap_or_default(),
            refunded_by: caller.email.clone(),
            now: self.ctx.now(),
        };
        let work = async {
            // Missing orders are NotFound, not a wallet or transition error
            self.fetch_order(update.order_id).await?;
            self.db.refund_order(update).await.map_err(EngineError::from)
        };
        let outcome = self.ctx.run_order_operation("refund", deadline, work).await;
        self.ctx.metrics().record_wallet_transaction(TransactionType::Refund, outcome.is_ok());
        let outcome = outcome?;
        info!(
            "📦️ {} refunded on order {} by {}. Order is now {}",
            outcome.refund.amount_cents, outcome.order.number, caller.email, outcome.order.status
        );
        let producers = self.ctx.producers();
        let event = OrderRefundedEvent::new(
            outcome.order.clone(),
            outcome.refund.clone(),
            outcome.receipt.transaction.clone(),
        );
        producers.publish_order_refunded(event).await;
        if outcome.order.status == OrderStatus::Cancelled {
            producers.publish_order_cancelled(OrderCancelledEvent::new(outcome.order.clone(), &caller.email)).await;
        }
        Ok(RefundResult {
            order: outcome.order,
            refund: outcome.refund,
            transaction: outcome.receipt.transaction,
            balance: outcome.receipt.balance,
        })
    }

    /// Applies a payment gateway callback. The callback must already have been authenticated, e.g. by
    /// [`crate::webhook::WebhookVerifier`].
    pub async fn payment_callback(&self, callback: PaymentCallback) -> Result<PaymentCallbackResult, EngineError> {
        let deadline = self.ctx.deadline_for(None);
        let paid_at = match callback.paid_at {
            Some(secs) => Some(DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
                EngineError::InvalidArgument(format!("{secs} is not a valid paid_at timestamp"))
            })?),
            None => None,
        };
        let update = PaymentCallbackUpdate {
            order_id: callback.order_id,
            payment_id: callback.payment_id,
            status: callback.status,
            reference: non_blank(callback.reference),
            failure_code: non_blank(callback.failure_code),
            failure_message: non_blank(callback.failure_message),
            paid_at,
            now: self.ctx.now(),
        };
        let work = async {
            self.fetch_order(update.order_id).await?;
            self.db.apply_payment_callback(update).await.map_err(EngineError::from)
        };
        let outcome = self.ctx.run_order_operation("callback", deadline, work).await?;
        if outcome.replayed {
            info!("📦️ Duplicate {} callback for order {} ignored", outcome.payment.status, outcome.order.number);
        } else {
            match outcome.order.status {
                OrderStatus::Paid => {
                    self.ctx.producers().publish_order_paid(OrderPaidEvent::new(outcome.order.clone())).await
                },
                OrderStatus::PaymentFailed => {
                    self.ctx.producers().publish_payment_failed(PaymentFailedEvent::new(outcome.order.clone())).await
                },
                _ => {},
            }
        }
        Ok(PaymentCallbackResult { order: outcome.order, payment: outcome.payment, replayed: outcome.replayed })
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Order, EngineError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| EngineError::NotFound(format!("Order {order_id}")))
    }

    async fn publish_cancelled(&self, outcome: &CancelOutcome, cancelled_by: &str) {
        if let CancelOutcome::Cancelled(order) = outcome {
            info!("📦️ Order {} cancelled by {cancelled_by}", order.number);
            let event = OrderCancelledEvent::new(order.clone(), cancelled_by);
            self.ctx.producers().publish_order_cancelled(event).await;
        }
    }
}

/// Treats empty and whitespace-only strings as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
