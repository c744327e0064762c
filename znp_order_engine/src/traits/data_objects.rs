use chrono::{DateTime, Utc};
use znp_common::Cents;

use crate::{
    db_types::{
        BalanceTransaction,
        Metadata,
        NewOrder,
        NewOrderItem,
        NewOrderPayment,
        Order,
        OrderPayment,
        OrderRefund,
        PaymentMethod,
        PaymentStatus,
        UserBalance,
    },
    engine_api::order_objects::OrderDetail,
};

/// The balance and the ledger row written by one successful wallet movement.
#[derive(Debug, Clone)]
pub struct WalletReceipt {
    pub balance: UserBalance,
    pub transaction: BalanceTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyBinding {
    pub endpoint: String,
    pub key: String,
}

/// Everything the backend needs to write a new order. The caller has already validated the plan and the quantity.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub order: NewOrder,
    pub item: NewOrderItem,
    /// The pending gateway payment, for externally paid orders.
    pub payment: Option<NewOrderPayment>,
    pub idempotency: Option<IdempotencyBinding>,
}

impl NewOrderRequest {
    pub fn total(&self) -> Cents {
        self.order.total_cents
    }

    pub fn is_wallet_purchase(&self) -> bool {
        self.order.payment_method == PaymentMethod::Balance && self.order.total_cents.is_positive()
    }
}

#[derive(Debug, Clone)]
pub enum CreateOrderOutcome {
    Created { order: OrderDetail, transaction: Option<BalanceTransaction> },
    /// A concurrent request with the same idempotency key committed first. Holds the id of its order.
    AlreadyBound(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelActor {
    User,
    Admin,
}

#[derive(Debug, Clone)]
pub struct CancelOrderRequest {
    pub order_id: i64,
    pub actor: CancelActor,
    /// Recorded as `cancelled_by`: `user`, or the admin's email
    pub cancelled_by: String,
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled(Order),
    AlreadyCancelled(Order),
}

impl CancelOutcome {
    pub fn order(&self) -> &Order {
        match self {
            CancelOutcome::Cancelled(o) | CancelOutcome::AlreadyCancelled(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            CancelOutcome::Cancelled(o) | CancelOutcome::AlreadyCancelled(o) => o,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarkPaidUpdate {
    pub order_id: i64,
    pub payment_method: Option<PaymentMethod>,
    pub paid_at: DateTime<Utc>,
    pub note: Option<String>,
    pub reference: Option<String>,
    pub marked_by: String,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefundOrderRequest {
    pub order_id: i64,
    pub amount: Cents,
    pub reason: Option<String>,
    pub metadata: Metadata,
    pub refunded_by: String,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub order: Order,
    pub refund: OrderRefund,
    pub receipt: WalletReceipt,
}

#[derive(Debug, Clone)]
pub struct PaymentCallbackUpdate {
    pub order_id: i64,
    pub payment_id: i64,
    pub status: PaymentStatus,
    pub reference: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub order: Order,
    pub payment: OrderPayment,
    pub replayed: bool,
}
