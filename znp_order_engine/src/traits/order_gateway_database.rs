use thiserror::Error;

use crate::{
    db_types::Order,
    order_state::TransitionError,
    traits::{
        data_objects::{
            CallbackOutcome,
            CancelOrderRequest,
            CancelOutcome,
            CreateOrderOutcome,
            MarkPaidUpdate,
            NewOrderRequest,
            PaymentCallbackUpdate,
            RefundOrderRequest,
            RefundOutcome,
        },
        BalanceStore,
        LedgerStore,
        OrderStore,
        PaymentStore,
        PlanCatalog,
        StoreError,
        UserDirectory,
        WalletError,
        WalletManagement,
    },
};

/// This trait defines the highest level of behaviour for backends supporting the order and wallet engine.
///
/// Every method runs as a single database transaction. The backend re-validates the requested change against the
/// locked order row using [`crate::order_state`], so a check made by the caller on an older copy of the order can never
/// let an illegal transition through. Dropping a returned future before it resolves rolls the transaction back.
#[allow(async_fn_in_trait)]
pub trait OrderGatewayDatabase:
    Clone + BalanceStore + LedgerStore + OrderStore + PaymentStore + PlanCatalog + UserDirectory + WalletManagement
{
    /// The URL of the database
    fn url(&self) -> &str;

    /// Writes a new order, its single item, and then, depending on the payment method:
    /// * free balance orders are marked paid immediately,
    /// * balance orders charge the wallet (`order:<number>`) and are marked paid with the ledger timestamp,
    /// * external orders get a pending gateway payment and wait in `pending_payment`.
    ///
    /// Finally the idempotency key, if any, is bound to the order. If another request bound the same key first, the
    /// whole transaction is rolled back and [`CreateOrderOutcome::AlreadyBound`] is returned.
    async fn create_order(&self, request: NewOrderRequest) -> Result<CreateOrderOutcome, OrderGatewayError>;

    /// Moves the order to `cancelled`. Cancelling a cancelled order is a no-op. No money moves.
    async fn cancel_order(&self, request: CancelOrderRequest) -> Result<CancelOutcome, OrderGatewayError>;

    /// Manually settles a `pending` order. No money moves.
    async fn mark_order_paid(&self, update: MarkPaidUpdate) -> Result<Order, OrderGatewayError>;

    /// Credits the refund to the order owner's wallet, records it against the order and promotes the order status.
    /// A refund that completes the order total also closes the order.
    async fn refund_order(&self, request: RefundOrderRequest) -> Result<RefundOutcome, OrderGatewayError>;

    /// Applies a verified gateway callback to the order and the matching payment row. Replays of an already-applied
    /// outcome leave the order untouched.
    async fn apply_payment_callback(&self, update: PaymentCallbackUpdate) -> Result<CallbackOutcome, OrderGatewayError>;

    async fn close(&mut self) -> Result<(), OrderGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderGatewayError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderNotFound(i64),
    #[error("Payment {payment_id} does not belong to order {order_id}")]
    PaymentNotFound { order_id: i64, payment_id: i64 },
    #[error("An order with number {0} already exists")]
    OrderNumberExists(String),
    #[error("{0}")]
    Transition(#[from] TransitionError),
    #[error("{0}")]
    Wallet(#[from] WalletError),
    #[error("{0}")]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for OrderGatewayError {
    fn from(e: sqlx::Error) -> Self {
        OrderGatewayError::DatabaseError(e.to_string())
    }
}
