use serde::{Deserialize, Serialize};

use crate::db_types::{BalanceTransaction, Order, OrderRefund};

/// Emitted after an order moves into `paid`, whichever path got it there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order: Order,
    /// `user`, an admin's email, or the admin that completed the final refund.
    pub cancelled_by: String,
}

impl OrderCancelledEvent {
    pub fn new(order: Order, cancelled_by: impl Into<String>) -> Self {
        Self { order, cancelled_by: cancelled_by.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRefundedEvent {
    pub order: Order,
    pub refund: OrderRefund,
    pub transaction: BalanceTransaction,
}

impl OrderRefundedEvent {
    pub fn new(order: Order, refund: OrderRefund, transaction: BalanceTransaction) -> Self {
        Self { order, refund, transaction }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailedEvent {
    pub order: Order,
}

impl PaymentFailedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}
