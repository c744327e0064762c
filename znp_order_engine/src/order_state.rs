//! # Order lifecycle
//!
//! Every status change the engine makes is checked here first. The functions in this module are pure: they look at an
//! [`Order`] and the requested change, and either describe what must be written, or explain why the change is illegal.
//! Backends call them a second time inside the write transaction, against the freshly locked order row, so a decision
//! is never made on stale data.
//!
//! ```text
//!   pending ──────────┬──► paid ──┬──► partially_refunded ──► refunded ──► cancelled
//!      │              │     │     └─────────────────────────────▲
//!      │   pending_payment ─┘
//!      │        │  │
//!      │        │  └──► payment_failed ──► cancelled
//!      └────────┴──────────────────────────► cancelled
//! ```
//!
//! A paid order with a zero total may also be cancelled directly, since there is nothing to refund.
use log::trace;
use thiserror::Error;
use znp_common::Cents;

use crate::db_types::{Order, OrderStatus, PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Order {number} cannot move from {from} to {to}")]
    IllegalTransition { number: String, from: OrderStatus, to: OrderStatus },
    #[error("Order {0} has been paid and must be fully refunded before it can be cancelled")]
    RefundRequired(String),
    #[error("Order {0} is not refundable: {1}")]
    NotRefundable(String, String),
    #[error("Refund amount must be positive, but was {0}")]
    NonPositiveRefund(Cents),
    #[error("Refund of {requested} exceeds the remaining refundable amount of {remaining}")]
    RefundTooLarge { requested: Cents, remaining: Cents },
    #[error("Order {number} already has a {existing} payment and cannot accept a {requested} callback")]
    ConflictingCallback { number: String, existing: PaymentStatus, requested: PaymentStatus },
    #[error("A payment callback must report a final status, not {0}")]
    NonFinalCallback(PaymentStatus),
}

/// True if `from → to` is an edge of the order lifecycle, ignoring the free-order closure.
pub fn is_legal_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Paid)
            | (Pending, Cancelled)
            | (PendingPayment, Paid)
            | (PendingPayment, PaymentFailed)
            | (PendingPayment, Cancelled)
            | (Paid, PartiallyRefunded)
            | (Paid, Refunded)
            | (PartiallyRefunded, Refunded)
            | (Refunded, Cancelled)
            | (PaymentFailed, Cancelled)
    )
}

pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Cancelled | OrderStatus::Refunded)
}

fn ensure_transition(order: &Order, to: OrderStatus) -> Result<(), TransitionError> {
    let from = order.status;
    let free_closure = from == OrderStatus::Paid && to == OrderStatus::Cancelled && order.is_free();
    if is_legal_transition(from, to) || free_closure {
        Ok(())
    } else {
        Err(TransitionError::IllegalTransition { number: order.number.clone(), from, to })
    }
}

//--------------------------------------        Cancel         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDecision {
    /// The order is already cancelled. Cancelling is idempotent, so nothing is written.
    AlreadyCancelled,
    Cancel,
}

/// Users may only cancel orders that have not been charged, or free orders.
pub fn check_user_cancel(order: &Order) -> Result<CancelDecision, TransitionError> {
    match order.status {
        OrderStatus::Cancelled => Ok(CancelDecision::AlreadyCancelled),
        OrderStatus::Pending => Ok(CancelDecision::Cancel),
        OrderStatus::Paid if order.is_free() => Ok(CancelDecision::Cancel),
        from => Err(TransitionError::IllegalTransition {
            number: order.number.clone(),
            from,
            to: OrderStatus::Cancelled,
        }),
    }
}

/// Admins can close any order the lifecycle allows, but paid money must be refunded before the order is closed.
pub fn check_admin_cancel(order: &Order) -> Result<CancelDecision, TransitionError> {
    if order.status == OrderStatus::Cancelled {
        return Ok(CancelDecision::AlreadyCancelled);
    }
    if order.status == OrderStatus::Paid && order.refunded_cents < order.total_cents {
        return Err(TransitionError::RefundRequired(order.number.clone()));
    }
    ensure_transition(order, OrderStatus::Cancelled)?;
    Ok(CancelDecision::Cancel)
}

//--------------------------------------        Refund         ---------------------------------------------------------
/// The result of applying a refund to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundPlan {
    pub refunded_cents: Cents,
    /// The status the order holds after the refund. For a completed refund this is `cancelled`.
    pub final_status: OrderStatus,
    /// True when this refund brings `refunded_cents` up to the order total.
    pub completes_refund: bool,
}

pub fn plan_refund(order: &Order, amount: Cents) -> Result<RefundPlan, TransitionError> {
    let number = order.number.clone();
    if !amount.is_positive() {
        return Err(TransitionError::NonPositiveRefund(amount));
    }
    if !matches!(order.status, OrderStatus::Paid | OrderStatus::PartiallyRefunded) {
        return Err(TransitionError::NotRefundable(number, format!("its status is {}", order.status)));
    }
    if !order.total_cents.is_positive() {
        return Err(TransitionError::NotRefundable(number, "it is a free order".into()));
    }
    if order.payment_method != PaymentMethod::Balance {
        return Err(TransitionError::NotRefundable(number, "only balance payments can be refunded".into()));
    }
    let remaining = order.remaining_cents();
    if !remaining.is_positive() {
        return Err(TransitionError::NotRefundable(number, "it has been refunded in full".into()));
    }
    if amount > remaining {
        return Err(TransitionError::RefundTooLarge { requested: amount, remaining });
    }
    let refunded_cents = order.refunded_cents + amount;
    let plan = if refunded_cents < order.total_cents {
        if order.status != OrderStatus::PartiallyRefunded {
            ensure_transition(order, OrderStatus::PartiallyRefunded)?;
        }
        RefundPlan { refunded_cents, final_status: OrderStatus::PartiallyRefunded, completes_refund: false }
    } else {
        ensure_transition(order, OrderStatus::Refunded)?;
        RefundPlan { refunded_cents, final_status: OrderStatus::Cancelled, completes_refund: true }
    };
    trace!("📦️ Refund of {amount} on order {} planned: {plan:?}", order.number);
    Ok(plan)
}

//--------------------------------------      Mark paid        ---------------------------------------------------------
pub fn check_mark_paid(order: &Order) -> Result<(), TransitionError> {
    if order.status != OrderStatus::Pending {
        return Err(TransitionError::IllegalTransition {
            number: order.number.clone(),
            from: order.status,
            to: OrderStatus::Paid,
        });
    }
    Ok(())
}

//--------------------------------------   Payment callback    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDecision {
    /// Move the order into the given status.
    Apply(OrderStatus),
    /// The order already reflects this outcome. Only the payment row is refreshed.
    Replay,
}

pub fn plan_callback(order: &Order, status: PaymentStatus) -> Result<CallbackDecision, TransitionError> {
    let target = match status {
        PaymentStatus::Succeeded => OrderStatus::Paid,
        PaymentStatus::Failed => OrderStatus::PaymentFailed,
        PaymentStatus::Pending => return Err(TransitionError::NonFinalCallback(status)),
    };
    if order.payment_method == PaymentMethod::External && order.payment_status.is_final() {
        if order.payment_status == status {
            return Ok(CallbackDecision::Replay);
        }
        return Err(TransitionError::ConflictingCallback {
            number: order.number.clone(),
            existing: order.payment_status,
            requested: status,
        });
    }
    if order.status != OrderStatus::PendingPayment {
        return Err(TransitionError::IllegalTransition { number: order.number.clone(), from: order.status, to: target });
    }
    Ok(CallbackDecision::Apply(target))
}
