use std::fmt::Display;

use thiserror::Error;
use znp_common::Cents;

use crate::{
    api_gate::ApiGateError,
    db_types::OrderStatus,
    order_state::TransitionError,
    traits::{OrderGatewayError, StoreError, WalletError},
    webhook::WebhookError,
};

/// The coarse classification every engine error falls into. Transports map these onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Timeout,
    Internal,
    NotImplemented,
}

impl ErrorKind {
    /// The HTTP-style status code for this kind of error.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidArgument => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Timeout => 408,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
            ErrorKind::NotImplemented => 501,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
            ErrorKind::NotImplemented => "not_implemented",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Payment declined. Insufficient balance: {required} is required, but only {available} is available")]
    InsufficientBalance { required: Cents, available: Cents },
    #[error("Illegal order transition from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("The request deadline expired before the operation completed")]
    Timeout,
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidArgument(_)
            | EngineError::InsufficientBalance { .. }
            | EngineError::IllegalTransition { .. } => ErrorKind::InvalidArgument,
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Timeout => ErrorKind::Timeout,
            EngineError::DatabaseError(_) => ErrorKind::Internal,
            EngineError::NotImplemented(_) => ErrorKind::NotImplemented,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DatabaseError(s) => EngineError::DatabaseError(s),
            StoreError::QueryError(s) => EngineError::InvalidArgument(s),
        }
    }
}

impl From<WalletError> for EngineError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::DatabaseError(s) => EngineError::DatabaseError(s),
            WalletError::InsufficientBalance { required, available } => {
                EngineError::InsufficientBalance { required, available }
            },
            e @ (WalletError::ZeroAmount
            | WalletError::CurrencyMismatch { .. }
            | WalletError::Overflow
            | WalletError::InvalidRefund(_)) => EngineError::InvalidArgument(e.to_string()),
        }
    }
}

impl From<TransitionError> for EngineError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::IllegalTransition { from, to, .. } => EngineError::IllegalTransition { from, to },
            e => EngineError::InvalidArgument(e.to_string()),
        }
    }
}

impl From<OrderGatewayError> for EngineError {
    fn from(e: OrderGatewayError) -> Self {
        match e {
            OrderGatewayError::DatabaseError(s) => EngineError::DatabaseError(s),
            OrderGatewayError::OrderNotFound(id) => EngineError::NotFound(format!("Order {id}")),
            e @ OrderGatewayError::PaymentNotFound { .. } => EngineError::InvalidArgument(e.to_string()),
            e @ OrderGatewayError::OrderNumberExists(_) => EngineError::Conflict(e.to_string()),
            OrderGatewayError::Transition(e) => e.into(),
            OrderGatewayError::Wallet(e) => e.into(),
            OrderGatewayError::Store(e) => e.into(),
        }
    }
}

impl From<WebhookError> for EngineError {
    fn from(e: WebhookError) -> Self {
        match e {
            e @ WebhookError::SourceNotAllowed(_) => EngineError::Forbidden(e.to_string()),
            e @ WebhookError::InvalidBody(_) => EngineError::InvalidArgument(e.to_string()),
            e => EngineError::Unauthorized(e.to_string()),
        }
    }
}

impl From<ApiGateError> for EngineError {
    fn from(e: ApiGateError) -> Self {
        match e {
            ApiGateError::Store(e) => e.into(),
            e => EngineError::Unauthorized(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::DatabaseError(e.to_string())
    }
}
