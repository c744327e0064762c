use chrono::{DateTime, Utc};
use thiserror::Error;
use znp_common::Cents;

use crate::{db_types::NewBalanceTransaction, traits::WalletReceipt};

#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("A wallet transaction cannot have a zero amount")]
    ZeroAmount,
    #[error("Insufficient balance. {required} is required, but only {available} is available")]
    InsufficientBalance { required: Cents, available: Cents },
    #[error("The wallet is held in {expected}, but the transaction is in {actual}")]
    CurrencyMismatch { expected: String, actual: String },
    #[error("The transaction would overflow the wallet balance")]
    Overflow,
    #[error("Invalid refund: {0}")]
    InvalidRefund(String),
}

impl From<sqlx::Error> for WalletError {
    fn from(e: sqlx::Error) -> Self {
        WalletError::DatabaseError(e.to_string())
    }
}

/// The single primitive that moves money in or out of a wallet.
#[allow(async_fn_in_trait)]
pub trait WalletManagement {
    /// In one atomic transaction: locks the user's balance row (creating a zero balance if there is none), applies
    /// `tx.amount_cents`, appends the ledger row carrying the new running balance, and points the balance at it.
    ///
    /// A zero amount is rejected, as is any movement that would take the balance below zero. Neither leaves a trace.
    async fn apply_transaction(
        &self,
        user_id: i64,
        tx: NewBalanceTransaction,
        now: DateTime<Utc>,
    ) -> Result<WalletReceipt, WalletError>;
}
