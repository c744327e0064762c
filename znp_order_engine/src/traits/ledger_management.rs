use thiserror::Error;

use crate::{
    db_types::{BalanceTransaction, UserBalance},
    engine_api::order_objects::TransactionQuery,
};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait BalanceStore {
    /// Fetches the wallet balance for the user. Users that have never had a wallet movement get a synthetic zero
    /// balance in the default currency. The synthetic balance is not saved.
    async fn fetch_balance(&self, user_id: i64) -> Result<UserBalance, StoreError>;
}

/// Read access to the ledger. Ledger rows are never changed or removed once written.
#[allow(async_fn_in_trait)]
pub trait LedgerStore {
    /// Returns one page of the user's ledger, newest first, and the total number of rows matching the query.
    async fn fetch_transactions(
        &self,
        user_id: i64,
        query: &TransactionQuery,
    ) -> Result<(Vec<BalanceTransaction>, i64), StoreError>;

    async fn fetch_transaction(&self, id: i64) -> Result<Option<BalanceTransaction>, StoreError>;
}
