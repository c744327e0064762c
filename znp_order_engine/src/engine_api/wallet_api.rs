use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewBalanceTransaction, TransactionType, UserBalance},
    engine_api::{context::EngineContext, errors::EngineError},
    traits::{BalanceStore, WalletError, WalletManagement, WalletReceipt},
};

/// `WalletApi` is the only way balances change outside of the order flows. Recharges, manual adjustments and standalone
/// refunds all go through [`WalletApi::apply_transaction`].
#[derive(Clone)]
pub struct WalletApi<B> {
    db: B,
    ctx: EngineContext,
}

impl<B: Debug> Debug for WalletApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WalletApi ({:?})", self.db)
    }
}

impl<B> WalletApi<B> {
    pub fn new(db: B, ctx: EngineContext) -> Self {
        Self { db, ctx }
    }
}

impl<B> WalletApi<B>
where B: WalletManagement + BalanceStore
{
    /// Moves money in or out of the user's wallet and appends the matching ledger row. See
    /// [`WalletManagement::apply_transaction`] for the guarantees.
    pub async fn apply_transaction(
        &self,
        user_id: i64,
        tx: NewBalanceTransaction,
    ) -> Result<WalletReceipt, EngineError> {
        let tx_type = tx.tx_type;
        let now = self.ctx.now();
        let deadline = self.ctx.deadline_for(None);
        let result = self.ctx.within_deadline(deadline, self.db.apply_transaction(user_id, tx, now)).await;
        self.ctx.metrics().record_wallet_transaction(tx_type, result.is_ok());
        match &result {
            Ok(receipt) => info!(
                "💰️ {tx_type} of {} for user #{user_id} applied. Balance is now {} {}",
                receipt.transaction.amount_cents, receipt.balance.balance_cents, receipt.balance.currency
            ),
            Err(e) => debug!("💰️ {tx_type} for user #{user_id} was rejected. {e}"),
        }
        result
    }

    /// Credits a refund to the user's wallet. The ledger row always has type `refund`, and the amount must be positive.
    pub async fn record_refund(
        &self,
        user_id: i64,
        mut tx: NewBalanceTransaction,
    ) -> Result<WalletReceipt, EngineError> {
        if !tx.amount_cents.is_positive() {
            let err = WalletError::InvalidRefund(format!("refund amount must be positive, not {}", tx.amount_cents));
            self.ctx.metrics().record_wallet_transaction(TransactionType::Refund, false);
            return Err(err.into());
        }
        tx.tx_type = TransactionType::Refund;
        self.apply_transaction(user_id, tx).await
    }

    pub async fn balance(&self, user_id: i64) -> Result<UserBalance, EngineError> {
        let balance = self.db.fetch_balance(user_id).await?;
        Ok(balance)
    }
}
