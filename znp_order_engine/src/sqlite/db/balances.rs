use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use super::ledger;
use crate::{
    db_types::{NewBalanceTransaction, TransactionType, UserBalance},
    traits::{WalletError, WalletReceipt},
};

pub async fn fetch_balance(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<UserBalance>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM user_balances WHERE user_id = $1").bind(user_id).fetch_optional(conn).await
}

/// Takes the write lock on the user's balance row and returns it, creating a zero balance in `currency` first if the
/// user has none.
///
/// The upsert always writes, even when the row exists, so that the lock is taken before the balance is read.
pub(crate) async fn lock_balance(
    user_id: i64,
    currency: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<UserBalance, sqlx::Error> {
    let balance = sqlx::query_as(
        r#"
            INSERT INTO user_balances (user_id, balance_cents, currency, created_at, updated_at)
            VALUES ($1, 0, $2, $3, $3)
            ON CONFLICT (user_id) DO UPDATE SET balance_cents = balance_cents
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(currency)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(balance)
}

/// Applies a wallet movement. This must run inside a transaction: the caller commits, or drops the transaction to
/// discard every write made here.
///
/// `default_currency` is only used when the user has no wallet yet and the transaction does not name a currency.
///
/// The ledger row and the balance are stamped with `now`, or with the balance's last update if that is later, so
/// that ledger timestamps never run backwards relative to commit order. Callers should use the timestamps in the
/// receipt rather than `now`.
pub(crate) async fn apply_transaction(
    user_id: i64,
    tx: &NewBalanceTransaction,
    default_currency: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<WalletReceipt, WalletError> {
    if tx.amount_cents.is_zero() {
        return Err(WalletError::ZeroAmount);
    }
    let currency = tx.currency.as_deref().unwrap_or(default_currency);
    let balance = lock_balance(user_id, currency, now, conn).await?;
    let now = now.max(balance.updated_at);
    trace!("💰️ Wallet for user #{user_id} locked with balance {} {}", balance.balance_cents, balance.currency);
    if let Some(requested) = tx.currency.as_deref() {
        if requested != balance.currency {
            return Err(WalletError::CurrencyMismatch { expected: balance.currency, actual: requested.to_string() });
        }
    }
    let new_balance = balance.balance_cents.checked_add(tx.amount_cents).ok_or(WalletError::Overflow)?;
    if new_balance.is_negative() {
        debug!(
            "💰️ Declined {} of {} for user #{user_id}. Only {} is available",
            tx.tx_type, -tx.amount_cents, balance.balance_cents
        );
        return Err(WalletError::InsufficientBalance { required: -tx.amount_cents, available: balance.balance_cents });
    }
    let transaction = ledger::insert_transaction(user_id, tx, &balance.currency, new_balance, now, conn).await?;
    let balance: UserBalance = sqlx::query_as(
        r#"
            UPDATE user_balances SET balance_cents = $1, last_transaction_id = $2, updated_at = $3
            WHERE user_id = $4
            RETURNING *;
        "#,
    )
    .bind(new_balance)
    .bind(transaction.id)
    .bind(now)
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    debug!(
        "💰️ {} of {} applied to user #{user_id}. Ledger entry #{}, balance now {} {}",
        transaction.tx_type, transaction.amount_cents, transaction.id, balance.balance_cents, balance.currency
    );
    Ok(WalletReceipt { balance, transaction })
}

/// Credits a refund to the user's wallet. The transaction type is always `refund` and the amount must be positive.
pub(crate) async fn record_refund(
    user_id: i64,
    mut tx: NewBalanceTransaction,
    default_currency: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<WalletReceipt, WalletError> {
    if !tx.amount_cents.is_positive() {
        return Err(WalletError::InvalidRefund(format!("refund amount must be positive, not {}", tx.amount_cents)));
    }
    tx.tx_type = TransactionType::Refund;
    apply_transaction(user_id, &tx, default_currency, now, conn).await
}
