use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use znp_common::Cents;

use crate::{
    db_types::{BalanceTransaction, Metadata, NewBalanceTransaction},
    engine_api::order_objects::TransactionQuery,
};

/// Appends a row to the ledger. This is the only statement in the crate that writes to `balance_transactions`.
pub(crate) async fn insert_transaction(
    user_id: i64,
    tx: &NewBalanceTransaction,
    currency: &str,
    balance_after: Cents,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<BalanceTransaction, sqlx::Error> {
    let row = sqlx::query_as(
        r#"
            INSERT INTO balance_transactions (
                user_id,
                type,
                amount_cents,
                currency,
                balance_after_cents,
                reference,
                description,
                metadata,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(tx.tx_type)
    .bind(tx.amount_cents)
    .bind(currency)
    .bind(balance_after)
    .bind(&tx.reference)
    .bind(&tx.description)
    .bind(sqlx::types::Json(&tx.metadata))
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_transaction(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<BalanceTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM balance_transactions WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// Returns one page of a user's ledger, newest first by `(created_at, id)`, along with the total number of matching
/// rows.
pub async fn fetch_transactions(
    user_id: i64,
    query: &TransactionQuery,
    conn: &mut SqliteConnection,
) -> Result<(Vec<BalanceTransaction>, i64), sqlx::Error> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM balance_transactions");
    push_filters(&mut count, user_id, query);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;

    let mut builder = QueryBuilder::new("SELECT * FROM balance_transactions");
    push_filters(&mut builder, user_id, query);
    builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    builder.push_bind(query.per_page);
    builder.push(" OFFSET ");
    builder.push_bind(query.offset());
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows = builder.build_query_as::<BalanceTransaction>().fetch_all(conn).await?;
    Ok((rows, total))
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, user_id: i64, query: &TransactionQuery) {
    builder.push(" WHERE user_id = ");
    builder.push_bind(user_id);
    if let Some(tx_type) = query.tx_type {
        builder.push(" AND type = ");
        builder.push_bind(tx_type);
    }
}

/// The sum of every ledger amount for the user. Used to audit the running balance.
pub async fn ledger_sum(user_id: i64, conn: &mut SqliteConnection) -> Result<Cents, sqlx::Error> {
    let sum: Option<i64> = sqlx::query_scalar("SELECT SUM(amount_cents) FROM balance_transactions WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(conn)
        .await?;
    Ok(Cents::from(sum.unwrap_or(0)))
}

pub(crate) fn refund_metadata(metadata: &Metadata, order_id: i64, refund_reason: Option<&str>) -> Metadata {
    let mut result = metadata.clone();
    result.insert("order_id".into(), order_id.into());
    if let Some(reason) = refund_reason {
        result.insert("reason".into(), reason.into());
    }
    result
}
