use chrono::{DateTime, Utc};
use sqlx::{types::Json, SqliteConnection};
use znp_common::Cents;

use crate::db_types::{Metadata, OrderRefund};

#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_refund(
    order_id: i64,
    amount: Cents,
    reason: Option<&str>,
    reference: &str,
    balance_transaction_id: i64,
    metadata: &Metadata,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OrderRefund, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO order_refunds (
                order_id,
                amount_cents,
                reason,
                reference,
                balance_transaction_id,
                metadata,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(amount)
    .bind(reason)
    .bind(reference)
    .bind(balance_transaction_id)
    .bind(Json(metadata))
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_refunds_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderRefund>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_refunds WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}
