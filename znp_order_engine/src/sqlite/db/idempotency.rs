use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::IdempotencyRecord;

pub async fn fetch_record(
    user_id: i64,
    endpoint: &str,
    key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<IdempotencyRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_idempotency_keys WHERE user_id = $1 AND endpoint = $2 AND key = $3")
        .bind(user_id)
        .bind(endpoint)
        .bind(key)
        .fetch_optional(conn)
        .await
}

/// Binds the key to the order. A unique-constraint violation means that another request bound the key first.
pub(crate) async fn bind_key(
    user_id: i64,
    endpoint: &str,
    key: &str,
    order_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<IdempotencyRecord, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO order_idempotency_keys (user_id, endpoint, key, order_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(endpoint)
    .bind(key)
    .bind(order_id)
    .bind(now)
    .fetch_one(conn)
    .await
}
