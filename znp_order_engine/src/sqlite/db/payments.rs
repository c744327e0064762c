use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{NewOrderPayment, OrderPayment, PaymentStatus};

pub(crate) async fn insert_payment(
    order_id: i64,
    payment: &NewOrderPayment,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OrderPayment, sqlx::Error> {
    let payment: OrderPayment = sqlx::query_as(
        r#"
            INSERT INTO order_payments (
                order_id,
                provider,
                method,
                intent_id,
                status,
                amount_cents,
                currency,
                metadata,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8, $8)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(&payment.provider)
    .bind(&payment.method)
    .bind(&payment.intent_id)
    .bind(payment.amount_cents)
    .bind(&payment.currency)
    .bind(Json(&payment.metadata))
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Pending payment #{} ({}) created for order #{order_id}", payment.id, payment.provider);
    Ok(payment)
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<OrderPayment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_payments WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_payments_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderPayment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_payments WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

/// Records the gateway's verdict on a payment attempt.
///
/// `processed_at` is only set the first time, so replayed callbacks keep the original processing time. Optional
/// fields the callback leaves out keep their stored values, and `updated_at` only moves when something changed. A
/// replayed callback therefore leaves the row exactly as it was.
pub(crate) async fn update_payment_result(
    id: i64,
    status: PaymentStatus,
    reference: Option<&str>,
    failure_code: Option<&str>,
    failure_message: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderPayment>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE order_payments SET
                status = $1,
                reference = COALESCE($2, reference),
                failure_code = COALESCE($3, failure_code),
                failure_message = COALESCE($4, failure_message),
                processed_at = COALESCE(processed_at, $5),
                updated_at = CASE
                    WHEN status IS $1
                        AND reference IS COALESCE($2, reference)
                        AND failure_code IS COALESCE($3, failure_code)
                        AND failure_message IS COALESCE($4, failure_message)
                        AND processed_at IS NOT NULL
                    THEN updated_at
                    ELSE $5
                END
            WHERE id = $6
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(reference)
    .bind(failure_code)
    .bind(failure_message)
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await
}
