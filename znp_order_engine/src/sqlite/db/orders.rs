use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};
use znp_common::Cents;

use crate::{
    db_types::{Metadata, NewOrder, NewOrderItem, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus},
    engine_api::order_objects::OrderQueryFilter,
    traits::OrderGatewayError,
};

/// Inserts a new order in the `pending` state. This is not atomic. Embed it in a transaction and pass `&mut *tx` as
/// the connection argument when the order must be written together with anything else.
pub(crate) async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderGatewayError> {
    let result = sqlx::query_as(
        r#"
            INSERT INTO orders (
                number,
                user_id,
                plan_id,
                status,
                payment_method,
                payment_status,
                total_cents,
                currency,
                payment_intent_id,
                metadata,
                plan_snapshot,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, 'pending', $4, 'pending', $5, $6, $7, $8, $9, $10, $10)
            RETURNING *;
        "#,
    )
    .bind(&order.number)
    .bind(order.user_id)
    .bind(order.plan_id)
    .bind(order.payment_method)
    .bind(order.total_cents)
    .bind(&order.currency)
    .bind(&order.payment_intent_id)
    .bind(Json(&order.metadata))
    .bind(Json(&order.plan_snapshot))
    .bind(order.created_at)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => Ok(order),
        Err(e) if super::is_unique_violation(&e) => Err(OrderGatewayError::OrderNumberExists(order.number.clone())),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn insert_item(
    order_id: i64,
    item: &NewOrderItem,
    subtotal: Cents,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO order_items (
                order_id,
                item_type,
                item_id,
                name,
                quantity,
                unit_price_cents,
                currency,
                subtotal_cents,
                metadata,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(&item.item_type)
    .bind(item.item_id)
    .bind(&item.name)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(&item.currency)
    .bind(subtotal)
    .bind(Json(&item.metadata))
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_order_by_number(number: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE number = $1").bind(number).fetch_optional(conn).await
}

pub async fn fetch_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

/// Takes the write lock and returns the current state of the order.
///
/// The touch leaves `updated_at` unchanged. It only exists so that the read happens under the write lock.
pub(crate) async fn lock_order(id: i64, conn: &mut SqliteConnection) -> Result<Order, OrderGatewayError> {
    let order: Option<Order> = sqlx::query_as("UPDATE orders SET updated_at = updated_at WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    order.ok_or(OrderGatewayError::OrderNotFound(id))
}

/// The set of columns to change on an order. Fields left as `None` are not touched.
#[derive(Debug, Clone, Default)]
pub(crate) struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_reference: Option<String>,
    pub payment_failure_code: Option<String>,
    pub payment_failure_message: Option<String>,
    pub refunded_cents: Option<Cents>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub metadata: Option<Metadata>,
}

impl OrderUpdate {
    pub fn status(status: OrderStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    /// Paid and settled. Used by every path that marks an order paid.
    pub fn paid(paid_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(OrderStatus::Paid),
            payment_status: Some(PaymentStatus::Succeeded),
            paid_at: Some(paid_at),
            ..Default::default()
        }
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn with_payment_method(mut self, method: Option<PaymentMethod>) -> Self {
        self.payment_method = method;
        self
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.payment_reference = reference;
        self
    }

    pub fn with_failure(mut self, code: Option<String>, message: Option<String>) -> Self {
        self.payment_failure_code = code;
        self.payment_failure_message = message;
        self
    }

    pub fn with_refunded(mut self, refunded_cents: Cents, refunded_at: DateTime<Utc>) -> Self {
        self.refunded_cents = Some(refunded_cents);
        self.refunded_at = Some(refunded_at);
        self
    }

    pub fn with_cancelled_at(mut self, cancelled_at: DateTime<Utc>) -> Self {
        self.cancelled_at = Some(cancelled_at);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

pub(crate) async fn update_order(
    id: i64,
    update: OrderUpdate,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderGatewayError> {
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET updated_at = ");
    builder.push_bind(now);
    let before = builder.sql().len();
    if let Some(status) = update.status {
        builder.push(", status = ");
        builder.push_bind(status);
    }
    if let Some(status) = update.payment_status {
        builder.push(", payment_status = ");
        builder.push_bind(status);
    }
    if let Some(method) = update.payment_method {
        builder.push(", payment_method = ");
        builder.push_bind(method);
    }
    if let Some(reference) = update.payment_reference {
        builder.push(", payment_reference = ");
        builder.push_bind(reference);
    }
    if let Some(code) = update.payment_failure_code {
        builder.push(", payment_failure_code = ");
        builder.push_bind(code);
    }
    if let Some(message) = update.payment_failure_message {
        builder.push(", payment_failure_message = ");
        builder.push_bind(message);
    }
    if let Some(refunded) = update.refunded_cents {
        builder.push(", refunded_cents = ");
        builder.push_bind(refunded);
    }
    if let Some(paid_at) = update.paid_at {
        builder.push(", paid_at = ");
        builder.push_bind(paid_at);
    }
    if let Some(cancelled_at) = update.cancelled_at {
        builder.push(", cancelled_at = ");
        builder.push_bind(cancelled_at);
    }
    if let Some(refunded_at) = update.refunded_at {
        builder.push(", refunded_at = ");
        builder.push_bind(refunded_at);
    }
    if let Some(metadata) = update.metadata {
        builder.push(", metadata = ");
        builder.push_bind(Json(metadata));
    }
    if builder.sql().len() == before {
        debug!("🗃️ Empty update for order #{id}. Only the timestamp will change.");
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let order: Option<Order> = builder.build_query_as().fetch_optional(conn).await?;
    order.ok_or(OrderGatewayError::OrderNotFound(id))
}

/// Fetches one page of orders matching the filter, along with the total number of matches. Ties on the sort column
/// are broken by `id` in the same direction.
pub async fn search_orders(
    query: &OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<(Vec<Order>, i64), sqlx::Error> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM orders");
    push_filters(&mut count, query);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;

    let mut builder = QueryBuilder::new("SELECT * FROM orders");
    push_filters(&mut builder, query);
    let direction = query.direction.keyword();
    builder.push(format!(" ORDER BY {} {direction}, id {direction} LIMIT ", query.sort.column()));
    builder.push_bind(query.per_page);
    builder.push(" OFFSET ");
    builder.push_bind(query.offset());
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {} of {total}", orders.len());
    Ok((orders, total))
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &OrderQueryFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ");
        builder.push_bind(user_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    if let Some(method) = query.payment_method {
        builder.push(" AND payment_method = ");
        builder.push_bind(method);
    }
    if let Some(status) = query.payment_status {
        builder.push(" AND payment_status = ");
        builder.push_bind(status);
    }
    if let Some(number) = &query.number {
        builder.push(" AND number = ");
        builder.push_bind(number.clone());
    }
}
