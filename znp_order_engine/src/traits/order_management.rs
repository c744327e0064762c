use crate::{
    db_types::{Order, OrderPayment, OrderRefund},
    engine_api::order_objects::{OrderDetail, OrderQueryFilter},
    traits::StoreError,
};

#[allow(async_fn_in_trait)]
pub trait OrderStore {
    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, StoreError>;

    /// Fetches the order along with its items, refunds and payment attempts.
    async fn fetch_order_detail(&self, order_id: i64) -> Result<Option<OrderDetail>, StoreError>;

    async fn fetch_order_by_number(&self, number: &str) -> Result<Option<Order>, StoreError>;

    /// Returns one page of orders matching the filter, and the total number of matches.
    async fn search_orders(&self, query: &OrderQueryFilter) -> Result<(Vec<Order>, i64), StoreError>;

    /// Returns the order bound to an idempotency key, if the key has been used by this user on this endpoint.
    async fn fetch_order_for_idempotency_key(
        &self,
        user_id: i64,
        endpoint: &str,
        key: &str,
    ) -> Result<Option<Order>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait PaymentStore {
    async fn fetch_payment(&self, payment_id: i64) -> Result<Option<OrderPayment>, StoreError>;

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<OrderPayment>, StoreError>;

    async fn fetch_refunds_for_order(&self, order_id: i64) -> Result<Vec<OrderRefund>, StoreError>;
}
