use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use znp_common::Cents;

use crate::db_types::{
    BalanceTransaction,
    Metadata,
    Order,
    OrderItem,
    OrderPayment,
    OrderRefund,
    OrderStatus,
    PaymentMethod,
    PaymentStatus,
    TransactionType,
    UserBalance,
    UserSummary,
};

pub const DEFAULT_PER_PAGE: i64 = 20;

//--------------------------------------     Query filters     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSort {
    #[default]
    Created,
    Updated,
    Total,
}

impl OrderSort {
    pub fn column(&self) -> &'static str {
        match self {
            OrderSort::Created => "created_at",
            OrderSort::Updated => "updated_at",
            OrderSort::Total => "total_cents",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Search criteria for orders. Admin searches may filter on any user; user searches are always pinned to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub user_id: Option<i64>,
    pub status: Option<OrderStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub number: Option<String>,
    pub sort: OrderSort,
    pub direction: SortDirection,
    pub page: i64,
    pub per_page: i64,
}

impl OrderQueryFilter {
    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn with_number<S: Into<String>>(mut self, number: S) -> Self {
        self.number = Some(number.into());
        self
    }

    pub fn sorted_by(mut self, sort: OrderSort, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    pub fn with_page(mut self, page: i64, per_page: i64) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    /// Clamps the paging parameters into `1..` and `1..=max_per_page`.
    pub fn normalized(mut self, max_per_page: i64) -> Self {
        (self.page, self.per_page) = normalize_page(self.page, self.per_page, max_per_page);
        self
    }

    pub fn offset(&self) -> i64 {
        page_offset(self.page, self.per_page)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionQuery {
    pub page: i64,
    pub per_page: i64,
    #[serde(rename = "type")]
    pub tx_type: Option<TransactionType>,
}

impl TransactionQuery {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self { page, per_page, tx_type: None }
    }

    pub fn with_type(mut self, tx_type: TransactionType) -> Self {
        self.tx_type = Some(tx_type);
        self
    }

    pub fn normalized(mut self, max_per_page: i64) -> Self {
        (self.page, self.per_page) = normalize_page(self.page, self.per_page, max_per_page);
        self
    }

    pub fn offset(&self) -> i64 {
        page_offset(self.page, self.per_page)
    }
}

/// Pages past the end of the result set saturate instead of overflowing. They simply return no rows.
fn page_offset(page: i64, per_page: i64) -> i64 {
    (page.max(1) - 1).saturating_mul(per_page.max(0))
}

fn normalize_page(page: i64, per_page: i64, max_per_page: i64) -> (i64, i64) {
    let page = page.max(1);
    let per_page = match per_page {
        n if n < 1 => DEFAULT_PER_PAGE.min(max_per_page),
        n => n.min(max_per_page),
    };
    (page, per_page)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        Self { page, per_page, total }
    }

    pub fn total_pages(&self) -> i64 {
        if self.per_page <= 0 {
            return 0;
        }
        (self.total + self.per_page - 1) / self.per_page
    }
}

//--------------------------------------     Order views       ---------------------------------------------------------
/// An order together with everything attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub refunds: Vec<OrderRefund>,
    pub payments: Vec<OrderPayment>,
}

impl Display for OrderDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Order {} ({}): {} {} for user #{}",
            self.order.number, self.order.status, self.order.total_cents, self.order.currency, self.order.user_id
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminOrderDetail {
    #[serde(flatten)]
    pub detail: OrderDetail,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminOrderSummary {
    pub order: Order,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderList<T> {
    pub orders: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithBalance {
    pub order: OrderDetail,
    pub balance: UserBalance,
}

/// A wallet balance together with one page of its ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceStatement {
    pub balance: UserBalance,
    pub transactions: Vec<BalanceTransaction>,
    pub pagination: Pagination,
}

//--------------------------------------   Request objects     ---------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub plan_id: i64,
    pub quantity: Option<i64>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_channel: Option<String>,
    pub payment_return_url: Option<String>,
    pub idempotency_key: Option<String>,
}

impl CreateOrderRequest {
    pub fn new(plan_id: i64) -> Self {
        Self { plan_id, ..Default::default() }
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_external_payment<S: Into<String>>(mut self, channel: S) -> Self {
        self.payment_method = Some(PaymentMethod::External);
        self.payment_channel = Some(channel.into());
        self
    }

    pub fn with_return_url<S: Into<String>>(mut self, url: S) -> Self {
        self.payment_return_url = Some(url.into());
        self
    }

    pub fn with_idempotency_key<S: Into<String>>(mut self, key: S) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResult {
    pub order: OrderDetail,
    pub balance: UserBalance,
    pub transaction: Option<BalanceTransaction>,
    /// True when an idempotency key matched an earlier order and nothing new was written.
    pub replayed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderResult {
    pub order: Order,
    pub balance: UserBalance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminCancelRequest {
    pub order_id: i64,
    pub reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkPaidRequest {
    pub order_id: i64,
    pub payment_method: Option<PaymentMethod>,
    pub paid_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundRequest {
    pub order_id: i64,
    pub amount_cents: Cents,
    pub reason: Option<String>,
    pub metadata: Option<Metadata>,
}

impl RefundRequest {
    pub fn new(order_id: i64, amount_cents: Cents) -> Self {
        Self { order_id, amount_cents, ..Default::default() }
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResult {
    pub order: Order,
    pub refund: OrderRefund,
    pub transaction: BalanceTransaction,
    pub balance: UserBalance,
}

/// The body of a verified payment gateway callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub order_id: i64,
    pub payment_id: i64,
    pub status: PaymentStatus,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub failure_code: Option<String>,
    #[serde(default)]
    pub failure_message: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub paid_at: Option<i64>,
}

impl PaymentCallback {
    pub fn succeeded(order_id: i64, payment_id: i64) -> Self {
        Self {
            order_id,
            payment_id,
            status: PaymentStatus::Succeeded,
            reference: None,
            failure_code: None,
            failure_message: None,
            paid_at: None,
        }
    }

    pub fn failed(order_id: i64, payment_id: i64, failure_code: &str) -> Self {
        let failure_code = Some(failure_code.to_string());
        Self { status: PaymentStatus::Failed, failure_code, ..Self::succeeded(order_id, payment_id) }
    }

    pub fn with_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_paid_at(mut self, unix_seconds: i64) -> Self {
        self.paid_at = Some(unix_seconds);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCallbackResult {
    pub order: Order,
    pub payment: OrderPayment,
    /// True if the order already reflected this outcome.
    pub replayed: bool,
}
