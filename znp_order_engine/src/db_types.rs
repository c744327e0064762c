//! Database types for the order and wallet engine.
//!
//! Everything in here maps one-to-one onto a table (or an enumerated TEXT column) in the engine database. Monetary
//! values are always [`Cents`] next to a currency code, and timestamps are always UTC.
use std::{collections::HashSet, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;
pub use znp_common::Cents;

/// Free-form JSON object stored alongside orders, items, refunds, payments and ledger rows.
pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

//--------------------------------------     OrderStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, not yet charged. The initial state of balance-funded orders.
    Pending,
    /// Waiting for an external gateway to report back. The initial state of externally-funded orders.
    PendingPayment,
    /// Paid in full, either from the wallet, by a gateway callback or manually by an admin.
    Paid,
    /// The external gateway reported a failure.
    PaymentFailed,
    /// Closed. Orders are never deleted; cancellation keeps the history.
    Cancelled,
    /// Some, but not all, of the order total has been refunded to the wallet.
    PartiallyRefunded,
    /// The whole total has been refunded to the wallet.
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::PaymentFailed => "payment_failed",
            Self::Cancelled => "cancelled",
            Self::PartiallyRefunded => "partially_refunded",
            Self::Refunded => "refunded",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "pending_payment" => Ok(Self::PendingPayment),
            "paid" => Ok(Self::Paid),
            "payment_failed" => Ok(Self::PaymentFailed),
            "cancelled" => Ok(Self::Cancelled),
            "partially_refunded" => Ok(Self::PartiallyRefunded),
            "refunded" => Ok(Self::Refunded),
            s => Err(ConversionError::new("order status", s)),
        }
    }
}

//--------------------------------------    PaymentMethod      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Charged against the user's wallet balance.
    #[default]
    Balance,
    /// Settled by an external payment gateway, reported back through a webhook.
    External,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::External => "external",
        }
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balance" => Ok(Self::Balance),
            "external" => Ok(Self::External),
            s => Err(ConversionError::new("payment method", s)),
        }
    }
}

//--------------------------------------    PaymentStatus      ---------------------------------------------------------
/// Used both for the `payment_status` column of an order and the `status` column of an external payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            s => Err(ConversionError::new("payment status", s)),
        }
    }
}

//--------------------------------------   TransactionType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Recharge,
    Purchase,
    Refund,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recharge => "recharge",
            Self::Purchase => "purchase",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recharge" => Ok(Self::Recharge),
            "purchase" => Ok(Self::Purchase),
            "refund" => Ok(Self::Refund),
            "adjustment" => Ok(Self::Adjustment),
            s => Err(ConversionError::new("transaction type", s)),
        }
    }
}

//--------------------------------------  PlanStatus / UserStatus / Role  ---------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(ConversionError::new("role", s)),
        }
    }
}

//--------------------------------------         Plan          ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_cents: Cents,
    pub currency: String,
    pub duration_days: i64,
    pub traffic_limit_bytes: i64,
    pub devices_limit: i64,
    pub features: Json<Vec<String>>,
    pub tags: Json<Vec<String>>,
    pub visible: bool,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Only visible, active plans can be ordered.
    pub fn is_purchasable(&self) -> bool {
        self.visible && self.status == PlanStatus::Active
    }

    /// The frozen copy of this plan embedded into an order. Later edits to the plan never touch it.
    pub fn snapshot(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "slug": self.slug,
            "description": self.description,
            "price_cents": self.price_cents.value(),
            "currency": self.currency,
            "duration_days": self.duration_days,
            "traffic_limit_bytes": self.traffic_limit_bytes,
            "devices_limit": self.devices_limit,
            "features": self.features.0,
            "tags": self.tags.0,
        })
    }
}

/// A plan to be added to the catalogue. Only used for seeding. Defaults to a visible, active 30-day plan.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_cents: Cents,
    pub currency: String,
    pub duration_days: i64,
    pub traffic_limit_bytes: i64,
    pub devices_limit: i64,
    pub features: Vec<String>,
    pub tags: Vec<String>,
    pub visible: bool,
    pub status: PlanStatus,
}

impl NewPlan {
    pub fn new<S: Into<String>>(name: S, slug: S, price_cents: Cents) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            description: None,
            price_cents,
            currency: znp_common::DEFAULT_CURRENCY_CODE.to_string(),
            duration_days: 30,
            traffic_limit_bytes: 0,
            devices_limit: 0,
            features: vec![],
            tags: vec![],
            visible: true,
            status: PlanStatus::Active,
        }
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_limits(mut self, duration_days: i64, traffic_limit_bytes: i64, devices_limit: i64) -> Self {
        self.duration_days = duration_days;
        self.traffic_limit_bytes = traffic_limit_bytes;
        self.devices_limit = devices_limit;
        self
    }

    pub fn with_features(mut self, features: &[&str]) -> Self {
        self.features = features.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_status(mut self, status: PlanStatus) -> Self {
        self.status = status;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

//--------------------------------------      UserSummary      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub roles: Json<Vec<String>>,
    pub status: UserStatus,
}

impl UserSummary {
    pub fn is_disabled(&self) -> bool {
        self.status == UserStatus::Disabled
    }

    pub fn roles(&self) -> HashSet<Role> {
        self.roles.iter().filter_map(|r| r.parse().ok()).collect()
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    /// Human-readable unique order number, `ORD-<nanoseconds>`
    pub number: String,
    pub user_id: i64,
    pub plan_id: Option<i64>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub total_cents: Cents,
    pub refunded_cents: Cents,
    pub currency: String,
    pub payment_intent_id: Option<String>,
    pub payment_reference: Option<String>,
    pub payment_failure_code: Option<String>,
    pub payment_failure_message: Option<String>,
    pub metadata: Json<Metadata>,
    pub plan_snapshot: Json<Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The amount that can still be refunded.
    pub fn remaining_cents(&self) -> Cents {
        self.total_cents - self.refunded_cents
    }

    pub fn is_free(&self) -> bool {
        self.total_cents.is_zero()
    }

    /// The reference written to every ledger row caused by this order.
    pub fn ledger_reference(&self) -> String {
        format!("order:{}", self.number)
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
/// Everything needed to insert a new order row. Status fields are set by the store according to the payment method.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub number: String,
    pub user_id: i64,
    pub plan_id: Option<i64>,
    pub payment_method: PaymentMethod,
    pub total_cents: Cents,
    pub currency: String,
    pub payment_intent_id: Option<String>,
    pub metadata: Metadata,
    pub plan_snapshot: Value,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: Cents,
    pub currency: String,
    pub subtotal_cents: Cents,
    pub metadata: Json<Metadata>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub item_type: String,
    pub item_id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: Cents,
    pub currency: String,
    pub metadata: Metadata,
}

impl NewOrderItem {
    pub fn for_plan(plan: &Plan, quantity: i64) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("duration_days".into(), json!(plan.duration_days));
        metadata.insert("slug".into(), json!(plan.slug));
        Self {
            item_type: "plan".into(),
            item_id: plan.id,
            name: plan.name.clone(),
            quantity,
            unit_price_cents: plan.price_cents,
            currency: plan.currency.clone(),
            metadata,
        }
    }

    /// `quantity × unit price`. Callers validate the quantity range beforehand, so this can only overflow for absurd
    /// plan prices, in which case `None` is returned.
    pub fn subtotal(&self) -> Option<Cents> {
        self.unit_price_cents.checked_mul(self.quantity)
    }
}

//--------------------------------------      OrderRefund      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct OrderRefund {
    pub id: i64,
    pub order_id: i64,
    pub amount_cents: Cents,
    pub reason: Option<String>,
    pub reference: String,
    /// The ledger row that credited the wallet for this refund
    pub balance_transaction_id: Option<i64>,
    pub metadata: Json<Metadata>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     OrderPayment      ---------------------------------------------------------
/// An attempt to settle an order through an external gateway.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct OrderPayment {
    pub id: i64,
    pub order_id: i64,
    pub provider: String,
    pub method: String,
    pub intent_id: Option<String>,
    pub reference: Option<String>,
    pub status: PaymentStatus,
    pub amount_cents: Cents,
    pub currency: String,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub metadata: Json<Metadata>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrderPayment {
    pub provider: String,
    pub method: String,
    pub intent_id: Option<String>,
    pub amount_cents: Cents,
    pub currency: String,
    pub metadata: Metadata,
}

//--------------------------------------      UserBalance      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct UserBalance {
    pub user_id: i64,
    pub balance_cents: Cents,
    pub currency: String,
    pub last_transaction_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    /// A synthetic, unsaved zero balance for users that have never had a wallet movement.
    pub fn zero(user_id: i64, currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance_cents: Cents::ZERO,
            currency: currency.to_string(),
            last_transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

//--------------------------------------  BalanceTransaction   ---------------------------------------------------------
/// A single, immutable ledger row. Charges are negative, credits positive.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct BalanceTransaction {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount_cents: Cents,
    pub currency: String,
    pub balance_after_cents: Cents,
    pub reference: String,
    pub description: Option<String>,
    pub metadata: Json<Metadata>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBalanceTransaction {
    pub tx_type: TransactionType,
    pub amount_cents: Cents,
    /// Only used when the wallet does not exist yet. Existing wallets keep their currency.
    pub currency: Option<String>,
    pub reference: String,
    pub description: Option<String>,
    pub metadata: Metadata,
}

impl NewBalanceTransaction {
    pub fn new(tx_type: TransactionType, amount_cents: Cents, reference: impl Into<String>) -> Self {
        Self {
            tx_type,
            amount_cents,
            currency: None,
            reference: reference.into(),
            description: None,
            metadata: Metadata::new(),
        }
    }

    pub fn recharge(amount_cents: Cents, reference: impl Into<String>) -> Self {
        Self::new(TransactionType::Recharge, amount_cents, reference)
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

//--------------------------------------  IdempotencyRecord    ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub user_id: i64,
    pub endpoint: String,
    pub key: String,
    pub order_id: i64,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  ApiSecuritySetting   ---------------------------------------------------------
/// Credentials and replay window for signed third-party business calls.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiSecuritySetting {
    pub id: i64,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
    pub enabled: bool,
    pub nonce_ttl_seconds: i64,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    MetadataPatch      ---------------------------------------------------------
/// The metadata keys the engine itself writes onto an order. Anything else in an order's metadata is opaque.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataPatch {
    Cancelled { by: String, reason: Option<String> },
    RefundCompleted,
    Refunded { amount: Cents, transaction_id: i64, by: String, reason: Option<String> },
    MarkedPaid { by: String, note: Option<String> },
}

pub const REFUND_COMPLETED_REASON: &str = "refund_completed";

impl MetadataPatch {
    pub fn apply(&self, metadata: &mut Metadata) {
        match self {
            MetadataPatch::Cancelled { by, reason } => {
                metadata.insert("cancelled_by".into(), json!(by));
                if let Some(reason) = reason {
                    metadata.insert("cancel_reason".into(), json!(reason));
                }
            },
            MetadataPatch::RefundCompleted => {
                metadata.insert("cancel_reason".into(), json!(REFUND_COMPLETED_REASON));
            },
            MetadataPatch::Refunded { amount, transaction_id, by, reason } => {
                metadata.insert("last_refund_amount".into(), json!(amount.value()));
                metadata.insert("last_refund_tx_id".into(), json!(transaction_id));
                metadata.insert("last_refund_by".into(), json!(by));
                match reason {
                    Some(reason) => metadata.insert("last_refund_reason".into(), json!(reason)),
                    None => metadata.remove("last_refund_reason"),
                };
            },
            MetadataPatch::MarkedPaid { by, note } => {
                metadata.insert("marked_paid_by".into(), json!(by));
                if let Some(note) = note {
                    metadata.insert("marked_paid_note".into(), json!(note));
                }
            },
        }
    }
}
