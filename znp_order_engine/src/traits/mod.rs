//! # Backend contracts
//!
//! This module defines the behaviour a database backend must expose in order to drive the order and wallet engine.
//!
//! The read side is split into small capability traits, one per store:
//!
//! * [`BalanceStore`] and [`LedgerStore`] expose wallet balances and the append-only ledger.
//! * [`OrderStore`] and [`PaymentStore`] expose orders, their items, refunds and external payment attempts.
//! * [`PlanCatalog`] and [`UserDirectory`] are read-only views of data owned by other parts of the panel.
//! * [`SecuritySettingsStore`] supplies the credentials for signed third-party calls.
//!
//! The write side lives in [`WalletManagement`] (the single balance-mutating primitive) and [`OrderGatewayDatabase`],
//! whose methods each run as one atomic database transaction. Nothing else in the engine writes to the database.
mod catalog;
mod data_objects;
mod ledger_management;
mod order_gateway_database;
mod order_management;
mod security_settings;
mod wallet_management;

pub use catalog::{PlanCatalog, UserDirectory};
pub use data_objects::{
    CallbackOutcome,
    CancelActor,
    CancelOrderRequest,
    CancelOutcome,
    CreateOrderOutcome,
    IdempotencyBinding,
    MarkPaidUpdate,
    NewOrderRequest,
    PaymentCallbackUpdate,
    RefundOrderRequest,
    RefundOutcome,
    WalletReceipt,
};
pub use ledger_management::{BalanceStore, LedgerStore, StoreError};
pub use order_gateway_database::{OrderGatewayDatabase, OrderGatewayError};
pub use order_management::{OrderStore, PaymentStore};
pub use security_settings::SecuritySettingsStore;
pub use wallet_management::{WalletError, WalletManagement};
