//! Zero Network Panel order and wallet engine
//!
//! This library holds the money-moving core of the panel: orders for subscription plans, per-user wallets backed by an
//! append-only ledger, refunds, and payment gateway callbacks. It is transport-agnostic; an HTTP layer (or anything
//! else) calls the public API and maps [`EngineError`]s onto its own status codes.
//!
//! The library is divided into these sections:
//! 1. Data types and the order state machine ([`mod@db_types`], [`mod@order_state`]).
//! 2. Backend contracts ([`mod@traits`]) and the SQLite backend ([`SqliteDatabase`]). Every balance or order mutation
//!    runs as one database transaction, so partial state is never visible.
//! 3. The public API ([`mod@engine_api`]): order flows, account views and wallet movements.
//! 4. Request gates for payment gateway callbacks ([`mod@webhook`]) and signed third-party calls ([`mod@api_gate`]).
//!
//! The engine publishes events (order paid, cancelled, refunded, payment failed) after the corresponding transaction
//! commits. See [`mod@events`] for how to hook into them.
pub mod api_gate;
pub mod clock;
pub mod config;
pub mod db_types;
pub mod engine_api;
pub mod events;
pub mod helpers;
pub mod metrics;
pub mod order_state;
pub mod traits;
pub mod webhook;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use config::EngineConfig;
pub use engine_api::{
    order_objects,
    AccountApi,
    Caller,
    EngineContext,
    EngineError,
    ErrorKind,
    OrderFlowApi,
    WalletApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
