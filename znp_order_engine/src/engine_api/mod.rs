//! # Order and wallet engine public API
//!
//! The `engine_api` module exposes the programmatic API of the engine. It is split by concern, so that a transport
//! only needs a backend that implements the traits the API it uses asks for.
//!
//! * [`order_flow_api`] drives the order lifecycle: creation, cancellation, admin settlement, refunds and payment
//!   gateway callbacks.
//! * [`account_api`] is the read side for users and admins: order lists, order details and wallet statements.
//! * [`wallet_api`] wraps the single balance-mutating primitive for callers outside the order flow, such as top-ups.
//!
//! [`caller`] and [`context`] carry the identity and the shared environment (clock, metrics, events, configuration) of
//! each call. [`errors`] maps everything onto a small set of error kinds.
//!
//! # API usage
//!
//! ```rust,ignore
//! use znp_order_engine::{engine_api::{Caller, EngineContext, OrderFlowApi}, EngineConfig, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/znp.db", 5).await?;
//! let ctx = EngineContext::new(EngineConfig::from_env_or_default())?;
//! let api = OrderFlowApi::new(db, ctx);
//! let result = api.create_order(&Caller::user(7, "user@example.com"), request).await?;
//! ```
pub mod account_api;
pub mod caller;
pub mod context;
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
pub mod wallet_api;

pub use account_api::AccountApi;
pub use caller::Caller;
pub use context::EngineContext;
pub use errors::{EngineError, ErrorKind};
pub use order_flow_api::OrderFlowApi;
pub use wallet_api::WalletApi;
