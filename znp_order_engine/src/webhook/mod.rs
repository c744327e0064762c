//! # Payment gateway webhooks
//!
//! Gateways report the outcome of external payments by calling back into the panel. Before a callback can touch an
//! order it must pass the [`WebhookVerifier`]: the source address must be on the allowlist (if one is configured) and
//! the request must carry either the shared token or a valid Stripe-style signature over the raw body.
mod cidr;
mod verifier;

pub use cidr::{CidrBlock, CidrParseError};
pub use verifier::{
    VerifiedWebhook,
    WebhookError,
    WebhookVerifier,
    SIGNATURE_HEADER,
    TOKEN_HEADER,
    X_FORWARDED_FOR_HEADER,
};
