//! Verification of signed business calls from third-party systems.
//!
//! Callers send `API-Key`, `Timestamp`, `Nonce` and `Signature` headers, where the signature is the base64 HMAC-SHA256
//! of the canonical request string under the shared API secret. Bodies may be AES-256-GCM encrypted, in which case the
//! `Encrypted` and `IV` headers are also present. The credentials come from the security settings store and are cached
//! in-process for a short time.
mod gate;
mod nonce_cache;
mod settings_cache;

pub use gate::{
    encrypt_body,
    sign_request,
    ApiGate,
    ApiGateError,
    GateVerified,
    API_KEY_HEADER,
    DEFAULT_NONCE_TTL_SECONDS,
    ENCRYPTED_HEADER,
    IV_HEADER,
    NONCE_HEADER,
    SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};
pub use nonce_cache::NonceCache;
pub use settings_cache::{SettingsCache, StaticSettings};
