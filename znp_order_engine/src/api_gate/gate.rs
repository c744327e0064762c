use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
    Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use http::{HeaderMap, Request};
use log::*;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use znp_common::parse_boolean_flag;

use crate::{
    api_gate::{NonceCache, SettingsCache},
    clock::Clock,
    db_types::ApiSecuritySetting,
    traits::{SecuritySettingsStore, StoreError},
};

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "API-Key";
pub const SIGNATURE_HEADER: &str = "Signature";
pub const TIMESTAMP_HEADER: &str = "Timestamp";
pub const NONCE_HEADER: &str = "Nonce";
pub const ENCRYPTED_HEADER: &str = "Encrypted";
pub const IV_HEADER: &str = "IV";
pub const DEFAULT_NONCE_TTL_SECONDS: i64 = 300;
const IV_LENGTH: usize = 12;

#[derive(Debug, Clone, Error)]
pub enum ApiGateError {
    #[error("Third-party API access is disabled")]
    Disabled,
    #[error("The {0} header is missing")]
    MissingHeader(&'static str),
    #[error("Unknown API key")]
    UnknownKey,
    #[error("'{0}' is not a valid request timestamp")]
    InvalidTimestamp(String),
    #[error("The request timestamp is {age}s away from the current time")]
    Expired { age: i64 },
    #[error("The request signature is invalid")]
    InvalidSignature,
    #[error("The request nonce has already been used")]
    ReplayedNonce,
    #[error("Could not decrypt the request body. {0}")]
    Decryption(String),
    #[error("Could not load the API security settings. {0}")]
    Store(#[from] StoreError),
}

/// A signed request that passed the gate. `body` is the plaintext, decrypted if the caller sent it encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerified {
    pub api_key: String,
    pub body: Vec<u8>,
}

/// Verifies signed business calls from third-party systems.
#[derive(Clone)]
pub struct ApiGate<S> {
    settings: SettingsCache<S>,
    nonces: NonceCache,
    clock: Arc<dyn Clock>,
}

impl<S> ApiGate<S>
where S: SecuritySettingsStore
{
    pub fn new(store: S, cache_ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        let settings = SettingsCache::new(store, cache_ttl, Arc::clone(&clock));
        Self { settings, nonces: NonceCache::new(), clock }
    }

    pub fn settings(&self) -> &SettingsCache<S> {
        &self.settings
    }

    pub async fn verify(&self, request: &Request<Vec<u8>>) -> Result<GateVerified, ApiGateError> {
        let result = self.check(request).await;
        match &result {
            Ok(v) => trace!("🔐️ Signed request from {} accepted", v.api_key),
            Err(e) => warn!("🔐️ Signed request to {} rejected. {e}", request.uri().path()),
        }
        result
    }

    async fn check(&self, request: &Request<Vec<u8>>) -> Result<GateVerified, ApiGateError> {
        let setting = match self.settings.get().await? {
            Some(s) if s.enabled => s,
            _ => return Err(ApiGateError::Disabled),
        };
        let headers = request.headers();
        let api_key = required(headers, API_KEY_HEADER)?;
        if !constant_time_eq(api_key.as_bytes(), setting.api_key.as_bytes()) {
            return Err(ApiGateError::UnknownKey);
        }
        let signature = required(headers, SIGNATURE_HEADER)?;
        let timestamp = required(headers, TIMESTAMP_HEADER)?;
        let nonce = required(headers, NONCE_HEADER)?;
        let issued_at = timestamp
            .parse::<i64>()
            .ok()
            .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
            .ok_or_else(|| ApiGateError::InvalidTimestamp(timestamp.to_string()))?;
        let now = self.clock.now();
        let ttl = nonce_ttl(&setting);
        let age = now.timestamp().saturating_sub(issued_at.timestamp()).saturating_abs();
        if age > ttl {
            return Err(ApiGateError::Expired { age });
        }
        let canonical = canonical_string(request, timestamp, nonce);
        let expected = hmac_base64(&setting.api_secret, &canonical);
        if !constant_time_eq(signature.as_bytes(), expected.as_bytes()) {
            return Err(ApiGateError::InvalidSignature);
        }
        // The timestamp stays acceptable until ttl after the later of now and the time it names
        let expires_at = now.max(issued_at) + Duration::seconds(ttl);
        if !self.nonces.check_and_insert(api_key, nonce, now, expires_at) {
            return Err(ApiGateError::ReplayedNonce);
        }
        let encrypted = parse_boolean_flag(header_string(headers, ENCRYPTED_HEADER), false);
        let body = if encrypted {
            let iv = required(headers, IV_HEADER)?;
            decrypt_body(&setting.api_secret, iv, request.body())?
        } else {
            request.body().clone()
        };
        Ok(GateVerified { api_key: setting.api_key, body })
    }
}

fn nonce_ttl(setting: &ApiSecuritySetting) -> i64 {
    if setting.nonce_ttl_seconds > 0 {
        setting.nonce_ttl_seconds
    } else {
        DEFAULT_NONCE_TTL_SECONDS
    }
}

fn required<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, ApiGateError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ApiGateError::MissingHeader(name))
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(String::from)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// `METHOD\nPATH\nRAW_QUERY\nTIMESTAMP\nNONCE\nBASE64(BODY)`. The body is the raw body as sent, ciphertext included.
fn canonical_string<B: AsRef<[u8]>>(request: &Request<B>, timestamp: &str, nonce: &str) -> String {
    let uri = request.uri();
    format!(
        "{}\n{}\n{}\n{timestamp}\n{nonce}\n{}",
        request.method().as_str(),
        uri.path(),
        uri.query().unwrap_or_default(),
        STANDARD.encode(request.body().as_ref())
    )
}

fn hmac_base64(secret: &str, message: &str) -> String {
    let mut mac = match <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::default(),
    };
    mac.update(message.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

fn cipher_for(secret: &str) -> Result<Aes256Gcm, ApiGateError> {
    let key = Sha256::digest(secret.as_bytes());
    Aes256Gcm::new_from_slice(&key).map_err(|e| ApiGateError::Decryption(e.to_string()))
}

fn decrypt_body(secret: &str, iv: &str, body: &[u8]) -> Result<Vec<u8>, ApiGateError> {
    let iv = STANDARD.decode(iv).map_err(|e| ApiGateError::Decryption(format!("Invalid IV. {e}")))?;
    if iv.len() != IV_LENGTH {
        return Err(ApiGateError::Decryption(format!("The IV must be {IV_LENGTH} bytes, not {}", iv.len())));
    }
    let text = std::str::from_utf8(body).map_err(|e| ApiGateError::Decryption(e.to_string()))?;
    let ciphertext =
        STANDARD.decode(text.trim()).map_err(|e| ApiGateError::Decryption(format!("Invalid ciphertext. {e}")))?;
    cipher_for(secret)?
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| ApiGateError::Decryption("Authentication failed".into()))
}

/// Sets the gate headers on a request, signing it with `api_secret`. Used by clients and tests.
pub fn sign_request<B>(request: &mut Request<B>, api_key: &str, api_secret: &str, timestamp: i64, nonce: &str)
where B: AsRef<[u8]> {
    let t = timestamp.to_string();
    let signature = hmac_base64(api_secret, &canonical_string(request, &t, nonce));
    let headers = request.headers_mut();
    let values = [
        (API_KEY_HEADER, api_key),
        (TIMESTAMP_HEADER, t.as_str()),
        (NONCE_HEADER, nonce),
        (SIGNATURE_HEADER, signature.as_str()),
    ];
    for (name, value) in values {
        match http::HeaderValue::from_str(value) {
            Ok(v) => {
                headers.insert(name, v);
            },
            Err(e) => error!("🔐️ Cannot set the {name} header. {e}"),
        }
    }
}

/// Encrypts a body for the gate. Returns `(base64 IV, base64 ciphertext)`.
pub fn encrypt_body(api_secret: &str, plaintext: &[u8]) -> Result<(String, String), ApiGateError> {
    let mut iv = [0u8; IV_LENGTH];
    rand::thread_rng().fill_bytes(&mut iv);
    let ciphertext = cipher_for(api_secret)?
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| ApiGateError::Decryption(e.to_string()))?;
    Ok((STANDARD.encode(iv), STANDARD.encode(ciphertext)))
}
