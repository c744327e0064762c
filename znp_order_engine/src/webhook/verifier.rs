use std::{net::IpAddr, sync::Arc};

use hmac::{Hmac, Mac};
use http::HeaderMap;
use log::*;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::{
    clock::Clock,
    config::{WebhookConfig, WebhookMode},
    engine_api::order_objects::PaymentCallback,
    metrics::EngineMetrics,
};

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_HEADER: &str = "X-WEBHOOK-TOKEN";
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const X_FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Payment webhooks are disabled")]
    Disabled,
    #[error("The {0} header is missing")]
    MissingHeader(&'static str),
    #[error("The webhook token is invalid")]
    InvalidToken,
    #[error("The webhook signature header is malformed: {0}")]
    MalformedSignature(String),
    #[error("The webhook signature is invalid")]
    InvalidSignature,
    #[error("The webhook timestamp is {age}s away from the current time")]
    Expired { age: i64 },
    #[error("Webhooks from {0} are not allowed")]
    SourceNotAllowed(String),
    #[error("The webhook body is not a valid payment callback: {0}")]
    InvalidBody(String),
}

impl WebhookError {
    /// A short label for the webhook metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            WebhookError::Disabled => "disabled",
            WebhookError::SourceNotAllowed(_) => "forbidden",
            WebhookError::InvalidBody(_) => "invalid_body",
            _ => "unauthorized",
        }
    }
}

/// A callback request that passed verification. The raw body is kept byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedWebhook {
    body: Vec<u8>,
    peer: Option<IpAddr>,
}

impl VerifiedWebhook {
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// The source address the allowlist was checked against, if there was one.
    pub fn peer(&self) -> Option<IpAddr> {
        self.peer
    }

    pub fn callback(&self) -> Result<PaymentCallback, WebhookError> {
        serde_json::from_slice(&self.body).map_err(|e| WebhookError::InvalidBody(e.to_string()))
    }
}

#[derive(Clone)]
pub struct WebhookVerifier {
    config: WebhookConfig,
    clock: Arc<dyn Clock>,
    metrics: EngineMetrics,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookVerifier({:?})", self.config)
    }
}

impl WebhookVerifier {
    pub fn new(config: WebhookConfig, clock: Arc<dyn Clock>, metrics: EngineMetrics) -> Self {
        Self { config, clock, metrics }
    }

    /// Verifies a callback request.
    ///
    /// `peer` is the socket address of the caller. If the verifier is configured to trust `X-Forwarded-For`, the first
    /// hop in that header takes its place.
    pub fn verify(
        &self,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
        body: Vec<u8>,
    ) -> Result<VerifiedWebhook, WebhookError> {
        let result = self.check(headers, peer, &body).map(|peer| VerifiedWebhook { body, peer });
        match &result {
            Ok(_) => {
                trace!("🔐️ Webhook verified");
                self.metrics.record_webhook("ok");
            },
            Err(e) => {
                warn!("🔐️ Webhook rejected. {e}");
                self.metrics.record_webhook(e.outcome());
            },
        }
        result
    }

    fn check(&self, headers: &HeaderMap, peer: Option<IpAddr>, body: &[u8]) -> Result<Option<IpAddr>, WebhookError> {
        if matches!(self.config.mode, WebhookMode::Disabled) {
            return Err(WebhookError::Disabled);
        }
        let source = self.source_address(headers, peer);
        if !self.config.ip_allowlist.is_empty() {
            let allowed = source.map(|ip| self.config.ip_allowlist.iter().any(|b| b.contains(&ip))).unwrap_or(false);
            if !allowed {
                let source = source.map(|ip| ip.to_string()).unwrap_or_else(|| "an unknown address".into());
                return Err(WebhookError::SourceNotAllowed(source));
            }
        }
        match &self.config.mode {
            WebhookMode::Disabled => return Err(WebhookError::Disabled),
            WebhookMode::SharedToken(token) => {
                let presented = header_str(headers, TOKEN_HEADER).ok_or(WebhookError::MissingHeader(TOKEN_HEADER))?;
                if !constant_time_eq(presented.as_bytes(), token.reveal().as_bytes()) {
                    return Err(WebhookError::InvalidToken);
                }
            },
            WebhookMode::Stripe { secret, tolerance } => {
                let header =
                    header_str(headers, SIGNATURE_HEADER).ok_or(WebhookError::MissingHeader(SIGNATURE_HEADER))?;
                let (timestamp, signatures) = parse_signature_header(header)?;
                let age = self.clock.now().timestamp().saturating_sub(timestamp).saturating_abs();
                if age > i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX) {
                    return Err(WebhookError::Expired { age });
                }
                let expected = sign_payload(secret.reveal(), timestamp, body);
                if !signatures.iter().any(|sig| constant_time_eq(sig.as_bytes(), expected.as_bytes())) {
                    return Err(WebhookError::InvalidSignature);
                }
            },
        }
        Ok(source)
    }

    fn source_address(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
        if self.config.trust_x_forwarded_for {
            let forwarded = header_str(headers, X_FORWARDED_FOR_HEADER)
                .and_then(|v| v.split(',').next())
                .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
            if forwarded.is_some() {
                return forwarded;
            }
        }
        peer
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|s| !s.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Splits `t=<unix>,v1=<hex>[,v1=<hex>...]`. Unknown keys (e.g. `v0`) are ignored.
fn parse_signature_header(header: &str) -> Result<(i64, Vec<String>), WebhookError> {
    let mut timestamp = None;
    let mut signatures = vec![];
    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or_else(|| WebhookError::MalformedSignature(format!("'{part}' is not a key=value pair")))?;
        match key {
            "t" => {
                let t = value
                    .parse::<i64>()
                    .map_err(|_| WebhookError::MalformedSignature(format!("'{value}' is not a timestamp")))?;
                timestamp = Some(t);
            },
            "v1" => signatures.push(value.to_ascii_lowercase()),
            _ => {},
        }
    }
    let timestamp = timestamp.ok_or_else(|| WebhookError::MalformedSignature("no timestamp".into()))?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedSignature("no v1 signature".into()));
    }
    Ok((timestamp, signatures))
}

/// Hex-encoded HMAC-SHA256 of `<timestamp>.<body>`.
pub(crate) fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::default(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
