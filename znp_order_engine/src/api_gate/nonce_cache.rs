use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use log::*;

/// Remembers the nonces of recently accepted requests so that a captured request cannot be replayed inside its
/// timestamp window. Each nonce is kept until the request carrying it could no longer pass the timestamp check, and
/// expired entries are pruned as new nonces arrive.
#[derive(Debug, Clone, Default)]
pub struct NonceCache {
    seen: Arc<Mutex<HashMap<(String, String), DateTime<Utc>>>>,
}

impl NonceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the nonce for the API key until `expires_at`. Returns false if it is still remembered from an earlier
    /// request.
    pub fn check_and_insert(&self, api_key: &str, nonce: &str, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> bool {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("🔐️ The nonce cache lock was poisoned. Recovering it.");
                poisoned.into_inner()
            },
        };
        let before = seen.len();
        seen.retain(|_, expiry| *expiry >= now);
        if seen.len() < before {
            trace!("🔐️ Pruned {} expired nonce(s)", before - seen.len());
        }
        let key = (api_key.to_string(), nonce.to_string());
        if seen.contains_key(&key) {
            return false;
        }
        seen.insert(key, expires_at);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
