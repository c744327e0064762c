use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use tokio::sync::RwLock;

use crate::{clock::Clock, db_types::ApiSecuritySetting, traits::SecuritySettingsStore, traits::StoreError};

#[derive(Debug, Clone)]
struct CachedSetting {
    setting: Option<ApiSecuritySetting>,
    fetched_at: DateTime<Utc>,
}

/// An in-process cache of the effective API security setting.
///
/// Readers share the cached value until it is older than the TTL. The first reader to find it stale takes the write
/// lock and refreshes it. Readers queued behind that refresh re-check the entry once they get the lock, so a burst of
/// requests on an expired entry costs one store read.
#[derive(Clone)]
pub struct SettingsCache<S> {
    store: S,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entry: Arc<RwLock<Option<CachedSetting>>>,
}

impl<S> SettingsCache<S>
where S: SecuritySettingsStore
{
    pub fn new(store: S, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { store, ttl, clock, entry: Arc::new(RwLock::new(None)) }
    }

    fn fresh(&self, entry: &Option<CachedSetting>) -> Option<Option<ApiSecuritySetting>> {
        let cached = entry.as_ref()?;
        let age = (self.clock.now() - cached.fetched_at).to_std().unwrap_or_default();
        (age < self.ttl).then(|| cached.setting.clone())
    }

    pub async fn get(&self) -> Result<Option<ApiSecuritySetting>, StoreError> {
        if let Some(setting) = self.fresh(&*self.entry.read().await) {
            return Ok(setting);
        }
        let mut entry = self.entry.write().await;
        if let Some(setting) = self.fresh(&entry) {
            trace!("🔐️ Security settings were refreshed by another request");
            return Ok(setting);
        }
        let setting = self.store.fetch_security_setting().await?;
        debug!("🔐️ Security settings refreshed. API access is {}", match &setting {
            Some(s) if s.enabled => "enabled",
            Some(_) => "switched off",
            None => "not configured",
        });
        *entry = Some(CachedSetting { setting: setting.clone(), fetched_at: self.clock.now() });
        Ok(setting)
    }

    /// Drops the cached value so that the next read goes to the store.
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

/// A settings store that always returns the same setting.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    setting: Option<ApiSecuritySetting>,
}

impl StaticSettings {
    pub fn new(setting: Option<ApiSecuritySetting>) -> Self {
        Self { setting }
    }
}

impl SecuritySettingsStore for StaticSettings {
    async fn fetch_security_setting(&self) -> Result<Option<ApiSecuritySetting>, StoreError> {
        Ok(self.setting.clone())
    }
}
