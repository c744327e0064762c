use std::{env, str::FromStr, time::Duration};

use log::*;
use znp_common::{parse_boolean_flag, parse_list, Secret, DEFAULT_CURRENCY_CODE};

use crate::webhook::CidrBlock;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/znp_orders.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_MAX_QUANTITY: i64 = 10;
pub const DEFAULT_MAX_PER_PAGE: i64 = 100;
pub const DEFAULT_WEBHOOK_TOLERANCE: Duration = Duration::from_secs(300);
pub const DEFAULT_API_GATE_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    /// Currency for wallets created before any currency is known.
    pub default_currency: String,
    pub max_quantity: i64,
    pub max_per_page: i64,
    /// Deadline applied to operations whose caller did not supply one.
    pub request_timeout: Option<Duration>,
    pub webhook: WebhookConfig,
    /// How long third-party API security settings are cached in-process.
    pub api_gate_cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            default_currency: DEFAULT_CURRENCY_CODE.to_string(),
            max_quantity: DEFAULT_MAX_QUANTITY,
            max_per_page: DEFAULT_MAX_PER_PAGE,
            request_timeout: None,
            webhook: WebhookConfig::default(),
            api_gate_cache_ttl: DEFAULT_API_GATE_CACHE_TTL,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    pub mode: WebhookMode,
    /// If non-empty, callbacks must originate from one of these networks.
    pub ip_allowlist: Vec<CidrBlock>,
    /// If true, the first hop of the X-Forwarded-For header is used as the peer address instead of the socket address.
    pub trust_x_forwarded_for: bool,
}

#[derive(Clone, Debug, Default)]
pub enum WebhookMode {
    /// All callbacks are rejected.
    #[default]
    Disabled,
    /// The gateway sends a fixed token in the `X-WEBHOOK-TOKEN` header.
    SharedToken(Secret<String>),
    /// The gateway signs `<timestamp>.<body>` with HMAC-SHA256 and sends `t=<unix>,v1=<hex>`.
    Stripe { secret: Secret<String>, tolerance: Duration },
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("ZNP_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ ZNP_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let db_max_connections = parse_env("ZNP_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS);
        let default_currency = env::var("ZNP_DEFAULT_CURRENCY")
            .ok()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY_CODE.to_string());
        let max_quantity = parse_env("ZNP_MAX_QUANTITY", DEFAULT_MAX_QUANTITY).max(1);
        let max_per_page = parse_env("ZNP_MAX_PER_PAGE", DEFAULT_MAX_PER_PAGE).max(1);
        let request_timeout = env::var("ZNP_REQUEST_TIMEOUT_MS").ok().and_then(|s| match s.parse::<u64>() {
            Ok(0) => None,
            Ok(ms) => Some(Duration::from_millis(ms)),
            Err(e) => {
                error!("🪛️ {s} is not a valid value for ZNP_REQUEST_TIMEOUT_MS. {e}. No default deadline will be set.");
                None
            },
        });
        let cache_secs = parse_env("ZNP_API_GATE_CACHE_SECONDS", DEFAULT_API_GATE_CACHE_TTL.as_secs());
        Self {
            database_url,
            db_max_connections,
            default_currency,
            max_quantity,
            max_per_page,
            request_timeout,
            webhook: WebhookConfig::from_env_or_default(),
            api_gate_cache_ttl: Duration::from_secs(cache_secs),
        }
    }
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let secret = env::var("ZNP_WEBHOOK_SECRET").ok().map(Secret::new);
        let mode = match (env::var("ZNP_WEBHOOK_MODE").ok().map(|s| s.to_lowercase()).as_deref(), secret) {
            (Some("token"), Some(secret)) => WebhookMode::SharedToken(secret),
            (Some("stripe"), Some(secret)) => {
                let secs = parse_env("ZNP_WEBHOOK_TOLERANCE_SECONDS", DEFAULT_WEBHOOK_TOLERANCE.as_secs());
                WebhookMode::Stripe { secret, tolerance: Duration::from_secs(secs) }
            },
            (Some("token" | "stripe"), None) => {
                error!("🪛️ ZNP_WEBHOOK_MODE is set, but ZNP_WEBHOOK_SECRET is not. Payment callbacks are disabled.");
                WebhookMode::Disabled
            },
            (None | Some("disabled"), _) => {
                info!("🪛️ Payment webhooks are disabled.");
                WebhookMode::Disabled
            },
            (Some(other), _) => {
                error!("🪛️ '{other}' is not a valid ZNP_WEBHOOK_MODE. Use token, stripe or disabled.");
                WebhookMode::Disabled
            },
        };
        let ip_allowlist = env::var("ZNP_WEBHOOK_IP_ALLOWLIST")
            .map(|s| {
                parse_list(&s)
                    .into_iter()
                    .filter_map(|block| {
                        block
                            .parse::<CidrBlock>()
                            .map_err(|e| warn!("🪛️ Ignoring entry in ZNP_WEBHOOK_IP_ALLOWLIST. {e}"))
                            .ok()
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if !ip_allowlist.is_empty() {
            info!("🪛️ Webhook callbacks are restricted to {} network(s)", ip_allowlist.len());
        }
        let trust_x_forwarded_for = parse_boolean_flag(env::var("ZNP_WEBHOOK_TRUST_X_FORWARDED_FOR").ok(), true);
        Self { mode, ip_allowlist, trust_x_forwarded_for }
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {key}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
