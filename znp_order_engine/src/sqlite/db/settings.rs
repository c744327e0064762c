use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::ApiSecuritySetting;

/// The most recently updated setting is the effective one.
pub async fn fetch_latest(conn: &mut SqliteConnection) -> Result<Option<ApiSecuritySetting>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM security_settings ORDER BY updated_at DESC, id DESC LIMIT 1")
        .fetch_optional(conn)
        .await
}

/// Inserts the setting, or replaces the secret, switch and TTL of the setting with the same API key.
pub async fn upsert_setting(
    api_key: &str,
    api_secret: &str,
    enabled: bool,
    nonce_ttl_seconds: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ApiSecuritySetting, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO security_settings (api_key, api_secret, enabled, nonce_ttl_seconds, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (api_key) DO UPDATE SET
                api_secret = excluded.api_secret,
                enabled = excluded.enabled,
                nonce_ttl_seconds = excluded.nonce_ttl_seconds,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(api_key)
    .bind(api_secret)
    .bind(enabled)
    .bind(nonce_ttl_seconds)
    .bind(now)
    .fetch_one(conn)
    .await
}
