use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{NewPlan, Plan};

pub async fn fetch_plan(id: i64, conn: &mut SqliteConnection) -> Result<Option<Plan>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM plans WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// Plans are maintained by the panel's catalogue. This insert exists for seeding and tests.
pub async fn insert_plan(plan: &NewPlan, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Plan, sqlx::Error> {
    let plan: Plan = sqlx::query_as(
        r#"
            INSERT INTO plans (
                name,
                slug,
                description,
                price_cents,
                currency,
                duration_days,
                traffic_limit_bytes,
                devices_limit,
                features,
                tags,
                visible,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING *;
        "#,
    )
    .bind(&plan.name)
    .bind(&plan.slug)
    .bind(&plan.description)
    .bind(plan.price_cents)
    .bind(&plan.currency)
    .bind(plan.duration_days)
    .bind(plan.traffic_limit_bytes)
    .bind(plan.devices_limit)
    .bind(Json(&plan.features))
    .bind(Json(&plan.tags))
    .bind(plan.visible)
    .bind(plan.status)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Plan '{}' #{} inserted at {} {}", plan.slug, plan.id, plan.price_cents, plan.currency);
    Ok(plan)
}
