use log::debug;
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};

use crate::db_types::{UserStatus, UserSummary};

pub async fn fetch_user(id: i64, conn: &mut SqliteConnection) -> Result<Option<UserSummary>, sqlx::Error> {
    sqlx::query_as("SELECT id, email, roles, status FROM users WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_users(ids: &[i64], conn: &mut SqliteConnection) -> Result<Vec<UserSummary>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT id, email, roles, status FROM users WHERE id IN (");
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    list.push_unseparated(") ORDER BY id");
    builder.build_query_as::<UserSummary>().fetch_all(conn).await
}

/// Users are owned by the panel's account service. This insert exists for seeding and tests.
pub async fn insert_user(
    email: &str,
    roles: &[&str],
    status: UserStatus,
    conn: &mut SqliteConnection,
) -> Result<UserSummary, sqlx::Error> {
    let roles = roles.iter().map(|r| r.to_string()).collect::<Vec<_>>();
    let user: UserSummary = sqlx::query_as(
        "INSERT INTO users (email, roles, status) VALUES ($1, $2, $3) RETURNING id, email, roles, status",
    )
    .bind(email)
    .bind(Json(roles))
    .bind(status)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ User {} inserted with id {}", user.email, user.id);
    Ok(user)
}

pub async fn set_user_status(id: i64, status: UserStatus, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
