//! Seed data for tests. Users and plans are owned by other parts of the panel, so the engine itself never creates them.
use chrono::Utc;
use znp_common::Cents;

use crate::{
    db_types::{
        ApiSecuritySetting,
        Metadata,
        NewBalanceTransaction,
        NewOrder,
        NewOrderItem,
        NewPlan,
        Order,
        PaymentMethod,
        Plan,
        UserStatus,
        UserSummary,
    },
    helpers::OrderNumberGenerator,
    sqlite::db::{orders, plans, settings, users},
    traits::{WalletManagement, WalletReceipt},
    SqliteDatabase,
};

pub async fn seed_user(db: &SqliteDatabase, email: &str) -> UserSummary {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    users::insert_user(email, &["user"], UserStatus::Active, &mut conn).await.expect("Error inserting user")
}

pub async fn seed_admin(db: &SqliteDatabase, email: &str) -> UserSummary {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    users::insert_user(email, &["user", "admin"], UserStatus::Active, &mut conn).await.expect("Error inserting admin")
}

pub async fn disable_user(db: &SqliteDatabase, user_id: i64) {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    users::set_user_status(user_id, UserStatus::Disabled, &mut conn).await.expect("Error disabling user");
}

pub async fn seed_plan(db: &SqliteDatabase, plan: NewPlan) -> Plan {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    plans::insert_plan(&plan, Utc::now(), &mut conn).await.expect("Error inserting plan")
}

pub async fn seed_security_setting(db: &SqliteDatabase, api_key: &str, api_secret: &str) -> ApiSecuritySetting {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    settings::upsert_setting(api_key, api_secret, true, 300, Utc::now(), &mut conn)
        .await
        .expect("Error inserting security setting")
}

/// Credits the user's wallet with a recharge.
pub async fn top_up(db: &SqliteDatabase, user_id: i64, amount: i64) -> WalletReceipt {
    let tx = NewBalanceTransaction::recharge(Cents::from(amount), format!("seed-topup-{}", rand::random::<u32>()));
    db.apply_transaction(user_id, tx, Utc::now()).await.expect("Error topping up wallet")
}

/// Writes an order that is still `pending`, as if its balance charge had not yet been attempted. The public API never
/// leaves orders in this state, but admins can settle them by hand.
pub async fn seed_pending_order(db: &SqliteDatabase, user_id: i64, plan: &Plan) -> Order {
    let now = Utc::now();
    let item = NewOrderItem::for_plan(plan, 1);
    let total = item.subtotal().expect("Plan price overflows");
    let order = NewOrder {
        number: OrderNumberGenerator::new().order_number(now),
        user_id,
        plan_id: Some(plan.id),
        payment_method: PaymentMethod::Balance,
        total_cents: total,
        currency: plan.currency.clone(),
        payment_intent_id: None,
        metadata: Metadata::new(),
        plan_snapshot: plan.snapshot(),
        created_at: now,
    };
    let mut tx = db.pool().begin().await.expect("Error starting transaction");
    let order = orders::insert_order(&order, &mut tx).await.expect("Error inserting order");
    orders::insert_item(order.id, &item, total, now, &mut tx).await.expect("Error inserting order item");
    tx.commit().await.expect("Error committing order");
    order
}
