use cucumber::given;
use znp_common::Cents;
use znp_order_engine::{
    db_types::NewPlan,
    test_utils::seed::{seed_admin, seed_plan, seed_user},
    Caller,
};

use crate::cucumber::{world::OrderSystem, EngineWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut EngineWorld) {
    let system = OrderSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a user {string}")]
async fn a_user(world: &mut EngineWorld, name: String) {
    let user = seed_user(&world.system().db, &format!("{name}@example.com")).await;
    world.users.insert(name, Caller::user(user.id, user.email));
}

#[given(expr = "an admin {string}")]
async fn an_admin(world: &mut EngineWorld, name: String) {
    let user = seed_admin(&world.system().db, &format!("{name}@example.com")).await;
    world.users.insert(name, Caller::admin(user.id, user.email));
}

#[given(expr = "a plan {string} priced at {int} cents")]
async fn a_plan(world: &mut EngineWorld, slug: String, price: i64) {
    let plan = seed_plan(&world.system().db, NewPlan::new(slug.as_str(), slug.as_str(), Cents::from(price))).await;
    world.plans.insert(slug, plan);
}

#[given(expr = "{word} has recharged {int} cents")]
async fn has_recharged(world: &mut EngineWorld, name: String, amount: i64) {
    world.recharge(&name, amount).await;
}
