use std::collections::HashMap;

use cucumber::World;
use log::*;
use znp_common::Cents;
use znp_order_engine::{
    db_types::{BalanceTransaction, NewBalanceTransaction, Plan},
    engine_api::order_objects::{OrderDetail, TransactionQuery},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{BalanceStore, LedgerStore},
    AccountApi,
    Caller,
    EngineConfig,
    EngineContext,
    EngineError,
    OrderFlowApi,
    SqliteDatabase,
    WalletApi,
};

#[derive(Default, Debug, World)]
pub struct EngineWorld {
    pub system: Option<OrderSystem>,
    pub users: HashMap<String, Caller>,
    pub plans: HashMap<String, Plan>,
    /// Every order returned by a successful step, oldest first.
    pub orders: Vec<OrderDetail>,
    pub last_error: Option<EngineError>,
}

pub struct OrderSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub accounts: AccountApi<SqliteDatabase>,
    pub wallet: WalletApi<SqliteDatabase>,
}

impl std::fmt::Debug for OrderSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderSystem({})", self.db_path)
    }
}

impl OrderSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let ctx = EngineContext::new(EngineConfig::default()).expect("Error creating metrics");
        let orders = OrderFlowApi::new(db.clone(), ctx.clone());
        let accounts = AccountApi::new(db.clone(), ctx.clone());
        let wallet = WalletApi::new(db.clone(), ctx);
        Self { db_path: url, db, orders, accounts, wallet }
    }
}

impl EngineWorld {
    pub fn system(&self) -> &OrderSystem {
        self.system.as_ref().expect("The order system has not been initialised")
    }

    pub fn caller(&self, name: &str) -> Caller {
        self.users.get(name).cloned().unwrap_or_else(|| panic!("Unknown user {name}"))
    }

    pub fn plan(&self, slug: &str) -> Plan {
        self.plans.get(slug).cloned().unwrap_or_else(|| panic!("Unknown plan {slug}"))
    }

    pub fn last_order(&self) -> &OrderDetail {
        self.orders.last().expect("No order has been created")
    }

    /// Records the outcome of a step that produces an order.
    pub fn record(&mut self, result: Result<OrderDetail, EngineError>) {
        match result {
            Ok(order) => {
                self.last_error = None;
                self.orders.push(order);
            },
            Err(e) => {
                debug!("Step failed with {e}");
                self.last_error = Some(e);
            },
        }
    }

    /// Re-reads the latest order from the database.
    pub async fn refresh_last_order(&mut self) {
        let order = self.last_order();
        let caller = self.caller_for_user(order.order.user_id);
        let fresh = self.system().accounts.get_order(&caller, order.order.id).await.expect("Error fetching order");
        self.orders.push(fresh);
    }

    fn caller_for_user(&self, user_id: i64) -> Caller {
        self.users.values().find(|c| c.user_id == user_id).cloned().expect("Order belongs to an unknown user")
    }

    pub async fn recharge(&self, name: &str, amount: i64) {
        let caller = self.caller(name);
        let tx = NewBalanceTransaction::recharge(Cents::from(amount), format!("cucumber-{}", rand::random::<u32>()));
        self.system().wallet.apply_transaction(caller.user_id, tx).await.expect("Error recharging wallet");
    }

    pub async fn balance(&self, name: &str) -> Cents {
        let caller = self.caller(name);
        self.system().db.fetch_balance(caller.user_id).await.expect("Error fetching balance").balance_cents
    }

    pub async fn ledger(&self, name: &str) -> Vec<BalanceTransaction> {
        let caller = self.caller(name);
        let query = TransactionQuery::new(1, 1000);
        let (rows, _) =
            self.system().db.fetch_transactions(caller.user_id, &query).await.expect("Error reading ledger");
        rows
    }
}
