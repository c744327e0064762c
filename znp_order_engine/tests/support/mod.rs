#![allow(dead_code)]
use znp_common::Cents;
use znp_order_engine::{
    db_types::{BalanceTransaction, NewBalanceTransaction, NewPlan, Plan},
    engine_api::order_objects::TransactionQuery,
    sqlite::db::ledger,
    test_utils::{
        prepare_env::{fresh_database, tear_down},
        seed::{seed_admin, seed_plan, seed_user},
    },
    traits::{BalanceStore, LedgerStore, WalletReceipt},
    AccountApi,
    Caller,
    EngineConfig,
    EngineContext,
    OrderFlowApi,
    SqliteDatabase,
    WalletApi,
};

/// One fresh database with every engine API on top of it.
pub struct Harness {
    pub db: SqliteDatabase,
    pub ctx: EngineContext,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub accounts: AccountApi<SqliteDatabase>,
    pub wallet: WalletApi<SqliteDatabase>,
}

impl Harness {
    pub async fn new() -> Self {
        let ctx = EngineContext::new(EngineConfig::default()).expect("Error creating metrics");
        Self::with_context(ctx).await
    }

    pub async fn with_context(ctx: EngineContext) -> Self {
        let db = fresh_database().await;
        let orders = OrderFlowApi::new(db.clone(), ctx.clone());
        let accounts = AccountApi::new(db.clone(), ctx.clone());
        let wallet = WalletApi::new(db.clone(), ctx.clone());
        Self { db, ctx, orders, accounts, wallet }
    }

    pub async fn user(&self, email: &str) -> Caller {
        let user = seed_user(&self.db, email).await;
        Caller::user(user.id, user.email)
    }

    pub async fn admin(&self, email: &str) -> Caller {
        let user = seed_admin(&self.db, email).await;
        Caller::admin(user.id, user.email)
    }

    pub async fn plan(&self, slug: &str, price: i64) -> Plan {
        seed_plan(&self.db, NewPlan::new(slug, slug, Cents::from(price))).await
    }

    pub async fn recharge(&self, user_id: i64, amount: i64) -> WalletReceipt {
        let tx = NewBalanceTransaction::recharge(Cents::from(amount), format!("recharge-{}", rand::random::<u32>()));
        self.wallet.apply_transaction(user_id, tx).await.expect("Error recharging wallet")
    }

    pub async fn balance(&self, user_id: i64) -> i64 {
        self.db.fetch_balance(user_id).await.expect("Error fetching balance").balance_cents.value()
    }

    /// Every ledger row of the user, newest first.
    pub async fn ledger(&self, user_id: i64) -> Vec<BalanceTransaction> {
        let (rows, _) =
            self.db.fetch_transactions(user_id, &TransactionQuery::new(1, 1000)).await.expect("Error fetching ledger");
        rows
    }

    /// Checks that the stored balance, the ledger sum and the newest running balance all agree, and are not negative.
    pub async fn assert_wallet_consistent(&self, user_id: i64) {
        let balance = self.db.fetch_balance(user_id).await.expect("Error fetching balance");
        let mut conn = self.db.pool().acquire().await.expect("Error acquiring connection");
        let sum = ledger::ledger_sum(user_id, &mut conn).await.expect("Error summing ledger");
        assert_eq!(balance.balance_cents, sum, "balance does not match the ledger sum");
        assert!(!balance.balance_cents.is_negative(), "balance is negative");
        if let Some(last) = self.ledger(user_id).await.first() {
            assert_eq!(last.balance_after_cents, balance.balance_cents, "running balance is out of date");
            assert_eq!(balance.last_transaction_id, Some(last.id));
        }
    }

    pub async fn tear_down(self) {
        tear_down(self.db).await;
    }
}
