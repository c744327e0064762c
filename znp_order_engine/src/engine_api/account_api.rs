//! Read access to orders and wallets, for order owners and for admins.
use std::{collections::HashMap, fmt::Debug};

use log::trace;

use crate::{
    db_types::Order,
    engine_api::{
        caller::Caller,
        context::EngineContext,
        errors::EngineError,
        order_objects::{
            AdminOrderDetail,
            AdminOrderSummary,
            BalanceStatement,
            OrderDetail,
            OrderList,
            OrderQueryFilter,
            Pagination,
            TransactionQuery,
        },
    },
    traits::{BalanceStore, LedgerStore, OrderStore, UserDirectory},
};

pub struct AccountApi<B> {
    db: B,
    ctx: EngineContext,
}

impl<B: Debug> Debug for AccountApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountApi ({:?})", self.db)
    }
}

impl<B> AccountApi<B> {
    pub fn new(db: B, ctx: EngineContext) -> Self {
        Self { db, ctx }
    }
}

impl<B> AccountApi<B>
where B: BalanceStore + LedgerStore + OrderStore + UserDirectory
{
    /// Fetches one of the caller's orders, with its items, refunds and payment attempts. Other users' orders are
    /// `Forbidden`, even for admins, who should use [`AccountApi::admin_get_order`].
    pub async fn get_order(&self, caller: &Caller, order_id: i64) -> Result<OrderDetail, EngineError> {
        let work = async {
            let detail = self
                .db
                .fetch_order_detail(order_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("Order {order_id}")))?;
            if detail.order.user_id != caller.user_id {
                return Err(EngineError::Forbidden(format!("Order {} belongs to another user", detail.order.number)));
            }
            Ok::<_, EngineError>(detail)
        };
        self.ctx.within_deadline(self.ctx.deadline_for(Some(caller)), work).await
    }

    /// Lists the caller's orders. Any `user_id` in the filter is replaced by the caller's id.
    pub async fn list_orders(
        &self,
        caller: &Caller,
        filter: OrderQueryFilter,
    ) -> Result<OrderList<Order>, EngineError> {
        let filter = filter.with_user_id(caller.user_id).normalized(self.ctx.config().max_per_page);
        let (orders, total) =
            self.ctx.within_deadline(self.ctx.deadline_for(Some(caller)), self.db.search_orders(&filter)).await?;
        trace!("📦️ {} of {total} orders fetched for user #{}", orders.len(), caller.user_id);
        Ok(OrderList { orders, pagination: Pagination::new(filter.page, filter.per_page, total) })
    }

    /// The caller's wallet balance and one page of their ledger, newest first.
    pub async fn get_balance(&self, caller: &Caller, query: TransactionQuery) -> Result<BalanceStatement, EngineError> {
        let query = query.normalized(self.ctx.config().max_per_page);
        let work = async {
            let balance = self.db.fetch_balance(caller.user_id).await?;
            let (transactions, total) = self.db.fetch_transactions(caller.user_id, &query).await?;
            Ok::<_, EngineError>(BalanceStatement {
                balance,
                transactions,
                pagination: Pagination::new(query.page, query.per_page, total),
            })
        };
        self.ctx.within_deadline(self.ctx.deadline_for(Some(caller)), work).await
    }

    /// Searches every user's orders. Each order comes with a summary of its owner.
    pub async fn admin_list_orders(
        &self,
        caller: &Caller,
        filter: OrderQueryFilter,
    ) -> Result<OrderList<AdminOrderSummary>, EngineError> {
        caller.require_admin()?;
        let filter = filter.normalized(self.ctx.config().max_per_page);
        let work = async {
            let (orders, total) = self.db.search_orders(&filter).await?;
            let mut user_ids = orders.iter().map(|o| o.user_id).collect::<Vec<_>>();
            user_ids.sort_unstable();
            user_ids.dedup();
            let users = self.db.fetch_users(&user_ids).await?;
            let users = users.into_iter().map(|u| (u.id, u)).collect::<HashMap<_, _>>();
            let orders = orders
                .into_iter()
                .map(|order| {
                    let user = users.get(&order.user_id).cloned();
                    AdminOrderSummary { order, user }
                })
                .collect();
            Ok::<_, EngineError>(OrderList { orders, pagination: Pagination::new(filter.page, filter.per_page, total) })
        };
        self.ctx.within_deadline(self.ctx.deadline_for(Some(caller)), work).await
    }

    pub async fn admin_get_order(&self, caller: &Caller, order_id: i64) -> Result<AdminOrderDetail, EngineError> {
        caller.require_admin()?;
        let work = async {
            let detail = self
                .db
                .fetch_order_detail(order_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("Order {order_id}")))?;
            let user = self.db.fetch_user(detail.order.user_id).await?;
            Ok::<_, EngineError>(AdminOrderDetail { detail, user })
        };
        self.ctx.within_deadline(self.ctx.deadline_for(Some(caller)), work).await
    }
}
