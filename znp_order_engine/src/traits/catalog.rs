use crate::{
    db_types::{Plan, UserSummary},
    traits::StoreError,
};

/// Plans are managed elsewhere in the panel. The engine only ever reads one to take a snapshot of it.
#[allow(async_fn_in_trait)]
pub trait PlanCatalog {
    async fn fetch_plan(&self, plan_id: i64) -> Result<Option<Plan>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait UserDirectory {
    async fn fetch_user(&self, user_id: i64) -> Result<Option<UserSummary>, StoreError>;

    async fn fetch_users(&self, user_ids: &[i64]) -> Result<Vec<UserSummary>, StoreError>;
}
