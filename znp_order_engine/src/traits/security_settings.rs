use crate::{db_types::ApiSecuritySetting, traits::StoreError};

#[allow(async_fn_in_trait)]
pub trait SecuritySettingsStore {
    /// The effective (most recently updated) third-party API setting, if one has been configured.
    async fn fetch_security_setting(&self) -> Result<Option<ApiSecuritySetting>, StoreError>;
}
