use std::sync::Arc;

use crate::{
    auth::{AuthService, JwtKeys},
    config::AppConfig,
    users::{InMemoryUserStore, PgUserStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: Arc<JwtKeys>,
    pub auth: AuthService,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match config.database_url.as_deref() {
            Some(url) => Arc::new(PgUserStore::connect(url, config.store_timeout()).await?),
            None => Arc::new(InMemoryUserStore::new()),
        };
        Ok(Self::from_parts(Arc::new(config), store))
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn UserStore>) -> Self {
        let keys = Arc::new(JwtKeys::from_config(&config.jwt));
        let auth = AuthService::new(store, keys.clone(), config.store_timeout());
        Self { config, keys, auth }
    }
}
