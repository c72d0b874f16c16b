use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AdminService, AuthService, SeaOrmAdminService, SeaOrmAuthService, WorkbookService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub auth_service: Arc<dyn AuthService>,

    pub admin_service: Arc<dyn AdminService>,

    pub workbook_service: Arc<WorkbookService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::from_config(&config).await?;
        Self::with_store(config, store).await
    }

    pub async fn with_store(config: Config, store: Store) -> anyhow::Result<Self> {
        store.ensure_bootstrap_admin(&config.bootstrap).await?;

        let auth_service = Arc::new(SeaOrmAuthService::new(store.clone())) as Arc<dyn AuthService>;

        let admin_service = Arc::new(SeaOrmAdminService::new(
            store.clone(),
            auth_service.clone(),
        )) as Arc<dyn AdminService>;

        let workbook_service = Arc::new(WorkbookService::new(store.clone()));

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            auth_service,
            admin_service,
            workbook_service,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
