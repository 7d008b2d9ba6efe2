use crate::config::Config;
use gslas_orchestrator::Portal;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub portal: Portal,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        Self {
            portal: Portal::new(pool).with_portal_url(config.portal_url.clone()),
            config: Arc::new(config),
        }
    }
}
