use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

const DEFAULT_PORTAL_URL: &str = "http://127.0.0.1:8000/";

/// Entry point to every portal operation. Cheap to clone.
#[derive(Clone)]
pub struct Portal {
    pool: SqlitePool,
    portal_url: String,
}

impl Portal {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            portal_url: DEFAULT_PORTAL_URL.to_string(),
        }
    }

    /// Link included in notification mails.
    pub fn with_portal_url(mut self, url: impl Into<String>) -> Self {
        self.portal_url = url.into();
        self
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn portal_url(&self) -> &str {
        &self.portal_url
    }
}

pub(crate) fn from_timestamp(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}
