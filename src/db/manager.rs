use std::sync::Arc;
use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::db::postgres::PostgresPostgisStore;
use crate::db::{DatabaseError, PostgisStore};

pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct DatabaseManager {
    store: Arc<dyn PostgisStore>,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let connection_string = config
            .connection_string()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        let max_connections = config.max_connections();
        let timeout = Duration::from_secs(config.connect_timeout.max(1));

        info!(url = %config.redacted_url(), "connecting to database");

        let pool = tokio::task::spawn_blocking(move || {
            let manager = ConnectionManager::<PgConnection>::new(connection_string);
            r2d2::Pool::builder()
                .max_size(max_connections)
                .min_idle(Some(1))
                .connection_timeout(timeout)
                .build(manager)
                .map_err(|e| DatabaseError::Connection(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Connection(format!("connection task failed: {e}")))??;

        let store = Arc::new(PostgresPostgisStore::new(pool));

        Ok(Self { store })
    }

    pub fn store(&self) -> Arc<dyn PostgisStore> {
        self.store.clone()
    }
}
