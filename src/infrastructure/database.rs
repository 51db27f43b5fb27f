use crate::config::DatabaseSettings;
use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Shared Postgres pool for the credential and audit stores
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open a pool against the configured server
    pub async fn connect(settings: &DatabaseSettings, url: &str) -> Result<Self> {
        info!(
            host = %settings.host,
            database = %settings.database_name,
            max_connections = settings.max_connections,
            "Connecting to database"
        );
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
