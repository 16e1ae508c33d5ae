//! PostgreSQL connector over a deadpool-postgres pool.

use super::tls::{SslMode, TlsBuilder};
use super::{Connector, SchemaExecutor};
use crate::config::DatastoreConfig;
use crate::error::{AutomigrateError, DriverError, Result};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, error, info};

/// Pooled PostgreSQL connections for one datastore.
pub struct PgConnector {
    pool: Pool,
    description: String,
}

impl PgConnector {
    /// Build the pool without connecting.
    pub fn new(config: &DatastoreConfig) -> Result<Self> {
        let pg_config: PgConfig = config
            .connection_string()
            .parse()
            .map_err(|e| AutomigrateError::Config(format!("invalid datastore settings: {}", e)))?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = match TlsBuilder::new(SslMode::parse(&config.ssl_mode)?).build()? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => Manager::from_config(pg_config, NoTls, mgr_config),
        };

        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| AutomigrateError::connection(e, "building connection pool"))?;

        let description = match &config.url {
            Some(_) => "datastore url".to_string(),
            None => format!("{}:{}/{}", config.host, config.port, config.database),
        };

        Ok(Self { pool, description })
    }

    /// Build the pool and verify connectivity with `SELECT 1`.
    pub async fn connect(config: &DatastoreConfig) -> Result<Self> {
        let connector = Self::new(config)?;
        connector.health_check().await?;
        info!("Connected to PostgreSQL: {}", connector.description);
        Ok(connector)
    }

    pub async fn health_check(&self) -> Result<()> {
        let conn = self.acquire().await?;
        conn.execute("SELECT 1")
            .await
            .map_err(|e| AutomigrateError::connection(e, "health check"))
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Conn = PgConnection;

    async fn acquire(&self) -> Result<PgConnection> {
        let client = self.pool.get().await.map_err(|e| {
            error!("Failed to acquire connection to {}: {}", self.description, e);
            AutomigrateError::connection(e, format!("acquiring connection to {}", self.description))
        })?;
        Ok(PgConnection { client })
    }
}

/// One pooled connection; returned to the pool on drop.
pub struct PgConnection {
    client: Object,
}

#[async_trait]
impl SchemaExecutor for PgConnection {
    async fn execute(&self, statement: &str) -> std::result::Result<(), DriverError> {
        debug!("Executing: {}", statement);
        self.client.batch_execute(statement).await?;
        Ok(())
    }

    async fn list_tables(&self, schema: &str) -> std::result::Result<Vec<String>, DriverError> {
        let rows = self
            .client
            .query(
                "SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = $1 ORDER BY tablename",
                &[&schema],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }
}
