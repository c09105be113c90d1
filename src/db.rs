//! Database connection management
//!
//! Handles connection pooling for the target and logging databases. Pools
//! are created per database name because the catalog and error tables may
//! live in a different database than the namespace being described.

pub mod queries;

use crate::config::DatabaseConfig;
use crate::error::AppError;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Session manager handling one connection pool per database
pub struct SessionManager {
    /// Connection parameters shared by every pool
    base: DatabaseConfig,

    /// Pools keyed by database name
    pools: RwLock<HashMap<String, Pool>>,
}

impl SessionManager {
    /// Create a new session manager and verify credentials against the
    /// configured database
    pub async fn new(config: &DatabaseConfig) -> Result<Self, AppError> {
        let manager = Self {
            base: config.clone(),
            pools: RwLock::new(HashMap::new()),
        };

        let pool = manager.pool_for(&config.database).await?;
        let client = pool.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        drop(client);

        info!("Connection pool established for {}", config.database);
        Ok(manager)
    }

    /// Get (or lazily create) the pool for a database
    pub async fn pool_for(&self, database: &str) -> Result<Pool, AppError> {
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(database) {
                return Ok(pool.clone());
            }
        }

        let pool = Self::create_pool(&self.base, database)?;
        debug!("Created connection pool for database: {}", database);

        let mut pools = self.pools.write().await;
        let entry = pools.entry(database.to_string()).or_insert(pool);
        Ok(entry.clone())
    }

    /// Create a connection pool for the given database
    fn create_pool(base: &DatabaseConfig, database: &str) -> Result<Pool, AppError> {
        let mut cfg = Config::new();
        cfg.host = Some(base.host.clone());
        cfg.port = Some(base.port);
        cfg.user = Some(base.user.clone());
        cfg.password = Some(base.password.clone());
        cfg.dbname = Some(database.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        if base.require_tls {
            let certs = rustls_native_certs::load_native_certs();
            let mut root_store = rustls::RootCertStore::empty();
            for cert in certs.certs {
                root_store.add(cert).ok();
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

            cfg.create_pool(Some(Runtime::Tokio1), tls)
                .map_err(|e| AppError::Config(format!("Failed to create TLS pool: {}", e)))
        } else {
            cfg.create_pool(Some(Runtime::Tokio1), NoTls)
                .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))
        }
    }
}
