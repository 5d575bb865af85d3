use super::error::{ModelError, ModelResult};
use crate::connection::config::ConnectionConfig;
use crate::connection::connector::{MemoryConnector, StoreConnector};
use crate::connection::pool::{ConnectionPool, PoolGuard, PoolStats};
use crate::connection::ConnectionError;
use lazy_static::lazy_static;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

lazy_static! {
    static ref GLOBAL_SOURCE: Arc<DataSource> = {
        let connector: Arc<dyn StoreConnector> = MemoryConnector::global().clone();
        Arc::new(DataSource::new(connector))
    };
}

/// Pool overrides applied on top of what the endpoint URI says.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub min_connections: Option<usize>,
    pub max_connections: Option<usize>,
    pub acquire_timeout: Option<Duration>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = Some(min);
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    fn apply(&self, mut config: ConnectionConfig) -> ConnectionConfig {
        if let Some(min) = self.min_connections {
            config.min_connections = min;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        if let Some(timeout) = self.acquire_timeout {
            config.acquire_timeout = timeout;
        }
        config
    }
}

/// Handle to the connected database.
#[derive(Clone)]
pub struct Database {
    pool: Arc<ConnectionPool>,
}

impl Database {
    pub fn name(&self) -> &str {
        self.pool.database()
    }

    /// Check a connection out of the shared pool.
    pub async fn connection(&self) -> ModelResult<PoolGuard> {
        Ok(self.pool.get_connection().await?)
    }

    pub async fn stats(&self) -> PoolStats {
        self.pool.stats().await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("name", &self.name()).finish()
    }
}

/// Shared connection state
///
/// Holds at most one connection pool. Every persistence service built on the same
/// source shares it.
///
/// # Examples
///
/// ```
/// # use tenant_docstore::model::{ConnectOptions, DataSource};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = DataSource::in_memory();
/// let db = source.connect("memdb://localhost", "hotel", ConnectOptions::new()).await?;
/// assert_eq!(db.name(), "hotel");
///
/// source.disconnect().await;
/// assert!(!source.is_connected().await);
/// # Ok(())
/// # }
/// ```
pub struct DataSource {
    connector: Arc<dyn StoreConnector>,
    database: RwLock<Option<Database>>,
}

impl DataSource {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            database: RwLock::new(None),
        }
    }

    /// A source with its own private in-process store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryConnector::new()))
    }

    /// Process-wide source.
    pub fn global() -> Arc<DataSource> {
        Arc::clone(&GLOBAL_SOURCE)
    }

    /// Connect to `endpoint` using `namespace` as the database name.
    ///
    /// Returns the existing handle when already connected.
    pub async fn connect(&self, endpoint: &str, namespace: &str, options: ConnectOptions) -> ModelResult<Database> {
        let config = ConnectionConfig::from_url(endpoint).map_err(ConnectionError::InvalidConfig)?;
        let config = options.apply(config.database(namespace));
        self.connect_with_config(config).await
    }

    pub async fn connect_with_config(&self, config: ConnectionConfig) -> ModelResult<Database> {
        let mut slot = self.database.write().await;
        if let Some(database) = slot.as_ref() {
            tracing::debug!(database = %database.name(), "already connected");
            return Ok(database.clone());
        }

        let store = self.connector.connect(&config).await?;
        let pool = ConnectionPool::new(config, store).await?;
        let database = Database { pool: Arc::new(pool) };
        tracing::info!(
            url = %database.pool.config().to_url(),
            max_connections = database.pool.config().max_connections,
            "connected"
        );
        *slot = Some(database.clone());
        Ok(database)
    }

    /// Close the pool and forget the handle. A later `connect` starts over.
    pub async fn disconnect(&self) {
        let taken = self.database.write().await.take();
        if let Some(database) = taken {
            database.pool.close().await;
            tracing::info!(database = %database.name(), "disconnected");
        }
    }

    /// The connected database, or `NotInitialized`.
    pub async fn database(&self) -> ModelResult<Database> {
        self.database.read().await.clone().ok_or(ModelError::NotInitialized)
    }

    pub async fn is_connected(&self) -> bool {
        self.database.read().await.is_some()
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource").finish_non_exhaustive()
    }
}
