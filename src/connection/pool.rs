use super::{Connection, ConnectionError, ConnectionResult, config::ConnectionConfig};
use crate::storage::DocumentStore;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// Connection pool
///
/// Bounds concurrent use of a store to `max_connections`. Callers waiting for a slot
/// suspend on a semaphore until one frees up or the acquire timeout elapses.
pub struct ConnectionPool {
    /// Pool configuration
    config: ConnectionConfig,
    /// Available connections
    available: Arc<Mutex<VecDeque<PooledConnection>>>,
    /// One permit per connection that may be checked out
    permits: Arc<Semaphore>,
    /// Total number of connections created and not yet discarded
    total_connections: Arc<AtomicUsize>,
    store: Arc<dyn DocumentStore>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// A connection from the pool
struct PooledConnection {
    connection: Connection,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(connection: Connection) -> Self {
        let now = Instant::now();
        Self {
            connection,
            created_at: now,
            last_used: now,
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        max_lifetime.is_some_and(|lifetime| self.created_at.elapsed() > lifetime)
    }

    fn is_idle_too_long(&self, idle_timeout: Option<Duration>) -> bool {
        idle_timeout.is_some_and(|timeout| self.last_used.elapsed() > timeout)
    }
}

impl ConnectionPool {
    /// Create a pool over an already connected store
    pub async fn new(config: ConnectionConfig, store: Arc<dyn DocumentStore>) -> ConnectionResult<Self> {
        config.validate().map_err(ConnectionError::InvalidConfig)?;

        let pool = Self {
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
            store,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        };

        // Pre-create minimum connections
        pool.ensure_min_connections().await;

        Ok(pool)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> ConnectionResult<PoolGuard> {
        if self.is_closed() {
            return Err(ConnectionError::PoolClosed);
        }

        let permit = match tokio::time::timeout(self.config.acquire_timeout, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ConnectionError::PoolClosed),
            Err(_) => {
                tracing::warn!(
                    max_connections = self.config.max_connections,
                    timeout_ms = self.config.acquire_timeout.as_millis() as u64,
                    "connection pool exhausted"
                );
                return Err(ConnectionError::Timeout(self.config.acquire_timeout));
            }
        };

        let connection = match self.try_get_available().await {
            Some(pooled) => pooled.connection,
            None => self.create_connection(),
        };

        Ok(PoolGuard {
            connection,
            pool: self.available.clone(),
            total_connections: self.total_connections.clone(),
            _permit: permit,
        })
    }

    /// Try to get an available connection from the pool
    async fn try_get_available(&self) -> Option<PooledConnection> {
        let mut available = self.available.lock().await;

        let before = available.len();
        available.retain(|pooled| {
            !pooled.is_expired(self.config.max_lifetime) && !pooled.is_idle_too_long(self.config.idle_timeout)
        });
        let removed = before - available.len();
        if removed > 0 {
            self.total_connections.fetch_sub(removed, Ordering::SeqCst);
            tracing::debug!(removed, "discarded stale pooled connections");
        }

        available.pop_front()
    }

    fn create_connection(&self) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.total_connections.fetch_add(1, Ordering::SeqCst);
        Connection::new(id, Arc::clone(&self.store), self.config.database.clone())
    }

    /// Ensure minimum number of connections
    async fn ensure_min_connections(&self) {
        let mut available = self.available.lock().await;
        while self.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            let connection = self.create_connection();
            available.push_back(PooledConnection::new(connection));
        }
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let available = self.available.lock().await;
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available.len(),
            active_connections: total.saturating_sub(available.len()),
            max_connections: self.config.max_connections,
        }
    }

    /// Stop handing out connections and drop the idle ones.
    ///
    /// Guards already checked out stay usable until dropped.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.permits.close();
        let mut available = self.available.lock().await;
        let idle = available.len();
        available.clear();
        self.total_connections.fetch_sub(idle, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool and releases its slot when dropped
pub struct PoolGuard {
    connection: Connection,
    pool: Arc<Mutex<VecDeque<PooledConnection>>>,
    total_connections: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl std::ops::Deref for PoolGuard {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.connection
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        // Try to return to pool if we can acquire the lock immediately
        if let Ok(mut pool) = self.pool.try_lock() {
            pool.push_back(PooledConnection::new(self.connection.clone()));
        } else {
            tracing::warn!(connection_id = self.connection.id(), "pool lock busy on release, discarding connection");
            self.total_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    async fn pool(config: ConnectionConfig) -> ConnectionPool {
        ConnectionPool::new(config, Arc::new(MemoryStore::new())).await.unwrap()
    }

    #[tokio::test]
    async fn test_pool_creation() {
        let pool = pool(ConnectionConfig::default().min_connections(2).max_connections(5)).await;
        let stats = pool.stats().await;

        assert_eq!(stats.total_connections, 2); // min_connections
        assert_eq!(stats.available_connections, 2);
    }

    #[tokio::test]
    async fn test_get_connection() {
        let pool = pool(ConnectionConfig::default().database("hotel")).await;
        let conn = pool.get_connection().await.unwrap();

        assert!(conn.is_active());
        assert_eq!(conn.namespace("users").to_string(), "hotel.users");
    }

    #[tokio::test]
    async fn test_connection_return_to_pool() {
        let pool = pool(ConnectionConfig::default().min_connections(1).max_connections(5)).await;

        {
            let _conn = pool.get_connection().await.unwrap();
            let stats = pool.stats().await;
            assert_eq!(stats.active_connections, 1);
            assert_eq!(stats.available_connections, 0);
        } // Connection returned here

        let stats = pool.stats().await;
        assert_eq!(stats.available_connections, 1);
        assert_eq!(stats.total_connections, 1);
    }

    #[tokio::test]
    async fn test_max_connections_limit() {
        let pool = pool(
            ConnectionConfig::default()
                .max_connections(2)
                .acquire_timeout(Duration::from_millis(50)),
        )
        .await;

        let _conn1 = pool.get_connection().await.unwrap();
        let _conn2 = pool.get_connection().await.unwrap();

        // Third connection should timeout
        let result = pool.get_connection().await;
        assert!(matches!(result, Err(ConnectionError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_waiter_gets_released_slot() {
        let pool = Arc::new(
            pool(
                ConnectionConfig::default()
                    .max_connections(1)
                    .acquire_timeout(Duration::from_secs(5)),
            )
            .await,
        );

        let held = pool.get_connection().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get_connection().await.map(|conn| conn.id()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let held_id = held.id();
        drop(held);

        assert_eq!(waiter.await.unwrap().unwrap(), held_id);
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_connections() {
        let pool = pool(ConnectionConfig::default().min_connections(2)).await;
        pool.close().await;
        pool.close().await;
        assert!(matches!(pool.get_connection().await, Err(ConnectionError::PoolClosed)));
        assert_eq!(pool.stats().await.total_connections, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let result = ConnectionPool::new(ConnectionConfig::default().max_connections(0), Arc::new(MemoryStore::new())).await;
        assert!(matches!(result, Err(ConnectionError::InvalidConfig(_))));
    }
}
