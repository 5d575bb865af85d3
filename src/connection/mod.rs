pub mod config;
pub mod connector;
pub mod pool;

use crate::storage::{DocumentStore, Namespace};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Invalid connection configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported connection scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Connection pool timeout: no connections available after {0:?}")]
    Timeout(Duration),

    #[error("Connection pool is closed")]
    PoolClosed,
}

pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Store connection handle
///
/// Bound to one database of one store; hands out namespaces inside it.
#[derive(Clone)]
pub struct Connection {
    /// Unique connection ID
    id: u64,
    /// Shared store instance
    store: Arc<dyn DocumentStore>,
    database: String,
}

impl Connection {
    pub(crate) fn new(id: u64, store: Arc<dyn DocumentStore>, database: String) -> Self {
        Self { id, store, database }
    }

    /// Get connection ID
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Namespace of `collection` in this connection's database.
    pub fn namespace(&self, collection: &str) -> Namespace {
        Namespace::new(self.database.clone(), collection)
    }

    pub fn is_active(&self) -> bool {
        !self.store.is_closed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}
