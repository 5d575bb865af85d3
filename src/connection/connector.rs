use super::config::{ConnectionConfig, MEMORY_SCHEME};
use super::{ConnectionError, ConnectionResult};
use crate::storage::{DocumentStore, MemoryStore};
use async_trait::async_trait;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

lazy_static! {
    static ref GLOBAL_CONNECTOR: Arc<MemoryConnector> = Arc::new(MemoryConnector::new());
}

/// Turns a connection configuration into a store handle.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> ConnectionResult<Arc<dyn DocumentStore>>;
}

/// Connector for `memdb://` endpoints.
///
/// Keeps one store per endpoint, so reconnecting to the same host sees the same data.
pub struct MemoryConnector {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide connector.
    pub fn global() -> &'static Arc<MemoryConnector> {
        &GLOBAL_CONNECTOR
    }

    /// Close and forget the store behind an endpoint. Returns whether one existed.
    pub async fn shutdown(&self, endpoint: &str) -> bool {
        let removed = self.stores.lock().await.remove(endpoint);
        match removed {
            Some(store) => {
                store.close().await;
                true
            }
            None => false,
        }
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, config: &ConnectionConfig) -> ConnectionResult<Arc<dyn DocumentStore>> {
        if config.scheme != MEMORY_SCHEME {
            return Err(ConnectionError::UnsupportedScheme(config.scheme.clone()));
        }
        config.validate().map_err(ConnectionError::InvalidConfig)?;

        let mut stores = self.stores.lock().await;
        let store: Arc<dyn DocumentStore> = stores
            .entry(config.endpoint())
            .or_insert_with(|| {
                tracing::info!(endpoint = %config.endpoint(), "starting in-process store");
                Arc::new(MemoryStore::new())
            })
            .clone();
        Ok(store)
    }
}
