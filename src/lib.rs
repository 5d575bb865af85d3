// ============================================================================
// tenant-docstore Library
// ============================================================================

pub mod connection;
pub mod core;
pub mod entities;
pub mod model;
pub mod schema;
pub mod storage;
pub mod tenant;

/// Boundary record: field names to JSON values, keyed by `id` rather than `_id`.
pub type Record = serde_json::Map<String, serde_json::Value>;

// Re-export main types for convenience
pub use core::{ObjectId, StoreError, StoreResult, Value};
pub use model::{
    ConnectOptions, DataSource, EntityDefinition, EntityHooks, ModelError, ModelResult, PersistenceService,
};
pub use schema::{EntitySchemas, FieldRule, ObjectSchema, ValidationError};
pub use storage::{DocumentStore, FindOneAndUpdateOptions, FindOptions, IndexSpec, MemoryStore, ReturnDocument, SortDirection};
pub use tenant::{RequestContext, TenantResolver};

// Re-export connection API
pub use connection::{
    Connection, ConnectionError,
    config::ConnectionConfig,
    connector::{MemoryConnector, StoreConnector},
    pool::{ConnectionPool, PoolGuard, PoolStats},
};

/// Build a [`Record`] from JSON object syntax.
///
/// ```
/// use tenant_docstore::record;
///
/// let filter = record!({"email": "ada@example.com", "status": {"$ne": "read"}});
/// assert_eq!(filter.len(), 2);
/// ```
///
/// Anything other than an object literal yields an empty record.
#[macro_export]
macro_rules! record {
    ($($json:tt)+) => {
        match ::serde_json::json!($($json)+) {
            ::serde_json::Value::Object(map) => map,
            _ => ::serde_json::Map::new(),
        }
    };
}
