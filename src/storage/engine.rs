use super::index::IndexSpec;
use super::options::{FindOneAndUpdateOptions, FindOptions};
use crate::core::{Document, ObjectId, StoreResult};
use crate::schema::CollectionValidator;
use async_trait::async_trait;
use std::fmt;

/// Fully qualified collection name: `database.collection`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Options for explicit collection creation.
#[derive(Debug, Clone, Default)]
pub struct CollectionOptions {
    pub validator: Option<CollectionValidator>,
}

impl CollectionOptions {
    pub fn with_validator(validator: CollectionValidator) -> Self {
        Self {
            validator: Some(validator),
        }
    }
}

/// Catalog entry returned by `list_collections`.
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub name: String,
    pub document_count: usize,
    pub has_validator: bool,
}

/// Document store driver interface.
///
/// Writes to a missing collection create it implicitly; reads from one behave as if it
/// were empty.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_collections(&self, database: &str) -> StoreResult<Vec<CollectionInfo>>;

    /// Fails with `NamespaceExists` when the collection is already present.
    async fn create_collection(&self, ns: &Namespace, options: CollectionOptions) -> StoreResult<()>;

    /// Replace the ruleset of an existing collection (`collMod`).
    async fn modify_collection(&self, ns: &Namespace, validator: Option<CollectionValidator>) -> StoreResult<()>;

    async fn create_index(&self, ns: &Namespace, spec: IndexSpec) -> StoreResult<String>;

    async fn list_indexes(&self, ns: &Namespace) -> StoreResult<Vec<IndexSpec>>;

    async fn find(&self, ns: &Namespace, filter: &Document, options: &FindOptions) -> StoreResult<Vec<Document>>;

    async fn find_one(&self, ns: &Namespace, filter: &Document) -> StoreResult<Option<Document>>;

    async fn insert_one(&self, ns: &Namespace, document: Document) -> StoreResult<ObjectId>;

    async fn insert_many(&self, ns: &Namespace, documents: Vec<Document>) -> StoreResult<Vec<ObjectId>>;

    async fn find_one_and_update(
        &self,
        ns: &Namespace,
        filter: &Document,
        update: &Document,
        options: &FindOneAndUpdateOptions,
    ) -> StoreResult<Option<Document>>;

    async fn delete_one(&self, ns: &Namespace, filter: &Document) -> StoreResult<u64>;

    async fn delete_many(&self, ns: &Namespace, filter: &Document) -> StoreResult<u64>;

    async fn count(&self, ns: &Namespace, filter: &Document) -> StoreResult<u64>;

    /// Refuse every further operation.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}
