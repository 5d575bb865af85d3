use super::collection::Collection;
use super::engine::{CollectionInfo, CollectionOptions, DocumentStore, Namespace};
use super::index::IndexSpec;
use super::options::{FindOneAndUpdateOptions, FindOptions};
use crate::core::{Document, ObjectId, StoreError, StoreResult};
use crate::schema::CollectionValidator;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-process document store.
///
/// Each collection sits behind its own lock so writers to different collections do not
/// contend; the catalog lock is only held to look up or register a collection.
pub struct MemoryStore {
    collections: RwLock<HashMap<Namespace, Arc<RwLock<Collection>>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    async fn get(&self, ns: &Namespace) -> StoreResult<Option<Arc<RwLock<Collection>>>> {
        self.ensure_open()?;
        Ok(self.collections.read().await.get(ns).cloned())
    }

    async fn get_or_create(&self, ns: &Namespace) -> StoreResult<Arc<RwLock<Collection>>> {
        if let Some(handle) = self.get(ns).await? {
            return Ok(handle);
        }
        let mut catalog = self.collections.write().await;
        let handle = catalog
            .entry(ns.clone())
            .or_insert_with(|| {
                tracing::debug!(collection = %ns, "creating collection implicitly");
                Arc::new(RwLock::new(Collection::new(ns.clone(), None)))
            })
            .clone();
        Ok(handle)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collections(&self, database: &str) -> StoreResult<Vec<CollectionInfo>> {
        self.ensure_open()?;
        let handles: Vec<_> = self
            .collections
            .read()
            .await
            .iter()
            .filter(|(ns, _)| ns.database == database)
            .map(|(ns, handle)| (ns.collection.clone(), handle.clone()))
            .collect();

        let mut infos = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let coll = handle.read().await;
            infos.push(CollectionInfo {
                name,
                document_count: coll.len(),
                has_validator: coll.validator().is_some(),
            });
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn create_collection(&self, ns: &Namespace, options: CollectionOptions) -> StoreResult<()> {
        self.ensure_open()?;
        let mut catalog = self.collections.write().await;
        if catalog.contains_key(ns) {
            return Err(StoreError::NamespaceExists(ns.to_string()));
        }
        catalog.insert(ns.clone(), Arc::new(RwLock::new(Collection::new(ns.clone(), options.validator))));
        Ok(())
    }

    async fn modify_collection(&self, ns: &Namespace, validator: Option<CollectionValidator>) -> StoreResult<()> {
        let handle = self
            .get(ns)
            .await?
            .ok_or_else(|| StoreError::NamespaceNotFound(ns.to_string()))?;
        handle.write().await.set_validator(validator);
        Ok(())
    }

    async fn create_index(&self, ns: &Namespace, spec: IndexSpec) -> StoreResult<String> {
        let handle = self.get_or_create(ns).await?;
        let mut coll = handle.write().await;
        coll.create_index(spec)
    }

    async fn list_indexes(&self, ns: &Namespace) -> StoreResult<Vec<IndexSpec>> {
        let handle = self
            .get(ns)
            .await?
            .ok_or_else(|| StoreError::NamespaceNotFound(ns.to_string()))?;
        let coll = handle.read().await;
        Ok(coll.index_specs())
    }

    async fn find(&self, ns: &Namespace, filter: &Document, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let Some(handle) = self.get(ns).await? else {
            super::filter::check(filter)?;
            return Ok(Vec::new());
        };
        let coll = handle.read().await;
        coll.find(filter, options)
    }

    async fn find_one(&self, ns: &Namespace, filter: &Document) -> StoreResult<Option<Document>> {
        let Some(handle) = self.get(ns).await? else {
            super::filter::check(filter)?;
            return Ok(None);
        };
        let coll = handle.read().await;
        coll.find_one(filter)
    }

    async fn insert_one(&self, ns: &Namespace, document: Document) -> StoreResult<ObjectId> {
        let handle = self.get_or_create(ns).await?;
        let mut coll = handle.write().await;
        coll.insert(document)
    }

    async fn insert_many(&self, ns: &Namespace, documents: Vec<Document>) -> StoreResult<Vec<ObjectId>> {
        let handle = self.get_or_create(ns).await?;
        let mut coll = handle.write().await;
        coll.insert_many(documents)
    }

    async fn find_one_and_update(
        &self,
        ns: &Namespace,
        filter: &Document,
        update: &Document,
        options: &FindOneAndUpdateOptions,
    ) -> StoreResult<Option<Document>> {
        let Some(handle) = self.get(ns).await? else {
            super::filter::check(filter)?;
            super::update::validate_update(update)?;
            return Ok(None);
        };
        let mut coll = handle.write().await;
        coll.find_one_and_update(filter, update, options)
    }

    async fn delete_one(&self, ns: &Namespace, filter: &Document) -> StoreResult<u64> {
        let Some(handle) = self.get(ns).await? else {
            return super::filter::check(filter).map(|_| 0);
        };
        let mut coll = handle.write().await;
        coll.delete_one(filter)
    }

    async fn delete_many(&self, ns: &Namespace, filter: &Document) -> StoreResult<u64> {
        let Some(handle) = self.get(ns).await? else {
            return super::filter::check(filter).map(|_| 0);
        };
        let mut coll = handle.write().await;
        coll.delete_many(filter)
    }

    async fn count(&self, ns: &Namespace, filter: &Document) -> StoreResult<u64> {
        let Some(handle) = self.get(ns).await? else {
            return super::filter::check(filter).map(|_| 0);
        };
        let coll = handle.read().await;
        coll.count(filter)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document_from_json;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        document_from_json(value.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn test_collections_are_created_on_first_write() {
        let store = MemoryStore::new();
        let ns = Namespace::new("app", "public.alerts");
        assert!(store.find_one(&ns, &doc(json!({}))).await.unwrap().is_none());
        assert!(store.list_collections("app").await.unwrap().is_empty());

        store.insert_one(&ns, doc(json!({"title": "hi"}))).await.unwrap();
        let infos = store.list_collections("app").await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "public.alerts");
        assert_eq!(infos[0].document_count, 1);
    }

    #[tokio::test]
    async fn test_explicit_creation_twice_fails() {
        let store = MemoryStore::new();
        let ns = Namespace::new("app", "TVs");
        store.create_collection(&ns, CollectionOptions::default()).await.unwrap();
        assert!(matches!(
            store.create_collection(&ns, CollectionOptions::default()).await,
            Err(StoreError::NamespaceExists(_))
        ));
    }

    #[tokio::test]
    async fn test_modify_missing_collection_fails() {
        let store = MemoryStore::new();
        let ns = Namespace::new("app", "ghost");
        assert!(matches!(
            store.modify_collection(&ns, None).await,
            Err(StoreError::NamespaceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_databases_are_separate() {
        let store = MemoryStore::new();
        store.insert_one(&Namespace::new("a", "users"), doc(json!({"n": 1}))).await.unwrap();
        assert_eq!(store.count(&Namespace::new("b", "users"), &doc(json!({}))).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_store_refuses_work() {
        let store = MemoryStore::new();
        store.close().await;
        assert!(store.is_closed());
        assert_eq!(
            store.insert_one(&Namespace::new("a", "b"), Document::new()).await.unwrap_err(),
            StoreError::Closed
        );
    }
}
