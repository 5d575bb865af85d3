use super::options::SortDirection;
use crate::core::{Document, KEY_FIELD, Value, lookup_path};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the index every collection carries on its primary key.
pub const PRIMARY_INDEX_NAME: &str = "_id_";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    pub unique: bool,
    pub sparse: bool,
    pub name: Option<String>,
}

/// Declaration of an index: an ordered key pattern plus options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub keys: Vec<(String, SortDirection)>,
    pub options: IndexOptions,
}

impl IndexSpec {
    pub fn new(keys: Vec<(String, SortDirection)>) -> Self {
        Self {
            keys,
            options: IndexOptions::default(),
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(vec![(field.into(), SortDirection::Ascending)])
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self::new(vec![(field.into(), SortDirection::Descending)])
    }

    pub fn and(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push((field.into(), direction));
        self
    }

    pub fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.options.sparse = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    pub(crate) fn primary() -> Self {
        Self::ascending(KEY_FIELD).unique().named(PRIMARY_INDEX_NAME)
    }

    /// Explicit name, or the `field_dir[_field_dir...]` convention.
    pub fn name(&self) -> String {
        if let Some(name) = &self.options.name {
            return name.clone();
        }
        self.keys
            .iter()
            .map(|(field, direction)| format!("{}_{}", field, direction.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(field, _)| field.as_str())
    }

    /// Same key pattern and the same uniqueness/sparseness, regardless of name.
    pub fn equivalent(&self, other: &IndexSpec) -> bool {
        self.keys == other.keys
            && self.options.unique == other.options.unique
            && self.options.sparse == other.options.sparse
    }
}

/// Materialized index: key tuple to the sequence numbers of the documents holding it.
#[derive(Debug, Clone)]
pub(crate) struct Index {
    spec: IndexSpec,
    entries: BTreeMap<Vec<Value>, BTreeSet<u64>>,
}

impl Index {
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeMap::new(),
        }
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    pub fn is_unique(&self) -> bool {
        self.spec.options.unique
    }

    /// Key tuple for a document. Sparse indexes skip documents missing every key field;
    /// otherwise missing fields index as null.
    pub fn key_for(&self, doc: &Document) -> Option<Vec<Value>> {
        let values: Vec<Option<&Value>> = self.spec.fields().map(|f| lookup_path(doc, f)).collect();
        if self.spec.options.sparse && values.iter().all(Option::is_none) {
            return None;
        }
        Some(values.into_iter().map(|v| v.cloned().unwrap_or(Value::Null)).collect())
    }

    /// Whether a document other than `ignore` already holds `key`.
    pub fn conflicts(&self, key: &[Value], ignore: Option<u64>) -> bool {
        self.entries
            .get(key)
            .is_some_and(|seqs| seqs.iter().any(|seq| Some(*seq) != ignore))
    }

    pub fn insert(&mut self, doc: &Document, seq: u64) {
        if let Some(key) = self.key_for(doc) {
            self.entries.entry(key).or_default().insert(seq);
        }
    }

    pub fn remove(&mut self, doc: &Document, seq: u64) {
        if let Some(key) = self.key_for(doc)
            && let Some(seqs) = self.entries.get_mut(&key)
        {
            seqs.remove(&seq);
            if seqs.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Render a key the way duplicate-key errors show it: `{ email: "a@b.io" }`.
    pub fn describe_key(&self, key: &[Value]) -> String {
        let parts: Vec<String> = self
            .spec
            .fields()
            .zip(key.iter())
            .map(|(field, value)| format!("{field}: {value}"))
            .collect();
        format!("{{ {} }}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document_from_json;
    use serde_json::json;

    #[test]
    fn test_default_names() {
        assert_eq!(IndexSpec::ascending("email").name(), "email_1");
        assert_eq!(IndexSpec::descending("createdAt").name(), "createdAt_-1");
        assert_eq!(
            IndexSpec::ascending("propertyId").and("roomId", SortDirection::Ascending).name(),
            "propertyId_1_roomId_1"
        );
        assert_eq!(IndexSpec::ascending("x").named("by_x").name(), "by_x");
    }

    #[test]
    fn test_sparse_skips_missing_fields() {
        let mut index = Index::new(IndexSpec::ascending("thingId").unique().sparse());
        let doc = document_from_json(json!({"model": "X1"}).as_object().cloned().unwrap());
        assert!(index.key_for(&doc).is_none());
        index.insert(&doc, 1);
        index.insert(&doc, 2);
        assert!(!index.conflicts(&[Value::Null], None));
    }

    #[test]
    fn test_conflict_ignores_self() {
        let mut index = Index::new(IndexSpec::ascending("email").unique());
        let doc = document_from_json(json!({"email": "a@b.io"}).as_object().cloned().unwrap());
        index.insert(&doc, 7);
        let key = index.key_for(&doc).unwrap();
        assert!(index.conflicts(&key, None));
        assert!(!index.conflicts(&key, Some(7)));
        assert_eq!(index.describe_key(&key), "{ email: \"a@b.io\" }");
    }
}
