use super::engine::Namespace;
use super::filter;
use super::index::{Index, IndexSpec};
use super::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, compare_documents};
use super::update::apply_update;
use crate::core::{Document, KEY_FIELD, ObjectId, StoreError, StoreResult, Value, document_into_json};
use crate::schema::{CollectionValidator, ValidationAction, ValidationLevel};
use std::collections::BTreeMap;

/// A named set of documents with its indexes and optional ruleset.
///
/// Documents are kept in insertion order under a private sequence number. Every write
/// runs the ruleset and the unique-index checks before touching state.
#[derive(Debug, Clone)]
pub struct Collection {
    namespace: Namespace,
    documents: BTreeMap<u64, Document>,
    next_seq: u64,
    indexes: Vec<Index>,
    validator: Option<CollectionValidator>,
}

impl Collection {
    pub fn new(namespace: Namespace, validator: Option<CollectionValidator>) -> Self {
        Self {
            namespace,
            documents: BTreeMap::new(),
            next_seq: 0,
            indexes: vec![Index::new(IndexSpec::primary())],
            validator,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn validator(&self) -> Option<&CollectionValidator> {
        self.validator.as_ref()
    }

    pub fn set_validator(&mut self, validator: Option<CollectionValidator>) {
        self.validator = validator;
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Build an index. Identical re-declarations are no-ops; a same-named index with a
    /// different definition is a conflict.
    pub fn create_index(&mut self, spec: IndexSpec) -> StoreResult<String> {
        let name = spec.name();
        if let Some(existing) = self.indexes.iter().find(|index| index.spec().name() == name) {
            if existing.spec().equivalent(&spec) {
                return Ok(name);
            }
            return Err(StoreError::IndexOptionsConflict(name));
        }

        let mut index = Index::new(spec);
        for (seq, doc) in &self.documents {
            if index.is_unique()
                && let Some(key) = index.key_for(doc)
                && index.conflicts(&key, None)
            {
                return Err(StoreError::duplicate_key(
                    &self.namespace.to_string(),
                    &name,
                    &index.describe_key(&key),
                ));
            }
            index.insert(doc, *seq);
        }
        self.indexes.push(index);
        Ok(name)
    }

    pub fn index_specs(&self) -> Vec<IndexSpec> {
        self.indexes.iter().map(|index| index.spec().clone()).collect()
    }

    pub fn insert(&mut self, mut doc: Document) -> StoreResult<ObjectId> {
        let id = match doc.get(KEY_FIELD) {
            Some(Value::ObjectId(id)) => *id,
            Some(other) => {
                return Err(StoreError::BadQuery(format!(
                    "_id must be an objectId, found {}",
                    other.type_name()
                )));
            }
            None => {
                let id = ObjectId::new();
                doc.insert(KEY_FIELD.to_string(), Value::ObjectId(id));
                id
            }
        };

        self.check_rules(&doc, None)?;
        self.check_unique(&doc, None)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        for index in &mut self.indexes {
            index.insert(&doc, seq);
        }
        self.documents.insert(seq, doc);
        Ok(id)
    }

    /// Ordered batch: documents before the first failure stay inserted.
    pub fn insert_many(&mut self, docs: Vec<Document>) -> StoreResult<Vec<ObjectId>> {
        docs.into_iter().map(|doc| self.insert(doc)).collect()
    }

    pub fn find(&self, filter: &Document, options: &FindOptions) -> StoreResult<Vec<Document>> {
        filter::check(filter)?;
        let mut hits: Vec<&Document> = Vec::new();
        for doc in self.documents.values() {
            if filter::matches(doc, filter)? {
                hits.push(doc);
            }
        }
        if !options.sort.is_empty() {
            hits.sort_by(|a, b| compare_documents(a, b, &options.sort));
        }
        let skip = options.skip.unwrap_or(0);
        // a zero limit means no limit
        let limit = options.limit.filter(|n| *n > 0).unwrap_or(usize::MAX);
        Ok(hits.into_iter().skip(skip).take(limit).cloned().collect())
    }

    pub fn find_one(&self, filter: &Document) -> StoreResult<Option<Document>> {
        Ok(self.find(filter, &FindOptions::new().limit(1))?.into_iter().next())
    }

    pub fn count(&self, filter: &Document) -> StoreResult<u64> {
        filter::check(filter)?;
        let mut n = 0;
        for doc in self.documents.values() {
            if filter::matches(doc, filter)? {
                n += 1;
            }
        }
        Ok(n)
    }

    pub fn find_one_and_update(
        &mut self,
        filter: &Document,
        update: &Document,
        options: &FindOneAndUpdateOptions,
    ) -> StoreResult<Option<Document>> {
        let Some(seq) = self.first_match(filter, options)? else {
            return Ok(None);
        };
        let Some(before) = self.documents.get(&seq).cloned() else {
            return Ok(None);
        };

        let mut after = before.clone();
        apply_update(&mut after, update)?;
        self.check_rules(&after, Some(&before))?;
        self.check_unique(&after, Some(seq))?;

        for index in &mut self.indexes {
            index.remove(&before, seq);
            index.insert(&after, seq);
        }
        self.documents.insert(seq, after.clone());

        Ok(Some(match options.return_document {
            ReturnDocument::Before => before,
            ReturnDocument::After => after,
        }))
    }

    pub fn delete_one(&mut self, filter: &Document) -> StoreResult<u64> {
        let options = FindOneAndUpdateOptions::new();
        match self.first_match(filter, &options)? {
            Some(seq) => {
                self.remove(seq);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    pub fn delete_many(&mut self, filter: &Document) -> StoreResult<u64> {
        filter::check(filter)?;
        let mut doomed = Vec::new();
        for (seq, doc) in &self.documents {
            if filter::matches(doc, filter)? {
                doomed.push(*seq);
            }
        }
        for seq in &doomed {
            self.remove(*seq);
        }
        Ok(doomed.len() as u64)
    }

    fn first_match(&self, filter: &Document, options: &FindOneAndUpdateOptions) -> StoreResult<Option<u64>> {
        filter::check(filter)?;
        let mut hits: Vec<(u64, &Document)> = Vec::new();
        for (seq, doc) in &self.documents {
            if filter::matches(doc, filter)? {
                if options.sort.is_empty() {
                    return Ok(Some(*seq));
                }
                hits.push((*seq, doc));
            }
        }
        hits.sort_by(|(_, a), (_, b)| compare_documents(a, b, &options.sort));
        Ok(hits.first().map(|(seq, _)| *seq))
    }

    fn remove(&mut self, seq: u64) {
        if let Some(doc) = self.documents.remove(&seq) {
            for index in &mut self.indexes {
                index.remove(&doc, seq);
            }
        }
    }

    fn check_unique(&self, doc: &Document, ignore: Option<u64>) -> StoreResult<()> {
        for index in self.indexes.iter().filter(|index| index.is_unique()) {
            if let Some(key) = index.key_for(doc)
                && index.conflicts(&key, ignore)
            {
                return Err(StoreError::duplicate_key(
                    &self.namespace.to_string(),
                    &index.spec().name(),
                    &index.describe_key(&key),
                ));
            }
        }
        Ok(())
    }

    /// Run the ruleset. `previous` is the pre-update document for updates.
    fn check_rules(&self, doc: &Document, previous: Option<&Document>) -> StoreResult<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        if validator.validation_level() == ValidationLevel::Moderate
            && let Some(previous) = previous
            && validator.check(&document_into_json(previous.clone())).is_err()
        {
            return Ok(());
        }

        match validator.check(&document_into_json(doc.clone())) {
            Ok(()) => Ok(()),
            Err(err) => match validator.validation_action() {
                ValidationAction::Error => Err(StoreError::DocumentValidation(err)),
                ValidationAction::Warn => {
                    tracing::warn!(collection = %self.namespace, error = %err, "document failed validation, accepted");
                    Ok(())
                }
            },
        }
    }
}
