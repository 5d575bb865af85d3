use super::codec::{EXTERNAL_ID_FIELD, IdentifierCodec};
use super::datasource::DataSource;
use super::definition::EntityDefinition;
use super::duplicate::DuplicateKeyTranslator;
use super::error::{ModelError, ModelResult};
use crate::Record;
use crate::connection::pool::PoolGuard;
use crate::core::{Document, KEY_FIELD, ObjectId, StoreError, Value, document_from_json};
use crate::schema::{FieldIssue, FieldKind, FieldRule, ObjectSchema, ValidationError};
use crate::storage::{CollectionOptions, FindOneAndUpdateOptions, FindOptions, Namespace};
use crate::tenant::{ContextTenantResolver, RequestContext, SharedNamespace, TenantResolver};
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::marker::PhantomData;
use std::sync::Arc;

const SET: &str = "$set";

/// Generic CRUD over one entity's collection.
///
/// `R` is what callers get back. The default is the raw boundary [`Record`]; any
/// `DeserializeOwned` type whose fields match the record works too.
///
/// The collection name is resolved from the request context on every call, so one
/// service serves every tenant.
pub struct PersistenceService<R = Record> {
    definition: Arc<EntityDefinition>,
    resolver: Arc<dyn TenantResolver>,
    source: Arc<DataSource>,
    codec: IdentifierCodec,
    duplicates: DuplicateKeyTranslator,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for PersistenceService<R> {
    fn clone(&self) -> Self {
        Self {
            definition: Arc::clone(&self.definition),
            resolver: Arc::clone(&self.resolver),
            source: Arc::clone(&self.source),
            codec: self.codec,
            duplicates: self.duplicates,
            _record: PhantomData,
        }
    }
}

impl<R: DeserializeOwned> PersistenceService<R> {
    pub fn new(definition: EntityDefinition, resolver: Arc<dyn TenantResolver>, source: Arc<DataSource>) -> Self {
        Self {
            definition: Arc::new(definition),
            resolver,
            source,
            codec: IdentifierCodec,
            duplicates: DuplicateKeyTranslator,
            _record: PhantomData,
        }
    }

    /// Service over the fixed shared namespace.
    pub fn shared(definition: EntityDefinition, source: Arc<DataSource>) -> Self {
        Self::new(definition, Arc::new(SharedNamespace::default()), source)
    }

    /// Service whose namespace comes from the request's tenant key.
    pub fn tenant_scoped(definition: EntityDefinition, source: Arc<DataSource>) -> Self {
        Self::new(definition, Arc::new(ContextTenantResolver), source)
    }

    pub fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    pub fn source(&self) -> &Arc<DataSource> {
        &self.source
    }

    /// Collection name for this request.
    pub fn collection_name(&self, ctx: &RequestContext) -> ModelResult<String> {
        let namespace = self.resolver.resolve(ctx)?;
        Ok(self.definition.collection_name(&namespace))
    }

    /// Apply the ruleset and declared indexes. Safe to run repeatedly.
    pub async fn init(&self, ctx: &RequestContext) -> ModelResult<()> {
        let database = self.source.database().await?;
        let name = self.collection_name(ctx)?;
        let conn = database.connection().await?;
        let ns = conn.namespace(&name);
        let store = conn.store();

        if let Some(validator) = &self.definition.validator {
            let exists = store
                .list_collections(&ns.database)
                .await?
                .iter()
                .any(|info| info.name == ns.collection);
            let created = if exists {
                Err(StoreError::NamespaceExists(ns.to_string()))
            } else {
                store
                    .create_collection(&ns, CollectionOptions::with_validator(validator.clone()))
                    .await
            };
            match created {
                Ok(()) => tracing::debug!(collection = %ns, "created collection with ruleset"),
                Err(StoreError::NamespaceExists(_)) => {
                    store.modify_collection(&ns, Some(validator.clone())).await?;
                    tracing::debug!(collection = %ns, "updated collection ruleset");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let names = try_join_all(
            self.definition
                .indexes
                .iter()
                .cloned()
                .map(|spec| store.create_index(&ns, spec)),
        )
        .await
        .map_err(|err| self.duplicates.translate(err))?;

        tracing::info!(collection = %ns, indexes = ?names, request_id = %ctx.request_id(), "collection initialized");
        Ok(())
    }

    /// First match, or `None`.
    pub async fn find_one(&self, ctx: &RequestContext, filter: &Record) -> ModelResult<Option<R>> {
        let query = self.codec.encode_filter(filter)?;
        let (conn, ns) = self.target(ctx).await?;
        tracing::debug!(collection = %ns, request_id = %ctx.request_id(), "find_one");

        let found = conn.store().find_one(&ns, &query).await?;
        found.map(|doc| self.output(doc)).transpose()
    }

    /// First match, or `NotFound` carrying the filter.
    pub async fn get_or_fail(&self, ctx: &RequestContext, filter: &Record) -> ModelResult<R> {
        self.find_one(ctx, filter).await?.ok_or_else(|| ModelError::NotFound {
            filter: filter.clone(),
        })
    }

    pub async fn find(&self, ctx: &RequestContext, filter: &Record, options: &FindOptions) -> ModelResult<Vec<R>> {
        let query = self.codec.encode_filter(filter)?;
        let (conn, ns) = self.target(ctx).await?;
        tracing::debug!(collection = %ns, request_id = %ctx.request_id(), "find");

        conn.store()
            .find(&ns, &query, options)
            .await?
            .into_iter()
            .map(|doc| self.output(doc))
            .collect()
    }

    pub async fn count(&self, ctx: &RequestContext, filter: &Record) -> ModelResult<u64> {
        let query = self.codec.encode_filter(filter)?;
        let (conn, ns) = self.target(ctx).await?;
        Ok(conn.store().count(&ns, &query).await?)
    }

    /// Run `before_create`, persist, and return the stored record.
    pub async fn insert_one(&self, ctx: &RequestContext, input: Record) -> ModelResult<R> {
        let name = self.collection_name(ctx)?;
        let record = self.definition.hooks.before_create(input).await?;
        let (conn, ns) = self.checkout(&name).await?;
        tracing::debug!(collection = %ns, request_id = %ctx.request_id(), "insert_one");

        let doc = self.codec.encode_record(record);
        let id = conn
            .store()
            .insert_one(&ns, doc.clone())
            .await
            .map_err(|err| self.duplicates.translate(err))?;
        self.output(with_key(doc, id))
    }

    /// Hooks run concurrently; the batch is written in input order.
    pub async fn insert_many(&self, ctx: &RequestContext, inputs: Vec<Record>) -> ModelResult<Vec<R>> {
        let hooks = &self.definition.hooks;
        let name = self.collection_name(ctx)?;
        let records = try_join_all(inputs.into_iter().map(|input| hooks.before_create(input))).await?;
        let (conn, ns) = self.checkout(&name).await?;
        tracing::debug!(collection = %ns, request_id = %ctx.request_id(), count = records.len(), "insert_many");

        let docs: Vec<Document> = records.into_iter().map(|r| self.codec.encode_record(r)).collect();
        let ids = conn
            .store()
            .insert_many(&ns, docs.clone())
            .await
            .map_err(|err| self.duplicates.translate(err))?;
        docs.into_iter()
            .zip(ids)
            .map(|(doc, id)| self.output(with_key(doc, id)))
            .collect()
    }

    /// Existing match, unchanged; otherwise insert.
    ///
    /// Losing an insert race to a concurrent writer surfaces as a duplicate key; the
    /// filter is then queried once more and the winner's record returned.
    pub async fn insert_if_not_exists(&self, ctx: &RequestContext, filter: &Record, input: Record) -> ModelResult<R> {
        if let Some(existing) = self.find_one(ctx, filter).await? {
            return Ok(existing);
        }
        match self.insert_one(ctx, input).await {
            Err(err @ ModelError::DuplicateKey { .. }) => {
                tracing::debug!(request_id = %ctx.request_id(), "insert raced, re-reading");
                self.find_one(ctx, filter).await?.ok_or(err)
            }
            other => other,
        }
    }

    /// Apply a modifier document to the first match.
    ///
    /// `$set` goes through `before_update` (and is added when missing so `updatedAt`
    /// always moves). The other modifiers are checked against the update schema.
    pub async fn find_one_and_update(
        &self,
        ctx: &RequestContext,
        filter: &Record,
        update: &Record,
        options: &FindOneAndUpdateOptions,
    ) -> ModelResult<Option<R>> {
        let query = self.codec.encode_filter(filter)?;
        let modifiers = self.prepare_update(update).await?;
        let (conn, ns) = self.target(ctx).await?;
        tracing::debug!(collection = %ns, request_id = %ctx.request_id(), "find_one_and_update");

        let updated = conn
            .store()
            .find_one_and_update(&ns, &query, &modifiers, options)
            .await
            .map_err(|err| self.duplicates.translate(err))?;
        updated.map(|doc| self.output(doc)).transpose()
    }

    pub async fn delete_one(&self, ctx: &RequestContext, filter: &Record) -> ModelResult<u64> {
        let query = self.codec.encode_filter(filter)?;
        let (conn, ns) = self.target(ctx).await?;
        tracing::debug!(collection = %ns, request_id = %ctx.request_id(), "delete_one");
        Ok(conn.store().delete_one(&ns, &query).await?)
    }

    pub async fn delete_many(&self, ctx: &RequestContext, filter: &Record) -> ModelResult<u64> {
        let query = self.codec.encode_filter(filter)?;
        let (conn, ns) = self.target(ctx).await?;
        tracing::debug!(collection = %ns, request_id = %ctx.request_id(), "delete_many");
        Ok(conn.store().delete_many(&ns, &query).await?)
    }

    async fn target(&self, ctx: &RequestContext) -> ModelResult<(PoolGuard, Namespace)> {
        let name = self.collection_name(ctx)?;
        self.checkout(&name).await
    }

    async fn checkout(&self, name: &str) -> ModelResult<(PoolGuard, Namespace)> {
        let conn = self.source.database().await?.connection().await?;
        let ns = conn.namespace(name);
        Ok((conn, ns))
    }

    async fn prepare_update(&self, update: &Record) -> ModelResult<Document> {
        let schemas = &self.definition.schemas;
        let mut modifiers = Document::new();
        let mut set = Record::new();
        let mut issues = Vec::new();

        for (op, operand) in update {
            let JsonValue::Object(fields) = operand else {
                return Err(ModelError::validation(op.as_str(), "Expected object"));
            };
            if let Some(key) = fields.keys().find(|k| is_key_path(k)) {
                return Err(ModelError::validation(key.as_str(), "field is immutable"));
            }

            match op.as_str() {
                SET => set = fields.clone(),
                "$min" | "$max" => {
                    let checked = schemas.update.validate_record(fields)?;
                    modifiers.insert(op.clone(), Value::Document(document_from_json(checked)));
                }
                "$unset" | "$inc" | "$push" => {
                    for (path, value) in fields {
                        let Some(rule) = rule_at(&schemas.update, path) else {
                            issues.push(FieldIssue::new(path.as_str(), "Unrecognized field"));
                            continue;
                        };
                        check_modifier(op, path, value, rule, &schemas.full, &mut issues);
                    }
                    modifiers.insert(op.clone(), Value::Document(document_from_json(fields.clone())));
                }
                other => {
                    return Err(ModelError::validation(other, "Unsupported update operator"));
                }
            }
        }
        if !issues.is_empty() {
            return Err(ValidationError::new(issues).into());
        }

        let set = self.definition.hooks.before_update(set).await?;
        modifiers.insert(SET.to_string(), Value::Document(document_from_json(set)));
        Ok(modifiers)
    }

    fn output(&self, doc: Document) -> ModelResult<R> {
        let record = self.codec.decode(doc);
        Ok(serde_json::from_value(JsonValue::Object(record))?)
    }
}

fn with_key(mut doc: Document, id: ObjectId) -> Document {
    doc.insert(KEY_FIELD.to_string(), Value::ObjectId(id));
    doc
}

fn is_key_path(path: &str) -> bool {
    let root = path.split('.').next().unwrap_or(path);
    root == EXTERNAL_ID_FIELD || root == KEY_FIELD
}

/// Rule of a dotted path, following nested objects and array positions.
fn rule_at<'a>(schema: &'a ObjectSchema, path: &str) -> Option<&'a FieldRule> {
    let mut segments = path.split('.');
    let mut rule = schema.get(segments.next()?)?;
    for segment in segments {
        rule = match rule.kind() {
            FieldKind::Object(inner) => inner.get(segment)?,
            FieldKind::Array(item) if segment.parse::<usize>().is_ok() => item.as_ref(),
            FieldKind::Any => return Some(rule),
            _ => return None,
        };
    }
    Some(rule)
}

/// Check one `$unset`/`$inc`/`$push` operand against the field it targets.
fn check_modifier(
    op: &str,
    path: &str,
    value: &JsonValue,
    rule: &FieldRule,
    full: &ObjectSchema,
    issues: &mut Vec<FieldIssue>,
) {
    match op {
        "$unset" => {
            if rule_at(full, path).is_some_and(|declared| !declared.is_optional()) {
                issues.push(FieldIssue::new(path, "Required field cannot be unset"));
            }
        }
        "$inc" => match rule.kind() {
            FieldKind::Integer | FieldKind::Number | FieldKind::Any => {
                if !value.is_number() {
                    issues.push(FieldIssue::new(
                        path,
                        format!("Expected number, received {}", json_type_name(value)),
                    ));
                } else if matches!(rule.kind(), FieldKind::Integer) && !(value.is_i64() || value.is_u64()) {
                    issues.push(FieldIssue::new(path, "Expected integer, received float"));
                }
            }
            _ => issues.push(FieldIssue::new(path, "Cannot apply $inc to a non-numeric field")),
        },
        "$push" => match rule.kind() {
            FieldKind::Array(item) => {
                let pushed = match value {
                    JsonValue::Object(spec) if spec.len() == 1 && spec.contains_key("$each") => match &spec["$each"] {
                        JsonValue::Array(items) => items.iter().collect(),
                        other => {
                            issues.push(FieldIssue::new(
                                path,
                                format!("Expected array, received {}", json_type_name(other)),
                            ));
                            Vec::new()
                        }
                    },
                    single => vec![single],
                };
                for element in pushed {
                    item.validate(Some(element), path, issues);
                }
            }
            FieldKind::Any => {}
            _ => issues.push(FieldIssue::new(path, "Cannot apply $push to a non-array field")),
        },
        _ => {}
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
