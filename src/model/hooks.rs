use super::error::ModelResult;
use crate::Record;
use crate::schema::EntitySchemas;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value as JsonValue;

pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// Current time as an ISO-8601 string with microseconds and a `Z` suffix.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Per-entity lifecycle hooks, run before a write reaches the store.
#[async_trait]
pub trait EntityHooks: Send + Sync {
    /// Validate caller input and return the record to persist.
    async fn before_create(&self, input: Record) -> ModelResult<Record>;

    /// Validate a `$set` payload and return what to set.
    async fn before_update(&self, input: Record) -> ModelResult<Record>;
}

/// Schema validation plus `createdAt`/`updatedAt` maintenance.
#[derive(Debug, Clone)]
pub struct TimestampedHooks {
    schemas: EntitySchemas,
    create_overrides: Record,
}

impl TimestampedHooks {
    pub fn new(schemas: EntitySchemas) -> Self {
        Self {
            schemas,
            create_overrides: Record::new(),
        }
    }

    /// Value written on every create regardless of the input.
    pub fn force_on_create(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.create_overrides.insert(field.into(), value.into());
        self
    }

    pub fn schemas(&self) -> &EntitySchemas {
        &self.schemas
    }
}

#[async_trait]
impl EntityHooks for TimestampedHooks {
    async fn before_create(&self, input: Record) -> ModelResult<Record> {
        let mut record = self.schemas.create.validate_record(&input)?;
        for (field, value) in &self.create_overrides {
            record.insert(field.clone(), value.clone());
        }
        let now = now_timestamp();
        record.insert(CREATED_AT.to_string(), JsonValue::String(now.clone()));
        record.insert(UPDATED_AT.to_string(), JsonValue::String(now));
        Ok(record)
    }

    async fn before_update(&self, input: Record) -> ModelResult<Record> {
        let mut record = self.schemas.update.validate_record(&input)?;
        record.insert(UPDATED_AT.to_string(), JsonValue::String(now_timestamp()));
        Ok(record)
    }
}
