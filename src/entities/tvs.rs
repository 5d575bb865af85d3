use crate::Record;
use crate::model::{
    CREATED_AT, DataSource, EntityDefinition, ModelResult, PersistenceService, TimestampedHooks, UPDATED_AT,
};
use crate::schema::{CollectionValidator, EntitySchemas, FieldRule, ObjectSchema, object_id_rule};
use crate::storage::IndexSpec;
use crate::tenant::RequestContext;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::ops::Deref;
use std::sync::Arc;

pub const COLLECTION: &str = "TVs";
pub const CLAIM_STATES: &[&str] = &["claimed", "unclaimed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimState {
    Claimed,
    Unclaimed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tv {
    pub id: String,
    pub thing_id: String,
    pub model: String,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub property_id: Option<String>,
    #[serde(default, rename = "claimQRCode")]
    pub claim_qr_code: Option<String>,
    #[serde(default)]
    pub claim_state: Option<ClaimState>,
    #[serde(default)]
    pub clone_state: Option<String>,
    #[serde(default)]
    pub clone_progress: Option<f64>,
    pub is_fake: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub fn schemas() -> EntitySchemas {
    let full = ObjectSchema::new()
        .field("thingId", FieldRule::string().max_length(100))
        .field("model", FieldRule::string().max_length(100))
        .field("roomId", FieldRule::string().max_length(50).optional().nullable())
        .field("propertyId", FieldRule::string().max_length(50).optional().nullable())
        .field("claimQRCode", FieldRule::string().optional().nullable())
        .field(
            "claimState",
            FieldRule::enumeration(CLAIM_STATES).default_value("unclaimed").nullable(),
        )
        .field("cloneState", FieldRule::string().optional().nullable())
        .field(
            "cloneProgress",
            FieldRule::number()
                .positive()
                .with_message("Only positive numbers allowed.")
                .max(100.0)
                .with_message("Maximum value can be 100.")
                .optional()
                .nullable(),
        )
        .field("isFake", FieldRule::boolean().default_value(true))
        .field(CREATED_AT, FieldRule::string().datetime())
        .field(UPDATED_AT, FieldRule::string().datetime());
    EntitySchemas::derive(full, &[CREATED_AT, UPDATED_AT])
}

/// Store-side `$jsonSchema` of the collection.
pub fn ruleset() -> JsonValue {
    json!({
        "type": "object",
        "required": ["thingId", "model"],
        "properties": {
            "_id": object_id_rule(),
            "thingId": {"type": "string", "maxLength": 50},
            "model": {"type": "string", "maxLength": 100},
            "roomId": {"type": ["string", "null"], "maxLength": 50},
            "propertyId": {"type": ["string", "null"], "maxLength": 50},
            "claimQRCode": {"type": ["string", "null"]},
            "claimState": {"enum": ["claimed", "unclaimed", null]},
            "cloneState": {"type": ["string", "null"]},
            "cloneProgress": {"type": ["number", "null"], "minimum": 0, "maximum": 100},
            "isFake": {"type": "boolean"},
            "createdAt": {"type": "string"},
            "updatedAt": {"type": "string"}
        }
    })
}

lazy_static! {
    static ref RULESET: CollectionValidator = CollectionValidator::new(ruleset()).expect("TVs ruleset compiles");
}

/// New devices always start unclaimed, whatever the input says.
pub fn definition() -> EntityDefinition {
    let schemas = schemas();
    let hooks = TimestampedHooks::new(schemas.clone()).force_on_create("claimState", "unclaimed");
    EntityDefinition::new(COLLECTION, schemas)
        .index(IndexSpec::ascending("thingId").unique())
        .index(IndexSpec::ascending("model"))
        .index(IndexSpec::ascending("roomId"))
        .index(IndexSpec::ascending("claimState"))
        .index(IndexSpec::ascending("cloneState"))
        .index(IndexSpec::descending(CREATED_AT))
        .index(IndexSpec::descending(UPDATED_AT))
        .validator(RULESET.clone())
        .hooks(Arc::new(hooks))
}

#[derive(Clone)]
pub struct TvService {
    records: PersistenceService<Tv>,
}

impl TvService {
    pub fn new(source: Arc<DataSource>) -> Self {
        Self {
            records: PersistenceService::shared(definition(), source),
        }
    }

    /// The device registered under `thing_id`, registering a real one on first sight.
    pub async fn login(&self, ctx: &RequestContext, thing_id: &str, model: &str) -> ModelResult<Tv> {
        let mut filter = Record::new();
        filter.insert("thingId".to_string(), JsonValue::String(thing_id.to_string()));

        let mut input = filter.clone();
        input.insert("model".to_string(), JsonValue::String(model.to_string()));
        input.insert("isFake".to_string(), JsonValue::Bool(false));

        self.records.insert_if_not_exists(ctx, &filter, input).await
    }
}

impl Deref for TvService {
    type Target = PersistenceService<Tv>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clone_progress_bounds() {
        let schemas = schemas();
        let err = schemas
            .update
            .validate(&json!({"cloneProgress": 0}))
            .unwrap_err();
        assert_eq!(err.messages_at("cloneProgress"), vec!["Only positive numbers allowed."]);

        let err = schemas
            .update
            .validate(&json!({"cloneProgress": 101}))
            .unwrap_err();
        assert_eq!(err.messages_at("cloneProgress"), vec!["Maximum value can be 100."]);

        assert!(schemas.update.validate(&json!({"cloneProgress": null})).is_ok());
    }

    #[test]
    fn test_create_defaults() {
        let record = schemas()
            .create
            .validate(&json!({"thingId": "thing-1", "model": "X1"}))
            .unwrap();
        assert_eq!(record["isFake"], json!(true));
        assert_eq!(record["claimState"], json!("unclaimed"));
        assert!(!record.contains_key("cloneProgress"));
    }

    #[test]
    fn test_claim_qr_code_name() {
        let tv: Tv = serde_json::from_value(json!({
            "id": "507f1f77bcf86cd799439011",
            "thingId": "thing-1",
            "model": "X1",
            "claimQRCode": "qr",
            "claimState": "claimed",
            "isFake": false,
            "createdAt": "2024-01-01T00:00:00.000000Z",
            "updatedAt": "2024-01-01T00:00:00.000000Z"
        }))
        .unwrap();
        assert_eq!(tv.claim_qr_code.as_deref(), Some("qr"));
        assert_eq!(tv.claim_state, Some(ClaimState::Claimed));
    }
}
