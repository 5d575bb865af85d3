use crate::model::{CREATED_AT, DataSource, EntityDefinition, PersistenceService, UPDATED_AT};
use crate::schema::{CollectionValidator, EntitySchemas, FieldRule, ObjectSchema, object_id_rule};
use crate::storage::IndexSpec;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

pub const COLLECTION: &str = "rooms";

/// A room of one property. Rooms are stored per tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub property_id: String,
    pub room_id: String,
    pub check_in_state: bool,
    #[serde(default)]
    pub guest_name: Option<String>,
    pub is_fake: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub fn schemas() -> EntitySchemas {
    let full = ObjectSchema::new()
        .field("propertyId", FieldRule::string())
        .field("roomId", FieldRule::string())
        .field("checkInState", FieldRule::boolean().default_value(false))
        .field("guestName", FieldRule::string().optional().nullable())
        .field("isFake", FieldRule::boolean().default_value(false))
        .field(CREATED_AT, FieldRule::string().datetime())
        .field(UPDATED_AT, FieldRule::string().datetime());
    EntitySchemas::derive(full, &[CREATED_AT, UPDATED_AT])
}

/// Store-side `$jsonSchema` of the collection.
pub fn ruleset() -> JsonValue {
    json!({
        "type": "object",
        "required": ["propertyId", "roomId"],
        "properties": {
            "_id": object_id_rule(),
            "propertyId": {"type": "string"},
            "roomId": {"type": "string"},
            "checkInState": {"type": "boolean"},
            "guestName": {"type": ["string", "null"]},
            "isFake": {"type": "boolean"},
            "createdAt": {"type": "string", "description": "ISO 8601 date string"},
            "updatedAt": {"type": "string", "description": "ISO 8601 date string"}
        }
    })
}

lazy_static! {
    static ref RULESET: CollectionValidator = CollectionValidator::new(ruleset()).expect("rooms ruleset compiles");
}

pub fn definition() -> EntityDefinition {
    EntityDefinition::new(COLLECTION, schemas())
        .index(IndexSpec::ascending("propertyId"))
        .index(IndexSpec::descending(CREATED_AT))
        .index(IndexSpec::descending(UPDATED_AT))
        .validator(RULESET.clone())
}

pub type RoomService = PersistenceService<Room>;

pub fn service(source: Arc<DataSource>) -> RoomService {
    PersistenceService::tenant_scoped(definition(), source)
}
