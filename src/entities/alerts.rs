use crate::model::{CREATED_AT, DataSource, EntityDefinition, PersistenceService, UPDATED_AT};
use crate::schema::{CollectionValidator, EntitySchemas, FieldRule, ObjectSchema, object_id_rule};
use crate::storage::IndexSpec;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

pub const COLLECTION: &str = "alerts";

pub const TARGETS: &[&str] = &["user", "tv"];
pub const STATUSES: &[&str] = &["read", "unread"];
pub const ALERT_TYPES: &[&str] = &["invitation", "claimed", "claiming"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertTarget {
    User,
    Tv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Read,
    #[default]
    Unread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Invitation,
    Claimed,
    Claiming,
}

/// Free-form context attached to an alert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertExtras {
    pub alert_type: Option<AlertType>,
    pub property_name: Option<String>,
    pub property_logo: Option<String>,
    pub invitation_id: Option<String>,
    pub room_id: Option<String>,
    pub property_id: Option<String>,
    pub thing_id: Option<String>,
    pub is_fake: Option<bool>,
    pub claimer_user_id: Option<String>,
    pub claimer_user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub target_type: AlertTarget,
    pub target_id: String,
    pub title: String,
    pub description: String,
    pub status: AlertStatus,
    #[serde(default)]
    pub landing_url: Option<String>,
    #[serde(default)]
    pub extras: Option<AlertExtras>,
    pub created_at: String,
    pub updated_at: String,
}

fn extras_schema() -> ObjectSchema {
    let text = || FieldRule::string().optional().nullable();
    ObjectSchema::new()
        .field("alertType", FieldRule::enumeration(ALERT_TYPES).optional().nullable())
        .field("propertyName", text())
        .field("propertyLogo", FieldRule::string().url().optional().nullable())
        .field("invitationId", text())
        .field("roomId", text())
        .field("propertyId", text())
        .field("thingId", text())
        .field("isFake", FieldRule::boolean().optional().nullable())
        .field("claimerUserId", text())
        .field("claimerUserName", text())
}

pub fn schemas() -> EntitySchemas {
    let full = ObjectSchema::new()
        .field("targetType", FieldRule::enumeration(TARGETS))
        .field("targetId", FieldRule::string().max_length(50))
        .field("title", FieldRule::string().max_length(500))
        .field("description", FieldRule::string().max_length(1000))
        .field("status", FieldRule::enumeration(STATUSES).default_value("unread"))
        .field("landingUrl", FieldRule::string().max_length(1000).optional().nullable())
        .field(
            "extras",
            FieldRule::object(extras_schema())
                .default_value(serde_json::json!({}))
                .optional()
                .nullable(),
        )
        .field(CREATED_AT, FieldRule::string().datetime())
        .field(UPDATED_AT, FieldRule::string().datetime());
    EntitySchemas::derive(full, &[CREATED_AT, UPDATED_AT])
}

/// Store-side `$jsonSchema` of the collection.
pub fn ruleset() -> JsonValue {
    json!({
        "type": "object",
        "required": ["targetId", "title", "description", "status", "targetType"],
        "properties": {
            "_id": object_id_rule(),
            "targetType": {"enum": TARGETS, "description": "can only be one of the alert targets"},
            "targetId": {"type": "string", "maxLength": 50},
            "title": {"type": "string", "maxLength": 500},
            "description": {"type": "string", "maxLength": 1000},
            "status": {"enum": STATUSES},
            "landingUrl": {"type": ["string", "null"], "maxLength": 1000},
            "extras": {
                "type": ["object", "null"],
                "additionalProperties": {"type": ["string", "object", "null", "boolean"]}
            },
            "createdAt": {"type": "string"},
            "updatedAt": {"type": "string"}
        }
    })
}

lazy_static! {
    static ref RULESET: CollectionValidator = CollectionValidator::new(ruleset()).expect("alerts ruleset compiles");
}

pub fn definition() -> EntityDefinition {
    EntityDefinition::new(COLLECTION, schemas())
        .index(IndexSpec::ascending("targetType"))
        .index(IndexSpec::ascending("targetId"))
        .index(IndexSpec::descending(CREATED_AT))
        .index(IndexSpec::descending(UPDATED_AT))
        .validator(RULESET.clone())
}

pub type AlertService = PersistenceService<Alert>;

pub fn service(source: Arc<DataSource>) -> AlertService {
    PersistenceService::shared(definition(), source)
}
