use crate::Record;
use crate::model::{
    CREATED_AT, DataSource, EntityDefinition, EntityHooks, ModelError, ModelResult, PersistenceService, UPDATED_AT,
    now_timestamp,
};
use crate::schema::{CollectionValidator, EntitySchemas, FieldRule, ObjectSchema, object_id_rule};
use crate::storage::IndexSpec;
use crate::tenant::RequestContext;
use async_trait::async_trait;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::ops::Deref;
use std::sync::Arc;

pub const COLLECTION: &str = "users";
pub const DEFAULT_HASH_ROUNDS: u32 = bcrypt::DEFAULT_COST;

pub const USER_TYPES: &[&str] = &[
    "user",
    "admin",
    "device_manager",
    "claimer",
    "property_owner",
    "brand_manager",
    "receptionist",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    #[default]
    User,
    Admin,
    DeviceManager,
    Claimer,
    PropertyOwner,
    BrandManager,
    Receptionist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub display_picture: Option<String>,
    pub user_type: UserType,
    pub password_hash: String,
    #[serde(default)]
    pub property_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn full_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field("name", FieldRule::string().max_length(150))
        .field("email", FieldRule::string().email().max_length(200))
        .field("displayPicture", FieldRule::string().url().optional().nullable())
        .field("userType", FieldRule::enumeration(USER_TYPES).default_value("user"))
        .field("passwordHash", FieldRule::string())
        .field("propertyId", FieldRule::string().optional().nullable())
        .field(CREATED_AT, FieldRule::string().datetime())
        .field(UPDATED_AT, FieldRule::string().datetime())
}

/// Sign-up input carries a password and its confirmation instead of the hash.
pub fn schemas() -> EntitySchemas {
    let full = full_schema();
    let create = full
        .clone()
        .omit(&["propertyId", "passwordHash", CREATED_AT, UPDATED_AT])
        .field(
            "password",
            FieldRule::string()
                .min_length(4)
                .with_message("Password must be at least 4 characters long"),
        )
        .field("confirmPassword", FieldRule::string())
        .refine("confirmPassword", "Passwords do not match", |data| {
            data.get("password") == data.get("confirmPassword")
        });
    let update = full
        .clone()
        .omit(&["passwordHash", CREATED_AT, UPDATED_AT])
        .partial()
        .strict();
    EntitySchemas::new(full, create, update)
}

/// Validates sign-up input and swaps the password pair for a bcrypt hash.
pub struct UserHooks {
    schemas: EntitySchemas,
    hash_rounds: u32,
}

impl UserHooks {
    pub fn new(hash_rounds: u32) -> Self {
        Self {
            schemas: schemas(),
            hash_rounds,
        }
    }
}

#[async_trait]
impl EntityHooks for UserHooks {
    async fn before_create(&self, input: Record) -> ModelResult<Record> {
        let mut data = self.schemas.create.validate_record(&input)?;
        data.remove("confirmPassword");
        let password = match data.remove("password") {
            Some(JsonValue::String(password)) => password,
            _ => return Err(ModelError::validation("password", "Required")),
        };

        let hash = hash_password(password, self.hash_rounds).await?;
        data.insert("passwordHash".to_string(), JsonValue::String(hash));
        let now = now_timestamp();
        data.insert(CREATED_AT.to_string(), JsonValue::String(now.clone()));
        data.insert(UPDATED_AT.to_string(), JsonValue::String(now));
        Ok(data)
    }

    async fn before_update(&self, input: Record) -> ModelResult<Record> {
        let mut data = self.schemas.update.validate_record(&input)?;
        data.insert(UPDATED_AT.to_string(), JsonValue::String(now_timestamp()));
        Ok(data)
    }
}

async fn hash_password(password: String, rounds: u32) -> ModelResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, rounds))
        .await
        .map_err(|e| ModelError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| ModelError::Internal(format!("password hashing failed: {e}")))
}

async fn verify_password(password: String, hash: String) -> ModelResult<bool> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ModelError::Internal(format!("password check task failed: {e}")))?;
    // A malformed stored hash never matches.
    Ok(verified.unwrap_or(false))
}

/// Store-side `$jsonSchema` of the collection.
pub fn ruleset() -> JsonValue {
    json!({
        "type": "object",
        "required": ["name", "email", "passwordHash"],
        "properties": {
            "_id": object_id_rule(),
            "name": {"type": "string", "maxLength": 150},
            "email": {"type": "string", "maxLength": 200, "pattern": "^.+@.+$"},
            "displayPicture": {"type": ["string", "null"], "pattern": "^http(s)?://.+"},
            "userType": {"enum": USER_TYPES},
            "passwordHash": {"type": "string"},
            "propertyId": {"type": ["string", "null"]},
            "createdAt": {"type": "string"},
            "updatedAt": {"type": "string"}
        }
    })
}

lazy_static! {
    static ref RULESET: CollectionValidator = CollectionValidator::new(ruleset()).expect("users ruleset compiles");
}

pub fn definition(hash_rounds: u32) -> EntityDefinition {
    EntityDefinition::new(COLLECTION, schemas())
        .index(IndexSpec::ascending("email").unique())
        .index(IndexSpec::ascending("userType"))
        .index(IndexSpec::descending(CREATED_AT))
        .index(IndexSpec::descending(UPDATED_AT))
        .validator(RULESET.clone())
        .hooks(Arc::new(UserHooks::new(hash_rounds)))
}

/// Users live in the shared namespace.
#[derive(Clone)]
pub struct UserService {
    records: PersistenceService<User>,
}

impl UserService {
    pub fn new(source: Arc<DataSource>, hash_rounds: u32) -> Self {
        Self {
            records: PersistenceService::shared(definition(hash_rounds), source),
        }
    }

    /// The user owning `email` when `password` matches its hash.
    pub async fn authenticate(&self, ctx: &RequestContext, email: &str, password: &str) -> ModelResult<Option<User>> {
        let mut filter = Record::new();
        filter.insert("email".to_string(), JsonValue::String(email.to_string()));
        let Some(user) = self.records.find_one(ctx, &filter).await? else {
            return Ok(None);
        };

        if verify_password(password.to_string(), user.password_hash.clone()).await? {
            Ok(Some(user))
        } else {
            tracing::debug!(request_id = %ctx.request_id(), "password mismatch");
            Ok(None)
        }
    }
}

impl Deref for UserService {
    type Target = PersistenceService<User>;

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}
