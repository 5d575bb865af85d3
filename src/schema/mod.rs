//! Declarative record validation.
//!
//! Entities describe their records with an [`ObjectSchema`] built from [`FieldRule`]s and
//! derive the create/update variants with combinators. Store-side rulesets are JSON Schema
//! documents wrapped in a [`CollectionValidator`].

pub mod error;
pub mod field;
pub mod object;
pub mod ruleset;

pub use error::{FieldIssue, ValidationError, ValidationResult};
pub use field::{FieldKind, FieldRule};
pub use object::{ObjectSchema, UnknownKeys};
pub use ruleset::{CollectionValidator, ValidationAction, ValidationLevel, object_id_rule};

/// The three schema variants of an entity.
#[derive(Debug, Clone)]
pub struct EntitySchemas {
    /// Shape of a persisted record, without the key.
    pub full: ObjectSchema,
    /// Caller input for inserts.
    pub create: ObjectSchema,
    /// Caller input for `$set`; every field optional, unknown keys rejected.
    pub update: ObjectSchema,
}

impl EntitySchemas {
    pub fn new(full: ObjectSchema, create: ObjectSchema, update: ObjectSchema) -> Self {
        Self { full, create, update }
    }

    /// Derive create and update variants from the full schema by dropping system fields.
    pub fn derive(full: ObjectSchema, system_fields: &[&str]) -> Self {
        let create = full.clone().omit(system_fields);
        let update = create.clone().partial().strict();
        Self { full, create, update }
    }
}
