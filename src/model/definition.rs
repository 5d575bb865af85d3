use super::hooks::{EntityHooks, TimestampedHooks};
use crate::schema::{CollectionValidator, EntitySchemas};
use crate::storage::IndexSpec;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_SEPARATOR: &str = ".";

/// Static description of one entity kind: where it lives, how it is shaped and indexed,
/// and which hooks guard its writes.
#[derive(Clone)]
pub struct EntityDefinition {
    pub base_name: String,
    pub separator: String,
    pub schemas: EntitySchemas,
    pub indexes: Vec<IndexSpec>,
    pub validator: Option<CollectionValidator>,
    pub hooks: Arc<dyn EntityHooks>,
}

impl EntityDefinition {
    /// Definition with [`TimestampedHooks`] over `schemas`, no indexes and no ruleset.
    pub fn new(base_name: impl Into<String>, schemas: EntitySchemas) -> Self {
        Self {
            base_name: base_name.into(),
            separator: DEFAULT_SEPARATOR.to_string(),
            hooks: Arc::new(TimestampedHooks::new(schemas.clone())),
            schemas,
            indexes: Vec::new(),
            validator: None,
        }
    }

    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.indexes.push(spec);
        self
    }

    pub fn validator(mut self, validator: CollectionValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn EntityHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// `namespace + separator + base_name`.
    pub fn collection_name(&self, namespace: &str) -> String {
        format!("{}{}{}", namespace, self.separator, self.base_name)
    }
}

impl fmt::Debug for EntityDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDefinition")
            .field("base_name", &self.base_name)
            .field("separator", &self.separator)
            .field("indexes", &self.indexes)
            .field("has_validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldRule, ObjectSchema};

    #[test]
    fn test_collection_name() {
        let schemas = EntitySchemas::derive(ObjectSchema::new().field("n", FieldRule::string()), &[]);
        let def = EntityDefinition::new("rooms", schemas.clone());
        assert_eq!(def.collection_name("hotel_1"), "hotel_1.rooms");
        assert_eq!(EntityDefinition::new("rooms", schemas).separator("__").collection_name("t"), "t__rooms");
    }
}
