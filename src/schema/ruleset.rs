use crate::Record;
use crate::core::{OBJECT_ID_HEX_LEN, StoreError, StoreResult};
use jsonschema::{Draft, Validator};
use serde_json::{Value as JsonValue, json};
use std::fmt;
use std::sync::Arc;

/// How the store reacts to a document that fails its ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationAction {
    #[default]
    Error,
    Warn,
}

/// Which writes the ruleset applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    #[default]
    Strict,
    /// Updates to documents that were already invalid are not checked.
    Moderate,
}

/// Store-side ruleset attached to a collection.
///
/// The rules are a JSON Schema document, the `$jsonSchema` of a collection validator.
/// Documents are checked in their JSON form, so `_id` is seen as its hex string.
#[derive(Clone)]
pub struct CollectionValidator {
    schema: JsonValue,
    compiled: Arc<Validator>,
    action: ValidationAction,
    level: ValidationLevel,
}

impl CollectionValidator {
    /// Compile `schema`. A schema that is not valid JSON Schema is refused.
    pub fn new(schema: JsonValue) -> StoreResult<Self> {
        let compiled = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .map_err(|err| StoreError::InvalidOptions(format!("invalid $jsonSchema: {err}")))?;
        Ok(Self {
            schema,
            compiled: Arc::new(compiled),
            action: ValidationAction::default(),
            level: ValidationLevel::default(),
        })
    }

    pub fn action(mut self, action: ValidationAction) -> Self {
        self.action = action;
        self
    }

    pub fn level(mut self, level: ValidationLevel) -> Self {
        self.level = level;
        self
    }

    pub fn validation_action(&self) -> ValidationAction {
        self.action
    }

    pub fn validation_level(&self) -> ValidationLevel {
        self.level
    }

    /// The uncompiled rules.
    pub fn schema(&self) -> &JsonValue {
        &self.schema
    }

    /// Every violated rule, joined into one message.
    pub fn check(&self, document: &Record) -> Result<(), String> {
        let instance = JsonValue::Object(document.clone());
        let messages: Vec<String> = self.compiled.iter_errors(&instance).map(|err| err.to_string()).collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages.join("; "))
        }
    }
}

impl fmt::Debug for CollectionValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionValidator")
            .field("schema", &self.schema)
            .field("action", &self.action)
            .field("level", &self.level)
            .finish()
    }
}

/// Rule for the store key as it appears in a document's JSON form.
pub fn object_id_rule() -> JsonValue {
    json!({
        "type": "string",
        "pattern": format!("^[0-9a-f]{{{OBJECT_ID_HEX_LEN}}}$"),
        "description": "native ID field"
    })
}
