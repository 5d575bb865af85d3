use super::error::{ModelError, ModelResult};
use crate::Record;
use crate::core::{Document, KEY_FIELD, ObjectId, Value, document_from_json, document_into_json};
use serde_json::Value as JsonValue;

/// Field name callers use for the primary key.
pub const EXTERNAL_ID_FIELD: &str = "id";

const LOGICAL_OPERATORS: &[&str] = &["$and", "$or", "$nor"];

/// Maps between the boundary `id` string and the store's `_id` key.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierCodec;

impl IdentifierCodec {
    /// Translate a caller filter into a store filter.
    ///
    /// `id` may be a hex string or an operator object (`{"$in": [...]}`) whose string
    /// operands are all translated. Logical operators are translated recursively. The
    /// store key itself is not accepted from callers.
    pub fn encode_filter(&self, filter: &Record) -> ModelResult<Document> {
        let mut out = Document::new();
        for (key, value) in filter {
            if key == KEY_FIELD {
                return Err(ModelError::validation(KEY_FIELD, "Unrecognized key '_id'; filter on 'id'"));
            }
            if key == EXTERNAL_ID_FIELD {
                out.insert(KEY_FIELD.to_string(), self.encode_id_condition(value)?);
            } else if LOGICAL_OPERATORS.contains(&key.as_str()) {
                out.insert(key.clone(), self.encode_clauses(value)?);
            } else {
                out.insert(key.clone(), Value::from_json(value.clone()));
            }
        }
        Ok(out)
    }

    /// Parse one external id.
    pub fn parse_id(&self, raw: &str) -> ModelResult<ObjectId> {
        ObjectId::parse_str(raw).ok_or_else(|| ModelError::InvalidIdentifier { value: raw.to_string() })
    }

    /// A record headed for the store; it never carries the key.
    pub fn encode_record(&self, record: Record) -> Document {
        let mut doc = document_from_json(record);
        doc.remove(EXTERNAL_ID_FIELD);
        doc
    }

    /// Replace `_id` with a string `id`.
    pub fn decode(&self, mut doc: Document) -> Record {
        let key = doc.remove(KEY_FIELD);
        let mut record = document_into_json(doc);
        if let Some(key) = key {
            record.insert(EXTERNAL_ID_FIELD.to_string(), key.into_json());
        }
        record
    }

    fn encode_id_condition(&self, value: &JsonValue) -> ModelResult<Value> {
        match value {
            JsonValue::String(raw) => Ok(Value::ObjectId(self.parse_id(raw)?)),
            JsonValue::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                let mut out = Document::new();
                for (op, operand) in ops {
                    out.insert(op.clone(), self.encode_id_operand(operand)?);
                }
                Ok(Value::Document(out))
            }
            other => Err(ModelError::InvalidIdentifier { value: other.to_string() }),
        }
    }

    fn encode_id_operand(&self, operand: &JsonValue) -> ModelResult<Value> {
        match operand {
            JsonValue::String(raw) => Ok(Value::ObjectId(self.parse_id(raw)?)),
            JsonValue::Array(items) => items
                .iter()
                .map(|item| match item {
                    JsonValue::String(raw) => self.parse_id(raw).map(Value::ObjectId),
                    other => Err(ModelError::InvalidIdentifier { value: other.to_string() }),
                })
                .collect::<ModelResult<Vec<_>>>()
                .map(Value::Array),
            other => Err(ModelError::InvalidIdentifier { value: other.to_string() }),
        }
    }

    fn encode_clauses(&self, value: &JsonValue) -> ModelResult<Value> {
        match value {
            JsonValue::Array(clauses) => {
                let mut out = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    match clause {
                        JsonValue::Object(inner) => out.push(Value::Document(self.encode_filter(inner)?)),
                        other => out.push(Value::from_json(other.clone())),
                    }
                }
                Ok(Value::Array(out))
            }
            // Malformed; left for the store to reject.
            other => Ok(Value::from_json(other.clone())),
        }
    }
}
