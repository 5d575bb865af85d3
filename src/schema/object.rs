use super::error::{FieldIssue, ValidationError, ValidationResult};
use super::field::{FieldRule, join_path, received_name};
use crate::Record;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// What to do with keys the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeys {
    /// Drop them from the output.
    #[default]
    Strip,
    /// Report them as an issue.
    Reject,
    /// Copy them to the output unchecked.
    Passthrough,
}

type Predicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Cross-field rule, run against the parsed record once every field passed.
#[derive(Clone)]
pub struct Refinement {
    path: String,
    message: String,
    predicate: Predicate,
}

impl fmt::Debug for Refinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refinement")
            .field("path", &self.path)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Schema for a record: ordered field rules, an unknown-key policy and refinements.
///
/// Combinators consume and return the schema, so variants are derived from a base:
///
/// ```
/// use tenant_docstore::schema::{FieldRule, ObjectSchema};
///
/// let full = ObjectSchema::new()
///     .field("name", FieldRule::string().max_length(150))
///     .field("createdAt", FieldRule::string());
/// let update = full.clone().omit(&["createdAt"]).partial().strict();
/// assert!(update.get("createdAt").is_none());
/// ```
///
/// `omit`, `pick` and `partial` drop refinements, since a refinement may read any field.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<(String, FieldRule)>,
    unknown: UnknownKeys,
    refinements: Vec<Refinement>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing any existing rule with the same name.
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = rule,
            None => self.fields.push((name, rule)),
        }
        self
    }

    pub fn extend(self, other: ObjectSchema) -> Self {
        other.fields.into_iter().fold(self, |schema, (name, rule)| schema.field(name, rule))
    }

    pub fn omit(mut self, names: &[&str]) -> Self {
        self.fields.retain(|(name, _)| !names.contains(&name.as_str()));
        self.refinements.clear();
        self
    }

    pub fn pick(mut self, names: &[&str]) -> Self {
        self.fields.retain(|(name, _)| names.contains(&name.as_str()));
        self.refinements.clear();
        self
    }

    pub fn partial(mut self) -> Self {
        self.fields = self
            .fields
            .into_iter()
            .map(|(name, rule)| (name, rule.into_partial()))
            .collect();
        self.refinements.clear();
        self
    }

    pub fn strict(mut self) -> Self {
        self.unknown = UnknownKeys::Reject;
        self
    }

    pub fn passthrough(mut self) -> Self {
        self.unknown = UnknownKeys::Passthrough;
        self
    }

    pub fn strip(mut self) -> Self {
        self.unknown = UnknownKeys::Strip;
        self
    }

    pub fn refine<F>(mut self, path: impl Into<String>, message: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.refinements.push(Refinement {
            path: path.into(),
            message: message.into(),
            predicate: Arc::new(predicate),
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, rule)| rule)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn unknown_keys(&self) -> UnknownKeys {
        self.unknown
    }

    /// Validate and coerce a value into a record, collecting every violation.
    pub fn validate(&self, input: &JsonValue) -> ValidationResult<Record> {
        let mut issues = Vec::new();
        match self.validate_at(input, "", &mut issues) {
            Some(record) if issues.is_empty() => Ok(record),
            _ => Err(ValidationError::new(issues)),
        }
    }

    pub fn validate_record(&self, input: &Record) -> ValidationResult<Record> {
        self.validate(&JsonValue::Object(input.clone()))
    }

    pub(crate) fn validate_at(&self, input: &JsonValue, path: &str, issues: &mut Vec<FieldIssue>) -> Option<Record> {
        let JsonValue::Object(map) = input else {
            issues.push(FieldIssue::new(
                path,
                format!("Expected object, received {}", received_name(input)),
            ));
            return None;
        };

        let before = issues.len();
        let mut out = Record::new();
        for (name, rule) in &self.fields {
            if let Some(value) = rule.validate(map.get(name), &join_path(path, name), issues) {
                out.insert(name.clone(), value);
            }
        }

        let unknown: Vec<&String> = map.keys().filter(|key| !self.has_field(key)).collect();
        match self.unknown {
            UnknownKeys::Strip => {}
            UnknownKeys::Passthrough => {
                for key in unknown {
                    out.insert(key.clone(), map[key.as_str()].clone());
                }
            }
            UnknownKeys::Reject if !unknown.is_empty() => {
                let keys = unknown.iter().map(|k| format!("'{k}'")).collect::<Vec<_>>().join(", ");
                issues.push(FieldIssue::new(path, format!("Unrecognized key(s) in object: {keys}")));
            }
            UnknownKeys::Reject => {}
        }

        if issues.len() == before {
            for refinement in &self.refinements {
                if !(refinement.predicate)(&out) {
                    issues.push(FieldIssue::new(join_path(path, &refinement.path), refinement.message.clone()));
                }
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account() -> ObjectSchema {
        ObjectSchema::new()
            .field("name", FieldRule::string().max_length(5))
            .field("email", FieldRule::string().email())
            .field("role", FieldRule::enumeration(&["user", "admin"]).default_value("user"))
    }

    #[test]
    fn test_strips_unknown_keys_and_applies_defaults() {
        let record = account()
            .validate(&json!({"name": "Ada", "email": "ada@example.com", "extra": 1}))
            .unwrap();
        assert_eq!(JsonValue::Object(record), json!({"name": "Ada", "email": "ada@example.com", "role": "user"}));
    }

    #[test]
    fn test_collects_all_issues() {
        let err = account().validate(&json!({"name": "Too long name", "role": "root"})).unwrap_err();
        assert_eq!(err.issues.len(), 3);
        assert!(err.has_issue_at("name"));
        assert_eq!(err.messages_at("email"), vec!["Required"]);
        assert!(err.has_issue_at("role"));
    }

    #[test]
    fn test_strict_rejects_unknown_keys() {
        let err = account().strict().validate(&json!({"name": "Ada", "email": "a@b.io", "id": "x"})).unwrap_err();
        assert_eq!(err.messages_at(""), vec!["Unrecognized key(s) in object: 'id'"]);
    }

    #[test]
    fn test_passthrough_keeps_unknown_keys() {
        let record = account()
            .passthrough()
            .validate(&json!({"name": "Ada", "email": "a@b.io", "_id": "abc"}))
            .unwrap();
        assert_eq!(record["_id"], json!("abc"));
    }

    #[test]
    fn test_partial_removes_requirements_and_defaults() {
        let record = account().partial().validate(&json!({"name": "Bo"})).unwrap();
        assert_eq!(JsonValue::Object(record), json!({"name": "Bo"}));
    }

    #[test]
    fn test_omit_pick_extend() {
        let schema = account().omit(&["role"]).extend(ObjectSchema::new().field("age", FieldRule::integer()));
        assert_eq!(schema.field_names().collect::<Vec<_>>(), vec!["name", "email", "age"]);
        let picked = schema.pick(&["age"]);
        assert_eq!(picked.field_names().collect::<Vec<_>>(), vec!["age"]);
    }

    #[test]
    fn test_refinement_runs_only_after_fields_pass() {
        let schema = ObjectSchema::new()
            .field("password", FieldRule::string().min_length(4))
            .field("confirmPassword", FieldRule::string())
            .refine("confirmPassword", "Passwords do not match", |r| r.get("password") == r.get("confirmPassword"));

        let err = schema.validate(&json!({"password": "secret", "confirmPassword": "other"})).unwrap_err();
        assert_eq!(err.issues, vec![FieldIssue::new("confirmPassword", "Passwords do not match")]);

        let err = schema.validate(&json!({"password": "abc", "confirmPassword": "xyz"})).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.has_issue_at("password"));
    }

    #[test]
    fn test_nested_object_paths() {
        let schema = ObjectSchema::new().field(
            "extras",
            FieldRule::object(ObjectSchema::new().field("propertyLogo", FieldRule::string().url().optional())).optional(),
        );
        let err = schema.validate(&json!({"extras": {"propertyLogo": "nope"}})).unwrap_err();
        assert_eq!(err.messages_at("extras.propertyLogo"), vec!["Invalid url"]);
    }

    #[test]
    fn test_non_object_input() {
        let err = account().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(err.messages_at(""), vec!["Expected object, received array"]);
    }
}
