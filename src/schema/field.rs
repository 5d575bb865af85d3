use super::error::FieldIssue;
use super::object::ObjectSchema;
use chrono::DateTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9_'+\-.]*[A-Za-z0-9_+\-]@([A-Za-z0-9][A-Za-z0-9\-]*\.)+[A-Za-z]{2,}$")
            .expect("email pattern compiles");
    static ref DATETIME_RE: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$").expect("datetime pattern compiles");
}

/// What kind of value a field accepts.
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Enum(Vec<String>),
    Object(Box<ObjectSchema>),
    Array(Box<FieldRule>),
    Any,
}

#[derive(Debug, Clone)]
enum Check {
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    Email,
    Url,
    DateTime,
    Min(f64),
    Max(f64),
    Positive,
}

impl Check {
    fn default_message(&self) -> String {
        match self {
            Self::MinLength(n) => format!("String must contain at least {n} character(s)"),
            Self::MaxLength(n) => format!("String must contain at most {n} character(s)"),
            Self::Pattern(_) => "Invalid".to_string(),
            Self::Email => "Invalid email".to_string(),
            Self::Url => "Invalid url".to_string(),
            Self::DateTime => "Invalid datetime".to_string(),
            Self::Min(n) => format!("Number must be greater than or equal to {n}"),
            Self::Max(n) => format!("Number must be less than or equal to {n}"),
            Self::Positive => "Number must be greater than 0".to_string(),
        }
    }

    fn passes(&self, value: &JsonValue) -> bool {
        match (self, value) {
            (Self::MinLength(n), JsonValue::String(s)) => s.chars().count() >= *n,
            (Self::MaxLength(n), JsonValue::String(s)) => s.chars().count() <= *n,
            (Self::Pattern(re), JsonValue::String(s)) => re.is_match(s),
            (Self::Email, JsonValue::String(s)) => {
                !s.starts_with('.') && !s.contains("..") && EMAIL_RE.is_match(s)
            }
            (Self::Url, JsonValue::String(s)) => url::Url::parse(s).is_ok(),
            (Self::DateTime, JsonValue::String(s)) => {
                DATETIME_RE.is_match(s) && DateTime::parse_from_rfc3339(s).is_ok()
            }
            (Self::Min(n), JsonValue::Number(x)) => x.as_f64().is_some_and(|x| x >= *n),
            (Self::Max(n), JsonValue::Number(x)) => x.as_f64().is_some_and(|x| x <= *n),
            (Self::Positive, JsonValue::Number(x)) => x.as_f64().is_some_and(|x| x > 0.0),
            _ => true,
        }
    }
}

/// Declarative rule for a single field: a kind, value checks and presence modifiers.
#[derive(Debug, Clone)]
pub struct FieldRule {
    kind: FieldKind,
    checks: Vec<(Check, Option<String>)>,
    optional: bool,
    nullable: bool,
    default: Option<JsonValue>,
}

impl FieldRule {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            checks: Vec::new(),
            optional: false,
            nullable: false,
            default: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldKind::String)
    }

    pub fn integer() -> Self {
        Self::of(FieldKind::Integer)
    }

    pub fn number() -> Self {
        Self::of(FieldKind::Number)
    }

    pub fn boolean() -> Self {
        Self::of(FieldKind::Boolean)
    }

    pub fn enumeration(allowed: &[&str]) -> Self {
        Self::of(FieldKind::Enum(allowed.iter().map(|s| s.to_string()).collect()))
    }

    pub fn object(schema: ObjectSchema) -> Self {
        Self::of(FieldKind::Object(Box::new(schema)))
    }

    pub fn array(items: FieldRule) -> Self {
        Self::of(FieldKind::Array(Box::new(items)))
    }

    pub fn any() -> Self {
        Self::of(FieldKind::Any)
    }

    fn check(mut self, check: Check) -> Self {
        self.checks.push((check, None));
        self
    }

    pub fn min_length(self, n: usize) -> Self {
        self.check(Check::MinLength(n))
    }

    pub fn max_length(self, n: usize) -> Self {
        self.check(Check::MaxLength(n))
    }

    pub fn pattern(self, re: Regex) -> Self {
        self.check(Check::Pattern(re))
    }

    pub fn email(self) -> Self {
        self.check(Check::Email)
    }

    pub fn url(self) -> Self {
        self.check(Check::Url)
    }

    pub fn datetime(self) -> Self {
        self.check(Check::DateTime)
    }

    pub fn min(self, n: f64) -> Self {
        self.check(Check::Min(n))
    }

    pub fn max(self, n: f64) -> Self {
        self.check(Check::Max(n))
    }

    pub fn positive(self) -> Self {
        self.check(Check::Positive)
    }

    /// Replace the message of the most recently added check.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        if let Some((_, slot)) = self.checks.last_mut() {
            *slot = Some(message.into());
        }
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<JsonValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default(&self) -> Option<&JsonValue> {
        self.default.as_ref()
    }

    /// Optional and without a default, as `partial()` makes every field.
    pub(crate) fn into_partial(mut self) -> Self {
        self.optional = true;
        self.default = None;
        self
    }

    /// Validate one value. `None` means the key was absent. Returns the value to keep,
    /// or `None` to leave the key out of the output.
    pub fn validate(&self, value: Option<&JsonValue>, path: &str, issues: &mut Vec<FieldIssue>) -> Option<JsonValue> {
        let value = match value {
            None => {
                if let Some(default) = &self.default {
                    return Some(default.clone());
                }
                if !self.optional {
                    issues.push(FieldIssue::new(path, "Required"));
                }
                return None;
            }
            Some(JsonValue::Null) if self.nullable => return Some(JsonValue::Null),
            Some(value) => value,
        };

        let parsed = match (&self.kind, value) {
            (FieldKind::Any, v) => v.clone(),
            (FieldKind::String, JsonValue::String(_)) | (FieldKind::Boolean, JsonValue::Bool(_)) => value.clone(),
            (FieldKind::Number, JsonValue::Number(_)) => value.clone(),
            (FieldKind::Integer, JsonValue::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    value.clone()
                } else {
                    issues.push(FieldIssue::new(path, "Expected integer, received float"));
                    return None;
                }
            }
            (FieldKind::Enum(allowed), JsonValue::String(s)) => {
                if allowed.iter().any(|a| a == s) {
                    value.clone()
                } else {
                    let expected = allowed.iter().map(|a| format!("'{a}'")).collect::<Vec<_>>().join(" | ");
                    issues.push(FieldIssue::new(
                        path,
                        format!("Invalid enum value. Expected {expected}, received '{s}'"),
                    ));
                    return None;
                }
            }
            (FieldKind::Object(schema), JsonValue::Object(_)) => {
                return schema.validate_at(value, path, issues).map(JsonValue::Object);
            }
            (FieldKind::Array(items), JsonValue::Array(elements)) => {
                let mut out = Vec::with_capacity(elements.len());
                for (i, element) in elements.iter().enumerate() {
                    let element_path = join_path(path, &i.to_string());
                    if let Some(parsed) = items.validate(Some(element), &element_path, issues) {
                        out.push(parsed);
                    }
                }
                JsonValue::Array(out)
            }
            (kind, other) => {
                issues.push(FieldIssue::new(
                    path,
                    format!("Expected {}, received {}", expected_name(kind), received_name(other)),
                ));
                return None;
            }
        };

        for (check, message) in &self.checks {
            if !check.passes(&parsed) {
                issues.push(FieldIssue::new(
                    path,
                    message.clone().unwrap_or_else(|| check.default_message()),
                ));
            }
        }
        Some(parsed)
    }
}

pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn expected_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::String | FieldKind::Enum(_) => "string",
        FieldKind::Integer | FieldKind::Number => "number",
        FieldKind::Boolean => "boolean",
        FieldKind::Object(_) => "object",
        FieldKind::Array(_) => "array",
        FieldKind::Any => "any",
    }
}

pub(crate) fn received_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(rule: &FieldRule, value: Option<JsonValue>) -> (Option<JsonValue>, Vec<FieldIssue>) {
        let mut issues = Vec::new();
        let out = rule.validate(value.as_ref(), "field", &mut issues);
        (out, issues)
    }

    #[test]
    fn test_presence_modifiers() {
        let (_, issues) = run(&FieldRule::string(), None);
        assert_eq!(issues, vec![FieldIssue::new("field", "Required")]);

        let (out, issues) = run(&FieldRule::string().optional(), None);
        assert!(out.is_none() && issues.is_empty());

        let (out, _) = run(&FieldRule::enumeration(&["read", "unread"]).default_value("unread"), None);
        assert_eq!(out, Some(json!("unread")));

        let (out, issues) = run(&FieldRule::string().nullable(), Some(JsonValue::Null));
        assert_eq!(out, Some(JsonValue::Null));
        assert!(issues.is_empty());

        let (_, issues) = run(&FieldRule::string(), Some(JsonValue::Null));
        assert_eq!(issues[0].message, "Expected string, received null");
    }

    #[test]
    fn test_string_checks_collect_every_failure() {
        let rule = FieldRule::string().min_length(10).email();
        let (_, issues) = run(&rule, Some(json!("nope")));
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].message, "String must contain at least 10 character(s)");
        assert_eq!(issues[1].message, "Invalid email");
    }

    #[test]
    fn test_custom_message() {
        let rule = FieldRule::string().min_length(4).with_message("Password must be at least 4 characters long");
        let (_, issues) = run(&rule, Some(json!("abc")));
        assert_eq!(issues[0].message, "Password must be at least 4 characters long");
    }

    #[test]
    fn test_formats() {
        let email = FieldRule::string().email();
        assert!(run(&email, Some(json!("guest@hotel.example"))).1.is_empty());
        assert!(!run(&email, Some(json!("guest@@hotel"))).1.is_empty());
        assert!(!run(&email, Some(json!(".guest@hotel.io"))).1.is_empty());

        let url = FieldRule::string().url();
        assert!(run(&url, Some(json!("https://cdn.example.com/a.png"))).1.is_empty());
        assert!(!run(&url, Some(json!("not a url"))).1.is_empty());

        let datetime = FieldRule::string().datetime();
        assert!(run(&datetime, Some(json!("2024-03-01T10:00:00.123456Z"))).1.is_empty());
        assert!(!run(&datetime, Some(json!("2024-03-01 10:00"))).1.is_empty());
        assert!(!run(&datetime, Some(json!("2024-03-01T10:00:00+02:00"))).1.is_empty());
    }

    #[test]
    fn test_datetime_must_be_a_real_instant() {
        let datetime = FieldRule::string().datetime();
        assert!(run(&datetime, Some(json!("2024-02-29T23:59:59Z"))).1.is_empty());
        for impossible in ["2024-13-45T99:99:99Z", "2023-02-29T00:00:00Z", "2024-04-31T12:00:00Z"] {
            let (_, issues) = run(&datetime, Some(json!(impossible)));
            assert_eq!(issues.len(), 1, "{impossible}");
            assert_eq!(issues[0].message, "Invalid datetime");
        }
    }

    #[test]
    fn test_numeric_bounds() {
        let rule = FieldRule::number().positive().max(100.0).with_message("Maximum value can be 100.");
        assert!(run(&rule, Some(json!(55.5))).1.is_empty());
        assert_eq!(run(&rule, Some(json!(0))).1[0].message, "Number must be greater than 0");
        assert_eq!(run(&rule, Some(json!(101))).1[0].message, "Maximum value can be 100.");
        assert_eq!(
            run(&FieldRule::integer(), Some(json!(1.5))).1[0].message,
            "Expected integer, received float"
        );
    }

    #[test]
    fn test_enum_message_lists_options() {
        let (_, issues) = run(&FieldRule::enumeration(&["user", "tv"]), Some(json!("fridge")));
        assert_eq!(issues[0].message, "Invalid enum value. Expected 'user' | 'tv', received 'fridge'");
    }

    #[test]
    fn test_array_items_are_addressed_by_index() {
        let rule = FieldRule::array(FieldRule::string().max_length(2));
        let (_, issues) = run(&rule, Some(json!(["ok", "too long"])));
        assert_eq!(issues, vec![FieldIssue::new("field.1", "String must contain at most 2 character(s)")]);
    }
}
