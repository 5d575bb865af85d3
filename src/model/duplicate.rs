use super::error::ModelError;
use crate::core::StoreError;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref INDEX_NAME_RE: Regex = Regex::new(r"index: (.+?) dup key").expect("index name pattern compiles");
    static ref NUMERIC_RE: Regex = Regex::new(r"^\d+$").expect("numeric pattern compiles");
}

/// Turns raw uniqueness violations into caller-facing errors naming the fields.
///
/// Field names are recovered from the index name by convention (`email_1`,
/// `propertyId_1_roomId_1`), so names that themselves contain `_` come out split.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateKeyTranslator;

impl DuplicateKeyTranslator {
    /// Field names encoded in a duplicate-key message; empty when none can be found.
    pub fn fields(&self, message: &str) -> Vec<String> {
        let Some(index_name) = INDEX_NAME_RE.captures(message).and_then(|c| c.get(1)) else {
            return Vec::new();
        };
        let parts: Vec<&str> = index_name.as_str().split('_').collect();
        let last = parts.len().saturating_sub(1);
        parts
            .into_iter()
            .enumerate()
            .filter(|(i, part)| *i != last && !NUMERIC_RE.is_match(part))
            .map(|(_, part)| part.to_string())
            .collect()
    }

    pub fn message(&self, fields: &[String]) -> String {
        match fields {
            [] => "Duplicate value received for unique field. Check your request again.".to_string(),
            [field] => format!("Duplicate value received for unique field {field}."),
            many => format!("Duplicate value received for unique fields {}.", many.join(", ")),
        }
    }

    /// Duplicate-key errors become `ModelError::DuplicateKey`; everything else is
    /// passed through unchanged.
    pub fn translate(&self, err: StoreError) -> ModelError {
        match &err {
            StoreError::DuplicateKey { message, .. } if err.is_duplicate_key() => {
                let fields = self.fields(message);
                let message = self.message(&fields);
                ModelError::DuplicateKey { fields, message }
            }
            _ => ModelError::Store(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(index: &str) -> StoreError {
        StoreError::duplicate_key("app.public.users", index, "{ email: \"a@b.io\" }")
    }

    #[test]
    fn test_single_field() {
        let err = DuplicateKeyTranslator.translate(raw("email_1"));
        assert_eq!(
            err,
            ModelError::DuplicateKey {
                fields: vec!["email".into()],
                message: "Duplicate value received for unique field email.".into(),
            }
        );
    }

    #[test]
    fn test_compound_index() {
        let fields = DuplicateKeyTranslator.fields(&raw("propertyId_1_roomId_1").to_string());
        assert_eq!(fields, vec!["propertyId", "roomId"]);
        assert_eq!(
            DuplicateKeyTranslator.message(&fields),
            "Duplicate value received for unique fields propertyId, roomId."
        );
    }

    #[test]
    fn test_underscored_names_split() {
        let fields = DuplicateKeyTranslator.fields(&raw("claim_code_1").to_string());
        assert_eq!(fields, vec!["claim", "code"]);
    }

    #[test]
    fn test_unparseable_message_falls_back() {
        let err = DuplicateKeyTranslator.translate(StoreError::DuplicateKey {
            code: crate::core::DUPLICATE_KEY_CODE,
            message: "E11000 duplicate key error".into(),
        });
        assert_eq!(
            err.to_string(),
            "Duplicate value received for unique field. Check your request again."
        );
    }

    #[test]
    fn test_other_errors_are_untouched() {
        let err = DuplicateKeyTranslator.translate(StoreError::Closed);
        assert_eq!(err, ModelError::Store(StoreError::Closed));
    }
}
