use serde::Serialize;
use thiserror::Error;

/// One violated rule, addressed by a dotted path (`extras.propertyLogo`, `tags.0`).
/// The empty path refers to the record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub path: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Every rule a record violated, in the order they were found.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Validation failed: {}", render_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<FieldIssue>) -> Self {
        Self { issues }
    }

    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldIssue::new(path, message)])
    }

    /// Messages reported at `path`.
    pub fn messages_at(&self, path: &str) -> Vec<&str> {
        self.issues
            .iter()
            .filter(|issue| issue.path == path)
            .map(|issue| issue.message.as_str())
            .collect()
    }

    pub fn has_issue_at(&self, path: &str) -> bool {
        self.issues.iter().any(|issue| issue.path == path)
    }
}

fn render_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|issue| {
            if issue.path.is_empty() {
                issue.message.clone()
            } else {
                format!("{}: {}", issue.path, issue.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
