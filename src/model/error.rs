use crate::Record;
use crate::connection::ConnectionError;
use crate::core::StoreError;
use crate::schema::ValidationError;
use crate::tenant::TenantError;
use thiserror::Error;

pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Errors surfaced by persistence services.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid identifier '{value}'")]
    InvalidIdentifier { value: String },

    #[error("Record not found for filter {}", render_filter(.filter))]
    NotFound { filter: Record },

    #[error("{message}")]
    DuplicateKey { fields: Vec<String>, message: String },

    #[error(transparent)]
    TenantContext(#[from] TenantError),

    #[error("Data source is not initialized; call connect() first")]
    NotInitialized,

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ModelError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::DuplicateKey { .. } => "DUPLICATE_KEY",
            Self::TenantContext(_) => "TENANT_CONTEXT",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::Connection(_) => "CONNECTION",
            Self::Store(_) => "STORE",
            Self::Serialization(_) => "SERIALIZATION",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the message is meant for the caller rather than for operators.
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InvalidIdentifier { .. } | Self::NotFound { .. } | Self::DuplicateKey { .. }
        )
    }

    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::single(path, message))
    }
}

fn render_filter(filter: &Record) -> String {
    serde_json::Value::Object(filter.clone()).to_string()
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
