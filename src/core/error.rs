use thiserror::Error;

/// Error code the store attaches to every uniqueness violation.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Raw errors raised by a document store.
///
/// Messages follow the wire format of the store so that callers which only see the
/// rendered text (logs, upstream translators) can still classify them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{message}")]
    DuplicateKey { code: i32, message: String },

    #[error("Document failed validation: {0}")]
    DocumentValidation(String),

    #[error("Index with name '{0}' already exists with different options")]
    IndexOptionsConflict(String),

    #[error("Invalid collection options: {0}")]
    InvalidOptions(String),

    #[error("Bad query: {0}")]
    BadQuery(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Performing an update on the path '{0}' would modify the immutable field '{0}'")]
    ImmutableField(String),

    #[error("ns does not exist: {0}")]
    NamespaceNotFound(String),

    #[error("Collection already exists. NS: {0}")]
    NamespaceExists(String),

    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    pub fn duplicate_key(namespace: &str, index_name: &str, key: &str) -> Self {
        Self::DuplicateKey {
            code: DUPLICATE_KEY_CODE,
            message: format!(
                "E11000 duplicate key error collection: {namespace} index: {index_name} dup key: {key}"
            ),
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { code, .. } if *code == DUPLICATE_KEY_CODE)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
