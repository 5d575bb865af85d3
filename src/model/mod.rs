//! Persistence services: validation, identifier mapping, tenant-qualified collections
//! and duplicate-key translation on top of a [`DocumentStore`](crate::storage::DocumentStore).

pub mod codec;
pub mod datasource;
pub mod definition;
pub mod duplicate;
pub mod error;
pub mod hooks;
pub mod service;

pub use codec::{EXTERNAL_ID_FIELD, IdentifierCodec};
pub use datasource::{ConnectOptions, DataSource, Database};
pub use definition::{DEFAULT_SEPARATOR, EntityDefinition};
pub use duplicate::DuplicateKeyTranslator;
pub use error::{ModelError, ModelResult};
pub use hooks::{CREATED_AT, EntityHooks, TimestampedHooks, UPDATED_AT, now_timestamp};
pub use service::PersistenceService;
