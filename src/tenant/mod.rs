//! Request-scoped tenant context and namespace resolution.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Context key holding the active tenant namespace.
pub const TENANT_SCHEMA_KEY: &str = "tenantSchema";

/// Namespace used by entities that are not tenant scoped.
pub const SHARED_NAMESPACE: &str = "public";

const MAX_NAMESPACE_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TenantError {
    #[error("Tenant context is not set: missing '{0}'")]
    Missing(String),

    #[error("Invalid tenant namespace '{0}'")]
    InvalidNamespace(String),
}

/// Values scoped to one logical request.
///
/// Built once when request handling starts and immutable afterwards; clones share the
/// same underlying map.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    values: Arc<HashMap<String, String>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            values: Arc::new(HashMap::new()),
        }
    }

    /// Context carrying `tenant` under [`TENANT_SCHEMA_KEY`].
    pub fn for_tenant(tenant: impl Into<String>) -> Self {
        Self::new().with_value(TENANT_SCHEMA_KEY, tenant)
    }

    /// Add one value while building the context.
    pub fn with_value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut values = Arc::unwrap_or_clone(self.values);
        values.insert(key.into(), value.into());
        Self {
            request_id: self.request_id,
            values: Arc::new(values),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn tenant(&self) -> Option<&str> {
        self.get(TENANT_SCHEMA_KEY)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Strategy that picks the storage namespace for an operation.
pub trait TenantResolver: Send + Sync {
    fn resolve(&self, ctx: &RequestContext) -> Result<String, TenantError>;
}

/// Reads the namespace from the request context; fails when it is absent.
#[derive(Debug, Clone, Default)]
pub struct ContextTenantResolver;

impl TenantResolver for ContextTenantResolver {
    fn resolve(&self, ctx: &RequestContext) -> Result<String, TenantError> {
        let tenant = ctx
            .tenant()
            .ok_or_else(|| TenantError::Missing(TENANT_SCHEMA_KEY.to_string()))?;
        validate_namespace(tenant)?;
        Ok(tenant.to_string())
    }
}

/// Always resolves to one fixed namespace.
#[derive(Debug, Clone)]
pub struct SharedNamespace {
    namespace: String,
}

impl SharedNamespace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl Default for SharedNamespace {
    fn default() -> Self {
        Self::new(SHARED_NAMESPACE)
    }
}

impl TenantResolver for SharedNamespace {
    fn resolve(&self, _ctx: &RequestContext) -> Result<String, TenantError> {
        Ok(self.namespace.clone())
    }
}

/// Namespace names: a letter or underscore, then letters, digits or underscores.
pub fn validate_namespace(name: &str) -> Result<(), TenantError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            name.len() <= MAX_NAMESPACE_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(TenantError::InvalidNamespace(name.to_string()))
    }
}
