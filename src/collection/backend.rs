//! Storage backend interface.
//!
//! A backend is a flat namespace of named byte buffers, plus an optional
//! key-value attribute channel keyed by the same resource names.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by storage backends
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid resource name '{0}'")]
    InvalidName(String),

    /// The backend (or the volume under it) has no attribute channel
    #[error("Backend does not support resource attributes")]
    AttributesUnsupported,

    #[error("I/O error on '{resource}': {source}")]
    Io {
        resource: String,
        #[source]
        source: std::io::Error,
    },
}

impl BackendError {
    pub(crate) fn io(resource: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            resource: resource.into(),
            source,
        }
    }
}

/// Trait for resource storage
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Read a whole resource
    async fn read(&self, resource: &str) -> Result<Vec<u8>, BackendError>;

    /// Create or replace a resource
    async fn write(&self, resource: &str, content: &[u8]) -> Result<(), BackendError>;

    /// Every resource name, in a stable order
    async fn list(&self) -> Result<Vec<String>, BackendError>;

    /// Read one attribute; `Ok(None)` if the resource has no such attribute
    async fn get_attribute(&self, resource: &str, key: &str) -> Result<Option<String>, BackendError>;

    async fn set_attribute(&self, resource: &str, key: &str, value: &str) -> Result<(), BackendError>;
}
