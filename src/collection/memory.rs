//! In-memory storage, for tests and dry runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::{Backend, BackendError};

/// Backend keeping every resource in a map
#[derive(Debug)]
pub struct MemoryBackend {
    resources: RwLock<BTreeMap<String, Vec<u8>>>,
    attributes: Option<RwLock<HashMap<(String, String), String>>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// A backend with an attribute channel
    pub fn new() -> Self {
        Self {
            resources: RwLock::default(),
            attributes: Some(RwLock::default()),
        }
    }

    /// A backend that rejects attribute access, like a filesystem without
    /// extended attributes
    pub fn without_attributes() -> Self {
        Self {
            resources: RwLock::default(),
            attributes: None,
        }
    }

    fn attributes(&self) -> Result<&RwLock<HashMap<(String, String), String>>, BackendError> {
        self.attributes
            .as_ref()
            .ok_or(BackendError::AttributesUnsupported)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self, resource: &str) -> Result<Vec<u8>, BackendError> {
        self.resources
            .read()
            .await
            .get(resource)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(resource.to_string()))
    }

    async fn write(&self, resource: &str, content: &[u8]) -> Result<(), BackendError> {
        if resource.is_empty() {
            return Err(BackendError::InvalidName(resource.to_string()));
        }
        self.resources
            .write()
            .await
            .insert(resource.to_string(), content.to_vec());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.resources.read().await.keys().cloned().collect())
    }

    async fn get_attribute(&self, resource: &str, key: &str) -> Result<Option<String>, BackendError> {
        let attributes = self.attributes()?;
        if !self.resources.read().await.contains_key(resource) {
            return Err(BackendError::NotFound(resource.to_string()));
        }
        Ok(attributes
            .read()
            .await
            .get(&(resource.to_string(), key.to_string()))
            .cloned())
    }

    async fn set_attribute(&self, resource: &str, key: &str, value: &str) -> Result<(), BackendError> {
        let attributes = self.attributes()?;
        if !self.resources.read().await.contains_key(resource) {
            return Err(BackendError::NotFound(resource.to_string()));
        }
        attributes
            .write()
            .await
            .insert((resource.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resources() {
        let backend = MemoryBackend::new();
        backend.write("b.txt", b"2").await.unwrap();
        backend.write("a.txt", b"1").await.unwrap();

        assert_eq!(backend.list().await.unwrap(), vec!["a.txt", "b.txt"]);
        assert_eq!(backend.read("a.txt").await.unwrap(), b"1");
        assert!(matches!(backend.read("c.txt").await, Err(BackendError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_attributes_need_resource() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.set_attribute("a.txt", "k", "v").await,
            Err(BackendError::NotFound(_))
        ));

        backend.write("a.txt", b"1").await.unwrap();
        backend.set_attribute("a.txt", "k", "v").await.unwrap();
        assert_eq!(backend.get_attribute("a.txt", "k").await.unwrap(), Some("v".to_string()));
        assert_eq!(backend.get_attribute("a.txt", "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_without_attributes() {
        let backend = MemoryBackend::without_attributes();
        backend.write("a.txt", b"1").await.unwrap();
        assert!(matches!(
            backend.get_attribute("a.txt", "k").await,
            Err(BackendError::AttributesUnsupported)
        ));
    }
}
