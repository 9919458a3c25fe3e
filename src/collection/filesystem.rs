//! Directory-backed storage.
//!
//! Each resource is a regular file directly under the root directory.
//! Writes go to a hidden temporary sibling first and are renamed into place,
//! so an interrupted store never leaves a partial file under the real name.
//! Attributes map onto extended attributes of the file.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use super::backend::{Backend, BackendError};

/// Backend storing resources as files in one directory
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a resource name to its path, rejecting anything that is not a
    /// single visible path component
    fn path_for(&self, resource: &str) -> Result<PathBuf, BackendError> {
        let mut components = Path::new(resource).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if !resource.starts_with('.') => {
                Ok(self.root.join(name))
            }
            _ => Err(BackendError::InvalidName(resource.to_string())),
        }
    }

    async fn attribute_io<T, F>(&self, resource: &str, op: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> io::Result<T> + Send + 'static,
    {
        if !xattr::SUPPORTED_PLATFORM {
            return Err(BackendError::AttributesUnsupported);
        }

        let path = self.path_for(resource)?;
        let name = resource.to_string();
        let result = tokio::task::spawn_blocking(move || op(&path))
            .await
            .map_err(|e| BackendError::io(&name, io::Error::new(io::ErrorKind::Other, e)))?;

        result.map_err(|e| match e.kind() {
            _ if is_unsupported(&e) => BackendError::AttributesUnsupported,
            io::ErrorKind::NotFound => BackendError::NotFound(name),
            _ => BackendError::io(name, e),
        })
    }
}

/// The volume refuses extended attributes altogether
fn is_unsupported(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::Unsupported
        || matches!(e.raw_os_error(), Some(code) if code == libc::ENOTSUP || code == libc::EOPNOTSUPP)
}

#[async_trait]
impl Backend for FilesystemBackend {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn read(&self, resource: &str) -> Result<Vec<u8>, BackendError> {
        let path = self.path_for(resource)?;
        fs::read(&path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BackendError::NotFound(resource.to_string()),
            _ => BackendError::io(resource, e),
        })
    }

    async fn write(&self, resource: &str, content: &[u8]) -> Result<(), BackendError> {
        let path = self.path_for(resource)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| BackendError::io(resource, e))?;

        let temp = self.root.join(format!(".{}.{}.tmp", resource, Uuid::new_v4()));
        if let Err(e) = fs::write(&temp, content).await {
            let _ = fs::remove_file(&temp).await;
            return Err(BackendError::io(resource, e));
        }
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(BackendError::io(resource, e));
        }

        debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, BackendError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackendError::io(self.root.display().to_string(), e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackendError::io(self.root.display().to_string(), e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                debug!("Skipping non UTF-8 file name in {}", self.root.display());
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    async fn get_attribute(&self, resource: &str, key: &str) -> Result<Option<String>, BackendError> {
        let key = key.to_string();
        let value = self
            .attribute_io(resource, move |path| xattr::get(path, &key))
            .await?;
        Ok(value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn set_attribute(&self, resource: &str, key: &str, value: &str) -> Result<(), BackendError> {
        let key = key.to_string();
        let value = value.as_bytes().to_vec();
        self.attribute_io(resource, move |path| xattr::set(path, &key, &value))
            .await
    }
}
