//! Collections: where archived submissions live.
//!
//! A [`Collection`] combines a storage [`Backend`], the file type
//! [`Registry`] and an identity [`Hinter`]. Storing embeds metadata into the
//! payload and names the resource `"{site} {id}.{ext}"`; listing recovers
//! identities from the hints alone, without decoding any file.

pub mod backend;
pub mod filesystem;
pub mod hint;
pub mod memory;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

pub use backend::{Backend, BackendError};
pub use filesystem::FilesystemBackend;
pub use hint::{HintStrategy, Hinter};
pub use memory::MemoryBackend;

use crate::domain::{Submission, SubmissionError, SubmissionIdentifier};
use crate::filetypes::{self, CodecError, Registry};

/// Extension used when neither the content nor the source URL tells
const FALLBACK_EXTENSION: &str = "jpg";

/// Errors from collection operations
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("No such submission {site}:{id}")]
    NotFound { site: String, id: String },
}

/// Result of a successful store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    /// Resource name the payload was written to
    pub resource: String,

    /// Sniffed MIME type of the original payload
    pub mime: &'static str,

    /// Whether metadata was embedded
    pub tagged: bool,
}

/// A named store of archived submissions
pub struct Collection {
    name: String,
    backend: Arc<dyn Backend>,
    registry: Registry,
    hinter: Hinter,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("backend", &self.backend.name())
            .field("registry", &self.registry)
            .field("hinter", &self.hinter)
            .finish()
    }
}

impl Collection {
    /// A collection with the default registry and hint strategies
    pub fn new(name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            name: name.into(),
            backend,
            registry: Registry::default(),
            hinter: Hinter::default(),
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_hinter(mut self, hinter: Hinter) -> Self {
        self.hinter = hinter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Encode a submission and write it under its default resource name
    #[instrument(skip(self, submission), fields(collection = %self.name, submission = %submission.identifier()))]
    pub async fn store(&self, submission: &mut Submission) -> Result<StoreOutcome, CollectionError> {
        let identifier = submission.identifier().clone();
        let metadata = submission.metadata().await?.clone();
        let content = submission.content().await?;

        let encoded = filetypes::process_for_output(&self.registry, &identifier, &metadata, content)?;

        let ext = if encoded.kind.is_unknown() {
            let ext = url_extension(&metadata.image_url).unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
            warn!(
                "Unable to determine file type of {}; using extension '{}'",
                identifier, ext
            );
            ext
        } else {
            encoded.kind.ext.to_string()
        };

        let resource = format!("{}.{}", identifier.base_name(), ext);
        self.backend.write(&resource, &encoded.content).await?;

        match self
            .hinter
            .set_identifier_hint(self.backend.as_ref(), &resource, &identifier)
            .await
        {
            Ok(()) => {}
            Err(BackendError::AttributesUnsupported) => warn!(
                "{} backend has no attribute support; '{}' is identified by name only",
                self.backend.name(),
                resource
            ),
            Err(e) => return Err(e.into()),
        }

        info!(%resource, tagged = encoded.tagged, "Stored {}", identifier);
        Ok(StoreOutcome {
            resource,
            mime: encoded.kind.mime,
            tagged: encoded.tagged,
        })
    }

    /// Read a resource and decode the submission embedded in it
    #[instrument(skip(self), fields(collection = %self.name))]
    pub async fn fetch(&self, resource: &str) -> Result<Submission, CollectionError> {
        let content = self.backend.read(resource).await?;
        let decoded = filetypes::process_for_input(&self.registry, &content)?;
        Ok(decoded.into_submission(Some(resource.to_string())))
    }

    /// Identities of every recognisable resource.
    ///
    /// Resources without any identity hint are skipped with a warning.
    pub async fn list(&self) -> Result<Vec<SubmissionIdentifier>, CollectionError> {
        let mut identifiers = Vec::new();
        for resource in self.backend.list().await? {
            match self
                .hinter
                .get_identifier_hint(self.backend.as_ref(), &resource)
                .await
            {
                Some(identifier) => identifiers.push(identifier),
                None => warn!("Skipping unrecognised resource '{}' in {}", resource, self.name),
            }
        }
        Ok(identifiers)
    }

    /// Fetch the stored copy of `identifier`
    pub async fn get(&self, identifier: &SubmissionIdentifier) -> Result<Submission, CollectionError> {
        let found = self
            .list()
            .await?
            .into_iter()
            .find(|candidate| candidate.same_identity(identifier))
            .and_then(|candidate| candidate.resource);

        match found {
            Some(resource) => self.fetch(&resource).await,
            None => Err(CollectionError::NotFound {
                site: identifier.site.clone(),
                id: identifier.id.clone(),
            }),
        }
    }
}

/// Extension of the last path segment of `url`, if it looks like one
fn url_extension(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let last = url.path_segments()?.last()?;
    let (_, ext) = last.rsplit_once('.')?;
    let valid = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filetypes::fixtures::{sample_identifier, sample_metadata, tiny_png};

    fn memory_collection() -> Collection {
        Collection::new("test", Arc::new(MemoryBackend::new()))
    }

    #[test]
    fn test_url_extension() {
        assert_eq!(url_extension("http://www.example.com/~pkovac/1234.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(url_extension("https://cdn.example.com/a/b.PNG?size=full").as_deref(), Some("png"));
        assert_eq!(url_extension("https://example.com/view/1234"), None);
        assert_eq!(url_extension("not a url"), None);
    }

    #[tokio::test]
    async fn test_store_names_resource_by_sniffed_type() {
        let collection = memory_collection();
        let mut submission = Submission::from_static(sample_identifier(), sample_metadata(), tiny_png());

        let outcome = collection.store(&mut submission).await.unwrap();
        assert_eq!(outcome.resource, "example.com 1234.png");
        assert_eq!(outcome.mime, "image/png");
        assert!(outcome.tagged);
    }

    #[tokio::test]
    async fn test_unknown_payload_uses_url_extension() {
        let collection = memory_collection();
        let payload = vec![0x00, 0x01, 0x02, 0x03];
        let mut submission = Submission::from_static(sample_identifier(), sample_metadata(), payload.clone());

        let outcome = collection.store(&mut submission).await.unwrap();
        assert_eq!(outcome.resource, "example.com 1234.jpeg");
        assert!(!outcome.tagged);
        assert_eq!(collection.backend().read(&outcome.resource).await.unwrap(), payload);

        let mut metadata = sample_metadata();
        metadata.image_url = "https://example.com/view/1234".to_string();
        let mut submission = Submission::from_static(SubmissionIdentifier::new("example.com", "99"), metadata, payload);
        let outcome = collection.store(&mut submission).await.unwrap();
        assert_eq!(outcome.resource, "example.com 99.jpg");
    }

    #[tokio::test]
    async fn test_store_fetch_list_get() {
        let collection = memory_collection();
        let mut submission = Submission::from_static(sample_identifier(), sample_metadata(), tiny_png());
        collection.store(&mut submission).await.unwrap();

        let listed = collection.list().await.unwrap();
        assert_eq!(listed, vec![sample_identifier()]);

        let mut fetched = collection.get(&sample_identifier()).await.unwrap();
        assert_eq!(fetched.identifier().resource.as_deref(), Some("example.com 1234.png"));
        assert_eq!(fetched.metadata().await.unwrap(), &sample_metadata());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let collection = memory_collection();
        let missing = SubmissionIdentifier::new("example.com", "404");
        assert!(matches!(
            collection.get(&missing).await,
            Err(CollectionError::NotFound { site, id }) if site == "example.com" && id == "404"
        ));
    }

    #[tokio::test]
    async fn test_list_skips_unrecognised_resources() {
        let backend = Arc::new(MemoryBackend::without_attributes());
        backend.write("holiday.jpg", b"x").await.unwrap();
        backend.write("example.com 5.txt", b"x").await.unwrap();

        let collection = Collection::new("test", backend);
        assert_eq!(
            collection.list().await.unwrap(),
            vec![SubmissionIdentifier::new("example.com", "5")]
        );
    }

    #[tokio::test]
    async fn test_store_without_attributes_still_succeeds() {
        let collection = Collection::new("test", Arc::new(MemoryBackend::without_attributes()));
        let mut submission = Submission::from_static(sample_identifier(), sample_metadata(), tiny_png());
        let outcome = collection.store(&mut submission).await.unwrap();
        assert_eq!(collection.list().await.unwrap(), vec![sample_identifier()]);
        assert_eq!(outcome.resource, "example.com 1234.png");
    }

    #[tokio::test]
    async fn test_fetch_undecodable_fails() {
        let backend = Arc::new(MemoryBackend::new());
        backend.write("example.com 1.gif", b"GIF89a\x01\x00").await.unwrap();
        let collection = Collection::new("test", backend);

        assert!(matches!(
            collection.fetch("example.com 1.gif").await,
            Err(CollectionError::Codec(CodecError::NoDecoder(_)))
        ));
    }
}
