//! Submissions: one archived creative work.
//!
//! A submission is an identity plus two lazily resolved parts: the payload
//! bytes (a [`Fetchable`]) and the structured metadata. Both are loaded at
//! most once and the result, success or failure, is memoized.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fetchable::{FetchError, Fetchable};

/// Free-form submission tags, kept in insertion order
pub type Tags = IndexMap<String, String>;

/// Errors surfaced by the lazy submission accessors
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Failed to fetch submission content: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to load submission metadata: {0}")]
    Metadata(String),
}

/// Logical identity of a submission.
///
/// `(site, id)` is the primary key; `resource` only locates the stored copy
/// inside a backend and takes no part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionIdentifier {
    pub id: String,
    pub site: String,
    #[serde(skip)]
    pub resource: Option<String>,
}

impl SubmissionIdentifier {
    /// Create an identifier without a resource locator
    pub fn new(site: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            site: site.into(),
            resource: None,
        }
    }

    /// Attach the backend resource this identifier was found at
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Whether both identifiers name the same `(site, id)`
    pub fn same_identity(&self, other: &SubmissionIdentifier) -> bool {
        self.site == other.site && self.id == other.id
    }

    /// Default resource base name: `"{site} {id}"`
    pub fn base_name(&self) -> String {
        format!("{} {}", self.site, self.id)
    }
}

impl PartialEq for SubmissionIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
    }
}

impl Eq for SubmissionIdentifier {}

impl std::hash::Hash for SubmissionIdentifier {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.site.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Display for SubmissionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.site, self.id)
    }
}

/// The credited creator of a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Artist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Provenance metadata embedded into every archived file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    /// Where the payload was downloaded from
    pub image_url: String,

    pub title: String,

    pub date_uploaded: DateTime<Utc>,

    pub artist: Artist,

    #[serde(default)]
    pub tags: Tags,
}

/// Deferred producer of submission metadata (e.g. a submission page scrape)
#[async_trait]
pub trait MetadataLoader: Send + Sync {
    async fn load(&self) -> anyhow::Result<SubmissionMetadata>;
}

#[derive(Debug)]
enum MetadataState {
    NotLoaded,
    Loaded(SubmissionMetadata),
    Failed(String),
}

/// One creative work: identity, payload and metadata
pub struct Submission {
    identifier: SubmissionIdentifier,
    image: Fetchable,
    loader: Option<Box<dyn MetadataLoader>>,
    metadata: MetadataState,
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("identifier", &self.identifier)
            .field("image", &self.image)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl Submission {
    /// A submission whose metadata is already known
    pub fn new(
        identifier: SubmissionIdentifier,
        image: Fetchable,
        metadata: SubmissionMetadata,
    ) -> Self {
        Self {
            identifier,
            image,
            loader: None,
            metadata: MetadataState::Loaded(metadata),
        }
    }

    /// A submission whose metadata is produced on first access
    pub fn with_loader(
        identifier: SubmissionIdentifier,
        image: Fetchable,
        loader: Box<dyn MetadataLoader>,
    ) -> Self {
        Self {
            identifier,
            image,
            loader: Some(loader),
            metadata: MetadataState::NotLoaded,
        }
    }

    /// The static variant: an in-memory payload and fixed metadata
    pub fn from_static(
        identifier: SubmissionIdentifier,
        metadata: SubmissionMetadata,
        content: Vec<u8>,
    ) -> Self {
        Self::new(identifier, Fetchable::from_static(content), metadata)
    }

    pub fn identifier(&self) -> &SubmissionIdentifier {
        &self.identifier
    }

    pub fn id(&self) -> &str {
        &self.identifier.id
    }

    pub fn site(&self) -> &str {
        &self.identifier.site
    }

    /// The payload fetchable (not yet loaded unless static)
    pub fn image(&mut self) -> &mut Fetchable {
        &mut self.image
    }

    /// Payload bytes, fetched on first call
    pub async fn content(&mut self) -> Result<&[u8], SubmissionError> {
        Ok(self.image.content().await?)
    }

    /// Metadata, loaded on first call
    pub async fn metadata(&mut self) -> Result<&SubmissionMetadata, SubmissionError> {
        if let MetadataState::NotLoaded = self.metadata {
            self.metadata = match &self.loader {
                Some(loader) => match loader.load().await {
                    Ok(metadata) => MetadataState::Loaded(metadata),
                    Err(e) => MetadataState::Failed(format!("{:#}", e)),
                },
                None => MetadataState::Failed("no metadata source".to_string()),
            };
        }

        match &self.metadata {
            MetadataState::Loaded(metadata) => Ok(metadata),
            MetadataState::Failed(e) => Err(SubmissionError::Metadata(e.clone())),
            MetadataState::NotLoaded => Err(SubmissionError::Metadata(
                "metadata was not loaded".to_string(),
            )),
        }
    }
}
