//! Identifier hints: recovering a resource's `(site, id)` without decoding
//! its content.

use std::path::Path;

use tracing::{debug, warn};

use super::backend::{Backend, BackendError};
use crate::domain::SubmissionIdentifier;

/// Default attribute namespace; Linux only allows `user.*` for unprivileged
/// extended attributes
pub const DEFAULT_NAMESPACE: &str = "user.artvault";

/// One way of attaching an identity to a stored resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintStrategy {
    /// `<namespace>.id` and `<namespace>.site` side-channel attributes
    Attribute { namespace: String },
    /// `"{site} {id}.{ext}"` resource names; identity is fixed at creation
    Filename,
}

impl HintStrategy {
    pub fn attribute(namespace: impl Into<String>) -> Self {
        Self::Attribute {
            namespace: namespace.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HintStrategy::Attribute { .. } => "attribute",
            HintStrategy::Filename => "filename",
        }
    }

    pub fn supports_write(&self) -> bool {
        matches!(self, HintStrategy::Attribute { .. })
    }

    async fn read(
        &self,
        backend: &dyn Backend,
        resource: &str,
    ) -> Result<Option<SubmissionIdentifier>, BackendError> {
        match self {
            HintStrategy::Attribute { namespace } => {
                let id = backend.get_attribute(resource, &format!("{}.id", namespace)).await?;
                let site = backend.get_attribute(resource, &format!("{}.site", namespace)).await?;
                Ok(match (site, id) {
                    (Some(site), Some(id)) => Some(SubmissionIdentifier::new(site, id)),
                    _ => None,
                })
            }
            HintStrategy::Filename => Ok(identifier_from_name(resource)),
        }
    }

    async fn write(
        &self,
        backend: &dyn Backend,
        resource: &str,
        identifier: &SubmissionIdentifier,
    ) -> Result<(), BackendError> {
        match self {
            HintStrategy::Attribute { namespace } => {
                backend
                    .set_attribute(resource, &format!("{}.id", namespace), &identifier.id)
                    .await?;
                backend
                    .set_attribute(resource, &format!("{}.site", namespace), &identifier.site)
                    .await
            }
            HintStrategy::Filename => Ok(()),
        }
    }
}

/// Ordered hint strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hinter {
    strategies: Vec<HintStrategy>,
}

impl Default for Hinter {
    fn default() -> Self {
        Self::new(vec![
            HintStrategy::attribute(DEFAULT_NAMESPACE),
            HintStrategy::Filename,
        ])
    }
}

impl Hinter {
    pub fn new(strategies: Vec<HintStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[HintStrategy] {
        &self.strategies
    }

    /// The identity of `resource` from the first strategy that yields one.
    ///
    /// Strategy failures are not errors; they fall through to the next one.
    pub async fn get_identifier_hint(
        &self,
        backend: &dyn Backend,
        resource: &str,
    ) -> Option<SubmissionIdentifier> {
        for strategy in &self.strategies {
            match strategy.read(backend, resource).await {
                Ok(Some(identifier)) => return Some(identifier.with_resource(resource)),
                Ok(None) => {}
                Err(e) => debug!("{} hint unavailable for '{}': {}", strategy.name(), resource, e),
            }
        }
        None
    }

    /// Record the identity through every strategy that can write.
    ///
    /// Returns the first failure; later strategies are still attempted.
    pub async fn set_identifier_hint(
        &self,
        backend: &dyn Backend,
        resource: &str,
        identifier: &SubmissionIdentifier,
    ) -> Result<(), BackendError> {
        let mut first_error = None;
        for strategy in self.strategies.iter().filter(|s| s.supports_write()) {
            if let Err(e) = strategy.write(backend, resource, identifier).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Parse `"{site} {id}.{ext}"`.
///
/// The id ends at the first space after the site; anything past it is
/// dropped with a warning.
pub fn identifier_from_name(resource: &str) -> Option<SubmissionIdentifier> {
    let stem = Path::new(resource).file_stem()?.to_str()?;
    let (site, rest) = stem.split_once(' ')?;

    let id = match rest.split_once(' ') {
        Some((id, dropped)) => {
            warn!(
                "Resource name '{}' has spaces in its id; using '{}' and ignoring '{}'",
                resource, id, dropped
            );
            id
        }
        None => rest,
    };

    if site.is_empty() || id.is_empty() {
        return None;
    }
    Some(SubmissionIdentifier::new(site, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::memory::MemoryBackend;

    #[test]
    fn test_filename_parsing() {
        assert_eq!(
            identifier_from_name("example.com 1234.jpg"),
            Some(SubmissionIdentifier::new("example.com", "1234"))
        );
        assert_eq!(
            identifier_from_name("example.com 12 34.txt"),
            Some(SubmissionIdentifier::new("example.com", "12"))
        );
        assert_eq!(identifier_from_name("holiday.jpg"), None);
        assert_eq!(identifier_from_name(" 1234.jpg"), None);
        assert_eq!(identifier_from_name("example.com .jpg"), None);
    }

    #[tokio::test]
    async fn test_falls_back_to_filename() {
        let backend = MemoryBackend::new();
        backend.write("example.com 1234.jpg", b"x").await.unwrap();

        let hint = Hinter::default()
            .get_identifier_hint(&backend, "example.com 1234.jpg")
            .await
            .unwrap();
        assert_eq!(hint, SubmissionIdentifier::new("example.com", "1234"));
        assert_eq!(hint.resource.as_deref(), Some("example.com 1234.jpg"));
    }

    #[tokio::test]
    async fn test_attribute_wins_over_filename() {
        let backend = MemoryBackend::new();
        backend.write("renamed.jpg", b"x").await.unwrap();
        backend.write("example.com 1.jpg", b"x").await.unwrap();

        let hinter = Hinter::default();
        let identifier = SubmissionIdentifier::new("other.org", "77");
        hinter.set_identifier_hint(&backend, "renamed.jpg", &identifier).await.unwrap();
        hinter.set_identifier_hint(&backend, "example.com 1.jpg", &identifier).await.unwrap();

        assert_eq!(hinter.get_identifier_hint(&backend, "renamed.jpg").await, Some(identifier.clone()));
        assert_eq!(hinter.get_identifier_hint(&backend, "example.com 1.jpg").await, Some(identifier));
    }

    #[tokio::test]
    async fn test_unsupported_attributes_fall_through() {
        let backend = MemoryBackend::without_attributes();
        backend.write("example.com 1234.png", b"x").await.unwrap();

        let hinter = Hinter::default();
        let identifier = SubmissionIdentifier::new("example.com", "1234");
        assert!(matches!(
            hinter.set_identifier_hint(&backend, "example.com 1234.png", &identifier).await,
            Err(BackendError::AttributesUnsupported)
        ));
        assert_eq!(
            hinter.get_identifier_hint(&backend, "example.com 1234.png").await,
            Some(identifier)
        );
        assert_eq!(hinter.get_identifier_hint(&backend, "notes.png").await, None);
    }

    #[tokio::test]
    async fn test_filename_only_never_writes() {
        let backend = MemoryBackend::without_attributes();
        let hinter = Hinter::new(vec![HintStrategy::Filename]);
        hinter
            .set_identifier_hint(&backend, "missing.jpg", &SubmissionIdentifier::new("a", "b"))
            .await
            .unwrap();
    }
}
