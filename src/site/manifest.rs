//! A site backed by a YAML manifest of submissions.
//!
//! ```yaml
//! site: example.com
//! submissions:
//!   - id: "1234"
//!     image_url: http://www.example.com/~pkovac/1234.jpeg
//!     title: Engine Bay
//!     artist:
//!       name: Philip Kovac
//!       url: http://example.com/~pkovac/
//!     date_uploaded: 2018-05-16T04:33:50Z
//!     tags:
//!       rating: General Audience
//! ```
//!
//! Payloads are downloaded from `image_url` on first access, unless an
//! entry names a local `image_path`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use super::Site;
use crate::domain::{Artist, Fetchable, Submission, SubmissionIdentifier, SubmissionMetadata, Tags};

/// Per-site configuration block
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestConfig {
    /// Manifest file
    pub path: PathBuf,

    /// Extra request headers for payload downloads
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    site: String,
    #[serde(default)]
    submissions: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    image_url: String,
    #[serde(default)]
    image_path: Option<PathBuf>,
    title: String,
    artist: Artist,
    date_uploaded: DateTime<Utc>,
    #[serde(default)]
    tags: Tags,
}

/// Site yielding the entries of a manifest in file order
#[derive(Debug)]
pub struct ManifestSite {
    name: String,
    targets: Vec<String>,
    headers: IndexMap<String, String>,
    client: reqwest::Client,
    base_dir: PathBuf,
    pending: VecDeque<ManifestEntry>,
}

impl ManifestSite {
    /// Read and parse the manifest named by `config`.
    ///
    /// `name` overrides the manifest's own `site` field.
    pub async fn load(
        name: Option<String>,
        targets: Vec<String>,
        config: ManifestConfig,
        client: reqwest::Client,
    ) -> Result<Self> {
        let content = tokio::fs::read_to_string(&config.path)
            .await
            .with_context(|| format!("Failed to read manifest: {}", config.path.display()))?;
        let manifest: Manifest = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", config.path.display()))?;

        let base_dir = config
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        debug!(
            "Loaded {} submissions from {}",
            manifest.submissions.len(),
            config.path.display()
        );

        Ok(Self {
            name: name.unwrap_or(manifest.site),
            targets,
            headers: config.headers,
            client,
            base_dir,
            pending: manifest.submissions.into(),
        })
    }

    /// Entries not yet handed out
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl Site for ManifestSite {
    fn name(&self) -> &str {
        &self.name
    }

    fn targets(&self) -> &[String] {
        &self.targets
    }

    async fn next_submission(&mut self) -> Result<Option<Submission>> {
        let Some(entry) = self.pending.pop_front() else {
            return Ok(None);
        };

        let identifier = SubmissionIdentifier::new(&self.name, entry.id);
        let image = match &entry.image_path {
            Some(path) => {
                let path = self.base_dir.join(path);
                let content = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read payload for {}: {}", identifier, path.display()))?;
                Fetchable::from_static(content)
            }
            None => Fetchable::remote(
                self.client.clone(),
                &entry.image_url,
                self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            )?,
        };

        let metadata = SubmissionMetadata {
            image_url: entry.image_url,
            title: entry.title,
            date_uploaded: entry.date_uploaded,
            artist: entry.artist,
            tags: entry.tags,
        };

        Ok(Some(Submission::new(identifier, image, metadata)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
site: example.com
submissions:
  - id: "1234"
    image_url: http://www.example.com/~pkovac/1234.jpeg
    title: Engine Bay
    artist:
      name: Philip Kovac
      url: http://example.com/~pkovac/
    date_uploaded: 2018-05-16T04:33:50Z
    tags:
      gender: N/A
      rating: General Audience
  - id: "1235"
    image_url: http://www.example.com/~pkovac/1235.txt
    image_path: poem.txt
    title: Ode
    artist:
      name: Philip Kovac
    date_uploaded: 2018-05-17T10:00:00Z
"#;

    async fn write_manifest(dir: &TempDir) -> ManifestConfig {
        let path = dir.path().join("manifest.yaml");
        tokio::fs::write(&path, MANIFEST).await.unwrap();
        tokio::fs::write(dir.path().join("poem.txt"), "Roses are red\n").await.unwrap();
        ManifestConfig {
            path,
            headers: IndexMap::new(),
        }
    }

    #[tokio::test]
    async fn test_yields_entries_in_order() {
        let dir = TempDir::new().unwrap();
        let config = write_manifest(&dir).await;
        let mut site = ManifestSite::load(None, vec!["local".to_string()], config, reqwest::Client::new())
            .await
            .unwrap();

        assert_eq!(site.name(), "example.com");
        assert_eq!(site.targets(), ["local".to_string()]);
        assert_eq!(site.remaining(), 2);

        let mut first = site.next_submission().await.unwrap().unwrap();
        assert_eq!(first.id(), "1234");
        assert!(!first.image().is_loaded());
        let metadata = first.metadata().await.unwrap();
        assert_eq!(metadata.tags.keys().collect::<Vec<_>>(), vec!["gender", "rating"]);
        assert_eq!(metadata.artist.url.as_deref(), Some("http://example.com/~pkovac/"));

        let mut second = site.next_submission().await.unwrap().unwrap();
        assert_eq!(second.content().await.unwrap(), b"Roses are red\n");
        assert!(second.metadata().await.unwrap().tags.is_empty());

        assert!(site.next_submission().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_name_override() {
        let dir = TempDir::new().unwrap();
        let config = write_manifest(&dir).await;
        let mut site = ManifestSite::load(Some("mirror".to_string()), vec![], config, reqwest::Client::new())
            .await
            .unwrap();

        let submission = site.next_submission().await.unwrap().unwrap();
        assert_eq!(submission.site(), "mirror");
    }

    #[tokio::test]
    async fn test_missing_manifest_fails() {
        let config = ManifestConfig {
            path: PathBuf::from("/nonexistent/manifest.yaml"),
            headers: IndexMap::new(),
        };
        let err = ManifestSite::load(None, vec![], config, reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read manifest"));
    }
}
