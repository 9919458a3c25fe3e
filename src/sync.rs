//! The sync loop: pull each site's submissions into its target collections.
//!
//! Submissions are processed one at a time, so at most one store per
//! `(site, id)` is ever in flight. Anything already present in a target
//! collection is skipped without touching its payload.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::collection::Collection;
use crate::site::Site;

/// Default pause before each store
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(500);

/// Outcome counts of one sync run, per submission and target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncReport {
    fn merge(&mut self, other: SyncReport) {
        self.stored += other.stored;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Drives every configured site into its target collections
pub struct Archiver {
    sites: Vec<Box<dyn Site>>,
    collections: IndexMap<String, Arc<Collection>>,
    throttle: Duration,
}

impl Archiver {
    pub fn new(sites: Vec<Box<dyn Site>>, collections: IndexMap<String, Arc<Collection>>) -> Self {
        Self {
            sites,
            collections,
            throttle: DEFAULT_THROTTLE,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn collections(&self) -> &IndexMap<String, Arc<Collection>> {
        &self.collections
    }

    /// Sync every site once
    pub async fn run(&mut self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let throttle = self.throttle;

        for site in self.sites.iter_mut() {
            let targets = site
                .targets()
                .iter()
                .map(|name| {
                    self.collections
                        .get(name)
                        .cloned()
                        .with_context(|| format!("Site '{}' targets unknown collection '{}'", site.name(), name))
                })
                .collect::<Result<Vec<_>>>()?;

            report.merge(sync_site(site.as_mut(), &targets, throttle).await?);
        }

        info!(
            stored = report.stored,
            skipped = report.skipped,
            failed = report.failed,
            "Sync complete"
        );
        Ok(report)
    }
}

/// Ids of `site` already archived in each target collection
async fn existing_ids(site: &str, targets: &[Arc<Collection>]) -> Result<HashMap<String, HashSet<String>>> {
    let mut existing = HashMap::new();
    for collection in targets {
        let ids = collection
            .list()
            .await
            .with_context(|| format!("Failed to list collection '{}'", collection.name()))?
            .into_iter()
            .filter(|identifier| identifier.site == site)
            .map(|identifier| identifier.id)
            .collect::<HashSet<_>>();
        existing.insert(collection.name().to_string(), ids);
    }
    Ok(existing)
}

#[instrument(skip_all, fields(site = %site.name()))]
async fn sync_site(site: &mut dyn Site, targets: &[Arc<Collection>], throttle: Duration) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let mut existing = existing_ids(site.name(), targets).await?;
    info!(
        "Syncing into {} collection(s), {} submission(s) already archived",
        targets.len(),
        existing.values().map(HashSet::len).sum::<usize>()
    );

    loop {
        let mut submission = match site.next_submission().await {
            Ok(Some(submission)) => submission,
            Ok(None) => break,
            Err(e) => {
                // A broken page ends this site's run but not the others
                error!("Failed to read next submission: {:#}", e);
                report.failed += 1;
                break;
            }
        };

        for collection in targets {
            let archived = existing.entry(collection.name().to_string()).or_default();
            if archived.contains(submission.id()) {
                info!("Skipped {} (already in '{}')", submission.identifier(), collection.name());
                report.skipped += 1;
                continue;
            }

            if !throttle.is_zero() {
                tokio::time::sleep(throttle).await;
            }

            match collection.store(&mut submission).await {
                Ok(outcome) => {
                    if !outcome.tagged {
                        warn!("{} stored without embedded metadata", submission.identifier());
                    }
                    archived.insert(submission.id().to_string());
                    report.stored += 1;
                }
                Err(e) => {
                    error!(
                        "Failed to store {} in '{}': {}",
                        submission.identifier(),
                        collection.name(),
                        e
                    );
                    report.failed += 1;
                }
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MemoryBackend;
    use crate::domain::{Artist, Submission, SubmissionIdentifier, SubmissionMetadata, Tags};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;

    struct ListSite {
        name: String,
        targets: Vec<String>,
        payloads: VecDeque<(String, Vec<u8>)>,
    }

    #[async_trait]
    impl Site for ListSite {
        fn name(&self) -> &str {
            &self.name
        }

        fn targets(&self) -> &[String] {
            &self.targets
        }

        async fn next_submission(&mut self) -> Result<Option<Submission>> {
            Ok(self.payloads.pop_front().map(|(id, payload)| {
                let metadata = SubmissionMetadata {
                    image_url: format!("https://example.com/{}.txt", id),
                    title: format!("Story {}", id),
                    date_uploaded: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                    artist: Artist::new("Ann"),
                    tags: Tags::new(),
                };
                Submission::from_static(SubmissionIdentifier::new(&self.name, id), metadata, payload)
            }))
        }
    }

    fn site(ids: &[&str]) -> Box<dyn Site> {
        Box::new(ListSite {
            name: "example.com".to_string(),
            targets: vec!["local".to_string()],
            payloads: ids
                .iter()
                .map(|id| (id.to_string(), format!("Story number {}\n", id).into_bytes()))
                .collect(),
        })
    }

    fn collections() -> IndexMap<String, Arc<Collection>> {
        let collection = Arc::new(Collection::new("local", Arc::new(MemoryBackend::new())));
        IndexMap::from([("local".to_string(), collection)])
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let collections = collections();

        let mut archiver = Archiver::new(vec![site(&["1", "2"])], collections.clone()).with_throttle(Duration::ZERO);
        let report = archiver.run().await.unwrap();
        assert_eq!(report, SyncReport { stored: 2, skipped: 0, failed: 0 });

        let mut archiver = Archiver::new(vec![site(&["1", "2", "3"])], collections.clone()).with_throttle(Duration::ZERO);
        let report = archiver.run().await.unwrap();
        assert_eq!(report, SyncReport { stored: 1, skipped: 2, failed: 0 });

        assert_eq!(collections["local"].list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_in_one_run_is_stored_once() {
        let mut archiver = Archiver::new(vec![site(&["7", "7"])], collections()).with_throttle(Duration::ZERO);
        let report = archiver.run().await.unwrap();
        assert_eq!(report, SyncReport { stored: 1, skipped: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_unknown_target_fails() {
        let mut archiver = Archiver::new(vec![site(&["1"])], IndexMap::new());
        let err = archiver.run().await.unwrap_err();
        assert!(err.to_string().contains("unknown collection 'local'"));
    }
}
