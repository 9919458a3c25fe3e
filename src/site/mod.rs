//! Upstream sources of submissions.
//!
//! A site yields its submissions one at a time until pagination runs out.
//! Each run starts a fresh sequence.

pub mod manifest;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::Submission;

pub use manifest::{ManifestConfig, ManifestSite};

/// Trait for submission sources
#[async_trait]
pub trait Site: Send {
    /// Site name; matches the `site` part of every identifier it yields
    fn name(&self) -> &str;

    /// Names of the collections this site archives into
    fn targets(&self) -> &[String];

    /// Next submission, or `None` once the source is exhausted
    async fn next_submission(&mut self) -> Result<Option<Submission>>;
}
