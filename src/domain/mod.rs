//! Domain types for the archiver.
//!
//! - Submission: one creative work, its identity and provenance metadata
//! - Fetchable: lazily loaded payload bytes

pub mod fetchable;
pub mod submission;

// Re-export commonly used types
pub use fetchable::{FetchError, Fetchable};
pub use submission::{
    Artist, MetadataLoader, Submission, SubmissionError, SubmissionIdentifier, SubmissionMetadata,
    Tags,
};
