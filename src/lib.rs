//! artvault - Self-describing archive of online art submissions
//!
//! Submissions fetched from art sites are stored as ordinary files with
//! their provenance embedded in the file itself, so an archive can be
//! re-read, re-synced or moved without any external index.
//!
//! # Architecture
//!
//! - Metadata goes into the payload's own format: EXIF for JPEG, text
//!   chunks for PNG, YAML blocks around plain text
//! - Identity is recovered from side-channel attributes or the file name,
//!   without decoding the payload
//! - Re-archiving a tagged JPEG keeps one generation of prior tags
//!
//! # Modules
//!
//! - `domain`: Submissions, identifiers, lazily fetched payloads
//! - `filetypes`: Format sniffing and the JPEG/PNG/text codecs
//! - `collection`: Storage backends, identity hints, the `Collection` store
//! - `site`: Submission sources
//! - `sync`: The archiving loop
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Archive everything new from the configured sites
//! artvault sync
//!
//! # What's in the archive
//! artvault list
//!
//! # Decode a file directly
//! artvault inspect "~/Pictures/example.com 1234.jpg"
//! ```

pub mod cli;
pub mod collection;
pub mod config;
pub mod domain;
pub mod filetypes;
pub mod site;
pub mod sync;

// Re-export main types at crate root for convenience
pub use collection::{Collection, CollectionError, StoreOutcome};
pub use domain::{Artist, Fetchable, Submission, SubmissionIdentifier, SubmissionMetadata, Tags};
pub use filetypes::{CodecError, DecodedSubmission, FileType, Registry};
pub use site::Site;
pub use sync::{Archiver, SyncReport};
