//! File type plugins.
//!
//! Each supported format has a codec module that embeds a submission's
//! identity and metadata into the payload and recovers it again. Formats are
//! a closed set; [`Registry`] orders them and picks the first one claiming a
//! MIME type. Nothing here performs I/O.

pub mod error;
pub mod exif;
pub mod jpeg;
pub mod png;
pub mod sniff;
pub mod tags;
pub mod text;

#[cfg(test)]
pub(crate) mod fixtures;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Submission, SubmissionIdentifier, SubmissionMetadata};
pub use error::CodecError;
pub use sniff::FileKind;

/// What a codec recovers from an archived payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSubmission {
    pub identifier: SubmissionIdentifier,
    pub metadata: SubmissionMetadata,
    pub content: Vec<u8>,
}

impl DecodedSubmission {
    /// Promote into a static submission located at `resource`
    pub fn into_submission(self, resource: Option<String>) -> Submission {
        let identifier = match resource {
            Some(resource) => self.identifier.with_resource(resource),
            None => self.identifier,
        };
        Submission::from_static(identifier, self.metadata, self.content)
    }
}

pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub(crate) fn parse_date(value: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(value)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| CodecError::corrupt(format!("invalid upload date '{}': {}", value, e)))
}

/// A supported archival format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Jpeg,
    Png,
    Text,
}

impl FileType {
    pub fn name(&self) -> &'static str {
        match self {
            FileType::Jpeg => "jpeg",
            FileType::Png => "png",
            FileType::Text => "text",
        }
    }

    /// MIME types this format claims
    pub fn mime_types(&self) -> &'static [&'static str] {
        match self {
            FileType::Jpeg => jpeg::MIME_TYPES,
            FileType::Png => png::MIME_TYPES,
            FileType::Text => text::MIME_TYPES,
        }
    }

    pub fn handles(&self, mime: &str) -> bool {
        self.mime_types().contains(&mime)
    }

    pub fn serialize(
        &self,
        identifier: &SubmissionIdentifier,
        metadata: &SubmissionMetadata,
        content: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        match self {
            FileType::Jpeg => jpeg::serialize(identifier, metadata, content),
            FileType::Png => png::serialize(identifier, metadata, content),
            FileType::Text => text::serialize(identifier, metadata, content),
        }
    }

    pub fn deserialize(&self, content: &[u8]) -> Result<DecodedSubmission, CodecError> {
        match self {
            FileType::Jpeg => jpeg::deserialize(content),
            FileType::Png => png::deserialize(content),
            FileType::Text => text::deserialize(content),
        }
    }
}

/// Ordered set of enabled formats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    types: Vec<FileType>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(vec![FileType::Png, FileType::Jpeg, FileType::Text])
    }
}

impl Registry {
    pub fn new(types: Vec<FileType>) -> Self {
        Self { types }
    }

    pub fn types(&self) -> &[FileType] {
        &self.types
    }

    /// First format able to write `mime`
    pub fn select_for_write(&self, mime: &str) -> Option<FileType> {
        self.types.iter().copied().find(|t| t.handles(mime))
    }

    /// First format able to read `mime`
    pub fn select_for_read(&self, mime: &str) -> Option<FileType> {
        self.select_for_write(mime)
    }
}

/// Payload ready to hand to a backend
#[derive(Debug, Clone)]
pub struct Encoded {
    pub content: Vec<u8>,
    pub kind: FileKind,
    /// Whether a codec embedded the metadata
    pub tagged: bool,
}

/// Sniff `content` and embed the submission into it.
///
/// Unknown formats are passed through untagged with a warning. Codec
/// failures propagate.
pub fn process_for_output(
    registry: &Registry,
    identifier: &SubmissionIdentifier,
    metadata: &SubmissionMetadata,
    content: &[u8],
) -> Result<Encoded, CodecError> {
    let kind = sniff::identify(content);

    let Some(file_type) = registry.select_for_write(kind.mime) else {
        warn!(
            "No file type handler for {} ({}); storing {} untagged",
            kind.mime, kind.ext, identifier
        );
        return Ok(Encoded {
            content: content.to_vec(),
            kind,
            tagged: false,
        });
    };

    debug!("Encoding {} as {}", identifier, file_type.name());
    Ok(Encoded {
        content: file_type.serialize(identifier, metadata, content)?,
        kind,
        tagged: true,
    })
}

/// Sniff `content` and recover the submission embedded in it
pub fn process_for_input(registry: &Registry, content: &[u8]) -> Result<DecodedSubmission, CodecError> {
    let kind = sniff::identify(content);
    let file_type = registry
        .select_for_read(kind.mime)
        .ok_or_else(|| CodecError::NoDecoder(kind.mime.to_string()))?;

    debug!("Decoding {} payload", file_type.name());
    file_type.deserialize(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixtures::{sample_identifier, sample_metadata, tiny_jpeg, tiny_png};

    #[test]
    fn test_date_format() {
        let date = sample_metadata().date_uploaded;
        assert_eq!(format_date(&date), "2018-05-16T04:33:50Z");
        assert_eq!(parse_date("2018-05-16T06:33:50+02:00").unwrap(), date);
        assert!(parse_date("16/05/2018").is_err());
    }

    #[test]
    fn test_registry_selection() {
        let registry = Registry::default();
        assert_eq!(registry.select_for_write("image/png"), Some(FileType::Png));
        assert_eq!(registry.select_for_read("image/jpeg"), Some(FileType::Jpeg));
        assert_eq!(registry.select_for_write("text/plain"), Some(FileType::Text));
        assert_eq!(registry.select_for_write("image/gif"), None);

        let images_only = Registry::new(vec![FileType::Jpeg]);
        assert_eq!(images_only.select_for_write("image/png"), None);
    }

    #[test]
    fn test_process_round_trip_per_format() {
        let registry = Registry::default();
        let jpeg = tiny_jpeg();
        let png = tiny_png();
        let payloads: [(&[u8], &str); 3] = [
            (&jpeg[..], "image/jpeg"),
            (&png[..], "image/png"),
            (&b"Once upon a time.\n"[..], "text/plain"),
        ];

        for (payload, mime) in payloads {
            let encoded =
                process_for_output(&registry, &sample_identifier(), &sample_metadata(), payload).unwrap();
            assert!(encoded.tagged);
            assert_eq!(encoded.kind.mime, mime);

            let decoded = process_for_input(&registry, &encoded.content).unwrap();
            assert_eq!(decoded.identifier, sample_identifier());
            assert_eq!(decoded.metadata, sample_metadata());
        }
    }

    #[test]
    fn test_unknown_format_passes_through() {
        let registry = Registry::default();
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec();

        let encoded = process_for_output(&registry, &sample_identifier(), &sample_metadata(), &gif).unwrap();
        assert!(!encoded.tagged);
        assert_eq!(encoded.kind.ext, "gif");
        assert_eq!(encoded.content, gif);

        assert!(matches!(
            process_for_input(&registry, &gif),
            Err(CodecError::NoDecoder(mime)) if mime == "image/gif"
        ));
    }

    #[test]
    fn test_into_submission_sets_resource() {
        let decoded = DecodedSubmission {
            identifier: sample_identifier(),
            metadata: sample_metadata(),
            content: b"x".to_vec(),
        };
        let submission = decoded.into_submission(Some("example.com 1234.txt".to_string()));
        assert_eq!(submission.identifier().resource.as_deref(), Some("example.com 1234.txt"));
    }
}
