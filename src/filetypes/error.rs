//! Codec error taxonomy.

use thiserror::Error;

/// Errors raised while embedding or extracting submission metadata
#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed container structure or a tag value of the wrong shape
    #[error("Corrupt submission encoding: {0}")]
    CorruptEncoding(String),

    /// A text document without exactly three segments
    #[error("Malformed submission document: expected 3 segments, found {0}")]
    MalformedDocument(usize),

    #[error("No decoder for MIME type '{0}'")]
    NoDecoder(String),

    /// Metadata that the target format cannot carry
    #[error("Cannot encode submission: {0}")]
    Unencodable(String),
}

impl CodecError {
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptEncoding(message.into())
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        Self::CorruptEncoding(format!("invalid JSON: {}", e))
    }
}

impl From<serde_yaml::Error> for CodecError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::CorruptEncoding(format!("invalid YAML: {}", e))
    }
}
