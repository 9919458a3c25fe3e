//! Plain-text codec.
//!
//! An archived text is three `---\n`-separated segments: a YAML header
//! (title, author, date), the original text verbatim, and a YAML footer
//! (source, site, id, tags). The body is never decoded, so it round-trips
//! byte for byte.

use serde::{Deserialize, Serialize};

use super::error::CodecError;
use super::tags::TEXT_SEPARATOR;
use super::{format_date, parse_date, DecodedSubmission};
use crate::domain::{Artist, SubmissionIdentifier, SubmissionMetadata, Tags};

type Result<T> = std::result::Result<T, CodecError>;

pub const MIME_TYPES: &[&str] = &["text/plain"];

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Header {
    title: String,
    author: Author,
    date: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Author {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Footer {
    #[serde(rename = "Source")]
    source: String,
    #[serde(rename = "Site")]
    site: String,
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Tags", default)]
    tags: Tags,
}

/// Wrap a text payload between metadata blocks
pub fn serialize(
    identifier: &SubmissionIdentifier,
    metadata: &SubmissionMetadata,
    content: &[u8],
) -> Result<Vec<u8>> {
    let header = Header {
        title: metadata.title.clone(),
        author: Author {
            name: metadata.artist.name.clone(),
            url: metadata.artist.url.clone(),
        },
        date: format_date(&metadata.date_uploaded),
    };
    let footer = Footer {
        source: metadata.image_url.clone(),
        site: identifier.site.clone(),
        id: identifier.id.clone(),
        tags: metadata.tags.clone(),
    };

    if contains(content, TEXT_SEPARATOR) {
        return Err(CodecError::Unencodable(format!(
            "text body contains the segment separator {:?}",
            String::from_utf8_lossy(TEXT_SEPARATOR)
        )));
    }

    let segments = [render_block(&header)?, content.to_vec(), render_block(&footer)?];
    Ok(segments.join(TEXT_SEPARATOR))
}

/// Render a metadata block that cannot contain the separator.
///
/// Plain YAML is preferred. A scalar ending in `---` or a literal block
/// with a `---` line would split the document, so such blocks are written
/// as indented JSON instead: every scalar is quoted and newlines are
/// escaped, and the result still parses as YAML.
fn render_block<T: Serialize>(block: &T) -> Result<Vec<u8>> {
    let yaml = serde_yaml::to_string(block)?.into_bytes();
    if !contains(&yaml, TEXT_SEPARATOR) {
        return Ok(yaml);
    }

    let mut json = serde_json::to_vec_pretty(block)?;
    json.push(b'\n');
    Ok(json)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Split an archived text back into metadata and verbatim body
pub fn deserialize(content: &[u8]) -> Result<DecodedSubmission> {
    let segments = split(content, TEXT_SEPARATOR);
    let [header, body, footer] = segments.as_slice() else {
        return Err(CodecError::MalformedDocument(segments.len()));
    };

    let header: Header = serde_yaml::from_slice(header)?;
    let footer: Footer = serde_yaml::from_slice(footer)?;

    let metadata = SubmissionMetadata {
        image_url: footer.source,
        title: header.title,
        date_uploaded: parse_date(&header.date)?,
        artist: Artist {
            name: header.author.name,
            url: header.author.url,
        },
        tags: footer.tags,
    };

    Ok(DecodedSubmission {
        identifier: SubmissionIdentifier::new(footer.site, footer.id),
        metadata,
        content: body.to_vec(),
    })
}

fn split<'a>(haystack: &'a [u8], separator: &[u8]) -> Vec<&'a [u8]> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while pos + separator.len() <= haystack.len() {
        if &haystack[pos..pos + separator.len()] == separator {
            segments.push(&haystack[start..pos]);
            pos += separator.len();
            start = pos;
        } else {
            pos += 1;
        }
    }
    segments.push(&haystack[start..]);
    segments
}
