//! PNG codec: metadata lives in textual chunks.
//!
//! The image is modelled as its ordered chunk sequence. Serializing drops
//! every existing `tEXt`/`iTXt` chunk, compressed `iTXt` included, and
//! inserts one fresh chunk per metadata field directly after `IHDR`.
//! `zTXt` chunks are left alone. Earlier text chunks are not preserved,
//! unlike the JPEG codec's one-generation history.

use indexmap::IndexMap;

use super::error::CodecError;
use super::tags::png as keyword;
use super::{format_date, parse_date, DecodedSubmission};
use crate::domain::{Artist, SubmissionIdentifier, SubmissionMetadata, Tags};

type Result<T> = std::result::Result<T, CodecError>;

pub const MIME_TYPES: &[&str] = &["image/png"];

pub const SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

const TEXT: &[u8; 4] = b"tEXt";
const INTERNATIONAL_TEXT: &[u8; 4] = b"iTXt";
const END: &[u8; 4] = b"IEND";

/// One chunk; length and CRC are derived from the type and data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngChunk {
    kind: [u8; 4],
    data: Vec<u8>,
}

impl PngChunk {
    pub fn new(kind: [u8; 4], data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    pub fn kind(&self) -> &[u8; 4] {
        &self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn length(&self) -> usize {
        self.data.len()
    }

    /// CRC-32 over type ++ data
    pub fn crc(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.kind);
        hasher.update(&self.data);
        hasher.finalize()
    }

    pub fn is_text(&self) -> bool {
        &self.kind == TEXT || &self.kind == INTERNATIONAL_TEXT
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.length() as u32).to_be_bytes());
        out.extend_from_slice(&self.kind);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.crc().to_be_bytes());
    }
}

/// A PNG as an ordered chunk sequence plus any bytes trailing `IEND`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngImage {
    chunks: Vec<PngChunk>,
    trailer: Vec<u8>,
}

impl PngImage {
    /// Split a PNG into chunks, verifying every CRC
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !data.starts_with(SIGNATURE) {
            return Err(CodecError::corrupt("missing PNG signature"));
        }

        let mut chunks = Vec::new();
        let mut pos = SIGNATURE.len();

        while pos < data.len() {
            let header = data
                .get(pos..pos + 8)
                .ok_or_else(|| CodecError::corrupt(format!("truncated PNG chunk header at offset {}", pos)))?;
            let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let kind = [header[4], header[5], header[6], header[7]];

            let data_start = pos + 8;
            let crc_start = data_start
                .checked_add(length)
                .filter(|&end| end + 4 <= data.len())
                .ok_or_else(|| {
                    CodecError::corrupt(format!(
                        "PNG chunk {} at offset {} overruns the file",
                        String::from_utf8_lossy(&kind),
                        pos
                    ))
                })?;

            let chunk = PngChunk::new(kind, data[data_start..crc_start].to_vec());
            let crc_bytes = &data[crc_start..crc_start + 4];
            let declared = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
            if declared != chunk.crc() {
                return Err(CodecError::corrupt(format!(
                    "PNG chunk {} has CRC {:#010x}, expected {:#010x}",
                    String::from_utf8_lossy(&kind),
                    declared,
                    chunk.crc()
                )));
            }

            pos = crc_start + 4;
            let is_end = &kind == END;
            chunks.push(chunk);
            if is_end {
                break;
            }
        }

        if chunks.is_empty() {
            return Err(CodecError::corrupt("PNG has no chunks"));
        }

        Ok(Self {
            chunks,
            trailer: data[pos..].to_vec(),
        })
    }

    pub fn chunks(&self) -> &[PngChunk] {
        &self.chunks
    }

    /// Keep only the chunks matching `predicate`
    pub fn retain(mut self, predicate: impl Fn(&PngChunk) -> bool) -> Self {
        self.chunks.retain(|chunk| predicate(chunk));
        self
    }

    /// Insert `new_chunks` directly after the header chunk
    pub fn insert_after_first(mut self, new_chunks: Vec<PngChunk>) -> Self {
        let tail = self.chunks.split_off(1.min(self.chunks.len()));
        self.chunks.extend(new_chunks);
        self.chunks.extend(tail);
        self
    }

    /// Every decodable text entry, in chunk order
    pub fn text_entries(&self) -> Result<Vec<TextEntry>> {
        let mut entries = Vec::new();
        for chunk in &self.chunks {
            if let Some(entry) = TextEntry::from_chunk(chunk)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let size: usize = self.chunks.iter().map(|c| c.length() + 12).sum();
        let mut out = Vec::with_capacity(SIGNATURE.len() + size + self.trailer.len());
        out.extend_from_slice(SIGNATURE);
        for chunk in &self.chunks {
            chunk.write_to(&mut out);
        }
        out.extend_from_slice(&self.trailer);
        out
    }
}

/// A keyword/text pair carried by a `tEXt` or `iTXt` chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntry {
    pub keyword: String,
    pub text: String,
}

impl TextEntry {
    pub fn new(keyword: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            text: text.into(),
        }
    }

    /// Encode as `tEXt` when Latin-1 can carry it, else as uncompressed `iTXt`
    pub fn to_chunk(&self) -> Result<PngChunk> {
        if self.keyword.is_empty() || self.keyword.len() > 79 || !is_latin1(&self.keyword) {
            return Err(CodecError::Unencodable(format!("invalid PNG keyword '{}'", self.keyword)));
        }
        if self.text.contains('\0') {
            return Err(CodecError::Unencodable(format!(
                "PNG text for '{}' contains a NUL character",
                self.keyword
            )));
        }

        let mut data = latin1_bytes(&self.keyword);
        data.push(0);

        if is_latin1(&self.text) {
            data.extend(latin1_bytes(&self.text));
            Ok(PngChunk::new(*TEXT, data))
        } else {
            // compression flag, compression method, empty language tag,
            // empty translated keyword
            data.extend_from_slice(&[0, 0, 0, 0]);
            data.extend_from_slice(self.text.as_bytes());
            Ok(PngChunk::new(*INTERNATIONAL_TEXT, data))
        }
    }

    /// Decode a text chunk; `None` for other chunk types and compressed text
    pub fn from_chunk(chunk: &PngChunk) -> Result<Option<Self>> {
        let data = chunk.data();
        let kind = String::from_utf8_lossy(chunk.kind()).into_owned();
        let split = |bytes: &[u8]| -> Result<usize> {
            bytes
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| CodecError::corrupt(format!("{} chunk is missing a separator", kind)))
        };

        if chunk.kind() == TEXT {
            let end = split(data)?;
            return Ok(Some(Self::new(latin1_string(&data[..end]), latin1_string(&data[end + 1..]))));
        }

        if chunk.kind() == INTERNATIONAL_TEXT {
            let keyword_end = split(data)?;
            let flags = data
                .get(keyword_end + 1..keyword_end + 3)
                .ok_or_else(|| CodecError::corrupt("iTXt chunk is truncated"))?;
            if flags[0] != 0 {
                tracing::debug!("Skipping compressed iTXt chunk");
                return Ok(None);
            }
            let rest = &data[keyword_end + 3..];
            let language_end = split(rest)?;
            let rest = &rest[language_end + 1..];
            let translated_end = split(rest)?;
            let text = std::str::from_utf8(&rest[translated_end + 1..])
                .map_err(|_| CodecError::corrupt("iTXt text is not UTF-8"))?;
            return Ok(Some(Self::new(latin1_string(&data[..keyword_end]), text)));
        }

        Ok(None)
    }
}

fn is_latin1(s: &str) -> bool {
    s.chars().all(|c| (c as u32) <= 0xFF)
}

fn latin1_bytes(s: &str) -> Vec<u8> {
    s.chars().map(|c| c as u32 as u8).collect()
}

fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Embed identity and metadata into a PNG payload
pub fn serialize(
    identifier: &SubmissionIdentifier,
    metadata: &SubmissionMetadata,
    content: &[u8],
) -> Result<Vec<u8>> {
    let mut entries = vec![
        TextEntry::new(keyword::IDENTIFIER, serde_json::to_string(identifier)?),
        TextEntry::new(keyword::TITLE, metadata.title.as_str()),
        TextEntry::new(keyword::AUTHOR, metadata.artist.name.as_str()),
    ];
    if let Some(url) = &metadata.artist.url {
        entries.push(TextEntry::new(keyword::AUTHOR_URL, url.as_str()));
    }
    entries.push(TextEntry::new(keyword::DATE_UPLOADED, format_date(&metadata.date_uploaded)));
    entries.push(TextEntry::new(keyword::SOURCE_URL, metadata.image_url.as_str()));
    entries.push(TextEntry::new(keyword::TAGS, serde_json::to_string(&metadata.tags)?));

    let chunks = entries.iter().map(TextEntry::to_chunk).collect::<Result<Vec<_>>>()?;

    let image = PngImage::parse(content)?
        .retain(|chunk| !chunk.is_text())
        .insert_after_first(chunks);
    Ok(image.to_bytes())
}

/// Recover identity and metadata from a tagged PNG
pub fn deserialize(content: &[u8]) -> Result<DecodedSubmission> {
    let image = PngImage::parse(content)?;
    let texts: IndexMap<String, String> = image
        .text_entries()?
        .into_iter()
        .map(|entry| (entry.keyword, entry.text))
        .collect();

    let required = |name: &str| {
        texts
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| CodecError::corrupt(format!("PNG has no '{}' text chunk", name)))
    };

    let identifier: SubmissionIdentifier = serde_json::from_str(required(keyword::IDENTIFIER)?)?;
    let tags: Tags = serde_json::from_str(required(keyword::TAGS)?)?;

    let metadata = SubmissionMetadata {
        image_url: required(keyword::SOURCE_URL)?.to_string(),
        title: required(keyword::TITLE)?.to_string(),
        date_uploaded: parse_date(required(keyword::DATE_UPLOADED)?)?,
        artist: Artist {
            name: required(keyword::AUTHOR)?.to_string(),
            url: texts.get(keyword::AUTHOR_URL).cloned(),
        },
        tags,
    };

    Ok(DecodedSubmission {
        identifier,
        metadata,
        content: content.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filetypes::fixtures::{sample_identifier, sample_metadata, tiny_png};

    #[test]
    fn test_parse_and_reserialize_is_identity() {
        let png = tiny_png();
        let image = PngImage::parse(&png).unwrap();
        let kinds: Vec<&[u8; 4]> = image.chunks().iter().map(PngChunk::kind).collect();
        assert_eq!(kinds, vec![b"IHDR", b"IDAT", b"IEND"]);
        assert_eq!(image.to_bytes(), png);
    }

    #[test]
    fn test_crc_mismatch_is_corrupt() {
        let mut png = tiny_png();
        // Flip a bit inside the IHDR data
        png[16] ^= 0x01;
        assert!(matches!(PngImage::parse(&png), Err(CodecError::CorruptEncoding(_))));
    }

    #[test]
    fn test_truncated_png_is_corrupt() {
        let png = tiny_png();
        assert!(PngImage::parse(&png[..png.len() - 3]).is_err());
        assert!(PngImage::parse(b"\x89PNG\r\n\x1a\n").is_err());
        assert!(PngImage::parse(b"GIF89a").is_err());
    }

    #[test]
    fn test_insert_after_header() {
        let image = PngImage::parse(&tiny_png())
            .unwrap()
            .insert_after_first(vec![TextEntry::new("Title", "x").to_chunk().unwrap()]);
        let kinds: Vec<&[u8; 4]> = image.chunks().iter().map(PngChunk::kind).collect();
        assert_eq!(kinds, vec![b"IHDR", b"tEXt", b"IDAT", b"IEND"]);
    }

    #[test]
    fn test_text_entry_chunk_types() {
        let latin = TextEntry::new("Author", "Zoë").to_chunk().unwrap();
        assert_eq!(latin.kind(), b"tEXt");
        assert_eq!(latin.data(), b"Author\0Zo\xEB");

        let international = TextEntry::new("Title", "発動機").to_chunk().unwrap();
        assert_eq!(international.kind(), b"iTXt");
        assert!(international.data().starts_with(b"Title\0\0\0\0\0"));

        for chunk in [latin, international] {
            let decoded = TextEntry::from_chunk(&chunk).unwrap().unwrap();
            assert!(decoded.keyword == "Author" || decoded.keyword == "Title");
        }
    }

    #[test]
    fn test_nul_in_text_is_unencodable() {
        assert!(matches!(
            TextEntry::new("Title", "a\0b").to_chunk(),
            Err(CodecError::Unencodable(_))
        ));
    }

    #[test]
    fn test_round_trip() {
        let png = tiny_png();
        let tagged = serialize(&sample_identifier(), &sample_metadata(), &png).unwrap();
        let decoded = deserialize(&tagged).unwrap();

        assert_eq!(decoded.identifier, sample_identifier());
        assert_eq!(decoded.metadata, sample_metadata());
        assert_eq!(decoded.content, tagged);
    }

    #[test]
    fn test_reserialize_replaces_text_chunks() {
        let png = tiny_png();
        let first = serialize(&sample_identifier(), &sample_metadata(), &png).unwrap();

        let mut metadata = sample_metadata();
        metadata.title = "Engine Bay, revisited".to_string();
        metadata.artist.url = None;
        let second = serialize(&sample_identifier(), &metadata, &first).unwrap();

        let image = PngImage::parse(&second).unwrap();
        assert_eq!(image.chunks().iter().filter(|c| c.is_text()).count(), 6);
        assert_eq!(deserialize(&second).unwrap().metadata, metadata);
    }

    #[test]
    fn test_missing_keyword_is_corrupt() {
        let image = PngImage::parse(&tiny_png())
            .unwrap()
            .insert_after_first(vec![TextEntry::new("Title", "Engine Bay").to_chunk().unwrap()]);
        assert!(matches!(deserialize(&image.to_bytes()), Err(CodecError::CorruptEncoding(_))));
    }

    #[test]
    fn test_serialize_drops_compressed_itxt_but_keeps_ztxt() {
        let xmp = PngChunk::new(
            *INTERNATIONAL_TEXT,
            b"XML:com.adobe.xmp\0\x01\x00\0\0\x78\x9c\x03\x00\x00\x00\x00\x01".to_vec(),
        );
        let ztxt = PngChunk::new(*b"zTXt", b"Comment\0\x00\x78\x9c\x03\x00\x00\x00\x00\x01".to_vec());
        let png = PngImage::parse(&tiny_png())
            .unwrap()
            .insert_after_first(vec![xmp, ztxt.clone()])
            .to_bytes();

        // Compressed iTXt is invisible to the decoder
        assert!(PngImage::parse(&png).unwrap().text_entries().unwrap().is_empty());

        let tagged = serialize(&sample_identifier(), &sample_metadata(), &png).unwrap();
        let image = PngImage::parse(&tagged).unwrap();
        assert!(!image.chunks().iter().any(|c| c.data().starts_with(b"XML:com.adobe.xmp\0")));
        assert!(image.chunks().contains(&ztxt));
        assert_eq!(deserialize(&tagged).unwrap().metadata, sample_metadata());
    }
}
