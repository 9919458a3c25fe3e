//! JPEG codec: metadata lives in the EXIF APP1 segment.
//!
//! Serializing first snapshots every slot it is about to overwrite into
//! `UserComment`, so the values written by the previous archival pass
//! survive one generation. Deserializing reads the current values, then
//! writes the snapshot back, handing out the payload as it was before the
//! latest pass.
//!
//! On a payload that carries no earlier record, the snapshot also keeps the
//! whole original EXIF block (and any `UserComment` of its own), so the
//! first pass can be undone byte for byte.

use tracing::debug;

use super::error::CodecError;
use super::exif::{ExifTable, ExifValue, Ifd, PreservationRecord};
use super::tags::exif as tag;
use super::{format_date, parse_date, DecodedSubmission};
use crate::domain::{Artist, SubmissionIdentifier, SubmissionMetadata, Tags};

type Result<T> = std::result::Result<T, CodecError>;

pub const MIME_TYPES: &[&str] = &["image/jpeg"];

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Largest APP1 payload that fits the 16-bit segment length
const MAX_APP1_PAYLOAD: usize = 0xFFFF - 2;

/// Slots overwritten on every pass, and therefore preserved
const PRESERVED_SLOTS: [(Ifd, u16); 7] = [
    (Ifd::Zeroth, tag::IMAGE_ID),
    (Ifd::Zeroth, tag::IMAGE_DESCRIPTION),
    (Ifd::Zeroth, tag::ARTIST),
    (Ifd::Zeroth, tag::COPYRIGHT),
    (Ifd::Zeroth, tag::SECURITY_CLASSIFICATION),
    (Ifd::Exif, tag::IMAGE_UNIQUE_ID),
    (Ifd::Exif, tag::DATE_TIME_DIGITIZED),
];

const COMMENT_ASCII: &[u8; 8] = b"ASCII\0\0\0";
const COMMENT_UNDEFINED: &[u8; 8] = &[0; 8];
const COMMENT_PREFIXES: [&[u8; 8]; 4] = [COMMENT_ASCII, COMMENT_UNDEFINED, b"UNICODE\0", b"JIS\0\0\0\0\0"];

/// One marker segment, including its `FF xx` marker and length bytes
#[derive(Debug, Clone, Copy)]
struct Segment<'a> {
    marker: u8,
    bytes: &'a [u8],
}

impl Segment<'_> {
    fn is_exif(&self) -> bool {
        self.marker == APP1 && self.bytes.get(4..4 + EXIF_HEADER.len()) == Some(EXIF_HEADER)
    }
}

/// A JPEG split into its header segments and everything from the first
/// scan onwards (kept verbatim)
#[derive(Debug)]
struct JpegStream<'a> {
    segments: Vec<Segment<'a>>,
    scan: &'a [u8],
}

impl<'a> JpegStream<'a> {
    fn parse(data: &'a [u8]) -> Result<Self> {
        if data.get(0..2) != Some(&[0xFF, SOI][..]) {
            return Err(CodecError::corrupt("JPEG does not start with SOI"));
        }

        let mut segments = Vec::new();
        let mut pos = 2;

        while pos < data.len() {
            if data[pos] != 0xFF {
                return Err(CodecError::corrupt(format!("expected JPEG marker at offset {}", pos)));
            }
            // Fill bytes
            while data.get(pos + 1) == Some(&0xFF) {
                pos += 1;
            }
            let marker = *data
                .get(pos + 1)
                .ok_or_else(|| CodecError::corrupt("JPEG ends inside a marker"))?;

            match marker {
                SOS | EOI => {
                    return Ok(Self {
                        segments,
                        scan: &data[pos..],
                    })
                }
                0x01 | 0xD0..=0xD7 => {
                    segments.push(Segment {
                        marker,
                        bytes: &data[pos..pos + 2],
                    });
                    pos += 2;
                }
                _ => {
                    let length = data
                        .get(pos + 2..pos + 4)
                        .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
                        .ok_or_else(|| CodecError::corrupt("JPEG ends inside a segment header"))?;
                    let end = pos + 2 + length;
                    if length < 2 || end > data.len() {
                        return Err(CodecError::corrupt(format!(
                            "JPEG segment {:#04x} at offset {} has bad length {}",
                            marker, pos, length
                        )));
                    }
                    segments.push(Segment {
                        marker,
                        bytes: &data[pos..end],
                    });
                    pos = end;
                }
            }
        }

        Ok(Self {
            segments,
            scan: &[],
        })
    }

    /// The TIFF block of the first EXIF segment
    fn exif_block(&self) -> Option<&'a [u8]> {
        self.segments
            .iter()
            .find(|s| s.is_exif())
            .map(|segment| &segment.bytes[4 + EXIF_HEADER.len()..])
    }

    /// The tag table of the first EXIF segment, or an empty one
    fn exif_table(&self) -> Result<ExifTable> {
        match self.exif_block() {
            Some(block) => ExifTable::parse(block),
            None => Ok(ExifTable::new()),
        }
    }

    /// Re-assemble the stream with `table` as its only EXIF segment.
    ///
    /// An empty table removes the segment entirely.
    fn with_exif(&self, table: &ExifTable) -> Result<Vec<u8>> {
        if table.is_empty() {
            self.with_exif_block(None)
        } else {
            self.with_exif_block(Some(&table.dump()?))
        }
    }

    /// Re-assemble the stream with `tiff` as its only EXIF block.
    ///
    /// The segment replaces the existing EXIF segment in place. Without
    /// one it goes after a leading APP0 (JFIF) segment, else straight
    /// after SOI.
    fn with_exif_block(&self, tiff: Option<&[u8]>) -> Result<Vec<u8>> {
        let app1 = match tiff {
            None => None,
            Some(tiff) => {
                let payload_len = EXIF_HEADER.len() + tiff.len();
                if payload_len > MAX_APP1_PAYLOAD {
                    return Err(CodecError::Unencodable(format!(
                        "EXIF block of {} bytes exceeds the APP1 limit",
                        payload_len
                    )));
                }
                let mut segment = vec![0xFF, APP1];
                segment.extend_from_slice(&((payload_len + 2) as u16).to_be_bytes());
                segment.extend_from_slice(EXIF_HEADER);
                segment.extend_from_slice(tiff);
                Some(segment)
            }
        };

        let kept: Vec<&Segment> = self.segments.iter().filter(|s| !s.is_exif()).collect();
        let insert_at = match self.segments.iter().position(Segment::is_exif) {
            Some(index) => index,
            None => match kept.first() {
                Some(first) if first.marker == APP0 => 1,
                _ => 0,
            },
        };

        let mut out = vec![0xFF, SOI];
        for (index, segment) in kept.iter().enumerate() {
            if index == insert_at {
                if let Some(app1) = &app1 {
                    out.extend_from_slice(app1);
                }
            }
            out.extend_from_slice(segment.bytes);
        }
        if insert_at >= kept.len() {
            if let Some(app1) = &app1 {
                out.extend_from_slice(app1);
            }
        }
        out.extend_from_slice(self.scan);
        Ok(out)
    }
}

fn ascii(value: impl AsRef<str>) -> ExifValue {
    ExifValue::ascii(value)
}

fn encode_comment(text: &str) -> ExifValue {
    let prefix = if text.is_ascii() {
        COMMENT_ASCII
    } else {
        COMMENT_UNDEFINED
    };
    let mut bytes = prefix.to_vec();
    bytes.extend_from_slice(text.as_bytes());
    ExifValue::Undefined(bytes)
}

fn decode_comment(value: &ExifValue) -> Result<String> {
    let bytes = match value {
        ExifValue::Undefined(bytes) | ExifValue::Byte(bytes) => bytes.as_slice(),
        ExifValue::Ascii(_) => return Ok(value.as_text().unwrap_or_default().into_owned()),
        _ => return Err(CodecError::corrupt("UserComment has an unexpected EXIF type")),
    };
    let body = match bytes.get(..8) {
        Some(prefix) if COMMENT_PREFIXES.iter().any(|p| p.as_slice() == prefix) => &bytes[8..],
        _ => bytes,
    };
    String::from_utf8(body.to_vec()).map_err(|_| CodecError::corrupt("UserComment is not UTF-8"))
}

/// Whether `comment` is a record left by an earlier archival pass
fn is_preservation_record(comment: &ExifValue) -> bool {
    decode_comment(comment)
        .ok()
        .and_then(|text| serde_json::from_str::<PreservationRecord>(&text).ok())
        .is_some_and(|record| !record.zeroth.is_empty())
}

fn required(table: &ExifTable, ifd: Ifd, slot: u16, name: &str) -> Result<String> {
    optional(table, ifd, slot, name)?.ok_or_else(|| CodecError::corrupt(format!("JPEG has no {} tag", name)))
}

fn optional(table: &ExifTable, ifd: Ifd, slot: u16, name: &str) -> Result<Option<String>> {
    match table.get(ifd, slot) {
        None => Ok(None),
        Some(value) => value
            .as_text()
            .map(|text| Some(text.into_owned()))
            .ok_or_else(|| CodecError::corrupt(format!("JPEG {} tag is not ASCII", name))),
    }
}

/// `table` carrying the current generation's values
fn overwrite(table: ExifTable, identifier: &SubmissionIdentifier, metadata: &SubmissionMetadata) -> Result<ExifTable> {
    let table = table
        .with(Ifd::Exif, tag::IMAGE_UNIQUE_ID, ascii(serde_json::to_string(identifier)?))
        .with(Ifd::Zeroth, tag::IMAGE_ID, ascii(&metadata.image_url))
        .with(Ifd::Zeroth, tag::IMAGE_DESCRIPTION, ascii(&metadata.title))
        .with(Ifd::Zeroth, tag::ARTIST, ascii(&metadata.artist.name))
        .with(Ifd::Exif, tag::DATE_TIME_DIGITIZED, ascii(format_date(&metadata.date_uploaded)))
        .with(Ifd::Zeroth, tag::SECURITY_CLASSIFICATION, ascii(serde_json::to_string(&metadata.tags)?));
    Ok(match &metadata.artist.url {
        Some(url) => table.with(Ifd::Zeroth, tag::COPYRIGHT, ascii(url)),
        None => table.without(Ifd::Zeroth, tag::COPYRIGHT),
    })
}

fn with_record(table: &ExifTable, record: &PreservationRecord) -> Result<ExifTable> {
    let comment = encode_comment(&serde_json::to_string(record)?);
    Ok(table.clone().with(Ifd::Exif, tag::USER_COMMENT, comment))
}

/// Embed identity and metadata into a JPEG payload
pub fn serialize(
    identifier: &SubmissionIdentifier,
    metadata: &SubmissionMetadata,
    content: &[u8],
) -> Result<Vec<u8>> {
    let stream = JpegStream::parse(content)?;
    let table = stream.exif_table()?;

    let mut record = table.preserve(&PRESERVED_SLOTS)?;
    match table.get(Ifd::Exif, tag::USER_COMMENT) {
        // The previous pass's record is replaced, never nested
        Some(comment) if is_preservation_record(comment) => {}
        comment => {
            record.save(Ifd::Exif, tag::USER_COMMENT, comment)?;
            record.original = stream.exif_block().map(<[u8]>::to_vec);
        }
    }

    let table = overwrite(table, identifier, metadata)?;
    match stream.with_exif(&with_record(&table, &record)?) {
        Err(CodecError::Unencodable(reason)) if record.original.is_some() => {
            debug!("Not keeping the original EXIF block verbatim: {}", reason);
            record.original = None;
            stream.with_exif(&with_record(&table, &record)?)
        }
        encoded => encoded,
    }
}

/// Recover identity and metadata, and the payload as it was before the
/// latest archival pass
pub fn deserialize(content: &[u8]) -> Result<DecodedSubmission> {
    let stream = JpegStream::parse(content)?;
    let table = stream.exif_table()?;

    let identifier: SubmissionIdentifier =
        serde_json::from_str(&required(&table, Ifd::Exif, tag::IMAGE_UNIQUE_ID, "ImageUniqueID")?)?;
    let tags: Tags = serde_json::from_str(&required(
        &table,
        Ifd::Zeroth,
        tag::SECURITY_CLASSIFICATION,
        "SecurityClassification",
    )?)?;

    let metadata = SubmissionMetadata {
        image_url: required(&table, Ifd::Zeroth, tag::IMAGE_ID, "ImageID")?,
        title: required(&table, Ifd::Zeroth, tag::IMAGE_DESCRIPTION, "ImageDescription")?,
        date_uploaded: parse_date(&required(&table, Ifd::Exif, tag::DATE_TIME_DIGITIZED, "DateTimeDigitized")?)?,
        artist: Artist {
            name: required(&table, Ifd::Zeroth, tag::ARTIST, "Artist")?,
            url: optional(&table, Ifd::Zeroth, tag::COPYRIGHT, "Copyright")?,
        },
        tags,
    };

    let content = match table.get(Ifd::Exif, tag::USER_COMMENT) {
        Some(comment) => {
            let record: PreservationRecord = serde_json::from_str(&decode_comment(comment)?)?;
            match &record.original {
                Some(block) => {
                    ExifTable::parse(block)?;
                    stream.with_exif_block(Some(block))?
                }
                None => {
                    let restored = table.without(Ifd::Exif, tag::USER_COMMENT).restore(&record);
                    stream.with_exif(&restored)?
                }
            }
        }
        None => content.to_vec(),
    };

    Ok(DecodedSubmission {
        identifier,
        metadata,
        content,
    })
}
