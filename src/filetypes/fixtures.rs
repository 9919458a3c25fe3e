//! Shared payloads and metadata for codec tests.

use chrono::{TimeZone, Utc};

use crate::domain::{Artist, SubmissionIdentifier, SubmissionMetadata, Tags};

pub(crate) fn sample_identifier() -> SubmissionIdentifier {
    SubmissionIdentifier::new("example.com", "1234")
}

pub(crate) fn sample_metadata() -> SubmissionMetadata {
    let mut tags = Tags::new();
    tags.insert("gender".to_string(), "N/A".to_string());
    tags.insert("rating".to_string(), "General Audience".to_string());

    SubmissionMetadata {
        image_url: "http://www.example.com/~pkovac/1234.jpeg".to_string(),
        title: "Engine Bay".to_string(),
        date_uploaded: Utc.with_ymd_and_hms(2018, 5, 16, 4, 33, 50).unwrap(),
        artist: Artist::new("Philip Kovac").with_url("http://example.com/~pkovac/"),
        tags,
    }
}

/// A structurally valid baseline JPEG: JFIF header, one quantisation
/// table, a 1x1 frame and a short scan
pub(crate) fn tiny_jpeg() -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend_from_slice(&[
        0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00,
        0x01, 0x00, 0x00,
    ]);
    jpeg.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
    jpeg.extend_from_slice(&[0x01; 64]);
    jpeg.extend_from_slice(&[
        0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x01, 0x00, 0x01, 0x01, 0x01, 0x11, 0x00,
    ]);
    jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    jpeg.extend_from_slice(&[0xD2, 0xCF, 0x20, 0x00]);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

/// A 1x1 8-bit greyscale PNG
pub(crate) fn tiny_png() -> Vec<u8> {
    fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(kind);
        hasher.update(data);

        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&hasher.finalize().to_be_bytes());
        out
    }

    let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
    png.extend(chunk(b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]));
    png.extend(chunk(
        b"IDAT",
        &[0x78, 0x9C, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01],
    ));
    png.extend(chunk(b"IEND", &[]));
    png
}
