//! Shared fixtures for integration tests.

#![allow(dead_code)]

use artvault::domain::{Artist, SubmissionIdentifier, SubmissionMetadata, Tags};
use chrono::{TimeZone, Utc};

pub fn identifier(site: &str, id: &str) -> SubmissionIdentifier {
    SubmissionIdentifier::new(site, id)
}

/// The "Engine Bay" submission
pub fn engine_bay() -> (SubmissionIdentifier, SubmissionMetadata) {
    let mut tags = Tags::new();
    tags.insert("gender".to_string(), "N/A".to_string());
    tags.insert("rating".to_string(), "General Audience".to_string());

    let metadata = SubmissionMetadata {
        image_url: "http://www.example.com/~pkovac/1234.jpeg".to_string(),
        title: "Engine Bay".to_string(),
        date_uploaded: Utc.with_ymd_and_hms(2018, 5, 16, 4, 33, 50).unwrap(),
        artist: Artist::new("Philip Kovac").with_url("http://example.com/~pkovac/"),
        tags,
    };
    (identifier("example.com", "1234"), metadata)
}

/// A different submission by a different artist
pub fn harbour_at_dusk() -> (SubmissionIdentifier, SubmissionMetadata) {
    let mut tags = Tags::new();
    tags.insert("rating".to_string(), "Mature".to_string());
    tags.insert("medium".to_string(), "Oil on canvas".to_string());
    tags.insert("series".to_string(), "Ports".to_string());

    let metadata = SubmissionMetadata {
        image_url: "https://mirror.example.org/art/5678.jpg".to_string(),
        title: "Harbour at Dusk".to_string(),
        date_uploaded: Utc.with_ymd_and_hms(2021, 11, 2, 19, 5, 0).unwrap(),
        artist: Artist::new("Ines Moreau"),
        tags,
    };
    (identifier("mirror.example.org", "5678"), metadata)
}

/// Baseline JPEG: SOI, JFIF APP0, DQT, SOF0, SOS, scan data, EOI
pub fn jpeg() -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend_from_slice(&[
        0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x02, 0x00, 0x00, 0x48, 0x00,
        0x48, 0x00, 0x00,
    ]);
    jpeg.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
    jpeg.extend((1..=64).map(|i: u8| i));
    jpeg.extend_from_slice(&[
        0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x02, 0x00, 0x02, 0x01, 0x01, 0x11, 0x00,
    ]);
    jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    jpeg.extend_from_slice(&[0xF8, 0x01, 0x7F, 0xFF, 0x00, 0x3C]);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

/// Build one PNG chunk with its CRC
pub fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);

    let mut out = (data.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
    out
}

/// 1x1 greyscale PNG with a pre-existing `tEXt` comment
pub fn png() -> Vec<u8> {
    let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
    png.extend(png_chunk(b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]));
    png.extend(png_chunk(b"tEXt", b"Comment\0scanned at 300dpi"));
    png.extend(png_chunk(
        b"IDAT",
        &[0x78, 0x9C, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01],
    ));
    png.extend(png_chunk(b"IEND", &[]));
    png
}

/// Walk a PNG and return `(kind, crc matches)` for every chunk
pub fn png_chunk_crcs(png: &[u8]) -> Vec<([u8; 4], bool)> {
    let mut out = Vec::new();
    let mut pos = 8;
    while pos + 12 <= png.len() {
        let length = u32::from_be_bytes([png[pos], png[pos + 1], png[pos + 2], png[pos + 3]]) as usize;
        let kind = [png[pos + 4], png[pos + 5], png[pos + 6], png[pos + 7]];
        let data = &png[pos + 8..pos + 8 + length];
        let stored = &png[pos + 8 + length..pos + 12 + length];

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&kind);
        hasher.update(data);
        out.push((kind, hasher.finalize().to_be_bytes() == stored));
        pos += 12 + length;
    }
    out
}
