//! Content-based file type detection.
//!
//! Container signatures are checked first. Anything unrecognised is scored
//! by a character-encoding confidence estimate and classified as plain text
//! or opaque binary. Classification never fails.

/// MIME type plus the extension used when storing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileKind {
    pub mime: &'static str,
    pub ext: &'static str,
}

impl FileKind {
    pub const TEXT: FileKind = FileKind {
        mime: "text/plain",
        ext: "txt",
    };

    pub const BINARY: FileKind = FileKind {
        mime: "application/octet-stream",
        ext: "dat",
    };

    /// Whether sniffing fell through to the opaque fallback
    pub fn is_unknown(&self) -> bool {
        *self == Self::BINARY
    }
}

/// Minimum confidence (exclusive, 0-100) for a buffer to count as text
pub const TEXT_CONFIDENCE_THRESHOLD: u8 = 25;

struct Signature {
    offset: usize,
    magic: &'static [u8],
    kind: FileKind,
}

const fn sig(offset: usize, magic: &'static [u8], mime: &'static str, ext: &'static str) -> Signature {
    Signature {
        offset,
        magic,
        kind: FileKind { mime, ext },
    }
}

const SIGNATURES: &[Signature] = &[
    sig(0, b"\x89PNG\r\n\x1a\n", "image/png", "png"),
    sig(0, b"\xFF\xD8\xFF", "image/jpeg", "jpg"),
    sig(0, b"GIF87a", "image/gif", "gif"),
    sig(0, b"GIF89a", "image/gif", "gif"),
    sig(0, b"BM", "image/bmp", "bmp"),
    sig(0, b"II*\x00", "image/tiff", "tif"),
    sig(0, b"MM\x00*", "image/tiff", "tif"),
    sig(0, b"8BPS", "image/vnd.adobe.photoshop", "psd"),
    sig(0, b"%PDF-", "application/pdf", "pdf"),
    sig(0, b"PK\x03\x04", "application/zip", "zip"),
    sig(0, b"\x1F\x8B\x08", "application/gzip", "gz"),
    sig(0, b"7z\xBC\xAF\x27\x1C", "application/x-7z-compressed", "7z"),
    sig(0, b"Rar!\x1A\x07", "application/x-rar-compressed", "rar"),
    sig(0, b"OggS", "audio/ogg", "ogg"),
    sig(0, b"fLaC", "audio/x-flac", "flac"),
    sig(0, b"ID3", "audio/mpeg", "mp3"),
    sig(0, b"\x1A\x45\xDF\xA3", "video/x-matroska", "mkv"),
    sig(0, b"FWS", "application/x-shockwave-flash", "swf"),
    sig(0, b"CWS", "application/x-shockwave-flash", "swf"),
];

/// Classify a buffer by content
pub fn identify(content: &[u8]) -> FileKind {
    if let Some(kind) = match_signature(content) {
        return kind;
    }

    if text_confidence(content) > TEXT_CONFIDENCE_THRESHOLD {
        FileKind::TEXT
    } else {
        FileKind::BINARY
    }
}

fn match_signature(content: &[u8]) -> Option<FileKind> {
    let matches_at = |offset: usize, magic: &[u8]| {
        content
            .get(offset..offset + magic.len())
            .is_some_and(|window| window == magic)
    };

    if let Some(signature) = SIGNATURES.iter().find(|s| matches_at(s.offset, s.magic)) {
        return Some(signature.kind);
    }

    // RIFF containers carry their form type at offset 8
    if matches_at(0, b"RIFF") {
        let kind = match content.get(8..12) {
            Some(b"WEBP") => FileKind { mime: "image/webp", ext: "webp" },
            Some(b"WAVE") => FileKind { mime: "audio/vnd.wave", ext: "wav" },
            Some(b"AVI ") => FileKind { mime: "video/vnd.avi", ext: "avi" },
            _ => return None,
        };
        return Some(kind);
    }

    // ISO base media: size box then "ftyp" and a major brand
    if matches_at(4, b"ftyp") {
        let kind = match content.get(8..12) {
            Some(b"avif") | Some(b"avis") => FileKind { mime: "image/avif", ext: "avif" },
            Some(b"heic") | Some(b"heix") | Some(b"mif1") => FileKind { mime: "image/heic", ext: "heic" },
            Some(b"qt  ") => FileKind { mime: "video/quicktime", ext: "mov" },
            Some(b"M4A ") => FileKind { mime: "audio/mp4", ext: "m4a" },
            Some(_) => FileKind { mime: "video/mp4", ext: "mp4" },
            None => return None,
        };
        return Some(kind);
    }

    None
}

/// Estimate (0-100) how likely the buffer is human-readable text.
///
/// Valid UTF-8 scores the share of non-control characters. Other byte
/// strings are scored as Latin-1, capped at 50. Any NUL byte means binary.
pub fn text_confidence(content: &[u8]) -> u8 {
    if content.is_empty() || content.contains(&0) {
        return 0;
    }

    let is_control = |b: u8| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0C | 0x1B)) || b == 0x7F;

    let total = content.len() as f64;
    let control = content.iter().filter(|&&b| is_control(b)).count() as f64;
    let printable_share = 1.0 - control / total;

    let score = if std::str::from_utf8(content).is_ok() {
        printable_share * 100.0
    } else {
        // C1 controls (0x80-0x9F) are not Latin-1 text
        let c1 = content.iter().filter(|&&b| (0x80..0xA0).contains(&b)).count() as f64;
        let ascii_share = content.iter().filter(|&&b| b < 0x80).count() as f64 / total;
        (printable_share - c1 / total).max(0.0) * ascii_share * 50.0
    };

    score.round().clamp(0.0, 100.0) as u8
}
