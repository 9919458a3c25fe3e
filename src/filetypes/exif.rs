//! EXIF tag tables.
//!
//! An [`ExifTable`] is a value: every edit (`with`, `without`, `restore`)
//! consumes the table and returns a new one, so the preserve, overwrite and
//! restore steps of the JPEG codec compose as plain functions and can be
//! tested without touching JPEG bytes.
//!
//! Tables are read from either byte order and always written big-endian.
//! IFD pointer tags and the IFD1 thumbnail location are structural: they are
//! dropped on parse and regenerated on dump.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::error::CodecError;
use super::tags::exif as tag;

type Result<T> = std::result::Result<T, CodecError>;

/// The image file directories a tag can live in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ifd {
    Zeroth,
    Exif,
    Gps,
    Interop,
    First,
}

impl Ifd {
    pub const ALL: [Ifd; 5] = [Ifd::Zeroth, Ifd::Exif, Ifd::Gps, Ifd::Interop, Ifd::First];

    /// Conventional section name
    pub fn name(&self) -> &'static str {
        match self {
            Ifd::Zeroth => "0th",
            Ifd::Exif => "Exif",
            Ifd::Gps => "GPS",
            Ifd::Interop => "Interop",
            Ifd::First => "1st",
        }
    }
}

/// A typed EXIF field value.
///
/// `Ascii` keeps the raw field bytes, terminator included, so values
/// written by other tools survive a parse and dump unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExifValue {
    Byte(Vec<u8>),
    Ascii(#[serde(with = "ascii_field")] Vec<u8>),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<[u32; 2]>),
    SByte(Vec<i8>),
    Undefined(Vec<u8>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SRational(Vec<[i32; 2]>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl ExifValue {
    /// A NUL-terminated ASCII value
    pub fn ascii(text: impl AsRef<str>) -> Self {
        let mut raw = text.as_ref().as_bytes().to_vec();
        raw.push(0);
        ExifValue::Ascii(raw)
    }

    fn type_code(&self) -> u16 {
        match self {
            ExifValue::Byte(_) => 1,
            ExifValue::Ascii(_) => 2,
            ExifValue::Short(_) => 3,
            ExifValue::Long(_) => 4,
            ExifValue::Rational(_) => 5,
            ExifValue::SByte(_) => 6,
            ExifValue::Undefined(_) => 7,
            ExifValue::SShort(_) => 8,
            ExifValue::SLong(_) => 9,
            ExifValue::SRational(_) => 10,
            ExifValue::Float(_) => 11,
            ExifValue::Double(_) => 12,
        }
    }

    /// Element count as written in the IFD entry
    fn count(&self) -> usize {
        match self {
            ExifValue::Byte(v) | ExifValue::Undefined(v) | ExifValue::Ascii(v) => v.len(),
            ExifValue::Short(v) => v.len(),
            ExifValue::Long(v) => v.len(),
            ExifValue::Rational(v) => v.len(),
            ExifValue::SByte(v) => v.len(),
            ExifValue::SShort(v) => v.len(),
            ExifValue::SLong(v) => v.len(),
            ExifValue::SRational(v) => v.len(),
            ExifValue::Float(v) => v.len(),
            ExifValue::Double(v) => v.len(),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.count() * type_size(self.type_code()).unwrap_or(1));
        match self {
            ExifValue::Byte(v) | ExifValue::Undefined(v) | ExifValue::Ascii(v) => out.extend_from_slice(v),
            ExifValue::SByte(v) => out.extend(v.iter().map(|x| *x as u8)),
            ExifValue::Short(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            ExifValue::SShort(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            ExifValue::Long(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            ExifValue::SLong(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            ExifValue::Rational(v) => v.iter().flatten().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            ExifValue::SRational(v) => v.iter().flatten().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            ExifValue::Float(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            ExifValue::Double(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
        }
        out
    }

    /// The text of an ASCII value, without its NUL padding.
    ///
    /// Content that is not UTF-8 is read as Latin-1.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        let ExifValue::Ascii(raw) = self else {
            return None;
        };
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let trimmed = &raw[..end];
        Some(match std::str::from_utf8(trimmed) {
            Ok(text) => Cow::Borrowed(text),
            Err(_) => Cow::Owned(trimmed.iter().map(|&b| b as char).collect()),
        })
    }
}

/// ASCII values in preservation records: a JSON string when the raw bytes
/// are UTF-8 with a single trailing NUL, the byte array otherwise
mod ascii_field {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Raw(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(raw: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let text = raw
            .split_last()
            .filter(|(last, body)| **last == 0 && !body.contains(&0))
            .and_then(|(_, body)| std::str::from_utf8(body).ok());
        match text {
            Some(text) => serializer.serialize_str(text),
            None => serializer.collect_seq(raw),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => {
                let mut raw = text.into_bytes();
                raw.push(0);
                raw
            }
            Repr::Raw(raw) => raw,
        })
    }
}

/// Hex encoding for the verbatim EXIF block kept in a preservation record
mod hex_block {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(block: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match block {
            Some(block) => serializer.serialize_str(&hex::encode(block)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| hex::decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

fn type_size(type_code: u16) -> Option<usize> {
    match type_code {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// Saved values of one directory's slots; `None` marks a slot that was absent
pub type SavedSlots = BTreeMap<u16, Option<ExifValue>>;

/// What one archival pass overwrote, so that the pass can be undone.
///
/// `original` holds the complete TIFF block the pass started from, when
/// there was one and it fits; restoring it gives back the exact bytes.
/// Otherwise the saved slot values are written back into the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreservationRecord {
    #[serde(rename = "0th", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub zeroth: SavedSlots,

    #[serde(rename = "Exif", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exif: SavedSlots,

    #[serde(
        rename = "Original",
        default,
        skip_serializing_if = "Option::is_none",
        with = "hex_block"
    )]
    pub original: Option<Vec<u8>>,
}

impl PreservationRecord {
    fn slots_mut(&mut self, ifd: Ifd) -> Result<&mut SavedSlots> {
        match ifd {
            Ifd::Zeroth => Ok(&mut self.zeroth),
            Ifd::Exif => Ok(&mut self.exif),
            other => Err(CodecError::Unencodable(format!(
                "{} slots cannot be preserved",
                other.name()
            ))),
        }
    }

    /// Slots recorded for `ifd`
    pub fn slots(&self, ifd: Ifd) -> Option<&SavedSlots> {
        match ifd {
            Ifd::Zeroth => Some(&self.zeroth),
            Ifd::Exif => Some(&self.exif),
            _ => None,
        }
    }

    /// Record the current value of `tag`, absent or not
    pub fn save(&mut self, ifd: Ifd, tag: u16, value: Option<&ExifValue>) -> Result<()> {
        self.slots_mut(ifd)?.insert(tag, value.cloned());
        Ok(())
    }
}

type Directory = BTreeMap<u16, ExifValue>;

/// The tag sections of one EXIF block, plus its embedded thumbnail
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifTable {
    zeroth: Directory,
    exif: Directory,
    gps: Directory,
    interop: Directory,
    first: Directory,
    thumbnail: Option<Vec<u8>>,
}

impl ExifTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn section(&self, ifd: Ifd) -> &Directory {
        match ifd {
            Ifd::Zeroth => &self.zeroth,
            Ifd::Exif => &self.exif,
            Ifd::Gps => &self.gps,
            Ifd::Interop => &self.interop,
            Ifd::First => &self.first,
        }
    }

    fn section_mut(&mut self, ifd: Ifd) -> &mut Directory {
        match ifd {
            Ifd::Zeroth => &mut self.zeroth,
            Ifd::Exif => &mut self.exif,
            Ifd::Gps => &mut self.gps,
            Ifd::Interop => &mut self.interop,
            Ifd::First => &mut self.first,
        }
    }

    pub fn get(&self, ifd: Ifd, tag: u16) -> Option<&ExifValue> {
        self.section(ifd).get(&tag)
    }

    /// A copy of this table with `tag` set
    pub fn with(mut self, ifd: Ifd, tag: u16, value: ExifValue) -> Self {
        self.section_mut(ifd).insert(tag, value);
        self
    }

    /// A copy of this table with `tag` removed
    pub fn without(mut self, ifd: Ifd, tag: u16) -> Self {
        self.section_mut(ifd).remove(&tag);
        self
    }

    pub fn thumbnail(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }

    pub fn with_thumbnail(mut self, thumbnail: Vec<u8>) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    /// No tags in any section and no thumbnail
    pub fn is_empty(&self) -> bool {
        Ifd::ALL.iter().all(|ifd| self.section(*ifd).is_empty()) && self.thumbnail.is_none()
    }

    /// Snapshot the current values of `slots`
    pub fn preserve(&self, slots: &[(Ifd, u16)]) -> Result<PreservationRecord> {
        let mut record = PreservationRecord::default();
        for (ifd, tag) in slots {
            record.save(*ifd, *tag, self.get(*ifd, *tag))?;
        }
        Ok(record)
    }

    /// Write every slot value saved in `record` back into the table
    pub fn restore(mut self, record: &PreservationRecord) -> Self {
        for ifd in [Ifd::Zeroth, Ifd::Exif] {
            for (tag, value) in record.slots(ifd).into_iter().flatten() {
                self = match value {
                    Some(value) => self.with(ifd, *tag, value.clone()),
                    None => self.without(ifd, *tag),
                };
            }
        }
        self
    }

    /// Parse a TIFF-structured EXIF block (without the `Exif\0\0` header)
    pub fn parse(data: &[u8]) -> Result<Self> {
        let reader = match data.get(0..2) {
            Some(b"II") => Reader { data, big: false },
            Some(b"MM") => Reader { data, big: true },
            _ => return Err(CodecError::corrupt("EXIF block has no TIFF byte order mark")),
        };
        if reader.u16(2)? != 42 {
            return Err(CodecError::corrupt("EXIF block has a bad TIFF magic number"));
        }

        let mut visited = HashSet::new();
        let mut table = ExifTable::new();

        let ifd0_offset = reader.u32(4)? as usize;
        let (mut zeroth, ifd1_offset) = reader.directory(ifd0_offset, &mut visited)?;

        if let Some(offset) = take_pointer(&mut zeroth, tag::EXIF_IFD_POINTER) {
            let (mut exif, _) = reader.directory(offset, &mut visited)?;
            if let Some(offset) = take_pointer(&mut exif, tag::INTEROP_IFD_POINTER) {
                table.interop = reader.directory(offset, &mut visited)?.0;
            }
            table.exif = exif;
        }
        if let Some(offset) = take_pointer(&mut zeroth, tag::GPS_IFD_POINTER) {
            table.gps = reader.directory(offset, &mut visited)?.0;
        }
        table.zeroth = zeroth;

        if ifd1_offset != 0 {
            let (mut first, _) = reader.directory(ifd1_offset, &mut visited)?;
            let start = take_pointer(&mut first, tag::JPEG_INTERCHANGE_FORMAT);
            let length = take_pointer(&mut first, tag::JPEG_INTERCHANGE_FORMAT_LENGTH);
            if let (Some(start), Some(length)) = (start, length) {
                match start.checked_add(length).and_then(|end| data.get(start..end)) {
                    Some(thumbnail) => table.thumbnail = Some(thumbnail.to_vec()),
                    None => tracing::debug!(start, length, "Dropping out-of-bounds EXIF thumbnail"),
                }
            }
            table.first = first;
        }

        Ok(table)
    }

    /// Serialize to a big-endian TIFF block
    pub fn dump(&self) -> Result<Vec<u8>> {
        let mut zeroth = self.zeroth.clone();
        let mut exif = self.exif.clone();
        let mut first = self.first.clone();

        let has_exif = !exif.is_empty() || !self.interop.is_empty();
        let has_gps = !self.gps.is_empty();
        let has_interop = !self.interop.is_empty();
        let has_first = !first.is_empty() || self.thumbnail.is_some();

        // Reserve pointer slots first: their size is fixed, so layout can be
        // computed before the offsets are known.
        let placeholder = || ExifValue::Long(vec![0]);
        if has_exif {
            zeroth.insert(tag::EXIF_IFD_POINTER, placeholder());
        }
        if has_gps {
            zeroth.insert(tag::GPS_IFD_POINTER, placeholder());
        }
        if has_interop {
            exif.insert(tag::INTEROP_IFD_POINTER, placeholder());
        }
        if let Some(thumbnail) = &self.thumbnail {
            first.insert(tag::JPEG_INTERCHANGE_FORMAT, placeholder());
            first.insert(
                tag::JPEG_INTERCHANGE_FORMAT_LENGTH,
                ExifValue::Long(vec![to_u32(thumbnail.len())?]),
            );
        }

        let ifd0_offset = 8;
        let exif_offset = ifd0_offset + directory_size(&zeroth);
        let gps_offset = exif_offset + if has_exif { directory_size(&exif) } else { 0 };
        let interop_offset = gps_offset + if has_gps { directory_size(&self.gps) } else { 0 };
        let ifd1_offset = interop_offset + if has_interop { directory_size(&self.interop) } else { 0 };
        let thumbnail_offset = ifd1_offset + if has_first { directory_size(&first) } else { 0 };

        if has_exif {
            zeroth.insert(tag::EXIF_IFD_POINTER, ExifValue::Long(vec![to_u32(exif_offset)?]));
        }
        if has_gps {
            zeroth.insert(tag::GPS_IFD_POINTER, ExifValue::Long(vec![to_u32(gps_offset)?]));
        }
        if has_interop {
            exif.insert(tag::INTEROP_IFD_POINTER, ExifValue::Long(vec![to_u32(interop_offset)?]));
        }
        if self.thumbnail.is_some() {
            first.insert(
                tag::JPEG_INTERCHANGE_FORMAT,
                ExifValue::Long(vec![to_u32(thumbnail_offset)?]),
            );
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"MM\x00\x2A");
        out.extend_from_slice(&to_u32(ifd0_offset)?.to_be_bytes());

        let next_after_zeroth = if has_first { ifd1_offset } else { 0 };
        write_directory(&mut out, &zeroth, ifd0_offset, next_after_zeroth)?;
        if has_exif {
            write_directory(&mut out, &exif, exif_offset, 0)?;
        }
        if has_gps {
            write_directory(&mut out, &self.gps, gps_offset, 0)?;
        }
        if has_interop {
            write_directory(&mut out, &self.interop, interop_offset, 0)?;
        }
        if has_first {
            write_directory(&mut out, &first, ifd1_offset, 0)?;
        }
        if let Some(thumbnail) = &self.thumbnail {
            out.extend_from_slice(thumbnail);
        }

        Ok(out)
    }
}

fn to_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| CodecError::Unencodable("EXIF block exceeds 4 GiB".to_string()))
}

fn take_pointer(directory: &mut Directory, tag: u16) -> Option<usize> {
    match directory.remove(&tag)? {
        ExifValue::Long(v) => v.first().map(|&x| x as usize),
        ExifValue::Short(v) => v.first().map(|&x| x as usize),
        _ => None,
    }
}

/// Bytes taken by a value stored out of line, padded to a word boundary
fn external_size(value: &ExifValue) -> usize {
    let size = value.encode().len();
    if size <= 4 {
        0
    } else {
        size + size % 2
    }
}

fn directory_size(directory: &Directory) -> usize {
    2 + 12 * directory.len() + 4 + directory.values().map(external_size).sum::<usize>()
}

fn write_directory(out: &mut Vec<u8>, directory: &Directory, offset: usize, next: usize) -> Result<()> {
    debug_assert_eq!(out.len(), offset);

    let count = u16::try_from(directory.len())
        .map_err(|_| CodecError::Unencodable("too many EXIF entries in one directory".to_string()))?;
    let mut values_offset = offset + 2 + 12 * directory.len() + 4;
    let mut values = Vec::new();

    out.extend_from_slice(&count.to_be_bytes());
    for (tag, value) in directory {
        let bytes = value.encode();
        out.extend_from_slice(&tag.to_be_bytes());
        out.extend_from_slice(&value.type_code().to_be_bytes());
        out.extend_from_slice(&to_u32(value.count())?.to_be_bytes());
        if bytes.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..bytes.len()].copy_from_slice(&bytes);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&to_u32(values_offset)?.to_be_bytes());
            values_offset += bytes.len() + bytes.len() % 2;
            values.extend_from_slice(&bytes);
            if bytes.len() % 2 == 1 {
                values.push(0);
            }
        }
    }
    out.extend_from_slice(&to_u32(next)?.to_be_bytes());
    out.extend_from_slice(&values);
    Ok(())
}

/// Bounds-checked reads over a TIFF block in its declared byte order
struct Reader<'a> {
    data: &'a [u8],
    big: bool,
}

impl<'a> Reader<'a> {
    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                CodecError::corrupt(format!("EXIF read of {} bytes at offset {} is out of bounds", len, offset))
            })
    }

    fn u16(&self, offset: usize) -> Result<u16> {
        let bytes = self.slice(offset, 2)?;
        Ok(if self.big {
            BigEndian::read_u16(bytes)
        } else {
            LittleEndian::read_u16(bytes)
        })
    }

    fn u32(&self, offset: usize) -> Result<u32> {
        let bytes = self.slice(offset, 4)?;
        Ok(if self.big {
            BigEndian::read_u32(bytes)
        } else {
            LittleEndian::read_u32(bytes)
        })
    }

    /// Read one IFD, returning its entries and the offset of the next IFD
    fn directory(&self, offset: usize, visited: &mut HashSet<usize>) -> Result<(Directory, usize)> {
        if !visited.insert(offset) {
            return Err(CodecError::corrupt(format!("EXIF directory loop at offset {}", offset)));
        }

        let count = self.u16(offset)? as usize;
        let mut directory = Directory::new();

        for index in 0..count {
            let entry = offset + 2 + index * 12;
            let tag = self.u16(entry)?;
            let type_code = self.u16(entry + 2)?;
            let count = self.u32(entry + 4)? as usize;

            let Some(size) = type_size(type_code) else {
                tracing::debug!(tag, type_code, "Skipping EXIF entry of unknown type");
                continue;
            };
            let total = size
                .checked_mul(count)
                .ok_or_else(|| CodecError::corrupt(format!("EXIF tag {:#06x} has an impossible size", tag)))?;
            let raw = if total <= 4 {
                self.slice(entry + 8, total)?
            } else {
                self.slice(self.u32(entry + 8)? as usize, total)?
            };

            directory.insert(tag, self.value(type_code, raw));
        }

        // Some writers omit the trailing link of the last directory
        let next = self.u32(offset + 2 + count * 12).unwrap_or(0) as usize;
        Ok((directory, next))
    }

    fn value(&self, type_code: u16, raw: &[u8]) -> ExifValue {
        macro_rules! elements {
            ($size:expr, $read:expr) => {
                raw.chunks_exact($size).map($read).collect()
            };
        }

        let big = self.big;
        let u16_of = |b: &[u8]| if big { BigEndian::read_u16(b) } else { LittleEndian::read_u16(b) };
        let u32_of = |b: &[u8]| if big { BigEndian::read_u32(b) } else { LittleEndian::read_u32(b) };
        let u64_of = |b: &[u8]| if big { BigEndian::read_u64(b) } else { LittleEndian::read_u64(b) };

        match type_code {
            1 => ExifValue::Byte(raw.to_vec()),
            2 => ExifValue::Ascii(raw.to_vec()),
            3 => ExifValue::Short(elements!(2, u16_of)),
            4 => ExifValue::Long(elements!(4, u32_of)),
            5 => ExifValue::Rational(elements!(8, |b: &[u8]| [u32_of(&b[..4]), u32_of(&b[4..])])),
            6 => ExifValue::SByte(raw.iter().map(|&b| b as i8).collect()),
            8 => ExifValue::SShort(elements!(2, |b: &[u8]| u16_of(b) as i16)),
            9 => ExifValue::SLong(elements!(4, |b: &[u8]| u32_of(b) as i32)),
            10 => ExifValue::SRational(elements!(8, |b: &[u8]| [
                u32_of(&b[..4]) as i32,
                u32_of(&b[4..]) as i32
            ])),
            11 => ExifValue::Float(elements!(4, |b: &[u8]| f32::from_bits(u32_of(b)))),
            12 => ExifValue::Double(elements!(8, |b: &[u8]| f64::from_bits(u64_of(b)))),
            _ => ExifValue::Undefined(raw.to_vec()),
        }
    }
}
