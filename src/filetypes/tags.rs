//! Fixed key names used when projecting submission metadata into each
//! format's native tag space.

/// EXIF tag ids (TIFF/EXIF 2.3 numbering)
pub mod exif {
    // 0th IFD
    pub const IMAGE_DESCRIPTION: u16 = 0x010E;
    pub const ARTIST: u16 = 0x013B;
    pub const COPYRIGHT: u16 = 0x8298;
    pub const IMAGE_ID: u16 = 0x800D;
    pub const SECURITY_CLASSIFICATION: u16 = 0x9212;

    // Exif IFD
    pub const DATE_TIME_DIGITIZED: u16 = 0x9004;
    pub const USER_COMMENT: u16 = 0x9286;
    pub const IMAGE_UNIQUE_ID: u16 = 0xA420;

    // IFD pointers, regenerated on dump
    pub const EXIF_IFD_POINTER: u16 = 0x8769;
    pub const GPS_IFD_POINTER: u16 = 0x8825;
    pub const INTEROP_IFD_POINTER: u16 = 0xA005;

    // IFD1 thumbnail location, regenerated on dump
    pub const JPEG_INTERCHANGE_FORMAT: u16 = 0x0201;
    pub const JPEG_INTERCHANGE_FORMAT_LENGTH: u16 = 0x0202;
}

/// PNG text chunk keywords
pub mod png {
    pub const IDENTIFIER: &str = "ImageUniqueID";
    pub const TITLE: &str = "Title";
    pub const AUTHOR: &str = "Author";
    pub const AUTHOR_URL: &str = "Author URL";
    pub const DATE_UPLOADED: &str = "DateUploaded";
    pub const SOURCE_URL: &str = "Source URL";
    pub const TAGS: &str = "Tags";
}

/// Separator between the three segments of an archived text document
pub const TEXT_SEPARATOR: &[u8] = b"---\n";
