//! Media-domain types: adapter kinds, input payloads and conversion outputs.
//!
//! All enums serialize in lowercase/kebab-case and implement `Display`
//! manually for consistent string representation.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// AdapterKind
// ---------------------------------------------------------------------------

/// The closed set of conversion adapters a job can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterKind {
    Document,
    Image,
    RawImage,
    Audio,
    Video,
}

impl AdapterKind {
    /// All adapter kinds, in display order.
    pub const ALL: [AdapterKind; 5] = [
        AdapterKind::Document,
        AdapterKind::Image,
        AdapterKind::RawImage,
        AdapterKind::Audio,
        AdapterKind::Video,
    ];

    /// File extensions (lowercase, without dot) this adapter accepts.
    pub fn accepted_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Document => &["pdf"],
            Self::Image => &["png", "jpg", "jpeg", "webp", "gif", "bmp", "tif", "tiff"],
            Self::RawImage => &["cr2", "nef", "arw", "dng", "raf", "orf", "rw2"],
            Self::Audio => &["mp3", "wav", "ogg", "m4a", "flac", "aac"],
            Self::Video => &["mp4", "webm", "avi", "mov", "mkv"],
        }
    }

    /// Media type prefixes this adapter accepts when the extension is unknown.
    fn accepted_media_types(&self) -> &'static [&'static str] {
        match self {
            Self::Document => &["application/pdf"],
            Self::Image => &["image/png", "image/jpeg", "image/webp", "image/gif", "image/bmp", "image/tiff"],
            Self::RawImage => &["image/x-canon-cr2", "image/x-nikon-nef", "image/x-sony-arw", "image/x-adobe-dng"],
            Self::Audio => &["audio/"],
            Self::Video => &["video/"],
        }
    }

    /// Whether `file` looks like something this adapter can process.
    pub fn accepts(&self, file: &InputFile) -> bool {
        if let Some(ext) = file.extension() {
            if self.accepted_extensions().contains(&ext.as_str()) {
                return true;
            }
        }
        match file.media_type.as_deref() {
            Some(mt) => self
                .accepted_media_types()
                .iter()
                .any(|prefix| mt.starts_with(prefix)),
            None => false,
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::Image => write!(f, "image"),
            Self::RawImage => write!(f, "raw-image"),
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

impl FromStr for AdapterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" | "pdf" => Ok(Self::Document),
            "image" => Ok(Self::Image),
            "raw-image" | "raw_image" | "raw" => Ok(Self::RawImage),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            _ => Err(Error::UnknownAdapterKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// InputFile
// ---------------------------------------------------------------------------

/// An immutable input payload: bytes plus the metadata the browser would
/// attach to a `File`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Original file name, including extension.
    pub name: String,
    /// Declared media type, if known.
    pub media_type: Option<String>,
    /// File contents.
    pub bytes: Bytes,
}

impl InputFile {
    /// Create a new input file.
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            media_type: None,
            bytes: bytes.into(),
        }
    }

    /// Builder: set the declared media type.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Read an input file from disk.
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());
        Ok(Self::new(name, bytes))
    }

    /// Size of the payload in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lowercase extension without the dot.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// The name up to the first `.`, matching how output names are derived
    /// (`holiday.raw.cr2` becomes `holiday`).
    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }
}

/// Return the portion of `name` before the first `.`, or the whole name when
/// that would be empty.
pub fn base_name(name: &str) -> &str {
    match name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

// ---------------------------------------------------------------------------
// ConversionOutput
// ---------------------------------------------------------------------------

/// The successful result of an adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutput {
    /// Converted bytes.
    pub bytes: Bytes,
    /// Computed output file name.
    pub file_name: String,
}

impl ConversionOutput {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: file_name.into(),
        }
    }

    /// Whether the output is itself a zip archive (judged by its name).
    pub fn is_archive(&self) -> bool {
        is_archive_name(&self.file_name)
    }
}

/// Whether `name` carries a `.zip` extension.
pub fn is_archive_name(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn adapter_kind_parse_aliases() {
        assert_eq!("pdf".parse::<AdapterKind>().unwrap(), AdapterKind::Document);
        assert_eq!("RAW".parse::<AdapterKind>().unwrap(), AdapterKind::RawImage);
        assert_eq!("raw-image".parse::<AdapterKind>().unwrap(), AdapterKind::RawImage);
        assert_eq!(" video ".parse::<AdapterKind>().unwrap(), AdapterKind::Video);
    }

    #[test]
    fn adapter_kind_unknown() {
        let err = "spreadsheet".parse::<AdapterKind>().unwrap_err();
        assert_matches!(err, Error::UnknownAdapterKind(tag) if tag == "spreadsheet");
    }

    #[test]
    fn adapter_kind_display_roundtrips() {
        for kind in AdapterKind::ALL {
            assert_eq!(kind.to_string().parse::<AdapterKind>().unwrap(), kind);
        }
    }

    #[test]
    fn accepts_by_extension_or_media_type() {
        let by_ext = InputFile::new("Track01.FLAC", vec![0u8; 4]);
        assert!(AdapterKind::Audio.accepts(&by_ext));
        assert!(!AdapterKind::Video.accepts(&by_ext));

        let by_type = InputFile::new("clip", vec![0u8; 4]).with_media_type("video/quicktime");
        assert!(AdapterKind::Video.accepts(&by_type));
    }

    #[test]
    fn base_name_uses_first_dot() {
        assert_eq!(base_name("holiday.raw.cr2"), "holiday");
        assert_eq!(base_name("noext"), "noext");
        assert_eq!(base_name(".hidden"), ".hidden");
    }

    #[test]
    fn extension_lowercases() {
        assert_eq!(InputFile::new("a.JPG", vec![]).extension().as_deref(), Some("jpg"));
        assert_eq!(InputFile::new("README", vec![]).extension(), None);
    }

    #[test]
    fn archive_detection() {
        assert!(ConversionOutput::new("report_pages.ZIP", vec![]).is_archive());
        assert!(!ConversionOutput::new("report.png", vec![]).is_archive());
        assert!(!is_archive_name("zip"));
    }
}
