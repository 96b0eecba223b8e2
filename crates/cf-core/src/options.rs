//! Typed conversion options, one schema per adapter kind.
//!
//! Options arrive as loose JSON maps (from the CLI or a caller-supplied
//! patch) and are parsed into a closed [`ConversionOptions`] enum. Parsing
//! rejects unknown keys and out-of-range values, so an adapter only ever sees
//! a schema it understands.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Error, Result};
use crate::media::AdapterKind;

// ---------------------------------------------------------------------------
// Format enums
// ---------------------------------------------------------------------------

/// Render target for PDF documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentTarget {
    #[default]
    Png,
    Jpeg,
    Text,
    Html,
}

impl DocumentTarget {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Text => "txt",
            Self::Html => "html",
        }
    }

    /// Whether this target renders page images (and therefore an archive).
    pub fn is_raster(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }
}

/// Output format for the image adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
    Gif,
    Tiff,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
        }
    }
}

/// Output format for developed RAW images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawFormat {
    #[default]
    Jpeg,
    Tiff,
    Png,
}

impl RawFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Tiff => "tiff",
            Self::Png => "png",
        }
    }
}

/// White balance source for RAW development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteBalance {
    #[default]
    Auto,
    Camera,
}

/// Output format for audio transcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Ogg,
    Flac,
    Aac,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
            Self::Aac => "m4a",
        }
    }
}

/// What the audio adapter does with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioOperation {
    #[default]
    Convert,
    Compress,
}

/// What the video adapter does with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOperation {
    #[default]
    Transcode,
    ExtractAudio,
    Compress,
}

/// Container format for video transcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Webm,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentOptions {
    pub target: DocumentTarget,
    /// Render scale relative to 72 dpi.
    pub scale: f32,
    /// JPEG quality in `0.0..=1.0`.
    pub quality: f32,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            target: DocumentTarget::Png,
            scale: 2.0,
            quality: 0.92,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageOptions {
    pub format: ImageFormat,
    /// Encoder quality in `0.0..=1.0`; only lossy formats use it.
    pub quality: f32,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawImageOptions {
    pub format: RawFormat,
    pub quality: f32,
    pub white_balance: WhiteBalance,
    /// Develop at half resolution, which is much faster.
    pub half_size: bool,
}

impl Default for RawImageOptions {
    fn default() -> Self {
        Self {
            format: RawFormat::Jpeg,
            quality: 0.9,
            white_balance: WhiteBalance::Auto,
            half_size: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioOptions {
    pub operation: AudioOperation,
    pub format: AudioFormat,
    /// VBR quality, 0 (best) to 9 (smallest).
    pub quality: u8,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            operation: AudioOperation::Convert,
            format: AudioFormat::Mp3,
            quality: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoOptions {
    pub operation: VideoOperation,
    pub format: VideoFormat,
    /// Constant rate factor, 0 (lossless) to 51.
    pub crf: u8,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            operation: VideoOperation::Transcode,
            format: VideoFormat::Mp4,
            crf: 23,
        }
    }
}

// ---------------------------------------------------------------------------
// ConversionOptions
// ---------------------------------------------------------------------------

/// Options for a single job, tagged by adapter kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConversionOptions {
    Document(DocumentOptions),
    Image(ImageOptions),
    RawImage(RawImageOptions),
    Audio(AudioOptions),
    Video(VideoOptions),
}

impl ConversionOptions {
    /// Default options for `kind`.
    pub fn defaults(kind: AdapterKind) -> Self {
        match kind {
            AdapterKind::Document => Self::Document(DocumentOptions::default()),
            AdapterKind::Image => Self::Image(ImageOptions::default()),
            AdapterKind::RawImage => Self::RawImage(RawImageOptions::default()),
            AdapterKind::Audio => Self::Audio(AudioOptions::default()),
            AdapterKind::Video => Self::Video(VideoOptions::default()),
        }
    }

    /// The adapter kind these options belong to.
    pub fn kind(&self) -> AdapterKind {
        match self {
            Self::Document(_) => AdapterKind::Document,
            Self::Image(_) => AdapterKind::Image,
            Self::RawImage(_) => AdapterKind::RawImage,
            Self::Audio(_) => AdapterKind::Audio,
            Self::Video(_) => AdapterKind::Video,
        }
    }

    /// Parse a loose option map for `kind`. Missing keys take defaults.
    pub fn from_json(kind: AdapterKind, map: &Map<String, Value>) -> Result<Self> {
        let value = Value::Object(map.clone());
        let options = match kind {
            AdapterKind::Document => Self::Document(parse_schema(kind, value)?),
            AdapterKind::Image => Self::Image(parse_schema(kind, value)?),
            AdapterKind::RawImage => Self::RawImage(parse_schema(kind, value)?),
            AdapterKind::Audio => Self::Audio(parse_schema(kind, value)?),
            AdapterKind::Video => Self::Video(parse_schema(kind, value)?),
        };
        options.validate()?;
        Ok(options)
    }

    /// Shallow-merge `patch` into these options.
    ///
    /// Top-level keys in `patch` replace the existing values. If the merged
    /// map does not parse or validate, `self` is left unchanged.
    pub fn merge_patch(&mut self, patch: &Map<String, Value>) -> Result<()> {
        let mut current = match self.schema_value()? {
            Value::Object(map) => map,
            other => {
                return Err(Error::Internal(format!(
                    "options did not serialize to an object: {other}"
                )))
            }
        };
        for (key, value) in patch {
            current.insert(key.clone(), value.clone());
        }
        *self = Self::from_json(self.kind(), &current)?;
        Ok(())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Document(o) => {
                check_unit("document.quality", o.quality)?;
                if !(o.scale > 0.0 && o.scale <= 8.0) {
                    return Err(Error::Validation(format!(
                        "document.scale must be in (0, 8], got {}",
                        o.scale
                    )));
                }
            }
            Self::Image(o) => check_unit("image.quality", o.quality)?,
            Self::RawImage(o) => check_unit("raw-image.quality", o.quality)?,
            Self::Audio(o) => {
                if o.quality > 9 {
                    return Err(Error::Validation(format!(
                        "audio.quality must be in 0..=9, got {}",
                        o.quality
                    )));
                }
            }
            Self::Video(o) => {
                if o.crf > 51 {
                    return Err(Error::Validation(format!(
                        "video.crf must be in 0..=51, got {}",
                        o.crf
                    )));
                }
            }
        }
        Ok(())
    }

    /// The untagged per-kind schema as JSON.
    fn schema_value(&self) -> Result<Value> {
        let value = match self {
            Self::Document(o) => serde_json::to_value(o),
            Self::Image(o) => serde_json::to_value(o),
            Self::RawImage(o) => serde_json::to_value(o),
            Self::Audio(o) => serde_json::to_value(o),
            Self::Video(o) => serde_json::to_value(o),
        };
        value.map_err(|e| Error::Internal(format!("options serialization failed: {e}")))
    }
}

impl fmt::Display for ConversionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.schema_value() {
            Ok(value) => write!(f, "{}:{}", self.kind(), value),
            Err(_) => write!(f, "{}", self.kind()),
        }
    }
}

fn parse_schema<T: DeserializeOwned>(kind: AdapterKind, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::Validation(format!("invalid {kind} options: {e}")))
}

fn check_unit(field: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{field} must be in 0.0..=1.0, got {value}"
        )))
    }
}
