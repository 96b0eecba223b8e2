//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the queue, delivery, external tools and input limits.
//! Every section defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::media::{AdapterKind, InputFile};
use crate::Error;

/// Lowest accepted job priority.
pub const MIN_PRIORITY: u8 = 1;
/// Highest accepted job priority.
pub const MAX_PRIORITY: u8 = 10;

/// Clamp a raw priority value into `MIN_PRIORITY..=MAX_PRIORITY`.
pub fn clamp_priority(value: i64) -> u8 {
    value.clamp(MIN_PRIORITY as i64, MAX_PRIORITY as i64) as u8
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub delivery: DeliveryConfig,
    pub tools: ToolsConfig,
    pub limits: LimitsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// This is intentionally string-based so the caller can read the file
    /// however it sees fit.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.queue.max_concurrent == 0 {
            warnings.push("queue.max_concurrent is 0; 1 will be used".into());
        }

        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.queue.default_priority) {
            warnings.push(format!(
                "queue.default_priority {} is outside {MIN_PRIORITY}..={MAX_PRIORITY}; it will be clamped",
                self.queue.default_priority
            ));
        }

        if self.delivery.pack_size < 2 {
            warnings.push(format!(
                "delivery.pack_size {} delivers every file individually",
                self.delivery.pack_size
            ));
        }

        if self.delivery.compression_level > 9 {
            warnings.push(format!(
                "delivery.compression_level {} is above 9; 9 will be used",
                self.delivery.compression_level
            ));
        }

        if self.tools.timeout_secs == 0 {
            warnings.push("tools.timeout_secs is 0; tool invocations will fail immediately".into());
        }

        for kind in AdapterKind::ALL {
            if self.limits.max_bytes(kind) == 0 {
                warnings.push(format!("limits for {kind} is 0; every input will be rejected"));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of jobs in `processing` at once.
    pub max_concurrent: usize,
    /// Priority assigned to newly enqueued jobs.
    pub default_priority: u8,
}

impl QueueConfig {
    /// The concurrency bound actually applied (never below 1).
    pub fn effective_max_concurrent(&self) -> usize {
        self.max_concurrent.max(1)
    }

    /// The default priority actually applied.
    pub fn effective_default_priority(&self) -> u8 {
        clamp_priority(self.default_priority as i64)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            default_priority: 5,
        }
    }
}

/// How completed outputs are handed to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Delivery policy name: `pack10` or `all`.
    pub policy: String,
    /// Threshold for incremental packs.
    pub pack_size: usize,
    /// Where the CLI's directory sink writes deliveries.
    pub output_dir: PathBuf,
    /// Deflate level for bundle archives; 0 stores entries uncompressed.
    pub compression_level: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            policy: "pack10".into(),
            pack_size: 10,
            output_dir: PathBuf::from("./converted"),
            compression_level: 6,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub pdftoppm_path: Option<PathBuf>,
    pub pdftotext_path: Option<PathBuf>,
    pub dcraw_path: Option<PathBuf>,
    /// Upper bound for a single tool invocation.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            pdftoppm_path: None,
            pdftotext_path: None,
            dcraw_path: None,
            timeout_secs: 86_400,
        }
    }
}

const MIB: u64 = 1024 * 1024;

/// Maximum accepted input size per media family, in bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub document_bytes: u64,
    pub image_bytes: u64,
    pub raw_image_bytes: u64,
    pub audio_bytes: u64,
    pub video_bytes: u64,
}

impl LimitsConfig {
    /// The size limit that applies to `kind`.
    pub fn max_bytes(&self, kind: AdapterKind) -> u64 {
        match kind {
            AdapterKind::Document => self.document_bytes,
            AdapterKind::Image => self.image_bytes,
            AdapterKind::RawImage => self.raw_image_bytes,
            AdapterKind::Audio => self.audio_bytes,
            AdapterKind::Video => self.video_bytes,
        }
    }

    /// Reject an input that is too large or does not look like `kind`.
    pub fn check(&self, kind: AdapterKind, file: &InputFile) -> Result<()> {
        if !kind.accepts(file) {
            return Err(Error::adapter(
                kind,
                format!("{} is not a supported {kind} file", file.name),
            ));
        }
        let max = self.max_bytes(kind);
        if file.size() > max {
            return Err(Error::adapter(
                kind,
                format!(
                    "{} is {} bytes; the {kind} limit is {max} bytes",
                    file.name,
                    file.size()
                ),
            ));
        }
        Ok(())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            document_bytes: 100 * MIB,
            image_bytes: 50 * MIB,
            raw_image_bytes: 100 * MIB,
            audio_bytes: 500 * MIB,
            video_bytes: 2048 * MIB,
        }
    }
}
