//! Where the external converters live.
//!
//! Document, raw, audio and video conversion shell out to poppler, dcraw and
//! ffmpeg. [`ToolRegistry`] resolves each binary once per adapter session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Every binary an adapter may shell out to.
pub const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe", "pdftoppm", "pdftotext", "dcraw"];

/// A discovered tool.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub name: String,
    pub path: PathBuf,
    /// Applied to every invocation; the process is killed when it expires.
    pub timeout: Duration,
}

impl ToolConfig {
    /// Start a [`ToolCommand`] for this tool with its timeout applied.
    pub fn command(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.path.clone());
        cmd.timeout(self.timeout);
        cmd
    }
}

/// One row of the `check-tools` report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of the version banner.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolved tools, keyed by name.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Resolve every [`KNOWN_TOOLS`] entry. A configured path wins when it
    /// exists; otherwise `PATH` is searched. Missing tools are left out and
    /// only fail later, in [`ToolRegistry::require`].
    pub fn discover(tools_config: &cf_core::config::ToolsConfig) -> Self {
        let timeout = Duration::from_secs(tools_config.timeout_secs);
        let mut found = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                "ffprobe" => tools_config.ffprobe_path.as_deref(),
                "pdftoppm" => tools_config.pdftoppm_path.as_deref(),
                "pdftotext" => tools_config.pdftotext_path.as_deref(),
                "dcraw" => tools_config.dcraw_path.as_deref(),
                _ => None,
            };

            let resolved = match custom_path {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(tool = name, path = %p.display(), "configured tool path does not exist; searching PATH");
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            if let Some(path) = resolved {
                tracing::debug!(tool = name, path = %path.display(), "tool discovered");
                found.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                        timeout,
                    },
                );
            }
        }

        Self { tools: found }
    }

    /// Build a registry from explicit entries; unknown names are accepted.
    pub fn from_tools(tools: impl IntoIterator<Item = ToolConfig>) -> Self {
        Self {
            tools: tools.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    /// The tool, or a tool error telling the user to install it.
    pub fn require(&self, name: &str) -> cf_core::Result<&ToolConfig> {
        match self.tools.get(name) {
            Some(tool) => Ok(tool),
            None => Err(cf_core::Error::tool(
                name,
                format!("{name} not found; is it installed and in PATH?"),
            )),
        }
    }

    /// Availability of each known tool, probing versions of the ones found.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(cfg) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(name, &cfg.path),
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run the tool's version probe and return the first non-empty line.
///
/// ffmpeg/ffprobe print their banner on stdout for `-version`; the poppler
/// tools print theirs on stderr for `-v`; dcraw prints usage (including the
/// version) when run without arguments and exits non-zero.
fn detect_version(name: &str, path: &Path) -> Option<String> {
    let mut cmd = std::process::Command::new(path);
    match name {
        "ffmpeg" | "ffprobe" => {
            cmd.arg("-version");
        }
        "pdftoppm" | "pdftotext" => {
            cmd.arg("-v");
        }
        _ => {}
    }

    let output = cmd.output().ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|s| s.to_string())
}
