//! Scratch directories for tool-backed conversions.
//!
//! A [`Workspace`] materializes an in-memory [`InputFile`] into a temporary
//! directory so external tools can read it, and collects whatever they write
//! back. The directory is removed when the workspace is dropped.

use std::path::{Path, PathBuf};

use cf_core::InputFile;
use tempfile::TempDir;

/// Temporary directory holding one job's input and intermediate files.
///
/// # Example
///
/// ```no_run
/// use cf_adapters::Workspace;
/// use cf_core::InputFile;
///
/// # async fn example() -> cf_core::Result<()> {
/// let file = InputFile::new("scan.pdf", vec![0u8; 16]);
/// let workspace = Workspace::create(&file).await?;
/// // ... run a tool against workspace.input() writing to workspace.temp_file("out.txt") ...
/// let text = workspace.read("out.txt").await?;
/// # Ok(())
/// # }
/// ```
pub struct Workspace {
    temp_dir: TempDir,
    input_path: PathBuf,
}

impl Workspace {
    /// Create a workspace and write `file` into it as `input.<ext>`.
    ///
    /// Tools only ever see the sanitized name, never the user-supplied one.
    pub async fn create(file: &InputFile) -> cf_core::Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("convertforge-")
            .tempdir()
            .map_err(|e| cf_core::Error::tool("workspace", format!("failed to create temp dir: {e}")))?;

        let input_name = match file.extension() {
            Some(ext) if ext.chars().all(|c| c.is_ascii_alphanumeric()) => format!("input.{ext}"),
            _ => "input".to_string(),
        };
        let input_path = temp_dir.path().join(input_name);
        tokio::fs::write(&input_path, &file.bytes).await?;

        Ok(Self {
            temp_dir,
            input_path,
        })
    }

    /// Path of the materialized input file.
    pub fn input(&self) -> &Path {
        &self.input_path
    }

    /// Path to the temporary directory.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a path for a named temporary file inside the workspace.
    pub fn temp_file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Read a file a tool wrote into the workspace.
    pub async fn read(&self, name: &str) -> cf_core::Result<Vec<u8>> {
        let path = self.temp_file(name);
        tokio::fs::read(&path).await.map_err(|e| {
            cf_core::Error::tool(
                "workspace",
                format!("expected output {} is missing: {e}", path.display()),
            )
        })
    }

    /// Files in the workspace whose names start with `prefix`, sorted by name.
    pub async fn files_with_prefix(&self, prefix: &str) -> cf_core::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(self.temp_dir.path()).await?;
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(prefix) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }
}
