//! Where finished deliveries go.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;

use cf_core::Result;

use crate::naming::split_extension;

/// A named blob handed to the user: either one converted file or a bundle
/// archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Download name.
    pub name: String,
    pub bytes: Bytes,
    /// Archive entry names; empty for a single-file delivery.
    pub entries: Vec<String>,
    /// Number of jobs the delivery covers.
    pub job_count: usize,
}

impl Delivery {
    pub fn is_bundle(&self) -> bool {
        !self.entries.is_empty()
    }
}

/// Receives deliveries. Called from a blocking context; the caller does not
/// wait for the user to pick anything up.
pub trait DeliverySink: Send + Sync {
    /// Store `delivery` and return where it ended up.
    fn deliver(&self, delivery: Delivery) -> Result<String>;
}

/// Writes each delivery into a directory, never overwriting existing files.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn free_path(&self, name: &str) -> PathBuf {
        let candidate = self.dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        let (stem, ext) = split_extension(name);
        (1u64..)
            .map(|n| self.dir.join(format!("{stem}_{n}{ext}")))
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}

impl DeliverySink for DirectorySink {
    fn deliver(&self, delivery: Delivery) -> Result<String> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.free_path(&delivery.name);
        std::fs::write(&path, &delivery.bytes)?;
        tracing::info!(
            path = %path.display(),
            bytes = delivery.bytes.len(),
            jobs = delivery.job_count,
            "delivery written"
        );
        Ok(path.display().to_string())
    }
}

/// Keeps deliveries in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    deliveries: Mutex<Vec<Delivery>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.lock().is_empty()
    }
}

impl DeliverySink for MemorySink {
    fn deliver(&self, delivery: Delivery) -> Result<String> {
        let name = delivery.name.clone();
        self.deliveries.lock().push(delivery);
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(name: &str, body: &'static [u8]) -> Delivery {
        Delivery {
            name: name.into(),
            bytes: Bytes::from_static(body),
            entries: Vec::new(),
            job_count: 1,
        }
    }

    #[test]
    fn directory_sink_writes_and_avoids_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"));

        let first = sink.deliver(delivery("Pack-1.zip", b"first")).unwrap();
        let second = sink.deliver(delivery("Pack-1.zip", b"second")).unwrap();

        let out = dir.path().join("out");
        assert_eq!(first, out.join("Pack-1.zip").display().to_string());
        assert_eq!(second, out.join("Pack-1_1.zip").display().to_string());
        assert_eq!(std::fs::read(out.join("Pack-1.zip")).unwrap(), b"first");
        assert_eq!(std::fs::read(out.join("Pack-1_1.zip")).unwrap(), b"second");
    }

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.deliver(delivery("a.png", b"a")).unwrap();
        sink.deliver(delivery("b.png", b"b")).unwrap();
        let names: Vec<_> = sink.deliveries().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
        assert_eq!(sink.len(), 2);
    }
}
