//! Shared test harness for integration tests.
//!
//! Provides [`ScriptedBackend`], a conversion backend whose per-file
//! behaviour (delay, failure, output, holding) is scripted by the test, and
//! [`TestHarness`], which wires it to a [`Scheduler`] with an in-memory sink.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use convertforge::adapters::{ConversionBackend, ProgressSender};
use convertforge::bundle::{Delivery, DeliveryPolicy, DeliverySink, MemorySink};
use convertforge::queue::{JobRecord, JobStatus, Scheduler, SchedulerConfig};
use convertforge::types::{
    ConversionOptions, ConversionOutput, Error, ImageOptions, InputFile, JobId, Result,
};
use zip::write::SimpleFileOptions;

/// A backend that converts `name.png` to `name.jpg` (same bytes) unless told
/// otherwise, and records how it was called.
#[derive(Default)]
pub struct ScriptedBackend {
    delay: Duration,
    failures: Mutex<HashSet<String>>,
    outputs: Mutex<HashMap<String, ConversionOutput>>,
    holds: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    released: AtomicUsize,
}

impl ScriptedBackend {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Fail every conversion of `file_name`.
    pub fn fail(&self, file_name: &str) {
        self.failures.lock().insert(file_name.to_string());
    }

    /// Stop failing `file_name`.
    pub fn heal(&self, file_name: &str) {
        self.failures.lock().remove(file_name);
    }

    /// Return `output` when converting `file_name`.
    pub fn output(&self, file_name: &str, output: ConversionOutput) {
        self.outputs.lock().insert(file_name.to_string(), output);
    }

    /// Block conversions of `file_name` until [`Self::release_hold`].
    pub fn hold(&self, file_name: &str) {
        self.holds
            .lock()
            .insert(file_name.to_string(), Arc::new(Notify::new()));
    }

    pub fn release_hold(&self, file_name: &str) {
        if let Some(notify) = self.holds.lock().get(file_name) {
            notify.notify_one();
        }
    }

    /// File names in the order conversions started.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversionBackend for ScriptedBackend {
    async fn convert(
        &self,
        file: &InputFile,
        options: &ConversionOptions,
        progress: ProgressSender,
    ) -> Result<ConversionOutput> {
        self.calls.lock().push(file.name.clone());
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let hold = self.holds.lock().get(&file.name).cloned();
        if let Some(hold) = hold {
            hold.notified().await;
        }
        progress.send(25.0, "working");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        progress.send(75.0, "finishing");

        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failures.lock().contains(&file.name) {
            return Err(Error::adapter(options.kind(), format!("cannot convert {}", file.name)));
        }
        if let Some(output) = self.outputs.lock().get(&file.name) {
            return Ok(output.clone());
        }
        Ok(ConversionOutput::new(
            format!("{}.jpg", file.base_name()),
            file.bytes.clone(),
        ))
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// A sink that always fails.
pub struct BrokenSink;

impl DeliverySink for BrokenSink {
    fn deliver(&self, _delivery: Delivery) -> Result<String> {
        Err(Error::Io {
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        })
    }
}

/// A sink that blocks for `delay` before storing or refusing a delivery.
pub struct SlowSink {
    pub delay: Duration,
    pub fail: bool,
    pub stored: MemorySink,
}

impl SlowSink {
    pub fn new(delay: Duration, fail: bool) -> Self {
        Self {
            delay,
            fail,
            stored: MemorySink::new(),
        }
    }
}

impl DeliverySink for SlowSink {
    fn deliver(&self, delivery: Delivery) -> Result<String> {
        std::thread::sleep(self.delay);
        if self.fail {
            return BrokenSink.deliver(delivery);
        }
        self.stored.deliver(delivery)
    }
}

pub struct TestHarness {
    pub scheduler: Scheduler,
    pub backend: Arc<ScriptedBackend>,
    pub sink: Arc<MemorySink>,
}

impl TestHarness {
    pub fn new(policy: DeliveryPolicy, max_concurrent: usize) -> Self {
        Self::with_backend(policy, max_concurrent, ScriptedBackend::default())
    }

    pub fn with_backend(
        policy: DeliveryPolicy,
        max_concurrent: usize,
        backend: ScriptedBackend,
    ) -> Self {
        let backend = Arc::new(backend);
        let sink = Arc::new(MemorySink::new());
        let config = SchedulerConfig {
            policy,
            max_concurrent,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(config, backend.clone(), sink.clone());
        Self {
            scheduler,
            backend,
            sink,
        }
    }

    pub fn enqueue_pngs(&self, names: &[&str]) -> Vec<JobId> {
        self.scheduler
            .enqueue(names.iter().map(|n| png(n)), image_options())
    }

    pub fn job(&self, id: JobId) -> JobRecord {
        self.scheduler.job(id).expect("job should exist")
    }

    /// Poll until the job reaches `status`, failing after two seconds.
    pub async fn wait_for_status(&self, id: JobId, status: JobStatus) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if self.scheduler.job(id).map(|j| j.status) == Some(status) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {id} never reached {status}"
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    pub fn delivery_names(&self) -> Vec<String> {
        self.sink.deliveries().into_iter().map(|d| d.name).collect()
    }
}

pub fn png(name: &str) -> InputFile {
    InputFile::new(name, name.as_bytes().to_vec())
}

pub fn image_options() -> ConversionOptions {
    ConversionOptions::Image(ImageOptions::default())
}

/// Build a zip from `(name, bytes)` pairs.
pub fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Entry names of a zip, in archive order.
pub fn zip_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}
