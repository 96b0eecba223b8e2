//! One-shot batch conversion: enqueue a set of files, report progress, and
//! wait for the queue to drain.

use std::path::PathBuf;

use anyhow::{Context, Result};
use cf_core::events::{Event, EventPayload};
use cf_core::InputFile;
use cf_queue::{JobStatus, Scheduler};
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;

/// What the user asked to convert.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub files: Vec<PathBuf>,
    /// Adapter tag, e.g. `image` or `raw-image`.
    pub adapter: String,
    pub options: Map<String, Value>,
}

/// Outcome of a drained batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    /// `(file name, error message)` for each failed job.
    pub failed: Vec<(String, String)>,
    /// Where the sink stored each delivery.
    pub deliveries: Vec<String>,
}

/// Parse `--options`; absent means the adapter's defaults.
pub fn parse_options(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("Failed to parse --options as JSON")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("--options must be a JSON object, got {other}"),
    }
}

/// Enqueue every file and wait until the scheduler is idle, including the
/// end-of-drain delivery.
pub async fn run_batch(scheduler: &Scheduler, request: BatchRequest) -> Result<BatchSummary> {
    let files = request
        .files
        .iter()
        .map(|path| {
            InputFile::from_path(path).with_context(|| format!("Failed to read input {:?}", path))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut events = scheduler.subscribe();
    let ids = scheduler.enqueue_tagged(files, &request.adapter, &request.options)?;
    tracing::info!(jobs = ids.len(), adapter = %request.adapter, "batch submitted");

    let mut summary = BatchSummary::default();
    let idle = scheduler.wait_idle();
    tokio::pin!(idle);
    loop {
        tokio::select! {
            _ = &mut idle => break,
            event = events.recv() => match event {
                Ok(event) => report(&event, &mut summary),
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    while let Ok(event) = events.try_recv() {
        report(&event, &mut summary);
    }

    for id in ids {
        let Some(job) = scheduler.job(id) else { continue };
        match job.status {
            JobStatus::Completed => summary.completed += 1,
            JobStatus::Error => summary.failed.push((
                job.file.name.clone(),
                job.error.map(|e| e.message).unwrap_or_default(),
            )),
            _ => {}
        }
    }

    Ok(summary)
}

fn report(event: &Event, summary: &mut BatchSummary) {
    match &event.payload {
        EventPayload::JobStarted { job_id } => tracing::debug!(%job_id, "started"),
        EventPayload::JobProgress { job_id, progress } => {
            tracing::debug!(%job_id, progress, "progress")
        }
        EventPayload::BundleDelivered { location, .. } => {
            summary.deliveries.push(location.clone())
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_empty() {
        assert!(parse_options(None).unwrap().is_empty());
    }

    #[test]
    fn options_must_be_an_object() {
        let map = parse_options(Some(r#"{"format": "webp"}"#)).unwrap();
        assert_eq!(map["format"], "webp");
        assert!(parse_options(Some("[1, 2]")).is_err());
        assert!(parse_options(Some("{oops")).is_err());
    }
}
