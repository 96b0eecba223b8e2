use bytes::Bytes;
use cf_core::{AdapterKind, ConversionOptions, ConversionOutput, Error, ErrorKind, InputFile, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
    /// Reserved for a global pause; no transition enters it.
    Paused,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Why a job ended in `error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<&Error> for JobError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.retryable(),
        }
    }
}

/// One file's journey through the queue.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub file: InputFile,
    /// The adapter tag the job was submitted with.
    pub adapter_tag: String,
    /// `None` when `adapter_tag` named no known adapter.
    pub options: Option<ConversionOptions>,
    pub status: JobStatus,
    pub progress: u8,
    pub priority: u8,
    pub result: Option<ConversionOutput>,
    pub error: Option<JobError>,
    pub added_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub downloaded_at: Option<DateTime<Utc>>,
    /// Insertion order, for FIFO tie-breaking.
    pub(crate) seq: u64,
    /// Completion order, for "oldest first" bundling.
    pub(crate) completion_seq: Option<u64>,
    /// Included in a bundle that is being assembled right now.
    pub(crate) delivering: bool,
}

impl JobRecord {
    pub(crate) fn new(
        file: InputFile,
        adapter_tag: String,
        options: Option<ConversionOptions>,
        priority: u8,
        seq: u64,
    ) -> Self {
        Self {
            id: JobId::new(),
            file,
            adapter_tag,
            options,
            status: JobStatus::Pending,
            progress: 0,
            priority,
            result: None,
            error: None,
            added_at: Utc::now(),
            started_at: None,
            completed_at: None,
            downloaded_at: None,
            seq,
            completion_seq: None,
            delivering: false,
        }
    }

    pub fn adapter_kind(&self) -> Option<AdapterKind> {
        self.options.as_ref().map(ConversionOptions::kind)
    }

    /// Completed, not yet delivered, and not part of a bundle in progress.
    pub fn is_owed(&self) -> bool {
        self.status == JobStatus::Completed && self.downloaded_at.is_none() && !self.delivering
    }

    /// Output bytes, if completed.
    pub fn output_bytes(&self) -> Option<&Bytes> {
        self.result.as_ref().map(|r| &r.bytes)
    }

    pub(crate) fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.progress = 0;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Raise progress; never lowers it and only applies while processing.
    pub(crate) fn update_progress(&mut self, progress: u8) -> bool {
        let progress = progress.min(100);
        if self.status != JobStatus::Processing || progress <= self.progress {
            return false;
        }
        self.progress = progress;
        true
    }

    pub(crate) fn complete(&mut self, output: ConversionOutput, completion_seq: u64) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(output);
        self.error = None;
        self.completed_at = Some(Utc::now());
        self.completion_seq = Some(completion_seq);
    }

    pub(crate) fn fail(&mut self, err: &Error) {
        self.status = JobStatus::Error;
        self.result = None;
        self.error = Some(JobError::from(err));
        self.completed_at = Some(Utc::now());
        self.completion_seq = None;
    }

    /// `error` back to `pending`. `downloaded_at` is left alone.
    pub(crate) fn reset_for_retry(&mut self) {
        self.status = JobStatus::Pending;
        self.progress = 0;
        self.error = None;
        self.result = None;
        self.completed_at = None;
        self.completion_seq = None;
    }

    pub(crate) fn mark_downloaded(&mut self, at: DateTime<Utc>) {
        self.delivering = false;
        if self.completed_at.is_some() {
            self.downloaded_at = Some(at);
        }
    }
}

/// Counts by status, plus how many completed outputs are still owed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
    pub paused: usize,
    pub owed: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.error + self.paused
    }

    pub(crate) fn record(&mut self, job: &JobRecord) {
        match job.status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Error => self.error += 1,
            JobStatus::Paused => self.paused += 1,
        }
        if job.status == JobStatus::Completed && job.downloaded_at.is_none() {
            self.owed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(
            InputFile::new("a.png", vec![1, 2, 3]),
            "image".into(),
            Some(ConversionOptions::defaults(AdapterKind::Image)),
            5,
            0,
        )
    }

    #[test]
    fn new_record_is_pending() {
        let job = record();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.result.is_none() && job.error.is_none());
        assert_eq!(job.adapter_kind(), Some(AdapterKind::Image));
    }

    #[test]
    fn progress_is_monotonic_and_only_while_processing() {
        let mut job = record();
        assert!(!job.update_progress(10));
        job.start();
        assert!(job.update_progress(40));
        assert!(!job.update_progress(30));
        assert_eq!(job.progress, 40);
        assert!(job.update_progress(250));
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn terminal_states_are_exclusive() {
        let mut job = record();
        job.start();
        job.complete(ConversionOutput::new("a.jpg", vec![9]), 1);
        assert!(job.result.is_some() && job.error.is_none());
        assert!(job.is_owed());

        job.fail(&Error::adapter("image", "boom"));
        assert!(job.result.is_none() && job.error.is_some());
        assert!(!job.is_owed());
    }

    #[test]
    fn retry_reset_keeps_downloaded_at() {
        let mut job = record();
        job.start();
        job.complete(ConversionOutput::new("a.jpg", vec![9]), 1);
        let at = Utc::now();
        job.mark_downloaded(at);
        job.fail(&Error::adapter("image", "x"));

        job.reset_for_retry();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.error.is_none());
        assert_eq!(job.downloaded_at, Some(at));
    }

    #[test]
    fn started_at_is_first_start() {
        let mut job = record();
        job.start();
        let first = job.started_at;
        job.fail(&Error::adapter("image", "x"));
        job.reset_for_retry();
        job.start();
        assert_eq!(job.started_at, first);
    }

    #[test]
    fn stats_count_owed() {
        let mut a = record();
        a.start();
        a.complete(ConversionOutput::new("a.jpg", vec![]), 1);
        let b = record();

        let mut stats = QueueStats::default();
        stats.record(&a);
        stats.record(&b);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.owed, 1);
        assert_eq!(stats.total(), 2);
    }
}
