//! cf-queue: the conversion job queue.
//!
//! [`Scheduler`] owns the job records, drains pending work in
//! priority-ordered batches bounded by `max_concurrent`, and hands completed
//! outputs to the bulk packager in `cf-bundle`.

pub mod job;
pub mod scheduler;

pub use job::{JobError, JobRecord, JobStatus, QueueStats};
pub use scheduler::{Scheduler, SchedulerConfig};
