//! The queue engine.
//!
//! A [`Scheduler`] owns every [`JobRecord`] and is their only writer. Pending
//! jobs are admitted in batches of at most `max_concurrent` (highest priority
//! first, FIFO among equals); a batch runs concurrently and must fully settle
//! before the next one is selected. Completed outputs are handed to the bulk
//! packager according to the active [`DeliveryPolicy`].

use std::any::Any;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use cf_adapters::{ConversionBackend, ProgressSender};
use cf_bundle::{build_delivery, BundleItem, BundleTrigger, DeliveryPolicy, DeliverySink};
use cf_core::config::{clamp_priority, Config, LimitsConfig};
use cf_core::events::{Event, EventBus, EventPayload};
use cf_core::{
    AdapterKind, BundleId, ConversionOptions, ConversionOutput, Error, InputFile, JobId, Result,
};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};

use crate::job::{JobRecord, JobStatus, QueueStats};

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

/// Tunables for a [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on jobs in `processing`.
    pub max_concurrent: usize,
    /// Priority given to new jobs (1-10).
    pub default_priority: u8,
    pub policy: DeliveryPolicy,
    /// Threshold for [`DeliveryPolicy::Pack10`].
    pub pack_size: usize,
    /// Deflate level for bundle archives.
    pub compression_level: u32,
    /// Per-kind input checks applied before an adapter is invoked.
    pub limits: LimitsConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            default_priority: 5,
            policy: DeliveryPolicy::Pack10,
            pack_size: 10,
            compression_level: 6,
            limits: LimitsConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Derive scheduler settings from the application config.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            max_concurrent: config.queue.effective_max_concurrent(),
            default_priority: config.queue.effective_default_priority(),
            policy: config.delivery.policy.parse()?,
            pack_size: config.delivery.pack_size.max(1),
            compression_level: config.delivery.compression_level.min(9),
            limits: config.limits.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct State {
    jobs: HashMap<JobId, JobRecord>,
    next_seq: u64,
    next_completion_seq: u64,
    pack_counter: u64,
    policy: DeliveryPolicy,
    /// A drain task is running.
    draining: bool,
}

impl State {
    fn count(&self, status: JobStatus) -> usize {
        self.jobs.values().filter(|j| j.status == status).count()
    }

    /// Up to `max` pending jobs: highest priority first, then oldest.
    fn select_batch(&self, max: usize) -> Vec<JobId> {
        let mut pending: Vec<&JobRecord> = self
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .collect();
        pending.sort_by_key(|j| (Reverse(j.priority), j.seq));
        pending.into_iter().take(max).map(|j| j.id).collect()
    }

    /// Owed jobs, oldest completion first.
    fn owed(&self) -> Vec<&JobRecord> {
        let mut owed: Vec<&JobRecord> = self.jobs.values().filter(|j| j.is_owed()).collect();
        owed.sort_by_key(|j| j.completion_seq);
        owed
    }
}

/// A bundle selected for delivery; its jobs are flagged as delivering.
struct BundlePlan {
    id: BundleId,
    name: String,
    job_ids: Vec<JobId>,
    items: Vec<BundleItem>,
}

/// A job handed to an adapter.
struct Dispatch {
    id: JobId,
    file: InputFile,
    adapter_tag: String,
    options: Option<ConversionOptions>,
}

struct Inner {
    config: SchedulerConfig,
    backend: Arc<dyn ConversionBackend>,
    sink: Arc<dyn DeliverySink>,
    events: EventBus,
    state: Mutex<State>,
    idle: watch::Sender<bool>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Handle to the queue engine. Cloning is cheap; all clones share one queue.
///
/// Operations that may start work (`enqueue*`, `retry*`) spawn onto the
/// current tokio runtime.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        backend: Arc<dyn ConversionBackend>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        let (idle, _) = watch::channel(true);
        let policy = config.policy;
        Self {
            inner: Arc::new(Inner {
                config,
                backend,
                sink,
                events: EventBus::default(),
                state: Mutex::new(State {
                    jobs: HashMap::new(),
                    next_seq: 0,
                    next_completion_seq: 0,
                    pack_counter: 0,
                    policy,
                    draining: false,
                }),
                idle,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    // -- Submission ----------------------------------------------------------

    /// Queue one job per file. The adapter kind is carried by `options`.
    pub fn enqueue(
        &self,
        files: impl IntoIterator<Item = InputFile>,
        options: ConversionOptions,
    ) -> Vec<JobId> {
        let tag = options.kind().to_string();
        self.admit(files, tag, Some(options))
    }

    /// Queue jobs from a loose adapter tag and option map.
    ///
    /// An unknown tag is not an error for the caller: the jobs are created
    /// directly in `error` with an unknown-adapter detail. Options that do not
    /// fit a known kind's schema are rejected with [`Error::Validation`].
    pub fn enqueue_tagged(
        &self,
        files: impl IntoIterator<Item = InputFile>,
        adapter_tag: &str,
        options: &Map<String, Value>,
    ) -> Result<Vec<JobId>> {
        let options = match adapter_tag.parse::<AdapterKind>() {
            Ok(kind) => Some(ConversionOptions::from_json(kind, options)?),
            Err(_) => None,
        };
        Ok(self.admit(files, adapter_tag.to_string(), options))
    }

    fn admit(
        &self,
        files: impl IntoIterator<Item = InputFile>,
        adapter_tag: String,
        options: Option<ConversionOptions>,
    ) -> Vec<JobId> {
        let mut ids = Vec::new();
        let start_drain = {
            let mut state = self.inner.state.lock();
            let mut any_pending = false;
            for file in files {
                let seq = state.next_seq;
                state.next_seq += 1;
                let mut job = JobRecord::new(
                    file,
                    adapter_tag.clone(),
                    options.clone(),
                    clamp_priority(self.inner.config.default_priority as i64),
                    seq,
                );
                self.inner.events.publish(EventPayload::JobQueued {
                    job_id: job.id,
                    file_name: job.file.name.clone(),
                });

                if let Err(e) = self.preflight(&job.file, &job.adapter_tag, job.options.as_ref()) {
                    tracing::warn!(job_id = %job.id, file = %job.file.name, error = %e, "job rejected at enqueue");
                    job.fail(&e);
                    self.inner.events.publish(EventPayload::JobFailed {
                        job_id: job.id,
                        error: e.to_string(),
                    });
                } else {
                    any_pending = true;
                }

                ids.push(job.id);
                state.jobs.insert(job.id, job);
            }
            any_pending && self.claim_drain(&mut state)
        };

        tracing::info!(count = ids.len(), adapter = %adapter_tag, "jobs enqueued");
        if start_drain {
            self.spawn_drain();
        }
        ids
    }

    /// Checks that run before any adapter is invoked.
    fn preflight(
        &self,
        file: &InputFile,
        adapter_tag: &str,
        options: Option<&ConversionOptions>,
    ) -> Result<()> {
        match options {
            None => Err(Error::UnknownAdapterKind(adapter_tag.to_string())),
            Some(options) => self.inner.config.limits.check(options.kind(), file),
        }
    }

    // -- Job management ------------------------------------------------------

    /// Move an `error` job back to `pending`.
    pub fn retry(&self, id: JobId) -> Result<()> {
        let start_drain = {
            let mut state = self.inner.state.lock();
            let job = state
                .jobs
                .get_mut(&id)
                .ok_or_else(|| Error::not_found("job", id))?;
            if job.status != JobStatus::Error {
                return Err(Error::InvalidState(format!(
                    "only failed jobs can be retried; job {id} is {}",
                    job.status
                )));
            }
            job.reset_for_retry();
            self.inner.events.publish(EventPayload::JobRetried { job_id: id });
            self.claim_drain(&mut state)
        };

        tracing::info!(job_id = %id, "job retried");
        if start_drain {
            self.spawn_drain();
        }
        Ok(())
    }

    /// Retry every job in `error`. Returns how many were reset.
    pub fn retry_all_failed(&self) -> usize {
        let (count, start_drain) = {
            let mut state = self.inner.state.lock();
            let mut count = 0;
            for job in state.jobs.values_mut().filter(|j| j.status == JobStatus::Error) {
                job.reset_for_retry();
                self.inner.events.publish(EventPayload::JobRetried { job_id: job.id });
                count += 1;
            }
            let start = count > 0 && self.claim_drain(&mut state);
            (count, start)
        };

        if count > 0 {
            tracing::info!(count, "failed jobs retried");
        }
        if start_drain {
            self.spawn_drain();
        }
        count
    }

    /// Set a job's priority, clamped to 1-10. Returns the stored value.
    ///
    /// Only affects future batch selection.
    pub fn set_priority(&self, id: JobId, priority: i64) -> Result<u8> {
        let mut state = self.inner.state.lock();
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("job", id))?;
        job.priority = clamp_priority(priority);
        tracing::debug!(job_id = %id, priority = job.priority, "priority updated");
        Ok(job.priority)
    }

    /// Shallow-merge `patch` into the options of every pending job of `kind`.
    ///
    /// All-or-nothing: if the patch does not fit the schema, no job changes.
    /// Returns the number of jobs updated.
    pub fn update_options(&self, kind: AdapterKind, patch: &Map<String, Value>) -> Result<usize> {
        let mut state = self.inner.state.lock();

        let mut updated = Vec::new();
        for job in state.jobs.values() {
            if job.status != JobStatus::Pending || job.adapter_kind() != Some(kind) {
                continue;
            }
            if let Some(options) = &job.options {
                let mut merged = options.clone();
                merged.merge_patch(patch)?;
                updated.push((job.id, merged));
            }
        }

        let count = updated.len();
        for (id, options) in updated {
            if let Some(job) = state.jobs.get_mut(&id) {
                job.options = Some(options);
            }
        }
        tracing::debug!(adapter = %kind, count, "options updated");
        Ok(count)
    }

    /// Remove a job.
    ///
    /// A `processing` job may be removed; its adapter call keeps running, its
    /// concurrency slot stays occupied until the call settles, and the late
    /// result is discarded.
    pub fn remove(&self, id: JobId) -> Result<JobRecord> {
        let mut state = self.inner.state.lock();
        let job = state
            .jobs
            .remove(&id)
            .ok_or_else(|| Error::not_found("job", id))?;
        if job.status == JobStatus::Processing {
            tracing::warn!(job_id = %id, "removed job while processing; its result will be discarded");
        }
        self.inner.events.publish(EventPayload::JobRemoved { job_id: id });
        Ok(job)
    }

    /// Remove all `completed` jobs. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        self.clear_where(|j| j.status == JobStatus::Completed)
    }

    /// Remove all `error` jobs. Returns how many were removed.
    pub fn clear_errors(&self) -> usize {
        self.clear_where(|j| j.status == JobStatus::Error)
    }

    /// Remove every job, reset pack numbering and release adapter sessions.
    pub fn clear_all(&self) -> usize {
        let removed = self.clear_where(|_| true);
        {
            let mut state = self.inner.state.lock();
            state.pack_counter = 0;
            state.next_completion_seq = 0;
        }
        self.inner.backend.release();
        tracing::info!(removed, "queue cleared");
        removed
    }

    fn clear_where(&self, predicate: impl Fn(&JobRecord) -> bool) -> usize {
        let mut state = self.inner.state.lock();
        let ids: Vec<JobId> = state
            .jobs
            .values()
            .filter(|j| predicate(*j))
            .map(|j| j.id)
            .collect();
        for id in &ids {
            if let Some(job) = state.jobs.remove(id) {
                if job.status == JobStatus::Processing {
                    tracing::warn!(job_id = %id, "cleared job while processing; its result will be discarded");
                }
                self.inner.events.publish(EventPayload::JobRemoved { job_id: *id });
            }
        }
        ids.len()
    }

    // -- Delivery ------------------------------------------------------------

    pub fn set_delivery_policy(&self, policy: DeliveryPolicy) {
        self.inner.state.lock().policy = policy;
        tracing::info!(%policy, "delivery policy changed");
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        self.inner.state.lock().policy
    }

    /// Deliver every owed output now, regardless of policy thresholds.
    /// Returns how many jobs the delivery covered (0 if nothing was owed or
    /// the bundle failed).
    ///
    /// The delivery runs on its own task, so dropping the returned future
    /// does not leave the selected jobs flagged as delivering.
    pub async fn trigger_bulk_delivery(&self) -> usize {
        let this = self.clone();
        let task = tokio::spawn(async move {
            match this.plan_bundle(BundleTrigger::Manual) {
                Some(plan) => this.run_bundle(plan).await,
                None => 0,
            }
        });
        task.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "manual delivery task failed");
            0
        })
    }

    // -- Queries -------------------------------------------------------------

    pub fn job(&self, id: JobId) -> Option<JobRecord> {
        self.inner.state.lock().jobs.get(&id).cloned()
    }

    /// All jobs in insertion order.
    pub fn jobs(&self) -> Vec<JobRecord> {
        let state = self.inner.state.lock();
        let mut jobs: Vec<JobRecord> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.seq);
        jobs
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        let mut stats = QueueStats::default();
        for job in state.jobs.values() {
            stats.record(job);
        }
        stats
    }

    /// No drain is running.
    pub fn is_idle(&self) -> bool {
        *self.inner.idle.borrow()
    }

    /// Resolve once no drain is running, including the end-of-drain delivery.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|idle| *idle).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    // -- Draining ------------------------------------------------------------

    /// Mark a drain as started if none is running. Must be called with the
    /// state lock held so idleness flips atomically with `draining`.
    fn claim_drain(&self, state: &mut State) -> bool {
        if state.draining {
            return false;
        }
        state.draining = true;
        self.inner.idle.send_replace(false);
        true
    }

    fn spawn_drain(&self) {
        let this = self.clone();
        tokio::spawn(async move { this.drain().await });
    }

    async fn drain(&self) {
        tracing::debug!("drain started");
        loop {
            while let Some(batch) = self.start_batch() {
                futures::future::join_all(batch.into_iter().map(|d| self.process_one(d))).await;
            }

            self.deliver(BundleTrigger::Drained).await;

            if self.finish_drain() {
                self.inner.events.publish(EventPayload::QueueIdle);
                tracing::debug!("drain finished; queue idle");
                return;
            }
        }
    }

    /// Select the next batch and move it to `processing`.
    fn start_batch(&self) -> Option<Vec<Dispatch>> {
        let mut state = self.inner.state.lock();
        let ids = state.select_batch(self.inner.config.max_concurrent.max(1));
        if ids.is_empty() {
            return None;
        }

        let mut batch = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = state.jobs.get_mut(&id) {
                job.start();
                self.inner.events.publish(EventPayload::JobStarted { job_id: id });
                tracing::debug!(job_id = %id, file = %job.file.name, priority = job.priority, "job started");
                batch.push(Dispatch {
                    id,
                    file: job.file.clone(),
                    adapter_tag: job.adapter_tag.clone(),
                    options: job.options.clone(),
                });
            }
        }
        Some(batch)
    }

    /// Clear `draining` if nothing is pending. Returns whether the drain is
    /// over.
    fn finish_drain(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.count(JobStatus::Pending) > 0 {
            return false;
        }
        state.draining = false;
        self.inner.idle.send_replace(true);
        true
    }

    async fn process_one(&self, dispatch: Dispatch) {
        let Dispatch {
            id,
            file,
            adapter_tag,
            options,
        } = dispatch;

        let outcome = match self.preflight(&file, &adapter_tag, options.as_ref()) {
            Err(e) => Err(e),
            Ok(()) => match options {
                Some(options) => self.invoke(id, &file, &options).await,
                None => Err(Error::UnknownAdapterKind(adapter_tag)),
            },
        };

        if self.settle(id, outcome) {
            self.deliver(BundleTrigger::Completion).await;
        }
    }

    /// Call the backend, turning a panic into an adapter error.
    async fn invoke(&self, id: JobId, file: &InputFile, options: &ConversionOptions) -> Result<ConversionOutput> {
        let progress = self.progress_sender(id);
        let call = self.inner.backend.convert(file, options, progress);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(Error::adapter(
                options.kind(),
                format!("adapter panicked: {}", panic_message(panic.as_ref())),
            )),
        }
    }

    fn progress_sender(&self, id: JobId) -> ProgressSender {
        let inner = Arc::clone(&self.inner);
        ProgressSender::new(move |pct, step| {
            let mut state = inner.state.lock();
            if let Some(job) = state.jobs.get_mut(&id) {
                if job.update_progress(pct as u8) {
                    tracing::trace!(job_id = %id, progress = job.progress, step, "progress");
                    inner.events.publish(EventPayload::JobProgress {
                        job_id: id,
                        progress: job.progress,
                    });
                }
            }
        })
    }

    /// Record the adapter outcome. Returns `true` if the job completed.
    fn settle(&self, id: JobId, outcome: Result<ConversionOutput>) -> bool {
        let mut state = self.inner.state.lock();
        let completion_seq = state.next_completion_seq;

        let Some(job) = state.jobs.get_mut(&id) else {
            tracing::warn!(job_id = %id, "job was removed while processing; discarding result");
            return false;
        };
        if job.status != JobStatus::Processing {
            tracing::warn!(job_id = %id, status = %job.status, "job left processing early; discarding result");
            return false;
        }

        match outcome {
            Ok(output) => {
                let output_name = output.file_name.clone();
                job.complete(output, completion_seq);
                tracing::info!(job_id = %id, file = %job.file.name, output = %output_name, "job completed");
                self.inner.events.publish(EventPayload::JobCompleted {
                    job_id: id,
                    output_name,
                });
                state.next_completion_seq += 1;
                true
            }
            Err(e) => {
                job.fail(&e);
                tracing::warn!(job_id = %id, file = %job.file.name, error = %e, "job failed");
                self.inner.events.publish(EventPayload::JobFailed {
                    job_id: id,
                    error: e.to_string(),
                });
                false
            }
        }
    }

    // -- Bundling ------------------------------------------------------------

    /// Deliver whatever the policy says is due for `trigger`.
    async fn deliver(&self, trigger: BundleTrigger) {
        while let Some(plan) = self.plan_bundle(trigger) {
            let delivered = self.run_bundle(plan).await;
            // Drained takes everything in one go; a failed bundle must not be
            // retried in a loop.
            if trigger != BundleTrigger::Completion || delivered == 0 {
                break;
            }
        }
    }

    /// Pick owed jobs for a bundle and flag them as delivering.
    fn plan_bundle(&self, trigger: BundleTrigger) -> Option<BundlePlan> {
        let mut state = self.inner.state.lock();

        if trigger == BundleTrigger::Drained
            && (state.count(JobStatus::Pending) > 0 || state.count(JobStatus::Processing) > 0)
        {
            return None;
        }

        let owed_ids: Vec<JobId> = state.owed().iter().map(|j| j.id).collect();
        let policy = state.policy;
        let take = policy.batch_size(trigger, owed_ids.len(), self.inner.config.pack_size);
        if take == 0 {
            return None;
        }

        let name = if policy == DeliveryPolicy::Pack10 && take > 1 {
            state.pack_counter += 1;
            policy.bundle_name(state.pack_counter)
        } else {
            policy.bundle_name(0)
        };

        let mut job_ids = Vec::with_capacity(take);
        let mut items = Vec::with_capacity(take);
        for id in owed_ids.into_iter().take(take) {
            if let Some(job) = state.jobs.get_mut(&id) {
                if let Some(output) = &job.result {
                    job.delivering = true;
                    items.push(BundleItem::new(job.file.name.clone(), output.clone()));
                    job_ids.push(id);
                }
            }
        }

        // A lone output is delivered under its own name.
        let name = match items.as_slice() {
            [single] => single.output.file_name.clone(),
            _ => name,
        };

        Some(BundlePlan {
            id: BundleId::new(),
            name,
            job_ids,
            items,
        })
    }

    /// Build the delivery off the async runtime, hand it to the sink, and
    /// mark the jobs downloaded. Returns the number of jobs delivered.
    async fn run_bundle(&self, plan: BundlePlan) -> usize {
        let BundlePlan {
            id: bundle_id,
            name,
            job_ids,
            items,
        } = plan;

        let sink = Arc::clone(&self.inner.sink);
        let level = self.inner.config.compression_level;
        let bundle_name = name.clone();
        let result = tokio::task::spawn_blocking(move || {
            let delivery = build_delivery(&items, &bundle_name, level)?;
            let (name, job_count) = (delivery.name.clone(), delivery.job_count);
            let location = sink.deliver(delivery)?;
            Ok::<_, Error>((name, location, job_count))
        })
        .await
        .unwrap_or_else(|e| Err(Error::Internal(format!("bundle task failed: {e}"))));

        let mut state = self.inner.state.lock();
        match result {
            Ok((delivered_name, location, job_count)) => {
                let now = Utc::now();
                for id in &job_ids {
                    if let Some(job) = state.jobs.get_mut(id) {
                        job.mark_downloaded(now);
                    }
                }
                tracing::info!(bundle = %delivered_name, %location, jobs = job_count, "delivery emitted");
                self.inner.events.publish(EventPayload::BundleDelivered {
                    bundle_id,
                    name: delivered_name,
                    location,
                    job_count,
                });
                job_count
            }
            Err(e) => {
                for id in &job_ids {
                    if let Some(job) = state.jobs.get_mut(id) {
                        job.delivering = false;
                    }
                }
                tracing::error!(bundle = %name, jobs = job_ids.len(), error = %e, "bundle assembly failed; outputs remain available");
                self.inner.events.publish(EventPayload::BundleFailed {
                    bundle_id,
                    name,
                    error: e.to_string(),
                });
                0
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
