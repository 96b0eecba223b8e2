//! Progress channel from an adapter back to whoever dispatched it.

use std::sync::Arc;

/// Sender for reporting progress from within adapters.
///
/// Wraps a callback that receives a progress percentage (0.0 -- 100.0) and a
/// human-readable step description. Adapters that cannot measure their
/// progress simply never call [`ProgressSender::send`].
#[derive(Clone)]
pub struct ProgressSender {
    callback: Arc<dyn Fn(f32, &str) + Send + Sync>,
}

impl ProgressSender {
    /// Create a new sender from the given callback.
    pub fn new(callback: impl Fn(f32, &str) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Create a no-op sender that discards all progress reports.
    pub fn noop() -> Self {
        Self::new(|_, _| {})
    }

    /// Report progress. Values outside 0..=100 are clamped; NaN is dropped.
    pub fn send(&self, progress: f32, step: &str) {
        if progress.is_nan() {
            return;
        }
        (self.callback)(progress.clamp(0.0, 100.0), step);
    }

    /// Report `done` out of `total` units of work.
    pub fn send_fraction(&self, done: u64, total: u64, step: &str) {
        if total == 0 {
            return;
        }
        self.send(done as f32 * 100.0 / total as f32, step);
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}
