//! Export job driving and progress reporting.
//!
//! [`ExportDriver::start`] runs one encode on the blocking pool and spawns a
//! monitor task that owns the job's callbacks. The monitor polls the
//! backend's progress on a fixed interval, then publishes the job's
//! terminal state and delivers exactly one completion.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mediamark_common::error::{MediamarkError, MediamarkResult};
use mediamark_composition::{Composition, RenderGraph};
use mediamark_media_model::{MediaProcessResult, ProcessOutcome};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::temp_output;

/// Identifier of one export job.
pub type JobId = u64;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Largest progress value reported before the encode has finished.
const MAX_INTERMEDIATE_PROGRESS: f32 = 0.999;

/// Default interval between progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Encoder quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPreset {
    #[default]
    HighestQuality,
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    Mp4,
}

impl ContainerFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
        }
    }
}

/// Everything a backend needs to produce one output file.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub render_graph: RenderGraph,
    pub composition: Composition,
    pub output_path: PathBuf,
    pub preset: ExportPreset,
    pub container: ContainerFormat,
}

impl ExportRequest {
    /// A highest-quality MP4 export to `output_path`.
    pub fn new(
        render_graph: RenderGraph,
        composition: Composition,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            render_graph,
            composition,
            output_path: output_path.into(),
            preset: ExportPreset::HighestQuality,
            container: ContainerFormat::Mp4,
        }
    }
}

/// Status of the encode as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ExportStatus {
    Waiting = 0,
    Exporting = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
}

impl ExportStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExportStatus::Waiting,
            1 => ExportStatus::Exporting,
            2 => ExportStatus::Completed,
            3 => ExportStatus::Failed,
            _ => ExportStatus::Cancelled,
        }
    }

    /// Whether progress should still be polled.
    pub fn is_active(&self) -> bool {
        matches!(self, ExportStatus::Waiting | ExportStatus::Exporting)
    }
}

#[derive(Debug)]
struct MonitorInner {
    status: AtomicU8,
    progress: AtomicU32,
    cancelled: AtomicBool,
}

/// Shared view of a running encode.
///
/// The backend writes status and progress; the driver reads them on each
/// tick. The cancel flag flows the other way.
#[derive(Debug, Clone)]
pub struct ExportMonitor {
    inner: Arc<MonitorInner>,
}

impl Default for ExportMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                status: AtomicU8::new(ExportStatus::Waiting as u8),
                progress: AtomicU32::new(0f32.to_bits()),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn status(&self) -> ExportStatus {
        ExportStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: ExportStatus) {
        self.inner.status.store(status as u8, Ordering::Release);
    }

    /// Latest backend progress in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.inner.progress.load(Ordering::Acquire))
    }

    pub fn set_progress(&self, progress: f32) {
        if progress.is_nan() {
            return;
        }
        let clamped = progress.clamp(0.0, 1.0);
        self.inner.progress.store(clamped.to_bits(), Ordering::Release);
    }

    /// Ask the backend to stop. Safe to call at any time.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}

/// Encoder that turns an [`ExportRequest`] into a file.
///
/// `export` runs on a blocking worker. Implementations update the monitor's
/// status and progress as they go and should return
/// [`MediamarkError::ExportCancelled`] soon after the cancel flag is set.
pub trait ExportBackend: Send + Sync {
    fn export(&self, request: &ExportRequest, monitor: &ExportMonitor) -> MediamarkResult<()>;

    /// Check if this backend can run on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Lifecycle of one job as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportState {
    Idle,
    Exporting,
    Completed,
    Failed,
    Cancelled,
}

impl ExportState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExportState::Completed | ExportState::Failed | ExportState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportState::Idle => "idle",
            ExportState::Exporting => "exporting",
            ExportState::Completed => "completed",
            ExportState::Failed => "failed",
            ExportState::Cancelled => "cancelled",
        }
    }
}

/// Caller's handle on a started export.
#[derive(Debug, Clone)]
pub struct ExportHandle {
    id: JobId,
    started_at: DateTime<Utc>,
    output_path: PathBuf,
    monitor: ExportMonitor,
    state: watch::Receiver<ExportState>,
}

impl ExportHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Request cancellation. No effect once the job has finished.
    pub fn cancel(&self) {
        if self.is_finished() {
            return;
        }
        tracing::info!(job = self.id, "Export cancellation requested");
        self.monitor.cancel();
    }

    pub fn state(&self) -> ExportState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Latest raw backend progress.
    pub fn progress(&self) -> f32 {
        self.monitor.progress()
    }

    /// Wait until the job reaches a terminal state. The completion callback
    /// runs right after the state is published.
    pub async fn finished(&self) -> ExportState {
        let mut state = self.state.clone();
        let reached = state.wait_for(ExportState::is_terminal).await.map(|s| *s);
        reached.unwrap_or_else(|_| *state.borrow())
    }
}

/// Clamps backend progress into the reported sequence: non-decreasing and
/// below 1.0 until the encode has finished.
#[derive(Debug, Default)]
struct ProgressReporter {
    last: f32,
}

impl ProgressReporter {
    fn next(&mut self, raw: f32) -> f32 {
        if !raw.is_nan() {
            let capped = raw.clamp(0.0, MAX_INTERMEDIATE_PROGRESS);
            if capped > self.last {
                self.last = capped;
            }
        }
        self.last
    }
}

/// Starts export jobs against one backend.
#[derive(Clone)]
pub struct ExportDriver {
    backend: Arc<dyn ExportBackend>,
    progress_interval: Duration,
}

impl std::fmt::Debug for ExportDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportDriver")
            .field("backend", &self.backend.name())
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}

impl ExportDriver {
    pub fn new(backend: Arc<dyn ExportBackend>) -> Self {
        Self {
            backend,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn backend(&self) -> &dyn ExportBackend {
        self.backend.as_ref()
    }

    /// Start exporting `request`.
    ///
    /// `on_progress` receives values in `[0, 1]`; `on_complete` runs exactly
    /// once. Both run on the job's monitor task, never concurrently. Must be
    /// called from within a Tokio runtime.
    pub fn start<P, C>(&self, request: ExportRequest, on_progress: P, on_complete: C) -> ExportHandle
    where
        P: FnMut(f32) + Send + 'static,
        C: FnOnce(ProcessOutcome) + Send + 'static,
    {
        let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let monitor = ExportMonitor::new();
        let (state_tx, state_rx) = watch::channel(ExportState::Idle);

        let handle = ExportHandle {
            id,
            started_at: Utc::now(),
            output_path: request.output_path.clone(),
            monitor: monitor.clone(),
            state: state_rx,
        };

        tracing::info!(
            job = id,
            backend = self.backend.name(),
            output = %request.output_path.display(),
            preset = ?request.preset,
            container = request.container.extension(),
            "Starting export"
        );

        let job = ExportJob {
            id,
            backend: Arc::clone(&self.backend),
            request,
            monitor,
            interval: self.progress_interval,
            state: state_tx,
        };
        tokio::spawn(job.run(on_progress, on_complete));

        handle
    }
}

/// One in-flight encode, owned by its monitor task.
struct ExportJob {
    id: JobId,
    backend: Arc<dyn ExportBackend>,
    request: ExportRequest,
    monitor: ExportMonitor,
    interval: Duration,
    state: watch::Sender<ExportState>,
}

impl ExportJob {
    async fn run<P, C>(self, mut on_progress: P, on_complete: C)
    where
        P: FnMut(f32) + Send + 'static,
        C: FnOnce(ProcessOutcome) + Send + 'static,
    {
        let ExportJob {
            id,
            backend,
            request,
            monitor,
            interval,
            state,
        } = self;
        let output_path = request.output_path.clone();

        if let Err(err) = temp_output::prepare(&output_path) {
            tracing::error!(job = id, error = %err, "Could not prepare output path");
            monitor.set_status(ExportStatus::Failed);
            state.send_replace(ExportState::Failed);
            on_complete(Err(err));
            return;
        }

        monitor.set_status(ExportStatus::Waiting);
        state.send_replace(ExportState::Exporting);
        let started = std::time::Instant::now();

        let mut encode = {
            let monitor = monitor.clone();
            tokio::task::spawn_blocking(move || backend.export(&request, &monitor))
        };

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reporter = ProgressReporter::default();

        let joined = loop {
            tokio::select! {
                biased;
                joined = &mut encode => break joined,
                _ = ticker.tick() => {
                    if monitor.status().is_active() {
                        on_progress(reporter.next(monitor.progress()));
                    }
                }
            }
        };

        let result = joined.unwrap_or_else(|e| {
            Err(MediamarkError::export_backend(format!(
                "export worker stopped unexpectedly: {e}"
            )))
        });

        let elapsed_secs = started.elapsed().as_secs_f64();
        let outcome = match result {
            Ok(()) if !monitor.is_cancelled() => Ok(()),
            Ok(()) => Err(MediamarkError::ExportCancelled),
            Err(err) if monitor.is_cancelled() || err.is_cancellation() => {
                if !err.is_cancellation() {
                    tracing::debug!(job = id, error = %err, "Backend error after cancellation");
                }
                Err(MediamarkError::ExportCancelled)
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                monitor.set_status(ExportStatus::Completed);
                tracing::info!(
                    job = id,
                    output = %output_path.display(),
                    elapsed_secs,
                    "Export finished"
                );
                on_progress(1.0);
                state.send_replace(ExportState::Completed);
                on_complete(Ok(MediaProcessResult::video(output_path)));
            }
            Err(err) if err.is_cancellation() => {
                monitor.set_status(ExportStatus::Cancelled);
                temp_output::discard(&output_path);
                tracing::info!(job = id, elapsed_secs, "Export cancelled");
                state.send_replace(ExportState::Cancelled);
                on_complete(Err(err));
            }
            Err(err) => {
                monitor.set_status(ExportStatus::Failed);
                temp_output::discard(&output_path);
                tracing::error!(job = id, error = %err, elapsed_secs, "Export failed");
                state.send_replace(ExportState::Failed);
                on_complete(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_is_monotonic_and_below_one() {
        let mut reporter = ProgressReporter::default();
        assert_eq!(reporter.next(0.4), 0.4);
        assert_eq!(reporter.next(0.2), 0.4);
        assert_eq!(reporter.next(f32::NAN), 0.4);
        assert_eq!(reporter.next(1.0), MAX_INTERMEDIATE_PROGRESS);
        assert_eq!(reporter.next(-3.0), MAX_INTERMEDIATE_PROGRESS);
    }

    #[test]
    fn test_monitor_status_roundtrip() {
        let monitor = ExportMonitor::new();
        assert_eq!(monitor.status(), ExportStatus::Waiting);
        for status in [
            ExportStatus::Exporting,
            ExportStatus::Completed,
            ExportStatus::Failed,
            ExportStatus::Cancelled,
        ] {
            monitor.set_status(status);
            assert_eq!(monitor.status(), status);
        }
        assert!(!ExportStatus::Cancelled.is_active());
    }

    #[test]
    fn test_monitor_clamps_progress() {
        let monitor = ExportMonitor::new();
        monitor.set_progress(1.7);
        assert_eq!(monitor.progress(), 1.0);
        monitor.set_progress(f32::NAN);
        assert_eq!(monitor.progress(), 1.0);
        monitor.set_progress(-0.5);
        assert_eq!(monitor.progress(), 0.0);
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let monitor = ExportMonitor::new();
        let clone = monitor.clone();
        clone.cancel();
        assert!(monitor.is_cancelled());
    }
}
