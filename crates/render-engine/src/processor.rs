//! Processing entry point: turns a [`MediaItem`] into an output file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use mediamark_common::config::{AppConfig, ExportSettings};
use mediamark_common::error::{MediamarkError, MediamarkResult};
use mediamark_composition::{
    assemble_render_graph, build_overlay_layer, compose_timeline, normalizing_transform,
    ScaleMode,
};
use mediamark_media_model::{MediaItem, MediaProcessResult, MediaType, ProcessOutcome, TrackKind};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::export::{ExportBackend, ExportDriver, ExportHandle, ExportRequest, ExportState, JobId};
use crate::ffmpeg::FfmpegBackend;
use crate::temp_output::OutputLocation;

/// Synchronous still-image watermarking.
pub trait StillImageProcessor: Send + Sync {
    /// Render `item`'s elements onto its image and write the result to
    /// `output`, returning the written path.
    fn process(&self, item: &MediaItem, output: &Path) -> MediamarkResult<PathBuf>;
}

/// Snapshot of a registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub started_at: DateTime<Utc>,
    pub output_path: PathBuf,
    pub state: ExportState,
    pub progress: f32,
}

impl From<&ExportHandle> for JobInfo {
    fn from(handle: &ExportHandle) -> Self {
        Self {
            id: handle.id(),
            started_at: handle.started_at(),
            output_path: handle.output_path().to_path_buf(),
            state: handle.state(),
            progress: handle.progress(),
        }
    }
}

/// Tracks the processor's one active export.
#[derive(Debug, Default)]
pub struct JobRegistry {
    current: Mutex<Option<ExportHandle>>,
}

impl JobRegistry {
    fn slot(&self) -> MutexGuard<'_, Option<ExportHandle>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle of the job that is still running, if any.
    pub fn active(&self) -> Option<ExportHandle> {
        self.slot().as_ref().filter(|h| !h.is_finished()).cloned()
    }

    /// Most recent job, finished or not.
    pub fn latest(&self) -> Option<JobInfo> {
        self.slot().as_ref().map(JobInfo::from)
    }
}

/// Front door for overlay processing.
///
/// Video items are composed and exported asynchronously; at most one
/// export runs at a time and further requests are rejected until it
/// finishes. Image items go to the installed [`StillImageProcessor`].
pub struct MediaProcessor {
    driver: ExportDriver,
    settings: ExportSettings,
    output: OutputLocation,
    still_images: Option<Arc<dyn StillImageProcessor>>,
    registry: JobRegistry,
}

impl std::fmt::Debug for MediaProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaProcessor")
            .field("driver", &self.driver)
            .field("output", &self.output)
            .field("still_images", &self.still_images.is_some())
            .finish()
    }
}

impl MediaProcessor {
    pub fn new(backend: Arc<dyn ExportBackend>, config: &AppConfig) -> Self {
        let driver =
            ExportDriver::new(backend).with_progress_interval(config.export.progress_interval());
        Self {
            driver,
            settings: config.export.clone(),
            output: OutputLocation::from_config(&config.output),
            still_images: None,
            registry: JobRegistry::default(),
        }
    }

    /// Processor backed by the system `ffmpeg`.
    pub fn with_ffmpeg(config: &AppConfig) -> Self {
        Self::new(Arc::new(FfmpegBackend::new(config.export.clone())), config)
    }

    pub fn with_output(mut self, output: OutputLocation) -> Self {
        self.output = output;
        self
    }

    pub fn with_still_image_processor(mut self, processor: Arc<dyn StillImageProcessor>) -> Self {
        self.still_images = Some(processor);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.driver.backend().name()
    }

    /// The running export, if any.
    pub fn active_job(&self) -> Option<ExportHandle> {
        self.registry.active()
    }

    pub fn latest_job(&self) -> Option<JobInfo> {
        self.registry.latest()
    }

    /// Build the export request for a video item without starting it.
    pub fn prepare_export(&self, item: &MediaItem) -> MediamarkResult<ExportRequest> {
        let composition = compose_timeline(&item.source)?;
        let video = item.source.first_track(TrackKind::Video).ok_or_else(|| {
            MediamarkError::track_insertion("source has no video track")
        })?;

        let mode = match self.settings.scale_factor {
            Some(factor) => ScaleMode::Uniform(factor),
            None => ScaleMode::FitTarget,
        };
        let video_transform = normalizing_transform(
            &video.preferred_transform,
            video.natural_size,
            item.size,
            mode,
        );

        let overlay = build_overlay_layer(&item.elements, item.size);
        for issue in &overlay.issues {
            tracing::warn!(
                element = issue.element_index,
                error = %issue.error,
                "Overlay element will render empty"
            );
        }

        let render_graph = assemble_render_graph(
            &composition,
            &video_transform,
            overlay.layer,
            item.size,
            self.settings.frame_rate,
        );

        tracing::debug!(
            orientation = video_transform.orientation.as_str(),
            scale_x = video_transform.scale_x,
            scale_y = video_transform.scale_y,
            "Export prepared"
        );
        Ok(ExportRequest::new(render_graph, composition, self.output.resolve()))
    }

    /// Process `item`, reporting progress and delivering exactly one
    /// completion.
    ///
    /// Returns the job handle when an export was started. Every other
    /// outcome (busy, invalid source, image items) completes before this
    /// returns. Must be called from within a Tokio runtime.
    pub fn process_item<P, C>(
        &self,
        item: &MediaItem,
        on_progress: P,
        on_complete: C,
    ) -> Option<ExportHandle>
    where
        P: FnMut(f32) + Send + 'static,
        C: FnOnce(ProcessOutcome) + Send + 'static,
    {
        match item.media_type {
            MediaType::Image => {
                on_complete(self.process_image(item));
                None
            }
            MediaType::Video => self.process_video(item, on_progress, on_complete),
        }
    }

    fn process_video<P, C>(
        &self,
        item: &MediaItem,
        on_progress: P,
        on_complete: C,
    ) -> Option<ExportHandle>
    where
        P: FnMut(f32) + Send + 'static,
        C: FnOnce(ProcessOutcome) + Send + 'static,
    {
        // Held until the new job is recorded so concurrent calls cannot both start.
        let mut slot = self.registry.slot();
        let running = slot.as_ref().filter(|h| !h.is_finished()).map(ExportHandle::id);
        if let Some(job_id) = running {
            drop(slot);
            tracing::warn!(job = job_id, "Export already running, rejecting request");
            on_complete(Err(MediamarkError::ExportInProgress { job_id }));
            return None;
        }

        let request = match self.prepare_export(item) {
            Ok(request) => request,
            Err(err) => {
                drop(slot);
                tracing::error!(
                    source = %item.source.location.display(),
                    error = %err,
                    "Could not build export"
                );
                on_complete(Err(err));
                return None;
            }
        };

        let handle = self.driver.start(request, on_progress, on_complete);
        *slot = Some(handle.clone());
        Some(handle)
    }

    fn process_image(&self, item: &MediaItem) -> ProcessOutcome {
        let processor = self.still_images.as_ref().ok_or_else(|| {
            MediamarkError::unsupported("no still-image processor installed")
        })?;
        let output = self.output.resolve().with_extension(
            item.source
                .location
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("png"),
        );
        crate::temp_output::prepare(&output)?;
        let written = processor.process(item, &output)?;
        tracing::info!(output = %written.display(), "Image processed");
        Ok(MediaProcessResult::image(written))
    }

    /// Process `item` and wait for the outcome.
    pub async fn process<P>(&self, item: &MediaItem, on_progress: P) -> ProcessOutcome
    where
        P: FnMut(f32) + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handle = self.process_item(item, on_progress, move |outcome| {
            let _ = tx.send(outcome);
        });
        let outcome = rx.await.unwrap_or_else(|_| {
            Err(MediamarkError::export_backend(
                "export finished without reporting an outcome",
            ))
        });
        // The job leaves the registry's active slot only once its state is terminal.
        if let Some(handle) = handle {
            handle.finished().await;
        }
        outcome
    }

    /// Cancel the running export. No-op when nothing is running.
    pub fn cancel_export(&self) {
        match self.registry.active() {
            Some(handle) => handle.cancel(),
            None => tracing::debug!("No export running, nothing to cancel"),
        }
    }
}
