use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mediamark_common::config::AppConfig;
use mediamark_common::error::{ErrorKind, MediamarkError, MediamarkResult};
use mediamark_media_model::{
    AssetTrack, MediaElement, MediaItem, MediaTime, ProcessOutcome, Rect, Size, SourceAsset,
};
use mediamark_render_engine::{
    ExportBackend, ExportMonitor, ExportRequest, ExportState, ExportStatus, MediaProcessor,
    OutputLocation, StillImageProcessor,
};

/// Backend that walks through a fixed progress script instead of encoding.
struct ScriptedBackend {
    steps: Vec<f32>,
    step_delay: Duration,
    fail_with: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(steps: usize, step_delay: Duration) -> Self {
        Self {
            steps: (1..=steps).map(|i| i as f32 / steps as f32).collect(),
            step_delay,
            fail_with: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(3, Duration::from_millis(5))
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExportBackend for ScriptedBackend {
    fn export(&self, request: &ExportRequest, monitor: &ExportMonitor) -> MediamarkResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Like most encoders, refuse to overwrite.
        if request.output_path.exists() {
            return Err(MediamarkError::export_backend("output already exists"));
        }
        monitor.set_status(ExportStatus::Exporting);
        std::fs::write(&request.output_path, b"partial")?;

        for step in &self.steps {
            if monitor.is_cancelled() {
                return Err(MediamarkError::ExportCancelled);
            }
            monitor.set_progress(*step);
            std::thread::sleep(self.step_delay);
        }

        if let Some(message) = &self.fail_with {
            return Err(MediamarkError::export_backend(message.clone()));
        }
        std::fs::write(&request.output_path, format!("rendered-{call}"))?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn config_in(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.output.dir = dir.to_path_buf();
    config.output.file_name = "processed.mp4".to_string();
    config.export.progress_interval_ms = 5;
    config
}

fn video_item(with_audio: bool) -> MediaItem {
    let duration = MediaTime::new(5, 1);
    let mut asset = SourceAsset::new("/media/clip.mov", duration).with_track(AssetTrack::video(
        0,
        duration,
        Size::new(1280.0, 720.0),
    ));
    if with_audio {
        asset = asset.with_track(AssetTrack::audio(1, duration));
    }
    MediaItem::video(asset, Size::new(1280.0, 720.0))
        .with_element(MediaElement::text("WATERMARK", Rect::new(20.0, 640.0, 400.0, 60.0)))
}

fn recorder() -> (Arc<Mutex<Vec<f32>>>, impl FnMut(f32) + Send + 'static) {
    let values = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&values);
    (values, move |p| sink.lock().unwrap().push(p))
}

fn completions() -> (
    Arc<Mutex<Vec<ProcessOutcome>>>,
    impl FnOnce(ProcessOutcome) + Send + 'static,
) {
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    (outcomes, move |o| sink.lock().unwrap().push(o))
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_one() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(8, Duration::from_millis(10)));
    let processor = MediaProcessor::new(backend.clone(), &config_in(dir.path()));

    let (progress, on_progress) = recorder();
    let outcome = processor.process(&video_item(true), on_progress).await;

    let result = outcome.unwrap();
    let output = result.processed_url.clone().unwrap();
    assert_eq!(output, dir.path().join("processed.mp4"));
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "rendered-1");
    assert!(result.image.is_none());

    let values = progress.lock().unwrap().clone();
    assert!(values.len() >= 2, "expected periodic reports, got {values:?}");
    assert!(values.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(values.last().copied(), Some(1.0));
    assert_eq!(values.iter().filter(|v| **v >= 1.0).count(), 1);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn audio_less_source_exports() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(2, Duration::from_millis(1)));
    let processor = MediaProcessor::new(backend, &config_in(dir.path()));

    let (_, on_progress) = recorder();
    let result = processor.process(&video_item(false), on_progress).await.unwrap();
    assert!(result.processed_url.unwrap().exists());
}

#[tokio::test]
async fn repeat_export_replaces_previous_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("processed.mp4");
    std::fs::write(&stale, b"stale").unwrap();

    let backend = Arc::new(ScriptedBackend::new(2, Duration::from_millis(1)));
    let processor = MediaProcessor::new(backend.clone(), &config_in(dir.path()));

    for expected in ["rendered-1", "rendered-2"] {
        let (_, on_progress) = recorder();
        let result = processor.process(&video_item(true), on_progress).await.unwrap();
        assert_eq!(result.processed_url.as_deref(), Some(stale.as_path()));
        assert_eq!(std::fs::read_to_string(&stale).unwrap(), expected);
    }
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn cancel_delivers_single_completion_without_final_progress() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(500, Duration::from_millis(5)));
    let processor = MediaProcessor::new(backend, &config_in(dir.path()));

    let (progress, on_progress) = recorder();
    let (outcomes, on_complete) = completions();
    let handle = processor
        .process_item(&video_item(true), on_progress, on_complete)
        .expect("export should start");

    tokio::time::sleep(Duration::from_millis(40)).await;
    processor.cancel_export();
    assert_eq!(handle.finished().await, ExportState::Cancelled);

    // Cancelling again after the fact changes nothing.
    processor.cancel_export();
    handle.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], Err(MediamarkError::ExportCancelled)));
    assert!(progress.lock().unwrap().iter().all(|p| *p < 1.0));
    assert!(!handle.output_path().exists());
}

#[tokio::test]
async fn cancel_without_job_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let processor = MediaProcessor::new(
        Arc::new(ScriptedBackend::new(1, Duration::ZERO)),
        &config_in(dir.path()),
    );
    processor.cancel_export();
    assert!(processor.active_job().is_none());
    assert!(processor.latest_job().is_none());
}

#[tokio::test]
async fn source_without_video_fails_before_export() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(1, Duration::ZERO));
    let processor = MediaProcessor::new(backend.clone(), &config_in(dir.path()));

    let duration = MediaTime::new(3, 1);
    let item = MediaItem::video(
        SourceAsset::new("/media/voice.m4a", duration).with_track(AssetTrack::audio(0, duration)),
        Size::new(640.0, 360.0),
    );

    let (progress, on_progress) = recorder();
    let err = processor.process(&item, on_progress).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TrackInsertion);
    assert_eq!(backend.calls(), 0);
    assert!(progress.lock().unwrap().is_empty());
    assert!(!dir.path().join("processed.mp4").exists());
}

#[tokio::test]
async fn second_export_is_rejected_while_first_runs() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(20, Duration::from_millis(5)));
    let processor = MediaProcessor::new(backend.clone(), &config_in(dir.path()));

    let (_, first_progress) = recorder();
    let (first_outcomes, first_complete) = completions();
    let first = processor
        .process_item(&video_item(true), first_progress, first_complete)
        .expect("first export should start");

    let (_, second_progress) = recorder();
    let (second_outcomes, second_complete) = completions();
    let second = processor.process_item(&video_item(true), second_progress, second_complete);
    assert!(second.is_none());
    {
        let rejected = second_outcomes.lock().unwrap();
        assert_eq!(rejected.len(), 1);
        match &rejected[0] {
            Err(MediamarkError::ExportInProgress { job_id }) => assert_eq!(*job_id, first.id()),
            other => panic!("expected busy rejection, got {other:?}"),
        }
    }

    assert_eq!(first.finished().await, ExportState::Completed);
    assert!(first_outcomes.lock().unwrap()[0].is_ok());
    assert_eq!(backend.calls(), 1);

    let latest = processor.latest_job().unwrap();
    assert_eq!(latest.id, first.id());
    assert_eq!(latest.state, ExportState::Completed);
}

#[tokio::test]
async fn next_export_can_start_from_completion_callback() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(3, Duration::from_millis(2)));
    let processor = Arc::new(MediaProcessor::new(backend.clone(), &config_in(dir.path())));

    let (chained_tx, chained_rx) = tokio::sync::oneshot::channel();
    let chained = Arc::clone(&processor);
    let first_complete = move |first: ProcessOutcome| {
        let idle_during_completion = chained.active_job().is_none();
        let (_, on_progress) = recorder();
        chained.process_item(&video_item(true), on_progress, move |second| {
            let _ = chained_tx.send((first.is_ok(), idle_during_completion, second));
        });
    };

    let (_, on_progress) = recorder();
    let first = processor
        .process_item(&video_item(true), on_progress, first_complete)
        .expect("first export should start");

    let (first_ok, idle_during_completion, second) = chained_rx.await.unwrap();
    assert!(first_ok);
    assert!(idle_during_completion);
    let second = second.unwrap();
    assert_eq!(
        std::fs::read_to_string(second.processed_url.unwrap()).unwrap(),
        "rendered-2"
    );
    assert_eq!(backend.calls(), 2);

    let latest = processor.latest_job().unwrap();
    assert_ne!(latest.id, first.id());
    assert_eq!(first.state(), ExportState::Completed);
}

#[tokio::test]
async fn undeletable_output_fails_with_temp_file_error() {
    let dir = tempfile::tempdir().unwrap();
    let occupied = dir.path().join("occupied.mp4");
    std::fs::create_dir(&occupied).unwrap();

    let backend = Arc::new(ScriptedBackend::new(1, Duration::ZERO));
    let processor = MediaProcessor::new(backend.clone(), &config_in(dir.path()))
        .with_output(OutputLocation::Fixed(occupied.clone()));

    let (_, on_progress) = recorder();
    let err = processor.process(&video_item(true), on_progress).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TempFile);
    assert_eq!(backend.calls(), 0);
    assert!(occupied.is_dir());
}

#[tokio::test]
async fn backend_failure_discards_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::failing("encoder exploded"));
    let processor = MediaProcessor::new(backend, &config_in(dir.path()));

    let (progress, on_progress) = recorder();
    let err = processor.process(&video_item(true), on_progress).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExportBackend);
    assert!(err.to_string().contains("encoder exploded"));
    assert!(!dir.path().join("processed.mp4").exists());
    assert!(progress.lock().unwrap().iter().all(|p| *p < 1.0));
}

#[tokio::test]
async fn unique_outputs_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.output.unique_names = true;
    let processor = MediaProcessor::new(
        Arc::new(ScriptedBackend::new(1, Duration::from_millis(1))),
        &config,
    );

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let (_, on_progress) = recorder();
        let result = processor.process(&video_item(true), on_progress).await.unwrap();
        outputs.push(result.processed_url.unwrap());
    }
    assert_ne!(outputs[0], outputs[1]);
    assert!(outputs.iter().all(|p| p.exists()));
}

struct CopyingImageProcessor;

impl StillImageProcessor for CopyingImageProcessor {
    fn process(&self, item: &MediaItem, output: &Path) -> MediamarkResult<PathBuf> {
        std::fs::write(output, format!("{} overlays", item.elements.len()))?;
        Ok(output.to_path_buf())
    }
}

#[tokio::test]
async fn image_items_use_still_image_processor() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(1, Duration::ZERO));
    let item = MediaItem::image(
        SourceAsset::new("/media/photo.jpg", MediaTime::ZERO),
        Size::new(800.0, 600.0),
    )
    .with_element(MediaElement::text("hi", Rect::new(0.0, 0.0, 40.0, 20.0)));

    let bare = MediaProcessor::new(backend.clone(), &config_in(dir.path()));
    let (_, on_progress) = recorder();
    let err = bare.process(&item, on_progress).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);

    let processor = MediaProcessor::new(backend.clone(), &config_in(dir.path()))
        .with_still_image_processor(Arc::new(CopyingImageProcessor));
    let (_, on_progress) = recorder();
    let result = processor.process(&item, on_progress).await.unwrap();
    let image = result.image.unwrap();
    assert_eq!(image.extension().and_then(|e| e.to_str()), Some("jpg"));
    assert_eq!(std::fs::read_to_string(image).unwrap(), "1 overlays");
    assert!(result.processed_url.is_none());
    assert_eq!(backend.calls(), 0);
}
