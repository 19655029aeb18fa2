//! FFmpeg command-line export backend.
//!
//! The render graph is lowered to a single `-filter_complex` graph: the
//! source video is rotated upright and scaled into place, then every
//! visible overlay primitive is composited on top in paint order. Overlay
//! text is read from sidecar files with `expansion=none` and never passes
//! through filter syntax.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use mediamark_common::config::ExportSettings;
use mediamark_common::error::{MediamarkError, MediamarkResult};
use mediamark_composition::{Composition, Orientation, PrimitiveContent};
use mediamark_media_model::{Rect, Rgba, Size, TrackKind};

use crate::export::{ExportBackend, ExportMonitor, ExportPreset, ExportRequest, ExportStatus};
use crate::temp_output;

/// Seconds without encode progress before a stall is logged.
const STALL_WARNING_SECS: u64 = 10;

/// Exports by spawning `ffmpeg` and reading its `-progress` stream.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    settings: ExportSettings,
    binary: Option<PathBuf>,
}

impl FfmpegBackend {
    pub fn new(settings: ExportSettings) -> Self {
        Self {
            settings,
            binary: which::which("ffmpeg").ok(),
        }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Use `binary` instead of the `ffmpeg` found on `PATH`.
    pub fn with_binary(mut self, binary: Option<PathBuf>) -> Self {
        self.binary = binary;
        self
    }

    /// Resolved `ffmpeg` executable, if one is on `PATH`.
    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }

    fn run_ffmpeg(
        &self,
        args: &[String],
        expected_duration_secs: f64,
        monitor: &ExportMonitor,
    ) -> MediamarkResult<()> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| MediamarkError::export_backend("ffmpeg not found in PATH"))?;

        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut cmd = Command::new(binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = std::time::Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| MediamarkError::export_backend(format!("Failed to start ffmpeg: {e}")))?;
        monitor.set_status(ExportStatus::Exporting);

        tracing::info!(
            pid = child.id(),
            args_len = args.len(),
            expected_duration_secs,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediamarkError::export_backend("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediamarkError::export_backend("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut reader = BufReader::new(stdout);
        let mut line = String::new();

        let mut latest_progress = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = std::time::Instant::now();
        let mut cancelled = false;
        loop {
            if monitor.is_cancelled() {
                cancelled = true;
                break;
            }

            line.clear();
            let bytes = reader.read_line(&mut line).map_err(|e| {
                MediamarkError::export_backend(format!("Failed reading ffmpeg progress: {e}"))
            })?;
            if bytes == 0 {
                break;
            }

            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            latest_progress.update(key, value);
            if key != "progress" {
                continue;
            }

            if latest_progress.out_time_secs > last_progress_secs + 0.001 {
                last_progress_secs = latest_progress.out_time_secs;
                last_progress_wall = std::time::Instant::now();
            }
            monitor.set_progress(latest_progress.fraction(expected_duration_secs));

            if last_progress_wall.elapsed().as_secs() >= STALL_WARNING_SECS {
                tracing::warn!(
                    out_time_secs = latest_progress.out_time_secs,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "No ffmpeg progress advancement for {STALL_WARNING_SECS}s"
                );
                last_progress_wall = std::time::Instant::now();
            }
        }

        if cancelled {
            if let Err(e) = child.kill() {
                tracing::warn!(error = %e, "Failed to kill ffmpeg after cancellation");
            }
            let _ = child.wait();
            let _ = stderr_task.join();
            tracing::info!(
                elapsed_secs = start.elapsed().as_secs_f64(),
                "ffmpeg stopped on cancellation"
            );
            return Err(MediamarkError::ExportCancelled);
        }

        let status = child
            .wait()
            .map_err(|e| MediamarkError::export_backend(format!("Failed to wait on ffmpeg: {e}")))?;

        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(MediamarkError::export_backend(format!(
                "ffmpeg export failed (status {}): {}",
                status,
                stderr_output.trim()
            )));
        }

        tracing::debug!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            "ffmpeg exited cleanly"
        );
        Ok(())
    }
}

impl ExportBackend for FfmpegBackend {
    fn export(&self, request: &ExportRequest, monitor: &ExportMonitor) -> MediamarkResult<()> {
        let (args, plan) = build_args(request, &self.settings)?;
        let expected_duration_secs = request.render_graph.duration().as_secs();

        let result = write_text_files(&plan)
            .and_then(|()| self.run_ffmpeg(&args, expected_duration_secs, monitor));
        for text_file in &plan.text_files {
            temp_output::discard(&text_file.path);
        }
        result
    }

    fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Overlay text handed to `drawtext` through a file, so it is drawn
/// verbatim whatever characters it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFile {
    pub path: PathBuf,
    pub contents: String,
}

/// A lowered filter graph plus the extra inputs it references.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPlan {
    pub graph: String,
    /// Still images fed as looped inputs `1..`, in graph order.
    pub overlay_inputs: Vec<PathBuf>,
    /// Text files the graph reads; written before ffmpeg starts.
    pub text_files: Vec<TextFile>,
}

/// Stream index, within the source input, of the first segment of the
/// composition's `kind` track.
fn source_stream(composition: &Composition, kind: TrackKind) -> Option<u32> {
    composition
        .first_track(kind)
        .and_then(|track| track.segments.first())
        .map(|segment| segment.source_track_id)
}

/// Lower `request`'s render graph to an ffmpeg filter graph ending in
/// `[vout]`.
pub fn build_filter_graph(request: &ExportRequest, settings: &ExportSettings) -> FilterPlan {
    let graph = &request.render_graph;
    let video_input = source_stream(&request.composition, TrackKind::Video)
        .map(|id| format!("[0:{id}]"))
        .unwrap_or_else(|| "[0:v]".to_string());
    let fps = graph.frame_rate().round().max(1.0) as u32;
    let (out_w, out_h) = even_pixels(graph.render_size);
    let vt = &graph.video_transform;

    let rotate = match vt.orientation {
        Orientation::Right => "",
        Orientation::Up => "transpose=1,",
        Orientation::Down => "transpose=2,",
        Orientation::Left => "hflip,vflip,",
    };

    let placed = vt.output_rect();
    let mut chains = Vec::new();
    if placed.approx_eq(&Rect::from_size(graph.render_size), 0.5) {
        chains.push(format!(
            "{video_input}{rotate}scale={out_w}:{out_h},setsar=1,fps={fps}[base]"
        ));
    } else {
        let (vw, vh) = even_pixels(placed.size);
        chains.push(format!("color=c=black:s={out_w}x{out_h}:r={fps}[canvas]"));
        chains.push(format!(
            "{video_input}{rotate}scale={vw}:{vh},setsar=1,fps={fps}[video]"
        ));
        chains.push(format!(
            "[canvas][video]overlay=x={}:y={}:shortest=1[base]",
            placed.origin.x.round() as i64,
            placed.origin.y.round() as i64
        ));
    }

    let mut overlay_inputs = Vec::new();
    let mut text_files = Vec::new();
    let mut current = "base".to_string();
    let primitives = graph.animation.overlay.visible_primitives();
    for (stage, (primitive, _visible)) in primitives.enumerate() {
        let next = format!("s{stage}");
        let frame = primitive.frame;
        let x = frame.origin.x.round() as i64;
        let y = frame.origin.y.round() as i64;
        match &primitive.content {
            PrimitiveContent::Text(text) => {
                let font = text
                    .style
                    .font_file
                    .as_ref()
                    .or(settings.font_file.as_ref())
                    .map(|path| {
                        format!(":fontfile={}", filter_option_value(&path.to_string_lossy()))
                    })
                    .unwrap_or_default();
                let text_path = text_file_path(&request.output_path, text_files.len());
                chains.push(format!(
                    "[{current}]drawtext=textfile={}:expansion=none:x={x}:y={y}:fontsize={}:fontcolor={}{font}[{next}]",
                    filter_option_value(&text_path.to_string_lossy()),
                    text.style.font_size.round().max(1.0) as u32,
                    ffmpeg_color(text.style.color),
                ));
                text_files.push(TextFile {
                    path: text_path,
                    contents: text.text.clone(),
                });
            }
            PrimitiveContent::Bitmap { path, .. } => {
                overlay_inputs.push(path.clone());
                let input = overlay_inputs.len();
                let (w, h) = frame.size.to_pixels();
                chains.push(format!("[{input}:v]scale={w}:{h},format=rgba[ov{stage}]"));
                chains.push(format!(
                    "[{current}][ov{stage}]overlay=x={x}:y={y}:shortest=1[{next}]"
                ));
            }
            PrimitiveContent::Empty => continue,
        }
        current = next;
    }
    chains.push(format!("[{current}]format=yuv420p[vout]"));

    FilterPlan {
        graph: chains.join(";"),
        overlay_inputs,
        text_files,
    }
}

/// Sidecar file for the `index`th text overlay, next to the output.
fn text_file_path(output: &Path, index: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!(".{stem}.text{index}.txt"))
}

fn write_text_files(plan: &FilterPlan) -> MediamarkResult<()> {
    for text_file in &plan.text_files {
        std::fs::write(&text_file.path, &text_file.contents).map_err(|source| {
            MediamarkError::TempFile {
                path: text_file.path.clone(),
                source,
            }
        })?;
    }
    Ok(())
}

/// Full ffmpeg argument list for `request`, plus the plan it encodes.
pub fn build_args(
    request: &ExportRequest,
    settings: &ExportSettings,
) -> MediamarkResult<(Vec<String>, FilterPlan)> {
    let graph = &request.render_graph;
    if !graph.render_size.is_renderable() {
        return Err(MediamarkError::export_backend(format!(
            "render size {}x{} is not renderable",
            graph.render_size.width, graph.render_size.height
        )));
    }
    let duration_secs = graph.duration().as_secs();
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(MediamarkError::export_backend("composition has no duration to export"));
    }

    let plan = build_filter_graph(request, settings);
    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-nostats",
        "-loglevel",
        "error",
        "-progress",
        "pipe:1",
        "-noautorotate",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(request.composition.source.to_string_lossy().into_owned());

    for input in &plan.overlay_inputs {
        args.extend(["-loop".to_string(), "1".to_string(), "-i".to_string()]);
        args.push(input.to_string_lossy().into_owned());
    }

    args.extend([
        "-filter_complex".to_string(),
        plan.graph.clone(),
        "-map".to_string(),
        "[vout]".to_string(),
    ]);
    let audio = source_stream(&request.composition, TrackKind::Audio);
    if let Some(id) = audio {
        args.extend(["-map".to_string(), format!("0:{id}")]);
    }

    args.extend(codec_args(request.preset, settings, audio.is_some()));
    args.extend([
        "-t".to_string(),
        format!("{duration_secs:.6}"),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-f".to_string(),
        request.container.extension().to_string(),
    ]);
    args.push(request.output_path.to_string_lossy().into_owned());
    Ok((args, plan))
}

fn codec_args(preset: ExportPreset, settings: &ExportSettings, has_audio: bool) -> Vec<String> {
    let mut args = match preset {
        ExportPreset::HighestQuality => vec![
            "-c:v".to_string(),
            settings.video_codec.clone(),
            "-preset".to_string(),
            settings.preset.clone(),
            "-crf".to_string(),
            settings.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ],
    };
    if has_audio {
        args.extend([
            "-c:a".to_string(),
            settings.audio_codec.clone(),
            "-b:a".to_string(),
            format!("{}k", settings.audio_bitrate_kbps.max(64)),
        ]);
    } else {
        args.push("-an".to_string());
    }
    args
}

/// Pixel dimensions rounded down to even values, as yuv420p requires.
fn even_pixels(size: Size) -> (u32, u32) {
    let (w, h) = size.to_pixels();
    ((w / 2 * 2).max(2), (h / 2 * 2).max(2))
}

fn ffmpeg_color(color: Rgba) -> String {
    format!(
        "0x{:02x}{:02x}{:02x}@{:.3}",
        color.r,
        color.g,
        color.b,
        color.opacity()
    )
}

fn backslash_escape(raw: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape a filter option value for use inside `-filter_complex`.
///
/// The value is unescaped twice: once by the option parser and once by
/// the filtergraph parser, so it is escaped for each level in turn.
fn filter_option_value(raw: &str) -> String {
    let option_level = backslash_escape(raw, &['\\', '\'', ':']);
    backslash_escape(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, ffmpeg reports microseconds here.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn fraction(&self, expected_duration_secs: f64) -> f32 {
        if self.complete {
            return 1.0;
        }
        if expected_duration_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs / expected_duration_secs).clamp(0.0, 1.0) as f32
    }
}
