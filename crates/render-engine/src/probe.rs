//! FFprobe-backed asset loading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use mediamark_common::error::{MediamarkError, MediamarkResult};
use mediamark_media_model::{
    AffineTransform, AssetLoader, AssetTrack, MediaTime, Size, SourceAsset, TimeRange, TrackKind,
    DEFAULT_TIMESCALE,
};
use serde::Deserialize;

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    start_time: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

impl FfprobeStream {
    /// Clockwise display rotation in degrees.
    fn clockwise_rotation(&self) -> f64 {
        // Display matrix side data is counter-clockwise; the legacy tag is clockwise.
        if let Some(rotation) = self.side_data_list.iter().find_map(|s| s.rotation) {
            return -rotation;
        }
        self.tags
            .get("rotate")
            .and_then(|r| r.parse::<f64>().ok())
            .unwrap_or(0.0)
    }
}

/// Loads assets by running `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeAssetLoader {
    binary: Option<PathBuf>,
}

impl Default for FfprobeAssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FfprobeAssetLoader {
    pub fn new() -> Self {
        Self {
            binary: which::which("ffprobe").ok(),
        }
    }

    /// Resolved `ffprobe` executable, if one is on `PATH`.
    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }
}

impl AssetLoader for FfprobeAssetLoader {
    fn load(&self, location: &Path) -> MediamarkResult<SourceAsset> {
        if !location.exists() {
            return Err(MediamarkError::FileNotFound {
                path: location.to_path_buf(),
            });
        }
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| MediamarkError::asset("ffprobe not found in PATH"))?;

        let output = Command::new(binary)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(location)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| MediamarkError::asset(format!("Failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(MediamarkError::asset(format!(
                "ffprobe failed on {}: {}",
                location.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let asset = parse_probe_output(location, &output.stdout)?;
        tracing::debug!(
            source = %location.display(),
            tracks = asset.tracks.len(),
            duration_secs = asset.duration.as_secs(),
            "Probed source asset"
        );
        Ok(asset)
    }

    fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    fn name(&self) -> &str {
        "ffprobe"
    }
}

/// Build a [`SourceAsset`] from ffprobe's JSON output.
pub fn parse_probe_output(location: &Path, json: &[u8]) -> MediamarkResult<SourceAsset> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(parse_secs)
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref().and_then(parse_secs))
                .reduce(f64::max)
        })
        .ok_or_else(|| {
            MediamarkError::asset(format!("{} reports no duration", location.display()))
        })?;

    let mut asset = SourceAsset::new(location, MediaTime::from_secs(duration, DEFAULT_TIMESCALE));
    for stream in &probe.streams {
        let kind = match stream.codec_type.as_str() {
            "video" => TrackKind::Video,
            "audio" => TrackKind::Audio,
            _ => continue,
        };
        // Cover art is an attached picture, not a playable video track.
        if kind == TrackKind::Video
            && (stream.disposition.attached_pic == 1 || stream.width.unwrap_or(0) == 0)
        {
            continue;
        }

        let start = stream.start_time.as_deref().and_then(parse_secs).unwrap_or(0.0);
        let span = stream
            .duration
            .as_deref()
            .and_then(parse_secs)
            .unwrap_or(duration);

        let natural_size = match kind {
            TrackKind::Video => Size::new(
                stream.width.unwrap_or(0) as f64,
                stream.height.unwrap_or(0) as f64,
            ),
            TrackKind::Audio => Size::default(),
        };
        let preferred_transform = match kind {
            TrackKind::Video => rotation_transform(stream.clockwise_rotation(), natural_size),
            TrackKind::Audio => AffineTransform::IDENTITY,
        };

        asset.tracks.push(AssetTrack {
            id: stream.index,
            kind,
            time_range: TimeRange::new(
                MediaTime::from_secs(start.max(0.0), DEFAULT_TIMESCALE),
                MediaTime::from_secs(span, DEFAULT_TIMESCALE),
            ),
            natural_size,
            preferred_transform,
            nominal_frame_rate: stream
                .avg_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate)),
            codec: stream.codec_name.clone(),
        });
    }

    Ok(asset)
}

/// Preferred transform that displays a `natural` frame rotated by
/// `clockwise_degrees`.
pub fn rotation_transform(clockwise_degrees: f64, natural: Size) -> AffineTransform {
    let Size {
        width: w,
        height: h,
    } = natural;
    let quarter = (clockwise_degrees / 90.0).round();
    if (clockwise_degrees - quarter * 90.0).abs() > 0.5 {
        return AffineTransform::rotation(clockwise_degrees.to_radians());
    }
    match (quarter as i64).rem_euclid(4) {
        1 => AffineTransform::new(0.0, 1.0, -1.0, 0.0, h, 0.0),
        2 => AffineTransform::new(-1.0, 0.0, 0.0, -1.0, w, h),
        3 => AffineTransform::new(0.0, -1.0, 1.0, 0.0, 0.0, w),
        _ => AffineTransform::IDENTITY,
    }
}

fn parse_secs(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// Parse frame rate string like "30/1" or "29.97".
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTRAIT_PROBE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_type": "video",
                "codec_name": "h264",
                "width": 1920,
                "height": 1080,
                "avg_frame_rate": "30000/1001",
                "r_frame_rate": "30/1",
                "start_time": "0.000000",
                "duration": "10.010000",
                "side_data_list": [
                    { "side_data_type": "Display Matrix", "rotation": -90 }
                ]
            },
            {
                "index": 1,
                "codec_type": "audio",
                "codec_name": "aac",
                "start_time": "0.000000",
                "duration": "10.000000"
            },
            {
                "index": 2,
                "codec_type": "data",
                "codec_name": "bin_data"
            }
        ],
        "format": { "duration": "10.010000" }
    }"#;

    #[test]
    fn test_parse_portrait_probe() {
        let asset = parse_probe_output(Path::new("clip.mov"), PORTRAIT_PROBE.as_bytes()).unwrap();
        assert_eq!(asset.tracks.len(), 2);
        assert!(asset.has_audio());
        assert_eq!(asset.natural_size(), Some(Size::new(1920.0, 1080.0)));
        assert_eq!(
            asset.preferred_transform(),
            Some(AffineTransform::new(0.0, 1.0, -1.0, 0.0, 1080.0, 0.0))
        );
        let video = asset.first_track(TrackKind::Video).unwrap();
        assert!((video.nominal_frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(video.codec.as_deref(), Some("h264"));
        assert_eq!(asset.duration, MediaTime::new(10_010_000, DEFAULT_TIMESCALE));
    }

    #[test]
    fn test_legacy_rotate_tag() {
        let json = r#"{
            "streams": [{
                "index": 0, "codec_type": "video", "width": 640, "height": 360,
                "tags": { "rotate": "180" }
            }],
            "format": { "duration": "2.5" }
        }"#;
        let asset = parse_probe_output(Path::new("clip.mp4"), json.as_bytes()).unwrap();
        assert_eq!(
            asset.preferred_transform(),
            Some(AffineTransform::new(-1.0, 0.0, 0.0, -1.0, 640.0, 360.0))
        );
        assert!(!asset.has_audio());
    }

    #[test]
    fn test_attached_picture_is_not_a_video_track() {
        let json = r#"{
            "streams": [
                {
                    "index": 0, "codec_type": "audio", "codec_name": "aac",
                    "disposition": { "default": 1, "attached_pic": 0 }
                },
                {
                    "index": 1, "codec_type": "video", "codec_name": "mjpeg",
                    "width": 600, "height": 600,
                    "disposition": { "default": 0, "attached_pic": 1 }
                },
                {
                    "index": 2, "codec_type": "video", "codec_name": "h264",
                    "width": 1280, "height": 720,
                    "disposition": { "default": 1, "attached_pic": 0 }
                }
            ],
            "format": { "duration": "3.0" }
        }"#;
        let asset = parse_probe_output(Path::new("clip.mp4"), json.as_bytes()).unwrap();
        assert_eq!(asset.tracks_of(TrackKind::Video).count(), 1);
        let video = asset.first_track(TrackKind::Video).unwrap();
        assert_eq!(video.id, 2);
        assert_eq!(video.natural_size, Size::new(1280.0, 720.0));
    }

    #[test]
    fn test_missing_duration_is_asset_error() {
        let json = r#"{ "streams": [], "format": {} }"#;
        let err = parse_probe_output(Path::new("x.mp4"), json.as_bytes()).unwrap_err();
        assert!(matches!(err, MediamarkError::Asset { .. }));
    }

    #[test]
    fn test_rotation_transform_quarter_turns() {
        let natural = Size::new(1920.0, 1080.0);
        assert_eq!(rotation_transform(0.0, natural), AffineTransform::IDENTITY);
        assert_eq!(rotation_transform(90.0, natural).quarter_turns(), Some(1));
        assert_eq!(rotation_transform(-90.0, natural).quarter_turns(), Some(3));
        assert_eq!(rotation_transform(270.0, natural).quarter_turns(), Some(3));
        assert_eq!(rotation_transform(30.0, natural).quarter_turns(), None);
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
    }
}
