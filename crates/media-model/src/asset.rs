//! Source assets as reported by a media-decoding provider.

use std::path::{Path, PathBuf};

use mediamark_common::error::MediamarkResult;
use serde::{Deserialize, Serialize};

use crate::geometry::{AffineTransform, Size};
use crate::time::{MediaTime, TimeRange};

/// Media type of a single track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// One decodable stream inside a source asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetTrack {
    /// Stream index within the container.
    pub id: u32,

    pub kind: TrackKind,

    /// Presentation span of the track's media.
    pub time_range: TimeRange,

    /// Encoded frame dimensions (zero for audio).
    #[serde(default)]
    pub natural_size: Size,

    /// Capture transform that displays the frames upright.
    #[serde(default)]
    pub preferred_transform: AffineTransform,

    /// Average frame rate, when the container reports one.
    #[serde(default)]
    pub nominal_frame_rate: Option<f64>,

    /// Codec name as reported by the decoder.
    #[serde(default)]
    pub codec: Option<String>,
}

impl AssetTrack {
    /// A video track spanning `duration` with no capture rotation.
    pub fn video(id: u32, duration: MediaTime, natural_size: Size) -> Self {
        Self {
            id,
            kind: TrackKind::Video,
            time_range: TimeRange::from_zero(duration),
            natural_size,
            preferred_transform: AffineTransform::IDENTITY,
            nominal_frame_rate: None,
            codec: None,
        }
    }

    /// An audio track spanning `duration`.
    pub fn audio(id: u32, duration: MediaTime) -> Self {
        Self {
            id,
            kind: TrackKind::Audio,
            time_range: TimeRange::from_zero(duration),
            natural_size: Size::default(),
            preferred_transform: AffineTransform::IDENTITY,
            nominal_frame_rate: None,
            codec: None,
        }
    }

    pub fn with_preferred_transform(mut self, transform: AffineTransform) -> Self {
        self.preferred_transform = transform;
        self
    }
}

/// A probed source media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAsset {
    /// Where the media lives on disk.
    pub location: PathBuf,

    /// Overall asset duration.
    pub duration: MediaTime,

    /// Tracks in container order.
    pub tracks: Vec<AssetTrack>,
}

impl SourceAsset {
    pub fn new(location: impl Into<PathBuf>, duration: MediaTime) -> Self {
        Self {
            location: location.into(),
            duration,
            tracks: Vec::new(),
        }
    }

    pub fn with_track(mut self, track: AssetTrack) -> Self {
        self.tracks.push(track);
        self
    }

    /// Tracks of one kind, in container order.
    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &AssetTrack> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }

    pub fn first_track(&self, kind: TrackKind) -> Option<&AssetTrack> {
        self.tracks_of(kind).next()
    }

    pub fn has_audio(&self) -> bool {
        self.first_track(TrackKind::Audio).is_some()
    }

    /// Natural size of the first video track.
    pub fn natural_size(&self) -> Option<Size> {
        self.first_track(TrackKind::Video).map(|t| t.natural_size)
    }

    /// Preferred transform of the first video track.
    pub fn preferred_transform(&self) -> Option<AffineTransform> {
        self.first_track(TrackKind::Video)
            .map(|t| t.preferred_transform)
    }
}

/// Media-decoding provider: turns a location into a [`SourceAsset`].
pub trait AssetLoader: Send + Sync {
    /// Probe the media at `location`.
    fn load(&self, location: &Path) -> MediamarkResult<SourceAsset>;

    /// Whether the provider can run on this system.
    fn is_available(&self) -> bool;

    /// Provider name.
    fn name(&self) -> &str;
}
