//! Timeline composition.
//!
//! A [`Composition`] is the editable timeline the export renders from: one
//! video track and at most one audio track, each holding segments that map
//! a range of a source track onto composition time.

use std::cmp::Ordering;
use std::path::PathBuf;

use mediamark_common::error::{MediamarkError, MediamarkResult};
use mediamark_media_model::{
    AffineTransform, AssetTrack, MediaTime, SourceAsset, TimeRange, TrackKind,
};
use serde::Serialize;

/// A span of a source track placed on the composition timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackSegment {
    pub source_track_id: u32,
    /// Span of the source track that is played.
    pub source_range: TimeRange,
    /// Composition time at which playback of the span begins.
    pub target_start: MediaTime,
}

impl TrackSegment {
    /// Span covered on the composition timeline.
    pub fn target_range(&self) -> TimeRange {
        TimeRange::new(self.target_start, self.source_range.duration)
    }
}

/// One track of the composition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionTrack {
    pub id: u32,
    pub kind: TrackKind,
    pub segments: Vec<TrackSegment>,
    pub preferred_transform: AffineTransform,
}

impl CompositionTrack {
    fn new(id: u32, kind: TrackKind) -> Self {
        Self {
            id,
            kind,
            segments: Vec::new(),
            preferred_transform: AffineTransform::IDENTITY,
        }
    }

    /// Insert `range` of `source` at composition time `at`.
    pub fn insert_time_range(
        &mut self,
        range: TimeRange,
        source: &AssetTrack,
        at: MediaTime,
    ) -> MediamarkResult<()> {
        if source.kind != self.kind {
            return Err(MediamarkError::track_insertion(format!(
                "cannot insert {:?} track {} into {:?} track {}",
                source.kind, source.id, self.kind, self.id
            )));
        }
        if !range.is_valid() || range.is_empty() || !at.is_valid() {
            return Err(MediamarkError::track_insertion(format!(
                "invalid insertion range {:.3}s+{:.3}s",
                range.start.as_secs(),
                range.duration.as_secs()
            )));
        }

        let available = source.time_range;
        if !available.is_valid() || available.is_empty() {
            return Err(MediamarkError::track_insertion(format!(
                "source track {} has no media",
                source.id
            )));
        }
        // The source must have media before the requested span ends.
        if available.start.partial_cmp(&range.end()) != Some(Ordering::Less) {
            return Err(MediamarkError::track_insertion(format!(
                "source track {} starts at {:.3}s, after the requested range",
                source.id,
                available.start.as_secs()
            )));
        }

        let segment = TrackSegment {
            source_track_id: source.id,
            source_range: range,
            target_start: at,
        };
        let target = segment.target_range();
        let overlaps = self.segments.iter().any(|existing| {
            let other = existing.target_range();
            target.start < other.end() && other.start < target.end()
        });
        if overlaps {
            return Err(MediamarkError::track_insertion(format!(
                "segment at {:.3}s overlaps existing media on track {}",
                at.as_secs(),
                self.id
            )));
        }

        self.segments.push(segment);
        self.segments.sort_by(|a, b| {
            a.target_start
                .partial_cmp(&b.target_start)
                .unwrap_or(Ordering::Equal)
        });
        Ok(())
    }

    /// End of the last segment on the composition timeline.
    pub fn duration(&self) -> MediaTime {
        self.segments
            .iter()
            .map(|s| s.target_range().end())
            .fold(MediaTime::ZERO, |acc, end| if end > acc { end } else { acc })
    }
}

/// Timeline built from one source asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composition {
    /// Location of the media the segments refer to.
    pub source: PathBuf,
    pub tracks: Vec<CompositionTrack>,
}

impl Composition {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            tracks: Vec::new(),
        }
    }

    /// Add an empty track and return it for insertion.
    pub fn add_track(&mut self, kind: TrackKind) -> &mut CompositionTrack {
        let id = self.tracks.len() as u32 + 1;
        self.tracks.push(CompositionTrack::new(id, kind));
        let index = self.tracks.len() - 1;
        &mut self.tracks[index]
    }

    pub fn first_track(&self, kind: TrackKind) -> Option<&CompositionTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    pub fn video_track(&self) -> Option<&CompositionTrack> {
        self.first_track(TrackKind::Video)
    }

    pub fn has_audio(&self) -> bool {
        self.first_track(TrackKind::Audio).is_some()
    }

    /// Longest track duration.
    pub fn duration(&self) -> MediaTime {
        self.tracks
            .iter()
            .map(CompositionTrack::duration)
            .fold(MediaTime::ZERO, |acc, d| if d > acc { d } else { acc })
    }
}

/// Build the composition for `asset`: its first video track and, when
/// present, its first audio track, both covering `[0, duration)`.
pub fn compose_timeline(asset: &SourceAsset) -> MediamarkResult<Composition> {
    let source_video = asset.first_track(TrackKind::Video).ok_or_else(|| {
        MediamarkError::track_insertion(format!(
            "{} has no video track",
            asset.location.display()
        ))
    })?;

    let full_range = TimeRange::from_zero(asset.duration);
    let mut composition = Composition::new(&asset.location);

    let video = composition.add_track(TrackKind::Video);
    video.insert_time_range(full_range, source_video, MediaTime::ZERO)?;
    video.preferred_transform = source_video.preferred_transform;

    match asset.first_track(TrackKind::Audio) {
        Some(source_audio) => {
            let audio = composition.add_track(TrackKind::Audio);
            audio.insert_time_range(full_range, source_audio, MediaTime::ZERO)?;
        }
        None => tracing::debug!(
            source = %asset.location.display(),
            "Source has no audio, composing video only"
        ),
    }

    tracing::debug!(
        tracks = composition.tracks.len(),
        duration_secs = composition.duration().as_secs(),
        "Timeline composed"
    );
    Ok(composition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediamark_common::error::ErrorKind;
    use mediamark_media_model::Size;

    fn ten_seconds() -> MediaTime {
        MediaTime::new(10, 1)
    }

    fn portrait_transform() -> AffineTransform {
        AffineTransform::new(0.0, 1.0, -1.0, 0.0, 1080.0, 0.0)
    }

    #[test]
    fn test_video_and_audio_tracks_cover_duration() {
        let asset = SourceAsset::new("clip.mp4", ten_seconds())
            .with_track(
                AssetTrack::video(0, ten_seconds(), Size::new(1920.0, 1080.0))
                    .with_preferred_transform(portrait_transform()),
            )
            .with_track(AssetTrack::audio(1, ten_seconds()));

        let composition = compose_timeline(&asset).unwrap();
        assert_eq!(composition.tracks.len(), 2);
        assert_eq!(composition.duration(), ten_seconds());

        let video = composition.video_track().unwrap();
        assert_eq!(video.preferred_transform, portrait_transform());
        assert_eq!(video.segments.len(), 1);
        assert_eq!(video.segments[0].source_track_id, 0);
        assert_eq!(video.segments[0].target_start, MediaTime::ZERO);

        let audio = composition.first_track(TrackKind::Audio).unwrap();
        assert_eq!(audio.segments[0].source_track_id, 1);
        assert_eq!(audio.duration(), ten_seconds());
    }

    #[test]
    fn test_video_only_source_is_supported() {
        let asset = SourceAsset::new("silent.mp4", ten_seconds()).with_track(AssetTrack::video(
            0,
            ten_seconds(),
            Size::new(640.0, 360.0),
        ));
        let composition = compose_timeline(&asset).unwrap();
        assert_eq!(composition.tracks.len(), 1);
        assert!(!composition.has_audio());
    }

    #[test]
    fn test_missing_video_track_fails() {
        let asset = SourceAsset::new("audio.m4a", ten_seconds())
            .with_track(AssetTrack::audio(0, ten_seconds()));
        let err = compose_timeline(&asset).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TrackInsertion);
    }

    #[test]
    fn test_zero_duration_fails() {
        let asset = SourceAsset::new("empty.mp4", MediaTime::ZERO).with_track(AssetTrack::video(
            0,
            MediaTime::ZERO,
            Size::new(640.0, 360.0),
        ));
        let err = compose_timeline(&asset).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TrackInsertion);
    }

    #[test]
    fn test_audio_insertion_failure_aborts() {
        let mut audio = AssetTrack::audio(1, ten_seconds());
        audio.time_range = TimeRange::new(MediaTime::new(12, 1), ten_seconds());
        let asset = SourceAsset::new("late-audio.mp4", ten_seconds())
            .with_track(AssetTrack::video(0, ten_seconds(), Size::new(640.0, 360.0)))
            .with_track(audio);

        let err = compose_timeline(&asset).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TrackInsertion);
    }

    #[test]
    fn test_overlapping_insert_rejected() {
        let source = AssetTrack::video(0, ten_seconds(), Size::new(640.0, 360.0));
        let mut composition = Composition::new("clip.mp4");
        let track = composition.add_track(TrackKind::Video);
        track
            .insert_time_range(TimeRange::from_zero(ten_seconds()), &source, MediaTime::ZERO)
            .unwrap();
        let err = track
            .insert_time_range(
                TimeRange::from_zero(MediaTime::new(2, 1)),
                &source,
                MediaTime::new(5, 1),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TrackInsertion);

        track
            .insert_time_range(
                TimeRange::from_zero(MediaTime::new(2, 1)),
                &source,
                ten_seconds(),
            )
            .unwrap();
        assert_eq!(track.duration(), MediaTime::new(12, 1));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let audio = AssetTrack::audio(3, ten_seconds());
        let mut composition = Composition::new("clip.mp4");
        let err = composition
            .add_track(TrackKind::Video)
            .insert_time_range(TimeRange::from_zero(ten_seconds()), &audio, MediaTime::ZERO)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TrackInsertion);
    }
}
