//! Render graph assembly.
//!
//! The render graph tells the export backend how to draw each output
//! frame: which composition track to decode, where its pixels land, and
//! which overlay layer to composite on top.

use mediamark_media_model::{AffineTransform, MediaTime, Rect, Size, TimeRange};
use serde::Serialize;

use crate::orientation::VideoTransform;
use crate::overlay::OverlayLayer;
use crate::timeline::Composition;

/// Frame rate used when the caller does not pick one.
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Per-track geometry within an instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerInstruction {
    /// Composition track this instruction draws.
    pub track_id: u32,
    /// Transform ramp as `(time, transform)` pairs, earliest first.
    pub transforms: Vec<(MediaTime, AffineTransform)>,
}

impl LayerInstruction {
    /// Transform in effect at `time`: the last ramp entry at or before it.
    pub fn transform_at(&self, time: MediaTime) -> AffineTransform {
        self.transforms
            .iter()
            .take_while(|(at, _)| *at <= time)
            .last()
            .or_else(|| self.transforms.first())
            .map(|(_, t)| *t)
            .unwrap_or(AffineTransform::IDENTITY)
    }
}

/// What to draw over a span of output time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionInstruction {
    pub time_range: TimeRange,
    /// Bottom-most layer first.
    pub layer_instructions: Vec<LayerInstruction>,
}

/// Post-processing layer tree: the decoded video layer with the overlay
/// container above it, both inside a parent sized to the render frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationLayers {
    pub parent_frame: Rect,
    pub video_frame: Rect,
    pub overlay: OverlayLayer,
}

/// Everything a backend needs to render the composition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderGraph {
    pub render_size: Size,
    pub frame_duration: MediaTime,
    pub instructions: Vec<CompositionInstruction>,
    pub animation: AnimationLayers,
    /// Transform values the video layer instruction was built from.
    pub video_transform: VideoTransform,
}

impl RenderGraph {
    /// Output frames per second.
    pub fn frame_rate(&self) -> f64 {
        1.0 / self.frame_duration.as_secs()
    }

    /// The single video layer instruction.
    pub fn video_instruction(&self) -> Option<&LayerInstruction> {
        self.instructions
            .first()
            .and_then(|i| i.layer_instructions.first())
    }

    /// Span the graph covers.
    pub fn duration(&self) -> MediaTime {
        self.instructions
            .first()
            .map(|i| i.time_range.duration)
            .unwrap_or(MediaTime::ZERO)
    }
}

/// Assemble the render graph for `composition`.
///
/// One instruction covers the whole composition with the video track's
/// transform applied from time zero. A zero `frame_rate` falls back to
/// [`DEFAULT_FRAME_RATE`].
pub fn assemble_render_graph(
    composition: &Composition,
    video_transform: &VideoTransform,
    overlay: OverlayLayer,
    render_size: Size,
    frame_rate: u32,
) -> RenderGraph {
    let fps = if frame_rate == 0 {
        DEFAULT_FRAME_RATE
    } else {
        frame_rate
    };
    let frame_duration = MediaTime::new(1, fps as i32);

    let track_id = composition.video_track().map(|t| t.id).unwrap_or(1);
    let layer_instruction = LayerInstruction {
        track_id,
        transforms: vec![(MediaTime::ZERO, video_transform.transform)],
    };
    let instruction = CompositionInstruction {
        time_range: TimeRange::from_zero(composition.duration()),
        layer_instructions: vec![layer_instruction],
    };

    let frame = Rect::from_size(render_size);
    tracing::debug!(
        width = render_size.width,
        height = render_size.height,
        fps,
        overlays = overlay.sublayers.len(),
        orientation = video_transform.orientation.as_str(),
        "Render graph assembled"
    );

    RenderGraph {
        render_size,
        frame_duration,
        instructions: vec![instruction],
        animation: AnimationLayers {
            parent_frame: frame,
            video_frame: frame,
            overlay,
        },
        video_transform: *video_transform,
    }
}
