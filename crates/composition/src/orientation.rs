//! Capture orientation and the transform that renders it upright.
//!
//! The normalizing transform rotates the natural frame about the origin,
//! translates it back into positive space, then scales it:
//!
//! | orientation | offset   | angle |
//! |-------------|----------|-------|
//! | left        | (h, w)   | π     |
//! | right       | (0, 0)   | 0     |
//! | down        | (0, w)   | −π/2  |
//! | up          | (h, 0)   | π/2   |
//!
//! `(w, h)` is the content size in the orientation's axis frame, see
//! [`Orientation::content_size`].

use std::f64::consts::{FRAC_PI_2, PI};

use mediamark_media_model::{AffineTransform, Point, Rect, Size, SourceAsset};
use serde::{Deserialize, Serialize};

/// How the capture device was held, derived from the track's preferred
/// transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Portrait; frames need a quarter turn clockwise.
    Up,
    /// Landscape, upside down.
    Left,
    /// Landscape as encoded.
    Right,
    /// Portrait, upside down.
    Down,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [
        Orientation::Up,
        Orientation::Left,
        Orientation::Right,
        Orientation::Down,
    ];

    /// Classify a preferred transform. Anything that is not a clean quarter
    /// turn falls back to [`Orientation::Up`].
    pub fn from_preferred_transform(transform: &AffineTransform) -> Self {
        match transform.quarter_turns() {
            Some(0) => Orientation::Right,
            Some(1) => Orientation::Up,
            Some(2) => Orientation::Left,
            Some(3) => Orientation::Down,
            _ => {
                tracing::debug!(?transform, "Unrecognized preferred transform, assuming up");
                Orientation::Up
            }
        }
    }

    /// Orientation of the asset's first video track.
    pub fn of_asset(asset: &SourceAsset) -> Option<Self> {
        asset
            .preferred_transform()
            .map(|t| Self::from_preferred_transform(&t))
    }

    /// Content size used by the offset table: the natural size, with axes
    /// swapped for `left` so the offset lands on the far corner.
    pub fn content_size(&self, natural: Size) -> Size {
        match self {
            Orientation::Left => natural.transposed(),
            _ => natural,
        }
    }

    /// Size of the frame once rotated upright.
    pub fn upright_size(&self, natural: Size) -> Size {
        match self {
            Orientation::Up | Orientation::Down => natural.transposed(),
            Orientation::Left | Orientation::Right => natural,
        }
    }

    /// Translation and rotation (radians) for the given natural size.
    pub fn placement(&self, natural: Size) -> (Point, f64) {
        let Size {
            width: w,
            height: h,
        } = self.content_size(natural);
        match self {
            Orientation::Left => (Point::new(h, w), PI),
            Orientation::Right => (Point::ZERO, 0.0),
            Orientation::Down => (Point::new(0.0, w), -FRAC_PI_2),
            Orientation::Up => (Point::new(h, 0.0), FRAC_PI_2),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Up => "up",
            Orientation::Left => "left",
            Orientation::Right => "right",
            Orientation::Down => "down",
        }
    }
}

/// Scaling applied after the frame is upright.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScaleMode {
    /// Same factor on both axes.
    Uniform(f64),
    /// Per-axis factors that map the upright frame onto the target size.
    FitTarget,
}

impl Default for ScaleMode {
    fn default() -> Self {
        ScaleMode::Uniform(1.0)
    }
}

/// The normalizing transform plus the values it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoTransform {
    pub orientation: Orientation,
    /// Encoded frame size the transform was computed for.
    pub natural_size: Size,
    pub offset: Point,
    pub angle: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub transform: AffineTransform,
}

impl VideoTransform {
    /// Where the natural frame lands in render space.
    pub fn output_rect(&self) -> Rect {
        self.transform.apply_to_rect(&Rect::from_size(self.natural_size))
    }
}

/// Compute the transform that renders a track with `preferred_transform`
/// and `natural_size` upright inside a `target` frame.
pub fn normalizing_transform(
    preferred_transform: &AffineTransform,
    natural_size: Size,
    target: Size,
    mode: ScaleMode,
) -> VideoTransform {
    let orientation = Orientation::from_preferred_transform(preferred_transform);
    let (offset, angle) = orientation.placement(natural_size);

    let upright = orientation.upright_size(natural_size);
    let (scale_x, scale_y) = match mode {
        ScaleMode::Uniform(factor) => (factor, factor),
        ScaleMode::FitTarget if upright.is_renderable() && target.is_renderable() => (
            target.width / upright.width,
            target.height / upright.height,
        ),
        ScaleMode::FitTarget => (1.0, 1.0),
    };

    let transform = AffineTransform::scale(scale_x, scale_y)
        .translated_by(offset.x, offset.y)
        .rotated_by(angle);

    VideoTransform {
        orientation,
        natural_size,
        offset,
        angle,
        scale_x,
        scale_y,
        transform,
    }
}
