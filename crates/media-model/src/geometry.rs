//! Geometry primitives for output-frame layout.
//!
//! Coordinates are in pixels, origin top-left, y growing downwards.
//! [`AffineTransform`] uses the row-vector convention: a point `(x, y)`
//! maps to `(a*x + c*y + tx, b*x + d*y + ty)`.

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing transform coefficients.
pub const GEOMETRY_EPSILON: f64 = 1e-9;

/// A 2D point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Same size with the axes swapped.
    pub fn transposed(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Whether both dimensions are finite and strictly positive.
    pub fn is_renderable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Dimensions rounded to whole pixels, at least 1x1.
    pub fn to_pixels(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    /// Rect at the origin with the given size.
    pub fn from_size(size: Size) -> Self {
        Self {
            origin: Point::ZERO,
            size,
        }
    }

    pub fn min_x(&self) -> f64 {
        self.origin.x
    }

    pub fn min_y(&self) -> f64 {
        self.origin.y
    }

    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    /// Overlapping region of two rects, if any.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.min_x().max(other.min_x());
        let y0 = self.min_y().max(other.min_y());
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Approximate equality within `tolerance` on every edge.
    pub fn approx_eq(&self, other: &Rect, tolerance: f64) -> bool {
        (self.min_x() - other.min_x()).abs() <= tolerance
            && (self.min_y() - other.min_y()).abs() <= tolerance
            && (self.max_x() - other.max_x()).abs() <= tolerance
            && (self.max_y() - other.max_y()).abs() <= tolerance
    }
}

/// A 2D affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, tx: f64, ty: f64) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// Rotation by `angle` radians. Positive angles turn +x towards +y,
    /// which is clockwise on screen.
    pub fn rotation(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// `self` followed by `other`.
    pub fn concat(&self, other: &AffineTransform) -> AffineTransform {
        AffineTransform {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            tx: self.tx * other.a + self.ty * other.c + other.tx,
            ty: self.tx * other.b + self.ty * other.d + other.ty,
        }
    }

    /// Prepend a translation: points are translated, then mapped by `self`.
    pub fn translated_by(&self, tx: f64, ty: f64) -> AffineTransform {
        AffineTransform::translation(tx, ty).concat(self)
    }

    /// Prepend a rotation: points are rotated, then mapped by `self`.
    pub fn rotated_by(&self, angle: f64) -> AffineTransform {
        AffineTransform::rotation(angle).concat(self)
    }

    /// Prepend a scale: points are scaled, then mapped by `self`.
    pub fn scaled_by(&self, sx: f64, sy: f64) -> AffineTransform {
        AffineTransform::scale(sx, sy).concat(self)
    }

    pub fn apply(&self, p: Point) -> Point {
        Point {
            x: self.a * p.x + self.c * p.y + self.tx,
            y: self.b * p.x + self.d * p.y + self.ty,
        }
    }

    /// Bounding box of `rect` after mapping its four corners.
    pub fn apply_to_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            Point::new(rect.min_x(), rect.min_y()),
            Point::new(rect.max_x(), rect.min_y()),
            Point::new(rect.min_x(), rect.max_y()),
            Point::new(rect.max_x(), rect.max_y()),
        ]
        .map(|p| self.apply(p));

        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Rotation component in radians, in `(-π, π]`.
    pub fn rotation_angle(&self) -> f64 {
        self.b.atan2(self.a)
    }

    /// Number of clockwise quarter turns (0..=3) if the linear part is a
    /// quarter-turn rotation combined with an axis scale.
    pub fn quarter_turns(&self) -> Option<u8> {
        let tol = 1e-6;
        let near_zero = |v: f64| v.abs() < tol;
        if near_zero(self.b) && near_zero(self.c) && self.a > 0.0 && self.d > 0.0 {
            Some(0)
        } else if near_zero(self.a) && near_zero(self.d) && self.b > 0.0 && self.c < 0.0 {
            Some(1)
        } else if near_zero(self.b) && near_zero(self.c) && self.a < 0.0 && self.d < 0.0 {
            Some(2)
        } else if near_zero(self.a) && near_zero(self.d) && self.b < 0.0 && self.c > 0.0 {
            Some(3)
        } else {
            None
        }
    }

    pub fn is_identity(&self) -> bool {
        self.approx_eq(&Self::IDENTITY, GEOMETRY_EPSILON)
    }

    pub fn approx_eq(&self, other: &AffineTransform, tolerance: f64) -> bool {
        (self.a - other.a).abs() <= tolerance
            && (self.b - other.b).abs() <= tolerance
            && (self.c - other.c).abs() <= tolerance
            && (self.d - other.d).abs() <= tolerance
            && (self.tx - other.tx).abs() <= tolerance
            && (self.ty - other.ty).abs() <= tolerance
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
