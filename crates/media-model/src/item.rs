//! Overlay requests: what to burn into which frame.

use std::path::{Path, PathBuf};

use mediamark_common::error::{MediamarkError, MediamarkResult};
use serde::{Deserialize, Serialize};

use crate::asset::SourceAsset;
use crate::geometry::{Rect, Size};

/// Kind of media being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

/// An overlay request against one source asset.
///
/// `elements` are painted in order: index 0 is furthest back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub source: SourceAsset,

    pub media_type: MediaType,

    /// Output frame size.
    pub size: Size,

    #[serde(default)]
    pub elements: Vec<MediaElement>,
}

impl MediaItem {
    /// A video item rendered at `size`.
    pub fn video(source: SourceAsset, size: Size) -> Self {
        Self {
            source,
            media_type: MediaType::Video,
            size,
            elements: Vec::new(),
        }
    }

    /// A still-image item rendered at `size`.
    pub fn image(source: SourceAsset, size: Size) -> Self {
        Self {
            source,
            media_type: MediaType::Image,
            size,
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, element: MediaElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_elements(mut self, elements: impl IntoIterator<Item = MediaElement>) -> Self {
        self.elements.extend(elements);
        self
    }
}

/// One overlay placed in output coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaElement {
    pub frame: Rect,
    pub content: ElementContent,
}

/// Payload of an overlay element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementContent {
    Text(TextContent),
    Image(Bitmap),
    /// A UI snapshot already rasterized by a [`ViewRasterizer`].
    RasterizedView(Bitmap),
}

impl MediaElement {
    pub fn text(text: impl Into<String>, frame: Rect) -> Self {
        Self {
            frame,
            content: ElementContent::Text(TextContent::new(text)),
        }
    }

    pub fn styled_text(text: impl Into<String>, style: TextStyle, frame: Rect) -> Self {
        Self {
            frame,
            content: ElementContent::Text(TextContent {
                text: text.into(),
                style,
            }),
        }
    }

    pub fn image(bitmap: Bitmap, frame: Rect) -> Self {
        Self {
            frame,
            content: ElementContent::Image(bitmap),
        }
    }

    pub fn rasterized_view(bitmap: Bitmap, frame: Rect) -> Self {
        Self {
            frame,
            content: ElementContent::RasterizedView(bitmap),
        }
    }

    /// Rasterize `view` now and place the snapshot at `frame`.
    pub fn from_view<R: ViewRasterizer + ?Sized>(
        rasterizer: &R,
        view: &R::View,
        frame: Rect,
    ) -> MediamarkResult<Self> {
        let bitmap = rasterizer.rasterize(view)?;
        Ok(Self::rasterized_view(bitmap, frame))
    }
}

/// Encoded raster content stored on disk (PNG, JPEG, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bitmap {
    pub path: PathBuf,
}

impl Bitmap {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Check that the content can be read, returning its location.
    pub fn resolve(&self) -> MediamarkResult<&Path> {
        match std::fs::metadata(&self.path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(&self.path),
            Ok(_) => Err(MediamarkError::content_resolution(format!(
                "{} is not a non-empty file",
                self.path.display()
            ))),
            Err(e) => Err(MediamarkError::content_resolution(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// Literal text drawn by a text overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
    #[serde(default)]
    pub style: TextStyle,
}

impl TextContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: TextStyle::default(),
        }
    }
}

/// Text rendering attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    /// Font size in output pixels.
    pub font_size: f64,
    pub color: Rgba,
    /// Font to use instead of the renderer default.
    pub font_file: Option<PathBuf>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 36.0,
            color: Rgba::WHITE,
            font_file: None,
        }
    }
}

/// 8-bit RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(value: &str) -> Option<Self> {
        let hex = value.strip_prefix('#').unwrap_or(value);
        if !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self {
                r: channel(0)?,
                g: channel(2)?,
                b: channel(4)?,
                a: channel(6)?,
            }),
            _ => None,
        }
    }

    pub fn opacity(&self) -> f64 {
        self.a as f64 / 255.0
    }
}

/// View-rasterization provider: turns a UI snapshot into a bitmap.
pub trait ViewRasterizer {
    type View: ?Sized;

    fn rasterize(&self, view: &Self::View) -> MediamarkResult<Bitmap>;
}
