//! Overlay layer construction.
//!
//! All overlay elements end up as primitives inside one container layer
//! sized to the render frame. The container clips its contents, and
//! primitive order is paint order.

use std::path::PathBuf;

use mediamark_common::error::MediamarkError;
use mediamark_media_model::{ElementContent, MediaElement, Rect, Size, TextContent};
use serde::Serialize;

/// Where a bitmap primitive's pixels came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BitmapOrigin {
    Image,
    RasterizedView,
}

/// Visual content of one primitive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimitiveContent {
    Bitmap { path: PathBuf, origin: BitmapOrigin },
    Text(TextContent),
    /// Placeholder for content that could not be resolved.
    Empty,
}

/// One positioned visual inside the overlay layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayPrimitive {
    /// Index of the source element.
    pub element_index: usize,
    pub frame: Rect,
    pub content: PrimitiveContent,
}

/// Container layer for all overlays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLayer {
    pub frame: Rect,
    pub masks_to_bounds: bool,
    /// Paint order: first is furthest back.
    pub sublayers: Vec<OverlayPrimitive>,
}

impl OverlayLayer {
    pub fn empty(render_size: Size) -> Self {
        Self {
            frame: Rect::from_size(render_size),
            masks_to_bounds: true,
            sublayers: Vec::new(),
        }
    }

    /// Primitives that will paint something, with their frames clipped to
    /// the container. Order is preserved.
    pub fn visible_primitives(&self) -> impl Iterator<Item = (&OverlayPrimitive, Rect)> {
        self.sublayers.iter().filter_map(move |primitive| {
            if matches!(primitive.content, PrimitiveContent::Empty) {
                return None;
            }
            let visible = if self.masks_to_bounds {
                primitive.frame.intersection(&self.frame)?
            } else {
                primitive.frame
            };
            Some((primitive, visible))
        })
    }
}

/// An element whose content could not be resolved.
#[derive(Debug)]
pub struct ContentIssue {
    pub element_index: usize,
    pub error: MediamarkError,
}

/// Result of building the overlay layer.
///
/// Issues never abort the build; the affected primitive is left empty.
#[derive(Debug)]
pub struct OverlayBuild {
    pub layer: OverlayLayer,
    pub issues: Vec<ContentIssue>,
}

impl OverlayBuild {
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Build the overlay container for `elements` inside a `render_size` frame.
pub fn build_overlay_layer(elements: &[MediaElement], render_size: Size) -> OverlayBuild {
    let mut layer = OverlayLayer::empty(render_size);
    let mut issues = Vec::new();

    for (element_index, element) in elements.iter().enumerate() {
        let (bitmap, origin) = match &element.content {
            ElementContent::Text(text) => {
                layer.sublayers.push(OverlayPrimitive {
                    element_index,
                    frame: element.frame,
                    content: PrimitiveContent::Text(text.clone()),
                });
                continue;
            }
            ElementContent::Image(bitmap) => (bitmap, BitmapOrigin::Image),
            ElementContent::RasterizedView(bitmap) => (bitmap, BitmapOrigin::RasterizedView),
        };

        let content = match bitmap.resolve() {
            Ok(path) => PrimitiveContent::Bitmap {
                path: path.to_path_buf(),
                origin,
            },
            Err(error) => {
                tracing::warn!(
                    element = element_index,
                    error = %error,
                    "Overlay bitmap unavailable, leaving primitive empty"
                );
                issues.push(ContentIssue {
                    element_index,
                    error,
                });
                PrimitiveContent::Empty
            }
        };

        layer.sublayers.push(OverlayPrimitive {
            element_index,
            frame: element.frame,
            content,
        });
    }

    tracing::debug!(
        primitives = layer.sublayers.len(),
        issues = issues.len(),
        "Overlay layer built"
    );

    OverlayBuild { layer, issues }
}
