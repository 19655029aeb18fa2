//! Mediamark Composition
//!
//! Turns a [`MediaItem`](mediamark_media_model::MediaItem) into the inputs
//! an export backend consumes:
//! - **Orientation:** Upright-normalizing transform for the video track
//! - **Overlay:** Container layer holding every overlay primitive in paint order
//! - **Timeline:** Composition with the source video (and audio) at time zero
//! - **Render graph:** Frame size, cadence, layer instruction, and overlay pass
//!
//! ```text
//! SourceAsset ──┬── compose_timeline ──────────────┐
//!               └── normalizing_transform ─────────┼── assemble_render_graph ── RenderGraph
//! elements ──────── build_overlay_layer ───────────┘
//! ```

pub mod orientation;
pub mod overlay;
pub mod render_graph;
pub mod timeline;

pub use orientation::*;
pub use overlay::*;
pub use render_graph::*;
pub use timeline::*;
