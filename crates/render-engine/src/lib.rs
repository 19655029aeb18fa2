//! Mediamark Render Engine
//!
//! Drives an overlay export from a prepared render graph to a finished
//! file on disk, reporting progress and honouring cancellation.
//!
//! # Pipeline Architecture
//!
//! ```text
//! MediaItem ──┬── compose_timeline ─────────┐
//!             ├── normalizing_transform ────┼── RenderGraph ──┐
//!             └── build_overlay_layer ──────┘                 │
//!                                                             ▼
//!                          temp_output::prepare ──► ExportDriver ──► ExportBackend (ffmpeg)
//!                                                     │    ▲               │
//!                                          on_progress│    └─ ExportMonitor┘
//!                                                     ▼
//!                                               on_complete(Result)
//! ```

pub mod export;
pub mod ffmpeg;
pub mod probe;
pub mod processor;
pub mod temp_output;

pub use export::*;
pub use ffmpeg::FfmpegBackend;
pub use probe::FfprobeAssetLoader;
pub use processor::*;
pub use temp_output::OutputLocation;
