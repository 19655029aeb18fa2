//! Mediamark Media Model
//!
//! Defines the data contracts shared by the composition and export stages:
//! - **Geometry:** Points, sizes, rects, and 2D affine transforms
//! - **Time:** Rational media time and time ranges
//! - **Assets:** Probed source media (tracks, duration, natural transform)
//! - **Items:** The overlay request (`MediaItem` with ordered `MediaElement`s)
//! - **Results:** What a finished processing call hands back
//!
//! Overlay coordinates are in output pixels with the origin at the top-left
//! of the rendered frame.

pub mod asset;
pub mod geometry;
pub mod item;
pub mod result;
pub mod time;

pub use asset::*;
pub use geometry::*;
pub use item::*;
pub use result::*;
pub use time::*;
