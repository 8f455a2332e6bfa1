//! Annotation mask rasterization and energy-guided widening.

pub mod expand;
pub mod raster;

pub use expand::{expand_mask, ExpandParams};
pub use raster::render_mask;
