//! Terrain tiles for viewscape.
//!
//! Resolution-tagged elevation grids with optional land cover and
//! above-ground offset, multi-resolution stacks, and the line-of-sight
//! sampling every visibility backend shares.

pub use viewscape_core as core;

pub mod grid;
pub mod los;
pub mod stack;
pub mod synth;
pub mod transform;

// Re-export key types for convenience.
pub use grid::ScaleData;
pub use los::{grid_line_visible, march, segment_visible, RaySample};
pub use stack::TileStack;
pub use transform::GridTransform;
