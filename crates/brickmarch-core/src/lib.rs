//! Core types for the Brickmarch SDF editor.
//!
//! This crate provides the host-side data model shared by the renderer and
//! the editor:
//! - SDF edit records and their GPU layout
//! - Terrain brush parameters and the reference brush kernel
//! - Picking results
//! - Per-frame input state
//! - Engine-wide constants and error types

pub mod brush;
pub mod error;
pub mod input;
pub mod selection;
pub mod types;

pub use brush::{BrushMode, BrushParams, BrushQueue, GpuBrushParams, Heightfield};
pub use error::{Error, Result};
pub use input::{InputState, MoveIntent};
pub use selection::{GpuSelection, HitTarget, Selection};
pub use types::{default_scene, CombineOp, GpuSdfEdit, Material, PrimitiveType, SdfEdit};

/// Engine-wide constants
pub mod constants {
    /// Maximum number of edits mirrored into the GPU edit buffer.
    pub const MAX_EDITS: usize = 256;
    /// Size of a brick in voxels per axis.
    pub const BRICK_SIZE: u32 = 8;
    /// Voxels in one brick (8^3).
    pub const BRICK_VOXELS: u32 = BRICK_SIZE * BRICK_SIZE * BRICK_SIZE;
    /// Compute workgroup edge length shared by every dispatch (8x8).
    pub const WORKGROUP_SIZE: u32 = 8;
    /// Frames the host may record ahead of the GPU.
    pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

    /// Number of workgroups needed to cover `extent` invocations.
    #[inline]
    #[must_use]
    pub const fn workgroup_count(extent: u32) -> u32 {
        extent.div_ceil(WORKGROUP_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::constants::*;

    #[test]
    fn workgroup_count_rounds_up() {
        assert_eq!(workgroup_count(0), 0);
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(8), 1);
        assert_eq!(workgroup_count(9), 2);
        assert_eq!(workgroup_count(1280), 160);
        assert_eq!(workgroup_count(721), 91);
    }
}
