//! Per-frame parameter block for the raymarch dispatch.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Shading mode of the raymarch pass.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Lit materials (default).
    #[default]
    Lit = 0,
    /// Surface normals as RGB.
    Normals = 1,
    /// Heatmap of march steps per pixel.
    Complexity = 2,
}

impl RenderMode {
    /// Cycle to the next mode.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Lit => Self::Normals,
            Self::Normals => Self::Complexity,
            Self::Complexity => Self::Lit,
        }
    }

    /// Get the mode as a u32 for shader push constants.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Lit => "Lit",
            Self::Normals => "Normals",
            Self::Complexity => "Complexity",
        }
    }
}

/// Brush footprint drawn on the terrain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushCursor {
    pub position: Vec3,
    /// World-space radius.
    pub radius: f32,
}

/// Pick coordinates meaning "no pick this frame".
pub const NO_PICK: [f32; 2] = [-1.0, -1.0];

/// Push constants for `sdf_raymarch.comp`.
///
/// ```glsl
/// layout(push_constant) uniform FrameParams {
///     vec4 camPos;             // offset 0
///     vec4 camDir;             // offset 16
///     vec2 resolution;         // offset 32
///     float time;              // offset 40
///     float editCount;         // offset 44
///     uint renderMode;         // offset 48
///     uint showGround;         // offset 52
///     vec2 pickCoords;         // offset 56
///     vec4 brushCursor;        // offset 64
///     uint showGrid;           // offset 80
///     float terrainSize;       // offset 84
///     float terrainHeightScale;// offset 88
///     float _pad;              // offset 92
/// } params;
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameParams {
    pub cam_pos: [f32; 4],
    pub cam_dir: [f32; 4],
    pub resolution: [f32; 2],
    pub time: f32,
    /// `min(live edits, 256)`, as a float.
    pub edit_count: f32,
    pub render_mode: u32,
    pub show_ground: u32,
    pub pick: [f32; 2],
    /// xyz = world position, w = radius (0 = hidden).
    pub brush_cursor: [f32; 4],
    pub show_grid: u32,
    pub terrain_size: f32,
    pub terrain_height_scale: f32,
    pub _pad: f32,
}

impl FrameParams {
    /// Size in bytes (96).
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Parameters for a frame with nothing but a camera.
    pub fn new(position: Vec3, direction: Vec3, width: u32, height: u32) -> Self {
        Self {
            cam_pos: position.extend(0.0).to_array(),
            cam_dir: direction.normalize_or_zero().extend(0.0).to_array(),
            resolution: [width as f32, height as f32],
            time: 0.0,
            edit_count: 0.0,
            render_mode: RenderMode::Lit.as_u32(),
            show_ground: 1,
            pick: NO_PICK,
            brush_cursor: [0.0; 4],
            show_grid: 0,
            terrain_size: 64.0,
            terrain_height_scale: 1.0,
            _pad: 0.0,
        }
    }

    #[must_use]
    pub fn with_time(mut self, time: f32) -> Self {
        self.time = time;
        self
    }

    #[must_use]
    pub fn with_edit_count(mut self, count: usize) -> Self {
        self.edit_count = count as f32;
        self
    }

    #[must_use]
    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode.as_u32();
        self
    }

    #[must_use]
    pub fn with_overlays(mut self, show_ground: bool, show_grid: bool) -> Self {
        self.show_ground = u32::from(show_ground);
        self.show_grid = u32::from(show_grid);
        self
    }

    /// Request a pick at pixel `coords`, or clear it with `None`.
    #[must_use]
    pub fn with_pick(mut self, coords: Option<Vec2>) -> Self {
        self.pick = coords.map_or(NO_PICK, |c| c.to_array());
        self
    }

    #[must_use]
    pub fn with_brush_cursor(mut self, cursor: Option<BrushCursor>) -> Self {
        self.brush_cursor = cursor.map_or([0.0; 4], |c| c.position.extend(c.radius).to_array());
        self
    }

    #[must_use]
    pub fn with_terrain(mut self, world_size: f32, height_scale: f32) -> Self {
        self.terrain_size = world_size;
        self.terrain_height_scale = height_scale;
        self
    }

    /// Whether this frame asks the shader to resolve a pick.
    pub fn has_pick(&self) -> bool {
        self.pick[0] >= 0.0 && self.pick[1] >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_params_layout() {
        assert_eq!(FrameParams::SIZE, 96);
        assert_eq!(std::mem::offset_of!(FrameParams, cam_dir), 16);
        assert_eq!(std::mem::offset_of!(FrameParams, resolution), 32);
        assert_eq!(std::mem::offset_of!(FrameParams, time), 40);
        assert_eq!(std::mem::offset_of!(FrameParams, edit_count), 44);
        assert_eq!(std::mem::offset_of!(FrameParams, render_mode), 48);
        assert_eq!(std::mem::offset_of!(FrameParams, show_ground), 52);
        assert_eq!(std::mem::offset_of!(FrameParams, pick), 56);
        assert_eq!(std::mem::offset_of!(FrameParams, brush_cursor), 64);
        assert_eq!(std::mem::offset_of!(FrameParams, show_grid), 80);
        assert_eq!(std::mem::offset_of!(FrameParams, terrain_size), 84);
    }

    #[test]
    fn pick_defaults_to_sentinel() {
        let params = FrameParams::new(Vec3::ZERO, Vec3::Z, 64, 32);
        assert_eq!(params.pick, NO_PICK);
        assert!(!params.has_pick());

        let picked = params.with_pick(Some(Vec2::new(10.0, 3.0)));
        assert!(picked.has_pick());
        assert!(!picked.with_pick(None).has_pick());
    }

    #[test]
    fn render_mode_cycles() {
        assert_eq!(RenderMode::Lit.next(), RenderMode::Normals);
        assert_eq!(RenderMode::Complexity.next(), RenderMode::Lit);
        assert_eq!(RenderMode::Complexity.as_u32(), 2);
    }

    #[test]
    fn brush_cursor_packs_radius_in_w() {
        let cursor = BrushCursor {
            position: Vec3::new(1.0, 2.0, 3.0),
            radius: 4.0,
        };
        let params = FrameParams::new(Vec3::ZERO, Vec3::Z, 1, 1).with_brush_cursor(Some(cursor));
        assert_eq!(params.brush_cursor, [1.0, 2.0, 3.0, 4.0]);
    }
}
