//! Renderer configuration.

use std::path::{Path, PathBuf};

use brickmarch_core::constants::DEFAULT_FRAMES_IN_FLIGHT;
use brickmarch_gpu::{GpuError, Result};
use brickmarch_shaders::ComputeProgram;
use glam::UVec3;

/// Terrain heightmap/splatmap configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainConfig {
    /// Texels per side of the heightmap and splatmap.
    pub resolution: u32,
    /// World-space edge length covered by the terrain, centered on the origin.
    pub world_size: f32,
    /// Multiplier applied to stored heights when sampling.
    pub height_scale: f32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            resolution: 1024,
            world_size: 64.0,
            height_scale: 1.0,
        }
    }
}

/// Renderer configuration.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Output image width in pixels.
    pub width: u32,
    /// Output image height in pixels.
    pub height: u32,
    pub frames_in_flight: usize,
    /// Atlas size in bricks per axis.
    pub atlas_bricks: UVec3,
    /// Sparse index grid size in cells per axis.
    pub index_grid: UVec3,
    pub terrain: TerrainConfig,
    /// Directory holding the compiled compute programs.
    pub shader_dir: PathBuf,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            atlas_bricks: UVec3::splat(32),
            index_grid: UVec3::splat(64),
            terrain: TerrainConfig::default(),
            shader_dir: brickmarch_shaders::default_shader_dir(),
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    #[must_use]
    pub fn with_atlas_bricks(mut self, bricks: UVec3) -> Self {
        self.atlas_bricks = bricks;
        self
    }

    #[must_use]
    pub fn with_index_grid(mut self, cells: UVec3) -> Self {
        self.index_grid = cells;
        self
    }

    #[must_use]
    pub fn with_terrain(mut self, terrain: TerrainConfig) -> Self {
        self.terrain = terrain;
        self
    }

    #[must_use]
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    /// Reject configurations no GPU resource can be created for.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GpuError::InvalidState(format!(
                "output size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.frames_in_flight == 0 {
            return Err(GpuError::InvalidState(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.atlas_bricks.min_element() == 0 || self.index_grid.min_element() == 0 {
            return Err(GpuError::InvalidState(
                "atlas and index grid need at least one cell per axis".to_string(),
            ));
        }
        if self.terrain.resolution == 0 || self.terrain.world_size <= 0.0 {
            return Err(GpuError::InvalidState(
                "terrain resolution and world size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load a compute program, mapping any failure to a resource-load error.
pub fn load_program(dir: &Path, program: ComputeProgram) -> Result<Vec<u32>> {
    program.load(dir).map_err(|e| GpuError::ResourceLoad {
        path: e.path().to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_editor() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.atlas_bricks, UVec3::splat(32));
        assert_eq!(config.terrain.resolution, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_output() {
        let config = RendererConfig::new().with_size(0, 720);
        assert!(matches!(config.validate(), Err(GpuError::InvalidState(_))));
        let config = RendererConfig::new().with_frames_in_flight(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_program_is_a_resource_load_error() {
        let dir = std::env::temp_dir().join("brickmarch-render-no-shaders");
        let err = load_program(&dir, ComputeProgram::TerrainBrush).unwrap_err();
        match err {
            GpuError::ResourceLoad { path, .. } => {
                assert!(path.ends_with("terrain_brush.spv"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
