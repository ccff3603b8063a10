//! Compute raymarching renderer and editor core for Brickmarch.
//!
//! This crate provides:
//! - Brick atlas allocation and the sparse index grid
//! - The scene edit list and its per-frame GPU mirrors
//! - The raymarch and terrain brush compute stages
//! - Asynchronous picking
//! - The editor session, its commands and the fly camera
//! - Frame orchestration with frames in flight

pub mod brick_atlas;
pub mod camera;
pub mod config;
pub mod edit_buffer;
pub mod frame;
pub mod params;
pub mod picking;
pub mod ray_march;
pub mod raymarch_stage;
pub mod screenshot;
pub mod session;
pub mod sparse_index;
pub mod terrain;
pub mod terrain_mirror;

pub use brick_atlas::{BrickAllocator, BrickAtlas, BrickId};
pub use camera::{Camera, FlyCamera};
pub use config::{RendererConfig, TerrainConfig};
pub use edit_buffer::{EditBuffer, EditList, UploadStats};
pub use frame::{FrameOrchestrator, FrameReport};
pub use params::{BrushCursor, FrameParams, RenderMode};
pub use picking::{PickState, PickingChannel};
pub use ray_march::{Ray, RayHit, RayMarchConfig};
pub use raymarch_stage::RaymarchStage;
pub use screenshot::{capture_screenshot, save_screenshot, ScreenshotError};
pub use session::{BrushSettings, CommandEffect, EditorSession, RenderSettings, SceneCommand};
pub use sparse_index::{IndexTable, SparseIndexGrid};
pub use terrain::TerrainBrushStage;
pub use terrain_mirror::TerrainMirror;
