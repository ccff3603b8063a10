//! Per-frame sequencing of the compute stages.
//!
//! One frame is one submission on the single compute queue:
//! host commands → edit upload → index upload → pending brush → raymarch
//! → pick visibility → output transition (and optional readback).

use std::sync::Arc;

use ash::vk;
use brickmarch_core::{BrushParams, SdfEdit, Selection};
use brickmarch_gpu::{CommandPool, FrameRing, GpuContext, Result};
use glam::{UVec3, Vec2};

use crate::brick_atlas::{BrickAtlas, BrickId};
use crate::config::RendererConfig;
use crate::edit_buffer::{EditBuffer, EditList, UploadStats};
use crate::picking::{PickState, PickingChannel};
use crate::raymarch_stage::{RaymarchBindings, RaymarchStage};
use crate::session::{CommandEffect, EditorSession, SceneCommand};
use crate::sparse_index::{assign_brick, release_brick, SparseIndexGrid};
use crate::terrain::TerrainBrushStage;
use crate::terrain_mirror::TerrainMirror;

/// What one call to [`FrameOrchestrator::render_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame_number: u64,
    pub slot: usize,
    /// Set when this frame's edit mirror was rewritten.
    pub edits_uploaded: Option<UploadStats>,
    pub index_uploaded: bool,
    pub brush: Option<BrushParams>,
    pub pick: Option<Vec2>,
}

/// Owns every GPU stage and drives them frame by frame.
///
/// Must be dropped before the [`GpuContext`] it was created from.
pub struct FrameOrchestrator {
    // Dropped first so in-flight frames finish before resources go away.
    ring: FrameRing,
    raymarch: RaymarchStage,
    terrain: TerrainBrushStage,
    edit_buffer: EditBuffer,
    index: SparseIndexGrid,
    atlas: BrickAtlas,
    edits: EditList,
    picking: PickingChannel,
    config: RendererConfig,
    queue: vk::Queue,
    device: Arc<ash::Device>,
}

impl FrameOrchestrator {
    /// Create every stage and initialise the GPU images.
    ///
    /// Missing compute programs fail here with `GpuError::ResourceLoad`.
    pub fn new(ctx: &GpuContext, config: RendererConfig, scene: Vec<SdfEdit>) -> Result<Self> {
        config.validate()?;

        let device = Arc::clone(ctx.device());
        let gpu = ctx.allocator();
        let frames = config.frames_in_flight;

        let atlas = BrickAtlas::new(gpu, config.atlas_bricks)?;
        let index = SparseIndexGrid::new(gpu, config.index_grid)?;
        let edit_buffer = EditBuffer::new(gpu, frames)?;

        let (terrain, raymarch, ring) = unsafe {
            let terrain =
                TerrainBrushStage::new(&device, gpu, &config.terrain, &config.shader_dir)?;
            let raymarch = RaymarchStage::new(
                &device,
                gpu,
                config.width,
                config.height,
                frames,
                &RaymarchBindings {
                    atlas: &atlas,
                    index: &index,
                    edits: &edit_buffer,
                    terrain_layout: terrain.set_layout(),
                },
                &config.shader_dir,
            )?;
            let ring = FrameRing::new(&device, ctx.queue_family(), frames)?;

            let init_pool =
                CommandPool::new(&device, ctx.queue_family(), vk::CommandPoolCreateFlags::TRANSIENT)?;
            init_pool.execute_single_time_commands(ctx.queue(), |cmd| {
                atlas.record_init(&device, cmd);
                index.record_init(&device, cmd);
                terrain.record_init(&device, cmd);
            })?;

            (terrain, raymarch, ring)
        };

        tracing::info!(
            "Frame orchestrator ready on {}: {} edits, {} frames in flight",
            ctx.device_name(),
            scene.len(),
            frames
        );

        Ok(Self {
            ring,
            raymarch,
            terrain,
            edit_buffer,
            index,
            atlas,
            edits: EditList::from_edits(scene),
            picking: PickingChannel::new(),
            config,
            queue: ctx.queue(),
            device,
        })
    }

    /// Apply the session's queued commands in submission order.
    pub fn apply_commands(&mut self, session: &mut EditorSession) {
        for command in session.take_commands() {
            match session.apply(command, &mut self.edits) {
                CommandEffect::None => {}
                CommandEffect::Pick(coords) => self.picking.trigger(coords.x, coords.y),
                CommandEffect::Brush(params) => {
                    self.terrain.queue_brush(params);
                }
            }
        }
    }

    /// Record and submit one frame.
    ///
    /// With `readback` set, the output is copied to host memory and this
    /// call waits for the frame to finish so [`Self::read_output`] sees it.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn render_frame(
        &mut self,
        session: &mut EditorSession,
        readback: bool,
    ) -> Result<FrameReport> {
        // All host-side mutation lands before recording starts.
        self.apply_commands(session);

        let device = &*self.device;
        unsafe {
            let token = self.ring.begin()?;
            let cmd = token.command_buffer;

            let edits_uploaded = self.edit_buffer.sync(token.slot, &self.edits)?;

            if self.index.table().is_dirty() {
                // The staging buffer is shared across frame slots.
                self.ring.wait_all()?;
            }
            let index_uploaded = self.index.record_upload(device, cmd)?;

            let brush = self.terrain.execute_pending(device, cmd);

            let pick = self.picking.take_frame_request();
            let params = session.frame_params(
                self.config.width,
                self.config.height,
                &self.edits,
                self.terrain.mirror(),
                pick,
            );
            self.raymarch
                .record(device, cmd, token.slot, &params, self.terrain.descriptor_set())?;
            if pick.is_some() {
                self.picking
                    .record_host_visibility(device, cmd, self.raymarch.selection_buffer());
            }
            self.raymarch.record_output_transition(device, cmd, readback);

            self.ring.submit(self.queue)?;
            if readback {
                self.ring.wait_slot(token.slot)?;
            }

            Ok(FrameReport {
                frame_number: token.frame_number,
                slot: token.slot,
                edits_uploaded,
                index_uploaded,
                brush,
                pick,
            })
        }
    }

    /// Read and consume the latest pick result.
    ///
    /// Without a wait, this may return the previous frame's answer.
    pub fn selection(&mut self) -> Result<Option<Selection>> {
        let storage = self.raymarch.selection_mut()?;
        Ok(self.picking.get_selection(storage))
    }

    /// Read the latest pick and select what it landed on.
    pub fn resolve_pick(&mut self, session: &mut EditorSession) -> Result<Option<Selection>> {
        let selection = self.selection()?;
        if let Some(hit) = &selection {
            session.apply_selection(hit, &self.edits);
        }
        Ok(selection)
    }

    /// Point the brush at output pixel `cursor` and queue a stroke there.
    ///
    /// Returns `false` if the cursor is not over the terrain.
    pub fn brush_at_cursor(&self, session: &mut EditorSession, cursor: Vec2) -> bool {
        let stroke = session.brush_at_cursor(
            cursor,
            self.config.width,
            self.config.height,
            self.terrain.mirror(),
        );
        match stroke {
            Some(params) => {
                session.submit(SceneCommand::Brush(params));
                true
            }
            None => false,
        }
    }

    /// Claim a brick and point index cell `cell` at it.
    ///
    /// A brick the cell held before is released.
    pub fn allocate_brick(&mut self, cell: UVec3) -> Result<BrickId> {
        Ok(assign_brick(
            self.atlas.allocator_mut(),
            self.index.table_mut(),
            cell,
        )?)
    }

    /// Clear index cell `cell` and release its brick. Returns the freed slot.
    pub fn free_brick(&mut self, cell: UVec3) -> Result<Option<u32>> {
        Ok(release_brick(
            self.atlas.allocator_mut(),
            self.index.table_mut(),
            cell,
        )?)
    }

    /// RGBA8 pixels of the last frame rendered with readback.
    pub fn read_output(&self) -> Result<Vec<u8>> {
        self.raymarch.read_output()
    }

    /// Block until every submitted frame has finished.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.ring.wait_all() }
    }

    pub fn edits(&self) -> &EditList {
        &self.edits
    }

    pub fn terrain(&self) -> &TerrainMirror {
        self.terrain.mirror()
    }

    pub fn brush_pending(&self) -> bool {
        self.terrain.has_pending()
    }

    pub fn pick_state(&self) -> PickState {
        self.picking.state()
    }

    pub fn atlas(&self) -> &BrickAtlas {
        &self.atlas
    }

    pub fn index(&self) -> &SparseIndexGrid {
        &self.index
    }

    pub fn frame_number(&self) -> u64 {
        self.ring.frame_number()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.raymarch.dimensions()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}
