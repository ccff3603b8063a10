//! Terrain brush compute stage.
//!
//! Owns the heightmap/splatmap pair, the brush pipeline and the single
//! pending stroke. The same descriptor set is bound by the raymarch pass
//! as set 1 to sample the terrain.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use brickmarch_core::constants::workgroup_count;
use brickmarch_core::{BrushParams, BrushQueue, GpuBrushParams};
use brickmarch_gpu::barrier::{image_transition, record_image_barriers, Access, COLOR_SUBRESOURCE_RANGE};
use brickmarch_gpu::{
    write_storage_image, ComputePipeline, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder, GpuAllocator, GpuImage, Result,
};
use brickmarch_shaders::ComputeProgram;
use gpu_allocator::MemoryLocation;

use crate::config::{load_program, TerrainConfig};
use crate::terrain_mirror::TerrainMirror;

/// Splat weights of freshly created terrain: base layer only.
pub const BASE_LAYER_WEIGHTS: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

/// Brush compute stage and the terrain images it writes.
pub struct TerrainBrushStage {
    pipeline: ComputePipeline,
    descriptor_set: vk::DescriptorSet,
    // Dropped after the pipeline; the set is freed with the pool.
    _descriptor_pool: DescriptorPool,
    set_layout: DescriptorSetLayout,
    heightmap: GpuImage,
    splatmap: GpuImage,
    queue: BrushQueue,
    mirror: TerrainMirror,
    resolution: u32,
}

impl TerrainBrushStage {
    /// Create the terrain images and the brush pipeline.
    ///
    /// # Safety
    /// The device must be valid and support compute shaders.
    pub unsafe fn new(
        device: &Arc<ash::Device>,
        gpu: &GpuAllocator,
        config: &TerrainConfig,
        shader_dir: &Path,
    ) -> Result<Self> {
        // 1. Descriptor set layout shared with the raymarch pass
        // Binding 0: heightmap (r32f)
        // Binding 1: splatmap (rgba8)
        let layout_builder = DescriptorSetLayoutBuilder::new()
            .storage_image(0, vk::ShaderStageFlags::COMPUTE)
            .storage_image(1, vk::ShaderStageFlags::COMPUTE);
        let image_count = layout_builder.count_of(vk::DescriptorType::STORAGE_IMAGE);
        let set_layout = layout_builder.build(device)?;

        // 2. Brush pipeline
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(GpuBrushParams::SIZE);
        let shader_code = load_program(shader_dir, ComputeProgram::TerrainBrush)?;
        let pipeline = ComputePipeline::new(
            device,
            &shader_code,
            &[set_layout.handle()],
            &[push_constant_range],
        )?;

        // 3. Terrain images
        let resolution = config.resolution;
        let heightmap = create_terrain_image(gpu, resolution, vk::Format::R32_SFLOAT, "terrain_heightmap")?;
        let splatmap = create_terrain_image(gpu, resolution, vk::Format::R8G8B8A8_UNORM, "terrain_splatmap")?;

        // 4. Descriptor set
        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::STORAGE_IMAGE)
            .descriptor_count(image_count)];
        let descriptor_pool = DescriptorPool::new(device, 1, &pool_sizes)?;
        let descriptor_set = descriptor_pool.allocate_one(set_layout.handle())?;
        write_storage_image(device, descriptor_set, 0, heightmap.view(), vk::ImageLayout::GENERAL);
        write_storage_image(device, descriptor_set, 1, splatmap.view(), vk::ImageLayout::GENERAL);

        tracing::info!(
            "Created terrain brush stage: {resolution}x{resolution} texels over {} world units",
            config.world_size
        );

        Ok(Self {
            pipeline,
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            set_layout,
            heightmap,
            splatmap,
            queue: BrushQueue::new(),
            mirror: TerrainMirror::new(config),
            resolution,
        })
    }

    /// Clear the heightmap to 0 and the splatmap to the base layer.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn record_init(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        let images = [self.heightmap.handle(), self.splatmap.handle()];

        let to_general = images.map(|image| {
            image_transition(
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::GENERAL,
                Access::NONE,
                Access::TRANSFER_WRITE,
            )
        });
        record_image_barriers(device, cmd, &to_general);

        let height_clear = vk::ClearColorValue {
            float32: [0.0; 4],
        };
        let splat_clear = vk::ClearColorValue {
            float32: BASE_LAYER_WEIGHTS,
        };
        device.cmd_clear_color_image(
            cmd,
            self.heightmap.handle(),
            vk::ImageLayout::GENERAL,
            &height_clear,
            &[COLOR_SUBRESOURCE_RANGE],
        );
        device.cmd_clear_color_image(
            cmd,
            self.splatmap.handle(),
            vk::ImageLayout::GENERAL,
            &splat_clear,
            &[COLOR_SUBRESOURCE_RANGE],
        );

        let to_compute = images.map(|image| {
            image_transition(
                image,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::GENERAL,
                Access::TRANSFER_WRITE,
                Access::COMPUTE_READ_WRITE,
            )
        });
        record_image_barriers(device, cmd, &to_compute);
    }

    /// Make `params` the pending stroke, replacing any unexecuted one.
    ///
    /// Returns `true` if a pending stroke was discarded.
    pub fn queue_brush(&mut self, params: BrushParams) -> bool {
        self.queue.queue(params)
    }

    pub fn has_pending(&self) -> bool {
        self.queue.is_pending()
    }

    /// Strokes lost to coalescing so far.
    pub fn dropped_strokes(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// Record the pending stroke, if any, and mirror it on the host.
    ///
    /// The stroke's writes are made visible to later compute reads in the
    /// same submission. Returns the executed stroke.
    ///
    /// # Safety
    /// The command buffer must be recording and the terrain images must
    /// have been initialised with [`Self::record_init`].
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn execute_pending(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
    ) -> Option<BrushParams> {
        let params = self.queue.take()?;

        self.pipeline.bind(cmd);
        self.pipeline.bind_descriptor_sets(cmd, &[self.descriptor_set]);
        self.pipeline.push_constants(cmd, &params.to_gpu());

        let groups = workgroup_count(self.resolution);
        device.cmd_dispatch(cmd, groups, groups, 1);

        let barriers = [self.heightmap.handle(), self.splatmap.handle()].map(|image| {
            image_transition(
                image,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::GENERAL,
                Access::COMPUTE_WRITE,
                Access::COMPUTE_READ_WRITE,
            )
        });
        record_image_barriers(device, cmd, &barriers);

        self.mirror.apply(&params);
        tracing::trace!(mode = ?params.mode, u = params.center.x, v = params.center.y, "Brush executed");
        Some(params)
    }

    /// Terrain set bound by the brush pass (set 0) and the raymarch pass (set 1).
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    pub fn set_layout(&self) -> &DescriptorSetLayout {
        &self.set_layout
    }

    pub fn mirror(&self) -> &TerrainMirror {
        &self.mirror
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }
}

fn create_terrain_image(
    gpu: &GpuAllocator,
    resolution: u32,
    format: vk::Format,
    name: &str,
) -> Result<GpuImage> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: resolution,
            height: resolution,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_DST)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    gpu.create_image(&image_info, vk::ImageViewType::TYPE_2D, MemoryLocation::GpuOnly, name)
}
