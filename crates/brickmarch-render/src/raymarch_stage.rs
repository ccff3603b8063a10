//! Raymarch compute stage.
//!
//! Marches the edit list and the terrain into the output image with one
//! 8×8-workgroup dispatch per frame, and writes the pick result for the
//! requested pixel into the selection buffer.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use brickmarch_core::constants::workgroup_count;
use brickmarch_core::GpuSelection;
use brickmarch_gpu::barrier::{
    image_transition, record_buffer_barrier, record_image_barriers, Access, COLOR_SUBRESOURCE_LAYERS,
};
use brickmarch_gpu::{
    write_storage_buffer, write_storage_image, ComputePipeline, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder, GpuAllocator, GpuBuffer, GpuError, GpuImage, Result,
};
use brickmarch_shaders::ComputeProgram;
use gpu_allocator::MemoryLocation;

use crate::brick_atlas::BrickAtlas;
use crate::config::load_program;
use crate::edit_buffer::{EditBuffer, EDIT_BUFFER_SIZE};
use crate::params::FrameParams;
use crate::sparse_index::SparseIndexGrid;

/// Last use of the output image by the previous frame on this queue.
const OUTPUT_PREVIOUS_USE: Access = Access::new(
    vk::PipelineStageFlags2::from_raw(
        vk::PipelineStageFlags2::COMPUTE_SHADER.as_raw() | vk::PipelineStageFlags2::TRANSFER.as_raw(),
    ),
    vk::AccessFlags2::NONE,
);

/// Resources the raymarch descriptor sets point at.
pub struct RaymarchBindings<'a> {
    pub atlas: &'a BrickAtlas,
    pub index: &'a SparseIndexGrid,
    pub edits: &'a EditBuffer,
    /// Layout of the terrain set, bound as set 1.
    pub terrain_layout: &'a DescriptorSetLayout,
}

/// Raymarch pipeline with its output image and selection buffer.
pub struct RaymarchStage {
    pipeline: ComputePipeline,
    /// One set per frame slot; they differ only in the edit mirror.
    descriptor_sets: Vec<vk::DescriptorSet>,
    _descriptor_pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,

    output_image: GpuImage,
    readback_buffer: GpuBuffer,
    selection_buffer: GpuBuffer,

    width: u32,
    height: u32,
}

impl RaymarchStage {
    /// Create the raymarch pipeline.
    ///
    /// A missing or malformed program fails here; nothing is retried per
    /// dispatch.
    ///
    /// # Safety
    /// The device must be valid and support compute shaders.
    pub unsafe fn new(
        device: &Arc<ash::Device>,
        gpu: &GpuAllocator,
        width: u32,
        height: u32,
        frames_in_flight: usize,
        bindings: &RaymarchBindings<'_>,
        shader_dir: &Path,
    ) -> Result<Self> {
        // 1. Descriptor set layout
        // Binding 0: brick atlas
        // Binding 1: sparse index
        // Binding 2: output image
        // Binding 3: edit buffer
        // Binding 4: selection buffer
        let layout_builder = DescriptorSetLayoutBuilder::new()
            .storage_image(0, vk::ShaderStageFlags::COMPUTE)
            .storage_image(1, vk::ShaderStageFlags::COMPUTE)
            .storage_image(2, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(3, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(4, vk::ShaderStageFlags::COMPUTE);
        let images_per_set = layout_builder.count_of(vk::DescriptorType::STORAGE_IMAGE);
        let buffers_per_set = layout_builder.count_of(vk::DescriptorType::STORAGE_BUFFER);
        let set_layout = layout_builder.build(device)?;

        // 2. Compute pipeline
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(FrameParams::SIZE);
        let shader_code = load_program(shader_dir, ComputeProgram::SdfRaymarch)?;
        let pipeline = ComputePipeline::new(
            device,
            &shader_code,
            &[set_layout.handle(), bindings.terrain_layout.handle()],
            &[push_constant_range],
        )?;

        // 3. Output image
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let output_image = gpu.create_image(
            &image_info,
            vk::ImageViewType::TYPE_2D,
            MemoryLocation::GpuOnly,
            "raymarch_output",
        )?;

        // 4. Readback buffer for CPU access
        let readback_buffer = gpu.create_buffer(
            u64::from(width) * u64::from(height) * 4,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            "raymarch_readback",
        )?;

        // 5. Selection buffer, starting at the "none" sentinel
        let mut selection_buffer = gpu.create_buffer(
            GpuSelection::SIZE,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::CpuToGpu,
            "selection",
        )?;
        selection_buffer.write(&[GpuSelection::NONE])?;

        // 6. Per-frame descriptor sets
        let frames = frames_in_flight as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(images_per_set * frames),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(buffers_per_set * frames),
        ];
        let descriptor_pool = DescriptorPool::new(device, frames, &pool_sizes)?;
        let layouts = vec![set_layout.handle(); frames_in_flight];
        let descriptor_sets = descriptor_pool.allocate(&layouts)?;

        for (slot, &set) in descriptor_sets.iter().enumerate() {
            let edit_mirror = bindings.edits.buffer(slot).ok_or_else(|| {
                GpuError::InvalidState(format!("no edit mirror for frame slot {slot}"))
            })?;

            let general = vk::ImageLayout::GENERAL;
            write_storage_image(device, set, 0, bindings.atlas.image().view(), general);
            write_storage_image(device, set, 1, bindings.index.image().view(), general);
            write_storage_image(device, set, 2, output_image.view(), general);
            write_storage_buffer(device, set, 3, edit_mirror.handle(), 0, EDIT_BUFFER_SIZE);
            write_storage_buffer(device, set, 4, selection_buffer.handle(), 0, GpuSelection::SIZE);
        }

        tracing::info!("Created raymarch stage: {width}x{height}, {frames_in_flight} frames in flight");

        Ok(Self {
            pipeline,
            descriptor_sets,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            output_image,
            readback_buffer,
            selection_buffer,
            width,
            height,
        })
    }

    /// Record the raymarch dispatch for frame `slot`.
    ///
    /// The output image is moved to GENERAL from an undefined state first.
    ///
    /// # Safety
    /// The command buffer must be recording, and the slot's edit mirror must
    /// already hold this frame's edits.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        slot: usize,
        params: &FrameParams,
        terrain_set: vk::DescriptorSet,
    ) -> Result<()> {
        let set = *self
            .descriptor_sets
            .get(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("no descriptor set for slot {slot}")))?;

        record_image_barriers(
            device,
            cmd,
            &[image_transition(
                self.output_image.handle(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::GENERAL,
                OUTPUT_PREVIOUS_USE,
                Access::COMPUTE_WRITE,
            )],
        );

        self.pipeline.bind(cmd);
        self.pipeline.bind_descriptor_sets(cmd, &[set, terrain_set]);
        self.pipeline.push_constants(cmd, params);

        device.cmd_dispatch(cmd, workgroup_count(self.width), workgroup_count(self.height), 1);
        Ok(())
    }

    /// Move the output image to TRANSFER_SRC_OPTIMAL for the downstream
    /// blit, optionally copying it into the readback buffer.
    ///
    /// # Safety
    /// The command buffer must be recording, after [`Self::record`].
    pub unsafe fn record_output_transition(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        readback: bool,
    ) {
        record_image_barriers(
            device,
            cmd,
            &[image_transition(
                self.output_image.handle(),
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                Access::COMPUTE_WRITE,
                Access::TRANSFER_READ,
            )],
        );

        if !readback {
            return;
        }

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(COLOR_SUBRESOURCE_LAYERS)
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: self.width,
                height: self.height,
                depth: 1,
            });
        device.cmd_copy_image_to_buffer(
            cmd,
            self.output_image.handle(),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            self.readback_buffer.handle(),
            &[region],
        );
        record_buffer_barrier(
            device,
            cmd,
            self.readback_buffer.handle(),
            Access::TRANSFER_WRITE,
            Access::HOST_READ,
        );
    }

    /// Read the rendered RGBA8 pixels from the readback buffer.
    ///
    /// Call this after the frame that recorded the readback has completed.
    pub fn read_output(&self) -> Result<Vec<u8>> {
        let size = self.width as usize * self.height as usize * 4;
        let bytes = self
            .readback_buffer
            .mapped_bytes()
            .ok_or_else(|| GpuError::InvalidState("Readback buffer not mapped".to_string()))?;
        bytes
            .get(..size)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| GpuError::InvalidState("Readback buffer too small".to_string()))
    }

    /// Host view of the selection buffer.
    pub fn selection_mut(&mut self) -> Result<&mut GpuSelection> {
        let bytes = self
            .selection_buffer
            .mapped_bytes_mut()
            .and_then(|bytes| bytes.get_mut(..GpuSelection::SIZE as usize))
            .ok_or_else(|| GpuError::InvalidState("Selection buffer not mapped".to_string()))?;
        bytemuck::try_from_bytes_mut(bytes)
            .map_err(|e| GpuError::InvalidState(format!("Selection buffer misaligned: {e}")))
    }

    pub fn selection_buffer(&self) -> vk::Buffer {
        self.selection_buffer.handle()
    }

    pub fn output(&self) -> &GpuImage {
        &self.output_image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
