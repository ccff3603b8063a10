//! Compute pipeline creation.

use std::sync::Arc;

use ash::vk;

use crate::error::{GpuError, Result};

/// Compute pipeline with its layout, destroyed on drop.
pub struct ComputePipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    device: Arc<ash::Device>,
}

impl ComputePipeline {
    /// Create a compute pipeline from SPIR-V words.
    ///
    /// # Safety
    /// The device must be valid and the shader code must be valid SPIR-V
    /// with a `main` entry point.
    pub unsafe fn new(
        device: &Arc<ash::Device>,
        shader_code: &[u32],
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let shader_info = vk::ShaderModuleCreateInfo::default().code(shader_code);
        let shader_module = device
            .create_shader_module(&shader_info, None)
            .map_err(|e| GpuError::ShaderCompilation(e.to_string()))?;

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = match device.create_pipeline_layout(&layout_info, None) {
            Ok(layout) => layout,
            Err(e) => {
                device.destroy_shader_module(shader_module, None);
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader_module)
            .name(c"main");

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_info)
            .layout(layout);

        let result =
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None);

        // The module is only needed during pipeline creation.
        device.destroy_shader_module(shader_module, None);

        let pipeline = match result {
            Ok(pipelines) => pipelines.first().copied(),
            Err((_pipelines, e)) => {
                device.destroy_pipeline_layout(layout, None);
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };
        let Some(pipeline) = pipeline else {
            device.destroy_pipeline_layout(layout, None);
            return Err(GpuError::PipelineCreation(
                "driver returned no pipeline".to_string(),
            ));
        };

        Ok(Self {
            pipeline,
            layout,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Bind this pipeline for compute dispatch.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn bind(&self, cmd: vk::CommandBuffer) {
        self.device
            .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline);
    }

    /// Bind descriptor sets starting at set 0.
    ///
    /// # Safety
    /// The command buffer must be recording and the sets must match the layout.
    pub unsafe fn bind_descriptor_sets(&self, cmd: vk::CommandBuffer, sets: &[vk::DescriptorSet]) {
        self.device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::COMPUTE,
            self.layout,
            0,
            sets,
            &[],
        );
    }

    /// Push a block of constants to the compute stage.
    ///
    /// # Safety
    /// The command buffer must be recording and `data` must fit the declared range.
    pub unsafe fn push_constants<T: bytemuck::Pod>(&self, cmd: vk::CommandBuffer, data: &T) {
        self.device.cmd_push_constants(
            cmd,
            self.layout,
            vk::ShaderStageFlags::COMPUTE,
            0,
            bytemuck::bytes_of(data),
        );
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
