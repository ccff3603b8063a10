//! Descriptor layouts, pools, and storage-resource writes.
//!
//! Every compute stage binds storage images and buffers only.

use std::sync::Arc;

use ash::vk;

use crate::error::{GpuError, Result};

/// Collects bindings for a [`DescriptorSetLayout`].
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Append a binding of `count` descriptors.
    #[must_use]
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Storage buffer at `binding`.
    #[must_use]
    pub fn storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags)
    }

    /// Storage image at `binding`, used in `GENERAL` layout.
    #[must_use]
    pub fn storage_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_IMAGE, 1, stage_flags)
    }

    /// Number of descriptors of `descriptor_type` in this layout, for pool sizing.
    pub fn count_of(&self, descriptor_type: vk::DescriptorType) -> u32 {
        self.bindings
            .iter()
            .filter(|b| b.descriptor_type == descriptor_type)
            .map(|b| b.descriptor_count)
            .sum()
    }

    /// Create the layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &Arc<ash::Device>) -> Result<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        let layout = device.create_descriptor_set_layout(&layout_info, None)?;
        Ok(DescriptorSetLayout {
            layout,
            device: Arc::clone(device),
        })
    }
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor set layout, destroyed on drop.
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Arc<ash::Device>,
}

impl DescriptorSetLayout {
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool for allocating descriptor sets. Destroying the pool on
/// drop frees every set allocated from it.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Arc<ash::Device>,
}

impl DescriptorPool {
    /// Create a pool that can hold `max_sets` sets.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &Arc<ash::Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = device.create_descriptor_pool(&create_info, None)?;
        Ok(Self {
            pool,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate one set per entry of `layouts`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = self.device.allocate_descriptor_sets(&alloc_info)?;
        Ok(sets)
    }

    /// Allocate exactly one descriptor set.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_one(&self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        self.allocate(std::slice::from_ref(&layout))?
            .pop()
            .ok_or_else(|| GpuError::Other("descriptor pool returned no set".to_string()))
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Point `binding` of `dst_set` at a buffer range.
///
/// # Safety
/// Device and buffer must be valid.
pub unsafe fn write_storage_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: u64,
    range: u64,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
        .buffer_info(std::slice::from_ref(&buffer_info));

    device.update_descriptor_sets(&[write], &[]);
}

/// Point `binding` of `dst_set` at an image view.
///
/// # Safety
/// Device and image view must be valid.
pub unsafe fn write_storage_image(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
    layout: vk::ImageLayout,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .image_layout(layout);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .image_info(std::slice::from_ref(&image_info));

    device.update_descriptor_sets(&[write], &[]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_counts_descriptor_types() {
        let builder = DescriptorSetLayoutBuilder::new()
            .storage_image(0, vk::ShaderStageFlags::COMPUTE)
            .storage_image(1, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(2, vk::ShaderStageFlags::COMPUTE);

        assert_eq!(builder.count_of(vk::DescriptorType::STORAGE_IMAGE), 2);
        assert_eq!(builder.count_of(vk::DescriptorType::STORAGE_BUFFER), 1);
        assert_eq!(builder.count_of(vk::DescriptorType::UNIFORM_BUFFER), 0);
    }
}
