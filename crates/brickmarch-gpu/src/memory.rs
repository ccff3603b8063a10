//! GPU memory management.
//!
//! Buffers and images own their Vulkan handles and their allocation and
//! release both when dropped, so every exit path (including `?` on an
//! error) frees what was created.

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::barrier::COLOR_SUBRESOURCE_RANGE;
use crate::error::{GpuError, Result};

/// Shared handle to the GPU memory allocator.
///
/// Cloning is cheap; every resource created here keeps a clone so it can
/// return its memory on drop.
#[derive(Clone)]
pub struct GpuAllocator {
    inner: Arc<Mutex<Option<Allocator>>>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Mutex::new(Some(allocator))),
            device,
        })
    }

    /// The device resources are created on.
    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    fn allocate(&self, desc: &AllocationCreateDesc<'_>) -> Result<Allocation> {
        self.inner
            .lock()
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator has been shut down".to_string()))?
            .allocate(desc)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    fn free(&self, allocation: Allocation) {
        if let Some(allocator) = self.inner.lock().as_mut() {
            if let Err(e) = allocator.free(allocation) {
                tracing::warn!("Failed to free GPU allocation: {e}");
            }
        }
    }

    /// Allocate a buffer.
    pub fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // From here on the buffer's Drop releases both handle and memory.
        let gpu_buffer = GpuBuffer {
            buffer,
            allocation: Some(allocation),
            size,
            allocator: self.clone(),
        };

        if let Some(allocation) = gpu_buffer.allocation.as_ref() {
            unsafe {
                self.device
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
            }
        }

        Ok(gpu_buffer)
    }

    /// Allocate an image and create a full-resource color view for it.
    pub fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo,
        view_type: vk::ImageViewType,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        let image = unsafe { self.device.create_image(create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let mut gpu_image = GpuImage {
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
            allocator: self.clone(),
        };

        if let Some(allocation) = gpu_image.allocation.as_ref() {
            unsafe {
                self.device
                    .bind_image_memory(image, allocation.memory(), allocation.offset())?;
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(create_info.format)
            .subresource_range(COLOR_SUBRESOURCE_RANGE);

        gpu_image.view = unsafe {
            self.device
                .create_image_view(&view_info, None)
                .map_err(|e| GpuError::Other(format!("Failed to create view for {name}: {e}")))?
        };

        Ok(gpu_image)
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed. Resources
    /// dropped afterwards only destroy their handles.
    pub fn shutdown(&self) {
        // Dropping the inner allocator releases every VkDeviceMemory block.
        drop(self.inner.lock().take());
    }
}

/// A GPU buffer with its allocation.
pub struct GpuBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    allocator: GpuAllocator,
}

impl GpuBuffer {
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Host view of the buffer memory, if it is mapped.
    pub fn mapped_bytes(&self) -> Option<&[u8]> {
        self.allocation.as_ref().and_then(Allocation::mapped_slice)
    }

    /// Mutable host view of the buffer memory, if it is mapped.
    pub fn mapped_bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.allocation
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
    }

    /// Write data to the start of the buffer (must be host-visible).
    pub fn write<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Write raw bytes at the given offset (must be host-visible).
    pub fn write_bytes(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(
                "Data range too large for buffer".to_string(),
            ));
        }

        let mapped = self
            .mapped_bytes_mut()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;
        mapped[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    /// Read a `T` from the start of the buffer (must be host-visible).
    pub fn read<T: Pod>(&self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let mapped = self
            .mapped_bytes()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;
        let bytes = mapped
            .get(..size)
            .ok_or_else(|| GpuError::InvalidState("Buffer smaller than value".to_string()))?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.allocator.free(allocation);
        }
        unsafe {
            self.allocator.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// A GPU image with its default view and allocation.
pub struct GpuImage {
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent3D,
    allocator: GpuAllocator,
}

impl GpuImage {
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        let device = &self.allocator.device;
        unsafe {
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
        }
        if let Some(allocation) = self.allocation.take() {
            self.allocator.free(allocation);
        }
        unsafe {
            device.destroy_image(self.image, None);
        }
    }
}
