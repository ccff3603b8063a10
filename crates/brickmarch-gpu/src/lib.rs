//! Vulkan abstraction layer for the Brickmarch SDF editor.
//!
//! This crate provides:
//! - Headless Vulkan instance and device management
//! - Memory allocation via gpu-allocator, with owning buffer/image handles
//! - Compute pipelines and descriptor helpers
//! - Command buffer management and the frames-in-flight ring
//! - Pipeline barrier helpers (synchronization2)

pub mod barrier;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod sync;

pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_storage_buffer, write_storage_image, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder,
};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::ComputePipeline;
pub use sync::{create_fence, FrameRing, FrameToken};
