//! Brick atlas: a fixed pool of 8³ voxel bricks packed into one 3D image.

use ash::vk;
use brickmarch_core::constants::BRICK_SIZE;
use brickmarch_core::Error;
use brickmarch_gpu::barrier::{image_transition, record_image_barriers, Access, COLOR_SUBRESOURCE_RANGE};
use brickmarch_gpu::{GpuAllocator, GpuImage, Result};
use glam::UVec3;
use gpu_allocator::MemoryLocation;

/// Distance stored in voxels of bricks that were never written.
pub const EMPTY_DISTANCE: f32 = 1000.0;

/// Handle to one allocated brick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BrickId {
    slot: u32,
    coord: UVec3,
}

impl BrickId {
    /// Linear slot index inside the atlas.
    pub fn slot(self) -> u32 {
        self.slot
    }

    /// Brick coordinate inside the atlas, in bricks.
    pub fn coord(self) -> UVec3 {
        self.coord
    }

    /// First voxel of this brick inside the atlas image.
    pub fn voxel_origin(self) -> UVec3 {
        self.coord * BRICK_SIZE
    }

    /// Value stored in the sparse index grid for this brick.
    pub fn index_entry(self) -> u32 {
        self.slot + 1
    }
}

/// Occupancy table over a fixed number of brick slots.
///
/// `allocate` hands out the lowest free slot. Slot `i` maps to atlas
/// coordinate `(i % x, (i % (x * y)) / x, i / (x * y))`.
#[derive(Clone, Debug)]
pub struct BrickAllocator {
    dims: UVec3,
    occupied: Vec<bool>,
    live: u32,
}

impl BrickAllocator {
    /// Create an empty allocator over `dims` bricks per axis.
    pub fn new(dims: UVec3) -> Self {
        let capacity = dims.x * dims.y * dims.z;
        Self {
            dims,
            occupied: vec![false; capacity as usize],
            live: 0,
        }
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn capacity(&self) -> u32 {
        self.occupied.len() as u32
    }

    /// Number of occupied slots.
    pub fn live_count(&self) -> u32 {
        self.live
    }

    pub fn is_occupied(&self, slot: u32) -> bool {
        self.occupied.get(slot as usize).copied().unwrap_or(false)
    }

    /// Handle for `slot`, if it lies inside the atlas.
    pub fn id(&self, slot: u32) -> Option<BrickId> {
        (slot < self.capacity()).then(|| self.unflatten(slot))
    }

    fn unflatten(&self, slot: u32) -> BrickId {
        let layer = self.dims.x * self.dims.y;
        BrickId {
            slot,
            coord: UVec3::new(slot % self.dims.x, (slot % layer) / self.dims.x, slot / layer),
        }
    }

    /// Claim the lowest free slot.
    pub fn allocate(&mut self) -> brickmarch_core::Result<BrickId> {
        let Some(slot) = self.occupied.iter().position(|&used| !used) else {
            tracing::warn!(capacity = self.capacity(), "Brick atlas exhausted");
            return Err(Error::AllocationExhausted {
                capacity: self.capacity(),
            });
        };
        self.occupied[slot] = true;
        self.live += 1;
        Ok(self.unflatten(slot as u32))
    }

    /// Release a brick. Freeing a free slot or an id outside the atlas does
    /// nothing.
    pub fn free(&mut self, id: BrickId) {
        self.free_slot(id.slot);
    }

    pub fn free_slot(&mut self, slot: u32) {
        if let Some(used) = self.occupied.get_mut(slot as usize) {
            if *used {
                *used = false;
                self.live -= 1;
            }
        }
    }
}

/// GPU brick atlas: an `R16_SFLOAT` 3D image plus its occupancy table.
pub struct BrickAtlas {
    allocator: BrickAllocator,
    image: GpuImage,
}

impl BrickAtlas {
    /// Create the atlas image for `dims` bricks per axis.
    pub fn new(gpu: &GpuAllocator, dims: UVec3) -> Result<Self> {
        let extent = dims * BRICK_SIZE;
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_3D)
            .format(vk::Format::R16_SFLOAT)
            .extent(vk::Extent3D {
                width: extent.x,
                height: extent.y,
                depth: extent.z,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_DST)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = gpu.create_image(
            &image_info,
            vk::ImageViewType::TYPE_3D,
            MemoryLocation::GpuOnly,
            "brick_atlas",
        )?;

        let allocator = BrickAllocator::new(dims);
        tracing::info!(
            "Created brick atlas: {}x{}x{} bricks ({} slots)",
            dims.x,
            dims.y,
            dims.z,
            allocator.capacity()
        );

        Ok(Self { allocator, image })
    }

    /// Move the atlas to GENERAL and fill it with [`EMPTY_DISTANCE`].
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn record_init(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        let image = self.image.handle();
        record_image_barriers(
            device,
            cmd,
            &[image_transition(
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::GENERAL,
                Access::NONE,
                Access::TRANSFER_WRITE,
            )],
        );

        let clear = vk::ClearColorValue {
            float32: [EMPTY_DISTANCE, 0.0, 0.0, 0.0],
        };
        device.cmd_clear_color_image(
            cmd,
            image,
            vk::ImageLayout::GENERAL,
            &clear,
            &[COLOR_SUBRESOURCE_RANGE],
        );

        record_image_barriers(
            device,
            cmd,
            &[image_transition(
                image,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::GENERAL,
                Access::TRANSFER_WRITE,
                Access::COMPUTE_READ_WRITE,
            )],
        );
    }

    pub fn allocate(&mut self) -> brickmarch_core::Result<BrickId> {
        self.allocator.allocate()
    }

    pub fn free(&mut self, id: BrickId) {
        self.allocator.free(id);
    }

    pub fn allocator(&self) -> &BrickAllocator {
        &self.allocator
    }

    pub(crate) fn allocator_mut(&mut self) -> &mut BrickAllocator {
        &mut self.allocator
    }

    pub fn image(&self) -> &GpuImage {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free_slot() {
        let mut bricks = BrickAllocator::new(UVec3::new(2, 2, 2));
        let ids: Vec<u32> = (0..3).map(|_| bricks.allocate().unwrap().slot()).collect();
        assert_eq!(ids, [0, 1, 2]);

        let one = bricks.id(1).unwrap();
        bricks.free(one);
        assert_eq!(bricks.allocate().unwrap().slot(), 1);
        assert_eq!(bricks.live_count(), 3);
    }

    #[test]
    fn exhausted_pool_fails_without_changing_occupancy() {
        let mut bricks = BrickAllocator::new(UVec3::new(2, 1, 1));
        bricks.allocate().unwrap();
        bricks.allocate().unwrap();

        let before = bricks.clone();
        let err = bricks.allocate().unwrap_err();
        assert_eq!(err, Error::AllocationExhausted { capacity: 2 });
        assert_eq!(bricks.live_count(), before.live_count());
        assert_eq!(bricks.occupied, before.occupied);
    }

    #[test]
    fn free_is_idempotent_and_ignores_foreign_ids() {
        let mut bricks = BrickAllocator::new(UVec3::new(2, 2, 1));
        let id = bricks.allocate().unwrap();
        bricks.free(id);
        bricks.free(id);
        assert_eq!(bricks.live_count(), 0);

        let foreign = BrickAllocator::new(UVec3::splat(4)).id(40).unwrap();
        bricks.free(foreign);
        bricks.free_slot(u32::MAX);
        assert_eq!(bricks.live_count(), 0);
        assert!(!bricks.is_occupied(0));
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        let mut bricks = BrickAllocator::new(UVec3::new(3, 2, 1));
        let mut held = Vec::new();
        // Deterministic interleaving of allocations and frees.
        for step in 0u32..200 {
            if step % 3 == 2 && !held.is_empty() {
                let victim = held.remove((step as usize * 7) % held.len());
                bricks.free(victim);
            } else if let Ok(id) = bricks.allocate() {
                assert!(!held.contains(&id));
                held.push(id);
            }
            assert!(bricks.live_count() <= bricks.capacity());
            assert_eq!(bricks.live_count() as usize, held.len());
        }
    }

    #[test]
    fn slots_unflatten_row_major() {
        let bricks = BrickAllocator::new(UVec3::new(4, 3, 2));
        assert_eq!(bricks.id(0).unwrap().coord(), UVec3::ZERO);
        assert_eq!(bricks.id(5).unwrap().coord(), UVec3::new(1, 1, 0));
        assert_eq!(bricks.id(13).unwrap().coord(), UVec3::new(1, 0, 1));
        assert_eq!(bricks.id(23).unwrap().coord(), UVec3::new(3, 2, 1));
        assert!(bricks.id(24).is_none());
        assert_eq!(bricks.id(13).unwrap().voxel_origin(), UVec3::new(8, 0, 8));
        assert_eq!(bricks.id(13).unwrap().index_entry(), 14);
    }
}
