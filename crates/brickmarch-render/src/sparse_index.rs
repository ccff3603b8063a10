//! Sparse index grid: a coarse `R32_UINT` 3D image mapping world cells to
//! brick slots. Entry `0` means "no brick", otherwise `slot + 1`.

use ash::vk;
use brickmarch_core::Error;
use brickmarch_gpu::barrier::{
    image_transition, record_image_barriers, Access, COLOR_SUBRESOURCE_LAYERS,
    COLOR_SUBRESOURCE_RANGE,
};
use brickmarch_gpu::{GpuAllocator, GpuBuffer, GpuImage, Result};
use glam::UVec3;
use gpu_allocator::MemoryLocation;

use crate::brick_atlas::{BrickAllocator, BrickId};

/// Entry value of a cell with no brick.
pub const EMPTY_CELL: u32 = 0;

/// Host copy of the index entries, in x-fastest order.
#[derive(Clone, Debug)]
pub struct IndexTable {
    dims: UVec3,
    entries: Vec<u32>,
    dirty: bool,
}

impl IndexTable {
    pub fn new(dims: UVec3) -> Self {
        Self {
            dims,
            entries: vec![EMPTY_CELL; (dims.x * dims.y * dims.z) as usize],
            dirty: false,
        }
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    fn cell_index(&self, cell: UVec3) -> Option<usize> {
        if cell.cmpge(self.dims).any() {
            return None;
        }
        Some(((cell.z * self.dims.y + cell.y) * self.dims.x + cell.x) as usize)
    }

    /// Point `cell` at `brick`, or clear it with `None`.
    pub fn set(&mut self, cell: UVec3, brick: Option<BrickId>) -> brickmarch_core::Result<()> {
        let index = self
            .cell_index(cell)
            .ok_or_else(|| Error::OutOfBounds(format!("index cell {cell} outside {}", self.dims)))?;
        let entry = brick.map_or(EMPTY_CELL, BrickId::index_entry);
        if self.entries[index] != entry {
            self.entries[index] = entry;
            self.dirty = true;
        }
        Ok(())
    }

    /// Brick slot referenced by `cell`, if any.
    pub fn get(&self, cell: UVec3) -> Option<u32> {
        let entry = self.entries[self.cell_index(cell)?];
        entry.checked_sub(1)
    }

    /// Number of cells that reference a brick.
    pub fn occupied_count(&self) -> usize {
        self.entries.iter().filter(|&&e| e != EMPTY_CELL).count()
    }

    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// Claim a brick and point `cell` at it.
///
/// A brick the cell referenced before is released. If `cell` lies outside
/// the grid, the new brick is returned to the pool and the error reported.
pub fn assign_brick(
    bricks: &mut BrickAllocator,
    table: &mut IndexTable,
    cell: UVec3,
) -> brickmarch_core::Result<BrickId> {
    let id = bricks.allocate()?;
    let previous = table.get(cell);
    if let Err(e) = table.set(cell, Some(id)) {
        bricks.free(id);
        return Err(e);
    }
    if let Some(slot) = previous {
        bricks.free_slot(slot);
    }
    Ok(id)
}

/// Clear `cell` and release the brick it referenced, returning its slot.
pub fn release_brick(
    bricks: &mut BrickAllocator,
    table: &mut IndexTable,
    cell: UVec3,
) -> brickmarch_core::Result<Option<u32>> {
    let Some(slot) = table.get(cell) else {
        return Ok(None);
    };
    table.set(cell, None)?;
    bricks.free_slot(slot);
    Ok(Some(slot))
}

/// GPU sparse index grid with a staging buffer for host updates.
pub struct SparseIndexGrid {
    table: IndexTable,
    image: GpuImage,
    staging: GpuBuffer,
}

impl SparseIndexGrid {
    pub fn new(gpu: &GpuAllocator, dims: UVec3) -> Result<Self> {
        let table = IndexTable::new(dims);

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_3D)
            .format(vk::Format::R32_UINT)
            .extent(vk::Extent3D {
                width: dims.x,
                height: dims.y,
                depth: dims.z,
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
            "sparse_index",
        )?;

        let staging = gpu.create_buffer(
            std::mem::size_of_val(table.entries()) as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "sparse_index_staging",
        )?;

        tracing::info!("Created sparse index grid: {}x{}x{}", dims.x, dims.y, dims.z);

        Ok(Self {
            table,
            image,
            staging,
        })
    }

    /// Move the grid to GENERAL and clear every cell to [`EMPTY_CELL`].
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
            uint32: [EMPTY_CELL; 4],
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

    pub fn set(&mut self, cell: UVec3, brick: Option<BrickId>) -> brickmarch_core::Result<()> {
        self.table.set(cell, brick)
    }

    pub fn get(&self, cell: UVec3) -> Option<u32> {
        self.table.get(cell)
    }

    pub fn table(&self) -> &IndexTable {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut IndexTable {
        &mut self.table
    }

    pub fn image(&self) -> &GpuImage {
        &self.image
    }

    /// Copy the host table to the image if it changed. Returns whether an
    /// upload was recorded.
    ///
    /// The staging buffer is shared by all frames in flight, so callers must
    /// only record an upload once earlier frames reading the grid are done.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn record_upload(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<bool> {
        if !self.table.is_dirty() {
            return Ok(false);
        }
        self.staging.write(self.table.entries())?;

        let image = self.image.handle();
        record_image_barriers(
            device,
            cmd,
            &[image_transition(
                image,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::GENERAL,
                Access::COMPUTE_READ_WRITE,
                Access::TRANSFER_WRITE,
            )],
        );

        let dims = self.table.dims();
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(COLOR_SUBRESOURCE_LAYERS)
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: dims.x,
                height: dims.y,
                depth: dims.z,
            });
        device.cmd_copy_buffer_to_image(
            cmd,
            self.staging.handle(),
            image,
            vk::ImageLayout::GENERAL,
            &[region],
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

        self.table.clear_dirty();
        tracing::debug!(
            occupied = self.table.occupied_count(),
            "Uploaded sparse index grid"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip_through_slots() {
        let mut bricks = BrickAllocator::new(UVec3::splat(2));
        let mut table = IndexTable::new(UVec3::new(4, 4, 2));
        assert!(!table.is_dirty());

        let _ = bricks.allocate().unwrap();
        let brick = bricks.allocate().unwrap();
        table.set(UVec3::new(3, 1, 1), Some(brick)).unwrap();

        assert!(table.is_dirty());
        assert_eq!(table.get(UVec3::new(3, 1, 1)), Some(1));
        assert_eq!(table.get(UVec3::new(0, 0, 0)), None);
        assert_eq!(table.entries()[(4 + 1) * 4 + 3], 2);
        assert_eq!(table.occupied_count(), 1);

        table.set(UVec3::new(3, 1, 1), None).unwrap();
        assert_eq!(table.get(UVec3::new(3, 1, 1)), None);
        assert_eq!(table.occupied_count(), 0);
    }

    #[test]
    fn out_of_bounds_cells_are_rejected() {
        let mut table = IndexTable::new(UVec3::splat(4));
        let err = table.set(UVec3::new(4, 0, 0), None).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds(_)));
        assert_eq!(table.get(UVec3::new(0, 9, 0)), None);
        assert!(!table.is_dirty());
    }

    #[test]
    fn rewriting_same_entry_keeps_table_clean() {
        let mut table = IndexTable::new(UVec3::splat(2));
        table.set(UVec3::ZERO, None).unwrap();
        assert!(!table.is_dirty());
    }

    #[test]
    fn assign_then_release_frees_the_slot() {
        let mut bricks = BrickAllocator::new(UVec3::splat(2));
        let mut table = IndexTable::new(UVec3::splat(4));

        let id = assign_brick(&mut bricks, &mut table, UVec3::new(1, 2, 3)).unwrap();
        assert_eq!(table.get(UVec3::new(1, 2, 3)), Some(id.slot()));
        assert_eq!(bricks.live_count(), 1);

        let released = release_brick(&mut bricks, &mut table, UVec3::new(1, 2, 3)).unwrap();
        assert_eq!(released, Some(id.slot()));
        assert_eq!(table.get(UVec3::new(1, 2, 3)), None);
        assert_eq!(table.occupied_count(), 0);
        assert!(!bricks.is_occupied(id.slot()));
        assert_eq!(bricks.live_count(), 0);

        assert_eq!(release_brick(&mut bricks, &mut table, UVec3::new(1, 2, 3)).unwrap(), None);
    }

    #[test]
    fn assign_outside_grid_returns_brick_to_pool() {
        let mut bricks = BrickAllocator::new(UVec3::splat(2));
        let mut table = IndexTable::new(UVec3::splat(4));

        let err = assign_brick(&mut bricks, &mut table, UVec3::new(0, 4, 0)).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds(_)));
        assert_eq!(bricks.live_count(), 0);
        assert!(!table.is_dirty());
        assert_eq!(bricks.allocate().unwrap().slot(), 0);
    }

    #[test]
    fn reassigning_a_cell_releases_its_old_brick() {
        let mut bricks = BrickAllocator::new(UVec3::splat(2));
        let mut table = IndexTable::new(UVec3::splat(4));

        let first = assign_brick(&mut bricks, &mut table, UVec3::ZERO).unwrap();
        let second = assign_brick(&mut bricks, &mut table, UVec3::ZERO).unwrap();
        assert_ne!(first.slot(), second.slot());
        assert_eq!(table.get(UVec3::ZERO), Some(second.slot()));
        assert!(!bricks.is_occupied(first.slot()));
        assert_eq!(bricks.live_count(), 1);
    }
}
