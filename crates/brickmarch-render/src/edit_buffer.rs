//! The scene edit list and its GPU mirrors.
//!
//! The host list is the source of truth. Every mutator bumps a generation
//! counter; each frame slot owns one host-visible mirror and is re-uploaded
//! only when the generation it last saw is stale.

use ash::vk;
use brickmarch_core::constants::MAX_EDITS;
use brickmarch_core::{GpuSdfEdit, SdfEdit};
use brickmarch_gpu::{GpuAllocator, GpuBuffer, GpuError, Result};
use gpu_allocator::MemoryLocation;

/// Size in bytes of one edit mirror.
pub const EDIT_BUFFER_SIZE: u64 = (MAX_EDITS * GpuSdfEdit::SIZE) as u64;

/// Outcome of one upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadStats {
    /// Edits in the host list.
    pub live: usize,
    /// Records written to the mirror.
    pub uploaded: usize,
}

impl UploadStats {
    /// Whether edits past the mirror capacity were left out.
    pub fn truncated(&self) -> bool {
        self.uploaded < self.live
    }
}

/// Ordered list of scene edits.
#[derive(Clone, Debug, Default)]
pub struct EditList {
    edits: Vec<SdfEdit>,
    generation: u64,
}

impl EditList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edits(edits: Vec<SdfEdit>) -> Self {
        Self {
            edits,
            generation: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SdfEdit> {
        self.edits.get(index)
    }

    pub fn as_slice(&self) -> &[SdfEdit] {
        &self.edits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SdfEdit> {
        self.edits.iter()
    }

    /// Change counter; bumped by every mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record that the list diverged from its GPU mirrors.
    pub fn mark_dirty(&mut self) {
        self.generation += 1;
    }

    /// Append an edit and return its index.
    pub fn push(&mut self, edit: SdfEdit) -> usize {
        self.edits.push(edit);
        self.mark_dirty();
        self.edits.len() - 1
    }

    /// Remove the edit at `index`; later edits shift down by one.
    pub fn remove(&mut self, index: usize) -> Option<SdfEdit> {
        if index >= self.edits.len() {
            return None;
        }
        let removed = self.edits.remove(index);
        self.mark_dirty();
        Some(removed)
    }

    /// Replace the edit at `index`. Returns `false` if out of range.
    pub fn update(&mut self, index: usize, edit: SdfEdit) -> bool {
        match self.edits.get_mut(index) {
            Some(slot) => {
                *slot = edit;
                self.mark_dirty();
                true
            }
            None => false,
        }
    }

    /// Mutable access for in-place field edits. Marks the list dirty.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut SdfEdit> {
        if index < self.edits.len() {
            self.mark_dirty();
        }
        self.edits.get_mut(index)
    }

    pub fn clear(&mut self) {
        if !self.edits.is_empty() {
            self.edits.clear();
            self.mark_dirty();
        }
    }

    /// Edit count the shader iterates: `min(len, MAX_EDITS)`.
    pub fn gpu_count(&self) -> usize {
        self.edits.len().min(MAX_EDITS)
    }

    /// Pack the list into `dst`, silently truncating at the capacity.
    pub fn upload_into(&self, dst: &mut [GpuSdfEdit]) -> UploadStats {
        let uploaded = self.gpu_count().min(dst.len());
        for (record, edit) in dst.iter_mut().zip(&self.edits[..uploaded]) {
            *record = edit.to_gpu();
        }

        let stats = UploadStats {
            live: self.edits.len(),
            uploaded,
        };
        if stats.truncated() {
            tracing::debug!(
                live = stats.live,
                uploaded = stats.uploaded,
                "Edit list exceeds GPU capacity; truncating"
            );
        }
        stats
    }
}

/// Tracks which list generation each frame slot's mirror holds.
#[derive(Clone, Debug)]
pub struct MirrorState {
    uploaded: Vec<Option<u64>>,
}

impl MirrorState {
    pub fn new(slots: usize) -> Self {
        Self {
            uploaded: vec![None; slots],
        }
    }

    pub fn needs_upload(&self, slot: usize, generation: u64) -> bool {
        self.uploaded.get(slot).is_some_and(|seen| *seen != Some(generation))
    }

    pub fn mark_uploaded(&mut self, slot: usize, generation: u64) {
        if let Some(seen) = self.uploaded.get_mut(slot) {
            *seen = Some(generation);
        }
    }

    /// Whether any mirror is behind `generation`.
    pub fn any_stale(&self, generation: u64) -> bool {
        self.uploaded.iter().any(|seen| *seen != Some(generation))
    }
}

/// One host-visible, host-coherent edit mirror per frame slot.
pub struct EditBuffer {
    mirrors: Vec<GpuBuffer>,
    state: MirrorState,
    last_upload: Option<UploadStats>,
}

impl EditBuffer {
    pub fn new(gpu: &GpuAllocator, frames_in_flight: usize) -> Result<Self> {
        let mirrors = (0..frames_in_flight)
            .map(|slot| {
                gpu.create_buffer(
                    EDIT_BUFFER_SIZE,
                    vk::BufferUsageFlags::STORAGE_BUFFER,
                    MemoryLocation::CpuToGpu,
                    &format!("edit_buffer_{slot}"),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            mirrors,
            state: MirrorState::new(frames_in_flight),
            last_upload: None,
        })
    }

    /// Bring `slot`'s mirror up to date with `list`.
    ///
    /// Must run after the slot's fence has been waited on and before the
    /// dispatch reading it is recorded. Returns `None` if the mirror was
    /// already current.
    pub fn sync(&mut self, slot: usize, list: &EditList) -> Result<Option<UploadStats>> {
        let generation = list.generation();
        if !self.state.needs_upload(slot, generation) {
            return Ok(None);
        }

        let mirror = self
            .mirrors
            .get_mut(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("no edit mirror for slot {slot}")))?;
        let bytes = mirror
            .mapped_bytes_mut()
            .and_then(|bytes| bytes.get_mut(..EDIT_BUFFER_SIZE as usize))
            .ok_or_else(|| GpuError::InvalidState("Edit buffer not mapped".to_string()))?;
        let records: &mut [GpuSdfEdit] = bytemuck::try_cast_slice_mut(bytes)
            .map_err(|e| GpuError::InvalidState(format!("Edit buffer misaligned: {e}")))?;

        let stats = list.upload_into(records);
        self.state.mark_uploaded(slot, generation);
        self.last_upload = Some(stats);
        tracing::trace!(slot, uploaded = stats.uploaded, "Uploaded edit list");
        Ok(Some(stats))
    }

    /// Whether any mirror lags behind `list`.
    pub fn is_dirty(&self, list: &EditList) -> bool {
        self.state.any_stale(list.generation())
    }

    pub fn buffer(&self, slot: usize) -> Option<&GpuBuffer> {
        self.mirrors.get(slot)
    }

    pub fn last_upload(&self) -> Option<UploadStats> {
        self.last_upload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickmarch_core::PrimitiveType;
    use glam::Vec3;

    fn list_of(count: usize) -> EditList {
        let edits = (0..count)
            .map(|i| SdfEdit::new(PrimitiveType::Box, Vec3::new(i as f32, 0.0, 0.0)))
            .collect();
        EditList::from_edits(edits)
    }

    #[test]
    fn upload_within_capacity_writes_every_edit() {
        let list = list_of(5);
        let mut mirror = vec![GpuSdfEdit::default(); MAX_EDITS];
        let stats = list.upload_into(&mut mirror);

        assert_eq!(stats, UploadStats { live: 5, uploaded: 5 });
        assert!(!stats.truncated());
        for (i, record) in mirror[..5].iter().enumerate() {
            assert_eq!(record.position[0], i as f32);
            assert_eq!(record.primitive_type, PrimitiveType::Box as u32);
        }
        assert!(mirror[5..].iter().all(|r| *r == GpuSdfEdit::default()));
    }

    #[test]
    fn upload_past_capacity_truncates_silently() {
        let list = list_of(300);
        let mut mirror = vec![GpuSdfEdit::default(); MAX_EDITS];
        let stats = list.upload_into(&mut mirror);

        assert_eq!(stats.live, 300);
        assert_eq!(stats.uploaded, 256);
        assert!(stats.truncated());
        assert_eq!(list.gpu_count(), 256);
        assert_eq!(mirror[255].position[0], 255.0);
    }

    #[test]
    fn mutators_bump_generation() {
        let mut list = EditList::new();
        let g0 = list.generation();
        let index = list.push(SdfEdit::default());
        assert_eq!(index, 0);
        assert!(list.generation() > g0);

        let g1 = list.generation();
        assert!(!list.update(3, SdfEdit::default()));
        assert!(list.remove(7).is_none());
        assert_eq!(list.generation(), g1);

        list.get_mut(0).unwrap().blend = 0.9;
        assert!(list.generation() > g1);
    }

    #[test]
    fn remove_shifts_later_edits_down() {
        let mut list = list_of(3);
        let removed = list.remove(1).unwrap();
        assert_eq!(removed.position.x, 1.0);
        let xs: Vec<f32> = list.iter().map(|e| e.position.x).collect();
        assert_eq!(xs, [0.0, 2.0]);
    }

    #[test]
    fn each_slot_uploads_once_per_generation() {
        let mut list = list_of(2);
        let mut state = MirrorState::new(2);

        assert!(state.needs_upload(0, list.generation()));
        state.mark_uploaded(0, list.generation());
        assert!(!state.needs_upload(0, list.generation()));
        assert!(state.needs_upload(1, list.generation()));
        assert!(state.any_stale(list.generation()));

        state.mark_uploaded(1, list.generation());
        assert!(!state.any_stale(list.generation()));

        list.mark_dirty();
        assert!(state.needs_upload(0, list.generation()));
        assert!(state.needs_upload(1, list.generation()));
        assert!(!state.needs_upload(5, list.generation()));
    }
}
