//! Asynchronous object picking through the raymarch pass.
//!
//! A pick is requested for one frame only. The shader writes the hit for
//! the requested pixel into the selection buffer, and the host reads it
//! back once, resetting the buffer to the "none" sentinel. No fence is
//! waited on for picking alone, so a read may observe the previous frame's
//! result.

use ash::vk;
use brickmarch_core::{GpuSelection, Selection};
use brickmarch_gpu::barrier::{record_buffer_barrier, Access};
use glam::Vec2;

/// Where the picking round trip stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PickState {
    #[default]
    Idle,
    /// Coordinates are waiting for the next dispatch.
    Requested,
    /// A dispatch carrying the request has been recorded.
    Resolved,
}

#[derive(Debug, Default)]
pub struct PickingChannel {
    state: PickState,
    request: Option<Vec2>,
}

impl PickingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PickState {
        self.state
    }

    /// Ask the next frame to resolve what lies under pixel `(x, y)`.
    ///
    /// Re-triggering before the frame runs replaces the coordinates.
    pub fn trigger(&mut self, x: f32, y: f32) {
        self.request = Some(Vec2::new(x, y));
        self.state = PickState::Requested;
    }

    /// Coordinates for the frame being recorded, consuming the request.
    ///
    /// Frames without a fresh trigger get `None`, which the parameter
    /// block encodes as the `(-1, -1)` sentinel.
    pub fn take_frame_request(&mut self) -> Option<Vec2> {
        let request = self.request.take();
        if request.is_some() {
            self.state = PickState::Resolved;
        }
        request
    }

    /// Make the shader's selection write visible to host reads.
    ///
    /// # Safety
    /// The command buffer must be recording, after the raymarch dispatch.
    pub unsafe fn record_host_visibility(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        selection: vk::Buffer,
    ) {
        record_buffer_barrier(device, cmd, selection, Access::COMPUTE_READ_WRITE, Access::HOST_READ);
    }

    /// Read and consume the latest pick result.
    ///
    /// `storage` is the mapped selection buffer; it is reset to the
    /// sentinel, so a second read without another dispatch returns `None`.
    pub fn get_selection(&mut self, storage: &mut GpuSelection) -> Option<Selection> {
        let raw = std::mem::replace(storage, GpuSelection::NONE);
        // A trigger not yet taken by a frame stays pending.
        self.state = if self.request.is_some() {
            PickState::Requested
        } else {
            PickState::Idle
        };

        let selection = Selection::from_gpu(&raw);
        match &selection {
            Some(hit) => tracing::debug!(
                target_kind = ?hit.target,
                x = hit.position.x,
                y = hit.position.y,
                z = hit.position.z,
                "Pick resolved"
            ),
            None => tracing::trace!("No pick result"),
        }
        selection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickmarch_core::HitTarget;
    use glam::Vec3;

    #[test]
    fn request_lasts_one_frame() {
        let mut picking = PickingChannel::new();
        assert_eq!(picking.state(), PickState::Idle);
        assert_eq!(picking.take_frame_request(), None);

        picking.trigger(12.0, 34.0);
        assert_eq!(picking.state(), PickState::Requested);
        assert_eq!(picking.take_frame_request(), Some(Vec2::new(12.0, 34.0)));
        assert_eq!(picking.state(), PickState::Resolved);
        assert_eq!(picking.take_frame_request(), None);
    }

    #[test]
    fn retrigger_replaces_coordinates() {
        let mut picking = PickingChannel::new();
        picking.trigger(1.0, 1.0);
        picking.trigger(5.0, 6.0);
        assert_eq!(picking.take_frame_request(), Some(Vec2::new(5.0, 6.0)));
    }

    #[test]
    fn selection_is_read_once() {
        let mut picking = PickingChannel::new();
        picking.trigger(0.0, 0.0);
        picking.take_frame_request();

        let mut storage = GpuSelection {
            hit_index: 2,
            position: [1.0, 2.0, 3.0, 1.0],
            ..GpuSelection::NONE
        };
        let selection = picking.get_selection(&mut storage).unwrap();
        assert_eq!(selection.target, HitTarget::Edit(1));
        assert_eq!(selection.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(picking.state(), PickState::Idle);
        assert_eq!(storage, GpuSelection::NONE);

        assert_eq!(picking.get_selection(&mut storage), None);
    }

    #[test]
    fn read_keeps_untaken_request_pending() {
        let mut picking = PickingChannel::new();
        picking.trigger(4.0, 4.0);

        let mut storage = GpuSelection::NONE;
        assert_eq!(picking.get_selection(&mut storage), None);
        assert_eq!(picking.state(), PickState::Requested);

        assert_eq!(picking.take_frame_request(), Some(Vec2::new(4.0, 4.0)));
        assert_eq!(picking.state(), PickState::Resolved);
        picking.get_selection(&mut storage);
        assert_eq!(picking.state(), PickState::Idle);
    }

    #[test]
    fn ground_hit_decodes() {
        let mut picking = PickingChannel::new();
        let mut storage = GpuSelection {
            hit_index: 0,
            ..GpuSelection::NONE
        };
        let selection = picking.get_selection(&mut storage).unwrap();
        assert_eq!(selection.target, HitTarget::Ground);
    }
}
