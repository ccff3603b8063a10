//! Synchronization primitives and the frames-in-flight ring.

use std::sync::Arc;

use ash::vk;

use crate::command::{begin_command_buffer, end_command_buffer, submit_command_buffer, CommandPool};
use crate::error::{GpuError, Result};

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = device.create_fence(&create_info, None)?;
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_for_fence(
    device: &ash::Device,
    fence: vk::Fence,
    timeout_ns: u64,
) -> Result<()> {
    device.wait_for_fences(&[fence], true, timeout_ns)?;
    Ok(())
}

/// A frame slot that has been acquired and is recording.
#[derive(Clone, Copy, Debug)]
pub struct FrameToken {
    /// Ring slot index, in `0..frames_in_flight`.
    pub slot: usize,
    /// Monotonic frame counter.
    pub frame_number: u64,
    /// Command buffer in the recording state.
    pub command_buffer: vk::CommandBuffer,
}

/// Ring of per-frame command buffers and fences.
///
/// Acquiring a slot waits on the fence of the submission that last used it,
/// so at most `frames_in_flight` frames are ever executing.
pub struct FrameRing {
    fences: Vec<vk::Fence>,
    command_buffers: Vec<vk::CommandBuffer>,
    pool: CommandPool,
    current: usize,
    frame_number: u64,
    recording: bool,
    device: Arc<ash::Device>,
}

impl FrameRing {
    /// Create a ring with `frames_in_flight` slots.
    ///
    /// # Safety
    /// The device must be valid and `queue_family` must exist.
    pub unsafe fn new(
        device: &Arc<ash::Device>,
        queue_family: u32,
        frames_in_flight: usize,
    ) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidState(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }

        let pool = CommandPool::new(
            device,
            queue_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffers = pool.allocate_command_buffers(frames_in_flight as u32)?;

        let mut ring = Self {
            fences: Vec::with_capacity(frames_in_flight),
            command_buffers,
            pool,
            current: 0,
            frame_number: 0,
            recording: false,
            device: Arc::clone(device),
        };
        // Fences start signaled so the first acquire of each slot is free.
        for _ in 0..frames_in_flight {
            ring.fences.push(create_fence(device, true)?);
        }

        Ok(ring)
    }

    pub fn frames_in_flight(&self) -> usize {
        self.fences.len()
    }

    /// Slot the next `begin` will use.
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Number of frames submitted so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Wait for the current slot's previous submission, then begin
    /// recording its command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn begin(&mut self) -> Result<FrameToken> {
        if self.recording {
            // The previous recording was never submitted; its fence was not
            // reset, so the slot can simply be re-recorded.
            tracing::warn!("Discarding unsubmitted frame {}", self.frame_number);
        }

        let fence = self.fences[self.current];
        let cmd = self.command_buffers[self.current];

        wait_for_fence(&self.device, fence, u64::MAX)?;
        self.device
            .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        begin_command_buffer(&self.device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        self.recording = true;

        Ok(FrameToken {
            slot: self.current,
            frame_number: self.frame_number,
            command_buffer: cmd,
        })
    }

    /// End the recording started by `begin`, submit it and advance the ring.
    ///
    /// # Safety
    /// `queue` must belong to the ring's queue family.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn submit(&mut self, queue: vk::Queue) -> Result<()> {
        if !self.recording {
            return Err(GpuError::InvalidState("no frame recording".to_string()));
        }
        self.recording = false;

        let fence = self.fences[self.current];
        let cmd = self.command_buffers[self.current];

        end_command_buffer(&self.device, cmd)?;
        // Reset only once a submission is certain to signal it again.
        self.device.reset_fences(&[fence])?;
        submit_command_buffer(&self.device, queue, cmd, fence)?;

        self.current = (self.current + 1) % self.fences.len();
        self.frame_number += 1;
        Ok(())
    }

    /// Block until the most recent submission of `slot` has finished.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait_slot(&self, slot: usize) -> Result<()> {
        let fence = self
            .fences
            .get(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("no frame slot {slot}")))?;
        wait_for_fence(&self.device, *fence, u64::MAX)
    }

    /// Block until every in-flight frame has finished.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait_all(&self) -> Result<()> {
        if self.fences.is_empty() {
            return Ok(());
        }
        self.device.wait_for_fences(&self.fences, true, u64::MAX)?;
        Ok(())
    }
}

impl Drop for FrameRing {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.wait_all() {
                tracing::warn!("Failed to wait for in-flight frames: {e}");
            }
            for &fence in &self.fences {
                self.device.destroy_fence(fence, None);
            }
        }
    }
}
