// Synchronization primitives
//
// One set of semaphores and a fence per frame in flight. The fence starts
// signaled so the first wait on every slot returns immediately.

use super::device::GraphicsContext;
use crate::error::{Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

/// Frame synchronization - one per frame in flight
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

/// All per-slot sync objects, destroyed on drop
pub struct FrameSyncState {
    pub frames: Vec<FrameSync>,
    context: Arc<GraphicsContext>,
}

impl FrameSyncState {
    pub fn new(context: Arc<GraphicsContext>, frames_in_flight: usize) -> Result<Self> {
        let mut state = Self {
            frames: Vec::with_capacity(frames_in_flight),
            context,
        };

        for _ in 0..frames_in_flight {
            // Push first so a half-created slot is still released on failure
            state.frames.push(FrameSync::default());
            state.fill_last_slot()?;
        }

        log::debug!("Created sync objects for {} frames in flight", frames_in_flight);
        Ok(state)
    }

    fn fill_last_slot(&mut self) -> Result<()> {
        let device = &self.context.device;
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };

        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            frame.image_available = device
                .create_semaphore(&semaphore_info, None)
                .creating("image available semaphore")?;
            frame.render_finished = device
                .create_semaphore(&semaphore_info, None)
                .creating("render finished semaphore")?;
            frame.in_flight_fence = device
                .create_fence(&fence_info, None)
                .creating("in-flight fence")?;
        }
        Ok(())
    }

    pub fn slot(&self, index: usize) -> &FrameSync {
        &self.frames[index]
    }
}

impl Drop for FrameSyncState {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe {
            for frame in &self.frames {
                device.destroy_semaphore(frame.image_available, None);
                device.destroy_semaphore(frame.render_finished, None);
                device.destroy_fence(frame.in_flight_fence, None);
            }
        }
    }
}
