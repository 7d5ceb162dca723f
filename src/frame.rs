// Frame scheduling
//
// Per frame, for slot f = current_frame mod N:
//   wait fence(f) -> reset fence(f) -> acquire (signals image_available(f))
//   -> submit (waits image_available(f), signals render_finished(f) + fence(f))
//   -> present (waits render_finished(f)) -> advance
//
// The fence wait bounds the CPU to N submitted-but-unretired frames.

use crate::backend::{CommandBufferSet, FrameSyncState, GraphicsContext, SwapchainState};
use crate::error::{EngineError, Result, VkResultExt};
use ash::vk;
use std::time::Duration;

/// The GPU operations one frame is made of, addressed by frame slot.
pub trait FrameBackend {
    /// Block until the last submission using `slot` has retired.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    fn reset_slot(&mut self, slot: usize) -> Result<()>;
    /// Returns the index of the presentable image that was acquired.
    fn acquire_image(&mut self, slot: usize) -> Result<u32>;
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> Result<()>;
}

/// Which slot and image a completed frame used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub slot: usize,
    pub image_index: u32,
}

/// Cycles frame slots 0..N
#[derive(Debug)]
pub struct FrameScheduler {
    frames_in_flight: usize,
    current_frame: usize,
}

impl FrameScheduler {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            current_frame: 0,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Run one frame. Any error is fatal; the slot does not advance.
    pub fn draw_frame<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<FrameInfo> {
        let slot = self.current_frame;

        backend.wait_for_slot(slot)?;
        backend.reset_slot(slot)?;
        let image_index = backend.acquire_image(slot)?;
        backend.submit(slot, image_index)?;
        backend.present(slot, image_index)?;

        self.current_frame = (self.current_frame + 1) % self.frames_in_flight;

        Ok(FrameInfo { slot, image_index })
    }
}

/// `FrameBackend` over the real device, swapchain, command buffers and sync objects
pub struct VulkanFrameBackend<'a> {
    pub context: &'a GraphicsContext,
    pub swapchain: &'a SwapchainState,
    pub commands: &'a CommandBufferSet,
    pub sync: &'a FrameSyncState,
    /// u64::MAX waits forever
    pub fence_timeout_ns: u64,
}

impl VulkanFrameBackend<'_> {
    const WAIT_STAGES: [vk::PipelineStageFlags; 1] = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
}

impl FrameBackend for VulkanFrameBackend<'_> {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.sync.slot(slot).in_flight_fence;
        let result = unsafe {
            self.context
                .device
                .wait_for_fences(&[fence], true, self.fence_timeout_ns)
        };

        match result {
            Err(vk::Result::TIMEOUT) => Err(EngineError::FrameTimeout {
                slot,
                timeout_ns: self.fence_timeout_ns,
            }),
            other => other.during("wait for in-flight fence"),
        }
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.sync.slot(slot).in_flight_fence;
        unsafe { self.context.device.reset_fences(&[fence]) }.during("reset in-flight fence")
    }

    fn acquire_image(&mut self, slot: usize) -> Result<u32> {
        self.swapchain
            .acquire_next_image(u64::MAX, self.sync.slot(slot).image_available)
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let sync = self.sync.slot(slot);
        let command_buffer = self.commands.command_buffers[image_index as usize];

        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&Self::WAIT_STAGES)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.context.device.queue_submit(
                self.context.graphics_queue,
                &[submit_info.build()],
                sync.in_flight_fence,
            )
        }
        .during("queue submit")
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<()> {
        self.swapchain.present(
            self.context.present_queue,
            image_index,
            &[self.sync.slot(slot).render_finished],
        )
    }
}

/// Frames-per-second accumulator, reports roughly once a second
#[derive(Debug, Default)]
pub struct FpsCounter {
    frames: u32,
    elapsed: Duration,
}

impl FpsCounter {
    const REPORT_INTERVAL: Duration = Duration::from_secs(1);

    /// Count one frame that took `frame_time`. Returns the average FPS and
    /// starts over once at least a second has accumulated.
    pub fn tick(&mut self, frame_time: Duration) -> Option<f32> {
        self.frames += 1;
        self.elapsed += frame_time;

        if self.elapsed < Self::REPORT_INTERVAL {
            return None;
        }

        let fps = self.frames as f32 / self.elapsed.as_secs_f32();
        self.frames = 0;
        self.elapsed = Duration::ZERO;
        Some(fps)
    }
}
