// Engine - owns every GPU object and drives frames
//
// Build order:
//   instance -> debug hook -> surface -> device selection -> logical device
//   -> swapchain -> image views -> render pass -> pipeline -> framebuffers
//   -> command pool -> command buffers -> sync objects
//
// Teardown is the reverse. Each stage is a value with a Drop impl: if a stage
// fails, the stages already built are dropped (in reverse) as `new` returns.

use crate::backend::selector;
use crate::backend::{
    CapabilityRequest, CommandBufferSet, DrawCommands, FrameSyncState, Framebuffers,
    GraphicsContext, PipelineDescription, RenderPipelineState, SurfaceFactory,
    SwapchainPreferences, SwapchainState,
};
use crate::config::Config;
use crate::error::Result;
use crate::frame::{FrameInfo, FrameScheduler, VulkanFrameBackend};
use std::sync::Arc;

impl From<&Config> for CapabilityRequest {
    fn from(config: &Config) -> Self {
        Self {
            validation_layers: config.capabilities.validation_layers.clone(),
            instance_extensions: config.capabilities.instance_extensions.clone(),
            device_extensions: config.capabilities.device_extensions.clone(),
            enable_validation: config.validation_enabled(),
        }
    }
}

/// IMPORTANT: Field order is drop order, the reverse of creation order.
pub struct Engine {
    scheduler: FrameScheduler,
    fence_timeout_ns: u64,
    sync: FrameSyncState,
    commands: CommandBufferSet,
    framebuffers: Framebuffers,
    pipeline: RenderPipelineState,
    swapchain: SwapchainState,
    context: Arc<GraphicsContext>,
}

impl Engine {
    /// Initialize everything for a window of `width` x `height` pixels.
    pub fn new(
        config: &Config,
        surface_factory: &dyn SurfaceFactory,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let request = CapabilityRequest::from(config);
        let policy = selector::policy_for(config.device.selection);
        let context = Arc::new(GraphicsContext::new(
            &config.window.title,
            &request,
            surface_factory,
            policy.as_ref(),
        )?);

        let swapchain = SwapchainState::new(
            context.clone(),
            &SwapchainPreferences::from(&config.swapchain),
            width,
            height,
        )?;

        let pipeline = RenderPipelineState::new(
            context.clone(),
            swapchain.format.format,
            swapchain.extent,
            &PipelineDescription::from(&config.pipeline),
        )?;

        let framebuffers = Framebuffers::new(
            context.clone(),
            pipeline.render_pass,
            &swapchain.image_views,
            swapchain.extent,
        )?;

        let commands = CommandBufferSet::new(
            context.clone(),
            &framebuffers.framebuffers,
            &DrawCommands {
                render_pass: pipeline.render_pass,
                pipeline: pipeline.pipeline,
                extent: swapchain.extent,
                clear_color: config.pipeline.clear_color,
            },
        )?;

        let frames_in_flight = config.frames.max_frames_in_flight;
        let sync = FrameSyncState::new(context.clone(), frames_in_flight)?;

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            scheduler: FrameScheduler::new(frames_in_flight),
            fence_timeout_ns: config.frames.fence_timeout_ns(),
            sync,
            commands,
            framebuffers,
            pipeline,
            swapchain,
            context,
        })
    }

    /// Render a single frame.
    pub fn draw_frame(&mut self) -> Result<FrameInfo> {
        let mut backend = VulkanFrameBackend {
            context: &self.context,
            swapchain: &self.swapchain,
            commands: &self.commands,
            sync: &self.sync,
            fence_timeout_ns: self.fence_timeout_ns,
        };
        self.scheduler.draw_frame(&mut backend)
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.context.wait_idle()
    }

    pub fn log_summary(&self) {
        let extent = self.swapchain.extent;
        log::info!(
            "Engine ready on {}: {}x{} {:?} {:?}, {} framebuffers, {} frames in flight",
            self.context.selected.info.name,
            extent.width,
            extent.height,
            self.swapchain.format.format,
            self.swapchain.present_mode,
            self.framebuffers.framebuffers.len(),
            self.scheduler.frames_in_flight()
        );
        log::debug!(
            "Pipeline {:?}, {} command buffers, {} sync slots",
            self.pipeline.pipeline,
            self.commands.command_buffers.len(),
            self.sync.frames.len()
        );
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.wait_idle() {
            log::error!("Wait idle before teardown failed: {}", e);
        }
    }
}
