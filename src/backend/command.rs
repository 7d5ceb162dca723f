// Command recording
//
// The scene never changes, so every command buffer is recorded once at
// startup (one per framebuffer) and resubmitted each frame.

use super::device::GraphicsContext;
use crate::error::{Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

/// What every frame draws
#[derive(Debug, Clone, Copy)]
pub struct DrawCommands {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

impl DrawCommands {
    pub const VERTEX_COUNT: u32 = 3;
    pub const INSTANCE_COUNT: u32 = 1;

    pub fn clear_value(&self) -> vk::ClearValue {
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }
    }
}

/// Command pool plus one prerecorded buffer per framebuffer
pub struct CommandBufferSet {
    pub command_pool: vk::CommandPool,
    pub command_buffers: Vec<vk::CommandBuffer>,
    context: Arc<GraphicsContext>,
}

impl CommandBufferSet {
    pub fn new(
        context: Arc<GraphicsContext>,
        framebuffers: &[vk::Framebuffer],
        draw: &DrawCommands,
    ) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(context.queue_families.graphics);

        let command_pool = unsafe { context.device.create_command_pool(&pool_info, None) }
            .creating("command pool")?;

        let mut set = Self {
            command_pool,
            command_buffers: Vec::new(),
            context,
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(set.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(framebuffers.len() as u32);

        set.command_buffers = unsafe { set.context.device.allocate_command_buffers(&alloc_info) }
            .creating("command buffers")?;

        for (&command_buffer, &framebuffer) in set.command_buffers.iter().zip(framebuffers) {
            set.record(command_buffer, framebuffer, draw)?;
        }

        log::debug!("Recorded {} command buffers", set.command_buffers.len());
        Ok(set)
    }

    fn record(
        &self,
        command_buffer: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        draw: &DrawCommands,
    ) -> Result<()> {
        let device = &self.context.device;

        // Resubmitted while a previous submission may still be pending
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

        let clear_values = [draw.clear_value()];
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(draw.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: draw.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .during("begin command buffer")?;

            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                draw.pipeline,
            );
            device.cmd_draw(
                command_buffer,
                DrawCommands::VERTEX_COUNT,
                DrawCommands::INSTANCE_COUNT,
                0,
                0,
            );
            device.cmd_end_render_pass(command_buffer);

            device
                .end_command_buffer(command_buffer)
                .during("end command buffer")?;
        }

        Ok(())
    }
}

impl Drop for CommandBufferSet {
    fn drop(&mut self) {
        // Buffers are freed with the pool
        unsafe {
            self.context
                .device
                .destroy_command_pool(self.command_pool, None);
        }
    }
}
