// Graphics pipeline creation
//
// One render pass with a single color attachment, one pipeline layout with no
// descriptors or push constants, one graphics pipeline drawing a triangle
// whose vertices live in the vertex shader. Everything here depends on the
// swapchain format and extent and would have to be rebuilt after a resize.

use super::device::GraphicsContext;
use super::shader::ShaderModule;
use crate::config::PipelineConfig;
use crate::error::{Result, VkResultExt};
use ash::vk;
use std::path::PathBuf;
use std::sync::Arc;

/// Fixed-function rasterization state
#[derive(Debug, Clone, Copy)]
pub struct RasterizationState {
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Where the shaders come from and how to rasterize
#[derive(Debug, Clone)]
pub struct PipelineDescription {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub rasterization: RasterizationState,
}

impl From<&PipelineConfig> for PipelineDescription {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            vertex_shader: config.vertex_shader.clone(),
            fragment_shader: config.fragment_shader.clone(),
            rasterization: RasterizationState {
                polygon_mode: config.polygon_mode.to_vk(),
                cull_mode: config.cull_mode.to_vk(),
                front_face: config.front_face.to_vk(),
            },
        }
    }
}

/// Clear on load, keep on store, UNDEFINED -> PRESENT_SRC
pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

/// Make the layout transition wait until the acquired image is really ours
pub fn acquire_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
        .build()
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Render pass, layout and pipeline; destroyed together on drop.
pub struct RenderPipelineState {
    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    context: Arc<GraphicsContext>,
}

impl RenderPipelineState {
    pub fn new(
        context: Arc<GraphicsContext>,
        format: vk::Format,
        extent: vk::Extent2D,
        description: &PipelineDescription,
    ) -> Result<Self> {
        // Null handles are fine to destroy, so Drop works at any point below
        let mut state = Self {
            render_pass: vk::RenderPass::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            context,
        };

        state.render_pass = state.create_render_pass(format)?;
        state.pipeline_layout = state.create_pipeline_layout()?;
        state.pipeline = state.create_graphics_pipeline(extent, description)?;

        log::info!("Graphics pipeline created ({}x{})", extent.width, extent.height);
        Ok(state)
    }

    fn create_render_pass(&self, format: vk::Format) -> Result<vk::RenderPass> {
        let color_attachment_ref = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let color_attachments = &[color_attachment_ref];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(color_attachments)
            .build();

        let attachments = &[color_attachment(format)];
        let subpasses = &[subpass];
        let dependencies = &[acquire_dependency()];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(attachments)
            .subpasses(subpasses)
            .dependencies(dependencies);

        unsafe { self.context.device.create_render_pass(&render_pass_info, None) }
            .creating("render pass")
    }

    fn create_pipeline_layout(&self) -> Result<vk::PipelineLayout> {
        // No descriptor sets, no push constants
        let layout_info = vk::PipelineLayoutCreateInfo::builder();

        unsafe { self.context.device.create_pipeline_layout(&layout_info, None) }
            .creating("pipeline layout")
    }

    fn create_graphics_pipeline(
        &self,
        extent: vk::Extent2D,
        description: &PipelineDescription,
    ) -> Result<vk::Pipeline> {
        let device = &self.context.device;

        // Modules only need to live until the pipeline is created
        let vert_shader = ShaderModule::load(device, &description.vertex_shader)?;
        let frag_shader = ShaderModule::load(device, &description.fragment_shader)?;

        let entry_point = c"main";

        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_shader.module)
            .name(entry_point)
            .build();

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_shader.module)
            .name(entry_point)
            .build();

        let shader_stages = &[vert_stage, frag_stage];

        // Vertex data is hard-coded in the vertex shader
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = &[full_viewport(extent)];
        let scissors = &[full_scissor(extent)];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(viewports)
            .scissors(scissors);

        let raster = description.rasterization;
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(raster.polygon_mode)
            .line_width(1.0)
            .cull_mode(raster.cull_mode)
            .front_face(raster.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        // Color blending (no blending, opaque)
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ZERO)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build();

        let color_blend_attachments = &[color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(color_blend_attachments);

        // No depth/stencil state, no dynamic state
        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(self.pipeline_layout)
            .render_pass(self.render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| e)
        .creating("graphics pipeline")?;

        Ok(pipelines[0])
    }
}

impl Drop for RenderPipelineState {
    fn drop(&mut self) {
        unsafe {
            let device = &self.context.device;
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// One framebuffer per swapchain image view, sized to the swapchain extent
pub struct Framebuffers {
    pub framebuffers: Vec<vk::Framebuffer>,
    context: Arc<GraphicsContext>,
}

impl Framebuffers {
    pub fn new(
        context: Arc<GraphicsContext>,
        render_pass: vk::RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let mut set = Self {
            framebuffers: Vec::with_capacity(image_views.len()),
            context,
        };

        for &image_view in image_views {
            let attachments = &[image_view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer =
                unsafe { set.context.device.create_framebuffer(&framebuffer_info, None) }
                    .creating("framebuffer")?;
            set.framebuffers.push(framebuffer);
        }

        Ok(set)
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.context.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CullMode, FrontFace, PolygonMode};

    #[test]
    fn color_attachment_clears_and_presents() {
        let attachment = color_attachment(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(attachment.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(attachment.samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn dependency_waits_on_color_output() {
        let dependency = acquire_dependency();
        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependency.dst_subpass, 0);
        assert_eq!(dependency.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert!(dependency
            .dst_access_mask
            .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn viewport_and_scissor_cover_extent() {
        let extent = vk::Extent2D { width: 640, height: 480 };
        let viewport = full_viewport(extent);
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (640.0, 480.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));

        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(scissor.extent, extent);
    }

    #[test]
    fn description_maps_config() {
        let mut config = PipelineConfig::default();
        config.cull_mode = CullMode::None;
        config.polygon_mode = PolygonMode::Line;
        config.front_face = FrontFace::CounterClockwise;

        let description = PipelineDescription::from(&config);
        assert_eq!(description.rasterization.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(description.rasterization.polygon_mode, vk::PolygonMode::LINE);
        assert_eq!(description.rasterization.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(description.vertex_shader, PathBuf::from("shaders/vert.spv"));
    }

    #[test]
    fn default_rasterization_is_fill_back_clockwise() {
        let raster = RasterizationState::default();
        assert_eq!(raster.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(raster.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(raster.front_face, vk::FrontFace::CLOCKWISE);
    }
}
