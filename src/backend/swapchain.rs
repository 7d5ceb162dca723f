// Swapchain - Window presentation
//
// Negotiates format / present mode / extent / image count with the surface,
// then owns the presentable images and one view per image.
//
// A window resize invalidates everything built from the format and extent
// (render pass, pipeline, framebuffers). This engine does not rebuild; the
// window is created non-resizable and an out-of-date swapchain is fatal.

use super::device::GraphicsContext;
use crate::config::SwapchainConfig;
use crate::error::{EngineError, Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

/// What the swapchain should look like, resolved from config
#[derive(Debug, Clone)]
pub struct SwapchainPreferences {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl From<&SwapchainConfig> for SwapchainPreferences {
    fn from(config: &SwapchainConfig) -> Self {
        Self {
            surface_format: vk::SurfaceFormatKHR {
                format: config.surface_format.to_vk(),
                color_space: config.color_space.to_vk(),
            },
            present_modes: config.present_modes.iter().map(|m| m.to_vk()).collect(),
        }
    }
}

/// Preferred format + color space if offered, otherwise the first one.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
        .or_else(|| available.first())
        .copied()
}

/// First preferred mode the surface offers; FIFO otherwise (always supported).
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preference: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    preference
        .iter()
        .copied()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's fixed extent if it has one, else the window size clamped
/// into the surface's bounds. `u32::MAX` in `current_extent` means "not fixed".
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped at the maximum (0 = no maximum).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

/// One view per image, in image order. Views are pushed into `views` as they
/// are created, so on error the caller still owns (and destroys) the ones made
/// so far.
pub fn create_image_views<F>(
    images: &[vk::Image],
    views: &mut Vec<vk::ImageView>,
    mut create: F,
) -> Result<()>
where
    F: FnMut(vk::Image) -> Result<vk::ImageView>,
{
    views.reserve(images.len());
    for &image in images {
        views.push(create(image)?);
    }
    Ok(())
}

/// 2D color view over the whole image, identity swizzle
fn create_image_view(
    device: &ash::Device,
    format: vk::Format,
    image: vk::Image,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.creating("swapchain image view")
}

pub struct SwapchainState {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    context: Arc<GraphicsContext>,
}

impl SwapchainState {
    pub fn new(
        context: Arc<GraphicsContext>,
        preferences: &SwapchainPreferences,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let physical_device = context.physical_device;
        let surface_caps = context.surface.capabilities(physical_device)?;
        let formats = context.surface.formats(physical_device)?;
        let present_modes = context.surface.present_modes(physical_device)?;

        let format = choose_surface_format(&formats, preferences.surface_format).ok_or_else(|| {
            EngineError::Surface("surface reports no formats".to_string())
        })?;
        let present_mode = choose_present_mode(&present_modes, &preferences.present_modes);
        let extent = choose_extent(&surface_caps, width, height);
        let image_count = choose_image_count(&surface_caps);

        log::info!(
            "Creating swapchain: {}x{} {:?}/{:?}, {:?}, {} images requested",
            extent.width,
            extent.height,
            format.format,
            format.color_space,
            present_mode,
            image_count
        );

        let families = context.queue_families;
        let family_indices = [families.graphics, families.present];
        let (sharing_mode, shared_families): (_, &[u32]) = if families.graphics != families.present {
            (vk::SharingMode::CONCURRENT, &family_indices)
        } else {
            (vk::SharingMode::EXCLUSIVE, &[])
        };

        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(&context.instance.instance, &context.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .creating("swapchain")?;

        // From here on, Drop cleans up whatever exists
        let mut state = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            present_mode,
            extent,
            context,
        };

        state.images = unsafe { state.swapchain_loader.get_swapchain_images(swapchain) }
            .during("get swapchain images")?;

        log::info!("Created swapchain with {} images", state.images.len());

        let device = &state.context.device;
        let view_format = state.format.format;
        create_image_views(&state.images, &mut state.image_views, |image| {
            create_image_view(device, view_format, image)
        })?;

        Ok(state)
    }

    /// Acquire next image for rendering, signaling `semaphore` when it is ready
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        }
        .during("acquire swapchain image")?;

        if suboptimal {
            log::trace!("Swapchain suboptimal on acquire");
        }
        Ok(index)
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
            .during("queue present")?;

        if suboptimal {
            log::trace!("Swapchain suboptimal on present");
        }
        Ok(())
    }
}

impl Drop for SwapchainState {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.context.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn preferred() -> vk::SurfaceFormatKHR {
        format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)
    }

    fn key(f: Option<vk::SurfaceFormatKHR>) -> Option<(vk::Format, vk::ColorSpaceKHR)> {
        f.map(|f| (f.format, f.color_space))
    }

    #[test]
    fn preferred_format_wins_when_present() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            preferred(),
        ];
        assert_eq!(key(choose_surface_format(&available, preferred())), key(Some(preferred())));
    }

    #[test]
    fn format_falls_back_to_first() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert_eq!(key(choose_surface_format(&available, preferred())), key(Some(available[0])));
        assert!(choose_surface_format(&[], preferred()).is_none());
    }

    #[test]
    fn present_mode_follows_preference_order() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX];
        let preference = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&available, &preference), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&available, &[vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(choose_present_mode(&available, &[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn fixed_extent_is_used_as_is() {
        let caps = caps((800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_extent(&caps, 640, 480), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn undefined_extent_clamps_window_size() {
        let caps = caps((u32::MAX, u32::MAX), (100, 100), (1000, 700));
        assert_eq!(choose_extent(&caps, 640, 480), vk::Extent2D { width: 640, height: 480 });
        assert_eq!(choose_extent(&caps, 50, 5000), vk::Extent2D { width: 100, height: 700 });
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        let mut caps = vk::SurfaceCapabilitiesKHR { min_image_count: 2, max_image_count: 0, ..Default::default() };
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
        caps.min_image_count = 1;
        caps.max_image_count = 1;
        assert_eq!(choose_image_count(&caps), 1);
    }

    fn fake_images(count: u64) -> Vec<vk::Image> {
        (1..=count).map(vk::Image::from_raw).collect()
    }

    #[test]
    fn one_view_per_image() {
        for min_image_count in 1..=4u32 {
            for max_image_count in [0, min_image_count, min_image_count + 2] {
                let caps = vk::SurfaceCapabilitiesKHR {
                    min_image_count,
                    max_image_count,
                    ..Default::default()
                };
                let images = fake_images(choose_image_count(&caps) as u64);

                let mut views = Vec::new();
                create_image_views(&images, &mut views, |image| {
                    Ok(vk::ImageView::from_raw(image.as_raw() + 100))
                })
                .unwrap();

                assert_eq!(views.len(), images.len());
                for (image, view) in images.iter().zip(&views) {
                    assert_eq!(view.as_raw(), image.as_raw() + 100);
                }
            }
        }
    }

    #[test]
    fn views_made_before_a_failure_stay_owned() {
        let images = fake_images(4);
        let mut views = Vec::new();

        let result = create_image_views(&images, &mut views, |image| {
            if image.as_raw() == 3 {
                Err(EngineError::ResourceCreationFailed {
                    resource: "swapchain image view",
                    source: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
                })
            } else {
                Ok(vk::ImageView::from_raw(image.as_raw() + 100))
            }
        });

        assert!(matches!(
            result,
            Err(EngineError::ResourceCreationFailed { resource: "swapchain image view", .. })
        ));
        let raw: Vec<u64> = views.iter().map(|v| v.as_raw()).collect();
        assert_eq!(raw, vec![101, 102]);
    }

    #[test]
    fn preferences_come_from_config() {
        let prefs = SwapchainPreferences::from(&SwapchainConfig::default());
        assert_eq!(key(Some(prefs.surface_format)), key(Some(preferred())));
        assert_eq!(prefs.present_modes, vec![vk::PresentModeKHR::MAILBOX]);
    }
}
