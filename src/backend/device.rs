// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation, after checking requested layers/extensions
// - Debug messenger (if validation enabled)
// - Surface creation through the platform factory
// - Physical device selection
// - Logical device + graphics/present queues
//
// Each stage is owned by a value with a Drop impl, so a failure halfway
// through releases whatever was already created, in reverse order.

use super::capabilities::{self, NameList};
use super::selector::{self, QueueFamilies, SelectionPolicy, SuitableDevice, VulkanProbe};
use super::surface::{PresentationSurface, SurfaceFactory};
use crate::error::{Result, VkResultExt};
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use std::ffi::{CStr, CString};

/// Requested layers and extensions, frozen before initialization
#[derive(Debug, Clone, Default)]
pub struct CapabilityRequest {
    pub validation_layers: Vec<String>,
    pub instance_extensions: Vec<String>,
    pub device_extensions: Vec<String>,
    pub enable_validation: bool,
}

impl CapabilityRequest {
    /// Layers actually enabled (none unless validation is on)
    pub fn layers(&self) -> &[String] {
        if self.enable_validation {
            &self.validation_layers
        } else {
            &[]
        }
    }

    /// Configured instance extensions plus what the surface and debug hook need,
    /// without duplicates and in a stable order.
    pub fn all_instance_extensions(&self, surface: &dyn SurfaceFactory) -> Vec<String> {
        let mut extensions = self.instance_extensions.clone();
        let implied = surface
            .required_extensions()
            .into_iter()
            .chain(self.enable_validation.then(DebugUtils::name))
            .map(capabilities::name_of);
        for name in implied {
            if !extensions.contains(&name) {
                extensions.push(name);
            }
        }
        extensions
    }
}

/// Instance + optional debug messenger
pub struct InstanceContext {
    pub instance: ash::Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub entry: Entry,
}

impl InstanceContext {
    pub fn new(
        entry: Entry,
        app_name: &str,
        layers: &[String],
        extensions: &[String],
        enable_debug: bool,
    ) -> Result<Self> {
        capabilities::require_instance_support(
            layers,
            extensions,
            &capabilities::available_instance_layers(&entry)?,
            &capabilities::available_instance_extensions(&entry)?,
        )?;

        log::info!("Creating Vulkan instance...");
        let app_name = CString::new(app_name).unwrap_or_else(|_| c"Triangle Engine".to_owned());

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"Triangle Engine")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let layer_names = NameList::new(layers)?;
        let extension_names = NameList::new(extensions)?;
        log::debug!(
            "Enabling {} layers, {} instance extensions",
            layer_names.len(),
            extension_names.len()
        );

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(extension_names.as_ptrs())
            .enabled_layer_names(layer_names.as_ptrs());

        let instance = unsafe { entry.create_instance(&create_info, None) }.creating("instance")?;

        let mut context = Self {
            instance,
            debug_utils: None,
            entry,
        };
        if enable_debug {
            context.debug_utils = Some(context.setup_debug_messenger()?);
        }
        Ok(context)
    }

    fn setup_debug_messenger(&self) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(&self.entry, &self.instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .creating("debug messenger")?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// The GPU connection: instance, surface, chosen physical device, logical device.
///
/// Outlives every other GPU object; the logical device is destroyed when this drops.
pub struct GraphicsContext {
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilies,
    pub physical_device: vk::PhysicalDevice,
    pub selected: SuitableDevice,
    // Field order is drop order: surface before instance
    pub surface: PresentationSurface,
    pub instance: InstanceContext,
}

impl GraphicsContext {
    /// instance -> debug hook -> surface -> device selection -> logical device
    pub fn new(
        app_name: &str,
        request: &CapabilityRequest,
        surface_factory: &dyn SurfaceFactory,
        policy: &dyn SelectionPolicy,
    ) -> Result<Self> {
        let entry = unsafe { Entry::load() }?;

        let instance = InstanceContext::new(
            entry,
            app_name,
            request.layers(),
            &request.all_instance_extensions(surface_factory),
            request.enable_validation,
        )?;

        let surface =
            PresentationSurface::new(&instance.entry, &instance.instance, surface_factory)?;

        let selected = selector::select_device(
            &VulkanProbe {
                instance: &instance.instance,
                surface: &surface,
            },
            &request.device_extensions,
            policy,
        )?;

        log::info!("Selected GPU: {} ({})", selected.info.name, selected.info.vendor);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(selected.info.api_version),
            vk::api_version_minor(selected.info.api_version),
            vk::api_version_patch(selected.info.api_version)
        );
        log::debug!(
            "Surface offers {} formats, {} present modes, {}..{} images",
            selected.surface_support.formats.len(),
            selected.surface_support.present_modes.len(),
            selected.surface_support.capabilities.min_image_count,
            selected.surface_support.capabilities.max_image_count
        );

        let queue_families = selected.queue_families;
        let device = Self::create_logical_device(
            &instance.instance,
            selected.physical_device,
            queue_families,
            request,
        )?;

        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(queue_families.graphics, 0),
                device.get_device_queue(queue_families.present, 0),
            )
        };

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            queue_families,
            physical_device: selected.physical_device,
            selected,
            surface,
            instance,
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilies,
        request: &CapabilityRequest,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = NameList::new(&request.device_extensions)?;
        // Device layers are deprecated but older loaders still look at them
        let layers = NameList::new(request.layers())?;
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(extensions.as_ptrs())
            .enabled_layer_names(layers.as_ptrs())
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .creating("logical device")
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.during("device wait idle")
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");
        if let Err(e) = self.wait_idle() {
            log::error!("Wait idle before device destruction failed: {}", e);
        }
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("[Vulkan] {}", message),
        _ => log::debug!("[Vulkan] {}", message),
    }

    // Returning TRUE would abort the call that triggered the message
    vk::FALSE
}
