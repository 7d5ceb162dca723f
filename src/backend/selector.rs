// Physical device selection
//
// Each candidate is checked in enumeration order for:
// - a graphics queue family and a family that can present to our surface
// - every requested device extension
// - at least one surface format and one present mode
// The policy then picks among the suitable ones. The default policy takes
// the first suitable device, without any ranking.

use super::capabilities;
use super::surface::PresentationSurface;
use crate::config::DeviceSelection;
use crate::error::{CapabilityKind, EngineError, Result, VkResultExt};
use ash::vk;
use std::ffi::CStr;
use std::fmt;

/// Queue family indices found for one physical device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan families in order, stopping as soon as both indices are known.
    pub fn find(families: &[QueueFamilyInfo]) -> Self {
        let mut indices = Self::default();
        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if family.queue_count > 0 && family.flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if family.queue_count > 0 && family.supports_present {
                indices.present = Some(index);
            }
            if indices.is_complete() {
                break;
            }
        }
        indices
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn resolve(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Complete queue family pair of the selected device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// One entry per distinct family, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    pub supports_present: bool,
}

/// Surface formats/modes/bounds for a device + surface pair
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 | 0x1022 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nvidia => f.write_str("NVIDIA"),
            Self::Amd => f.write_str("AMD"),
            Self::Intel => f.write_str("Intel"),
            Self::Apple => f.write_str("Apple"),
            Self::Other(id) => write!(f, "other (0x{id:04X})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: GpuVendor,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
}

/// Everything the selector needs to ask the driver about a candidate.
pub trait DeviceProbe {
    fn enumerate(&self) -> Result<Vec<vk::PhysicalDevice>>;
    fn info(&self, device: vk::PhysicalDevice) -> DeviceInfo;
    fn queue_families(&self, device: vk::PhysicalDevice) -> Result<Vec<QueueFamilyInfo>>;
    fn device_extensions(&self, device: vk::PhysicalDevice) -> Result<Vec<String>>;
    fn surface_support(&self, device: vk::PhysicalDevice) -> Result<SurfaceSupport>;
}

/// Why a candidate was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    IncompleteQueues(QueueFamilyIndices),
    MissingExtensions(Vec<String>),
    InadequateSurface,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompleteQueues(indices) => write!(
                f,
                "no graphics+present queue families (graphics: {:?}, present: {:?})",
                indices.graphics, indices.present
            ),
            Self::MissingExtensions(names) => write!(
                f,
                "missing {}(s): {}",
                CapabilityKind::DeviceExtension,
                names.join(", ")
            ),
            Self::InadequateSurface => f.write_str("no surface formats or present modes"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuitableDevice {
    pub physical_device: vk::PhysicalDevice,
    pub info: DeviceInfo,
    pub queue_families: QueueFamilies,
    pub surface_support: SurfaceSupport,
}

/// Decide whether one candidate can drive our pipeline.
///
/// Surface support is only queried when the extensions check passed.
pub fn evaluate<P: DeviceProbe + ?Sized>(
    probe: &P,
    device: vk::PhysicalDevice,
    required_extensions: &[String],
) -> Result<std::result::Result<SuitableDevice, Rejection>> {
    let indices = QueueFamilyIndices::find(&probe.queue_families(device)?);

    let available = probe.device_extensions(device)?;
    let missing = capabilities::missing(required_extensions, &available);
    if !missing.is_empty() {
        return Ok(Err(Rejection::MissingExtensions(
            missing.into_iter().map(str::to_owned).collect(),
        )));
    }

    let surface_support = probe.surface_support(device)?;
    if !surface_support.is_adequate() {
        return Ok(Err(Rejection::InadequateSurface));
    }

    let Some(queue_families) = indices.resolve() else {
        return Ok(Err(Rejection::IncompleteQueues(indices)));
    };

    Ok(Ok(SuitableDevice {
        physical_device: device,
        info: probe.info(device),
        queue_families,
        surface_support,
    }))
}

/// Picks one device among the suitable ones (given in enumeration order).
pub trait SelectionPolicy {
    fn choose(&self, suitable: Vec<SuitableDevice>) -> Option<SuitableDevice>;
}

/// Enumeration order wins. No scoring.
pub struct FirstSuitable;

impl SelectionPolicy for FirstSuitable {
    fn choose(&self, suitable: Vec<SuitableDevice>) -> Option<SuitableDevice> {
        suitable.into_iter().next()
    }
}

/// Discrete > integrated > anything else; ties keep enumeration order.
pub struct PreferDiscrete;

impl PreferDiscrete {
    fn score(device_type: vk::PhysicalDeviceType) -> u32 {
        match device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            _ => 1,
        }
    }
}

impl SelectionPolicy for PreferDiscrete {
    fn choose(&self, suitable: Vec<SuitableDevice>) -> Option<SuitableDevice> {
        let mut best: Option<SuitableDevice> = None;
        for candidate in suitable {
            let better = best.as_ref().map_or(true, |b| {
                Self::score(candidate.info.device_type) > Self::score(b.info.device_type)
            });
            if better {
                best = Some(candidate);
            }
        }
        best
    }
}

pub fn policy_for(selection: DeviceSelection) -> Box<dyn SelectionPolicy> {
    match selection {
        DeviceSelection::FirstSuitable => Box::new(FirstSuitable),
        DeviceSelection::PreferDiscrete => Box::new(PreferDiscrete),
    }
}

pub fn select_device<P: DeviceProbe + ?Sized>(
    probe: &P,
    required_extensions: &[String],
    policy: &dyn SelectionPolicy,
) -> Result<SuitableDevice> {
    let devices = probe.enumerate()?;
    if devices.is_empty() {
        return Err(EngineError::NoSuitableDevice(
            "no Vulkan-capable GPU found".to_string(),
        ));
    }

    let mut suitable = Vec::new();
    let mut rejected = Vec::new();
    for device in devices {
        match evaluate(probe, device, required_extensions)? {
            Ok(candidate) => {
                log::info!("GPU candidate '{}': suitable", candidate.info.name);
                suitable.push(candidate);
            }
            Err(reason) => {
                let name = probe.info(device).name;
                log::info!("GPU candidate '{}': rejected, {}", name, reason);
                rejected.push(format!("'{}': {}", name, reason));
            }
        }
    }

    policy
        .choose(suitable)
        .ok_or_else(|| EngineError::NoSuitableDevice(rejected.join("; ")))
}

/// `DeviceProbe` backed by the real driver
pub struct VulkanProbe<'a> {
    pub instance: &'a ash::Instance,
    pub surface: &'a PresentationSurface,
}

impl DeviceProbe for VulkanProbe<'_> {
    fn enumerate(&self) -> Result<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }.during("enumerate physical devices")
    }

    fn info(&self, device: vk::PhysicalDevice) -> DeviceInfo {
        let properties = unsafe { self.instance.get_physical_device_properties(device) };
        DeviceInfo {
            name: unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned(),
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_type: properties.device_type,
            api_version: properties.api_version,
        }
    }

    fn queue_families(&self, device: vk::PhysicalDevice) -> Result<Vec<QueueFamilyInfo>> {
        let families =
            unsafe { self.instance.get_physical_device_queue_family_properties(device) };
        families
            .iter()
            .enumerate()
            .map(|(index, family)| {
                Ok(QueueFamilyInfo {
                    flags: family.queue_flags,
                    queue_count: family.queue_count,
                    supports_present: self.surface.supports_present(device, index as u32)?,
                })
            })
            .collect()
    }

    fn device_extensions(&self, device: vk::PhysicalDevice) -> Result<Vec<String>> {
        capabilities::available_device_extensions(self.instance, device)
    }

    fn surface_support(&self, device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        Ok(SurfaceSupport {
            capabilities: self.surface.capabilities(device)?,
            formats: self.surface.formats(device)?,
            present_modes: self.surface.present_modes(device)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::RefCell;

    #[derive(Clone)]
    struct FakeDevice {
        name: &'static str,
        device_type: vk::PhysicalDeviceType,
        families: Vec<QueueFamilyInfo>,
        extensions: Vec<String>,
        formats: usize,
        present_modes: usize,
    }

    struct FakeProbe {
        devices: Vec<FakeDevice>,
        surface_queries: RefCell<Vec<u64>>,
    }

    impl FakeProbe {
        fn new(devices: Vec<FakeDevice>) -> Self {
            Self {
                devices,
                surface_queries: RefCell::new(Vec::new()),
            }
        }

        fn get(&self, device: vk::PhysicalDevice) -> &FakeDevice {
            &self.devices[device.as_raw() as usize - 1]
        }
    }

    impl DeviceProbe for FakeProbe {
        fn enumerate(&self) -> Result<Vec<vk::PhysicalDevice>> {
            Ok((1..=self.devices.len() as u64)
                .map(vk::PhysicalDevice::from_raw)
                .collect())
        }

        fn info(&self, device: vk::PhysicalDevice) -> DeviceInfo {
            let fake = self.get(device);
            DeviceInfo {
                name: fake.name.to_string(),
                vendor: GpuVendor::Other(0),
                device_type: fake.device_type,
                api_version: vk::API_VERSION_1_1,
            }
        }

        fn queue_families(&self, device: vk::PhysicalDevice) -> Result<Vec<QueueFamilyInfo>> {
            Ok(self.get(device).families.clone())
        }

        fn device_extensions(&self, device: vk::PhysicalDevice) -> Result<Vec<String>> {
            Ok(self.get(device).extensions.clone())
        }

        fn surface_support(&self, device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
            self.surface_queries.borrow_mut().push(device.as_raw());
            let fake = self.get(device);
            Ok(SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: vec![vk::SurfaceFormatKHR::default(); fake.formats],
                present_modes: vec![vk::PresentModeKHR::FIFO; fake.present_modes],
            })
        }
    }

    fn family(flags: vk::QueueFlags, present: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            flags,
            queue_count: 1,
            supports_present: present,
        }
    }

    fn gpu(name: &'static str, families: Vec<QueueFamilyInfo>) -> FakeDevice {
        FakeDevice {
            name,
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            families,
            extensions: vec!["VK_KHR_swapchain".to_string()],
            formats: 2,
            present_modes: 1,
        }
    }

    fn swapchain_ext() -> Vec<String> {
        vec!["VK_KHR_swapchain".to_string()]
    }

    #[test]
    fn shared_family_is_complete() {
        let indices = QueueFamilyIndices::find(&[family(vk::QueueFlags::GRAPHICS, true)]);
        assert_eq!(indices.resolve(), Some(QueueFamilies { graphics: 0, present: 0 }));
        assert_eq!(indices.resolve().unwrap().unique(), vec![0]);
    }

    #[test]
    fn split_families_are_both_recorded() {
        let indices = QueueFamilyIndices::find(&[
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::TRANSFER, true),
        ]);
        let families = indices.resolve().unwrap();
        assert_eq!(families, QueueFamilies { graphics: 0, present: 1 });
        assert_eq!(families.unique(), vec![0, 1]);
    }

    #[test]
    fn empty_family_is_ignored() {
        let mut empty = family(vk::QueueFlags::GRAPHICS, true);
        empty.queue_count = 0;
        let indices = QueueFamilyIndices::find(&[empty]);
        assert!(!indices.is_complete());
        assert_eq!(indices, QueueFamilyIndices::default());
    }

    #[test]
    fn scan_stops_once_complete() {
        let indices = QueueFamilyIndices::find(&[
            family(vk::QueueFlags::GRAPHICS, true),
            family(vk::QueueFlags::GRAPHICS, true),
        ]);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
    }

    #[test]
    fn no_devices_is_fatal() {
        let probe = FakeProbe::new(Vec::new());
        let err = select_device(&probe, &swapchain_ext(), &FirstSuitable).unwrap_err();
        assert!(matches!(err, EngineError::NoSuitableDevice(_)));
    }

    #[test]
    fn skips_device_without_present_queue() {
        let probe = FakeProbe::new(vec![
            gpu("headless", vec![family(vk::QueueFlags::GRAPHICS, false)]),
            gpu("desktop", vec![family(vk::QueueFlags::GRAPHICS, true)]),
        ]);

        let selected = select_device(&probe, &swapchain_ext(), &FirstSuitable).unwrap();
        assert_eq!(selected.info.name, "desktop");
        assert_eq!(selected.physical_device.as_raw(), 2);
    }

    #[test]
    fn first_suitable_ignores_device_type() {
        let mut discrete = gpu("discrete", vec![family(vk::QueueFlags::GRAPHICS, true)]);
        discrete.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;
        let probe = FakeProbe::new(vec![
            gpu("integrated", vec![family(vk::QueueFlags::GRAPHICS, true)]),
            discrete,
        ]);

        let first = select_device(&probe, &swapchain_ext(), &FirstSuitable).unwrap();
        assert_eq!(first.info.name, "integrated");

        let preferred = select_device(&probe, &swapchain_ext(), &PreferDiscrete).unwrap();
        assert_eq!(preferred.info.name, "discrete");
    }

    #[test]
    fn surface_not_queried_when_extensions_missing() {
        let mut no_swapchain = gpu("compute-only", vec![family(vk::QueueFlags::GRAPHICS, true)]);
        no_swapchain.extensions.clear();
        let probe = FakeProbe::new(vec![no_swapchain]);

        let verdict = evaluate(&probe, vk::PhysicalDevice::from_raw(1), &swapchain_ext()).unwrap();
        assert_eq!(
            verdict.unwrap_err(),
            Rejection::MissingExtensions(swapchain_ext())
        );
        assert!(probe.surface_queries.borrow().is_empty());
    }

    #[test]
    fn fatal_error_names_missing_extension() {
        let mut no_swapchain = gpu("compute-only", vec![family(vk::QueueFlags::GRAPHICS, true)]);
        no_swapchain.extensions.clear();
        let gpus = FakeProbe::new(vec![no_swapchain]);

        let err = select_device(&gpus, &swapchain_ext(), &FirstSuitable).unwrap_err();
        match &err {
            EngineError::NoSuitableDevice(reason) => {
                assert_eq!(
                    reason,
                    "'compute-only': missing device extension(s): VK_KHR_swapchain"
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("VK_KHR_swapchain"));
    }

    #[test]
    fn fatal_error_lists_every_rejected_device() {
        let mut no_modes = gpu("no-modes", vec![family(vk::QueueFlags::GRAPHICS, true)]);
        no_modes.present_modes = 0;
        let gpus = FakeProbe::new(vec![
            gpu("headless", vec![family(vk::QueueFlags::GRAPHICS, false)]),
            no_modes,
        ]);

        let err = select_device(&gpus, &swapchain_ext(), &FirstSuitable).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'headless': no graphics+present queue families"), "{message}");
        assert!(message.contains("'no-modes': no surface formats or present modes"), "{message}");
    }

    #[test]
    fn empty_present_modes_reject_device() {
        let mut device = gpu("no-modes", vec![family(vk::QueueFlags::GRAPHICS, true)]);
        device.present_modes = 0;
        let probe = FakeProbe::new(vec![device]);

        let verdict = evaluate(&probe, vk::PhysicalDevice::from_raw(1), &swapchain_ext()).unwrap();
        assert_eq!(verdict.unwrap_err(), Rejection::InadequateSurface);
    }

    #[test]
    fn adding_required_extension_never_makes_device_suitable() {
        let probe = FakeProbe::new(vec![gpu(
            "desktop",
            vec![family(vk::QueueFlags::GRAPHICS, true)],
        )]);
        let device = vk::PhysicalDevice::from_raw(1);

        let mut required = Vec::new();
        let mut was_suitable = evaluate(&probe, device, &required).unwrap().is_ok();
        for ext in ["VK_KHR_swapchain", "VK_KHR_ray_query", "VK_KHR_swapchain"] {
            required.push(ext.to_string());
            let suitable = evaluate(&probe, device, &required).unwrap().is_ok();
            assert!(was_suitable || !suitable, "suitability grew after adding {ext}");
            was_suitable = suitable;
        }
        assert!(!was_suitable);
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234).to_string(), "other (0x1234)");
    }
}
