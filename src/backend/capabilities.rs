// Capability checks - layers and extensions
//
// The driver reports what it supports; we compare against what was requested.
// Names match exactly (case-sensitive). Anything missing is fatal, there is
// no fallback.

use crate::error::{CapabilityKind, EngineError, Result, VkResultExt};
use ash::vk;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Requested names that are not in `available`, in request order.
pub fn missing<'a>(requested: &'a [String], available: &[String]) -> Vec<&'a str> {
    requested
        .iter()
        .filter(|name| !available.iter().any(|have| have == *name))
        .map(String::as_str)
        .collect()
}

/// True iff every requested name is available. Empty requests always pass.
pub fn all_supported(requested: &[String], available: &[String]) -> bool {
    missing(requested, available).is_empty()
}

/// Fail with `CapabilityUnsupported` listing every missing name.
pub fn require(kind: CapabilityKind, requested: &[String], available: &[String]) -> Result<()> {
    if all_supported(requested, available) {
        return Ok(());
    }
    Err(EngineError::CapabilityUnsupported {
        kind,
        missing: missing(requested, available)
            .into_iter()
            .map(str::to_owned)
            .collect(),
    })
}

/// Instance-level check: layers first, then instance extensions.
pub fn require_instance_support(
    layers: &[String],
    extensions: &[String],
    available_layers: &[String],
    available_extensions: &[String],
) -> Result<()> {
    require(CapabilityKind::Layer, layers, available_layers)?;
    require(CapabilityKind::InstanceExtension, extensions, available_extensions)
}

pub fn available_instance_layers(entry: &ash::Entry) -> Result<Vec<String>> {
    let layers = entry
        .enumerate_instance_layer_properties()
        .during("enumerate instance layers")?;
    Ok(layers.iter().map(|l| fixed_name(&l.layer_name)).collect())
}

pub fn available_instance_extensions(entry: &ash::Entry) -> Result<Vec<String>> {
    let extensions = entry
        .enumerate_instance_extension_properties(None)
        .during("enumerate instance extensions")?;
    Ok(extensions.iter().map(|e| fixed_name(&e.extension_name)).collect())
}

pub fn available_device_extensions(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<Vec<String>> {
    let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .during("enumerate device extensions")?;
    Ok(extensions.iter().map(|e| fixed_name(&e.extension_name)).collect())
}

/// Owned C strings plus the pointer array Vulkan create-infos want.
///
/// The pointers borrow from `names`, so keep this alive until the create call returns.
pub struct NameList {
    names: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl NameList {
    pub fn new(names: &[String]) -> Result<Self> {
        let names = names
            .iter()
            .map(|n| CString::new(n.as_str()).map_err(|_| EngineError::InvalidName(n.clone())))
            .collect::<Result<Vec<_>>>()?;
        let pointers = names.iter().map(|n| n.as_ptr()).collect();
        Ok(Self { names, pointers })
    }

    pub fn as_ptrs(&self) -> &[*const c_char] {
        &self.pointers
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// Driver names come back as fixed-size, NUL-terminated arrays.
pub(crate) fn fixed_name(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

pub fn name_of(ext: &CStr) -> String {
    ext.to_string_lossy().into_owned()
}
