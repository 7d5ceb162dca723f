// Presentation surface - the only platform-specific piece
//
// The engine core only sees `SurfaceFactory`: which instance extensions a
// platform needs, and how to turn its native handles into a VkSurfaceKHR.
// There is one factory per windowing system.

use crate::error::{EngineError, Result, VkResultExt};
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_void, CStr};

pub trait SurfaceFactory {
    /// Platform surface extension(s), on top of VK_KHR_surface
    fn platform_extensions(&self) -> Vec<&'static CStr>;

    /// # Safety
    /// The native handles captured by the factory must still be valid, and
    /// `instance` must have been created with `required_extensions()` enabled.
    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR>;

    fn required_extensions(&self) -> Vec<&'static CStr> {
        let mut extensions = vec![khr::Surface::name()];
        extensions.extend(self.platform_extensions());
        extensions
    }
}

pub struct Win32Factory {
    hinstance: *const c_void,
    hwnd: *const c_void,
}

impl SurfaceFactory for Win32Factory {
    fn platform_extensions(&self) -> Vec<&'static CStr> {
        vec![khr::Win32Surface::name()]
    }

    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR> {
        let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
            .hinstance(self.hinstance)
            .hwnd(self.hwnd);
        khr::Win32Surface::new(entry, instance)
            .create_win32_surface(&create_info, None)
            .creating("win32 surface")
    }
}

pub struct XlibFactory {
    display: *mut c_void,
    window: std::os::raw::c_ulong,
}

impl SurfaceFactory for XlibFactory {
    fn platform_extensions(&self) -> Vec<&'static CStr> {
        vec![khr::XlibSurface::name()]
    }

    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR> {
        let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
            .dpy(self.display as *mut _)
            .window(self.window);
        khr::XlibSurface::new(entry, instance)
            .create_xlib_surface(&create_info, None)
            .creating("xlib surface")
    }
}

pub struct XcbFactory {
    connection: *mut c_void,
    window: u32,
}

impl SurfaceFactory for XcbFactory {
    fn platform_extensions(&self) -> Vec<&'static CStr> {
        vec![khr::XcbSurface::name()]
    }

    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR> {
        let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
            .connection(self.connection as *mut _)
            .window(self.window);
        khr::XcbSurface::new(entry, instance)
            .create_xcb_surface(&create_info, None)
            .creating("xcb surface")
    }
}

pub struct WaylandFactory {
    display: *mut c_void,
    surface: *mut c_void,
}

impl SurfaceFactory for WaylandFactory {
    fn platform_extensions(&self) -> Vec<&'static CStr> {
        vec![khr::WaylandSurface::name()]
    }

    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR> {
        let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
            .display(self.display as *mut _)
            .surface(self.surface as *mut _);
        khr::WaylandSurface::new(entry, instance)
            .create_wayland_surface(&create_info, None)
            .creating("wayland surface")
    }
}

/// Pick the factory matching the window's native handles.
///
/// The returned factory holds raw handles, so it must not outlive `window`.
pub fn factory_for<W>(window: &W) -> Result<Box<dyn SurfaceFactory>>
where
    W: HasWindowHandle + HasDisplayHandle,
{
    let window_handle = window
        .window_handle()
        .map_err(|e| EngineError::Surface(format!("failed to get window handle: {e}")))?
        .as_raw();
    let display_handle = window
        .display_handle()
        .map_err(|e| EngineError::Surface(format!("failed to get display handle: {e}")))?
        .as_raw();

    match (display_handle, window_handle) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => Ok(Box::new(Win32Factory {
            hinstance: handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const c_void,
            hwnd: handle.hwnd.get() as *const c_void,
        })),
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
            let display = display
                .display
                .ok_or_else(|| EngineError::Surface("xlib display handle is null".into()))?;
            Ok(Box::new(XlibFactory {
                display: display.as_ptr(),
                window: handle.window,
            }))
        }
        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(handle)) => {
            let connection = display
                .connection
                .ok_or_else(|| EngineError::Surface("xcb connection is null".into()))?;
            Ok(Box::new(XcbFactory {
                connection: connection.as_ptr(),
                window: handle.window.get(),
            }))
        }
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
            Ok(Box::new(WaylandFactory {
                display: display.display.as_ptr(),
                surface: handle.surface.as_ptr(),
            }))
        }
        (display, window) => Err(EngineError::Surface(format!(
            "unsupported window system: {display:?} / {window:?}"
        ))),
    }
}

/// The created surface plus its extension loader; destroyed on drop.
///
/// Must be dropped before the instance it was created from.
pub struct PresentationSurface {
    pub loader: khr::Surface,
    pub surface: vk::SurfaceKHR,
}

impl PresentationSurface {
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        factory: &dyn SurfaceFactory,
    ) -> Result<Self> {
        let surface = unsafe { factory.create_surface(entry, instance)? };
        Ok(Self {
            loader: khr::Surface::new(entry, instance),
            surface,
        })
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> Result<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, family, self.surface)
        }
        .during("query surface support")
    }

    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
        }
        .during("query surface capabilities")
    }

    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.surface)
        }
        .during("query surface formats")
    }

    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
        }
        .during("query present modes")
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_extensions_start_with_khr_surface() {
        let factory = WaylandFactory {
            display: std::ptr::null_mut(),
            surface: std::ptr::null_mut(),
        };
        let names: Vec<_> = factory
            .required_extensions()
            .iter()
            .map(|n| n.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["VK_KHR_surface", "VK_KHR_wayland_surface"]);
    }

    #[test]
    fn each_platform_names_its_own_extension() {
        let xlib = XlibFactory { display: std::ptr::null_mut(), window: 0 };
        let xcb = XcbFactory { connection: std::ptr::null_mut(), window: 0 };
        let win32 = Win32Factory { hinstance: std::ptr::null(), hwnd: std::ptr::null() };
        assert_eq!(xlib.platform_extensions(), vec![khr::XlibSurface::name()]);
        assert_eq!(xcb.platform_extensions(), vec![khr::XcbSurface::name()]);
        assert_eq!(win32.platform_extensions(), vec![khr::Win32Surface::name()]);
    }
}
