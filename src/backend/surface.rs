// Surface - Platform window connection
//
// Surfaces are created by hand from raw-window-handle values, one branch per
// window system, so no extra loader crate is needed.

use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;
use std::sync::Arc;

use super::VulkanDevice;
use crate::error::DeviceError;

/// Instance extensions needed to create a surface on `display`
pub fn required_instance_extensions(display: RawDisplayHandle) -> Result<Vec<&'static CStr>, DeviceError> {
    let platform = match display {
        #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        #[cfg(target_os = "windows")]
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        other => return Err(DeviceError::UnsupportedPlatform(format!("{:?}", other))),
    };
    Ok(vec![khr::Surface::name(), platform])
}

/// Owned `VkSurfaceKHR`, destroyed before the device it was created for
pub struct Surface {
    pub loader: khr::Surface,
    pub handle: vk::SurfaceKHR,
    device: Arc<VulkanDevice>,
}

impl Surface {
    pub fn new(
        device: &Arc<VulkanDevice>,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self, DeviceError> {
        let loader = khr::Surface::new(&device.entry, &device.instance);
        let handle = unsafe { create_platform_surface(device, display, window)? };

        // Verify the GPU supports presenting to this surface
        let supported = unsafe {
            loader.get_physical_device_surface_support(device.physical_device, device.graphics_queue_family, handle)
        };
        if !matches!(supported, Ok(true)) {
            unsafe { loader.destroy_surface(handle, None) };
            return Err(DeviceError::PresentUnsupported);
        }

        Ok(Self {
            loader,
            handle,
            device: device.clone(),
        })
    }

    pub fn capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR, DeviceError> {
        let caps = unsafe {
            self.loader
                .get_physical_device_surface_capabilities(self.device.physical_device, self.handle)
        }?;
        Ok(caps)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

#[allow(unused_variables)]
unsafe fn create_platform_surface(
    device: &VulkanDevice,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> Result<vk::SurfaceKHR, DeviceError> {
    match (display, window) {
        #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
            let dpy = display
                .display
                .ok_or_else(|| DeviceError::UnsupportedPlatform("Xlib without a display".into()))?;
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy.as_ptr() as *mut vk::Display)
                .window(window.window);
            let loader = khr::XlibSurface::new(&device.entry, &device.instance);
            Ok(loader.create_xlib_surface(&create_info, None)?)
        }

        #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(window)) => {
            let connection = display
                .connection
                .ok_or_else(|| DeviceError::UnsupportedPlatform("XCB without a connection".into()))?;
            let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                .connection(connection.as_ptr())
                .window(window.window.get());
            let loader = khr::XcbSurface::new(&device.entry, &device.instance);
            Ok(loader.create_xcb_surface(&create_info, None)?)
        }

        #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr())
                .surface(window.surface.as_ptr());
            let loader = khr::WaylandSurface::new(&device.entry, &device.instance);
            Ok(loader.create_wayland_surface(&create_info, None)?)
        }

        #[cfg(target_os = "windows")]
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const std::ffi::c_void;
            let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            let loader = khr::Win32Surface::new(&device.entry, &device.instance);
            Ok(loader.create_win32_surface(&create_info, None)?)
        }

        (display, _) => Err(DeviceError::UnsupportedPlatform(format!("{:?}", display))),
    }
}

#[cfg(all(test, unix, not(target_os = "macos"), not(target_os = "android")))]
mod tests {
    use super::*;
    use raw_window_handle::{WebDisplayHandle, XlibDisplayHandle};

    #[test]
    fn xlib_needs_the_xlib_extension() {
        let display = RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0));
        let extensions = required_instance_extensions(display).unwrap();
        assert_eq!(extensions, vec![khr::Surface::name(), khr::XlibSurface::name()]);
    }

    #[test]
    fn web_display_is_unsupported() {
        let display = RawDisplayHandle::Web(WebDisplayHandle::new());
        assert!(matches!(
            required_instance_extensions(display),
            Err(DeviceError::UnsupportedPlatform(_))
        ));
    }
}
