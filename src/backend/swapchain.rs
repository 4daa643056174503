// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Swapchain images are not owned by the allocator; the render graph imports
// one of them per frame.

use ash::vk;
use std::sync::Arc;

use super::convert;
use super::surface::Surface;
use super::VulkanDevice;
use crate::error::DeviceError;
use crate::resource::TextureFormat;

/// Prefer SRGB BGRA, otherwise the first format the renderer can describe
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<(vk::SurfaceFormatKHR, TextureFormat)> {
    formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.iter().find(|f| convert::texture_format(f.format).is_some()))
        .and_then(|f| convert::texture_format(f.format).map(|texture| (*f, texture)))
}

/// The configured mode if available, FIFO otherwise (always supported)
pub fn choose_present_mode(available: &[vk::PresentModeKHR], preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: TextureFormat,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(
        device: &Arc<VulkanDevice>,
        surface: &Surface,
        width: u32,
        height: u32,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> Result<Self, DeviceError> {
        log::info!("Creating swapchain: {}x{}", width, height);

        let surface_caps = surface.capabilities()?;
        let formats = unsafe {
            surface
                .loader
                .get_physical_device_surface_formats(device.physical_device, surface.handle)
        }?;
        let present_modes = unsafe {
            surface
                .loader
                .get_physical_device_surface_present_modes(device.physical_device, surface.handle)
        }?;

        let (surface_format, format) = choose_surface_format(&formats)
            .ok_or_else(|| DeviceError::UnsupportedPlatform(format!("no usable surface format in {formats:?}")))?;
        let present_mode = choose_present_mode(&present_modes, preferred_present_mode);
        log::info!("Present mode: {:?}", present_mode);

        let extent = choose_extent(&surface_caps, width, height);
        let image_count = choose_image_count(&surface_caps);

        let swapchain_loader = ash::extensions::khr::Swapchain::new(&device.instance, &device.device);
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }?;

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }?;
        log::info!("Created swapchain with {} images", images.len());

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            match unsafe { device.device.create_image_view(&create_info, None) } {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    unsafe {
                        for &view in &image_views {
                            device.device.destroy_image_view(view, None);
                        }
                        swapchain_loader.destroy_swapchain(swapchain, None);
                    }
                    return Err(e.into());
                }
            }
        }

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_views,
            format,
            extent,
            device: device.clone(),
        })
    }

    /// Acquire next image for rendering. Returns the image index and whether
    /// the swapchain is suboptimal.
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<(u32, bool), DeviceError> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, timeout, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => Ok((index, suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(DeviceError::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Present rendered image to screen. Returns true when the swapchain
    /// should be recreated.
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphores: &[vk::Semaphore]) -> Result<bool, DeviceError> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn srgb_bgra_is_preferred() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        let (chosen, format) = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(format, TextureFormat::Bgra8Srgb);
    }

    #[test]
    fn unknown_formats_are_skipped() {
        let formats = [
            surface_format(vk::Format::A2B10G10R10_UNORM_PACK32),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];
        let (_, format) = choose_surface_format(&formats).unwrap();
        assert_eq!(format, TextureFormat::Bgra8Unorm);
        assert!(choose_surface_format(&formats[..1]).is_none());
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_is_clamped_when_surface_leaves_it_open() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        let extent = choose_extent(&caps, 4096, 600);
        assert_eq!((extent.width, extent.height), (1024, 600));
        assert_eq!(choose_image_count(&caps), 3);

        let capped = vk::SurfaceCapabilitiesKHR {
            max_image_count: 2,
            ..caps
        };
        assert_eq!(choose_image_count(&capped), 2);
    }
}
