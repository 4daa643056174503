// Resource allocator - one gpu-allocator arena per logical device
//
// Every buffer and image of the renderer is created here. The returned
// handles own their memory and give it back on drop, so the allocator is
// shared behind an Arc and outlives all of them.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::sync::Arc;

use super::buffer::Buffer;
use super::convert;
use super::image::Image;
use super::VulkanDevice;
use crate::error::{AllocError, DeviceError};
use crate::logging::SharedSink;
use crate::resource::{BufferUsage, TextureFormat, TextureInfo, TextureUsage};

const LOG_TARGET: &str = "vkscene::alloc";

pub struct ResourceAllocator {
    // Declared before `device` so the arena is released while the device lives
    allocator: Mutex<Allocator>,
    device: Arc<VulkanDevice>,
    log: SharedSink,
}

impl ResourceAllocator {
    pub fn new(device: &Arc<VulkanDevice>, log: SharedSink) -> Result<Arc<Self>, DeviceError> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: device.instance.clone(),
            device: device.device.clone(),
            physical_device: device.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        Ok(Arc::new(Self {
            allocator: Mutex::new(allocator),
            device: device.clone(),
            log,
        }))
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    pub(crate) fn allocate_memory(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation, AllocError> {
        let allocation = self
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|source| AllocError::OutOfMemory {
                name: name.to_string(),
                source,
            })?;

        self.log.debug(
            LOG_TARGET,
            format_args!("allocated {} bytes for '{}' ({:?})", requirements.size, name, location),
        );
        Ok(allocation)
    }

    pub(crate) fn free(&self, name: &str, allocation: Allocation) {
        if let Err(e) = self.allocator.lock().free(allocation) {
            self.log
                .warn(LOG_TARGET, format_args!("failed to free memory of '{}': {}", name, e));
        }
    }

    /// Host-visible buffer, ready for [`Buffer::fill`]
    pub fn allocate_buffer(self: &Arc<Self>, name: &str, usage: BufferUsage, size: u64) -> Result<Buffer, AllocError> {
        self.allocate_buffer_in(name, usage, size, MemoryLocation::CpuToGpu)
    }

    pub fn allocate_buffer_in(
        self: &Arc<Self>,
        name: &str,
        usage: BufferUsage,
        size: u64,
        location: MemoryLocation,
    ) -> Result<Buffer, AllocError> {
        let device = &self.device.device;
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size.max(1))
            .usage(convert::buffer_usage(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { device.create_buffer(&buffer_info, None) }?;
        let requirements = unsafe { device.get_buffer_memory_requirements(handle) };

        let allocation = match self.allocate_memory(name, requirements, location, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(handle, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(handle, allocation.memory(), allocation.offset()) } {
            self.free(name, allocation);
            unsafe { device.destroy_buffer(handle, None) };
            return Err(e.into());
        }

        Ok(Buffer::from_parts(name, handle, allocation, size, usage, self.clone()))
    }

    /// Single-layer 2D image; `mipmapped` allocates the full mip chain
    pub fn allocate_image_2d(
        self: &Arc<Self>,
        name: &str,
        format: TextureFormat,
        usage: TextureUsage,
        width: u32,
        height: u32,
        mipmapped: bool,
    ) -> Result<Image, AllocError> {
        let mut info = TextureInfo::new_2d(format, width, height, usage);
        if mipmapped {
            info = info.with_full_mip_chain().with_usage(TextureUsage::TRANSFER_SRC | TextureUsage::TRANSFER_DST);
        }
        self.allocate_texture(name, &info)
    }

    /// Layered image; six layers make it cube compatible with a cube view
    pub fn allocate_image_layered(
        self: &Arc<Self>,
        name: &str,
        format: TextureFormat,
        usage: TextureUsage,
        width: u32,
        height: u32,
        layers: u32,
    ) -> Result<Image, AllocError> {
        let info = TextureInfo::new_2d(format, width, height, usage).with_layers(layers);
        self.allocate_texture(name, &info)
    }

    /// Image matching a full texture description, as the render graph asks for
    pub fn allocate_texture(self: &Arc<Self>, name: &str, info: &TextureInfo) -> Result<Image, AllocError> {
        if info.width == 0 || info.height == 0 || info.layers == 0 {
            return Err(AllocError::InvalidExtent {
                name: name.to_string(),
                width: info.width,
                height: info.height,
                layers: info.layers,
            });
        }

        let device = &self.device.device;
        let cube = info.layers == 6;
        let flags = if cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let format = convert::format(info.format);

        let image_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: info.width,
                height: info.height,
                depth: 1,
            })
            .mip_levels(info.mip_levels)
            .array_layers(info.layers)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(convert::texture_usage(info.usage))
            .samples(convert::sample_count(info.samples))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { device.create_image(&image_info, None) }?;
        let requirements = unsafe { device.get_image_memory_requirements(handle) };

        let allocation = match self.allocate_memory(name, requirements, MemoryLocation::GpuOnly, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(handle, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_image_memory(handle, allocation.memory(), allocation.offset()) } {
            self.free(name, allocation);
            unsafe { device.destroy_image(handle, None) };
            return Err(e.into());
        }

        let view_type = if cube {
            vk::ImageViewType::CUBE
        } else if info.layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(handle)
            .view_type(view_type)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: convert::aspect(info.format),
                base_mip_level: 0,
                level_count: info.mip_levels,
                base_array_layer: 0,
                layer_count: info.layers,
            });

        let view = match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                self.free(name, allocation);
                unsafe { device.destroy_image(handle, None) };
                return Err(e.into());
            }
        };

        Ok(Image::from_parts(name, handle, view, *info, allocation, self.clone()))
    }
}
