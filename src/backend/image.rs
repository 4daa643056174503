// Image - 2D, layered and mipmapped textures with explicit layout state
//
// The layout field mirrors what recorded commands leave the image in. It is
// only ever changed together with a recorded barrier.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::sync::Arc;

use super::allocator::ResourceAllocator;
use super::buffer::Buffer;
use super::command::CommandBuffer;
use super::convert;
use super::VulkanDevice;
use crate::error::{AllocError, DeviceError};
use crate::resource::{ImageLayout, TextureInfo};

/// Record one layout transition of `image` using the default scopes of both
/// layouts. Works on images the renderer does not own (swapchain images).
pub fn record_layout_transition(
    cmd: &CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    from: ImageLayout,
    to: ImageLayout,
) {
    let (src_stage, src_access) = convert::barrier_scope(from);
    let (dst_stage, dst_access) = convert::barrier_scope(to);
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(convert::layout(from))
        .new_layout(convert::layout(to))
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .build();
    cmd.image_barriers(src_stage, dst_stage, &[barrier]);
}

/// Every mip level and layer of an image described by `info`
pub fn subresource_range(info: &TextureInfo) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: convert::aspect(info.format),
        base_mip_level: 0,
        level_count: info.mip_levels,
        base_array_layer: 0,
        layer_count: info.layers,
    }
}

pub struct Image {
    pub handle: vk::Image,
    pub view: vk::ImageView,
    pub info: TextureInfo,
    pub layout: ImageLayout,
    name: String,
    allocation: Option<Allocation>,
    allocator: Arc<ResourceAllocator>,
}

impl Image {
    pub(crate) fn from_parts(
        name: &str,
        handle: vk::Image,
        view: vk::ImageView,
        info: TextureInfo,
        allocation: Allocation,
        allocator: Arc<ResourceAllocator>,
    ) -> Self {
        Self {
            handle,
            view,
            info,
            layout: ImageLayout::Undefined,
            name: name.to_string(),
            allocation: Some(allocation),
            allocator,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vk_format(&self) -> vk::Format {
        convert::format(self.info.format)
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.info.width,
            height: self.info.height,
        }
    }

    /// Every mip level and layer
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        subresource_range(&self.info)
    }

    fn level_range(&self, level: u32) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            base_mip_level: level,
            level_count: 1,
            ..self.full_range()
        }
    }

    /// Transition the whole image with explicit source and destination scopes
    #[allow(clippy::too_many_arguments)]
    pub fn transition_layout(
        &mut self,
        cmd: &CommandBuffer,
        new_layout: ImageLayout,
        src_stage: vk::PipelineStageFlags,
        src_access: vk::AccessFlags,
        dst_stage: vk::PipelineStageFlags,
        dst_access: vk::AccessFlags,
    ) {
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(convert::layout(self.layout))
            .new_layout(convert::layout(new_layout))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.handle)
            .subresource_range(self.full_range())
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .build();
        cmd.image_barriers(src_stage, dst_stage, &[barrier]);
        self.layout = new_layout;
    }

    /// Transition the whole image using the default scope of each layout
    pub fn transition(&mut self, cmd: &CommandBuffer, new_layout: ImageLayout) {
        if self.layout == new_layout {
            return;
        }
        record_layout_transition(cmd, self.handle, self.full_range(), self.layout, new_layout);
        self.layout = new_layout;
    }

    /// Copy tightly packed texels from `staging` into mip 0 of `layer`
    pub fn upload(&mut self, cmd: &CommandBuffer, staging: &Buffer, layer: u32) -> Result<(), AllocError> {
        let bytes = self.info.width as u64 * self.info.height as u64 * self.info.format.bytes_per_pixel() as u64;
        if bytes > staging.size {
            return Err(AllocError::Overflow {
                name: self.name.clone(),
                len: bytes,
                capacity: staging.size,
            });
        }
        if layer >= self.info.layers {
            return Err(AllocError::InvalidExtent {
                name: self.name.clone(),
                width: self.info.width,
                height: self.info.height,
                layers: layer + 1,
            });
        }

        self.transition(cmd, ImageLayout::TransferDst);
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: convert::aspect(self.info.format),
                mip_level: 0,
                base_array_layer: layer,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: self.info.width,
                height: self.info.height,
                depth: 1,
            },
        };
        cmd.copy_buffer_to_image(staging, self.handle, region);
        Ok(())
    }

    /// Fill mips 1.. by blitting each level from the one above and leave the
    /// whole image in `ShaderReadOnly`. Expects level 0 uploaded and the image
    /// in `TransferDst`.
    pub fn generate_mipmaps(&mut self, cmd: &CommandBuffer) {
        let device = self.allocator.device();
        if self.info.mip_levels <= 1 || !device.supports_linear_blit(self.vk_format()) {
            if self.info.mip_levels > 1 {
                log::warn!(
                    "{:?} cannot be blitted linearly, '{}' keeps only its base level",
                    self.info.format,
                    self.name
                );
            }
            self.transition(cmd, ImageLayout::ShaderReadOnly);
            return;
        }

        let mut width = self.info.width as i32;
        let mut height = self.info.height as i32;
        for level in 1..self.info.mip_levels {
            record_layout_transition(
                cmd,
                self.handle,
                self.level_range(level - 1),
                ImageLayout::TransferDst,
                ImageLayout::TransferSrc,
            );

            let next_width = (width / 2).max(1);
            let next_height = (height / 2).max(1);
            let layers = |mip_level| vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level,
                base_array_layer: 0,
                layer_count: self.info.layers,
            };
            let blit = vk::ImageBlit {
                src_subresource: layers(level - 1),
                src_offsets: [vk::Offset3D { x: 0, y: 0, z: 0 }, vk::Offset3D { x: width, y: height, z: 1 }],
                dst_subresource: layers(level),
                dst_offsets: [
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: next_width,
                        y: next_height,
                        z: 1,
                    },
                ],
            };
            cmd.blit_within(self.handle, blit);

            record_layout_transition(
                cmd,
                self.handle,
                self.level_range(level - 1),
                ImageLayout::TransferSrc,
                ImageLayout::ShaderReadOnly,
            );
            width = next_width;
            height = next_height;
        }

        record_layout_transition(
            cmd,
            self.handle,
            self.level_range(self.info.mip_levels - 1),
            ImageLayout::TransferDst,
            ImageLayout::ShaderReadOnly,
        );
        self.layout = ImageLayout::ShaderReadOnly;
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        let device = &self.allocator.device().device;
        unsafe {
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.handle, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.allocator.free(&self.name, allocation);
        }
    }
}

/// Linear, anisotropic sampler covering every mip level
pub struct Sampler {
    pub handle: vk::Sampler,
    device: Arc<VulkanDevice>,
}

impl Sampler {
    pub fn new(
        device: &Arc<VulkanDevice>,
        mip_levels: u32,
        address_mode: vk::SamplerAddressMode,
    ) -> Result<Self, DeviceError> {
        let max_anisotropy = device.properties.limits.max_sampler_anisotropy.min(16.0);
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(true)
            .max_anisotropy(max_anisotropy)
            .min_lod(0.0)
            .max_lod(mip_levels as f32)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);
        let handle = unsafe { device.device.create_sampler(&sampler_info, None) }?;
        Ok(Self {
            handle,
            device: device.clone(),
        })
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_sampler(self.handle, None) };
    }
}
