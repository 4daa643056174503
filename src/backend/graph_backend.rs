// Vulkan implementation of the render graph backend
//
// Graph-owned textures and buffers come from the resource allocator. Imported
// textures (swapchain images) are borrowed handles the graph never destroys.

use ash::vk;
use std::sync::Arc;

use super::allocator::ResourceAllocator;
use super::buffer::Buffer;
use super::command::CommandBuffer;
use super::image::{self, Image};
use crate::error::AllocError;
use crate::graph::RenderBackend;
use crate::resource::{BufferInfo, ImageLayout, TextureInfo};

pub enum VulkanTexture {
    Owned(Image),
    /// Not owned, e.g. a swapchain image
    External { handle: vk::Image, view: vk::ImageView },
}

impl VulkanTexture {
    pub fn handle(&self) -> vk::Image {
        match self {
            VulkanTexture::Owned(image) => image.handle,
            VulkanTexture::External { handle, .. } => *handle,
        }
    }

    pub fn view(&self) -> vk::ImageView {
        match self {
            VulkanTexture::Owned(image) => image.view,
            VulkanTexture::External { view, .. } => *view,
        }
    }
}

pub struct VulkanGraphBackend {
    allocator: Arc<ResourceAllocator>,
}

impl VulkanGraphBackend {
    pub fn new(allocator: Arc<ResourceAllocator>) -> Self {
        Self { allocator }
    }

    pub fn allocator(&self) -> &Arc<ResourceAllocator> {
        &self.allocator
    }
}

impl RenderBackend for VulkanGraphBackend {
    type Texture = VulkanTexture;
    type Buffer = Buffer;
    type CommandContext = CommandBuffer;
    type Error = AllocError;

    fn create_texture(&mut self, name: &str, info: &TextureInfo) -> Result<VulkanTexture, AllocError> {
        self.allocator.allocate_texture(name, info).map(VulkanTexture::Owned)
    }

    fn create_buffer(&mut self, name: &str, info: &BufferInfo) -> Result<Buffer, AllocError> {
        self.allocator.allocate_buffer(name, info.usage, info.size)
    }

    fn transition_texture(
        &mut self,
        cmd: &mut CommandBuffer,
        texture: &VulkanTexture,
        info: &TextureInfo,
        from: ImageLayout,
        to: ImageLayout,
    ) {
        image::record_layout_transition(cmd, texture.handle(), image::subresource_range(info), from, to);
    }
}
