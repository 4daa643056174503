// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics
// Every wrapper owns its handle and destroys it on drop; an `Arc<VulkanDevice>`
// keeps the device alive until the last resource is gone.

pub mod allocator;
pub mod buffer;
pub mod command;
pub mod convert;
pub mod descriptor;
pub mod device;
pub mod graph_backend;
pub mod image;
pub mod pipeline;
pub mod reflect;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use allocator::ResourceAllocator;
pub use buffer::Buffer;
pub use command::{CommandBuffer, CommandPool, RenderingAttachments};
pub use descriptor::{DescriptorPool, DescriptorSet};
pub use device::VulkanDevice;
pub use graph_backend::{VulkanGraphBackend, VulkanTexture};
pub use image::{Image, Sampler};
pub use pipeline::{Pipeline, PipelineConfig, PipelineLayoutDesc, RenderTarget};
pub use reflect::{ShaderReflection, ShaderStage};
pub use shader::ShaderModule;
pub use surface::Surface;
pub use swapchain::Swapchain;
pub use sync::{Fence, FrameSync, Semaphore};
