// Mapping of backend-agnostic resource descriptions onto Vulkan enums

use ash::vk;

use crate::resource::{BufferUsage, ImageLayout, TextureFormat, TextureUsage};

pub fn format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        TextureFormat::Depth24UnormS8 => vk::Format::D24_UNORM_S8_UINT,
    }
}

/// Inverse of [`format`] for the formats a swapchain may hand out
pub fn texture_format(format: vk::Format) -> Option<TextureFormat> {
    Some(match format {
        vk::Format::R8G8B8A8_UNORM => TextureFormat::Rgba8Unorm,
        vk::Format::R8G8B8A8_SRGB => TextureFormat::Rgba8Srgb,
        vk::Format::B8G8R8A8_UNORM => TextureFormat::Bgra8Unorm,
        vk::Format::B8G8R8A8_SRGB => TextureFormat::Bgra8Srgb,
        vk::Format::R16G16B16A16_SFLOAT => TextureFormat::Rgba16Float,
        vk::Format::R32G32B32A32_SFLOAT => TextureFormat::Rgba32Float,
        vk::Format::D32_SFLOAT => TextureFormat::Depth32Float,
        vk::Format::D24_UNORM_S8_UINT => TextureFormat::Depth24UnormS8,
        _ => return None,
    })
}

pub fn aspect(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub fn layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn texture_usage(usage: TextureUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::COLOR_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(TextureUsage::DEPTH_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.contains(TextureUsage::SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::TRANSFER_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::TRANSFER_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUsage::STORAGE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    flags
}

pub fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    flags
}

pub fn sample_count(samples: u32) -> vk::SampleCountFlags {
    match samples {
        64 => vk::SampleCountFlags::TYPE_64,
        32 => vk::SampleCountFlags::TYPE_32,
        16 => vk::SampleCountFlags::TYPE_16,
        8 => vk::SampleCountFlags::TYPE_8,
        4 => vk::SampleCountFlags::TYPE_4,
        2 => vk::SampleCountFlags::TYPE_2,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

/// Pipeline stages and accesses that touch an image while it is in `layout`.
/// Used as the source scope when leaving and the destination scope when
/// entering the layout.
pub fn barrier_scope(layout: ImageLayout) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    match layout {
        ImageLayout::Undefined => (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()),
        ImageLayout::General => (
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
        ),
        ImageLayout::ColorAttachment => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        ImageLayout::DepthAttachment => (
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        ImageLayout::DepthReadOnly => (
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::SHADER_READ,
        ),
        ImageLayout::ShaderReadOnly => (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ),
        ImageLayout::TransferSrc => (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_READ),
        ImageLayout::TransferDst => (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
        ImageLayout::Present => (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapchain_formats_round_trip() {
        for vk_format in [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_SRGB] {
            let ours = texture_format(vk_format).unwrap();
            assert_eq!(format(ours), vk_format);
        }
        assert_eq!(texture_format(vk::Format::A2B10G10R10_UNORM_PACK32), None);
    }

    #[test]
    fn depth_stencil_aspect() {
        assert_eq!(aspect(TextureFormat::Depth32Float), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect(TextureFormat::Depth24UnormS8),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(aspect(TextureFormat::Rgba8Srgb), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn usage_flags_map_one_to_one() {
        let flags = texture_usage(TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED);
        assert_eq!(flags, vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED);
        assert_eq!(
            buffer_usage(BufferUsage::VERTEX | BufferUsage::TRANSFER_DST),
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
    }

    #[test]
    fn odd_sample_counts_fall_back_to_one() {
        assert_eq!(sample_count(4), vk::SampleCountFlags::TYPE_4);
        assert_eq!(sample_count(3), vk::SampleCountFlags::TYPE_1);
    }
}
