// Backend-agnostic resource descriptions
//
// Formats, layouts and usage flags shared by the render graph and the Vulkan
// backend. Nothing in here touches a device, so graph logic can be validated
// without a GPU.

use bitflags::bitflags;
use std::fmt;

/// Texel formats used by render targets and textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    Depth24UnormS8,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float | Self::Depth24UnormS8)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Depth24UnormS8)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8Unorm | Self::Rgba8Srgb | Self::Bgra8Unorm | Self::Bgra8Srgb => 4,
            Self::Depth32Float | Self::Depth24UnormS8 => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// Explicit image layout state.
///
/// Every image carries one of these; changing it is always a recorded
/// transition, never an implicit side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachment,
    DepthAttachment,
    DepthReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    Present,
}

impl ImageLayout {
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::DepthReadOnly | Self::ShaderReadOnly | Self::TransferSrc | Self::Present
        )
    }
}

impl fmt::Display for ImageLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

bitflags! {
    /// What a texture may be used for; fixed at creation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const COLOR_ATTACHMENT = 1 << 0;
        const DEPTH_ATTACHMENT = 1 << 1;
        const SAMPLED = 1 << 2;
        const TRANSFER_SRC = 1 << 3;
        const TRANSFER_DST = 1 << 4;
        const STORAGE = 1 << 5;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

/// Full description of a texture. Two declarations of the same graph
/// resource must agree on every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureInfo {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    /// 1 for plain 2D textures, 6 for cubemaps
    pub layers: u32,
    pub mip_levels: u32,
    pub samples: u32,
    pub usage: TextureUsage,
}

impl TextureInfo {
    /// Single-sampled, single-layer texture without mips
    pub fn new_2d(format: TextureFormat, width: u32, height: u32, usage: TextureUsage) -> Self {
        Self {
            format,
            width,
            height,
            layers: 1,
            mip_levels: 1,
            samples: 1,
            usage,
        }
    }

    /// Render target with the attachment usage implied by the format
    pub fn attachment(format: TextureFormat, width: u32, height: u32) -> Self {
        let usage = if format.is_depth() {
            TextureUsage::DEPTH_ATTACHMENT
        } else {
            TextureUsage::COLOR_ATTACHMENT
        };
        Self::new_2d(format, width, height, usage)
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(1);
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers.max(1);
        self
    }

    pub fn with_full_mip_chain(mut self) -> Self {
        self.mip_levels = mip_level_count(self.width, self.height);
        self
    }

    pub fn with_usage(mut self, usage: TextureUsage) -> Self {
        self.usage |= usage;
        self
    }

    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.layers as u64 * self.format.bytes_per_pixel() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferInfo {
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferInfo {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self { size, usage }
    }
}

/// Number of levels in a full mip chain down to 1x1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    32 - largest.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_lengths() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(1024, 512), 11);
        assert_eq!(mip_level_count(1000, 3), 10);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn attachment_usage_follows_format() {
        let depth = TextureInfo::attachment(TextureFormat::Depth32Float, 4, 4);
        assert_eq!(depth.usage, TextureUsage::DEPTH_ATTACHMENT);

        let color = TextureInfo::attachment(TextureFormat::Rgba16Float, 4, 4)
            .with_usage(TextureUsage::SAMPLED)
            .with_samples(0);
        assert!(color.usage.contains(TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED));
        assert_eq!(color.samples, 1);
    }

    #[test]
    fn cube_byte_size_counts_layers() {
        let cube = TextureInfo::new_2d(TextureFormat::Rgba8Srgb, 16, 16, TextureUsage::SAMPLED).with_layers(6);
        assert_eq!(cube.byte_size(), 16 * 16 * 4 * 6);
    }

    #[test]
    fn read_only_layouts() {
        assert!(ImageLayout::ShaderReadOnly.is_read_only());
        assert!(!ImageLayout::ColorAttachment.is_read_only());
        assert!(!ImageLayout::Undefined.is_read_only());
    }
}
