// Descriptor pools and set updates
//
// Pools are sized from a reflected pipeline layout so each material can own a
// pool that exactly fits its sets.

use ash::vk;
use std::sync::Arc;

use super::buffer::Buffer;
use super::image::{Image, Sampler};
use super::pipeline::PipelineLayoutDesc;
use super::reflect::DescriptorKind;
use super::VulkanDevice;
use crate::error::DeviceError;

/// Descriptor counts per type needed for `sets` sets of `desc`
pub fn pool_sizes(desc: &PipelineLayoutDesc, sets: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in desc.bindings() {
        let ty = binding.kind.vk_type();
        match sizes.iter_mut().find(|size| size.ty == ty) {
            Some(size) => size.descriptor_count += sets,
            None => sizes.push(vk::DescriptorPoolSize {
                ty,
                descriptor_count: sets,
            }),
        }
    }
    sizes
}

pub struct DescriptorPool {
    pub handle: vk::DescriptorPool,
    device: Arc<VulkanDevice>,
}

impl DescriptorPool {
    pub fn for_layout(device: &Arc<VulkanDevice>, desc: &PipelineLayoutDesc, max_sets: u32) -> Result<Self, DeviceError> {
        let mut sizes = pool_sizes(desc, max_sets);
        if sizes.is_empty() {
            // Vulkan rejects a pool without sizes
            sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1,
            });
        }
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&sizes);
        let handle = unsafe { device.device.create_descriptor_pool(&pool_info, None) }?;
        Ok(Self {
            handle,
            device: device.clone(),
        })
    }

    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> Result<DescriptorSet, DeviceError> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.handle)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.device.allocate_descriptor_sets(&alloc_info) }?;
        let handle = sets
            .first()
            .copied()
            .ok_or(DeviceError::Vk(vk::Result::ERROR_OUT_OF_POOL_MEMORY))?;
        Ok(DescriptorSet {
            handle,
            device: self.device.clone(),
        })
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        // Sets allocated from the pool are freed with it
        unsafe { self.device.device.destroy_descriptor_pool(self.handle, None) };
    }
}

/// A set allocated from a `DescriptorPool`. Must not outlive the pool.
pub struct DescriptorSet {
    pub handle: vk::DescriptorSet,
    device: Arc<VulkanDevice>,
}

impl DescriptorSet {
    pub fn write_uniform_buffer(&self, binding: u32, buffer: &Buffer) {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: buffer.handle,
            offset: 0,
            range: buffer.size,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(self.handle)
            .dst_binding(binding)
            .descriptor_type(DescriptorKind::UniformBuffer.vk_type())
            .buffer_info(&buffer_info)
            .build();
        unsafe { self.device.device.update_descriptor_sets(&[write], &[]) };
    }

    /// Point `binding` at `image`, which is sampled in `ShaderReadOnly`
    pub fn write_image_sampler(&self, binding: u32, image: &Image, sampler: &Sampler) {
        let image_info = [vk::DescriptorImageInfo {
            sampler: sampler.handle,
            image_view: image.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(self.handle)
            .dst_binding(binding)
            .descriptor_type(DescriptorKind::CombinedImageSampler.vk_type())
            .image_info(&image_info)
            .build();
        unsafe { self.device.device.update_descriptor_sets(&[write], &[]) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::reflect::{DescriptorBinding, ShaderReflection, ShaderStage};

    fn fragment(bindings: Vec<DescriptorBinding>) -> ShaderReflection {
        ShaderReflection {
            stage: ShaderStage::Fragment,
            vertex_inputs: Vec::new(),
            vertex_stride: 0,
            bindings,
            push_constant_size: 0,
        }
    }

    #[test]
    fn pool_sizes_group_by_type() {
        let mut desc = PipelineLayoutDesc::default();
        desc.add_shader(&fragment(vec![
            DescriptorBinding {
                binding: 0,
                kind: DescriptorKind::UniformBuffer,
            },
            DescriptorBinding {
                binding: 1,
                kind: DescriptorKind::CombinedImageSampler,
            },
            DescriptorBinding {
                binding: 2,
                kind: DescriptorKind::CombinedImageSampler,
            },
        ]))
        .unwrap();

        let sizes = pool_sizes(&desc, 3);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 3);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 6);
    }

    #[test]
    fn empty_layout_needs_no_sizes() {
        assert!(pool_sizes(&PipelineLayoutDesc::default(), 4).is_empty());
    }
}
