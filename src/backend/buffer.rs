// Buffer - GPU memory for vertex, index, uniform and staging data
//
// `fill` is a plain host copy: it does not wait for the GPU. Callers wait on
// the frame fence before rewriting a buffer an in-flight command list reads.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::sync::Arc;

use super::allocator::ResourceAllocator;
use crate::error::AllocError;
use crate::resource::BufferUsage;

pub struct Buffer {
    pub handle: vk::Buffer,
    pub size: u64,
    pub usage: BufferUsage,
    name: String,
    allocation: Option<Allocation>,
    allocator: Arc<ResourceAllocator>,
}

impl Buffer {
    pub(crate) fn from_parts(
        name: &str,
        handle: vk::Buffer,
        allocation: Allocation,
        size: u64,
        usage: BufferUsage,
        allocator: Arc<ResourceAllocator>,
    ) -> Self {
        Self {
            handle,
            size,
            usage,
            name: name.to_string(),
            allocation: Some(allocation),
            allocator,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy `data` to the start of the buffer
    pub fn fill(&mut self, data: &[u8]) -> Result<(), AllocError> {
        if data.len() as u64 > self.size {
            return Err(AllocError::Overflow {
                name: self.name.clone(),
                len: data.len() as u64,
                capacity: self.size,
            });
        }

        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| AllocError::NotHostVisible(self.name.clone()))?;
        mapped[..data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn fill_pod<T: bytemuck::Pod>(&mut self, data: &[T]) -> Result<(), AllocError> {
        self.fill(bytemuck::cast_slice(data))
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { self.allocator.device().device.destroy_buffer(self.handle, None) };
        if let Some(allocation) = self.allocation.take() {
            self.allocator.free(&self.name, allocation);
        }
    }
}
