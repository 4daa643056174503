// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync
// Critical for correct and efficient multi-frame rendering

use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;
use crate::error::DeviceError;

/// CPU waits on GPU completion through a fence
pub struct Fence {
    pub handle: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl Fence {
    pub fn new(device: &Arc<VulkanDevice>, signaled: bool) -> Result<Self, DeviceError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::builder().flags(flags);
        let handle = unsafe { device.device.create_fence(&fence_info, None) }?;
        Ok(Self {
            handle,
            device: device.clone(),
        })
    }

    pub fn wait(&self, timeout: u64) -> Result<(), DeviceError> {
        unsafe { self.device.device.wait_for_fences(&[self.handle], true, timeout) }?;
        Ok(())
    }

    pub fn reset(&self) -> Result<(), DeviceError> {
        unsafe { self.device.device.reset_fences(&[self.handle]) }?;
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_fence(self.handle, None) };
    }
}

/// Orders GPU work across queue submissions
pub struct Semaphore {
    pub handle: vk::Semaphore,
    device: Arc<VulkanDevice>,
}

impl Semaphore {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self, DeviceError> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let handle = unsafe { device.device.create_semaphore(&semaphore_info, None) }?;
        Ok(Self {
            handle,
            device: device.clone(),
        })
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_semaphore(self.handle, None) };
    }
}

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: Semaphore,
    pub render_finished: Semaphore,
    pub in_flight: Fence,
}

impl FrameSync {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self, DeviceError> {
        Ok(Self {
            image_available: Semaphore::new(device)?,
            render_finished: Semaphore::new(device)?,
            // Start signaled so the first wait returns immediately
            in_flight: Fence::new(device, true)?,
        })
    }
}
