// Command pools and command buffer recording
//
// `CommandBuffer` wraps the raw handle with the handful of commands the
// renderer records. Exactly one buffer is being recorded at a time.

use ash::vk;
use std::sync::Arc;

use super::buffer::Buffer;
use super::sync::Fence;
use super::VulkanDevice;
use crate::error::DeviceError;

pub struct CommandPool {
    pub handle: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl CommandPool {
    /// Pool on the graphics queue family whose buffers can be reset one by one
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self, DeviceError> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let handle = unsafe { device.device.create_command_pool(&pool_info, None) }?;
        Ok(Self {
            handle,
            device: device.clone(),
        })
    }

    pub fn allocate(&self, count: u32) -> Result<Vec<CommandBuffer>, DeviceError> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let handles = unsafe { self.device.device.allocate_command_buffers(&alloc_info) }?;
        Ok(handles
            .into_iter()
            .map(|handle| CommandBuffer {
                handle,
                device: self.device.clone(),
            })
            .collect())
    }

    pub fn free(&self, buffer: CommandBuffer) {
        unsafe { self.device.device.free_command_buffers(self.handle, &[buffer.handle]) };
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_command_pool(self.handle, None) };
    }
}

/// Views and clear values for one dynamic-rendering scope
pub struct RenderingAttachments {
    pub extent: vk::Extent2D,
    pub color: vk::ImageView,
    pub clear_color: [f32; 4],
    /// Single-sampled target the color attachment resolves into
    pub resolve: Option<vk::ImageView>,
    pub depth: Option<vk::ImageView>,
}

pub struct CommandBuffer {
    pub handle: vk::CommandBuffer,
    device: Arc<VulkanDevice>,
}

impl CommandBuffer {
    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    fn raw(&self) -> &ash::Device {
        &self.device.device
    }

    pub fn begin(&self, one_time: bool) -> Result<(), DeviceError> {
        let flags = if one_time {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { self.raw().begin_command_buffer(self.handle, &begin_info) }?;
        Ok(())
    }

    pub fn end(&self) -> Result<(), DeviceError> {
        unsafe { self.raw().end_command_buffer(self.handle) }?;
        Ok(())
    }

    pub fn reset(&self) -> Result<(), DeviceError> {
        unsafe {
            self.raw()
                .reset_command_buffer(self.handle, vk::CommandBufferResetFlags::empty())
        }?;
        Ok(())
    }

    pub fn begin_rendering(&self, attachments: &RenderingAttachments) {
        let mut color = vk::RenderingAttachmentInfo::builder()
            .image_view(attachments.color)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: attachments.clear_color,
                },
            });
        if let Some(resolve) = attachments.resolve {
            color = color
                .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                .resolve_image_view(resolve)
                .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .store_op(vk::AttachmentStoreOp::DONT_CARE);
        }
        let color_attachments = [color.build()];

        let depth = attachments.depth.map(|view| {
            vk::RenderingAttachmentInfo::builder()
                .image_view(view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                })
                .build()
        });

        let mut rendering_info = vk::RenderingInfo::builder()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: attachments.extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = depth.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        unsafe { self.raw().cmd_begin_rendering(self.handle, &rendering_info) };
    }

    pub fn end_rendering(&self) {
        unsafe { self.raw().cmd_end_rendering(self.handle) };
    }

    /// Full-extent viewport and scissor (both are dynamic state)
    pub fn set_viewport_scissor(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.raw().cmd_set_viewport(self.handle, 0, &[viewport]);
            self.raw().cmd_set_scissor(self.handle, 0, &[scissor]);
        }
    }

    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.raw()
                .cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    pub fn bind_descriptor_set(&self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.raw().cmd_bind_descriptor_sets(
                self.handle,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            )
        };
    }

    pub fn push_constants(&self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, bytes: &[u8]) {
        unsafe { self.raw().cmd_push_constants(self.handle, layout, stages, 0, bytes) };
    }

    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.raw().cmd_bind_vertex_buffers(self.handle, 0, &[buffer], &[0]) };
    }

    /// 32-bit indices
    pub fn bind_index_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.raw()
                .cmd_bind_index_buffer(self.handle, buffer, 0, vk::IndexType::UINT32)
        };
    }

    pub fn draw(&self, vertex_count: u32) {
        unsafe { self.raw().cmd_draw(self.handle, vertex_count, 1, 0, 0) };
    }

    pub fn draw_indexed(&self, index_count: u32) {
        unsafe { self.raw().cmd_draw_indexed(self.handle, index_count, 1, 0, 0, 0) };
    }

    pub fn image_barriers(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.raw().cmd_pipeline_barrier(
                self.handle,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                barriers,
            )
        };
    }

    pub fn copy_buffer_to_image(&self, src: &Buffer, image: vk::Image, region: vk::BufferImageCopy) {
        unsafe {
            self.raw().cmd_copy_buffer_to_image(
                self.handle,
                src.handle,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }

    /// Blit within one image, from a TransferSrc level to a TransferDst level
    pub fn blit_within(&self, image: vk::Image, region: vk::ImageBlit) {
        unsafe {
            self.raw().cmd_blit_image(
                self.handle,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                vk::Filter::LINEAR,
            )
        };
    }

    /// Submit to the graphics queue
    pub fn submit(
        &self,
        wait: &[(vk::Semaphore, vk::PipelineStageFlags)],
        signal: &[vk::Semaphore],
        fence: &Fence,
    ) -> Result<(), DeviceError> {
        let wait_semaphores: Vec<_> = wait.iter().map(|&(s, _)| s).collect();
        let wait_stages: Vec<_> = wait.iter().map(|&(_, stage)| stage).collect();
        let command_buffers = [self.handle];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(signal)
            .build();
        unsafe {
            self.raw()
                .queue_submit(self.device.graphics_queue, &[submit_info], fence.handle)
        }?;
        Ok(())
    }
}

/// Record `f` into a one-time command buffer, submit it and wait for it.
/// Used for uploads outside the frame loop.
pub fn submit_immediate<R, E>(pool: &CommandPool, f: impl FnOnce(&mut CommandBuffer) -> Result<R, E>) -> Result<R, E>
where
    E: From<DeviceError>,
{
    let mut buffers = pool.allocate(1)?;
    let Some(mut cmd) = buffers.pop() else {
        return Err(E::from(DeviceError::Vk(vk::Result::ERROR_INITIALIZATION_FAILED)));
    };

    let result = (|| -> Result<R, E> {
        cmd.begin(true)?;
        let value = f(&mut cmd)?;
        cmd.end()?;

        let fence = Fence::new(&pool.device, false)?;
        cmd.submit(&[], &[], &fence)?;
        fence.wait(u64::MAX)?;
        Ok(value)
    })();

    pool.free(cmd);
    result
}
