// Command pool and one-shot submissions
//
// Per-frame command buffers are allocated once and reset every frame, hence
// RESET_COMMAND_BUFFER. One-shot buffers are only used at startup (uploads)
// and for debug read-back; they block on queue idle.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

pub struct CommandPool {
    pub pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl CommandPool {
    /// Pool on the graphics queue family
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.queue_families.graphics);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        Ok(Self {
            pool,
            device: device.clone(),
        })
    }

    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")
    }

    pub fn begin_single_time_commands(&self) -> Result<vk::CommandBuffer> {
        let command_buffer = self
            .allocate(1)?
            .into_iter()
            .next()
            .context("Driver returned no command buffer")?;

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(e) = unsafe { self.device.device.begin_command_buffer(command_buffer, &begin_info) } {
            self.free(command_buffer);
            return Err(e).context("Failed to begin one-shot command buffer");
        }

        Ok(command_buffer)
    }

    /// End, submit, wait for the graphics queue to drain, and free
    pub fn end_single_time_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let result = self.submit_and_wait(command_buffer);
        self.free(command_buffer);
        result
    }

    fn submit_and_wait(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let device = &self.device.device;
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            device
                .end_command_buffer(command_buffer)
                .context("Failed to end one-shot command buffer")?;
            device
                .queue_submit(self.device.graphics_queue, &[submit_info.build()], vk::Fence::null())
                .context("Failed to submit one-shot command buffer")?;
            device
                .queue_wait_idle(self.device.graphics_queue)
                .context("Failed to wait for graphics queue")?;
        }
        Ok(())
    }

    /// Record `size` bytes of `src` into `dst` and wait for the copy
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> Result<()> {
        let command_buffer = self.begin_single_time_commands()?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            self.device
                .device
                .cmd_copy_buffer(command_buffer, src, dst, &[region]);
        }

        self.end_single_time_commands(command_buffer)
    }

    fn free(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .device
                .free_command_buffers(self.pool, &[command_buffer]);
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // Frees every buffer allocated from the pool
        unsafe {
            self.device.device.destroy_command_pool(self.pool, None);
        }
    }
}
