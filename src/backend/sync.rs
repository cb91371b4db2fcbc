// Synchronization primitives
//
// One set per frame slot: the image-acquired and render-finished semaphores
// order GPU work, the fence tells the CPU when the slot may be reused.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the first wait on a fresh slot returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            device: device.clone(),
        };

        unsafe {
            sync.image_available = device
                .device
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create semaphore")?;
            sync.render_finished = device
                .device
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create semaphore")?;
            sync.in_flight_fence = device
                .device
                .create_fence(&fence_info, None)
                .context("Failed to create fence")?;
        }

        Ok(sync)
    }

    /// Block until the slot's previous submission has completed
    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.in_flight_fence], true, u64::MAX)
                .context("Failed to wait for fence")
        }
    }

    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device
                .device
                .reset_fences(&[self.in_flight_fence])
                .context("Failed to reset fence")
        }
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_semaphore(self.render_finished, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
