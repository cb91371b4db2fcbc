// Depth attachment sized to the swapchain

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::buffer::allocate_memory;
use super::VulkanDevice;

pub struct DepthBuffer {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl DepthBuffer {
    pub fn new(device: &Arc<VulkanDevice>, extent: vk::Extent2D, format: vk::Format) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .context("Failed to create depth image")?;

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };
        let memory = match allocate_memory(device, requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok((memory, _)) => memory,
            Err(e) => {
                unsafe { device.device.destroy_image(image, None) };
                return Err(e.context("Failed to allocate depth image memory"));
            }
        };

        // From here on Drop cleans up; a null view is ignored by vkDestroyImageView
        let mut depth = Self {
            image,
            memory,
            view: vk::ImageView::null(),
            extent,
            device: device.clone(),
        };

        unsafe { device.device.bind_image_memory(image, memory, 0) }
            .context("Failed to bind depth image memory")?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        depth.view = unsafe { device.device.create_image_view(&view_info, None) }
            .context("Failed to create depth image view")?;

        log::debug!("Depth buffer {}x{} ({:?})", extent.width, extent.height, format);
        Ok(depth)
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_image_view(self.view, None);
            self.device.device.destroy_image(self.image, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}
