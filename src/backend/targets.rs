// Swapchain-dependent resources as one unit
//
// Everything that depends on the surface extent or format lives here, so a
// rebuild is "build a new FrameTargets, drop the old one". Teardown order:
// depth, framebuffers, pipeline, pipeline layout, render pass, then the
// swapchain's image views and handle.

use anyhow::Result;
use ash::vk;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use super::image::DepthBuffer;
use super::pipeline::{create_framebuffer, create_graphics_pipeline, create_render_pass};
use super::shader::{ShaderCode, ShaderModule};
use super::{Swapchain, VulkanDevice};

/// Inputs that stay fixed across rebuilds
pub struct TargetSettings<'a> {
    pub preferred_present_mode: vk::PresentModeKHR,
    pub depth_format: vk::Format,
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub shaders: &'a ShaderCode,
}

pub struct FrameTargets {
    pub swapchain: Swapchain,
    depth: ManuallyDrop<DepthBuffer>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    device: Arc<VulkanDevice>,
}

impl FrameTargets {
    /// Build the chain and everything bound to it. When `old` is given its
    /// swapchain is retired into the new one; the caller drops `old` after.
    pub fn build(
        device: &Arc<VulkanDevice>,
        framebuffer_size: (u32, u32),
        settings: &TargetSettings,
        old: Option<&FrameTargets>,
    ) -> Result<Self> {
        let old_handle = old.map_or(vk::SwapchainKHR::null(), |t| t.swapchain.swapchain);
        let swapchain = Swapchain::new(device, framebuffer_size, settings.preferred_present_mode, old_handle)?;
        let extent = swapchain.extent;

        let depth = DepthBuffer::new(device, extent, settings.depth_format)?;
        let render_pass = create_render_pass(device, swapchain.format, settings.depth_format)?;

        // Null handles are skipped by the destroy calls if a later step fails
        let mut targets = Self {
            swapchain,
            depth: ManuallyDrop::new(depth),
            framebuffers: Vec::new(),
            render_pass,
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            device: device.clone(),
        };

        for &view in &targets.swapchain.image_views {
            let framebuffer = create_framebuffer(device, view, targets.depth.view, render_pass, extent)?;
            targets.framebuffers.push(framebuffer);
        }

        let vert = ShaderModule::new(device, &settings.shaders.vertex)?;
        let frag = ShaderModule::new(device, &settings.shaders.fragment)?;
        let (pipeline, pipeline_layout) = create_graphics_pipeline(
            device,
            render_pass,
            settings.descriptor_set_layout,
            vert.module,
            frag.module,
        )?;
        targets.pipeline = pipeline;
        targets.pipeline_layout = pipeline_layout;

        debug_assert!(targets.is_consistent());
        Ok(targets)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Images, views and framebuffers in lockstep; depth matches the extent
    pub fn is_consistent(&self) -> bool {
        let count = self.swapchain.images.len();
        self.swapchain.image_views.len() == count
            && self.framebuffers.len() == count
            && self.depth.extent == self.swapchain.extent
    }
}

impl Drop for FrameTargets {
    fn drop(&mut self) {
        log::debug!(
            "Destroying frame targets ({}x{})",
            self.swapchain.extent.width,
            self.swapchain.extent.height
        );
        unsafe {
            ManuallyDrop::drop(&mut self.depth);
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.device.destroy_render_pass(self.render_pass, None);
        }
        // self.swapchain drops after this body: image views, then the chain
    }
}
