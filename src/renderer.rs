// =============================================================================
// RENDERER - Vulkan implementation of the frame backend
// =============================================================================
//
// Created once at startup, in dependency order:
//   device -> shaders, depth format -> descriptor layout -> command pool
//   -> static geometry -> frame slots -> descriptor sets -> frame targets
//
// Fields are declared so that Rust's drop order is the reverse of that.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use crate::backend::shader::ShaderCode;
use crate::backend::sync::FrameSync;
use crate::backend::targets::TargetSettings;
use crate::backend::uniform::{DescriptorPool, DescriptorSetLayout, UniformBuffer, UniformBufferObject};
use crate::backend::{CommandPool, FrameTargets, GpuBuffer, VulkanDevice};
use crate::config::Config;
use crate::geometry::{CUBE_INDICES, CUBE_VERTICES, INDEX_TYPE};
use crate::scheduler::{AcquireOutcome, FrameBackend, PresentOutcome, SurfaceProvider, MAX_FRAMES_IN_FLIGHT};
use crate::window::AppWindow;

/// Everything one in-flight frame touches
struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    sync: FrameSync,
    uniforms: UniformBuffer,
}

pub struct Renderer {
    targets: FrameTargets,
    descriptors: DescriptorPool,
    slots: Vec<FrameSlot>,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    index_count: u32,
    commands: CommandPool,
    descriptor_set_layout: DescriptorSetLayout,
    shaders: ShaderCode,
    depth_format: vk::Format,
    preferred_present_mode: vk::PresentModeKHR,
    clear_color: [f32; 4],
    device: Arc<VulkanDevice>,
}

impl Renderer {
    pub fn new(config: &Config, window: &AppWindow) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        // Validation is a development aid; release builds never load it
        let validation = config.debug.validation_layers && cfg!(debug_assertions);
        let device = VulkanDevice::new(&config.window.title, validation, window.window())?;

        let shaders = ShaderCode::load(&config.shaders.vertex, &config.shaders.fragment)?;
        let depth_format = device.find_depth_format()?;
        log::info!("Depth format: {:?}", depth_format);

        let descriptor_set_layout = DescriptorSetLayout::new(&device)?;
        let commands = CommandPool::new(&device)?;

        // Static geometry, uploaded once through staging buffers
        let vertex_buffer = GpuBuffer::device_local(&device, &commands, vk::BufferUsageFlags::VERTEX_BUFFER, &CUBE_VERTICES)
            .context("Failed to upload vertex buffer")?;
        let index_buffer = GpuBuffer::device_local(&device, &commands, vk::BufferUsageFlags::INDEX_BUFFER, &CUBE_INDICES)
            .context("Failed to upload index buffer")?;
        log::info!(
            "Uploaded cube: {} vertices, {} indices",
            CUBE_VERTICES.len(),
            CUBE_INDICES.len()
        );

        let command_buffers = commands.allocate(MAX_FRAMES_IN_FLIGHT as u32)?;
        let slots = command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(FrameSlot {
                    command_buffer,
                    sync: FrameSync::new(&device)?,
                    uniforms: UniformBuffer::new(&device)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let uniform_buffers: Vec<&UniformBuffer> = slots.iter().map(|slot| &slot.uniforms).collect();
        let descriptors = DescriptorPool::new(&device, &descriptor_set_layout, &uniform_buffers)?;

        let preferred_present_mode = config.graphics.preferred_present_mode();
        let settings = TargetSettings {
            preferred_present_mode,
            depth_format,
            descriptor_set_layout: descriptor_set_layout.layout,
            shaders: &shaders,
        };
        let targets = FrameTargets::build(&device, window.framebuffer_size(), &settings, None)?;
        log::info!("Present mode: {:?}", targets.swapchain.present_mode);

        let renderer = Self {
            targets,
            descriptors,
            slots,
            vertex_buffer,
            index_buffer,
            index_count: CUBE_INDICES.len() as u32,
            commands,
            descriptor_set_layout,
            shaders,
            depth_format,
            preferred_present_mode,
            clear_color: config.graphics.clear_color,
            device,
        };

        if config.debug.verify_uploads {
            renderer.verify_uploads()?;
        }

        log::info!("Vulkan initialized successfully!");
        Ok(renderer)
    }

    /// Read the static geometry back from device-local memory and compare it
    /// with the source arrays
    fn verify_uploads(&self) -> Result<()> {
        verify_upload("vertex", &self.vertex_buffer, &self.commands, bytemuck::cast_slice(&CUBE_VERTICES))?;
        verify_upload("index", &self.index_buffer, &self.commands, bytemuck::cast_slice(&CUBE_INDICES))
    }

    /// Swapchain image count; image views and framebuffers always match it
    pub fn image_count(&self) -> usize {
        self.targets.swapchain.image_count()
    }
}

/// Read a device-local buffer back and compare it with what was uploaded
fn verify_upload(name: &str, buffer: &GpuBuffer, commands: &CommandPool, expected: &[u8]) -> Result<()> {
    let actual = buffer
        .read_back(commands)
        .with_context(|| format!("Failed to read back {} buffer", name))?;

    if actual.get(..expected.len()) != Some(expected) {
        anyhow::bail!("{} buffer contents differ from the uploaded data", name);
    }

    log::info!(
        "Verified {} buffer: {} bytes match ({:?})",
        name,
        expected.len(),
        buffer.memory_flags()
    );
    Ok(())
}

impl FrameBackend for Renderer {
    type Uniforms = UniformBufferObject;

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.slots[slot].sync.wait()
    }

    fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome> {
        self.targets
            .swapchain
            .acquire_next_image(u64::MAX, self.slots[slot].sync.image_available)
    }

    fn reset_slot_fence(&mut self, slot: usize) -> Result<()> {
        self.slots[slot].sync.reset()
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let device = &self.device.device;
        let cmd = self.slots[slot].command_buffer;
        let extent = self.targets.extent();
        let framebuffer = *self
            .targets
            .framebuffers
            .get(image_index as usize)
            .with_context(|| format!("Acquired image {} has no framebuffer", image_index))?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: self.clear_color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.targets.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

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
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;

            let begin_info = vk::CommandBufferBeginInfo::builder();
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.targets.pipeline);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, INDEX_TYPE);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.targets.pipeline_layout,
                0,
                &[self.descriptors.sets[slot]],
                &[],
            );
            device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
            device.cmd_end_render_pass(cmd);

            device
                .end_command_buffer(cmd)
                .context("Failed to end command buffer")?;
        }

        Ok(())
    }

    fn update_uniforms(&mut self, slot: usize, uniforms: &UniformBufferObject) -> Result<()> {
        self.slots[slot].uniforms.write(uniforms);
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = &self.slots[slot];
        let wait_semaphores = [frame.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.sync.render_finished];
        let command_buffers = [frame.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info.build()], frame.sync.in_flight_fence)
                .context("Failed to submit draw command buffer")
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        self.targets.swapchain.present(
            self.device.present_queue,
            image_index,
            &[self.slots[slot].sync.render_finished],
        )
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.device.wait_idle()
    }

    fn rebuild(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
        let settings = TargetSettings {
            preferred_present_mode: self.preferred_present_mode,
            depth_format: self.depth_format,
            descriptor_set_layout: self.descriptor_set_layout.layout,
            shaders: &self.shaders,
        };

        // The old chain is retired into the new one, then dropped here
        let targets = FrameTargets::build(&self.device, framebuffer_size, &settings, Some(&self.targets))?;
        self.targets = targets;

        log::debug!("Frame targets consistent: {}", self.targets.is_consistent());
        Ok(())
    }

    fn extent(&self) -> (u32, u32) {
        let extent = self.targets.extent();
        (extent.width, extent.height)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        // Nothing may still be in flight when the fields start dropping
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle during cleanup: {:?}", e);
        }
    }
}
