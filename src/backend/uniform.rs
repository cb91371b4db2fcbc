// Per-frame uniform data and its descriptors
//
// Each frame slot owns one persistently mapped, host-coherent uniform buffer
// and one descriptor set pointing at it. None of this depends on the
// swapchain, so it survives rebuilds.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use std::sync::Arc;

use super::{GpuBuffer, VulkanDevice};

/// Matches `UniformBufferObject` in cube.vert (std140, three mat4)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    pub const SIZE: vk::DeviceSize = std::mem::size_of::<Self>() as vk::DeviceSize;
}

/// Host-coherent uniform buffer mapped for its whole lifetime
pub struct UniformBuffer {
    mapped: *mut UniformBufferObject,
    buffer: GpuBuffer,
    device: Arc<VulkanDevice>,
}

impl UniformBuffer {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let buffer = GpuBuffer::host_visible(device, UniformBufferObject::SIZE, vk::BufferUsageFlags::UNIFORM_BUFFER)
            .context("Failed to create uniform buffer")?;

        let mapped = unsafe {
            device
                .device
                .map_memory(buffer.memory, 0, buffer.size, vk::MemoryMapFlags::empty())
                .context("Failed to map uniform buffer")?
        } as *mut UniformBufferObject;

        Ok(Self {
            mapped,
            buffer,
            device: device.clone(),
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.buffer
    }

    /// Plain copy; coherent memory needs no flush. The caller guarantees the
    /// owning slot's fence has signaled.
    pub fn write(&self, ubo: &UniformBufferObject) {
        unsafe { self.mapped.write_unaligned(*ubo) };
    }
}

impl Drop for UniformBuffer {
    fn drop(&mut self) {
        unsafe { self.device.device.unmap_memory(self.buffer.memory) };
    }
}

/// Single layout: binding 0 is a uniform buffer read by the vertex stage
pub struct DescriptorSetLayout {
    pub layout: vk::DescriptorSetLayout,
    device: Arc<VulkanDevice>,
}

impl DescriptorSetLayout {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build()];

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
            .context("Failed to create descriptor set layout")?;

        Ok(Self {
            layout,
            device: device.clone(),
        })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Pool holding one uniform-buffer descriptor set per frame slot
pub struct DescriptorPool {
    pub pool: vk::DescriptorPool,
    pub sets: Vec<vk::DescriptorSet>,
    device: Arc<VulkanDevice>,
}

impl DescriptorPool {
    /// Allocate one set per buffer and point binding 0 at it
    pub fn new(device: &Arc<VulkanDevice>, layout: &DescriptorSetLayout, buffers: &[&UniformBuffer]) -> Result<Self> {
        let count = buffers.len() as u32;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: count,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(count);

        let pool = unsafe { device.device.create_descriptor_pool(&pool_info, None) }
            .context("Failed to create descriptor pool")?;

        let mut descriptors = Self {
            pool,
            sets: Vec::new(),
            device: device.clone(),
        };

        let layouts = vec![layout.layout; buffers.len()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        descriptors.sets = unsafe { device.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor sets")?;

        for (&set, buffer) in descriptors.sets.iter().zip(buffers) {
            let buffer_info = [vk::DescriptorBufferInfo {
                buffer: buffer.handle(),
                offset: 0,
                range: UniformBufferObject::SIZE,
            }];
            let write = vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info)
                .build();

            unsafe { device.device.update_descriptor_sets(&[write], &[]) };
        }

        Ok(descriptors)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        // Sets are freed with the pool
        unsafe {
            self.device.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}
