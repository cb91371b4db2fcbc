// Buffer utilities for vertex, index, and uniform buffers
//
// GpuBuffer owns a VkBuffer plus its dedicated allocation. Static data goes
// through a host-visible staging buffer into device-local memory.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::Pod;
use std::sync::Arc;

use super::{CommandPool, VulkanDevice};

/// Pick the lowest-indexed memory type allowed by `type_bits` whose flags are
/// a superset of `properties`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    (0..count)
        .find(|&i| {
            let allowed = type_bits & (1 << i) != 0;
            allowed
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .with_context(|| {
            format!(
                "Failed to find suitable memory type (mask {:#b}, flags {:?})",
                type_bits, properties
            )
        })
}

/// Allocate and bind dedicated memory for `requirements`
pub(crate) fn allocate_memory(
    device: &VulkanDevice,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<(vk::DeviceMemory, u32)> {
    let memory_type_index =
        find_memory_type(&device.memory_properties, requirements.memory_type_bits, properties)?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe { device.device.allocate_memory(&alloc_info, None) }
        .context("Failed to allocate device memory")?;

    Ok((memory, memory_type_index))
}

/// A buffer bound at offset 0 to its own allocation
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    /// Requested size in bytes (the allocation may be larger)
    pub size: vk::DeviceSize,
    pub memory_type_index: u32,
    device: Arc<VulkanDevice>,
}

impl GpuBuffer {
    /// Create a buffer of exactly `size` bytes backed by memory that satisfies
    /// `properties`.
    pub fn new(
        device: &Arc<VulkanDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        if size == 0 {
            anyhow::bail!("Cannot create a zero-sized buffer");
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .context("Failed to create buffer")?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let (memory, memory_type_index) = match allocate_memory(device, requirements, properties) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // Constructed before binding so a failed bind still releases both
        let gpu_buffer = Self {
            buffer,
            memory,
            size,
            memory_type_index,
            device: device.clone(),
        };

        unsafe { device.device.bind_buffer_memory(buffer, memory, 0) }
            .context("Failed to bind buffer memory")?;

        Ok(gpu_buffer)
    }

    /// Host-visible, host-coherent buffer for CPU writes
    pub fn host_visible(
        device: &Arc<VulkanDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        Self::new(
            device,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Upload `data` into a new device-local buffer through a staging buffer.
    ///
    /// Blocks until the copy has finished; the staging buffer is released on
    /// return. TRANSFER_SRC is added to `usage` so the contents can be read
    /// back later.
    pub fn device_local<T: Pod>(
        device: &Arc<VulkanDevice>,
        commands: &CommandPool,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as vk::DeviceSize;

        let staging = Self::host_visible(device, size, vk::BufferUsageFlags::TRANSFER_SRC)
            .context("Failed to create staging buffer")?;
        staging.write(bytes)?;

        let buffer = Self::new(
            device,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        commands.copy_buffer(staging.buffer, buffer.buffer, size)?;

        log::debug!("Uploaded {} bytes to device-local buffer", size);
        Ok(buffer)
    }

    /// Property flags of the memory type backing this buffer
    pub fn memory_flags(&self) -> vk::MemoryPropertyFlags {
        self.device.memory_properties.memory_types[self.memory_type_index as usize].property_flags
    }

    /// Map, copy and unmap. Only valid on host-visible memory.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            anyhow::bail!("Write of {} bytes exceeds buffer size {}", bytes.len(), self.size);
        }
        unsafe {
            let ptr = self
                .device
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .context("Failed to map buffer memory")? as *mut u8;
            ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            self.device.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Copy the buffer contents back to the host for verification.
    ///
    /// Debug helper: uses a temporary staging buffer and a blocking one-shot
    /// submit, so it must not run inside the frame loop.
    pub fn read_back(&self, commands: &CommandPool) -> Result<Vec<u8>> {
        let staging = Self::host_visible(&self.device, self.size, vk::BufferUsageFlags::TRANSFER_DST)
            .context("Failed to create read-back buffer")?;

        commands.copy_buffer(self.buffer, staging.buffer, self.size)?;

        let mut bytes = vec![0u8; self.size as usize];
        unsafe {
            let ptr = self
                .device
                .device
                .map_memory(staging.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .context("Failed to map read-back buffer")? as *const u8;
            ptr.copy_to_nonoverlapping(bytes.as_mut_ptr(), bytes.len());
            self.device.device.unmap_memory(staging.memory);
        }
        Ok(bytes)
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}
