// Backend module - Vulkan abstraction layer
//
// Design: Thin owned wrappers around ash. Every wrapper that owns a Vulkan
// object holds an `Arc<VulkanDevice>` and releases the object on drop, so
// destruction order follows ownership.

pub mod buffer;
pub mod commands;
pub mod device;
pub mod image;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod targets;
pub mod uniform;

pub use buffer::GpuBuffer;
pub use commands::CommandPool;
pub use device::VulkanDevice;
pub use swapchain::Swapchain;
pub use targets::FrameTargets;
