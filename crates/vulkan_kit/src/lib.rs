//! A thin convenience layer over Vulkan for assembling a minimal renderer.
//!
//! The crate wraps the resource-dependency chain a windowed Vulkan
//! application walks — instance, surface, device, swapchain, image views,
//! shaders, pipeline, framebuffers, command buffers, sync objects — in RAII
//! types that release themselves in reverse creation order, and drives the
//! per-frame acquire → record → submit → present cycle with the fence and
//! semaphore discipline that keeps it safe.
//!
//! Windowing, shader compilation, and argument parsing are collaborators,
//! not residents: the library takes raw window handles and SPIR-V byte
//! blobs and gives back a [`renderer::Renderer`] plus a
//! [`frame::FrameLoop`] to pump it with.

/// Instance, device selection, logical device, error types
pub mod context;

/// Surface binding and capability queries
pub mod surface;

/// Swapchain creation and selection policies
pub mod swapchain;

/// Swapchain image views
pub mod image;

/// SPIR-V shader modules
pub mod shader;

/// Render pass
pub mod render_pass;

/// Pipeline layout and graphics pipeline
pub mod pipeline;

/// Framebuffers
pub mod framebuffer;

/// Command pool and recording
pub mod commands;

/// Fences and semaphores
pub mod sync;

/// Per-frame render driver
pub mod frame;

/// The assembled renderer and its teardown ordering
pub mod renderer;

/// Renderer configuration
pub mod config;

pub use config::{DevicePreference, PresentModePreference, RendererConfig, ShaderConfig};
pub use context::{
    LogicalDevice, PhysicalDeviceInfo, QueueFamily, VulkanError, VulkanInstance, VulkanResult,
};
pub use frame::{CancelToken, FrameBackend, FrameLoop, FrameOutcome};
pub use framebuffer::Framebuffer;
pub use image::SwapchainImages;
pub use pipeline::{GraphicsPipeline, PipelineLayout};
pub use render_pass::RenderPass;
pub use renderer::{Renderer, VALIDATION_LAYER};
pub use shader::{ShaderModule, ShaderStage};
pub use surface::Surface;
pub use swapchain::{Swapchain, SwapchainPreferences};
pub use sync::{Fence, FrameSync, Semaphore};
