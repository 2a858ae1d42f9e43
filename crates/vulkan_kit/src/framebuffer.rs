//! Framebuffer management
//!
//! Binds swapchain image views to the render pass's attachment slots, one
//! framebuffer per swapchain image.

use ash::{vk, Device};

use crate::context::{VulkanError, VulkanResult};
use crate::render_pass::RenderPass;

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer with a single color attachment.
    pub fn new(
        device: Device,
        render_pass: &RenderPass,
        image_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let attachments = [image_view];
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.handle())
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            framebuffer,
        })
    }

    /// Create one framebuffer per swapchain image view.
    ///
    /// Fails on the first creation error; framebuffers built before the
    /// failure are released by their own drops.
    pub fn for_image_views(
        device: &Device,
        render_pass: &RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Vec<Self>> {
        image_views
            .iter()
            .map(|&view| Self::new(device.clone(), render_pass, view, extent))
            .collect()
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}
