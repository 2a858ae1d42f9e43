//! Swapchain image views
//!
//! Wraps each image owned by the swapchain with a 2-D color view usable as a
//! render target. The image count is dictated by the swapchain, never by the
//! caller.

use ash::{vk, Device};

use crate::context::{VulkanError, VulkanResult};
use crate::swapchain::Swapchain;

/// The swapchain's images paired with their views.
///
/// The views are owned here and destroyed on drop; the images themselves
/// belong to the swapchain and are never destroyed individually.
pub struct SwapchainImages {
    device: Device,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
}

impl SwapchainImages {
    /// Retrieve every swapchain image and create a color view for each.
    pub fn new(device: Device, swapchain: &Swapchain) -> VulkanResult<Self> {
        let images = swapchain.images()?;
        let format = swapchain.format().format;

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            match unsafe { device.create_image_view(&create_info, None) } {
                Ok(view) => views.push(view),
                Err(e) => {
                    // Release the views created so far before failing.
                    for view in views {
                        unsafe { device.destroy_image_view(view, None) };
                    }
                    return Err(VulkanError::Api(e));
                }
            }
        }

        log::debug!("Created {} swapchain image views", views.len());

        Ok(Self {
            device,
            images,
            views,
        })
    }

    /// Get the image views, indexed like the swapchain's images
    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    /// Get the raw images
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Number of images in the swapchain
    pub fn count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for SwapchainImages {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.views {
                self.device.destroy_image_view(view, None);
            }
        }
    }
}
