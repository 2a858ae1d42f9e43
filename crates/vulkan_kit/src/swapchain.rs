//! Vulkan swapchain management
//!
//! Swapchain creation and recreation, plus the selection policies that turn
//! the surface's supported sets into concrete choices. The policies are
//! plain functions so that they can be tested without a device:
//!
//! - surface format: first entry matching the preference wins; no match is
//!   a selection failure, never a silently arbitrary format
//! - present mode: the preferred mode if supported, else FIFO, the one mode
//!   every conformant implementation provides
//! - extent: the driver-fixed extent when there is one, else the window
//!   extent clamped to the capability bounds
//! - image count: one more than the reported minimum, to avoid blocking on
//!   driver-internal image reuse, clamped to the maximum when bounded

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;

use crate::context::{LogicalDevice, PhysicalDeviceInfo, VulkanError, VulkanResult};
use crate::surface::Surface;

/// Preferred surface format and present mode for swapchain creation.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainPreferences {
    /// Preferred format + color space pair
    pub surface_format: vk::SurfaceFormatKHR,
    /// Preferred present mode
    pub present_mode: vk::PresentModeKHR,
}

impl Default for SwapchainPreferences {
    fn default() -> Self {
        Self {
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::MAILBOX,
        }
    }
}

/// Pick the first supported format matching the preferred format/color-space
/// pair.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|sf| sf.format == preferred.format && sf.color_space == preferred.color_space)
        .ok_or(VulkanError::SelectionFailed {
            what: "surface format",
        })
}

/// Pick the preferred present mode if supported, falling back to FIFO.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == preferred)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Resolve the swap extent from the capabilities and the window size.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Request one image more than the minimum, within the maximum when the
/// implementation reports one (zero means unbounded).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Swapchain wrapper with RAII cleanup.
///
/// Owns only the swapchain handle; image views live in
/// [`crate::image::SwapchainImages`] and framebuffers in
/// [`crate::framebuffer::Framebuffer`] so each can be rebuilt independently.
pub struct Swapchain {
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    image_count: u32,
}

impl Swapchain {
    /// Create a swapchain for `surface`.
    ///
    /// Pass the previous swapchain as `old` when rebuilding after a resize;
    /// the implementation can then carry resources over. The old swapchain
    /// must stay alive until this call returns.
    pub fn new(
        device: &LogicalDevice,
        physical: &PhysicalDeviceInfo,
        surface: &Surface,
        preferences: &SwapchainPreferences,
        window_extent: vk::Extent2D,
        old: Option<&Swapchain>,
    ) -> VulkanResult<Self> {
        let capabilities = surface.capabilities(physical.device)?;
        let formats = surface.formats(physical.device)?;
        let present_modes = surface.present_modes(physical.device)?;

        let format = choose_surface_format(&formats, preferences.surface_format)?;
        let present_mode = choose_present_mode(&present_modes, preferences.present_mode);
        let extent = choose_extent(&capabilities, window_extent);
        let image_count = choose_image_count(&capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |s| s.swapchain));

        let loader = device.swapchain_loader.clone();
        let swapchain = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!(
            "Created swapchain {}x{} ({:?}, {:?}, {} images requested)",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            image_count
        );

        Ok(Self {
            loader,
            swapchain,
            format,
            extent,
            image_count,
        })
    }

    /// Retrieve the images owned by this swapchain.
    pub fn images(&self) -> VulkanResult<Vec<vk::Image>> {
        unsafe {
            self.loader
                .get_swapchain_images(self.swapchain)
                .map_err(VulkanError::Api)
        }
    }

    /// Get the swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get the swapchain loader
    pub fn loader(&self) -> &SwapchainLoader {
        &self.loader
    }

    /// Get the surface format the swapchain was created with
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get the swap extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get the image count that was requested at creation
    pub fn image_count(&self) -> u32 {
        self.image_count
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFERRED: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn capabilities(min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn format_selection_returns_the_single_match() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            PREFERRED,
        ];

        let chosen = choose_surface_format(&formats, PREFERRED).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn format_selection_fails_without_a_match() {
        let formats = [format(
            vk::Format::R8G8B8A8_UNORM,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];

        let result = choose_surface_format(&formats, PREFERRED);
        assert!(matches!(
            result,
            Err(VulkanError::SelectionFailed {
                what: "surface format"
            })
        ));
    }

    #[test]
    fn present_mode_prefers_the_requested_mode() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];

        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];

        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn image_count_requests_one_above_minimum() {
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
    }

    #[test]
    fn image_count_respects_the_maximum() {
        assert_eq!(choose_image_count(&capabilities(2, 2)), 2);
        assert_eq!(choose_image_count(&capabilities(2, 8)), 3);
    }

    #[test]
    fn extent_uses_driver_extent_when_fixed() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 640,
                height: 480,
            },
        );
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn extent_clamps_window_size_to_capability_bounds() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 320,
                height: 240,
            },
            max_image_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };

        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 4096,
                height: 100,
            },
        );
        assert_eq!(extent.width, 1280);
        assert_eq!(extent.height, 240);
    }
}
