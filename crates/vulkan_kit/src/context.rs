//! Vulkan context management
//!
//! Instance creation, physical-device and queue-family selection, and the
//! logical device, following the ownership rules laid out in DESIGN.md.
//! Creation order matters: the surface must exist before the logical device
//! is created so that presentation support can be verified without biasing
//! physical-device selection, and `LogicalDevice::new` encodes that by
//! taking the surface as a parameter.

#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Entry, Instance};
use std::ffi::{CStr, CString};
use thiserror::Error;

use crate::surface::Surface;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No candidate matched the requested selection criteria.
    ///
    /// Distinct from [`VulkanError::Api`]: this indicates a
    /// configuration/environment mismatch (no such device, queue family,
    /// format, or present mode), not resource exhaustion.
    #[error("No {what} matched the requested criteria")]
    SelectionFailed {
        /// What was being selected (e.g. "physical device", "surface format")
        what: &'static str,
    },

    /// A bounded fence wait expired. Recoverable: the fence is left
    /// untouched and the wait may simply be retried.
    #[error("Fence wait timed out after {timeout_ns} ns")]
    FenceWaitTimeout {
        /// The timeout that expired, in nanoseconds
        timeout_ns: u64,
    },

    /// The swapchain no longer matches the surface (window resized or the
    /// surface otherwise invalidated). Recoverable by rebuilding the
    /// swapchain and its dependent objects.
    #[error("Swapchain out of date")]
    SwapchainOutOfDate,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    #[cfg(debug_assertions)]
    debug_utils: Option<DebugUtils>,
    #[cfg(debug_assertions)]
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance.
    ///
    /// `layers` and `extensions` are passed through verbatim; the call fails
    /// with [`VulkanError::Api`] if the driver rejects any of them (for
    /// example a validation layer that is not installed). In debug builds a
    /// debug messenger is wired up when the debug-utils extension was
    /// requested.
    pub fn new(
        app_name: &str,
        engine_name: &str,
        layers: &[String],
        extensions: &[String],
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("Application name contains NUL".into()))?;
        let engine_name_cstr = CString::new(engine_name)
            .map_err(|_| VulkanError::InitializationFailed("Engine name contains NUL".into()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let layer_cstrs: Vec<CString> = layers
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|_| VulkanError::InitializationFailed("Layer name contains NUL".into()))?;
        let extension_cstrs: Vec<CString> = extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|_| VulkanError::InitializationFailed("Extension name contains NUL".into()))?;

        let layer_ptrs: Vec<*const i8> = layer_cstrs.iter().map(|name| name.as_ptr()).collect();
        let extension_ptrs: Vec<*const i8> =
            extension_cstrs.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!(
            "Created Vulkan instance ({} layers, {} extensions)",
            layers.len(),
            extensions.len()
        );

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger) = {
            let debug_requested = extension_cstrs
                .iter()
                .any(|ext| ext.as_c_str() == DebugUtils::name());
            if debug_requested {
                let debug_utils = DebugUtils::new(&entry, &instance);
                let debug_messenger = Self::setup_debug_messenger(&debug_utils)?;
                (Some(debug_utils), Some(debug_messenger))
            } else {
                (None, None)
            }
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Get the Vulkan entry point
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Get the raw instance
    pub fn raw(&self) -> &Instance {
        &self.instance
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(debug_messenger)) =
                (&self.debug_utils, &self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(*debug_messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Pick the first device whose type equals `preferred`.
///
/// There is deliberately no any-GPU fallback: zero matches means the caller
/// gets to decide whether to retry with a different preference.
pub fn pick_by_type(
    devices: &[vk::PhysicalDeviceProperties],
    preferred: vk::PhysicalDeviceType,
) -> Option<usize> {
    devices.iter().position(|props| props.device_type == preferred)
}

/// A selected physical device and its queried tables.
///
/// Physical devices are enumerated, not owned; there is nothing to destroy.
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Available queue families
    pub queue_families: Vec<vk::QueueFamilyProperties>,
}

impl PhysicalDeviceInfo {
    /// Select the first enumerated device of the preferred type.
    pub fn select(
        instance: &Instance,
        preferred: vk::PhysicalDeviceType,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        let properties: Vec<vk::PhysicalDeviceProperties> = devices
            .iter()
            .map(|&device| unsafe { instance.get_physical_device_properties(device) })
            .collect();

        let index = pick_by_type(&properties, preferred).ok_or(VulkanError::SelectionFailed {
            what: "physical device",
        })?;

        let device = devices[index];
        let properties = properties[index];
        let features = unsafe { instance.get_physical_device_features(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        log::info!("Selected GPU: {}", unsafe {
            CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy()
        });

        Ok(Self {
            device,
            properties,
            features,
            queue_families,
        })
    }

    /// Find a queue family with exactly the requested capability set.
    pub fn find_queue_family(&self, flags: vk::QueueFlags) -> VulkanResult<QueueFamily> {
        find_queue_family(&self.queue_families, flags).ok_or(VulkanError::SelectionFailed {
            what: "queue family",
        })
    }
}

/// A queue family index together with the number of queues it exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamily {
    /// Index of the family in the device's queue-family table
    pub index: u32,
    /// Number of queues the family provides
    pub queue_count: u32,
}

/// Scan a queue-family table for a family whose capability set equals
/// `flags` exactly.
///
/// A family advertising additional capability bits OR'd onto the requested
/// one does not qualify; the selection contract is an exact match, not
/// "at least".
pub fn find_queue_family(
    families: &[vk::QueueFamilyProperties],
    flags: vk::QueueFlags,
) -> Option<QueueFamily> {
    families
        .iter()
        .enumerate()
        .find(|(_, family)| family.queue_flags == flags && family.queue_count > 0)
        .map(|(index, family)| QueueFamily {
            index: index as u32,
            queue_count: family.queue_count,
        })
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// The single queue retrieved from the selected family
    pub queue: vk::Queue,
    /// The family the queue belongs to
    pub queue_family: QueueFamily,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the logical device and retrieve queue 0 of `queue_family`.
    ///
    /// Taking the [`Surface`] makes the creation order explicit: the device
    /// comes after the surface, and the chosen family is verified to be able
    /// to present to it.
    pub fn new(
        instance: &Instance,
        surface: &Surface,
        physical: &PhysicalDeviceInfo,
        queue_family: QueueFamily,
    ) -> VulkanResult<Self> {
        if !surface.supports_present(physical.device, queue_family.index)? {
            return Err(VulkanError::SelectionFailed {
                what: "presentation-capable queue family",
            });
        }

        let queue_priorities = [1.0_f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family.index)
            .queue_priorities(&queue_priorities)
            .build()];

        let required_extensions = [SwapchainLoader::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&physical.features);

        let device = unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let queue = unsafe { device.get_device_queue(queue_family.index, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        log::debug!(
            "Created logical device (queue family {}, {} queues available)",
            queue_family.index,
            queue_family.queue_count
        );

        Ok(Self {
            device,
            queue,
            queue_family,
            swapchain_loader,
        })
    }

    /// Block until the device has finished all submitted work.
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_props(device_type: vk::PhysicalDeviceType) -> vk::PhysicalDeviceProperties {
        vk::PhysicalDeviceProperties {
            device_type,
            ..Default::default()
        }
    }

    fn family(flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count,
            ..Default::default()
        }
    }

    #[test]
    fn pick_by_type_prefers_first_match() {
        let devices = [
            device_props(vk::PhysicalDeviceType::INTEGRATED_GPU),
            device_props(vk::PhysicalDeviceType::DISCRETE_GPU),
            device_props(vk::PhysicalDeviceType::DISCRETE_GPU),
        ];

        assert_eq!(
            pick_by_type(&devices, vk::PhysicalDeviceType::DISCRETE_GPU),
            Some(1)
        );
        assert_eq!(
            pick_by_type(&devices, vk::PhysicalDeviceType::INTEGRATED_GPU),
            Some(0)
        );
    }

    #[test]
    fn pick_by_type_has_no_fallback() {
        let devices = [device_props(vk::PhysicalDeviceType::INTEGRATED_GPU)];

        assert_eq!(pick_by_type(&devices, vk::PhysicalDeviceType::DISCRETE_GPU), None);
    }

    #[test]
    fn queue_family_requires_exact_capability_match() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 4),
            family(vk::QueueFlags::GRAPHICS, 2),
            family(vk::QueueFlags::TRANSFER, 1),
        ];

        let found = find_queue_family(&families, vk::QueueFlags::GRAPHICS);
        assert_eq!(
            found,
            Some(QueueFamily {
                index: 1,
                queue_count: 2
            })
        );
    }

    #[test]
    fn queue_family_with_extra_bits_does_not_qualify() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 4)];

        assert_eq!(find_queue_family(&families, vk::QueueFlags::GRAPHICS), None);
    }

    #[test]
    fn queue_family_with_zero_queues_is_skipped() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];

        assert_eq!(
            find_queue_family(&families, vk::QueueFlags::GRAPHICS),
            Some(QueueFamily {
                index: 1,
                queue_count: 1
            })
        );
    }
}
