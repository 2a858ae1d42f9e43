//! Synchronization primitives
//!
//! Fences are the host-waitable boundary (CPU ↔ GPU); semaphores order
//! queue operations against each other (GPU ↔ GPU) and are never waited on
//! from the host.

use ash::{vk, Device};

use crate::context::{VulkanError, VulkanResult};

/// GPU-GPU ordering primitive with automatic resource management.
///
/// Signaled by one queue operation and waited on by another; carries no
/// host-visible state.
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Host-waitable completion flag with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally in the signaled state.
    ///
    /// Frame fences start signaled so the first frame's wait returns
    /// immediately.
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, fence })
    }

    /// Wait for the fence with a bounded timeout.
    ///
    /// Expiry is returned as the recoverable
    /// [`VulkanError::FenceWaitTimeout`]; the fence is left as-is so the
    /// caller can retry the wait.
    pub fn wait(&self, timeout_ns: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout_ns)
                .map_err(|e| match e {
                    vk::Result::TIMEOUT => VulkanError::FenceWaitTimeout { timeout_ns },
                    other => VulkanError::Api(other),
                })
        }
    }

    /// Reset the fence to unsignaled. Only valid once the wait has
    /// succeeded; resetting before waiting is a correctness bug.
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// The synchronization objects for one in-flight frame slot.
pub struct FrameSync {
    /// Signaled by acquire, waited on by submit
    pub image_available: Semaphore,
    /// Signaled by submit, waited on by present
    pub render_finished: Semaphore,
    /// Guards CPU reuse of the frame's command buffer
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the semaphore pair and the (signaled) frame fence.
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}
