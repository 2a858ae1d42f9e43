//! Renderer aggregate
//!
//! Owns the whole resource-dependency chain and performs setup in strict
//! creation order: instance → surface → physical device → logical device →
//! swapchain → image views → shader modules → pipeline layout → render pass
//! → graphics pipeline → framebuffers → command pool/buffer → sync objects.
//! Setup is fail-fast; the first error aborts the remaining steps and the
//! wrappers created so far release themselves.
//!
//! Teardown is the reverse of creation. Field declaration order below *is*
//! the teardown list: Rust drops fields top to bottom, so the later-created
//! objects are declared first. `Drop` waits for the device to go idle before
//! the fields unwind.

use ash::extensions::ext::DebugUtils;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::CStr;

use crate::commands::{self, CommandPool};
use crate::config::RendererConfig;
use crate::context::{
    LogicalDevice, PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult,
};
use crate::frame::{AcquireOutcome, FrameBackend, PresentOutcome};
use crate::framebuffer::Framebuffer;
use crate::image::SwapchainImages;
use crate::pipeline::{GraphicsPipeline, PipelineLayout};
use crate::render_pass::RenderPass;
use crate::shader::{ShaderModule, ShaderStage};
use crate::surface::Surface;
use crate::swapchain::{Swapchain, SwapchainPreferences};
use crate::sync::FrameSync;

/// Name of the Khronos validation layer.
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// The fully assembled renderer: every GPU object in the dependency chain,
/// exclusively owned, plus the per-frame recording state.
pub struct Renderer {
    // Fields in reverse creation order; drop order is teardown order.
    frame_sync: FrameSync,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
    framebuffers: Vec<Framebuffer>,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    pipeline_layout: PipelineLayout,
    images: SwapchainImages,
    swapchain: Swapchain,
    device: LogicalDevice,
    physical: PhysicalDeviceInfo,
    surface: Surface,
    instance: VulkanInstance,

    preferences: SwapchainPreferences,
    window_extent: vk::Extent2D,
    clear_color: [f32; 4],
}

impl Renderer {
    /// Build the full chain from a window exposing raw handles.
    ///
    /// Instance extensions are derived from the display handle; the
    /// validation layer (and, in debug builds, the debug-utils extension)
    /// is added when the config asks for it.
    pub fn new<W>(
        config: &RendererConfig,
        window: &W,
        window_extent: (u32, u32),
        vertex_spirv: &[u8],
        fragment_spirv: &[u8],
    ) -> VulkanResult<Self>
    where
        W: HasRawWindowHandle + HasRawDisplayHandle,
    {
        let mut extensions: Vec<String> = unsafe {
            ash_window::enumerate_required_extensions(window.raw_display_handle())
                .map_err(VulkanError::Api)?
                .iter()
                .map(|&ptr| CStr::from_ptr(ptr).to_string_lossy().into_owned())
                .collect()
        };

        let mut layers = Vec::new();
        if config.enable_validation {
            layers.push(VALIDATION_LAYER.to_string());
            if cfg!(debug_assertions) {
                extensions.push(DebugUtils::name().to_string_lossy().into_owned());
            }
        }

        let instance = VulkanInstance::new(
            &config.application_name,
            &config.engine_name,
            &layers,
            &extensions,
        )?;
        let surface = Surface::new(instance.entry(), instance.raw(), window)?;

        Self::with_surface(
            config,
            instance,
            surface,
            window_extent,
            vertex_spirv,
            fragment_spirv,
        )
    }

    /// Build the chain downstream of an existing instance and surface.
    ///
    /// This is the entry point for windowing layers that create the
    /// `vk::SurfaceKHR` themselves (see [`Surface::from_raw`]).
    pub fn with_surface(
        config: &RendererConfig,
        instance: VulkanInstance,
        surface: Surface,
        window_extent: (u32, u32),
        vertex_spirv: &[u8],
        fragment_spirv: &[u8],
    ) -> VulkanResult<Self> {
        let preferences = config.swapchain_preferences();
        let window_extent = vk::Extent2D {
            width: window_extent.0,
            height: window_extent.1,
        };

        // Physical device selection happens after surface creation so the
        // choice is not biased by earlier presentation filtering.
        let physical =
            PhysicalDeviceInfo::select(instance.raw(), config.device_preference.device_type())?;
        let queue_family = physical.find_queue_family(vk::QueueFlags::GRAPHICS)?;
        let device = LogicalDevice::new(instance.raw(), &surface, &physical, queue_family)?;

        let swapchain = Swapchain::new(
            &device,
            &physical,
            &surface,
            &preferences,
            window_extent,
            None,
        )?;
        let images = SwapchainImages::new(device.device.clone(), &swapchain)?;

        // The modules are only inputs to pipeline creation and drop at the
        // end of this scope.
        let vertex_shader =
            ShaderModule::from_bytes(device.device.clone(), ShaderStage::Vertex, vertex_spirv)?;
        let fragment_shader = ShaderModule::from_bytes(
            device.device.clone(),
            ShaderStage::Fragment,
            fragment_spirv,
        )?;

        let pipeline_layout = PipelineLayout::empty(device.device.clone())?;
        let render_pass =
            RenderPass::new_color_pass(device.device.clone(), swapchain.format().format)?;
        let pipeline = GraphicsPipeline::new(
            device.device.clone(),
            &pipeline_layout,
            &render_pass,
            &vertex_shader,
            &fragment_shader,
        )?;

        let framebuffers = Framebuffer::for_image_views(
            &device.device,
            &render_pass,
            images.views(),
            swapchain.extent(),
        )?;

        let command_pool = CommandPool::new(device.device.clone(), queue_family.index)?;
        let command_buffers = command_pool.allocate_command_buffers(1)?;

        let frame_sync = FrameSync::new(device.device.clone())?;

        log::info!(
            "Renderer ready: {} swapchain images at {}x{}",
            images.count(),
            swapchain.extent().width,
            swapchain.extent().height
        );

        Ok(Self {
            frame_sync,
            command_buffers,
            command_pool,
            framebuffers,
            pipeline,
            render_pass,
            pipeline_layout,
            images,
            swapchain,
            device,
            physical,
            surface,
            instance,
            preferences,
            window_extent,
            clear_color: config.clear_color,
        })
    }

    /// Tell the renderer the window's current framebuffer size; used the
    /// next time the swapchain is rebuilt.
    pub fn set_window_extent(&mut self, width: u32, height: u32) {
        self.window_extent = vk::Extent2D { width, height };
    }

    /// The extent the swapchain was created with
    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.images.count()
    }

    /// The instance everything hangs off
    pub fn instance(&self) -> &VulkanInstance {
        &self.instance
    }

    /// The logical device and its queue
    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }

    /// The pipeline layout (empty in the reference configuration)
    pub fn pipeline_layout(&self) -> &PipelineLayout {
        &self.pipeline_layout
    }

    /// The command pool the frame buffers are allocated from
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }

    /// Rebuild the swapchain and its dependents after a resize or an
    /// out-of-date signal.
    ///
    /// Only the swapchain, image views, and framebuffers are recreated;
    /// instance, device, and surface are untouched. The old swapchain is
    /// handed to the new one as `old_swapchain` and destroyed afterwards.
    pub fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        self.device.wait_idle()?;

        let swapchain = Swapchain::new(
            &self.device,
            &self.physical,
            &self.surface,
            &self.preferences,
            self.window_extent,
            Some(&self.swapchain),
        )?;
        let images = SwapchainImages::new(self.device.device.clone(), &swapchain)?;
        let framebuffers = Framebuffer::for_image_views(
            &self.device.device,
            &self.render_pass,
            images.views(),
            swapchain.extent(),
        )?;

        // Replace in reverse dependency order so the old objects drop as
        // framebuffers → views → swapchain.
        self.framebuffers = framebuffers;
        self.images = images;
        self.swapchain = swapchain;

        log::debug!(
            "Swapchain rebuilt at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }
}

impl FrameBackend for Renderer {
    fn wait_frame_fence(&mut self, timeout_ns: u64) -> VulkanResult<()> {
        self.frame_sync.in_flight.wait(timeout_ns)
    }

    fn reset_frame_fence(&mut self) -> VulkanResult<()> {
        self.frame_sync.in_flight.reset()
    }

    fn acquire_image(&mut self) -> VulkanResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                self.frame_sync.image_available.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            // A suboptimal acquire still hands over a usable image; the
            // stale fit is dealt with at present time.
            Ok((index, _suboptimal)) => Ok(AcquireOutcome::Acquired(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn record_commands(&mut self, image_index: u32) -> VulkanResult<()> {
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .ok_or(VulkanError::InvalidOperation {
                reason: format!("No framebuffer for swapchain image {}", image_index),
            })?;

        commands::record_draw_commands(
            &self.device.device,
            self.command_buffers[0],
            &self.render_pass,
            framebuffer,
            &self.pipeline,
            self.swapchain.extent(),
            self.clear_color,
        )
    }

    fn submit_commands(&mut self) -> VulkanResult<()> {
        let wait_semaphores = [self.frame_sync.image_available.handle()];
        // Vertex processing may start before the image is ready; only the
        // color-attachment write has to wait for the acquire.
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[0]];
        let signal_semaphores = [self.frame_sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(
                    self.device.queue,
                    &[submit_info.build()],
                    self.frame_sync.in_flight.handle(),
                )
                .map_err(VulkanError::Api)
        }
    }

    fn present_image(&mut self, image_index: u32) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [self.frame_sync.render_finished.handle()];
        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.device.queue, &present_info)
        };

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn rebuild_swapchain(&mut self) -> VulkanResult<()> {
        self.recreate_swapchain()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Sync objects and the pipeline may still be referenced by queued
        // work; drain the device before the fields unwind.
        if let Err(e) = self.device.wait_idle() {
            log::warn!("device_wait_idle failed during teardown: {}", e);
        }
    }
}
