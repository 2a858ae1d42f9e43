//! Command buffer management
//!
//! Command pool, buffer allocation, and recording of the fixed draw
//! sequence. The recorder does not guard against in-flight reuse itself;
//! that discipline belongs to the frame loop and its fence.

use ash::{vk, Device};

use crate::context::{VulkanError, VulkanResult};
use crate::framebuffer::Framebuffer;
use crate::pipeline::GraphicsPipeline;
use crate::render_pass::RenderPass;

/// Command pool wrapper with RAII cleanup.
///
/// Created with the reset-command-buffer flag so individual buffers can be
/// re-recorded each frame without resetting the whole pool, and the
/// transient flag since recordings are short-lived.
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a command pool bound to a queue family.
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                    | vk::CommandPoolCreateFlags::TRANSIENT,
            )
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            command_pool,
        })
    }

    /// Allocate primary command buffers from this pool.
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let command_buffers = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        Ok(command_buffers)
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // All buffers allocated from the pool must be off the queue
            // before the pool goes away.
            let _ = self.device.device_wait_idle();

            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Type-safe command buffer recorder
pub struct CommandRecorder {
    command_buffer: vk::CommandBuffer,
    device: Device,
    recording: bool,
}

impl CommandRecorder {
    /// Create a recorder for a command buffer
    pub fn new(command_buffer: vk::CommandBuffer, device: Device) -> Self {
        Self {
            command_buffer,
            device,
            recording: false,
        }
    }

    /// Begin recording.
    ///
    /// Beginning a buffer allocated from a reset-capable pool implicitly
    /// resets any previous recording.
    pub fn begin(&mut self) -> VulkanResult<&mut Self> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder();

        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.recording = true;
        Ok(self)
    }

    /// Begin a render pass; the pass ends when the returned guard drops.
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<ActiveRenderPass<'_>> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }

        Ok(ActiveRenderPass { recorder: self })
    }

    /// End recording and hand back the buffer.
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }

        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }

        self.recording = false;
        Ok(self.command_buffer)
    }
}

/// Scoped render pass; dropping it records the end-render-pass command.
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut CommandRecorder,
}

impl<'a> ActiveRenderPass<'a> {
    /// Bind a graphics pipeline
    pub fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.recorder
                .device
                .cmd_bind_pipeline(self.recorder.command_buffer, bind_point, pipeline);
        }
    }

    /// Set the dynamic viewport
    pub fn set_viewport(&mut self, viewport: &vk::Viewport) {
        unsafe {
            self.recorder
                .device
                .cmd_set_viewport(self.recorder.command_buffer, 0, &[*viewport]);
        }
    }

    /// Set the dynamic scissor rectangle
    pub fn set_scissor(&mut self, scissor: &vk::Rect2D) {
        unsafe {
            self.recorder
                .device
                .cmd_set_scissor(self.recorder.command_buffer, 0, &[*scissor]);
        }
    }

    /// Record a non-indexed draw
    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.recorder.device.cmd_draw(
                self.recorder.command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }
}

impl<'a> Drop for ActiveRenderPass<'a> {
    fn drop(&mut self) {
        unsafe {
            self.recorder
                .device
                .cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}

/// Record the fixed draw sequence into `command_buffer`.
///
/// Begin → begin render pass (clearing to `clear_color`) → bind pipeline →
/// set dynamic viewport and scissor to `extent` → draw 3 vertices, 1
/// instance → end render pass → end. The caller must ensure the buffer is
/// not in flight (fence discipline).
pub fn record_draw_commands(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    render_pass: &RenderPass,
    framebuffer: &Framebuffer,
    pipeline: &GraphicsPipeline,
    extent: vk::Extent2D,
    clear_color: [f32; 4],
) -> VulkanResult<()> {
    let mut recorder = CommandRecorder::new(command_buffer, device.clone());
    recorder.begin()?;

    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: clear_color,
        },
    }];
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };

    {
        let mut pass = recorder.begin_render_pass(
            render_pass.handle(),
            framebuffer.handle(),
            render_area,
            &clear_values,
        )?;
        pass.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
        pass.set_viewport(&viewport);
        pass.set_scissor(&render_area);
        pass.draw(3, 1, 0, 0);
    }

    recorder.end()?;
    Ok(())
}
