//! Pipeline layout and graphics pipeline
//!
//! The pipeline layout declares what external resources a pipeline may bind
//! (none in the reference path) and is an independent, reusable object; the
//! graphics pipeline links shader stages and fixed-function state against a
//! layout and a render pass in one atomic creation call.

use ash::{vk, Device};
use std::ffi::CStr;

use crate::context::{VulkanError, VulkanResult};
use crate::render_pass::RenderPass;
use crate::shader::ShaderModule;

/// Pipeline layout wrapper with RAII cleanup.
///
/// Must outlive every pipeline created against it; the teardown order in the
/// owning aggregate guarantees that.
pub struct PipelineLayout {
    device: Device,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Create a pipeline layout from descriptor-set layouts and
    /// push-constant ranges.
    pub fn new(
        device: Device,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, layout })
    }

    /// Create a layout with no descriptor sets and no push constants.
    pub fn empty(device: Device) -> VulkanResult<Self> {
        Self::new(device, &[], &[])
    }

    /// Get the pipeline layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Create the fixed graphics pipeline.
    ///
    /// Vertex and fragment stages both use the `main` entry point. The
    /// vertex input is empty (the reference triangle is generated
    /// in-shader), topology is a triangle list, and viewport/scissor are
    /// dynamic states set per frame rather than baked in. Rasterizer state
    /// is fill mode with back-face culling and clockwise front faces;
    /// single-sample, blending disabled on the one color attachment.
    ///
    /// The shader modules are only needed for the duration of this call and
    /// may be dropped as soon as it returns.
    pub fn new(
        device: Device,
        layout: &PipelineLayout,
        render_pass: &RenderPass,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
    ) -> VulkanResult<Self> {
        let entry_point = CStr::from_bytes_with_nul(b"main\0").unwrap();

        let shader_stages = [
            vertex_shader.stage_info(entry_point),
            fragment_shader.stage_info(entry_point),
        ];

        // No vertex buffers: geometry comes from the vertex shader.
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only the counts are baked in.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass.handle())
            .subpass(0);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, err)| VulkanError::Api(err))?
        };

        let pipeline = pipelines[0];

        log::debug!("Created graphics pipeline");

        Ok(Self { device, pipeline })
    }

    /// Get the pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}
