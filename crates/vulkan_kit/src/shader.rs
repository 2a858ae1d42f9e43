//! Shader module management
//!
//! SPIR-V shader loading. Compilation is someone else's job: this module
//! consumes a byte blob plus its stage kind and entry-point name.

use ash::{vk, Device};
use std::ffi::CStr;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::context::{VulkanError, VulkanResult};

/// The pipeline stage a shader module is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
}

impl ShaderStage {
    /// The corresponding Vulkan stage flag
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl ShaderModule {
    /// Create a shader module from SPIR-V bytecode.
    pub fn from_bytes(device: Device, stage: ShaderStage, bytes: &[u8]) -> VulkanResult<Self> {
        // SPIR-V words are u32; reject blobs that are not aligned/sized as such.
        let (prefix, code, suffix) = unsafe { bytes.align_to::<u32>() };
        if !prefix.is_empty() || !suffix.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "SPIR-V bytecode is not properly aligned".to_string(),
            ));
        }

        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    /// Load a shader module from a SPIR-V file.
    pub fn from_file<P: AsRef<Path>>(
        device: Device,
        stage: ShaderStage,
        path: P,
    ) -> VulkanResult<Self> {
        let mut file = File::open(&path).map_err(|e| {
            VulkanError::InitializationFailed(format!(
                "Failed to open shader file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to read shader file: {}", e))
        })?;

        Self::from_bytes(device, stage, &bytes)
    }

    /// Get the shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// The stage this module was created for
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Build the pipeline stage create info for this module.
    pub fn stage_info(&self, entry_point: &CStr) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage.flags())
            .module(self.module)
            .name(entry_point)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_flags_map_to_vulkan_stages() {
        assert_eq!(ShaderStage::Vertex.flags(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.flags(), vk::ShaderStageFlags::FRAGMENT);
    }
}
