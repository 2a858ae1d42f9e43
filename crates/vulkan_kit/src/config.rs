//! Renderer configuration
//!
//! Strongly typed settings with defaults, loadable from a TOML file. The
//! Vulkan enums get serde-friendly mirror enums so config files stay plain
//! strings.

use ash::vk;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::swapchain::SwapchainPreferences;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file could not be parsed
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Which physical-device type to select. No fallback is applied: if no
/// device of the configured type exists, setup fails with a selection error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    /// A discrete GPU
    DiscreteGpu,
    /// A GPU integrated with the CPU
    IntegratedGpu,
    /// A virtualized GPU
    VirtualGpu,
    /// CPU-based implementation
    Cpu,
}

impl DevicePreference {
    /// The corresponding Vulkan device type
    pub fn device_type(self) -> vk::PhysicalDeviceType {
        match self {
            DevicePreference::DiscreteGpu => vk::PhysicalDeviceType::DISCRETE_GPU,
            DevicePreference::IntegratedGpu => vk::PhysicalDeviceType::INTEGRATED_GPU,
            DevicePreference::VirtualGpu => vk::PhysicalDeviceType::VIRTUAL_GPU,
            DevicePreference::Cpu => vk::PhysicalDeviceType::CPU,
        }
    }
}

/// Preferred present mode; FIFO is the guaranteed fallback either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    /// Low-latency triple buffering
    Mailbox,
    /// Vertical-sync queue (always available)
    Fifo,
    /// No synchronization, may tear
    Immediate,
}

impl PresentModePreference {
    /// The corresponding Vulkan present mode
    pub fn present_mode(self) -> vk::PresentModeKHR {
        match self {
            PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
            PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// Shader file locations for the demo pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Resolve shader paths against the common output locations, so the
    /// binary works from different working directories.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        let shader_dirs = ["target/shaders/", "shaders/", "resources/shaders/", "./"];

        let resolve = |base: &str| {
            shader_dirs
                .iter()
                .map(|dir| format!("{}{}", dir, base))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("target/shaders/{}", base))
        };

        Self {
            vertex_shader_path: resolve(base_vertex),
            fragment_shader_path: resolve(base_fragment),
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("triangle.vert.spv", "triangle.frag.spv")
    }
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for instance creation and the window title
    pub application_name: String,
    /// Engine name reported to the driver
    pub engine_name: String,
    /// Initial window width in pixels
    pub window_width: u32,
    /// Initial window height in pixels
    pub window_height: u32,
    /// Physical-device type to select
    pub device_preference: DevicePreference,
    /// Preferred present mode
    pub present_mode: PresentModePreference,
    /// Bound on each in-flight fence wait, in nanoseconds
    pub fence_timeout_ns: u64,
    /// Whether to request the Khronos validation layer
    pub enable_validation: bool,
    /// Render-pass clear color (RGBA)
    pub clear_color: [f32; 4],
    /// Shader file locations
    pub shaders: ShaderConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Example App".to_string(),
            engine_name: "vulkan_kit".to_string(),
            window_width: 1920,
            window_height: 1080,
            device_preference: DevicePreference::DiscreteGpu,
            present_mode: PresentModePreference::Mailbox,
            fence_timeout_ns: 1_000_000_000,
            enable_validation: cfg!(debug_assertions),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shaders: ShaderConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// The swapchain preferences this configuration implies.
    pub fn swapchain_preferences(&self) -> SwapchainPreferences {
        SwapchainPreferences {
            present_mode: self.present_mode.present_mode(),
            ..SwapchainPreferences::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = RendererConfig::default();

        assert_eq!(config.device_preference, DevicePreference::DiscreteGpu);
        assert_eq!(config.present_mode, PresentModePreference::Mailbox);
        assert_eq!(config.fence_timeout_ns, 1_000_000_000);
        assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: RendererConfig = toml::from_str(
            r#"
            application_name = "Demo"
            device_preference = "integrated_gpu"
            present_mode = "fifo"
            "#,
        )
        .unwrap();

        assert_eq!(config.application_name, "Demo");
        assert_eq!(config.device_preference, DevicePreference::IntegratedGpu);
        assert_eq!(config.present_mode, PresentModePreference::Fifo);
        assert_eq!(config.window_width, 1920);
    }

    #[test]
    fn preferences_map_to_vulkan_enums() {
        assert_eq!(
            DevicePreference::DiscreteGpu.device_type(),
            vk::PhysicalDeviceType::DISCRETE_GPU
        );
        assert_eq!(
            PresentModePreference::Mailbox.present_mode(),
            vk::PresentModeKHR::MAILBOX
        );

        let prefs = RendererConfig::default().swapchain_preferences();
        assert_eq!(prefs.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(prefs.surface_format.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = RendererConfig {
            application_name: "Round Trip".to_string(),
            window_width: 640,
            window_height: 480,
            ..RendererConfig::default()
        };

        let serialized = toml::to_string(&config).unwrap();
        let parsed: RendererConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(parsed.application_name, "Round Trip");
        assert_eq!(parsed.window_width, 640);
        assert_eq!(parsed.window_height, 480);
    }
}
