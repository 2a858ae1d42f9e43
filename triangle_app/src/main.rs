//! Triangle demo
//!
//! Example wiring for the renderer: a window, a config, the setup chain,
//! and the frame loop. Exits 0 on any path that reaches teardown — setup
//! failures included, since everything created is released on the way out —
//! and 1 only when not even the window could be brought up.

mod window;

use std::process::ExitCode;

use glfw::{Action, Key, WindowEvent};
use vulkan_kit::{
    FrameLoop, FrameOutcome, Renderer, RendererConfig, VulkanError, VulkanInstance, VulkanResult,
    VALIDATION_LAYER,
};
use window::Window;

fn main() -> ExitCode {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => match RendererConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("triangle_app: {}", e);
                return ExitCode::from(1);
            }
        },
        None => RendererConfig::default(),
    };

    let mut window = match Window::new(
        &config.application_name,
        config.window_width,
        config.window_height,
    ) {
        Ok(window) => window,
        Err(e) => {
            eprintln!("triangle_app: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = run(&config, &mut window) {
        log::error!("Renderer stopped: {}", e);
    }

    ExitCode::SUCCESS
}

fn run(config: &RendererConfig, window: &mut Window) -> VulkanResult<()> {
    let mut extensions = window
        .required_instance_extensions()
        .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
    let mut layers = Vec::new();
    if config.enable_validation {
        layers.push(VALIDATION_LAYER.to_string());
        if cfg!(debug_assertions) {
            extensions.push(
                ash::extensions::ext::DebugUtils::name()
                    .to_string_lossy()
                    .into_owned(),
            );
        }
    }

    let instance = VulkanInstance::new(
        &config.application_name,
        &config.engine_name,
        &layers,
        &extensions,
    )?;
    let surface = window
        .create_surface(&instance)
        .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

    let vertex_spirv = read_shader(&config.shaders.vertex_shader_path)?;
    let fragment_spirv = read_shader(&config.shaders.fragment_shader_path)?;

    let mut renderer = Renderer::with_surface(
        config,
        instance,
        surface,
        window.framebuffer_size(),
        &vertex_spirv,
        &fragment_spirv,
    )?;

    let mut frame_loop = FrameLoop::new(config.fence_timeout_ns);
    let cancel = frame_loop.cancel_token();

    while !window.should_close() {
        for event in window.poll() {
            match event {
                WindowEvent::FramebufferSize(width, height) => {
                    renderer.set_window_extent(width as u32, height as u32);
                }
                WindowEvent::Key(Key::Escape, _, Action::Press, _) | WindowEvent::Close => {
                    window.set_should_close(true);
                }
                _ => {}
            }
        }

        if window.should_close() {
            cancel.cancel();
        }

        match frame_loop.render(&mut renderer) {
            Ok(FrameOutcome::Rendered | FrameOutcome::SwapchainRebuilt) => {}
            Ok(FrameOutcome::Cancelled) => break,
            Err(VulkanError::FenceWaitTimeout { timeout_ns }) => {
                log::warn!("Frame fence wait exceeded {} ns; retrying", timeout_ns);
            }
            Err(e) => return Err(e),
        }
    }

    renderer.wait_idle()?;
    log::info!("Rendered {} frames", frame_loop.frames_rendered());
    Ok(())
}

fn read_shader(path: &str) -> VulkanResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        VulkanError::InitializationFailed(format!("Failed to read shader {}: {}", path, e))
    })
}
