//! Window management using GLFW
//!
//! Provides the viewer window and, through [`SurfaceProvider`], the
//! instance extensions and presentation surface the Vulkan context needs.

use ash::vk;
use thiserror::Error;

use crate::config::WindowConfig;
use crate::render::backends::vulkan::{SurfaceProvider, VulkanError, VulkanResult};

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window configured for Vulkan (no client API)
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create and show a window
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| WindowError::InitializationFailed(format!("{e:?}")))?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);
        window.set_scroll_polling(true);

        log::info!("[window] Created {}x{} window '{}'", config.width, config.height, config.title);
        Ok(Self { glfw, window, events })
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request the window to close
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pump the platform event queue
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    /// Block until at least one event arrives (used while minimized)
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    /// Take every event received since the last call
    pub fn drain_events(&self) -> Vec<glfw::WindowEvent> {
        glfw::flush_messages(&self.events).map(|(_, event)| event).collect()
    }

    /// Framebuffer size in pixels
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (u32::try_from(width).unwrap_or(0), u32::try_from(height).unwrap_or(0))
    }

    /// Width over height of the framebuffer, 1.0 while minimized
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect_ratio(&self) -> f32 {
        match self.framebuffer_size() {
            (width, height) if width > 0 && height > 0 => width as f32 / height as f32,
            _ => 1.0,
        }
    }
}

impl SurfaceProvider for Window {
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>> {
        self.glfw.get_required_instance_extensions().ok_or_else(|| {
            VulkanError::Environment("GLFW reports no Vulkan support on this system".to_string())
        })
    }

    fn create_surface(&mut self, instance: vk::Instance) -> VulkanResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(VulkanError::native("surface", result))
        }
    }

    fn framebuffer_extent(&self) -> vk::Extent2D {
        let (width, height) = self.framebuffer_size();
        vk::Extent2D { width, height }
    }
}
