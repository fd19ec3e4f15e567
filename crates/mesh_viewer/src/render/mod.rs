//! # Rendering System
//!
//! Backend-neutral rendering interface for the viewer.
//!
//! ## Architecture
//!
//! - **[`RenderBackend`]**: the surface the application drives (models in,
//!   frames out, shader variant selection)
//! - **Camera**: orbit camera producing Vulkan-convention matrices
//! - **Window**: glfw window that also provides the presentation surface
//! - **Vulkan Backend**: the resource-lifecycle core and the renderer on top

pub mod backends;
pub mod camera;
pub mod window;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ViewerConfig;
use crate::foundation::math::Mat4;
use crate::scene::{Model, ModelKey, Scene};
use backends::vulkan::{SurfaceProvider, VulkanError, VulkanRenderer};

/// Shader variant used to draw every model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderType {
    /// Unshaded line rendering
    Wireframe,
    /// Per-vertex normal shading with a fixed light
    Lit,
    /// Lit shading modulated by the model's diffuse texture
    TexturedMaterial,
}

impl ShaderType {
    /// Every variant, in pipeline creation order
    pub const ALL: [Self; 3] = [Self::Wireframe, Self::Lit, Self::TexturedMaterial];

    /// Position of the variant in [`ShaderType::ALL`]
    pub const fn index(self) -> usize {
        match self {
            Self::Wireframe => 0,
            Self::Lit => 1,
            Self::TexturedMaterial => 2,
        }
    }

    /// File stem of the variant's SPIR-V blobs
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::Wireframe => "wireframe",
            Self::Lit => "lit",
            Self::TexturedMaterial => "textured",
        }
    }

    /// Whether the variant samples the model's own texture at set 1
    pub const fn samples_model_texture(self) -> bool {
        matches!(self, Self::TexturedMaterial)
    }
}

/// Selectable graphics backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Explicit Vulkan backend
    Vulkan,
    /// OpenGL backend (not part of this build)
    OpenGl,
}

/// Renderer-facing errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failure inside the Vulkan backend
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// A frame or model operation arrived before `init`
    #[error("renderer used before init")]
    NotInitialized,

    /// The requested backend is not compiled into this build
    #[error("{0:?} backend is not available in this build")]
    BackendUnavailable(BackendKind),
}

impl RenderError {
    /// Whether the application should stop instead of retrying
    pub const fn is_unrecoverable(&self) -> bool {
        match self {
            Self::Vulkan(err) => err.is_unrecoverable(),
            Self::NotInitialized | Self::BackendUnavailable(_) => true,
        }
    }
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Operations every rendering backend provides to the application
pub trait RenderBackend {
    /// Create all GPU state for the given presentation surface
    fn init(&mut self, surface: &mut dyn SurfaceProvider) -> RenderResult<()>;

    /// Release all GPU state; the backend can be initialized again afterwards
    fn cleanup(&mut self);

    /// Create GPU resources for a model; adding the same key twice is a no-op
    fn add_model(&mut self, key: ModelKey, model: &Model) -> RenderResult<()>;

    /// Release a model's GPU resources; unknown keys are ignored
    fn remove_model(&mut self, key: ModelKey) -> RenderResult<()>;

    /// Select the shader variant for subsequent frames
    fn set_shader_type(&mut self, shader_type: ShaderType);

    /// Currently selected shader variant
    fn shader_type(&self) -> ShaderType;

    /// Draw one frame of every model that has GPU resources
    fn render(&mut self, scene: &Scene, view: &Mat4, projection: &Mat4) -> RenderResult<()>;

    /// Report a new framebuffer size; the swapchain follows on the next frame
    fn resize(&mut self, width: u32, height: u32);
}

/// Construct the backend named by the configuration
pub fn create_backend(config: &ViewerConfig) -> RenderResult<Box<dyn RenderBackend>> {
    match config.backend {
        BackendKind::Vulkan => Ok(Box::new(VulkanRenderer::new(config.into()))),
        BackendKind::OpenGl => {
            log::error!("[render] OpenGL backend requested but not compiled in");
            Err(RenderError::BackendUnavailable(BackendKind::OpenGl))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_type_indices_match_all() {
        for (position, shader_type) in ShaderType::ALL.iter().enumerate() {
            assert_eq!(shader_type.index(), position);
        }
    }

    #[test]
    fn test_only_textured_variant_samples_model_texture() {
        assert!(ShaderType::TexturedMaterial.samples_model_texture());
        assert!(!ShaderType::Lit.samples_model_texture());
        assert!(!ShaderType::Wireframe.samples_model_texture());
    }

    #[test]
    fn test_opengl_backend_is_reported_unavailable() {
        let config = ViewerConfig::default().with_backend(BackendKind::OpenGl);
        let err = create_backend(&config).err().expect("unavailable backend");
        assert!(matches!(err, RenderError::BackendUnavailable(BackendKind::OpenGl)));
        assert!(err.is_unrecoverable());
    }
}
