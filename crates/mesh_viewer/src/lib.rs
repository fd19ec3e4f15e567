//! # Mesh Viewer
//!
//! Vulkan resource-lifecycle core and rendering backend for an interactive
//! 3D model viewer.
//!
//! ## Layers
//!
//! - **Resource core** (`render::backends::vulkan::core`): must-check status
//!   signal, generic RAII handle wrappers, synchronization, command and
//!   descriptor management
//! - **Memory** (`render::backends::vulkan::resources`): device memory with
//!   non-coherent range handling and buffer/image pairs bound to it
//! - **Device context** (`render::backends::vulkan::state`): the explicit
//!   instance → device → swapchain state machine, the swapchain lifecycle
//!   registry and the recreate-on-resize protocol
//! - **Render backend** (`render::backends::vulkan::renderer`): per-model GPU
//!   resources and the per-frame draw sequence behind [`render::RenderBackend`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mesh_viewer::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     mesh_viewer::foundation::logging::init();
//!
//!     let config = ViewerConfig::default();
//!     let mut window = Window::new(&config.window)?;
//!     let mut backend = create_backend(&config)?;
//!     backend.init(&mut window)?;
//!
//!     let mut scene = Scene::new();
//!     let key = scene.add(load_obj("teapot.obj")?);
//!     if let Some(model) = scene.get(key) {
//!         backend.add_model(key, model)?;
//!     }
//!
//!     let camera = OrbitCamera::default();
//!     while !window.should_close() {
//!         window.poll_events();
//!         let aspect = window.aspect_ratio();
//!         backend.render(&scene, &camera.view_matrix(), &camera.projection_matrix(aspect))?;
//!     }
//!     backend.cleanup();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for viewer applications
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, ViewerConfig, WindowConfig},
        foundation::math::{Mat4, Point3, Vec3},
        render::{
            camera::OrbitCamera,
            create_backend,
            window::{Window, WindowError},
            BackendKind, RenderBackend, RenderError, RenderResult, ShaderType,
        },
        scene::{load_obj, Model, ModelKey, Scene, SceneError, Shape},
    };
}
