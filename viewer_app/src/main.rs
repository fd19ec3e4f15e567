//! Interactive OBJ viewer
//!
//! Loads every model named on the command line into one scene and draws it
//! with the Vulkan backend.
//!
//! Controls: `1` wireframe, `2` lit, `3` textured material, arrow keys orbit
//! the camera, scroll zooms, `Backspace` unloads the newest model, `Esc`
//! quits.

mod args;

use std::path::Path;

use glfw::{Action, Key, WindowEvent};
use mesh_viewer::prelude::*;

use args::Args;

const MODEL_SPACING: f32 = 2.5;
const ORBIT_STEP: f32 = 0.05;
const ZOOM_STEP: f32 = 0.5;

struct ViewerApp {
    // Dropped before the window so the surface goes away first
    backend: Box<dyn RenderBackend>,
    window: Window,
    scene: Scene,
    loaded: Vec<ModelKey>,
    camera: OrbitCamera,
}

impl ViewerApp {
    fn new(config: &ViewerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let mut window = Window::new(&config.window)?;
        let mut backend = create_backend(config)?;
        backend.init(&mut window)?;
        backend.set_shader_type(config.shader_type);

        Ok(Self {
            backend,
            window,
            scene: Scene::new(),
            loaded: Vec::new(),
            camera: OrbitCamera::default(),
        })
    }

    /// Load the models side by side along X
    #[allow(clippy::cast_precision_loss)]
    fn load_models(&mut self, paths: &[impl AsRef<Path>]) -> RenderResult<()> {
        let first_offset = -(paths.len().saturating_sub(1) as f32) * MODEL_SPACING * 0.5;

        for (slot, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            let mut model = match load_obj(path) {
                Ok(model) => model,
                Err(e) => {
                    log::error!("[viewer] Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            model.set_translation(Vec3::new(first_offset + slot as f32 * MODEL_SPACING, 0.0, 0.0));

            let key = self.scene.add(model);
            if let Some(model) = self.scene.get(key) {
                self.backend.add_model(key, model)?;
            }
            self.loaded.push(key);
        }

        log::info!("[viewer] {} model(s) loaded", self.loaded.len());
        Ok(())
    }

    fn unload_newest(&mut self) -> RenderResult<()> {
        if let Some(key) = self.loaded.pop() {
            self.backend.remove_model(key)?;
            if let Some(model) = self.scene.remove(key) {
                log::info!("[viewer] Unloaded '{}'", model.name);
            }
        }
        Ok(())
    }

    fn handle_event(&mut self, event: WindowEvent) -> RenderResult<()> {
        match event {
            WindowEvent::Key(Key::Escape, _, Action::Press, _) | WindowEvent::Close => {
                self.window.set_should_close(true);
            }
            WindowEvent::Key(Key::Num1, _, Action::Press, _) => self.backend.set_shader_type(ShaderType::Wireframe),
            WindowEvent::Key(Key::Num2, _, Action::Press, _) => self.backend.set_shader_type(ShaderType::Lit),
            WindowEvent::Key(Key::Num3, _, Action::Press, _) => {
                self.backend.set_shader_type(ShaderType::TexturedMaterial);
            }
            WindowEvent::Key(Key::Backspace, _, Action::Press, _) => self.unload_newest()?,
            WindowEvent::Key(key, _, Action::Press | Action::Repeat, _) => match key {
                Key::Left => self.camera.orbit(-ORBIT_STEP, 0.0),
                Key::Right => self.camera.orbit(ORBIT_STEP, 0.0),
                Key::Up => self.camera.orbit(0.0, ORBIT_STEP),
                Key::Down => self.camera.orbit(0.0, -ORBIT_STEP),
                _ => {}
            },
            #[allow(clippy::cast_possible_truncation)]
            WindowEvent::Scroll(_, y) => self.camera.zoom(-(y as f32) * ZOOM_STEP),
            WindowEvent::FramebufferSize(width, height) => {
                self.backend
                    .resize(u32::try_from(width).unwrap_or(0), u32::try_from(height).unwrap_or(0));
            }
            _ => {}
        }
        Ok(())
    }

    fn run(&mut self) -> RenderResult<()> {
        while !self.window.should_close() {
            self.window.poll_events();
            for event in self.window.drain_events() {
                self.handle_event(event)?;
            }

            // Nothing to present to while minimized
            let (width, height) = self.window.framebuffer_size();
            if width == 0 || height == 0 {
                self.window.wait_events();
                continue;
            }

            let view = self.camera.view_matrix();
            let projection = self.camera.projection_matrix(self.window.aspect_ratio());
            match self.backend.render(&self.scene, &view, &projection) {
                Ok(()) => {}
                Err(e) if e.is_unrecoverable() => return Err(e),
                Err(e) => log::warn!("[viewer] Frame dropped: {}", e),
            }
        }
        Ok(())
    }
}

impl Drop for ViewerApp {
    fn drop(&mut self) {
        self.backend.cleanup();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    mesh_viewer::foundation::logging::init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ViewerConfig::load_from_file(path)?,
        None => ViewerConfig::default(),
    };
    log::info!("[viewer] Starting with {:?} backend", config.backend);

    let mut app = ViewerApp::new(&config)?;
    app.load_models(&args.models)?;
    if let Err(e) = app.run() {
        log::error!("[viewer] Unrecoverable error: {}", e);
        return Err(e.into());
    }

    log::info!("[viewer] Finished");
    Ok(())
}
