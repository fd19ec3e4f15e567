//! Configuration system
//!
//! Viewer settings load from `.toml` or `.ron` files through the [`Config`]
//! trait; every field has a default so partial files are accepted.

use std::path::{Path, PathBuf};

pub use serde::{Deserialize, Serialize};

use crate::render::{BackendKind, ShaderType};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file, picking the format from the extension
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            ConfigFormat::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Save configuration to file, picking the format from the extension
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Ron,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial framebuffer width in pixels
    pub width: u32,
    /// Initial framebuffer height in pixels
    pub height: u32,
    /// Whether the window can be resized
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Mesh Viewer".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
        }
    }
}

/// Top-level viewer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Application name reported to the graphics driver
    pub application_name: String,
    /// Window settings
    pub window: WindowConfig,
    /// Which rendering backend to drive
    pub backend: BackendKind,
    /// Directory holding the compiled `<variant>.<stage>.spv` blobs
    pub shader_dir: PathBuf,
    /// Enable validation layers when they are installed
    pub enable_validation: bool,
    /// Prefer a non-vsync present mode when available
    pub uncapped_framerate: bool,
    /// Background clear color [R, G, B, A] (0.0-1.0 range)
    pub clear_color: [f32; 4],
    /// Shader variant active at startup
    pub shader_type: ShaderType,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            application_name: "mesh_viewer".to_string(),
            window: WindowConfig::default(),
            backend: BackendKind::Vulkan,
            shader_dir: PathBuf::from("target/shaders"),
            enable_validation: cfg!(debug_assertions),
            uncapped_framerate: false,
            clear_color: [0.1, 0.1, 0.12, 1.0],
            shader_type: ShaderType::Lit,
        }
    }
}

impl Config for ViewerConfig {}

impl ViewerConfig {
    /// Set the shader directory
    #[must_use]
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Request an uncapped present mode
    #[must_use]
    pub const fn with_uncapped_framerate(mut self, uncapped: bool) -> Self {
        self.uncapped_framerate = uncapped;
        self
    }

    /// Set the background clear color
    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Select the rendering backend
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let parsed: ViewerConfig = toml::from_str(
            r#"
            uncapped_framerate = true
            shader_type = "Wireframe"

            [window]
            width = 800
            "#,
        )
        .expect("valid toml");

        assert!(parsed.uncapped_framerate);
        assert_eq!(parsed.shader_type, ShaderType::Wireframe);
        assert_eq!(parsed.window.width, 800);
        assert_eq!(parsed.window.height, WindowConfig::default().height);
        assert_eq!(parsed.backend, BackendKind::Vulkan);
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let result = ViewerConfig::load_from_file("viewer.json");
        // Missing file wins over the format check, so test `ConfigFormat` on its own
        assert!(matches!(result, Err(ConfigError::Io(_))));
        assert!(matches!(
            ConfigFormat::from_path(Path::new("viewer.json")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_save_and_load_ron() {
        let path = std::env::temp_dir().join(format!("mesh_viewer_config_{}.ron", std::process::id()));
        let config = ViewerConfig::default()
            .with_clear_color([0.0, 0.5, 1.0, 1.0])
            .with_backend(BackendKind::OpenGl);

        config.save_to_file(&path).expect("save");
        let loaded = ViewerConfig::load_from_file(&path).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }
}
