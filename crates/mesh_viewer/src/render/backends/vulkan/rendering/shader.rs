//! SPIR-V loading for the shader variants
//!
//! Blobs live in one directory, named `<variant>.vert.spv` and
//! `<variant>.frag.spv`, as produced by the crate's build script.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::core::handle::ShaderModule;
use crate::render::backends::vulkan::initialization::device::LogicalDevice;
use crate::render::ShaderType;

/// Programmable stage of a graphics pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

impl ShaderStage {
    /// File extension before `.spv`
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
        }
    }

    /// Pipeline stage flag
    pub const fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Vertex and fragment modules of one variant
#[derive(Debug)]
pub struct VariantModules {
    /// Vertex stage
    pub vertex: ShaderModule,
    /// Fragment stage
    pub fragment: ShaderModule,
}

/// Directory of compiled shader blobs
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    dir: PathBuf,
}

impl ShaderLibrary {
    /// Library rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the blobs are read from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Blob path for one variant and stage
    pub fn path(&self, variant: ShaderType, stage: ShaderStage) -> PathBuf {
        self.dir
            .join(format!("{}.{}.spv", variant.file_stem(), stage.extension()))
    }

    /// Read a SPIR-V file into words
    pub fn read_words(path: &Path) -> VulkanResult<Vec<u32>> {
        let shader_error = |reason: String| {
            log::error!("[shaderModule] {}: {}", path.display(), reason);
            VulkanError::Shader {
                path: path.display().to_string(),
                reason,
            }
        };
        let mut file = File::open(path).map_err(|e| shader_error(e.to_string()))?;
        ash::util::read_spv(&mut file).map_err(|e| shader_error(e.to_string()))
    }

    /// Create the module for one variant and stage
    pub fn load(&self, device: &Arc<LogicalDevice>, variant: ShaderType, stage: ShaderStage) -> VulkanResult<ShaderModule> {
        let path = self.path(variant, stage);
        let words = Self::read_words(&path)?;
        log::debug!("[shaderModule] Loaded {} ({} words)", path.display(), words.len());
        ShaderModule::from_words(device, &words)
    }

    /// Create both modules of a variant
    pub fn load_variant(&self, device: &Arc<LogicalDevice>, variant: ShaderType) -> VulkanResult<VariantModules> {
        Ok(VariantModules {
            vertex: self.load(device, variant, ShaderStage::Vertex)?,
            fragment: self.load(device, variant, ShaderStage::Fragment)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_names() {
        let library = ShaderLibrary::new("shaders");

        assert_eq!(
            library.path(ShaderType::TexturedMaterial, ShaderStage::Fragment),
            Path::new("shaders").join("textured.frag.spv")
        );
        assert_eq!(
            library.path(ShaderType::Wireframe, ShaderStage::Vertex),
            Path::new("shaders").join("wireframe.vert.spv")
        );
    }

    #[test]
    fn test_missing_blob_names_the_file() {
        let library = ShaderLibrary::new(std::env::temp_dir().join("mesh_viewer_no_shaders"));
        let path = library.path(ShaderType::Lit, ShaderStage::Vertex);

        let err = ShaderLibrary::read_words(&path).unwrap_err();
        assert!(err.to_string().contains("lit.vert.spv"));
    }

    #[test]
    fn test_reads_words_and_rejects_truncated_blobs() {
        let dir = std::env::temp_dir();
        let good = dir.join(format!("mesh_viewer_good_{}.spv", std::process::id()));
        let bad = dir.join(format!("mesh_viewer_bad_{}.spv", std::process::id()));

        let mut bytes = 0x0723_0203_u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&7_u32.to_le_bytes());
        std::fs::write(&good, &bytes).unwrap();
        std::fs::write(&bad, [1_u8, 2, 3]).unwrap();

        let words = ShaderLibrary::read_words(&good);
        let truncated = ShaderLibrary::read_words(&bad);
        std::fs::remove_file(&good).ok();
        std::fs::remove_file(&bad).ok();

        assert_eq!(words.unwrap(), vec![0x0723_0203, 7]);
        assert!(truncated.is_err());
    }
}
