//! Sampled 2D textures
//!
//! Pixels are decoded with `image`, staged through a host-visible buffer and
//! copied into a device-local image with a one-time submission. Models
//! without a usable diffuse texture get an opaque white 1x1 texture and a
//! has-texture flag of 0.

use std::path::Path;
use std::sync::Arc;

use ash::vk;

use super::bound::{Buffer, Image};
use crate::render::backends::vulkan::core::error::VulkanResult;
use crate::render::backends::vulkan::core::handle::{CommandPool, ImageView, Sampler};
use crate::render::backends::vulkan::initialization::device::LogicalDevice;

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TexturePixels {
    /// Size in pixels
    pub extent: vk::Extent2D,
    /// Tightly packed RGBA8 rows
    pub rgba: Vec<u8>,
}

impl TexturePixels {
    /// Single pixel of one color
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            extent: vk::Extent2D { width: 1, height: 1 },
            rgba: color.to_vec(),
        }
    }

    /// Decode an image file into RGBA8
    pub fn decode(path: &Path) -> VulkanResult<Self> {
        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            extent: vk::Extent2D { width, height },
            rgba: rgba.into_raw(),
        })
    }

    /// Pixels for a model's diffuse texture plus its has-texture flag
    ///
    /// No path, or a file that fails to decode, yields opaque white and
    /// `false`.
    pub fn load_or_white(path: Option<&Path>) -> (Self, bool) {
        let Some(path) = path else {
            return (Self::solid([255; 4]), false);
        };
        match Self::decode(path) {
            Ok(pixels) => {
                log::debug!(
                    "[texture] Decoded {} ({}x{})",
                    path.display(),
                    pixels.extent.width,
                    pixels.extent.height
                );
                (pixels, true)
            }
            Err(e) => {
                log::warn!("[texture] Failed to load {}: {}; using white fallback", path.display(), e);
                (Self::solid([255; 4]), false)
            }
        }
    }
}

/// Has-texture uniform value for a flag
pub const fn has_texture_flag(has_texture: bool) -> u32 {
    if has_texture {
        1
    } else {
        0
    }
}

/// Device-local sampled image with its view and sampler
#[derive(Debug)]
pub struct Texture {
    sampler: Sampler,
    view: ImageView,
    image: Image,
    has_texture: bool,
}

impl Texture {
    /// Upload pixels through a staging buffer
    ///
    /// The image goes UNDEFINED, TRANSFER_DST_OPTIMAL, then
    /// SHADER_READ_ONLY_OPTIMAL within one blocking submission.
    pub fn from_pixels(
        device: &Arc<LogicalDevice>,
        pool: &CommandPool,
        pixels: &TexturePixels,
        has_texture: bool,
    ) -> VulkanResult<Self> {
        let mut staging = Buffer::host_visible(
            device,
            pixels.rgba.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        staging.write_bytes(0, &pixels.rgba)?;

        let image = Image::new_2d(
            device,
            pixels.extent,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        device.submit_one_time(pool, |cmd| {
            let to_transfer = layout_barrier(
                image.handle(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
            );
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &[],
                &[to_transfer],
            );

            cmd.copy_buffer_to_image(staging.handle(), image.handle(), pixels.extent);

            let to_shader = layout_barrier(
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
            );
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[],
                &[to_shader],
            );
            Ok(())
        })?;

        let view = ImageView::new_2d(device, image.handle(), TEXTURE_FORMAT, vk::ImageAspectFlags::COLOR)?;
        let sampler = Sampler::linear_repeat(device)?;

        log::debug!(
            "[texture] Uploaded {}x{} texture",
            pixels.extent.width,
            pixels.extent.height
        );
        Ok(Self {
            sampler,
            view,
            image,
            has_texture,
        })
    }

    /// Opaque white 1x1 texture with the has-texture flag cleared
    pub fn white(device: &Arc<LogicalDevice>, pool: &CommandPool) -> VulkanResult<Self> {
        Self::from_pixels(device, pool, &TexturePixels::solid([255; 4]), false)
    }

    /// Load a model's diffuse texture, or the white fallback
    pub fn load_or_white(device: &Arc<LogicalDevice>, pool: &CommandPool, path: Option<&Path>) -> VulkanResult<Self> {
        let (pixels, has_texture) = TexturePixels::load_or_white(path);
        Self::from_pixels(device, pool, &pixels, has_texture)
    }

    /// Image view for descriptor writes
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    /// Sampler for descriptor writes
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    /// Pixel size
    pub const fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    /// Whether real texture data was loaded
    pub const fn has_texture(&self) -> bool {
        self.has_texture
    }
}

fn layout_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_falls_back_to_white() {
        let (pixels, has_texture) = TexturePixels::load_or_white(None);

        assert!(!has_texture);
        assert_eq!(has_texture_flag(has_texture), 0);
        assert_eq!(pixels.extent, vk::Extent2D { width: 1, height: 1 });
        assert_eq!(pixels.rgba, vec![255, 255, 255, 255]);
    }

    #[test]
    fn test_unreadable_file_falls_back_to_white() {
        let path = std::env::temp_dir().join("mesh_viewer_missing_texture.png");
        let (pixels, has_texture) = TexturePixels::load_or_white(Some(&path));

        assert!(!has_texture);
        assert_eq!(pixels, TexturePixels::solid([255; 4]));
    }

    #[test]
    fn test_decodes_png() {
        let path = std::env::temp_dir().join(format!("mesh_viewer_texture_{}.png", std::process::id()));
        let mut source = image::RgbaImage::new(2, 3);
        source.put_pixel(1, 2, image::Rgba([10, 20, 30, 255]));
        source.save(&path).unwrap();

        let (pixels, has_texture) = TexturePixels::load_or_white(Some(&path));
        std::fs::remove_file(&path).ok();

        assert!(has_texture);
        assert_eq!(has_texture_flag(has_texture), 1);
        assert_eq!(pixels.extent, vk::Extent2D { width: 2, height: 3 });
        assert_eq!(&pixels.rgba[(2 * 2 + 1) * 4..], &[10, 20, 30, 255]);
    }
}
