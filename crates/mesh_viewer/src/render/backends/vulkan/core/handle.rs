//! Generic owner of one device-level Vulkan handle
//!
//! [`DeviceHandle<K>`] pairs a raw handle with a shared reference to the
//! [`LogicalDevice`] that created it. The reference keeps the device alive
//! for as long as any child exists, so destruction order between children
//! and their device is enforced by ownership rather than by convention.
//!
//! The kind parameter `K` names the raw type, the tag used in diagnostics,
//! and the destroy call. Kind-specific operations (fence waits, pool
//! allocation, render pass recording, ...) live in `impl DeviceHandle<Kind>`
//! blocks next to the code that needs them.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;

use super::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::initialization::device::LogicalDevice;

/// Describes one kind of device-owned handle
pub trait HandleKind {
    /// Raw Vulkan handle type
    type Raw: vk::Handle + Copy + Default + PartialEq + fmt::Debug;

    /// Tag used in log lines and errors
    const NAME: &'static str;

    /// Destroy a non-null handle
    ///
    /// # Safety
    /// `raw` must have been created from `device` and must not be in use by
    /// the GPU.
    unsafe fn destroy(device: &ash::Device, raw: Self::Raw);
}

/// Move-only owner of exactly one native handle
pub struct DeviceHandle<K: HandleKind> {
    device: Option<Arc<LogicalDevice>>,
    raw: K::Raw,
    _kind: PhantomData<K>,
}

impl<K: HandleKind> DeviceHandle<K> {
    /// Null wrapper, to be replaced by a real create call later
    pub fn empty() -> Self {
        Self {
            device: None,
            raw: K::Raw::default(),
            _kind: PhantomData,
        }
    }

    /// Run a native create call; failures are logged with the kind and code
    pub(crate) fn create_with<F>(device: &Arc<LogicalDevice>, create: F) -> VulkanResult<Self>
    where
        F: FnOnce(&ash::Device) -> VkResult<K::Raw>,
    {
        match create(device.raw()) {
            Ok(raw) => {
                log::trace!("[{}] Created {:?}", K::NAME, raw);
                Ok(Self::adopt(device, raw))
            }
            Err(code) => Err(VulkanError::native(K::NAME, code)),
        }
    }

    /// Take ownership of a handle created elsewhere (batched creation)
    pub(crate) fn adopt(device: &Arc<LogicalDevice>, raw: K::Raw) -> Self {
        Self {
            device: Some(Arc::clone(device)),
            raw,
            _kind: PhantomData,
        }
    }

    /// Raw handle for native interop
    pub fn handle(&self) -> K::Raw {
        self.raw
    }

    /// Address of the raw handle for APIs that take a pointer
    pub fn handle_ref(&self) -> &K::Raw {
        &self.raw
    }

    /// Whether no native object is owned
    pub fn is_null(&self) -> bool {
        self.raw == K::Raw::default()
    }

    /// Owning device, or a validation error for empty wrappers
    pub fn device(&self) -> VulkanResult<&Arc<LogicalDevice>> {
        match (&self.device, self.is_null()) {
            (Some(device), false) => Ok(device),
            _ => Err(VulkanError::validation(K::NAME, "operation on a null handle")),
        }
    }

    /// Destroy the native object now; calling it again does nothing
    pub fn destroy(&mut self) {
        if self.is_null() {
            return;
        }
        if let Some(device) = self.device.take() {
            log::trace!("[{}] Destroying {:?}", K::NAME, self.raw);
            // SAFETY: the handle came from this device and owners wait for
            // GPU idleness before releasing in-flight objects.
            unsafe { K::destroy(device.raw(), self.raw) };
        }
        self.raw = K::Raw::default();
    }
}

impl<K: HandleKind> Default for DeviceHandle<K> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: HandleKind> Drop for DeviceHandle<K> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<K: HandleKind> fmt::Debug for DeviceHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(K::NAME).field(&self.raw).finish()
    }
}

impl<K: HandleKind> AsRef<K::Raw> for DeviceHandle<K> {
    fn as_ref(&self) -> &K::Raw {
        &self.raw
    }
}

/// Null every handle in a pool-owned batch after it has been freed
pub(crate) fn zero_handles<H: vk::Handle + Copy + Default>(handles: &mut [H]) {
    for handle in handles {
        *handle = H::default();
    }
}

/// Non-null entries of a pool-owned batch
pub(crate) fn live_handles<H: Copy + Default + PartialEq>(handles: &[H]) -> Vec<H> {
    handles.iter().copied().filter(|handle| *handle != H::default()).collect()
}

macro_rules! handle_kinds {
    ($($(#[$doc:meta])* $kind:ident => $alias:ident($raw:ty, $name:literal, $destroy:ident);)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug)]
            pub enum $kind {}

            impl HandleKind for $kind {
                type Raw = $raw;
                const NAME: &'static str = $name;

                unsafe fn destroy(device: &ash::Device, raw: $raw) {
                    device.$destroy(raw, None);
                }
            }

            $(#[$doc])*
            pub type $alias = DeviceHandle<$kind>;
        )*
    };
}

handle_kinds! {
    /// Binary semaphore
    SemaphoreKind => Semaphore(vk::Semaphore, "semaphore", destroy_semaphore);
    /// Fence
    FenceKind => Fence(vk::Fence, "fence", destroy_fence);
    /// Event
    EventKind => Event(vk::Event, "event", destroy_event);
    /// Device memory allocation
    MemoryKind => RawMemory(vk::DeviceMemory, "deviceMemory", free_memory);
    /// Buffer without its memory
    BufferKind => RawBuffer(vk::Buffer, "buffer", destroy_buffer);
    /// Image without its memory
    ImageKind => RawImage(vk::Image, "image", destroy_image);
    /// Buffer view
    BufferViewKind => BufferView(vk::BufferView, "bufferView", destroy_buffer_view);
    /// Image view
    ImageViewKind => ImageView(vk::ImageView, "imageView", destroy_image_view);
    /// Sampler
    SamplerKind => Sampler(vk::Sampler, "sampler", destroy_sampler);
    /// Shader module
    ShaderModuleKind => ShaderModule(vk::ShaderModule, "shaderModule", destroy_shader_module);
    /// Descriptor set layout
    DescriptorSetLayoutKind => DescriptorSetLayout(vk::DescriptorSetLayout, "descriptorSetLayout", destroy_descriptor_set_layout);
    /// Pipeline layout
    PipelineLayoutKind => PipelineLayout(vk::PipelineLayout, "pipelineLayout", destroy_pipeline_layout);
    /// Graphics or compute pipeline
    PipelineKind => Pipeline(vk::Pipeline, "pipeline", destroy_pipeline);
    /// Render pass
    RenderPassKind => RenderPass(vk::RenderPass, "renderPass", destroy_render_pass);
    /// Framebuffer
    FramebufferKind => Framebuffer(vk::Framebuffer, "framebuffer", destroy_framebuffer);
    /// Descriptor pool; destroying it frees every set allocated from it
    DescriptorPoolKind => DescriptorPool(vk::DescriptorPool, "descriptorPool", destroy_descriptor_pool);
    /// Query pool
    QueryPoolKind => QueryPool(vk::QueryPool, "queryPool", destroy_query_pool);
    /// Command pool; destroying it frees every buffer allocated from it
    CommandPoolKind => CommandPool(vk::CommandPool, "commandPool", destroy_command_pool);
}

impl ImageView {
    /// Create an image view
    pub fn new(device: &Arc<LogicalDevice>, info: &vk::ImageViewCreateInfo) -> VulkanResult<Self> {
        Self::create_with(device, |raw| unsafe { raw.create_image_view(info, None) })
    }

    /// 2D view over the first mip level and layer of an image
    pub fn new_2d(
        device: &Arc<LogicalDevice>,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<Self> {
        let info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        Self::new(device, &info)
    }
}

impl BufferView {
    /// Create a texel buffer view
    pub fn new(device: &Arc<LogicalDevice>, info: &vk::BufferViewCreateInfo) -> VulkanResult<Self> {
        Self::create_with(device, |raw| unsafe { raw.create_buffer_view(info, None) })
    }
}

impl Sampler {
    /// Create a sampler
    pub fn new(device: &Arc<LogicalDevice>, info: &vk::SamplerCreateInfo) -> VulkanResult<Self> {
        Self::create_with(device, |raw| unsafe { raw.create_sampler(info, None) })
    }

    /// Linear, repeating sampler without anisotropy
    pub fn linear_repeat(device: &Arc<LogicalDevice>) -> VulkanResult<Self> {
        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .min_lod(0.0)
            .max_lod(0.0);
        Self::new(device, &info)
    }
}

impl ShaderModule {
    /// Create a shader module from SPIR-V words
    pub fn from_words(device: &Arc<LogicalDevice>, words: &[u32]) -> VulkanResult<Self> {
        let info = vk::ShaderModuleCreateInfo::builder().code(words);
        Self::create_with(device, |raw| unsafe { raw.create_shader_module(&info, None) })
    }
}

impl PipelineLayout {
    /// Create a pipeline layout
    pub fn new(device: &Arc<LogicalDevice>, info: &vk::PipelineLayoutCreateInfo) -> VulkanResult<Self> {
        Self::create_with(device, |raw| unsafe { raw.create_pipeline_layout(info, None) })
    }
}

impl Framebuffer {
    /// Create a framebuffer
    pub fn new(device: &Arc<LogicalDevice>, info: &vk::FramebufferCreateInfo) -> VulkanResult<Self> {
        Self::create_with(device, |raw| unsafe { raw.create_framebuffer(info, None) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_empty_wrapper_is_null_and_destroy_is_idempotent() {
        let mut fence = Fence::empty();
        assert!(fence.is_null());
        fence.destroy();
        fence.destroy();
        assert!(fence.is_null());
        assert_eq!(fence.handle(), vk::Fence::null());
    }

    #[test]
    fn test_operations_on_empty_wrapper_fail_locally() {
        let sampler = Sampler::empty();
        let err = sampler.device().unwrap_err();
        assert_eq!(err.code(), crate::render::backends::vulkan::RESULT_MAX);
    }

    #[test]
    fn test_zero_handles_clears_batch() {
        let mut sets = [vk::DescriptorSet::from_raw(7), vk::DescriptorSet::null(), vk::DescriptorSet::from_raw(9)];
        assert_eq!(live_handles(&sets).len(), 2);

        zero_handles(&mut sets);
        assert!(sets.iter().all(|set| *set == vk::DescriptorSet::null()));
        assert!(live_handles(&sets).is_empty());
    }
}
