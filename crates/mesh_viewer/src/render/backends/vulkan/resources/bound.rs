//! Buffers and images paired with their backing memory
//!
//! A [`BoundResource`] starts unbound; [`BoundResource::bind`] attaches a
//! [`DeviceMemory`] exactly once. Host transfers before binding fail with a
//! local validation error.

use std::fmt;
use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;
use bytemuck::Pod;

use super::memory::DeviceMemory;
use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::core::handle::{BufferKind, DeviceHandle, HandleKind, ImageKind};
use crate::render::backends::vulkan::initialization::device::LogicalDevice;

/// A handle kind that needs device memory bound before use
pub trait MemoryBindable: HandleKind {
    /// Creation parameters kept for later queries
    type Desc: Clone + fmt::Debug;

    /// Memory requirements of a live handle
    ///
    /// # Safety
    /// `raw` must be a live handle created from `device`.
    unsafe fn requirements(device: &ash::Device, raw: Self::Raw) -> vk::MemoryRequirements;

    /// Bind memory to a live handle
    ///
    /// # Safety
    /// `raw` and `memory` must be live objects created from `device`.
    unsafe fn bind(device: &ash::Device, raw: Self::Raw, memory: vk::DeviceMemory) -> VkResult<()>;
}

/// Buffer creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: vk::DeviceSize,
    /// Usage flags
    pub usage: vk::BufferUsageFlags,
}

/// Image creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Pixel size
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
}

impl MemoryBindable for BufferKind {
    type Desc = BufferDesc;

    unsafe fn requirements(device: &ash::Device, raw: vk::Buffer) -> vk::MemoryRequirements {
        device.get_buffer_memory_requirements(raw)
    }

    unsafe fn bind(device: &ash::Device, raw: vk::Buffer, memory: vk::DeviceMemory) -> VkResult<()> {
        device.bind_buffer_memory(raw, memory, 0)
    }
}

impl MemoryBindable for ImageKind {
    type Desc = ImageDesc;

    unsafe fn requirements(device: &ash::Device, raw: vk::Image) -> vk::MemoryRequirements {
        device.get_image_memory_requirements(raw)
    }

    unsafe fn bind(device: &ash::Device, raw: vk::Image, memory: vk::DeviceMemory) -> VkResult<()> {
        device.bind_image_memory(raw, memory, 0)
    }
}

/// A resource handle plus the memory bound to it
pub struct BoundResource<K: MemoryBindable> {
    // Declared first so the resource is destroyed before its memory
    resource: DeviceHandle<K>,
    memory: Option<DeviceMemory>,
    desc: K::Desc,
}

/// Buffer with bound memory
pub type Buffer = BoundResource<BufferKind>;

/// Image with bound memory
pub type Image = BoundResource<ImageKind>;

impl<K: MemoryBindable> BoundResource<K> {
    /// Wrap a created but unbound resource
    pub fn unbound(resource: DeviceHandle<K>, desc: K::Desc) -> Self {
        Self {
            resource,
            memory: None,
            desc,
        }
    }

    /// Memory requirements of the resource
    pub fn requirements(&self) -> VulkanResult<vk::MemoryRequirements> {
        let device = self.resource.device()?;
        Ok(unsafe { K::requirements(device.raw(), self.resource.handle()) })
    }

    /// Attach memory; a second bind is rejected
    pub fn bind(&mut self, memory: DeviceMemory) -> VulkanResult<()> {
        if self.memory.is_some() {
            return Err(VulkanError::validation(K::NAME, "resource is already bound to memory"));
        }
        let device = self.resource.device()?;
        unsafe { K::bind(device.raw(), self.resource.handle(), memory.handle()) }
            .map_err(|code| VulkanError::native(K::NAME, code))?;
        self.memory = Some(memory);
        Ok(())
    }

    /// Allocate memory with `properties` for this resource and bind it
    pub fn allocate_and_bind(&mut self, properties: vk::MemoryPropertyFlags) -> VulkanResult<()> {
        let requirements = self.requirements()?;
        let memory = DeviceMemory::allocate_for(self.resource.device()?, &requirements, properties)?;
        self.bind(memory)
    }

    /// Raw handle
    pub fn handle(&self) -> K::Raw {
        self.resource.handle()
    }

    /// Creation parameters
    pub const fn desc(&self) -> &K::Desc {
        &self.desc
    }

    /// Whether memory has been bound
    pub const fn is_bound(&self) -> bool {
        self.memory.is_some()
    }

    /// Bound memory, or a validation error before binding
    pub fn memory(&self) -> VulkanResult<&DeviceMemory> {
        self.memory
            .as_ref()
            .ok_or_else(|| VulkanError::validation(K::NAME, "resource has no memory bound"))
    }

    /// Mutable bound memory, or a validation error before binding
    pub fn memory_mut(&mut self) -> VulkanResult<&mut DeviceMemory> {
        self.memory
            .as_mut()
            .ok_or_else(|| VulkanError::validation(K::NAME, "resource has no memory bound"))
    }

    /// Copy bytes into the bound memory
    pub fn write_bytes(&mut self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        self.memory_mut()?.write_bytes(offset, data)
    }

    /// Copy bytes out of the bound memory
    pub fn read_bytes(&mut self, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>> {
        self.memory_mut()?.read_bytes(offset, len)
    }

    /// Write one plain-old-data value
    pub fn write_pod<T: Pod>(&mut self, offset: vk::DeviceSize, value: &T) -> VulkanResult<()> {
        self.memory_mut()?.write_pod(offset, value)
    }

    /// Write a slice of plain-old-data values
    pub fn write_slice<T: Pod>(&mut self, offset: vk::DeviceSize, values: &[T]) -> VulkanResult<()> {
        self.memory_mut()?.write_slice(offset, values)
    }
}

impl<K: MemoryBindable> fmt::Debug for BoundResource<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::NAME)
            .field("handle", &self.resource.handle())
            .field("bound", &self.is_bound())
            .field("desc", &self.desc)
            .finish()
    }
}

impl Buffer {
    /// Create a buffer and bind fresh memory with `properties`
    pub fn new(
        device: &Arc<LogicalDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let raw = DeviceHandle::<BufferKind>::create_with(device, |raw| unsafe { raw.create_buffer(&info, None) })?;

        let mut buffer = Self::unbound(raw, BufferDesc { size, usage });
        buffer.allocate_and_bind(properties)?;
        log::trace!("[buffer] Created {} byte buffer for {:?}", size, usage);
        Ok(buffer)
    }

    /// Host-visible, coherent buffer for CPU-written data
    pub fn host_visible(device: &Arc<LogicalDevice>, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<Self> {
        Self::new(
            device,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Requested size in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.desc.size
    }
}

impl Image {
    /// Create a single-level 2D image with optimal tiling and bind memory
    pub fn new_2d(
        device: &Arc<LogicalDevice>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let raw = DeviceHandle::<ImageKind>::create_with(device, |raw| unsafe { raw.create_image(&info, None) })?;

        let mut image = Self::unbound(
            raw,
            ImageDesc {
                extent,
                format,
                usage,
            },
        );
        image.allocate_and_bind(properties)?;
        log::trace!("[image] Created {}x{} {:?} image", extent.width, extent.height, format);
        Ok(image)
    }

    /// Pixel size
    pub const fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    /// Texel format
    pub const fn format(&self) -> vk::Format {
        self.desc.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbound_buffer() -> Buffer {
        Buffer::unbound(
            DeviceHandle::empty(),
            BufferDesc {
                size: 64,
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            },
        )
    }

    #[test]
    fn test_unbound_resource_rejects_transfers() {
        let mut buffer = unbound_buffer();

        assert!(!buffer.is_bound());
        assert!(matches!(buffer.write_bytes(0, &[1, 2, 3]), Err(VulkanError::Validation { .. })));
        assert!(buffer.read_bytes(0, 4).is_err());
        assert_eq!(buffer.size(), 64);
    }

    #[test]
    fn test_requirements_need_a_live_handle() {
        let buffer = unbound_buffer();
        assert!(buffer.requirements().is_err());
    }
}
