//! Device memory allocation, mapping and host transfers
//!
//! Memory without `HOST_COHERENT` needs explicit flushes after host writes
//! and invalidations before host reads, and both calls only accept ranges
//! aligned to `nonCoherentAtomSize`. [`align_non_coherent_range`] widens a
//! requested range accordingly; [`DeviceMemory::map`] hides the widening by
//! returning a pointer to the originally requested offset.

use std::ffi::c_void;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;

use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::core::handle::RawMemory;
use crate::render::backends::vulkan::initialization::device::LogicalDevice;

/// A mapping range widened to whole atoms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedRange {
    /// Requested offset rounded down to an atom boundary
    pub offset: vk::DeviceSize,
    /// Size from `offset` to the rounded-up (and clamped) end
    pub size: vk::DeviceSize,
    /// Distance from `offset` back up to the requested offset
    pub delta: vk::DeviceSize,
}

/// Widen `[offset, offset + size)` to `atom` boundaries within an allocation
///
/// `size == vk::WHOLE_SIZE` means up to the end of the allocation. The end
/// is clamped to `allocation_size`, which is always a legal flush bound even
/// when it is not a multiple of the atom.
pub fn align_non_coherent_range(
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    atom: vk::DeviceSize,
    allocation_size: vk::DeviceSize,
) -> AlignedRange {
    let atom = atom.max(1);
    let end = if size == vk::WHOLE_SIZE {
        allocation_size
    } else {
        offset.saturating_add(size).min(allocation_size)
    };

    let aligned_offset = offset / atom * atom;
    let aligned_end = end
        .checked_add(atom - 1)
        .map_or(allocation_size, |padded| padded / atom * atom)
        .min(allocation_size);

    AlignedRange {
        offset: aligned_offset,
        size: aligned_end.saturating_sub(aligned_offset),
        delta: offset - aligned_offset,
    }
}

/// First memory type allowed by `type_bits` that has every flag in `required`
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..properties.memory_type_count).find(|&index| {
        type_bits & (1 << index) != 0
            && properties.memory_types[index as usize]
                .property_flags
                .contains(required)
    })
}

#[derive(Debug)]
struct Mapping {
    base: *mut c_void,
    range: AlignedRange,
}

/// One device memory allocation
///
/// Caches its size and property flags so mapping can decide whether flushes
/// and invalidations are needed.
#[derive(Debug)]
pub struct DeviceMemory {
    memory: RawMemory,
    size: vk::DeviceSize,
    type_index: u32,
    property_flags: vk::MemoryPropertyFlags,
    mapping: Option<Mapping>,
}

impl DeviceMemory {
    /// Allocate `size` bytes from memory type `type_index`
    ///
    /// An index outside the device's memory type table is rejected locally.
    pub fn allocate(device: &Arc<LogicalDevice>, type_index: u32, size: vk::DeviceSize) -> VulkanResult<Self> {
        let properties = device.memory_properties();
        if type_index >= properties.memory_type_count {
            return Err(VulkanError::validation(
                "deviceMemory",
                format!(
                    "memory type index {} out of range ({} types)",
                    type_index, properties.memory_type_count
                ),
            ));
        }
        let property_flags = properties.memory_types[type_index as usize].property_flags;

        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(type_index);
        let memory = RawMemory::create_with(device, |raw| unsafe { raw.allocate_memory(&info, None) })?;
        log::trace!("[deviceMemory] Allocated {} bytes from type {} ({:?})", size, type_index, property_flags);

        Ok(Self {
            memory,
            size,
            type_index,
            property_flags,
            mapping: None,
        })
    }

    /// Allocate memory matching a resource's requirements
    pub fn allocate_for(
        device: &Arc<LogicalDevice>,
        requirements: &vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let type_index = device.find_memory_type(requirements.memory_type_bits, properties)?;
        Self::allocate(device, type_index, requirements.size)
    }

    /// Raw allocation handle
    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory.handle()
    }

    /// Allocation size in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Memory type the allocation came from
    pub const fn type_index(&self) -> u32 {
        self.type_index
    }

    /// Property flags of the memory type
    pub const fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.property_flags
    }

    /// Whether host writes are visible without flushes
    pub fn is_coherent(&self) -> bool {
        self.property_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    /// Whether a range is currently mapped
    pub const fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    fn atom_size(&self) -> VulkanResult<vk::DeviceSize> {
        if self.is_coherent() {
            Ok(1)
        } else {
            Ok(self.memory.device()?.limits().non_coherent_atom_size)
        }
    }

    /// Map a range and return a pointer to `offset`
    ///
    /// Non-coherent memory is invalidated after mapping so device writes are
    /// visible to the host.
    pub fn map(&mut self, offset: vk::DeviceSize, size: vk::DeviceSize) -> VulkanResult<*mut u8> {
        if self.mapping.is_some() {
            return Err(VulkanError::validation("deviceMemory", "memory is already mapped"));
        }
        if !self.property_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(VulkanError::validation("deviceMemory", "memory is not host visible"));
        }
        if offset >= self.size || (size != vk::WHOLE_SIZE && offset.saturating_add(size) > self.size) {
            return Err(VulkanError::validation(
                "deviceMemory",
                format!("range {}+{} exceeds allocation of {} bytes", offset, size, self.size),
            ));
        }

        let range = align_non_coherent_range(offset, size, self.atom_size()?, self.size);
        let device = self.memory.device()?;
        let base = unsafe {
            device
                .raw()
                .map_memory(self.memory.handle(), range.offset, range.size, vk::MemoryMapFlags::empty())
        }
        .map_err(|code| VulkanError::native("deviceMemory", code))?;

        if !self.is_coherent() {
            let mapped = self.mapped_range(range);
            if let Err(code) = unsafe { device.raw().invalidate_mapped_memory_ranges(&[mapped]) } {
                unsafe { device.raw().unmap_memory(self.memory.handle()) };
                return Err(VulkanError::native("deviceMemory", code));
            }
        }

        self.mapping = Some(Mapping { base, range });
        // SAFETY: delta < range.size, so the pointer stays inside the mapping
        Ok(unsafe { base.cast::<u8>().add(range.delta as usize) })
    }

    /// Unmap, flushing non-coherent memory first; unmapped memory is a no-op
    pub fn unmap(&mut self) -> VulkanResult<()> {
        let Some(mapping) = self.mapping.take() else {
            return Ok(());
        };
        let device = self.memory.device()?;

        let flushed = if self.is_coherent() {
            Ok(())
        } else {
            let mapped = self.mapped_range(mapping.range);
            unsafe { device.raw().flush_mapped_memory_ranges(&[mapped]) }
        };
        unsafe { device.raw().unmap_memory(self.memory.handle()) };
        log::trace!("[deviceMemory] Unmapped {:?}", mapping.base);

        flushed.map_err(|code| VulkanError::native("deviceMemory", code))
    }

    fn mapped_range(&self, range: AlignedRange) -> vk::MappedMemoryRange {
        vk::MappedMemoryRange::builder()
            .memory(self.memory.handle())
            .offset(range.offset)
            .size(range.size)
            .build()
    }

    /// Copy host bytes into the allocation at `offset`
    pub fn write_bytes(&mut self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let ptr = self.map(offset, data.len() as vk::DeviceSize)?;
        // SAFETY: map validated that `data.len()` bytes fit after `offset`
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len()) };
        self.unmap()
    }

    /// Copy `len` bytes out of the allocation at `offset`
    pub fn read_bytes(&mut self, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let ptr = self.map(offset, len as vk::DeviceSize)?;
        let mut data = vec![0_u8; len];
        // SAFETY: map validated that `len` bytes fit after `offset`
        unsafe { std::ptr::copy_nonoverlapping(ptr.cast_const(), data.as_mut_ptr(), len) };
        self.unmap()?;
        Ok(data)
    }

    /// Write one plain-old-data value
    pub fn write_pod<T: Pod>(&mut self, offset: vk::DeviceSize, value: &T) -> VulkanResult<()> {
        self.write_bytes(offset, bytemuck::bytes_of(value))
    }

    /// Write a slice of plain-old-data values
    pub fn write_slice<T: Pod>(&mut self, offset: vk::DeviceSize, values: &[T]) -> VulkanResult<()> {
        self.write_bytes(offset, bytemuck::cast_slice(values))
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            log::warn!("[deviceMemory] Unmap on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(offset: u64, size: u64, atom: u64, alloc: u64) {
        let range = align_non_coherent_range(offset, size, atom, alloc);
        let end = if size == vk::WHOLE_SIZE { alloc } else { offset + size };

        assert!(range.offset <= offset, "{range:?}");
        assert!(range.offset + range.size >= end.min(alloc), "{range:?}");
        assert_eq!(range.offset % atom, 0, "{range:?}");
        let aligned_end = range.offset + range.size;
        assert!(aligned_end % atom == 0 || aligned_end == alloc, "{range:?}");
        assert!(aligned_end <= alloc, "{range:?}");
        assert_eq!(range.offset + range.delta, offset, "{range:?}");
    }

    #[test]
    fn test_ranges_widen_to_atoms() {
        for &(offset, size) in &[(0, 4), (3, 10), (64, 64), (70, 100), (250, 6), (128, vk::WHOLE_SIZE)] {
            assert_covers(offset, size, 64, 256);
        }
        assert_covers(17, 1, 256, 1000);
    }

    #[test]
    fn test_unaligned_request() {
        let range = align_non_coherent_range(70, 20, 64, 1024);
        assert_eq!(range, AlignedRange { offset: 64, size: 64, delta: 6 });
    }

    #[test]
    fn test_whole_size_runs_to_end() {
        let range = align_non_coherent_range(100, vk::WHOLE_SIZE, 64, 300);
        assert_eq!(range, AlignedRange { offset: 64, size: 236, delta: 36 });
    }

    #[test]
    fn test_allocation_smaller_than_atom_clamps() {
        let range = align_non_coherent_range(4, 8, 256, 16);
        assert_eq!(range, AlignedRange { offset: 0, size: 16, delta: 4 });
    }

    #[test]
    fn test_coherent_atom_keeps_range() {
        let range = align_non_coherent_range(13, 7, 1, 64);
        assert_eq!(range, AlignedRange { offset: 13, size: 7, delta: 0 });
    }

    #[test]
    fn test_pointer_plus_delta_is_requested_offset() {
        let backing = [0_u8; 512];
        let base = backing.as_ptr() as usize;
        let range = align_non_coherent_range(200, 50, 64, 512);
        let mapped = base + range.offset as usize;

        assert_eq!(mapped + range.delta as usize, base + 200);
    }

    #[test]
    fn test_find_memory_type_respects_bits_and_flags() {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = 3;
        properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        properties.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        properties.memory_types[2].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&properties, 0b111, host), Some(2));
        assert_eq!(find_memory_type(&properties, 0b011, host), None);
        assert_eq!(
            find_memory_type(&properties, 0b110, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Some(1)
        );
    }
}
