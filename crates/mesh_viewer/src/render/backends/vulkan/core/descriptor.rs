//! Descriptor set layouts, pools and batched descriptor writes

use std::sync::Arc;

use ash::vk;

use super::error::{VulkanError, VulkanResult};
use super::handle::{live_handles, zero_handles, DescriptorPool, DescriptorSetLayout};
use crate::render::backends::vulkan::initialization::device::LogicalDevice;

/// Descriptor set layout builder for creating reusable layouts
#[derive(Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, binding: u32, ty: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add a uniform buffer binding
    #[must_use]
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a combined image sampler binding
    #[must_use]
    pub fn combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    /// Add a uniform texel buffer binding
    #[must_use]
    pub fn uniform_texel_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_TEXEL_BUFFER, stage_flags)
    }

    /// Bindings collected so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Arc<LogicalDevice>) -> VulkanResult<DescriptorSetLayout> {
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);
        DescriptorSetLayout::create_with(device, |raw| unsafe { raw.create_descriptor_set_layout(&info, None) })
    }
}

/// Number of sets to allocate for `sets` output slots and `layouts` inputs
///
/// Fewer layouts than slots is rejected; surplus layouts are ignored with a
/// warning.
pub fn checked_set_count(sets: usize, layouts: usize) -> VulkanResult<usize> {
    if layouts < sets {
        return Err(VulkanError::validation(
            "descriptorPool",
            format!("{sets} descriptor sets requested but only {layouts} layouts supplied"),
        ));
    }
    if layouts > sets {
        log::warn!(
            "[descriptorPool] {} layouts supplied for {} sets; the extra layouts are ignored",
            layouts,
            sets
        );
    }
    Ok(sets)
}

impl DescriptorPool {
    /// Create a pool that allows freeing individual sets
    pub fn new(device: &Arc<LogicalDevice>, max_sets: u32, sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<Self> {
        let info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(sizes);
        Self::create_with(device, |raw| unsafe { raw.create_descriptor_pool(&info, None) })
    }

    /// Allocate one set per output slot, using `layouts` in order
    ///
    /// On failure nothing is allocated and `sets` is untouched.
    pub fn allocate_sets(&self, sets: &mut [vk::DescriptorSet], layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<()> {
        let count = checked_set_count(sets.len(), layouts.len())?;
        if count == 0 {
            return Ok(());
        }
        let device = self.device()?;

        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.handle())
            .set_layouts(&layouts[..count]);
        let allocated = unsafe { device.raw().allocate_descriptor_sets(&info) }
            .map_err(|code| VulkanError::native("descriptorPool", code))?;

        sets.copy_from_slice(&allocated[..count]);
        Ok(())
    }

    /// Return sets to the pool and null the freed slots
    pub fn free_sets(&self, sets: &mut [vk::DescriptorSet]) -> VulkanResult<()> {
        let live = live_handles(sets);
        if live.is_empty() {
            return Ok(());
        }
        let device = self.device()?;
        unsafe { device.raw().free_descriptor_sets(self.handle(), &live) }
            .map_err(|code| VulkanError::native("descriptorPool", code))?;
        zero_handles(sets);
        Ok(())
    }
}

#[derive(Debug)]
enum WritePayload {
    Images(Vec<vk::DescriptorImageInfo>),
    Buffers(Vec<vk::DescriptorBufferInfo>),
    TexelViews(Vec<vk::BufferView>),
}

#[derive(Debug)]
struct PendingWrite {
    set: vk::DescriptorSet,
    binding: u32,
    array_element: u32,
    ty: vk::DescriptorType,
    payload: WritePayload,
}

/// Batch of descriptor writes and copies applied in one native call
///
/// The batch owns every info struct, so the pointers handed to the driver
/// stay valid for the duration of [`DescriptorWrites::update`].
#[derive(Debug, Default)]
pub struct DescriptorWrites {
    writes: Vec<PendingWrite>,
    copies: Vec<vk::CopyDescriptorSet>,
}

impl DescriptorWrites {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Write image descriptors at (binding, array element)
    pub fn images(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        ty: vk::DescriptorType,
        infos: &[vk::DescriptorImageInfo],
    ) -> &mut Self {
        self.push(set, binding, array_element, ty, WritePayload::Images(infos.to_vec()))
    }

    /// Write buffer descriptors at (binding, array element)
    pub fn buffers(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        ty: vk::DescriptorType,
        infos: &[vk::DescriptorBufferInfo],
    ) -> &mut Self {
        self.push(set, binding, array_element, ty, WritePayload::Buffers(infos.to_vec()))
    }

    /// Write texel buffer view descriptors at (binding, array element)
    pub fn texel_buffers(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        ty: vk::DescriptorType,
        views: &[vk::BufferView],
    ) -> &mut Self {
        self.push(set, binding, array_element, ty, WritePayload::TexelViews(views.to_vec()))
    }

    /// Write a single whole-range uniform buffer
    pub fn uniform_buffer(&mut self, set: vk::DescriptorSet, binding: u32, buffer: vk::Buffer) -> &mut Self {
        let info = vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range: vk::WHOLE_SIZE,
        };
        self.buffers(set, binding, 0, vk::DescriptorType::UNIFORM_BUFFER, &[info])
    }

    /// Write a single combined image sampler in shader-read layout
    pub fn combined_image_sampler(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> &mut Self {
        let info = vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        self.images(set, binding, 0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, &[info])
    }

    /// Copy descriptors between sets
    pub fn copy(
        &mut self,
        src: (vk::DescriptorSet, u32, u32),
        dst: (vk::DescriptorSet, u32, u32),
        count: u32,
    ) -> &mut Self {
        self.copies.push(
            vk::CopyDescriptorSet::builder()
                .src_set(src.0)
                .src_binding(src.1)
                .src_array_element(src.2)
                .dst_set(dst.0)
                .dst_binding(dst.1)
                .dst_array_element(dst.2)
                .descriptor_count(count)
                .build(),
        );
        self
    }

    fn push(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        ty: vk::DescriptorType,
        payload: WritePayload,
    ) -> &mut Self {
        self.writes.push(PendingWrite {
            set,
            binding,
            array_element,
            ty,
            payload,
        });
        self
    }

    /// Number of queued writes
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Number of queued copies
    pub fn copy_count(&self) -> usize {
        self.copies.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.copies.is_empty()
    }

    /// Apply every queued write and copy in one call
    pub fn update(&self, device: &LogicalDevice) {
        if self.is_empty() {
            return;
        }
        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|write| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(write.set)
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element)
                    .descriptor_type(write.ty);
                match &write.payload {
                    WritePayload::Images(infos) => builder.image_info(infos).build(),
                    WritePayload::Buffers(infos) => builder.buffer_info(infos).build(),
                    WritePayload::TexelViews(views) => builder.texel_buffer_view(views).build(),
                }
            })
            .collect();

        log::trace!(
            "[descriptorSet] Updating {} write(s) and {} copy(ies)",
            writes.len(),
            self.copies.len()
        );
        unsafe { device.raw().update_descriptor_sets(&writes, &self.copies) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_fewer_layouts_than_sets_is_rejected() {
        let err = checked_set_count(3, 2).unwrap_err();
        assert_eq!(err.code(), crate::render::backends::vulkan::RESULT_MAX);
    }

    #[test]
    fn test_extra_layouts_allocate_exactly_requested() {
        assert_eq!(checked_set_count(2, 5).unwrap(), 2);
        assert_eq!(checked_set_count(4, 4).unwrap(), 4);
    }

    #[test]
    fn test_rejected_allocation_leaves_slots_untouched() {
        let pool = DescriptorPool::empty();
        let layout = vk::DescriptorSetLayout::from_raw(0x42);
        let mut sets = [vk::DescriptorSet::null(); 3];

        let err = pool.allocate_sets(&mut sets, &[layout, layout]).unwrap_err();
        assert!(matches!(err, VulkanError::Validation { .. }));
        assert!(sets.iter().all(|set| *set == vk::DescriptorSet::null()));
    }

    #[test]
    fn test_freeing_null_sets_is_a_no_op() {
        let pool = DescriptorPool::empty();
        let mut sets = [vk::DescriptorSet::null(); 2];
        assert!(pool.free_sets(&mut sets).is_ok());
    }

    #[test]
    fn test_batch_counts_writes_and_copies() {
        let set = vk::DescriptorSet::from_raw(1);
        let other = vk::DescriptorSet::from_raw(2);
        let mut batch = DescriptorWrites::new();
        assert!(batch.is_empty());

        batch
            .uniform_buffer(set, 0, vk::Buffer::from_raw(3))
            .uniform_buffer(set, 1, vk::Buffer::from_raw(4))
            .combined_image_sampler(set, 2, vk::ImageView::from_raw(5), vk::Sampler::from_raw(6))
            .copy((set, 0, 0), (other, 0, 0), 1);

        assert_eq!(batch.write_count(), 3);
        assert_eq!(batch.copy_count(), 1);
    }

    #[test]
    fn test_layout_builder_collects_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .uniform_buffer(1, vk::ShaderStageFlags::FRAGMENT)
            .combined_image_sampler(2, vk::ShaderStageFlags::FRAGMENT);

        let types: Vec<_> = builder.bindings().iter().map(|b| b.descriptor_type).collect();
        assert_eq!(
            types,
            [
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            ]
        );
    }
}
