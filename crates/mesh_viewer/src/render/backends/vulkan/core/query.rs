//! Query pools for timestamps, occlusion and pipeline statistics

use std::sync::Arc;

use ash::vk;

use super::commands::CommandBuffer;
use super::error::{VulkanError, VulkanResult};
use super::handle::QueryPool;
use crate::render::backends::vulkan::initialization::device::LogicalDevice;

/// Host readback of a query range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResults {
    /// Every requested result, one 64-bit value per query
    Available(Vec<u64>),
    /// At least one query has not completed yet; try again later
    NotReady,
}

impl QueryPool {
    /// Create a pool of `count` queries
    pub fn new(
        device: &Arc<LogicalDevice>,
        query_type: vk::QueryType,
        count: u32,
        statistics: vk::QueryPipelineStatisticFlags,
    ) -> VulkanResult<Self> {
        let info = vk::QueryPoolCreateInfo::builder()
            .query_type(query_type)
            .query_count(count)
            .pipeline_statistics(statistics);
        Self::create_with(device, |raw| unsafe { raw.create_query_pool(&info, None) })
    }

    /// Record a reset of `count` queries starting at `first`
    pub fn cmd_reset(&self, cmd: &CommandBuffer, first: u32, count: u32) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe { device.raw().cmd_reset_query_pool(cmd.raw(), self.handle(), first, count) };
        Ok(())
    }

    /// Record the start of a query
    pub fn cmd_begin(&self, cmd: &CommandBuffer, query: u32, flags: vk::QueryControlFlags) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe { device.raw().cmd_begin_query(cmd.raw(), self.handle(), query, flags) };
        Ok(())
    }

    /// Record the end of a query
    pub fn cmd_end(&self, cmd: &CommandBuffer, query: u32) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe { device.raw().cmd_end_query(cmd.raw(), self.handle(), query) };
        Ok(())
    }

    /// Record a timestamp write once `stage` completes
    pub fn cmd_write_timestamp(&self, cmd: &CommandBuffer, stage: vk::PipelineStageFlags, query: u32) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe { device.raw().cmd_write_timestamp(cmd.raw(), stage, self.handle(), query) };
        Ok(())
    }

    /// Record a copy of results into a buffer
    pub fn cmd_copy_results(
        &self,
        cmd: &CommandBuffer,
        first: u32,
        count: u32,
        dst: vk::Buffer,
        dst_offset: vk::DeviceSize,
        stride: vk::DeviceSize,
        flags: vk::QueryResultFlags,
    ) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe {
            device.raw().cmd_copy_query_pool_results(
                cmd.raw(),
                self.handle(),
                first,
                count,
                dst,
                dst_offset,
                stride,
                flags,
            );
        }
        Ok(())
    }

    /// Read results on the host without waiting
    ///
    /// Results are always read as 64-bit values. A range that has not
    /// completed yet yields [`QueryResults::NotReady`] instead of an error.
    pub fn get_results(&self, first: u32, count: u32, flags: vk::QueryResultFlags) -> VulkanResult<QueryResults> {
        let device = self.device()?;
        let mut data = vec![0_u64; count as usize];
        let flags = (flags | vk::QueryResultFlags::TYPE_64) & !vk::QueryResultFlags::WAIT;

        match unsafe { device.raw().get_query_pool_results(self.handle(), first, count, &mut data, flags) } {
            Ok(()) => Ok(QueryResults::Available(data)),
            Err(vk::Result::NOT_READY) => {
                log::trace!("[queryPool] Results {}..{} not ready", first, first + count);
                Ok(QueryResults::NotReady)
            }
            Err(code) => Err(VulkanError::native("queryPool", code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_rejects_readback() {
        let pool = QueryPool::empty();
        assert!(pool.get_results(0, 4, vk::QueryResultFlags::empty()).is_err());
    }
}
