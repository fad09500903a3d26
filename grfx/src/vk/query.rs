//! Query pools with a host-readable buffer that `resolve_query_data` copies results into.

use std::any::Any;
use std::sync::Arc;

use ash::vk;

use super::resource::VulkanBuffer;
use super::util::{self, vk_error};
use super::DeviceShared;
use crate::backend::{BufferApi, QueryApi};
use crate::buffer::BufferCreateInfo;
use crate::error::{GrfxError, Result};
use crate::query::{query_result_size, Query, QueryCreateInfo};
use crate::types::{BufferUsageFlags, MemoryUsage, QueryType};

/// Every counter, in the order D3D12 reports them.
const ALL_PIPELINE_STATISTICS: vk::QueryPipelineStatisticFlags = vk::QueryPipelineStatisticFlags::from_raw(0x7FF);

fn pipeline_statistics(query_type: QueryType) -> vk::QueryPipelineStatisticFlags {
    match query_type {
        QueryType::PipelineStatistics => ALL_PIPELINE_STATISTICS,
        _ => vk::QueryPipelineStatisticFlags::empty(),
    }
}

/// Occlusion queries count exact samples.
fn control_flags(query_type: QueryType) -> vk::QueryControlFlags {
    match query_type {
        QueryType::Occlusion => vk::QueryControlFlags::PRECISE,
        _ => vk::QueryControlFlags::empty(),
    }
}

#[derive(Debug)]
pub struct VulkanQuery {
    shared: Arc<DeviceShared>,
    pool: vk::QueryPool,
    query_type: QueryType,
    readback: VulkanBuffer,
}

impl VulkanQuery {
    pub fn new(shared: &Arc<DeviceShared>, info: &QueryCreateInfo) -> Result<Self> {
        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(util::query_type_to_vk(info.query_type))
            .query_count(info.count)
            .pipeline_statistics(pipeline_statistics(info.query_type));
        let pool =
            unsafe { shared.raw.create_query_pool(&create_info, None) }.map_err(|r| vk_error(r, "vkCreateQueryPool"))?;

        let size = info.count as u64 * query_result_size(info.query_type);
        let readback_info = BufferCreateInfo::new(size, BufferUsageFlags::TRANSFER_DST, MemoryUsage::GpuToCpu);
        let readback = match VulkanBuffer::new(shared, &readback_info) {
            Ok(readback) => readback,
            Err(e) => {
                unsafe { shared.raw.destroy_query_pool(pool, None) };
                return Err(e);
            }
        };
        // Queries start out unavailable; reset them before first use.
        shared.reset_query_pool(pool, 0, info.count);
        Ok(Self { shared: Arc::clone(shared), pool, query_type: info.query_type, readback })
    }

    pub fn pool(&self) -> vk::QueryPool {
        self.pool
    }

    pub fn readback(&self) -> vk::Buffer {
        self.readback.native()
    }

    pub fn result_size(&self) -> u64 {
        query_result_size(self.query_type)
    }

    pub fn control_flags(&self) -> vk::QueryControlFlags {
        control_flags(self.query_type)
    }
}

impl QueryApi for VulkanQuery {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reset(&self, first_query: u32, query_count: u32) -> Result<()> {
        let start = (first_query as u64 * self.result_size()) as usize;
        let end = start + (query_count as u64 * self.result_size()) as usize;
        let mut mapped = self.readback.map()?;
        let results = mapped.get_mut(start..end).ok_or(GrfxError::LimitExceeded)?;
        self.shared.reset_query_pool(self.pool, first_query, query_count);
        results.fill(0);
        Ok(())
    }

    fn get_data(&self, dst: &mut [u8]) -> Result<()> {
        let mapped = self.readback.map()?;
        let src = mapped.get(..dst.len()).ok_or(GrfxError::LimitExceeded)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl Drop for VulkanQuery {
    fn drop(&mut self) {
        unsafe { self.shared.raw.destroy_query_pool(self.pool, None) };
    }
}

pub(crate) fn query_of(query: &Query) -> Result<&VulkanQuery> {
    query.api().as_any().downcast_ref::<VulkanQuery>().ok_or(GrfxError::UnsupportedApi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCreateInfo;
    use crate::vk::testing;

    #[test]
    fn only_statistics_pools_count_pipeline_stages() {
        assert_eq!(pipeline_statistics(QueryType::PipelineStatistics).as_raw().count_ones(), 11);
        assert!(pipeline_statistics(QueryType::Timestamp).is_empty());
        assert_eq!(control_flags(QueryType::Occlusion), vk::QueryControlFlags::PRECISE);
        assert!(control_flags(QueryType::PipelineStatistics).is_empty());
    }

    #[test]
    fn reset_clears_the_readback_range() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let query = VulkanQuery::new(&shared, &QueryCreateInfo { query_type: QueryType::Occlusion, count: 4 }).unwrap();
        query.readback.map().unwrap().fill(0xFF);
        query.reset(1, 2).unwrap();

        let mut data = [0u8; 32];
        query.get_data(&mut data).unwrap();
        assert!(data[..8].iter().all(|b| *b == 0xFF));
        assert!(data[8..24].iter().all(|b| *b == 0));
        assert!(data[24..].iter().all(|b| *b == 0xFF));
        assert_eq!(query.reset(3, 2).err(), Some(GrfxError::LimitExceeded));
    }
}
