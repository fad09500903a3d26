//! Query heaps with a readback buffer that `resolve_query_data` lands in.

use std::any::Any;
use std::sync::Arc;

use windows::Win32::Graphics::Direct3D12::*;

use super::resource::Dx12Buffer;
use super::util::{self, hresult_error, Sendable};
use super::DeviceShared;
use crate::backend::{BufferApi, QueryApi};
use crate::buffer::BufferCreateInfo;
use crate::error::{GrfxError, Result};
use crate::query::{query_result_size, Query, QueryCreateInfo};
use crate::types::{BufferUsageFlags, MemoryUsage};

#[derive(Debug)]
pub struct Dx12Query {
    heap: Sendable<ID3D12QueryHeap>,
    query_type: D3D12_QUERY_TYPE,
    result_size: u64,
    readback: Dx12Buffer,
}

impl Dx12Query {
    pub(crate) fn new(shared: &Arc<DeviceShared>, info: &QueryCreateInfo) -> Result<Self> {
        if info.count == 0 {
            log::error!("query heaps need at least one query");
            return Err(GrfxError::InvalidCreateArgument);
        }
        let (heap_type, query_type) = util::query_type_to_d3d12(info.query_type);
        let desc = D3D12_QUERY_HEAP_DESC { Type: heap_type, Count: info.count, NodeMask: 0 };
        let mut heap: Option<ID3D12QueryHeap> = None;
        unsafe { shared.device.CreateQueryHeap(&desc, &mut heap) }
            .map_err(|e| hresult_error(e, "ID3D12Device::CreateQueryHeap"))?;
        let heap = heap.ok_or(GrfxError::ApiFailure)?;

        let result_size = query_result_size(info.query_type);
        let readback_info = BufferCreateInfo::new(
            u64::from(info.count) * result_size,
            BufferUsageFlags::TRANSFER_DST,
            MemoryUsage::GpuToCpu,
        );
        let readback = Dx12Buffer::new(shared, &readback_info)?;
        Ok(Self { heap: Sendable(heap), query_type, result_size, readback })
    }

    pub fn heap(&self) -> &ID3D12QueryHeap {
        &self.heap
    }

    pub fn query_type(&self) -> D3D12_QUERY_TYPE {
        self.query_type
    }

    pub fn readback(&self) -> &Dx12Buffer {
        &self.readback
    }

    pub fn result_size(&self) -> u64 {
        self.result_size
    }
}

impl QueryApi for Dx12Query {
    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Query heaps need no reset; the resolved range is zeroed so stale results do not leak.
    fn reset(&self, first_query: u32, query_count: u32) -> Result<()> {
        let start = (u64::from(first_query) * self.result_size) as usize;
        let len = (u64::from(query_count) * self.result_size) as usize;
        let mut memory = self.readback.map()?;
        memory.get_mut(start..start + len).ok_or(GrfxError::OutOfRange)?.fill(0);
        Ok(())
    }

    fn get_data(&self, dst: &mut [u8]) -> Result<()> {
        let memory = self.readback.map()?;
        dst.copy_from_slice(memory.get(..dst.len()).ok_or(GrfxError::OutOfRange)?);
        Ok(())
    }
}

pub(crate) fn query_of(query: &Query) -> Result<&Dx12Query> {
    query.api().as_any().downcast_ref::<Dx12Query>().ok_or(GrfxError::UnsupportedApi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCreateInfo;
    use crate::dx12::testing;
    use crate::types::QueryType;

    #[test]
    fn readback_is_sized_per_result() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let info = QueryCreateInfo { query_type: QueryType::PipelineStatistics, count: 2 };
        let query = Dx12Query::new(&shared, &info).unwrap();
        assert_eq!(query.readback().size(), 2 * 11 * 8);
        assert_eq!(query.query_type(), D3D12_QUERY_TYPE_PIPELINE_STATISTICS);

        query.readback().map().unwrap()[..8].copy_from_slice(&[0xAB; 8]);
        query.reset(0, 1).unwrap();
        let mut out = [0xFFu8; 8];
        query.get_data(&mut out).unwrap();
        assert_eq!(out, [0; 8]);
    }

    #[test]
    fn zero_count_heaps_are_rejected() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let info = QueryCreateInfo { query_type: QueryType::Timestamp, count: 0 };
        assert_eq!(Dx12Query::new(&shared, &info).err(), Some(GrfxError::InvalidCreateArgument));
    }
}
