//! Query pools: occlusion, pipeline statistics and timestamps.

use crate::backend::QueryApi;
use crate::error::{GrfxError, Result};
use crate::types::QueryType;

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryCreateInfo {
    pub query_type: QueryType,
    pub count: u32,
}

/// Result size of one query, in bytes.
pub fn query_result_size(query_type: QueryType) -> u64 {
    match query_type {
        QueryType::Occlusion | QueryType::Timestamp => 8,
        // Eleven u64 counters, the D3D12_QUERY_DATA_PIPELINE_STATISTICS layout.
        QueryType::PipelineStatistics => 11 * 8,
    }
}

#[derive(Debug)]
pub struct Query {
    create_info: QueryCreateInfo,
    api: Box<dyn QueryApi>,
}

impl Query {
    pub(crate) fn new(create_info: QueryCreateInfo, api: Box<dyn QueryApi>) -> Self {
        Self { create_info, api }
    }

    pub fn query_type(&self) -> QueryType {
        self.create_info.query_type
    }

    pub fn count(&self) -> u32 {
        self.create_info.count
    }

    pub fn result_size(&self) -> u64 {
        query_result_size(self.create_info.query_type)
    }

    pub fn reset(&self, first_query: u32, query_count: u32) -> Result<()> {
        if first_query.saturating_add(query_count) > self.count() {
            return Err(GrfxError::OutOfRange);
        }
        self.api.reset(first_query, query_count)
    }

    /// Reads resolved results; `dst` holds at most `count * result_size` bytes.
    pub fn get_data(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() as u64 > self.count() as u64 * self.result_size() {
            return Err(GrfxError::LimitExceeded);
        }
        self.api.get_data(dst)
    }

    pub fn api(&self) -> &dyn QueryApi {
        self.api.as_ref()
    }
}
