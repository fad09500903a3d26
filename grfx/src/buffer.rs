//! GPU buffers.

use crate::backend::BufferApi;
use crate::error::{GrfxError, Result};
use crate::memory::MappedMemory;
use crate::types::{BufferUsageFlags, MemoryUsage, ResourceState};
use crate::MINIMUM_UNIFORM_BUFFER_SIZE;

#[derive(Debug, Clone)]
pub struct BufferCreateInfo {
    pub size: u64,
    /// Element stride of HLSL `StructuredBuffer<>` views; zero otherwise.
    pub structured_element_stride: u32,
    pub usage_flags: BufferUsageFlags,
    pub memory_usage: MemoryUsage,
    pub initial_state: ResourceState,
}

impl Default for BufferCreateInfo {
    fn default() -> Self {
        Self {
            size: 0,
            structured_element_stride: 0,
            usage_flags: BufferUsageFlags::empty(),
            memory_usage: MemoryUsage::GpuOnly,
            initial_state: ResourceState::General,
        }
    }
}

impl BufferCreateInfo {
    pub fn new(size: u64, usage_flags: BufferUsageFlags, memory_usage: MemoryUsage) -> Self {
        Self { size, usage_flags, memory_usage, ..Default::default() }
    }

    /// Host-visible upload buffer.
    pub fn staging(size: u64) -> Self {
        Self::new(size, BufferUsageFlags::TRANSFER_SRC, MemoryUsage::CpuToGpu)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(GrfxError::InvalidCreateArgument);
        }
        if self.usage_flags.contains(BufferUsageFlags::UNIFORM_BUFFER) && self.size < MINIMUM_UNIFORM_BUFFER_SIZE {
            log::error!(
                "uniform buffer of {} bytes is below the minimum of {} bytes",
                self.size,
                MINIMUM_UNIFORM_BUFFER_SIZE
            );
            return Err(GrfxError::MinimumBufferSizeNotMet);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Buffer {
    create_info: BufferCreateInfo,
    api: Box<dyn BufferApi>,
}

impl Buffer {
    pub(crate) fn new(create_info: BufferCreateInfo, api: Box<dyn BufferApi>) -> Self {
        Self { create_info, api }
    }

    pub fn create_info(&self) -> &BufferCreateInfo {
        &self.create_info
    }

    pub fn size(&self) -> u64 {
        self.create_info.size
    }

    pub fn structured_element_stride(&self) -> u32 {
        self.create_info.structured_element_stride
    }

    pub fn usage_flags(&self) -> BufferUsageFlags {
        self.create_info.usage_flags
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        self.create_info.memory_usage
    }

    pub fn api(&self) -> &dyn BufferApi {
        self.api.as_ref()
    }

    pub fn map(&self) -> Result<MappedMemory<'_>> {
        self.api.map()
    }

    /// Copies `data` to the start of the buffer through a mapping.
    pub fn copy_from_source(&self, data: &[u8]) -> Result<()> {
        if data.len() as u64 > self.size() {
            return Err(GrfxError::LimitExceeded);
        }
        let mut mapped = self.map()?;
        mapped[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copies the start of the buffer into `out` through a mapping.
    pub fn copy_to_dest(&self, out: &mut [u8]) -> Result<()> {
        if out.len() as u64 > self.size() {
            return Err(GrfxError::LimitExceeded);
        }
        let mapped = self.map()?;
        out.copy_from_slice(&mapped[..out.len()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_buffers_have_a_minimum_size() {
        let info = BufferCreateInfo::new(64, BufferUsageFlags::UNIFORM_BUFFER, MemoryUsage::CpuToGpu);
        assert_eq!(info.validate(), Err(GrfxError::MinimumBufferSizeNotMet));
        let info = BufferCreateInfo::new(256, BufferUsageFlags::UNIFORM_BUFFER, MemoryUsage::CpuToGpu);
        assert!(info.validate().is_ok());
        let info = BufferCreateInfo::new(64, BufferUsageFlags::VERTEX_BUFFER, MemoryUsage::CpuToGpu);
        assert!(info.validate().is_ok());
    }

    #[test]
    fn empty_buffers_are_rejected() {
        assert_eq!(BufferCreateInfo::default().validate(), Err(GrfxError::InvalidCreateArgument));
    }
}
