use std::any::Any;
use std::sync::Arc;

use windows::core::Interface;
use windows::Win32::Graphics::Direct3D12::*;

use super::command::Dx12CommandBuffer;
use super::sync::{native_fence, native_semaphore};
use super::util::{self, hresult_error, Sendable};
use super::DeviceShared;
use crate::backend::QueueApi;
use crate::error::{GrfxError, Result};
use crate::queue::{Queue, SubmitBatch};
use crate::sync::{Fence, Semaphore};
use crate::types::CommandType;

#[derive(Debug)]
pub struct Dx12Queue {
    queue: Sendable<ID3D12CommandQueue>,
    command_type: CommandType,
}

impl Dx12Queue {
    pub(crate) fn new(shared: &Arc<DeviceShared>, command_type: CommandType) -> Result<Self> {
        let desc = D3D12_COMMAND_QUEUE_DESC { Type: util::command_list_type(command_type)?, ..Default::default() };
        let queue: ID3D12CommandQueue = unsafe { shared.device.CreateCommandQueue(&desc) }
            .map_err(|e| hresult_error(e, "ID3D12Device::CreateCommandQueue"))?;
        Ok(Self { queue: Sendable(queue), command_type })
    }

    pub fn native(&self) -> &ID3D12CommandQueue {
        &self.queue
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    fn wait(&self, fence: &ID3D12Fence, value: u64) -> Result<()> {
        unsafe { self.queue.Wait(fence, value) }.map_err(|e| hresult_error(e, "ID3D12CommandQueue::Wait"))
    }

    fn signal(&self, fence: &ID3D12Fence, value: u64) -> Result<()> {
        unsafe { self.queue.Signal(fence, value) }.map_err(|e| hresult_error(e, "ID3D12CommandQueue::Signal"))
    }
}

impl QueueApi for Dx12Queue {
    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Waits, then lists, then signals, then the fence; all in queue order.
    fn submit(&self, batch: &SubmitBatch<'_>) -> Result<()> {
        for (semaphore, value) in &batch.waits {
            self.wait(native_semaphore(semaphore)?, *value)?;
        }

        if !batch.command_buffers.is_empty() {
            let lists = batch
                .command_buffers
                .iter()
                .map(|cmd| {
                    let list = cmd
                        .api()
                        .as_any()
                        .downcast_ref::<Dx12CommandBuffer>()
                        .ok_or(GrfxError::UnsupportedApi)?
                        .list();
                    list.cast::<ID3D12CommandList>()
                        .map(Some)
                        .map_err(|e| hresult_error(e, "ID3D12GraphicsCommandList::QueryInterface"))
                })
                .collect::<Result<Vec<_>>>()?;
            unsafe { self.queue.ExecuteCommandLists(&lists) };
        }

        for (semaphore, value) in &batch.signals {
            self.signal(native_semaphore(semaphore)?, *value)?;
        }
        if let Some((fence, value)) = batch.fence {
            self.signal_fence(fence, value)?;
        }
        Ok(())
    }

    fn queue_wait(&self, semaphore: &Semaphore, value: u64) -> Result<()> {
        self.wait(native_semaphore(semaphore)?, value)
    }

    fn queue_signal(&self, semaphore: &Semaphore, value: u64) -> Result<()> {
        self.signal(native_semaphore(semaphore)?, value)
    }

    fn signal_fence(&self, fence: &Fence, value: u64) -> Result<()> {
        self.signal(native_fence(fence)?, value)
    }

    fn timestamp_frequency(&self) -> Result<u64> {
        unsafe { self.queue.GetTimestampFrequency() }
            .map_err(|e| hresult_error(e, "ID3D12CommandQueue::GetTimestampFrequency"))
    }
}

pub(crate) fn native_queue(queue: &Queue) -> Result<&Dx12Queue> {
    queue.api().as_any().downcast_ref::<Dx12Queue>().ok_or(GrfxError::UnsupportedApi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCreateInfo;
    use crate::dx12::sync::Dx12Semaphore;
    use crate::dx12::testing;
    use crate::backend::SemaphoreApi;
    use crate::sync::SemaphoreCreateInfo;

    #[test]
    fn queue_signals_reach_the_timeline() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let queue = Dx12Queue::new(&shared, CommandType::Compute).unwrap();
        let semaphore = Dx12Semaphore::new(&shared, &SemaphoreCreateInfo::timeline(0)).unwrap();
        queue.signal(semaphore.native().native(), 3).unwrap();
        semaphore.timeline_wait(3, u64::MAX).unwrap();
        assert_eq!(semaphore.timeline_counter_value(), Ok(3));
        assert!(queue.timestamp_frequency().unwrap() > 0);
    }
}
