//! Fences and semaphores, both backed by one `ID3D12Fence` each.

use std::any::Any;
use std::sync::Arc;

use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject};

use super::layout::timeout_ms;
use super::util::{hresult_error, Sendable};
use super::DeviceShared;
use crate::backend::{FenceApi, SemaphoreApi};
use crate::error::{GrfxError, Result};
use crate::sync::{Fence, Semaphore, SemaphoreCreateInfo};

/// An `ID3D12Fence` with the event its waits block on.
#[derive(Debug)]
pub struct NativeFence {
    fence: Sendable<ID3D12Fence>,
    event: Sendable<HANDLE>,
}

impl NativeFence {
    fn new(shared: &DeviceShared, initial_value: u64) -> Result<Self> {
        let fence: ID3D12Fence = unsafe { shared.device.CreateFence(initial_value, D3D12_FENCE_FLAG_NONE) }
            .map_err(|e| hresult_error(e, "ID3D12Device::CreateFence"))?;
        let event = unsafe { CreateEventW(None, false, false, None) }.map_err(|e| hresult_error(e, "CreateEventW"))?;
        Ok(Self { fence: Sendable(fence), event: Sendable(event) })
    }

    pub fn native(&self) -> &ID3D12Fence {
        &self.fence
    }

    pub fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    pub fn signal(&self, value: u64) -> Result<()> {
        unsafe { self.fence.Signal(value) }.map_err(|e| hresult_error(e, "ID3D12Fence::Signal"))
    }

    /// Blocks until the fence reaches `value` or the timeout passes.
    pub fn wait(&self, value: u64, timeout_ns: u64) -> Result<()> {
        if self.completed_value() >= value {
            return Ok(());
        }
        unsafe { self.fence.SetEventOnCompletion(value, *self.event) }
            .map_err(|e| hresult_error(e, "ID3D12Fence::SetEventOnCompletion"))?;
        match unsafe { WaitForSingleObject(*self.event, timeout_ms(timeout_ns)) } {
            WAIT_OBJECT_0 => Ok(()),
            WAIT_TIMEOUT => Err(GrfxError::WaitTimedOut),
            other => {
                log::error!("WaitForSingleObject returned {:?}", other);
                Err(GrfxError::ApiFailure)
            }
        }
    }
}

impl Drop for NativeFence {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(*self.event) } {
            log::warn!("CloseHandle failed for a fence event: {}", e);
        }
    }
}

#[derive(Debug)]
pub struct Dx12Fence {
    fence: NativeFence,
}

impl Dx12Fence {
    pub(crate) fn new(shared: &Arc<DeviceShared>) -> Result<Self> {
        Ok(Self { fence: NativeFence::new(shared, 0)? })
    }

    pub fn native(&self) -> &NativeFence {
        &self.fence
    }
}

impl FenceApi for Dx12Fence {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn wait(&self, value: u64, timeout_ns: u64) -> Result<()> {
        self.fence.wait(value, timeout_ns)
    }

    /// Values only grow, so there is nothing to reset.
    fn reset(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct Dx12Semaphore {
    fence: NativeFence,
}

impl Dx12Semaphore {
    pub(crate) fn new(shared: &Arc<DeviceShared>, info: &SemaphoreCreateInfo) -> Result<Self> {
        Ok(Self { fence: NativeFence::new(shared, info.initial_value)? })
    }

    pub fn native(&self) -> &NativeFence {
        &self.fence
    }
}

impl SemaphoreApi for Dx12Semaphore {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn timeline_signal(&self, value: u64) -> Result<()> {
        self.fence.signal(value)
    }

    fn timeline_wait(&self, value: u64, timeout_ns: u64) -> Result<()> {
        self.fence.wait(value, timeout_ns)
    }

    fn timeline_counter_value(&self) -> Result<u64> {
        Ok(self.fence.completed_value())
    }
}

pub(crate) fn native_fence(fence: &Fence) -> Result<&ID3D12Fence> {
    fence
        .api()
        .as_any()
        .downcast_ref::<Dx12Fence>()
        .map(|f| f.native().native())
        .ok_or(GrfxError::UnsupportedApi)
}

pub(crate) fn native_semaphore(semaphore: &Semaphore) -> Result<&ID3D12Fence> {
    semaphore
        .api()
        .as_any()
        .downcast_ref::<Dx12Semaphore>()
        .map(|s| s.native().native())
        .ok_or(GrfxError::UnsupportedApi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCreateInfo;
    use crate::dx12::testing;

    #[test]
    fn fence_wait_times_out_until_signaled() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let fence = Dx12Fence::new(&testing::shared(&instance, handle)).unwrap();
        assert_eq!(fence.wait(0, 0), Ok(()));
        assert_eq!(fence.wait(1, 1_000), Err(GrfxError::WaitTimedOut));
        fence.native().signal(1).unwrap();
        assert_eq!(fence.wait(1, 0), Ok(()));
        assert_eq!(fence.reset(), Ok(()));
        assert_eq!(fence.wait(1, 0), Ok(()));
    }

    #[test]
    fn timeline_starts_at_initial_value() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let semaphore = Dx12Semaphore::new(&shared, &SemaphoreCreateInfo::timeline(5)).unwrap();
        assert_eq!(semaphore.timeline_counter_value(), Ok(5));
        assert_eq!(semaphore.timeline_wait(6, 0), Err(GrfxError::WaitTimedOut));
        semaphore.timeline_signal(9).unwrap();
        assert_eq!(semaphore.timeline_wait(6, 0), Ok(()));
        assert_eq!(semaphore.timeline_counter_value(), Ok(9));
    }
}
