//! DXGI flip-model swap chains.
//!
//! Acquire blocks on the frame-latency waitable object, then signals the caller's semaphore and
//! fence from the queue: back buffers are usable as soon as the wait returns.

use std::any::Any;
use std::sync::Arc;

use windows::core::Interface;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::WaitForSingleObject;

use super::instance::Dx12Surface;
use super::layout::{self, timeout_ms};
use super::queue::Dx12Queue;
use super::resource::Dx12Image;
use super::util::{self, hresult_error, Sendable};
use super::DeviceShared;
use crate::backend::{ImageApi, SwapchainApi};
use crate::error::{GrfxError, Result};
use crate::queue::Queue;
use crate::swapchain::SwapchainCreateInfo;
use crate::sync::{Fence, Semaphore};
use crate::D3D12_FRAME_LATENCY;

#[derive(Debug)]
pub struct Dx12Swapchain {
    _shared: Arc<DeviceShared>,
    swap_chain: Sendable<IDXGISwapChain3>,
    waitable: Sendable<HANDLE>,
    image_count: u32,
    sync_interval: u32,
    present_flags: DXGI_PRESENT,
    flags: DXGI_SWAP_CHAIN_FLAG,
}

fn native_queue(queue: &Queue) -> Result<&ID3D12CommandQueue> {
    queue.api().as_any().downcast_ref::<Dx12Queue>().map(Dx12Queue::native).ok_or(GrfxError::UnsupportedApi)
}

fn swap_chain_flags(tearing: bool) -> DXGI_SWAP_CHAIN_FLAG {
    let mut flags = DXGI_SWAP_CHAIN_FLAG_FRAME_LATENCY_WAITABLE_OBJECT.0;
    if tearing {
        flags |= DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0;
    }
    DXGI_SWAP_CHAIN_FLAG(flags)
}

impl Dx12Swapchain {
    pub(crate) fn new(shared: &Arc<DeviceShared>, queue: &Queue, info: &SwapchainCreateInfo) -> Result<Self> {
        let surface = info.surface.as_ref().ok_or(GrfxError::UnexpectedNullArgument)?;
        let window = surface.native().as_any().downcast_ref::<Dx12Surface>().ok_or(GrfxError::UnsupportedApi)?;
        if !layout::is_swapchain_format(info.color_format) {
            log::error!("{:?} cannot back a DXGI swap chain", info.color_format);
            return Err(GrfxError::UnsupportedSwapchainFormat);
        }
        let (sync_interval, tearing) = layout::present_params(info.present_mode, surface.supports_tearing())?;
        let flags = swap_chain_flags(tearing);
        let present_flags = if tearing { DXGI_PRESENT_ALLOW_TEARING } else { DXGI_PRESENT(0) };

        let image_count = surface.clamp_image_count(info.image_count).max(2);
        let desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: info.width,
            Height: info.height,
            Format: util::format_to_dxgi(info.color_format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: image_count,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            Flags: flags.0 as u32,
            ..Default::default()
        };
        let swap_chain1 =
            unsafe { shared.factory.CreateSwapChainForHwnd(native_queue(queue)?, window.hwnd(), &desc, None, None) }
                .map_err(|e| hresult_error(e, "IDXGIFactory2::CreateSwapChainForHwnd"))?;
        let swap_chain: IDXGISwapChain3 =
            swap_chain1.cast().map_err(|e| hresult_error(e, "IDXGISwapChain1::QueryInterface"))?;
        unsafe { swap_chain.SetMaximumFrameLatency(D3D12_FRAME_LATENCY) }
            .map_err(|e| hresult_error(e, "IDXGISwapChain2::SetMaximumFrameLatency"))?;
        let waitable = unsafe { swap_chain.GetFrameLatencyWaitableObject() };

        log::debug!(
            "DXGI swap chain: {} buffers, sync interval {}, tearing {}",
            image_count,
            sync_interval,
            tearing
        );
        Ok(Self {
            _shared: Arc::clone(shared),
            swap_chain: Sendable(swap_chain),
            waitable: Sendable(waitable),
            image_count,
            sync_interval,
            present_flags,
            flags,
        })
    }

    pub fn native(&self) -> &IDXGISwapChain3 {
        &self.swap_chain
    }
}

impl Drop for Dx12Swapchain {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(*self.waitable) } {
            log::warn!("CloseHandle failed for a frame latency waitable: {}", e);
        }
    }
}

impl SwapchainApi for Dx12Swapchain {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn color_images(&mut self) -> Result<Vec<Box<dyn ImageApi>>> {
        (0..self.image_count)
            .map(|i| {
                let buffer: ID3D12Resource = unsafe { self.swap_chain.GetBuffer(i) }
                    .map_err(|e| hresult_error(e, "IDXGISwapChain::GetBuffer"))?;
                Ok(Box::new(Dx12Image::from_resource(buffer)) as Box<dyn ImageApi>)
            })
            .collect()
    }

    fn acquire_next_image(
        &mut self,
        timeout_ns: u64,
        queue: &Queue,
        semaphore: Option<&Semaphore>,
        fence: Option<&Fence>,
    ) -> Result<u32> {
        match unsafe { WaitForSingleObject(*self.waitable, timeout_ms(timeout_ns)) } {
            WAIT_OBJECT_0 => {}
            WAIT_TIMEOUT => return Err(GrfxError::WaitTimedOut),
            other => {
                log::error!("frame latency wait returned {:?}", other);
                return Err(GrfxError::WaitFailed);
            }
        }
        let image_index = unsafe { self.swap_chain.GetCurrentBackBufferIndex() };
        if let Some(semaphore) = semaphore {
            queue.api().queue_signal(semaphore, semaphore.next_signal_value())?;
        }
        if let Some(fence) = fence {
            queue.api().signal_fence(fence, fence.next_signal_value())?;
        }
        Ok(image_index)
    }

    fn present(&mut self, queue: &Queue, _image_index: u32, wait_semaphores: &[&Semaphore]) -> Result<()> {
        for semaphore in wait_semaphores {
            queue.api().queue_wait(semaphore, semaphore.wait_for_value())?;
        }
        unsafe { self.swap_chain.Present(self.sync_interval, self.present_flags) }
            .ok()
            .map_err(|e| hresult_error(e, "IDXGISwapChain::Present"))
    }

    /// Keeps the buffer count and recreates the back buffers at the new size. Callers drop
    /// every back buffer reference first.
    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe { self.swap_chain.ResizeBuffers(0, width, height, DXGI_FORMAT_UNKNOWN, self.flags) }
            .map_err(|e| hresult_error(e, "IDXGISwapChain::ResizeBuffers"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tearing_adds_its_swap_chain_flag() {
        assert_eq!(swap_chain_flags(false), DXGI_SWAP_CHAIN_FLAG_FRAME_LATENCY_WAITABLE_OBJECT);
        assert_eq!(
            swap_chain_flags(true).0,
            DXGI_SWAP_CHAIN_FLAG_FRAME_LATENCY_WAITABLE_OBJECT.0 | DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0
        );
    }
}
