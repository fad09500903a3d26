//! DXGI factory, adapter enumeration and window surfaces.

use std::any::Any;
use std::ffi::c_void;

use raw_window_handle::RawWindowHandle;
use windows::core::Interface;
use windows::Win32::Foundation::{BOOL, HWND, RECT};
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::UI::WindowsAndMessaging::GetClientRect;

use super::device::Dx12Device;
use super::layout::{self, COMPUTE_QUEUE_COUNT, COPY_QUEUE_COUNT, GRAPHICS_QUEUE_COUNT};
use super::util::{hresult_error, Sendable};
use crate::backend::{DeviceApi, InstanceApi, SurfaceApi};
use crate::config::{DeviceCreateInfo, InstanceCreateInfo};
use crate::error::{GrfxError, Result};
use crate::instance::Gpu;
use crate::swapchain::{SurfaceCapabilities, SurfaceCreateInfo};
use crate::types::Api;

pub(crate) fn feature_level(api: Api) -> D3D_FEATURE_LEVEL {
    match api {
        Api::Dx12_1 => D3D_FEATURE_LEVEL_12_1,
        _ => D3D_FEATURE_LEVEL_12_0,
    }
}

fn enable_debug_layer() {
    let mut debug: Option<ID3D12Debug> = None;
    match unsafe { D3D12GetDebugInterface(&mut debug) } {
        Ok(()) => {
            if let Some(debug) = debug {
                unsafe { debug.EnableDebugLayer() };
                log::debug!("D3D12 debug layer enabled");
            }
        }
        Err(e) => log::warn!("D3D12 debug layer is not installed: {}", e),
    }
}

fn allows_tearing(factory: &IDXGIFactory4) -> bool {
    let Ok(factory) = factory.cast::<IDXGIFactory5>() else {
        return false;
    };
    let mut allow = BOOL(0);
    let supported = unsafe {
        factory.CheckFeatureSupport(
            DXGI_FEATURE_PRESENT_ALLOW_TEARING,
            &mut allow as *mut BOOL as *mut c_void,
            std::mem::size_of::<BOOL>() as u32,
        )
    };
    supported.is_ok() && allow.as_bool()
}

fn adapter_name(desc: &DXGI_ADAPTER_DESC1) -> String {
    let len = desc.Description.iter().take_while(|&&c| c != 0).count();
    String::from_utf16_lossy(&desc.Description[..len])
}

pub fn create_instance(info: &InstanceCreateInfo) -> Result<Box<dyn InstanceApi>> {
    Ok(Box::new(Dx12Instance::new(info)?))
}

#[derive(Debug)]
pub struct Dx12Instance {
    factory: Sendable<IDXGIFactory4>,
    api: Api,
    supports_tearing: bool,
    adapters: Vec<Sendable<IDXGIAdapter1>>,
    gpus: Vec<Gpu>,
}

impl Dx12Instance {
    /// Keeps the adapters matching the software-renderer preference that can create a device
    /// at the requested feature level.
    pub fn new(info: &InstanceCreateInfo) -> Result<Self> {
        if info.enable_debug {
            enable_debug_layer();
        }
        let flags = if info.enable_debug { DXGI_CREATE_FACTORY_DEBUG } else { DXGI_CREATE_FACTORY_FLAGS(0) };
        let factory: IDXGIFactory4 =
            unsafe { CreateDXGIFactory2(flags) }.map_err(|e| hresult_error(e, "CreateDXGIFactory2"))?;

        let level = feature_level(info.api);
        let mut adapters = Vec::new();
        let mut gpus = Vec::new();
        for index in 0.. {
            let Ok(adapter) = (unsafe { factory.EnumAdapters1(index) }) else {
                break;
            };
            let desc = unsafe { adapter.GetDesc1() }.map_err(|e| hresult_error(e, "IDXGIAdapter1::GetDesc1"))?;
            let software = desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0;
            if software != info.use_software_renderer {
                continue;
            }
            let name = adapter_name(&desc);
            // A null output only checks support.
            let no_device: *mut Option<ID3D12Device> = std::ptr::null_mut();
            if unsafe { D3D12CreateDevice(&adapter, level, no_device) }.is_err() {
                log::debug!("{} does not support {}", name, info.api.name());
                continue;
            }
            gpus.push(Gpu::new(
                info.api,
                name,
                desc.VendorId,
                desc.DeviceId,
                software,
                GRAPHICS_QUEUE_COUNT,
                COMPUTE_QUEUE_COUNT,
                COPY_QUEUE_COUNT,
            ));
            adapters.push(Sendable(adapter));
        }
        let supports_tearing = allows_tearing(&factory);
        Ok(Self { factory: Sendable(factory), api: info.api, supports_tearing, adapters, gpus })
    }

    pub fn native(&self) -> &IDXGIFactory4 {
        &self.factory
    }
}

impl InstanceApi for Dx12Instance {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn api(&self) -> Api {
        self.api
    }

    fn gpus(&self) -> &[Gpu] {
        &self.gpus
    }

    fn create_device(&self, gpu_index: usize, info: &DeviceCreateInfo) -> Result<Box<dyn DeviceApi>> {
        let adapter = self.adapters.get(gpu_index).ok_or(GrfxError::OutOfRange)?;
        let device = Dx12Device::new(&self.factory, adapter, self.api, info)?;
        log::debug!("D3D12 device created on {} at {:?}", self.gpus[gpu_index].name(), feature_level(self.api));
        Ok(Box::new(device))
    }

    fn create_surface(&self, info: &SurfaceCreateInfo) -> Result<Box<dyn SurfaceApi>> {
        Ok(Box::new(Dx12Surface::new(info, self.supports_tearing)?))
    }
}

/// A Win32 window. DXGI binds the swap chain to the window directly, so the surface only
/// remembers the handle.
#[derive(Debug)]
pub struct Dx12Surface {
    hwnd: isize,
    supports_tearing: bool,
}

impl Dx12Surface {
    fn new(info: &SurfaceCreateInfo, supports_tearing: bool) -> Result<Self> {
        match info.window_handle {
            RawWindowHandle::Win32(handle) => Ok(Self { hwnd: handle.hwnd.get(), supports_tearing }),
            other => {
                log::error!("{:?} is not a Win32 window", other);
                Err(GrfxError::UnexpectedNullArgument)
            }
        }
    }

    pub fn hwnd(&self) -> HWND {
        HWND(self.hwnd as *mut c_void)
    }

    pub fn supports_tearing(&self) -> bool {
        self.supports_tearing
    }
}

impl SurfaceApi for Dx12Surface {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn capabilities(&self) -> Result<SurfaceCapabilities> {
        let mut rect = RECT::default();
        unsafe { GetClientRect(self.hwnd(), &mut rect) }.map_err(|e| hresult_error(e, "GetClientRect"))?;
        let width = (rect.right - rect.left).max(0) as u32;
        let height = (rect.bottom - rect.top).max(0) as u32;
        Ok(layout::surface_capabilities(width, height, self.supports_tearing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs against whatever adapters are installed; machines without D3D12 skip it.
    #[test]
    fn enumerates_hardware_and_software_adapters_separately() {
        let Ok(hardware) = Dx12Instance::new(&InstanceCreateInfo::new(Api::Dx12_0)) else {
            return;
        };
        assert_eq!(hardware.gpus().len(), hardware.adapters.len());
        assert!(hardware.gpus().iter().all(|gpu| !gpu.is_software() && gpu.compute_queue_count() == 2));

        let info = InstanceCreateInfo { use_software_renderer: true, ..InstanceCreateInfo::new(Api::Dx12_0) };
        let Ok(software) = Dx12Instance::new(&info) else {
            return;
        };
        assert!(software.gpus().iter().all(Gpu::is_software));
    }

    #[test]
    fn feature_levels() {
        assert_eq!(feature_level(Api::Dx12_0), D3D_FEATURE_LEVEL_12_0);
        assert_eq!(feature_level(Api::Dx12_1), D3D_FEATURE_LEVEL_12_1);
    }
}
