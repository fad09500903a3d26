//! Buffers, images, samplers and image views.
//!
//! Buffers and images are placed resources in heaps handed out by `gpu_allocator`.

use std::any::Any;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use gpu_allocator::d3d12::{Allocation, AllocationCreateDesc};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use super::descriptor_helper::{DescriptorHandle, SharedHandleManager};
use super::layout;
use super::util::{self, hresult_error, Sendable};
use super::DeviceShared;
use crate::backend::{BufferApi, ImageApi, ImageViewApi, SamplerApi};
use crate::buffer::{Buffer, BufferCreateInfo};
use crate::error::{GrfxError, Result};
use crate::format::Format;
use crate::image::{Image, ImageCreateInfo, SamplerCreateInfo, ViewRange};
use crate::memory::{map_host, memory_location, HostPointer, MappedMemory};
use crate::types::{BufferUsageFlags, CommandType, ImageType, ImageUsageFlags, ImageViewType, MemoryUsage};
use crate::CONSTANT_BUFFER_ALIGNMENT;

/// Allocator memory under a placed resource. Owners declare it after the resource so the
/// resource is released before its memory goes back to the allocator.
#[derive(Debug)]
struct Placement {
    shared: Arc<DeviceShared>,
    allocation: Option<Sendable<Allocation>>,
}

impl Placement {
    fn size(&self) -> u64 {
        self.allocation.as_ref().map_or(0, |a| a.size())
    }
}

impl Drop for Placement {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.shared.free(allocation.0);
        }
    }
}

fn create_placed(
    shared: &Arc<DeviceShared>,
    desc: &D3D12_RESOURCE_DESC,
    name: &str,
    location: MemoryLocation,
    state: D3D12_RESOURCE_STATES,
    clear_value: Option<&D3D12_CLEAR_VALUE>,
) -> Result<(ID3D12Resource, Placement)> {
    let allocation = shared.allocate(&AllocationCreateDesc::from_d3d12_resource_desc(&shared.device, desc, name, location))?;
    let mut resource: Option<ID3D12Resource> = None;
    let created = unsafe {
        shared.device.CreatePlacedResource(
            allocation.heap(),
            allocation.offset(),
            desc,
            state,
            clear_value.map(|c| c as *const D3D12_CLEAR_VALUE),
            &mut resource,
        )
    }
    .map_err(|e| hresult_error(e, "ID3D12Device::CreatePlacedResource"))
    .and_then(|()| resource.ok_or(GrfxError::ApiFailure));
    match created {
        Ok(resource) => Ok((resource, Placement { shared: Arc::clone(shared), allocation: Some(Sendable(allocation)) })),
        Err(e) => {
            shared.free(allocation);
            Err(e)
        }
    }
}

#[derive(Debug)]
pub struct Dx12Buffer {
    resource: Sendable<ID3D12Resource>,
    size: u64,
    host: Mutex<Option<HostPointer>>,
    placement: Placement,
}

impl Dx12Buffer {
    pub(crate) fn new(shared: &Arc<DeviceShared>, info: &BufferCreateInfo) -> Result<Self> {
        let mut size = info.size;
        if info.usage_flags.contains(BufferUsageFlags::UNIFORM_BUFFER) {
            size = size.div_ceil(CONSTANT_BUFFER_ALIGNMENT) * CONSTANT_BUFFER_ALIGNMENT;
        }
        let mut flags = D3D12_RESOURCE_FLAG_NONE;
        if info.usage_flags.intersects(
            BufferUsageFlags::STORAGE_TEXEL_BUFFER
                | BufferUsageFlags::RAW_STORAGE_BUFFER
                | BufferUsageFlags::RW_STRUCTURED_BUFFER,
        ) {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
        }
        let desc = util::buffer_desc(size, flags);
        let state = D3D12_RESOURCE_STATES(layout::buffer_initial_state(info.memory_usage, info.initial_state).bits());
        let (resource, placement) =
            create_placed(shared, &desc, "grfx buffer", memory_location(info.memory_usage), state, None)?;

        // Host-visible buffers stay persistently mapped; only the requested size is exposed.
        let host = if info.memory_usage == MemoryUsage::GpuOnly {
            None
        } else {
            let mut ptr: *mut c_void = std::ptr::null_mut();
            unsafe { resource.Map(0, None, Some(&mut ptr)) }.map_err(|e| hresult_error(e, "ID3D12Resource::Map"))?;
            NonNull::new(ptr.cast::<u8>()).map(|ptr| unsafe { HostPointer::new(ptr, info.size as usize) })
        };
        log::trace!("D3D12 buffer {} bytes, usage {:?}, {:?}", size, info.usage_flags, info.memory_usage);
        Ok(Self { resource: Sendable(resource), size, host: Mutex::new(host), placement })
    }

    pub fn native(&self) -> &ID3D12Resource {
        &self.resource
    }

    pub fn gpu_virtual_address(&self) -> u64 {
        unsafe { self.resource.GetGPUVirtualAddress() }
    }

    /// Size of the native resource, after constant buffer alignment.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn allocation_size(&self) -> u64 {
        self.placement.size()
    }
}

impl BufferApi for Dx12Buffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn map(&self) -> Result<MappedMemory<'_>> {
        map_host(&self.host)
    }
}

/// Sampled depth images are created typeless so both the DSV and the SRV format can view them.
fn typeless_depth_format(format: DXGI_FORMAT) -> DXGI_FORMAT {
    match format {
        DXGI_FORMAT_D16_UNORM => DXGI_FORMAT_R16_TYPELESS,
        DXGI_FORMAT_D32_FLOAT => DXGI_FORMAT_R32_TYPELESS,
        DXGI_FORMAT_D24_UNORM_S8_UINT => DXGI_FORMAT_R24G8_TYPELESS,
        DXGI_FORMAT_D32_FLOAT_S8X24_UINT => DXGI_FORMAT_R32G8X24_TYPELESS,
        other => other,
    }
}

fn image_desc(info: &ImageCreateInfo, format: DXGI_FORMAT) -> D3D12_RESOURCE_DESC {
    let mut flags = D3D12_RESOURCE_FLAG_NONE;
    if info.usage_flags.contains(ImageUsageFlags::COLOR_ATTACHMENT) {
        flags |= D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET;
    }
    if info.usage_flags.contains(ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
        flags |= D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL;
    }
    if info.usage_flags.contains(ImageUsageFlags::STORAGE) {
        flags |= D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
    }
    let depth_or_array_size = match info.image_type {
        ImageType::D3 => info.depth,
        _ => info.array_layer_count,
    };
    let sampled_depth = info.format.has_depth() && info.usage_flags.contains(ImageUsageFlags::SAMPLED);
    D3D12_RESOURCE_DESC {
        Dimension: util::resource_dimension(info.image_type),
        Alignment: 0,
        Width: u64::from(info.width),
        Height: info.height,
        DepthOrArraySize: depth_or_array_size as u16,
        MipLevels: info.mip_level_count as u16,
        Format: if sampled_depth { typeless_depth_format(format) } else { format },
        SampleDesc: DXGI_SAMPLE_DESC { Count: info.sample_count.count(), Quality: 0 },
        Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
        Flags: flags,
    }
}

fn clear_value(info: &ImageCreateInfo, format: DXGI_FORMAT) -> Option<D3D12_CLEAR_VALUE> {
    if info.usage_flags.contains(ImageUsageFlags::COLOR_ATTACHMENT) {
        return Some(D3D12_CLEAR_VALUE {
            Format: format,
            Anonymous: D3D12_CLEAR_VALUE_0 { Color: info.rtv_clear_value.rgba },
        });
    }
    if info.usage_flags.contains(ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
        let value = D3D12_DEPTH_STENCIL_VALUE {
            Depth: info.dsv_clear_value.depth,
            Stencil: info.dsv_clear_value.stencil as u8,
        };
        return Some(D3D12_CLEAR_VALUE { Format: format, Anonymous: D3D12_CLEAR_VALUE_0 { DepthStencil: value } });
    }
    None
}

#[derive(Debug)]
pub struct Dx12Image {
    resource: Sendable<ID3D12Resource>,
    format: DXGI_FORMAT,
    mip_levels: u32,
    array_size: u32,
    /// `None` for resources owned elsewhere, such as swap chain back buffers.
    placement: Option<Placement>,
}

impl Dx12Image {
    pub(crate) fn new(shared: &Arc<DeviceShared>, info: &ImageCreateInfo) -> Result<Self> {
        let format = util::format_to_dxgi(info.format);
        if format == DXGI_FORMAT_UNKNOWN {
            log::error!("{:?} has no DXGI equivalent", info.format);
            return Err(GrfxError::InvalidCreateArgument);
        }
        if info.memory_usage != MemoryUsage::GpuOnly {
            log::warn!("D3D12 textures live in the default heap; {:?} is ignored", info.memory_usage);
        }
        let desc = image_desc(info, format);
        let state = util::resource_states(info.initial_state, CommandType::Graphics);
        let clear = clear_value(info, format);
        let location = memory_location(MemoryUsage::GpuOnly);
        let (resource, placement) = create_placed(shared, &desc, "grfx image", location, state, clear.as_ref())?;
        Ok(Self {
            resource: Sendable(resource),
            format,
            mip_levels: info.mip_level_count,
            array_size: u32::from(desc.DepthOrArraySize),
            placement: Some(placement),
        })
    }

    /// Wraps a resource owned elsewhere, such as a swap chain back buffer.
    pub fn from_resource(resource: ID3D12Resource) -> Self {
        let desc = unsafe { resource.GetDesc() };
        Self {
            format: desc.Format,
            mip_levels: u32::from(desc.MipLevels),
            array_size: u32::from(desc.DepthOrArraySize),
            resource: Sendable(resource),
            placement: None,
        }
    }

    pub fn native(&self) -> &ID3D12Resource {
        &self.resource
    }

    /// The attachment format, even when the resource itself is typeless.
    pub fn dxgi_format(&self) -> DXGI_FORMAT {
        self.format
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn array_size(&self) -> u32 {
        self.array_size
    }

    pub fn allocation_size(&self) -> Option<u64> {
        self.placement.as_ref().map(Placement::size)
    }
}

impl ImageApi for Dx12Image {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct Dx12Sampler {
    desc: D3D12_SAMPLER_DESC,
}

impl Dx12Sampler {
    pub fn new(info: &SamplerCreateInfo) -> Self {
        Self { desc: util::sampler_desc(info) }
    }

    pub fn desc(&self) -> &D3D12_SAMPLER_DESC {
        &self.desc
    }
}

impl std::fmt::Debug for Dx12Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dx12Sampler").field("filter", &self.desc.Filter).finish_non_exhaustive()
    }
}

impl SamplerApi for Dx12Sampler {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn buffer_resource(buffer: &Buffer) -> Result<&Dx12Buffer> {
    buffer.api().as_any().downcast_ref::<Dx12Buffer>().ok_or(GrfxError::UnsupportedApi)
}

pub(crate) fn image_resource(image: &Image) -> Result<&Dx12Image> {
    image.api().as_any().downcast_ref::<Dx12Image>().ok_or(GrfxError::UnsupportedApi)
}

/// Depth formats are read through their matching color format.
fn shader_view_format(format: Format) -> DXGI_FORMAT {
    match format {
        Format::D16Unorm => DXGI_FORMAT_R16_UNORM,
        Format::D32Float => DXGI_FORMAT_R32_FLOAT,
        Format::D24UnormS8Uint => DXGI_FORMAT_R24_UNORM_X8_TYPELESS,
        Format::D32FloatS8Uint => DXGI_FORMAT_R32_FLOAT_X8X24_TYPELESS,
        other => util::format_to_dxgi(other),
    }
}

fn srv_desc(range: &ViewRange, multisampled: bool) -> D3D12_SHADER_RESOURCE_VIEW_DESC {
    let (mip, mips, layer, layers) = (range.mip_level, range.mip_level_count, range.array_layer, range.array_layer_count);
    let (dimension, anonymous) = match range.view_type {
        ImageViewType::D1 => (
            D3D12_SRV_DIMENSION_TEXTURE1D,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture1D: D3D12_TEX1D_SRV { MostDetailedMip: mip, MipLevels: mips, ResourceMinLODClamp: 0.0 },
            },
        ),
        ImageViewType::D1Array => (
            D3D12_SRV_DIMENSION_TEXTURE1DARRAY,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture1DArray: D3D12_TEX1D_ARRAY_SRV {
                    MostDetailedMip: mip,
                    MipLevels: mips,
                    FirstArraySlice: layer,
                    ArraySize: layers,
                    ResourceMinLODClamp: 0.0,
                },
            },
        ),
        ImageViewType::D2 if multisampled => (
            D3D12_SRV_DIMENSION_TEXTURE2DMS,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 { Texture2DMS: D3D12_TEX2DMS_SRV { UnusedField_NothingToDefine: 0 } },
        ),
        ImageViewType::D2 => (
            D3D12_SRV_DIMENSION_TEXTURE2D,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture2D: D3D12_TEX2D_SRV { MostDetailedMip: mip, MipLevels: mips, PlaneSlice: 0, ResourceMinLODClamp: 0.0 },
            },
        ),
        ImageViewType::D2Array if multisampled => (
            D3D12_SRV_DIMENSION_TEXTURE2DMSARRAY,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture2DMSArray: D3D12_TEX2DMS_ARRAY_SRV { FirstArraySlice: layer, ArraySize: layers },
            },
        ),
        ImageViewType::D2Array => (
            D3D12_SRV_DIMENSION_TEXTURE2DARRAY,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture2DArray: D3D12_TEX2D_ARRAY_SRV {
                    MostDetailedMip: mip,
                    MipLevels: mips,
                    FirstArraySlice: layer,
                    ArraySize: layers,
                    PlaneSlice: 0,
                    ResourceMinLODClamp: 0.0,
                },
            },
        ),
        ImageViewType::D3 => (
            D3D12_SRV_DIMENSION_TEXTURE3D,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture3D: D3D12_TEX3D_SRV { MostDetailedMip: mip, MipLevels: mips, ResourceMinLODClamp: 0.0 },
            },
        ),
        ImageViewType::Cube => (
            D3D12_SRV_DIMENSION_TEXTURECUBE,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                TextureCube: D3D12_TEXCUBE_SRV { MostDetailedMip: mip, MipLevels: mips, ResourceMinLODClamp: 0.0 },
            },
        ),
        ImageViewType::CubeArray => (
            D3D12_SRV_DIMENSION_TEXTURECUBEARRAY,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                TextureCubeArray: D3D12_TEXCUBE_ARRAY_SRV {
                    MostDetailedMip: mip,
                    MipLevels: mips,
                    First2DArrayFace: layer,
                    NumCubes: layers / 6,
                    ResourceMinLODClamp: 0.0,
                },
            },
        ),
    };
    D3D12_SHADER_RESOURCE_VIEW_DESC {
        Format: shader_view_format(range.format),
        ViewDimension: dimension,
        Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
        Anonymous: anonymous,
    }
}

fn uav_desc(range: &ViewRange) -> D3D12_UNORDERED_ACCESS_VIEW_DESC {
    let (mip, layer, layers) = (range.mip_level, range.array_layer, range.array_layer_count);
    let (dimension, anonymous) = match range.view_type {
        ImageViewType::D1 => (
            D3D12_UAV_DIMENSION_TEXTURE1D,
            D3D12_UNORDERED_ACCESS_VIEW_DESC_0 { Texture1D: D3D12_TEX1D_UAV { MipSlice: mip } },
        ),
        ImageViewType::D1Array => (
            D3D12_UAV_DIMENSION_TEXTURE1DARRAY,
            D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                Texture1DArray: D3D12_TEX1D_ARRAY_UAV { MipSlice: mip, FirstArraySlice: layer, ArraySize: layers },
            },
        ),
        ImageViewType::D2 => (
            D3D12_UAV_DIMENSION_TEXTURE2D,
            D3D12_UNORDERED_ACCESS_VIEW_DESC_0 { Texture2D: D3D12_TEX2D_UAV { MipSlice: mip, PlaneSlice: 0 } },
        ),
        ImageViewType::D3 => (
            D3D12_UAV_DIMENSION_TEXTURE3D,
            D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                Texture3D: D3D12_TEX3D_UAV { MipSlice: mip, FirstWSlice: 0, WSize: u32::MAX },
            },
        ),
        // Cube faces are written as a 2D array.
        ImageViewType::D2Array | ImageViewType::Cube | ImageViewType::CubeArray => (
            D3D12_UAV_DIMENSION_TEXTURE2DARRAY,
            D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                Texture2DArray: D3D12_TEX2D_ARRAY_UAV {
                    MipSlice: mip,
                    FirstArraySlice: layer,
                    ArraySize: layers,
                    PlaneSlice: 0,
                },
            },
        ),
    };
    D3D12_UNORDERED_ACCESS_VIEW_DESC {
        Format: util::format_to_dxgi(range.format),
        ViewDimension: dimension,
        Anonymous: anonymous,
    }
}

fn rtv_desc(range: &ViewRange, multisampled: bool) -> D3D12_RENDER_TARGET_VIEW_DESC {
    let (mip, layer, layers) = (range.mip_level, range.array_layer, range.array_layer_count);
    let (dimension, anonymous) = match range.view_type {
        ImageViewType::D1 => (
            D3D12_RTV_DIMENSION_TEXTURE1D,
            D3D12_RENDER_TARGET_VIEW_DESC_0 { Texture1D: D3D12_TEX1D_RTV { MipSlice: mip } },
        ),
        ImageViewType::D2 if multisampled => (
            D3D12_RTV_DIMENSION_TEXTURE2DMS,
            D3D12_RENDER_TARGET_VIEW_DESC_0 { Texture2DMS: D3D12_TEX2DMS_RTV { UnusedField_NothingToDefine: 0 } },
        ),
        ImageViewType::D2 => (
            D3D12_RTV_DIMENSION_TEXTURE2D,
            D3D12_RENDER_TARGET_VIEW_DESC_0 { Texture2D: D3D12_TEX2D_RTV { MipSlice: mip, PlaneSlice: 0 } },
        ),
        ImageViewType::D3 => (
            D3D12_RTV_DIMENSION_TEXTURE3D,
            D3D12_RENDER_TARGET_VIEW_DESC_0 {
                Texture3D: D3D12_TEX3D_RTV { MipSlice: mip, FirstWSlice: layer, WSize: layers },
            },
        ),
        _ if multisampled => (
            D3D12_RTV_DIMENSION_TEXTURE2DMSARRAY,
            D3D12_RENDER_TARGET_VIEW_DESC_0 {
                Texture2DMSArray: D3D12_TEX2DMS_ARRAY_RTV { FirstArraySlice: layer, ArraySize: layers },
            },
        ),
        _ => (
            D3D12_RTV_DIMENSION_TEXTURE2DARRAY,
            D3D12_RENDER_TARGET_VIEW_DESC_0 {
                Texture2DArray: D3D12_TEX2D_ARRAY_RTV {
                    MipSlice: mip,
                    FirstArraySlice: layer,
                    ArraySize: layers,
                    PlaneSlice: 0,
                },
            },
        ),
    };
    D3D12_RENDER_TARGET_VIEW_DESC { Format: util::format_to_dxgi(range.format), ViewDimension: dimension, Anonymous: anonymous }
}

fn dsv_desc(range: &ViewRange, multisampled: bool) -> D3D12_DEPTH_STENCIL_VIEW_DESC {
    let (mip, layer, layers) = (range.mip_level, range.array_layer, range.array_layer_count);
    let (dimension, anonymous) = match range.view_type {
        ImageViewType::D2 if multisampled => (
            D3D12_DSV_DIMENSION_TEXTURE2DMS,
            D3D12_DEPTH_STENCIL_VIEW_DESC_0 { Texture2DMS: D3D12_TEX2DMS_DSV { UnusedField_NothingToDefine: 0 } },
        ),
        ImageViewType::D2 => (
            D3D12_DSV_DIMENSION_TEXTURE2D,
            D3D12_DEPTH_STENCIL_VIEW_DESC_0 { Texture2D: D3D12_TEX2D_DSV { MipSlice: mip } },
        ),
        _ if multisampled => (
            D3D12_DSV_DIMENSION_TEXTURE2DMSARRAY,
            D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                Texture2DMSArray: D3D12_TEX2DMS_ARRAY_DSV { FirstArraySlice: layer, ArraySize: layers },
            },
        ),
        _ => (
            D3D12_DSV_DIMENSION_TEXTURE2DARRAY,
            D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                Texture2DArray: D3D12_TEX2D_ARRAY_DSV { MipSlice: mip, FirstArraySlice: layer, ArraySize: layers },
            },
        ),
    };
    D3D12_DEPTH_STENCIL_VIEW_DESC {
        Format: util::format_to_dxgi(range.format),
        ViewDimension: dimension,
        Flags: D3D12_DSV_FLAG_NONE,
        Anonymous: anonymous,
    }
}

/// View description written into a descriptor set on update.
#[derive(Clone, Copy)]
pub enum ShaderViewDesc {
    Srv(D3D12_SHADER_RESOURCE_VIEW_DESC),
    Uav(D3D12_UNORDERED_ACCESS_VIEW_DESC),
}

pub struct Dx12ShaderView {
    resource: Sendable<ID3D12Resource>,
    desc: ShaderViewDesc,
}

impl Dx12ShaderView {
    pub fn sampled(image: &Dx12Image, range: &ViewRange, multisampled: bool) -> Self {
        Self { resource: Sendable(image.native().clone()), desc: ShaderViewDesc::Srv(srv_desc(range, multisampled)) }
    }

    pub fn storage(image: &Dx12Image, range: &ViewRange) -> Self {
        Self { resource: Sendable(image.native().clone()), desc: ShaderViewDesc::Uav(uav_desc(range)) }
    }

    pub fn native(&self) -> &ID3D12Resource {
        &self.resource
    }

    pub fn desc(&self) -> &ShaderViewDesc {
        &self.desc
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.desc, ShaderViewDesc::Uav(_))
    }
}

impl std::fmt::Debug for Dx12ShaderView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dx12ShaderView").field("storage", &self.is_storage()).finish_non_exhaustive()
    }
}

impl ImageViewApi for Dx12ShaderView {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// RTV or DSV written into a CPU-only heap slot that is returned on drop.
#[derive(Debug)]
pub struct Dx12AttachmentView {
    handle: DescriptorHandle,
    manager: SharedHandleManager,
    resource: Sendable<ID3D12Resource>,
}

impl Dx12AttachmentView {
    pub(crate) fn render_target(
        shared: &DeviceShared,
        image: &Dx12Image,
        range: &ViewRange,
        multisampled: bool,
    ) -> Result<Self> {
        let desc = rtv_desc(range, multisampled);
        let view = Self::create(&shared.rtv_handles, image)?;
        unsafe { shared.device.CreateRenderTargetView(image.native(), Some(&desc), view.handle.cpu_handle) };
        Ok(view)
    }

    pub(crate) fn depth_stencil(
        shared: &DeviceShared,
        image: &Dx12Image,
        range: &ViewRange,
        multisampled: bool,
    ) -> Result<Self> {
        let desc = dsv_desc(range, multisampled);
        let view = Self::create(&shared.dsv_handles, image)?;
        unsafe { shared.device.CreateDepthStencilView(image.native(), Some(&desc), view.handle.cpu_handle) };
        Ok(view)
    }

    fn create(manager: &SharedHandleManager, image: &Dx12Image) -> Result<Self> {
        let handle = manager.lock().allocate()?;
        Ok(Self { handle, manager: Arc::clone(manager), resource: Sendable(image.native().clone()) })
    }

    pub fn cpu_handle(&self) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        self.handle.cpu_handle
    }

    pub fn native(&self) -> &ID3D12Resource {
        &self.resource
    }
}

impl Drop for Dx12AttachmentView {
    fn drop(&mut self) {
        self.manager.lock().free(&self.handle);
    }
}

impl ImageViewApi for Dx12AttachmentView {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCreateInfo;
    use crate::dx12::testing;

    fn range(view_type: ImageViewType, format: Format) -> ViewRange {
        ViewRange { view_type, format, mip_level: 0, mip_level_count: 1, array_layer: 0, array_layer_count: 1 }
    }

    #[test]
    fn sampled_depth_images_are_typeless() {
        let info = ImageCreateInfo::depth_stencil_target(16, 16, Format::D32Float);
        let plain = image_desc(&info, DXGI_FORMAT_D32_FLOAT);
        assert_eq!(plain.Format, DXGI_FORMAT_D32_FLOAT);
        assert!((plain.Flags & D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL) == D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL);

        let sampled = ImageCreateInfo { usage_flags: info.usage_flags | ImageUsageFlags::SAMPLED, ..info };
        assert_eq!(image_desc(&sampled, DXGI_FORMAT_D32_FLOAT).Format, DXGI_FORMAT_R32_TYPELESS);
        assert_eq!(srv_desc(&range(ImageViewType::D2, Format::D32Float), false).Format, DXGI_FORMAT_R32_FLOAT);
    }

    #[test]
    fn view_dimensions_follow_sample_count() {
        let view = range(ImageViewType::D2, Format::R8G8B8A8Unorm);
        assert_eq!(srv_desc(&view, true).ViewDimension, D3D12_SRV_DIMENSION_TEXTURE2DMS);
        assert_eq!(rtv_desc(&view, false).ViewDimension, D3D12_RTV_DIMENSION_TEXTURE2D);
        let cube = range(ImageViewType::Cube, Format::R8G8B8A8Unorm);
        assert_eq!(uav_desc(&cube).ViewDimension, D3D12_UAV_DIMENSION_TEXTURE2DARRAY);
        assert_eq!(dsv_desc(&range(ImageViewType::D2Array, Format::D32Float), true).ViewDimension, D3D12_DSV_DIMENSION_TEXTURE2DMSARRAY);
    }

    #[test]
    fn render_targets_carry_an_optimized_clear_value() {
        let info = ImageCreateInfo::render_target_2d(8, 8, Format::B8G8R8A8Unorm);
        let clear = clear_value(&info, DXGI_FORMAT_B8G8R8A8_UNORM).unwrap();
        assert_eq!(clear.Format, DXGI_FORMAT_B8G8R8A8_UNORM);
        assert!(clear_value(&ImageCreateInfo::sampled_image_2d(8, 8, Format::R8Unorm), DXGI_FORMAT_R8_UNORM).is_none());
    }

    #[test]
    fn uniform_buffers_round_up_to_constant_alignment() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let info = BufferCreateInfo::new(300, BufferUsageFlags::UNIFORM_BUFFER, MemoryUsage::CpuToGpu);
        let buffer = Dx12Buffer::new(&shared, &info).unwrap();
        assert_eq!(buffer.size(), 512);
        assert!(buffer.allocation_size() >= 512);
        assert_eq!(buffer.map().unwrap().len(), 300);
    }

    #[test]
    fn gpu_only_buffers_cannot_be_mapped() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let info = BufferCreateInfo::new(64, BufferUsageFlags::VERTEX_BUFFER, MemoryUsage::GpuOnly);
        let buffer = Dx12Buffer::new(&shared, &info).unwrap();
        assert!(buffer.map().is_err());
        assert_ne!(buffer.gpu_virtual_address(), 0);
    }

    #[test]
    fn render_target_views_return_their_slot() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let image =
            Dx12Image::new(&shared, &ImageCreateInfo::render_target_2d(8, 8, Format::B8G8R8A8Unorm)).unwrap();
        let view = range(ImageViewType::D2, Format::B8G8R8A8Unorm);
        let first = Dx12AttachmentView::render_target(&shared, &image, &view, false).unwrap();
        let slot = first.cpu_handle();
        drop(first);
        let second = Dx12AttachmentView::render_target(&shared, &image, &view, false).unwrap();
        assert_eq!(second.cpu_handle(), slot);
    }
}
