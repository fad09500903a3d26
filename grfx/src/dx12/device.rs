//! ID3D12Device, its allocator and the device-wide RTV and DSV handle heaps.

use std::any::Any;
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use gpu_allocator::d3d12::{Allocation, AllocationCreateDesc, Allocator, AllocatorCreateDesc, ID3D12DeviceVersion};
use parking_lot::Mutex;
use windows::core::{Interface, PCSTR};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::{IDXGIAdapter1, IDXGIFactory4};

use super::command::{Dx12CommandBuffer, Dx12CommandPool};
use super::descriptor::{Dx12DescriptorPool, Dx12DescriptorSet, Dx12DescriptorSetLayout};
use super::descriptor_helper::{DescriptorHandleManager, SharedHandleManager};
use super::instance::feature_level;
use super::pipeline::{Dx12Pipeline, Dx12PipelineInterface, Dx12ShaderModule};
use super::query::Dx12Query;
use super::queue::Dx12Queue;
use super::render_pass::Dx12RenderPass;
use super::resource::{image_resource, Dx12AttachmentView, Dx12Buffer, Dx12Image, Dx12Sampler, Dx12ShaderView};
use super::swapchain::Dx12Swapchain;
use super::sync::{Dx12Fence, Dx12Semaphore};
use super::util::{hresult_error, Sendable};
use crate::backend::{
    BufferApi, CommandBufferApi, CommandPoolApi, DescriptorPoolApi, DescriptorSetApi, DescriptorSetLayoutApi,
    DeviceApi, FenceApi, ImageApi, ImageViewApi, PipelineApi, PipelineInterfaceApi, QueryApi, QueueApi,
    RenderPassApi, SamplerApi, SemaphoreApi, ShaderModuleApi, SwapchainApi,
};
use crate::buffer::BufferCreateInfo;
use crate::command::{CommandBufferCreateInfo, CommandPool};
use crate::config::DeviceCreateInfo;
use crate::descriptor::{DescriptorPool, DescriptorPoolCreateInfo, DescriptorSetLayout, DescriptorSetLayoutCreateInfo};
use crate::error::{GrfxError, Result};
use crate::image::{
    DepthStencilViewCreateInfo, Image, ImageCreateInfo, RenderTargetViewCreateInfo, SampledImageViewCreateInfo,
    SamplerCreateInfo, StorageImageViewCreateInfo,
};
use crate::memory::allocation_error;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc, PipelineInterfaceCreateInfo, ShaderModuleCreateInfo};
use crate::query::QueryCreateInfo;
use crate::queue::Queue;
use crate::render_pass::RenderPassDesc;
use crate::swapchain::SwapchainCreateInfo;
use crate::sync::{FenceCreateInfo, SemaphoreCreateInfo};
use crate::types::{Api, CommandType, SampleCount};

unsafe extern "system" fn debug_callback(
    _category: D3D12_MESSAGE_CATEGORY,
    severity: D3D12_MESSAGE_SEVERITY,
    id: D3D12_MESSAGE_ID,
    description: PCSTR,
    _context: *mut c_void,
) {
    let message = if description.is_null() { String::new() } else { description.display().to_string() };
    match severity {
        D3D12_MESSAGE_SEVERITY_CORRUPTION | D3D12_MESSAGE_SEVERITY_ERROR => log::error!("[{}] {}", id.0, message),
        D3D12_MESSAGE_SEVERITY_WARNING => log::warn!("[{}] {}", id.0, message),
        D3D12_MESSAGE_SEVERITY_INFO => log::info!("[{}] {}", id.0, message),
        _ => log::debug!("[{}] {}", id.0, message),
    }
}

/// Routes debug layer messages into `log`. Needs a runtime with `ID3D12InfoQueue1`.
fn register_message_callback(device: &ID3D12Device) {
    let Ok(info_queue) = device.cast::<ID3D12InfoQueue1>() else {
        log::warn!("ID3D12InfoQueue1 is unavailable, debug messages go to the debugger only");
        return;
    };
    let mut cookie = 0;
    let registered = unsafe {
        info_queue.RegisterMessageCallback(
            Some(debug_callback),
            D3D12_MESSAGE_CALLBACK_IGNORE_FILTERS,
            std::ptr::null(),
            &mut cookie,
        )
    };
    if let Err(e) = registered {
        log::warn!("ID3D12InfoQueue1::RegisterMessageCallback failed: {}", e);
    }
}

/// Device-level state every D3D12 object keeps alive: the device, the factory that owns its
/// swap chains, the RTV and DSV handle heaps and the memory allocator.
pub(crate) struct DeviceShared {
    pub device: Sendable<ID3D12Device>,
    pub factory: Sendable<IDXGIFactory4>,
    pub rtv_handles: SharedHandleManager,
    pub dsv_handles: SharedHandleManager,
    allocator: ManuallyDrop<Mutex<Sendable<Allocator>>>,
}

impl DeviceShared {
    pub fn allocate(&self, desc: &AllocationCreateDesc<'_>) -> Result<Allocation> {
        self.allocator.lock().allocate(desc).map_err(allocation_error)
    }

    pub fn free(&self, allocation: Allocation) {
        if let Err(e) = self.allocator.lock().free(allocation) {
            log::error!("gpu-allocator free failed: {}", e);
        }
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        unsafe { ManuallyDrop::drop(&mut self.allocator) };
    }
}

impl std::fmt::Debug for DeviceShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceShared").field("device", &self.device.as_raw()).finish_non_exhaustive()
    }
}

fn is_multisampled(image: &Image) -> bool {
    image.sample_count() != SampleCount::X1
}

#[derive(Debug)]
pub struct Dx12Device {
    shared: Arc<DeviceShared>,
    api: Api,
}

impl Dx12Device {
    pub(crate) fn new(factory: &IDXGIFactory4, adapter: &IDXGIAdapter1, api: Api, info: &DeviceCreateInfo) -> Result<Self> {
        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(adapter, feature_level(api), &mut device) }
            .map_err(|e| hresult_error(e, "D3D12CreateDevice"))?;
        let device = device.ok_or(GrfxError::ApiFailure)?;
        if info.enable_validation {
            register_message_callback(&device);
        }

        let allocator = Allocator::new(&AllocatorCreateDesc {
            device: ID3D12DeviceVersion::Device(device.clone()),
            debug_settings: Default::default(),
            allocation_sizes: Default::default(),
        })
        .map_err(allocation_error)?;

        let rtv_handles = DescriptorHandleManager::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_RTV);
        let dsv_handles = DescriptorHandleManager::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_DSV);
        let shared = DeviceShared {
            device: Sendable(device),
            factory: Sendable(factory.clone()),
            rtv_handles: Arc::new(Mutex::new(rtv_handles)),
            dsv_handles: Arc::new(Mutex::new(dsv_handles)),
            allocator: ManuallyDrop::new(Mutex::new(Sendable(allocator))),
        };
        Ok(Self { shared: Arc::new(shared), api })
    }

    pub(crate) fn shared(&self) -> &Arc<DeviceShared> {
        &self.shared
    }

    pub fn native(&self) -> &ID3D12Device {
        &self.shared.device
    }
}

impl DeviceApi for Dx12Device {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn api(&self) -> Api {
        self.api
    }

    fn create_queue(&self, command_type: CommandType, _index: u32) -> Result<Box<dyn QueueApi>> {
        Ok(Box::new(Dx12Queue::new(&self.shared, command_type)?))
    }

    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<Box<dyn BufferApi>> {
        Ok(Box::new(Dx12Buffer::new(&self.shared, info)?))
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<Box<dyn ImageApi>> {
        Ok(Box::new(Dx12Image::new(&self.shared, info)?))
    }

    fn create_sampler(&self, info: &SamplerCreateInfo) -> Result<Box<dyn SamplerApi>> {
        Ok(Box::new(Dx12Sampler::new(info)))
    }

    fn create_sampled_image_view(&self, image: &Image, info: &SampledImageViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        Ok(Box::new(Dx12ShaderView::sampled(image_resource(image)?, &info.range, is_multisampled(image))))
    }

    fn create_storage_image_view(&self, image: &Image, info: &StorageImageViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        Ok(Box::new(Dx12ShaderView::storage(image_resource(image)?, &info.range)))
    }

    fn create_render_target_view(&self, image: &Image, info: &RenderTargetViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        let view =
            Dx12AttachmentView::render_target(&self.shared, image_resource(image)?, &info.range, is_multisampled(image))?;
        Ok(Box::new(view))
    }

    fn create_depth_stencil_view(&self, image: &Image, info: &DepthStencilViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        let view =
            Dx12AttachmentView::depth_stencil(&self.shared, image_resource(image)?, &info.range, is_multisampled(image))?;
        Ok(Box::new(view))
    }

    fn create_descriptor_pool(&self, info: &DescriptorPoolCreateInfo) -> Result<Box<dyn DescriptorPoolApi>> {
        Ok(Box::new(Dx12DescriptorPool::new(info)?))
    }

    fn create_descriptor_set_layout(&self, info: &DescriptorSetLayoutCreateInfo) -> Result<Box<dyn DescriptorSetLayoutApi>> {
        Ok(Box::new(Dx12DescriptorSetLayout::new(info)?))
    }

    fn allocate_descriptor_set(&self, _pool: &DescriptorPool, layout: &DescriptorSetLayout) -> Result<Box<dyn DescriptorSetApi>> {
        Ok(Box::new(Dx12DescriptorSet::new(&self.shared, layout)?))
    }

    fn create_shader_module(&self, info: &ShaderModuleCreateInfo) -> Result<Box<dyn ShaderModuleApi>> {
        Ok(Box::new(Dx12ShaderModule::new(info)?))
    }

    fn create_pipeline_interface(
        &self,
        info: &PipelineInterfaceCreateInfo,
        layouts: &[&DescriptorSetLayout],
    ) -> Result<Box<dyn PipelineInterfaceApi>> {
        Ok(Box::new(Dx12PipelineInterface::new(&self.shared, info, layouts)?))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> Result<Box<dyn PipelineApi>> {
        Ok(Box::new(Dx12Pipeline::graphics(&self.shared, desc)?))
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc<'_>) -> Result<Box<dyn PipelineApi>> {
        Ok(Box::new(Dx12Pipeline::compute(&self.shared, desc)?))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc<'_>) -> Result<Box<dyn RenderPassApi>> {
        Ok(Box::new(Dx12RenderPass::new(desc)?))
    }

    fn create_command_pool(&self, queue: &Queue) -> Result<Box<dyn CommandPoolApi>> {
        Ok(Box::new(Dx12CommandPool::new(queue.command_type())?))
    }

    fn create_command_buffer(&self, pool: &CommandPool, info: &CommandBufferCreateInfo) -> Result<Box<dyn CommandBufferApi>> {
        let native_pool = pool.api().as_any().downcast_ref::<Dx12CommandPool>().ok_or(GrfxError::UnsupportedApi)?;
        Ok(Box::new(Dx12CommandBuffer::new(&self.shared, native_pool, info)?))
    }

    fn create_fence(&self, _info: &FenceCreateInfo) -> Result<Box<dyn FenceApi>> {
        Ok(Box::new(Dx12Fence::new(&self.shared)?))
    }

    fn create_semaphore(&self, info: &SemaphoreCreateInfo) -> Result<Box<dyn SemaphoreApi>> {
        Ok(Box::new(Dx12Semaphore::new(&self.shared, info)?))
    }

    fn create_query(&self, info: &QueryCreateInfo) -> Result<Box<dyn QueryApi>> {
        Ok(Box::new(Dx12Query::new(&self.shared, info)?))
    }

    fn create_swapchain(&self, queue: &Queue, info: &SwapchainCreateInfo) -> Result<Box<dyn SwapchainApi>> {
        Ok(Box::new(Dx12Swapchain::new(&self.shared, queue, info)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::BufferToBufferCopyInfo;
    use crate::dx12::testing;
    use crate::format::Format;
    use crate::queue::SubmitInfo;
    use crate::types::{BufferUsageFlags, MemoryUsage, PipelineStage, QueryType, ResourceState};
    use crate::Device;

    fn with_device(test: impl FnOnce(&mut Device)) {
        let Some((mut instance, handle)) = testing::device(DeviceCreateInfo::default()) else {
            log::warn!("no D3D12 device available, skipping");
            return;
        };
        test(instance.device_mut(handle).unwrap());
    }

    #[test]
    fn queue_requests_are_checked_against_the_gpu() {
        let Some((mut instance, _)) = testing::device(DeviceCreateInfo::default()) else { return };
        let info = DeviceCreateInfo { graphics_queue_count: 2, ..Default::default() };
        assert_eq!(instance.create_device(&info).err(), Some(GrfxError::LimitExceeded));

        let info = DeviceCreateInfo { compute_queue_count: 2, transfer_queue_count: 1, ..Default::default() };
        let handle = instance.create_device(&info).unwrap();
        let device = instance.device(handle).unwrap();
        assert_eq!(device.compute_queue_count(), 2);
        assert_eq!(device.transfer_queue_count(), 1);
    }

    #[test]
    fn buffer_copy_round_trips_on_the_gpu() {
        with_device(|device| {
            let queue = device.graphics_queue(0).unwrap();
            let payload: Vec<u8> = (0..64).collect();
            let src = device.create_buffer(&BufferCreateInfo::staging(64)).unwrap();
            device.buffer(src).unwrap().copy_from_source(&payload).unwrap();
            let dst = device
                .create_buffer(&BufferCreateInfo::new(64, BufferUsageFlags::TRANSFER_DST, MemoryUsage::GpuToCpu))
                .unwrap();
            let info = BufferToBufferCopyInfo { size: 64, src_offset: 0, dst_offset: 0 };
            device.copy_buffer_to_buffer(queue, &info, src, dst, ResourceState::General, ResourceState::General).unwrap();

            let mut out = vec![0u8; 64];
            device.buffer(dst).unwrap().copy_to_dest(&mut out).unwrap();
            assert_eq!(out, payload);
        });
    }

    #[test]
    fn timestamps_resolve_into_readback() {
        with_device(|device| {
            let queue = device.graphics_queue(0).unwrap();
            let query = device.create_query(&QueryCreateInfo { query_type: QueryType::Timestamp, count: 2 }).unwrap();
            let pool = device.create_command_pool(queue).unwrap();
            let cmd = device.create_command_buffer(pool, &CommandBufferCreateInfo::default()).unwrap();
            {
                let mut rec = device.record(cmd).unwrap();
                rec.begin().unwrap();
                rec.write_timestamp(query, PipelineStage::TopOfPipe, 0).unwrap();
                rec.write_timestamp(query, PipelineStage::BottomOfPipe, 1).unwrap();
                rec.resolve_query_data(query, 0, 2).unwrap();
                rec.end().unwrap();
            }
            let fence = device.create_fence(&FenceCreateInfo::default()).unwrap();
            device.submit(queue, &SubmitInfo { command_buffers: vec![cmd], fence: Some(fence), ..Default::default() }).unwrap();
            device.fence(fence).unwrap().wait(u64::MAX).unwrap();

            let mut data = [0u8; 16];
            device.query(query).unwrap().get_data(&mut data).unwrap();
            let first = u64::from_le_bytes(data[..8].try_into().unwrap());
            let second = u64::from_le_bytes(data[8..].try_into().unwrap());
            assert!(second >= first);
            assert!(device.objects().queue(queue).unwrap().timestamp_frequency().unwrap() > 0);
        });
    }

    #[test]
    fn images_are_placed_in_allocator_heaps() {
        with_device(|device| {
            let image = device.create_image(&ImageCreateInfo::sampled_image_2d(64, 64, Format::R8G8B8A8Unorm)).unwrap();
            let native = device.image(image).unwrap().api().as_any().downcast_ref::<Dx12Image>().unwrap();
            assert!(native.allocation_size().unwrap() >= 64 * 64 * 4);
            device.destroy_image(image).unwrap();
        });
    }
}
