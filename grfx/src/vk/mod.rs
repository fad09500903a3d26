//! Vulkan backend over `ash`.
//!
//! Each command type is served by the family dedicated to it, so queue indices never collide
//! across types. Buffers and images are sub-allocated with `gpu_allocator`. Render passes own
//! their framebuffer; pipelines carry a compatible render pass built from their output formats.

mod command;
mod descriptor;
mod instance;
mod pipeline;
mod query;
mod queue;
mod render_pass;
mod resource;
mod swapchain;
mod sync;
mod util;

use std::any::Any;
use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;

pub use command::{VulkanCommandBuffer, VulkanCommandPool};
pub use descriptor::{VulkanDescriptorPool, VulkanDescriptorSet, VulkanDescriptorSetLayout};
pub use instance::{create_instance, VulkanInstance, VulkanSurface};
pub use pipeline::{VulkanPipeline, VulkanPipelineInterface, VulkanShaderModule};
pub use query::VulkanQuery;
pub use queue::VulkanQueue;
pub use render_pass::VulkanRenderPass;
pub use resource::{VulkanBuffer, VulkanImage, VulkanImageView, VulkanSampler};
pub use swapchain::VulkanSwapchain;
pub use sync::{VulkanFence, VulkanSemaphore};

use self::instance::{api_version, InstanceShared, PhysicalDeviceInfo};
use self::resource::vulkan_image;
use self::util::vk_error;
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
use crate::types::{Api, CommandType};

const COMMAND_TYPES: [CommandType; 3] = [CommandType::Graphics, CommandType::Compute, CommandType::Transfer];

/// Device-level state every Vulkan object keeps alive: the logical device, its extension
/// loaders and the memory allocator.
pub(crate) struct DeviceShared {
    pub raw: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub features: vk::PhysicalDeviceFeatures,
    pub timestamp_period: f32,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub swapchain: ash::khr::swapchain::Device,
    pub push_descriptor: Option<ash::khr::push_descriptor::Device>,
    /// Loaded on Vulkan 1.1, where timelines and host query resets are extensions.
    timeline: Option<ash::khr::timeline_semaphore::Device>,
    host_query_reset: Option<ash::ext::host_query_reset::Device>,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    pub instance: Arc<InstanceShared>,
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

    pub fn semaphore_counter_value(&self, semaphore: vk::Semaphore) -> ash::prelude::VkResult<u64> {
        match &self.timeline {
            Some(ext) => unsafe { ext.get_semaphore_counter_value(semaphore) },
            None => unsafe { self.raw.get_semaphore_counter_value(semaphore) },
        }
    }

    pub fn wait_semaphores(&self, info: &vk::SemaphoreWaitInfo<'_>, timeout_ns: u64) -> ash::prelude::VkResult<()> {
        match &self.timeline {
            Some(ext) => unsafe { ext.wait_semaphores(info, timeout_ns) },
            None => unsafe { self.raw.wait_semaphores(info, timeout_ns) },
        }
    }

    pub fn signal_semaphore(&self, info: &vk::SemaphoreSignalInfo<'_>) -> ash::prelude::VkResult<()> {
        match &self.timeline {
            Some(ext) => unsafe { ext.signal_semaphore(info) },
            None => unsafe { self.raw.signal_semaphore(info) },
        }
    }

    pub fn reset_query_pool(&self, pool: vk::QueryPool, first_query: u32, query_count: u32) {
        match &self.host_query_reset {
            Some(ext) => unsafe { (ext.fp().reset_query_pool_ext)(ext.device(), pool, first_query, query_count) },
            None => unsafe { self.raw.reset_query_pool(pool, first_query, query_count) },
        }
    }

    pub fn queue_family(&self, command_type: CommandType) -> Result<u32> {
        util::queue_family_for(command_type, &self.queue_families).ok_or(GrfxError::NoQueuesAvailable)
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        unsafe {
            if let Err(r) = self.raw.device_wait_idle() {
                log::warn!("vkDeviceWaitIdle failed during teardown: {:?}", r);
            }
            ManuallyDrop::drop(&mut self.allocator);
            self.raw.destroy_device(None);
        }
    }
}

impl std::fmt::Debug for DeviceShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceShared")
            .field("device", &self.raw.handle())
            .field("physical_device", &self.physical_device)
            .field("push_descriptor", &self.push_descriptor.is_some())
            .finish_non_exhaustive()
    }
}

/// Device extensions for `version`. Push descriptors are optional; the rest are required.
fn device_extensions(physical: &PhysicalDeviceInfo, version: u32) -> Result<Vec<&'static CStr>> {
    let mut required = vec![ash::khr::swapchain::NAME];
    if version < vk::API_VERSION_1_2 {
        required.push(ash::khr::timeline_semaphore::NAME);
        required.push(ash::ext::host_query_reset::NAME);
    }
    if let Some(missing) = required.iter().find(|name| !physical.supports(name)) {
        log::error!("device extension {:?} is not supported", missing);
        return Err(GrfxError::UnsupportedApi);
    }
    if physical.supports(ash::khr::push_descriptor::NAME) {
        required.push(ash::khr::push_descriptor::NAME);
    }
    Ok(required)
}

/// (family, queue count) for every command type that asks for queues.
fn queue_requests(physical: &PhysicalDeviceInfo, info: &DeviceCreateInfo) -> Result<Vec<(u32, u32)>> {
    let requested = [info.graphics_queue_count, info.compute_queue_count, info.transfer_queue_count];
    let mut queues = Vec::new();
    for (command_type, count) in COMMAND_TYPES.into_iter().zip(requested) {
        if count == 0 {
            continue;
        }
        let family = util::queue_family_for(command_type, &physical.queue_families).ok_or_else(|| {
            log::error!("no queue family is dedicated to {:?}", command_type);
            GrfxError::NoQueuesAvailable
        })?;
        if count > physical.queue_families[family as usize].queue_count {
            log::error!("{} {:?} queues requested, family {} has fewer", count, command_type, family);
            return Err(GrfxError::LimitExceeded);
        }
        queues.push((family, count));
    }
    Ok(queues)
}

#[derive(Debug)]
pub struct VulkanDevice {
    shared: Arc<DeviceShared>,
    api: Api,
}

impl VulkanDevice {
    pub(crate) fn new(
        instance: &Arc<InstanceShared>,
        physical: &PhysicalDeviceInfo,
        api: Api,
        info: &DeviceCreateInfo,
    ) -> Result<Self> {
        let version = api_version(api);
        let queues = queue_requests(physical, info)?;
        let extensions = device_extensions(physical, version)?;
        let extension_names: Vec<_> = extensions.iter().map(|name| name.as_ptr()).collect();

        let priorities = vec![1.0f32; queues.iter().map(|(_, count)| *count as usize).max().unwrap_or(1)];
        let queue_infos: Vec<_> = queues
            .iter()
            .map(|(family, count)| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(*family)
                    .queue_priorities(&priorities[..*count as usize])
            })
            .collect();

        let mut timeline = vk::PhysicalDeviceTimelineSemaphoreFeatures::default().timeline_semaphore(true);
        let mut host_query_reset = vk::PhysicalDeviceHostQueryResetFeatures::default().host_query_reset(true);
        let mut scalar_layout = vk::PhysicalDeviceScalarBlockLayoutFeatures::default();
        let mut indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
        if version >= vk::API_VERSION_1_2 {
            let mut supported_scalar = vk::PhysicalDeviceScalarBlockLayoutFeatures::default();
            let mut supported_indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
            let mut supported = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut supported_scalar)
                .push_next(&mut supported_indexing);
            unsafe { instance.instance.get_physical_device_features2(physical.handle, &mut supported) };
            scalar_layout.scalar_block_layout = supported_scalar.scalar_block_layout;
            indexing.runtime_descriptor_array = supported_indexing.runtime_descriptor_array;
            indexing.descriptor_binding_partially_bound = supported_indexing.descriptor_binding_partially_bound;
            indexing.shader_sampled_image_array_non_uniform_indexing =
                supported_indexing.shader_sampled_image_array_non_uniform_indexing;
        }

        let mut create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&physical.features)
            .push_next(&mut timeline)
            .push_next(&mut host_query_reset);
        if version >= vk::API_VERSION_1_2 {
            create_info = create_info.push_next(&mut scalar_layout).push_next(&mut indexing);
        }
        let raw = unsafe { instance.instance.create_device(physical.handle, &create_info, None) }
            .map_err(|r| vk_error(r, "vkCreateDevice"))?;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: raw.clone(),
            physical_device: physical.handle,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { raw.destroy_device(None) };
                return Err(allocation_error(e));
            }
        };

        let legacy = version < vk::API_VERSION_1_2;
        let push_descriptor = extensions
            .contains(&ash::khr::push_descriptor::NAME)
            .then(|| ash::khr::push_descriptor::Device::new(&instance.instance, &raw));
        let shared = DeviceShared {
            swapchain: ash::khr::swapchain::Device::new(&instance.instance, &raw),
            timeline: legacy.then(|| ash::khr::timeline_semaphore::Device::new(&instance.instance, &raw)),
            host_query_reset: legacy.then(|| ash::ext::host_query_reset::Device::new(&instance.instance, &raw)),
            push_descriptor,
            physical_device: physical.handle,
            features: physical.features,
            timestamp_period: physical.timestamp_period,
            queue_families: physical.queue_families.clone(),
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            instance: Arc::clone(instance),
            raw,
        };
        if info.enable_validation && !instance.has_debug_messenger() {
            log::warn!("device validation requested on an instance created without debug layers");
        }
        log::debug!(
            "Vulkan {}.{} device created with queues {:?}, extensions {:?}",
            vk::api_version_major(version),
            vk::api_version_minor(version),
            queues,
            extensions
        );
        Ok(Self { shared: Arc::new(shared), api })
    }

    pub(crate) fn shared(&self) -> &Arc<DeviceShared> {
        &self.shared
    }

    pub fn native(&self) -> &ash::Device {
        &self.shared.raw
    }
}

impl DeviceApi for VulkanDevice {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn api(&self) -> Api {
        self.api
    }

    fn supports_push_descriptors(&self) -> bool {
        self.shared.push_descriptor.is_some()
    }

    fn create_queue(&self, command_type: CommandType, index: u32) -> Result<Box<dyn QueueApi>> {
        Ok(Box::new(VulkanQueue::new(&self.shared, command_type, index)?))
    }

    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<Box<dyn BufferApi>> {
        Ok(Box::new(VulkanBuffer::new(&self.shared, info)?))
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<Box<dyn ImageApi>> {
        Ok(Box::new(VulkanImage::new(&self.shared, info)?))
    }

    fn create_sampler(&self, info: &SamplerCreateInfo) -> Result<Box<dyn SamplerApi>> {
        Ok(Box::new(VulkanSampler::new(&self.shared, info)?))
    }

    fn create_sampled_image_view(&self, image: &Image, info: &SampledImageViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        Ok(Box::new(VulkanImageView::new(&self.shared, vulkan_image(image)?, &info.range, true)?))
    }

    fn create_storage_image_view(&self, image: &Image, info: &StorageImageViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        Ok(Box::new(VulkanImageView::new(&self.shared, vulkan_image(image)?, &info.range, false)?))
    }

    fn create_render_target_view(&self, image: &Image, info: &RenderTargetViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        Ok(Box::new(VulkanImageView::new(&self.shared, vulkan_image(image)?, &info.range, false)?))
    }

    fn create_depth_stencil_view(&self, image: &Image, info: &DepthStencilViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        Ok(Box::new(VulkanImageView::new(&self.shared, vulkan_image(image)?, &info.range, false)?))
    }

    fn create_descriptor_pool(&self, info: &DescriptorPoolCreateInfo) -> Result<Box<dyn DescriptorPoolApi>> {
        Ok(Box::new(VulkanDescriptorPool::new(&self.shared, info)?))
    }

    fn create_descriptor_set_layout(&self, info: &DescriptorSetLayoutCreateInfo) -> Result<Box<dyn DescriptorSetLayoutApi>> {
        Ok(Box::new(VulkanDescriptorSetLayout::new(&self.shared, info)?))
    }

    fn allocate_descriptor_set(&self, pool: &DescriptorPool, layout: &DescriptorSetLayout) -> Result<Box<dyn DescriptorSetApi>> {
        Ok(Box::new(VulkanDescriptorSet::new(pool, layout)?))
    }

    fn create_shader_module(&self, info: &ShaderModuleCreateInfo) -> Result<Box<dyn ShaderModuleApi>> {
        Ok(Box::new(VulkanShaderModule::new(&self.shared, info)?))
    }

    fn create_pipeline_interface(
        &self,
        info: &PipelineInterfaceCreateInfo,
        layouts: &[&DescriptorSetLayout],
    ) -> Result<Box<dyn PipelineInterfaceApi>> {
        Ok(Box::new(VulkanPipelineInterface::new(&self.shared, info, layouts)?))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> Result<Box<dyn PipelineApi>> {
        Ok(Box::new(VulkanPipeline::graphics(&self.shared, desc)?))
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc<'_>) -> Result<Box<dyn PipelineApi>> {
        Ok(Box::new(VulkanPipeline::compute(&self.shared, desc)?))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc<'_>) -> Result<Box<dyn RenderPassApi>> {
        Ok(Box::new(VulkanRenderPass::new(&self.shared, desc)?))
    }

    fn create_command_pool(&self, queue: &Queue) -> Result<Box<dyn CommandPoolApi>> {
        Ok(Box::new(VulkanCommandPool::new(&self.shared, queue)?))
    }

    fn create_command_buffer(&self, pool: &CommandPool, info: &CommandBufferCreateInfo) -> Result<Box<dyn CommandBufferApi>> {
        let native_pool = pool.api().as_any().downcast_ref::<VulkanCommandPool>().ok_or(GrfxError::UnsupportedApi)?;
        Ok(Box::new(VulkanCommandBuffer::new(native_pool, info)?))
    }

    fn create_fence(&self, info: &FenceCreateInfo) -> Result<Box<dyn FenceApi>> {
        Ok(Box::new(VulkanFence::new(&self.shared, info)?))
    }

    fn create_semaphore(&self, info: &SemaphoreCreateInfo) -> Result<Box<dyn SemaphoreApi>> {
        Ok(Box::new(VulkanSemaphore::new(&self.shared, info)?))
    }

    fn create_query(&self, info: &QueryCreateInfo) -> Result<Box<dyn QueryApi>> {
        Ok(Box::new(VulkanQuery::new(&self.shared, info)?))
    }

    fn create_swapchain(&self, queue: &Queue, info: &SwapchainCreateInfo) -> Result<Box<dyn SwapchainApi>> {
        Ok(Box::new(VulkanSwapchain::new(&self.shared, queue, info)?))
    }
}

/// Helpers for tests that need a live driver. They return `None` on machines without a Vulkan
/// loader or GPU so the tests can skip.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::InstanceCreateInfo;
    use crate::instance::Instance;
    use crate::DeviceHandle;

    pub fn instance(info: InstanceCreateInfo) -> Option<Instance> {
        let api = create_instance(&info).ok()?;
        if api.gpus().is_empty() {
            return None;
        }
        Instance::with_api(info, api).ok()
    }

    pub fn device(info: DeviceCreateInfo) -> Option<(Instance, DeviceHandle)> {
        let mut instance = instance(InstanceCreateInfo::new(Api::Vk1_2))?;
        let handle = instance.create_device(&info).ok()?;
        Some((instance, handle))
    }

    pub fn shared(instance: &Instance, handle: DeviceHandle) -> Arc<DeviceShared> {
        let device = instance.device(handle).unwrap();
        Arc::clone(device.api_object().as_any().downcast_ref::<VulkanDevice>().unwrap().shared())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::BufferToBufferCopyInfo;
    use crate::format::Format;
    use crate::queue::SubmitInfo;
    use crate::types::{BufferUsageFlags, MemoryUsage, PipelineStage, QueryType, ResourceState};
    use crate::{Device, GrfxError};

    fn physical(families: Vec<vk::QueueFamilyProperties>, extensions: &[&CStr]) -> PhysicalDeviceInfo {
        PhysicalDeviceInfo {
            handle: vk::PhysicalDevice::null(),
            api_version: vk::API_VERSION_1_2,
            features: Default::default(),
            timestamp_period: 1.0,
            queue_families: families,
            extensions: extensions.iter().map(|e| (*e).to_owned()).collect(),
        }
    }

    fn family(queue_flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties { queue_flags, queue_count, ..Default::default() }
    }

    #[test]
    fn legacy_versions_need_timeline_extensions() {
        let bare = physical(Vec::new(), &[ash::khr::swapchain::NAME]);
        assert_eq!(device_extensions(&bare, vk::API_VERSION_1_2).unwrap(), vec![ash::khr::swapchain::NAME]);
        assert_eq!(device_extensions(&bare, vk::API_VERSION_1_1).err(), Some(GrfxError::UnsupportedApi));

        let full = physical(
            Vec::new(),
            &[
                ash::khr::swapchain::NAME,
                ash::khr::timeline_semaphore::NAME,
                ash::ext::host_query_reset::NAME,
                ash::khr::push_descriptor::NAME,
            ],
        );
        let extensions = device_extensions(&full, vk::API_VERSION_1_1).unwrap();
        assert_eq!(extensions.len(), 4);
        assert_eq!(extensions.last(), Some(&ash::khr::push_descriptor::NAME));
    }

    #[test]
    fn queue_requests_respect_family_sizes() {
        use vk::QueueFlags as Q;
        let physical = physical(vec![family(Q::GRAPHICS | Q::COMPUTE | Q::TRANSFER, 1), family(Q::COMPUTE, 2)], &[]);
        let info = DeviceCreateInfo { compute_queue_count: 2, ..Default::default() };
        assert_eq!(queue_requests(&physical, &info).unwrap(), vec![(0, 1), (1, 2)]);

        let too_many = DeviceCreateInfo { graphics_queue_count: 2, ..Default::default() };
        assert_eq!(queue_requests(&physical, &too_many).err(), Some(GrfxError::LimitExceeded));
        let no_transfer = DeviceCreateInfo { transfer_queue_count: 1, ..Default::default() };
        assert_eq!(queue_requests(&physical, &no_transfer).err(), Some(GrfxError::NoQueuesAvailable));
    }

    fn with_device(test: impl FnOnce(&mut Device)) {
        let Some((mut instance, handle)) = testing::device(DeviceCreateInfo::default()) else {
            log::warn!("no Vulkan device available, skipping");
            return;
        };
        test(instance.device_mut(handle).unwrap());
    }

    #[test]
    fn buffer_copy_round_trips_on_the_gpu() {
        with_device(|device| {
            let queue = device.graphics_queue(0).unwrap();
            let payload: Vec<u8> = (0..64).rev().collect();
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
    fn images_and_views_bind_allocator_memory() {
        with_device(|device| {
            let image = device.create_image(&ImageCreateInfo::sampled_image_2d(64, 64, Format::R8G8B8A8Unorm)).unwrap();
            let native = device.image(image).unwrap().api().as_any().downcast_ref::<VulkanImage>().unwrap();
            assert!(native.allocation_size().unwrap() >= 64 * 64 * 4);
            device.destroy_image(image).unwrap();
        });
    }
}
