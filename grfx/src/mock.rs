//! Host-side driver used by the generic layer's tests.
//!
//! Commands execute on the CPU when their batch is submitted. Every barrier that reaches the
//! backend is counted on the device, so tests can check which transitions were elided.

use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle, XlibDisplayHandle, XlibWindowHandle};

use crate::backend::{
    BufferApi, CommandBufferApi, CommandPoolApi, DescriptorPoolApi, DescriptorSetApi, DescriptorSetLayoutApi,
    DeviceApi, FenceApi, ImageApi, ImageViewApi, InstanceApi, PipelineApi, PipelineInterfaceApi, QueryApi,
    QueueApi, RenderPassApi, SamplerApi, SemaphoreApi, ShaderModuleApi, SurfaceApi, SwapchainApi,
};
use crate::buffer::{Buffer, BufferCreateInfo};
use crate::command::{
    BoundSet, BufferToBufferCopyInfo, BufferToImageCopyInfo, CommandBufferCreateInfo, CommandPool, ImageBlitInfo,
    ImageToBufferCopyInfo, ImageToBufferOutputPitch, ImageToImageCopyInfo, IndexBufferView, PushDescriptor,
    QueueTransfer, RenderPassBeginInfo, SubresourceRange, VertexBufferView,
};
use crate::config::DeviceCreateInfo;
use crate::descriptor::{
    DescriptorPool, DescriptorPoolCreateInfo, DescriptorSetLayout, DescriptorSetLayoutCreateInfo, ResolvedWrite,
};
use crate::error::{GrfxError, Result};
use crate::format::Format;
use crate::image::{
    DepthStencilViewCreateInfo, Image, ImageCreateInfo, RenderTargetViewCreateInfo, SampledImageViewCreateInfo,
    SamplerCreateInfo, StorageImageViewCreateInfo,
};
use crate::instance::Gpu;
use crate::memory::MappedMemory;
use crate::pipeline::{
    ComputePipeline, ComputePipelineDesc, GraphicsPipeline, GraphicsPipelineDesc, PipelineInterface,
    PipelineInterfaceCreateInfo, ShaderModuleCreateInfo,
};
use crate::query::{Query, QueryCreateInfo};
use crate::queue::{Queue, SubmitBatch};
use crate::render_pass::{RenderPass, RenderPassDesc};
use crate::swapchain::{SurfaceCapabilities, SurfaceCreateInfo, SwapchainCreateInfo};
use crate::sync::{Fence, FenceCreateInfo, Semaphore, SemaphoreCreateInfo};
use crate::types::{
    Api, CommandType, MemoryUsage, PipelineBindPoint, PipelineStage, PresentMode, Rect, ResourceState, Viewport,
};

/// Window handles for a surface on `gpu_index`. The mock never dereferences them.
pub(crate) fn surface_create_info(gpu_index: usize) -> SurfaceCreateInfo {
    SurfaceCreateInfo {
        gpu_index,
        display_handle: RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0)),
        window_handle: RawWindowHandle::Xlib(XlibWindowHandle::new(1)),
    }
}

#[derive(Debug)]
pub(crate) struct MockInstance {
    api: Api,
    gpus: Vec<Gpu>,
}

impl MockInstance {
    pub(crate) fn new(api: Api) -> Self {
        let gpus = vec![Gpu::new(api, "grfx mock adapter", 0x1234, 0x0001, false, 1, 2, 2)];
        Self { api, gpus }
    }
}

impl InstanceApi for MockInstance {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn api(&self) -> Api {
        self.api
    }

    fn gpus(&self) -> &[Gpu] {
        &self.gpus
    }

    fn create_device(&self, _gpu_index: usize, _info: &DeviceCreateInfo) -> Result<Box<dyn DeviceApi>> {
        Ok(Box::new(MockDevice { api: self.api, barriers: Arc::default() }))
    }

    fn create_surface(&self, _info: &SurfaceCreateInfo) -> Result<Box<dyn SurfaceApi>> {
        Ok(Box::new(MockSurface))
    }
}

#[derive(Debug)]
struct MockSurface;

impl SurfaceApi for MockSurface {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn capabilities(&self) -> Result<SurfaceCapabilities> {
        Ok(SurfaceCapabilities {
            width: 1280,
            height: 720,
            min_image_count: 2,
            max_image_count: 8,
            supports_tearing: false,
            formats: vec![Format::B8G8R8A8Unorm, Format::B8G8R8A8Srgb],
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
        })
    }
}

#[derive(Debug)]
pub(crate) struct MockDevice {
    api: Api,
    barriers: Arc<AtomicUsize>,
}

impl MockDevice {
    /// Barriers recorded by every command buffer of this device.
    pub(crate) fn barrier_count(&self) -> usize {
        self.barriers.load(Ordering::Acquire)
    }
}

/// Stand-in for every object kind that carries no host-visible state.
#[derive(Debug)]
struct Inert;

macro_rules! inert {
    ($($api:ident),*) => {
        $(
            impl $api for Inert {
                fn as_any(&self) -> &dyn Any {
                    self
                }
            }
        )*
    };
}

inert!(
    ImageApi,
    ImageViewApi,
    SamplerApi,
    DescriptorPoolApi,
    DescriptorSetLayoutApi,
    ShaderModuleApi,
    PipelineInterfaceApi,
    PipelineApi,
    RenderPassApi,
    CommandPoolApi
);

impl DescriptorSetApi for Inert {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn update_descriptors(&self, _layout: &DescriptorSetLayout, _writes: &[ResolvedWrite<'_>]) -> Result<()> {
        Ok(())
    }
}

impl DeviceApi for MockDevice {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn api(&self) -> Api {
        self.api
    }

    fn create_queue(&self, _command_type: CommandType, _index: u32) -> Result<Box<dyn QueueApi>> {
        Ok(Box::new(MockQueue))
    }

    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<Box<dyn BufferApi>> {
        Ok(Box::new(MockBuffer {
            data: Arc::new(Mutex::new(vec![0; info.size as usize])),
            host_visible: info.memory_usage != MemoryUsage::GpuOnly,
        }))
    }

    fn create_image(&self, _info: &ImageCreateInfo) -> Result<Box<dyn ImageApi>> {
        Ok(Box::new(Inert))
    }

    fn create_sampler(&self, _info: &SamplerCreateInfo) -> Result<Box<dyn SamplerApi>> {
        Ok(Box::new(Inert))
    }

    fn create_sampled_image_view(&self, _image: &Image, _info: &SampledImageViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        Ok(Box::new(Inert))
    }

    fn create_storage_image_view(&self, _image: &Image, _info: &StorageImageViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        Ok(Box::new(Inert))
    }

    fn create_render_target_view(&self, _image: &Image, _info: &RenderTargetViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        Ok(Box::new(Inert))
    }

    fn create_depth_stencil_view(&self, _image: &Image, _info: &DepthStencilViewCreateInfo) -> Result<Box<dyn ImageViewApi>> {
        Ok(Box::new(Inert))
    }

    fn create_descriptor_pool(&self, _info: &DescriptorPoolCreateInfo) -> Result<Box<dyn DescriptorPoolApi>> {
        Ok(Box::new(Inert))
    }

    fn create_descriptor_set_layout(&self, _info: &DescriptorSetLayoutCreateInfo) -> Result<Box<dyn DescriptorSetLayoutApi>> {
        Ok(Box::new(Inert))
    }

    fn allocate_descriptor_set(&self, _pool: &DescriptorPool, _layout: &DescriptorSetLayout) -> Result<Box<dyn DescriptorSetApi>> {
        Ok(Box::new(Inert))
    }

    fn create_shader_module(&self, _info: &ShaderModuleCreateInfo) -> Result<Box<dyn ShaderModuleApi>> {
        Ok(Box::new(Inert))
    }

    fn create_pipeline_interface(
        &self,
        _info: &PipelineInterfaceCreateInfo,
        _layouts: &[&DescriptorSetLayout],
    ) -> Result<Box<dyn PipelineInterfaceApi>> {
        Ok(Box::new(Inert))
    }

    fn create_graphics_pipeline(&self, _desc: &GraphicsPipelineDesc<'_>) -> Result<Box<dyn PipelineApi>> {
        Ok(Box::new(Inert))
    }

    fn create_compute_pipeline(&self, _desc: &ComputePipelineDesc<'_>) -> Result<Box<dyn PipelineApi>> {
        Ok(Box::new(Inert))
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc<'_>) -> Result<Box<dyn RenderPassApi>> {
        Ok(Box::new(Inert))
    }

    fn create_command_pool(&self, _queue: &Queue) -> Result<Box<dyn CommandPoolApi>> {
        Ok(Box::new(Inert))
    }

    fn create_command_buffer(&self, _pool: &CommandPool, _info: &CommandBufferCreateInfo) -> Result<Box<dyn CommandBufferApi>> {
        Ok(Box::new(MockCommandBuffer { commands: Vec::new(), barriers: Arc::clone(&self.barriers) }))
    }

    fn create_fence(&self, info: &FenceCreateInfo) -> Result<Box<dyn FenceApi>> {
        Ok(Box::new(MockFence { completed: AtomicU64::new(0), signaled: info.signaled }))
    }

    fn create_semaphore(&self, info: &SemaphoreCreateInfo) -> Result<Box<dyn SemaphoreApi>> {
        Ok(Box::new(MockSemaphore { value: AtomicU64::new(info.initial_value) }))
    }

    fn create_query(&self, info: &QueryCreateInfo) -> Result<Box<dyn QueryApi>> {
        Ok(Box::new(MockQuery { results: Arc::new(Mutex::new(vec![0; info.count as usize])) }))
    }

    fn create_swapchain(&self, _queue: &Queue, info: &SwapchainCreateInfo) -> Result<Box<dyn SwapchainApi>> {
        Ok(Box::new(MockSwapchain { api: self.api, image_count: info.image_count, next_image: 0 }))
    }
}

#[derive(Debug)]
struct MockBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    host_visible: bool,
}

impl BufferApi for MockBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn map(&self) -> Result<MappedMemory<'_>> {
        if !self.host_visible {
            return Err(GrfxError::Failed);
        }
        Ok(MappedMemory::new(MutexGuard::map(self.data.lock(), |data| data.as_mut_slice())))
    }
}

/// Completed value of the last signal; `reset` leaves it alone since waits compare values.
#[derive(Debug)]
struct MockFence {
    completed: AtomicU64,
    signaled: bool,
}

impl FenceApi for MockFence {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn wait(&self, value: u64, _timeout_ns: u64) -> Result<()> {
        if self.signaled || self.completed.load(Ordering::Acquire) >= value {
            Ok(())
        } else {
            Err(GrfxError::WaitTimedOut)
        }
    }

    fn reset(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct MockSemaphore {
    value: AtomicU64,
}

impl MockSemaphore {
    fn signal(&self, value: u64) {
        self.value.fetch_max(value, Ordering::AcqRel);
    }
}

impl SemaphoreApi for MockSemaphore {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn timeline_signal(&self, value: u64) -> Result<()> {
        self.signal(value);
        Ok(())
    }

    fn timeline_wait(&self, value: u64, _timeout_ns: u64) -> Result<()> {
        if self.value.load(Ordering::Acquire) >= value {
            Ok(())
        } else {
            Err(GrfxError::WaitTimedOut)
        }
    }

    fn timeline_counter_value(&self) -> Result<u64> {
        Ok(self.value.load(Ordering::Acquire))
    }
}

#[derive(Debug)]
struct MockQuery {
    results: Arc<Mutex<Vec<u64>>>,
}

impl QueryApi for MockQuery {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reset(&self, first_query: u32, query_count: u32) -> Result<()> {
        let mut results = self.results.lock();
        let first = first_query as usize;
        results[first..first + query_count as usize].fill(0);
        Ok(())
    }

    fn get_data(&self, dst: &mut [u8]) -> Result<()> {
        let bytes: Vec<u8> = self.results.lock().iter().flat_map(|v| v.to_le_bytes()).collect();
        let len = dst.len().min(bytes.len());
        dst[..len].copy_from_slice(&bytes[..len]);
        Ok(())
    }
}

#[derive(Debug)]
enum MockCommand {
    CopyBuffer { info: BufferToBufferCopyInfo, src: Arc<Mutex<Vec<u8>>>, dst: Arc<Mutex<Vec<u8>>> },
    Timestamp { results: Arc<Mutex<Vec<u64>>>, index: u32 },
}

static TICKS: AtomicU64 = AtomicU64::new(1);

impl MockCommand {
    fn execute(&self) {
        match self {
            MockCommand::CopyBuffer { info, src, dst } => {
                let bytes = src.lock()[info.src_offset as usize..][..info.size as usize].to_vec();
                dst.lock()[info.dst_offset as usize..][..info.size as usize].copy_from_slice(&bytes);
            }
            MockCommand::Timestamp { results, index } => {
                results.lock()[*index as usize] = TICKS.fetch_add(1, Ordering::AcqRel);
            }
        }
    }
}

#[derive(Debug)]
struct MockCommandBuffer {
    commands: Vec<MockCommand>,
    barriers: Arc<AtomicUsize>,
}

fn buffer_data(buffer: &Buffer) -> Option<Arc<Mutex<Vec<u8>>>> {
    buffer.api().as_any().downcast_ref::<MockBuffer>().map(|b| Arc::clone(&b.data))
}

impl CommandBufferApi for MockCommandBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn begin(&mut self) -> Result<()> {
        self.commands.clear();
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        Ok(())
    }

    fn begin_render_pass(&mut self, _render_pass: &RenderPass, _begin_info: &RenderPassBeginInfo) -> Result<()> {
        Ok(())
    }

    fn end_render_pass(&mut self) {}

    fn transition_image_layout(
        &mut self,
        _image: &Image,
        _range: SubresourceRange,
        _before: ResourceState,
        _after: ResourceState,
        _transfer: Option<QueueTransfer<'_>>,
    ) -> Result<()> {
        self.barriers.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn buffer_resource_barrier(
        &mut self,
        _buffer: &Buffer,
        _before: ResourceState,
        _after: ResourceState,
        _transfer: Option<QueueTransfer<'_>>,
    ) -> Result<()> {
        self.barriers.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn set_viewports(&mut self, _viewports: &[Viewport]) {}

    fn set_scissors(&mut self, _scissors: &[Rect]) {}

    fn bind_descriptor_sets(
        &mut self,
        _bind_point: PipelineBindPoint,
        _interface: &PipelineInterface,
        _sets: &[BoundSet<'_>],
    ) -> Result<()> {
        Ok(())
    }

    fn push_constants(
        &mut self,
        _bind_point: PipelineBindPoint,
        _interface: &PipelineInterface,
        _values: &[u32],
        _dst_offset: u32,
    ) -> Result<()> {
        Ok(())
    }

    fn push_descriptor(
        &mut self,
        _bind_point: PipelineBindPoint,
        _interface: &PipelineInterface,
        _push: &PushDescriptor<'_>,
    ) -> Result<()> {
        Ok(())
    }

    fn bind_graphics_pipeline(&mut self, _pipeline: &GraphicsPipeline, _interface: &PipelineInterface) {}

    fn bind_compute_pipeline(&mut self, _pipeline: &ComputePipeline, _interface: &PipelineInterface) {}

    fn bind_index_buffer(&mut self, _buffer: &Buffer, _view: &IndexBufferView) {}

    fn bind_vertex_buffers(&mut self, _views: &[(&Buffer, &VertexBufferView)]) {}

    fn draw(&mut self, _vertex_count: u32, _instance_count: u32, _first_vertex: u32, _first_instance: u32) {}

    fn draw_indexed(&mut self, _index_count: u32, _instance_count: u32, _first_index: u32, _vertex_offset: i32, _first_instance: u32) {}

    fn dispatch(&mut self, _x: u32, _y: u32, _z: u32) {}

    fn copy_buffer_to_buffer(&mut self, info: &BufferToBufferCopyInfo, src: &Buffer, dst: &Buffer) {
        if let (Some(src), Some(dst)) = (buffer_data(src), buffer_data(dst)) {
            self.commands.push(MockCommand::CopyBuffer { info: *info, src, dst });
        }
    }

    fn copy_buffer_to_image(&mut self, _infos: &[BufferToImageCopyInfo], _src: &Buffer, _dst: &Image) {}

    fn copy_image_to_buffer(&mut self, info: &ImageToBufferCopyInfo, src: &Image, _dst: &Buffer) -> ImageToBufferOutputPitch {
        ImageToBufferOutputPitch { row_pitch: info.extent[0] * src.format().desc().bytes_per_texel }
    }

    fn copy_image_to_image(&mut self, _info: &ImageToImageCopyInfo, _src: &Image, _dst: &Image) {}

    fn blit_image(&mut self, _info: &ImageBlitInfo, _src: &Image, _dst: &Image) {}

    fn begin_query(&mut self, _query: &Query, _index: u32) {}

    fn end_query(&mut self, _query: &Query, _index: u32) {}

    fn write_timestamp(&mut self, query: &Query, _stage: PipelineStage, index: u32) {
        if let Some(native) = query.api().as_any().downcast_ref::<MockQuery>() {
            self.commands.push(MockCommand::Timestamp { results: Arc::clone(&native.results), index });
        }
    }

    fn resolve_query_data(&mut self, _query: &Query, _start_index: u32, _count: u32) -> Result<()> {
        Ok(())
    }
}

fn mock_semaphore(semaphore: &Semaphore) -> Result<&MockSemaphore> {
    semaphore.api().as_any().downcast_ref::<MockSemaphore>().ok_or(GrfxError::UnsupportedApi)
}

fn mock_fence(fence: &Fence) -> Result<&MockFence> {
    fence.api().as_any().downcast_ref::<MockFence>().ok_or(GrfxError::UnsupportedApi)
}

/// Runs every batch to completion on submit.
#[derive(Debug)]
struct MockQueue;

impl QueueApi for MockQueue {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn submit(&self, batch: &SubmitBatch<'_>) -> Result<()> {
        for cmd in &batch.command_buffers {
            let native = cmd.api().as_any().downcast_ref::<MockCommandBuffer>().ok_or(GrfxError::UnsupportedApi)?;
            native.commands.iter().for_each(MockCommand::execute);
        }
        for (semaphore, value) in &batch.signals {
            mock_semaphore(semaphore)?.signal(*value);
        }
        if let Some((fence, value)) = batch.fence {
            self.signal_fence(fence, value)?;
        }
        Ok(())
    }

    fn queue_wait(&self, _semaphore: &Semaphore, _value: u64) -> Result<()> {
        Ok(())
    }

    fn queue_signal(&self, semaphore: &Semaphore, value: u64) -> Result<()> {
        mock_semaphore(semaphore)?.signal(value);
        Ok(())
    }

    fn signal_fence(&self, fence: &Fence, value: u64) -> Result<()> {
        mock_fence(fence)?.completed.fetch_max(value, Ordering::AcqRel);
        Ok(())
    }

    fn timestamp_frequency(&self) -> Result<u64> {
        Ok(1_000_000_000)
    }
}

#[derive(Debug)]
struct MockSwapchain {
    api: Api,
    image_count: u32,
    next_image: u32,
}

impl SwapchainApi for MockSwapchain {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn color_images(&mut self) -> Result<Vec<Box<dyn ImageApi>>> {
        Ok((0..self.image_count).map(|_| Box::new(Inert) as Box<dyn ImageApi>).collect())
    }

    fn acquire_next_image(
        &mut self,
        _timeout_ns: u64,
        _queue: &Queue,
        semaphore: Option<&Semaphore>,
        fence: Option<&Fence>,
    ) -> Result<u32> {
        let index = self.next_image;
        self.next_image = (index + 1) % self.image_count;
        if let Some(semaphore) = semaphore {
            mock_semaphore(semaphore)?.signal(semaphore.next_signal_value());
        }
        if let Some(fence) = fence {
            mock_fence(fence)?.completed.fetch_max(fence.next_signal_value(), Ordering::AcqRel);
        }
        Ok(index)
    }

    fn present(&mut self, _queue: &Queue, _image_index: u32, _wait_semaphores: &[&Semaphore]) -> Result<()> {
        Ok(())
    }

    fn resize(&mut self, _width: u32, _height: u32) -> Result<()> {
        if self.api.is_vk() {
            return Err(GrfxError::Failed);
        }
        self.next_image = 0;
        Ok(())
    }
}
