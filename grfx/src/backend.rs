//! Backend traits, one per object kind.
//!
//! The generic layer owns a `Box<dyn XApi>` inside every object and forwards native work to it.
//! Backends reach the native state of peer objects by downcasting through `as_any()`.

use std::any::Any;
use std::fmt::Debug;

use crate::buffer::{Buffer, BufferCreateInfo};
use crate::command::{
    BoundSet, BufferToBufferCopyInfo, BufferToImageCopyInfo, CommandBufferCreateInfo, CommandPool,
    ImageBlitInfo, ImageToBufferCopyInfo, ImageToBufferOutputPitch, ImageToImageCopyInfo, IndexBufferView,
    PushDescriptor, QueueTransfer, RenderPassBeginInfo, SubresourceRange, VertexBufferView,
};
use crate::descriptor::{
    DescriptorPool, DescriptorPoolCreateInfo, DescriptorSetLayout, DescriptorSetLayoutCreateInfo, ResolvedWrite,
};
use crate::config::DeviceCreateInfo;
use crate::error::Result;
use crate::image::{
    DepthStencilViewCreateInfo, Image, ImageCreateInfo, RenderTargetViewCreateInfo, SampledImageViewCreateInfo,
    SamplerCreateInfo, StorageImageViewCreateInfo,
};
use crate::memory::MappedMemory;
use crate::pipeline::{
    ComputePipeline, ComputePipelineDesc, GraphicsPipeline, GraphicsPipelineDesc, PipelineInterface,
    PipelineInterfaceCreateInfo, ShaderModuleCreateInfo,
};
use crate::query::{Query, QueryCreateInfo};
use crate::queue::{Queue, SubmitBatch};
use crate::render_pass::{RenderPass, RenderPassDesc};
use crate::instance::Gpu;
use crate::swapchain::{SurfaceCapabilities, SurfaceCreateInfo, SwapchainCreateInfo};
use crate::sync::{Fence, FenceCreateInfo, Semaphore, SemaphoreCreateInfo};
use crate::types::{Api, CommandType, PipelineBindPoint, PipelineStage, ResourceState, Rect, Viewport};

macro_rules! opaque_api {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            pub trait $name: Send + Sync + Debug {
                fn as_any(&self) -> &dyn Any;
            }
        )*
    };
}

opaque_api!(
    /// Native image plus its memory.
    ImageApi,
    /// Native view of any of the four image-view kinds.
    ImageViewApi,
    SamplerApi,
    DescriptorPoolApi,
    DescriptorSetLayoutApi,
    ShaderModuleApi,
    /// Root signature on D3D12, pipeline layout on Vulkan.
    PipelineInterfaceApi,
    PipelineApi,
    RenderPassApi,
    CommandPoolApi,
);

/// Loaded driver: the native instance (Vulkan) or DXGI factory (D3D12).
pub trait InstanceApi: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
    fn api(&self) -> Api;
    /// Adapters in enumeration order; `gpu_index` values index into this list.
    fn gpus(&self) -> &[Gpu];
    fn create_device(&self, gpu_index: usize, info: &DeviceCreateInfo) -> Result<Box<dyn DeviceApi>>;
    fn create_surface(&self, info: &SurfaceCreateInfo) -> Result<Box<dyn SurfaceApi>>;
}

/// Native window surface. Capabilities are queried against the GPU it was created for.
pub trait SurfaceApi: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
    fn capabilities(&self) -> Result<SurfaceCapabilities>;
}

/// Object factory for one backend. Generic validation has already run when these are called.
pub trait DeviceApi: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
    fn api(&self) -> Api;
    fn create_queue(&self, command_type: CommandType, index: u32) -> Result<Box<dyn QueueApi>>;
    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<Box<dyn BufferApi>>;
    fn create_image(&self, info: &ImageCreateInfo) -> Result<Box<dyn ImageApi>>;
    fn create_sampler(&self, info: &SamplerCreateInfo) -> Result<Box<dyn SamplerApi>>;
    fn create_sampled_image_view(&self, image: &Image, info: &SampledImageViewCreateInfo) -> Result<Box<dyn ImageViewApi>>;
    fn create_storage_image_view(&self, image: &Image, info: &StorageImageViewCreateInfo) -> Result<Box<dyn ImageViewApi>>;
    fn create_render_target_view(&self, image: &Image, info: &RenderTargetViewCreateInfo) -> Result<Box<dyn ImageViewApi>>;
    fn create_depth_stencil_view(&self, image: &Image, info: &DepthStencilViewCreateInfo) -> Result<Box<dyn ImageViewApi>>;
    fn create_descriptor_pool(&self, info: &DescriptorPoolCreateInfo) -> Result<Box<dyn DescriptorPoolApi>>;
    fn create_descriptor_set_layout(&self, info: &DescriptorSetLayoutCreateInfo) -> Result<Box<dyn DescriptorSetLayoutApi>>;
    fn allocate_descriptor_set(&self, pool: &DescriptorPool, layout: &DescriptorSetLayout) -> Result<Box<dyn DescriptorSetApi>>;
    fn create_shader_module(&self, info: &ShaderModuleCreateInfo) -> Result<Box<dyn ShaderModuleApi>>;
    fn create_pipeline_interface(
        &self,
        info: &PipelineInterfaceCreateInfo,
        layouts: &[&DescriptorSetLayout],
    ) -> Result<Box<dyn PipelineInterfaceApi>>;
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> Result<Box<dyn PipelineApi>>;
    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc<'_>) -> Result<Box<dyn PipelineApi>>;
    fn create_render_pass(&self, desc: &RenderPassDesc<'_>) -> Result<Box<dyn RenderPassApi>>;
    fn create_command_pool(&self, queue: &Queue) -> Result<Box<dyn CommandPoolApi>>;
    fn create_command_buffer(&self, pool: &CommandPool, info: &CommandBufferCreateInfo) -> Result<Box<dyn CommandBufferApi>>;
    fn create_fence(&self, info: &FenceCreateInfo) -> Result<Box<dyn FenceApi>>;
    fn create_semaphore(&self, info: &SemaphoreCreateInfo) -> Result<Box<dyn SemaphoreApi>>;
    fn create_query(&self, info: &QueryCreateInfo) -> Result<Box<dyn QueryApi>>;
    fn create_swapchain(&self, queue: &Queue, info: &SwapchainCreateInfo) -> Result<Box<dyn SwapchainApi>>;
    /// Whether `pushable` descriptor set layouts can be created.
    fn supports_push_descriptors(&self) -> bool {
        true
    }
}

pub trait BufferApi: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
    fn map(&self) -> Result<MappedMemory<'_>>;
}

pub trait DescriptorSetApi: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
    /// Writes go straight into the set's native storage. Bindings are already checked against
    /// `layout`.
    fn update_descriptors(&self, layout: &DescriptorSetLayout, writes: &[ResolvedWrite<'_>]) -> Result<()>;
}

pub trait FenceApi: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
    fn wait(&self, value: u64, timeout_ns: u64) -> Result<()>;
    fn reset(&self) -> Result<()>;
}

pub trait SemaphoreApi: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
    fn timeline_signal(&self, value: u64) -> Result<()>;
    fn timeline_wait(&self, value: u64, timeout_ns: u64) -> Result<()>;
    fn timeline_counter_value(&self) -> Result<u64>;
}

pub trait QueryApi: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
    fn reset(&self, first_query: u32, query_count: u32) -> Result<()>;
    fn get_data(&self, dst: &mut [u8]) -> Result<()>;
}

pub trait QueueApi: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
    fn submit(&self, batch: &SubmitBatch<'_>) -> Result<()>;
    fn queue_wait(&self, semaphore: &Semaphore, value: u64) -> Result<()>;
    fn queue_signal(&self, semaphore: &Semaphore, value: u64) -> Result<()>;
    fn signal_fence(&self, fence: &Fence, value: u64) -> Result<()>;
    fn timestamp_frequency(&self) -> Result<u64>;
}

pub trait SwapchainApi: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
    fn image_count(&self) -> u32;
    /// Wraps the native back buffers. Called after creation and after every resize.
    fn color_images(&mut self) -> Result<Vec<Box<dyn ImageApi>>>;
    fn acquire_next_image(
        &mut self,
        timeout_ns: u64,
        queue: &Queue,
        semaphore: Option<&Semaphore>,
        fence: Option<&Fence>,
    ) -> Result<u32>;
    fn present(&mut self, queue: &Queue, image_index: u32, wait_semaphores: &[&Semaphore]) -> Result<()>;
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;
}

/// Native command recording. State checks that do not depend on the backend happen in
/// [`crate::command::CommandRecorder`] before these run.
pub trait CommandBufferApi: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
    fn begin(&mut self) -> Result<()>;
    fn end(&mut self) -> Result<()>;
    fn begin_render_pass(&mut self, render_pass: &RenderPass, begin_info: &RenderPassBeginInfo) -> Result<()>;
    fn end_render_pass(&mut self);
    fn transition_image_layout(
        &mut self,
        image: &Image,
        range: SubresourceRange,
        before: ResourceState,
        after: ResourceState,
        transfer: Option<QueueTransfer<'_>>,
    ) -> Result<()>;
    fn buffer_resource_barrier(
        &mut self,
        buffer: &Buffer,
        before: ResourceState,
        after: ResourceState,
        transfer: Option<QueueTransfer<'_>>,
    ) -> Result<()>;
    fn set_viewports(&mut self, viewports: &[Viewport]);
    fn set_scissors(&mut self, scissors: &[Rect]);
    fn bind_descriptor_sets(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: &PipelineInterface,
        sets: &[BoundSet<'_>],
    ) -> Result<()>;
    fn push_constants(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: &PipelineInterface,
        values: &[u32],
        dst_offset: u32,
    ) -> Result<()>;
    fn push_descriptor(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: &PipelineInterface,
        push: &PushDescriptor<'_>,
    ) -> Result<()>;
    fn bind_graphics_pipeline(&mut self, pipeline: &GraphicsPipeline, interface: &PipelineInterface);
    fn bind_compute_pipeline(&mut self, pipeline: &ComputePipeline, interface: &PipelineInterface);
    fn bind_index_buffer(&mut self, buffer: &Buffer, view: &IndexBufferView);
    fn bind_vertex_buffers(&mut self, views: &[(&Buffer, &VertexBufferView)]);
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    fn copy_buffer_to_buffer(&mut self, info: &BufferToBufferCopyInfo, src: &Buffer, dst: &Buffer);
    fn copy_buffer_to_image(&mut self, infos: &[BufferToImageCopyInfo], src: &Buffer, dst: &Image);
    fn copy_image_to_buffer(&mut self, info: &ImageToBufferCopyInfo, src: &Image, dst: &Buffer) -> ImageToBufferOutputPitch;
    fn copy_image_to_image(&mut self, info: &ImageToImageCopyInfo, src: &Image, dst: &Image);
    fn blit_image(&mut self, info: &ImageBlitInfo, src: &Image, dst: &Image);
    fn begin_query(&mut self, query: &Query, index: u32);
    fn end_query(&mut self, query: &Query, index: u32);
    fn write_timestamp(&mut self, query: &Query, stage: PipelineStage, index: u32);
    fn resolve_query_data(&mut self, query: &Query, start_index: u32, count: u32) -> Result<()>;
}
