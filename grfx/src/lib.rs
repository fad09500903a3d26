//! grfx: an API-agnostic graphics layer over Direct3D 12 and Vulkan.
//!
//! Every object is created through a [`Device`] and addressed by a typed handle. The device owns
//! the object; handles are plain keys that go stale once the object is destroyed. Backend
//! behavior sits behind the per-kind traits in [`backend`], implemented by [`dx12`] and [`vk`].

pub mod backend;
pub mod buffer;
pub mod command;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod format;
pub mod image;
pub mod instance;
pub mod memory;
#[cfg(test)]
pub(crate) mod mock;
pub mod pipeline;
pub mod profiler;
pub mod query;
pub mod queue;
pub mod render_pass;
pub mod swapchain;
pub mod sync;
pub mod types;

#[cfg(feature = "dx12")]
pub mod dx12;
#[cfg(feature = "vulkan")]
pub mod vk;

pub use buffer::{Buffer, BufferCreateInfo};
pub use command::{
    BufferToBufferCopyInfo, BufferToImageCopyInfo, CommandBuffer, CommandBufferCreateInfo,
    CommandPool, CommandRecorder, ImageBlitInfo, ImageToBufferCopyInfo, ImageToBufferOutputPitch,
    ImageToImageCopyInfo, IndexBufferView, RenderPassBeginInfo, VertexBufferView,
};
pub use config::{DeviceCreateInfo, InstanceCreateInfo};
pub use descriptor::{
    DescriptorBinding, DescriptorPool, DescriptorPoolCreateInfo, DescriptorSet,
    DescriptorSetLayout, DescriptorSetLayoutCreateInfo, ImageViewHandle, WriteDescriptor,
};
pub use device::Device;
pub use error::{GrfxError, Result};
pub use format::{Format, FormatAspect, FormatDesc};
pub use image::{
    DepthStencilView, DepthStencilViewCreateInfo, Image, ImageCreateInfo, RenderTargetView,
    RenderTargetViewCreateInfo, SampledImageView, SampledImageViewCreateInfo, Sampler,
    SamplerCreateInfo, StorageImageView, StorageImageViewCreateInfo, ViewRange,
};
pub use instance::{Gpu, Instance};
pub use pipeline::{
    ComputePipeline, ComputePipelineCreateInfo, GraphicsPipeline, GraphicsPipelineCreateInfo,
    PipelineInterface, PipelineInterfaceCreateInfo, PushConstantsInfo, SetLayoutInfo,
    ShaderModule, ShaderModuleCreateInfo, ShaderStageInfo,
};
pub use profiler::{Profiler, ProfilerEventType, RecordAction, ScopedEventSample};
pub use query::{Query, QueryCreateInfo};
pub use queue::{Queue, SubmitInfo};
pub use render_pass::{RenderPass, RenderPassCreateInfo, RenderPassImagesCreateInfo};
pub use swapchain::{Surface, SurfaceCreateInfo, Swapchain, SwapchainCreateInfo};
pub use sync::{Fence, FenceCreateInfo, Semaphore, SemaphoreCreateInfo};
pub use types::*;

/// Sentinel for "no index": unset push-constant bindings, missing root parameters.
pub const VALUE_IGNORED: u32 = u32::MAX;
pub const WHOLE_SIZE: u64 = u64::MAX;
pub const REMAINING_MIP_LEVELS: u32 = u32::MAX;
pub const REMAINING_ARRAY_LAYERS: u32 = u32::MAX;

pub const MAX_RENDER_TARGETS: usize = 8;
pub const MAX_VERTEX_BINDINGS: usize = 16;
pub const MAX_VIEWPORTS: usize = 16;
pub const MAX_SCISSORS: usize = 16;
pub const MAX_SETS_PER_POOL: u32 = 1024;
pub const MAX_BOUND_DESCRIPTOR_SETS: usize = 32;
/// Push constants are counted in DWORDs.
pub const MAX_PUSH_CONSTANTS: u32 = 32;
pub const MAX_SAMPLER_DESCRIPTORS: u32 = 2048;
pub const DEFAULT_RESOURCE_DESCRIPTOR_COUNT: u32 = 8192;
pub const DEFAULT_SAMPLER_DESCRIPTOR_COUNT: u32 = 2048;
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;
pub const MINIMUM_UNIFORM_BUFFER_SIZE: u64 = 256;
pub const D3D12_TEXTURE_DATA_PITCH_ALIGNMENT: u32 = 256;
/// CPU descriptor handles per RTV/DSV heap.
pub const MAX_DESCRIPTOR_HANDLE_HEAP_SIZE: u32 = 256;
pub const D3D12_FRAME_LATENCY: u32 = 1;

slotmap::new_key_type! {
    pub struct DeviceHandle;
    pub struct QueueHandle;
    pub struct BufferHandle;
    pub struct ImageHandle;
    pub struct SamplerHandle;
    pub struct SampledImageViewHandle;
    pub struct StorageImageViewHandle;
    pub struct RenderTargetViewHandle;
    pub struct DepthStencilViewHandle;
    pub struct DescriptorPoolHandle;
    pub struct DescriptorSetLayoutHandle;
    pub struct DescriptorSetHandle;
    pub struct ShaderModuleHandle;
    pub struct PipelineInterfaceHandle;
    pub struct GraphicsPipelineHandle;
    pub struct ComputePipelineHandle;
    pub struct RenderPassHandle;
    pub struct CommandPoolHandle;
    pub struct CommandBufferHandle;
    pub struct FenceHandle;
    pub struct SemaphoreHandle;
    pub struct QueryHandle;
    pub struct SwapchainHandle;
}
