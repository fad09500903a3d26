//! The device: object registry, factories and cross-object operations.

use slotmap::SlotMap;

use crate::backend::{DeviceApi, ImageApi};
use crate::buffer::{Buffer, BufferCreateInfo};
use crate::command::{
    BufferToBufferCopyInfo, BufferToImageCopyInfo, CommandBuffer, CommandBufferCreateInfo, CommandPool,
    CommandRecorder,
};
use crate::config::DeviceCreateInfo;
use crate::descriptor::{
    DescriptorPool, DescriptorPoolCreateInfo, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutCreateInfo,
    ImageViewHandle, ResolvedWrite, WriteDescriptor,
};
use crate::error::{GrfxError, Result};
use crate::image::{
    DepthStencilView, DepthStencilViewCreateInfo, Image, ImageCreateInfo, RenderTargetView,
    RenderTargetViewCreateInfo, SampledImageView, SampledImageViewCreateInfo, Sampler, SamplerCreateInfo,
    StorageImageView, StorageImageViewCreateInfo,
};
use crate::instance::Gpu;
use crate::pipeline::{
    ComputePipeline, ComputePipelineCreateInfo, ComputePipelineDesc, GraphicsPipeline, GraphicsPipelineCreateInfo,
    GraphicsPipelineDesc, PipelineInterface, PipelineInterfaceCreateInfo, ResolvedStage, ShaderModule,
    ShaderModuleCreateInfo,
};
use crate::query::{Query, QueryCreateInfo};
use crate::queue::{Queue, SubmitBatch, SubmitInfo};
use crate::render_pass::{RenderPass, RenderPassCreateInfo, RenderPassDesc, RenderPassImagesCreateInfo};
use crate::swapchain::{Swapchain, SwapchainCreateInfo};
use crate::sync::{Fence, FenceCreateInfo, Semaphore, SemaphoreCreateInfo};
use crate::types::{Api, AttachmentLoadOp, CommandType, ResourceState, ShaderStageFlags};
use crate::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, ComputePipelineHandle, DepthStencilViewHandle,
    DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, FenceHandle, GraphicsPipelineHandle,
    ImageHandle, PipelineInterfaceHandle, QueryHandle, QueueHandle, RenderPassHandle, RenderTargetViewHandle,
    SampledImageViewHandle, SamplerHandle, SemaphoreHandle, ShaderModuleHandle, StorageImageViewHandle,
    SwapchainHandle, WHOLE_SIZE,
};

/// Per-kind registries. Everything a command recorder may need to look up lives here.
#[derive(Debug, Default)]
pub struct Objects {
    queues: SlotMap<QueueHandle, Queue>,
    buffers: SlotMap<BufferHandle, Buffer>,
    images: SlotMap<ImageHandle, Image>,
    samplers: SlotMap<SamplerHandle, Sampler>,
    sampled_image_views: SlotMap<SampledImageViewHandle, SampledImageView>,
    storage_image_views: SlotMap<StorageImageViewHandle, StorageImageView>,
    render_target_views: SlotMap<RenderTargetViewHandle, RenderTargetView>,
    depth_stencil_views: SlotMap<DepthStencilViewHandle, DepthStencilView>,
    descriptor_pools: SlotMap<DescriptorPoolHandle, DescriptorPool>,
    descriptor_set_layouts: SlotMap<DescriptorSetLayoutHandle, DescriptorSetLayout>,
    descriptor_sets: SlotMap<DescriptorSetHandle, DescriptorSet>,
    shader_modules: SlotMap<ShaderModuleHandle, ShaderModule>,
    pipeline_interfaces: SlotMap<PipelineInterfaceHandle, PipelineInterface>,
    graphics_pipelines: SlotMap<GraphicsPipelineHandle, GraphicsPipeline>,
    compute_pipelines: SlotMap<ComputePipelineHandle, ComputePipeline>,
    render_passes: SlotMap<RenderPassHandle, RenderPass>,
    command_pools: SlotMap<CommandPoolHandle, CommandPool>,
    fences: SlotMap<FenceHandle, Fence>,
    semaphores: SlotMap<SemaphoreHandle, Semaphore>,
    queries: SlotMap<QueryHandle, Query>,
}

macro_rules! lookups {
    ($($field:ident: $get:ident($handle:ty) -> $ty:ty;)*) => {
        impl Objects {
            $(
                pub fn $get(&self, handle: $handle) -> Result<&$ty> {
                    self.$field.get(handle).ok_or(GrfxError::ElementNotFound)
                }
            )*
        }

        impl Device {
            $(
                pub fn $get(&self, handle: $handle) -> Result<&$ty> {
                    self.objects.$get(handle)
                }
            )*
        }
    };
}

lookups! {
    queues: queue(QueueHandle) -> Queue;
    buffers: buffer(BufferHandle) -> Buffer;
    images: image(ImageHandle) -> Image;
    samplers: sampler(SamplerHandle) -> Sampler;
    sampled_image_views: sampled_image_view(SampledImageViewHandle) -> SampledImageView;
    storage_image_views: storage_image_view(StorageImageViewHandle) -> StorageImageView;
    render_target_views: render_target_view(RenderTargetViewHandle) -> RenderTargetView;
    depth_stencil_views: depth_stencil_view(DepthStencilViewHandle) -> DepthStencilView;
    descriptor_pools: descriptor_pool(DescriptorPoolHandle) -> DescriptorPool;
    descriptor_set_layouts: descriptor_set_layout(DescriptorSetLayoutHandle) -> DescriptorSetLayout;
    descriptor_sets: descriptor_set(DescriptorSetHandle) -> DescriptorSet;
    shader_modules: shader_module(ShaderModuleHandle) -> ShaderModule;
    pipeline_interfaces: pipeline_interface(PipelineInterfaceHandle) -> PipelineInterface;
    graphics_pipelines: graphics_pipeline(GraphicsPipelineHandle) -> GraphicsPipeline;
    compute_pipelines: compute_pipeline(ComputePipelineHandle) -> ComputePipeline;
    render_passes: render_pass(RenderPassHandle) -> RenderPass;
    command_pools: command_pool(CommandPoolHandle) -> CommandPool;
    fences: fence(FenceHandle) -> Fence;
    semaphores: semaphore(SemaphoreHandle) -> Semaphore;
    queries: query(QueryHandle) -> Query;
}

fn remove<K: slotmap::Key, V>(map: &mut SlotMap<K, V>, handle: K) -> Result<V> {
    map.remove(handle).ok_or(GrfxError::ElementNotFound)
}

// Image, view and render-pass factories shared by the device and the swapchain.
impl Objects {
    pub(crate) fn create_image(&mut self, device: &dyn DeviceApi, info: &ImageCreateInfo) -> Result<ImageHandle> {
        info.validate()?;
        let api = device.create_image(info)?;
        Ok(self.insert_image(info.clone(), api))
    }

    pub(crate) fn insert_image(&mut self, info: ImageCreateInfo, api: Box<dyn ImageApi>) -> ImageHandle {
        log::trace!("image {}x{} {:?}", info.width, info.height, info.format);
        self.images.insert(Image::new(info, api))
    }

    pub(crate) fn destroy_image(&mut self, handle: ImageHandle) -> Result<()> {
        remove(&mut self.images, handle).map(drop)
    }

    pub(crate) fn create_render_target_view(
        &mut self,
        device: &dyn DeviceApi,
        info: &RenderTargetViewCreateInfo,
    ) -> Result<RenderTargetViewHandle> {
        let image = self.image(info.image)?;
        info.range.validate(image)?;
        let api = device.create_render_target_view(image, info)?;
        Ok(self.render_target_views.insert(RenderTargetView::new(*info, api)))
    }

    pub(crate) fn create_depth_stencil_view(
        &mut self,
        device: &dyn DeviceApi,
        info: &DepthStencilViewCreateInfo,
    ) -> Result<DepthStencilViewHandle> {
        let image = self.image(info.image)?;
        info.range.validate(image)?;
        if !image.format().has_depth() && !image.format().has_stencil() {
            log::error!("depth-stencil view of non depth-stencil format {:?}", image.format());
            return Err(GrfxError::InvalidCreateArgument);
        }
        let api = device.create_depth_stencil_view(image, info)?;
        Ok(self.depth_stencil_views.insert(DepthStencilView::new(*info, api)))
    }

    pub(crate) fn create_render_pass(
        &mut self,
        device: &dyn DeviceApi,
        info: &RenderPassCreateInfo,
        owns_views: bool,
    ) -> Result<RenderPassHandle> {
        info.validate()?;
        let render_targets = info
            .render_target_views
            .iter()
            .map(|h| {
                let view = self.render_target_view(*h)?;
                Ok((view, self.image(view.image())?))
            })
            .collect::<Result<Vec<_>>>()?;
        let depth_stencil = match info.depth_stencil_view {
            Some(h) => {
                let view = self.depth_stencil_view(h)?;
                Some((view, self.image(view.image())?))
            }
            None => None,
        };
        let render_target_images = render_targets.iter().map(|(view, _)| view.image()).collect();
        let depth_stencil_image = depth_stencil.map(|(view, _)| view.image());
        let api = device.create_render_pass(&RenderPassDesc { info, render_targets, depth_stencil })?;
        Ok(self.render_passes.insert(RenderPass::new(
            info.clone(),
            render_target_images,
            depth_stencil_image,
            owns_views,
            api,
        )))
    }

    /// Creates one view per image and a pass that owns them.
    pub(crate) fn create_render_pass_from_images(
        &mut self,
        device: &dyn DeviceApi,
        info: &RenderPassImagesCreateInfo,
    ) -> Result<RenderPassHandle> {
        let mut render_target_views = Vec::with_capacity(info.render_target_images.len());
        for (i, handle) in info.render_target_images.iter().enumerate() {
            let image = self.image(*handle)?;
            let mut view_info = RenderTargetViewCreateInfo::guess_from_image(*handle, image);
            view_info.load_op = info.render_target_load_ops.get(i).copied().unwrap_or_default();
            view_info.store_op = info.render_target_store_ops.get(i).copied().unwrap_or_default();
            match self.create_render_target_view(device, &view_info) {
                Ok(view) => render_target_views.push(view),
                Err(err) => {
                    self.destroy_views(&render_target_views, None);
                    return Err(err);
                }
            }
        }
        let depth_stencil_view = match info.depth_stencil_image {
            Some(handle) => {
                let image = self.image(handle)?;
                let mut view_info = DepthStencilViewCreateInfo::guess_from_image(handle, image);
                view_info.depth_load_op = info.depth_load_op;
                view_info.depth_store_op = info.depth_store_op;
                view_info.stencil_load_op = info.stencil_load_op;
                view_info.stencil_store_op = info.stencil_store_op;
                match self.create_depth_stencil_view(device, &view_info) {
                    Ok(view) => Some(view),
                    Err(err) => {
                        self.destroy_views(&render_target_views, None);
                        return Err(err);
                    }
                }
            }
            None => None,
        };
        let pass_info = RenderPassCreateInfo {
            width: info.width,
            height: info.height,
            render_target_views: render_target_views.clone(),
            depth_stencil_view,
            render_target_clear_values: info.render_target_clear_values.clone(),
            depth_stencil_clear_value: info.depth_stencil_clear_value,
            depth_stencil_state: info.depth_stencil_state,
        };
        self.create_render_pass(device, &pass_info, true).inspect_err(|_| {
            self.destroy_views(&render_target_views, depth_stencil_view);
        })
    }

    pub(crate) fn destroy_render_pass(&mut self, handle: RenderPassHandle) -> Result<()> {
        let pass = remove(&mut self.render_passes, handle)?;
        if pass.owns_views() {
            self.destroy_views(&pass.create_info().render_target_views, pass.depth_stencil_view());
        }
        Ok(())
    }

    fn destroy_views(&mut self, render_targets: &[RenderTargetViewHandle], depth_stencil: Option<DepthStencilViewHandle>) {
        for view in render_targets {
            self.render_target_views.remove(*view);
        }
        if let Some(view) = depth_stencil {
            self.depth_stencil_views.remove(view);
        }
    }
}

pub struct Device {
    create_info: DeviceCreateInfo,
    gpu: Gpu,
    swapchains: SlotMap<SwapchainHandle, Swapchain>,
    command_buffers: SlotMap<CommandBufferHandle, CommandBuffer>,
    objects: Objects,
    graphics_queues: Vec<QueueHandle>,
    compute_queues: Vec<QueueHandle>,
    transfer_queues: Vec<QueueHandle>,
    // Native objects above hold the device alive through shared state, but the native device is
    // still released last.
    api: Box<dyn DeviceApi>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("api", &self.api.api())
            .field("gpu", &self.gpu.name())
            .field("buffers", &self.objects.buffers.len())
            .field("images", &self.objects.images.len())
            .field("command_buffers", &self.command_buffers.len())
            .field("swapchains", &self.swapchains.len())
            .finish()
    }
}

impl Device {
    pub(crate) fn new(gpu: Gpu, create_info: DeviceCreateInfo, api: Box<dyn DeviceApi>) -> Result<Self> {
        let mut device = Self {
            create_info,
            gpu,
            swapchains: SlotMap::with_key(),
            command_buffers: SlotMap::with_key(),
            objects: Objects::default(),
            graphics_queues: Vec::new(),
            compute_queues: Vec::new(),
            transfer_queues: Vec::new(),
            api,
        };
        let requests = [
            (CommandType::Graphics, device.create_info.graphics_queue_count, device.gpu.graphics_queue_count()),
            (CommandType::Compute, device.create_info.compute_queue_count, device.gpu.compute_queue_count()),
            (CommandType::Transfer, device.create_info.transfer_queue_count, device.gpu.transfer_queue_count()),
        ];
        for (command_type, requested, available) in requests {
            if requested > 0 && available == 0 {
                log::error!("{:?} queues requested but the GPU exposes none", command_type);
                return Err(GrfxError::NoQueuesAvailable);
            }
            if requested > available {
                log::error!("{} {:?} queues requested, GPU exposes {}", requested, command_type, available);
                return Err(GrfxError::LimitExceeded);
            }
            for index in 0..requested {
                let queue_api = device.api.create_queue(command_type, index)?;
                let idle_fence = Fence::new(FenceCreateInfo::default(), device.api.create_fence(&FenceCreateInfo::default())?);
                let handle = device.objects.queues.insert(Queue::new(command_type, index, idle_fence, queue_api));
                match command_type {
                    CommandType::Graphics => device.graphics_queues.push(handle),
                    CommandType::Compute => device.compute_queues.push(handle),
                    _ => device.transfer_queues.push(handle),
                }
            }
        }
        log::info!(
            "Device created on {} ({}): {} graphics, {} compute, {} transfer queues",
            device.gpu.name(),
            device.api.api().name(),
            device.graphics_queues.len(),
            device.compute_queues.len(),
            device.transfer_queues.len()
        );
        Ok(device)
    }

    pub fn api(&self) -> Api {
        self.api.api()
    }

    pub fn api_object(&self) -> &dyn DeviceApi {
        self.api.as_ref()
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    pub fn create_info(&self) -> &DeviceCreateInfo {
        &self.create_info
    }

    /// Registries, for code that resolves several handles at once.
    pub fn objects(&self) -> &Objects {
        &self.objects
    }

    pub fn graphics_queue(&self, index: usize) -> Result<QueueHandle> {
        self.graphics_queues.get(index).copied().ok_or(GrfxError::OutOfRange)
    }

    pub fn compute_queue(&self, index: usize) -> Result<QueueHandle> {
        self.compute_queues.get(index).copied().ok_or(GrfxError::OutOfRange)
    }

    pub fn transfer_queue(&self, index: usize) -> Result<QueueHandle> {
        self.transfer_queues.get(index).copied().ok_or(GrfxError::OutOfRange)
    }

    pub fn graphics_queue_count(&self) -> usize {
        self.graphics_queues.len()
    }

    pub fn compute_queue_count(&self) -> usize {
        self.compute_queues.len()
    }

    pub fn transfer_queue_count(&self) -> usize {
        self.transfer_queues.len()
    }

    pub fn supports_push_descriptors(&self) -> bool {
        self.api.supports_push_descriptors()
    }

    // Buffers and images.

    pub fn create_buffer(&mut self, info: &BufferCreateInfo) -> Result<BufferHandle> {
        info.validate()?;
        let api = self.api.create_buffer(info)?;
        log::trace!("buffer of {} bytes, usage {:?}", info.size, info.usage_flags);
        Ok(self.objects.buffers.insert(Buffer::new(info.clone(), api)))
    }

    pub fn destroy_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        remove(&mut self.objects.buffers, handle).map(drop)
    }

    pub fn create_image(&mut self, info: &ImageCreateInfo) -> Result<ImageHandle> {
        self.objects.create_image(self.api.as_ref(), info)
    }

    /// Views of the image are not destroyed with it.
    pub fn destroy_image(&mut self, handle: ImageHandle) -> Result<()> {
        self.objects.destroy_image(handle)
    }

    pub fn create_sampler(&mut self, info: &SamplerCreateInfo) -> Result<SamplerHandle> {
        let api = self.api.create_sampler(info)?;
        Ok(self.objects.samplers.insert(Sampler::new(*info, api)))
    }

    pub fn destroy_sampler(&mut self, handle: SamplerHandle) -> Result<()> {
        remove(&mut self.objects.samplers, handle).map(drop)
    }

    pub fn create_sampled_image_view(&mut self, info: &SampledImageViewCreateInfo) -> Result<SampledImageViewHandle> {
        let image = self.objects.image(info.image)?;
        info.range.validate(image)?;
        let api = self.api.create_sampled_image_view(image, info)?;
        Ok(self.objects.sampled_image_views.insert(SampledImageView::new(*info, api)))
    }

    pub fn destroy_sampled_image_view(&mut self, handle: SampledImageViewHandle) -> Result<()> {
        remove(&mut self.objects.sampled_image_views, handle).map(drop)
    }

    pub fn create_storage_image_view(&mut self, info: &StorageImageViewCreateInfo) -> Result<StorageImageViewHandle> {
        let image = self.objects.image(info.image)?;
        info.range.validate(image)?;
        let api = self.api.create_storage_image_view(image, info)?;
        Ok(self.objects.storage_image_views.insert(StorageImageView::new(*info, api)))
    }

    pub fn destroy_storage_image_view(&mut self, handle: StorageImageViewHandle) -> Result<()> {
        remove(&mut self.objects.storage_image_views, handle).map(drop)
    }

    pub fn create_render_target_view(&mut self, info: &RenderTargetViewCreateInfo) -> Result<RenderTargetViewHandle> {
        self.objects.create_render_target_view(self.api.as_ref(), info)
    }

    pub fn destroy_render_target_view(&mut self, handle: RenderTargetViewHandle) -> Result<()> {
        remove(&mut self.objects.render_target_views, handle).map(drop)
    }

    pub fn create_depth_stencil_view(&mut self, info: &DepthStencilViewCreateInfo) -> Result<DepthStencilViewHandle> {
        self.objects.create_depth_stencil_view(self.api.as_ref(), info)
    }

    pub fn destroy_depth_stencil_view(&mut self, handle: DepthStencilViewHandle) -> Result<()> {
        remove(&mut self.objects.depth_stencil_views, handle).map(drop)
    }

    // Descriptors.

    pub fn create_descriptor_pool(&mut self, info: &DescriptorPoolCreateInfo) -> Result<DescriptorPoolHandle> {
        let api = self.api.create_descriptor_pool(info)?;
        Ok(self.objects.descriptor_pools.insert(DescriptorPool::new(info.clone(), api)))
    }

    /// Sets allocated from the pool are destroyed with it.
    pub fn destroy_descriptor_pool(&mut self, handle: DescriptorPoolHandle) -> Result<()> {
        remove(&mut self.objects.descriptor_pools, handle)?;
        self.objects.descriptor_sets.retain(|_, set| set.pool() != handle);
        Ok(())
    }

    pub fn create_descriptor_set_layout(&mut self, info: &DescriptorSetLayoutCreateInfo) -> Result<DescriptorSetLayoutHandle> {
        info.validate()?;
        if info.pushable && !self.api.supports_push_descriptors() {
            log::error!("pushable descriptor set layouts need push descriptor support");
            return Err(GrfxError::RequiredFeatureUnavailable);
        }
        let api = self.api.create_descriptor_set_layout(info)?;
        Ok(self.objects.descriptor_set_layouts.insert(DescriptorSetLayout::new(info.clone(), api)))
    }

    pub fn destroy_descriptor_set_layout(&mut self, handle: DescriptorSetLayoutHandle) -> Result<()> {
        remove(&mut self.objects.descriptor_set_layouts, handle).map(drop)
    }

    pub fn allocate_descriptor_set(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle> {
        let layout_obj = self.objects.descriptor_set_layouts.get(layout).ok_or(GrfxError::ElementNotFound)?;
        let pool_obj = self.objects.descriptor_pools.get_mut(pool).ok_or(GrfxError::ElementNotFound)?;
        let counts = layout_obj.counts();
        pool_obj.allocate_descriptor_set(counts)?;
        match self.api.allocate_descriptor_set(pool_obj, layout_obj) {
            Ok(api) => Ok(self.objects.descriptor_sets.insert(DescriptorSet::new(pool, layout, counts, api))),
            Err(err) => {
                pool_obj.free_descriptor_set(counts);
                Err(err)
            }
        }
    }

    pub fn free_descriptor_set(&mut self, handle: DescriptorSetHandle) -> Result<()> {
        let set = remove(&mut self.objects.descriptor_sets, handle)?;
        if let Some(pool) = self.objects.descriptor_pools.get_mut(set.pool()) {
            pool.free_descriptor_set(set.counts());
        }
        Ok(())
    }

    /// Writes descriptors into `set`. Every binding is checked against the set's layout before
    /// anything is written.
    pub fn update_descriptors(&self, set: DescriptorSetHandle, writes: &[WriteDescriptor]) -> Result<()> {
        let set = self.objects.descriptor_set(set)?;
        let layout = self.objects.descriptor_set_layout(set.layout())?;
        for write in writes {
            let Some(binding) = layout.binding(write.binding) else {
                log::error!("binding {} is not declared in the set layout", write.binding);
                return Err(GrfxError::BindingNotInSet);
            };
            if write.array_index >= binding.array_count {
                return Err(GrfxError::OutOfRange);
            }
        }
        let resolved = writes
            .iter()
            .map(|write| {
                let buffer = write.buffer.map(|h| self.objects.buffer(h)).transpose()?;
                let image_view = match write.image_view {
                    Some(ImageViewHandle::Sampled(h)) => Some(self.objects.sampled_image_view(h)?.api()),
                    Some(ImageViewHandle::Storage(h)) => Some(self.objects.storage_image_view(h)?.api()),
                    None => None,
                };
                let sampler = write.sampler.map(|h| self.objects.sampler(h)).transpose()?;
                Ok(ResolvedWrite { write, buffer, image_view, sampler })
            })
            .collect::<Result<Vec<_>>>()?;
        set.api().update_descriptors(layout, &resolved)
    }

    pub fn update_sampler(&self, set: DescriptorSetHandle, binding: u32, array_index: u32, sampler: SamplerHandle) -> Result<()> {
        self.update_descriptors(set, &[WriteDescriptor::sampler(binding, array_index, sampler)])
    }

    pub fn update_sampled_image(
        &self,
        set: DescriptorSetHandle,
        binding: u32,
        array_index: u32,
        view: SampledImageViewHandle,
    ) -> Result<()> {
        self.update_descriptors(set, &[WriteDescriptor::sampled_image(binding, array_index, view)])
    }

    pub fn update_storage_image(
        &self,
        set: DescriptorSetHandle,
        binding: u32,
        array_index: u32,
        view: StorageImageViewHandle,
    ) -> Result<()> {
        self.update_descriptors(set, &[WriteDescriptor::storage_image(binding, array_index, view)])
    }

    pub fn update_uniform_buffer(&self, set: DescriptorSetHandle, binding: u32, array_index: u32, buffer: BufferHandle) -> Result<()> {
        self.update_descriptors(set, &[WriteDescriptor::uniform_buffer(binding, array_index, buffer, 0, WHOLE_SIZE)])
    }

    // Shaders and pipelines.

    pub fn create_shader_module(&mut self, info: &ShaderModuleCreateInfo) -> Result<ShaderModuleHandle> {
        if info.code.is_empty() {
            return Err(GrfxError::InvalidCreateArgument);
        }
        let api = self.api.create_shader_module(info)?;
        Ok(self.objects.shader_modules.insert(ShaderModule::new(info.clone(), api)))
    }

    pub fn destroy_shader_module(&mut self, handle: ShaderModuleHandle) -> Result<()> {
        remove(&mut self.objects.shader_modules, handle).map(drop)
    }

    pub fn create_pipeline_interface(&mut self, info: &PipelineInterfaceCreateInfo) -> Result<PipelineInterfaceHandle> {
        let layouts = info
            .sets
            .iter()
            .map(|s| self.objects.descriptor_set_layout(s.layout))
            .collect::<Result<Vec<_>>>()?;
        info.validate(&layouts)?;
        let api = self.api.create_pipeline_interface(info, &layouts)?;
        Ok(self.objects.pipeline_interfaces.insert(PipelineInterface::new(info.clone(), api)))
    }

    pub fn destroy_pipeline_interface(&mut self, handle: PipelineInterfaceHandle) -> Result<()> {
        remove(&mut self.objects.pipeline_interfaces, handle).map(drop)
    }

    pub fn create_graphics_pipeline(&mut self, info: &GraphicsPipelineCreateInfo) -> Result<GraphicsPipelineHandle> {
        info.validate()?;
        let interface_handle = info.pipeline_interface.ok_or(GrfxError::UnexpectedNullArgument)?;
        let interface = self.objects.pipeline_interface(interface_handle)?;
        let stages = info
            .stages()
            .into_iter()
            .filter_map(|(stage, info)| info.map(|info| (stage, info)))
            .map(|(stage, stage_info)| {
                Ok(ResolvedStage {
                    stage,
                    module: self.objects.shader_module(stage_info.module)?,
                    entry_point: &stage_info.entry_point,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let api = self.api.create_graphics_pipeline(&GraphicsPipelineDesc { info, stages, interface })?;
        Ok(self.objects.graphics_pipelines.insert(GraphicsPipeline::new(info.clone(), interface_handle, api)))
    }

    pub fn destroy_graphics_pipeline(&mut self, handle: GraphicsPipelineHandle) -> Result<()> {
        remove(&mut self.objects.graphics_pipelines, handle).map(drop)
    }

    pub fn create_compute_pipeline(&mut self, info: &ComputePipelineCreateInfo) -> Result<ComputePipelineHandle> {
        let interface_handle = info.pipeline_interface.ok_or(GrfxError::UnexpectedNullArgument)?;
        let interface = self.objects.pipeline_interface(interface_handle)?;
        let cs = ResolvedStage {
            stage: ShaderStageFlags::CS,
            module: self.objects.shader_module(info.cs.module)?,
            entry_point: &info.cs.entry_point,
        };
        let api = self.api.create_compute_pipeline(&ComputePipelineDesc { info, cs, interface })?;
        Ok(self.objects.compute_pipelines.insert(ComputePipeline::new(info.clone(), interface_handle, api)))
    }

    pub fn destroy_compute_pipeline(&mut self, handle: ComputePipelineHandle) -> Result<()> {
        remove(&mut self.objects.compute_pipelines, handle).map(drop)
    }

    // Render passes.

    pub fn create_render_pass(&mut self, info: &RenderPassCreateInfo) -> Result<RenderPassHandle> {
        self.objects.create_render_pass(self.api.as_ref(), info, false)
    }

    pub fn create_render_pass_from_images(&mut self, info: &RenderPassImagesCreateInfo) -> Result<RenderPassHandle> {
        self.objects.create_render_pass_from_images(self.api.as_ref(), info)
    }

    pub fn destroy_render_pass(&mut self, handle: RenderPassHandle) -> Result<()> {
        self.objects.destroy_render_pass(handle)
    }

    // Commands.

    pub fn create_command_pool(&mut self, queue: QueueHandle) -> Result<CommandPoolHandle> {
        let queue_obj = self.objects.queue(queue)?;
        let command_type = queue_obj.command_type();
        if !matches!(command_type, CommandType::Graphics | CommandType::Compute | CommandType::Transfer) {
            log::error!("no command pool for {:?} queues", command_type);
            return Err(GrfxError::InvalidCreateArgument);
        }
        let api = self.api.create_command_pool(queue_obj)?;
        Ok(self.objects.command_pools.insert(CommandPool::new(queue, command_type, api)))
    }

    /// Command buffers allocated from the pool are destroyed with it.
    pub fn destroy_command_pool(&mut self, handle: CommandPoolHandle) -> Result<()> {
        remove(&mut self.objects.command_pools, handle)?;
        self.command_buffers.retain(|_, cmd| cmd.pool() != handle);
        Ok(())
    }

    pub fn create_command_buffer(
        &mut self,
        pool: CommandPoolHandle,
        info: &CommandBufferCreateInfo,
    ) -> Result<CommandBufferHandle> {
        info.validate()?;
        let pool_obj = self.objects.command_pool(pool)?;
        let lock = self.objects.queue(pool_obj.queue())?.command_buffer_lock();
        let _guard = lock.lock();
        let api = self.api.create_command_buffer(pool_obj, info)?;
        Ok(self.command_buffers.insert(CommandBuffer::new(pool, pool_obj.command_type(), *info, api)))
    }

    pub fn destroy_command_buffer(&mut self, handle: CommandBufferHandle) -> Result<()> {
        remove(&mut self.command_buffers, handle).map(drop)
    }

    pub fn command_buffer(&self, handle: CommandBufferHandle) -> Result<&CommandBuffer> {
        self.command_buffers.get(handle).ok_or(GrfxError::ElementNotFound)
    }

    /// Starts recording access to one command buffer.
    pub fn record(&mut self, handle: CommandBufferHandle) -> Result<CommandRecorder<'_>> {
        let cmd = self.command_buffers.get_mut(handle).ok_or(GrfxError::ElementNotFound)?;
        Ok(CommandRecorder::new(cmd, &self.objects))
    }

    // Synchronization and queries.

    pub fn create_fence(&mut self, info: &FenceCreateInfo) -> Result<FenceHandle> {
        let api = self.api.create_fence(info)?;
        Ok(self.objects.fences.insert(Fence::new(*info, api)))
    }

    pub fn destroy_fence(&mut self, handle: FenceHandle) -> Result<()> {
        remove(&mut self.objects.fences, handle).map(drop)
    }

    pub fn create_semaphore(&mut self, info: &SemaphoreCreateInfo) -> Result<SemaphoreHandle> {
        let api = self.api.create_semaphore(info)?;
        Ok(self.objects.semaphores.insert(Semaphore::new(*info, api)))
    }

    pub fn destroy_semaphore(&mut self, handle: SemaphoreHandle) -> Result<()> {
        remove(&mut self.objects.semaphores, handle).map(drop)
    }

    pub fn create_query(&mut self, info: &QueryCreateInfo) -> Result<QueryHandle> {
        if info.count == 0 {
            return Err(GrfxError::InvalidCreateArgument);
        }
        let api = self.api.create_query(info)?;
        Ok(self.objects.queries.insert(Query::new(*info, api)))
    }

    pub fn destroy_query(&mut self, handle: QueryHandle) -> Result<()> {
        remove(&mut self.objects.queries, handle).map(drop)
    }

    // Submission.

    pub fn submit(&self, queue: QueueHandle, info: &SubmitInfo) -> Result<()> {
        let queue = self.objects.queue(queue)?;
        let mut batch = SubmitBatch::default();
        for handle in &info.command_buffers {
            let cmd = self.command_buffer(*handle)?;
            if cmd.is_recording() {
                log::error!("submitting a command buffer that is still recording");
                return Err(GrfxError::Failed);
            }
            batch.command_buffers.push(cmd);
        }
        for (i, handle) in info.wait_semaphores.iter().enumerate() {
            let semaphore = self.objects.semaphore(*handle)?;
            let value = if semaphore.is_timeline() {
                *info.wait_values.get(i).ok_or(GrfxError::UnexpectedCountValue)?
            } else {
                semaphore.wait_for_value()
            };
            batch.waits.push((semaphore, value));
        }
        for (i, handle) in info.signal_semaphores.iter().enumerate() {
            let semaphore = self.objects.semaphore(*handle)?;
            let value = if semaphore.is_timeline() {
                *info.signal_values.get(i).ok_or(GrfxError::UnexpectedCountValue)?
            } else {
                semaphore.next_signal_value()
            };
            batch.signals.push((semaphore, value));
        }
        if let Some(handle) = info.fence {
            let fence = self.objects.fence(handle)?;
            batch.fence = Some((fence, fence.next_signal_value()));
        }
        queue.api().submit(&batch)
    }

    /// GPU-side wait on a timeline value.
    pub fn queue_wait(&self, queue: QueueHandle, semaphore: SemaphoreHandle, value: u64) -> Result<()> {
        let queue = self.objects.queue(queue)?;
        let semaphore = self.objects.semaphore(semaphore)?;
        if !semaphore.is_timeline() {
            return Err(GrfxError::InvalidSemaphoreType);
        }
        queue.api().queue_wait(semaphore, value)
    }

    /// GPU-side signal of a timeline value.
    pub fn queue_signal(&self, queue: QueueHandle, semaphore: SemaphoreHandle, value: u64) -> Result<()> {
        let queue = self.objects.queue(queue)?;
        let semaphore = self.objects.semaphore(semaphore)?;
        if !semaphore.is_timeline() {
            return Err(GrfxError::InvalidSemaphoreType);
        }
        queue.api().queue_signal(semaphore, value)
    }

    pub fn wait_idle(&self) -> Result<()> {
        for queue in self.objects.queues.values() {
            queue.wait_idle()?;
        }
        Ok(())
    }

    /// Blocking copy through a temporary command buffer. `dst` goes through COPY_DST and ends in
    /// `state_after`.
    pub fn copy_buffer_to_buffer(
        &mut self,
        queue: QueueHandle,
        info: &BufferToBufferCopyInfo,
        src: BufferHandle,
        dst: BufferHandle,
        state_before: ResourceState,
        state_after: ResourceState,
    ) -> Result<()> {
        self.one_shot(queue, |rec| {
            rec.buffer_resource_barrier(dst, state_before, ResourceState::CopyDst)?;
            rec.copy_buffer_to_buffer(info, src, dst)?;
            rec.buffer_resource_barrier(dst, ResourceState::CopyDst, state_after)
        })
    }

    /// Blocking buffer-to-image copy; the given subresources of `dst` go through COPY_DST.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_buffer_to_image(
        &mut self,
        queue: QueueHandle,
        infos: &[BufferToImageCopyInfo],
        src: BufferHandle,
        dst: ImageHandle,
        mip_level: u32,
        mip_level_count: u32,
        array_layer: u32,
        array_layer_count: u32,
        state_before: ResourceState,
        state_after: ResourceState,
    ) -> Result<()> {
        self.one_shot(queue, |rec| {
            rec.transition_image_layout(
                dst,
                mip_level,
                mip_level_count,
                array_layer,
                array_layer_count,
                state_before,
                ResourceState::CopyDst,
            )?;
            rec.copy_buffer_to_image_regions(infos, src, dst)?;
            rec.transition_image_layout(
                dst,
                mip_level,
                mip_level_count,
                array_layer,
                array_layer_count,
                ResourceState::CopyDst,
                state_after,
            )
        })
    }

    fn one_shot(&mut self, queue: QueueHandle, record: impl FnOnce(&mut CommandRecorder<'_>) -> Result<()>) -> Result<()> {
        let pool = self.create_command_pool(queue)?;
        let result = self.run_one_shot(queue, pool, record);
        let destroyed = self.destroy_command_pool(pool);
        result.and(destroyed)
    }

    fn run_one_shot(
        &mut self,
        queue: QueueHandle,
        pool: CommandPoolHandle,
        record: impl FnOnce(&mut CommandRecorder<'_>) -> Result<()>,
    ) -> Result<()> {
        let cmd = self.create_command_buffer(pool, &CommandBufferCreateInfo::default())?;
        {
            let mut rec = self.record(cmd)?;
            rec.begin()?;
            record(&mut rec)?;
            rec.end()?;
        }
        self.submit(queue, &SubmitInfo { command_buffers: vec![cmd], ..Default::default() })?;
        self.objects.queue(queue)?.wait_idle()
    }

    // Swapchains.

    pub fn create_swapchain(&mut self, info: &SwapchainCreateInfo) -> Result<SwapchainHandle> {
        let swapchain = Swapchain::create(self.api.as_ref(), &mut self.objects, info)?;
        Ok(self.swapchains.insert(swapchain))
    }

    /// Destroys the swapchain with its images, views and render passes.
    pub fn destroy_swapchain(&mut self, handle: SwapchainHandle) -> Result<()> {
        let swapchain = remove(&mut self.swapchains, handle)?;
        swapchain.destroy(&mut self.objects);
        Ok(())
    }

    pub fn swapchain(&self, handle: SwapchainHandle) -> Result<&Swapchain> {
        self.swapchains.get(handle).ok_or(GrfxError::ElementNotFound)
    }

    pub fn acquire_next_image(
        &mut self,
        swapchain: SwapchainHandle,
        timeout_ns: u64,
        semaphore: Option<SemaphoreHandle>,
        fence: Option<FenceHandle>,
    ) -> Result<u32> {
        let swapchain = self.swapchains.get_mut(swapchain).ok_or(GrfxError::ElementNotFound)?;
        swapchain.acquire_next_image(&self.objects, timeout_ns, semaphore, fence)
    }

    pub fn present(&mut self, swapchain: SwapchainHandle, image_index: u32, wait_semaphores: &[SemaphoreHandle]) -> Result<()> {
        let swapchain = self.swapchains.get_mut(swapchain).ok_or(GrfxError::ElementNotFound)?;
        swapchain.present(&self.objects, image_index, wait_semaphores)
    }

    /// Recreates the swapchain images in place. Vulkan swapchains fail with `Failed` and must be
    /// destroyed and created again instead.
    pub fn resize_swapchain(&mut self, swapchain: SwapchainHandle, width: u32, height: u32) -> Result<()> {
        let swapchain = self.swapchains.get_mut(swapchain).ok_or(GrfxError::ElementNotFound)?;
        swapchain.resize(self.api.as_ref(), &mut self.objects, width, height)
    }

    /// First render target view of the swapchain render pass for `image_index`.
    pub fn swapchain_render_target_view(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        load_op: AttachmentLoadOp,
    ) -> Result<RenderTargetViewHandle> {
        let pass = self.swapchain(swapchain)?.render_pass(image_index, load_op)?;
        self.objects.render_pass(pass)?.render_target_view(0).ok_or(GrfxError::ElementNotFound)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(err) = self.wait_idle() {
            log::warn!("wait idle failed while destroying device: {}", err);
        }
        log::debug!("Device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::WriteDescriptor;
    use crate::format::Format;
    use crate::instance::Instance;
    use crate::mock::{MockDevice, MockInstance};
    use crate::types::{BufferUsageFlags, DescriptorType, MemoryUsage, PresentMode};
    use crate::{DescriptorBinding, DescriptorPoolCreateInfo, DescriptorSetLayoutCreateInfo, InstanceCreateInfo};

    fn backends() -> [Api; 2] {
        [Api::Dx12_0, Api::Vk1_2]
    }

    fn with_device(api: Api, f: impl FnOnce(&mut Device)) {
        let mut instance = Instance::with_api(InstanceCreateInfo::new(api), Box::new(MockInstance::new(api))).unwrap();
        let info = DeviceCreateInfo { transfer_queue_count: 1, ..Default::default() };
        let handle = instance.create_device(&info).unwrap();
        f(instance.device_mut(handle).unwrap());
    }

    fn barrier_count(device: &Device) -> usize {
        device.api_object().as_any().downcast_ref::<MockDevice>().unwrap().barrier_count()
    }

    fn sampler_and_uniform_set(device: &mut Device) -> (DescriptorPoolHandle, DescriptorSetHandle) {
        let pool = device
            .create_descriptor_pool(&DescriptorPoolCreateInfo { sampler: 1, sampled_image: 1, uniform_buffer: 1, ..Default::default() })
            .unwrap();
        let layout = device
            .create_descriptor_set_layout(&DescriptorSetLayoutCreateInfo::new(vec![
                DescriptorBinding::new(0, DescriptorType::Sampler),
                DescriptorBinding::new(1, DescriptorType::UniformBuffer),
            ]))
            .unwrap();
        let set = device.allocate_descriptor_set(pool, layout).unwrap();
        (pool, set)
    }

    #[test]
    fn sampler_and_uniform_buffer_writes_succeed() {
        for api in backends() {
            with_device(api, |device| {
                let (_, set) = sampler_and_uniform_set(device);
                let sampler = device.create_sampler(&SamplerCreateInfo::default()).unwrap();
                let buffer = device
                    .create_buffer(&BufferCreateInfo::new(256, BufferUsageFlags::UNIFORM_BUFFER, MemoryUsage::CpuToGpu))
                    .unwrap();
                let writes = [
                    WriteDescriptor::sampler(0, 0, sampler),
                    WriteDescriptor::uniform_buffer(1, 0, buffer, 0, WHOLE_SIZE),
                ];
                assert_eq!(device.update_descriptors(set, &writes), Ok(()), "{:?}", api);
            });
        }
    }

    #[test]
    fn undeclared_bindings_fail_before_any_write() {
        for api in backends() {
            with_device(api, |device| {
                let (_, set) = sampler_and_uniform_set(device);
                let sampler = device.create_sampler(&SamplerCreateInfo::default()).unwrap();
                let writes = [WriteDescriptor::sampler(0, 0, sampler), WriteDescriptor::sampler(5, 0, sampler)];
                assert_eq!(device.update_descriptors(set, &writes), Err(GrfxError::BindingNotInSet));
                assert_eq!(device.update_sampler(set, 0, 1, sampler), Err(GrfxError::OutOfRange));
            });
        }
    }

    #[test]
    fn exhausted_pools_keep_their_counts() {
        for api in backends() {
            with_device(api, |device| {
                let (pool, set) = sampler_and_uniform_set(device);
                let before = device.descriptor_pool(pool).unwrap().allocated();
                let layout = device.descriptor_set(set).unwrap().layout();
                assert_eq!(device.allocate_descriptor_set(pool, layout).err(), Some(GrfxError::OutOfMemory));
                assert_eq!(device.descriptor_pool(pool).unwrap().allocated(), before);

                device.free_descriptor_set(set).unwrap();
                assert_eq!(device.descriptor_pool(pool).unwrap().allocated(), crate::descriptor::DescriptorCounts::default());
                assert!(device.allocate_descriptor_set(pool, layout).is_ok());
            });
        }
    }

    #[test]
    fn destroyed_handles_go_stale() {
        for api in backends() {
            with_device(api, |device| {
                let buffer = device.create_buffer(&BufferCreateInfo::staging(64)).unwrap();
                device.destroy_buffer(buffer).unwrap();
                assert_eq!(device.buffer(buffer).err(), Some(GrfxError::ElementNotFound));
                assert_eq!(device.destroy_buffer(buffer), Err(GrfxError::ElementNotFound));
            });
        }
    }

    #[test]
    fn headless_rotation_advances_on_acquire_only() {
        for api in backends() {
            with_device(api, |device| {
                let info = SwapchainCreateInfo {
                    queue: device.graphics_queue(0).unwrap(),
                    surface: None,
                    width: 64,
                    height: 64,
                    color_format: Format::B8G8R8A8Unorm,
                    depth_format: Format::Undefined,
                    image_count: 2,
                    present_mode: PresentMode::Fifo,
                };
                let swapchain = device.create_swapchain(&info).unwrap();
                assert!(device.swapchain(swapchain).unwrap().is_headless());

                let index = device.acquire_next_image(swapchain, u64::MAX, None, None).unwrap();
                assert_eq!(index, 0);
                device.present(swapchain, index, &[]).unwrap();
                device.present(swapchain, index, &[]).unwrap();
                assert_eq!(device.swapchain(swapchain).unwrap().current_image_index(), 0);

                assert_eq!(device.acquire_next_image(swapchain, u64::MAX, None, None), Ok(1));
                assert_eq!(device.acquire_next_image(swapchain, u64::MAX, None, None), Ok(0));
                assert_eq!(device.present(swapchain, 2, &[]), Err(GrfxError::OutOfRange));
            });
        }
    }

    #[test]
    fn headless_resize_fails_on_vulkan_only() {
        for api in backends() {
            with_device(api, |device| {
                let info = SwapchainCreateInfo {
                    queue: device.graphics_queue(0).unwrap(),
                    width: 64,
                    height: 64,
                    color_format: Format::B8G8R8A8Unorm,
                    image_count: 2,
                    ..Default::default()
                };
                let swapchain = device.create_swapchain(&info).unwrap();
                let expected = if api.is_vk() { Err(GrfxError::Failed) } else { Ok(()) };
                assert_eq!(device.resize_swapchain(swapchain, 32, 32), expected, "{:?}", api);
                let width = if api.is_vk() { 64 } else { 32 };
                assert_eq!(device.swapchain(swapchain).unwrap().width(), width);
            });
        }
    }

    #[test]
    fn same_state_barriers_never_reach_the_backend() {
        with_device(Api::Vk1_2, |device| {
            let queue = device.graphics_queue(0).unwrap();
            let image = device.create_image(&ImageCreateInfo::sampled_image_2d(16, 16, Format::R8G8B8A8Unorm)).unwrap();
            let buffer = device.create_buffer(&BufferCreateInfo::staging(64)).unwrap();
            let pool = device.create_command_pool(queue).unwrap();
            let cmd = device.create_command_buffer(pool, &CommandBufferCreateInfo::default()).unwrap();
            let mut rec = device.record(cmd).unwrap();
            rec.begin().unwrap();
            rec.transition_image(image, ResourceState::ShaderResource, ResourceState::ShaderResource).unwrap();
            rec.buffer_resource_barrier(buffer, ResourceState::CopySrc, ResourceState::CopySrc).unwrap();
            rec.transition_image(image, ResourceState::ShaderResource, ResourceState::CopyDst).unwrap();
            rec.buffer_resource_barrier(buffer, ResourceState::CopySrc, ResourceState::General).unwrap();
            rec.end().unwrap();
            drop(rec);
            assert_eq!(barrier_count(device), 2);
        });
    }

    #[test]
    fn one_shot_copies_land_in_the_destination() {
        for api in backends() {
            with_device(api, |device| {
                let queue = device.transfer_queue(0).unwrap();
                let payload: Vec<u8> = (0..64).rev().collect();
                let src = device.create_buffer(&BufferCreateInfo::staging(64)).unwrap();
                device.buffer(src).unwrap().copy_from_source(&payload).unwrap();
                let dst = device
                    .create_buffer(&BufferCreateInfo::new(64, BufferUsageFlags::TRANSFER_DST, MemoryUsage::GpuToCpu))
                    .unwrap();
                let info = BufferToBufferCopyInfo { size: 32, src_offset: 16, dst_offset: 0 };
                device.copy_buffer_to_buffer(queue, &info, src, dst, ResourceState::General, ResourceState::General).unwrap();

                let mut out = vec![0u8; 32];
                device.buffer(dst).unwrap().copy_to_dest(&mut out).unwrap();
                assert_eq!(out, payload[16..48]);
                assert_eq!(barrier_count(device), 2, "General to CopyDst and back");
            });
        }
    }

    #[test]
    fn gpu_only_buffers_cannot_be_mapped() {
        with_device(Api::Dx12_0, |device| {
            let buffer = device
                .create_buffer(&BufferCreateInfo::new(64, BufferUsageFlags::VERTEX_BUFFER, MemoryUsage::GpuOnly))
                .unwrap();
            assert_eq!(device.buffer(buffer).unwrap().copy_from_source(&[1, 2, 3]), Err(GrfxError::Failed));
        });
    }
}
