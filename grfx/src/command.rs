//! Command pools, command buffers and the recorder that drives them.
//!
//! A [`CommandBuffer`] lives in the device registry. Recording goes through a [`CommandRecorder`],
//! which borrows the buffer mutably and every other object immutably, resolves handles and
//! forwards to the backend.

use crate::backend::{CommandBufferApi, CommandPoolApi, ImageViewApi};
use crate::buffer::Buffer;
use crate::descriptor::{DescriptorSet, DescriptorSetLayout};
use crate::device::Objects;
use crate::error::{GrfxError, Result};
use crate::image::{Image, Sampler};
use crate::pipeline::PipelineInterface;
use crate::queue::Queue;
use crate::types::{
    AttachmentLoadOp, CommandType, DepthStencilClearValue, DescriptorType, Filter, IndexType, PipelineBindPoint,
    PipelineStage, QueryType, Rect, RenderTargetClearValue, ResourceState, Viewport,
};
use crate::{
    BufferHandle, CommandPoolHandle, ComputePipelineHandle, DescriptorSetHandle, GraphicsPipelineHandle,
    ImageHandle, PipelineInterfaceHandle, QueryHandle, QueueHandle, RenderPassHandle, SampledImageViewHandle,
    SamplerHandle, StorageImageViewHandle, DEFAULT_RESOURCE_DESCRIPTOR_COUNT, DEFAULT_SAMPLER_DESCRIPTOR_COUNT,
    MAX_PUSH_CONSTANTS, MAX_SAMPLER_DESCRIPTORS, MAX_SCISSORS, MAX_VERTEX_BINDINGS, MAX_VIEWPORTS,
    REMAINING_ARRAY_LAYERS, REMAINING_MIP_LEVELS, WHOLE_SIZE,
};

#[derive(Debug)]
pub struct CommandPool {
    queue: QueueHandle,
    command_type: CommandType,
    api: Box<dyn CommandPoolApi>,
}

impl CommandPool {
    pub(crate) fn new(queue: QueueHandle, command_type: CommandType, api: Box<dyn CommandPoolApi>) -> Self {
        Self { queue, command_type, api }
    }

    pub fn queue(&self) -> QueueHandle {
        self.queue
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn api(&self) -> &dyn CommandPoolApi {
        self.api.as_ref()
    }
}

/// Sizes of the shader-visible descriptor heaps a D3D12 command buffer binds sets into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBufferCreateInfo {
    pub resource_descriptor_count: u32,
    pub sampler_descriptor_count: u32,
}

impl Default for CommandBufferCreateInfo {
    fn default() -> Self {
        Self {
            resource_descriptor_count: DEFAULT_RESOURCE_DESCRIPTOR_COUNT,
            sampler_descriptor_count: DEFAULT_SAMPLER_DESCRIPTOR_COUNT,
        }
    }
}

impl CommandBufferCreateInfo {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.sampler_descriptor_count > MAX_SAMPLER_DESCRIPTORS {
            log::error!(
                "sampler descriptor count {} exceeds {}",
                self.sampler_descriptor_count,
                MAX_SAMPLER_DESCRIPTORS
            );
            return Err(GrfxError::LimitExceeded);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct CommandBuffer {
    pool: CommandPoolHandle,
    command_type: CommandType,
    create_info: CommandBufferCreateInfo,
    recording: bool,
    current_render_pass: Option<RenderPassHandle>,
    api: Box<dyn CommandBufferApi>,
}

impl CommandBuffer {
    pub(crate) fn new(
        pool: CommandPoolHandle,
        command_type: CommandType,
        create_info: CommandBufferCreateInfo,
        api: Box<dyn CommandBufferApi>,
    ) -> Self {
        Self { pool, command_type, create_info, recording: false, current_render_pass: None, api }
    }

    pub fn pool(&self) -> CommandPoolHandle {
        self.pool
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn create_info(&self) -> &CommandBufferCreateInfo {
        &self.create_info
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn has_active_render_pass(&self) -> bool {
        self.current_render_pass.is_some()
    }

    pub fn api(&self) -> &dyn CommandBufferApi {
        self.api.as_ref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferToBufferCopyInfo {
    pub size: u64,
    pub src_offset: u64,
    pub dst_offset: u64,
}

/// Source layout of a buffer-to-image copy. Footprint fields override the image extent when set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFootprint {
    /// [pixels]
    pub image_width: u32,
    /// [pixels]
    pub image_height: u32,
    /// [bytes] Must honor the backend row-pitch alignment.
    pub image_row_stride: u32,
    /// [bytes]
    pub footprint_offset: u64,
    pub footprint_width: u32,
    pub footprint_height: u32,
    pub footprint_depth: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageRegion {
    pub mip_level: u32,
    /// Must be 0 for 3D images.
    pub array_layer: u32,
    /// Must be 1 for 3D images.
    pub array_layer_count: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferToImageCopyInfo {
    pub src_buffer: BufferFootprint,
    pub dst_image: ImageRegion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSubresourceOffset {
    pub mip_level: u32,
    pub array_layer: u32,
    pub array_layer_count: u32,
    pub offset: [u32; 3],
}

impl Default for ImageSubresourceOffset {
    fn default() -> Self {
        Self { mip_level: 0, array_layer: 0, array_layer_count: 1, offset: [0; 3] }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageToBufferCopyInfo {
    pub src_image: ImageSubresourceOffset,
    /// Region size in pixels.
    pub extent: [u32; 3],
}

/// Row pitch of the data written by an image-to-buffer copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageToBufferOutputPitch {
    pub row_pitch: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageToImageCopyInfo {
    pub src_image: ImageSubresourceOffset,
    pub dst_image: ImageSubresourceOffset,
    pub extent: [u32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBlitRegion {
    pub mip_level: u32,
    pub array_layer: u32,
    pub array_layer_count: u32,
    /// Opposite corners of the region.
    pub offsets: [[i32; 3]; 2],
}

impl Default for ImageBlitRegion {
    fn default() -> Self {
        Self { mip_level: 0, array_layer: 0, array_layer_count: 1, offsets: [[0; 3]; 2] }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageBlitInfo {
    pub src_image: ImageBlitRegion,
    pub dst_image: ImageBlitRegion,
    pub filter: Filter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferView {
    pub buffer: BufferHandle,
    pub index_type: IndexType,
    pub offset: u64,
    /// `WHOLE_SIZE` means the rest of the buffer.
    pub size: u64,
}

impl IndexBufferView {
    pub fn new(buffer: BufferHandle, index_type: IndexType) -> Self {
        Self { buffer, index_type, offset: 0, size: WHOLE_SIZE }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferView {
    pub buffer: BufferHandle,
    pub stride: u32,
    pub offset: u64,
    pub size: u64,
}

impl VertexBufferView {
    pub fn new(buffer: BufferHandle, stride: u32) -> Self {
        Self { buffer, stride, offset: 0, size: WHOLE_SIZE }
    }
}

#[derive(Debug, Clone)]
pub struct RenderPassBeginInfo {
    pub render_pass: RenderPassHandle,
    pub render_area: Rect,
    pub rtv_clear_values: Vec<RenderTargetClearValue>,
    pub dsv_clear_value: DepthStencilClearValue,
}

/// Mip/layer range with `REMAINING_*` counts already resolved against the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceRange {
    pub mip_level: u32,
    pub mip_level_count: u32,
    pub array_layer: u32,
    pub array_layer_count: u32,
}

impl SubresourceRange {
    pub fn resolve(image: &Image, mip_level: u32, mip_level_count: u32, array_layer: u32, array_layer_count: u32) -> Result<Self> {
        let total_mips = image.mip_level_count();
        let total_layers = image.array_layer_count();
        if mip_level >= total_mips || array_layer >= total_layers {
            return Err(GrfxError::OutOfRange);
        }
        let mip_level_count = if mip_level_count == REMAINING_MIP_LEVELS { total_mips - mip_level } else { mip_level_count };
        let array_layer_count =
            if array_layer_count == REMAINING_ARRAY_LAYERS { total_layers - array_layer } else { array_layer_count };
        if mip_level + mip_level_count > total_mips || array_layer + array_layer_count > total_layers {
            return Err(GrfxError::OutOfRange);
        }
        Ok(Self { mip_level, mip_level_count, array_layer, array_layer_count })
    }

    pub fn all(image: &Image) -> Self {
        Self { mip_level: 0, mip_level_count: image.mip_level_count(), array_layer: 0, array_layer_count: image.array_layer_count() }
    }

    pub fn covers_all(&self, image: &Image) -> bool {
        *self == Self::all(image)
    }
}

/// Ownership transfer between two queues, carried by a barrier.
#[derive(Debug, Clone, Copy)]
pub struct QueueTransfer<'a> {
    pub src: &'a Queue,
    pub dst: &'a Queue,
}

/// A descriptor set together with its layout and the set number it binds to.
#[derive(Debug, Clone, Copy)]
pub struct BoundSet<'a> {
    pub set_number: u32,
    pub set: &'a DescriptorSet,
    pub layout: &'a DescriptorSetLayout,
}

/// One push descriptor, resolved.
#[derive(Debug, Clone, Copy)]
pub struct PushDescriptor<'a> {
    pub descriptor_type: DescriptorType,
    pub binding: u32,
    pub set: u32,
    pub buffer_offset: u64,
    pub buffer: Option<&'a Buffer>,
    pub image_view: Option<&'a dyn ImageViewApi>,
    pub sampler: Option<&'a Sampler>,
}

/// Records into one command buffer while borrowing every other device object.
pub struct CommandRecorder<'a> {
    cmd: &'a mut CommandBuffer,
    objects: &'a Objects,
}

impl<'a> CommandRecorder<'a> {
    pub(crate) fn new(cmd: &'a mut CommandBuffer, objects: &'a Objects) -> Self {
        Self { cmd, objects }
    }

    pub fn command_buffer(&self) -> &CommandBuffer {
        self.cmd
    }

    /// Resets the native allocator and every binding cache.
    pub fn begin(&mut self) -> Result<()> {
        self.cmd.api.begin()?;
        self.cmd.recording = true;
        self.cmd.current_render_pass = None;
        Ok(())
    }

    pub fn end(&mut self) -> Result<()> {
        assert!(self.cmd.current_render_pass.is_none(), "command buffer ended inside a render pass");
        self.cmd.api.end()?;
        self.cmd.recording = false;
        Ok(())
    }

    pub fn begin_render_pass(&mut self, begin_info: &RenderPassBeginInfo) -> Result<()> {
        assert!(self.cmd.current_render_pass.is_none(), "cannot nest render passes");
        let pass = self.objects.render_pass(begin_info.render_pass)?;
        if self.objects.render_pass_has_load_op_clear(pass) {
            assert!(
                begin_info.rtv_clear_values.len() >= pass.render_target_count(),
                "clear count cannot be less than the render target count"
            );
        }
        self.cmd.api.begin_render_pass(pass, begin_info)?;
        self.cmd.current_render_pass = Some(begin_info.render_pass);
        Ok(())
    }

    /// Begins `render_pass` with the clear values stored on its images.
    pub fn begin_render_pass_with_image_clears(&mut self, render_pass: RenderPassHandle) -> Result<()> {
        let pass = self.objects.render_pass(render_pass)?;
        let rtv_clear_values = pass
            .render_target_images()
            .iter()
            .map(|h| self.objects.image(*h).map(|image| image.create_info().rtv_clear_value))
            .collect::<Result<Vec<_>>>()?;
        let dsv_clear_value = match pass.depth_stencil_image() {
            Some(h) => self.objects.image(h)?.create_info().dsv_clear_value,
            None => DepthStencilClearValue::default(),
        };
        let begin_info = RenderPassBeginInfo { render_pass, render_area: pass.render_area(), rtv_clear_values, dsv_clear_value };
        self.begin_render_pass(&begin_info)
    }

    pub fn end_render_pass(&mut self) {
        assert!(self.cmd.current_render_pass.is_some(), "no render pass to end");
        self.cmd.api.end_render_pass();
        self.cmd.current_render_pass = None;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn transition_image_layout(
        &mut self,
        image: ImageHandle,
        mip_level: u32,
        mip_level_count: u32,
        array_layer: u32,
        array_layer_count: u32,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<()> {
        let image = self.objects.image(image)?;
        let range = SubresourceRange::resolve(image, mip_level, mip_level_count, array_layer, array_layer_count)?;
        if before == after {
            return Ok(());
        }
        self.cmd.api.transition_image_layout(image, range, before, after, None)
    }

    /// Transitions every subresource of `image`.
    pub fn transition_image(&mut self, image: ImageHandle, before: ResourceState, after: ResourceState) -> Result<()> {
        self.transition_image_layout(image, 0, REMAINING_MIP_LEVELS, 0, REMAINING_ARRAY_LAYERS, before, after)
    }

    /// Whole-image transition that also moves ownership from `src_queue` to `dst_queue`.
    pub fn transition_image_between_queues(
        &mut self,
        image: ImageHandle,
        before: ResourceState,
        after: ResourceState,
        src_queue: QueueHandle,
        dst_queue: QueueHandle,
    ) -> Result<()> {
        let image = self.objects.image(image)?;
        let transfer = QueueTransfer { src: self.objects.queue(src_queue)?, dst: self.objects.queue(dst_queue)? };
        self.cmd.api.transition_image_layout(image, SubresourceRange::all(image), before, after, Some(transfer))
    }

    /// Transitions all render targets, then the depth-stencil target, of a render pass.
    pub fn transition_render_pass(
        &mut self,
        render_pass: RenderPassHandle,
        render_target_before: ResourceState,
        render_target_after: ResourceState,
        depth_stencil_before: ResourceState,
        depth_stencil_after: ResourceState,
    ) -> Result<()> {
        let pass = self.objects.render_pass(render_pass)?;
        for handle in pass.render_target_images().iter().filter(|_| render_target_before != render_target_after) {
            let image = self.objects.image(*handle)?;
            self.cmd.api.transition_image_layout(
                image,
                SubresourceRange::all(image),
                render_target_before,
                render_target_after,
                None,
            )?;
        }
        if let Some(handle) = pass.depth_stencil_image().filter(|_| depth_stencil_before != depth_stencil_after) {
            let image = self.objects.image(handle)?;
            self.cmd.api.transition_image_layout(
                image,
                SubresourceRange::all(image),
                depth_stencil_before,
                depth_stencil_after,
                None,
            )?;
        }
        Ok(())
    }

    pub fn buffer_resource_barrier(&mut self, buffer: BufferHandle, before: ResourceState, after: ResourceState) -> Result<()> {
        let buffer = self.objects.buffer(buffer)?;
        if before == after {
            return Ok(());
        }
        self.cmd.api.buffer_resource_barrier(buffer, before, after, None)
    }

    pub fn buffer_barrier_between_queues(
        &mut self,
        buffer: BufferHandle,
        before: ResourceState,
        after: ResourceState,
        src_queue: QueueHandle,
        dst_queue: QueueHandle,
    ) -> Result<()> {
        let buffer = self.objects.buffer(buffer)?;
        let transfer = QueueTransfer { src: self.objects.queue(src_queue)?, dst: self.objects.queue(dst_queue)? };
        self.cmd.api.buffer_resource_barrier(buffer, before, after, Some(transfer))
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) {
        assert!(viewports.len() <= MAX_VIEWPORTS, "viewport count exceeds {}", MAX_VIEWPORTS);
        self.cmd.api.set_viewports(viewports);
    }

    pub fn set_scissors(&mut self, scissors: &[Rect]) {
        assert!(scissors.len() <= MAX_SCISSORS, "scissor count exceeds {}", MAX_SCISSORS);
        self.cmd.api.set_scissors(scissors);
    }

    pub fn bind_graphics_descriptor_sets(&mut self, interface: PipelineInterfaceHandle, sets: &[DescriptorSetHandle]) -> Result<()> {
        self.bind_descriptor_sets(PipelineBindPoint::Graphics, interface, sets)
    }

    pub fn bind_compute_descriptor_sets(&mut self, interface: PipelineInterfaceHandle, sets: &[DescriptorSetHandle]) -> Result<()> {
        self.bind_descriptor_sets(PipelineBindPoint::Compute, interface, sets)
    }

    fn bind_descriptor_sets(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: PipelineInterfaceHandle,
        sets: &[DescriptorSetHandle],
    ) -> Result<()> {
        let interface = self.objects.pipeline_interface(interface)?;
        let set_numbers = interface.set_numbers();
        assert!(
            sets.len() <= set_numbers.len(),
            "binding {} sets to an interface declaring {}",
            sets.len(),
            set_numbers.len()
        );
        let mut bound = Vec::with_capacity(sets.len());
        for (handle, set_number) in sets.iter().zip(set_numbers) {
            let set = self.objects.descriptor_set(*handle)?;
            let layout = self.objects.descriptor_set_layout(set.layout())?;
            bound.push(BoundSet { set_number: *set_number, set, layout });
        }
        self.cmd.api.bind_descriptor_sets(bind_point, interface, &bound)
    }

    pub fn push_graphics_constants(&mut self, interface: PipelineInterfaceHandle, values: &[u32], dst_offset: u32) -> Result<()> {
        self.push_constants(PipelineBindPoint::Graphics, interface, values, dst_offset)
    }

    pub fn push_compute_constants(&mut self, interface: PipelineInterfaceHandle, values: &[u32], dst_offset: u32) -> Result<()> {
        self.push_constants(PipelineBindPoint::Compute, interface, values, dst_offset)
    }

    fn push_constants(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: PipelineInterfaceHandle,
        values: &[u32],
        dst_offset: u32,
    ) -> Result<()> {
        let interface = self.objects.pipeline_interface(interface)?;
        let end = dst_offset as usize + values.len();
        assert!(end <= MAX_PUSH_CONSTANTS as usize, "push constants overflow: {} DWORDs", end);
        assert!(
            end <= interface.push_constants().count as usize,
            "push constants overflow the interface's {} DWORDs",
            interface.push_constants().count
        );
        self.cmd.api.push_constants(bind_point, interface, values, dst_offset)
    }

    pub fn push_graphics_uniform_buffer(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, offset: u64, buffer: BufferHandle) -> Result<()> {
        self.push_buffer(PipelineBindPoint::Graphics, interface, DescriptorType::UniformBuffer, binding, set, offset, buffer)
    }

    pub fn push_graphics_structured_buffer(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, offset: u64, buffer: BufferHandle) -> Result<()> {
        self.push_buffer(PipelineBindPoint::Graphics, interface, DescriptorType::RoStructuredBuffer, binding, set, offset, buffer)
    }

    pub fn push_graphics_storage_buffer(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, offset: u64, buffer: BufferHandle) -> Result<()> {
        self.push_buffer(PipelineBindPoint::Graphics, interface, DescriptorType::RwStructuredBuffer, binding, set, offset, buffer)
    }

    pub fn push_compute_uniform_buffer(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, offset: u64, buffer: BufferHandle) -> Result<()> {
        self.push_buffer(PipelineBindPoint::Compute, interface, DescriptorType::UniformBuffer, binding, set, offset, buffer)
    }

    pub fn push_compute_structured_buffer(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, offset: u64, buffer: BufferHandle) -> Result<()> {
        self.push_buffer(PipelineBindPoint::Compute, interface, DescriptorType::RoStructuredBuffer, binding, set, offset, buffer)
    }

    pub fn push_compute_storage_buffer(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, offset: u64, buffer: BufferHandle) -> Result<()> {
        self.push_buffer(PipelineBindPoint::Compute, interface, DescriptorType::RwStructuredBuffer, binding, set, offset, buffer)
    }

    pub fn push_graphics_sampled_image(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, view: SampledImageViewHandle) -> Result<()> {
        let view = self.objects.sampled_image_view(view)?.api();
        self.push_image(PipelineBindPoint::Graphics, interface, DescriptorType::SampledImage, binding, set, view)
    }

    pub fn push_graphics_storage_image(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, view: StorageImageViewHandle) -> Result<()> {
        let view = self.objects.storage_image_view(view)?.api();
        self.push_image(PipelineBindPoint::Graphics, interface, DescriptorType::StorageImage, binding, set, view)
    }

    pub fn push_compute_sampled_image(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, view: SampledImageViewHandle) -> Result<()> {
        let view = self.objects.sampled_image_view(view)?.api();
        self.push_image(PipelineBindPoint::Compute, interface, DescriptorType::SampledImage, binding, set, view)
    }

    pub fn push_compute_storage_image(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, view: StorageImageViewHandle) -> Result<()> {
        let view = self.objects.storage_image_view(view)?.api();
        self.push_image(PipelineBindPoint::Compute, interface, DescriptorType::StorageImage, binding, set, view)
    }

    pub fn push_graphics_sampler(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, sampler: SamplerHandle) -> Result<()> {
        self.push_sampler(PipelineBindPoint::Graphics, interface, binding, set, sampler)
    }

    pub fn push_compute_sampler(&mut self, interface: PipelineInterfaceHandle, binding: u32, set: u32, sampler: SamplerHandle) -> Result<()> {
        self.push_sampler(PipelineBindPoint::Compute, interface, binding, set, sampler)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_buffer(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: PipelineInterfaceHandle,
        descriptor_type: DescriptorType,
        binding: u32,
        set: u32,
        buffer_offset: u64,
        buffer: BufferHandle,
    ) -> Result<()> {
        let push = PushDescriptor {
            descriptor_type,
            binding,
            set,
            buffer_offset,
            buffer: Some(self.objects.buffer(buffer)?),
            image_view: None,
            sampler: None,
        };
        let interface = self.objects.pipeline_interface(interface)?;
        self.cmd.api.push_descriptor(bind_point, interface, &push)
    }

    fn push_image(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: PipelineInterfaceHandle,
        descriptor_type: DescriptorType,
        binding: u32,
        set: u32,
        view: &dyn ImageViewApi,
    ) -> Result<()> {
        let push = PushDescriptor { descriptor_type, binding, set, buffer_offset: 0, buffer: None, image_view: Some(view), sampler: None };
        let interface = self.objects.pipeline_interface(interface)?;
        self.cmd.api.push_descriptor(bind_point, interface, &push)
    }

    fn push_sampler(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: PipelineInterfaceHandle,
        binding: u32,
        set: u32,
        sampler: SamplerHandle,
    ) -> Result<()> {
        let push = PushDescriptor {
            descriptor_type: DescriptorType::Sampler,
            binding,
            set,
            buffer_offset: 0,
            buffer: None,
            image_view: None,
            sampler: Some(self.objects.sampler(sampler)?),
        };
        let interface = self.objects.pipeline_interface(interface)?;
        self.cmd.api.push_descriptor(bind_point, interface, &push)
    }

    pub fn bind_graphics_pipeline(&mut self, pipeline: GraphicsPipelineHandle) -> Result<()> {
        let pipeline = self.objects.graphics_pipeline(pipeline)?;
        let interface = self.objects.pipeline_interface(pipeline.pipeline_interface())?;
        self.cmd.api.bind_graphics_pipeline(pipeline, interface);
        Ok(())
    }

    pub fn bind_compute_pipeline(&mut self, pipeline: ComputePipelineHandle) -> Result<()> {
        let pipeline = self.objects.compute_pipeline(pipeline)?;
        let interface = self.objects.pipeline_interface(pipeline.pipeline_interface())?;
        self.cmd.api.bind_compute_pipeline(pipeline, interface);
        Ok(())
    }

    pub fn bind_index_buffer(&mut self, view: &IndexBufferView) -> Result<()> {
        let buffer = self.objects.buffer(view.buffer)?;
        self.cmd.api.bind_index_buffer(buffer, view);
        Ok(())
    }

    pub fn bind_vertex_buffers(&mut self, views: &[VertexBufferView]) -> Result<()> {
        assert!(views.len() <= MAX_VERTEX_BINDINGS, "vertex buffer count exceeds {}", MAX_VERTEX_BINDINGS);
        let resolved = views
            .iter()
            .map(|v| self.objects.buffer(v.buffer).map(|b| (b, v)))
            .collect::<Result<Vec<_>>>()?;
        self.cmd.api.bind_vertex_buffers(&resolved);
        Ok(())
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.cmd.api.draw(vertex_count, instance_count, first_vertex, first_instance);
    }

    pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
        self.cmd.api.draw_indexed(index_count, instance_count, first_index, vertex_offset, first_instance);
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.cmd.api.dispatch(x, y, z);
    }

    pub fn copy_buffer_to_buffer(&mut self, info: &BufferToBufferCopyInfo, src: BufferHandle, dst: BufferHandle) -> Result<()> {
        let src = self.objects.buffer(src)?;
        let dst = self.objects.buffer(dst)?;
        let fits = |offset: u64, size: u64| offset.checked_add(info.size).is_some_and(|end| end <= size);
        if !fits(info.src_offset, src.size()) || !fits(info.dst_offset, dst.size()) {
            return Err(GrfxError::OutOfRange);
        }
        self.cmd.api.copy_buffer_to_buffer(info, src, dst);
        Ok(())
    }

    pub fn copy_buffer_to_image(&mut self, info: &BufferToImageCopyInfo, src: BufferHandle, dst: ImageHandle) -> Result<()> {
        self.copy_buffer_to_image_regions(std::slice::from_ref(info), src, dst)
    }

    pub fn copy_buffer_to_image_regions(&mut self, infos: &[BufferToImageCopyInfo], src: BufferHandle, dst: ImageHandle) -> Result<()> {
        let src = self.objects.buffer(src)?;
        let dst = self.objects.image(dst)?;
        if infos.iter().any(|info| info.dst_image.mip_level >= dst.mip_level_count()) {
            return Err(GrfxError::OutOfRange);
        }
        self.cmd.api.copy_buffer_to_image(infos, src, dst);
        Ok(())
    }

    pub fn copy_image_to_buffer(&mut self, info: &ImageToBufferCopyInfo, src: ImageHandle, dst: BufferHandle) -> Result<ImageToBufferOutputPitch> {
        let src = self.objects.image(src)?;
        let dst = self.objects.buffer(dst)?;
        if info.src_image.mip_level >= src.mip_level_count() {
            return Err(GrfxError::OutOfRange);
        }
        Ok(self.cmd.api.copy_image_to_buffer(info, src, dst))
    }

    pub fn copy_image_to_image(&mut self, info: &ImageToImageCopyInfo, src: ImageHandle, dst: ImageHandle) -> Result<()> {
        let src = self.objects.image(src)?;
        let dst = self.objects.image(dst)?;
        self.cmd.api.copy_image_to_image(info, src, dst);
        Ok(())
    }

    pub fn blit_image(&mut self, info: &ImageBlitInfo, src: ImageHandle, dst: ImageHandle) -> Result<()> {
        let src = self.objects.image(src)?;
        let dst = self.objects.image(dst)?;
        self.cmd.api.blit_image(info, src, dst);
        Ok(())
    }

    pub fn begin_query(&mut self, query: QueryHandle, index: u32) -> Result<()> {
        let query = self.objects.query(query)?;
        assert!(index < query.count(), "query index {} out of range ({} queries)", index, query.count());
        self.cmd.api.begin_query(query, index);
        Ok(())
    }

    pub fn end_query(&mut self, query: QueryHandle, index: u32) -> Result<()> {
        let query = self.objects.query(query)?;
        assert!(index < query.count(), "query index {} out of range ({} queries)", index, query.count());
        self.cmd.api.end_query(query, index);
        Ok(())
    }

    pub fn write_timestamp(&mut self, query: QueryHandle, stage: PipelineStage, index: u32) -> Result<()> {
        let query = self.objects.query(query)?;
        assert!(query.query_type() == QueryType::Timestamp, "write_timestamp needs a timestamp query");
        assert!(index < query.count(), "query index {} out of range ({} queries)", index, query.count());
        self.cmd.api.write_timestamp(query, stage, index);
        Ok(())
    }

    pub fn resolve_query_data(&mut self, query: QueryHandle, start_index: u32, count: u32) -> Result<()> {
        let query = self.objects.query(query)?;
        assert!(start_index.saturating_add(count) <= query.count(), "query resolve range out of bounds");
        self.cmd.api.resolve_query_data(query, start_index, count)
    }
}

impl Objects {
    pub(crate) fn render_pass_has_load_op_clear(&self, pass: &crate::render_pass::RenderPass) -> bool {
        let rtv_clear = pass.create_info().render_target_views.iter().any(|h| {
            self.render_target_view(*h)
                .map(|v| v.create_info().load_op == AttachmentLoadOp::Clear)
                .unwrap_or(false)
        });
        let dsv_clear = pass.depth_stencil_view().is_some_and(|h| {
            self.depth_stencil_view(h)
                .map(|v| {
                    v.create_info().depth_load_op == AttachmentLoadOp::Clear
                        || v.create_info().stencil_load_op == AttachmentLoadOp::Clear
                })
                .unwrap_or(false)
        });
        rtv_clear || dsv_clear
    }
}
