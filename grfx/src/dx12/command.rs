//! Command pools and command buffers.
//!
//! A command buffer owns one allocator and one list, kept paired so `begin` can always reset
//! both. Graphics and compute buffers also own shader-visible descriptor heaps that bound sets
//! are copied into; the cursors into those heaps rewind on every `begin`.

use std::any::Any;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use windows::Win32::Foundation::RECT;
use windows::Win32::Graphics::Direct3D12::*;

use super::descriptor::native_set;
use super::descriptor_helper::DescriptorHeap;
use super::layout::{self, HeapKind, RootSlotKind};
use super::pipeline::{interface_of, Dx12Pipeline, Dx12PipelineInterface};
use super::query::query_of;
use super::render_pass::Dx12RenderPass;
use super::resource::{buffer_resource, image_resource};
use super::util::{self, borrowed_resource, hresult_error, Sendable};
use super::DeviceShared;
use crate::backend::{CommandBufferApi, CommandPoolApi};
use crate::buffer::Buffer;
use crate::command::{
    BoundSet, BufferToBufferCopyInfo, BufferToImageCopyInfo, CommandBufferCreateInfo, ImageBlitInfo,
    ImageSubresourceOffset, ImageToBufferCopyInfo, ImageToBufferOutputPitch, ImageToImageCopyInfo, IndexBufferView,
    PushDescriptor, QueueTransfer, RenderPassBeginInfo, SubresourceRange, VertexBufferView,
};
use crate::error::{GrfxError, Result};
use crate::format::FormatAspect;
use crate::image::Image;
use crate::pipeline::{ComputePipeline, GraphicsPipeline, PipelineInterface};
use crate::query::Query;
use crate::render_pass::RenderPass;
use crate::types::{CommandType, ImageUsageFlags, PipelineBindPoint, PipelineStage, Rect, ResourceState, Viewport};
use crate::{VALUE_IGNORED, WHOLE_SIZE};

#[derive(Debug)]
pub struct Dx12CommandPool {
    command_type: CommandType,
    list_type: D3D12_COMMAND_LIST_TYPE,
}

impl Dx12CommandPool {
    pub fn new(command_type: CommandType) -> Result<Self> {
        Ok(Self { command_type, list_type: util::command_list_type(command_type)? })
    }

    pub fn list_type(&self) -> D3D12_COMMAND_LIST_TYPE {
        self.list_type
    }
}

impl CommandPoolApi for Dx12CommandPool {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shader-visible heap plus the next free slot in it.
#[derive(Debug)]
struct VisibleHeap {
    heap: DescriptorHeap,
    cursor: u32,
}

impl VisibleHeap {
    fn new(device: &ID3D12Device, heap_type: D3D12_DESCRIPTOR_HEAP_TYPE, count: u32) -> Result<Option<Self>> {
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(Self { heap: DescriptorHeap::new(device, heap_type, count, true)?, cursor: 0 }))
    }

    /// Reserves `count` slots, returning the first.
    fn reserve(&mut self, count: u32) -> Result<u32> {
        let start = self.cursor;
        if start + count > self.heap.len() {
            log::error!(
                "{:?} shader-visible heap exhausted: {} of {} used, {} requested",
                self.heap.heap_type(),
                start,
                self.heap.len(),
                count
            );
            return Err(GrfxError::LimitExceeded);
        }
        self.cursor += count;
        Ok(start)
    }
}

fn transition(
    resource: &ID3D12Resource,
    subresource: u32,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: unsafe { borrowed_resource(resource) },
                Subresource: subresource,
                StateBefore: before,
                StateAfter: after,
            }),
        },
    }
}

/// Barriers for an image transition. A full range is one ALL_SUBRESOURCES barrier.
///
/// Partial-range depth-stencil barriers emit planes*M*N entries per the flat-index formula.
fn subresource_barriers(
    resource: &ID3D12Resource,
    image: &Image,
    range: &SubresourceRange,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) -> Vec<D3D12_RESOURCE_BARRIER> {
    if before == after {
        return Vec::new();
    }
    if range.covers_all(image) {
        return vec![transition(resource, D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES, before, after)];
    }
    let planes = layout::plane_count(image.format());
    layout::subresource_indices(range, planes, image.mip_level_count(), image.array_layer_count())
        .into_iter()
        .map(|index| transition(resource, index, before, after))
        .collect()
}

fn subresource_index(image: &Image, at: &ImageSubresourceOffset, layer: u32, plane: u32) -> u32 {
    layout::calc_subresource(at.mip_level, at.array_layer + layer, plane, image.mip_level_count(), image.array_layer_count())
}

fn d3d12_box(image: &Image, offset: [u32; 3], extent: [u32; 3]) -> D3D12_BOX {
    let b = layout::copy_box(image.image_type(), offset, extent);
    D3D12_BOX { left: b.left, top: b.top, front: b.front, right: b.right, bottom: b.bottom, back: b.back }
}

fn subresource_location(resource: &ID3D12Resource, index: u32) -> D3D12_TEXTURE_COPY_LOCATION {
    D3D12_TEXTURE_COPY_LOCATION {
        pResource: unsafe { borrowed_resource(resource) },
        Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
        Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 { SubresourceIndex: index },
    }
}

fn footprint_location(resource: &ID3D12Resource, footprint: D3D12_PLACED_SUBRESOURCE_FOOTPRINT) -> D3D12_TEXTURE_COPY_LOCATION {
    D3D12_TEXTURE_COPY_LOCATION {
        pResource: unsafe { borrowed_resource(resource) },
        Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
        Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 { PlacedFootprint: footprint },
    }
}

fn view_size(size: u64, offset: u64, buffer_size: u64) -> u32 {
    let size = if size == WHOLE_SIZE { buffer_size.saturating_sub(offset) } else { size };
    size as u32
}

#[derive(Debug)]
pub struct Dx12CommandBuffer {
    shared: Arc<DeviceShared>,
    command_type: CommandType,
    allocator: Sendable<ID3D12CommandAllocator>,
    list: Sendable<ID3D12GraphicsCommandList>,
    resource_heap: Option<VisibleHeap>,
    sampler_heap: Option<VisibleHeap>,
    graphics_root_signature: Option<Sendable<ID3D12RootSignature>>,
    compute_root_signature: Option<Sendable<ID3D12RootSignature>>,
}

impl Dx12CommandBuffer {
    pub(crate) fn new(shared: &Arc<DeviceShared>, pool: &Dx12CommandPool, info: &CommandBufferCreateInfo) -> Result<Self> {
        let allocator: ID3D12CommandAllocator = unsafe { shared.device.CreateCommandAllocator(pool.list_type()) }
            .map_err(|e| hresult_error(e, "ID3D12Device::CreateCommandAllocator"))?;
        let list: ID3D12GraphicsCommandList =
            unsafe { shared.device.CreateCommandList(0, pool.list_type(), &allocator, None) }
                .map_err(|e| hresult_error(e, "ID3D12Device::CreateCommandList"))?;
        // Lists are created open; `begin` expects a closed one.
        unsafe { list.Close() }.map_err(|e| hresult_error(e, "ID3D12GraphicsCommandList::Close"))?;

        let (resource_heap, sampler_heap) = match pool.command_type {
            CommandType::Graphics | CommandType::Compute => (
                VisibleHeap::new(&shared.device, D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV, info.resource_descriptor_count)?,
                VisibleHeap::new(&shared.device, D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER, info.sampler_descriptor_count)?,
            ),
            _ => (None, None),
        };
        Ok(Self {
            shared: Arc::clone(shared),
            command_type: pool.command_type,
            allocator: Sendable(allocator),
            list: Sendable(list),
            resource_heap,
            sampler_heap,
            graphics_root_signature: None,
            compute_root_signature: None,
        })
    }

    pub fn list(&self) -> &ID3D12GraphicsCommandList {
        &self.list
    }

    pub fn shader_visible_heap(&self, heap: HeapKind) -> Option<&DescriptorHeap> {
        match heap {
            HeapKind::Sampler => self.sampler_heap.as_ref().map(|h| &h.heap),
            HeapKind::CbvSrvUav => self.resource_heap.as_ref().map(|h| &h.heap),
        }
    }

    fn states(&self, state: ResourceState) -> D3D12_RESOURCE_STATES {
        util::resource_states(state, self.command_type)
    }

    fn set_root_signature(&mut self, bind_point: PipelineBindPoint, interface: &Dx12PipelineInterface) {
        let root_signature = interface.root_signature();
        let current = match bind_point {
            PipelineBindPoint::Graphics => &mut self.graphics_root_signature,
            PipelineBindPoint::Compute => &mut self.compute_root_signature,
        };
        if current.as_ref().map(|c| &c.0) == Some(root_signature) {
            return;
        }
        *current = Some(Sendable(root_signature.clone()));
        match bind_point {
            PipelineBindPoint::Graphics => unsafe { self.list.SetGraphicsRootSignature(root_signature) },
            PipelineBindPoint::Compute => unsafe { self.list.SetComputeRootSignature(root_signature) },
        }
    }

    fn set_descriptor_table(&self, bind_point: PipelineBindPoint, index: u32, base: D3D12_GPU_DESCRIPTOR_HANDLE) {
        match bind_point {
            PipelineBindPoint::Graphics => unsafe { self.list.SetGraphicsRootDescriptorTable(index, base) },
            PipelineBindPoint::Compute => unsafe { self.list.SetComputeRootDescriptorTable(index, base) },
        }
    }

    /// Copies every descriptor of one of a set's heaps into the matching visible heap and
    /// returns the GPU handle of the copy.
    fn stage_descriptors(&mut self, src: &DescriptorHeap, heap: HeapKind) -> Result<D3D12_GPU_DESCRIPTOR_HANDLE> {
        let dst = match heap {
            HeapKind::Sampler => self.sampler_heap.as_mut(),
            HeapKind::CbvSrvUav => self.resource_heap.as_mut(),
        }
        .ok_or_else(|| {
            log::error!("command buffer has no shader-visible {:?} heap", heap);
            GrfxError::LimitExceeded
        })?;
        let base = dst.reserve(src.len())?;
        unsafe {
            self.shared.device.CopyDescriptorsSimple(src.len(), dst.heap.cpu_handle(base), src.cpu_handle(0), src.heap_type())
        };
        dst.heap.gpu_handle(base).ok_or(GrfxError::ApiFailure)
    }

    fn parameter_index(interface: &Dx12PipelineInterface, binding: u32, set: u32) -> Result<u32> {
        let index = interface.layout().find_parameter_index(binding, set);
        if index == VALUE_IGNORED {
            log::error!("no root parameter for set={} binding={}", set, binding);
            return Err(GrfxError::ElementNotFound);
        }
        Ok(index)
    }

    fn footprint(&self, desc: &D3D12_RESOURCE_DESC, subresource: u32, base_offset: u64) -> D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
        let mut placed = D3D12_PLACED_SUBRESOURCE_FOOTPRINT::default();
        unsafe { self.shared.device.GetCopyableFootprints(desc, subresource, 1, base_offset, Some(&mut placed), None, None, None) };
        placed
    }
}

impl CommandBufferApi for Dx12CommandBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn begin(&mut self) -> Result<()> {
        unsafe { self.allocator.Reset() }.map_err(|e| hresult_error(e, "ID3D12CommandAllocator::Reset"))?;
        unsafe { self.list.Reset(&*self.allocator, None) }.map_err(|e| hresult_error(e, "ID3D12GraphicsCommandList::Reset"))?;
        self.graphics_root_signature = None;
        self.compute_root_signature = None;
        let heaps: Vec<Option<ID3D12DescriptorHeap>> = [&self.resource_heap, &self.sampler_heap]
            .into_iter()
            .flatten()
            .map(|h| Some(h.heap.native().clone()))
            .collect();
        if !heaps.is_empty() {
            unsafe { self.list.SetDescriptorHeaps(&heaps) };
        }
        for heap in [&mut self.resource_heap, &mut self.sampler_heap].into_iter().flatten() {
            heap.cursor = 0;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        unsafe { self.list.Close() }.map_err(|e| hresult_error(e, "ID3D12GraphicsCommandList::Close"))
    }

    fn begin_render_pass(&mut self, render_pass: &RenderPass, begin_info: &RenderPassBeginInfo) -> Result<()> {
        let pass = render_pass.api().as_any().downcast_ref::<Dx12RenderPass>().ok_or(GrfxError::UnsupportedApi)?;
        let render_targets: Vec<_> = pass.render_targets().iter().map(|(handle, _)| *handle).collect();
        let depth_stencil = pass.depth_stencil().map(|(handle, _)| handle);
        unsafe {
            self.list.OMSetRenderTargets(
                render_targets.len() as u32,
                (!render_targets.is_empty()).then_some(render_targets.as_ptr()),
                false,
                depth_stencil.as_ref().map(|h| h as *const _),
            )
        };

        for ((handle, clear), value) in pass.render_targets().iter().zip(&begin_info.rtv_clear_values) {
            if *clear {
                unsafe { self.list.ClearRenderTargetView(*handle, value.rgba.as_ptr(), None) };
            }
        }
        if let Some((handle, flags)) = pass.depth_stencil() {
            if flags.0 != 0 {
                let value = begin_info.dsv_clear_value;
                unsafe { self.list.ClearDepthStencilView(handle, flags, value.depth, value.stencil as u8, None) };
            }
        }
        Ok(())
    }

    /// Render passes are plain OMSetRenderTargets calls; nothing to close.
    fn end_render_pass(&mut self) {}

    fn transition_image_layout(
        &mut self,
        image: &Image,
        range: SubresourceRange,
        before: ResourceState,
        after: ResourceState,
        _transfer: Option<QueueTransfer<'_>>,
    ) -> Result<()> {
        let resource = image_resource(image)?.native();
        let barriers = subresource_barriers(resource, image, &range, self.states(before), self.states(after));
        if !barriers.is_empty() {
            unsafe { self.list.ResourceBarrier(&barriers) };
        }
        Ok(())
    }

    fn buffer_resource_barrier(
        &mut self,
        buffer: &Buffer,
        before: ResourceState,
        after: ResourceState,
        _transfer: Option<QueueTransfer<'_>>,
    ) -> Result<()> {
        let (before, after) = (self.states(before), self.states(after));
        if before == after {
            return Ok(());
        }
        let barrier = transition(buffer_resource(buffer)?.native(), 0, before, after);
        unsafe { self.list.ResourceBarrier(&[barrier]) };
        Ok(())
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        let viewports: Vec<D3D12_VIEWPORT> = viewports
            .iter()
            .map(|v| D3D12_VIEWPORT {
                TopLeftX: v.x,
                TopLeftY: v.y,
                Width: v.width,
                Height: v.height,
                MinDepth: v.min_depth,
                MaxDepth: v.max_depth,
            })
            .collect();
        unsafe { self.list.RSSetViewports(&viewports) };
    }

    fn set_scissors(&mut self, scissors: &[Rect]) {
        let rects: Vec<RECT> = scissors
            .iter()
            .map(|r| RECT { left: r.x, top: r.y, right: r.x + r.width as i32, bottom: r.y + r.height as i32 })
            .collect();
        unsafe { self.list.RSSetScissorRects(&rects) };
    }

    fn bind_descriptor_sets(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: &PipelineInterface,
        sets: &[BoundSet<'_>],
    ) -> Result<()> {
        let native_interface = interface_of(interface)?;
        self.set_root_signature(bind_point, native_interface);

        let mut tables = Vec::new();
        for bound in sets {
            let set = native_set(bound.set)?;
            for heap in [HeapKind::CbvSrvUav, HeapKind::Sampler] {
                let Some(src) = set.heap(heap) else { continue };
                let gpu_base = self.stage_descriptors(src, heap)?;
                for binding in bound.layout.bindings() {
                    let Some(range) = set.binding_range(binding.binding) else { continue };
                    if range.heap != heap {
                        continue;
                    }
                    let index = Self::parameter_index(native_interface, binding.binding, bound.set_number)?;
                    // Root descriptors are set through push_descriptor.
                    if native_interface.layout().slot_kind(binding.binding, bound.set_number) != Some(RootSlotKind::Table) {
                        continue;
                    }
                    let increment = u64::from(src.increment());
                    tables.push((index, D3D12_GPU_DESCRIPTOR_HANDLE { ptr: gpu_base.ptr + u64::from(range.offset) * increment }));
                }
            }
        }
        for (index, base) in tables {
            self.set_descriptor_table(bind_point, index, base);
        }
        Ok(())
    }

    fn push_constants(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: &PipelineInterface,
        values: &[u32],
        dst_offset: u32,
    ) -> Result<()> {
        let native_interface = interface_of(interface)?;
        self.set_root_signature(bind_point, native_interface);
        let index = native_interface.layout().root_constants_parameter_index();
        if index == VALUE_IGNORED {
            log::error!("pipeline interface declares no push constants");
            return Err(GrfxError::ElementNotFound);
        }
        let data = values.as_ptr().cast();
        let count = values.len() as u32;
        match bind_point {
            PipelineBindPoint::Graphics => unsafe { self.list.SetGraphicsRoot32BitConstants(index, count, data, dst_offset) },
            PipelineBindPoint::Compute => unsafe { self.list.SetComputeRoot32BitConstants(index, count, data, dst_offset) },
        }
        Ok(())
    }

    fn push_descriptor(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: &PipelineInterface,
        push: &PushDescriptor<'_>,
    ) -> Result<()> {
        let native_interface = interface_of(interface)?;
        self.set_root_signature(bind_point, native_interface);
        let index = Self::parameter_index(native_interface, push.binding, push.set)?;
        let buffer = push.buffer.ok_or(GrfxError::UnexpectedNullArgument)?;
        let location = buffer_resource(buffer)?.gpu_virtual_address() + push.buffer_offset;
        let list = &self.list;
        let graphics = bind_point == PipelineBindPoint::Graphics;
        match native_interface.layout().slot_kind(push.binding, push.set) {
            Some(RootSlotKind::Cbv) if graphics => unsafe { list.SetGraphicsRootConstantBufferView(index, location) },
            Some(RootSlotKind::Cbv) => unsafe { list.SetComputeRootConstantBufferView(index, location) },
            Some(RootSlotKind::Srv) if graphics => unsafe { list.SetGraphicsRootShaderResourceView(index, location) },
            Some(RootSlotKind::Srv) => unsafe { list.SetComputeRootShaderResourceView(index, location) },
            Some(RootSlotKind::Uav) if graphics => unsafe { list.SetGraphicsRootUnorderedAccessView(index, location) },
            Some(RootSlotKind::Uav) => unsafe { list.SetComputeRootUnorderedAccessView(index, location) },
            _ => {
                log::error!("set={} binding={} is not a pushable root descriptor", push.set, push.binding);
                return Err(GrfxError::InvalidBindingNumber);
            }
        }
        Ok(())
    }

    fn bind_graphics_pipeline(&mut self, pipeline: &GraphicsPipeline, interface: &PipelineInterface) {
        let Some(native) = pipeline.api().as_any().downcast_ref::<Dx12Pipeline>() else {
            log::error!("graphics pipeline was not created by the D3D12 backend");
            return;
        };
        match interface_of(interface) {
            Ok(interface) => self.set_root_signature(PipelineBindPoint::Graphics, interface),
            Err(err) => log::error!("binding graphics root signature: {}", err),
        }
        unsafe {
            self.list.SetPipelineState(native.state());
            self.list.IASetPrimitiveTopology(native.topology());
        }
    }

    fn bind_compute_pipeline(&mut self, pipeline: &ComputePipeline, interface: &PipelineInterface) {
        let Some(native) = pipeline.api().as_any().downcast_ref::<Dx12Pipeline>() else {
            log::error!("compute pipeline was not created by the D3D12 backend");
            return;
        };
        match interface_of(interface) {
            Ok(interface) => self.set_root_signature(PipelineBindPoint::Compute, interface),
            Err(err) => log::error!("binding compute root signature: {}", err),
        }
        unsafe { self.list.SetPipelineState(native.state()) };
    }

    fn bind_index_buffer(&mut self, buffer: &Buffer, view: &IndexBufferView) {
        let Ok(native) = buffer_resource(buffer) else { return };
        let ibv = D3D12_INDEX_BUFFER_VIEW {
            BufferLocation: native.gpu_virtual_address() + view.offset,
            SizeInBytes: view_size(view.size, view.offset, native.size()),
            Format: util::index_type_to_dxgi(view.index_type),
        };
        unsafe { self.list.IASetIndexBuffer(Some(&ibv)) };
    }

    fn bind_vertex_buffers(&mut self, views: &[(&Buffer, &VertexBufferView)]) {
        let views: Vec<D3D12_VERTEX_BUFFER_VIEW> = views
            .iter()
            .filter_map(|(buffer, view)| {
                let native = buffer_resource(buffer).ok()?;
                Some(D3D12_VERTEX_BUFFER_VIEW {
                    BufferLocation: native.gpu_virtual_address() + view.offset,
                    SizeInBytes: view_size(view.size, view.offset, native.size()),
                    StrideInBytes: view.stride,
                })
            })
            .collect();
        unsafe { self.list.IASetVertexBuffers(0, Some(&views)) };
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe { self.list.DrawInstanced(vertex_count, instance_count, first_vertex, first_instance) };
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
        unsafe { self.list.DrawIndexedInstanced(index_count, instance_count, first_index, vertex_offset, first_instance) };
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        unsafe { self.list.Dispatch(x, y, z) };
    }

    fn copy_buffer_to_buffer(&mut self, info: &BufferToBufferCopyInfo, src: &Buffer, dst: &Buffer) {
        let (Ok(src), Ok(dst)) = (buffer_resource(src), buffer_resource(dst)) else { return };
        unsafe { self.list.CopyBufferRegion(dst.native(), info.dst_offset, src.native(), info.src_offset, info.size) };
    }

    fn copy_buffer_to_image(&mut self, infos: &[BufferToImageCopyInfo], src: &Buffer, dst: &Image) {
        let (Ok(src), Ok(native)) = (buffer_resource(src), image_resource(dst)) else { return };
        let desc = unsafe { native.native().GetDesc() };
        for info in infos {
            let region = &info.dst_image;
            for layer in 0..region.array_layer_count {
                let subresource = layout::calc_subresource(
                    region.mip_level,
                    region.array_layer + layer,
                    0,
                    dst.mip_level_count(),
                    dst.array_layer_count(),
                );
                let mut placed = self.footprint(&desc, subresource, info.src_buffer.footprint_offset);
                placed.Offset = info.src_buffer.footprint_offset;
                placed.Footprint.Width = info.src_buffer.footprint_width;
                placed.Footprint.Height = info.src_buffer.footprint_height;
                placed.Footprint.Depth = info.src_buffer.footprint_depth;
                placed.Footprint.RowPitch = info.src_buffer.image_row_stride;
                let destination = subresource_location(native.native(), subresource);
                let source = footprint_location(src.native(), placed);
                unsafe { self.list.CopyTextureRegion(&destination, region.x, region.y, region.z, &source, None) };
            }
        }
    }

    fn copy_image_to_buffer(&mut self, info: &ImageToBufferCopyInfo, src: &Image, dst: &Buffer) -> ImageToBufferOutputPitch {
        let mut pitch = ImageToBufferOutputPitch::default();
        let (Ok(native), Ok(dst)) = (image_resource(src), buffer_resource(dst)) else { return pitch };
        let desc = unsafe { native.native().GetDesc() };
        // Depth-stencil resources can only be copied a whole subresource at a time.
        let whole_subresource = src.usage_flags().contains(ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        let mut offset = 0u64;
        for layer in 0..info.src_image.array_layer_count {
            for plane in 0..layout::plane_count(src.format()) {
                let subresource = subresource_index(src, &info.src_image, layer, plane);
                let mut placed = self.footprint(&desc, subresource, offset);
                let source = subresource_location(native.native(), subresource);
                let src_box = if whole_subresource {
                    None
                } else {
                    placed.Footprint.Width = info.extent[0];
                    placed.Footprint.Height = info.extent[1].max(1);
                    placed.Footprint.Depth = info.extent[2].max(1);
                    placed.Footprint.RowPitch = layout::aligned_row_pitch(src.format().bytes_per_texel() * info.extent[0]);
                    Some(d3d12_box(src, info.src_image.offset, info.extent))
                };
                let destination = footprint_location(dst.native(), placed);
                unsafe {
                    self.list.CopyTextureRegion(
                        &destination,
                        0,
                        0,
                        0,
                        &source,
                        src_box.as_ref().map(|b| b as *const D3D12_BOX),
                    )
                };
                offset += u64::from(placed.Footprint.RowPitch) * u64::from(placed.Footprint.Height);
                pitch.row_pitch = placed.Footprint.RowPitch;
            }
        }
        pitch
    }

    fn copy_image_to_image(&mut self, info: &ImageToImageCopyInfo, src: &Image, dst: &Image) {
        let src_depth_stencil = src.format().aspect() == FormatAspect::DepthStencil;
        let dst_depth_stencil = dst.format().aspect() == FormatAspect::DepthStencil;
        if src_depth_stencil != dst_depth_stencil {
            log::error!("image copies cannot mix depth-stencil and other formats");
            return;
        }
        let (Ok(src_native), Ok(dst_native)) = (image_resource(src), image_resource(dst)) else { return };
        for layer in 0..info.src_image.array_layer_count {
            for plane in 0..layout::plane_count(src.format()) {
                let source = subresource_location(src_native.native(), subresource_index(src, &info.src_image, layer, plane));
                let destination =
                    subresource_location(dst_native.native(), subresource_index(dst, &info.dst_image, layer, plane));
                if src_depth_stencil {
                    unsafe { self.list.CopyTextureRegion(&destination, 0, 0, 0, &source, None) };
                } else {
                    let src_box = d3d12_box(src, info.src_image.offset, info.extent);
                    let [x, y, z] = info.dst_image.offset;
                    unsafe { self.list.CopyTextureRegion(&destination, x, y, z, &source, Some(&src_box as *const D3D12_BOX)) };
                }
            }
        }
    }

    fn blit_image(&mut self, _info: &ImageBlitInfo, _src: &Image, _dst: &Image) {
        log::error!("blit_image is not available on D3D12");
    }

    fn begin_query(&mut self, query: &Query, index: u32) {
        let Ok(native) = query_of(query) else { return };
        unsafe { self.list.BeginQuery(native.heap(), native.query_type(), index) };
    }

    fn end_query(&mut self, query: &Query, index: u32) {
        let Ok(native) = query_of(query) else { return };
        unsafe { self.list.EndQuery(native.heap(), native.query_type(), index) };
    }

    /// Timestamps are written with `EndQuery` alone; the stage is not expressible on D3D12.
    fn write_timestamp(&mut self, query: &Query, _stage: PipelineStage, index: u32) {
        let Ok(native) = query_of(query) else { return };
        unsafe { self.list.EndQuery(native.heap(), D3D12_QUERY_TYPE_TIMESTAMP, index) };
    }

    fn resolve_query_data(&mut self, query: &Query, start_index: u32, count: u32) -> Result<()> {
        let native = query_of(query)?;
        let offset = u64::from(start_index) * native.result_size();
        unsafe {
            self.list.ResolveQueryData(
                native.heap(),
                native.query_type(),
                start_index,
                count,
                native.readback().native(),
                offset,
            )
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCreateInfo;
    use crate::dx12::resource::Dx12Image;
    use crate::dx12::testing;
    use crate::format::Format;
    use crate::image::ImageCreateInfo;

    fn recording(shared: &Arc<DeviceShared>, command_type: CommandType, info: &CommandBufferCreateInfo) -> Dx12CommandBuffer {
        let pool = Dx12CommandPool::new(command_type).unwrap();
        let mut cmd = Dx12CommandBuffer::new(shared, &pool, info).unwrap();
        cmd.begin().unwrap();
        cmd
    }

    fn image(shared: &Arc<DeviceShared>, info: ImageCreateInfo) -> Image {
        let api = Dx12Image::new(shared, &info).unwrap();
        Image::new(info, Box::new(api))
    }

    fn subresources(barriers: &[D3D12_RESOURCE_BARRIER]) -> Vec<u32> {
        barriers.iter().map(|b| unsafe { b.Anonymous.Transition.Subresource }).collect()
    }

    #[test]
    fn pools_map_queue_types_to_list_types() {
        assert_eq!(Dx12CommandPool::new(CommandType::Graphics).unwrap().list_type(), D3D12_COMMAND_LIST_TYPE_DIRECT);
        assert_eq!(Dx12CommandPool::new(CommandType::Transfer).unwrap().list_type(), D3D12_COMMAND_LIST_TYPE_COPY);
    }

    #[test]
    fn partial_ranges_enumerate_subresources() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let mut info = ImageCreateInfo::sampled_image_2d(64, 64, Format::R8G8B8A8Unorm);
        info.mip_level_count = 4;
        info.array_layer_count = 3;
        let texture = image(&shared, info);
        let resource = image_resource(&texture).unwrap().native();
        let (copy, read) = (D3D12_RESOURCE_STATE_COPY_DEST, D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE);

        let full = SubresourceRange::all(&texture);
        assert_eq!(subresources(&subresource_barriers(resource, &texture, &full, copy, read)), vec![
            D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES
        ]);
        assert!(subresource_barriers(resource, &texture, &full, read, read).is_empty());

        let partial = SubresourceRange::resolve(&texture, 1, 2, 0, 3).unwrap();
        assert_eq!(subresources(&subresource_barriers(resource, &texture, &partial, copy, read)), vec![1, 2, 5, 6, 9, 10]);
    }

    #[test]
    fn depth_stencil_barriers_cover_both_planes() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let mut info = ImageCreateInfo::depth_stencil_target(32, 32, Format::D24UnormS8Uint);
        info.mip_level_count = 2;
        let depth = image(&shared, info);
        let resource = image_resource(&depth).unwrap().native();
        let range = SubresourceRange::resolve(&depth, 1, 1, 0, 1).unwrap();
        let barriers =
            subresource_barriers(resource, &depth, &range, D3D12_RESOURCE_STATE_DEPTH_WRITE, D3D12_RESOURCE_STATE_COPY_SOURCE);
        assert_eq!(subresources(&barriers), vec![1, 3]);
    }

    #[test]
    fn begin_rewinds_heap_cursors() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let mut cmd = recording(&shared, CommandType::Compute, &CommandBufferCreateInfo::default());
        cmd.resource_heap.as_mut().unwrap().reserve(10).unwrap();
        cmd.end().unwrap();
        cmd.begin().unwrap();
        assert_eq!(cmd.resource_heap.as_ref().unwrap().cursor, 0);
        cmd.end().unwrap();
    }

    #[test]
    fn copy_buffers_have_no_visible_heaps() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let mut cmd = recording(&shared, CommandType::Transfer, &CommandBufferCreateInfo::default());
        assert!(cmd.shader_visible_heap(HeapKind::CbvSrvUav).is_none());
        assert!(cmd.shader_visible_heap(HeapKind::Sampler).is_none());
        cmd.end().unwrap();
    }

    #[test]
    fn exhausted_visible_heap_is_reported() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let info = CommandBufferCreateInfo { resource_descriptor_count: 4, sampler_descriptor_count: 1 };
        let mut cmd = recording(&shared, CommandType::Graphics, &info);
        let heap = cmd.resource_heap.as_mut().unwrap();
        assert_eq!(heap.reserve(3), Ok(0));
        assert_eq!(heap.reserve(2), Err(GrfxError::LimitExceeded));
        cmd.end().unwrap();
    }
}
