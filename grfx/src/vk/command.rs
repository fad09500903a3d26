//! Command pools and command buffers.

use std::any::Any;
use std::sync::Arc;

use ash::vk;

use super::descriptor::{write_descriptor_sets, DescriptorSource, NativeWrite, VulkanDescriptorSet};
use super::pipeline::{interface_of, native_pipeline};
use super::query::query_of;
use super::queue::native_queue;
use super::render_pass::render_pass_of;
use super::resource::{native_buffer, native_image};
use super::util::{self, vk_error};
use super::DeviceShared;
use crate::backend::{CommandBufferApi, CommandPoolApi};
use crate::buffer::Buffer;
use crate::command::{
    BoundSet, BufferToBufferCopyInfo, BufferToImageCopyInfo, CommandBufferCreateInfo, ImageBlitRegion, ImageBlitInfo,
    ImageSubresourceOffset, ImageToBufferCopyInfo, ImageToBufferOutputPitch, ImageToImageCopyInfo, IndexBufferView,
    PushDescriptor, QueueTransfer, RenderPassBeginInfo, SubresourceRange, VertexBufferView,
};
use crate::error::{GrfxError, Result};
use crate::format::{Format, FormatAspect};
use crate::image::Image;
use crate::pipeline::{ComputePipeline, GraphicsPipeline, PipelineInterface};
use crate::query::Query;
use crate::render_pass::RenderPass;
use crate::types::{CommandType, PipelineBindPoint, PipelineStage, Rect, ResourceState, Viewport};
use crate::WHOLE_SIZE;

#[derive(Debug)]
pub(crate) struct CommandPoolInner {
    shared: Arc<DeviceShared>,
    pool: vk::CommandPool,
}

impl Drop for CommandPoolInner {
    fn drop(&mut self) {
        unsafe { self.shared.raw.destroy_command_pool(self.pool, None) };
    }
}

#[derive(Debug)]
pub struct VulkanCommandPool {
    inner: Arc<CommandPoolInner>,
    command_type: CommandType,
}

impl VulkanCommandPool {
    /// Buffers are re-recorded every frame, so each one resets on its own.
    pub fn new(shared: &Arc<DeviceShared>, queue: &crate::queue::Queue) -> Result<Self> {
        let family = native_queue(queue)?.family_index();
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(family);
        let pool = unsafe { shared.raw.create_command_pool(&create_info, None) }
            .map_err(|r| vk_error(r, "vkCreateCommandPool"))?;
        Ok(Self { inner: Arc::new(CommandPoolInner { shared: Arc::clone(shared), pool }), command_type: queue.command_type() })
    }

    pub fn native(&self) -> vk::CommandPool {
        self.inner.pool
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }
}

impl CommandPoolApi for VulkanCommandPool {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn rect_to_vk(rect: &Rect) -> vk::Rect2D {
    vk::Rect2D { offset: vk::Offset2D { x: rect.x, y: rect.y }, extent: vk::Extent2D { width: rect.width, height: rect.height } }
}

/// Viewports are flipped so +Y points up, matching D3D12.
fn flip_viewport(v: &Viewport) -> vk::Viewport {
    vk::Viewport { x: v.x, y: v.y + v.height, width: v.width, height: -v.height, min_depth: v.min_depth, max_depth: v.max_depth }
}

fn subresource_layers(image: &Image, mip_level: u32, array_layer: u32, array_layer_count: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: util::aspect_mask(image.format()),
        mip_level,
        base_array_layer: array_layer,
        layer_count: array_layer_count,
    }
}

fn offset_3d(offset: [u32; 3]) -> vk::Offset3D {
    vk::Offset3D { x: offset[0] as i32, y: offset[1] as i32, z: offset[2] as i32 }
}

fn extent_3d(extent: [u32; 3]) -> vk::Extent3D {
    vk::Extent3D { width: extent[0], height: extent[1].max(1), depth: extent[2].max(1) }
}

fn blit_offsets(region: &ImageBlitRegion) -> [vk::Offset3D; 2] {
    region.offsets.map(|[x, y, z]| vk::Offset3D { x, y, z })
}

/// Output rows of an image-to-buffer copy are tightly packed.
fn output_pitch(format: Format, width: u32) -> ImageToBufferOutputPitch {
    ImageToBufferOutputPitch { row_pitch: format.bytes_per_texel() * width }
}

/// Source and destination stages plus the barrier for one image transition.
#[allow(clippy::too_many_arguments)]
fn image_barrier(
    image: vk::Image,
    format: Format,
    range: SubresourceRange,
    before: ResourceState,
    after: ResourceState,
    command_type: CommandType,
    features: &vk::PhysicalDeviceFeatures,
    families: (u32, u32),
) -> Result<(vk::PipelineStageFlags, vk::PipelineStageFlags, vk::ImageMemoryBarrier<'static>)> {
    let src = util::barrier_to_vk(before, command_type, features, true);
    let dst = util::barrier_to_vk(after, command_type, features, false);
    let (Some(old_layout), Some(new_layout)) = (src.layout, dst.layout) else {
        log::error!("{:?} -> {:?} is not an image transition", before, after);
        return Err(GrfxError::InvalidCreateArgument);
    };
    let barrier = vk::ImageMemoryBarrier::default()
        .src_access_mask(src.access_mask)
        .dst_access_mask(dst.access_mask)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(families.0)
        .dst_queue_family_index(families.1)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: util::aspect_mask(format),
            base_mip_level: range.mip_level,
            level_count: range.mip_level_count,
            base_array_layer: range.array_layer,
            layer_count: range.array_layer_count,
        });
    Ok((src.stage_mask, dst.stage_mask, barrier))
}

#[derive(Debug)]
pub struct VulkanCommandBuffer {
    pool: Arc<CommandPoolInner>,
    command_type: CommandType,
    cmd: vk::CommandBuffer,
    recording: bool,
}

impl VulkanCommandBuffer {
    /// Descriptor counts size the D3D12 shader-visible heaps; Vulkan sets live in their pools.
    pub fn new(pool: &VulkanCommandPool, _info: &CommandBufferCreateInfo) -> Result<Self> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.native())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { pool.inner.shared.raw.allocate_command_buffers(&allocate_info) }
            .map_err(|r| vk_error(r, "vkAllocateCommandBuffers"))?;
        let cmd = buffers.into_iter().next().ok_or(GrfxError::AllocationFailed)?;
        Ok(Self { pool: Arc::clone(&pool.inner), command_type: pool.command_type(), cmd, recording: false })
    }

    pub fn native(&self) -> vk::CommandBuffer {
        self.cmd
    }

    fn device(&self) -> &ash::Device {
        &self.pool.shared.raw
    }

    fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.pool.shared.features
    }

    /// Queue family indices for an ownership transfer, or IGNORED on both sides.
    fn transfer_families(transfer: Option<QueueTransfer<'_>>) -> Result<(u32, u32)> {
        match transfer {
            Some(t) => Ok((native_queue(t.src)?.family_index(), native_queue(t.dst)?.family_index())),
            None => Ok((vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED)),
        }
    }
}

impl Drop for VulkanCommandBuffer {
    fn drop(&mut self) {
        unsafe { self.pool.shared.raw.free_command_buffers(self.pool.pool, &[self.cmd]) };
    }
}

impl CommandBufferApi for VulkanCommandBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn begin(&mut self) -> Result<()> {
        if self.recording {
            log::error!("command buffer is already recording");
            return Err(GrfxError::ApiFailure);
        }
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe { self.device().begin_command_buffer(self.cmd, &begin_info) }
            .map_err(|r| vk_error(r, "vkBeginCommandBuffer"))?;
        self.recording = true;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.recording = false;
        unsafe { self.device().end_command_buffer(self.cmd) }.map_err(|r| vk_error(r, "vkEndCommandBuffer"))
    }

    /// Clear values cover every attachment: colors in order, then depth-stencil.
    fn begin_render_pass(&mut self, render_pass: &RenderPass, begin_info: &RenderPassBeginInfo) -> Result<()> {
        let pass = render_pass_of(render_pass)?;
        let mut clear_values: Vec<vk::ClearValue> = (0..pass.color_count())
            .map(|i| vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: begin_info.rtv_clear_values.get(i).map(|c| c.rgba).unwrap_or_default(),
                },
            })
            .collect();
        if pass.has_depth_stencil() {
            let ds = begin_info.dsv_clear_value;
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: ds.depth, stencil: ds.stencil },
            });
        }
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(pass.native())
            .framebuffer(pass.framebuffer())
            .render_area(rect_to_vk(&begin_info.render_area))
            .clear_values(&clear_values);
        unsafe { self.device().cmd_begin_render_pass(self.cmd, &info, vk::SubpassContents::INLINE) };
        Ok(())
    }

    fn end_render_pass(&mut self) {
        unsafe { self.device().cmd_end_render_pass(self.cmd) };
    }

    fn transition_image_layout(
        &mut self,
        image: &Image,
        range: SubresourceRange,
        before: ResourceState,
        after: ResourceState,
        transfer: Option<QueueTransfer<'_>>,
    ) -> Result<()> {
        if before == after && transfer.is_none() {
            return Ok(());
        }
        let families = Self::transfer_families(transfer)?;
        let (src_stage, dst_stage, barrier) = image_barrier(
            native_image(image)?,
            image.format(),
            range,
            before,
            after,
            self.command_type,
            self.features(),
            families,
        )?;
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            )
        };
        Ok(())
    }

    fn buffer_resource_barrier(
        &mut self,
        buffer: &Buffer,
        before: ResourceState,
        after: ResourceState,
        transfer: Option<QueueTransfer<'_>>,
    ) -> Result<()> {
        if before == after && transfer.is_none() {
            return Ok(());
        }
        let native = native_buffer(buffer)?;
        let src = util::barrier_to_vk(before, self.command_type, self.features(), true);
        let dst = util::barrier_to_vk(after, self.command_type, self.features(), false);
        let (src_family, dst_family) = Self::transfer_families(transfer)?;
        let barrier = vk::BufferMemoryBarrier::default()
            .src_access_mask(src.access_mask)
            .dst_access_mask(dst.access_mask)
            .src_queue_family_index(src_family)
            .dst_queue_family_index(dst_family)
            .buffer(native)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.cmd,
                src.stage_mask,
                dst.stage_mask,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            )
        };
        Ok(())
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        let viewports: Vec<vk::Viewport> = viewports.iter().map(flip_viewport).collect();
        unsafe { self.device().cmd_set_viewport(self.cmd, 0, &viewports) };
    }

    fn set_scissors(&mut self, scissors: &[Rect]) {
        let scissors: Vec<vk::Rect2D> = scissors.iter().map(rect_to_vk).collect();
        unsafe { self.device().cmd_set_scissor(self.cmd, 0, &scissors) };
    }

    /// Consecutive set numbers bind in one call; otherwise each set binds on its own.
    fn bind_descriptor_sets(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: &PipelineInterface,
        sets: &[BoundSet<'_>],
    ) -> Result<()> {
        if sets.is_empty() {
            return Ok(());
        }
        let layout = interface_of(interface)?.native().handle();
        let bind_point = util::bind_point_to_vk(bind_point);
        let natives = sets
            .iter()
            .map(|bound| {
                let set = bound.set.api().as_any().downcast_ref::<VulkanDescriptorSet>().ok_or(GrfxError::UnsupportedApi)?;
                Ok(set.native())
            })
            .collect::<Result<Vec<vk::DescriptorSet>>>()?;

        if interface.has_consecutive_set_numbers() {
            unsafe {
                self.device().cmd_bind_descriptor_sets(self.cmd, bind_point, layout, sets[0].set_number, &natives, &[])
            };
        } else {
            for (bound, native) in sets.iter().zip(natives) {
                unsafe {
                    self.device().cmd_bind_descriptor_sets(self.cmd, bind_point, layout, bound.set_number, &[native], &[])
                };
            }
        }
        Ok(())
    }

    fn push_constants(
        &mut self,
        _bind_point: PipelineBindPoint,
        interface: &PipelineInterface,
        values: &[u32],
        dst_offset: u32,
    ) -> Result<()> {
        let native = interface_of(interface)?;
        unsafe {
            self.device().cmd_push_constants(
                self.cmd,
                native.native().handle(),
                native.push_constant_stages(),
                dst_offset * 4,
                bytemuck::cast_slice(values),
            )
        };
        Ok(())
    }

    fn push_descriptor(
        &mut self,
        bind_point: PipelineBindPoint,
        interface: &PipelineInterface,
        push: &PushDescriptor<'_>,
    ) -> Result<()> {
        let native = interface_of(interface)?;
        let loader = self.pool.shared.push_descriptor.as_ref().ok_or_else(|| {
            log::error!("push descriptors need VK_KHR_push_descriptor");
            GrfxError::UnsupportedApi
        })?;
        let source = DescriptorSource {
            descriptor_type: push.descriptor_type,
            buffer: push.buffer,
            buffer_offset: push.buffer_offset,
            buffer_range: WHOLE_SIZE,
            structured_element_count: 0,
            image_view: push.image_view,
            sampler: push.sampler,
        };
        let writes = [NativeWrite {
            binding: push.binding,
            array_element: 0,
            descriptor_type: util::descriptor_type_to_vk(push.descriptor_type),
            info: source.to_vk()?,
        }];
        let descriptor_writes = write_descriptor_sets(vk::DescriptorSet::null(), &writes);
        unsafe {
            loader.cmd_push_descriptor_set(
                self.cmd,
                util::bind_point_to_vk(bind_point),
                native.native().handle(),
                push.set,
                &descriptor_writes,
            )
        };
        Ok(())
    }

    fn bind_graphics_pipeline(&mut self, pipeline: &GraphicsPipeline, _interface: &PipelineInterface) {
        match native_pipeline(pipeline.api()) {
            Ok(native) => unsafe { self.device().cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, native) },
            Err(_) => log::error!("graphics pipeline was not created by the Vulkan backend"),
        }
    }

    fn bind_compute_pipeline(&mut self, pipeline: &ComputePipeline, _interface: &PipelineInterface) {
        match native_pipeline(pipeline.api()) {
            Ok(native) => unsafe { self.device().cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::COMPUTE, native) },
            Err(_) => log::error!("compute pipeline was not created by the Vulkan backend"),
        }
    }

    fn bind_index_buffer(&mut self, buffer: &Buffer, view: &IndexBufferView) {
        let Ok(native) = native_buffer(buffer) else { return };
        unsafe {
            self.device().cmd_bind_index_buffer(self.cmd, native, view.offset, util::index_type_to_vk(view.index_type))
        };
    }

    fn bind_vertex_buffers(&mut self, views: &[(&Buffer, &VertexBufferView)]) {
        let Ok(buffers) = views.iter().map(|(buffer, _)| native_buffer(buffer)).collect::<Result<Vec<_>>>() else {
            return;
        };
        let offsets: Vec<u64> = views.iter().map(|(_, view)| view.offset).collect();
        unsafe { self.device().cmd_bind_vertex_buffers(self.cmd, 0, &buffers, &offsets) };
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe { self.device().cmd_draw(self.cmd, vertex_count, instance_count, first_vertex, first_instance) };
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
        unsafe {
            self.device().cmd_draw_indexed(self.cmd, index_count, instance_count, first_index, vertex_offset, first_instance)
        };
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        unsafe { self.device().cmd_dispatch(self.cmd, x, y, z) };
    }

    fn copy_buffer_to_buffer(&mut self, info: &BufferToBufferCopyInfo, src: &Buffer, dst: &Buffer) {
        let (Ok(src), Ok(dst)) = (native_buffer(src), native_buffer(dst)) else { return };
        let region = vk::BufferCopy { src_offset: info.src_offset, dst_offset: info.dst_offset, size: info.size };
        unsafe { self.device().cmd_copy_buffer(self.cmd, src, dst, &[region]) };
    }

    /// Rows in the buffer are `image_width` texels apart; a zero width means tightly packed.
    fn copy_buffer_to_image(&mut self, infos: &[BufferToImageCopyInfo], src: &Buffer, dst: &Image) {
        let (Ok(src_native), Ok(dst_native)) = (native_buffer(src), native_image(dst)) else { return };
        let regions: Vec<vk::BufferImageCopy> = infos
            .iter()
            .map(|info| {
                let region = &info.dst_image;
                vk::BufferImageCopy {
                    buffer_offset: info.src_buffer.footprint_offset,
                    buffer_row_length: info.src_buffer.image_width,
                    buffer_image_height: info.src_buffer.image_height,
                    image_subresource: subresource_layers(dst, region.mip_level, region.array_layer, region.array_layer_count),
                    image_offset: offset_3d([region.x, region.y, region.z]),
                    image_extent: extent_3d([region.width, region.height, region.depth]),
                }
            })
            .collect();
        unsafe {
            self.device().cmd_copy_buffer_to_image(
                self.cmd,
                src_native,
                dst_native,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            )
        };
    }

    /// Output rows are tightly packed. Depth-stencil images copy their depth aspect.
    fn copy_image_to_buffer(&mut self, info: &ImageToBufferCopyInfo, src: &Image, dst: &Buffer) -> ImageToBufferOutputPitch {
        let pitch = output_pitch(src.format(), info.extent[0]);
        let (Ok(src_native), Ok(dst_native)) = (native_image(src), native_buffer(dst)) else { return pitch };
        let at: &ImageSubresourceOffset = &info.src_image;
        let mut layers = subresource_layers(src, at.mip_level, at.array_layer, at.array_layer_count);
        if src.format().aspect() == FormatAspect::DepthStencil {
            layers.aspect_mask = vk::ImageAspectFlags::DEPTH;
        }
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: layers,
            image_offset: offset_3d(at.offset),
            image_extent: extent_3d(info.extent),
        };
        unsafe {
            self.device().cmd_copy_image_to_buffer(
                self.cmd,
                src_native,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_native,
                &[region],
            )
        };
        pitch
    }

    fn copy_image_to_image(&mut self, info: &ImageToImageCopyInfo, src: &Image, dst: &Image) {
        let src_depth_stencil = src.format().aspect() == FormatAspect::DepthStencil;
        let dst_depth_stencil = dst.format().aspect() == FormatAspect::DepthStencil;
        if src_depth_stencil != dst_depth_stencil {
            log::error!("image copies cannot mix depth-stencil and other formats");
            return;
        }
        let (Ok(src_native), Ok(dst_native)) = (native_image(src), native_image(dst)) else { return };
        let (s, d) = (&info.src_image, &info.dst_image);
        let region = vk::ImageCopy {
            src_subresource: subresource_layers(src, s.mip_level, s.array_layer, s.array_layer_count),
            src_offset: offset_3d(s.offset),
            dst_subresource: subresource_layers(dst, d.mip_level, d.array_layer, d.array_layer_count),
            dst_offset: offset_3d(d.offset),
            extent: extent_3d(info.extent),
        };
        unsafe {
            self.device().cmd_copy_image(
                self.cmd,
                src_native,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_native,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }

    fn blit_image(&mut self, info: &ImageBlitInfo, src: &Image, dst: &Image) {
        let (Ok(src_native), Ok(dst_native)) = (native_image(src), native_image(dst)) else { return };
        let (s, d) = (&info.src_image, &info.dst_image);
        let region = vk::ImageBlit {
            src_subresource: subresource_layers(src, s.mip_level, s.array_layer, s.array_layer_count),
            src_offsets: blit_offsets(s),
            dst_subresource: subresource_layers(dst, d.mip_level, d.array_layer, d.array_layer_count),
            dst_offsets: blit_offsets(d),
        };
        unsafe {
            self.device().cmd_blit_image(
                self.cmd,
                src_native,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_native,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                util::filter_to_vk(info.filter),
            )
        };
    }

    fn begin_query(&mut self, query: &Query, index: u32) {
        let Ok(native) = query_of(query) else { return };
        unsafe { self.device().cmd_begin_query(self.cmd, native.pool(), index, native.control_flags()) };
    }

    fn end_query(&mut self, query: &Query, index: u32) {
        let Ok(native) = query_of(query) else { return };
        unsafe { self.device().cmd_end_query(self.cmd, native.pool(), index) };
    }

    fn write_timestamp(&mut self, query: &Query, stage: PipelineStage, index: u32) {
        let Ok(native) = query_of(query) else { return };
        unsafe {
            self.device().cmd_write_timestamp(self.cmd, util::pipeline_stage_to_vk(stage), native.pool(), index)
        };
    }

    /// Copies 64-bit results into the query's readback buffer at the same slots.
    fn resolve_query_data(&mut self, query: &Query, start_index: u32, count: u32) -> Result<()> {
        let native = query_of(query)?;
        let stride = native.result_size();
        unsafe {
            self.device().cmd_copy_query_pool_results(
                self.cmd,
                native.pool(),
                start_index,
                count,
                native.readback(),
                start_index as u64 * stride,
                stride,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCreateInfo;
    use crate::image::ImageCreateInfo;
    use crate::vk::resource::VulkanImage;
    use crate::vk::testing;

    fn features() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
    }

    const IGNORED: (u32, u32) = (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED);

    #[test]
    fn transitions_carry_layouts_and_ranges() {
        let range = SubresourceRange { mip_level: 1, mip_level_count: 2, array_layer: 0, array_layer_count: 3 };
        let (src, dst, barrier) = image_barrier(
            vk::Image::null(),
            Format::R8G8B8A8Unorm,
            range,
            ResourceState::CopyDst,
            ResourceState::ShaderResource,
            CommandType::Graphics,
            &features(),
            IGNORED,
        )
        .unwrap();
        assert_eq!(src, vk::PipelineStageFlags::TRANSFER);
        assert!(dst.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
        assert_eq!(barrier.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!((barrier.subresource_range.base_mip_level, barrier.subresource_range.level_count), (1, 2));
        assert_eq!(barrier.subresource_range.layer_count, 3);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }

    #[test]
    fn depth_stencil_barriers_cover_both_aspects() {
        let range = SubresourceRange { mip_level: 0, mip_level_count: 1, array_layer: 0, array_layer_count: 1 };
        let (_, _, barrier) = image_barrier(
            vk::Image::null(),
            Format::D24UnormS8Uint,
            range,
            ResourceState::Undefined,
            ResourceState::DepthStencilWrite,
            CommandType::Graphics,
            &features(),
            (0, 1),
        )
        .unwrap();
        assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
        assert_eq!((barrier.src_queue_family_index, barrier.dst_queue_family_index), (0, 1));
    }

    #[test]
    fn buffer_states_are_not_image_transitions() {
        let range = SubresourceRange { mip_level: 0, mip_level_count: 1, array_layer: 0, array_layer_count: 1 };
        let result = image_barrier(
            vk::Image::null(),
            Format::R8G8B8A8Unorm,
            range,
            ResourceState::VertexBuffer,
            ResourceState::CopyDst,
            CommandType::Graphics,
            &features(),
            IGNORED,
        );
        assert_eq!(result.err(), Some(GrfxError::InvalidCreateArgument));
    }

    #[test]
    fn viewports_are_flipped() {
        let flipped = flip_viewport(&Viewport { x: 0.0, y: 10.0, width: 640.0, height: 480.0, min_depth: 0.0, max_depth: 1.0 });
        assert_eq!((flipped.y, flipped.height), (490.0, -480.0));
        assert_eq!(flipped.width, 640.0);
    }

    #[test]
    fn image_readback_pitch_is_tight() {
        assert_eq!(output_pitch(Format::R8G8B8A8Unorm, 10).row_pitch, 40);
        assert_eq!(output_pitch(Format::R32Float, 3).row_pitch, 12);
    }

    #[test]
    fn begin_while_recording_fails() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let device = instance.device(handle).unwrap();
        let queue = device.objects().queue(device.graphics_queue(0).unwrap()).unwrap();
        let pool = VulkanCommandPool::new(&shared, queue).unwrap();
        let mut cmd = VulkanCommandBuffer::new(&pool, &CommandBufferCreateInfo::default()).unwrap();

        cmd.begin().unwrap();
        let info = ImageCreateInfo::sampled_image_2d(16, 16, Format::R8G8B8A8Unorm);
        let texture = Image::new(info.clone(), Box::new(VulkanImage::new(&shared, &info).unwrap()));
        let all = SubresourceRange::all(&texture);
        cmd.transition_image_layout(&texture, all, ResourceState::Undefined, ResourceState::ShaderResource, None)
            .unwrap();
        assert_eq!(cmd.begin(), Err(GrfxError::ApiFailure));
        cmd.end().unwrap();
        cmd.begin().unwrap();
        cmd.end().unwrap();
    }
}
