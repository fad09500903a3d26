//! Buffers, images, samplers and image views.

use std::any::Any;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use parking_lot::Mutex;

use super::util::{self, vk_error};
use super::DeviceShared;
use crate::backend::{BufferApi, ImageApi, ImageViewApi, SamplerApi};
use crate::buffer::BufferCreateInfo;
use crate::error::{GrfxError, Result};
use crate::format::Format;
use crate::image::{ImageCreateInfo, SamplerCreateInfo, ViewRange};
use crate::memory::{map_host, memory_location, HostPointer, MappedMemory};
use crate::types::{ImageType, MemoryUsage};

#[derive(Debug)]
pub struct VulkanBuffer {
    shared: Arc<DeviceShared>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    host: Mutex<Option<HostPointer>>,
}

impl VulkanBuffer {
    pub fn new(shared: &Arc<DeviceShared>, info: &BufferCreateInfo) -> Result<Self> {
        let usage = util::buffer_usage_to_vk(info.usage_flags);
        let create_info = vk::BufferCreateInfo::default()
            .size(info.size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { shared.raw.create_buffer(&create_info, None) }.map_err(|r| vk_error(r, "vkCreateBuffer"))?;
        let requirements = unsafe { shared.raw.get_buffer_memory_requirements(buffer) };

        let allocation = shared.allocate(&AllocationCreateDesc {
            name: "grfx buffer",
            requirements,
            location: memory_location(info.memory_usage),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { shared.raw.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };
        if let Err(r) = unsafe { shared.raw.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) } {
            shared.free(allocation);
            unsafe { shared.raw.destroy_buffer(buffer, None) };
            return Err(vk_error(r, "vkBindBufferMemory"));
        }

        // Host-visible allocations stay persistently mapped; only the requested size is exposed.
        let host = match (info.memory_usage, allocation.mapped_ptr()) {
            (MemoryUsage::GpuOnly, _) | (_, None) => None,
            (_, Some(ptr)) => Some(unsafe { HostPointer::new(ptr.cast(), info.size as usize) }),
        };
        log::trace!("VkBuffer {} bytes, usage {:?}, {:?}", info.size, usage, info.memory_usage);
        Ok(Self { shared: Arc::clone(shared), buffer, allocation: Some(allocation), host: Mutex::new(host) })
    }

    pub fn native(&self) -> vk::Buffer {
        self.buffer
    }
}

impl BufferApi for VulkanBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn map(&self) -> Result<MappedMemory<'_>> {
        map_host(&self.host)
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        self.host.get_mut().take();
        if let Some(allocation) = self.allocation.take() {
            self.shared.free(allocation);
        }
        unsafe { self.shared.raw.destroy_buffer(self.buffer, None) };
    }
}

fn image_create_info(info: &ImageCreateInfo) -> Result<vk::ImageCreateInfo<'static>> {
    let format = util::format_to_vk(info.format);
    if format == vk::Format::UNDEFINED {
        log::error!("{:?} has no Vulkan format", info.format);
        return Err(GrfxError::InvalidCreateArgument);
    }
    let flags = match info.image_type {
        ImageType::Cube => vk::ImageCreateFlags::CUBE_COMPATIBLE,
        _ => vk::ImageCreateFlags::empty(),
    };
    let sharing_mode =
        if info.concurrent_multi_queue_usage { vk::SharingMode::CONCURRENT } else { vk::SharingMode::EXCLUSIVE };
    Ok(vk::ImageCreateInfo::default()
        .flags(flags)
        .image_type(util::image_type_to_vk(info.image_type))
        .format(format)
        .extent(vk::Extent3D { width: info.width, height: info.height, depth: info.depth })
        .mip_levels(info.mip_level_count)
        .array_layers(info.array_layer_count)
        .samples(util::sample_count_to_vk(info.sample_count))
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(
            util::image_usage_to_vk(info.usage_flags) | vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST,
        )
        .sharing_mode(sharing_mode)
        .initial_layout(vk::ImageLayout::UNDEFINED))
}

#[derive(Debug)]
pub struct VulkanImage {
    shared: Arc<DeviceShared>,
    image: vk::Image,
    /// `None` for images owned elsewhere, such as swapchain images.
    allocation: Option<Allocation>,
}

impl VulkanImage {
    pub fn new(shared: &Arc<DeviceShared>, info: &ImageCreateInfo) -> Result<Self> {
        let create_info = image_create_info(info)?;
        if info.memory_usage != MemoryUsage::GpuOnly {
            log::warn!("images are allocated device-local; {:?} is ignored", info.memory_usage);
        }
        let image = unsafe { shared.raw.create_image(&create_info, None) }.map_err(|r| vk_error(r, "vkCreateImage"))?;
        let requirements = unsafe { shared.raw.get_image_memory_requirements(image) };

        let allocation = shared.allocate(&AllocationCreateDesc {
            name: "grfx image",
            requirements,
            location: memory_location(MemoryUsage::GpuOnly),
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { shared.raw.destroy_image(image, None) };
                return Err(e);
            }
        };
        if let Err(r) = unsafe { shared.raw.bind_image_memory(image, allocation.memory(), allocation.offset()) } {
            shared.free(allocation);
            unsafe { shared.raw.destroy_image(image, None) };
            return Err(vk_error(r, "vkBindImageMemory"));
        }
        Ok(Self { shared: Arc::clone(shared), image, allocation: Some(allocation) })
    }

    /// Wraps an image owned elsewhere, such as a swapchain image. It is not destroyed on drop.
    pub(crate) fn from_native(shared: &Arc<DeviceShared>, image: vk::Image) -> Self {
        Self { shared: Arc::clone(shared), image, allocation: None }
    }

    pub fn native(&self) -> vk::Image {
        self.image
    }

    pub fn allocation_size(&self) -> Option<u64> {
        self.allocation.as_ref().map(Allocation::size)
    }
}

impl ImageApi for VulkanImage {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.shared.free(allocation);
            unsafe { self.shared.raw.destroy_image(self.image, None) };
        }
    }
}

#[derive(Debug)]
pub struct VulkanSampler {
    shared: Arc<DeviceShared>,
    sampler: vk::Sampler,
}

impl VulkanSampler {
    pub fn new(shared: &Arc<DeviceShared>, info: &SamplerCreateInfo) -> Result<Self> {
        let mut create_info = util::sampler_info(info);
        if create_info.anisotropy_enable == vk::TRUE && shared.features.sampler_anisotropy == vk::FALSE {
            log::warn!("sampler anisotropy is not supported; disabled");
            create_info = create_info.anisotropy_enable(false);
        }
        let sampler =
            unsafe { shared.raw.create_sampler(&create_info, None) }.map_err(|r| vk_error(r, "vkCreateSampler"))?;
        Ok(Self { shared: Arc::clone(shared), sampler })
    }

    pub fn native(&self) -> vk::Sampler {
        self.sampler
    }
}

impl SamplerApi for VulkanSampler {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanSampler {
    fn drop(&mut self) {
        unsafe { self.shared.raw.destroy_sampler(self.sampler, None) };
    }
}

/// Sampled views of depth-stencil images read the depth aspect only.
fn view_aspect(format: Format, sampled: bool) -> vk::ImageAspectFlags {
    if sampled && format.has_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        util::aspect_mask(format)
    }
}

fn subresource_range(range: &ViewRange, sampled: bool) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: view_aspect(range.format, sampled),
        base_mip_level: range.mip_level,
        level_count: range.mip_level_count,
        base_array_layer: range.array_layer,
        layer_count: range.array_layer_count,
    }
}

/// One image view kind; the layout it is read or written in is decided at update and bind time.
#[derive(Debug)]
pub struct VulkanImageView {
    shared: Arc<DeviceShared>,
    view: vk::ImageView,
    aspect_mask: vk::ImageAspectFlags,
}

impl VulkanImageView {
    pub fn new(shared: &Arc<DeviceShared>, image: &VulkanImage, range: &ViewRange, sampled: bool) -> Result<Self> {
        let subresource_range = subresource_range(range, sampled);
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image.native())
            .view_type(util::view_type_to_vk(range.view_type))
            .format(util::format_to_vk(range.format))
            .subresource_range(subresource_range);
        let view =
            unsafe { shared.raw.create_image_view(&create_info, None) }.map_err(|r| vk_error(r, "vkCreateImageView"))?;
        Ok(Self { shared: Arc::clone(shared), view, aspect_mask: subresource_range.aspect_mask })
    }

    pub fn native(&self) -> vk::ImageView {
        self.view
    }

    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        self.aspect_mask
    }
}

impl ImageViewApi for VulkanImageView {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanImageView {
    fn drop(&mut self) {
        unsafe { self.shared.raw.destroy_image_view(self.view, None) };
    }
}

pub(crate) fn native_buffer(buffer: &crate::buffer::Buffer) -> Result<vk::Buffer> {
    buffer.api().as_any().downcast_ref::<VulkanBuffer>().map(VulkanBuffer::native).ok_or(GrfxError::UnsupportedApi)
}

pub(crate) fn native_image(image: &crate::image::Image) -> Result<vk::Image> {
    vulkan_image(image).map(VulkanImage::native)
}

pub(crate) fn vulkan_image(image: &crate::image::Image) -> Result<&VulkanImage> {
    image.api().as_any().downcast_ref::<VulkanImage>().ok_or(GrfxError::UnsupportedApi)
}

pub(crate) fn native_view(view: &dyn ImageViewApi) -> Result<vk::ImageView> {
    view.as_any().downcast_ref::<VulkanImageView>().map(VulkanImageView::native).ok_or(GrfxError::UnsupportedApi)
}

pub(crate) fn native_sampler(sampler: &crate::image::Sampler) -> Result<vk::Sampler> {
    sampler.api().as_any().downcast_ref::<VulkanSampler>().map(VulkanSampler::native).ok_or(GrfxError::UnsupportedApi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCreateInfo;
    use crate::types::{BufferUsageFlags, ImageViewType};
    use crate::vk::testing;

    fn range(format: Format) -> ViewRange {
        ViewRange {
            view_type: ImageViewType::D2,
            format,
            mip_level: 0,
            mip_level_count: 1,
            array_layer: 0,
            array_layer_count: 1,
        }
    }

    #[test]
    fn cube_images_are_cube_compatible() {
        let info = ImageCreateInfo {
            image_type: ImageType::Cube,
            width: 16,
            height: 16,
            format: Format::R8G8B8A8Unorm,
            array_layer_count: 6,
            ..Default::default()
        };
        let create_info = image_create_info(&info).unwrap();
        assert!(create_info.flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
        assert_eq!(create_info.image_type, vk::ImageType::TYPE_2D);
        assert_eq!(create_info.initial_layout, vk::ImageLayout::UNDEFINED);
        assert!(create_info.usage.contains(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST));
    }

    #[test]
    fn sampled_depth_views_read_depth_only() {
        let sampled = subresource_range(&range(Format::D24UnormS8Uint), true);
        assert_eq!(sampled.aspect_mask, vk::ImageAspectFlags::DEPTH);
        let attachment = subresource_range(&range(Format::D24UnormS8Uint), false);
        assert_eq!(attachment.aspect_mask, vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
        assert_eq!(subresource_range(&range(Format::R8G8B8A8Unorm), true).aspect_mask, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn host_visible_buffers_map_their_requested_size() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);

        let upload = VulkanBuffer::new(&shared, &BufferCreateInfo::staging(100)).unwrap();
        assert_eq!(upload.map().unwrap().len(), 100);

        let info = BufferCreateInfo::new(64, BufferUsageFlags::VERTEX_BUFFER, MemoryUsage::GpuOnly);
        let local = VulkanBuffer::new(&shared, &info).unwrap();
        assert_eq!(local.map().err(), Some(GrfxError::Failed));
    }

    #[test]
    fn depth_views_over_allocated_images() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let image = VulkanImage::new(&shared, &ImageCreateInfo::depth_stencil_target(8, 8, Format::D32Float)).unwrap();
        let view = VulkanImageView::new(&shared, &image, &range(Format::D32Float), true).unwrap();
        assert_eq!(view.aspect_mask(), vk::ImageAspectFlags::DEPTH);
        assert_ne!(view.native(), vk::ImageView::null());
    }
}
