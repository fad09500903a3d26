//! Descriptor pools, set layouts and sets map one-to-one onto their Vulkan objects.

use std::any::Any;
use std::sync::Arc;

use ash::vk;

use super::resource::{native_buffer, native_sampler, native_view};
use super::util::{self, vk_error};
use super::DeviceShared;
use crate::backend::{DescriptorPoolApi, DescriptorSetApi, DescriptorSetLayoutApi, ImageViewApi};
use crate::buffer::Buffer;
use crate::descriptor::{DescriptorPool, DescriptorPoolCreateInfo, DescriptorSetLayout, DescriptorSetLayoutCreateInfo, ResolvedWrite};
use crate::error::{GrfxError, Result};
use crate::image::Sampler;
use crate::types::DescriptorType;
use crate::{MAX_SETS_PER_POOL, WHOLE_SIZE};

/// Pool sizes merged per Vulkan type: raw and structured buffers are all storage buffers.
fn pool_sizes(info: &DescriptorPoolCreateInfo) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for (ty, count) in info.counts().into_iter().filter(|(_, count)| *count > 0) {
        let ty = util::descriptor_type_to_vk(ty);
        match sizes.iter_mut().find(|size| size.ty == ty) {
            Some(size) => size.descriptor_count += count,
            None => sizes.push(vk::DescriptorPoolSize { ty, descriptor_count: count }),
        }
    }
    sizes
}

#[derive(Debug)]
pub(crate) struct PoolInner {
    shared: Arc<DeviceShared>,
    pool: vk::DescriptorPool,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        unsafe { self.shared.raw.destroy_descriptor_pool(self.pool, None) };
    }
}

/// Sets hold the pool alive and hand their descriptors back when dropped.
#[derive(Debug)]
pub struct VulkanDescriptorPool {
    inner: Arc<PoolInner>,
}

impl VulkanDescriptorPool {
    pub fn new(shared: &Arc<DeviceShared>, info: &DescriptorPoolCreateInfo) -> Result<Self> {
        let sizes = pool_sizes(info);
        if sizes.is_empty() {
            log::error!("descriptor pool requests no descriptors");
            return Err(GrfxError::InvalidCreateArgument);
        }
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(MAX_SETS_PER_POOL)
            .pool_sizes(&sizes);
        let pool = unsafe { shared.raw.create_descriptor_pool(&create_info, None) }
            .map_err(|r| vk_error(r, "vkCreateDescriptorPool"))?;
        Ok(Self { inner: Arc::new(PoolInner { shared: Arc::clone(shared), pool }) })
    }

    pub fn native(&self) -> vk::DescriptorPool {
        self.inner.pool
    }
}

impl DescriptorPoolApi for VulkanDescriptorPool {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One binding of a set layout, as created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

/// A VkDescriptorSetLayout with the bindings it was built from. Pipeline layouts share it.
#[derive(Debug)]
pub struct SetLayout {
    shared: Arc<DeviceShared>,
    handle: vk::DescriptorSetLayout,
    bindings: Vec<LayoutBinding>,
    push_descriptor: bool,
}

impl SetLayout {
    pub(crate) fn new(shared: &Arc<DeviceShared>, bindings: Vec<LayoutBinding>, push_descriptor: bool) -> Result<Self> {
        let native_bindings: Vec<_> = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.descriptor_count)
                    .stage_flags(b.stage_flags)
            })
            .collect();
        let flags = if push_descriptor {
            vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR
        } else {
            vk::DescriptorSetLayoutCreateFlags::empty()
        };
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().flags(flags).bindings(&native_bindings);
        let handle = unsafe { shared.raw.create_descriptor_set_layout(&create_info, None) }
            .map_err(|r| vk_error(r, "vkCreateDescriptorSetLayout"))?;
        Ok(Self { shared: Arc::clone(shared), handle, bindings, push_descriptor })
    }

    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn binding(&self, binding: u32) -> Option<&LayoutBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }

    pub fn is_push_descriptor(&self) -> bool {
        self.push_descriptor
    }
}

impl Drop for SetLayout {
    fn drop(&mut self) {
        unsafe { self.shared.raw.destroy_descriptor_set_layout(self.handle, None) };
    }
}

fn layout_bindings(info: &DescriptorSetLayoutCreateInfo) -> Vec<LayoutBinding> {
    info.bindings
        .iter()
        .map(|b| LayoutBinding {
            binding: b.binding,
            descriptor_type: util::descriptor_type_to_vk(b.descriptor_type),
            descriptor_count: b.array_count,
            stage_flags: util::shader_stages_to_vk(b.shader_visibility),
        })
        .collect()
}

#[derive(Debug)]
pub struct VulkanDescriptorSetLayout {
    layout: Arc<SetLayout>,
}

impl VulkanDescriptorSetLayout {
    pub fn new(shared: &Arc<DeviceShared>, info: &DescriptorSetLayoutCreateInfo) -> Result<Self> {
        if info.pushable && shared.push_descriptor.is_none() {
            log::error!("push descriptor layouts need VK_KHR_push_descriptor");
            return Err(GrfxError::UnsupportedApi);
        }
        let layout = SetLayout::new(shared, layout_bindings(info), info.pushable)?;
        log::trace!("VkDescriptorSetLayout with {} bindings", layout.bindings().len());
        Ok(Self { layout: Arc::new(layout) })
    }

    pub fn native(&self) -> &Arc<SetLayout> {
        &self.layout
    }
}

impl DescriptorSetLayoutApi for VulkanDescriptorSetLayout {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn native_set_layout(layout: &DescriptorSetLayout) -> Result<&Arc<SetLayout>> {
    layout
        .api()
        .as_any()
        .downcast_ref::<VulkanDescriptorSetLayout>()
        .map(VulkanDescriptorSetLayout::native)
        .ok_or(GrfxError::UnsupportedApi)
}

fn pool_of(pool: &DescriptorPool) -> Result<&VulkanDescriptorPool> {
    pool.api().as_any().downcast_ref::<VulkanDescriptorPool>().ok_or(GrfxError::UnsupportedApi)
}

/// Handles and ranges of one descriptor, ready for a VkWriteDescriptorSet.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DescriptorInfo {
    Image(vk::DescriptorImageInfo),
    Buffer(vk::DescriptorBufferInfo),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct NativeWrite {
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub info: DescriptorInfo,
}

/// VkWriteDescriptorSet for each write, borrowing the infos. Push descriptors ignore `set`.
pub(crate) fn write_descriptor_sets(set: vk::DescriptorSet, writes: &[NativeWrite]) -> Vec<vk::WriteDescriptorSet<'_>> {
    writes
        .iter()
        .map(|w| {
            let write = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(w.binding)
                .dst_array_element(w.array_element)
                .descriptor_type(w.descriptor_type);
            match &w.info {
                DescriptorInfo::Image(info) => write.image_info(std::slice::from_ref(info)),
                DescriptorInfo::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
            }
        })
        .collect()
}

/// The resources one descriptor points at, before translation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DescriptorSource<'a> {
    pub descriptor_type: DescriptorType,
    pub buffer: Option<&'a Buffer>,
    pub buffer_offset: u64,
    pub buffer_range: u64,
    pub structured_element_count: u32,
    pub image_view: Option<&'a dyn ImageViewApi>,
    pub sampler: Option<&'a Sampler>,
}

impl DescriptorSource<'_> {
    /// Image layouts follow how the shader accesses the image.
    pub fn to_vk(&self) -> Result<DescriptorInfo> {
        let view = || -> Result<vk::ImageView> { native_view(self.image_view.ok_or(GrfxError::UnexpectedNullArgument)?) };
        let sampler = || -> Result<vk::Sampler> { native_sampler(self.sampler.ok_or(GrfxError::UnexpectedNullArgument)?) };
        let buffer = || self.buffer.ok_or(GrfxError::UnexpectedNullArgument);
        let image = |sampler: vk::Sampler, image_view: vk::ImageView, image_layout: vk::ImageLayout| {
            DescriptorInfo::Image(vk::DescriptorImageInfo { sampler, image_view, image_layout })
        };

        let info = match self.descriptor_type {
            DescriptorType::Sampler => image(sampler()?, vk::ImageView::null(), vk::ImageLayout::UNDEFINED),
            DescriptorType::CombinedImageSampler => {
                image(sampler()?, view()?, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            }
            DescriptorType::SampledImage | DescriptorType::InputAttachment => {
                image(vk::Sampler::null(), view()?, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            }
            DescriptorType::StorageImage => image(vk::Sampler::null(), view()?, vk::ImageLayout::GENERAL),
            // Texel buffer descriptors need a VkBufferView, and writes carry no view format.
            DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer => {
                log::error!("{:?} descriptors are not supported on Vulkan", self.descriptor_type);
                return Err(GrfxError::UnsupportedApi);
            }
            DescriptorType::RoStructuredBuffer | DescriptorType::RwStructuredBuffer => {
                let buffer = buffer()?;
                let range = match self.structured_element_count {
                    0 => vk::WHOLE_SIZE,
                    count => count as u64 * buffer.structured_element_stride() as u64,
                };
                DescriptorInfo::Buffer(vk::DescriptorBufferInfo {
                    buffer: native_buffer(buffer)?,
                    offset: self.buffer_offset,
                    range,
                })
            }
            DescriptorType::UniformBuffer
            | DescriptorType::RawStorageBuffer
            | DescriptorType::UniformBufferDynamic
            | DescriptorType::StorageBufferDynamic => {
                let range = if self.buffer_range == WHOLE_SIZE { vk::WHOLE_SIZE } else { self.buffer_range };
                DescriptorInfo::Buffer(vk::DescriptorBufferInfo {
                    buffer: native_buffer(buffer()?)?,
                    offset: self.buffer_offset,
                    range,
                })
            }
        };
        Ok(info)
    }
}

pub(crate) fn native_writes(writes: &[ResolvedWrite<'_>]) -> Result<Vec<NativeWrite>> {
    writes
        .iter()
        .map(|resolved| {
            let write = resolved.write;
            let source = DescriptorSource {
                descriptor_type: write.descriptor_type,
                buffer: resolved.buffer,
                buffer_offset: write.buffer_offset,
                buffer_range: write.buffer_range,
                structured_element_count: write.structured_element_count,
                image_view: resolved.image_view,
                sampler: resolved.sampler,
            };
            Ok(NativeWrite {
                binding: write.binding,
                array_element: write.array_index,
                descriptor_type: util::descriptor_type_to_vk(write.descriptor_type),
                info: source.to_vk()?,
            })
        })
        .collect()
}

#[derive(Debug)]
pub struct VulkanDescriptorSet {
    pool: Arc<PoolInner>,
    set: vk::DescriptorSet,
}

impl VulkanDescriptorSet {
    pub fn new(pool: &DescriptorPool, layout: &DescriptorSetLayout) -> Result<Self> {
        let pool = Arc::clone(&pool_of(pool)?.inner);
        let layouts = [native_set_layout(layout)?.handle()];
        let allocate_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool.pool).set_layouts(&layouts);
        let sets = unsafe { pool.shared.raw.allocate_descriptor_sets(&allocate_info) }
            .map_err(|r| vk_error(r, "vkAllocateDescriptorSets"))?;
        let set = sets.into_iter().next().ok_or(GrfxError::AllocationFailed)?;
        Ok(Self { pool, set })
    }

    pub fn native(&self) -> vk::DescriptorSet {
        self.set
    }
}

impl DescriptorSetApi for VulkanDescriptorSet {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn update_descriptors(&self, _layout: &DescriptorSetLayout, writes: &[ResolvedWrite<'_>]) -> Result<()> {
        if writes.is_empty() {
            return Err(GrfxError::UnexpectedCountValue);
        }
        let writes = native_writes(writes)?;
        let descriptor_writes = write_descriptor_sets(self.set, &writes);
        unsafe { self.pool.shared.raw.update_descriptor_sets(&descriptor_writes, &[]) };
        Ok(())
    }
}

impl Drop for VulkanDescriptorSet {
    fn drop(&mut self) {
        if let Err(r) = unsafe { self.pool.shared.raw.free_descriptor_sets(self.pool.pool, &[self.set]) } {
            log::warn!("vkFreeDescriptorSets failed: {:?}", r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferCreateInfo;
    use crate::config::DeviceCreateInfo;
    use crate::descriptor::{DescriptorBinding, WriteDescriptor};
    use crate::types::{BufferUsageFlags, MemoryUsage, ShaderStageFlags};
    use crate::vk::resource::VulkanBuffer;
    use crate::vk::testing;

    #[test]
    fn structured_and_raw_buffers_share_one_pool_size() {
        let info = DescriptorPoolCreateInfo {
            raw_storage_buffer: 2,
            ro_structured_buffer: 3,
            rw_structured_buffer: 1,
            sampler: 4,
            ..Default::default()
        };
        let sizes: Vec<_> = pool_sizes(&info).iter().map(|s| (s.ty, s.descriptor_count)).collect();
        assert_eq!(sizes, vec![(vk::DescriptorType::SAMPLER, 4), (vk::DescriptorType::STORAGE_BUFFER, 6)]);
        assert!(pool_sizes(&DescriptorPoolCreateInfo::default()).is_empty());
    }

    #[test]
    fn layout_bindings_keep_visibility_and_counts() {
        let info = DescriptorSetLayoutCreateInfo::new(vec![
            DescriptorBinding::new(3, DescriptorType::UniformBuffer),
            DescriptorBinding::new(5, DescriptorType::SampledImage).with_array_count(4).with_visibility(ShaderStageFlags::PS),
        ]);
        let bindings = layout_bindings(&info);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::ALL);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::SAMPLED_IMAGE);
        assert_eq!(bindings[1].descriptor_count, 4);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn writes_borrow_their_infos() {
        let buffer_info = vk::DescriptorBufferInfo { buffer: vk::Buffer::null(), offset: 16, range: vk::WHOLE_SIZE };
        let writes = [NativeWrite {
            binding: 2,
            array_element: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            info: DescriptorInfo::Buffer(buffer_info),
        }];
        let native = write_descriptor_sets(vk::DescriptorSet::null(), &writes);
        assert_eq!(native[0].dst_binding, 2);
        assert_eq!(native[0].dst_array_element, 1);
        assert_eq!(native[0].descriptor_count, 1);
        assert!(native[0].p_image_info.is_null());
        assert_eq!(unsafe { (*native[0].p_buffer_info).offset }, 16);
    }

    #[test]
    fn texel_buffers_are_rejected() {
        let source = DescriptorSource {
            descriptor_type: DescriptorType::UniformTexelBuffer,
            buffer: None,
            buffer_offset: 0,
            buffer_range: WHOLE_SIZE,
            structured_element_count: 0,
            image_view: None,
            sampler: None,
        };
        assert_eq!(source.to_vk().err(), Some(GrfxError::UnsupportedApi));
        let sampled = DescriptorSource { descriptor_type: DescriptorType::SampledImage, ..source };
        assert_eq!(sampled.to_vk().err(), Some(GrfxError::UnexpectedNullArgument));
    }

    #[test]
    fn buffer_writes_reach_the_driver() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let layout_info = DescriptorSetLayoutCreateInfo::new(vec![DescriptorBinding::new(0, DescriptorType::UniformBuffer)]);
        let layout = DescriptorSetLayout::new(
            layout_info.clone(),
            Box::new(VulkanDescriptorSetLayout::new(&shared, &layout_info).unwrap()),
        );
        let pool_info = DescriptorPoolCreateInfo { uniform_buffer: 1, ..Default::default() };
        let pool = DescriptorPool::new(pool_info, Box::new(VulkanDescriptorPool::new(&shared, &pool_info).unwrap()));
        let set = VulkanDescriptorSet::new(&pool, &layout).unwrap();
        assert_ne!(set.native(), vk::DescriptorSet::null());

        assert_eq!(set.update_descriptors(&layout, &[]), Err(GrfxError::UnexpectedCountValue));

        let info = BufferCreateInfo::new(256, BufferUsageFlags::UNIFORM_BUFFER, MemoryUsage::CpuToGpu);
        let buffer = Buffer::new(info.clone(), Box::new(VulkanBuffer::new(&shared, &info).unwrap()));
        let write = WriteDescriptor { descriptor_type: DescriptorType::UniformBuffer, ..Default::default() };
        let resolved = ResolvedWrite { write: &write, buffer: Some(&buffer), image_view: None, sampler: None };
        set.update_descriptors(&layout, &[resolved]).unwrap();

        let missing = ResolvedWrite { write: &write, buffer: None, image_view: None, sampler: None };
        assert_eq!(set.update_descriptors(&layout, &[missing]), Err(GrfxError::UnexpectedNullArgument));
    }
}
