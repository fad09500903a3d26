//! Descriptor pools, set layouts and sets.
//!
//! Pool capacity is tracked here for both backends as two running totals: CBV/SRV/UAV-class
//! descriptors and samplers. Backends only create the native objects.

use crate::backend::{DescriptorPoolApi, DescriptorSetApi, DescriptorSetLayoutApi, ImageViewApi};
use crate::buffer::Buffer;
use crate::error::{GrfxError, Result};
use crate::image::Sampler;
use crate::types::{DescriptorType, ShaderStageFlags};
use crate::{
    BufferHandle, DescriptorPoolHandle, DescriptorSetLayoutHandle, SampledImageViewHandle,
    SamplerHandle, StorageImageViewHandle, WHOLE_SIZE,
};

/// Requested capacity per descriptor type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorPoolCreateInfo {
    pub sampler: u32,
    pub combined_image_sampler: u32,
    pub sampled_image: u32,
    pub storage_image: u32,
    pub uniform_texel_buffer: u32,
    pub storage_texel_buffer: u32,
    pub uniform_buffer: u32,
    pub raw_storage_buffer: u32,
    pub ro_structured_buffer: u32,
    pub rw_structured_buffer: u32,
    pub uniform_buffer_dynamic: u32,
    pub storage_buffer_dynamic: u32,
    pub input_attachment: u32,
}

impl DescriptorPoolCreateInfo {
    /// Every (type, count) pair, zero counts included.
    pub fn counts(&self) -> [(DescriptorType, u32); 13] {
        [
            (DescriptorType::Sampler, self.sampler),
            (DescriptorType::CombinedImageSampler, self.combined_image_sampler),
            (DescriptorType::SampledImage, self.sampled_image),
            (DescriptorType::StorageImage, self.storage_image),
            (DescriptorType::UniformTexelBuffer, self.uniform_texel_buffer),
            (DescriptorType::StorageTexelBuffer, self.storage_texel_buffer),
            (DescriptorType::UniformBuffer, self.uniform_buffer),
            (DescriptorType::RawStorageBuffer, self.raw_storage_buffer),
            (DescriptorType::RoStructuredBuffer, self.ro_structured_buffer),
            (DescriptorType::RwStructuredBuffer, self.rw_structured_buffer),
            (DescriptorType::UniformBufferDynamic, self.uniform_buffer_dynamic),
            (DescriptorType::StorageBufferDynamic, self.storage_buffer_dynamic),
            (DescriptorType::InputAttachment, self.input_attachment),
        ]
    }

    pub fn capacity(&self) -> DescriptorCounts {
        self.counts()
            .iter()
            .fold(DescriptorCounts::default(), |acc, (ty, count)| acc.add(DescriptorCounts::of(*ty, *count)))
    }
}

/// Descriptor totals split the way D3D12 splits its heaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorCounts {
    pub cbv_srv_uav: u32,
    pub sampler: u32,
}

impl DescriptorCounts {
    pub fn of(ty: DescriptorType, count: u32) -> Self {
        match ty {
            DescriptorType::Sampler => Self { cbv_srv_uav: 0, sampler: count },
            DescriptorType::CombinedImageSampler => Self { cbv_srv_uav: count, sampler: count },
            _ => Self { cbv_srv_uav: count, sampler: 0 },
        }
    }

    pub fn add(self, other: Self) -> Self {
        Self {
            cbv_srv_uav: self.cbv_srv_uav.saturating_add(other.cbv_srv_uav),
            sampler: self.sampler.saturating_add(other.sampler),
        }
    }

    pub fn total(&self) -> u32 {
        self.cbv_srv_uav + self.sampler
    }
}

#[derive(Debug)]
pub struct DescriptorPool {
    create_info: DescriptorPoolCreateInfo,
    capacity: DescriptorCounts,
    allocated: DescriptorCounts,
    api: Box<dyn DescriptorPoolApi>,
}

impl DescriptorPool {
    pub(crate) fn new(create_info: DescriptorPoolCreateInfo, api: Box<dyn DescriptorPoolApi>) -> Self {
        Self { capacity: create_info.capacity(), create_info, allocated: DescriptorCounts::default(), api }
    }

    pub fn create_info(&self) -> &DescriptorPoolCreateInfo {
        &self.create_info
    }

    pub fn capacity(&self) -> DescriptorCounts {
        self.capacity
    }

    pub fn allocated(&self) -> DescriptorCounts {
        self.allocated
    }

    pub fn api(&self) -> &dyn DescriptorPoolApi {
        self.api.as_ref()
    }

    /// Reserves `counts`; fails without touching the totals when either category would overflow.
    pub fn allocate_descriptor_set(&mut self, counts: DescriptorCounts) -> Result<()> {
        let cbv_srv_uav = self.allocated.cbv_srv_uav.checked_add(counts.cbv_srv_uav);
        let sampler = self.allocated.sampler.checked_add(counts.sampler);
        match (cbv_srv_uav, sampler) {
            (Some(c), Some(s)) if c <= self.capacity.cbv_srv_uav && s <= self.capacity.sampler => {
                self.allocated = DescriptorCounts { cbv_srv_uav: c, sampler: s };
                Ok(())
            }
            _ => Err(GrfxError::OutOfMemory),
        }
    }

    pub fn free_descriptor_set(&mut self, counts: DescriptorCounts) {
        assert!(
            counts.cbv_srv_uav <= self.allocated.cbv_srv_uav && counts.sampler <= self.allocated.sampler,
            "descriptor pool free would underflow: freeing {:?} from {:?}",
            counts,
            self.allocated
        );
        self.allocated.cbv_srv_uav -= counts.cbv_srv_uav;
        self.allocated.sampler -= counts.sampler;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub array_count: u32,
    pub shader_visibility: ShaderStageFlags,
}

impl DescriptorBinding {
    pub fn new(binding: u32, descriptor_type: DescriptorType) -> Self {
        Self { binding, descriptor_type, array_count: 1, shader_visibility: ShaderStageFlags::ALL }
    }

    pub fn with_array_count(mut self, array_count: u32) -> Self {
        self.array_count = array_count;
        self
    }

    pub fn with_visibility(mut self, shader_visibility: ShaderStageFlags) -> Self {
        self.shader_visibility = shader_visibility;
        self
    }

    fn range(&self) -> std::ops::Range<u32> {
        self.binding..self.binding.saturating_add(self.array_count)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutCreateInfo {
    /// Push-descriptor layout: bound directly from the command buffer, never allocated from a pool.
    pub pushable: bool,
    pub bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayoutCreateInfo {
    pub fn new(bindings: Vec<DescriptorBinding>) -> Self {
        Self { pushable: false, bindings }
    }

    /// Rejects zero-sized and aliasing binding ranges.
    pub(crate) fn validate(&self) -> Result<()> {
        for (i, binding) in self.bindings.iter().enumerate() {
            if binding.array_count == 0 {
                return Err(GrfxError::InvalidCreateArgument);
            }
            let range = binding.range();
            if let Some(j) = self.bindings[..i].iter().position(|prev| {
                let other = prev.range();
                range.start < other.end && other.start < range.end
            }) {
                log::error!("descriptor binding at entry {} aliases with binding at entry {}", i, j);
                return Err(GrfxError::InvalidCreateArgument);
            }
        }
        Ok(())
    }

    pub fn counts(&self) -> DescriptorCounts {
        self.bindings
            .iter()
            .fold(DescriptorCounts::default(), |acc, b| acc.add(DescriptorCounts::of(b.descriptor_type, b.array_count)))
    }
}

#[derive(Debug)]
pub struct DescriptorSetLayout {
    create_info: DescriptorSetLayoutCreateInfo,
    counts: DescriptorCounts,
    api: Box<dyn DescriptorSetLayoutApi>,
}

impl DescriptorSetLayout {
    pub(crate) fn new(create_info: DescriptorSetLayoutCreateInfo, api: Box<dyn DescriptorSetLayoutApi>) -> Self {
        Self { counts: create_info.counts(), create_info, api }
    }

    pub fn create_info(&self) -> &DescriptorSetLayoutCreateInfo {
        &self.create_info
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.create_info.bindings
    }

    pub fn is_pushable(&self) -> bool {
        self.create_info.pushable
    }

    pub fn binding(&self, binding: u32) -> Option<&DescriptorBinding> {
        self.create_info.bindings.iter().find(|b| b.binding == binding)
    }

    /// Descriptors a set of this layout reserves from its pool.
    pub fn counts(&self) -> DescriptorCounts {
        self.counts
    }

    pub fn api(&self) -> &dyn DescriptorSetLayoutApi {
        self.api.as_ref()
    }
}

#[derive(Debug)]
pub struct DescriptorSet {
    pool: DescriptorPoolHandle,
    layout: DescriptorSetLayoutHandle,
    counts: DescriptorCounts,
    api: Box<dyn DescriptorSetApi>,
}

impl DescriptorSet {
    pub(crate) fn new(
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        counts: DescriptorCounts,
        api: Box<dyn DescriptorSetApi>,
    ) -> Self {
        Self { pool, layout, counts, api }
    }

    pub fn pool(&self) -> DescriptorPoolHandle {
        self.pool
    }

    pub fn layout(&self) -> DescriptorSetLayoutHandle {
        self.layout
    }

    pub fn counts(&self) -> DescriptorCounts {
        self.counts
    }

    pub fn api(&self) -> &dyn DescriptorSetApi {
        self.api.as_ref()
    }
}

/// Either kind of view a descriptor write can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageViewHandle {
    Sampled(SampledImageViewHandle),
    Storage(StorageImageViewHandle),
}

impl From<SampledImageViewHandle> for ImageViewHandle {
    fn from(handle: SampledImageViewHandle) -> Self {
        ImageViewHandle::Sampled(handle)
    }
}

impl From<StorageImageViewHandle> for ImageViewHandle {
    fn from(handle: StorageImageViewHandle) -> Self {
        ImageViewHandle::Storage(handle)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriteDescriptor {
    pub binding: u32,
    pub array_index: u32,
    pub descriptor_type: DescriptorType,
    pub buffer_offset: u64,
    pub buffer_range: u64,
    pub structured_element_count: u32,
    pub buffer: Option<BufferHandle>,
    pub image_view: Option<ImageViewHandle>,
    pub sampler: Option<SamplerHandle>,
}

impl Default for WriteDescriptor {
    fn default() -> Self {
        Self {
            binding: 0,
            array_index: 0,
            descriptor_type: DescriptorType::Sampler,
            buffer_offset: 0,
            buffer_range: WHOLE_SIZE,
            structured_element_count: 0,
            buffer: None,
            image_view: None,
            sampler: None,
        }
    }
}

impl WriteDescriptor {
    pub fn sampler(binding: u32, array_index: u32, sampler: SamplerHandle) -> Self {
        Self { binding, array_index, descriptor_type: DescriptorType::Sampler, sampler: Some(sampler), ..Default::default() }
    }

    pub fn sampled_image(binding: u32, array_index: u32, view: SampledImageViewHandle) -> Self {
        Self {
            binding,
            array_index,
            descriptor_type: DescriptorType::SampledImage,
            image_view: Some(view.into()),
            ..Default::default()
        }
    }

    pub fn storage_image(binding: u32, array_index: u32, view: StorageImageViewHandle) -> Self {
        Self {
            binding,
            array_index,
            descriptor_type: DescriptorType::StorageImage,
            image_view: Some(view.into()),
            ..Default::default()
        }
    }

    pub fn uniform_buffer(binding: u32, array_index: u32, buffer: BufferHandle, offset: u64, range: u64) -> Self {
        Self {
            binding,
            array_index,
            descriptor_type: DescriptorType::UniformBuffer,
            buffer_offset: offset,
            buffer_range: range,
            buffer: Some(buffer),
            ..Default::default()
        }
    }
}

/// A write with its handles looked up, as handed to a backend.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedWrite<'a> {
    pub write: &'a WriteDescriptor,
    pub buffer: Option<&'a Buffer>,
    pub image_view: Option<&'a dyn ImageViewApi>,
    pub sampler: Option<&'a Sampler>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NullPool;

    impl DescriptorPoolApi for NullPool {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn pool_accounting_never_exceeds_capacity() {
        let info = DescriptorPoolCreateInfo { sampler: 2, uniform_buffer: 3, ..Default::default() };
        let mut pool = DescriptorPool::new(info, Box::new(NullPool));
        let set = DescriptorCounts { cbv_srv_uav: 1, sampler: 1 };
        pool.allocate_descriptor_set(set).unwrap();
        pool.allocate_descriptor_set(set).unwrap();
        assert_eq!(pool.allocate_descriptor_set(set), Err(GrfxError::OutOfMemory));
        assert_eq!(pool.allocated(), DescriptorCounts { cbv_srv_uav: 2, sampler: 2 });

        pool.free_descriptor_set(set);
        pool.allocate_descriptor_set(DescriptorCounts { cbv_srv_uav: 1, sampler: 0 }).unwrap();
        assert_eq!(
            pool.allocate_descriptor_set(DescriptorCounts { cbv_srv_uav: 1, sampler: 0 }),
            Err(GrfxError::OutOfMemory)
        );
        assert_eq!(pool.allocated(), DescriptorCounts { cbv_srv_uav: 3, sampler: 1 });
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn pool_free_underflow_panics() {
        let mut pool = DescriptorPool::new(DescriptorPoolCreateInfo::default(), Box::new(NullPool));
        pool.free_descriptor_set(DescriptorCounts { cbv_srv_uav: 1, sampler: 0 });
    }

    #[test]
    fn capacity_splits_samplers_from_resources() {
        let info = DescriptorPoolCreateInfo { sampler: 1, sampled_image: 1, uniform_buffer: 1, ..Default::default() };
        assert_eq!(info.capacity(), DescriptorCounts { cbv_srv_uav: 2, sampler: 1 });
    }

    #[test]
    fn aliasing_binding_ranges_are_rejected() {
        let info = DescriptorSetLayoutCreateInfo::new(vec![
            DescriptorBinding::new(0, DescriptorType::SampledImage).with_array_count(4),
            DescriptorBinding::new(3, DescriptorType::Sampler),
        ]);
        assert_eq!(info.validate(), Err(GrfxError::InvalidCreateArgument));

        let info = DescriptorSetLayoutCreateInfo::new(vec![
            DescriptorBinding::new(0, DescriptorType::SampledImage).with_array_count(4),
            DescriptorBinding::new(4, DescriptorType::Sampler),
        ]);
        assert!(info.validate().is_ok());
        assert_eq!(info.counts(), DescriptorCounts { cbv_srv_uav: 4, sampler: 1 });
    }
}
