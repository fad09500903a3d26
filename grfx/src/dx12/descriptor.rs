//! Descriptor pools, set layouts and sets.
//!
//! A set owns two CPU-only heaps, one for CBV/SRV/UAV descriptors and one for samplers. Command
//! buffers copy a set's ranges into their shader-visible heaps when the set is bound.

use std::any::Any;
use std::sync::Arc;

use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_R32_TYPELESS, DXGI_FORMAT_UNKNOWN};

use super::descriptor_helper::DescriptorHeap;
use super::layout::{self, BindingRange, HeapKind};
use super::resource::{buffer_resource, Dx12Sampler, Dx12ShaderView, ShaderViewDesc};
use super::util;
use super::DeviceShared;
use crate::backend::{DescriptorPoolApi, DescriptorSetApi, DescriptorSetLayoutApi};
use crate::descriptor::{DescriptorPoolCreateInfo, DescriptorSetLayout, DescriptorSetLayoutCreateInfo, ResolvedWrite};
use crate::error::{GrfxError, Result};
use crate::types::DescriptorType;
use crate::WHOLE_SIZE;

#[derive(Debug)]
pub struct Dx12DescriptorPool;

impl Dx12DescriptorPool {
    pub fn new(info: &DescriptorPoolCreateInfo) -> Result<Self> {
        for (ty, count) in info.counts() {
            if count > 0 && ty.is_dx12_unsupported() {
                log::error!("descriptor pool requests {} {:?} descriptors, which D3D12 has no equivalent for", count, ty);
                return Err(GrfxError::UnknownDescriptorType);
            }
        }
        Ok(Self)
    }
}

impl DescriptorPoolApi for Dx12DescriptorPool {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct Dx12DescriptorSetLayout;

impl Dx12DescriptorSetLayout {
    pub fn new(info: &DescriptorSetLayoutCreateInfo) -> Result<Self> {
        for binding in &info.bindings {
            layout::descriptor_range_kind(binding.descriptor_type)?;
        }
        Ok(Self)
    }
}

impl DescriptorSetLayoutApi for Dx12DescriptorSetLayout {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct Dx12DescriptorSet {
    shared: Arc<DeviceShared>,
    cbv_srv_uav_heap: Option<DescriptorHeap>,
    sampler_heap: Option<DescriptorHeap>,
    ranges: Vec<BindingRange>,
}

impl Dx12DescriptorSet {
    pub(crate) fn new(shared: &Arc<DeviceShared>, layout: &DescriptorSetLayout) -> Result<Self> {
        let counts = layout.counts();
        let heap = |heap_type, count| -> Result<Option<DescriptorHeap>> {
            if count == 0 {
                return Ok(None);
            }
            DescriptorHeap::new(&shared.device, heap_type, count, false).map(Some)
        };
        let cbv_srv_uav_heap = heap(D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV, counts.cbv_srv_uav)?;
        let sampler_heap = heap(D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER, counts.sampler)?;
        Ok(Self {
            shared: Arc::clone(shared),
            cbv_srv_uav_heap,
            sampler_heap,
            ranges: layout::pack_bindings(layout.bindings()),
        })
    }

    pub fn binding_range(&self, binding: u32) -> Option<BindingRange> {
        self.ranges.iter().find(|r| r.binding == binding).copied()
    }

    pub fn heap(&self, heap: HeapKind) -> Option<&DescriptorHeap> {
        match heap {
            HeapKind::Sampler => self.sampler_heap.as_ref(),
            HeapKind::CbvSrvUav => self.cbv_srv_uav_heap.as_ref(),
        }
    }

    fn slot(&self, binding: u32, array_index: u32) -> Result<D3D12_CPU_DESCRIPTOR_HANDLE> {
        let range = self.binding_range(binding).ok_or(GrfxError::BindingNotInSet)?;
        if array_index >= range.count {
            return Err(GrfxError::OutOfRange);
        }
        let heap = self.heap(range.heap).ok_or(GrfxError::ElementNotFound)?;
        Ok(heap.cpu_handle(range.offset + array_index))
    }

    fn write_buffer(&self, write: &ResolvedWrite<'_>, dest: D3D12_CPU_DESCRIPTOR_HANDLE) -> Result<()> {
        let info = write.write;
        let buffer = write.buffer.ok_or(GrfxError::UnexpectedNullArgument)?;
        let native = buffer_resource(buffer)?;
        let range = if info.buffer_range == WHOLE_SIZE {
            native.size().saturating_sub(info.buffer_offset)
        } else {
            info.buffer_range
        };
        let device = &self.shared.device;
        match info.descriptor_type {
            DescriptorType::UniformBuffer => {
                let desc = D3D12_CONSTANT_BUFFER_VIEW_DESC {
                    BufferLocation: native.gpu_virtual_address() + info.buffer_offset,
                    SizeInBytes: layout::constant_buffer_size(range) as u32,
                };
                unsafe { device.CreateConstantBufferView(Some(&desc), dest) };
            }
            DescriptorType::RawStorageBuffer => {
                let (first, count) = layout::raw_buffer_elements(info.buffer_offset, range)?;
                let desc = D3D12_UNORDERED_ACCESS_VIEW_DESC {
                    Format: DXGI_FORMAT_R32_TYPELESS,
                    ViewDimension: D3D12_UAV_DIMENSION_BUFFER,
                    Anonymous: D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                        Buffer: D3D12_BUFFER_UAV {
                            FirstElement: first,
                            NumElements: count,
                            StructureByteStride: 0,
                            CounterOffsetInBytes: 0,
                            Flags: D3D12_BUFFER_UAV_FLAG_RAW,
                        },
                    },
                };
                unsafe { device.CreateUnorderedAccessView(native.native(), None, Some(&desc), dest) };
            }
            DescriptorType::RoStructuredBuffer => {
                let stride = structured_stride(buffer.structured_element_stride())?;
                let desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
                    Format: DXGI_FORMAT_UNKNOWN,
                    ViewDimension: D3D12_SRV_DIMENSION_BUFFER,
                    Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
                    Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                        Buffer: D3D12_BUFFER_SRV {
                            FirstElement: info.buffer_offset / u64::from(stride),
                            NumElements: info.structured_element_count,
                            StructureByteStride: stride,
                            Flags: D3D12_BUFFER_SRV_FLAG_NONE,
                        },
                    },
                };
                unsafe { device.CreateShaderResourceView(native.native(), Some(&desc), dest) };
            }
            DescriptorType::RwStructuredBuffer => {
                let stride = structured_stride(buffer.structured_element_stride())?;
                let desc = D3D12_UNORDERED_ACCESS_VIEW_DESC {
                    Format: DXGI_FORMAT_UNKNOWN,
                    ViewDimension: D3D12_UAV_DIMENSION_BUFFER,
                    Anonymous: D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                        Buffer: D3D12_BUFFER_UAV {
                            FirstElement: info.buffer_offset / u64::from(stride),
                            NumElements: info.structured_element_count,
                            StructureByteStride: stride,
                            CounterOffsetInBytes: 0,
                            Flags: D3D12_BUFFER_UAV_FLAG_NONE,
                        },
                    },
                };
                unsafe { device.CreateUnorderedAccessView(native.native(), None, Some(&desc), dest) };
            }
            other => {
                log::error!("{:?} descriptors cannot be written on D3D12", other);
                return Err(GrfxError::UnknownDescriptorType);
            }
        }
        Ok(())
    }
}

fn structured_stride(stride: u32) -> Result<u32> {
    if stride == 0 {
        log::error!("structured buffer bound without an element stride");
        return Err(GrfxError::InvalidCreateArgument);
    }
    Ok(stride)
}

impl DescriptorSetApi for Dx12DescriptorSet {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn update_descriptors(&self, _layout: &DescriptorSetLayout, writes: &[ResolvedWrite<'_>]) -> Result<()> {
        let device = &self.shared.device;
        for write in writes {
            let info = write.write;
            let dest = self.slot(info.binding, info.array_index)?;
            match info.descriptor_type {
                DescriptorType::Sampler => {
                    let sampler = write.sampler.ok_or(GrfxError::UnexpectedNullArgument)?;
                    let native = sampler.api().as_any().downcast_ref::<Dx12Sampler>().ok_or(GrfxError::UnsupportedApi)?;
                    unsafe { device.CreateSampler(native.desc(), dest) };
                }
                DescriptorType::SampledImage | DescriptorType::StorageImage => {
                    let view = write.image_view.ok_or(GrfxError::UnexpectedNullArgument)?;
                    let view = view.as_any().downcast_ref::<Dx12ShaderView>().ok_or(GrfxError::UnsupportedApi)?;
                    match view.desc() {
                        ShaderViewDesc::Srv(desc) => unsafe {
                            device.CreateShaderResourceView(view.native(), Some(desc), dest)
                        },
                        ShaderViewDesc::Uav(desc) => unsafe {
                            device.CreateUnorderedAccessView(view.native(), None, Some(desc), dest)
                        },
                    }
                }
                _ => self.write_buffer(write, dest)?,
            }
        }
        Ok(())
    }
}

pub(crate) fn native_set(set: &crate::descriptor::DescriptorSet) -> Result<&Dx12DescriptorSet> {
    set.api().as_any().downcast_ref::<Dx12DescriptorSet>().ok_or(GrfxError::UnsupportedApi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, BufferCreateInfo};
    use crate::config::DeviceCreateInfo;
    use crate::descriptor::{DescriptorBinding, WriteDescriptor};
    use crate::dx12::resource::Dx12Buffer;
    use crate::dx12::testing;
    use crate::types::{BufferUsageFlags, MemoryUsage};

    fn layout(bindings: Vec<DescriptorBinding>) -> DescriptorSetLayout {
        let info = DescriptorSetLayoutCreateInfo::new(bindings);
        let api = Dx12DescriptorSetLayout::new(&info).unwrap();
        DescriptorSetLayout::new(info, Box::new(api))
    }

    #[test]
    fn pools_reject_types_without_native_support() {
        let info = DescriptorPoolCreateInfo { uniform_buffer_dynamic: 2, ..Default::default() };
        assert_eq!(Dx12DescriptorPool::new(&info).err(), Some(GrfxError::UnknownDescriptorType));
        let info = DescriptorPoolCreateInfo { sampler: 1, uniform_buffer: 4, ..Default::default() };
        assert!(Dx12DescriptorPool::new(&info).is_ok());
    }

    #[test]
    fn layouts_reject_combined_image_samplers() {
        let info = DescriptorSetLayoutCreateInfo::new(vec![DescriptorBinding::new(0, DescriptorType::CombinedImageSampler)]);
        assert_eq!(Dx12DescriptorSetLayout::new(&info).err(), Some(GrfxError::UnknownDescriptorType));
    }

    #[test]
    fn sets_size_their_heaps_per_kind() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let layout = layout(vec![
            DescriptorBinding::new(0, DescriptorType::UniformBuffer),
            DescriptorBinding::new(1, DescriptorType::Sampler).with_array_count(2),
            DescriptorBinding::new(2, DescriptorType::SampledImage).with_array_count(3),
        ]);
        let set = Dx12DescriptorSet::new(&shared, &layout).unwrap();
        assert_eq!(set.heap(HeapKind::CbvSrvUav).unwrap().len(), 4);
        assert_eq!(set.heap(HeapKind::Sampler).unwrap().len(), 2);
        assert_eq!(set.binding_range(2).unwrap().offset, 1);
        assert_eq!(set.slot(1, 2), Err(GrfxError::OutOfRange));
    }

    #[test]
    fn raw_buffers_need_dword_ranges() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let layout = layout(vec![DescriptorBinding::new(0, DescriptorType::RawStorageBuffer)]);
        let set = Dx12DescriptorSet::new(&shared, &layout).unwrap();
        let info = BufferCreateInfo::new(64, BufferUsageFlags::RAW_STORAGE_BUFFER, MemoryUsage::GpuOnly);
        let buffer = Buffer::new(info.clone(), Box::new(Dx12Buffer::new(&shared, &info).unwrap()));
        let mut write = WriteDescriptor { descriptor_type: DescriptorType::RawStorageBuffer, buffer_range: 6, ..Default::default() };
        let bad = ResolvedWrite { write: &write, buffer: Some(&buffer), image_view: None, sampler: None };
        assert_eq!(set.update_descriptors(&layout, &[bad]), Err(GrfxError::InvalidCreateArgument));

        write.buffer_range = WHOLE_SIZE;
        let whole = ResolvedWrite { write: &write, buffer: Some(&buffer), image_view: None, sampler: None };
        assert_eq!(set.update_descriptors(&layout, &[whole]), Ok(()));
    }

    #[test]
    fn structured_buffers_need_a_stride() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let layout = layout(vec![DescriptorBinding::new(0, DescriptorType::RoStructuredBuffer)]);
        let set = Dx12DescriptorSet::new(&shared, &layout).unwrap();
        let info = BufferCreateInfo::new(64, BufferUsageFlags::RO_STRUCTURED_BUFFER, MemoryUsage::GpuOnly);
        let buffer = Buffer::new(info.clone(), Box::new(Dx12Buffer::new(&shared, &info).unwrap()));
        let write = WriteDescriptor {
            descriptor_type: DescriptorType::RoStructuredBuffer,
            structured_element_count: 4,
            ..Default::default()
        };
        let resolved = ResolvedWrite { write: &write, buffer: Some(&buffer), image_view: None, sampler: None };
        assert_eq!(set.update_descriptors(&layout, &[resolved]), Err(GrfxError::InvalidCreateArgument));
    }
}
