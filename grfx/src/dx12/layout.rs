//! Root signature, descriptor heap and subresource layouts.
//!
//! Everything here is plain data computed from grfx objects. The native modules only translate
//! it into D3D12 structures, so this module builds on every platform.

use crate::command::SubresourceRange;
use crate::descriptor::{DescriptorBinding, DescriptorSetLayoutCreateInfo};
use crate::error::{GrfxError, Result};
use crate::format::{Format, FormatAspect};
use crate::pipeline::PipelineInterfaceCreateInfo;
use crate::swapchain::SurfaceCapabilities;
use crate::types::{CommandType, DescriptorType, ImageType, MemoryUsage, PresentMode, ResourceState, ShaderStageFlags};
use crate::{CONSTANT_BUFFER_ALIGNMENT, D3D12_TEXTURE_DATA_PITCH_ALIGNMENT, VALUE_IGNORED};

pub const GRAPHICS_QUEUE_COUNT: u32 = 1;
pub const COMPUTE_QUEUE_COUNT: u32 = 2;
pub const COPY_QUEUE_COUNT: u32 = 2;

/// `D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES`.
pub const ALL_SUBRESOURCES: u32 = 0xFFFF_FFFF;

bitflags::bitflags! {
    /// `D3D12_RESOURCE_STATES` bit values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceStates: i32 {
        const COMMON = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const STREAM_OUT = 0x100;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const RESOLVE_DEST = 0x1000;
        const RESOLVE_SOURCE = 0x2000;
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits();
        const PRESENT = 0;
        const PREDICATION = 0x200;
    }
}

/// Shader-resource states depend on which stages can read on the queue that records the barrier.
pub fn resource_states(state: ResourceState, command_type: CommandType) -> ResourceStates {
    match state {
        ResourceState::Undefined | ResourceState::General => ResourceStates::COMMON,
        ResourceState::ConstantBuffer | ResourceState::VertexBuffer => ResourceStates::VERTEX_AND_CONSTANT_BUFFER,
        ResourceState::IndexBuffer => ResourceStates::INDEX_BUFFER,
        ResourceState::RenderTarget => ResourceStates::RENDER_TARGET,
        ResourceState::UnorderedAccess => ResourceStates::UNORDERED_ACCESS,
        ResourceState::DepthStencilRead => ResourceStates::DEPTH_READ,
        ResourceState::DepthStencilWrite
        | ResourceState::DepthWriteStencilRead
        | ResourceState::DepthReadStencilWrite => ResourceStates::DEPTH_WRITE,
        ResourceState::NonPixelShaderResource => ResourceStates::NON_PIXEL_SHADER_RESOURCE,
        ResourceState::PixelShaderResource => ResourceStates::PIXEL_SHADER_RESOURCE,
        ResourceState::ShaderResource => match command_type {
            CommandType::Graphics => {
                ResourceStates::NON_PIXEL_SHADER_RESOURCE | ResourceStates::PIXEL_SHADER_RESOURCE
            }
            _ => ResourceStates::NON_PIXEL_SHADER_RESOURCE,
        },
        ResourceState::StreamOut => ResourceStates::STREAM_OUT,
        ResourceState::IndirectArgument => ResourceStates::INDIRECT_ARGUMENT,
        ResourceState::CopySrc => ResourceStates::COPY_SOURCE,
        ResourceState::CopyDst => ResourceStates::COPY_DEST,
        ResourceState::ResolveSrc => ResourceStates::RESOLVE_SOURCE,
        ResourceState::ResolveDst => ResourceStates::RESOLVE_DEST,
        ResourceState::Present => ResourceStates::PRESENT,
        ResourceState::Predication => ResourceStates::PREDICATION,
    }
}

/// Upload heaps must stay GENERIC_READ and readback heaps COPY_DEST for their whole life.
pub fn buffer_initial_state(usage: MemoryUsage, requested: ResourceState) -> ResourceStates {
    match usage {
        MemoryUsage::CpuOnly | MemoryUsage::CpuToGpu => ResourceStates::GENERIC_READ,
        MemoryUsage::GpuToCpu => ResourceStates::COPY_DEST,
        MemoryUsage::GpuOnly => resource_states(requested, CommandType::Graphics),
    }
}

/// `D3D12CalcSubresource`.
pub fn calc_subresource(mip: u32, layer: u32, plane: u32, mip_levels: u32, array_size: u32) -> u32 {
    mip + layer * mip_levels + plane * mip_levels * array_size
}

/// Depth-stencil formats keep depth and stencil in separate planes.
pub fn plane_count(format: Format) -> u32 {
    match format.aspect() {
        FormatAspect::DepthStencil => 2,
        _ => 1,
    }
}

/// Subresource indices a partial-range transition touches: planes outermost, then layers, then mips.
///
/// Partial-range depth-stencil barriers emit planes*M*N entries per the flat-index formula.
pub fn subresource_indices(range: &SubresourceRange, planes: u32, mip_levels: u32, array_size: u32) -> Vec<u32> {
    let mut indices = Vec::with_capacity((planes * range.array_layer_count * range.mip_level_count) as usize);
    for plane in 0..planes {
        for layer in range.array_layer..range.array_layer + range.array_layer_count {
            for mip in range.mip_level..range.mip_level + range.mip_level_count {
                indices.push(calc_subresource(mip, layer, plane, mip_levels, array_size));
            }
        }
    }
    indices
}

/// Texture copy rows must start on 256-byte boundaries.
pub fn aligned_row_pitch(row_bytes: u32) -> u32 {
    row_bytes.div_ceil(D3D12_TEXTURE_DATA_PITCH_ALIGNMENT) * D3D12_TEXTURE_DATA_PITCH_ALIGNMENT
}

pub fn constant_buffer_size(size: u64) -> u64 {
    size.div_ceil(CONSTANT_BUFFER_ALIGNMENT) * CONSTANT_BUFFER_ALIGNMENT
}

/// First element and element count of a raw (R32_TYPELESS) buffer view.
pub fn raw_buffer_elements(offset: u64, range: u64) -> Result<(u64, u32)> {
    if offset % 4 != 0 || range % 4 != 0 {
        log::error!("raw buffer offset {} and range {} must be multiples of 4", offset, range);
        return Err(GrfxError::InvalidCreateArgument);
    }
    Ok((offset / 4, (range / 4) as u32))
}

/// `D3D12_BOX` bounds of a copy region. Unused dimensions span exactly one texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyBox {
    pub left: u32,
    pub top: u32,
    pub front: u32,
    pub right: u32,
    pub bottom: u32,
    pub back: u32,
}

pub fn copy_box(image_type: ImageType, offset: [u32; 3], extent: [u32; 3]) -> CopyBox {
    let mut copy_box = CopyBox { left: offset[0], top: 0, front: 0, right: offset[0] + extent[0], bottom: 1, back: 1 };
    if image_type != ImageType::D1 {
        copy_box.top = offset[1];
        copy_box.bottom = offset[1] + extent[1];
    }
    if image_type == ImageType::D3 {
        copy_box.front = offset[2];
        copy_box.back = offset[2] + extent[2];
    }
    copy_box
}

/// Sync interval and whether DXGI_PRESENT_ALLOW_TEARING is passed.
pub fn present_params(mode: PresentMode, supports_tearing: bool) -> Result<(u32, bool)> {
    match mode {
        PresentMode::Fifo => Ok((1, false)),
        PresentMode::Mailbox => Ok((0, false)),
        PresentMode::Immediate if supports_tearing => Ok((0, true)),
        PresentMode::Immediate => {
            log::error!("immediate present mode requires variable refresh rate support");
            Err(GrfxError::UnsupportedPresentMode)
        }
        other => {
            log::error!("{:?} has no DXGI equivalent", other);
            Err(GrfxError::UnsupportedPresentMode)
        }
    }
}

/// Flip-model swap chains only take these back buffer formats.
pub fn is_swapchain_format(format: Format) -> bool {
    matches!(format, Format::B8G8R8A8Unorm | Format::R8G8B8A8Unorm | Format::R16G16B16A16Float)
}

/// `DXGI_MAX_SWAP_CHAIN_BUFFERS`.
pub const MAX_SWAPCHAIN_IMAGES: u32 = 16;

/// What a flip-model swap chain on a window of this client size can do.
pub fn surface_capabilities(width: u32, height: u32, supports_tearing: bool) -> SurfaceCapabilities {
    let mut present_modes = vec![PresentMode::Fifo, PresentMode::Mailbox];
    if supports_tearing {
        present_modes.push(PresentMode::Immediate);
    }
    SurfaceCapabilities {
        width,
        height,
        min_image_count: 2,
        max_image_count: MAX_SWAPCHAIN_IMAGES,
        supports_tearing,
        formats: vec![Format::B8G8R8A8Unorm, Format::R8G8B8A8Unorm, Format::R16G16B16A16Float],
        present_modes,
    }
}

/// Milliseconds for `WaitForSingleObject`, rounded up. `u64::MAX` waits forever.
pub fn timeout_ms(timeout_ns: u64) -> u32 {
    const INFINITE: u32 = u32::MAX;
    if timeout_ns == u64::MAX {
        return INFINITE;
    }
    timeout_ns.div_ceil(1_000_000).min(u64::from(INFINITE - 1)) as u32
}

const FILTER_REDUCTION_COMPARISON: u32 = 1;
const ANISOTROPIC_FILTERING_BIT: u32 = 0x40;

/// `D3D12_ENCODE_BASIC_FILTER`; each flag selects linear over point filtering.
pub fn encode_basic_filter(min_linear: bool, mag_linear: bool, mip_linear: bool, comparison: bool) -> i32 {
    let reduction = if comparison { FILTER_REDUCTION_COMPARISON } else { 0 };
    ((u32::from(min_linear) << 4) | (u32::from(mag_linear) << 2) | u32::from(mip_linear) | (reduction << 7)) as i32
}

pub fn encode_anisotropic_filter(comparison: bool) -> i32 {
    encode_basic_filter(true, true, true, comparison) | ANISOTROPIC_FILTERING_BIT as i32
}

/// Descriptor range type of a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    Srv,
    Uav,
    Cbv,
    Sampler,
}

pub fn descriptor_range_kind(ty: DescriptorType) -> Result<RangeKind> {
    match ty {
        DescriptorType::Sampler => Ok(RangeKind::Sampler),
        DescriptorType::SampledImage | DescriptorType::UniformTexelBuffer | DescriptorType::RoStructuredBuffer => {
            Ok(RangeKind::Srv)
        }
        DescriptorType::StorageImage
        | DescriptorType::StorageTexelBuffer
        | DescriptorType::RawStorageBuffer
        | DescriptorType::RwStructuredBuffer => Ok(RangeKind::Uav),
        DescriptorType::UniformBuffer => Ok(RangeKind::Cbv),
        other => {
            log::error!("descriptor type {:?} has no D3D12 range type", other);
            Err(GrfxError::UnknownDescriptorType)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
}

/// Single graphics stages get their own visibility; compute and mixed masks see everything.
pub fn shader_visibility(stages: ShaderStageFlags) -> Visibility {
    match stages {
        s if s == ShaderStageFlags::VS => Visibility::Vertex,
        s if s == ShaderStageFlags::HS => Visibility::Hull,
        s if s == ShaderStageFlags::DS => Visibility::Domain,
        s if s == ShaderStageFlags::GS => Visibility::Geometry,
        s if s == ShaderStageFlags::PS => Visibility::Pixel,
        _ => Visibility::All,
    }
}

/// How a layout binding reaches the root signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSlotKind {
    Table,
    Cbv,
    Srv,
    Uav,
}

/// Root descriptor kind for bindings of pushable layouts. Images and samplers stay in tables.
pub fn root_descriptor_kind(ty: DescriptorType) -> Option<RootSlotKind> {
    match ty {
        DescriptorType::UniformBuffer => Some(RootSlotKind::Cbv),
        DescriptorType::RoStructuredBuffer | DescriptorType::UniformTexelBuffer => Some(RootSlotKind::Srv),
        DescriptorType::RawStorageBuffer | DescriptorType::RwStructuredBuffer | DescriptorType::StorageTexelBuffer => {
            Some(RootSlotKind::Uav)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootParameterKind {
    /// One range. SRV ranges are DATA_VOLATILE.
    Table { range: RangeKind, count: u32, volatile: bool },
    /// Root CBV, SRV or UAV.
    Descriptor(RootSlotKind),
    Constants { count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootParameter {
    pub kind: RootParameterKind,
    pub register: u32,
    pub space: u32,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RootSlot {
    binding: u32,
    set: u32,
    parameter_index: u32,
    kind: RootSlotKind,
}

/// Root parameters of a pipeline interface: one per binding, register space = set number,
/// root constants last.
#[derive(Debug, Clone, Default)]
pub struct RootSignatureLayout {
    parameters: Vec<RootParameter>,
    slots: Vec<RootSlot>,
    root_constants_parameter_index: u32,
}

impl RootSignatureLayout {
    /// `layouts` parallels `info.sets`.
    pub fn new(info: &PipelineInterfaceCreateInfo, layouts: &[&DescriptorSetLayoutCreateInfo]) -> Result<Self> {
        let mut parameters = Vec::new();
        let mut slots = Vec::new();
        for (set_info, layout) in info.sets.iter().zip(layouts) {
            for binding in &layout.bindings {
                let root_kind = if layout.pushable { root_descriptor_kind(binding.descriptor_type) } else { None };
                let (kind, slot_kind) = match root_kind {
                    Some(kind) => (RootParameterKind::Descriptor(kind), kind),
                    None => {
                        let range = descriptor_range_kind(binding.descriptor_type)?;
                        let table =
                            RootParameterKind::Table { range, count: binding.array_count, volatile: range == RangeKind::Srv };
                        (table, RootSlotKind::Table)
                    }
                };
                slots.push(RootSlot {
                    binding: binding.binding,
                    set: set_info.set,
                    parameter_index: parameters.len() as u32,
                    kind: slot_kind,
                });
                parameters.push(RootParameter {
                    kind,
                    register: binding.binding,
                    space: set_info.set,
                    visibility: shader_visibility(binding.shader_visibility),
                });
            }
        }

        let push = &info.push_constants;
        let mut root_constants_parameter_index = VALUE_IGNORED;
        if push.count > 0 {
            root_constants_parameter_index = parameters.len() as u32;
            parameters.push(RootParameter {
                kind: RootParameterKind::Constants { count: push.count },
                register: push.binding,
                space: push.set,
                visibility: shader_visibility(push.shader_visibility),
            });
        }
        Ok(Self { parameters, slots, root_constants_parameter_index })
    }

    pub fn parameters(&self) -> &[RootParameter] {
        &self.parameters
    }

    /// Root parameter index of `binding` in register space `set`, or `VALUE_IGNORED`.
    pub fn find_parameter_index(&self, binding: u32, set: u32) -> u32 {
        self.slots
            .iter()
            .find(|s| s.binding == binding && s.set == set)
            .map_or(VALUE_IGNORED, |s| s.parameter_index)
    }

    pub fn slot_kind(&self, binding: u32, set: u32) -> Option<RootSlotKind> {
        self.slots.iter().find(|s| s.binding == binding && s.set == set).map(|s| s.kind)
    }

    pub fn root_constants_parameter_index(&self) -> u32 {
        self.root_constants_parameter_index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    CbvSrvUav,
    Sampler,
}

/// Where one binding's descriptors start in a set's heaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingRange {
    pub binding: u32,
    pub heap: HeapKind,
    pub offset: u32,
    pub count: u32,
}

/// Packs bindings in declaration order, samplers and everything else into separate heaps.
pub fn pack_bindings(bindings: &[DescriptorBinding]) -> Vec<BindingRange> {
    let (mut resource_offset, mut sampler_offset) = (0, 0);
    bindings
        .iter()
        .map(|b| {
            let (heap, cursor) = match b.descriptor_type {
                DescriptorType::Sampler => (HeapKind::Sampler, &mut sampler_offset),
                _ => (HeapKind::CbvSrvUav, &mut resource_offset),
            };
            let range = BindingRange { binding: b.binding, heap, offset: *cursor, count: b.array_count };
            *cursor += b.array_count;
            range
        })
        .collect()
}

/// Linear free list over the slots of one fixed-size heap.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    used: Vec<bool>,
}

impl SlotAllocator {
    pub fn new(count: u32) -> Self {
        Self { used: vec![false; count as usize] }
    }

    pub fn len(&self) -> u32 {
        self.used.len() as u32
    }

    pub fn has_available(&self) -> bool {
        self.used.iter().any(|used| !used)
    }

    pub fn allocate(&mut self) -> Option<u32> {
        let slot = self.used.iter().position(|used| !used)?;
        self.used[slot] = true;
        Some(slot as u32)
    }

    pub fn free(&mut self, slot: u32) {
        if let Some(used) = self.used.get_mut(slot as usize) {
            *used = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PushConstantsInfo, SetLayoutInfo};
    use crate::DescriptorSetLayoutHandle;

    fn sets(numbers: &[u32]) -> Vec<SetLayoutInfo> {
        numbers.iter().map(|&set| SetLayoutInfo { set, layout: DescriptorSetLayoutHandle::default() }).collect()
    }

    fn range(mip_level: u32, mip_level_count: u32, array_layer: u32, array_layer_count: u32) -> SubresourceRange {
        SubresourceRange { mip_level, mip_level_count, array_layer, array_layer_count }
    }

    #[test]
    fn shader_resource_state_follows_queue_type() {
        let graphics = resource_states(ResourceState::ShaderResource, CommandType::Graphics);
        assert_eq!(graphics, ResourceStates::NON_PIXEL_SHADER_RESOURCE | ResourceStates::PIXEL_SHADER_RESOURCE);
        let compute = resource_states(ResourceState::ShaderResource, CommandType::Compute);
        assert_eq!(compute, ResourceStates::NON_PIXEL_SHADER_RESOURCE);
    }

    #[test]
    fn state_table() {
        let cases = [
            (ResourceState::Undefined, ResourceStates::COMMON),
            (ResourceState::General, ResourceStates::COMMON),
            (ResourceState::ConstantBuffer, ResourceStates::VERTEX_AND_CONSTANT_BUFFER),
            (ResourceState::VertexBuffer, ResourceStates::VERTEX_AND_CONSTANT_BUFFER),
            (ResourceState::IndexBuffer, ResourceStates::INDEX_BUFFER),
            (ResourceState::DepthStencilRead, ResourceStates::DEPTH_READ),
            (ResourceState::DepthWriteStencilRead, ResourceStates::DEPTH_WRITE),
            (ResourceState::DepthReadStencilWrite, ResourceStates::DEPTH_WRITE),
            (ResourceState::CopySrc, ResourceStates::COPY_SOURCE),
            (ResourceState::CopyDst, ResourceStates::COPY_DEST),
            (ResourceState::Present, ResourceStates::PRESENT),
        ];
        for (state, expected) in cases {
            assert_eq!(resource_states(state, CommandType::Graphics), expected, "{:?}", state);
        }
        assert_eq!(ResourceStates::GENERIC_READ.bits(), 0xAC3);
    }

    #[test]
    fn host_heaps_pin_buffer_states() {
        assert_eq!(buffer_initial_state(MemoryUsage::CpuToGpu, ResourceState::CopyDst), ResourceStates::GENERIC_READ);
        assert_eq!(buffer_initial_state(MemoryUsage::GpuToCpu, ResourceState::General), ResourceStates::COPY_DEST);
        assert_eq!(buffer_initial_state(MemoryUsage::GpuOnly, ResourceState::CopyDst), ResourceStates::COPY_DEST);
    }

    #[test]
    fn partial_ranges_enumerate_subresources() {
        let indices = subresource_indices(&range(1, 2, 0, 3), 1, 4, 3);
        assert_eq!(indices, vec![1, 2, 5, 6, 9, 10]);
    }

    #[test]
    fn partial_depth_stencil_ranges_cover_every_plane() {
        let planes = plane_count(Format::D24UnormS8Uint);
        assert_eq!(planes, 2);
        let indices = subresource_indices(&range(1, 1, 0, 2), planes, 3, 2);
        assert_eq!(indices.len(), 2 * 1 * 2);
        assert_eq!(indices, vec![1, 4, 7, 10]);

        let single_mip = subresource_indices(&range(1, 1, 0, 1), planes, 2, 1);
        assert_eq!(single_mip, vec![1, 3]);
        assert_eq!(plane_count(Format::D32Float), 1);
    }

    #[test]
    fn readback_rows_are_pitch_aligned() {
        assert_eq!(aligned_row_pitch(10 * 4), 256);
        assert_eq!(aligned_row_pitch(256), 256);
        assert_eq!(aligned_row_pitch(257), 512);
        assert_eq!(constant_buffer_size(100), 256);
        assert_eq!(constant_buffer_size(300), 512);
    }

    #[test]
    fn raw_views_need_dword_ranges() {
        assert_eq!(raw_buffer_elements(0, 6), Err(GrfxError::InvalidCreateArgument));
        assert_eq!(raw_buffer_elements(2, 8), Err(GrfxError::InvalidCreateArgument));
        assert_eq!(raw_buffer_elements(8, 64), Ok((2, 16)));
    }

    #[test]
    fn copy_boxes_collapse_unused_dimensions() {
        let flat = copy_box(ImageType::D1, [4, 9, 9], [8, 9, 9]);
        assert_eq!((flat.left, flat.right, flat.top, flat.bottom, flat.front, flat.back), (4, 12, 0, 1, 0, 1));
        let plane = copy_box(ImageType::D2, [1, 2, 3], [4, 5, 6]);
        assert_eq!((plane.top, plane.bottom, plane.front, plane.back), (2, 7, 0, 1));
        let volume = copy_box(ImageType::D3, [1, 2, 3], [4, 5, 6]);
        assert_eq!((volume.front, volume.back), (3, 9));
    }

    #[test]
    fn present_modes_map_to_sync_intervals() {
        assert_eq!(present_params(PresentMode::Fifo, false), Ok((1, false)));
        assert_eq!(present_params(PresentMode::Mailbox, false), Ok((0, false)));
        assert_eq!(present_params(PresentMode::Immediate, true), Ok((0, true)));
        assert_eq!(present_params(PresentMode::Immediate, false), Err(GrfxError::UnsupportedPresentMode));
        assert_eq!(present_params(PresentMode::FifoRelaxed, true), Err(GrfxError::UnsupportedPresentMode));
        assert!(is_swapchain_format(Format::R16G16B16A16Float));
        assert!(!is_swapchain_format(Format::R32Float));
    }

    #[test]
    fn surfaces_offer_immediate_only_with_tearing() {
        let caps = surface_capabilities(800, 600, false);
        assert_eq!((caps.width, caps.height, caps.min_image_count), (800, 600, 2));
        assert!(!caps.present_modes.contains(&PresentMode::Immediate));
        assert!(caps.formats.iter().all(|f| is_swapchain_format(*f)));
        let caps = surface_capabilities(800, 600, true);
        assert!(caps.present_modes.iter().all(|m| present_params(*m, true).is_ok()));
    }

    #[test]
    fn timeouts_round_up_to_milliseconds() {
        assert_eq!(timeout_ms(0), 0);
        assert_eq!(timeout_ms(1), 1);
        assert_eq!(timeout_ms(2_000_000), 2);
        assert_eq!(timeout_ms(u64::MAX), u32::MAX);
        assert_eq!(timeout_ms(u64::MAX - 1), u32::MAX - 1);
    }

    #[test]
    fn filter_encoding_matches_d3d12_values() {
        assert_eq!(encode_basic_filter(false, false, false, false), 0x0);
        assert_eq!(encode_basic_filter(true, true, true, false), 0x15);
        assert_eq!(encode_basic_filter(true, false, true, true), 0x91);
        assert_eq!(encode_anisotropic_filter(false), 0x55);
        assert_eq!(encode_anisotropic_filter(true), 0xD5);
    }

    #[test]
    fn range_kinds() {
        assert_eq!(descriptor_range_kind(DescriptorType::RoStructuredBuffer), Ok(RangeKind::Srv));
        assert_eq!(descriptor_range_kind(DescriptorType::RawStorageBuffer), Ok(RangeKind::Uav));
        assert_eq!(descriptor_range_kind(DescriptorType::UniformBuffer), Ok(RangeKind::Cbv));
        assert_eq!(descriptor_range_kind(DescriptorType::InputAttachment), Err(GrfxError::UnknownDescriptorType));
    }

    #[test]
    fn visibility() {
        assert_eq!(shader_visibility(ShaderStageFlags::PS), Visibility::Pixel);
        assert_eq!(shader_visibility(ShaderStageFlags::CS), Visibility::All);
        assert_eq!(shader_visibility(ShaderStageFlags::VS | ShaderStageFlags::PS), Visibility::All);
    }

    #[test]
    fn parameter_indices_are_unique_per_binding_and_space() {
        let set0 = DescriptorSetLayoutCreateInfo::new(vec![DescriptorBinding::new(2, DescriptorType::UniformBuffer)]);
        let set1 = DescriptorSetLayoutCreateInfo::new(vec![DescriptorBinding::new(0, DescriptorType::SampledImage)]);
        let info = PipelineInterfaceCreateInfo { sets: sets(&[0, 1]), ..Default::default() };
        let layout = RootSignatureLayout::new(&info, &[&set0, &set1]).unwrap();
        let a = layout.find_parameter_index(2, 0);
        let b = layout.find_parameter_index(0, 1);
        assert_ne!(a, VALUE_IGNORED);
        assert_ne!(b, VALUE_IGNORED);
        assert_ne!(a, b);
        assert_eq!(layout.parameters()[b as usize].space, 1);
        assert_eq!(layout.find_parameter_index(0, 2), VALUE_IGNORED);
        assert_eq!(layout.root_constants_parameter_index(), VALUE_IGNORED);
    }

    #[test]
    fn root_constants_come_last_and_srv_ranges_are_volatile() {
        let set0 = DescriptorSetLayoutCreateInfo::new(vec![
            DescriptorBinding::new(0, DescriptorType::SampledImage).with_visibility(ShaderStageFlags::PS),
            DescriptorBinding::new(1, DescriptorType::Sampler),
        ]);
        let info = PipelineInterfaceCreateInfo {
            sets: sets(&[0]),
            push_constants: PushConstantsInfo { count: 4, binding: 8, set: 0, shader_visibility: ShaderStageFlags::ALL },
        };
        let layout = RootSignatureLayout::new(&info, &[&set0]).unwrap();
        let parameters = layout.parameters();
        assert_eq!(layout.root_constants_parameter_index(), 2);
        assert_eq!(parameters[2].kind, RootParameterKind::Constants { count: 4 });
        assert_eq!(parameters[2].register, 8);
        assert_eq!(parameters[0].kind, RootParameterKind::Table { range: RangeKind::Srv, count: 1, volatile: true });
        assert_eq!(parameters[0].visibility, Visibility::Pixel);
        assert_eq!(parameters[1].kind, RootParameterKind::Table { range: RangeKind::Sampler, count: 1, volatile: false });
    }

    #[test]
    fn pushable_buffers_become_root_descriptors() {
        let set0 = DescriptorSetLayoutCreateInfo {
            pushable: true,
            bindings: vec![
                DescriptorBinding::new(0, DescriptorType::UniformBuffer),
                DescriptorBinding::new(1, DescriptorType::RwStructuredBuffer),
                DescriptorBinding::new(2, DescriptorType::SampledImage),
            ],
        };
        let info = PipelineInterfaceCreateInfo { sets: sets(&[3]), ..Default::default() };
        let layout = RootSignatureLayout::new(&info, &[&set0]).unwrap();
        assert_eq!(layout.slot_kind(0, 3), Some(RootSlotKind::Cbv));
        assert_eq!(layout.slot_kind(1, 3), Some(RootSlotKind::Uav));
        assert_eq!(layout.slot_kind(2, 3), Some(RootSlotKind::Table));
        assert_eq!(layout.parameters()[1].kind, RootParameterKind::Descriptor(RootSlotKind::Uav));
    }

    #[test]
    fn bindings_are_packed_per_heap() {
        let ranges = pack_bindings(&[
            DescriptorBinding::new(0, DescriptorType::UniformBuffer),
            DescriptorBinding::new(1, DescriptorType::Sampler).with_array_count(2),
            DescriptorBinding::new(2, DescriptorType::SampledImage).with_array_count(3),
        ]);
        assert_eq!(ranges[0], BindingRange { binding: 0, heap: HeapKind::CbvSrvUav, offset: 0, count: 1 });
        assert_eq!(ranges[1], BindingRange { binding: 1, heap: HeapKind::Sampler, offset: 0, count: 2 });
        assert_eq!(ranges[2], BindingRange { binding: 2, heap: HeapKind::CbvSrvUav, offset: 1, count: 3 });
    }

    #[test]
    fn full_slot_lists_fail_until_freed() {
        let mut slots = SlotAllocator::new(2);
        assert_eq!(slots.allocate(), Some(0));
        assert_eq!(slots.allocate(), Some(1));
        assert!(!slots.has_available());
        assert_eq!(slots.allocate(), None);
        slots.free(0);
        slots.free(7);
        assert_eq!(slots.allocate(), Some(0));
        assert_eq!(slots.len(), 2);
    }
}
