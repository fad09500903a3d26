//! Translation from grfx enums and layouts to their D3D12 counterparts.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use windows::Win32::Foundation::E_OUTOFMEMORY;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use super::layout::{self, HeapKind, RangeKind, Visibility};
use crate::error::{GrfxError, Result};
use crate::format::Format;
use crate::image::SamplerCreateInfo;
use crate::types::{
    BlendFactor, BlendOp, BorderColor, ColorComponentFlags, CommandType, CompareOp, CullMode, Filter, ImageType,
    IndexType, LogicOp, PolygonMode, PrimitiveTopology, QueryType, ResourceState, SamplerAddressMode,
    SamplerMipmapMode, StencilOp, VertexInputRate,
};

/// COM interface or allocator state shared between threads. D3D12 and DXGI objects are
/// free-threaded; allocator state is only reached through a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sendable<T>(pub T);

unsafe impl<T> Send for Sendable<T> {}
unsafe impl<T> Sync for Sendable<T> {}

impl<T> Deref for Sendable<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Sendable<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// Logs the failing call and maps its HRESULT.
pub fn hresult_error(error: windows::core::Error, call: &str) -> GrfxError {
    log::error!("{} failed: {}", call, error);
    if error.code() == E_OUTOFMEMORY {
        GrfxError::OutOfMemory
    } else {
        GrfxError::ApiFailure
    }
}

/// Borrows `resource` into a struct field that D3D12 only reads during the call.
///
/// # Safety
/// The returned value must not be dropped; it does not own a reference.
pub unsafe fn borrowed_resource(resource: &ID3D12Resource) -> ManuallyDrop<Option<ID3D12Resource>> {
    std::mem::transmute_copy(resource)
}

pub fn resource_states(state: ResourceState, command_type: CommandType) -> D3D12_RESOURCE_STATES {
    D3D12_RESOURCE_STATES(layout::resource_states(state, command_type).bits())
}

pub fn format_to_dxgi(format: Format) -> DXGI_FORMAT {
    match format {
        Format::Undefined => DXGI_FORMAT_UNKNOWN,
        Format::R8Unorm => DXGI_FORMAT_R8_UNORM,
        Format::R8G8Unorm => DXGI_FORMAT_R8G8_UNORM,
        Format::R8G8B8A8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        Format::R8G8B8A8Srgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        Format::B8G8R8A8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
        Format::B8G8R8A8Srgb => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
        Format::R16Uint => DXGI_FORMAT_R16_UINT,
        Format::R16Float => DXGI_FORMAT_R16_FLOAT,
        Format::R16G16Float => DXGI_FORMAT_R16G16_FLOAT,
        Format::R16G16B16A16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        Format::R32Uint => DXGI_FORMAT_R32_UINT,
        Format::R32Float => DXGI_FORMAT_R32_FLOAT,
        Format::R32G32Float => DXGI_FORMAT_R32G32_FLOAT,
        Format::R32G32B32Float => DXGI_FORMAT_R32G32B32_FLOAT,
        Format::R32G32B32A32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,
        Format::R10G10B10A2Unorm => DXGI_FORMAT_R10G10B10A2_UNORM,
        Format::R11G11B10Float => DXGI_FORMAT_R11G11B10_FLOAT,
        Format::D16Unorm => DXGI_FORMAT_D16_UNORM,
        Format::D32Float => DXGI_FORMAT_D32_FLOAT,
        Format::D24UnormS8Uint => DXGI_FORMAT_D24_UNORM_S8_UINT,
        Format::D32FloatS8Uint => DXGI_FORMAT_D32_FLOAT_S8X24_UINT,
        Format::Bc1RgbaUnorm => DXGI_FORMAT_BC1_UNORM,
        Format::Bc3Unorm => DXGI_FORMAT_BC3_UNORM,
        Format::Bc7Unorm => DXGI_FORMAT_BC7_UNORM,
        // No DXGI equivalent.
        Format::S8Uint | Format::D16UnormS8Uint => DXGI_FORMAT_UNKNOWN,
    }
}

pub fn blend_to_d3d12(factor: BlendFactor) -> D3D12_BLEND {
    match factor {
        BlendFactor::Zero => D3D12_BLEND_ZERO,
        BlendFactor::One => D3D12_BLEND_ONE,
        BlendFactor::SrcColor => D3D12_BLEND_SRC_COLOR,
        BlendFactor::OneMinusSrcColor => D3D12_BLEND_INV_SRC_COLOR,
        BlendFactor::DstColor => D3D12_BLEND_DEST_COLOR,
        BlendFactor::OneMinusDstColor => D3D12_BLEND_INV_DEST_COLOR,
        BlendFactor::SrcAlpha => D3D12_BLEND_SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => D3D12_BLEND_INV_SRC_ALPHA,
        BlendFactor::DstAlpha => D3D12_BLEND_DEST_ALPHA,
        BlendFactor::OneMinusDstAlpha => D3D12_BLEND_INV_DEST_ALPHA,
        BlendFactor::ConstantColor | BlendFactor::ConstantAlpha => D3D12_BLEND_BLEND_FACTOR,
        BlendFactor::OneMinusConstantColor | BlendFactor::OneMinusConstantAlpha => D3D12_BLEND_INV_BLEND_FACTOR,
        BlendFactor::SrcAlphaSaturate => D3D12_BLEND_SRC_ALPHA_SAT,
        BlendFactor::Src1Color => D3D12_BLEND_SRC1_COLOR,
        BlendFactor::OneMinusSrc1Color => D3D12_BLEND_INV_SRC1_COLOR,
        BlendFactor::Src1Alpha => D3D12_BLEND_SRC1_ALPHA,
        BlendFactor::OneMinusSrc1Alpha => D3D12_BLEND_INV_SRC1_ALPHA,
    }
}

pub fn blend_op_to_d3d12(op: BlendOp) -> D3D12_BLEND_OP {
    match op {
        BlendOp::Add => D3D12_BLEND_OP_ADD,
        BlendOp::Subtract => D3D12_BLEND_OP_SUBTRACT,
        BlendOp::ReverseSubtract => D3D12_BLEND_OP_REV_SUBTRACT,
        BlendOp::Min => D3D12_BLEND_OP_MIN,
        BlendOp::Max => D3D12_BLEND_OP_MAX,
    }
}

pub fn logic_op_to_d3d12(op: LogicOp) -> D3D12_LOGIC_OP {
    match op {
        LogicOp::Clear => D3D12_LOGIC_OP_CLEAR,
        LogicOp::And => D3D12_LOGIC_OP_AND,
        LogicOp::AndReverse => D3D12_LOGIC_OP_AND_REVERSE,
        LogicOp::Copy => D3D12_LOGIC_OP_COPY,
        LogicOp::AndInverted => D3D12_LOGIC_OP_AND_INVERTED,
        LogicOp::NoOp => D3D12_LOGIC_OP_NOOP,
        LogicOp::Xor => D3D12_LOGIC_OP_XOR,
        LogicOp::Or => D3D12_LOGIC_OP_OR,
        LogicOp::Nor => D3D12_LOGIC_OP_NOR,
        LogicOp::Equivalent => D3D12_LOGIC_OP_EQUIV,
        LogicOp::Invert => D3D12_LOGIC_OP_INVERT,
        LogicOp::OrReverse => D3D12_LOGIC_OP_OR_REVERSE,
        LogicOp::CopyInverted => D3D12_LOGIC_OP_COPY_INVERTED,
        LogicOp::OrInverted => D3D12_LOGIC_OP_OR_INVERTED,
        LogicOp::Nand => D3D12_LOGIC_OP_NAND,
        LogicOp::Set => D3D12_LOGIC_OP_SET,
    }
}

pub fn color_write_mask_to_d3d12(mask: ColorComponentFlags) -> u8 {
    (mask & ColorComponentFlags::RGBA).bits() as u8
}

pub fn cull_mode_to_d3d12(mode: CullMode) -> D3D12_CULL_MODE {
    match mode {
        CullMode::None => D3D12_CULL_MODE_NONE,
        CullMode::Front => D3D12_CULL_MODE_FRONT,
        CullMode::Back => D3D12_CULL_MODE_BACK,
    }
}

/// D3D12 has no point fill mode.
pub fn fill_mode_to_d3d12(mode: PolygonMode) -> Result<D3D12_FILL_MODE> {
    match mode {
        PolygonMode::Fill => Ok(D3D12_FILL_MODE_SOLID),
        PolygonMode::Line => Ok(D3D12_FILL_MODE_WIREFRAME),
        PolygonMode::Point => {
            log::error!("point fill mode is not supported on D3D12");
            Err(GrfxError::InvalidCreateArgument)
        }
    }
}

pub fn compare_op_to_d3d12(op: CompareOp) -> D3D12_COMPARISON_FUNC {
    match op {
        CompareOp::Never => D3D12_COMPARISON_FUNC_NEVER,
        CompareOp::Less => D3D12_COMPARISON_FUNC_LESS,
        CompareOp::Equal => D3D12_COMPARISON_FUNC_EQUAL,
        CompareOp::LessOrEqual => D3D12_COMPARISON_FUNC_LESS_EQUAL,
        CompareOp::Greater => D3D12_COMPARISON_FUNC_GREATER,
        CompareOp::NotEqual => D3D12_COMPARISON_FUNC_NOT_EQUAL,
        CompareOp::GreaterOrEqual => D3D12_COMPARISON_FUNC_GREATER_EQUAL,
        CompareOp::Always => D3D12_COMPARISON_FUNC_ALWAYS,
    }
}

pub fn stencil_op_to_d3d12(op: StencilOp) -> D3D12_STENCIL_OP {
    match op {
        StencilOp::Keep => D3D12_STENCIL_OP_KEEP,
        StencilOp::Zero => D3D12_STENCIL_OP_ZERO,
        StencilOp::Replace => D3D12_STENCIL_OP_REPLACE,
        StencilOp::IncrementAndClamp => D3D12_STENCIL_OP_INCR_SAT,
        StencilOp::DecrementAndClamp => D3D12_STENCIL_OP_DECR_SAT,
        StencilOp::Invert => D3D12_STENCIL_OP_INVERT,
        StencilOp::IncrementAndWrap => D3D12_STENCIL_OP_INCR,
        StencilOp::DecrementAndWrap => D3D12_STENCIL_OP_DECR,
    }
}

pub fn topology_type_to_d3d12(topology: PrimitiveTopology) -> D3D12_PRIMITIVE_TOPOLOGY_TYPE {
    match topology {
        PrimitiveTopology::PointList => D3D12_PRIMITIVE_TOPOLOGY_TYPE_POINT,
        PrimitiveTopology::LineList | PrimitiveTopology::LineStrip => D3D12_PRIMITIVE_TOPOLOGY_TYPE_LINE,
        PrimitiveTopology::TriangleList | PrimitiveTopology::TriangleStrip => D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
        PrimitiveTopology::TriangleFan => D3D12_PRIMITIVE_TOPOLOGY_TYPE_UNDEFINED,
        PrimitiveTopology::PatchList => D3D12_PRIMITIVE_TOPOLOGY_TYPE_PATCH,
    }
}

pub fn topology_to_d3d12(topology: PrimitiveTopology, patch_control_points: u32) -> D3D_PRIMITIVE_TOPOLOGY {
    match topology {
        PrimitiveTopology::PointList => D3D_PRIMITIVE_TOPOLOGY_POINTLIST,
        PrimitiveTopology::LineList => D3D_PRIMITIVE_TOPOLOGY_LINELIST,
        PrimitiveTopology::LineStrip => D3D_PRIMITIVE_TOPOLOGY_LINESTRIP,
        PrimitiveTopology::TriangleList => D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
        PrimitiveTopology::TriangleStrip => D3D_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
        PrimitiveTopology::TriangleFan => D3D_PRIMITIVE_TOPOLOGY_UNDEFINED,
        PrimitiveTopology::PatchList => {
            let points = patch_control_points.clamp(1, 32) as i32;
            D3D_PRIMITIVE_TOPOLOGY(D3D_PRIMITIVE_TOPOLOGY_1_CONTROL_POINT_PATCHLIST.0 + points - 1)
        }
    }
}

pub fn index_type_to_dxgi(index_type: IndexType) -> DXGI_FORMAT {
    match index_type {
        IndexType::Uint16 => DXGI_FORMAT_R16_UINT,
        IndexType::Uint32 => DXGI_FORMAT_R32_UINT,
    }
}

pub fn input_rate_to_d3d12(rate: VertexInputRate) -> D3D12_INPUT_CLASSIFICATION {
    match rate {
        VertexInputRate::Vertex => D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
        VertexInputRate::Instance => D3D12_INPUT_CLASSIFICATION_PER_INSTANCE_DATA,
    }
}

pub fn range_type_to_d3d12(kind: RangeKind) -> D3D12_DESCRIPTOR_RANGE_TYPE {
    match kind {
        RangeKind::Srv => D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
        RangeKind::Uav => D3D12_DESCRIPTOR_RANGE_TYPE_UAV,
        RangeKind::Cbv => D3D12_DESCRIPTOR_RANGE_TYPE_CBV,
        RangeKind::Sampler => D3D12_DESCRIPTOR_RANGE_TYPE_SAMPLER,
    }
}

pub fn visibility_to_d3d12(visibility: Visibility) -> D3D12_SHADER_VISIBILITY {
    match visibility {
        Visibility::All => D3D12_SHADER_VISIBILITY_ALL,
        Visibility::Vertex => D3D12_SHADER_VISIBILITY_VERTEX,
        Visibility::Hull => D3D12_SHADER_VISIBILITY_HULL,
        Visibility::Domain => D3D12_SHADER_VISIBILITY_DOMAIN,
        Visibility::Geometry => D3D12_SHADER_VISIBILITY_GEOMETRY,
        Visibility::Pixel => D3D12_SHADER_VISIBILITY_PIXEL,
    }
}

pub fn heap_type_to_d3d12(heap: HeapKind) -> D3D12_DESCRIPTOR_HEAP_TYPE {
    match heap {
        HeapKind::CbvSrvUav => D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
        HeapKind::Sampler => D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
    }
}

pub fn address_mode_to_d3d12(mode: SamplerAddressMode) -> D3D12_TEXTURE_ADDRESS_MODE {
    match mode {
        SamplerAddressMode::Repeat => D3D12_TEXTURE_ADDRESS_MODE_WRAP,
        SamplerAddressMode::MirroredRepeat => D3D12_TEXTURE_ADDRESS_MODE_MIRROR,
        SamplerAddressMode::ClampToEdge => D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
        SamplerAddressMode::ClampToBorder => D3D12_TEXTURE_ADDRESS_MODE_BORDER,
    }
}

pub fn border_color_to_d3d12(color: BorderColor) -> [f32; 4] {
    match color {
        BorderColor::FloatTransparentBlack => [0.0, 0.0, 0.0, 0.0],
        BorderColor::FloatOpaqueBlack => [0.0, 0.0, 0.0, 1.0],
        BorderColor::FloatOpaqueWhite => [1.0, 1.0, 1.0, 1.0],
    }
}

pub fn sampler_desc(info: &SamplerCreateInfo) -> D3D12_SAMPLER_DESC {
    let filter = if info.anisotropy_enable {
        layout::encode_anisotropic_filter(info.compare_enable)
    } else {
        layout::encode_basic_filter(
            info.min_filter == Filter::Linear,
            info.mag_filter == Filter::Linear,
            info.mipmap_mode == SamplerMipmapMode::Linear,
            info.compare_enable,
        )
    };
    D3D12_SAMPLER_DESC {
        Filter: D3D12_FILTER(filter),
        AddressU: address_mode_to_d3d12(info.address_mode_u),
        AddressV: address_mode_to_d3d12(info.address_mode_v),
        AddressW: address_mode_to_d3d12(info.address_mode_w),
        MipLODBias: info.mip_lod_bias,
        MaxAnisotropy: info.max_anisotropy as u32,
        ComparisonFunc: compare_op_to_d3d12(info.compare_op),
        BorderColor: border_color_to_d3d12(info.border_color),
        MinLOD: info.min_lod,
        MaxLOD: info.max_lod,
    }
}

/// Query heap type and the query type recorded into it.
pub fn query_type_to_d3d12(ty: QueryType) -> (D3D12_QUERY_HEAP_TYPE, D3D12_QUERY_TYPE) {
    match ty {
        QueryType::Occlusion => (D3D12_QUERY_HEAP_TYPE_OCCLUSION, D3D12_QUERY_TYPE_OCCLUSION),
        QueryType::PipelineStatistics => (D3D12_QUERY_HEAP_TYPE_PIPELINE_STATISTICS, D3D12_QUERY_TYPE_PIPELINE_STATISTICS),
        QueryType::Timestamp => (D3D12_QUERY_HEAP_TYPE_TIMESTAMP, D3D12_QUERY_TYPE_TIMESTAMP),
    }
}

pub fn command_list_type(command_type: CommandType) -> Result<D3D12_COMMAND_LIST_TYPE> {
    match command_type {
        CommandType::Graphics => Ok(D3D12_COMMAND_LIST_TYPE_DIRECT),
        CommandType::Compute => Ok(D3D12_COMMAND_LIST_TYPE_COMPUTE),
        CommandType::Transfer => Ok(D3D12_COMMAND_LIST_TYPE_COPY),
        other => {
            log::error!("no D3D12 command list type for {:?}", other);
            Err(GrfxError::InvalidCreateArgument)
        }
    }
}

pub fn resource_dimension(image_type: ImageType) -> D3D12_RESOURCE_DIMENSION {
    match image_type {
        ImageType::D1 => D3D12_RESOURCE_DIMENSION_TEXTURE1D,
        ImageType::D2 | ImageType::Cube => D3D12_RESOURCE_DIMENSION_TEXTURE2D,
        ImageType::D3 => D3D12_RESOURCE_DIMENSION_TEXTURE3D,
    }
}

pub fn buffer_desc(size: u64, flags: D3D12_RESOURCE_FLAGS) -> D3D12_RESOURCE_DESC {
    D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
        Alignment: 0,
        Width: size,
        Height: 1,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: DXGI_FORMAT_UNKNOWN,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
        Flags: flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_blend_factors_share_one_native_factor() {
        assert_eq!(blend_to_d3d12(BlendFactor::ConstantColor), D3D12_BLEND_BLEND_FACTOR);
        assert_eq!(blend_to_d3d12(BlendFactor::ConstantAlpha), D3D12_BLEND_BLEND_FACTOR);
        assert_eq!(blend_to_d3d12(BlendFactor::OneMinusConstantAlpha), D3D12_BLEND_INV_BLEND_FACTOR);
    }

    #[test]
    fn point_fill_is_rejected() {
        assert_eq!(fill_mode_to_d3d12(PolygonMode::Point), Err(GrfxError::InvalidCreateArgument));
        assert_eq!(fill_mode_to_d3d12(PolygonMode::Line), Ok(D3D12_FILL_MODE_WIREFRAME));
    }

    #[test]
    fn fans_have_no_native_topology() {
        assert_eq!(topology_to_d3d12(PrimitiveTopology::TriangleFan, 0), D3D_PRIMITIVE_TOPOLOGY_UNDEFINED);
        assert_eq!(topology_type_to_d3d12(PrimitiveTopology::TriangleStrip), D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE);
        assert_eq!(topology_type_to_d3d12(PrimitiveTopology::TriangleFan), D3D12_PRIMITIVE_TOPOLOGY_TYPE_UNDEFINED);
        assert_eq!(topology_to_d3d12(PrimitiveTopology::PatchList, 3), D3D_PRIMITIVE_TOPOLOGY_3_CONTROL_POINT_PATCHLIST);
    }

    #[test]
    fn formats_without_dxgi_equivalent() {
        assert_eq!(format_to_dxgi(Format::S8Uint), DXGI_FORMAT_UNKNOWN);
        assert_eq!(format_to_dxgi(Format::D16UnormS8Uint), DXGI_FORMAT_UNKNOWN);
        assert_eq!(format_to_dxgi(Format::D32FloatS8Uint), DXGI_FORMAT_D32_FLOAT_S8X24_UINT);
    }

    #[test]
    fn generic_read_matches_the_native_constant() {
        assert_eq!(resource_states(ResourceState::General, CommandType::Graphics), D3D12_RESOURCE_STATE_COMMON);
        assert_eq!(
            D3D12_RESOURCE_STATES(layout::ResourceStates::GENERIC_READ.bits()),
            D3D12_RESOURCE_STATE_GENERIC_READ
        );
    }
}
