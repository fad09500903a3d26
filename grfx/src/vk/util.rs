//! Translation from grfx enums to their Vulkan counterparts.

use ash::vk;

use crate::error::{GrfxError, Result};
use crate::format::{Format, FormatAspect};
use crate::image::SamplerCreateInfo;
use crate::types::{
    AttachmentLoadOp, AttachmentStoreOp, BlendFactor, BlendOp, BorderColor, BufferUsageFlags, ColorComponentFlags,
    CommandType, CompareOp, CullMode, DescriptorType, Filter, FrontFace, ImageType, ImageUsageFlags, ImageViewType,
    IndexType, LogicOp, PipelineBindPoint, PipelineStage, PolygonMode, PresentMode, PrimitiveTopology,
    QueryType, ResourceState, SampleCount, SamplerAddressMode, SamplerMipmapMode, ShaderStageFlags, StencilOp,
    VertexInputRate,
};

/// Maps a failed VkResult to `ApiFailure`, logging the call that produced it. Results above success
/// are logged and pass.
pub fn check(result: vk::Result, call: &str) -> Result<()> {
    if result.as_raw() < 0 {
        return Err(vk_error(result, call));
    }
    if result != vk::Result::SUCCESS {
        log::warn!("{} returned {:?}", call, result);
    }
    Ok(())
}

pub fn vk_error(result: vk::Result, call: &str) -> GrfxError {
    log::error!("{} failed: {:?}", call, result);
    GrfxError::ApiFailure
}

/// For calls that wait: timeouts become `WaitTimedOut` instead of a warning.
pub fn wait_result(result: vk::Result, call: &str) -> Result<()> {
    match result {
        vk::Result::TIMEOUT | vk::Result::NOT_READY => Err(GrfxError::WaitTimedOut),
        other => check(other, call),
    }
}

/// Stage, access and layout for one side of a barrier. `layout` is `None` for buffer-only states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub stage_mask: vk::PipelineStageFlags,
    pub access_mask: vk::AccessFlags,
    pub layout: Option<vk::ImageLayout>,
}

/// Shader stages readable on the queue that records the barrier, as (all, non-pixel).
fn shader_stages(command_type: CommandType, features: &vk::PhysicalDeviceFeatures) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
    use vk::PipelineStageFlags as S;
    let (mut all, mut non_pixel) = match command_type {
        CommandType::Compute => (S::COMPUTE_SHADER, S::COMPUTE_SHADER),
        CommandType::Graphics => (S::VERTEX_SHADER | S::FRAGMENT_SHADER, S::VERTEX_SHADER),
        _ => (S::TRANSFER, S::TRANSFER),
    };
    if command_type == CommandType::Graphics {
        if features.geometry_shader == vk::TRUE {
            all |= S::GEOMETRY_SHADER;
            non_pixel |= S::GEOMETRY_SHADER;
        }
        if features.tessellation_shader == vk::TRUE {
            let tess = S::TESSELLATION_CONTROL_SHADER | S::TESSELLATION_EVALUATION_SHADER;
            all |= tess;
            non_pixel |= tess;
        }
    }
    (all, non_pixel)
}

/// `is_source` picks the stage for `Present`, which is the only state whose side matters.
pub fn barrier_to_vk(
    state: ResourceState,
    command_type: CommandType,
    features: &vk::PhysicalDeviceFeatures,
    is_source: bool,
) -> Barrier {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let (all_shaders, non_pixel_shaders) = shader_stages(command_type, features);
    let fragment_tests = S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS;
    let depth_stencil_access = A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE;
    let memory_access = A::MEMORY_READ | A::MEMORY_WRITE;

    let (stage_mask, access_mask, layout) = match state {
        ResourceState::Undefined => (S::ALL_COMMANDS, memory_access, Some(L::UNDEFINED)),
        ResourceState::General => (S::ALL_COMMANDS, memory_access, Some(L::GENERAL)),
        ResourceState::ConstantBuffer => {
            (S::VERTEX_INPUT | all_shaders, A::VERTEX_ATTRIBUTE_READ | A::UNIFORM_READ, None)
        }
        ResourceState::VertexBuffer => (S::VERTEX_INPUT | all_shaders, A::VERTEX_ATTRIBUTE_READ, None),
        ResourceState::IndexBuffer => (S::VERTEX_INPUT, A::INDEX_READ, None),
        ResourceState::RenderTarget => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
            Some(L::COLOR_ATTACHMENT_OPTIMAL),
        ),
        ResourceState::UnorderedAccess => (all_shaders, A::SHADER_READ | A::SHADER_WRITE, Some(L::GENERAL)),
        ResourceState::DepthStencilRead => {
            (fragment_tests, depth_stencil_access, Some(L::DEPTH_STENCIL_READ_ONLY_OPTIMAL))
        }
        ResourceState::DepthStencilWrite => {
            (fragment_tests, depth_stencil_access, Some(L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL))
        }
        ResourceState::DepthWriteStencilRead => {
            (fragment_tests, depth_stencil_access, Some(L::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL))
        }
        ResourceState::DepthReadStencilWrite => {
            (fragment_tests, depth_stencil_access, Some(L::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL))
        }
        ResourceState::NonPixelShaderResource => {
            (non_pixel_shaders, A::SHADER_READ, Some(L::SHADER_READ_ONLY_OPTIMAL))
        }
        ResourceState::ShaderResource => (all_shaders, A::SHADER_READ, Some(L::SHADER_READ_ONLY_OPTIMAL)),
        ResourceState::PixelShaderResource => {
            (S::FRAGMENT_SHADER, A::SHADER_READ, Some(L::SHADER_READ_ONLY_OPTIMAL))
        }
        ResourceState::StreamOut => (S::TRANSFORM_FEEDBACK_EXT, A::TRANSFORM_FEEDBACK_WRITE_EXT, None),
        ResourceState::IndirectArgument => (S::DRAW_INDIRECT, A::INDIRECT_COMMAND_READ, None),
        ResourceState::CopySrc | ResourceState::ResolveSrc => {
            (S::TRANSFER, A::TRANSFER_READ, Some(L::TRANSFER_SRC_OPTIMAL))
        }
        ResourceState::CopyDst | ResourceState::ResolveDst => {
            (S::TRANSFER, A::TRANSFER_WRITE, Some(L::TRANSFER_DST_OPTIMAL))
        }
        ResourceState::Present => {
            let stage = if is_source { S::TOP_OF_PIPE } else { S::BOTTOM_OF_PIPE };
            (stage, memory_access, Some(L::PRESENT_SRC_KHR))
        }
        ResourceState::Predication => (S::CONDITIONAL_RENDERING_EXT, A::CONDITIONAL_RENDERING_READ_EXT, None),
    };
    Barrier { stage_mask, access_mask, layout }
}

/// Layout an image must be in for `state`; buffer-only states are invalid for images.
pub fn image_layout(state: ResourceState, command_type: CommandType, features: &vk::PhysicalDeviceFeatures) -> Result<vk::ImageLayout> {
    barrier_to_vk(state, command_type, features, false).layout.ok_or_else(|| {
        log::error!("{:?} has no image layout", state);
        GrfxError::InvalidCreateArgument
    })
}

pub fn format_to_vk(format: Format) -> vk::Format {
    use vk::Format as F;
    match format {
        Format::Undefined => F::UNDEFINED,
        Format::R8Unorm => F::R8_UNORM,
        Format::R8G8Unorm => F::R8G8_UNORM,
        Format::R8G8B8A8Unorm => F::R8G8B8A8_UNORM,
        Format::R8G8B8A8Srgb => F::R8G8B8A8_SRGB,
        Format::B8G8R8A8Unorm => F::B8G8R8A8_UNORM,
        Format::B8G8R8A8Srgb => F::B8G8R8A8_SRGB,
        Format::R16Uint => F::R16_UINT,
        Format::R16Float => F::R16_SFLOAT,
        Format::R16G16Float => F::R16G16_SFLOAT,
        Format::R16G16B16A16Float => F::R16G16B16A16_SFLOAT,
        Format::R32Uint => F::R32_UINT,
        Format::R32Float => F::R32_SFLOAT,
        Format::R32G32Float => F::R32G32_SFLOAT,
        Format::R32G32B32Float => F::R32G32B32_SFLOAT,
        Format::R32G32B32A32Float => F::R32G32B32A32_SFLOAT,
        Format::R10G10B10A2Unorm => F::A2B10G10R10_UNORM_PACK32,
        Format::R11G11B10Float => F::B10G11R11_UFLOAT_PACK32,
        Format::S8Uint => F::S8_UINT,
        Format::D16Unorm => F::D16_UNORM,
        Format::D32Float => F::D32_SFLOAT,
        Format::D16UnormS8Uint => F::D16_UNORM_S8_UINT,
        Format::D24UnormS8Uint => F::D24_UNORM_S8_UINT,
        Format::D32FloatS8Uint => F::D32_SFLOAT_S8_UINT,
        Format::Bc1RgbaUnorm => F::BC1_RGBA_UNORM_BLOCK,
        Format::Bc3Unorm => F::BC3_UNORM_BLOCK,
        Format::Bc7Unorm => F::BC7_UNORM_BLOCK,
    }
}

pub fn aspect_mask(format: Format) -> vk::ImageAspectFlags {
    match format.aspect() {
        FormatAspect::Color => vk::ImageAspectFlags::COLOR,
        FormatAspect::Depth => vk::ImageAspectFlags::DEPTH,
        FormatAspect::Stencil => vk::ImageAspectFlags::STENCIL,
        FormatAspect::DepthStencil => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
    }
}

pub fn buffer_usage_to_vk(usage: BufferUsageFlags) -> vk::BufferUsageFlags {
    let table = [
        (BufferUsageFlags::TRANSFER_SRC, vk::BufferUsageFlags::TRANSFER_SRC),
        (BufferUsageFlags::TRANSFER_DST, vk::BufferUsageFlags::TRANSFER_DST),
        (BufferUsageFlags::UNIFORM_TEXEL_BUFFER, vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER),
        (BufferUsageFlags::STORAGE_TEXEL_BUFFER, vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER),
        (BufferUsageFlags::UNIFORM_BUFFER, vk::BufferUsageFlags::UNIFORM_BUFFER),
        (BufferUsageFlags::RAW_STORAGE_BUFFER, vk::BufferUsageFlags::STORAGE_BUFFER),
        (BufferUsageFlags::RO_STRUCTURED_BUFFER, vk::BufferUsageFlags::STORAGE_BUFFER),
        (BufferUsageFlags::RW_STRUCTURED_BUFFER, vk::BufferUsageFlags::STORAGE_BUFFER),
        (BufferUsageFlags::INDEX_BUFFER, vk::BufferUsageFlags::INDEX_BUFFER),
        (BufferUsageFlags::VERTEX_BUFFER, vk::BufferUsageFlags::VERTEX_BUFFER),
        (BufferUsageFlags::INDIRECT_BUFFER, vk::BufferUsageFlags::INDIRECT_BUFFER),
    ];
    table.iter().filter(|(flag, _)| usage.contains(*flag)).fold(vk::BufferUsageFlags::empty(), |acc, (_, v)| acc | *v)
}

pub fn image_usage_to_vk(usage: ImageUsageFlags) -> vk::ImageUsageFlags {
    let table = [
        (ImageUsageFlags::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
        (ImageUsageFlags::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
        (ImageUsageFlags::SAMPLED, vk::ImageUsageFlags::SAMPLED),
        (ImageUsageFlags::STORAGE, vk::ImageUsageFlags::STORAGE),
        (ImageUsageFlags::COLOR_ATTACHMENT, vk::ImageUsageFlags::COLOR_ATTACHMENT),
        (ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
    ];
    table.iter().filter(|(flag, _)| usage.contains(*flag)).fold(vk::ImageUsageFlags::empty(), |acc, (_, v)| acc | *v)
}

pub fn image_type_to_vk(image_type: ImageType) -> vk::ImageType {
    match image_type {
        ImageType::D1 => vk::ImageType::TYPE_1D,
        ImageType::D2 | ImageType::Cube => vk::ImageType::TYPE_2D,
        ImageType::D3 => vk::ImageType::TYPE_3D,
    }
}

pub fn view_type_to_vk(view_type: ImageViewType) -> vk::ImageViewType {
    match view_type {
        ImageViewType::D1 => vk::ImageViewType::TYPE_1D,
        ImageViewType::D1Array => vk::ImageViewType::TYPE_1D_ARRAY,
        ImageViewType::D2 => vk::ImageViewType::TYPE_2D,
        ImageViewType::D2Array => vk::ImageViewType::TYPE_2D_ARRAY,
        ImageViewType::D3 => vk::ImageViewType::TYPE_3D,
        ImageViewType::Cube => vk::ImageViewType::CUBE,
        ImageViewType::CubeArray => vk::ImageViewType::CUBE_ARRAY,
    }
}

pub fn sample_count_to_vk(count: SampleCount) -> vk::SampleCountFlags {
    match count {
        SampleCount::X1 => vk::SampleCountFlags::TYPE_1,
        SampleCount::X2 => vk::SampleCountFlags::TYPE_2,
        SampleCount::X4 => vk::SampleCountFlags::TYPE_4,
        SampleCount::X8 => vk::SampleCountFlags::TYPE_8,
        SampleCount::X16 => vk::SampleCountFlags::TYPE_16,
    }
}

pub fn filter_to_vk(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub fn mipmap_mode_to_vk(mode: SamplerMipmapMode) -> vk::SamplerMipmapMode {
    match mode {
        SamplerMipmapMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        SamplerMipmapMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn address_mode_to_vk(mode: SamplerAddressMode) -> vk::SamplerAddressMode {
    match mode {
        SamplerAddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        SamplerAddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        SamplerAddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        SamplerAddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

pub fn border_color_to_vk(color: BorderColor) -> vk::BorderColor {
    match color {
        BorderColor::FloatTransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        BorderColor::FloatOpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
        BorderColor::FloatOpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
    }
}

pub fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn blend_factor_to_vk(factor: BlendFactor) -> vk::BlendFactor {
    use vk::BlendFactor as B;
    match factor {
        BlendFactor::Zero => B::ZERO,
        BlendFactor::One => B::ONE,
        BlendFactor::SrcColor => B::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => B::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => B::DST_COLOR,
        BlendFactor::OneMinusDstColor => B::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => B::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => B::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => B::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => B::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => B::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => B::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::ConstantAlpha => B::CONSTANT_ALPHA,
        BlendFactor::OneMinusConstantAlpha => B::ONE_MINUS_CONSTANT_ALPHA,
        BlendFactor::SrcAlphaSaturate => B::SRC_ALPHA_SATURATE,
        BlendFactor::Src1Color => B::SRC1_COLOR,
        BlendFactor::OneMinusSrc1Color => B::ONE_MINUS_SRC1_COLOR,
        BlendFactor::Src1Alpha => B::SRC1_ALPHA,
        BlendFactor::OneMinusSrc1Alpha => B::ONE_MINUS_SRC1_ALPHA,
    }
}

pub fn blend_op_to_vk(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

pub fn logic_op_to_vk(op: LogicOp) -> vk::LogicOp {
    use vk::LogicOp as L;
    match op {
        LogicOp::Clear => L::CLEAR,
        LogicOp::And => L::AND,
        LogicOp::AndReverse => L::AND_REVERSE,
        LogicOp::Copy => L::COPY,
        LogicOp::AndInverted => L::AND_INVERTED,
        LogicOp::NoOp => L::NO_OP,
        LogicOp::Xor => L::XOR,
        LogicOp::Or => L::OR,
        LogicOp::Nor => L::NOR,
        LogicOp::Equivalent => L::EQUIVALENT,
        LogicOp::Invert => L::INVERT,
        LogicOp::OrReverse => L::OR_REVERSE,
        LogicOp::CopyInverted => L::COPY_INVERTED,
        LogicOp::OrInverted => L::OR_INVERTED,
        LogicOp::Nand => L::NAND,
        LogicOp::Set => L::SET,
    }
}

pub fn color_write_mask_to_vk(mask: ColorComponentFlags) -> vk::ColorComponentFlags {
    vk::ColorComponentFlags::from_raw((mask & ColorComponentFlags::RGBA).bits())
}

pub fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub fn front_face_to_vk(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::Ccw => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Cw => vk::FrontFace::CLOCKWISE,
    }
}

pub fn polygon_mode_to_vk(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

pub fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    use vk::PrimitiveTopology as T;
    match topology {
        PrimitiveTopology::PointList => T::POINT_LIST,
        PrimitiveTopology::LineList => T::LINE_LIST,
        PrimitiveTopology::LineStrip => T::LINE_STRIP,
        PrimitiveTopology::TriangleList => T::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => T::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => T::TRIANGLE_FAN,
        PrimitiveTopology::PatchList => T::PATCH_LIST,
    }
}

pub fn stencil_op_to_vk(op: StencilOp) -> vk::StencilOp {
    use vk::StencilOp as S;
    match op {
        StencilOp::Keep => S::KEEP,
        StencilOp::Zero => S::ZERO,
        StencilOp::Replace => S::REPLACE,
        StencilOp::IncrementAndClamp => S::INCREMENT_AND_CLAMP,
        StencilOp::DecrementAndClamp => S::DECREMENT_AND_CLAMP,
        StencilOp::Invert => S::INVERT,
        StencilOp::IncrementAndWrap => S::INCREMENT_AND_WRAP,
        StencilOp::DecrementAndWrap => S::DECREMENT_AND_WRAP,
    }
}

pub fn index_type_to_vk(index_type: IndexType) -> vk::IndexType {
    match index_type {
        IndexType::Uint16 => vk::IndexType::UINT16,
        IndexType::Uint32 => vk::IndexType::UINT32,
    }
}

pub fn input_rate_to_vk(rate: VertexInputRate) -> vk::VertexInputRate {
    match rate {
        VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
        VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
    }
}

/// Raw and structured buffers are all plain storage buffers on Vulkan.
pub fn descriptor_type_to_vk(ty: DescriptorType) -> vk::DescriptorType {
    use vk::DescriptorType as D;
    match ty {
        DescriptorType::Sampler => D::SAMPLER,
        DescriptorType::CombinedImageSampler => D::COMBINED_IMAGE_SAMPLER,
        DescriptorType::SampledImage => D::SAMPLED_IMAGE,
        DescriptorType::StorageImage => D::STORAGE_IMAGE,
        DescriptorType::UniformTexelBuffer => D::UNIFORM_TEXEL_BUFFER,
        DescriptorType::StorageTexelBuffer => D::STORAGE_TEXEL_BUFFER,
        DescriptorType::UniformBuffer => D::UNIFORM_BUFFER,
        DescriptorType::RawStorageBuffer | DescriptorType::RoStructuredBuffer | DescriptorType::RwStructuredBuffer => {
            D::STORAGE_BUFFER
        }
        DescriptorType::UniformBufferDynamic => D::UNIFORM_BUFFER_DYNAMIC,
        DescriptorType::StorageBufferDynamic => D::STORAGE_BUFFER_DYNAMIC,
        DescriptorType::InputAttachment => D::INPUT_ATTACHMENT,
    }
}

pub fn shader_stages_to_vk(stages: ShaderStageFlags) -> vk::ShaderStageFlags {
    if stages.contains(ShaderStageFlags::ALL) {
        return vk::ShaderStageFlags::ALL;
    }
    let table = [
        (ShaderStageFlags::VS, vk::ShaderStageFlags::VERTEX),
        (ShaderStageFlags::HS, vk::ShaderStageFlags::TESSELLATION_CONTROL),
        (ShaderStageFlags::DS, vk::ShaderStageFlags::TESSELLATION_EVALUATION),
        (ShaderStageFlags::GS, vk::ShaderStageFlags::GEOMETRY),
        (ShaderStageFlags::PS, vk::ShaderStageFlags::FRAGMENT),
        (ShaderStageFlags::CS, vk::ShaderStageFlags::COMPUTE),
    ];
    table.iter().filter(|(flag, _)| stages.contains(*flag)).fold(vk::ShaderStageFlags::empty(), |acc, (_, v)| acc | *v)
}

pub fn load_op_to_vk(op: AttachmentLoadOp) -> vk::AttachmentLoadOp {
    match op {
        AttachmentLoadOp::Load => vk::AttachmentLoadOp::LOAD,
        AttachmentLoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        AttachmentLoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub fn store_op_to_vk(op: AttachmentStoreOp) -> vk::AttachmentStoreOp {
    match op {
        AttachmentStoreOp::Store => vk::AttachmentStoreOp::STORE,
        AttachmentStoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn present_mode_to_vk(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

pub fn query_type_to_vk(ty: QueryType) -> vk::QueryType {
    match ty {
        QueryType::Occlusion => vk::QueryType::OCCLUSION,
        QueryType::PipelineStatistics => vk::QueryType::PIPELINE_STATISTICS,
        QueryType::Timestamp => vk::QueryType::TIMESTAMP,
    }
}

pub fn pipeline_stage_to_vk(stage: PipelineStage) -> vk::PipelineStageFlags {
    match stage {
        PipelineStage::TopOfPipe => vk::PipelineStageFlags::TOP_OF_PIPE,
        PipelineStage::BottomOfPipe => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
    }
}

pub fn bind_point_to_vk(bind_point: PipelineBindPoint) -> vk::PipelineBindPoint {
    match bind_point {
        PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
        PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
    }
}

/// Family serving a command type: the first family with the type's flag and no more capable flag.
pub fn queue_family_for(command_type: CommandType, families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    use vk::QueueFlags as Q;
    let (required, excluded) = match command_type {
        CommandType::Graphics => (Q::GRAPHICS, Q::empty()),
        CommandType::Compute => (Q::COMPUTE, Q::GRAPHICS),
        CommandType::Transfer => (Q::TRANSFER, Q::GRAPHICS | Q::COMPUTE),
        _ => return None,
    };
    families
        .iter()
        .position(|f| f.queue_flags.contains(required) && !f.queue_flags.intersects(excluded))
        .map(|i| i as u32)
}

pub fn sampler_info(info: &SamplerCreateInfo) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(filter_to_vk(info.mag_filter))
        .min_filter(filter_to_vk(info.min_filter))
        .mipmap_mode(mipmap_mode_to_vk(info.mipmap_mode))
        .address_mode_u(address_mode_to_vk(info.address_mode_u))
        .address_mode_v(address_mode_to_vk(info.address_mode_v))
        .address_mode_w(address_mode_to_vk(info.address_mode_w))
        .mip_lod_bias(info.mip_lod_bias)
        .anisotropy_enable(info.anisotropy_enable)
        .max_anisotropy(info.max_anisotropy)
        .compare_enable(info.compare_enable)
        .compare_op(compare_op_to_vk(info.compare_op))
        .min_lod(info.min_lod)
        .max_lod(info.max_lod)
        .border_color(border_color_to_vk(info.border_color))
}

/// Inverse of [`format_to_vk`] for the formats a surface can report.
pub fn format_from_vk(format: vk::Format) -> Option<Format> {
    use vk::Format as F;
    let format = match format {
        F::R8G8B8A8_UNORM => Format::R8G8B8A8Unorm,
        F::R8G8B8A8_SRGB => Format::R8G8B8A8Srgb,
        F::B8G8R8A8_UNORM => Format::B8G8R8A8Unorm,
        F::B8G8R8A8_SRGB => Format::B8G8R8A8Srgb,
        F::A2B10G10R10_UNORM_PACK32 => Format::R10G10B10A2Unorm,
        F::R16G16B16A16_SFLOAT => Format::R16G16B16A16Float,
        _ => return None,
    };
    Some(format)
}

pub fn present_mode_from_vk(mode: vk::PresentModeKHR) -> Option<PresentMode> {
    match mode {
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_features() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures { geometry_shader: vk::TRUE, tessellation_shader: vk::TRUE, ..Default::default() }
    }

    #[test]
    fn results_above_success_pass() {
        assert_eq!(check(vk::Result::SUCCESS, "vkQueueSubmit"), Ok(()));
        assert_eq!(check(vk::Result::SUBOPTIMAL_KHR, "vkQueuePresentKHR"), Ok(()));
        assert_eq!(check(vk::Result::ERROR_DEVICE_LOST, "vkQueueSubmit"), Err(GrfxError::ApiFailure));
        assert_eq!(wait_result(vk::Result::TIMEOUT, "vkWaitForFences"), Err(GrfxError::WaitTimedOut));
        assert_eq!(wait_result(vk::Result::ERROR_DEVICE_LOST, "vkWaitForFences"), Err(GrfxError::ApiFailure));
    }

    #[test]
    fn shader_resource_stages_follow_queue_type() {
        let features = all_features();
        let graphics = barrier_to_vk(ResourceState::ShaderResource, CommandType::Graphics, &features, false);
        assert_eq!(
            graphics.stage_mask,
            vk::PipelineStageFlags::VERTEX_SHADER
                | vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::GEOMETRY_SHADER
                | vk::PipelineStageFlags::TESSELLATION_CONTROL_SHADER
                | vk::PipelineStageFlags::TESSELLATION_EVALUATION_SHADER
        );
        let compute = barrier_to_vk(ResourceState::NonPixelShaderResource, CommandType::Compute, &features, false);
        assert_eq!(compute.stage_mask, vk::PipelineStageFlags::COMPUTE_SHADER);
        let copy = barrier_to_vk(ResourceState::ShaderResource, CommandType::Transfer, &features, false);
        assert_eq!(copy.stage_mask, vk::PipelineStageFlags::TRANSFER);

        let bare = barrier_to_vk(ResourceState::ShaderResource, CommandType::Graphics, &Default::default(), false);
        assert_eq!(bare.stage_mask, vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn state_layouts() {
        let features = all_features();
        let cases = [
            (ResourceState::Undefined, Some(vk::ImageLayout::UNDEFINED)),
            (ResourceState::General, Some(vk::ImageLayout::GENERAL)),
            (ResourceState::ConstantBuffer, None),
            (ResourceState::VertexBuffer, None),
            (ResourceState::IndexBuffer, None),
            (ResourceState::RenderTarget, Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)),
            (ResourceState::UnorderedAccess, Some(vk::ImageLayout::GENERAL)),
            (ResourceState::DepthStencilRead, Some(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL)),
            (ResourceState::DepthWriteStencilRead, Some(vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL)),
            (ResourceState::PixelShaderResource, Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)),
            (ResourceState::CopySrc, Some(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)),
            (ResourceState::ResolveDst, Some(vk::ImageLayout::TRANSFER_DST_OPTIMAL)),
            (ResourceState::Present, Some(vk::ImageLayout::PRESENT_SRC_KHR)),
        ];
        for (state, expected) in cases {
            assert_eq!(barrier_to_vk(state, CommandType::Graphics, &features, false).layout, expected, "{:?}", state);
        }
        assert_eq!(
            image_layout(ResourceState::IndexBuffer, CommandType::Graphics, &features),
            Err(GrfxError::InvalidCreateArgument)
        );
    }

    #[test]
    fn present_stage_depends_on_side() {
        let features = all_features();
        let src = barrier_to_vk(ResourceState::Present, CommandType::Graphics, &features, true);
        let dst = barrier_to_vk(ResourceState::Present, CommandType::Graphics, &features, false);
        assert_eq!(src.stage_mask, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst.stage_mask, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn every_state_has_a_stage() {
        for state in ResourceState::ALL {
            for command_type in [CommandType::Graphics, CommandType::Compute, CommandType::Transfer] {
                assert!(!barrier_to_vk(state, command_type, &all_features(), true).stage_mask.is_empty());
            }
        }
    }

    #[test]
    fn formats_and_aspects() {
        assert_eq!(format_to_vk(Format::B8G8R8A8Unorm), vk::Format::B8G8R8A8_UNORM);
        assert_eq!(format_to_vk(Format::R10G10B10A2Unorm), vk::Format::A2B10G10R10_UNORM_PACK32);
        assert_eq!(format_to_vk(Format::D32FloatS8Uint), vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(aspect_mask(Format::D16Unorm), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_mask(Format::S8Uint), vk::ImageAspectFlags::STENCIL);
        assert_eq!(aspect_mask(Format::D24UnormS8Uint), vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
        assert_eq!(aspect_mask(Format::R8G8B8A8Srgb), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn structured_buffers_are_storage_buffers() {
        assert_eq!(descriptor_type_to_vk(DescriptorType::RoStructuredBuffer), vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(descriptor_type_to_vk(DescriptorType::RawStorageBuffer), vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(
            buffer_usage_to_vk(BufferUsageFlags::RW_STRUCTURED_BUFFER | BufferUsageFlags::TRANSFER_DST),
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
    }

    #[test]
    fn shader_stage_masks() {
        assert_eq!(shader_stages_to_vk(ShaderStageFlags::ALL), vk::ShaderStageFlags::ALL);
        assert_eq!(
            shader_stages_to_vk(ShaderStageFlags::VS | ShaderStageFlags::PS),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(shader_stages_to_vk(ShaderStageFlags::CS), vk::ShaderStageFlags::COMPUTE);
    }

    #[test]
    fn queue_families_prefer_dedicated() {
        use vk::QueueFlags as Q;
        let family = |queue_flags| vk::QueueFamilyProperties { queue_flags, queue_count: 1, ..Default::default() };
        let families = [family(Q::GRAPHICS | Q::COMPUTE | Q::TRANSFER), family(Q::COMPUTE | Q::TRANSFER), family(Q::TRANSFER)];
        assert_eq!(queue_family_for(CommandType::Graphics, &families), Some(0));
        assert_eq!(queue_family_for(CommandType::Compute, &families), Some(1));
        assert_eq!(queue_family_for(CommandType::Transfer, &families), Some(2));
        assert_eq!(queue_family_for(CommandType::Compute, &families[..1]), None);
        assert_eq!(queue_family_for(CommandType::Presentation, &families), None);
    }

    #[test]
    fn surface_formats_map_back() {
        for format in [Format::B8G8R8A8Unorm, Format::R8G8B8A8Srgb, Format::R10G10B10A2Unorm] {
            assert_eq!(format_from_vk(format_to_vk(format)), Some(format));
        }
        assert_eq!(format_from_vk(vk::Format::D32_SFLOAT), None);
        assert_eq!(present_mode_from_vk(vk::PresentModeKHR::MAILBOX), Some(PresentMode::Mailbox));
        assert_eq!(present_mode_from_vk(vk::PresentModeKHR::SHARED_DEMAND_REFRESH), None);
    }

    #[test]
    fn sampler_info_carries_anisotropy() {
        let info = SamplerCreateInfo { anisotropy_enable: true, max_anisotropy: 8.0, ..Default::default() };
        let native = sampler_info(&info);
        assert_eq!(native.anisotropy_enable, vk::TRUE);
        assert_eq!(native.max_anisotropy, 8.0);
        assert_eq!(native.compare_enable, vk::FALSE);
    }

    #[test]
    fn color_write_mask_keeps_rgba_bits() {
        let rgba = vk::ColorComponentFlags::R | vk::ColorComponentFlags::G | vk::ColorComponentFlags::B | vk::ColorComponentFlags::A;
        assert_eq!(color_write_mask_to_vk(ColorComponentFlags::RGBA), rgba);
        assert_eq!(color_write_mask_to_vk(ColorComponentFlags::R | ColorComponentFlags::A), vk::ColorComponentFlags::R | vk::ColorComponentFlags::A);
    }
}
