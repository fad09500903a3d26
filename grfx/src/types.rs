//! API-agnostic enums, flags and small value types shared across the grfx layer.

bitflags::bitflags! {
    /// Buffer usage flags; combine for buffers bound in multiple ways (e.g. VERTEX_BUFFER | TRANSFER_DST).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BufferUsageFlags: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM_TEXEL_BUFFER = 1 << 2;
        const STORAGE_TEXEL_BUFFER = 1 << 3;
        const UNIFORM_BUFFER = 1 << 4;
        const RAW_STORAGE_BUFFER = 1 << 5;
        const RO_STRUCTURED_BUFFER = 1 << 6;
        const RW_STRUCTURED_BUFFER = 1 << 7;
        const INDEX_BUFFER = 1 << 8;
        const VERTEX_BUFFER = 1 << 9;
        const INDIRECT_BUFFER = 1 << 10;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ImageUsageFlags: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
    }
}

bitflags::bitflags! {
    /// Shader stages a binding or push-constant block is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VS = 1 << 0;
        const HS = 1 << 1;
        const DS = 1 << 2;
        const GS = 1 << 3;
        const PS = 1 << 4;
        const CS = 1 << 5;
        const ALL_GRAPHICS = Self::VS.bits() | Self::HS.bits() | Self::DS.bits() | Self::GS.bits() | Self::PS.bits();
        const ALL = Self::ALL_GRAPHICS.bits() | Self::CS.bits();
    }
}

impl Default for ShaderStageFlags {
    fn default() -> Self {
        ShaderStageFlags::ALL
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColorComponentFlags: u32 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
        const RGBA = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

impl Default for ColorComponentFlags {
    fn default() -> Self {
        ColorComponentFlags::RGBA
    }
}

/// Native API a device is created against.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Api {
    #[default]
    Dx12_0,
    Dx12_1,
    Vk1_1,
    Vk1_2,
}

impl Api {
    pub fn is_dx12(self) -> bool {
        matches!(self, Api::Dx12_0 | Api::Dx12_1)
    }

    pub fn is_vk(self) -> bool {
        matches!(self, Api::Vk1_1 | Api::Vk1_2)
    }

    pub fn name(self) -> &'static str {
        match self {
            Api::Dx12_0 => "Direct3D 12.0",
            Api::Dx12_1 => "Direct3D 12.1",
            Api::Vk1_1 => "Vulkan 1.1",
            Api::Vk1_2 => "Vulkan 1.2",
        }
    }
}

/// Queue/command-list category. Barrier state tables depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandType {
    #[default]
    Undefined,
    Graphics,
    Compute,
    Transfer,
    Presentation,
}

/// API-agnostic resource state, tracked by the caller and passed explicitly to every barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    #[default]
    Undefined,
    General,
    ConstantBuffer,
    VertexBuffer,
    IndexBuffer,
    RenderTarget,
    UnorderedAccess,
    DepthStencilRead,
    DepthStencilWrite,
    DepthWriteStencilRead,
    DepthReadStencilWrite,
    NonPixelShaderResource,
    PixelShaderResource,
    ShaderResource,
    StreamOut,
    IndirectArgument,
    CopySrc,
    CopyDst,
    ResolveSrc,
    ResolveDst,
    Present,
    Predication,
}

impl ResourceState {
    pub const ALL: [ResourceState; 22] = [
        ResourceState::Undefined,
        ResourceState::General,
        ResourceState::ConstantBuffer,
        ResourceState::VertexBuffer,
        ResourceState::IndexBuffer,
        ResourceState::RenderTarget,
        ResourceState::UnorderedAccess,
        ResourceState::DepthStencilRead,
        ResourceState::DepthStencilWrite,
        ResourceState::DepthWriteStencilRead,
        ResourceState::DepthReadStencilWrite,
        ResourceState::NonPixelShaderResource,
        ResourceState::PixelShaderResource,
        ResourceState::ShaderResource,
        ResourceState::StreamOut,
        ResourceState::IndirectArgument,
        ResourceState::CopySrc,
        ResourceState::CopyDst,
        ResourceState::ResolveSrc,
        ResourceState::ResolveDst,
        ResourceState::Present,
        ResourceState::Predication,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DescriptorType {
    #[default]
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    RawStorageBuffer,
    RoStructuredBuffer,
    RwStructuredBuffer,
    UniformBufferDynamic,
    StorageBufferDynamic,
    InputAttachment,
}

impl DescriptorType {
    /// Types with no D3D12 equivalent in the descriptor-table model.
    pub fn is_dx12_unsupported(self) -> bool {
        matches!(
            self,
            DescriptorType::CombinedImageSampler
                | DescriptorType::UniformBufferDynamic
                | DescriptorType::StorageBufferDynamic
                | DescriptorType::InputAttachment
        )
    }

    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            DescriptorType::UniformTexelBuffer
                | DescriptorType::StorageTexelBuffer
                | DescriptorType::UniformBuffer
                | DescriptorType::RawStorageBuffer
                | DescriptorType::RoStructuredBuffer
                | DescriptorType::RwStructuredBuffer
                | DescriptorType::UniformBufferDynamic
                | DescriptorType::StorageBufferDynamic
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryUsage {
    #[default]
    GpuOnly,
    CpuOnly,
    CpuToGpu,
    GpuToCpu,
}

impl MemoryUsage {
    pub fn is_host_visible(self) -> bool {
        !matches!(self, MemoryUsage::GpuOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageType {
    D1,
    #[default]
    D2,
    D3,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageViewType {
    D1,
    D1Array,
    #[default]
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleCount {
    #[default]
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl SampleCount {
    pub fn count(self) -> u32 {
        match self {
            SampleCount::X1 => 1,
            SampleCount::X2 => 2,
            SampleCount::X4 => 4,
            SampleCount::X8 => 8,
            SampleCount::X16 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerMipmapMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerAddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderColor {
    #[default]
    FloatTransparentBlack,
    FloatOpaqueBlack,
    FloatOpaqueWhite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareOp {
    #[default]
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    #[default]
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
    Src1Color,
    OneMinusSrc1Color,
    Src1Alpha,
    OneMinusSrc1Alpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogicOp {
    Clear,
    And,
    AndReverse,
    Copy,
    AndInverted,
    #[default]
    NoOp,
    Xor,
    Or,
    Nor,
    Equivalent,
    Invert,
    OrReverse,
    CopyInverted,
    OrInverted,
    Nand,
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
    PatchList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    #[default]
    Uint16,
    Uint32,
}

impl IndexType {
    pub fn size(self) -> u32 {
        match self {
            IndexType::Uint16 => 2,
            IndexType::Uint32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexInputRate {
    #[default]
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentLoadOp {
    #[default]
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentStoreOp {
    #[default]
    Store,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    Fifo,
    FifoRelaxed,
    Mailbox,
    #[default]
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryType {
    #[default]
    Occlusion,
    PipelineStatistics,
    Timestamp,
}

/// Pipeline stage a timestamp is written after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineStage {
    TopOfPipe,
    #[default]
    BottomOfPipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineBindPoint {
    #[default]
    Graphics,
    Compute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SemaphoreType {
    #[default]
    Binary,
    Timeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height, min_depth: 0.0, max_depth: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderTargetClearValue {
    pub rgba: [f32; 4],
}

impl RenderTargetClearValue {
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { rgba: [r, g, b, a] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilClearValue {
    pub depth: f32,
    pub stencil: u32,
}

impl Default for DepthStencilClearValue {
    fn default() -> Self {
        Self { depth: 1.0, stencil: 0xFF }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_families() {
        assert!(Api::Dx12_1.is_dx12());
        assert!(!Api::Dx12_0.is_vk());
        assert!(Api::Vk1_2.is_vk());
    }

    #[test]
    fn visibility_all_covers_compute() {
        assert!(ShaderStageFlags::ALL.contains(ShaderStageFlags::CS));
        assert!(!ShaderStageFlags::ALL_GRAPHICS.contains(ShaderStageFlags::CS));
        assert_eq!(ShaderStageFlags::default(), ShaderStageFlags::ALL);
    }

    #[test]
    fn unsupported_dx12_descriptor_types() {
        assert!(DescriptorType::CombinedImageSampler.is_dx12_unsupported());
        assert!(DescriptorType::InputAttachment.is_dx12_unsupported());
        assert!(!DescriptorType::RawStorageBuffer.is_dx12_unsupported());
    }
}
