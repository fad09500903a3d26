//! Shader modules, pipeline interfaces and graphics/compute pipelines.

use crate::backend::{PipelineApi, PipelineInterfaceApi, ShaderModuleApi};
use crate::descriptor::DescriptorSetLayout;
use crate::error::{GrfxError, Result};
use crate::format::Format;
use crate::types::{
    BlendFactor, BlendOp, ColorComponentFlags, CompareOp, CullMode, FrontFace, LogicOp, PolygonMode,
    PrimitiveTopology, ShaderStageFlags, StencilOp, VertexInputRate,
};
use crate::{
    DescriptorSetLayoutHandle, PipelineInterfaceHandle, ShaderModuleHandle, MAX_BOUND_DESCRIPTOR_SETS,
    MAX_PUSH_CONSTANTS, MAX_RENDER_TARGETS, MAX_VERTEX_BINDINGS, VALUE_IGNORED,
};

/// Precompiled bytecode: DXIL/DXBC for D3D12, SPIR-V for Vulkan.
#[derive(Debug, Clone, Default)]
pub struct ShaderModuleCreateInfo {
    pub code: Vec<u8>,
}

#[derive(Debug)]
pub struct ShaderModule {
    create_info: ShaderModuleCreateInfo,
    api: Box<dyn ShaderModuleApi>,
}

impl ShaderModule {
    pub(crate) fn new(create_info: ShaderModuleCreateInfo, api: Box<dyn ShaderModuleApi>) -> Self {
        Self { create_info, api }
    }

    pub fn code(&self) -> &[u8] {
        &self.create_info.code
    }

    pub fn api(&self) -> &dyn ShaderModuleApi {
        self.api.as_ref()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetLayoutInfo {
    pub set: u32,
    pub layout: DescriptorSetLayoutHandle,
}

/// Root/push constants, counted in DWORDs. `count == 0` disables them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantsInfo {
    pub count: u32,
    pub binding: u32,
    pub set: u32,
    pub shader_visibility: ShaderStageFlags,
}

impl Default for PushConstantsInfo {
    fn default() -> Self {
        Self { count: 0, binding: VALUE_IGNORED, set: VALUE_IGNORED, shader_visibility: ShaderStageFlags::ALL }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineInterfaceCreateInfo {
    pub sets: Vec<SetLayoutInfo>,
    pub push_constants: PushConstantsInfo,
}

impl PipelineInterfaceCreateInfo {
    /// Checks set limits, set uniqueness and push-constant placement. `layouts` parallels `sets`.
    pub(crate) fn validate(&self, layouts: &[&DescriptorSetLayout]) -> Result<()> {
        if self.sets.len() > MAX_BOUND_DESCRIPTOR_SETS {
            log::error!("set count {} exceeds {}", self.sets.len(), MAX_BOUND_DESCRIPTOR_SETS);
            return Err(GrfxError::LimitExceeded);
        }
        let mut sorted: Vec<u32> = self.sets.iter().map(|s| s.set).collect();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            log::error!("set numbers are not unique: {:?}", sorted);
            return Err(GrfxError::NonUniqueSet);
        }

        let push = &self.push_constants;
        if push.count == 0 {
            return Ok(());
        }
        if push.count > MAX_PUSH_CONSTANTS {
            log::error!("push constants count ({}) exceeds {}", push.count, MAX_PUSH_CONSTANTS);
            return Err(GrfxError::LimitExceeded);
        }
        if push.binding == VALUE_IGNORED {
            return Err(GrfxError::InvalidBindingNumber);
        }
        if push.set == VALUE_IGNORED {
            return Err(GrfxError::InvalidSetNumber);
        }
        for (info, layout) in self.sets.iter().zip(layouts) {
            if info.set == push.set && layout.binding(push.binding).is_some() {
                log::error!("push constants binding {} collides with a binding in set {}", push.binding, info.set);
                return Err(GrfxError::InvalidCreateArgument);
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct PipelineInterface {
    create_info: PipelineInterfaceCreateInfo,
    set_numbers: Vec<u32>,
    has_consecutive_set_numbers: bool,
    api: Box<dyn PipelineInterfaceApi>,
}

impl PipelineInterface {
    pub(crate) fn new(create_info: PipelineInterfaceCreateInfo, api: Box<dyn PipelineInterfaceApi>) -> Self {
        let set_numbers: Vec<u32> = create_info.sets.iter().map(|s| s.set).collect();
        let mut sorted = set_numbers.clone();
        sorted.sort_unstable();
        let has_consecutive_set_numbers = sorted.windows(2).all(|w| w[1] == w[0] + 1);
        Self { create_info, set_numbers, has_consecutive_set_numbers, api }
    }

    pub fn create_info(&self) -> &PipelineInterfaceCreateInfo {
        &self.create_info
    }

    /// Set numbers in declared order.
    pub fn set_numbers(&self) -> &[u32] {
        &self.set_numbers
    }

    pub fn has_consecutive_set_numbers(&self) -> bool {
        self.has_consecutive_set_numbers
    }

    pub fn set_layout(&self, set: u32) -> Option<DescriptorSetLayoutHandle> {
        self.create_info.sets.iter().find(|s| s.set == set).map(|s| s.layout)
    }

    pub fn push_constants(&self) -> &PushConstantsInfo {
        &self.create_info.push_constants
    }

    pub fn api(&self) -> &dyn PipelineInterfaceApi {
        self.api.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct ShaderStageInfo {
    pub module: ShaderModuleHandle,
    pub entry_point: String,
}

impl ShaderStageInfo {
    pub fn new(module: ShaderModuleHandle, entry_point: &str) -> Self {
        Self { module, entry_point: entry_point.to_string() }
    }
}

#[derive(Debug, Clone)]
pub struct VertexAttribute {
    /// HLSL semantic used by the D3D12 input layout.
    pub semantic_name: String,
    pub location: u32,
    pub format: Format,
    pub binding: u32,
    pub offset: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Debug, Clone, Default)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexBinding {
    pub fn new(binding: u32, input_rate: VertexInputRate) -> Self {
        Self { binding, stride: 0, input_rate, attributes: Vec::new() }
    }

    /// Appends an attribute packed after the previous one; the stride grows to match.
    pub fn push_attribute(&mut self, semantic_name: &str, location: u32, format: Format) {
        let offset = self.stride;
        self.attributes.push(VertexAttribute {
            semantic_name: semantic_name.to_string(),
            location,
            format,
            binding: self.binding,
            offset,
            input_rate: self.input_rate,
        });
        self.stride += format.bytes_per_texel();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputAssemblyState {
    pub topology: PrimitiveTopology,
    pub primitive_restart_enable: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TessellationState {
    pub patch_control_points: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RasterState {
    pub depth_clamp_enable: bool,
    pub rasterize_discard_enable: bool,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MultisampleState {
    pub alpha_to_coverage_enable: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilOpState {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Never,
            compare_mask: 0xFF,
            write_mask: 0xFF,
            reference: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
    pub depth_bounds_test_enable: bool,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
    pub stencil_test_enable: bool,
    pub front: StencilOpState,
    pub back: StencilOpState,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,
            depth_bounds_test_enable: false,
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
            stencil_test_enable: false,
            front: StencilOpState::default(),
            back: StencilOpState::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendAttachmentState {
    pub blend_enable: bool,
    pub src_color_blend_factor: BlendFactor,
    pub dst_color_blend_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_blend_factor: BlendFactor,
    pub dst_alpha_blend_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: ColorComponentFlags,
}

impl Default for BlendAttachmentState {
    fn default() -> Self {
        Self::blend_mode_none()
    }
}

impl BlendAttachmentState {
    fn enabled(src_color: BlendFactor, dst_color: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor) -> Self {
        Self {
            blend_enable: true,
            src_color_blend_factor: src_color,
            dst_color_blend_factor: dst_color,
            color_blend_op: BlendOp::Add,
            src_alpha_blend_factor: src_alpha,
            dst_alpha_blend_factor: dst_alpha,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: ColorComponentFlags::RGBA,
        }
    }

    pub fn blend_mode_none() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: BlendFactor::One,
            dst_color_blend_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_blend_factor: BlendFactor::One,
            dst_alpha_blend_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: ColorComponentFlags::RGBA,
        }
    }

    pub fn blend_mode_additive() -> Self {
        Self::enabled(BlendFactor::SrcAlpha, BlendFactor::One, BlendFactor::SrcAlpha, BlendFactor::One)
    }

    pub fn blend_mode_alpha() -> Self {
        Self::enabled(
            BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha,
            BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha,
        )
    }

    pub fn blend_mode_under() -> Self {
        Self::enabled(BlendFactor::DstAlpha, BlendFactor::One, BlendFactor::Zero, BlendFactor::OneMinusSrcAlpha)
    }

    pub fn blend_mode_premult_alpha() -> Self {
        Self::enabled(BlendFactor::One, BlendFactor::OneMinusSrcAlpha, BlendFactor::One, BlendFactor::OneMinusSrcAlpha)
    }

    pub fn blend_mode_disable_output() -> Self {
        Self { color_write_mask: ColorComponentFlags::empty(), ..Self::blend_mode_none() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ColorBlendState {
    pub logic_op_enable: bool,
    pub logic_op: LogicOp,
    pub blend_constants: [f32; 4],
    /// One entry per render target; missing entries use `blend_mode_none`.
    pub blend_attachments: Vec<BlendAttachmentState>,
}

#[derive(Debug, Clone, Default)]
pub struct OutputState {
    pub render_target_formats: Vec<Format>,
    pub depth_stencil_format: Format,
}

#[derive(Debug, Clone, Default)]
pub struct GraphicsPipelineCreateInfo {
    pub vs: Option<ShaderStageInfo>,
    pub hs: Option<ShaderStageInfo>,
    pub ds: Option<ShaderStageInfo>,
    pub gs: Option<ShaderStageInfo>,
    pub ps: Option<ShaderStageInfo>,
    pub vertex_bindings: Vec<VertexBinding>,
    pub input_assembly: InputAssemblyState,
    pub tessellation: TessellationState,
    pub raster: RasterState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,
    pub color_blend: ColorBlendState,
    pub output: OutputState,
    pub pipeline_interface: Option<PipelineInterfaceHandle>,
}

impl GraphicsPipelineCreateInfo {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.pipeline_interface.is_none() {
            return Err(GrfxError::UnexpectedNullArgument);
        }
        if self.vs.is_none() {
            return Err(GrfxError::UnexpectedNullArgument);
        }
        if self.vertex_bindings.len() > MAX_VERTEX_BINDINGS {
            return Err(GrfxError::LimitExceeded);
        }
        if self.output.render_target_formats.len() > MAX_RENDER_TARGETS
            || self.color_blend.blend_attachments.len() > MAX_RENDER_TARGETS
        {
            return Err(GrfxError::LimitExceeded);
        }
        Ok(())
    }

    pub fn blend_attachment(&self, index: usize) -> BlendAttachmentState {
        self.color_blend.blend_attachments.get(index).copied().unwrap_or_default()
    }

    pub(crate) fn stages(&self) -> [(ShaderStageFlags, Option<&ShaderStageInfo>); 5] {
        [
            (ShaderStageFlags::VS, self.vs.as_ref()),
            (ShaderStageFlags::HS, self.hs.as_ref()),
            (ShaderStageFlags::DS, self.ds.as_ref()),
            (ShaderStageFlags::GS, self.gs.as_ref()),
            (ShaderStageFlags::PS, self.ps.as_ref()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct ComputePipelineCreateInfo {
    pub cs: ShaderStageInfo,
    pub pipeline_interface: Option<PipelineInterfaceHandle>,
}

/// Shader module of one stage, looked up for a backend.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedStage<'a> {
    pub stage: ShaderStageFlags,
    pub module: &'a ShaderModule,
    pub entry_point: &'a str,
}

#[derive(Debug)]
pub struct GraphicsPipelineDesc<'a> {
    pub info: &'a GraphicsPipelineCreateInfo,
    pub stages: Vec<ResolvedStage<'a>>,
    pub interface: &'a PipelineInterface,
}

#[derive(Debug)]
pub struct ComputePipelineDesc<'a> {
    pub info: &'a ComputePipelineCreateInfo,
    pub cs: ResolvedStage<'a>,
    pub interface: &'a PipelineInterface,
}

#[derive(Debug)]
pub struct GraphicsPipeline {
    create_info: GraphicsPipelineCreateInfo,
    interface: PipelineInterfaceHandle,
    api: Box<dyn PipelineApi>,
}

impl GraphicsPipeline {
    pub(crate) fn new(
        create_info: GraphicsPipelineCreateInfo,
        interface: PipelineInterfaceHandle,
        api: Box<dyn PipelineApi>,
    ) -> Self {
        Self { create_info, interface, api }
    }

    pub fn create_info(&self) -> &GraphicsPipelineCreateInfo {
        &self.create_info
    }

    pub fn pipeline_interface(&self) -> PipelineInterfaceHandle {
        self.interface
    }

    pub fn api(&self) -> &dyn PipelineApi {
        self.api.as_ref()
    }
}

#[derive(Debug)]
pub struct ComputePipeline {
    create_info: ComputePipelineCreateInfo,
    interface: PipelineInterfaceHandle,
    api: Box<dyn PipelineApi>,
}

impl ComputePipeline {
    pub(crate) fn new(
        create_info: ComputePipelineCreateInfo,
        interface: PipelineInterfaceHandle,
        api: Box<dyn PipelineApi>,
    ) -> Self {
        Self { create_info, interface, api }
    }

    pub fn create_info(&self) -> &ComputePipelineCreateInfo {
        &self.create_info
    }

    pub fn pipeline_interface(&self) -> PipelineInterfaceHandle {
        self.interface
    }

    pub fn api(&self) -> &dyn PipelineApi {
        self.api.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorBinding, DescriptorSetLayoutCreateInfo};
    use crate::types::DescriptorType;
    use slotmap::SlotMap;

    #[derive(Debug)]
    struct NullLayout;

    impl crate::backend::DescriptorSetLayoutApi for NullLayout {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn layout(bindings: Vec<DescriptorBinding>) -> DescriptorSetLayout {
        DescriptorSetLayout::new(DescriptorSetLayoutCreateInfo::new(bindings), Box::new(NullLayout))
    }

    fn handles(n: usize) -> Vec<DescriptorSetLayoutHandle> {
        let mut map: SlotMap<DescriptorSetLayoutHandle, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn duplicate_set_numbers_are_rejected() {
        let h = handles(2);
        let l = layout(vec![DescriptorBinding::new(0, DescriptorType::UniformBuffer)]);
        let info = PipelineInterfaceCreateInfo {
            sets: vec![SetLayoutInfo { set: 1, layout: h[0] }, SetLayoutInfo { set: 1, layout: h[1] }],
            ..Default::default()
        };
        assert_eq!(info.validate(&[&l, &l]), Err(GrfxError::NonUniqueSet));
    }

    #[test]
    fn push_constant_checks() {
        let h = handles(1);
        let l = layout(vec![DescriptorBinding::new(0, DescriptorType::UniformBuffer)]);
        let mut info = PipelineInterfaceCreateInfo {
            sets: vec![SetLayoutInfo { set: 0, layout: h[0] }],
            push_constants: PushConstantsInfo { count: 33, binding: 1, set: 0, ..Default::default() },
        };
        assert_eq!(info.validate(&[&l]), Err(GrfxError::LimitExceeded));
        info.push_constants.count = 4;
        info.push_constants.binding = VALUE_IGNORED;
        assert_eq!(info.validate(&[&l]), Err(GrfxError::InvalidBindingNumber));
        info.push_constants.binding = 1;
        info.push_constants.set = VALUE_IGNORED;
        assert_eq!(info.validate(&[&l]), Err(GrfxError::InvalidSetNumber));
        info.push_constants.set = 0;
        assert!(info.validate(&[&l]).is_ok());
        info.push_constants.binding = 0;
        assert_eq!(info.validate(&[&l]), Err(GrfxError::InvalidCreateArgument));
    }

    #[test]
    fn vertex_binding_packs_attributes() {
        let mut binding = VertexBinding::new(0, VertexInputRate::Vertex);
        binding.push_attribute("POSITION", 0, Format::R32G32B32Float);
        binding.push_attribute("TEXCOORD", 1, Format::R32G32Float);
        assert_eq!(binding.stride, 20);
        assert_eq!(binding.attributes[1].offset, 12);
    }

    #[test]
    fn missing_interface_is_a_null_argument() {
        let info = GraphicsPipelineCreateInfo::default();
        assert_eq!(info.validate(), Err(GrfxError::UnexpectedNullArgument));
    }
}
