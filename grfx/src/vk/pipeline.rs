//! Shader modules, pipeline layouts and pipelines.

use std::any::Any;
use std::ffi::CString;
use std::io::Cursor;
use std::sync::Arc;

use ash::vk;

use super::descriptor::{native_set_layout, SetLayout};
use super::render_pass::{create_render_pass, render_pass_desc, ColorAttachment, DepthStencilAttachment};
use super::util::{self, vk_error};
use super::DeviceShared;
use crate::backend::{PipelineApi, PipelineInterfaceApi, ShaderModuleApi};
use crate::descriptor::DescriptorSetLayout;
use crate::error::{GrfxError, Result};
use crate::format::Format;
use crate::pipeline::{
    ComputePipelineDesc, GraphicsPipelineDesc, PipelineInterface, PipelineInterfaceCreateInfo, ResolvedStage,
    ShaderModuleCreateInfo, StencilOpState,
};
use crate::types::{AttachmentLoadOp, AttachmentStoreOp};

/// SPIR-V words from bytecode. Checks length and the magic number.
fn spirv_words(code: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(code)).map_err(|e| {
        log::error!("shader bytecode is not SPIR-V: {}", e);
        GrfxError::ApiFailure
    })
}

#[derive(Debug)]
pub struct VulkanShaderModule {
    shared: Arc<DeviceShared>,
    module: vk::ShaderModule,
}

impl VulkanShaderModule {
    pub fn new(shared: &Arc<DeviceShared>, info: &ShaderModuleCreateInfo) -> Result<Self> {
        let words = spirv_words(&info.code)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { shared.raw.create_shader_module(&create_info, None) }
            .map_err(|r| vk_error(r, "vkCreateShaderModule"))?;
        Ok(Self { shared: Arc::clone(shared), module })
    }

    pub fn native(&self) -> vk::ShaderModule {
        self.module
    }
}

impl ShaderModuleApi for VulkanShaderModule {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanShaderModule {
    fn drop(&mut self) {
        unsafe { self.shared.raw.destroy_shader_module(self.module, None) };
    }
}

/// Module, stage and owned entry point name of one pipeline stage.
struct StageSource {
    stage: vk::ShaderStageFlags,
    module: vk::ShaderModule,
    entry_point: CString,
}

impl StageSource {
    fn new(stage: &ResolvedStage<'_>) -> Result<Self> {
        let module = stage
            .module
            .api()
            .as_any()
            .downcast_ref::<VulkanShaderModule>()
            .ok_or(GrfxError::UnsupportedApi)?;
        let entry_point = CString::new(stage.entry_point).map_err(|_| {
            log::error!("entry point {:?} contains a nul byte", stage.entry_point);
            GrfxError::InvalidCreateArgument
        })?;
        Ok(Self { stage: util::shader_stages_to_vk(stage.stage), module: module.native(), entry_point })
    }

    fn info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default().stage(self.stage).module(self.module).name(&self.entry_point)
    }
}

/// A VkPipelineLayout with the set layouts and push constant ranges it was built from.
#[derive(Debug)]
pub struct PipelineLayout {
    shared: Arc<DeviceShared>,
    handle: vk::PipelineLayout,
    set_layouts: Vec<Arc<SetLayout>>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl PipelineLayout {
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    pub fn set_layouts(&self) -> &[Arc<SetLayout>] {
        &self.set_layouts
    }

    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.push_constant_ranges
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.shared.raw.destroy_pipeline_layout(self.handle, None) };
    }
}

/// Set layouts indexed by set number. `None` marks a gap that needs an empty layout.
fn layout_slots(info: &PipelineInterfaceCreateInfo, layouts: &[&DescriptorSetLayout]) -> Result<Vec<Option<Arc<SetLayout>>>> {
    let set_count = info.sets.iter().map(|s| s.set + 1).max().unwrap_or(0);
    let mut slots: Vec<Option<Arc<SetLayout>>> = vec![None; set_count as usize];
    for (set_info, layout) in info.sets.iter().zip(layouts) {
        slots[set_info.set as usize] = Some(Arc::clone(native_set_layout(layout)?));
    }
    Ok(slots)
}

/// Push constants are 32-bit values; the range starts at zero.
fn push_constant_ranges(info: &PipelineInterfaceCreateInfo) -> Vec<vk::PushConstantRange> {
    let push = &info.push_constants;
    if push.count == 0 {
        return Vec::new();
    }
    vec![vk::PushConstantRange {
        stage_flags: util::shader_stages_to_vk(push.shader_visibility),
        offset: 0,
        size: push.count * 4,
    }]
}

/// The pipeline layout. Set numbers index the layout directly, so gaps get empty set layouts.
#[derive(Debug)]
pub struct VulkanPipelineInterface {
    layout: PipelineLayout,
    push_constant_stages: vk::ShaderStageFlags,
}

impl VulkanPipelineInterface {
    pub fn new(
        shared: &Arc<DeviceShared>,
        info: &PipelineInterfaceCreateInfo,
        layouts: &[&DescriptorSetLayout],
    ) -> Result<Self> {
        let set_layouts = layout_slots(info, layouts)?
            .into_iter()
            .map(|slot| match slot {
                Some(layout) => Ok(layout),
                None => SetLayout::new(shared, Vec::new(), false).map(Arc::new),
            })
            .collect::<Result<Vec<_>>>()?;
        let ranges = push_constant_ranges(info);

        let handles: Vec<_> = set_layouts.iter().map(|layout| layout.handle()).collect();
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&handles).push_constant_ranges(&ranges);
        let handle = unsafe { shared.raw.create_pipeline_layout(&create_info, None) }
            .map_err(|r| vk_error(r, "vkCreatePipelineLayout"))?;
        log::debug!(
            "pipeline layout with {} sets and {} push constant bytes created",
            set_layouts.len(),
            info.push_constants.count * 4
        );
        Ok(Self {
            layout: PipelineLayout { shared: Arc::clone(shared), handle, set_layouts, push_constant_ranges: ranges },
            push_constant_stages: util::shader_stages_to_vk(info.push_constants.shader_visibility),
        })
    }

    pub fn native(&self) -> &PipelineLayout {
        &self.layout
    }

    pub fn push_constant_stages(&self) -> vk::ShaderStageFlags {
        self.push_constant_stages
    }
}

impl PipelineInterfaceApi for VulkanPipelineInterface {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn interface_of(interface: &PipelineInterface) -> Result<&VulkanPipelineInterface> {
    interface.api().as_any().downcast_ref::<VulkanPipelineInterface>().ok_or(GrfxError::UnsupportedApi)
}

fn stencil_face(state: &StencilOpState) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: util::stencil_op_to_vk(state.fail_op),
        pass_op: util::stencil_op_to_vk(state.pass_op),
        depth_fail_op: util::stencil_op_to_vk(state.depth_fail_op),
        compare_op: util::compare_op_to_vk(state.compare_op),
        compare_mask: state.compare_mask,
        write_mask: state.write_mask,
        reference: state.reference,
    }
}

/// Attachments of the compatible render pass a graphics pipeline is created against.
fn output_attachments(
    render_target_formats: &[Format],
    depth_stencil_format: Format,
) -> Result<(Vec<ColorAttachment>, Option<DepthStencilAttachment>)> {
    let colors = render_target_formats
        .iter()
        .map(|format| match util::format_to_vk(*format) {
            vk::Format::UNDEFINED => {
                log::error!("render target format {:?} has no Vulkan equivalent", format);
                Err(GrfxError::InvalidCreateArgument)
            }
            format => Ok(ColorAttachment { format, load_op: AttachmentLoadOp::Load, store_op: AttachmentStoreOp::Store }),
        })
        .collect::<Result<Vec<_>>>()?;
    let depth = (depth_stencil_format != Format::Undefined).then(|| DepthStencilAttachment {
        format: util::format_to_vk(depth_stencil_format),
        depth_load_op: AttachmentLoadOp::Load,
        depth_store_op: AttachmentStoreOp::Store,
        stencil_load_op: AttachmentLoadOp::Load,
        stencil_store_op: AttachmentStoreOp::Store,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    });
    Ok((colors, depth))
}

#[derive(Debug)]
pub struct VulkanPipeline {
    shared: Arc<DeviceShared>,
    pipeline: vk::Pipeline,
}

impl VulkanPipeline {
    /// The render pass is a compatible one built from the output formats; it is destroyed once
    /// the pipeline exists.
    pub fn graphics(shared: &Arc<DeviceShared>, desc: &GraphicsPipelineDesc<'_>) -> Result<Self> {
        let info = desc.info;
        let interface = interface_of(desc.interface)?;
        let sources = desc.stages.iter().map(StageSource::new).collect::<Result<Vec<_>>>()?;
        let stages: Vec<_> = sources.iter().map(StageSource::info).collect();

        let vertex_bindings: Vec<_> = info
            .vertex_bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: util::input_rate_to_vk(b.input_rate),
            })
            .collect();
        let vertex_attributes: Vec<_> = info
            .vertex_bindings
            .iter()
            .flat_map(|b| b.attributes.iter())
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: util::format_to_vk(a.format),
                offset: a.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(util::topology_to_vk(info.input_assembly.topology))
            .primitive_restart_enable(info.input_assembly.primitive_restart_enable);
        let tessellation = vk::PipelineTessellationStateCreateInfo::default()
            .patch_control_points(info.tessellation.patch_control_points);
        // Viewports and scissors are dynamic; only their counts are baked.
        let viewport = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

        let raster = &info.raster;
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(raster.depth_clamp_enable)
            .rasterizer_discard_enable(raster.rasterize_discard_enable)
            .polygon_mode(util::polygon_mode_to_vk(raster.polygon_mode))
            .cull_mode(util::cull_mode_to_vk(raster.cull_mode))
            .front_face(util::front_face_to_vk(raster.front_face))
            .depth_bias_enable(raster.depth_bias_enable)
            .depth_bias_constant_factor(raster.depth_bias_constant_factor)
            .depth_bias_clamp(raster.depth_bias_clamp)
            .depth_bias_slope_factor(raster.depth_bias_slope_factor)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .alpha_to_coverage_enable(info.multisample.alpha_to_coverage_enable);

        let ds = &info.depth_stencil;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(ds.depth_test_enable)
            .depth_write_enable(ds.depth_write_enable)
            .depth_compare_op(util::compare_op_to_vk(ds.depth_compare_op))
            .depth_bounds_test_enable(ds.depth_bounds_test_enable)
            .stencil_test_enable(ds.stencil_test_enable)
            .front(stencil_face(&ds.front))
            .back(stencil_face(&ds.back))
            .min_depth_bounds(ds.min_depth_bounds)
            .max_depth_bounds(ds.max_depth_bounds);

        let output = &info.output;
        let blend_attachments: Vec<_> = (0..output.render_target_formats.len())
            .map(|i| {
                let a = info.blend_attachment(i);
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(a.blend_enable)
                    .src_color_blend_factor(util::blend_factor_to_vk(a.src_color_blend_factor))
                    .dst_color_blend_factor(util::blend_factor_to_vk(a.dst_color_blend_factor))
                    .color_blend_op(util::blend_op_to_vk(a.color_blend_op))
                    .src_alpha_blend_factor(util::blend_factor_to_vk(a.src_alpha_blend_factor))
                    .dst_alpha_blend_factor(util::blend_factor_to_vk(a.dst_alpha_blend_factor))
                    .alpha_blend_op(util::blend_op_to_vk(a.alpha_blend_op))
                    .color_write_mask(util::color_write_mask_to_vk(a.color_write_mask))
            })
            .collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(info.color_blend.logic_op_enable)
            .logic_op(util::logic_op_to_vk(info.color_blend.logic_op))
            .attachments(&blend_attachments)
            .blend_constants(info.color_blend.blend_constants);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let (colors, depth) = output_attachments(&output.render_target_formats, output.depth_stencil_format)?;
        let render_pass = create_render_pass(shared, &render_pass_desc(&colors, depth))?;

        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(interface.native().handle())
            .render_pass(render_pass)
            .subpass(0);
        if info.tessellation.patch_control_points > 0 {
            create_info = create_info.tessellation_state(&tessellation);
        }
        let result = unsafe { shared.raw.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None) };
        unsafe { shared.raw.destroy_render_pass(render_pass, None) };
        let pipeline = result.map_err(|(_, r)| vk_error(r, "vkCreateGraphicsPipelines"))?;
        let pipeline = pipeline.into_iter().next().ok_or(GrfxError::ApiFailure)?;
        Ok(Self { shared: Arc::clone(shared), pipeline })
    }

    pub fn compute(shared: &Arc<DeviceShared>, desc: &ComputePipelineDesc<'_>) -> Result<Self> {
        let interface = interface_of(desc.interface)?;
        let source = StageSource::new(&desc.cs)?;
        let create_info =
            vk::ComputePipelineCreateInfo::default().stage(source.info()).layout(interface.native().handle());
        let pipeline = unsafe { shared.raw.create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None) }
            .map_err(|(_, r)| vk_error(r, "vkCreateComputePipelines"))?;
        let pipeline = pipeline.into_iter().next().ok_or(GrfxError::ApiFailure)?;
        Ok(Self { shared: Arc::clone(shared), pipeline })
    }

    pub fn native(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl PipelineApi for VulkanPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe { self.shared.raw.destroy_pipeline(self.pipeline, None) };
    }
}

pub(crate) fn native_pipeline(api: &dyn PipelineApi) -> Result<vk::Pipeline> {
    api.as_any().downcast_ref::<VulkanPipeline>().map(VulkanPipeline::native).ok_or(GrfxError::UnsupportedApi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCreateInfo;
    use crate::descriptor::{DescriptorBinding, DescriptorSetLayoutCreateInfo};
    use crate::pipeline::{PushConstantsInfo, SetLayoutInfo};
    use crate::types::{DescriptorType, ShaderStageFlags};
    use crate::vk::descriptor::VulkanDescriptorSetLayout;
    use crate::vk::testing;
    use crate::DescriptorSetLayoutHandle;

    fn layout(shared: &Arc<DeviceShared>, bindings: Vec<DescriptorBinding>) -> DescriptorSetLayout {
        let info = DescriptorSetLayoutCreateInfo::new(bindings);
        let api = VulkanDescriptorSetLayout::new(shared, &info).unwrap();
        DescriptorSetLayout::new(info, Box::new(api))
    }

    #[test]
    fn push_constants_become_one_byte_range() {
        let info = PipelineInterfaceCreateInfo {
            sets: Vec::new(),
            push_constants: PushConstantsInfo { count: 6, binding: 1, set: 0, shader_visibility: ShaderStageFlags::PS },
        };
        let ranges = push_constant_ranges(&info);
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].offset, ranges[0].size), (0, 24));
        assert_eq!(ranges[0].stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert!(push_constant_ranges(&PipelineInterfaceCreateInfo::default()).is_empty());
    }

    #[test]
    fn shader_modules_reject_non_spirv() {
        assert_eq!(spirv_words(&[0xDE, 0xAD, 0xBE, 0xEF]).err(), Some(GrfxError::ApiFailure));
        assert_eq!(spirv_words(&[0x03, 0x02, 0x23]).err(), Some(GrfxError::ApiFailure));
        let mut code = 0x0723_0203u32.to_le_bytes().to_vec();
        code.extend_from_slice(&[0; 16]);
        assert_eq!(spirv_words(&code).unwrap().len(), 5);
    }

    #[test]
    fn render_target_formats_shape_the_compatible_pass() {
        let (colors, depth) = output_attachments(&[Format::B8G8R8A8Unorm], Format::D32Float).unwrap();
        assert_eq!(colors[0].format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(depth.map(|d| d.format), Some(vk::Format::D32_SFLOAT));
        assert!(output_attachments(&[Format::Undefined], Format::Undefined).is_err());
    }

    #[test]
    fn set_number_gaps_get_empty_layouts() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let set2 = layout(&shared, vec![DescriptorBinding::new(0, DescriptorType::SampledImage)]);
        let info = PipelineInterfaceCreateInfo {
            sets: vec![SetLayoutInfo { set: 2, layout: DescriptorSetLayoutHandle::default() }],
            ..Default::default()
        };
        assert_eq!(layout_slots(&info, &[&set2]).unwrap().iter().filter(|s| s.is_none()).count(), 2);

        let interface = VulkanPipelineInterface::new(&shared, &info, &[&set2]).unwrap();
        let set_layouts = interface.native().set_layouts();
        assert_eq!(set_layouts.len(), 3);
        assert!(set_layouts[0].bindings().is_empty());
        assert!(set_layouts[1].bindings().is_empty());
        assert_eq!(set_layouts[2].bindings().len(), 1);
        assert!(interface.native().push_constant_ranges().is_empty());
    }
}
