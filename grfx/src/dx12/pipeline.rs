//! Shader modules, root signatures and pipeline state objects.

use std::any::Any;
use std::ffi::CString;
use std::sync::Arc;

use windows::core::PCSTR;
use windows::Win32::Graphics::Direct3D::ID3DBlob;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC};

use super::layout::{RootParameterKind, RootSignatureLayout, RootSlotKind};
use super::util::{self, hresult_error, Sendable};
use super::DeviceShared;
use crate::backend::{PipelineApi, PipelineInterfaceApi, ShaderModuleApi};
use crate::descriptor::DescriptorSetLayout;
use crate::error::{GrfxError, Result};
use crate::pipeline::{
    ComputePipelineDesc, GraphicsPipelineDesc, PipelineInterface, PipelineInterfaceCreateInfo, ResolvedStage,
    ShaderModuleCreateInfo, StencilOpState,
};
use crate::types::{FrontFace, ShaderStageFlags, VertexInputRate};
use crate::MAX_RENDER_TARGETS;

#[derive(Debug)]
pub struct Dx12ShaderModule {
    code: Vec<u8>,
}

impl Dx12ShaderModule {
    pub fn new(info: &ShaderModuleCreateInfo) -> Result<Self> {
        if info.code.is_empty() {
            return Err(GrfxError::InvalidCreateArgument);
        }
        Ok(Self { code: info.code.clone() })
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

impl ShaderModuleApi for Dx12ShaderModule {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn root_parameter_type(kind: RootSlotKind) -> D3D12_ROOT_PARAMETER_TYPE {
    match kind {
        RootSlotKind::Cbv => D3D12_ROOT_PARAMETER_TYPE_CBV,
        RootSlotKind::Srv => D3D12_ROOT_PARAMETER_TYPE_SRV,
        RootSlotKind::Uav => D3D12_ROOT_PARAMETER_TYPE_UAV,
        RootSlotKind::Table => D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
    }
}

fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    unsafe { std::slice::from_raw_parts(blob.GetBufferPointer().cast::<u8>(), blob.GetBufferSize()) }
}

/// Serializes a version 1.1 root signature and creates it.
fn create_root_signature(device: &ID3D12Device, layout: &RootSignatureLayout) -> Result<ID3D12RootSignature> {
    let parameters = layout.parameters();
    // One range per table; the vector is never resized, so pointers into it stay valid.
    let ranges: Vec<D3D12_DESCRIPTOR_RANGE1> = parameters
        .iter()
        .map(|p| match p.kind {
            RootParameterKind::Table { range, count, volatile } => D3D12_DESCRIPTOR_RANGE1 {
                RangeType: util::range_type_to_d3d12(range),
                NumDescriptors: count,
                BaseShaderRegister: p.register,
                RegisterSpace: p.space,
                Flags: if volatile { D3D12_DESCRIPTOR_RANGE_FLAG_DATA_VOLATILE } else { D3D12_DESCRIPTOR_RANGE_FLAG_NONE },
                OffsetInDescriptorsFromTableStart: D3D12_DESCRIPTOR_RANGE_OFFSET_APPEND,
            },
            _ => D3D12_DESCRIPTOR_RANGE1::default(),
        })
        .collect();

    let root_parameters: Vec<D3D12_ROOT_PARAMETER1> = parameters
        .iter()
        .zip(&ranges)
        .map(|(p, range)| {
            let (parameter_type, anonymous) = match p.kind {
                RootParameterKind::Table { .. } => (
                    D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                    D3D12_ROOT_PARAMETER1_0 {
                        DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE1 { NumDescriptorRanges: 1, pDescriptorRanges: range },
                    },
                ),
                RootParameterKind::Descriptor(kind) => (
                    root_parameter_type(kind),
                    D3D12_ROOT_PARAMETER1_0 {
                        Descriptor: D3D12_ROOT_DESCRIPTOR1 {
                            ShaderRegister: p.register,
                            RegisterSpace: p.space,
                            Flags: D3D12_ROOT_DESCRIPTOR_FLAG_NONE,
                        },
                    },
                ),
                RootParameterKind::Constants { count } => (
                    D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
                    D3D12_ROOT_PARAMETER1_0 {
                        Constants: D3D12_ROOT_CONSTANTS {
                            ShaderRegister: p.register,
                            RegisterSpace: p.space,
                            Num32BitValues: count,
                        },
                    },
                ),
            };
            D3D12_ROOT_PARAMETER1 {
                ParameterType: parameter_type,
                Anonymous: anonymous,
                ShaderVisibility: util::visibility_to_d3d12(p.visibility),
            }
        })
        .collect();

    let desc = D3D12_VERSIONED_ROOT_SIGNATURE_DESC {
        Version: D3D_ROOT_SIGNATURE_VERSION_1_1,
        Anonymous: D3D12_VERSIONED_ROOT_SIGNATURE_DESC_0 {
            Desc_1_1: D3D12_ROOT_SIGNATURE_DESC1 {
                NumParameters: root_parameters.len() as u32,
                pParameters: root_parameters.as_ptr(),
                NumStaticSamplers: 0,
                pStaticSamplers: std::ptr::null(),
                Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
            },
        },
    };

    let mut blob: Option<ID3DBlob> = None;
    let mut error: Option<ID3DBlob> = None;
    let serialized = unsafe { D3D12SerializeVersionedRootSignature(&desc, &mut blob, Some(&mut error)) };
    if let Err(e) = serialized {
        if let Some(error) = &error {
            log::error!("root signature: {}", String::from_utf8_lossy(blob_bytes(error)).trim_end_matches('\0'));
        }
        return Err(hresult_error(e, "D3D12SerializeVersionedRootSignature"));
    }
    let blob = blob.ok_or(GrfxError::ApiFailure)?;
    unsafe { device.CreateRootSignature(0, blob_bytes(&blob)) }.map_err(|e| hresult_error(e, "ID3D12Device::CreateRootSignature"))
}

#[derive(Debug)]
pub struct Dx12PipelineInterface {
    root_signature: Sendable<ID3D12RootSignature>,
    layout: RootSignatureLayout,
}

impl Dx12PipelineInterface {
    pub(crate) fn new(
        shared: &Arc<DeviceShared>,
        info: &PipelineInterfaceCreateInfo,
        layouts: &[&DescriptorSetLayout],
    ) -> Result<Self> {
        let infos: Vec<_> = layouts.iter().map(|l| l.create_info()).collect();
        let layout = RootSignatureLayout::new(info, &infos)?;
        let root_signature = create_root_signature(&shared.device, &layout)?;
        log::debug!("root signature with {} parameters created", layout.parameters().len());
        Ok(Self { root_signature: Sendable(root_signature), layout })
    }

    pub fn root_signature(&self) -> &ID3D12RootSignature {
        &self.root_signature
    }

    pub fn layout(&self) -> &RootSignatureLayout {
        &self.layout
    }
}

impl PipelineInterfaceApi for Dx12PipelineInterface {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn interface_of(interface: &PipelineInterface) -> Result<&Dx12PipelineInterface> {
    interface.api().as_any().downcast_ref::<Dx12PipelineInterface>().ok_or(GrfxError::UnsupportedApi)
}

fn stencil_face(state: &StencilOpState) -> D3D12_DEPTH_STENCILOP_DESC {
    D3D12_DEPTH_STENCILOP_DESC {
        StencilFailOp: util::stencil_op_to_d3d12(state.fail_op),
        StencilDepthFailOp: util::stencil_op_to_d3d12(state.depth_fail_op),
        StencilPassOp: util::stencil_op_to_d3d12(state.pass_op),
        StencilFunc: util::compare_op_to_d3d12(state.compare_op),
    }
}

fn shader_code<'a>(stage: &ResolvedStage<'a>) -> Result<&'a [u8]> {
    stage
        .module
        .api()
        .as_any()
        .downcast_ref::<Dx12ShaderModule>()
        .map(Dx12ShaderModule::code)
        .ok_or(GrfxError::UnsupportedApi)
}

/// Empty bytecode for stages the pipeline does not use.
fn bytecode(stages: &[ResolvedStage<'_>], stage: ShaderStageFlags) -> Result<D3D12_SHADER_BYTECODE> {
    match stages.iter().find(|s| s.stage == stage) {
        Some(s) => {
            let code = shader_code(s)?;
            Ok(D3D12_SHADER_BYTECODE { pShaderBytecode: code.as_ptr().cast(), BytecodeLength: code.len() })
        }
        None => Ok(D3D12_SHADER_BYTECODE::default()),
    }
}

#[derive(Debug)]
pub struct Dx12Pipeline {
    state: Sendable<ID3D12PipelineState>,
    topology: windows::Win32::Graphics::Direct3D::D3D_PRIMITIVE_TOPOLOGY,
}

impl Dx12Pipeline {
    pub(crate) fn graphics(shared: &Arc<DeviceShared>, desc: &GraphicsPipelineDesc<'_>) -> Result<Self> {
        let info = desc.info;
        let interface = interface_of(desc.interface)?;

        let mut blend_state = D3D12_BLEND_DESC {
            AlphaToCoverageEnable: info.multisample.alpha_to_coverage_enable.into(),
            IndependentBlendEnable: true.into(),
            ..Default::default()
        };
        for (i, target) in blend_state.RenderTarget.iter_mut().enumerate().take(MAX_RENDER_TARGETS) {
            let attachment = info.blend_attachment(i);
            *target = D3D12_RENDER_TARGET_BLEND_DESC {
                BlendEnable: attachment.blend_enable.into(),
                LogicOpEnable: info.color_blend.logic_op_enable.into(),
                SrcBlend: util::blend_to_d3d12(attachment.src_color_blend_factor),
                DestBlend: util::blend_to_d3d12(attachment.dst_color_blend_factor),
                BlendOp: util::blend_op_to_d3d12(attachment.color_blend_op),
                SrcBlendAlpha: util::blend_to_d3d12(attachment.src_alpha_blend_factor),
                DestBlendAlpha: util::blend_to_d3d12(attachment.dst_alpha_blend_factor),
                BlendOpAlpha: util::blend_op_to_d3d12(attachment.alpha_blend_op),
                LogicOp: util::logic_op_to_d3d12(info.color_blend.logic_op),
                RenderTargetWriteMask: util::color_write_mask_to_d3d12(attachment.color_write_mask),
            };
        }

        let raster = &info.raster;
        let bias = raster.depth_bias_enable;
        let rasterizer_state = D3D12_RASTERIZER_DESC {
            FillMode: util::fill_mode_to_d3d12(raster.polygon_mode)?,
            CullMode: util::cull_mode_to_d3d12(raster.cull_mode),
            FrontCounterClockwise: (raster.front_face == FrontFace::Ccw).into(),
            DepthBias: if bias { raster.depth_bias_constant_factor as i32 } else { 0 },
            DepthBiasClamp: if bias { raster.depth_bias_clamp } else { 0.0 },
            SlopeScaledDepthBias: if bias { raster.depth_bias_slope_factor } else { 0.0 },
            DepthClipEnable: (!raster.depth_clamp_enable).into(),
            MultisampleEnable: false.into(),
            AntialiasedLineEnable: false.into(),
            ForcedSampleCount: 0,
            ConservativeRaster: D3D12_CONSERVATIVE_RASTERIZATION_MODE_OFF,
        };

        let ds = &info.depth_stencil;
        let depth_stencil_state = D3D12_DEPTH_STENCIL_DESC {
            DepthEnable: ds.depth_test_enable.into(),
            DepthWriteMask: if ds.depth_write_enable { D3D12_DEPTH_WRITE_MASK_ALL } else { D3D12_DEPTH_WRITE_MASK_ZERO },
            DepthFunc: util::compare_op_to_d3d12(ds.depth_compare_op),
            StencilEnable: ds.stencil_test_enable.into(),
            StencilReadMask: ds.front.compare_mask as u8,
            StencilWriteMask: ds.front.write_mask as u8,
            FrontFace: stencil_face(&ds.front),
            BackFace: stencil_face(&ds.back),
        };

        let attributes: Vec<_> = info.vertex_bindings.iter().flat_map(|b| b.attributes.iter()).collect();
        let semantic_names = attributes
            .iter()
            .map(|attr| CString::new(attr.semantic_name.as_str()).map_err(|_| GrfxError::InvalidCreateArgument))
            .collect::<Result<Vec<_>>>()?;
        let input_elements: Vec<D3D12_INPUT_ELEMENT_DESC> = attributes
            .iter()
            .zip(&semantic_names)
            .map(|(attr, name)| D3D12_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(name.as_ptr().cast()),
                SemanticIndex: 0,
                Format: util::format_to_dxgi(attr.format),
                InputSlot: attr.binding,
                AlignedByteOffset: attr.offset,
                InputSlotClass: util::input_rate_to_d3d12(attr.input_rate),
                InstanceDataStepRate: u32::from(attr.input_rate == VertexInputRate::Instance),
            })
            .collect();

        let formats = &info.output.render_target_formats;
        let mut rtv_formats = [DXGI_FORMAT_UNKNOWN; 8];
        for (dst, format) in rtv_formats.iter_mut().zip(formats) {
            *dst = util::format_to_dxgi(*format);
        }
        if rtv_formats[..formats.len()].contains(&DXGI_FORMAT_UNKNOWN) {
            log::error!("render target formats {:?} include a format without a DXGI equivalent", formats);
            return Err(GrfxError::InvalidCreateArgument);
        }

        let topology = info.input_assembly.topology;
        if util::topology_type_to_d3d12(topology) == D3D12_PRIMITIVE_TOPOLOGY_TYPE_UNDEFINED {
            log::error!("{:?} has no D3D12 primitive topology", topology);
            return Err(GrfxError::RequiredFeatureUnavailable);
        }
        let state_desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            pRootSignature: unsafe { std::mem::transmute_copy(interface.root_signature()) },
            VS: bytecode(&desc.stages, ShaderStageFlags::VS)?,
            PS: bytecode(&desc.stages, ShaderStageFlags::PS)?,
            DS: bytecode(&desc.stages, ShaderStageFlags::DS)?,
            HS: bytecode(&desc.stages, ShaderStageFlags::HS)?,
            GS: bytecode(&desc.stages, ShaderStageFlags::GS)?,
            BlendState: blend_state,
            SampleMask: u32::MAX,
            RasterizerState: rasterizer_state,
            DepthStencilState: depth_stencil_state,
            InputLayout: D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: input_elements.as_ptr(),
                NumElements: input_elements.len() as u32,
            },
            IBStripCutValue: if info.input_assembly.primitive_restart_enable {
                D3D12_INDEX_BUFFER_STRIP_CUT_VALUE_0xFFFFFFFF
            } else {
                D3D12_INDEX_BUFFER_STRIP_CUT_VALUE_DISABLED
            },
            PrimitiveTopologyType: util::topology_type_to_d3d12(topology),
            NumRenderTargets: formats.len() as u32,
            RTVFormats: rtv_formats,
            DSVFormat: util::format_to_dxgi(info.output.depth_stencil_format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            ..Default::default()
        };
        let state: ID3D12PipelineState = unsafe { shared.device.CreateGraphicsPipelineState(&state_desc) }
            .map_err(|e| hresult_error(e, "ID3D12Device::CreateGraphicsPipelineState"))?;
        Ok(Self {
            state: Sendable(state),
            topology: util::topology_to_d3d12(topology, info.tessellation.patch_control_points),
        })
    }

    pub(crate) fn compute(shared: &Arc<DeviceShared>, desc: &ComputePipelineDesc<'_>) -> Result<Self> {
        let interface = interface_of(desc.interface)?;
        let code = shader_code(&desc.cs)?;
        let state_desc = D3D12_COMPUTE_PIPELINE_STATE_DESC {
            pRootSignature: unsafe { std::mem::transmute_copy(interface.root_signature()) },
            CS: D3D12_SHADER_BYTECODE { pShaderBytecode: code.as_ptr().cast(), BytecodeLength: code.len() },
            ..Default::default()
        };
        let state: ID3D12PipelineState = unsafe { shared.device.CreateComputePipelineState(&state_desc) }
            .map_err(|e| hresult_error(e, "ID3D12Device::CreateComputePipelineState"))?;
        Ok(Self {
            state: Sendable(state),
            topology: windows::Win32::Graphics::Direct3D::D3D_PRIMITIVE_TOPOLOGY_UNDEFINED,
        })
    }

    pub fn state(&self) -> &ID3D12PipelineState {
        &self.state
    }

    pub fn topology(&self) -> windows::Win32::Graphics::Direct3D::D3D_PRIMITIVE_TOPOLOGY {
        self.topology
    }
}

impl PipelineApi for Dx12Pipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCreateInfo;
    use crate::descriptor::{DescriptorBinding, DescriptorSetLayoutCreateInfo};
    use crate::dx12::descriptor::Dx12DescriptorSetLayout;
    use crate::dx12::testing;
    use crate::pipeline::{PushConstantsInfo, SetLayoutInfo};
    use crate::types::DescriptorType;
    use crate::{DescriptorSetLayoutHandle, VALUE_IGNORED};

    fn layout(pushable: bool, bindings: Vec<DescriptorBinding>) -> DescriptorSetLayout {
        let info = DescriptorSetLayoutCreateInfo { pushable, bindings };
        let api = Dx12DescriptorSetLayout::new(&info).unwrap();
        DescriptorSetLayout::new(info, Box::new(api))
    }

    fn sets(numbers: &[u32]) -> Vec<SetLayoutInfo> {
        numbers.iter().map(|&set| SetLayoutInfo { set, layout: DescriptorSetLayoutHandle::default() }).collect()
    }

    #[test]
    fn root_signatures_serialize_tables_descriptors_and_constants() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        let set0 = layout(false, vec![
            DescriptorBinding::new(0, DescriptorType::SampledImage),
            DescriptorBinding::new(1, DescriptorType::Sampler),
        ]);
        let set1 = layout(true, vec![DescriptorBinding::new(0, DescriptorType::UniformBuffer)]);
        let info = PipelineInterfaceCreateInfo {
            sets: sets(&[0, 1]),
            push_constants: PushConstantsInfo { count: 4, binding: 8, set: 0, shader_visibility: ShaderStageFlags::ALL },
        };
        let interface = Dx12PipelineInterface::new(&shared, &info, &[&set0, &set1]).unwrap();
        assert_eq!(interface.layout().slot_kind(0, 1), Some(RootSlotKind::Cbv));
        assert_eq!(interface.layout().root_constants_parameter_index(), 3);
        assert_eq!(interface.layout().find_parameter_index(0, 2), VALUE_IGNORED);
    }

    #[test]
    fn empty_root_signatures_are_accepted() {
        let Some((instance, handle)) = testing::device(DeviceCreateInfo::default()) else { return };
        let shared = testing::shared(&instance, handle);
        assert!(create_root_signature(&shared.device, &RootSignatureLayout::default()).is_ok());
    }

    #[test]
    fn root_parameter_types_match_slot_kinds() {
        assert_eq!(root_parameter_type(RootSlotKind::Cbv), D3D12_ROOT_PARAMETER_TYPE_CBV);
        assert_eq!(root_parameter_type(RootSlotKind::Uav), D3D12_ROOT_PARAMETER_TYPE_UAV);
        assert_eq!(root_parameter_type(RootSlotKind::Table), D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE);
    }
}
