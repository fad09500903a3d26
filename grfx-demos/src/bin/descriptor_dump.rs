//! Builds a two-set pipeline interface with root constants and prints the native table:
//! the root signature parameters on D3D12, the pipeline layout on Vulkan.
//!
//! Usage: descriptor_dump [dx12|vk]

use std::any::Any;

use grfx::config::parse_api;
use grfx::dx12::RootSignatureLayout;
use grfx::vk::VulkanPipelineInterface;
use grfx::{
    DescriptorBinding, DescriptorSetLayoutCreateInfo, DescriptorType, DeviceCreateInfo, Instance, InstanceCreateInfo,
    PipelineInterfaceCreateInfo, PushConstantsInfo, SetLayoutInfo, ShaderStageFlags,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut info = InstanceCreateInfo::from_env();
    if let Some(name) = std::env::args().nth(1) {
        info.api = parse_api(&name).ok_or_else(|| anyhow::anyhow!("unknown backend {:?}", name))?;
    }
    let mut instance = Instance::new(info)?;
    let handle = instance.create_device(&DeviceCreateInfo::default())?;
    let device = instance.device_mut(handle)?;

    let material = device.create_descriptor_set_layout(&DescriptorSetLayoutCreateInfo::new(vec![
        DescriptorBinding::new(0, DescriptorType::UniformBuffer),
        DescriptorBinding::new(1, DescriptorType::SampledImage).with_array_count(4).with_visibility(ShaderStageFlags::PS),
        DescriptorBinding::new(2, DescriptorType::Sampler).with_visibility(ShaderStageFlags::PS),
    ]))?;
    let frame = device.create_descriptor_set_layout(&DescriptorSetLayoutCreateInfo {
        pushable: true,
        bindings: vec![
            DescriptorBinding::new(0, DescriptorType::UniformBuffer),
            DescriptorBinding::new(1, DescriptorType::RoStructuredBuffer),
        ],
    })?;
    let interface = device.create_pipeline_interface(&PipelineInterfaceCreateInfo {
        sets: vec![SetLayoutInfo { set: 0, layout: material }, SetLayoutInfo { set: 2, layout: frame }],
        push_constants: PushConstantsInfo { count: 4, binding: 8, set: 0, shader_visibility: ShaderStageFlags::ALL },
    })?;

    let interface = device.pipeline_interface(interface)?;
    println!("{:?} pipeline interface, sets {:?}", device.api(), interface.set_numbers());
    let any = interface.api().as_any();
    if let Some(layout) = root_signature_layout(any) {
        print_root_signature(layout);
    } else if let Some(vk) = any.downcast_ref::<VulkanPipelineInterface>() {
        for (set, layout) in vk.native().set_layouts().iter().enumerate() {
            println!("  set {} (push: {})", set, layout.is_push_descriptor());
            for binding in layout.bindings() {
                println!(
                    "    binding {} {:?} x{} {:?}",
                    binding.binding, binding.descriptor_type, binding.descriptor_count, binding.stage_flags
                );
            }
        }
        for range in vk.native().push_constant_ranges() {
            println!("  push constants {:?} offset {} size {}", range.stage_flags, range.offset, range.size);
        }
    }
    Ok(())
}

#[cfg(windows)]
fn root_signature_layout(any: &dyn Any) -> Option<&RootSignatureLayout> {
    any.downcast_ref::<grfx::dx12::Dx12PipelineInterface>().map(|dx12| dx12.layout())
}

#[cfg(not(windows))]
fn root_signature_layout(_any: &dyn Any) -> Option<&RootSignatureLayout> {
    None
}

fn print_root_signature(layout: &RootSignatureLayout) {
    for (index, parameter) in layout.parameters().iter().enumerate() {
        println!(
            "  [{}] {:?} register {} space {} {:?}",
            index, parameter.kind, parameter.register, parameter.space, parameter.visibility
        );
    }
    println!("  root constants at parameter {}", layout.root_constants_parameter_index());
    for (set, binding) in [(0, 0), (0, 1), (0, 2), (2, 0), (2, 1)] {
        println!(
            "  set {} binding {} -> parameter {} ({:?})",
            set,
            binding,
            layout.find_parameter_index(binding, set),
            layout.slot_kind(binding, set)
        );
    }
}
