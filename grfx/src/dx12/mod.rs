//! Direct3D 12 backend over the `windows` crate.
//!
//! Root signature, barrier and descriptor packing plans live in [`layout`] and build on every
//! platform; the driver itself builds on Windows only. RTVs and DSVs come from CPU-only handle
//! heaps shared by the whole device; descriptor sets own their own CPU-only heaps and command
//! buffers own the shader-visible ones. Buffers and images are placed resources sub-allocated with
//! `gpu_allocator`.

mod layout;

#[cfg(windows)]
mod command;
#[cfg(windows)]
mod descriptor;
#[cfg(windows)]
mod descriptor_helper;
#[cfg(windows)]
mod device;
#[cfg(windows)]
mod instance;
#[cfg(windows)]
mod pipeline;
#[cfg(windows)]
mod query;
#[cfg(windows)]
mod queue;
#[cfg(windows)]
mod render_pass;
#[cfg(windows)]
mod resource;
#[cfg(windows)]
mod swapchain;
#[cfg(windows)]
mod sync;
#[cfg(windows)]
mod util;

pub use layout::{
    BindingRange, HeapKind, RangeKind, RootParameter, RootParameterKind, RootSignatureLayout, RootSlotKind, Visibility,
};

#[cfg(windows)]
pub use command::{Dx12CommandBuffer, Dx12CommandPool};
#[cfg(windows)]
pub use descriptor::{Dx12DescriptorPool, Dx12DescriptorSet, Dx12DescriptorSetLayout};
#[cfg(windows)]
pub use device::Dx12Device;
#[cfg(windows)]
pub(crate) use device::DeviceShared;
#[cfg(windows)]
pub use instance::{create_instance, Dx12Instance, Dx12Surface};
#[cfg(windows)]
pub use pipeline::{Dx12Pipeline, Dx12PipelineInterface, Dx12ShaderModule};
#[cfg(windows)]
pub use query::Dx12Query;
#[cfg(windows)]
pub use queue::Dx12Queue;
#[cfg(windows)]
pub use render_pass::Dx12RenderPass;
#[cfg(windows)]
pub use resource::{Dx12AttachmentView, Dx12Buffer, Dx12Image, Dx12Sampler, Dx12ShaderView};
#[cfg(windows)]
pub use swapchain::Dx12Swapchain;
#[cfg(windows)]
pub use sync::{Dx12Fence, Dx12Semaphore};

#[cfg(not(windows))]
pub fn create_instance(
    info: &crate::config::InstanceCreateInfo,
) -> crate::error::Result<Box<dyn crate::backend::InstanceApi>> {
    log::error!("{} is only available on Windows", info.api.name());
    Err(crate::error::GrfxError::UnsupportedApi)
}

/// Helpers for tests that need a live driver. They return `None` on machines without a
/// D3D12 adapter so the tests can skip.
#[cfg(all(test, windows))]
pub(crate) mod testing {
    use std::sync::Arc;

    use windows::Win32::Graphics::Direct3D12::ID3D12Device;

    use super::device::{DeviceShared, Dx12Device};
    use crate::config::{DeviceCreateInfo, InstanceCreateInfo};
    use crate::instance::Instance;
    use crate::types::Api;
    use crate::DeviceHandle;

    pub fn instance(info: InstanceCreateInfo) -> Option<Instance> {
        let api = super::create_instance(&info).ok()?;
        Instance::with_api(info, api).ok()
    }

    pub fn device(info: DeviceCreateInfo) -> Option<(Instance, DeviceHandle)> {
        let mut instance = instance(InstanceCreateInfo::new(Api::Dx12_0))?;
        let handle = instance.create_device(&info).ok()?;
        Some((instance, handle))
    }

    pub fn shared(instance: &Instance, handle: DeviceHandle) -> Arc<DeviceShared> {
        let device = instance.device(handle).unwrap();
        Arc::clone(device.api_object().as_any().downcast_ref::<Dx12Device>().unwrap().shared())
    }

    /// A bare device for tests of native helpers that need nothing else.
    pub fn native_device() -> Option<ID3D12Device> {
        let (instance, handle) = device(DeviceCreateInfo::default())?;
        Some(shared(&instance, handle).device.0.clone())
    }
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;
    use crate::config::InstanceCreateInfo;
    use crate::error::GrfxError;
    use crate::instance::Instance;
    use crate::types::Api;

    #[test]
    fn instances_need_windows() {
        assert_eq!(create_instance(&InstanceCreateInfo::new(Api::Dx12_1)).err(), Some(GrfxError::UnsupportedApi));
        assert_eq!(Instance::new(InstanceCreateInfo::new(Api::Dx12_0)).err(), Some(GrfxError::UnsupportedApi));
    }
}
