//! Instance: backend selection, GPU enumeration, surfaces and device ownership.

use slotmap::SlotMap;

use crate::backend::InstanceApi;
use crate::config::{DeviceCreateInfo, InstanceCreateInfo};
use crate::device::Device;
use crate::error::{GrfxError, Result};
use crate::swapchain::{Surface, SurfaceCreateInfo};
use crate::types::Api;
use crate::DeviceHandle;

/// One adapter (D3D12) or physical device (Vulkan).
#[derive(Debug, Clone)]
pub struct Gpu {
    api: Api,
    name: String,
    vendor_id: u32,
    device_id: u32,
    software: bool,
    graphics_queue_count: u32,
    compute_queue_count: u32,
    transfer_queue_count: u32,
}

impl Gpu {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        api: Api,
        name: impl Into<String>,
        vendor_id: u32,
        device_id: u32,
        software: bool,
        graphics_queue_count: u32,
        compute_queue_count: u32,
        transfer_queue_count: u32,
    ) -> Self {
        Self {
            api,
            name: name.into(),
            vendor_id,
            device_id,
            software,
            graphics_queue_count,
            compute_queue_count,
            transfer_queue_count,
        }
    }

    pub fn api(&self) -> Api {
        self.api
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vendor_id(&self) -> u32 {
        self.vendor_id
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn is_software(&self) -> bool {
        self.software
    }

    pub fn graphics_queue_count(&self) -> u32 {
        self.graphics_queue_count
    }

    pub fn compute_queue_count(&self) -> u32 {
        self.compute_queue_count
    }

    pub fn transfer_queue_count(&self) -> u32 {
        self.transfer_queue_count
    }
}

#[derive(Debug)]
pub struct Instance {
    create_info: InstanceCreateInfo,
    // Devices go first: their native objects must be released before the driver instance.
    devices: SlotMap<DeviceHandle, Device>,
    api: Box<dyn InstanceApi>,
}

impl Instance {
    pub fn new(create_info: InstanceCreateInfo) -> Result<Self> {
        let api = create_instance_api(&create_info)?;
        Self::with_api(create_info, api)
    }

    pub(crate) fn with_api(create_info: InstanceCreateInfo, api: Box<dyn InstanceApi>) -> Result<Self> {
        if api.gpus().is_empty() {
            log::error!("no {} GPUs found", create_info.api.name());
            return Err(GrfxError::ElementNotFound);
        }
        log::info!(
            "Instance created for {} (debug: {}, software: {})",
            create_info.api.name(),
            create_info.enable_debug,
            create_info.use_software_renderer
        );
        for (i, gpu) in api.gpus().iter().enumerate() {
            log::debug!("gpu {}: {} [{:04x}:{:04x}]", i, gpu.name(), gpu.vendor_id(), gpu.device_id());
        }
        Ok(Self { create_info, devices: SlotMap::with_key(), api })
    }

    pub fn create_info(&self) -> &InstanceCreateInfo {
        &self.create_info
    }

    pub fn api(&self) -> Api {
        self.create_info.api
    }

    pub fn api_object(&self) -> &dyn InstanceApi {
        self.api.as_ref()
    }

    pub fn gpus(&self) -> &[Gpu] {
        self.api.gpus()
    }

    pub fn gpu(&self, index: usize) -> Result<&Gpu> {
        self.api.gpus().get(index).ok_or(GrfxError::OutOfRange)
    }

    /// Creates a presentation surface for a native window on `info.gpu_index`.
    pub fn create_surface(&self, info: &SurfaceCreateInfo) -> Result<Surface> {
        self.gpu(info.gpu_index)?;
        let native = self.api.create_surface(info)?;
        Surface::new(self.create_info.api, native)
    }

    pub fn create_device(&mut self, info: &DeviceCreateInfo) -> Result<DeviceHandle> {
        let gpu = self.gpu(info.gpu_index)?.clone();
        let api = self.api.create_device(info.gpu_index, info)?;
        let device = Device::new(gpu, info.clone(), api)?;
        Ok(self.devices.insert(device))
    }

    pub fn device(&self, handle: DeviceHandle) -> Result<&Device> {
        self.devices.get(handle).ok_or(GrfxError::ElementNotFound)
    }

    pub fn device_mut(&mut self, handle: DeviceHandle) -> Result<&mut Device> {
        self.devices.get_mut(handle).ok_or(GrfxError::ElementNotFound)
    }

    pub fn destroy_device(&mut self, handle: DeviceHandle) -> Result<()> {
        self.devices.remove(handle).map(drop).ok_or(GrfxError::ElementNotFound)
    }
}

fn create_instance_api(info: &InstanceCreateInfo) -> Result<Box<dyn InstanceApi>> {
    match info.api {
        #[cfg(feature = "dx12")]
        Api::Dx12_0 | Api::Dx12_1 => crate::dx12::create_instance(info),
        #[cfg(feature = "vulkan")]
        Api::Vk1_1 | Api::Vk1_2 => crate::vk::create_instance(info),
        #[allow(unreachable_patterns)]
        api => {
            log::error!("{} support is not compiled in", api.name());
            Err(GrfxError::UnsupportedApi)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockInstance;
    use crate::types::PresentMode;

    #[test]
    fn surfaces_report_their_capabilities() {
        let info = InstanceCreateInfo::new(Api::Vk1_2);
        let instance = Instance::with_api(info, Box::new(MockInstance::new(Api::Vk1_2))).unwrap();
        let surface = instance.create_surface(&crate::mock::surface_create_info(0)).unwrap();
        assert_eq!(surface.current_extent(), (1280, 720));
        assert!(surface.supports_present_mode(PresentMode::Mailbox));
        assert_eq!(surface.clamp_image_count(1), 2);
        assert_eq!(surface.clamp_image_count(16), 8);
        assert_eq!(
            instance.create_surface(&crate::mock::surface_create_info(3)).err(),
            Some(GrfxError::OutOfRange)
        );
    }
}
