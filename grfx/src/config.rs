//! Instance and device configuration, with environment overrides.

use crate::types::Api;

/// Instance creation parameters.
#[derive(Clone, Debug)]
pub struct InstanceCreateInfo {
    /// Native API every device of this instance talks to.
    pub api: Api,
    pub application_name: String,
    /// Enable the debug layer (D3D12) or validation layers (Vulkan).
    pub enable_debug: bool,
    /// Prefer a software adapter (WARP / lavapipe class) over hardware GPUs.
    pub use_software_renderer: bool,
    /// D3D12 only: shaders are DXIL rather than DXBC.
    pub force_dxil: bool,
}

impl Default for InstanceCreateInfo {
    fn default() -> Self {
        Self {
            api: Api::Vk1_2,
            application_name: "grfx".to_string(),
            enable_debug: cfg!(feature = "validation"),
            use_software_renderer: false,
            force_dxil: false,
        }
    }
}

impl InstanceCreateInfo {
    pub fn new(api: Api) -> Self {
        Self { api, ..Default::default() }
    }

    /// Applies `GRFX_API`, `GRFX_VALIDATION` and `GRFX_SOFTWARE` on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(api) = std::env::var("GRFX_API").ok().as_deref().and_then(parse_api) {
            self.api = api;
        }
        if env_flag("GRFX_VALIDATION") {
            self.enable_debug = true;
        }
        if env_flag("GRFX_SOFTWARE") {
            self.use_software_renderer = true;
        }
        self
    }

    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }
}

/// Device creation parameters: how many queues of each kind to create.
#[derive(Clone, Debug)]
pub struct DeviceCreateInfo {
    /// Index into the instance's GPU list.
    pub gpu_index: usize,
    pub graphics_queue_count: u32,
    pub compute_queue_count: u32,
    pub transfer_queue_count: u32,
    /// Accepted for parity with VRS-capable callers; no shading-rate path exists.
    pub support_shading_rate_mode: bool,
    pub enable_validation: bool,
}

impl Default for DeviceCreateInfo {
    fn default() -> Self {
        Self {
            gpu_index: 0,
            graphics_queue_count: 1,
            compute_queue_count: 0,
            transfer_queue_count: 0,
            support_shading_rate_mode: false,
            enable_validation: cfg!(feature = "validation"),
        }
    }
}

pub fn parse_api(s: &str) -> Option<Api> {
    match s.to_ascii_lowercase().as_str() {
        "dx12" | "d3d12" | "dx12_0" => Some(Api::Dx12_0),
        "dx12_1" => Some(Api::Dx12_1),
        "vk" | "vulkan" | "vk1_2" => Some(Api::Vk1_2),
        "vk1_1" => Some(Api::Vk1_1),
        _ => None,
    }
}

fn env_flag(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("1") | Ok("true") | Ok("on"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_api_names() {
        assert_eq!(parse_api("dx12"), Some(Api::Dx12_0));
        assert_eq!(parse_api("Vulkan"), Some(Api::Vk1_2));
        assert_eq!(parse_api("vk1_1"), Some(Api::Vk1_1));
        assert_eq!(parse_api("metal"), None);
    }

    #[test]
    fn default_device_has_one_graphics_queue() {
        let info = DeviceCreateInfo::default();
        assert_eq!(info.graphics_queue_count, 1);
        assert_eq!(info.compute_queue_count, 0);
    }
}
