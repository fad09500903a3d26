//! VkInstance, physical device enumeration and window surfaces.

use std::any::Any;
use std::ffi::{c_void, CStr, CString};
use std::sync::Arc;

use ash::vk;

use super::util::{self, vk_error};
use super::VulkanDevice;
use crate::backend::{DeviceApi, InstanceApi, SurfaceApi};
use crate::config::{DeviceCreateInfo, InstanceCreateInfo};
use crate::error::{GrfxError, Result};
use crate::instance::Gpu;
use crate::swapchain::{SurfaceCapabilities, SurfaceCreateInfo};
use crate::types::{Api, CommandType};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Every platform surface extension; the ones the loader offers are enabled.
const SURFACE_EXTENSIONS: [&CStr; 6] = [
    ash::khr::win32_surface::NAME,
    ash::khr::xlib_surface::NAME,
    ash::khr::xcb_surface::NAME,
    ash::khr::wayland_surface::NAME,
    ash::khr::android_surface::NAME,
    ash::ext::metal_surface::NAME,
];

pub(crate) fn api_version(api: Api) -> u32 {
    match api {
        Api::Vk1_1 => vk::API_VERSION_1_1,
        _ => vk::API_VERSION_1_2,
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() || (*callback_data).p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        CStr::from_ptr((*callback_data).p_message).to_string_lossy()
    };
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[{:?}] {}", message_type, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[{:?}] {}", message_type, message),
        _ => log::debug!("[{:?}] {}", message_type, message),
    }
    vk::FALSE
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Loader, instance and the instance-level extension loaders. Devices and surfaces keep it alive.
pub(crate) struct InstanceShared {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub surface: ash::khr::surface::Instance,
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl InstanceShared {
    pub fn has_debug_messenger(&self) -> bool {
        self.debug.is_some()
    }
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

impl std::fmt::Debug for InstanceShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceShared")
            .field("instance", &self.instance.handle())
            .field("debug", &self.debug.is_some())
            .finish_non_exhaustive()
    }
}

/// What device creation needs to know about one physical device.
#[derive(Debug, Clone)]
pub(crate) struct PhysicalDeviceInfo {
    pub handle: vk::PhysicalDevice,
    pub api_version: u32,
    pub features: vk::PhysicalDeviceFeatures,
    pub timestamp_period: f32,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub extensions: Vec<CString>,
}

impl PhysicalDeviceInfo {
    pub fn supports(&self, extension: &CStr) -> bool {
        self.extensions.iter().any(|e| e.as_c_str() == extension)
    }
}

/// Queues a command type can use: all of its dedicated family, or none.
fn queue_count(families: &[vk::QueueFamilyProperties], command_type: CommandType) -> u32 {
    util::queue_family_for(command_type, families).map_or(0, |family| families[family as usize].queue_count)
}

fn available_layer(entry: &ash::Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .unwrap_or_default()
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|n| n == name))
}

pub fn create_instance(info: &InstanceCreateInfo) -> Result<Box<dyn InstanceApi>> {
    let entry = unsafe { ash::Entry::load() }.map_err(|e| {
        log::error!("Vulkan loader not found: {}", e);
        GrfxError::UnsupportedApi
    })?;

    let version = api_version(info.api);
    let loader_version = unsafe { entry.try_enumerate_instance_version() }
        .map_err(|r| vk_error(r, "vkEnumerateInstanceVersion"))?
        .unwrap_or(vk::API_VERSION_1_0);
    if loader_version < version {
        log::error!(
            "Vulkan loader supports {}.{}, {} was requested",
            vk::api_version_major(loader_version),
            vk::api_version_minor(loader_version),
            info.api.name()
        );
        return Err(GrfxError::UnsupportedApi);
    }

    let available: Vec<CString> = unsafe { entry.enumerate_instance_extension_properties(None) }
        .map_err(|r| vk_error(r, "vkEnumerateInstanceExtensionProperties"))?
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
        .collect();
    let has = |name: &CStr| available.iter().any(|e| e.as_c_str() == name);

    let mut extensions: Vec<*const std::ffi::c_char> = Vec::new();
    if has(ash::khr::surface::NAME) {
        extensions.push(ash::khr::surface::NAME.as_ptr());
        extensions.extend(SURFACE_EXTENSIONS.iter().filter(|name| has(name)).map(|name| name.as_ptr()));
    }
    let mut layers = Vec::new();
    let debug = info.enable_debug && has(ash::ext::debug_utils::NAME);
    if debug {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        if available_layer(&entry, VALIDATION_LAYER) {
            layers.push(VALIDATION_LAYER.as_ptr());
        } else {
            log::warn!("validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
    }

    let app_name = CString::new(info.application_name.as_str()).unwrap_or_default();
    let app_info = vk::ApplicationInfo::default()
        .api_version(version)
        .application_name(&app_name)
        .engine_name(c"grfx");
    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);
    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|r| vk_error(r, "vkCreateInstance"))?;

    let debug = if debug {
        let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
        match unsafe { loader.create_debug_utils_messenger(&messenger_info(), None) } {
            Ok(messenger) => Some((loader, messenger)),
            Err(r) => {
                log::warn!("vkCreateDebugUtilsMessengerEXT failed: {:?}", r);
                None
            }
        }
    } else {
        None
    };
    let surface = ash::khr::surface::Instance::new(&entry, &instance);
    let shared = Arc::new(InstanceShared { entry, instance, surface, debug });
    Ok(Box::new(VulkanInstance::new(shared, info)?))
}

#[derive(Debug)]
pub struct VulkanInstance {
    shared: Arc<InstanceShared>,
    api: Api,
    physical_devices: Vec<PhysicalDeviceInfo>,
    gpus: Vec<Gpu>,
}

impl VulkanInstance {
    /// Keeps the physical devices matching the software-renderer preference.
    pub(crate) fn new(shared: Arc<InstanceShared>, info: &InstanceCreateInfo) -> Result<Self> {
        let instance = &shared.instance;
        let handles = unsafe { instance.enumerate_physical_devices() }
            .map_err(|r| vk_error(r, "vkEnumeratePhysicalDevices"))?;

        let mut physical_devices = Vec::new();
        let mut gpus = Vec::new();
        for handle in handles {
            let properties = unsafe { instance.get_physical_device_properties(handle) };
            let software = properties.device_type == vk::PhysicalDeviceType::CPU;
            if software != info.use_software_renderer {
                continue;
            }
            let name = properties
                .device_name_as_c_str()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let queue_families = unsafe { instance.get_physical_device_queue_family_properties(handle) };
            let extensions = unsafe { instance.enumerate_device_extension_properties(handle) }
                .map_err(|r| vk_error(r, "vkEnumerateDeviceExtensionProperties"))?
                .iter()
                .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
                .collect();
            gpus.push(Gpu::new(
                info.api,
                name,
                properties.vendor_id,
                properties.device_id,
                software,
                queue_count(&queue_families, CommandType::Graphics),
                queue_count(&queue_families, CommandType::Compute),
                queue_count(&queue_families, CommandType::Transfer),
            ));
            physical_devices.push(PhysicalDeviceInfo {
                handle,
                api_version: properties.api_version,
                features: unsafe { instance.get_physical_device_features(handle) },
                timestamp_period: properties.limits.timestamp_period,
                queue_families,
                extensions,
            });
        }
        Ok(Self { shared, api: info.api, physical_devices, gpus })
    }
}

impl InstanceApi for VulkanInstance {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn api(&self) -> Api {
        self.api
    }

    fn gpus(&self) -> &[Gpu] {
        &self.gpus
    }

    fn create_device(&self, gpu_index: usize, info: &DeviceCreateInfo) -> Result<Box<dyn DeviceApi>> {
        let physical = self.physical_devices.get(gpu_index).ok_or(GrfxError::OutOfRange)?;
        let version = api_version(self.api);
        if physical.api_version < version {
            log::error!(
                "{} supports Vulkan {}.{}, {} was requested",
                self.gpus[gpu_index].name(),
                vk::api_version_major(physical.api_version),
                vk::api_version_minor(physical.api_version),
                self.api.name()
            );
            return Err(GrfxError::UnsupportedApi);
        }
        Ok(Box::new(VulkanDevice::new(&self.shared, physical, self.api, info)?))
    }

    fn create_surface(&self, info: &SurfaceCreateInfo) -> Result<Box<dyn SurfaceApi>> {
        let physical = self.physical_devices.get(info.gpu_index).ok_or(GrfxError::OutOfRange)?;
        Ok(Box::new(VulkanSurface::new(&self.shared, physical, info)?))
    }
}

pub struct VulkanSurface {
    instance: Arc<InstanceShared>,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
}

impl VulkanSurface {
    fn new(instance: &Arc<InstanceShared>, physical: &PhysicalDeviceInfo, info: &SurfaceCreateInfo) -> Result<Self> {
        let surface = unsafe {
            ash_window::create_surface(&instance.entry, &instance.instance, info.display_handle, info.window_handle, None)
        }
        .map_err(|r| vk_error(r, "vkCreateSurfaceKHR"))?;
        let surface = Self { instance: Arc::clone(instance), physical_device: physical.handle, surface };

        let graphics = util::queue_family_for(CommandType::Graphics, &physical.queue_families).ok_or(GrfxError::NoQueuesAvailable)?;
        let presentable = unsafe {
            instance.surface.get_physical_device_surface_support(physical.handle, graphics, surface.surface)
        }
        .map_err(|r| vk_error(r, "vkGetPhysicalDeviceSurfaceSupportKHR"))?;
        if !presentable {
            log::error!("graphics queue family {} cannot present to this surface", graphics);
            return Err(GrfxError::Failed);
        }
        Ok(surface)
    }

    pub fn native(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub(crate) fn surface_capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe { self.instance.surface.get_physical_device_surface_capabilities(self.physical_device, self.surface) }
            .map_err(|r| vk_error(r, "vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))
    }
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        unsafe { self.instance.surface.destroy_surface(self.surface, None) };
    }
}

impl std::fmt::Debug for VulkanSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSurface").field("surface", &self.surface).finish_non_exhaustive()
    }
}

impl SurfaceApi for VulkanSurface {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn capabilities(&self) -> Result<SurfaceCapabilities> {
        let caps = self.surface_capabilities()?;
        let loader = &self.instance.surface;
        let formats = unsafe { loader.get_physical_device_surface_formats(self.physical_device, self.surface) }
            .map_err(|r| vk_error(r, "vkGetPhysicalDeviceSurfaceFormatsKHR"))?;
        let modes = unsafe { loader.get_physical_device_surface_present_modes(self.physical_device, self.surface) }
            .map_err(|r| vk_error(r, "vkGetPhysicalDeviceSurfacePresentModesKHR"))?;

        let mut formats: Vec<_> = formats.iter().filter_map(|f| util::format_from_vk(f.format)).collect();
        formats.dedup();
        Ok(SurfaceCapabilities {
            width: caps.current_extent.width,
            height: caps.current_extent.height,
            min_image_count: caps.min_image_count,
            max_image_count: caps.max_image_count,
            supports_tearing: modes.contains(&vk::PresentModeKHR::IMMEDIATE),
            formats,
            present_modes: modes.into_iter().filter_map(util::present_mode_from_vk).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_versions() {
        assert_eq!(api_version(Api::Vk1_1), vk::API_VERSION_1_1);
        assert_eq!(api_version(Api::Vk1_2), vk::API_VERSION_1_2);
    }

    #[test]
    fn queue_counts_come_from_dedicated_families() {
        use vk::QueueFlags as Q;
        let family = |queue_flags, queue_count| vk::QueueFamilyProperties { queue_flags, queue_count, ..Default::default() };
        let families = [family(Q::GRAPHICS | Q::COMPUTE | Q::TRANSFER, 1), family(Q::COMPUTE | Q::TRANSFER, 4)];
        assert_eq!(queue_count(&families, CommandType::Graphics), 1);
        assert_eq!(queue_count(&families, CommandType::Compute), 4);
        assert_eq!(queue_count(&families, CommandType::Transfer), 0);
    }

    /// Runs against whatever driver is installed; machines without a Vulkan loader skip it.
    #[test]
    fn enumerates_installed_gpus() {
        let Ok(instance) = create_instance(&InstanceCreateInfo::new(Api::Vk1_2)) else {
            return;
        };
        let native = instance.as_any().downcast_ref::<VulkanInstance>().unwrap();
        assert_eq!(native.gpus().len(), native.physical_devices.len());
        for (gpu, physical) in native.gpus().iter().zip(&native.physical_devices) {
            assert!(!gpu.is_software());
            assert_eq!(gpu.graphics_queue_count() > 0, util::queue_family_for(CommandType::Graphics, &physical.queue_families).is_some());
        }
    }
}
