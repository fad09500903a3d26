//! Surfaces and swapchains, including the headless rotation used without a window.

use std::sync::Arc;

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::backend::{DeviceApi, SurfaceApi, SwapchainApi};
use crate::device::Objects;
use crate::error::{GrfxError, Result};
use crate::format::Format;
use crate::image::ImageCreateInfo;
use crate::queue::SubmitBatch;
use crate::render_pass::RenderPassImagesCreateInfo;
use crate::types::{
    Api, AttachmentLoadOp, AttachmentStoreOp, DepthStencilClearValue, ImageUsageFlags, PresentMode,
    RenderTargetClearValue, ResourceState,
};
use crate::{FenceHandle, ImageHandle, QueueHandle, RenderPassHandle, SemaphoreHandle};

/// Native window a surface is created for. The window system itself stays outside grfx.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceCreateInfo {
    /// GPU whose presentation support and capabilities the surface reports.
    pub gpu_index: usize,
    pub display_handle: RawDisplayHandle,
    pub window_handle: RawWindowHandle,
}

/// What the surface supports on its GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub width: u32,
    pub height: u32,
    pub min_image_count: u32,
    /// Zero means no upper bound.
    pub max_image_count: u32,
    /// Variable refresh rate presentation (DXGI tearing).
    pub supports_tearing: bool,
    pub formats: Vec<Format>,
    pub present_modes: Vec<PresentMode>,
}

#[derive(Debug, Clone)]
pub struct Surface {
    api: Api,
    capabilities: SurfaceCapabilities,
    native: Arc<dyn SurfaceApi>,
}

impl Surface {
    pub(crate) fn new(api: Api, native: Box<dyn SurfaceApi>) -> Result<Self> {
        let capabilities = native.capabilities()?;
        if capabilities.formats.is_empty() || capabilities.present_modes.is_empty() {
            log::error!("surface reports no formats or present modes");
            return Err(GrfxError::InvalidCreateArgument);
        }
        Ok(Self { api, capabilities, native: Arc::from(native) })
    }

    pub fn api(&self) -> Api {
        self.api
    }

    /// Queries the capabilities again, e.g. after the window was resized.
    pub fn refresh(&mut self) -> Result<()> {
        self.capabilities = self.native.capabilities()?;
        Ok(())
    }

    pub fn capabilities(&self) -> &SurfaceCapabilities {
        &self.capabilities
    }

    pub fn min_image_count(&self) -> u32 {
        self.capabilities.min_image_count
    }

    pub fn max_image_count(&self) -> u32 {
        self.capabilities.max_image_count
    }

    pub fn current_extent(&self) -> (u32, u32) {
        (self.capabilities.width, self.capabilities.height)
    }

    pub fn supports_tearing(&self) -> bool {
        self.capabilities.supports_tearing
    }

    pub fn supports_format(&self, format: Format) -> bool {
        self.capabilities.formats.contains(&format)
    }

    pub fn supports_present_mode(&self, mode: PresentMode) -> bool {
        self.capabilities.present_modes.contains(&mode)
    }

    /// `count` limited to the surface's range.
    pub fn clamp_image_count(&self, count: u32) -> u32 {
        let count = count.max(self.min_image_count());
        match self.max_image_count() {
            0 => count,
            max => count.min(max),
        }
    }

    pub fn native(&self) -> &dyn SurfaceApi {
        self.native.as_ref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SwapchainCreateInfo {
    pub queue: QueueHandle,
    /// `None` creates a headless swapchain.
    pub surface: Option<Surface>,
    pub width: u32,
    pub height: u32,
    pub color_format: Format,
    /// `Format::Undefined` skips depth images.
    pub depth_format: Format,
    pub image_count: u32,
    pub present_mode: PresentMode,
}

#[derive(Debug)]
pub struct Swapchain {
    create_info: SwapchainCreateInfo,
    image_count: u32,
    color_images: Vec<ImageHandle>,
    depth_images: Vec<ImageHandle>,
    clear_render_passes: Vec<RenderPassHandle>,
    load_render_passes: Vec<RenderPassHandle>,
    current_image_index: u32,
    next_headless_image: u32,
    api: Option<Box<dyn SwapchainApi>>,
}

impl Swapchain {
    pub(crate) fn create(device: &dyn DeviceApi, objects: &mut Objects, info: &SwapchainCreateInfo) -> Result<Self> {
        if info.width == 0 || info.height == 0 || info.image_count == 0 || info.color_format == Format::Undefined {
            return Err(GrfxError::InvalidCreateArgument);
        }
        let api = match &info.surface {
            Some(_) => Some(device.create_swapchain(objects.queue(info.queue)?, info)?),
            None => {
                objects.queue(info.queue)?;
                None
            }
        };
        let image_count = api.as_ref().map_or(info.image_count, |api| api.image_count());
        if image_count != info.image_count {
            log::info!("Swapchain image count changed from {} to {}", info.image_count, image_count);
        }
        let mut swapchain = Self {
            create_info: info.clone(),
            image_count,
            color_images: Vec::new(),
            depth_images: Vec::new(),
            clear_render_passes: Vec::new(),
            load_render_passes: Vec::new(),
            current_image_index: 0,
            next_headless_image: 0,
            api,
        };
        if let Err(err) = swapchain.create_images(device, objects) {
            swapchain.destroy_images(objects);
            return Err(err);
        }
        log::info!(
            "Swapchain created: {}x{}, {} images{}",
            info.width,
            info.height,
            image_count,
            if swapchain.is_headless() { " (headless)" } else { "" }
        );
        Ok(swapchain)
    }

    fn color_image_info(&self) -> ImageCreateInfo {
        ImageCreateInfo {
            usage_flags: ImageUsageFlags::COLOR_ATTACHMENT
                | ImageUsageFlags::SAMPLED
                | ImageUsageFlags::TRANSFER_SRC
                | ImageUsageFlags::TRANSFER_DST,
            initial_state: ResourceState::Present,
            ..ImageCreateInfo::render_target_2d(self.create_info.width, self.create_info.height, self.create_info.color_format)
        }
    }

    fn create_images(&mut self, device: &dyn DeviceApi, objects: &mut Objects) -> Result<()> {
        let color_info = self.color_image_info();
        match self.api.as_mut() {
            Some(api) => {
                for image in api.color_images()? {
                    self.color_images.push(objects.insert_image(color_info.clone(), image));
                }
            }
            None => {
                for _ in 0..self.image_count {
                    self.color_images.push(objects.create_image(device, &color_info)?);
                }
            }
        }

        if self.create_info.depth_format != Format::Undefined {
            let depth_info = ImageCreateInfo::depth_stencil_target(
                self.create_info.width,
                self.create_info.height,
                self.create_info.depth_format,
            );
            for _ in 0..self.color_images.len() {
                self.depth_images.push(objects.create_image(device, &depth_info)?);
            }
        }

        for i in 0..self.color_images.len() {
            let clear = self.render_pass_images_info(i, AttachmentLoadOp::Clear);
            self.clear_render_passes.push(objects.create_render_pass_from_images(device, &clear)?);
            let load = self.render_pass_images_info(i, AttachmentLoadOp::Load);
            self.load_render_passes.push(objects.create_render_pass_from_images(device, &load)?);
        }
        Ok(())
    }

    fn render_pass_images_info(&self, index: usize, load_op: AttachmentLoadOp) -> RenderPassImagesCreateInfo {
        let depth_stencil_image = self.depth_images.get(index).copied();
        RenderPassImagesCreateInfo {
            width: self.create_info.width,
            height: self.create_info.height,
            render_target_images: vec![self.color_images[index]],
            depth_stencil_image,
            render_target_clear_values: vec![RenderTargetClearValue::new(0.0, 0.0, 0.0, 0.0)],
            depth_stencil_clear_value: DepthStencilClearValue { depth: 1.0, stencil: 0xFF },
            render_target_load_ops: vec![load_op],
            render_target_store_ops: vec![AttachmentStoreOp::Store],
            depth_load_op: AttachmentLoadOp::Clear,
            depth_store_op: AttachmentStoreOp::Store,
            stencil_load_op: AttachmentLoadOp::Clear,
            stencil_store_op: AttachmentStoreOp::Store,
            depth_stencil_state: depth_stencil_image.map(|_| ResourceState::DepthStencilWrite),
        }
    }

    fn destroy_images(&mut self, objects: &mut Objects) {
        for pass in self.clear_render_passes.drain(..).chain(self.load_render_passes.drain(..)) {
            let _ = objects.destroy_render_pass(pass);
        }
        for image in self.color_images.drain(..).chain(self.depth_images.drain(..)) {
            let _ = objects.destroy_image(image);
        }
    }

    pub(crate) fn destroy(mut self, objects: &mut Objects) {
        self.destroy_images(objects);
        log::debug!("Swapchain destroyed");
    }

    pub(crate) fn acquire_next_image(
        &mut self,
        objects: &Objects,
        timeout_ns: u64,
        semaphore: Option<SemaphoreHandle>,
        fence: Option<FenceHandle>,
    ) -> Result<u32> {
        let queue = objects.queue(self.create_info.queue)?;
        let semaphore = semaphore.map(|h| objects.semaphore(h)).transpose()?;
        let fence = fence.map(|h| objects.fence(h)).transpose()?;
        if semaphore.is_some_and(|s| s.is_timeline()) {
            return Err(GrfxError::InvalidSemaphoreType);
        }

        let image_index = match self.api.as_mut() {
            Some(api) => api.acquire_next_image(timeout_ns, queue, semaphore, fence)?,
            None => {
                let image_index = self.next_headless_image;
                self.next_headless_image = (image_index + 1) % self.image_count;
                if semaphore.is_some() || fence.is_some() {
                    let batch = SubmitBatch {
                        signals: semaphore.map(|s| (s, s.next_signal_value())).into_iter().collect(),
                        fence: fence.map(|f| (f, f.next_signal_value())),
                        ..Default::default()
                    };
                    queue.api().submit(&batch)?;
                }
                image_index
            }
        };
        self.current_image_index = image_index;
        Ok(image_index)
    }

    pub(crate) fn present(&mut self, objects: &Objects, image_index: u32, wait_semaphores: &[SemaphoreHandle]) -> Result<()> {
        if image_index >= self.image_count {
            return Err(GrfxError::OutOfRange);
        }
        let queue = objects.queue(self.create_info.queue)?;
        let semaphores = wait_semaphores
            .iter()
            .map(|h| objects.semaphore(*h))
            .collect::<Result<Vec<_>>>()?;
        if semaphores.iter().any(|s| s.is_timeline()) {
            return Err(GrfxError::InvalidSemaphoreType);
        }
        match self.api.as_mut() {
            Some(api) => api.present(queue, image_index, &semaphores),
            None => {
                if semaphores.is_empty() {
                    return Ok(());
                }
                let batch = SubmitBatch {
                    waits: semaphores.iter().map(|s| (*s, s.wait_for_value())).collect(),
                    ..Default::default()
                };
                queue.api().submit(&batch)
            }
        }
    }

    pub(crate) fn resize(&mut self, device: &dyn DeviceApi, objects: &mut Objects, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(GrfxError::InvalidCreateArgument);
        }
        if self.api.is_none() && device.api().is_vk() {
            log::error!("headless Vulkan swapchains cannot be resized; destroy and create a new one");
            return Err(GrfxError::Failed);
        }
        // Views and render passes over the old back buffers go before the native images do.
        self.destroy_images(objects);
        if let Some(api) = self.api.as_mut() {
            api.resize(width, height)?;
        }
        self.create_info.width = width;
        self.create_info.height = height;
        self.current_image_index = 0;
        self.next_headless_image = 0;
        self.create_images(device, objects)?;
        log::info!("Swapchain resized to {}x{}", width, height);
        Ok(())
    }

    pub fn create_info(&self) -> &SwapchainCreateInfo {
        &self.create_info
    }

    pub fn is_headless(&self) -> bool {
        self.api.is_none()
    }

    pub fn width(&self) -> u32 {
        self.create_info.width
    }

    pub fn height(&self) -> u32 {
        self.create_info.height
    }

    pub fn color_format(&self) -> Format {
        self.create_info.color_format
    }

    pub fn depth_format(&self) -> Format {
        self.create_info.depth_format
    }

    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    /// Index set by the last successful acquire.
    pub fn current_image_index(&self) -> u32 {
        self.current_image_index
    }

    pub fn color_image(&self, image_index: u32) -> Result<ImageHandle> {
        self.color_images.get(image_index as usize).copied().ok_or(GrfxError::OutOfRange)
    }

    pub fn depth_image(&self, image_index: u32) -> Result<ImageHandle> {
        if self.depth_images.is_empty() {
            return Err(GrfxError::ElementNotFound);
        }
        self.depth_images.get(image_index as usize).copied().ok_or(GrfxError::OutOfRange)
    }

    /// The clearing pass for `AttachmentLoadOp::Clear`, the loading pass otherwise.
    pub fn render_pass(&self, image_index: u32, load_op: AttachmentLoadOp) -> Result<RenderPassHandle> {
        let passes = match load_op {
            AttachmentLoadOp::Clear => &self.clear_render_passes,
            _ => &self.load_render_passes,
        };
        passes.get(image_index as usize).copied().ok_or(GrfxError::OutOfRange)
    }

    pub fn api(&self) -> Option<&dyn SwapchainApi> {
        self.api.as_deref()
    }
}
