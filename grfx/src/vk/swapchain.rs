//! VkSwapchainKHR over a window surface.

use std::any::Any;
use std::sync::Arc;

use ash::vk;

use super::instance::VulkanSurface;
use super::queue::native_queue;
use super::resource::VulkanImage;
use super::sync::{native_fence, native_semaphore};
use super::util::{self, vk_error};
use super::DeviceShared;
use crate::backend::{ImageApi, SwapchainApi};
use crate::error::{GrfxError, Result};
use crate::queue::Queue;
use crate::swapchain::{Surface, SwapchainCreateInfo};
use crate::sync::{Fence, Semaphore};
use crate::types::PresentMode;

/// FIFO is always available, so an unsupported mode falls back to it.
fn choose_present_mode(supported: &[PresentMode], requested: PresentMode) -> vk::PresentModeKHR {
    if supported.contains(&requested) {
        return util::present_mode_to_vk(requested);
    }
    log::warn!("{:?} is not supported by the surface, using FIFO", requested);
    vk::PresentModeKHR::FIFO
}

/// The surface decides the extent unless it reports the special value `u32::MAX`.
fn swapchain_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

fn native_surface(surface: &Surface) -> Result<&VulkanSurface> {
    surface.native().as_any().downcast_ref::<VulkanSurface>().ok_or(GrfxError::UnsupportedApi)
}

pub struct VulkanSwapchain {
    shared: Arc<DeviceShared>,
    surface: Surface,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    min_image_count: u32,
    image_format: vk::Format,
    present_mode: vk::PresentModeKHR,
}

impl VulkanSwapchain {
    pub fn new(shared: &Arc<DeviceShared>, _queue: &Queue, info: &SwapchainCreateInfo) -> Result<Self> {
        let surface = info.surface.clone().ok_or(GrfxError::UnexpectedNullArgument)?;
        if !surface.supports_format(info.color_format) {
            log::error!("{:?} is not a supported swapchain format", info.color_format);
            return Err(GrfxError::UnsupportedSwapchainFormat);
        }
        let mut swapchain = Self {
            shared: Arc::clone(shared),
            min_image_count: surface.clamp_image_count(info.image_count),
            image_format: util::format_to_vk(info.color_format),
            present_mode: choose_present_mode(&surface.capabilities().present_modes, info.present_mode),
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
        };
        swapchain.recreate(info.width, info.height)?;
        log::debug!(
            "VkSwapchainKHR: {} images, {:?}, {:?}",
            swapchain.images.len(),
            swapchain.image_format,
            swapchain.present_mode
        );
        Ok(swapchain)
    }

    /// Builds a swapchain that replaces the current one, then destroys the old one.
    fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        let surface = native_surface(&self.surface)?;
        let caps = surface.surface_capabilities()?;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.native())
            .min_image_count(self.min_image_count)
            .image_format(self.image_format)
            .image_color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .image_extent(swapchain_extent(&caps, width, height))
            .image_array_layers(1)
            .image_usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST,
            )
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);
        let loader = &self.shared.swapchain;
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }.map_err(|r| match r {
            vk::Result::ERROR_FORMAT_NOT_SUPPORTED => GrfxError::UnsupportedSwapchainFormat,
            other => vk_error(other, "vkCreateSwapchainKHR"),
        })?;
        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(r) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(vk_error(r, "vkGetSwapchainImagesKHR"));
            }
        };
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { loader.destroy_swapchain(self.swapchain, None) };
        }
        self.swapchain = swapchain;
        self.images = images;
        Ok(())
    }

    pub fn native(&self) -> vk::SwapchainKHR {
        self.swapchain
    }
}

impl std::fmt::Debug for VulkanSwapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSwapchain")
            .field("swapchain", &self.swapchain)
            .field("images", &self.images.len())
            .field("present_mode", &self.present_mode)
            .finish_non_exhaustive()
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe { self.shared.swapchain.destroy_swapchain(self.swapchain, None) };
    }
}

impl SwapchainApi for VulkanSwapchain {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn color_images(&mut self) -> Result<Vec<Box<dyn ImageApi>>> {
        Ok(self
            .images
            .iter()
            .map(|image| Box::new(VulkanImage::from_native(&self.shared, *image)) as Box<dyn ImageApi>)
            .collect())
    }

    fn acquire_next_image(
        &mut self,
        timeout_ns: u64,
        _queue: &Queue,
        semaphore: Option<&Semaphore>,
        fence: Option<&Fence>,
    ) -> Result<u32> {
        let semaphore = semaphore.map(native_semaphore).transpose()?.unwrap_or_default();
        let fence = fence.map(native_fence).transpose()?.unwrap_or_default();
        match unsafe { self.shared.swapchain.acquire_next_image(self.swapchain, timeout_ns, semaphore, fence) } {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    log::warn!("swapchain is suboptimal for its surface");
                }
                Ok(image_index)
            }
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Err(GrfxError::WaitTimedOut),
            Err(other) => Err(vk_error(other, "vkAcquireNextImageKHR")),
        }
    }

    fn present(&mut self, queue: &Queue, image_index: u32, wait_semaphores: &[&Semaphore]) -> Result<()> {
        let waits = wait_semaphores.iter().map(|s| native_semaphore(s)).collect::<Result<Vec<_>>>()?;
        let swapchains = [self.swapchain];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        let loader = &self.shared.swapchain;
        let suboptimal = native_queue(queue)?
            .with_native(|q| unsafe { loader.queue_present(q, &present_info) })
            .map_err(|r| vk_error(r, "vkQueuePresentKHR"))?;
        if suboptimal {
            log::warn!("presented to a suboptimal swapchain");
        }
        Ok(())
    }

    /// Waits for the device to go idle so the retired swapchain has no pending work.
    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe { self.shared.raw.device_wait_idle() }.map_err(|r| vk_error(r, "vkDeviceWaitIdle"))?;
        self.surface.refresh()?;
        self.recreate(width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_present_modes_fall_back_to_fifo() {
        let supported = [PresentMode::Fifo, PresentMode::Mailbox];
        assert_eq!(choose_present_mode(&supported, PresentMode::Immediate), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&supported, PresentMode::Mailbox), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn surface_extent_wins_unless_undefined() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 1280, height: 720 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            ..Default::default()
        };
        let extent = swapchain_extent(&caps, 640, 480);
        assert_eq!((extent.width, extent.height), (1280, 720));

        caps.current_extent = vk::Extent2D { width: u32::MAX, height: u32::MAX };
        let extent = swapchain_extent(&caps, 640, 8000);
        assert_eq!((extent.width, extent.height), (640, 4096));
    }
}
