//! VkFence and VkSemaphore behind the generic fence and semaphore.

use std::any::Any;
use std::sync::Arc;

use ash::vk;

use super::util::{vk_error, wait_result};
use super::DeviceShared;
use crate::backend::{FenceApi, SemaphoreApi};
use crate::error::{GrfxError, Result};
use crate::sync::{Fence, FenceCreateInfo, Semaphore, SemaphoreCreateInfo};
use crate::types::SemaphoreType;

fn status(result: ash::prelude::VkResult<()>) -> vk::Result {
    result.err().unwrap_or(vk::Result::SUCCESS)
}

#[derive(Debug)]
pub struct VulkanFence {
    shared: Arc<DeviceShared>,
    fence: vk::Fence,
}

impl VulkanFence {
    pub fn new(shared: &Arc<DeviceShared>, info: &FenceCreateInfo) -> Result<Self> {
        let flags = if info.signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { shared.raw.create_fence(&create_info, None) }.map_err(|r| vk_error(r, "vkCreateFence"))?;
        Ok(Self { shared: Arc::clone(shared), fence })
    }

    pub fn native(&self) -> vk::Fence {
        self.fence
    }
}

impl FenceApi for VulkanFence {
    fn as_any(&self) -> &dyn Any {
        self
    }

    /// VkFence is binary; the value is ignored.
    fn wait(&self, _value: u64, timeout_ns: u64) -> Result<()> {
        let result = unsafe { self.shared.raw.wait_for_fences(&[self.fence], true, timeout_ns) };
        wait_result(status(result), "vkWaitForFences")
    }

    fn reset(&self) -> Result<()> {
        unsafe { self.shared.raw.reset_fences(&[self.fence]) }.map_err(|r| vk_error(r, "vkResetFences"))
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe { self.shared.raw.destroy_fence(self.fence, None) };
    }
}

#[derive(Debug)]
pub struct VulkanSemaphore {
    shared: Arc<DeviceShared>,
    semaphore: vk::Semaphore,
    semaphore_type: SemaphoreType,
}

impl VulkanSemaphore {
    pub fn new(shared: &Arc<DeviceShared>, info: &SemaphoreCreateInfo) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(match info.semaphore_type {
                SemaphoreType::Binary => vk::SemaphoreType::BINARY,
                SemaphoreType::Timeline => vk::SemaphoreType::TIMELINE,
            })
            .initial_value(info.initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let semaphore =
            unsafe { shared.raw.create_semaphore(&create_info, None) }.map_err(|r| vk_error(r, "vkCreateSemaphore"))?;
        Ok(Self { shared: Arc::clone(shared), semaphore, semaphore_type: info.semaphore_type })
    }

    pub fn native(&self) -> vk::Semaphore {
        self.semaphore
    }

    pub fn semaphore_type(&self) -> SemaphoreType {
        self.semaphore_type
    }

    fn timeline(&self, call: &str) -> Result<()> {
        if self.semaphore_type != SemaphoreType::Timeline {
            log::error!("{} on a binary semaphore", call);
            return Err(GrfxError::ApiFailure);
        }
        Ok(())
    }
}

impl SemaphoreApi for VulkanSemaphore {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn timeline_signal(&self, value: u64) -> Result<()> {
        self.timeline("vkSignalSemaphore")?;
        let info = vk::SemaphoreSignalInfo::default().semaphore(self.semaphore).value(value);
        self.shared.signal_semaphore(&info).map_err(|r| vk_error(r, "vkSignalSemaphore"))
    }

    fn timeline_wait(&self, value: u64, timeout_ns: u64) -> Result<()> {
        self.timeline("vkWaitSemaphores")?;
        let semaphores = [self.semaphore];
        let values = [value];
        let info = vk::SemaphoreWaitInfo::default().semaphores(&semaphores).values(&values);
        wait_result(status(self.shared.wait_semaphores(&info, timeout_ns)), "vkWaitSemaphores")
    }

    fn timeline_counter_value(&self) -> Result<u64> {
        self.timeline("vkGetSemaphoreCounterValue")?;
        self.shared.semaphore_counter_value(self.semaphore).map_err(|r| vk_error(r, "vkGetSemaphoreCounterValue"))
    }
}

impl Drop for VulkanSemaphore {
    fn drop(&mut self) {
        unsafe { self.shared.raw.destroy_semaphore(self.semaphore, None) };
    }
}

pub(crate) fn native_fence(fence: &Fence) -> Result<vk::Fence> {
    fence.api().as_any().downcast_ref::<VulkanFence>().map(VulkanFence::native).ok_or(GrfxError::UnsupportedApi)
}

pub(crate) fn native_semaphore(semaphore: &Semaphore) -> Result<vk::Semaphore> {
    semaphore
        .api()
        .as_any()
        .downcast_ref::<VulkanSemaphore>()
        .map(VulkanSemaphore::native)
        .ok_or(GrfxError::UnsupportedApi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCreateInfo;
    use crate::vk::testing;

    fn shared() -> Option<(crate::instance::Instance, Arc<DeviceShared>)> {
        let (instance, handle) = testing::device(DeviceCreateInfo::default())?;
        let shared = testing::shared(&instance, handle);
        Some((instance, shared))
    }

    #[test]
    fn signaled_fences_pass_until_reset() {
        let Some((_instance, shared)) = shared() else { return };
        let fence = VulkanFence::new(&shared, &FenceCreateInfo { signaled: true }).unwrap();
        assert_eq!(fence.wait(1, 0), Ok(()));
        fence.reset().unwrap();
        assert_eq!(fence.wait(1, 1_000), Err(GrfxError::WaitTimedOut));
    }

    #[test]
    fn timeline_values_advance_on_host_signal() {
        let Some((_instance, shared)) = shared() else { return };
        let semaphore = VulkanSemaphore::new(&shared, &SemaphoreCreateInfo::timeline(3)).unwrap();
        assert_eq!(semaphore.timeline_counter_value(), Ok(3));
        assert_eq!(semaphore.timeline_wait(4, 0), Err(GrfxError::WaitTimedOut));
        semaphore.timeline_signal(4).unwrap();
        assert_eq!(semaphore.timeline_wait(4, 0), Ok(()));
        assert_eq!(semaphore.timeline_counter_value(), Ok(4));
    }

    #[test]
    fn binary_semaphores_have_no_counter() {
        let Some((_instance, shared)) = shared() else { return };
        let semaphore = VulkanSemaphore::new(&shared, &SemaphoreCreateInfo::default()).unwrap();
        assert_eq!(semaphore.semaphore_type(), SemaphoreType::Binary);
        assert_eq!(semaphore.timeline_counter_value(), Err(GrfxError::ApiFailure));
        assert_eq!(semaphore.timeline_signal(1), Err(GrfxError::ApiFailure));
    }
}
