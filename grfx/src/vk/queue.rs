use std::any::Any;
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use super::command::VulkanCommandBuffer;
use super::sync::{native_fence, native_semaphore};
use super::util::vk_error;
use super::DeviceShared;
use crate::backend::QueueApi;
use crate::error::{GrfxError, Result};
use crate::queue::SubmitBatch;
use crate::sync::{Fence, Semaphore};
use crate::types::CommandType;

/// Ticks per second from the device's nanoseconds-per-tick period.
fn timestamp_frequency(period: f32) -> Result<u64> {
    if period <= 0.0 {
        return Err(GrfxError::Failed);
    }
    Ok((1.0e9 / period as f64) as u64)
}

#[derive(Debug)]
pub struct VulkanQueue {
    shared: Arc<DeviceShared>,
    /// vkQueueSubmit and vkQueuePresentKHR need external synchronization.
    queue: Mutex<vk::Queue>,
    family_index: u32,
}

impl VulkanQueue {
    pub fn new(shared: &Arc<DeviceShared>, command_type: CommandType, index: u32) -> Result<Self> {
        let family_index = shared.queue_family(command_type)?;
        let queue = unsafe { shared.raw.get_device_queue(family_index, index) };
        log::debug!("{:?} queue {} from family {}", command_type, index, family_index);
        Ok(Self { shared: Arc::clone(shared), queue: Mutex::new(queue), family_index })
    }

    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// Runs `f` with the queue locked.
    pub(crate) fn with_native<T>(&self, f: impl FnOnce(vk::Queue) -> T) -> T {
        f(*self.queue.lock())
    }

    fn submit_one(
        &self,
        command_buffers: &[vk::CommandBuffer],
        waits: &[(vk::Semaphore, u64)],
        signals: &[(vk::Semaphore, u64)],
        fence: vk::Fence,
        call: &str,
    ) -> Result<()> {
        let wait_semaphores: Vec<_> = waits.iter().map(|(s, _)| *s).collect();
        let wait_values: Vec<_> = waits.iter().map(|(_, v)| *v).collect();
        let wait_stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; waits.len()];
        let signal_semaphores: Vec<_> = signals.iter().map(|(s, _)| *s).collect();
        let signal_values: Vec<_> = signals.iter().map(|(_, v)| *v).collect();

        // Binary semaphores ignore their entry in the value arrays.
        let mut timeline = vk::TimelineSemaphoreSubmitInfo::default()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline);
        self.with_native(|queue| unsafe { self.shared.raw.queue_submit(queue, &[submit], fence) })
            .map_err(|r| vk_error(r, call))
    }
}

impl QueueApi for VulkanQueue {
    fn as_any(&self) -> &dyn Any {
        self
    }

    /// One VkSubmitInfo: waits, then command buffers, then signals. The fence goes with the submit.
    fn submit(&self, batch: &SubmitBatch<'_>) -> Result<()> {
        let command_buffers = batch
            .command_buffers
            .iter()
            .map(|cmd| {
                cmd.api()
                    .as_any()
                    .downcast_ref::<VulkanCommandBuffer>()
                    .map(VulkanCommandBuffer::native)
                    .ok_or(GrfxError::UnsupportedApi)
            })
            .collect::<Result<Vec<_>>>()?;
        let waits = batch
            .waits
            .iter()
            .map(|(semaphore, value)| Ok((native_semaphore(semaphore)?, *value)))
            .collect::<Result<Vec<_>>>()?;
        let signals = batch
            .signals
            .iter()
            .map(|(semaphore, value)| Ok((native_semaphore(semaphore)?, *value)))
            .collect::<Result<Vec<_>>>()?;
        let fence = batch.fence.map(|(fence, _)| native_fence(fence)).transpose()?.unwrap_or_default();
        self.submit_one(&command_buffers, &waits, &signals, fence, "vkQueueSubmit")
    }

    fn queue_wait(&self, semaphore: &Semaphore, value: u64) -> Result<()> {
        let waits = [(native_semaphore(semaphore)?, value)];
        self.submit_one(&[], &waits, &[], vk::Fence::null(), "vkQueueSubmit (wait)")
    }

    fn queue_signal(&self, semaphore: &Semaphore, value: u64) -> Result<()> {
        let signals = [(native_semaphore(semaphore)?, value)];
        self.submit_one(&[], &[], &signals, vk::Fence::null(), "vkQueueSubmit (signal)")
    }

    /// VkFence is binary; an empty submit signals it once prior work retires.
    fn signal_fence(&self, fence: &Fence, _value: u64) -> Result<()> {
        let fence = native_fence(fence)?;
        self.with_native(|queue| unsafe { self.shared.raw.queue_submit(queue, &[], fence) })
            .map_err(|r| vk_error(r, "vkQueueSubmit (fence)"))
    }

    fn timestamp_frequency(&self) -> Result<u64> {
        timestamp_frequency(self.shared.timestamp_period)
    }
}

pub(crate) fn native_queue(queue: &crate::queue::Queue) -> Result<&VulkanQueue> {
    queue.api().as_any().downcast_ref::<VulkanQueue>().ok_or(GrfxError::UnsupportedApi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_frequency_follows_period() {
        assert_eq!(timestamp_frequency(1.0), Ok(1_000_000_000));
        assert_eq!(timestamp_frequency(4.0), Ok(250_000_000));
        assert_eq!(timestamp_frequency(0.0), Err(GrfxError::Failed));
    }
}
