//! Command queues and submission.

use crate::backend::QueueApi;
use crate::command::CommandBuffer;
use crate::error::Result;
use crate::sync::{Fence, Semaphore};
use crate::types::CommandType;
use crate::{CommandBufferHandle, FenceHandle, SemaphoreHandle};
use parking_lot::Mutex;
use std::sync::Arc;

/// One submission. `wait_values`/`signal_values` parallel the semaphore lists and are read for
/// timeline semaphores only.
#[derive(Debug, Clone, Default)]
pub struct SubmitInfo {
    pub command_buffers: Vec<CommandBufferHandle>,
    pub wait_semaphores: Vec<SemaphoreHandle>,
    pub wait_values: Vec<u64>,
    pub signal_semaphores: Vec<SemaphoreHandle>,
    pub signal_values: Vec<u64>,
    pub fence: Option<FenceHandle>,
}

/// A submission with handles resolved and signal values assigned.
#[derive(Debug, Default)]
pub struct SubmitBatch<'a> {
    pub command_buffers: Vec<&'a CommandBuffer>,
    pub waits: Vec<(&'a Semaphore, u64)>,
    pub signals: Vec<(&'a Semaphore, u64)>,
    pub fence: Option<(&'a Fence, u64)>,
}

#[derive(Debug)]
pub struct Queue {
    command_type: CommandType,
    index: u32,
    idle_fence: Fence,
    command_buffer_lock: Arc<Mutex<()>>,
    api: Box<dyn QueueApi>,
}

impl Queue {
    pub(crate) fn new(command_type: CommandType, index: u32, idle_fence: Fence, api: Box<dyn QueueApi>) -> Self {
        Self { command_type, index, idle_fence, command_buffer_lock: Arc::new(Mutex::new(())), api }
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    /// Index among queues of the same type.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn api(&self) -> &dyn QueueApi {
        self.api.as_ref()
    }

    /// Blocks until everything submitted so far has executed.
    pub fn wait_idle(&self) -> Result<()> {
        let value = self.idle_fence.next_signal_value();
        self.api.signal_fence(&self.idle_fence, value)?;
        self.idle_fence.wait_and_reset(u64::MAX)
    }

    /// Ticks per second of timestamps written on this queue.
    pub fn timestamp_frequency(&self) -> Result<u64> {
        self.api.timestamp_frequency()
    }

    /// Serializes command-buffer creation against this queue. Returned shared so the guard can
    /// outlive a borrow of the queue itself.
    pub(crate) fn command_buffer_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.command_buffer_lock)
    }
}
