//! Fences and semaphores.
//!
//! Both carry a monotonically increasing signal value on top of the native primitive. Every
//! signal site takes `next_signal_value()`; every wait site uses `wait_for_value()`.

use crate::backend::{FenceApi, SemaphoreApi};
use crate::error::{GrfxError, Result};
use crate::types::SemaphoreType;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Default)]
pub struct FenceCreateInfo {
    /// Create already signaled so the first wait returns immediately.
    pub signaled: bool,
}

#[derive(Debug)]
pub struct Fence {
    create_info: FenceCreateInfo,
    value: AtomicU64,
    api: Box<dyn FenceApi>,
}

impl Fence {
    pub(crate) fn new(create_info: FenceCreateInfo, api: Box<dyn FenceApi>) -> Self {
        Self { create_info, value: AtomicU64::new(0), api }
    }

    pub fn create_info(&self) -> &FenceCreateInfo {
        &self.create_info
    }

    /// Advances the counter and returns the value the next signal must use.
    pub fn next_signal_value(&self) -> u64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// The most recently issued signal value.
    pub fn wait_for_value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Blocks until the last issued signal completes. `u64::MAX` waits forever.
    pub fn wait(&self, timeout_ns: u64) -> Result<()> {
        self.api.wait(self.wait_for_value(), timeout_ns)
    }

    pub fn reset(&self) -> Result<()> {
        self.api.reset()
    }

    pub fn wait_and_reset(&self, timeout_ns: u64) -> Result<()> {
        self.wait(timeout_ns)?;
        self.reset()
    }

    pub fn api(&self) -> &dyn FenceApi {
        self.api.as_ref()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SemaphoreCreateInfo {
    pub semaphore_type: SemaphoreType,
    /// Timeline semaphores only.
    pub initial_value: u64,
}

impl SemaphoreCreateInfo {
    pub fn timeline(initial_value: u64) -> Self {
        Self { semaphore_type: SemaphoreType::Timeline, initial_value }
    }
}

#[derive(Debug)]
pub struct Semaphore {
    create_info: SemaphoreCreateInfo,
    value: AtomicU64,
    api: Box<dyn SemaphoreApi>,
}

impl Semaphore {
    pub(crate) fn new(create_info: SemaphoreCreateInfo, api: Box<dyn SemaphoreApi>) -> Self {
        Self { create_info, value: AtomicU64::new(0), api }
    }

    pub fn semaphore_type(&self) -> SemaphoreType {
        self.create_info.semaphore_type
    }

    pub fn is_timeline(&self) -> bool {
        self.create_info.semaphore_type == SemaphoreType::Timeline
    }

    /// Binary-semaphore counter; timeline semaphores carry caller-chosen values instead.
    pub fn next_signal_value(&self) -> u64 {
        assert!(!self.is_timeline(), "signal value counter is only valid on binary semaphores");
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn wait_for_value(&self) -> u64 {
        assert!(!self.is_timeline(), "signal value counter is only valid on binary semaphores");
        self.value.load(Ordering::Acquire)
    }

    pub fn timeline_signal(&self, value: u64) -> Result<()> {
        self.require_timeline()?;
        self.api.timeline_signal(value)
    }

    pub fn timeline_wait(&self, value: u64, timeout_ns: u64) -> Result<()> {
        self.require_timeline()?;
        self.api.timeline_wait(value, timeout_ns)
    }

    pub fn timeline_counter_value(&self) -> Result<u64> {
        self.require_timeline()?;
        self.api.timeline_counter_value()
    }

    pub fn api(&self) -> &dyn SemaphoreApi {
        self.api.as_ref()
    }

    fn require_timeline(&self) -> Result<()> {
        if self.is_timeline() {
            Ok(())
        } else {
            Err(GrfxError::InvalidSemaphoreType)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NullFence;

    impl FenceApi for NullFence {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn wait(&self, _value: u64, _timeout_ns: u64) -> Result<()> {
            Ok(())
        }

        fn reset(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct NullSemaphore;

    impl SemaphoreApi for NullSemaphore {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn timeline_signal(&self, _value: u64) -> Result<()> {
            Ok(())
        }

        fn timeline_wait(&self, _value: u64, _timeout_ns: u64) -> Result<()> {
            Ok(())
        }

        fn timeline_counter_value(&self) -> Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn signal_values_are_strictly_increasing() {
        let fence = Fence::new(FenceCreateInfo::default(), Box::new(NullFence));
        let mut last = fence.wait_for_value();
        for _ in 0..100 {
            let next = fence.next_signal_value();
            assert!(next > last);
            assert_eq!(fence.wait_for_value(), next);
            last = next;
        }
    }

    #[test]
    fn binary_semaphores_reject_timeline_calls() {
        let sem = Semaphore::new(SemaphoreCreateInfo::default(), Box::new(NullSemaphore));
        assert_eq!(sem.timeline_signal(1), Err(GrfxError::InvalidSemaphoreType));
        assert_eq!(sem.timeline_counter_value(), Err(GrfxError::InvalidSemaphoreType));
        assert_eq!(sem.next_signal_value(), 1);
        assert_eq!(sem.next_signal_value(), 2);
        assert_eq!(sem.wait_for_value(), 2);
    }

    #[test]
    #[should_panic(expected = "binary semaphores")]
    fn timeline_semaphores_have_no_binary_counter() {
        let sem = Semaphore::new(SemaphoreCreateInfo::timeline(0), Box::new(NullSemaphore));
        sem.next_signal_value();
    }
}
