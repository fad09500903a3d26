//! Error codes shared by the generic layer and both backends.

use thiserror::Error;

/// Result alias used by every fallible grfx call.
pub type Result<T> = std::result::Result<T, GrfxError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum GrfxError {
    #[error("operation failed")]
    Failed,
    #[error("allocation failed")]
    AllocationFailed,
    #[error("out of memory")]
    OutOfMemory,
    #[error("element not found")]
    ElementNotFound,
    #[error("value out of range")]
    OutOfRange,
    #[error("duplicate element")]
    DuplicateElement,
    #[error("limit exceeded")]
    LimitExceeded,
    #[error("buffer is smaller than the minimum size for its usage")]
    MinimumBufferSizeNotMet,
    #[error("unexpected null argument")]
    UnexpectedNullArgument,
    #[error("unexpected count value")]
    UnexpectedCountValue,
    #[error("invalid create argument")]
    InvalidCreateArgument,
    #[error("unsupported api")]
    UnsupportedApi,
    #[error("required feature unavailable")]
    RequiredFeatureUnavailable,
    #[error("native api call failed")]
    ApiFailure,
    #[error("wait timed out")]
    WaitTimedOut,
    #[error("wait failed")]
    WaitFailed,
    #[error("no queues available")]
    NoQueuesAvailable,
    #[error("unknown descriptor type")]
    UnknownDescriptorType,
    #[error("binding is not declared in the descriptor set layout")]
    BindingNotInSet,
    #[error("set number is not unique")]
    NonUniqueSet,
    #[error("invalid binding number")]
    InvalidBindingNumber,
    #[error("invalid set number")]
    InvalidSetNumber,
    #[error("operation requires a timeline semaphore")]
    InvalidSemaphoreType,
    #[error("unsupported swapchain format")]
    UnsupportedSwapchainFormat,
    #[error("unsupported present mode")]
    UnsupportedPresentMode,
}

impl GrfxError {
    /// Timeouts may succeed on retry; every other code is terminal for the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GrfxError::WaitTimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeout_is_retryable() {
        assert!(GrfxError::WaitTimedOut.is_retryable());
        assert!(!GrfxError::WaitFailed.is_retryable());
        assert!(!GrfxError::ApiFailure.is_retryable());
    }

    #[test]
    fn messages_are_readable() {
        assert_eq!(
            GrfxError::BindingNotInSet.to_string(),
            "binding is not declared in the descriptor set layout"
        );
    }
}
