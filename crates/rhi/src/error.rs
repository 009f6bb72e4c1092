//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RhiError {
    /// The device stopped executing work. Every later wait or submission
    /// fails with this error; recovery needs a new device.
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// A buffer, texture or heap could not be allocated
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    /// No backend device could be created for the surface
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Surface error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// A caller broke an API precondition (wrong sizes, wrong memory
    /// location for a host write, and the like)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// A submitted command stream failed validation on the queue
    #[error("Validation error: {0}")]
    Validation(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RhiError {
    /// Returns true for [`RhiError::DeviceLost`].
    pub fn is_device_lost(&self) -> bool {
        matches!(self, RhiError::DeviceLost(_))
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
