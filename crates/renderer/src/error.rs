//! Error type of the frame core.

use deferred_resources::ResourceError;
use deferred_rhi::RhiError;
use thiserror::Error;

/// Errors reported by the renderer.
///
/// Device loss is kept apart from every other failure: it is the one error a
/// caller may want to recover from by recreating the device, so
/// [`RenderError::is_device_lost`] looks through initialization wrappers.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The device stopped executing work; the fence will not advance.
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// An initialization step failed.
    #[error("Initialization failed while creating {stage}: {source}")]
    Initialization {
        /// What was being created.
        stage: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<RenderError>,
    },

    /// An operation needs [`Renderer::initialize`](crate::Renderer::initialize) first.
    #[error("Renderer is not initialized")]
    NotInitialized,

    /// [`Renderer::initialize`](crate::Renderer::initialize) was called twice.
    #[error("Renderer is already initialized")]
    AlreadyInitialized,

    /// An API precondition was violated by the caller.
    #[error("Contract violation: {0}")]
    Contract(String),

    /// Any other device error.
    #[error("RHI error: {0}")]
    Rhi(RhiError),

    /// The model could not be loaded or failed validation.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// The configuration is invalid.
    #[error("Config error: {0}")]
    Config(#[from] deferred_core::Error),
}

impl From<RhiError> for RenderError {
    fn from(error: RhiError) -> Self {
        match error {
            RhiError::DeviceLost(reason) => RenderError::DeviceLost(reason),
            RhiError::InvalidUsage(message) => RenderError::Contract(message),
            other => RenderError::Rhi(other),
        }
    }
}

impl RenderError {
    /// Returns true if the device was lost, directly or during initialization.
    pub fn is_device_lost(&self) -> bool {
        match self {
            RenderError::DeviceLost(_) => true,
            RenderError::Initialization { source, .. } => source.is_device_lost(),
            _ => false,
        }
    }

    /// Reports any failure of a blocking wait as device loss.
    pub(crate) fn from_wait(error: RhiError) -> Self {
        match error {
            RhiError::DeviceLost(reason) => RenderError::DeviceLost(reason),
            other => RenderError::DeviceLost(format!("fence wait failed: {}", other)),
        }
    }
}

/// Result type alias using [`RenderError`].
pub type RenderResult<T> = Result<T, RenderError>;

/// Tags errors with the initialization stage they happened in.
pub(crate) trait InitStage<T> {
    fn stage(self, stage: &'static str) -> RenderResult<T>;
}

impl<T, E: Into<RenderError>> InitStage<T> for Result<T, E> {
    fn stage(self, stage: &'static str) -> RenderResult<T> {
        self.map_err(|e| RenderError::Initialization {
            stage,
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rhi_errors_are_routed() {
        assert!(matches!(
            RenderError::from(RhiError::DeviceLost("hung".into())),
            RenderError::DeviceLost(_)
        ));
        assert!(matches!(
            RenderError::from(RhiError::InvalidUsage("too small".into())),
            RenderError::Contract(_)
        ));
        assert!(matches!(
            RenderError::from(RhiError::AllocationFailed("oom".into())),
            RenderError::Rhi(RhiError::AllocationFailed(_))
        ));
    }

    #[test]
    fn test_device_lost_seen_through_initialization() {
        let result: Result<(), RhiError> = Err(RhiError::DeviceLost("removed".into()));
        let err = result.stage("frame targets").unwrap_err();
        assert!(err.is_device_lost());
        assert!(err.to_string().contains("frame targets"));

        let result: Result<(), RhiError> = Err(RhiError::AllocationFailed("heap".into()));
        assert!(!result.stage("descriptors").unwrap_err().is_device_lost());
    }

    #[test]
    fn test_wait_failures_are_device_lost() {
        let err = RenderError::from_wait(RhiError::Validation("bad".into()));
        assert!(err.is_device_lost());
    }
}
