//! GPU error types.
//!
//! Native error codes are translated into [`GpuError`] at the point they cross
//! into this crate. Callers can use [`GpuError::kind`] to branch on the broad
//! category without matching every variant.

use thiserror::Error;

/// Result type used throughout the crate.
pub type GpuResult<T> = Result<T, GpuError>;

/// Errors that can occur in the GPU device layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    /// The environment cannot host a device: no adapter, missing required
    /// capability, or driver not compiled in.
    #[error("unsupported environment: {0}")]
    Unsupported(String),
    /// A native allocation failed (host memory, device memory, or pools).
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    /// The caller broke the usage contract of the API.
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),
    /// The presentation surface is temporarily unusable (out of date, lost).
    #[error("surface unavailable: {0}")]
    SurfaceUnavailable(String),
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The GPU device was lost.
    #[error("device lost: {0}")]
    DeviceLost(String),
    /// Any other native backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Broad error category, see [`GpuError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fatal to device creation.
    Unsupported,
    /// The operation was aborted without retaining partial state.
    ResourceExhausted,
    /// Programmer error, not retried internally.
    ContractViolation,
    /// The caller may retry.
    Transient,
    /// Device loss and unclassified native failures.
    Fatal,
}

impl GpuError {
    /// Categorize this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::OutOfMemory(_) => ErrorKind::ResourceExhausted,
            Self::ContractViolation(_) | Self::InvalidParameter(_) => ErrorKind::ContractViolation,
            Self::SurfaceUnavailable(_) => ErrorKind::Transient,
            Self::DeviceLost(_) | Self::Backend(_) => ErrorKind::Fatal,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Specific misuse of the recording, submission, or synchronization API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ContractViolation {
    /// A pass was begun while another pass is open.
    #[error("a {open} pass is already open")]
    PassAlreadyOpen { open: &'static str },
    /// A pass-scoped call was issued without the matching pass open.
    #[error("{operation} requires an open {required} pass")]
    PassNotOpen {
        operation: &'static str,
        required: &'static str,
    },
    /// The command buffer was already submitted.
    #[error("command buffer was already submitted")]
    AlreadySubmitted,
    /// The driver failed to submit the command buffer. It can only be
    /// abandoned.
    #[error("command buffer submission failed; it can only be abandoned")]
    SubmitFailed,
    /// The command buffer was never submitted, so it cannot be recycled.
    #[error("command buffer was not submitted")]
    NotSubmitted,
    /// Submission was attempted while a pass is still open.
    #[error("cannot submit while a {open} pass is open")]
    PassOpenAtSubmit { open: &'static str },
    /// The fence is referenced by a submission that has not completed.
    #[error("fence is still in flight")]
    FenceInFlight,
    /// The fence is signaled and must be reset before reuse.
    #[error("fence must be reset before it is submitted again")]
    FenceNotReset,
    /// The fence is unsignaled and no submission will ever signal it.
    #[error("fence has no pending submission to wait for")]
    FenceNeverSubmitted,
    /// A thread-affine object was used from a thread that does not own it.
    #[error("command pool used from a thread that does not own it")]
    WrongThread,
    /// A resource created by a different device was passed in.
    #[error("resource belongs to a different device")]
    ForeignResource,
    /// The window has not been claimed by this device.
    #[error("window was not claimed by this device")]
    WindowNotClaimed,
    /// Present was called without a backbuffer acquired for the window.
    #[error("no backbuffer acquired for this window")]
    NoBackbufferAcquired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GpuError::OutOfMemory("command pool".to_string());
        assert_eq!(err.to_string(), "out of memory: command pool");

        let err = GpuError::from(ContractViolation::PassAlreadyOpen { open: "render" });
        assert_eq!(
            err.to_string(),
            "contract violation: a render pass is already open"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            GpuError::Unsupported("no GPU".into()).kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            GpuError::from(ContractViolation::FenceInFlight).kind(),
            ErrorKind::ContractViolation
        );
        assert!(GpuError::SurfaceUnavailable("out of date".into()).is_transient());
        assert!(!GpuError::DeviceLost("hang".into()).is_transient());
    }
}
