//! Fences for CPU-GPU synchronization.
//!
//! A fence is handed to [`GpuDevice::submit`] and becomes signaled when the
//! submission completed. The device tracks whether a submission that will
//! signal the fence is outstanding, which lets it reject waits that could
//! never return and resets that would race the GPU.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::device::GpuDevice;
use crate::driver::GpuFence;
use crate::error::{ContractViolation, GpuResult};
use crate::resources::{DeviceOwned, DeviceRef};

/// A fence created by [`GpuDevice::create_fence`].
pub struct Fence {
    device: DeviceRef,
    raw: GpuFence,
    /// A submission referencing the fence has not been observed complete.
    pending: AtomicBool,
}

impl Fence {
    pub(crate) fn raw(&self) -> &GpuFence {
        &self.raw
    }

    /// Whether a submission that will signal this fence is outstanding.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn mark_pending(&self) {
        self.pending.store(true, Ordering::Release);
    }

    fn clear_pending(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

impl DeviceOwned for Fence {
    fn owner(&self) -> &DeviceRef {
        &self.device
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("raw", &self.raw)
            .field("pending", &self.is_pending())
            .finish()
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);

impl GpuDevice {
    /// Create an unsignaled fence.
    pub fn create_fence(self: &std::sync::Arc<Self>) -> GpuResult<Fence> {
        let raw = self.driver().create_fence()?;
        Ok(Fence {
            device: DeviceRef::new(self),
            raw,
            pending: AtomicBool::new(false),
        })
    }

    /// Whether the fence is signaled, without blocking.
    pub fn query_fence(&self, fence: &Fence) -> GpuResult<bool> {
        self.check_owned(fence)?;
        let signaled = self.driver().query_fence(&fence.raw)?;
        if signaled {
            fence.clear_pending();
        }
        Ok(signaled)
    }

    /// Return a fence to the unsignaled state so it can be submitted again.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::FenceInFlight`] while the submission that will
    /// signal it has not completed.
    pub fn reset_fence(&self, fence: &Fence) -> GpuResult<()> {
        self.check_owned(fence)?;
        if fence.is_pending() && !self.query_fence(fence)? {
            return Err(ContractViolation::FenceInFlight.into());
        }
        self.driver().reset_fence(&fence.raw)?;
        fence.clear_pending();
        Ok(())
    }

    /// Block until the fence is signaled.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::FenceNeverSubmitted`] when the fence is
    /// unsignaled and no submission will signal it.
    pub fn wait_fence(&self, fence: &Fence) -> GpuResult<()> {
        self.wait_fence_inner(fence, None).map(|_| ())
    }

    /// Like [`wait_fence`](Self::wait_fence), giving up after `timeout`.
    /// Returns whether the fence is signaled. A zero timeout polls.
    pub fn wait_fence_timeout(&self, fence: &Fence, timeout: Duration) -> GpuResult<bool> {
        self.wait_fence_inner(fence, Some(timeout))
    }

    fn wait_fence_inner(&self, fence: &Fence, timeout: Option<Duration>) -> GpuResult<bool> {
        if self.query_fence(fence)? {
            return Ok(true);
        }
        if !fence.is_pending() {
            return Err(ContractViolation::FenceNeverSubmitted.into());
        }
        let signaled = self.driver().wait_fence(&fence.raw, timeout)?;
        if signaled {
            fence.clear_pending();
        }
        Ok(signaled)
    }

    /// Check that `fence` may be attached to a new submission.
    pub(crate) fn check_fence_submittable(&self, fence: &Fence) -> GpuResult<()> {
        if self.query_fence(fence)? {
            return Err(ContractViolation::FenceNotReset.into());
        }
        if fence.is_pending() {
            return Err(ContractViolation::FenceInFlight.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;
    use crate::{DeviceParameters, DriverKind};
    use std::sync::Arc;

    fn device() -> Arc<GpuDevice> {
        GpuDevice::new(DeviceParameters::new().with_driver(DriverKind::Dummy)).unwrap()
    }

    fn violation(err: GpuError) -> ContractViolation {
        match err {
            GpuError::ContractViolation(v) => v,
            other => panic!("expected a contract violation, got {other:?}"),
        }
    }

    #[test]
    fn test_fence_lifecycle() {
        let device = device();
        let fence = device.create_fence().unwrap();
        assert!(!device.query_fence(&fence).unwrap());
        assert_eq!(
            violation(device.wait_fence(&fence).unwrap_err()),
            ContractViolation::FenceNeverSubmitted
        );

        let mut cmd = device.acquire_command_buffer(None).unwrap();
        device.submit(&mut cmd, Some(&fence)).unwrap();

        // The dummy driver completes work at submission.
        assert!(device.query_fence(&fence).unwrap());
        assert!(!fence.is_pending());
        device.wait_fence(&fence).unwrap();
        assert!(device.wait_fence_timeout(&fence, Duration::ZERO).unwrap());

        device.reset_fence(&fence).unwrap();
        assert!(!device.query_fence(&fence).unwrap());
        assert_eq!(
            violation(device.wait_fence(&fence).unwrap_err()),
            ContractViolation::FenceNeverSubmitted
        );
        device.recycle_command_buffer(cmd).unwrap();
    }

    #[test]
    fn test_signaled_fence_must_be_reset_before_reuse() {
        let device = device();
        let fence = device.create_fence().unwrap();

        let mut first = device.acquire_command_buffer(None).unwrap();
        device.submit(&mut first, Some(&fence)).unwrap();

        let mut second = device.acquire_command_buffer(None).unwrap();
        assert_eq!(
            violation(device.submit(&mut second, Some(&fence)).unwrap_err()),
            ContractViolation::FenceNotReset
        );
        // The rejected submission left the command buffer usable.
        device.reset_fence(&fence).unwrap();
        device.submit(&mut second, Some(&fence)).unwrap();
    }

    #[test]
    fn test_fence_from_other_device_rejected() {
        let a = device();
        let b = device();
        let fence = a.create_fence().unwrap();
        assert_eq!(
            violation(b.query_fence(&fence).unwrap_err()),
            ContractViolation::ForeignResource
        );
    }
}
