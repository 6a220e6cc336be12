//! Command recording state machine.
//!
//! ```text
//! Recording ──begin_render_pass──► InPass(Render) ──end_render_pass──► Recording
//! Recording ──begin_blit_pass────► InPass(Blit)   ──end_blit_pass────► Recording
//! Recording ──submit─────────────► Submitted
//! Recording ──submit fails───────► Failed
//! ```
//!
//! Every transition is checked before the driver is asked to record anything,
//! and committed only after the driver succeeded, so a rejected or failed call
//! never changes the state.

use std::fmt;

use crate::error::{ContractViolation, GpuResult};

/// Kind of pass open on a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Render,
    Blit,
}

impl PassKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::Blit => "blit",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Recording state of a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordingState {
    /// Recording, no pass open. The buffer can be submitted.
    #[default]
    Recording,
    /// A pass is open.
    InPass(PassKind),
    /// Handed to the queue. Only recycling is allowed.
    Submitted,
    /// The driver rejected the submission. Only abandoning is allowed.
    Failed,
}

/// Tracks and validates pass transitions of one command buffer.
#[derive(Debug, Clone, Default)]
pub struct PassRecorder {
    state: RecordingState,
}

impl PassRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// The pass currently open, if any.
    pub fn open_pass(&self) -> Option<PassKind> {
        match self.state {
            RecordingState::InPass(kind) => Some(kind),
            _ => None,
        }
    }

    /// Check that a pass of `kind` may begin.
    pub fn check_begin(&self, _kind: PassKind) -> Result<(), ContractViolation> {
        match self.state {
            RecordingState::Recording => Ok(()),
            RecordingState::InPass(open) => Err(ContractViolation::PassAlreadyOpen {
                open: open.name(),
            }),
            RecordingState::Submitted => Err(ContractViolation::AlreadySubmitted),
            RecordingState::Failed => Err(ContractViolation::SubmitFailed),
        }
    }

    /// Begin a pass: validate, run the native `record` step, then commit.
    pub fn begin<T>(&mut self, kind: PassKind, record: impl FnOnce() -> GpuResult<T>) -> GpuResult<T> {
        self.check_begin(kind)?;
        let value = record()?;
        self.state = RecordingState::InPass(kind);
        Ok(value)
    }

    /// Check that `operation` may be recorded, which needs a `kind` pass open.
    pub fn require(&self, kind: PassKind, operation: &'static str) -> Result<(), ContractViolation> {
        match self.state {
            RecordingState::InPass(open) if open == kind => Ok(()),
            RecordingState::Submitted => Err(ContractViolation::AlreadySubmitted),
            RecordingState::Failed => Err(ContractViolation::SubmitFailed),
            _ => Err(ContractViolation::PassNotOpen {
                operation,
                required: kind.name(),
            }),
        }
    }

    /// End the open `kind` pass: validate, run the native `record` step,
    /// then return to [`RecordingState::Recording`].
    pub fn end(
        &mut self,
        kind: PassKind,
        operation: &'static str,
        record: impl FnOnce() -> GpuResult<()>,
    ) -> GpuResult<()> {
        self.require(kind, operation)?;
        record()?;
        self.state = RecordingState::Recording;
        Ok(())
    }

    /// Check that the buffer can be handed to the queue.
    pub fn check_submittable(&self) -> Result<(), ContractViolation> {
        match self.state {
            RecordingState::Recording => Ok(()),
            RecordingState::InPass(open) => {
                Err(ContractViolation::PassOpenAtSubmit { open: open.name() })
            }
            RecordingState::Submitted => Err(ContractViolation::AlreadySubmitted),
            RecordingState::Failed => Err(ContractViolation::SubmitFailed),
        }
    }

    pub fn mark_submitted(&mut self) {
        self.state = RecordingState::Submitted;
    }

    /// The native buffer may already be closed, so nothing more is recorded.
    pub fn mark_failed(&mut self) {
        self.state = RecordingState::Failed;
    }

    pub fn is_submitted(&self) -> bool {
        self.state == RecordingState::Submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;

    fn ok() -> GpuResult<()> {
        Ok(())
    }

    #[test]
    fn test_render_pass_cycle() {
        let mut recorder = PassRecorder::new();
        assert_eq!(recorder.state(), RecordingState::Recording);

        recorder.begin(PassKind::Render, ok).unwrap();
        assert_eq!(recorder.state(), RecordingState::InPass(PassKind::Render));
        assert!(recorder.require(PassKind::Render, "draw").is_ok());

        recorder.end(PassKind::Render, "end_render_pass", ok).unwrap();
        assert_eq!(recorder.state(), RecordingState::Recording);
        assert!(recorder.check_submittable().is_ok());
    }

    #[test]
    fn test_nested_begin_rejected_without_state_change() {
        let mut recorder = PassRecorder::new();
        recorder.begin(PassKind::Render, ok).unwrap();

        let mut recorded = false;
        let err = recorder
            .begin(PassKind::Render, || {
                recorded = true;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(
            err,
            GpuError::ContractViolation(ContractViolation::PassAlreadyOpen { open: "render" })
        );
        assert!(!recorded, "driver must not be called for a rejected begin");
        assert_eq!(recorder.state(), RecordingState::InPass(PassKind::Render));

        assert!(recorder.begin(PassKind::Blit, ok).is_err());
        assert_eq!(recorder.open_pass(), Some(PassKind::Render));
    }

    #[test]
    fn test_failed_native_begin_keeps_state() {
        let mut recorder = PassRecorder::new();
        let result = recorder.begin(PassKind::Blit, || -> GpuResult<()> {
            Err(GpuError::OutOfMemory("framebuffer".into()))
        });
        assert!(matches!(result, Err(GpuError::OutOfMemory(_))));
        assert_eq!(recorder.state(), RecordingState::Recording);
    }

    #[test]
    fn test_pass_scoped_calls_need_matching_pass() {
        let mut recorder = PassRecorder::new();
        assert_eq!(
            recorder.require(PassKind::Render, "draw"),
            Err(ContractViolation::PassNotOpen {
                operation: "draw",
                required: "render"
            })
        );

        recorder.begin(PassKind::Blit, ok).unwrap();
        assert!(recorder.require(PassKind::Blit, "fill_buffer").is_ok());
        assert!(recorder.require(PassKind::Render, "set_viewport").is_err());

        // Ending the wrong kind of pass is rejected too.
        assert!(recorder.end(PassKind::Render, "end_render_pass", ok).is_err());
        assert_eq!(recorder.state(), RecordingState::InPass(PassKind::Blit));
    }

    #[test]
    fn test_submit_rules() {
        let mut recorder = PassRecorder::new();
        recorder.begin(PassKind::Blit, ok).unwrap();
        assert_eq!(
            recorder.check_submittable(),
            Err(ContractViolation::PassOpenAtSubmit { open: "blit" })
        );
        recorder.end(PassKind::Blit, "end_blit_pass", ok).unwrap();
        recorder.check_submittable().unwrap();
        recorder.mark_submitted();

        assert!(recorder.is_submitted());
        assert_eq!(
            recorder.check_submittable(),
            Err(ContractViolation::AlreadySubmitted)
        );
        assert_eq!(
            recorder.check_begin(PassKind::Render),
            Err(ContractViolation::AlreadySubmitted)
        );
        assert_eq!(
            recorder.require(PassKind::Render, "draw"),
            Err(ContractViolation::AlreadySubmitted)
        );
    }

    #[test]
    fn test_failed_submit_is_terminal() {
        let mut recorder = PassRecorder::new();
        recorder.mark_failed();
        assert!(!recorder.is_submitted());
        assert_eq!(
            recorder.check_begin(PassKind::Blit),
            Err(ContractViolation::SubmitFailed)
        );
        assert_eq!(
            recorder.require(PassKind::Render, "draw"),
            Err(ContractViolation::SubmitFailed)
        );
        assert_eq!(
            recorder.check_submittable(),
            Err(ContractViolation::SubmitFailed)
        );
    }
}
