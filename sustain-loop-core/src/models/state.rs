use super::error::CaptureError;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → capturing → completed
///            ↓
///          failed
/// ```
/// A session may capture again from `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Capturing { on_worker: bool },
    Completed { frames: usize },
    Failed(CaptureError),
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed(_))
    }
}
