use crate::models::error::CaptureError;
use crate::models::state::CaptureState;
use crate::models::waveform::WaveformBuffer;

/// Event delegate for capture session notifications.
///
/// Called from the thread driving the session, never from the audio thread.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &CaptureState);

    /// Called when a capture fails.
    fn on_error(&self, error: &CaptureError);

    /// Called with the published buffer once capture completes.
    fn on_capture_finished(&self, buffer: &WaveformBuffer);
}
