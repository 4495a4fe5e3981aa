use std::sync::Arc;

use crate::models::driver::DeviceDescriptor;
use crate::models::error::CaptureError;

/// Callback invoked when an audio buffer is available.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples covering every input channel of the device.
/// - `channels`: Number of interleaved channels in `samples`.
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], u16) + Send + Sync + 'static>;

/// Stream parameters requested from a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub sample_rate: u32,
    /// Frames the session needs before it stops the stream.
    pub frames: usize,
}

/// Interface for device-specific audio input streams.
///
/// Implementations own the device handle for the lifetime of the session
/// that opened them. Drivers that pin a stream to one thread report a
/// wrong-thread `start`/`stop` as `CaptureError::DriverRejectedInitialization`.
pub trait CaptureBackend: Send {
    /// The device backing this stream.
    fn device(&self) -> &DeviceDescriptor;

    /// Start capturing audio, delivering buffers via `callback`.
    ///
    /// The callback fires on the driver's audio thread; keep processing minimal.
    fn start(&mut self, request: &StreamRequest, callback: AudioBufferCallback) -> Result<(), CaptureError>;

    /// Stop capturing. No callback fires after this returns.
    fn stop(&mut self) -> Result<(), CaptureError>;
}
