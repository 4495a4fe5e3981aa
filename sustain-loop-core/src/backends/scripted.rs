use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::driver::DeviceDescriptor;
use crate::models::error::CaptureError;
use crate::models::waveform::WaveformBuffer;
use crate::traits::capture_backend::{AudioBufferCallback, CaptureBackend, StreamRequest};
use crate::traits::device_catalog::DeviceCatalog;

/// Default callback size, matching a typical driver period.
const DEFAULT_CHUNK_FRAMES: usize = 256;

/// How often a hung stream checks whether it has been stopped.
const HANG_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A device that replays a prerecorded signal instead of touching hardware.
///
/// The signal carries every input channel of the device, interleaved, the
/// way a driver hands them to its callback.
#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    descriptor: DeviceDescriptor,
    signal: WaveformBuffer,
    chunk_frames: usize,
    pacing: Option<Duration>,
    hang: bool,
    thread_bound: bool,
}

impl ScriptedDevice {
    pub fn new(descriptor: DeviceDescriptor, signal: WaveformBuffer) -> Result<Self, CaptureError> {
        if signal.channels() != descriptor.max_input_channels {
            return Err(CaptureError::ConfigurationFailed(format!(
                "scripted signal has {} channels but device '{}' reports {}",
                signal.channels(),
                descriptor.id,
                descriptor.max_input_channels
            )));
        }
        Ok(Self {
            descriptor,
            signal,
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            pacing: None,
            hang: false,
            thread_bound: false,
        })
    }

    /// Frames per callback invocation.
    pub fn with_chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = frames.max(1);
        self
    }

    /// Sleep between callbacks, e.g. to keep the stream running across a note hold.
    pub fn paced(mut self, interval: Duration) -> Self {
        self.pacing = Some(interval);
        self
    }

    /// Start succeeds but no audio ever arrives.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Behave like a driver that only accepts `start`/`stop` on the thread
    /// that opened it.
    pub fn thread_bound(mut self) -> Self {
        self.thread_bound = true;
        self
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Open the device. A thread-bound device binds to the calling thread.
    pub fn open(&self) -> ScriptedBackend {
        ScriptedBackend {
            device: self.clone(),
            bound_thread: self.thread_bound.then(|| thread::current().id()),
            running: Arc::new(AtomicBool::new(false)),
            delivery_handle: Mutex::new(None),
        }
    }
}

/// Stream over a [`ScriptedDevice`]; audio is delivered on a dedicated thread.
pub struct ScriptedBackend {
    device: ScriptedDevice,
    bound_thread: Option<ThreadId>,
    running: Arc<AtomicBool>,
    delivery_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ScriptedBackend {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn check_thread(&self, operation: &str) -> Result<(), CaptureError> {
        match self.bound_thread {
            Some(bound) if bound != thread::current().id() => Err(CaptureError::DriverRejectedInitialization {
                device_id: self.device.descriptor.id.clone(),
                host_api: self.device.descriptor.host_api_name.clone(),
                reason: format!("{} called from a thread other than the one that opened the device", operation),
            }),
            _ => Ok(()),
        }
    }

    fn join_delivery(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.delivery_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl CaptureBackend for ScriptedBackend {
    fn device(&self) -> &DeviceDescriptor {
        &self.device.descriptor
    }

    fn start(&mut self, request: &StreamRequest, callback: AudioBufferCallback) -> Result<(), CaptureError> {
        self.check_thread("start")?;
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::ConfigurationFailed("scripted stream already running".into()));
        }
        if request.sample_rate != self.device.signal.sample_rate() {
            return Err(CaptureError::ConfigurationFailed(format!(
                "device '{}' runs at {} Hz, {} Hz requested",
                self.device.descriptor.id,
                self.device.signal.sample_rate(),
                request.sample_rate
            )));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let device = self.device.clone();

        let handle = thread::Builder::new()
            .name("scripted-input".into())
            .spawn(move || deliver(device, running, callback))
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn delivery thread: {}", e)))?;

        *self.delivery_handle.lock() = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.check_thread("stop")?;
        self.join_delivery();
        Ok(())
    }
}

impl Drop for ScriptedBackend {
    fn drop(&mut self) {
        self.join_delivery();
    }
}

/// Delivery loop. Returning drops `callback`, which is how a real stream
/// signals that it has ended.
fn deliver(device: ScriptedDevice, running: Arc<AtomicBool>, callback: AudioBufferCallback) {
    if device.hang {
        log::debug!("Scripted device '{}' hanging", device.descriptor.id);
        while running.load(Ordering::SeqCst) {
            thread::sleep(HANG_POLL_INTERVAL);
        }
        return;
    }

    let channels = device.signal.channels();
    let chunk_len = device.chunk_frames * channels as usize;
    for chunk in device.signal.interleaved().chunks(chunk_len) {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        callback(chunk, channels);
        if let Some(interval) = device.pacing {
            thread::sleep(interval);
        }
    }
    log::debug!("Scripted device '{}' reached end of signal", device.descriptor.id);
}

/// In-memory device list for hardware-free sessions.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCatalog {
    devices: Vec<ScriptedDevice>,
}

impl ScriptedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: ScriptedDevice) -> Self {
        self.devices.push(device);
        self
    }
}

impl DeviceCatalog for ScriptedCatalog {
    type Backend = ScriptedBackend;

    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        Ok(self.devices.iter().map(|d| d.descriptor.clone()).collect())
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<ScriptedBackend, CaptureError> {
        self.devices
            .iter()
            .find(|d| d.descriptor.id == device.id)
            .map(ScriptedDevice::open)
            .ok_or_else(|| CaptureError::DeviceNotAvailable(device.id.clone()))
    }
}
