use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use parking_lot::Mutex;

use crate::models::config::CaptureConfiguration;
use crate::models::driver::{DeviceDescriptor, DriverClass};
use crate::models::error::CaptureError;
use crate::models::state::CaptureState;
use crate::models::waveform::WaveformBuffer;
use crate::traits::capture_backend::{AudioBufferCallback, CaptureBackend, StreamRequest};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::note_dispatcher::NoteDispatcher;

/// One note/velocity capture against an exclusively owned device.
///
/// The session remembers the thread that created it. For
/// [`DriverClass::RequiresCallerThread`] devices, stream start, stop and
/// note-off all run on that thread; for [`DriverClass::ThreadSafe`] devices
/// the stream runs on a single scoped worker while the caller sends note-off.
///
/// ```text
/// caller thread:  note-on → start → wait(done | deadline) → stop → note-off
/// worker path:    note-on → [worker: start → wait → stop] ─┐
///                           hold → note-off ───────────────┴→ join → buffer
/// ```
pub struct CaptureSession<B: CaptureBackend> {
    backend: B,
    config: CaptureConfiguration,
    driver_class: DriverClass,
    owner: ThreadId,
    state: CaptureState,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl<B: CaptureBackend> CaptureSession<B> {
    /// Take ownership of an opened backend. The calling thread becomes the
    /// session owner.
    pub fn new(backend: B, config: CaptureConfiguration, driver_class: DriverClass) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let device = backend.device();
        if config.channel_end() > device.max_input_channels {
            return Err(CaptureError::ChannelsUnavailable {
                device_id: device.id.clone(),
                requested_end: config.channel_end(),
                available: device.max_input_channels,
            });
        }

        log::info!(
            "Opened capture session on '{}' ({}, {:?}), channels {}..{}",
            device.name,
            device.host_api_name,
            driver_class,
            config.channel_offset,
            config.channel_end()
        );

        Ok(Self {
            backend,
            config,
            driver_class,
            owner: thread::current().id(),
            state: CaptureState::Idle,
            delegate: None,
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn device(&self) -> &DeviceDescriptor {
        self.backend.device()
    }

    pub fn driver_class(&self) -> DriverClass {
        self.driver_class
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    /// Capture using the strategy the driver class allows.
    pub fn capture(&mut self, notes: &mut dyn NoteDispatcher) -> Result<WaveformBuffer, CaptureError> {
        match self.driver_class {
            DriverClass::RequiresCallerThread => self.capture_on_caller_thread(notes),
            DriverClass::ThreadSafe => self.capture_on_worker(notes),
        }
    }

    /// Capture synchronously, blocking for the whole recording. Note-off is
    /// sent after the stream has stopped.
    ///
    /// Fails with `DriverRejectedInitialization` when a caller-thread device
    /// is driven from a thread other than the session owner.
    pub fn capture_on_caller_thread(&mut self, notes: &mut dyn NoteDispatcher) -> Result<WaveformBuffer, CaptureError> {
        if self.driver_class.requires_caller_thread() && thread::current().id() != self.owner {
            let err = self.wrong_thread("capture invoked from a thread other than the session owner");
            return self.finish(Err(err));
        }

        self.set_state(CaptureState::Capturing { on_worker: false });
        if let Err(e) = notes.send_note_on(self.config.note, self.config.velocity) {
            return self.finish(Err(e));
        }

        let captured = run_stream(&mut self.backend, &self.config);
        let note_off = notes.send_note_off(self.config.note);
        self.finish(captured.and_then(|buffer| note_off.map(|_| buffer)))
    }

    /// Capture on a dedicated worker while this thread holds the note and
    /// sends note-off, then join and publish the buffer.
    ///
    /// Refused with `DriverRejectedInitialization` for caller-thread drivers.
    pub fn capture_on_worker(&mut self, notes: &mut dyn NoteDispatcher) -> Result<WaveformBuffer, CaptureError> {
        if self.driver_class.requires_caller_thread() {
            let err = self.wrong_thread("worker-thread capture requested for a driver bound to the caller thread");
            return self.finish(Err(err));
        }

        self.set_state(CaptureState::Capturing { on_worker: true });
        let note = self.config.note;
        if let Err(e) = notes.send_note_on(note, self.config.velocity) {
            return self.finish(Err(e));
        }

        let hold = self.config.note_hold();
        let backend = &mut self.backend;
        let config = &self.config;
        let (finished_tx, finished_rx) = mpsc::channel::<()>();

        let result = thread::scope(|scope| {
            let worker = thread::Builder::new()
                .name("loop-capture-worker".into())
                .spawn_scoped(scope, move || {
                    let captured = run_stream(backend, config);
                    finished_tx.send(()).ok();
                    captured
                });
            let worker = match worker {
                Ok(worker) => worker,
                Err(e) => {
                    notes.send_note_off(note).ok();
                    return Err(CaptureError::Unknown(format!("failed to spawn capture worker: {}", e)));
                }
            };

            // Returns early only if the worker already finished.
            let _ = finished_rx.recv_timeout(hold);
            let note_off = notes.send_note_off(note);

            let captured = worker
                .join()
                .unwrap_or_else(|_| Err(CaptureError::Unknown("capture worker panicked".into())));
            captured.and_then(|buffer| note_off.map(|_| buffer))
        });

        self.finish(result)
    }

    /// Release the device. The stream is already stopped after every
    /// capture; this stops it once more on the owner thread and logs teardown.
    pub fn close(mut self) -> Result<(), CaptureError> {
        self.backend.stop()?;
        log::info!("Closed capture session on '{}'", self.backend.device().name);
        Ok(())
    }

    fn wrong_thread(&self, reason: &str) -> CaptureError {
        let device = self.backend.device();
        CaptureError::DriverRejectedInitialization {
            device_id: device.id.clone(),
            host_api: device.host_api_name.clone(),
            reason: reason.to_string(),
        }
    }

    fn set_state(&mut self, state: CaptureState) {
        log::debug!("Capture state: {:?}", state);
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(&state);
        }
        self.state = state;
    }

    fn finish(&mut self, result: Result<WaveformBuffer, CaptureError>) -> Result<WaveformBuffer, CaptureError> {
        match &result {
            Ok(buffer) => {
                log::info!(
                    "Captured {} frames ({:.2}s) from '{}'",
                    buffer.frames(),
                    buffer.duration_secs(),
                    self.backend.device().id
                );
                self.set_state(CaptureState::Completed { frames: buffer.frames() });
                if let Some(delegate) = &self.delegate {
                    delegate.on_capture_finished(buffer);
                }
            }
            Err(e) => {
                log::error!("Capture failed: {}", e);
                self.set_state(CaptureState::Failed(e.clone()));
                if let Some(delegate) = &self.delegate {
                    delegate.on_error(e);
                }
            }
        }
        result
    }
}

/// Run one stream to completion or deadline on the current thread.
fn run_stream<B: CaptureBackend>(backend: &mut B, config: &CaptureConfiguration) -> Result<WaveformBuffer, CaptureError> {
    let frames_requested = config.frames_requested();
    let progress = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = mpsc::channel();
    let collector = Mutex::new(FrameCollector::new(config, Arc::clone(&progress), done_tx));
    let callback: AudioBufferCallback = Arc::new(move |samples: &[f32], channels: u16| {
        collector.lock().push(samples, channels);
    });

    let request = StreamRequest {
        sample_rate: config.sample_rate,
        frames: frames_requested,
    };
    backend.start(&request, callback)?;

    let started = Instant::now();
    let outcome = done_rx.recv_timeout(config.capture_deadline());
    let stopped = backend.stop();

    let device_id = backend.device().id.clone();
    let samples = match outcome {
        Ok(samples) => samples,
        Err(RecvTimeoutError::Timeout) => {
            return Err(CaptureError::Timeout {
                device_id,
                requested_secs: config.duration_secs,
                waited_secs: started.elapsed().as_secs_f64(),
            })
        }
        Err(RecvTimeoutError::Disconnected) => {
            return Err(CaptureError::StreamFailed {
                device_id,
                frames_captured: progress.load(Ordering::SeqCst),
                frames_requested,
            })
        }
    };
    stopped?;

    Ok(WaveformBuffer::from_interleaved(
        samples,
        config.channels,
        config.sample_rate,
        config.bit_depth,
    )?)
}

/// Copies the configured channel range out of full device frames.
///
/// Owns the samples until the target frame count is reached, then hands them
/// over through `done`. Dropping `done` without sending marks the stream failed.
struct FrameCollector {
    offset: usize,
    channels: usize,
    target: usize,
    samples: Vec<f32>,
    frames: usize,
    progress: Arc<AtomicUsize>,
    done: Option<Sender<Vec<f32>>>,
}

impl FrameCollector {
    fn new(config: &CaptureConfiguration, progress: Arc<AtomicUsize>, done: Sender<Vec<f32>>) -> Self {
        let target = config.frames_requested();
        Self {
            offset: config.channel_offset as usize,
            channels: config.channels as usize,
            target,
            samples: Vec::with_capacity(target * config.channels as usize),
            frames: 0,
            progress,
            done: Some(done),
        }
    }

    fn push(&mut self, data: &[f32], device_channels: u16) {
        if self.done.is_none() {
            return;
        }
        let stride = device_channels as usize;
        if self.offset + self.channels > stride {
            log::error!(
                "Stream delivered {} channels, need {}..{}",
                stride,
                self.offset,
                self.offset + self.channels
            );
            self.done = None;
            return;
        }

        for frame in data.chunks_exact(stride) {
            self.samples.extend_from_slice(&frame[self.offset..self.offset + self.channels]);
            self.frames += 1;
            if self.frames == self.target {
                break;
            }
        }
        self.progress.store(self.frames, Ordering::SeqCst);

        if self.frames >= self.target {
            if let Some(done) = self.done.take() {
                done.send(mem::take(&mut self.samples)).ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::scripted::ScriptedDevice;
    use std::time::Duration;

    fn descriptor(host_api: &str, channels: u16) -> DeviceDescriptor {
        DeviceDescriptor {
            id: "dev-1".into(),
            name: "Test Interface".into(),
            host_api_name: host_api.into(),
            max_input_channels: channels,
        }
    }

    /// Four input channels; channel c carries frame * 10 + c.
    fn four_channel_signal(frames: usize) -> WaveformBuffer {
        let samples = (0..frames)
            .flat_map(|f| (0..4).map(move |c| (f * 10 + c) as f32 / 100_000.0))
            .collect();
        WaveformBuffer::from_interleaved(samples, 4, 1000, 24).unwrap()
    }

    fn config(frames: usize) -> CaptureConfiguration {
        CaptureConfiguration {
            channel_offset: 2,
            channels: 2,
            sample_rate: 1000,
            duration_secs: frames as f64 / 1000.0,
            timeout_slack_secs: 2.0,
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct RecordingNotes {
        events: Vec<(&'static str, ThreadId)>,
    }

    impl NoteDispatcher for RecordingNotes {
        fn send_note_on(&mut self, _note: u8, _velocity: u8) -> Result<(), CaptureError> {
            self.events.push(("on", thread::current().id()));
            Ok(())
        }

        fn send_note_off(&mut self, _note: u8) -> Result<(), CaptureError> {
            self.events.push(("off", thread::current().id()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct StateLog {
        states: Mutex<Vec<CaptureState>>,
        finished: Mutex<Option<usize>>,
    }

    impl CaptureDelegate for StateLog {
        fn on_state_changed(&self, state: &CaptureState) {
            self.states.lock().push(state.clone());
        }

        fn on_error(&self, _error: &CaptureError) {}

        fn on_capture_finished(&self, buffer: &WaveformBuffer) {
            *self.finished.lock() = Some(buffer.frames());
        }
    }

    #[test]
    fn extracts_configured_channels() {
        let device = ScriptedDevice::new(descriptor("ASIO", 4), four_channel_signal(600)).unwrap();
        let mut session = CaptureSession::new(device.open(), config(500), DriverClass::RequiresCallerThread).unwrap();

        let buffer = session.capture(&mut RecordingNotes::default()).unwrap();
        assert_eq!(buffer.frames(), 500);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.bit_depth(), 24);
        assert_eq!(buffer.sample(0, 0), 2.0 / 100_000.0);
        assert_eq!(buffer.sample(499, 1), (4990 + 3) as f32 / 100_000.0);
        assert_eq!(session.state(), &CaptureState::Completed { frames: 500 });
    }

    #[test]
    fn caller_thread_path_sends_note_off_after_capture_on_same_thread() {
        let device = ScriptedDevice::new(descriptor("ASIO", 4), four_channel_signal(300))
            .unwrap()
            .thread_bound();
        let mut session = CaptureSession::new(device.open(), config(300), DriverClass::RequiresCallerThread).unwrap();
        let delegate = Arc::new(StateLog::default());
        session.set_delegate(delegate.clone());
        assert!(session.state().is_idle());

        let mut notes = RecordingNotes::default();
        session.capture(&mut notes).unwrap();
        assert!(session.state().is_terminal());

        let me = thread::current().id();
        assert_eq!(notes.events, vec![("on", me), ("off", me)]);
        assert_eq!(
            *delegate.states.lock(),
            vec![
                CaptureState::Capturing { on_worker: false },
                CaptureState::Completed { frames: 300 }
            ]
        );
        assert!(delegate.states.lock()[0].is_capturing());
        assert_eq!(*delegate.finished.lock(), Some(300));
        session.close().unwrap();
    }

    #[test]
    fn worker_capture_on_caller_thread_driver_is_rejected() {
        let device = ScriptedDevice::new(descriptor("ASIO", 4), four_channel_signal(300)).unwrap();
        let mut session = CaptureSession::new(device.open(), config(300), DriverClass::RequiresCallerThread).unwrap();

        let mut notes = RecordingNotes::default();
        let err = session.capture_on_worker(&mut notes).unwrap_err();

        assert!(err.is_wrong_thread());
        assert!(notes.events.is_empty());
        assert!(matches!(session.state(), CaptureState::Failed(_)));
    }

    #[test]
    fn capture_from_foreign_thread_is_rejected() {
        let device = ScriptedDevice::new(descriptor("ASIO", 4), four_channel_signal(300)).unwrap();
        let mut session = CaptureSession::new(device.open(), config(300), DriverClass::RequiresCallerThread).unwrap();

        let err = thread::scope(|scope| {
            scope
                .spawn(|| session.capture(&mut RecordingNotes::default()))
                .join()
                .unwrap()
        })
        .unwrap_err();
        assert!(matches!(err, CaptureError::DriverRejectedInitialization { .. }));
        assert!(session.state().is_terminal());
        assert!(!session.state().is_capturing());
    }

    #[test]
    fn worker_path_sends_note_off_from_caller_during_capture() {
        // 20 chunks of 25 frames, 5 ms apart: roughly 100 ms of streaming.
        let device = ScriptedDevice::new(descriptor("WASAPI", 4), four_channel_signal(500))
            .unwrap()
            .with_chunk_frames(25)
            .paced(Duration::from_millis(5));
        let mut cfg = config(500);
        cfg.note_hold_secs = Some(0.01);
        let mut session = CaptureSession::new(device.open(), cfg, DriverClass::ThreadSafe).unwrap();

        let mut notes = RecordingNotes::default();
        let buffer = session.capture(&mut notes).unwrap();

        let me = thread::current().id();
        assert_eq!(notes.events, vec![("on", me), ("off", me)]);
        assert_eq!(buffer.frames(), 500);
        assert_eq!(session.state(), &CaptureState::Completed { frames: 500 });
    }

    #[test]
    fn hung_device_times_out() {
        let device = ScriptedDevice::new(descriptor("WASAPI", 4), four_channel_signal(10))
            .unwrap()
            .hanging();
        let mut cfg = config(100);
        cfg.timeout_slack_secs = 0.05;
        let mut session = CaptureSession::new(device.open(), cfg, DriverClass::ThreadSafe).unwrap();

        let mut notes = RecordingNotes::default();
        let err = session.capture(&mut notes).unwrap_err();

        assert!(matches!(err, CaptureError::Timeout { .. }));
        assert!(!err.is_wrong_thread());
        assert_eq!(notes.events.len(), 2);
    }

    #[test]
    fn short_stream_is_reported_as_failed() {
        let device = ScriptedDevice::new(descriptor("ASIO", 4), four_channel_signal(100)).unwrap();
        let mut session = CaptureSession::new(device.open(), config(400), DriverClass::RequiresCallerThread).unwrap();

        let err = session.capture(&mut RecordingNotes::default()).unwrap_err();
        assert_eq!(
            err,
            CaptureError::StreamFailed {
                device_id: "dev-1".into(),
                frames_captured: 100,
                frames_requested: 400,
            }
        );
    }

    #[test]
    fn misclassified_bound_driver_still_reports_wrong_thread() {
        // A thread-bound driver wrongly tagged as thread-safe fails fast in start.
        let device = ScriptedDevice::new(descriptor("ASIO", 4), four_channel_signal(300))
            .unwrap()
            .thread_bound();
        let mut session = CaptureSession::new(device.open(), config(300), DriverClass::ThreadSafe).unwrap();

        let started = Instant::now();
        let err = session.capture(&mut RecordingNotes::default()).unwrap_err();
        assert!(err.is_wrong_thread());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn rejects_channels_beyond_device() {
        let device = ScriptedDevice::new(descriptor("ASIO", 2), WaveformBuffer::mono(vec![0.0; 4], 1000).unwrap());
        assert!(device.is_err());

        let device = ScriptedDevice::new(
            descriptor("ASIO", 2),
            WaveformBuffer::from_interleaved(vec![0.0; 8], 2, 1000, 24).unwrap(),
        )
        .unwrap();
        let result = CaptureSession::new(device.open(), config(4), DriverClass::RequiresCallerThread);
        assert!(matches!(
            result,
            Err(CaptureError::ChannelsUnavailable {
                requested_end: 4,
                available: 2,
                ..
            })
        ));
    }
}
