//! # sustain-loop-core
//!
//! Capture sustained notes from an audio interface and find seamless
//! sustain-loop points inside the recording.
//!
//! Device backends implement the `CaptureBackend` trait and are opened through
//! a `DeviceCatalog`. The `CaptureScheduler` classifies each device's driver by
//! host API and captures either on the calling thread or on a single worker.
//! The captured `WaveformBuffer` goes through `ConstraintResolver` and
//! `LoopPointSearch`; a `LoopMetadataWriter` stores the result.
//!
//! ## Architecture
//!
//! ```text
//! sustain-loop-core (this crate)
//! ├── traits/       ← CaptureBackend, DeviceCatalog, NoteDispatcher, CaptureDelegate, LoopMetadataWriter
//! ├── models/       ← errors, configuration, WaveformBuffer, LoopResult, DriverClass, CaptureState
//! ├── processing/   ← waveform analysis, ConstraintResolver, LoopPointSearch
//! ├── session/      ← CaptureSession, CaptureScheduler, SamplePipeline
//! ├── storage/      ← WAV + smpl chunk encoding, WavLoopWriter, metadata sidecar
//! └── backends/     ← ScriptedBackend / ScriptedCatalog (no hardware)
//! ```

pub mod backends;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use backends::scripted::{ScriptedBackend, ScriptedCatalog, ScriptedDevice};
pub use models::config::{
    CaptureConfiguration, ChannelCombine, EngineConfiguration, LoopConfiguration, MinDuration, SearchSettings,
};
pub use models::driver::{DeviceDescriptor, DriverClass, DriverClassifier};
pub use models::error::{CaptureError, ConfigurationError, EngineError, StorageError, WaveformError};
pub use models::loop_result::{LoopCandidate, LoopPoints, LoopResult, LoopStatus};
pub use models::sample::{CapturedSample, PersistedSample, SampleMetadata};
pub use models::state::CaptureState;
pub use models::waveform::WaveformBuffer;
pub use processing::constraint::{ConstraintResolver, LoopConstraint};
pub use processing::loop_search::{find_loop, LoopPointSearch};
pub use session::capture_session::CaptureSession;
pub use session::pipeline::SamplePipeline;
pub use session::scheduler::CaptureScheduler;
pub use storage::loop_writer::WavLoopWriter;
pub use traits::capture_backend::{AudioBufferCallback, CaptureBackend, StreamRequest};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::device_catalog::DeviceCatalog;
pub use traits::loop_metadata_writer::LoopMetadataWriter;
pub use traits::note_dispatcher::{NoNotes, NoteDispatcher};
