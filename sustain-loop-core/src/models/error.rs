use thiserror::Error;

/// Invalid or out-of-range loop constraint input.
///
/// Raised immediately by the constraint resolver and never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("invalid minimum duration: {0}")]
    InvalidMinDuration(String),

    #[error("{field} at {seconds}s resolves to sample {sample}, outside 0..={last_sample}")]
    FixedTimeOutOfRange {
        field: &'static str,
        seconds: f64,
        sample: i64,
        last_sample: usize,
    },

    #[error("fixed loop start (sample {start}) must come before fixed loop end (sample {end})")]
    FixedStartNotBeforeEnd { start: usize, end: usize },

    #[error("fixed loop {start}..{end} is shorter than the minimum duration of {min_duration} samples")]
    UnsatisfiableFixedLoop {
        start: usize,
        end: usize,
        min_duration: usize,
    },

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Structural problems with captured sample data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaveformError {
    #[error("waveform contains no frames")]
    Empty,

    #[error("waveform must have at least one channel")]
    ZeroChannels,

    #[error("sample rate must be positive")]
    ZeroSampleRate,

    #[error("{len} samples do not divide into {channels}-channel frames")]
    RaggedFrames { len: usize, channels: u16 },
}

/// Errors that can occur while acquiring audio from a device.
///
/// Fatal to the current capture session. Retry policy belongs to the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    /// The driver refused to initialize the stream on the calling thread.
    #[error("driver '{host_api}' rejected stream initialization on device '{device_id}': {reason}")]
    DriverRejectedInitialization {
        device_id: String,
        host_api: String,
        reason: String,
    },

    #[error("device '{device_id}' did not deliver {requested_secs}s of audio within {waited_secs}s")]
    Timeout {
        device_id: String,
        requested_secs: f64,
        waited_secs: f64,
    },

    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("device '{device_id}' has {available} input channels, configuration needs {requested_end}")]
    ChannelsUnavailable {
        device_id: String,
        requested_end: u16,
        available: u16,
    },

    #[error("stream on device '{device_id}' ended after {frames_captured} of {frames_requested} frames")]
    StreamFailed {
        device_id: String,
        frames_captured: usize,
        frames_requested: usize,
    },

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("note dispatch failed: {0}")]
    NoteDispatch(String),

    #[error(transparent)]
    InvalidBuffer(#[from] WaveformError),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// True when the failure comes from calling the driver on the wrong thread,
    /// as opposed to a slow or hung device.
    pub fn is_wrong_thread(&self) -> bool {
        matches!(self, Self::DriverRejectedInitialization { .. })
    }
}

/// Failures while persisting a sample and its loop metadata.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),

    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    #[error("{0} bytes of audio exceed the 4 GiB RIFF limit")]
    TooLarge(u64),
}

/// Umbrella error for the capture-to-loop pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
