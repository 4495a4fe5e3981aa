use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::loop_result::{LoopResult, LoopStatus};
use super::waveform::WaveformBuffer;

/// A finished capture with its loop, ready to hand to a writer.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedSample {
    pub buffer: WaveformBuffer,
    pub loop_result: LoopResult,
    pub device_id: String,
    pub note: u8,
    pub velocity: u8,
}

/// Result returned when a sample has been written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSample {
    pub file_path: PathBuf,
    pub checksum: String,
    pub metadata: SampleMetadata,
}

/// Metadata stored alongside a written sample.
///
/// Serializable for the JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub id: String,
    pub created_at: String,
    pub file_path: String,
    pub checksum: String,
    pub device_id: String,
    pub note: u8,
    pub velocity: u8,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub frames: usize,
    pub loop_status: LoopStatus,
    pub loop_start: Option<usize>,
    pub loop_end: Option<usize>,
    pub requested_min_duration: usize,
    pub applied_min_duration: usize,
}

impl SampleMetadata {
    pub fn new(sample: &CapturedSample, file_path: &str, checksum: &str) -> Self {
        let buffer = &sample.buffer;
        let result = &sample.loop_result;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: file_path.to_string(),
            checksum: checksum.to_string(),
            device_id: sample.device_id.clone(),
            note: sample.note,
            velocity: sample.velocity,
            sample_rate: buffer.sample_rate(),
            channels: buffer.channels(),
            bit_depth: buffer.bit_depth(),
            frames: buffer.frames(),
            loop_status: result.status(),
            loop_start: result.start_sample(),
            loop_end: result.end_sample(),
            requested_min_duration: result.requested_min_duration(),
            applied_min_duration: result.applied_min_duration(),
        }
    }
}
