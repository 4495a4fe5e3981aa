use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::StorageError;
use crate::models::loop_result::LoopPoints;
use crate::models::sample::{CapturedSample, PersistedSample, SampleMetadata};
use crate::storage::metadata;
use crate::storage::wav_format;
use crate::traits::loop_metadata_writer::LoopMetadataWriter;

/// WAV writer that embeds the loop as a RIFF `smpl` chunk.
///
/// ## File Format
///
/// ```text
/// [44-byte WAV header]
/// [integer PCM data (+1 pad byte if odd)]
/// [smpl chunk, only when a loop was found]
/// ```
///
/// The file is assembled in memory, written to `<path>.partial` and renamed
/// into place, so a failure never leaves a half-written sample or loop. The
/// optional sidecar is staged the same way and committed before the sample.
#[derive(Debug, Clone, Default)]
pub struct WavLoopWriter {
    write_sidecar: bool,
}

impl WavLoopWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write `<path>.metadata.json` next to each sample.
    pub fn with_sidecar(mut self) -> Self {
        self.write_sidecar = true;
        self
    }

    /// Encode the complete WAV image for `sample`.
    pub fn encode(sample: &CapturedSample) -> Result<Vec<u8>, StorageError> {
        let buffer = &sample.buffer;
        let pcm_bytes = buffer.interleaved().len() as u64 * (buffer.bit_depth() / 8) as u64;
        let data_size = wav_format::checked_data_size(pcm_bytes)?;
        let mut data = wav_format::encode_pcm(buffer.interleaved(), buffer.bit_depth())?;
        if data.len() % 2 == 1 {
            data.push(0);
        }

        let mut file = Vec::with_capacity(wav_format::WAV_HEADER_SIZE + data.len() + wav_format::SMPL_CHUNK_SIZE);
        file.extend_from_slice(&wav_format::generate_wav_header(
            buffer.sample_rate(),
            buffer.bit_depth(),
            buffer.channels(),
            data_size,
        ));
        file.extend_from_slice(&data);
        if let Some(points) = sample.loop_result.points() {
            file.extend_from_slice(&wav_format::generate_smpl_chunk(buffer.sample_rate(), points, sample.note));
        }

        let total = file.len() as u64;
        wav_format::patch_file_size(&mut file, total);
        Ok(file)
    }
}

impl LoopMetadataWriter for WavLoopWriter {
    fn persist(&self, sample: &CapturedSample, path: &Path) -> Result<PersistedSample, StorageError> {
        let image = Self::encode(sample)?;
        let checksum = hex_encode(&Sha256::digest(&image));
        let metadata = SampleMetadata::new(sample, &path.to_string_lossy(), &checksum);
        let sidecar = if self.write_sidecar {
            Some(metadata::to_json(&metadata)?)
        } else {
            None
        };

        create_parent_dir(path)?;
        let staged_wav = stage(path, &image)?;
        if let Some(json) = sidecar {
            let target = metadata::sidecar_path(path);
            let committed = stage(&target, json.as_bytes()).and_then(|staged| commit(&staged, &target));
            if let Err(e) = committed {
                fs::remove_file(&staged_wav).ok();
                return Err(e);
            }
            // The sample goes in last; without it the sidecar must not survive.
            if let Err(e) = commit(&staged_wav, path) {
                fs::remove_file(&target).ok();
                return Err(e);
            }
        } else {
            commit(&staged_wav, path)?;
        }

        log::info!(
            "Wrote {} ({} frames, loop {:?})",
            path.display(),
            sample.buffer.frames(),
            sample.loop_result.status()
        );

        Ok(PersistedSample {
            file_path: path.to_path_buf(),
            checksum,
            metadata,
        })
    }
}

/// Read back the loop stored in a WAV file, if any.
pub fn read_loop_points(path: &Path) -> Result<Option<LoopPoints>, StorageError> {
    let file = fs::read(path).map_err(|e| StorageError::Io(format!("failed to read {}: {}", path.display(), e)))?;
    match wav_format::find_chunk(&file, b"smpl") {
        Some(body) => wav_format::parse_smpl_chunk(body),
        None => Ok(None),
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn create_parent_dir(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::Io(format!("failed to create directory: {}", e)))?;
    }
    Ok(())
}

/// Write `bytes` to `<target>.partial` and return that path.
fn stage(target: &Path, bytes: &[u8]) -> Result<PathBuf, StorageError> {
    let partial = partial_path(target);
    File::create(&partial)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .map_err(|e| {
            fs::remove_file(&partial).ok();
            StorageError::Io(format!("failed to write {}: {}", target.display(), e))
        })?;
    Ok(partial)
}

/// Rename a staged file into place. The staged file is removed on failure.
fn commit(staged: &Path, target: &Path) -> Result<(), StorageError> {
    fs::rename(staged, target).map_err(|e| {
        fs::remove_file(staged).ok();
        StorageError::Io(format!("failed to write {}: {}", target.display(), e))
    })
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
