use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::StorageError;
use crate::models::sample::SampleMetadata;

/// Path of the JSON sidecar for a sample file.
pub fn sidecar_path(sample_path: &Path) -> PathBuf {
    sample_path.with_extension("metadata.json")
}

/// Serialize sample metadata as it is stored in the JSON sidecar.
pub fn to_json(metadata: &SampleMetadata) -> Result<String, StorageError> {
    serde_json::to_string_pretty(metadata)
        .map_err(|e| StorageError::Serialization(format!("failed to serialize metadata: {}", e)))
}

/// Read sample metadata from a JSON sidecar file.
pub fn read_metadata(sample_path: &Path) -> Result<SampleMetadata, StorageError> {
    let json = fs::read_to_string(sidecar_path(sample_path))
        .map_err(|e| StorageError::Io(format!("failed to read metadata: {}", e)))?;
    let metadata: SampleMetadata = serde_json::from_str(&json)
        .map_err(|e| StorageError::Serialization(format!("failed to parse metadata: {}", e)))?;
    Ok(metadata)
}
