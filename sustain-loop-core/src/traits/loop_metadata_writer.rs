use std::path::Path;

use crate::models::error::StorageError;
use crate::models::sample::{CapturedSample, PersistedSample};

/// Persists a captured sample together with its loop points.
///
/// Implementations write all or nothing: a failed call leaves no file at `path`.
pub trait LoopMetadataWriter {
    fn persist(&self, sample: &CapturedSample, path: &Path) -> Result<PersistedSample, StorageError>;
}
