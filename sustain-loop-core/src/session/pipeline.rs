use std::path::Path;

use crate::models::config::{CaptureConfiguration, EngineConfiguration, LoopConfiguration};
use crate::models::error::EngineError;
use crate::models::sample::{CapturedSample, PersistedSample};
use crate::processing::constraint::ConstraintResolver;
use crate::processing::loop_search;
use crate::session::scheduler::CaptureScheduler;
use crate::traits::device_catalog::DeviceCatalog;
use crate::traits::loop_metadata_writer::LoopMetadataWriter;
use crate::traits::note_dispatcher::NoteDispatcher;

/// Capture → loop search → persist, one note at a time.
///
/// ```text
/// [DeviceCatalog] → [CaptureSession] → WaveformBuffer ─┐
///                                                        ├→ [LoopPointSearch] → LoopResult → [LoopMetadataWriter]
///                                     LoopConfiguration ─┘
/// ```
pub struct SamplePipeline<C: DeviceCatalog> {
    catalog: C,
    scheduler: CaptureScheduler,
}

impl<C: DeviceCatalog> SamplePipeline<C> {
    pub fn new(catalog: C, scheduler: CaptureScheduler) -> Self {
        Self { catalog, scheduler }
    }

    pub fn from_configuration(catalog: C, config: &EngineConfiguration) -> Self {
        Self::new(catalog, CaptureScheduler::from_configuration(config))
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn scheduler(&self) -> &CaptureScheduler {
        &self.scheduler
    }

    /// Capture one note and find its sustain loop.
    ///
    /// Loop constraints are checked against the requested capture length
    /// first, so a bad fixed time fails before the device is touched.
    pub fn capture_and_find_loop(
        &self,
        capture: &CaptureConfiguration,
        loop_config: &LoopConfiguration,
        notes: &mut dyn NoteDispatcher,
    ) -> Result<CapturedSample, EngineError> {
        loop_config.search.validate()?;
        ConstraintResolver::new(capture.frames_requested(), capture.sample_rate).resolve(loop_config)?;

        let mut session = self.scheduler.open_session(&self.catalog, capture)?;
        let device_id = session.device().id.clone();
        let captured = session.capture(notes);
        let closed = session.close();
        let buffer = captured?;
        closed?;

        let loop_result = loop_search::find_loop(&buffer, loop_config)?;
        log::info!(
            "Note {} velocity {}: loop {:?} {:?}..{:?}",
            capture.note,
            capture.velocity,
            loop_result.status(),
            loop_result.start_sample(),
            loop_result.end_sample()
        );

        Ok(CapturedSample {
            buffer,
            loop_result,
            device_id,
            note: capture.note,
            velocity: capture.velocity,
        })
    }

    /// Hand a finished sample to a writer.
    pub fn persist<W: LoopMetadataWriter + ?Sized>(
        &self,
        writer: &W,
        sample: &CapturedSample,
        path: &Path,
    ) -> Result<PersistedSample, EngineError> {
        Ok(writer.persist(sample, path)?)
    }
}
