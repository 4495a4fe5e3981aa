use crate::models::config::{LoopConfiguration, MinDuration};
use crate::models::error::ConfigurationError;

/// Loop constraints expressed in frame indices of one specific buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConstraint {
    /// Total frames in the buffer (N).
    pub frames: usize,
    pub min_duration_samples: usize,
    pub fixed_start_sample: Option<usize>,
    pub fixed_end_sample: Option<usize>,
}

impl LoopConstraint {
    pub fn last_frame(&self) -> usize {
        self.frames.saturating_sub(1)
    }

    pub fn is_fully_fixed(&self) -> bool {
        self.fixed_start_sample.is_some() && self.fixed_end_sample.is_some()
    }
}

/// Turns user loop constraints in seconds or percent into a [`LoopConstraint`].
///
/// Only malformed input fails. A minimum duration that leaves no admissible
/// pair is returned as-is; the search relaxes it or reports `NotFound`.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintResolver {
    frames: usize,
    sample_rate: u32,
}

impl ConstraintResolver {
    pub fn new(frames: usize, sample_rate: u32) -> Self {
        Self { frames, sample_rate }
    }

    pub fn resolve(&self, config: &LoopConfiguration) -> Result<LoopConstraint, ConfigurationError> {
        if self.frames == 0 {
            return Err(ConfigurationError::InvalidSetting("cannot loop an empty buffer".into()));
        }
        if self.sample_rate == 0 {
            return Err(ConfigurationError::InvalidSetting("sample rate must be positive".into()));
        }

        let min_duration_samples = self.resolve_min_duration(config.min_duration)?;
        let fixed_start_sample = config
            .fixed_start_time
            .map(|t| self.resolve_time("fixed_start_time", t))
            .transpose()?;
        let fixed_end_sample = config
            .fixed_end_time
            .map(|t| self.resolve_time("fixed_end_time", t))
            .transpose()?;

        if let (Some(start), Some(end)) = (fixed_start_sample, fixed_end_sample) {
            if start >= end {
                return Err(ConfigurationError::FixedStartNotBeforeEnd { start, end });
            }
            if end - start < min_duration_samples {
                return Err(ConfigurationError::UnsatisfiableFixedLoop {
                    start,
                    end,
                    min_duration: min_duration_samples,
                });
            }
        }

        let constraint = LoopConstraint {
            frames: self.frames,
            min_duration_samples,
            fixed_start_sample,
            fixed_end_sample,
        };
        log::debug!("Resolved loop constraint: {:?}", constraint);
        Ok(constraint)
    }

    fn resolve_min_duration(&self, min_duration: MinDuration) -> Result<usize, ConfigurationError> {
        match min_duration {
            MinDuration::Percent(percent) => {
                let percent = MinDuration::percent(percent).map(|_| percent)?;
                Ok((percent / 100.0 * self.frames as f64).round() as usize)
            }
            MinDuration::Seconds(secs) => {
                let secs = MinDuration::seconds(secs).map(|_| secs)?;
                let samples = (secs * self.sample_rate as f64).round();
                Ok((samples as usize).min(self.frames - 1))
            }
        }
    }

    fn resolve_time(&self, field: &'static str, seconds: f64) -> Result<usize, ConfigurationError> {
        let last_sample = self.frames - 1;
        let sample = (seconds * self.sample_rate as f64).round();
        if !sample.is_finite() || sample < 0.0 || sample > last_sample as f64 {
            return Err(ConfigurationError::FixedTimeOutOfRange {
                field,
                seconds,
                sample: if sample.is_finite() { sample as i64 } else { i64::MIN },
                last_sample,
            });
        }
        Ok(sample as usize)
    }
}
