use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Outcome of a loop-point search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Found,
    /// A loop was found only after shortening the minimum duration.
    FoundWithRelaxedConstraints,
    NotFound,
}

/// A loop region. Playback runs `start_sample..end_sample` and then jumps
/// back to `start_sample`, so the seam joins frame `end_sample - 1` to
/// frame `start_sample`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoopPoints {
    pub start_sample: usize,
    pub end_sample: usize,
}

impl LoopPoints {
    pub fn len(&self) -> usize {
        self.end_sample - self.start_sample
    }

    pub fn is_empty(&self) -> bool {
        self.end_sample <= self.start_sample
    }
}

/// A scored pair considered during the search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopCandidate {
    pub start_sample: usize,
    pub end_sample: usize,
    /// Seam penalty; lower is a cleaner splice.
    pub continuity_score: f64,
}

impl LoopCandidate {
    pub fn points(&self) -> LoopPoints {
        LoopPoints {
            start_sample: self.start_sample,
            end_sample: self.end_sample,
        }
    }

    /// Total order used to pick the winner: lowest penalty, then the longer
    /// loop, then the earlier start. `Less` means `self` is better.
    pub fn rank(&self, other: &Self) -> Ordering {
        self.continuity_score
            .total_cmp(&other.continuity_score)
            .then_with(|| {
                let own = self.end_sample - self.start_sample;
                let theirs = other.end_sample - other.start_sample;
                theirs.cmp(&own)
            })
            .then_with(|| self.start_sample.cmp(&other.start_sample))
    }
}

/// The single loop produced for a recording. Immutable once produced.
///
/// `points()` is `Some` exactly when the status is not `NotFound`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopResult {
    status: LoopStatus,
    points: Option<LoopPoints>,
    continuity_score: Option<f64>,
    requested_min_duration: usize,
    applied_min_duration: usize,
}

impl LoopResult {
    /// A loop chosen by the caller; continuity is not evaluated.
    pub fn fixed(points: LoopPoints, min_duration: usize) -> Self {
        Self {
            status: LoopStatus::Found,
            points: Some(points),
            continuity_score: None,
            requested_min_duration: min_duration,
            applied_min_duration: min_duration,
        }
    }

    /// A scored loop. Relaxation is recorded when `applied_min_duration`
    /// is shorter than requested.
    pub fn scored(candidate: LoopCandidate, requested_min_duration: usize, applied_min_duration: usize) -> Self {
        let status = if applied_min_duration < requested_min_duration {
            LoopStatus::FoundWithRelaxedConstraints
        } else {
            LoopStatus::Found
        };
        Self {
            status,
            points: Some(candidate.points()),
            continuity_score: Some(candidate.continuity_score),
            requested_min_duration,
            applied_min_duration,
        }
    }

    pub fn not_found(requested_min_duration: usize) -> Self {
        Self {
            status: LoopStatus::NotFound,
            points: None,
            continuity_score: None,
            requested_min_duration,
            applied_min_duration: requested_min_duration,
        }
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    pub fn is_found(&self) -> bool {
        self.points.is_some()
    }

    pub fn points(&self) -> Option<LoopPoints> {
        self.points
    }

    pub fn start_sample(&self) -> Option<usize> {
        self.points.map(|p| p.start_sample)
    }

    pub fn end_sample(&self) -> Option<usize> {
        self.points.map(|p| p.end_sample)
    }

    /// Seam penalty of the winning candidate (None for fixed or missing loops).
    pub fn continuity_score(&self) -> Option<f64> {
        self.continuity_score
    }

    /// Minimum loop length the caller asked for, in frames.
    pub fn requested_min_duration(&self) -> usize {
        self.requested_min_duration
    }

    /// Minimum loop length actually enforced after relaxation, in frames.
    pub fn applied_min_duration(&self) -> usize {
        self.applied_min_duration
    }
}
