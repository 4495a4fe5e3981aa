//! Loop-point discovery.
//!
//! Candidate pairs are scored by how well the frame before `end_sample`
//! matches the frame before `start_sample`, since those two become
//! neighbours once playback wraps. Per channel the penalty is
//!
//! ```text
//! |S[e-1] - S[s-1]| + slope_weight * k * |D[e-1] - D[s-1]| + energy_weight * |E[e-1] - E[s-1]|
//! ```
//!
//! where `S` is the smoothed trace, `D` its first difference scaled into
//! amplitude units by `k`, and `E` the short-term RMS envelope. Channels are
//! combined by worst channel (default) or sum. A small zero-crossing term is
//! added to break near-ties in favour of seams at rising zero crossings.
//!
//! Windows with at most `exhaustive_pair_limit` pairs are scored exhaustively.
//! Larger windows get a coarse grid of `coarse_points` per axis; the best
//! `refine_seeds` grid pairs are refined by halving the step around each seed
//! down to one frame, then polished with an exhaustive `±refine_radius` scan
//! until stable. The reported pair is therefore the optimum of its
//! `±refine_radius` frame neighbourhood, reached from one of the best coarse
//! seeds.

use crate::models::config::{ChannelCombine, LoopConfiguration, SearchSettings};
use crate::models::error::ConfigurationError;
use crate::models::loop_result::{LoopCandidate, LoopPoints, LoopResult};
use crate::models::waveform::WaveformBuffer;
use crate::processing::analysis::WaveformAnalysis;
use crate::processing::constraint::{ConstraintResolver, LoopConstraint};

const MAX_POLISH_ROUNDS: usize = 16;

/// Resolve `config` against `buffer` and search for the best loop.
pub fn find_loop(buffer: &WaveformBuffer, config: &LoopConfiguration) -> Result<LoopResult, ConfigurationError> {
    config.search.validate()?;
    let constraint = ConstraintResolver::new(buffer.frames(), buffer.sample_rate()).resolve(config)?;
    Ok(LoopPointSearch::new(buffer, &config.search).search(&constraint))
}

/// Rectangle of start/end frames plus the minimum-length diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub start_lo: usize,
    pub start_hi: usize,
    pub end_lo: usize,
    pub end_hi: usize,
    /// Always at least one so that `end > start`.
    pub min_len: usize,
}

impl SearchWindow {
    /// Admissible window for `constraint` with the minimum duration replaced
    /// by `min_duration`. None when no pair qualifies.
    pub fn build(constraint: &LoopConstraint, min_duration: usize, sustain_start_fraction: f64) -> Option<Self> {
        if constraint.frames < 2 {
            return None;
        }
        let last = constraint.last_frame();
        let min_len = min_duration.max(1);

        let window = match (constraint.fixed_start_sample, constraint.fixed_end_sample) {
            (Some(start), Some(end)) => Self {
                start_lo: start,
                start_hi: start,
                end_lo: end,
                end_hi: end,
                min_len,
            },
            (Some(start), None) => Self {
                start_lo: start,
                start_hi: start,
                end_lo: start.checked_add(min_len)?,
                end_hi: last,
                min_len,
            },
            (None, Some(end)) => Self {
                start_lo: 0,
                start_hi: end.checked_sub(min_len)?,
                end_lo: end,
                end_hi: end,
                min_len,
            },
            (None, None) => {
                let start_hi = last.checked_sub(min_len)?;
                let preferred = ((constraint.frames as f64 * sustain_start_fraction) as usize).max(1);
                // The sustain region is a preference; when the minimum does not
                // fit there, loops may start anywhere after the first frame.
                let start_lo = if preferred <= start_hi { preferred } else { start_hi.min(1) };
                Self {
                    start_lo,
                    start_hi,
                    end_lo: start_lo + min_len,
                    end_hi: last,
                    min_len,
                }
            }
        };

        let valid = window.start_lo <= window.start_hi
            && window.end_lo <= window.end_hi
            && window.admits(window.start_lo, window.end_hi);
        valid.then_some(window)
    }

    pub fn admits(&self, start: usize, end: usize) -> bool {
        (self.start_lo..=self.start_hi).contains(&start)
            && (self.end_lo..=self.end_hi).contains(&end)
            && end >= start + self.min_len
    }

    /// Upper bound on the number of admissible pairs.
    pub fn pair_bound(&self) -> u64 {
        let starts = (self.start_hi - self.start_lo + 1) as u64;
        let ends = (self.end_hi - self.end_lo + 1) as u64;
        starts.saturating_mul(ends)
    }
}

/// Scores and selects loop candidates on one buffer.
pub struct LoopPointSearch<'a> {
    buffer: &'a WaveformBuffer,
    settings: &'a SearchSettings,
}

impl<'a> LoopPointSearch<'a> {
    pub fn new(buffer: &'a WaveformBuffer, settings: &'a SearchSettings) -> Self {
        Self { buffer, settings }
    }

    pub fn search(&self, constraint: &LoopConstraint) -> LoopResult {
        let requested = constraint.min_duration_samples;

        if let (Some(start), Some(end)) = (constraint.fixed_start_sample, constraint.fixed_end_sample) {
            log::info!("Using fixed loop {}..{}", start, end);
            return LoopResult::fixed(
                LoopPoints {
                    start_sample: start,
                    end_sample: end,
                },
                requested,
            );
        }

        let mut applied = requested;
        let mut halvings = 0;
        let window = loop {
            if let Some(window) = SearchWindow::build(constraint, applied, self.settings.sustain_start_fraction) {
                break Some(window);
            }
            if applied == 0 {
                break None;
            }
            applied = if halvings < self.settings.max_relaxation_steps {
                halvings += 1;
                applied / 2
            } else {
                0
            };
            log::debug!("No admissible loop window, relaxing minimum duration to {} frames", applied);
        };

        let Some(window) = window else {
            log::warn!(
                "No loop fits in {} frames (fixed start {:?}, fixed end {:?})",
                constraint.frames,
                constraint.fixed_start_sample,
                constraint.fixed_end_sample
            );
            return LoopResult::not_found(requested);
        };

        if applied < requested {
            log::warn!(
                "Minimum loop duration relaxed from {} to {} frames",
                requested,
                applied
            );
        }
        log::debug!("Searching loop window {:?} (~{} pairs)", window, window.pair_bound());

        let analysis = WaveformAnalysis::new(self.buffer, self.settings);
        let scorer = SeamScorer {
            analysis: &analysis,
            settings: self.settings,
        };
        let best = if window.pair_bound() <= self.settings.exhaustive_pair_limit {
            scorer.exhaustive(&window)
        } else {
            scorer.coarse_to_fine(&window)
        };

        log::info!(
            "Loop found: {}..{} ({} frames, penalty {:.6})",
            best.start_sample,
            best.end_sample,
            best.end_sample - best.start_sample,
            best.continuity_score
        );
        LoopResult::scored(best, requested, applied)
    }

    /// Seam penalty of an arbitrary pair under this search's settings.
    pub fn seam_penalty(&self, start: usize, end: usize) -> f64 {
        let analysis = WaveformAnalysis::new(self.buffer, self.settings);
        SeamScorer {
            analysis: &analysis,
            settings: self.settings,
        }
        .penalty(start, end)
    }
}

struct SeamScorer<'a> {
    analysis: &'a WaveformAnalysis,
    settings: &'a SearchSettings,
}

impl SeamScorer<'_> {
    fn penalty(&self, start: usize, end: usize) -> f64 {
        let a = start.saturating_sub(1);
        let b = end - 1;
        let s = self.settings;

        let mut combined = 0.0f64;
        for trace in self.analysis.traces() {
            let amplitude = (trace.smoothed[b] - trace.smoothed[a]).abs() as f64;
            let slope = ((trace.slope[b] - trace.slope[a]) * trace.slope_scale).abs() as f64;
            let energy = (trace.energy[b] - trace.energy[a]).abs() as f64;
            let channel = amplitude + s.slope_weight * slope + s.energy_weight * energy;
            combined = match s.channel_combine {
                ChannelCombine::Worst => combined.max(channel),
                ChannelCombine::Sum => combined + channel,
            };
        }

        if s.zero_crossing_weight > 0.0 {
            combined += s.zero_crossing_weight * (self.crossing_penalty(start) + self.crossing_penalty(end));
        }
        combined
    }

    /// 0 on a rising zero crossing, growing to 1 at `zero_crossing_radius`.
    fn crossing_penalty(&self, frame: usize) -> f64 {
        let radius = self.settings.zero_crossing_radius;
        match self.analysis.distance_to_rising_crossing(frame) {
            Some(0) => 0.0,
            Some(d) if radius > 0 => d.min(radius) as f64 / radius as f64,
            _ => 1.0,
        }
    }

    fn candidate(&self, start: usize, end: usize) -> LoopCandidate {
        LoopCandidate {
            start_sample: start,
            end_sample: end,
            continuity_score: self.penalty(start, end),
        }
    }

    fn exhaustive(&self, window: &SearchWindow) -> LoopCandidate {
        let mut best = self.candidate(window.start_lo, window.end_hi);
        for start in window.start_lo..=window.start_hi {
            let first_end = window.end_lo.max(start + window.min_len);
            for end in first_end..=window.end_hi {
                let candidate = self.candidate(start, end);
                if candidate.rank(&best).is_lt() {
                    best = candidate;
                }
            }
        }
        best
    }

    fn coarse_to_fine(&self, window: &SearchWindow) -> LoopCandidate {
        let points = self.settings.coarse_points;
        let (starts, start_stride) = grid(window.start_lo, window.start_hi, points);
        let (ends, end_stride) = grid(window.end_lo, window.end_hi, points);

        let mut seeds: Vec<LoopCandidate> = Vec::with_capacity(self.settings.refine_seeds + 1);
        let mut offer = |candidate: LoopCandidate| {
            let idx = seeds.partition_point(|c| c.rank(&candidate).is_le());
            if idx < self.settings.refine_seeds {
                seeds.insert(idx, candidate);
                seeds.truncate(self.settings.refine_seeds);
            }
        };

        for &start in &starts {
            let shortest = start + window.min_len;
            if window.admits(start, shortest) {
                offer(self.candidate(start, shortest));
            }
            for &end in &ends {
                if end > shortest && window.admits(start, end) {
                    offer(self.candidate(start, end));
                }
            }
        }
        log::debug!(
            "Coarse pass: {} x {} grid (strides {} / {}), refining {} seeds",
            starts.len(),
            ends.len(),
            start_stride,
            end_stride,
            seeds.len()
        );

        let initial_step = start_stride.max(end_stride);
        seeds
            .into_iter()
            .map(|seed| self.refine(window, seed, initial_step))
            .min_by(|a, b| a.rank(b))
            .unwrap_or_else(|| self.candidate(window.start_lo, window.end_hi))
    }

    fn refine(&self, window: &SearchWindow, seed: LoopCandidate, initial_step: usize) -> LoopCandidate {
        let mut best = seed;
        let mut step = initial_step.max(1);
        loop {
            step = (step / 2).max(1);
            best = self.best_around(window, best, step, 2);
            if step == 1 {
                break;
            }
        }

        for _ in 0..MAX_POLISH_ROUNDS {
            let next = self.best_around(window, best, 1, self.settings.refine_radius as isize);
            if next.start_sample == best.start_sample && next.end_sample == best.end_sample {
                break;
            }
            best = next;
        }
        best
    }

    /// Best admissible pair on a `(2 * reach + 1)^2` grid of spacing `step`
    /// centred on `center`, including `center` itself.
    fn best_around(&self, window: &SearchWindow, center: LoopCandidate, step: usize, reach: isize) -> LoopCandidate {
        let mut best = center;
        let step = step as isize;
        for ds in -reach..=reach {
            let Some(start) = center.start_sample.checked_add_signed(ds * step) else {
                continue;
            };
            for de in -reach..=reach {
                let Some(end) = center.end_sample.checked_add_signed(de * step) else {
                    continue;
                };
                if (ds, de) == (0, 0) || !window.admits(start, end) {
                    continue;
                }
                let candidate = self.candidate(start, end);
                if candidate.rank(&best).is_lt() {
                    best = candidate;
                }
            }
        }
        best
    }
}

/// Evenly spaced indices covering `lo..=hi` with at most `points` entries
/// (plus `hi`), and the spacing used.
fn grid(lo: usize, hi: usize, points: usize) -> (Vec<usize>, usize) {
    let span = hi - lo;
    if span < points {
        return ((lo..=hi).collect(), 1);
    }
    let stride = span.div_ceil(points.max(2) - 1);
    let mut values: Vec<usize> = (lo..=hi).step_by(stride).collect();
    if values.last() != Some(&hi) {
        values.push(hi);
    }
    (values, stride)
}
