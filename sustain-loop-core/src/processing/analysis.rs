//! Derived per-frame metadata used by the loop search.
//!
//! Every channel gets a smoothed trace, its first difference and a short-term
//! RMS envelope. Rising zero crossings are taken from the mono mixdown of the
//! smoothed traces so that all channels share one crossing grid.

use crate::models::config::SearchSettings;
use crate::models::waveform::WaveformBuffer;

/// Smoothed signal, slope and energy envelope of one channel.
#[derive(Debug, Clone)]
pub struct ChannelTrace {
    pub smoothed: Vec<f32>,
    pub slope: Vec<f32>,
    pub energy: Vec<f32>,
    /// Factor bringing `slope` into the amplitude range of `smoothed`.
    pub slope_scale: f32,
}

impl ChannelTrace {
    pub fn new(samples: &[f32], smoothing_window: usize, energy_window: usize) -> Self {
        let smoothed = moving_average(samples, smoothing_window);
        let slope = first_difference(&smoothed);
        let energy = rms_envelope(samples, energy_window);

        let slope_rms = rms_level(&slope);
        let slope_scale = if slope_rms > f32::EPSILON {
            rms_level(&smoothed) / slope_rms
        } else {
            0.0
        };

        Self {
            smoothed,
            slope,
            energy,
            slope_scale,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WaveformAnalysis {
    traces: Vec<ChannelTrace>,
    rising_crossings: Vec<usize>,
}

impl WaveformAnalysis {
    pub fn new(buffer: &WaveformBuffer, settings: &SearchSettings) -> Self {
        let traces: Vec<ChannelTrace> = (0..buffer.channels())
            .map(|c| {
                let samples: Vec<f32> = buffer.channel(c).collect();
                ChannelTrace::new(&samples, settings.smoothing_window, settings.energy_window)
            })
            .collect();

        let mut mix = vec![0.0f32; buffer.frames()];
        for trace in &traces {
            for (m, s) in mix.iter_mut().zip(&trace.smoothed) {
                *m += s;
            }
        }
        let rising_crossings = rising_zero_crossings(&mix);

        log::debug!(
            "Analyzed {} frames x {} channels, {} rising zero crossings",
            buffer.frames(),
            traces.len(),
            rising_crossings.len()
        );

        Self {
            traces,
            rising_crossings,
        }
    }

    pub fn traces(&self) -> &[ChannelTrace] {
        &self.traces
    }

    pub fn rising_crossings(&self) -> &[usize] {
        &self.rising_crossings
    }

    /// Distance from `frame` to the closest rising zero crossing.
    pub fn distance_to_rising_crossing(&self, frame: usize) -> Option<usize> {
        let crossings = &self.rising_crossings;
        let idx = crossings.partition_point(|&c| c < frame);
        let after = crossings.get(idx).map(|&c| c - frame);
        let before = idx.checked_sub(1).map(|i| frame - crossings[i]);
        match (before, after) {
            (Some(b), Some(a)) => Some(b.min(a)),
            (b, a) => b.or(a),
        }
    }
}

/// Centered moving average. Edges average over the frames that exist.
pub fn moving_average(samples: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 || samples.is_empty() {
        return samples.to_vec();
    }
    let mut prefix = Vec::with_capacity(samples.len() + 1);
    prefix.push(0.0f64);
    let mut acc = 0.0f64;
    for &s in samples {
        acc += s as f64;
        prefix.push(acc);
    }

    let behind = (window - 1) / 2;
    let ahead = window / 2;
    (0..samples.len())
        .map(|i| {
            let lo = i.saturating_sub(behind);
            let hi = (i + ahead + 1).min(samples.len());
            ((prefix[hi] - prefix[lo]) / (hi - lo) as f64) as f32
        })
        .collect()
}

/// Backward first difference; frame 0 repeats frame 1's slope.
pub fn first_difference(samples: &[f32]) -> Vec<f32> {
    let mut slope = Vec::with_capacity(samples.len());
    for i in 0..samples.len() {
        slope.push(if i == 0 { 0.0 } else { samples[i] - samples[i - 1] });
    }
    if slope.len() > 1 {
        slope[0] = slope[1];
    }
    slope
}

/// Centered short-term RMS.
pub fn rms_envelope(samples: &[f32], window: usize) -> Vec<f32> {
    let squares: Vec<f32> = samples.iter().map(|s| s * s).collect();
    moving_average(&squares, window)
        .into_iter()
        .map(|m| m.max(0.0).sqrt())
        .collect()
}

/// Frames where the signal rises through zero (`s[i-1] < 0 <= s[i]`).
pub fn rising_zero_crossings(samples: &[f32]) -> Vec<usize> {
    samples
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] < 0.0 && w[1] >= 0.0)
        .map(|(i, _)| i + 1)
        .collect()
}

/// Compute RMS level of samples.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Compute peak absolute level of samples.
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}
