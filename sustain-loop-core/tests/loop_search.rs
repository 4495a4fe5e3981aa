use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sustain_loop_core::{
    find_loop, ConfigurationError, LoopConfiguration, LoopStatus, MinDuration, WaveformBuffer,
};

fn sine(frames: usize, sample_rate: u32, freq: f32, amplitude: f32) -> Vec<f32> {
    (0..frames)
        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin() * amplitude)
        .collect()
}

fn loop_config(min_duration: MinDuration) -> LoopConfiguration {
    LoopConfiguration {
        min_duration,
        ..Default::default()
    }
}

#[test]
fn fixed_endpoints_are_returned_exactly() {
    // Content is irrelevant when both endpoints are pinned.
    let mut rng = StdRng::seed_from_u64(7);
    let samples: Vec<f32> = (0..12 * 44100).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let buffer = WaveformBuffer::mono(samples, 44100).unwrap();

    let config = LoopConfiguration {
        fixed_start_time: Some(2.0),
        fixed_end_time: Some(10.0),
        ..loop_config(MinDuration::Seconds(1.0))
    };
    let result = find_loop(&buffer, &config).unwrap();

    assert_eq!(result.status(), LoopStatus::Found);
    assert_eq!(result.start_sample(), Some(88_200));
    assert_eq!(result.end_sample(), Some(441_000));
}

#[test]
fn half_of_ten_seconds_is_honoured() {
    let samples: Vec<f32> = sine(441_000, 44100, 220.0, 0.6)
        .into_iter()
        .enumerate()
        .map(|(i, v)| v * (-(i as f32) / 441_000.0).exp())
        .collect();
    let buffer = WaveformBuffer::mono(samples, 44100).unwrap();

    let result = find_loop(&buffer, &loop_config(MinDuration::Percent(50.0))).unwrap();

    assert_eq!(result.status(), LoopStatus::Found);
    let points = result.points().unwrap();
    assert!(points.len() >= 220_500, "loop of {} frames", points.len());
    assert!(points.end_sample <= 440_999);
}

#[test]
fn reversed_fixed_times_are_a_configuration_error() {
    let buffer = WaveformBuffer::mono(vec![0.0; 12 * 44100], 44100).unwrap();
    let config = LoopConfiguration {
        fixed_start_time: Some(10.0),
        fixed_end_time: Some(2.0),
        ..Default::default()
    };

    let err = find_loop(&buffer, &config).unwrap_err();
    assert!(matches!(err, ConfigurationError::FixedStartNotBeforeEnd { .. }));
}

#[test]
fn short_percussive_hit_never_yields_inverted_pair() {
    let frames = (0.3 * 44100.0) as usize;
    let mut rng = StdRng::seed_from_u64(42);
    let samples: Vec<f32> = (0..frames)
        .map(|i| rng.gen_range(-1.0f32..1.0) * (-(i as f32) / 800.0).exp())
        .collect();
    let buffer = WaveformBuffer::mono(samples, 44100).unwrap();

    let result = find_loop(&buffer, &loop_config(MinDuration::Percent(80.0))).unwrap();

    match result.points() {
        Some(points) => {
            assert!(points.start_sample < points.end_sample);
            assert!(points.end_sample < frames);
            assert!(points.len() >= result.applied_min_duration());
        }
        None => assert_eq!(result.status(), LoopStatus::NotFound),
    }
}

#[test]
fn noisy_sustain_loops_on_the_waveform_not_the_noise() {
    // 200 Hz at 8 kHz: one period every 40 frames.
    let period = 40;
    let mut rng = StdRng::seed_from_u64(1234);
    let samples: Vec<f32> = sine(8000, 8000, 200.0, 0.5)
        .into_iter()
        .map(|v| v + rng.gen_range(-0.05f32..0.05))
        .collect();
    let buffer = WaveformBuffer::mono(samples, 8000).unwrap();

    let result = find_loop(&buffer, &loop_config(MinDuration::Seconds(0.25))).unwrap();
    let points = result.points().unwrap();

    let phase_error = points.len() % period;
    let phase_error = phase_error.min(period - phase_error);
    assert!(phase_error <= 3, "loop of {} frames is {} frames off a period", points.len(), phase_error);
}

#[test]
fn stereo_loop_must_fit_both_channels() {
    // Channel periods of 40 and 32 frames only line up every 160 frames.
    let left = sine(4000, 8000, 200.0, 0.5);
    let right = sine(4000, 8000, 250.0, 0.5);
    let buffer = WaveformBuffer::from_channels(&[left, right], 8000, 24).unwrap();

    let result = find_loop(&buffer, &loop_config(MinDuration::Seconds(0.2))).unwrap();
    let len = result.points().unwrap().len();
    let offset = len % 160;
    assert!(offset.min(160 - offset) <= 1, "loop of {} frames", len);
}

fn arbitrary_buffer() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0f32..1.0, 1..300)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn found_loops_are_ordered_and_long_enough(samples in arbitrary_buffer(), percent in 0.0f64..=100.0) {
        let frames = samples.len();
        let buffer = WaveformBuffer::mono(samples, 1000).unwrap();
        let result = find_loop(&buffer, &loop_config(MinDuration::Percent(percent))).unwrap();

        prop_assert!(result.applied_min_duration() <= result.requested_min_duration());
        match result.points() {
            Some(points) => {
                prop_assert!(points.start_sample < points.end_sample);
                prop_assert!(points.end_sample <= frames - 1);
                prop_assert!(points.len() >= result.applied_min_duration());
                if result.status() == LoopStatus::Found {
                    prop_assert_eq!(result.applied_min_duration(), result.requested_min_duration());
                }
            }
            None => prop_assert_eq!(result.status(), LoopStatus::NotFound),
        }
    }

    #[test]
    fn search_is_deterministic(samples in arbitrary_buffer(), percent in 0.0f64..=100.0) {
        let buffer = WaveformBuffer::mono(samples, 1000).unwrap();
        let config = loop_config(MinDuration::Percent(percent));
        prop_assert_eq!(find_loop(&buffer, &config).unwrap(), find_loop(&buffer, &config).unwrap());
    }
}
