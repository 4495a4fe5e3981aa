use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use super::driver::DriverClass;
use super::error::ConfigurationError;

/// Configuration for one note/velocity capture.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Input device ID, or None for the first device with enough inputs.
    pub device_id: Option<String>,

    /// First device input channel to record (0-based).
    pub channel_offset: u16,

    /// Number of consecutive channels to record starting at `channel_offset` (default: 2).
    pub channels: u16,

    /// Sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Bit depth of the stored sample (default: 24). Valid values: 16, 24, 32.
    pub bit_depth: u16,

    /// Length of the recording in seconds.
    pub duration_secs: f64,

    /// MIDI note number played for this capture.
    pub note: u8,

    /// MIDI velocity played for this capture.
    pub velocity: u8,

    /// Seconds after note-on at which note-off is sent on devices that allow
    /// concurrent capture (None = after the full duration).
    pub note_hold_secs: Option<f64>,

    /// Extra wall-clock time allowed beyond `duration_secs` before the device
    /// is declared hung.
    pub timeout_slack_secs: f64,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![16, 24, 32].contains(&self.bit_depth) {
            return Err(format!("unsupported bit depth: {}", self.bit_depth));
        }
        if self.channels == 0 {
            return Err("at least one channel must be recorded".into());
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(format!("invalid capture duration: {}", self.duration_secs));
        }
        if let Some(hold) = self.note_hold_secs {
            if !(hold.is_finite() && hold >= 0.0 && hold <= self.duration_secs) {
                return Err(format!("note hold {hold}s must lie within the {}s capture", self.duration_secs));
            }
        }
        if !(self.timeout_slack_secs.is_finite() && self.timeout_slack_secs >= 0.0) {
            return Err(format!("invalid timeout slack: {}", self.timeout_slack_secs));
        }
        if self.note > 127 || self.velocity > 127 {
            return Err(format!("note {} / velocity {} outside MIDI range", self.note, self.velocity));
        }
        Ok(())
    }

    /// Frames the capture must deliver.
    pub fn frames_requested(&self) -> usize {
        ((self.duration_secs * self.sample_rate as f64).round() as usize).max(1)
    }

    /// Channel index one past the last recorded device input.
    pub fn channel_end(&self) -> u16 {
        self.channel_offset.saturating_add(self.channels)
    }

    /// Delay between note-on and note-off.
    pub fn note_hold(&self) -> Duration {
        Duration::from_secs_f64(self.note_hold_secs.unwrap_or(self.duration_secs))
    }

    /// Wall-clock bound after which a capture is treated as a device hang.
    pub fn capture_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs + self.timeout_slack_secs)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            device_id: None,
            channel_offset: 0,
            channels: 2,
            sample_rate: 44100,
            bit_depth: 24,
            duration_secs: 5.0,
            note: 60,
            velocity: 100,
            note_hold_secs: None,
            timeout_slack_secs: 5.0,
        }
    }
}

/// Minimum loop length, either relative to the recording or absolute.
///
/// Parses `"50%"` as a percentage and `"1.5"` / `"1.5s"` / `1.5` as seconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawMinDuration")]
pub enum MinDuration {
    Percent(f64),
    Seconds(f64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMinDuration {
    Seconds(f64),
    Text(String),
}

impl TryFrom<RawMinDuration> for MinDuration {
    type Error = ConfigurationError;

    fn try_from(raw: RawMinDuration) -> Result<Self, Self::Error> {
        match raw {
            RawMinDuration::Seconds(secs) => MinDuration::seconds(secs),
            RawMinDuration::Text(text) => text.parse(),
        }
    }
}

impl MinDuration {
    pub fn percent(percent: f64) -> Result<Self, ConfigurationError> {
        if !(percent.is_finite() && (0.0..=100.0).contains(&percent)) {
            return Err(ConfigurationError::InvalidMinDuration(format!(
                "{percent}% is outside 0-100%"
            )));
        }
        Ok(Self::Percent(percent))
    }

    pub fn seconds(secs: f64) -> Result<Self, ConfigurationError> {
        if !(secs.is_finite() && secs >= 0.0) {
            return Err(ConfigurationError::InvalidMinDuration(format!(
                "{secs}s is not a non-negative duration"
            )));
        }
        Ok(Self::Seconds(secs))
    }
}

impl FromStr for MinDuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || ConfigurationError::InvalidMinDuration(format!("cannot parse '{s}'"));

        if let Some(percent) = text.strip_suffix('%') {
            let value: f64 = percent.trim().parse().map_err(|_| invalid())?;
            return Self::percent(value);
        }
        let number = text.strip_suffix('s').unwrap_or(text).trim();
        let value: f64 = number.parse().map_err(|_| invalid())?;
        Self::seconds(value)
    }
}

impl fmt::Display for MinDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent(p) => write!(f, "{p}%"),
            Self::Seconds(s) => write!(f, "{s}s"),
        }
    }
}

/// How per-channel seam penalties are combined into one score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelCombine {
    /// The worst channel decides; a loop must be clean on every channel.
    Worst,
    Sum,
}

/// Tunables of the loop-point search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Centered moving-average length (frames) applied before seam comparison.
    /// 1 compares raw samples.
    pub smoothing_window: usize,

    /// RMS window (frames) for the energy envelope.
    pub energy_window: usize,

    /// Weight of the derivative mismatch, in amplitude units.
    pub slope_weight: f64,

    /// Weight of the energy-envelope mismatch.
    pub energy_weight: f64,

    /// Tie-breaking weight pulling seams towards rising zero crossings.
    pub zero_crossing_weight: f64,

    /// Distance (frames) beyond which the zero-crossing penalty saturates.
    pub zero_crossing_radius: usize,

    /// Fraction of the buffer before which unconstrained loops do not start.
    pub sustain_start_fraction: f64,

    /// Times the minimum duration may be halved when no pair fits.
    pub max_relaxation_steps: u32,

    /// Windows with at most this many pairs are scored exhaustively.
    pub exhaustive_pair_limit: u64,

    /// Grid points per axis on the coarse pass.
    pub coarse_points: usize,

    /// Coarse candidates refined on the fine pass.
    pub refine_seeds: usize,

    /// Half-width (frames) of the exhaustive neighbourhood after refinement.
    pub refine_radius: usize,

    pub channel_combine: ChannelCombine,
}

impl SearchSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |msg: String| Err(ConfigurationError::InvalidSetting(msg));
        if self.smoothing_window == 0 || self.energy_window == 0 {
            return invalid("smoothing and energy windows must be at least one frame".into());
        }
        if !(0.0..1.0).contains(&self.sustain_start_fraction) {
            return invalid(format!(
                "sustain start fraction {} must lie in [0, 1)",
                self.sustain_start_fraction
            ));
        }
        for (name, weight) in [
            ("slope_weight", self.slope_weight),
            ("energy_weight", self.energy_weight),
            ("zero_crossing_weight", self.zero_crossing_weight),
        ] {
            if !(weight.is_finite() && weight >= 0.0) {
                return invalid(format!("{name} must be a non-negative number"));
            }
        }
        if self.coarse_points < 2 || self.refine_seeds == 0 {
            return invalid("coarse search needs at least two points and one seed".into());
        }
        Ok(())
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            energy_window: 1024,
            slope_weight: 1.0,
            energy_weight: 1.0,
            zero_crossing_weight: 1e-4,
            zero_crossing_radius: 32,
            sustain_start_fraction: 0.5,
            max_relaxation_steps: 16,
            exhaustive_pair_limit: 1_000_000,
            coarse_points: 512,
            refine_seeds: 8,
            refine_radius: 3,
            channel_combine: ChannelCombine::Worst,
        }
    }
}

/// User loop constraints in time units, before resolution against a buffer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoopConfiguration {
    pub min_duration: MinDuration,
    pub fixed_start_time: Option<f64>,
    pub fixed_end_time: Option<f64>,
    pub search: SearchSettings,
}

impl Default for LoopConfiguration {
    fn default() -> Self {
        Self {
            min_duration: MinDuration::Percent(20.0),
            fixed_start_time: None,
            fixed_end_time: None,
            search: SearchSettings::default(),
        }
    }
}

/// Everything the engine reads from an external configuration front-end.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfiguration {
    pub capture: CaptureConfiguration,

    #[serde(rename = "loop")]
    pub loop_search: LoopConfiguration,

    /// Host-API name → driver class overrides.
    pub drivers: HashMap<String, DriverClass>,
}

impl EngineConfiguration {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        config.capture.validate().map_err(ConfigurationError::InvalidSetting)?;
        config.loop_search.search.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Parse(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_min_duration_forms() {
        assert_eq!("50%".parse::<MinDuration>().unwrap(), MinDuration::Percent(50.0));
        assert_eq!(" 12.5 % ".parse::<MinDuration>().unwrap(), MinDuration::Percent(12.5));
        assert_eq!("1.5".parse::<MinDuration>().unwrap(), MinDuration::Seconds(1.5));
        assert_eq!("2s".parse::<MinDuration>().unwrap(), MinDuration::Seconds(2.0));
    }

    #[test]
    fn reject_bad_min_duration() {
        assert!("150%".parse::<MinDuration>().is_err());
        assert!("-1".parse::<MinDuration>().is_err());
        assert!("abc".parse::<MinDuration>().is_err());
        assert!("NaN".parse::<MinDuration>().is_err());
    }

    #[test]
    fn default_capture_config_is_valid() {
        assert!(CaptureConfiguration::default().validate().is_ok());
    }

    #[test]
    fn capture_config_rejects_bad_values() {
        let bad_depth = CaptureConfiguration {
            bit_depth: 12,
            ..Default::default()
        };
        assert!(bad_depth.validate().is_err());

        let long_hold = CaptureConfiguration {
            duration_secs: 2.0,
            note_hold_secs: Some(3.0),
            ..Default::default()
        };
        assert!(long_hold.validate().is_err());
    }

    #[test]
    fn capture_frames_and_deadline() {
        let config = CaptureConfiguration {
            duration_secs: 0.5,
            sample_rate: 48000,
            timeout_slack_secs: 1.5,
            ..Default::default()
        };
        assert_eq!(config.frames_requested(), 24000);
        assert_eq!(config.capture_deadline(), Duration::from_secs(2));
        assert_eq!(config.note_hold(), Duration::from_millis(500));
    }

    #[test]
    fn engine_config_from_json() {
        let json = r#"{
            "capture": { "device_id": "hw:1", "channel_offset": 2, "sample_rate": 48000, "duration_secs": 8.0 },
            "loop": { "min_duration": "40%", "fixed_start_time": 1.25, "search": { "smoothing_window": 9 } },
            "drivers": { "My Custom API": "requires_caller_thread" }
        }"#;

        let config = EngineConfiguration::from_json_str(json).unwrap();

        assert_eq!(config.capture.device_id.as_deref(), Some("hw:1"));
        assert_eq!(config.capture.channel_offset, 2);
        assert_eq!(config.capture.channels, 2);
        assert_eq!(config.loop_search.min_duration, MinDuration::Percent(40.0));
        assert_eq!(config.loop_search.fixed_start_time, Some(1.25));
        assert_eq!(config.loop_search.search.smoothing_window, 9);
        assert_eq!(config.loop_search.search.coarse_points, 512);
        assert_eq!(config.drivers["My Custom API"], DriverClass::RequiresCallerThread);
    }

    #[test]
    fn engine_config_accepts_numeric_min_duration() {
        let config = EngineConfiguration::from_json_str(r#"{ "loop": { "min_duration": 2.5 } }"#).unwrap();
        assert_eq!(config.loop_search.min_duration, MinDuration::Seconds(2.5));
    }

    #[test]
    fn engine_config_reports_parse_errors() {
        let err = EngineConfiguration::from_json_str(r#"{ "loop": { "min_duration": "lots" } }"#).unwrap_err();
        assert!(matches!(err, ConfigurationError::Parse(_)));

        let err = EngineConfiguration::from_json_str(r#"{ "capture": { "bit_depth": 8 } }"#).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidSetting(_)));
    }
}
