//! Engine configuration.
//!
//! Every field has a default, so a JSON file only needs to name what it changes:
//!
//! ```json
//! { "crossfade_seconds": 3.0, "master_volume": 0.5 }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for the playback controller and its graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rate of the manual backend and the graph's initial rate (Hz).
    pub sample_rate: u32,
    /// Length of each layer's looping noise buffer (seconds).
    pub loop_seconds: f64,
    /// Background crossfade duration (seconds).
    pub crossfade_seconds: f64,
    /// Extra wait after a fade-out before the channel is torn down (seconds).
    pub teardown_margin_seconds: f64,
    /// Time constant of channel volume changes (seconds).
    pub channel_time_constant: f64,
    /// Time constant of master volume / mute changes (seconds).
    pub master_time_constant: f64,
    pub master_volume: f32,
    /// Volume of a channel that has no remembered volume yet.
    pub default_channel_volume: f32,
    /// RNG seed for reproducible renders; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            loop_seconds: 8.0,
            crossfade_seconds: 2.0,
            teardown_margin_seconds: 0.2,
            channel_time_constant: 0.08,
            master_time_constant: 0.15,
            master_volume: 0.6,
            default_channel_volume: 1.0,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::NonPositive { field: "sample_rate", value: 0.0 });
        }
        let durations = [
            ("loop_seconds", self.loop_seconds),
            ("crossfade_seconds", self.crossfade_seconds),
            ("teardown_margin_seconds", self.teardown_margin_seconds),
            ("channel_time_constant", self.channel_time_constant),
            ("master_time_constant", self.master_time_constant),
        ];
        for (field, value) in durations {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        for (field, value) in [
            ("master_volume", self.master_volume),
            ("default_channel_volume", self.default_channel_volume),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }
        Ok(())
    }

    /// Total wait between a fade-out starting and the channel's teardown.
    #[inline]
    pub fn teardown_delay(&self) -> f64 {
        self.crossfade_seconds + self.teardown_margin_seconds
    }
}
