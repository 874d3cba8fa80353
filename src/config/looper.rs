// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{path::Path, time::Duration};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::{capture::Capture, controller::Controller, error::ConfigError};
use crate::{
    looper::Settings,
    track::{Divider, TRACK_COUNT},
};

const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_MAX_MASTER_RECORDING: Duration = Duration::from_secs(60);
const DEFAULT_HOLD_TO_CLEAR: Duration = Duration::from_secs(2);
const DEFAULT_GAIN: f32 = 0.9;
const DEFAULT_OUTPUT_CHANNELS: u16 = 2;

/// The configuration for the looper.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Looper {
    /// Sample rate used for capture and output (default: 48000).
    sample_rate: Option<u32>,

    /// Hard cap on a master recording, e.g. "60s".
    max_master_recording: Option<String>,

    /// How long the stop control must be held to clear a track, e.g. "2s".
    hold_to_clear: Option<String>,

    /// The gain every track starts with.
    default_gain: Option<f32>,

    /// Starting dividers for tracks 2 to 4, e.g. ["1", "2", "1/2"].
    dividers: Option<Vec<String>>,

    /// Where recordings come from.
    capture: Option<Capture>,

    /// Number of output channels for the mixer.
    output_channels: Option<u16>,

    /// Name of the output device. The host's default device is used when omitted.
    output_device: Option<String>,

    /// The controller configuration.
    controller: Option<Controller>,
}

impl Looper {
    /// Parse the looper configuration from a YAML file and check it.
    pub fn deserialize(path: &Path) -> Result<Looper, ConfigError> {
        let looper = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Looper>()?;
        looper.settings()?;
        Ok(looper)
    }

    /// Returns the sample rate (default: 48000).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the master recording cap (default: 60s).
    pub fn max_master_recording(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "max_master_recording",
            &self.max_master_recording,
            DEFAULT_MAX_MASTER_RECORDING,
        )
    }

    /// Returns the hold to clear time (default: 2s).
    pub fn hold_to_clear(&self) -> Result<Duration, ConfigError> {
        parse_duration("hold_to_clear", &self.hold_to_clear, DEFAULT_HOLD_TO_CLEAR)
    }

    /// Returns the starting gain (default: 0.9).
    pub fn default_gain(&self) -> f32 {
        self.default_gain.unwrap_or(DEFAULT_GAIN)
    }

    /// Returns the starting dividers of tracks 2 to 4 (default: all 1).
    pub fn dividers(&self) -> Result<[Divider; TRACK_COUNT - 1], ConfigError> {
        let mut dividers = [Divider::ONE; TRACK_COUNT - 1];
        let Some(configured) = &self.dividers else {
            return Ok(dividers);
        };

        if configured.len() != dividers.len() {
            return Err(ConfigError::Invalid(format!(
                "expected {} dividers, found {}",
                dividers.len(),
                configured.len()
            )));
        }
        for (divider, value) in dividers.iter_mut().zip(configured.iter()) {
            *divider = value
                .parse()
                .map_err(|e: crate::error::LooperError| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(dividers)
    }

    /// Returns the capture configuration (default: a signal).
    pub fn capture(&self) -> Capture {
        self.capture.clone().unwrap_or_default()
    }

    /// Returns the number of output channels (default: 2).
    pub fn output_channels(&self) -> u16 {
        self.output_channels.unwrap_or(DEFAULT_OUTPUT_CHANNELS)
    }

    /// Returns the output device name, if one is configured.
    pub fn output_device(&self) -> Option<String> {
        self.output_device.clone()
    }

    /// Returns the controller configuration (default: keyboard).
    pub fn controller(&self) -> Controller {
        self.controller.clone().unwrap_or_default()
    }

    /// Builds the looper core settings, checking every value.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::Invalid(
                "sample_rate must be greater than zero".to_string(),
            ));
        }
        if self.output_channels() == 0 {
            return Err(ConfigError::Invalid(
                "output_channels must be greater than zero".to_string(),
            ));
        }

        let default_gain = self.default_gain();
        if !default_gain.is_finite() || !(0.0..=1.2).contains(&default_gain) {
            return Err(ConfigError::Invalid(format!(
                "default_gain {} is outside of 0.0 to 1.2",
                default_gain
            )));
        }

        let max_master_recording = self.max_master_recording()?;
        if max_master_recording.is_zero() {
            return Err(ConfigError::Invalid(
                "max_master_recording must be greater than zero".to_string(),
            ));
        }

        Ok(Settings {
            max_master_recording,
            hold_to_clear: self.hold_to_clear()?,
            default_gain,
            dividers: self.dividers()?,
        })
    }
}

fn parse_duration(
    name: &str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.clone())
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", name, e)))?
            .into()),
        None => Ok(default),
    }
}
