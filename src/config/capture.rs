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
use serde::Deserialize;

const DEFAULT_FREQUENCY: f32 = 220.0;
const DEFAULT_AMPLITUDE: f32 = 0.5;

/// Where recordings come from.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Capture {
    /// A generated test tone.
    Signal(SignalCapture),
    /// Constant level capture, for testing.
    Mock,
}

impl Default for Capture {
    fn default() -> Self {
        Capture::Signal(SignalCapture::default())
    }
}

/// A YAML representation of the signal capture.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SignalCapture {
    /// Base frequency of the tone in Hz. Each track records a harmonic of it.
    frequency: Option<f32>,

    /// Peak amplitude of the tone.
    amplitude: Option<f32>,
}

impl SignalCapture {
    /// Returns the base frequency (default: 220Hz).
    pub fn frequency(&self) -> f32 {
        self.frequency.unwrap_or(DEFAULT_FREQUENCY)
    }

    /// Returns the amplitude (default: 0.5).
    pub fn amplitude(&self) -> f32 {
        self.amplitude.unwrap_or(DEFAULT_AMPLITUDE)
    }
}
