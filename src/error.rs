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

/// Faults raised by the looper core and its audio collaborators. Commands that are simply not
/// valid in the current state are not errors; they come back as a rejected command outcome.
#[derive(Debug, thiserror::Error)]
pub enum LooperError {
    #[error("Capture device unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Unable to decode captured audio: {0}")]
    DecodeFailure(String),

    #[error("Sample rate mismatch during overdub: {0}Hz loop, {1}Hz take")]
    SampleRateMismatch(u32, u32),

    #[error("Track {0} does not exist, tracks are numbered 1 to 4")]
    InvalidTrack(usize),

    #[error("Invalid divider: {0}")]
    InvalidDivider(String),

    #[error("Gain {0} is outside of 0.0 to 1.2")]
    InvalidGain(f32),

    #[error("Playback error: {0}")]
    Playback(String),
}

impl From<symphonia::core::errors::Error> for LooperError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        LooperError::DecodeFailure(err.to_string())
    }
}

impl From<hound::Error> for LooperError {
    fn from(err: hound::Error) -> Self {
        LooperError::CaptureUnavailable(err.to_string())
    }
}
