// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
use std::{fmt, sync::Arc};

use crate::clock::Clock;
use crate::config;
use crate::error::LooperError;
use crate::track::TrackIndex;

pub mod bounce;
pub mod buffer;
pub mod capture;
pub mod cpal;
pub mod decoder;
pub mod mixer;
pub mod mock;

pub use buffer::LoopBuffer;

/// Something that can record the performer. The looper never looks at what a session produces;
/// it only hands the bytes to a [Decoder].
pub trait AudioCapture: fmt::Display + Send + Sync {
    /// Starts capturing input on behalf of the given track.
    fn begin(&self, track: TrackIndex) -> Result<Box<dyn CaptureSession>, LooperError>;
}

/// A single running capture.
pub trait CaptureSession: Send {
    /// Ends the capture and returns the encoded audio.
    fn stop(self: Box<Self>) -> Result<Vec<u8>, LooperError>;

    /// Ends the capture and throws away anything recorded.
    fn abort(self: Box<Self>);
}

/// Turns captured bytes into loop audio.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<LoopBuffer, LooperError>;
}

/// Somewhere loops are played. Playback always repeats until stopped.
pub trait PlaybackSink: Send + Sync {
    /// Starts looping the buffer from `start_offset` seconds in, scaled by `gain`.
    fn play(
        &self,
        buffer: Arc<LoopBuffer>,
        start_offset: f64,
        gain: f32,
    ) -> Result<Box<dyn PlaybackHandle>, LooperError>;
}

/// A loop that is currently sounding.
pub trait PlaybackHandle: Send {
    fn stop(&mut self);

    /// Changes the output scaling without interrupting playback.
    fn set_gain(&self, gain: f32);

    /// The position within the loop, in seconds.
    fn current_position_seconds(&self) -> f64;
}

/// The audio collaborators the looper drives.
#[derive(Clone)]
pub struct Services {
    pub capture: Arc<dyn AudioCapture>,
    pub decoder: Arc<dyn Decoder>,
    pub sink: Arc<dyn PlaybackSink>,
}

impl Services {
    pub fn new(
        capture: Arc<dyn AudioCapture>,
        decoder: Arc<dyn Decoder>,
        sink: Arc<dyn PlaybackSink>,
    ) -> Services {
        Services {
            capture,
            decoder,
            sink,
        }
    }
}

/// Builds the capture device and matching decoder for the given configuration.
pub fn get_capture(
    config: &config::Capture,
    sample_rate: u32,
    clock: Arc<dyn Clock>,
) -> (Arc<dyn AudioCapture>, Arc<dyn Decoder>) {
    match config {
        config::Capture::Signal(signal) => (
            Arc::new(capture::SignalCapture::new(
                clock,
                sample_rate,
                signal.frequency(),
                signal.amplitude(),
            )),
            Arc::new(decoder::SymphoniaDecoder::new()),
        ),
        config::Capture::Mock => (
            Arc::new(mock::Capture::new(clock, sample_rate)),
            Arc::new(mock::Decoder::new()),
        ),
    }
}
