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
use std::{f32::consts::PI, fmt, io::Cursor, sync::Arc};

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info};

use crate::{clock::Clock, error::LooperError, track::TrackIndex};

/// Encodes planar float samples as a 32 bit float WAV file in memory.
pub fn encode_wav(channels: &[Vec<f32>], sample_rate: u32) -> Result<Vec<u8>, LooperError> {
    let spec = WavSpec {
        channels: channels.len().max(1) as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for frame in 0..frames {
            if channels.is_empty() {
                writer.write_sample(0.0f32)?;
            }
            for channel in channels {
                writer.write_sample(channel.get(frame).copied().unwrap_or(0.0))?;
            }
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// A capture device that records a sine tone for as long as a session runs. Each track sings
/// its own harmonic of the base frequency so layered loops stay distinguishable. Useful for
/// rehearsing the looper without an input device.
pub struct SignalCapture {
    clock: Arc<dyn Clock>,
    sample_rate: u32,
    frequency: f32,
    amplitude: f32,
}

impl SignalCapture {
    pub fn new(
        clock: Arc<dyn Clock>,
        sample_rate: u32,
        frequency: f32,
        amplitude: f32,
    ) -> SignalCapture {
        SignalCapture {
            clock,
            sample_rate,
            frequency,
            amplitude,
        }
    }
}

impl super::AudioCapture for SignalCapture {
    fn begin(&self, track: TrackIndex) -> Result<Box<dyn super::CaptureSession>, LooperError> {
        if self.sample_rate == 0 {
            return Err(LooperError::CaptureUnavailable(
                "sample rate must be greater than zero".to_string(),
            ));
        }

        info!(track = track.get(), "Signal capture started.");
        Ok(Box::new(SignalSession {
            clock: self.clock.clone(),
            started_at: self.clock.now(),
            sample_rate: self.sample_rate,
            frequency: self.frequency * track.get() as f32,
            amplitude: self.amplitude,
            track,
        }))
    }
}

impl fmt::Display for SignalCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz signal (Signal)", self.frequency)
    }
}

struct SignalSession {
    clock: Arc<dyn Clock>,
    started_at: f64,
    sample_rate: u32,
    frequency: f32,
    amplitude: f32,
    track: TrackIndex,
}

impl super::CaptureSession for SignalSession {
    fn stop(self: Box<Self>) -> Result<Vec<u8>, LooperError> {
        let elapsed = (self.clock.now() - self.started_at).max(0.0);
        let frames = (elapsed * self.sample_rate as f64).round() as usize;
        let samples: Vec<f32> = (0..frames)
            .map(|i| {
                let t = i as f32 / self.sample_rate as f32;
                self.amplitude * (2.0 * PI * self.frequency * t).sin()
            })
            .collect();

        debug!(
            track = self.track.get(),
            frames = frames,
            "Signal capture stopped."
        );
        encode_wav(&[samples], self.sample_rate)
    }

    fn abort(self: Box<Self>) {
        debug!(track = self.track.get(), "Signal capture aborted.");
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        audio::{decoder::SymphoniaDecoder, AudioCapture, Decoder},
        clock::ManualClock,
        track::TrackIndex,
    };

    use super::*;

    #[test]
    fn test_encode_wav_header() {
        let bytes = encode_wav(&[vec![0.5; 10], vec![-0.5; 10]], 8000).expect("encode failed");
        assert_eq!(b"RIFF", &bytes[0..4]);
        assert_eq!(b"WAVE", &bytes[8..12]);
        // 10 stereo frames of 4 byte floats follow the header.
        assert!(bytes.len() > 10 * 2 * 4);
    }

    #[test]
    fn test_signal_capture_length_follows_clock() {
        let clock = ManualClock::new(3.0);
        let capture = SignalCapture::new(Arc::new(clock.clone()), 8000, 110.0, 0.5);

        let session = capture
            .begin(TrackIndex::MASTER)
            .expect("capture should begin");
        clock.advance(1.5);
        let bytes = session.stop().expect("capture should stop");

        let buffer = SymphoniaDecoder::new()
            .decode(&bytes)
            .expect("capture should decode");
        assert_eq!(12000, buffer.frames());
        assert_eq!(1.5, buffer.duration_seconds());
        let peak = buffer
            .channel(0)
            .expect("mono channel")
            .iter()
            .fold(0.0f32, |peak, sample| peak.max(sample.abs()));
        assert!(peak > 0.45 && peak <= 0.5);
    }

    #[test]
    fn test_signal_capture_requires_sample_rate() {
        let capture = SignalCapture::new(Arc::new(ManualClock::new(0.0)), 0, 110.0, 0.5);
        assert!(matches!(
            capture.begin(TrackIndex::MASTER),
            Err(LooperError::CaptureUnavailable(_))
        ));
    }
}
