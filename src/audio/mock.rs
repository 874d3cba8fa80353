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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

use super::buffer::LoopBuffer;
use crate::{clock::Clock, error::LooperError, track::TrackIndex};

/// Marks bytes produced by the mock capture.
const MAGIC: &[u8; 4] = b"MOCK";
/// Magic, sample rate and channel count.
const HEADER_LEN: usize = 10;

/// Session counters shared between the capture and the sessions it hands out.
#[derive(Default)]
struct Counters {
    started: AtomicUsize,
    stopped: AtomicUsize,
    aborted: AtomicUsize,
}

/// A mock capture device. Records a constant level for as long as a session runs, measured on
/// the looper's clock.
pub struct Capture {
    clock: Arc<dyn Clock>,
    sample_rate: u32,
    level: Mutex<f32>,
    unavailable: AtomicBool,
    counters: Arc<Counters>,
}

impl Capture {
    pub fn new(clock: Arc<dyn Clock>, sample_rate: u32) -> Capture {
        Capture {
            clock,
            sample_rate,
            level: Mutex::new(0.25),
            unavailable: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Sets the level recorded by sessions that begin after this call.
    pub fn set_level(&self, level: f32) {
        *self.level.lock() = level;
    }

    /// Makes every following `begin` fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    pub fn started(&self) -> usize {
        self.counters.started.load(Ordering::Relaxed)
    }

    pub fn stopped(&self) -> usize {
        self.counters.stopped.load(Ordering::Relaxed)
    }

    pub fn aborted(&self) -> usize {
        self.counters.aborted.load(Ordering::Relaxed)
    }
}

impl super::AudioCapture for Capture {
    fn begin(&self, track: TrackIndex) -> Result<Box<dyn super::CaptureSession>, LooperError> {
        let span = span!(Level::INFO, "capture (mock)");
        let _enter = span.enter();

        if self.unavailable.load(Ordering::Relaxed) {
            return Err(LooperError::CaptureUnavailable(
                "mock capture is unavailable".to_string(),
            ));
        }

        self.counters.started.fetch_add(1, Ordering::Relaxed);
        info!(track = track.get(), "Mock capture started.");
        Ok(Box::new(Session {
            counters: self.counters.clone(),
            clock: self.clock.clone(),
            started_at: self.clock.now(),
            sample_rate: self.sample_rate,
            level: *self.level.lock(),
        }))
    }
}

impl fmt::Display for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz (Mock)", self.sample_rate)
    }
}

struct Session {
    counters: Arc<Counters>,
    clock: Arc<dyn Clock>,
    started_at: f64,
    sample_rate: u32,
    level: f32,
}

impl super::CaptureSession for Session {
    fn stop(self: Box<Self>) -> Result<Vec<u8>, LooperError> {
        self.counters.stopped.fetch_add(1, Ordering::Relaxed);
        let elapsed = (self.clock.now() - self.started_at).max(0.0);
        let frames = (elapsed * self.sample_rate as f64).round() as usize;
        Ok(encode(&vec![self.level; frames], 1, self.sample_rate))
    }

    fn abort(self: Box<Self>) {
        self.counters.aborted.fetch_add(1, Ordering::Relaxed);
    }
}

/// Encodes interleaved samples in the mock capture format.
pub fn encode(samples: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + samples.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Decodes the mock capture format.
#[derive(Default)]
pub struct Decoder {
    fail_next: AtomicBool,
}

impl Decoder {
    pub fn new() -> Decoder {
        Decoder::default()
    }

    /// Makes the next decode fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::Relaxed);
    }
}

impl super::Decoder for Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<LoopBuffer, LooperError> {
        if self.fail_next.swap(false, Ordering::Relaxed) {
            return Err(LooperError::DecodeFailure("mock decode failure".to_string()));
        }

        if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
            return Err(LooperError::DecodeFailure(
                "not a mock capture".to_string(),
            ));
        }

        let sample_rate = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let channels = u16::from_le_bytes([bytes[8], bytes[9]]);
        let samples: Vec<f32> = bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        if sample_rate == 0 || channels == 0 {
            return Err(LooperError::DecodeFailure(
                "mock capture header is invalid".to_string(),
            ));
        }
        Ok(LoopBuffer::from_interleaved(&samples, channels, sample_rate))
    }
}

/// A loop handed to the mock sink.
#[derive(Debug, Clone)]
pub struct Play {
    pub buffer: Arc<LoopBuffer>,
    pub offset: f64,
    pub gain: f32,
}

struct Voice {
    play: Play,
    gain: Arc<Mutex<f32>>,
    stopped: Arc<AtomicBool>,
}

/// A mock playback sink. Doesn't actually play anything, but remembers what it was asked to.
#[derive(Default)]
pub struct Sink {
    voices: Mutex<Vec<Voice>>,
    /// How many more plays succeed. None never fails.
    remaining: Mutex<Option<usize>>,
}

impl Sink {
    pub fn new() -> Sink {
        Sink::default()
    }

    /// Makes every following `play` fail.
    pub fn set_failing(&self, failing: bool) {
        *self.remaining.lock() = if failing { Some(0) } else { None };
    }

    /// Lets the next `plays` calls succeed and fails every one after them.
    pub fn fail_after(&self, plays: usize) {
        *self.remaining.lock() = Some(plays);
    }

    /// Every loop started, oldest first.
    pub fn plays(&self) -> Vec<Play> {
        self.voices.lock().iter().map(|voice| voice.play.clone()).collect()
    }

    /// Number of loops that have not been stopped.
    pub fn active(&self) -> usize {
        self.voices
            .lock()
            .iter()
            .filter(|voice| !voice.stopped.load(Ordering::Relaxed))
            .count()
    }

    /// The current gain of the most recently started loop.
    pub fn last_gain(&self) -> Option<f32> {
        self.voices.lock().last().map(|voice| *voice.gain.lock())
    }
}

impl super::PlaybackSink for Sink {
    fn play(
        &self,
        buffer: Arc<LoopBuffer>,
        start_offset: f64,
        gain: f32,
    ) -> Result<Box<dyn super::PlaybackHandle>, LooperError> {
        if let Some(remaining) = self.remaining.lock().as_mut() {
            if *remaining == 0 {
                return Err(LooperError::Playback("mock sink is failing".to_string()));
            }
            *remaining -= 1;
        }

        debug!(offset = start_offset, gain = gain, "Mock playback started.");
        let handle = Handle {
            gain: Arc::new(Mutex::new(gain)),
            stopped: Arc::new(AtomicBool::new(false)),
            duration: buffer.duration_seconds(),
            offset: start_offset,
        };
        self.voices.lock().push(Voice {
            play: Play {
                buffer,
                offset: start_offset,
                gain,
            },
            gain: handle.gain.clone(),
            stopped: handle.stopped.clone(),
        });
        Ok(Box::new(handle))
    }
}

struct Handle {
    gain: Arc<Mutex<f32>>,
    stopped: Arc<AtomicBool>,
    duration: f64,
    offset: f64,
}

impl super::PlaybackHandle for Handle {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    fn set_gain(&self, gain: f32) {
        *self.gain.lock() = gain;
    }

    /// The mock never advances, so the position is wherever playback started.
    fn current_position_seconds(&self) -> f64 {
        if self.duration > 0.0 {
            self.offset % self.duration
        } else {
            0.0
        }
    }
}
