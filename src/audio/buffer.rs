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
use crate::error::LooperError;

/// Decoded loop audio in planar format (one Vec per channel). Buffers are never mutated once
/// built: an overdub produces a new buffer that replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopBuffer {
    /// Planar sample storage. Every channel holds the same number of frames.
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl LoopBuffer {
    /// Creates a loop buffer from planar samples. Channels shorter than the longest one are
    /// padded with silence so the buffer stays rectangular.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> LoopBuffer {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.resize(frames, 0.0);
        }

        LoopBuffer {
            channels,
            sample_rate,
        }
    }

    /// Creates a loop buffer from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channel_count: u16, sample_rate: u32) -> LoopBuffer {
        let num_channels = channel_count.max(1) as usize;
        let num_frames = samples.len() / num_channels;

        let mut channels = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        LoopBuffer::new(channels, sample_rate)
    }

    /// A buffer with no frames.
    pub fn empty(channel_count: u16, sample_rate: u32) -> LoopBuffer {
        LoopBuffer::new(vec![Vec::new(); channel_count as usize], sample_rate)
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The samples of a single channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// The samples heard on the given output channel. A mono loop is heard on every output,
    /// otherwise channels map one to one and missing channels are silent.
    pub fn output_channel(&self, index: usize) -> &[f32] {
        let source = if self.channels.len() == 1 { 0 } else { index };
        self.channel(source).unwrap_or(&[])
    }

    /// Length of the loop in seconds, always `frames / sample_rate`.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Layers `take` over this loop by sample-wise addition and returns the combined buffer.
    ///
    /// The result is as long as the longer of the two inputs; wherever one input has run out it
    /// contributes silence. The result has as many channels as the wider input, and a mono input
    /// is layered onto every one of them. Nothing is clipped or normalized, so repeated overdubs can grow the
    /// peak level and the per track gain is expected to tame it. An empty take returns this loop
    /// unchanged.
    pub fn overdub(&self, take: &LoopBuffer) -> Result<LoopBuffer, LooperError> {
        if take.is_empty() {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(take.clone());
        }
        if self.sample_rate != take.sample_rate {
            return Err(LooperError::SampleRateMismatch(
                self.sample_rate,
                take.sample_rate,
            ));
        }

        let frames = self.frames().max(take.frames());
        let channel_count = self.channels.len().max(take.channels.len());

        let channels = (0..channel_count)
            .map(|index| {
                let base = self.output_channel(index);
                let layer = take.output_channel(index);
                (0..frames)
                    .map(|i| {
                        base.get(i).copied().unwrap_or(0.0) + layer.get(i).copied().unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect();

        Ok(LoopBuffer {
            channels,
            sample_rate: self.sample_rate,
        })
    }
}
