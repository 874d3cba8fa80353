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
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::buffer::LoopBuffer;
use crate::error::LooperError;
use crate::playsync::CancelHandle;

/// Mixes every sounding loop into one output stream. The output callback only ever reads the
/// immutable loop buffers and the atomic gain and position values; the control side adds and
/// cancels voices.
#[derive(Clone)]
pub struct LoopMixer {
    /// Loops currently sounding.
    voices: Arc<RwLock<Vec<Voice>>>,
    /// Number of output channels.
    num_channels: u16,
    /// Output sample rate.
    sample_rate: u32,
}

/// A loop sounding in the mixer.
struct Voice {
    buffer: Arc<LoopBuffer>,
    /// Next frame to read from the buffer.
    position: usize,
    /// Gain stored as f32 bits so it can change while the voice plays.
    gain: Arc<AtomicU32>,
    /// The position published back to the control side.
    shared_position: Arc<AtomicUsize>,
    cancel_handle: CancelHandle,
}

impl LoopMixer {
    /// Creates a new loop mixer.
    pub fn new(num_channels: u16, sample_rate: u32) -> LoopMixer {
        LoopMixer {
            voices: Arc::new(RwLock::new(Vec::new())),
            num_channels: num_channels.max(1),
            sample_rate,
        }
    }

    /// Gets the number of output channels.
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of loops currently sounding.
    pub fn active_voices(&self) -> usize {
        self.voices
            .read()
            .iter()
            .filter(|voice| !voice.cancel_handle.is_cancelled())
            .count()
    }

    /// Renders interleaved frames into `output`, overwriting it. Mono loops are sent to every
    /// output channel; multichannel loops map channel for channel and extra source channels are
    /// dropped.
    pub fn process_into(&self, output: &mut [f32]) {
        let num_channels = self.num_channels as usize;
        output.fill(0.0);

        let mut voices = self.voices.write();
        voices.retain(|voice| !voice.cancel_handle.is_cancelled() && !voice.buffer.is_empty());

        for voice in voices.iter_mut() {
            let gain = f32::from_bits(voice.gain.load(Ordering::Relaxed));
            let frames = voice.buffer.frames();

            for frame in output.chunks_exact_mut(num_channels) {
                for (channel, out) in frame.iter_mut().enumerate() {
                    if let Some(sample) = voice.buffer.output_channel(channel).get(voice.position) {
                        *out += sample * gain;
                    }
                }
                voice.position = (voice.position + 1) % frames;
            }
            voice.shared_position.store(voice.position, Ordering::Relaxed);
        }
    }
}

impl super::PlaybackSink for LoopMixer {
    fn play(
        &self,
        buffer: Arc<LoopBuffer>,
        start_offset: f64,
        gain: f32,
    ) -> Result<Box<dyn super::PlaybackHandle>, LooperError> {
        if buffer.is_empty() {
            return Err(LooperError::Playback("cannot play an empty loop".to_string()));
        }

        let frames = buffer.frames();
        let position =
            (start_offset.max(0.0) * buffer.sample_rate() as f64).round() as usize % frames;
        let gain = Arc::new(AtomicU32::new(gain.to_bits()));
        let shared_position = Arc::new(AtomicUsize::new(position));
        let cancel_handle = CancelHandle::new();

        let handle = MixerHandle {
            gain: gain.clone(),
            position: shared_position.clone(),
            sample_rate: buffer.sample_rate(),
            cancel_handle: cancel_handle.clone(),
        };

        self.voices.write().push(Voice {
            buffer,
            position,
            gain,
            shared_position,
            cancel_handle,
        });

        Ok(Box::new(handle))
    }
}

/// Control side handle for a voice in the [LoopMixer].
pub struct MixerHandle {
    gain: Arc<AtomicU32>,
    position: Arc<AtomicUsize>,
    sample_rate: u32,
    cancel_handle: CancelHandle,
}

impl super::PlaybackHandle for MixerHandle {
    fn stop(&mut self) {
        self.cancel_handle.cancel();
    }

    fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    fn current_position_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.position.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }
}

impl Drop for MixerHandle {
    fn drop(&mut self) {
        self.cancel_handle.cancel();
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::audio::{buffer::LoopBuffer, PlaybackSink};

    use super::LoopMixer;

    fn ramp(frames: usize) -> Arc<LoopBuffer> {
        Arc::new(LoopBuffer::new(
            vec![(0..frames).map(|i| i as f32).collect()],
            4,
        ))
    }

    fn render(mixer: &LoopMixer, frames: usize) -> Vec<f32> {
        let mut output = vec![1.0; frames * mixer.num_channels() as usize];
        mixer.process_into(&mut output);
        output
    }

    #[test]
    fn test_mono_loop_repeats_on_every_channel() {
        let mixer = LoopMixer::new(2, 4);
        let _handle = mixer.play(ramp(3), 0.0, 1.0).expect("play failed");

        assert_eq!(
            vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 0.0, 0.0, 1.0, 1.0],
            render(&mixer, 5)
        );
    }

    #[test]
    fn test_stereo_loop_maps_channel_for_channel() {
        let mixer = LoopMixer::new(2, 4);
        let stereo = Arc::new(LoopBuffer::new(vec![vec![1.0, 2.0], vec![-1.0, -2.0]], 4));
        let _handle = mixer.play(stereo, 0.0, 0.5).expect("play failed");

        assert_eq!(vec![0.5, -0.5, 1.0, -1.0, 0.5, -0.5], render(&mixer, 3));
    }

    #[test]
    fn test_offset_and_gain() {
        let mixer = LoopMixer::new(1, 4);
        let handle = mixer.play(ramp(4), 0.5, 0.5).expect("play failed");

        // Half a second at 4Hz is two frames in.
        assert_eq!(0.5, handle.current_position_seconds());
        assert_eq!(vec![1.0, 1.5, 0.0], render(&mixer, 3));
        assert_eq!(0.25, handle.current_position_seconds());

        handle.set_gain(1.0);
        assert_eq!(vec![1.0, 2.0], render(&mixer, 2));
    }

    #[test]
    fn test_voices_are_summed_and_stopped() {
        let mixer = LoopMixer::new(1, 4);
        let mut first = mixer.play(ramp(2), 0.0, 1.0).expect("play failed");
        let _second = mixer.play(ramp(2), 0.0, 1.0).expect("play failed");
        assert_eq!(2, mixer.active_voices());
        assert_eq!(vec![0.0, 2.0], render(&mixer, 2));

        first.stop();
        assert_eq!(1, mixer.active_voices());
        assert_eq!(vec![0.0, 1.0], render(&mixer, 2));
    }

    #[test]
    fn test_dropping_handle_silences_voice() {
        let mixer = LoopMixer::new(1, 4);
        {
            let _handle = mixer.play(ramp(2), 0.0, 1.0).expect("play failed");
        }
        assert_eq!(vec![0.0, 0.0], render(&mixer, 2));
        assert_eq!(0, mixer.active_voices());
    }

    #[test]
    fn test_empty_loop_is_rejected() {
        let mixer = LoopMixer::new(1, 4);
        assert!(mixer.play(Arc::new(LoopBuffer::empty(1, 4)), 0.0, 1.0).is_err());
    }
}
