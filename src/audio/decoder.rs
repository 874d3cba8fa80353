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
use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::buffer::LoopBuffer;
use crate::error::LooperError;

/// Decodes captured audio in any container and codec symphonia can read (WAV, FLAC, Ogg, ...).
pub struct SymphoniaDecoder {}

impl SymphoniaDecoder {
    pub fn new() -> SymphoniaDecoder {
        SymphoniaDecoder {}
    }

    /// Reads the next packet, treating the end of the stream as `None`.
    fn read_next_packet(
        format_reader: &mut dyn FormatReader,
    ) -> Result<Option<Packet>, LooperError> {
        match format_reader.next_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Ok(None)
            }
            // Some readers report the end of the stream as a decode error.
            Err(SymphoniaError::DecodeError(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        SymphoniaDecoder::new()
    }
}

impl super::Decoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<LoopBuffer, LooperError> {
        let source = Cursor::new(bytes.to_vec());
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let opened = get_probe().format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format_reader = opened.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| LooperError::DecodeFailure("no audio track found".to_string()))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let mut channels: Vec<Vec<f32>> = Vec::new();
        while let Some(packet) = Self::read_next_packet(format_reader.as_mut())? {
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            sample_rate = spec.rate;

            let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            samples.copy_planar_ref(decoded);

            let channel_count = spec.channels.count();
            if channels.len() < channel_count {
                channels.resize(channel_count, Vec::new());
            }
            for (channel, planar) in channels
                .iter_mut()
                .zip(samples.samples().chunks_exact(frames))
            {
                channel.extend_from_slice(planar);
            }
        }

        if sample_rate == 0 {
            return Err(LooperError::DecodeFailure(
                "sample rate not specified".to_string(),
            ));
        }

        let buffer = LoopBuffer::new(channels, sample_rate);
        debug!(
            frames = buffer.frames(),
            channels = buffer.channel_count(),
            sample_rate = sample_rate,
            "Decoded captured audio."
        );
        Ok(buffer)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        audio::{capture::encode_wav, Decoder},
        error::LooperError,
        testutil::audio_test_utils::generate_sine,
    };

    use super::SymphoniaDecoder;

    #[test]
    fn test_decode_stereo_wav() {
        let left = generate_sine(440.0, 0.5, 44100, 0.5);
        let right = generate_sine(220.0, 0.25, 44100, 0.5);
        let bytes = encode_wav(&[left.clone(), right.clone()], 44100).expect("encode failed");

        let buffer = SymphoniaDecoder::new().decode(&bytes).expect("decode failed");
        assert_eq!(2, buffer.channel_count());
        assert_eq!(44100, buffer.sample_rate());
        assert_eq!(left.len(), buffer.frames());
        assert_eq!(Some(&left[..]), buffer.channel(0));
        assert_eq!(Some(&right[..]), buffer.channel(1));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = SymphoniaDecoder::new().decode(b"definitely not audio");
        assert!(matches!(result, Err(LooperError::DecodeFailure(_))));

        let result = SymphoniaDecoder::new().decode(&[]);
        assert!(matches!(result, Err(LooperError::DecodeFailure(_))));
    }
}
