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
use std::{path::Path, thread};

use crossbeam_channel::Sender;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{info, span, Level};

use crate::error::LooperError;

/// Writes everything the output plays to a float WAV file. The output callback hands over
/// interleaved blocks through a tap and a writer thread does the file I/O.
pub struct Bounce {
    tx: Sender<Vec<f32>>,
    join: thread::JoinHandle<Result<(), LooperError>>,
}

impl Bounce {
    pub fn create(path: &Path, channels: u16, sample_rate: u32) -> Result<Bounce, LooperError> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec).map_err(playback_error)?;
        info!(path = %path.display(), "Bouncing performance to file.");

        let (tx, rx) = crossbeam_channel::unbounded::<Vec<f32>>();
        let join = thread::spawn(move || {
            let span = span!(Level::INFO, "bounce");
            let _enter = span.enter();

            for block in rx {
                for sample in block {
                    writer.write_sample(sample).map_err(playback_error)?;
                }
            }
            writer.finalize().map_err(playback_error)?;
            info!("Bounce finished.");
            Ok(())
        });

        Ok(Bounce { tx, join })
    }

    /// A sender for rendered blocks. The file is finished once every tap is gone and
    /// [Bounce::finish] is called.
    pub fn tap(&self) -> Sender<Vec<f32>> {
        self.tx.clone()
    }

    /// Waits for every tapped block to be written and finalizes the file.
    pub fn finish(self) -> Result<(), LooperError> {
        let Bounce { tx, join } = self;
        drop(tx);
        match join.join() {
            Ok(result) => result,
            Err(_) => Err(LooperError::Playback(
                "bounce writer panicked".to_string(),
            )),
        }
    }
}

fn playback_error(err: hound::Error) -> LooperError {
    LooperError::Playback(err.to_string())
}
