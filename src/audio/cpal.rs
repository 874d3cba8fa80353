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
use std::{thread, time::Duration};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use tracing::{error, info, span, Level};

use super::{bounce::Bounce, mixer::LoopMixer};
use crate::{error::LooperError, playsync::CancelHandle};

/// How often the output thread checks whether it should close the stream.
const KEEPALIVE: Duration = Duration::from_millis(100);

/// Plays the loop mixer through a cpal output device. The stream lives on its own thread, which
/// owns it until the output is stopped.
pub struct Output {
    cancel_handle: CancelHandle,
    join: thread::JoinHandle<()>,
    bounce: Option<Bounce>,
}

impl Output {
    /// Opens the named output device, or the host default, and starts pulling audio from the
    /// mixer. Everything played is also handed to the bounce, if one is given.
    pub fn start(
        mixer: LoopMixer,
        device_name: Option<String>,
        bounce: Option<Bounce>,
    ) -> Result<Output, LooperError> {
        let cancel_handle = CancelHandle::new();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let tap = bounce.as_ref().map(Bounce::tap);

        let join = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let span = span!(Level::INFO, "output");
                let _enter = span.enter();

                let stream = match open_stream(&mixer, device_name.as_deref(), tap) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                info!("Output stream started.");

                while !cancel_handle.wait_timeout(KEEPALIVE) {}
                drop(stream);
                info!("Output stream closed.");
            })
        };

        let started = ready_rx
            .recv()
            .map_err(|e| LooperError::Playback(e.to_string()))
            .and_then(|result| result);
        if let Err(e) = started {
            let _ = join.join();
            if let Some(bounce) = bounce {
                if let Err(bounce_err) = bounce.finish() {
                    error!(err = bounce_err.to_string(), "Unable to finish bounce.");
                }
            }
            return Err(e);
        }

        Ok(Output {
            cancel_handle,
            join,
            bounce,
        })
    }

    /// Closes the stream and finishes any bounce file.
    pub fn stop(self) -> Result<(), LooperError> {
        self.cancel_handle.cancel();
        if self.join.join().is_err() {
            return Err(LooperError::Playback("output thread panicked".to_string()));
        }

        match self.bounce {
            Some(bounce) => bounce.finish(),
            None => Ok(()),
        }
    }
}

/// Names of the output devices on the default host.
pub fn list_output_devices() -> Result<Vec<String>, LooperError> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for device in host.output_devices().map_err(playback_error)? {
        match device.name() {
            Ok(name) => names.push(name),
            Err(e) => error!(err = e.to_string(), "Unable to read device name."),
        }
    }
    Ok(names)
}

fn playback_error<E: std::fmt::Display>(err: E) -> LooperError {
    LooperError::Playback(err.to_string())
}

fn find_device(host: &cpal::Host, device_name: Option<&str>) -> Result<cpal::Device, LooperError> {
    let device = match device_name {
        Some(name) => host
            .output_devices()
            .map_err(playback_error)?
            .find(|device| device.name().map(|found| found == name).unwrap_or(false)),
        None => host.default_output_device(),
    };

    device.ok_or_else(|| {
        LooperError::Playback(format!(
            "no output device named {}",
            device_name.unwrap_or("default")
        ))
    })
}

fn open_stream(
    mixer: &LoopMixer,
    device_name: Option<&str>,
    tap: Option<Sender<Vec<f32>>>,
) -> Result<cpal::Stream, LooperError> {
    let host = cpal::default_host();
    let device = find_device(&host, device_name)?;
    let sample_format = device
        .default_output_config()
        .map_err(playback_error)?
        .sample_format();

    let config = cpal::StreamConfig {
        channels: mixer.num_channels(),
        sample_rate: mixer.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    info!(
        device = device.name().unwrap_or_default(),
        channels = mixer.num_channels(),
        sample_rate = mixer.sample_rate(),
        format = ?sample_format,
        "Opening output device."
    );

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer.clone(), tap),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer.clone(), tap),
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer.clone(), tap),
        other => Err(LooperError::Playback(format!(
            "unsupported output sample format {:?}",
            other
        ))),
    }?;

    stream.play().map_err(playback_error)?;
    Ok(stream)
}

/// Builds an output stream whose callback renders straight from the mixer, converting to the
/// device's sample type.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: LoopMixer,
    tap: Option<Sender<Vec<f32>>>,
) -> Result<cpal::Stream, LooperError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                mixer.process_into(&mut scratch);
                for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(*sample);
                }
                if let Some(tap) = tap.as_ref() {
                    let _ = tap.send(scratch.clone());
                }
            },
            |err| error!("Output stream error: {}", err),
            None,
        )
        .map_err(playback_error)
}
