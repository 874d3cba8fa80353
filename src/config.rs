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
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::audio::{self, bounce::Bounce, cpal::Output, mixer::LoopMixer, Services};
use crate::clock::{Clock, SystemClock};
use crate::looper::LooperEngine;

mod capture;
mod controller;
mod error;
mod looper;

pub use capture::{Capture, SignalCapture};
pub use controller::Controller;
pub use error::ConfigError;
pub use looper::Looper;

/// Loads the looper configuration. Without a path every value takes its default.
pub fn load(path: Option<&Path>) -> Result<Looper, ConfigError> {
    match path {
        Some(path) => Looper::deserialize(path),
        None => Ok(Looper::default()),
    }
}

/// Initializes the looper and controller from the given configuration and returns the
/// controller along with the device output the looper plays through. The controller owns the
/// looper, which can be waited on until it exits. Realistically, the controller is not
/// expected to exit.
pub fn init_looper_and_controller(
    config: &Looper,
    bounce: Option<PathBuf>,
) -> Result<(crate::controller::Controller, Output), Box<dyn Error>> {
    let settings = config.settings()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let (capture, decoder) =
        audio::get_capture(&config.capture(), config.sample_rate(), clock.clone());
    info!(capture = %capture, "Capture ready.");

    let mixer = LoopMixer::new(config.output_channels(), config.sample_rate());
    let bounce = match bounce {
        Some(path) => Some(Bounce::create(
            &path,
            mixer.num_channels(),
            mixer.sample_rate(),
        )?),
        None => None,
    };
    let output = Output::start(mixer.clone(), config.output_device(), bounce)?;

    let engine = LooperEngine::new(
        clock,
        Services::new(capture, decoder, Arc::new(mixer)),
        settings,
    );
    let controller = crate::controller::Controller::new(engine, config.controller().driver());
    Ok((controller, output))
}
