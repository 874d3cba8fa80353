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
use std::fs;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use looptrack::audio::{cpal::list_output_devices, decoder::SymphoniaDecoder, Decoder};
use looptrack::config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A four track, phase-locked live looper."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start will start the looper and read commands from the keyboard.
    Start {
        /// The path to the looper config. Defaults are used when omitted.
        config: Option<PathBuf>,
        /// Writes everything the looper plays to this WAV file.
        #[arg[short, long]]
        bounce: Option<PathBuf>,
    },
    /// Verifies a looper config and prints the resulting settings.
    Verify {
        /// The path to the looper config.
        config: PathBuf,
    },
    /// Lists the output devices the looper can play through.
    Devices {},
    /// Decodes an audio file the way recordings are decoded and prints what was found.
    Decode {
        /// The path to the audio file.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config, bounce } => {
            let looper = config::load(config.as_deref())?;
            let (mut controller, output) = config::init_looper_and_controller(&looper, bounce)?;

            info!("Looper started.");
            controller.join().await?;
            output.stop()?;
        }
        Commands::Verify { config } => {
            let looper = config::load(Some(&config))?;
            let settings = looper.settings()?;

            println!("Config {} is valid:", config.display());
            println!("- sample rate: {}Hz", looper.sample_rate());
            println!("- output channels: {}", looper.output_channels());
            println!(
                "- output device: {}",
                looper.output_device().as_deref().unwrap_or("default")
            );
            println!(
                "- max master recording: {:?}",
                settings.max_master_recording
            );
            println!("- hold to clear: {:?}", settings.hold_to_clear);
            println!("- default gain: {}", settings.default_gain);
            for (track, divider) in settings.dividers.iter().enumerate() {
                println!("- track {} divider: {}", track + 2, divider);
            }
        }
        Commands::Devices {} => {
            let devices = list_output_devices()?;
            if devices.is_empty() {
                println!("No output devices found.");
                return Ok(());
            }

            println!("Output devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Decode { file } => {
            let bytes = fs::read(&file)?;
            let buffer = SymphoniaDecoder::new().decode(&bytes)?;

            println!("{}:", file.display());
            println!("- frames: {}", buffer.frames());
            println!("- channels: {}", buffer.channel_count());
            println!("- sample rate: {}Hz", buffer.sample_rate());
            println!("- duration: {:.3}s", buffer.duration_seconds());
        }
    }

    Ok(())
}
