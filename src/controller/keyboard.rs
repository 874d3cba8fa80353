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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::track::TRACK_COUNT;

/// Single keys for the primary action of tracks 1 to 4.
const PRIMARY_KEYS: [&str; TRACK_COUNT] = ["w", "e", "r", "t"];
/// Single keys for a short stop of tracks 1 to 4.
const STOP_KEYS: [&str; TRACK_COUNT] = ["s", "d", "f", "g"];

const REC: &str = "rec";
const STOP: &str = "stop";
const HOLD: &str = "hold";
const RELEASE: &str = "release";
const CLEAR: &str = "clear";
const DIVIDER: &str = "divider";
const GAIN: &str = "gain";
const STATUS: &str = "status";

/// A controller that drives the looper from the keyboard.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<(), io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}/{}, {} N, {} N, {} N, {} N, {} N, {} N D, {} N G, {}): ",
            PRIMARY_KEYS.join(""),
            STOP_KEYS.join(""),
            REC,
            STOP,
            HOLD,
            RELEASE,
            CLEAR,
            DIVIDER,
            GAIN,
            STATUS,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "keyboard input closed",
            ));
        }

        match parse(&input) {
            Some(event) => events_tx.blocking_send(event).map_err(io::Error::other)?,
            None => warn!(input = input.trim(), "Unrecognized input"),
        }
        Ok(())
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

/// Turns a line of keyboard input into an event.
fn parse(input: &str) -> Option<Event> {
    let input = input.trim().to_lowercase();
    if let Some(track) = PRIMARY_KEYS.iter().position(|key| *key == input) {
        return Some(Event::PrimaryAction(track + 1));
    }
    if let Some(track) = STOP_KEYS.iter().position(|key| *key == input) {
        return Some(Event::ShortStop(track + 1));
    }

    let mut words = input.split_whitespace();
    let command = words.next()?;
    if command == STATUS {
        return words.next().is_none().then_some(Event::Status);
    }

    let track: usize = words.next()?.parse().ok()?;
    let event = match command {
        REC => Event::PrimaryAction(track),
        STOP => Event::ShortStop(track),
        HOLD => Event::HoldClearStart(track),
        RELEASE => Event::HoldClearRelease(track),
        CLEAR => Event::Clear(track),
        DIVIDER => Event::SetDivider(track, words.next()?.parse().ok()?),
        GAIN => Event::SetGain(track, words.next()?.parse().ok()?),
        _ => return None,
    };

    words.next().is_none().then_some(event)
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            loop {
                Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())?;
            }
        })
    }
}
