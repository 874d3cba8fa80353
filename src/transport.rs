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
use std::fmt;

use tracing::info;

/// Every master loop is treated as one bar of four beats.
const BEATS_PER_LOOP: f64 = 4.0;

/// Derives the tempo of a master loop of the given length.
pub fn derive_bpm(loop_duration: f64) -> u32 {
    (60.0 * BEATS_PER_LOOP / loop_duration).round() as u32
}

/// The shared timing reference derived from the master track. Only the master track writes to
/// it; every other track reads it.
#[derive(Debug, Default)]
pub struct TransportClock {
    master_loop_duration: Option<f64>,
    master_bpm: Option<u32>,
}

impl TransportClock {
    pub fn new() -> TransportClock {
        TransportClock::default()
    }

    /// Records the length of a freshly captured master loop and derives the tempo from it.
    pub(crate) fn establish(&mut self, loop_duration: f64) {
        let bpm = derive_bpm(loop_duration);
        self.master_loop_duration = Some(loop_duration);
        self.master_bpm = Some(bpm);
        info!(loop_duration = loop_duration, bpm = bpm, "Transport established.");
    }

    /// Forgets the master loop.
    pub(crate) fn reset(&mut self) {
        self.master_loop_duration = None;
        self.master_bpm = None;
        info!("Transport reset.");
    }

    pub fn master_loop_duration(&self) -> Option<f64> {
        self.master_loop_duration
    }

    pub fn master_bpm(&self) -> Option<u32> {
        self.master_bpm
    }

    pub fn is_established(&self) -> bool {
        self.master_loop_duration.is_some()
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            master_loop_duration: self.master_loop_duration,
            master_bpm: self.master_bpm,
            is_established: self.is_established(),
        }
    }
}

/// A point in time copy of the transport for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSnapshot {
    pub master_loop_duration: Option<f64>,
    pub master_bpm: Option<u32>,
    pub is_established: bool,
}

impl fmt::Display for TransportSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.master_bpm {
            Some(bpm) => write!(f, "BPM: {}", bpm),
            None => write!(f, "BPM: --"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_derive_bpm() {
        assert_eq!(120, derive_bpm(2.0));
        assert_eq!(180, derive_bpm(4.0 / 3.0));
        assert_eq!(180, derive_bpm(1.333));
        assert_eq!(60, derive_bpm(4.0));
        assert_eq!(4, derive_bpm(60.0));
    }

    #[test]
    fn test_establish_and_reset() {
        let mut transport = TransportClock::new();
        assert!(!transport.is_established());
        assert_eq!("BPM: --", transport.snapshot().to_string());

        transport.establish(2.0);
        assert!(transport.is_established());
        assert_eq!(Some(2.0), transport.master_loop_duration());
        assert_eq!(Some(120), transport.master_bpm());
        assert_eq!("BPM: 120", transport.snapshot().to_string());

        transport.reset();
        assert_eq!(
            TransportSnapshot {
                master_loop_duration: None,
                master_bpm: None,
                is_established: false,
            },
            transport.snapshot()
        );
    }
}
