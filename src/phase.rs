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

//! Loop phase math.
//!
//! Every function here is pure: given the origin of a repeating cycle, its duration and the
//! current time, it answers where in the cycle we are or how long until the cycle restarts.

use tracing::warn;

/// The phase reference of a playing cycle: the time offset 0 of the loop last began, and how
/// long one pass of the loop lasts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CyclePhase {
    pub origin: f64,
    pub duration: f64,
}

impl CyclePhase {
    pub fn new(origin: f64, duration: f64) -> CyclePhase {
        CyclePhase { origin, duration }
    }
}

fn valid_duration(duration: f64) -> bool {
    duration.is_finite() && duration > 0.0
}

/// Returns `(now - origin) mod duration`, always in `[0, duration)`. A degenerate duration has no
/// phase, so the position is 0.
pub fn position_in_cycle(origin: f64, duration: f64, now: f64) -> f64 {
    if !valid_duration(duration) {
        return 0.0;
    }

    let position = (now - origin).rem_euclid(duration);
    if position.is_finite() {
        position
    } else {
        0.0
    }
}

/// Returns the delay until the next boundary of the cycle. Sitting exactly on a boundary waits
/// for the following one, so a scheduled start never lands inside the pass that just began.
pub fn wait_for_boundary(origin: f64, duration: f64, now: f64) -> f64 {
    if !valid_duration(duration) {
        return 0.0;
    }

    duration - position_in_cycle(origin, duration, now)
}

/// Computes where playback of a loop of `loop_duration` seconds should begin so that it lines up
/// with the master cycle. Without an audible master there is nothing to align to and playback
/// starts from the top.
pub fn playback_offset(master: Option<CyclePhase>, loop_duration: f64, now: f64) -> f64 {
    let offset = match master {
        Some(master) if valid_duration(master.duration) => (now - master.origin) % master.duration,
        _ => return 0.0,
    };

    sanitize_offset(offset, loop_duration)
}

/// Clamps an offset into `[0, loop_duration)`. Non-finite or out of range offsets fall back to 0.
pub fn sanitize_offset(offset: f64, loop_duration: f64) -> f64 {
    if offset.is_finite() && offset >= 0.0 && offset < loop_duration {
        return offset;
    }

    warn!(
        offset = offset,
        loop_duration = loop_duration,
        "Phase offset out of range, starting from the top of the loop."
    );
    0.0
}
