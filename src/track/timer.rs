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

/// The scheduled transitions a track can be waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Start recording on the next master boundary.
    WaitingStart,
    /// Force stop a recording that hit its length.
    RecordDeadline,
    /// Start an armed overdub on the next boundary of the track's own loop.
    OverdubStart,
    /// Finish an overdub after one loop length.
    OverdubEnd,
    /// The stop control has been held long enough to clear.
    HoldClear,
}

/// A pending transition and when it is due, in clock seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timer {
    pub kind: TimerKind,
    pub deadline: f64,
}

/// Holds at most one pending timer and is the only place the timer lives. Scheduling replaces
/// the previous timer and cancelling drops it, so a superseded timer can never fire into a newer
/// state.
#[derive(Debug, Default)]
pub struct TimerSlot {
    current: Option<Timer>,
}

impl TimerSlot {
    pub fn new() -> TimerSlot {
        TimerSlot::default()
    }

    pub fn schedule(&mut self, kind: TimerKind, deadline: f64) {
        self.current = Some(Timer { kind, deadline });
    }

    /// Cancels whatever is pending. Returns the cancelled timer, if any.
    pub fn cancel(&mut self) -> Option<Timer> {
        self.current.take()
    }

    /// Removes and returns the pending timer if its deadline has passed.
    pub fn take_due(&mut self, now: f64) -> Option<Timer> {
        match self.current {
            Some(timer) if timer.deadline <= now => self.current.take(),
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<f64> {
        self.current.map(|timer| timer.deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.current.is_some()
    }
}
