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
use std::{fmt, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    audio::{CaptureSession, LoopBuffer, PlaybackHandle, Services},
    error::LooperError,
    looper::Settings,
    phase::{self, CyclePhase},
    transport::TransportClock,
};

pub mod divider;
pub mod timer;

pub use divider::Divider;
use timer::{Timer, TimerKind, TimerSlot};

/// The number of tracks in the looper, master included.
pub const TRACK_COUNT: usize = 4;

/// Tracks are numbered from 1. Track 1 is the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackIndex(u8);

impl TrackIndex {
    pub const MASTER: TrackIndex = TrackIndex(1);

    pub fn new(index: usize) -> Result<TrackIndex, LooperError> {
        if (1..=TRACK_COUNT).contains(&index) {
            Ok(TrackIndex(index as u8))
        } else {
            Err(LooperError::InvalidTrack(index))
        }
    }

    pub fn get(&self) -> usize {
        self.0 as usize
    }

    pub fn is_master(&self) -> bool {
        *self == TrackIndex::MASTER
    }

    /// Position of the track in zero based storage.
    pub(crate) fn slot(&self) -> usize {
        self.get() - 1
    }

    /// Every track, master first.
    pub fn all() -> impl Iterator<Item = TrackIndex> {
        (1..=TRACK_COUNT as u8).map(TrackIndex)
    }

    /// Every track except the master.
    pub fn dependents() -> impl Iterator<Item = TrackIndex> {
        (2..=TRACK_COUNT as u8).map(TrackIndex)
    }
}

impl fmt::Display for TrackIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Ready,
    /// A dependent waiting for the next master boundary before it records.
    Waiting,
    Recording,
    Playing,
    /// Playing while an overdub is armed or being captured.
    Overdub,
    Stopped,
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackState::Ready => "Ready",
            TrackState::Waiting => "Waiting",
            TrackState::Recording => "Recording",
            TrackState::Playing => "Playing",
            TrackState::Overdub => "Overdub",
            TrackState::Stopped => "Stopped",
        };
        write!(f, "{}", name)
    }
}

/// Why a command was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The track waits for the master to establish a tempo.
    Disabled,
    /// The command means nothing in the track's current state.
    InvalidState(TrackState),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Disabled => write!(f, "track is disabled until the master is recorded"),
            Rejection::InvalidState(state) => write!(f, "not accepted while {}", state),
        }
    }
}

/// The result of a command that did not fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command was carried out and the track is now in the given state.
    Applied(TrackState),
    Rejected(Rejection),
}

impl CommandOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommandOutcome::Applied(_))
    }
}

/// What a renderer needs to draw a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSnapshot {
    pub index: TrackIndex,
    pub state: TrackState,
    /// Recording or playback progress in `[0, 1]`.
    pub progress_ratio: f64,
    /// Zero while the track holds no loop.
    pub loop_duration_seconds: f64,
    pub enabled: bool,
    pub gain: f32,
    pub divider: Divider,
}

impl fmt::Display for TrackSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Track {}: {} {:.0}% loop {:.3}s gain {:.2} divider {}{}",
            self.index,
            self.state,
            self.progress_ratio * 100.0,
            self.loop_duration_seconds,
            self.gain,
            self.divider,
            if self.enabled { "" } else { " (disabled)" }
        )
    }
}

/// Access to the transport handed to a track. Only the master may write to it.
pub(crate) enum TransportAccess<'a> {
    Master(&'a mut TransportClock),
    Dependent(&'a TransportClock),
}

impl TransportAccess<'_> {
    fn clock(&self) -> &TransportClock {
        match self {
            TransportAccess::Master(clock) => clock,
            TransportAccess::Dependent(clock) => clock,
        }
    }
}

/// The parts of the master track a dependent aligns to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MasterView {
    pub origin: f64,
    pub playing: bool,
}

/// Everything a track may look at or drive while handling a command or timer.
pub(crate) struct TrackContext<'a> {
    pub now: f64,
    pub transport: TransportAccess<'a>,
    pub master: MasterView,
    pub audio: &'a Services,
    pub settings: &'a Settings,
}

/// A capture that is running on behalf of the track.
struct ActiveCapture {
    session: Box<dyn CaptureSession>,
    started_at: f64,
    max_duration: f64,
}

impl ActiveCapture {
    fn progress(&self, now: f64) -> f64 {
        if self.max_duration <= 0.0 {
            return 0.0;
        }
        ((now - self.started_at) / self.max_duration).clamp(0.0, 1.0)
    }
}

/// Owns one track's state machine, loop and playback.
pub struct TrackController {
    index: TrackIndex,
    state: TrackState,
    loop_buffer: Option<Arc<LoopBuffer>>,
    /// When offset 0 of the current loop last began.
    loop_origin: f64,
    divider: Divider,
    gain: f32,
    enabled: bool,
    capture: Option<ActiveCapture>,
    playback: Option<Box<dyn PlaybackHandle>>,
    /// Boundary starts and recording deadlines.
    pending: TimerSlot,
    /// The hold to clear timer runs independently of whatever else is pending.
    hold: TimerSlot,
}

impl TrackController {
    pub(crate) fn new(index: TrackIndex, divider: Divider, gain: f32) -> TrackController {
        TrackController {
            index,
            state: TrackState::Ready,
            loop_buffer: None,
            loop_origin: 0.0,
            divider: if index.is_master() { Divider::ONE } else { divider },
            gain,
            enabled: index.is_master(),
            capture: None,
            playback: None,
            pending: TimerSlot::new(),
            hold: TimerSlot::new(),
        }
    }

    pub fn index(&self) -> TrackIndex {
        self.index
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn loop_origin(&self) -> f64 {
        self.loop_origin
    }

    pub fn divider(&self) -> Divider {
        self.divider
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn loop_buffer(&self) -> Option<&Arc<LoopBuffer>> {
        self.loop_buffer.as_ref()
    }

    pub fn loop_duration(&self) -> f64 {
        self.loop_buffer
            .as_ref()
            .map(|buffer| buffer.duration_seconds())
            .unwrap_or(0.0)
    }

    /// True while the track's loop is audible.
    pub fn is_sounding(&self) -> bool {
        self.playback.is_some()
    }

    /// Primary action: record, stop recording, arm an overdub or finish one.
    pub(crate) fn primary_action(
        &mut self,
        ctx: &mut TrackContext,
    ) -> Result<CommandOutcome, LooperError> {
        if !self.enabled {
            return Ok(CommandOutcome::Rejected(Rejection::Disabled));
        }

        match self.state {
            TrackState::Ready if self.index.is_master() => {
                let max_duration = ctx.settings.max_master_recording.as_secs_f64();
                self.begin_recording(ctx, max_duration)?;
            }
            TrackState::Ready => {
                let Some(master_duration) = ctx.transport.clock().master_loop_duration() else {
                    return Ok(CommandOutcome::Rejected(Rejection::Disabled));
                };
                let delay = phase::wait_for_boundary(ctx.master.origin, master_duration, ctx.now);
                self.pending.schedule(TimerKind::WaitingStart, ctx.now + delay);
                self.set_state(TrackState::Waiting);
                info!(
                    track = self.index.get(),
                    delay = delay,
                    "Waiting for the next master boundary."
                );
            }
            TrackState::Recording => self.finish_recording(ctx)?,
            TrackState::Playing => {
                let delay = phase::wait_for_boundary(self.loop_origin, self.loop_duration(), ctx.now);
                self.pending.schedule(TimerKind::OverdubStart, ctx.now + delay);
                self.set_state(TrackState::Overdub);
                info!(track = self.index.get(), delay = delay, "Overdub armed.");
            }
            TrackState::Overdub if self.capture.is_some() => self.finish_overdub(ctx)?,
            TrackState::Overdub => {
                self.pending.cancel();
                self.set_state(TrackState::Playing);
                info!(track = self.index.get(), "Armed overdub cancelled.");
            }
            TrackState::Waiting | TrackState::Stopped => {
                return Ok(CommandOutcome::Rejected(Rejection::InvalidState(self.state)))
            }
        }

        Ok(CommandOutcome::Applied(self.state))
    }

    /// Short press of the stop control: stop, resume or abandon whatever the track is doing.
    pub(crate) fn short_stop(
        &mut self,
        ctx: &mut TrackContext,
    ) -> Result<CommandOutcome, LooperError> {
        match self.state {
            TrackState::Ready => {
                return Ok(CommandOutcome::Rejected(Rejection::InvalidState(self.state)))
            }
            TrackState::Waiting => {
                self.pending.cancel();
                self.set_state(TrackState::Ready);
            }
            TrackState::Recording => {
                self.pending.cancel();
                self.abort_capture();
                self.loop_buffer = None;
                self.set_state(TrackState::Ready);
                info!(track = self.index.get(), "Recording aborted.");
            }
            TrackState::Playing | TrackState::Overdub => {
                self.pending.cancel();
                self.abort_capture();
                self.stop_playback();
                self.set_state(TrackState::Stopped);
            }
            TrackState::Stopped => {
                let reference = self.master_reference(ctx);
                self.start_playback(ctx, reference)?;
            }
        }

        Ok(CommandOutcome::Applied(self.state))
    }

    /// The stop control went down. Holding it long enough clears the track.
    pub(crate) fn hold_clear_start(&mut self, ctx: &mut TrackContext) -> CommandOutcome {
        if self.state == TrackState::Ready {
            return CommandOutcome::Rejected(Rejection::InvalidState(self.state));
        }

        if !self.hold.is_pending() {
            let deadline = ctx.now + ctx.settings.hold_to_clear.as_secs_f64();
            self.hold.schedule(TimerKind::HoldClear, deadline);
            debug!(track = self.index.get(), deadline = deadline, "Hold to clear started.");
        }
        CommandOutcome::Applied(self.state)
    }

    /// The stop control came back up. A release before the hold elapsed is a short stop; one
    /// after it clears the track if the timer has not already done so.
    pub(crate) fn hold_clear_release(
        &mut self,
        ctx: &mut TrackContext,
    ) -> Result<CommandOutcome, LooperError> {
        if self.hold.take_due(ctx.now).is_some() {
            return Ok(self.clear(ctx));
        }

        match self.hold.cancel() {
            Some(_) => self.short_stop(ctx),
            None => Ok(CommandOutcome::Rejected(Rejection::InvalidState(self.state))),
        }
    }

    /// Throws everything away and returns to `Ready`. Clearing the master also resets the
    /// transport.
    pub(crate) fn clear(&mut self, ctx: &mut TrackContext) -> CommandOutcome {
        self.pending.cancel();
        self.hold.cancel();
        self.abort_capture();
        self.stop_playback();
        self.loop_buffer = None;
        self.loop_origin = 0.0;
        self.set_state(TrackState::Ready);

        if let TransportAccess::Master(transport) = &mut ctx.transport {
            transport.reset();
        }
        info!(track = self.index.get(), "Track cleared.");
        CommandOutcome::Applied(self.state)
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            debug!(track = self.index.get(), enabled = enabled, "Track enabled changed.");
        }
    }

    /// Sets the multiple of the master loop used by the next recording.
    pub(crate) fn set_divider(&mut self, divider: Divider) -> Result<(), LooperError> {
        if self.index.is_master() {
            return Err(LooperError::InvalidDivider(
                "the master track has no divider".to_string(),
            ));
        }

        self.divider = divider;
        info!(track = self.index.get(), divider = %divider, "Divider set.");
        Ok(())
    }

    pub(crate) fn set_gain(&mut self, gain: f32) -> Result<(), LooperError> {
        if !gain.is_finite() || !(0.0..=1.2).contains(&gain) {
            return Err(LooperError::InvalidGain(gain));
        }

        self.gain = gain;
        if let Some(playback) = self.playback.as_ref() {
            playback.set_gain(gain);
        }
        debug!(track = self.index.get(), gain = gain, "Gain set.");
        Ok(())
    }

    /// Restarts a playing loop so it picks up the master's current phase.
    pub(crate) fn restart_playback(&mut self, ctx: &mut TrackContext) -> Result<(), LooperError> {
        if self.state != TrackState::Playing {
            return Ok(());
        }

        let reference = self.master_reference(ctx);
        self.start_playback(ctx, reference)
    }

    /// The earliest pending deadline, if any.
    pub(crate) fn next_deadline(&self) -> Option<f64> {
        match (self.pending.deadline(), self.hold.deadline()) {
            (Some(pending), Some(hold)) => Some(pending.min(hold)),
            (pending, hold) => pending.or(hold),
        }
    }

    /// Fires the earliest timer that is due. Returns false if nothing was due.
    pub(crate) fn fire_due(&mut self, ctx: &mut TrackContext) -> Result<bool, LooperError> {
        let hold_first = match (self.pending.deadline(), self.hold.deadline()) {
            (Some(pending), Some(hold)) => hold < pending,
            (None, Some(_)) => true,
            _ => false,
        };

        let timer = if hold_first {
            self.hold.take_due(ctx.now)
        } else {
            self.pending.take_due(ctx.now)
        };
        let Some(timer) = timer else {
            return Ok(false);
        };

        self.fire(ctx, timer)?;
        Ok(true)
    }

    fn fire(&mut self, ctx: &mut TrackContext, timer: Timer) -> Result<(), LooperError> {
        debug!(
            track = self.index.get(),
            timer = ?timer.kind,
            deadline = timer.deadline,
            now = ctx.now,
            "Timer fired."
        );

        match (timer.kind, self.state) {
            (TimerKind::WaitingStart, TrackState::Waiting) => {
                let transport = ctx.transport.clock();
                match transport.master_loop_duration() {
                    Some(master_duration) if self.enabled => {
                        let max_duration = self.divider.scale(master_duration);
                        self.begin_recording(ctx, max_duration)
                    }
                    _ => {
                        self.set_state(TrackState::Ready);
                        Ok(())
                    }
                }
            }
            (TimerKind::RecordDeadline, TrackState::Recording) => self.finish_recording(ctx),
            (TimerKind::OverdubStart, TrackState::Overdub) => self.begin_overdub(ctx),
            (TimerKind::OverdubEnd, TrackState::Overdub) => self.finish_overdub(ctx),
            (TimerKind::HoldClear, _) => {
                self.clear(ctx);
                Ok(())
            }
            (kind, state) => {
                warn!(
                    track = self.index.get(),
                    timer = ?kind,
                    state = %state,
                    "Timer fired into an unexpected state, ignoring."
                );
                Ok(())
            }
        }
    }

    fn begin_recording(
        &mut self,
        ctx: &mut TrackContext,
        max_duration: f64,
    ) -> Result<(), LooperError> {
        let session = match ctx.audio.capture.begin(self.index) {
            Ok(session) => session,
            Err(e) => {
                self.set_state(TrackState::Ready);
                return Err(e);
            }
        };

        self.capture = Some(ActiveCapture {
            session,
            started_at: ctx.now,
            max_duration,
        });
        self.pending.schedule(TimerKind::RecordDeadline, ctx.now + max_duration);
        self.set_state(TrackState::Recording);
        info!(
            track = self.index.get(),
            max_duration = max_duration,
            "Recording started."
        );
        Ok(())
    }

    fn finish_recording(&mut self, ctx: &mut TrackContext) -> Result<(), LooperError> {
        self.pending.cancel();
        let buffer = match self.collect_capture(ctx) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.set_state(TrackState::Ready);
                return Err(e);
            }
        };

        let duration = buffer.duration_seconds();
        self.loop_buffer = Some(Arc::new(buffer));
        if let TransportAccess::Master(transport) = &mut ctx.transport {
            transport.establish(duration);
        }
        info!(track = self.index.get(), duration = duration, "Recording finished.");

        let reference = self.master_reference(ctx);
        self.start_playback(ctx, reference)
    }

    fn begin_overdub(&mut self, ctx: &mut TrackContext) -> Result<(), LooperError> {
        let session = match ctx.audio.capture.begin(self.index) {
            Ok(session) => session,
            Err(e) => {
                self.set_state(TrackState::Playing);
                return Err(e);
            }
        };

        let loop_duration = self.loop_duration();
        self.capture = Some(ActiveCapture {
            session,
            started_at: ctx.now,
            max_duration: loop_duration,
        });
        self.pending.schedule(TimerKind::OverdubEnd, ctx.now + loop_duration);
        info!(track = self.index.get(), "Overdub capture started.");
        Ok(())
    }

    fn finish_overdub(&mut self, ctx: &mut TrackContext) -> Result<(), LooperError> {
        self.pending.cancel();
        let merged = self.decode_capture(ctx).and_then(|take| {
            match (&self.loop_buffer, take.is_empty()) {
                // Layering silence changes nothing, keep the loop we have.
                (Some(existing), true) => Ok(existing.clone()),
                (Some(existing), false) => existing.overdub(&take).map(Arc::new),
                (None, _) => Ok(Arc::new(take)),
            }
        });

        // A failed overdub leaves the existing loop playing untouched.
        let merged = match merged {
            Ok(merged) => merged,
            Err(e) => {
                self.set_state(TrackState::Playing);
                return Err(e);
            }
        };

        let reference = if self.index.is_master() {
            Some(CyclePhase::new(self.loop_origin, self.loop_duration()))
        } else {
            self.master_reference(ctx)
        };
        self.loop_buffer = Some(merged);
        info!(
            track = self.index.get(),
            duration = self.loop_duration(),
            "Overdub merged."
        );
        self.start_playback(ctx, reference)
    }

    /// Stops the running capture and decodes what it produced, which may be nothing.
    fn decode_capture(&mut self, ctx: &TrackContext) -> Result<LoopBuffer, LooperError> {
        let Some(capture) = self.capture.take() else {
            return Err(LooperError::CaptureUnavailable(
                "no capture is running".to_string(),
            ));
        };

        let bytes = capture.session.stop()?;
        ctx.audio.decoder.decode(&bytes)
    }

    /// A new loop needs at least one frame.
    fn collect_capture(&mut self, ctx: &TrackContext) -> Result<LoopBuffer, LooperError> {
        let buffer = self.decode_capture(ctx)?;
        if buffer.is_empty() {
            return Err(LooperError::DecodeFailure(
                "the capture produced no audio".to_string(),
            ));
        }
        Ok(buffer)
    }

    fn abort_capture(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.session.abort();
        }
    }

    fn stop_playback(&mut self) {
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
        }
    }

    /// The master cycle a dependent lines up with, if the master is audible.
    fn master_reference(&self, ctx: &TrackContext) -> Option<CyclePhase> {
        if self.index.is_master() || !ctx.master.playing {
            return None;
        }

        ctx.transport
            .clock()
            .master_loop_duration()
            .map(|duration| CyclePhase::new(ctx.master.origin, duration))
    }

    /// (Re)starts looping the current buffer, in phase with the given reference cycle.
    fn start_playback(
        &mut self,
        ctx: &mut TrackContext,
        reference: Option<CyclePhase>,
    ) -> Result<(), LooperError> {
        self.stop_playback();
        let Some(buffer) = self.loop_buffer.clone() else {
            self.set_state(TrackState::Ready);
            return Ok(());
        };

        let offset = phase::playback_offset(reference, buffer.duration_seconds(), ctx.now);
        match ctx.audio.sink.play(buffer, offset, self.gain) {
            Ok(handle) => {
                self.playback = Some(handle);
                self.loop_origin = ctx.now - offset;
                self.set_state(TrackState::Playing);
                info!(track = self.index.get(), offset = offset, "Playback started.");
                Ok(())
            }
            Err(e) => {
                self.set_state(TrackState::Stopped);
                Err(e)
            }
        }
    }

    fn set_state(&mut self, state: TrackState) {
        if self.state != state {
            debug!(
                track = self.index.get(),
                from = %self.state,
                to = %state,
                "State change."
            );
            self.state = state;
        }
    }

    pub(crate) fn progress(&self, now: f64) -> f64 {
        match (self.state, self.capture.as_ref()) {
            (TrackState::Recording, Some(capture)) | (TrackState::Overdub, Some(capture)) => {
                capture.progress(now)
            }
            (TrackState::Playing, _) => {
                let duration = self.loop_duration();
                if duration > 0.0 {
                    phase::position_in_cycle(self.loop_origin, duration, now) / duration
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    pub fn snapshot(&self, now: f64) -> TrackSnapshot {
        TrackSnapshot {
            index: self.index,
            state: self.state,
            progress_ratio: self.progress(now),
            loop_duration_seconds: self.loop_duration(),
            enabled: self.enabled,
            gain: self.gain,
            divider: self.divider,
        }
    }
}

impl Drop for TrackController {
    fn drop(&mut self) {
        self.abort_capture();
        self.stop_playback();
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        audio::{mock, Services},
        looper::Settings,
        transport::TransportClock,
    };

    use super::*;

    struct Fixture {
        capture: Arc<mock::Capture>,
        decoder: Arc<mock::Decoder>,
        sink: Arc<mock::Sink>,
        clock: crate::clock::ManualClock,
        services: Services,
        settings: Settings,
        transport: TransportClock,
    }

    impl Fixture {
        fn new() -> Fixture {
            let clock = crate::clock::ManualClock::new(0.0);
            let capture = Arc::new(mock::Capture::new(Arc::new(clock.clone()), 1000));
            let decoder = Arc::new(mock::Decoder::new());
            let sink = Arc::new(mock::Sink::new());
            let services = Services::new(capture.clone(), decoder.clone(), sink.clone());
            Fixture {
                capture,
                decoder,
                sink,
                clock,
                services,
                settings: Settings::default(),
                transport: TransportClock::new(),
            }
        }

        /// A context with write access to the transport at the given time.
        fn ctx(&mut self, at: f64) -> TrackContext<'_> {
            self.clock.set(at);
            TrackContext {
                now: at,
                transport: TransportAccess::Master(&mut self.transport),
                master: MasterView {
                    origin: 0.0,
                    playing: false,
                },
                audio: &self.services,
                settings: &self.settings,
            }
        }
    }

    #[test]
    fn test_master_records_and_plays() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);

        let outcome = track
            .primary_action(&mut fixture.ctx(1.0))
            .expect("record should start");
        assert_eq!(CommandOutcome::Applied(TrackState::Recording), outcome);
        assert_eq!(Some(61.0), track.next_deadline());
        assert_eq!(0.5, track.progress(31.0));

        let outcome = track
            .primary_action(&mut fixture.ctx(3.0))
            .expect("record should stop");
        assert_eq!(CommandOutcome::Applied(TrackState::Playing), outcome);
        assert_eq!(2.0, track.loop_duration());
        assert_eq!(3.0, track.loop_origin());
        assert_eq!(Some(2.0), fixture.transport.master_loop_duration());
        assert_eq!(Some(120), fixture.transport.master_bpm());
        assert_eq!(None, track.next_deadline());

        let plays = fixture.sink.plays();
        assert_eq!(1, plays.len());
        assert_eq!(0.0, plays[0].offset);
        assert_eq!(0.9, plays[0].gain);
        assert_eq!(0.25, track.progress(3.5));
    }

    #[test]
    fn test_master_recording_hits_the_cap() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");

        let mut ctx = fixture.ctx(59.0);
        assert!(!track.fire_due(&mut ctx).expect("nothing due"));
        let mut ctx = fixture.ctx(60.0);
        assert!(track.fire_due(&mut ctx).expect("deadline should fire"));
        assert_eq!(TrackState::Playing, track.state());
        assert_eq!(60.0, track.loop_duration());
    }

    #[test]
    fn test_capture_unavailable_stays_ready() {
        let mut fixture = Fixture::new();
        fixture.capture.set_unavailable(true);
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);

        let result = track.primary_action(&mut fixture.ctx(0.0));
        assert!(matches!(result, Err(LooperError::CaptureUnavailable(_))));
        assert_eq!(TrackState::Ready, track.state());
        assert!(!fixture.transport.is_established());
    }

    #[test]
    fn test_decode_failure_returns_to_ready() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");

        fixture.decoder.fail_next();
        let result = track.primary_action(&mut fixture.ctx(2.0));
        assert!(matches!(result, Err(LooperError::DecodeFailure(_))));
        assert_eq!(TrackState::Ready, track.state());
        assert!(track.loop_buffer().is_none());
        assert!(!fixture.transport.is_established());
        assert_eq!(None, track.next_deadline());
    }

    #[test]
    fn test_abort_recording_discards_capture() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");

        let outcome = track
            .short_stop(&mut fixture.ctx(1.0))
            .expect("abort should succeed");
        assert_eq!(CommandOutcome::Applied(TrackState::Ready), outcome);
        assert_eq!(1, fixture.capture.aborted());
        assert!(track.loop_buffer().is_none());
        assert!(fixture.sink.plays().is_empty());
        assert_eq!(None, track.next_deadline());
    }

    #[test]
    fn test_overdub_arms_on_own_boundary() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");
        track
            .primary_action(&mut fixture.ctx(2.0))
            .expect("record should stop");

        // Armed half way through the loop, capture starts when the loop comes around.
        let outcome = track
            .primary_action(&mut fixture.ctx(3.0))
            .expect("overdub should arm");
        assert_eq!(CommandOutcome::Applied(TrackState::Overdub), outcome);
        assert_eq!(Some(4.0), track.next_deadline());
        assert_eq!(0.0, track.progress(3.5));

        let mut ctx = fixture.ctx(4.0);
        assert!(track.fire_due(&mut ctx).expect("overdub should start"));
        assert_eq!(Some(6.0), track.next_deadline());
        assert_eq!(2, fixture.capture.started());
        assert_eq!(0.5, track.progress(5.0));

        let mut ctx = fixture.ctx(6.0);
        assert!(track.fire_due(&mut ctx).expect("overdub should finish"));
        assert_eq!(TrackState::Playing, track.state());
        assert_eq!(2.0, track.loop_duration());
        // The master keeps its phase across the overdub.
        assert_eq!(6.0, track.loop_origin());
        assert_eq!(Some(120), fixture.transport.master_bpm());
    }

    #[test]
    fn test_cancel_armed_overdub() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");
        track
            .primary_action(&mut fixture.ctx(2.0))
            .expect("record should stop");
        track
            .primary_action(&mut fixture.ctx(2.5))
            .expect("overdub should arm");

        let outcome = track
            .primary_action(&mut fixture.ctx(3.0))
            .expect("overdub should cancel");
        assert_eq!(CommandOutcome::Applied(TrackState::Playing), outcome);
        assert_eq!(None, track.next_deadline());

        let mut ctx = fixture.ctx(4.0);
        assert!(!track.fire_due(&mut ctx).expect("nothing due"));
        assert_eq!(1, fixture.capture.started());
    }

    #[test]
    fn test_overdub_decode_failure_keeps_loop() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");
        track
            .primary_action(&mut fixture.ctx(2.0))
            .expect("record should stop");
        let recorded = track.loop_buffer().cloned().expect("loop recorded");

        track
            .primary_action(&mut fixture.ctx(2.0))
            .expect("overdub should arm");
        let mut ctx = fixture.ctx(4.0);
        track.fire_due(&mut ctx).expect("overdub should start");

        fixture.decoder.fail_next();
        let mut ctx = fixture.ctx(6.0);
        assert!(matches!(
            track.fire_due(&mut ctx),
            Err(LooperError::DecodeFailure(_))
        ));
        assert_eq!(TrackState::Playing, track.state());
        assert!(Arc::ptr_eq(
            &recorded,
            track.loop_buffer().expect("loop kept")
        ));
        assert!(track.is_sounding());
    }

    #[test]
    fn test_empty_overdub_keeps_loop_playing() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");
        track
            .primary_action(&mut fixture.ctx(2.0))
            .expect("record should stop");
        let recorded = track.loop_buffer().cloned().expect("loop recorded");

        track
            .primary_action(&mut fixture.ctx(3.0))
            .expect("overdub should arm");
        let mut ctx = fixture.ctx(4.0);
        assert!(track.fire_due(&mut ctx).expect("overdub should start"));

        // Finished the instant it began, so the take holds no frames.
        let outcome = track
            .primary_action(&mut fixture.ctx(4.0))
            .expect("empty overdub is not an error");
        assert_eq!(CommandOutcome::Applied(TrackState::Playing), outcome);
        assert!(Arc::ptr_eq(
            &recorded,
            track.loop_buffer().expect("loop kept")
        ));
        assert_eq!(2, fixture.capture.stopped());
        let plays = fixture.sink.plays();
        assert_eq!(2, plays.len());
        assert!(Arc::ptr_eq(&recorded, &plays[1].buffer));
        assert_eq!(1, fixture.sink.active());
        assert_eq!(4.0, track.loop_origin());
    }

    #[test]
    fn test_failed_resume_stays_stopped() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");
        track
            .primary_action(&mut fixture.ctx(2.0))
            .expect("record should stop");
        track
            .short_stop(&mut fixture.ctx(3.0))
            .expect("stop should succeed");

        fixture.sink.set_failing(true);
        let result = track.short_stop(&mut fixture.ctx(4.0));
        assert!(matches!(result, Err(LooperError::Playback(_))));
        assert_eq!(TrackState::Stopped, track.state());
        assert!(!track.is_sounding());
        assert!(track.loop_buffer().is_some());

        // Once the sink recovers the same press resumes.
        fixture.sink.set_failing(false);
        let outcome = track
            .short_stop(&mut fixture.ctx(5.0))
            .expect("resume should succeed");
        assert_eq!(CommandOutcome::Applied(TrackState::Playing), outcome);
    }

    #[test]
    fn test_failed_playback_after_recording_stops() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");

        fixture.sink.set_failing(true);
        let result = track.primary_action(&mut fixture.ctx(2.0));
        assert!(matches!(result, Err(LooperError::Playback(_))));
        assert_eq!(TrackState::Stopped, track.state());
        // The take was kept and the tempo set, only playback is missing.
        assert_eq!(2.0, track.loop_duration());
        assert_eq!(Some(2.0), fixture.transport.master_loop_duration());
        assert!(fixture.sink.plays().is_empty());
        assert_eq!(None, track.next_deadline());
    }

    #[test]
    fn test_stop_discards_armed_overdub() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");
        track
            .primary_action(&mut fixture.ctx(2.0))
            .expect("record should stop");
        track
            .primary_action(&mut fixture.ctx(2.5))
            .expect("overdub should arm");
        assert_eq!(Some(4.0), track.next_deadline());

        let outcome = track
            .short_stop(&mut fixture.ctx(3.0))
            .expect("stop should succeed");
        assert_eq!(CommandOutcome::Applied(TrackState::Stopped), outcome);
        assert_eq!(None, track.next_deadline());

        // The boundary the overdub was armed for passes without a capture starting.
        let mut ctx = fixture.ctx(4.5);
        assert!(!track.fire_due(&mut ctx).expect("nothing due"));
        assert_eq!(1, fixture.capture.started());
        assert_eq!(0, fixture.capture.aborted());
        assert_eq!(TrackState::Stopped, track.state());
        assert!(!track.is_sounding());
    }

    #[test]
    fn test_stop_resume_and_hold() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");
        track
            .primary_action(&mut fixture.ctx(2.0))
            .expect("record should stop");

        // A short press stops.
        track.hold_clear_start(&mut fixture.ctx(3.0));
        let outcome = track
            .hold_clear_release(&mut fixture.ctx(3.2))
            .expect("release should stop");
        assert_eq!(CommandOutcome::Applied(TrackState::Stopped), outcome);
        assert!(!track.is_sounding());
        assert!(track.loop_buffer().is_some());
        assert_eq!(
            CommandOutcome::Rejected(Rejection::InvalidState(TrackState::Stopped)),
            track
                .primary_action(&mut fixture.ctx(3.3))
                .expect("primary should be rejected")
        );

        // Another short press resumes from the top.
        let outcome = track
            .short_stop(&mut fixture.ctx(5.5))
            .expect("resume should succeed");
        assert_eq!(CommandOutcome::Applied(TrackState::Playing), outcome);
        assert_eq!(5.5, track.loop_origin());

        // A long hold clears and resets the transport.
        track.hold_clear_start(&mut fixture.ctx(6.0));
        assert_eq!(Some(8.0), track.next_deadline());
        let mut ctx = fixture.ctx(8.0);
        assert!(track.fire_due(&mut ctx).expect("hold should fire"));
        assert_eq!(TrackState::Ready, track.state());
        assert!(track.loop_buffer().is_none());
        assert!(!fixture.transport.is_established());

        // The release after the clear has nothing left to do.
        assert_eq!(
            CommandOutcome::Rejected(Rejection::InvalidState(TrackState::Ready)),
            track
                .hold_clear_release(&mut fixture.ctx(8.5))
                .expect("release should be rejected")
        );
    }

    #[test]
    fn test_late_release_clears() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        track
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");
        track.hold_clear_start(&mut fixture.ctx(1.0));

        let outcome = track
            .hold_clear_release(&mut fixture.ctx(3.5))
            .expect("release should clear");
        assert_eq!(CommandOutcome::Applied(TrackState::Ready), outcome);
        assert_eq!(1, fixture.capture.aborted());
    }

    #[test]
    fn test_hold_on_ready_is_rejected() {
        let mut fixture = Fixture::new();
        let mut track = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        assert_eq!(
            CommandOutcome::Rejected(Rejection::InvalidState(TrackState::Ready)),
            track.hold_clear_start(&mut fixture.ctx(0.0))
        );
        assert_eq!(None, track.next_deadline());
    }

    #[test]
    fn test_gain_and_divider_validation() {
        let mut fixture = Fixture::new();
        let mut master = TrackController::new(TrackIndex::MASTER, Divider::ONE, 0.9);
        let mut dependent = TrackController::new(
            TrackIndex::new(2).expect("track 2"),
            Divider::ONE,
            0.9,
        );

        assert!(matches!(
            master.set_divider(Divider::new(2, 1).expect("divider")),
            Err(LooperError::InvalidDivider(_))
        ));
        dependent
            .set_divider(Divider::new(1, 2).expect("divider"))
            .expect("dependent divider");
        assert_eq!(Divider::new(1, 2).expect("divider"), dependent.divider());

        for gain in [-0.1, 1.21, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                master.set_gain(gain),
                Err(LooperError::InvalidGain(_))
            ));
        }
        assert_eq!(0.9, master.gain());

        master
            .primary_action(&mut fixture.ctx(0.0))
            .expect("record should start");
        master
            .primary_action(&mut fixture.ctx(1.0))
            .expect("record should stop");
        master.set_gain(1.2).expect("gain should be accepted");
        assert_eq!(Some(1.2), fixture.sink.last_gain());
        master.set_gain(0.0).expect("gain should be accepted");
        assert_eq!(Some(0.0), fixture.sink.last_gain());
    }

    #[test]
    fn test_disabled_dependent_rejects() {
        let mut fixture = Fixture::new();
        let mut dependent = TrackController::new(
            TrackIndex::new(3).expect("track 3"),
            Divider::ONE,
            0.9,
        );
        assert!(!dependent.is_enabled());

        let outcome = dependent
            .primary_action(&mut fixture.ctx(0.0))
            .expect("rejection is not an error");
        assert_eq!(CommandOutcome::Rejected(Rejection::Disabled), outcome);
        assert_eq!(TrackState::Ready, dependent.state());
    }

    #[test]
    fn test_track_index() {
        assert!(matches!(
            TrackIndex::new(0),
            Err(LooperError::InvalidTrack(0))
        ));
        assert!(matches!(
            TrackIndex::new(5),
            Err(LooperError::InvalidTrack(5))
        ));
        assert_eq!(
            vec![1, 2, 3, 4],
            TrackIndex::all().map(|i| i.get()).collect::<Vec<_>>()
        );
        assert_eq!(
            vec![2, 3, 4],
            TrackIndex::dependents().map(|i| i.get()).collect::<Vec<_>>()
        );
        assert_eq!(3, TrackIndex::new(4).expect("track 4").slot());
    }
}
