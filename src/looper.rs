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
use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info, span, Level, Span};

use crate::{
    audio::Services,
    clock::Clock,
    error::LooperError,
    track::{
        Divider, MasterView, TrackContext, TrackController, TrackIndex, TrackSnapshot, TrackState,
        TransportAccess, TRACK_COUNT,
    },
    transport::{TransportClock, TransportSnapshot},
};

pub use crate::track::{CommandOutcome, Rejection};

/// Tunables for the looper core.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// The hard cap on a master recording.
    pub max_master_recording: Duration,
    /// How long the stop control must be held to clear a track.
    pub hold_to_clear: Duration,
    /// The gain every track starts with.
    pub default_gain: f32,
    /// The starting dividers of tracks 2 to 4.
    pub dividers: [Divider; TRACK_COUNT - 1],
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_master_recording: Duration::from_secs(60),
            hold_to_clear: Duration::from_secs(2),
            default_gain: 0.9,
            dividers: [Divider::ONE; TRACK_COUNT - 1],
        }
    }
}

/// Receives state changes for rendering. Observers are called on the control thread and
/// should return quickly.
pub trait Observer: Send + Sync {
    fn track_changed(&self, snapshot: &TrackSnapshot);

    fn transport_changed(&self, snapshot: &TransportSnapshot);
}

/// The parts of a track snapshot that are worth announcing. Progress moves continuously and is
/// left for renderers to poll.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Published {
    state: TrackState,
    enabled: bool,
    loop_duration: f64,
    gain: f32,
    divider: Divider,
}

impl From<&TrackSnapshot> for Published {
    fn from(snapshot: &TrackSnapshot) -> Self {
        Published {
            state: snapshot.state,
            enabled: snapshot.enabled,
            loop_duration: snapshot.loop_duration_seconds,
            gain: snapshot.gain,
            divider: snapshot.divider,
        }
    }
}

/// Owns the transport and the four tracks, and carries effects from one track to the others.
pub struct LooperEngine {
    clock: Arc<dyn Clock>,
    audio: Services,
    settings: Settings,
    transport: TransportClock,
    tracks: Vec<TrackController>,
    observers: Vec<Arc<dyn Observer>>,
    published: [Option<Published>; TRACK_COUNT],
    published_transport: Option<TransportSnapshot>,
    span: Span,
}

impl LooperEngine {
    pub fn new(clock: Arc<dyn Clock>, audio: Services, settings: Settings) -> LooperEngine {
        let tracks = TrackIndex::all()
            .map(|index| {
                let divider = if index.is_master() {
                    Divider::ONE
                } else {
                    settings.dividers[index.slot() - 1]
                };
                TrackController::new(index, divider, settings.default_gain)
            })
            .collect();

        let mut engine = LooperEngine {
            clock,
            audio,
            settings,
            transport: TransportClock::new(),
            tracks,
            observers: Vec::new(),
            published: [None; TRACK_COUNT],
            published_transport: None,
            span: span!(Level::INFO, "looper"),
        };
        engine.publish(engine.clock.now());
        engine
    }

    /// Registers an observer and tells it the current state of everything.
    pub fn add_observer(&mut self, observer: Arc<dyn Observer>) {
        let now = self.clock.now();
        for track in self.tracks.iter() {
            observer.track_changed(&track.snapshot(now));
        }
        observer.transport_changed(&self.transport.snapshot());
        self.observers.push(observer);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transport(&self) -> &TransportClock {
        &self.transport
    }

    pub fn track(&self, track: usize) -> Result<&TrackController, LooperError> {
        let index = TrackIndex::new(track)?;
        Ok(&self.tracks[index.slot()])
    }

    /// Record, finish recording, arm an overdub or finish one.
    pub fn primary_action(&mut self, track: usize) -> Result<CommandOutcome, LooperError> {
        let index = TrackIndex::new(track)?;
        self.command(index, "primary action", |track, ctx| track.primary_action(ctx))
    }

    /// Stop, resume or abandon what the track is doing.
    pub fn short_stop(&mut self, track: usize) -> Result<CommandOutcome, LooperError> {
        let index = TrackIndex::new(track)?;
        self.command(index, "short stop", |track, ctx| track.short_stop(ctx))
    }

    /// The stop control was pressed and is being held.
    pub fn hold_clear_start(&mut self, track: usize) -> Result<CommandOutcome, LooperError> {
        let index = TrackIndex::new(track)?;
        self.command(index, "hold clear start", |track, ctx| {
            Ok(track.hold_clear_start(ctx))
        })
    }

    /// The stop control was released.
    pub fn hold_clear_release(&mut self, track: usize) -> Result<CommandOutcome, LooperError> {
        let index = TrackIndex::new(track)?;
        self.command(index, "hold clear release", |track, ctx| {
            track.hold_clear_release(ctx)
        })
    }

    /// Clears a track immediately, as a completed hold would.
    pub fn clear(&mut self, track: usize) -> Result<CommandOutcome, LooperError> {
        let index = TrackIndex::new(track)?;
        self.command(index, "clear", |track, ctx| {
            if track.state() == TrackState::Ready {
                Ok(CommandOutcome::Rejected(Rejection::InvalidState(
                    TrackState::Ready,
                )))
            } else {
                Ok(track.clear(ctx))
            }
        })
    }

    pub fn set_divider(&mut self, track: usize, divider: Divider) -> Result<(), LooperError> {
        let index = TrackIndex::new(track)?;
        let result = self.tracks[index.slot()].set_divider(divider);
        self.publish(self.clock.now());
        result
    }

    pub fn set_gain(&mut self, track: usize, gain: f32) -> Result<(), LooperError> {
        let index = TrackIndex::new(track)?;
        let result = self.tracks[index.slot()].set_gain(gain);
        self.publish(self.clock.now());
        result
    }

    /// Fires every timer that is due, earliest first. Returns how many fired.
    pub fn tick(&mut self) -> usize {
        let span = self.span.clone();
        let _enter = span.enter();

        let now = self.clock.now();
        let mut fired = 0;
        while let Some(index) = self.next_due(now) {
            match self.dispatch(index, now, |track, ctx| track.fire_due(ctx)) {
                Ok(true) => fired += 1,
                Ok(false) => break,
                Err(e) => {
                    fired += 1;
                    error!(
                        track = index.get(),
                        err = e.to_string(),
                        "Scheduled transition failed."
                    );
                }
            }
        }

        self.publish(now);
        fired
    }

    /// The earliest pending timer across all tracks, in clock seconds.
    pub fn next_deadline(&self) -> Option<f64> {
        self.tracks
            .iter()
            .filter_map(TrackController::next_deadline)
            .min_by(f64::total_cmp)
    }

    /// How long until the next timer is due, or `None` if nothing is scheduled.
    pub fn until_next_deadline(&self) -> Option<Duration> {
        self.next_deadline().map(|deadline| {
            let remaining = deadline - self.clock.now();
            if remaining.is_finite() && remaining > 0.0 {
                Duration::from_secs_f64(remaining)
            } else {
                Duration::ZERO
            }
        })
    }

    pub fn snapshot(&self, track: usize) -> Result<TrackSnapshot, LooperError> {
        Ok(self.track(track)?.snapshot(self.clock.now()))
    }

    pub fn snapshots(&self) -> Vec<TrackSnapshot> {
        let now = self.clock.now();
        self.tracks.iter().map(|track| track.snapshot(now)).collect()
    }

    pub fn transport_snapshot(&self) -> TransportSnapshot {
        self.transport.snapshot()
    }

    /// The track whose timer is due first. Ties go to the lower track number so the master
    /// always moves before its dependents.
    fn next_due(&self, now: f64) -> Option<TrackIndex> {
        let mut due: Option<(f64, TrackIndex)> = None;
        for track in self.tracks.iter() {
            if let Some(deadline) = track.next_deadline() {
                if deadline <= now && due.map_or(true, |(earliest, _)| deadline < earliest) {
                    due = Some((deadline, track.index()));
                }
            }
        }
        due.map(|(_, index)| index)
    }

    fn command<F>(
        &mut self,
        index: TrackIndex,
        name: &str,
        f: F,
    ) -> Result<CommandOutcome, LooperError>
    where
        F: FnOnce(&mut TrackController, &mut TrackContext<'_>) -> Result<CommandOutcome, LooperError>,
    {
        let span = self.span.clone();
        let _enter = span.enter();

        let now = self.clock.now();
        let result = self.dispatch(index, now, f);
        match &result {
            Ok(CommandOutcome::Applied(state)) => {
                info!(track = index.get(), command = name, state = %state, "Command applied.")
            }
            Ok(CommandOutcome::Rejected(rejection)) => info!(
                track = index.get(),
                command = name,
                reason = %rejection,
                "Command rejected."
            ),
            Err(e) => error!(
                track = index.get(),
                command = name,
                err = e.to_string(),
                "Command failed."
            ),
        }

        self.publish(now);
        result
    }

    /// Runs one operation against a track and then carries its effects to the other tracks.
    fn dispatch<T, F>(&mut self, index: TrackIndex, now: f64, f: F) -> Result<T, LooperError>
    where
        F: FnOnce(&mut TrackController, &mut TrackContext<'_>) -> Result<T, LooperError>,
    {
        let was_established = self.transport.is_established();
        let was_sounding = self.tracks[TrackIndex::MASTER.slot()].is_sounding();

        let result = {
            let master = self.master_view();
            let transport = if index.is_master() {
                TransportAccess::Master(&mut self.transport)
            } else {
                TransportAccess::Dependent(&self.transport)
            };
            let mut ctx = TrackContext {
                now,
                transport,
                master,
                audio: &self.audio,
                settings: &self.settings,
            };
            f(&mut self.tracks[index.slot()], &mut ctx)
        };

        let established = self.transport.is_established();
        if !was_established && established {
            self.enable_dependents();
        } else if was_established && !established {
            self.clear_dependents(now);
        } else if index.is_master()
            && !was_sounding
            && self.tracks[TrackIndex::MASTER.slot()].state() == TrackState::Playing
        {
            self.resync_dependents(now);
        }

        result
    }

    fn master_view(&self) -> MasterView {
        let master = &self.tracks[TrackIndex::MASTER.slot()];
        MasterView {
            origin: master.loop_origin(),
            playing: master.is_sounding(),
        }
    }

    fn enable_dependents(&mut self) {
        info!("Tempo established, enabling dependent tracks.");
        for index in TrackIndex::dependents() {
            self.tracks[index.slot()].set_enabled(true);
        }
    }

    /// The master is gone, so nothing may stay locked to it.
    fn clear_dependents(&mut self, now: f64) {
        info!("Tempo reset, clearing and disabling dependent tracks.");
        let master = self.master_view();
        for index in TrackIndex::dependents() {
            let track = &mut self.tracks[index.slot()];
            track.set_enabled(false);
            if track.state() != TrackState::Ready {
                let mut ctx = TrackContext {
                    now,
                    transport: TransportAccess::Dependent(&self.transport),
                    master,
                    audio: &self.audio,
                    settings: &self.settings,
                };
                track.clear(&mut ctx);
            }
        }
    }

    /// The master resumed from the top, so restart every playing dependent against it.
    fn resync_dependents(&mut self, now: f64) {
        let master = self.master_view();
        for index in TrackIndex::dependents() {
            let track = &mut self.tracks[index.slot()];
            if track.state() != TrackState::Playing {
                continue;
            }

            debug!(track = index.get(), "Resynchronizing with the master.");
            let mut ctx = TrackContext {
                now,
                transport: TransportAccess::Dependent(&self.transport),
                master,
                audio: &self.audio,
                settings: &self.settings,
            };
            if let Err(e) = track.restart_playback(&mut ctx) {
                error!(
                    track = index.get(),
                    err = e.to_string(),
                    "Unable to resynchronize with the master."
                );
            }
        }
    }

    /// Tells observers about anything that changed since the last call.
    fn publish(&mut self, now: f64) {
        for track in self.tracks.iter() {
            let snapshot = track.snapshot(now);
            let published = Some(Published::from(&snapshot));
            let slot = track.index().slot();
            if self.published[slot] != published {
                self.published[slot] = published;
                for observer in self.observers.iter() {
                    observer.track_changed(&snapshot);
                }
            }
        }

        let transport = Some(self.transport.snapshot());
        if self.published_transport != transport {
            self.published_transport = transport;
            if let Some(snapshot) = transport.as_ref() {
                for observer in self.observers.iter() {
                    observer.transport_changed(snapshot);
                }
            }
        }
    }
}
