// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Level};

use crate::error::LooperError;
use crate::looper::LooperEngine;
use crate::track::Divider;

pub mod keyboard;

/// Controller events that will trigger behavior in the looper. Tracks are numbered from 1.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// Record, stop recording, arm an overdub or finish one.
    PrimaryAction(usize),

    /// A short press of the stop control: stop, resume or abandon a recording.
    ShortStop(usize),

    /// The stop control went down. Held long enough, the track is cleared.
    HoldClearStart(usize),

    /// The stop control came back up.
    HoldClearRelease(usize),

    /// Clears the track right away.
    Clear(usize),

    /// Sets the divider used by the track's next recording.
    SetDivider(usize, Divider),

    /// Sets the output gain of the track.
    SetGain(usize, f32),

    /// Reports the state of every track.
    Status,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives the looper. All looper state changes happen on the controller's task, which either
/// handles the next event or sleeps until the next scheduled transition is due.
pub struct Controller {
    handle: JoinHandle<()>,
    engine: Arc<Mutex<LooperEngine>>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(engine: LooperEngine, driver: Arc<dyn Driver>) -> Controller {
        let engine = Arc::new(Mutex::new(engine));
        Controller {
            handle: {
                let engine = engine.clone();
                tokio::spawn(async move { Controller::trigger_events(engine, driver).await })
            },
            engine,
        }
    }

    /// The looper driven by this controller.
    pub fn engine(&self) -> Arc<Mutex<LooperEngine>> {
        self.engine.clone()
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers looper events by watching the driver and getting events from it, firing
    /// scheduled transitions in between.
    async fn trigger_events(engine: Arc<Mutex<LooperEngine>>, driver: Arc<dyn Driver>) {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);

        info!("Controller started.");

        loop {
            let wait = engine.lock().until_next_deadline();
            let deadline = async move {
                match wait {
                    Some(wait) => tokio::time::sleep(wait).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => {
                        info!(event = format!("{:?}", event), "Received event.");
                        if let Err(e) = Controller::handle_event(&engine, event) {
                            error!("Error talking to looper: {}", e);
                        }
                    }
                    None => {
                        info!("Controller closing.");
                        if let Err(e) = join_handle.await {
                            error!("Error waiting for event monitor to stop: {}", e);
                        }
                        return;
                    }
                },
                _ = deadline => {
                    engine.lock().tick();
                }
            }
        }
    }

    fn handle_event(engine: &Mutex<LooperEngine>, event: Event) -> Result<(), LooperError> {
        let mut engine = engine.lock();
        match event {
            Event::PrimaryAction(track) => engine.primary_action(track).map(|_| ()),
            Event::ShortStop(track) => engine.short_stop(track).map(|_| ()),
            Event::HoldClearStart(track) => engine.hold_clear_start(track).map(|_| ()),
            Event::HoldClearRelease(track) => engine.hold_clear_release(track).map(|_| ()),
            Event::Clear(track) => engine.clear(track).map(|_| ()),
            Event::SetDivider(track, divider) => engine.set_divider(track, divider),
            Event::SetGain(track, gain) => engine.set_gain(track, gain),
            Event::Status => {
                info!("{}", engine.transport_snapshot());
                for snapshot in engine.snapshots() {
                    info!("{}", snapshot);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{io, sync::Arc, time::Duration};

    use parking_lot::Mutex;
    use tokio::{
        sync::mpsc::{self, Sender, UnboundedReceiver},
        task::JoinHandle,
    };

    use crate::{
        audio::{mock, Services},
        clock::SystemClock,
        looper::{LooperEngine, Settings},
        testutil::eventually,
        track::TrackState,
    };

    use super::{Driver, Event};

    /// Forwards whatever the test sends.
    struct TestDriver {
        events: Mutex<Option<UnboundedReceiver<Event>>>,
    }

    impl Driver for TestDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events = self.events.lock().take();
            tokio::spawn(async move {
                if let Some(mut events) = events {
                    while let Some(event) = events.recv().await {
                        events_tx.send(event).await.map_err(io::Error::other)?;
                    }
                }
                Ok(())
            })
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let driver = Arc::new(TestDriver {
            events: Mutex::new(Some(receiver)),
        });

        let clock = Arc::new(SystemClock::new());
        let sink = Arc::new(mock::Sink::new());
        let engine = LooperEngine::new(
            clock.clone(),
            Services::new(
                Arc::new(mock::Capture::new(clock, 1000)),
                Arc::new(mock::Decoder::new()),
                sink.clone(),
            ),
            Settings {
                hold_to_clear: Duration::from_millis(100),
                ..Settings::default()
            },
        );
        let mut controller = super::Controller::new(engine, driver);
        let engine = controller.engine();
        let state = |track: usize| engine.lock().snapshot(track).expect("valid track").state;

        // Master records for a moment.
        sender.send(Event::PrimaryAction(1)).expect("send");
        eventually(|| state(1) == TrackState::Recording, "Master never recorded");
        std::thread::sleep(Duration::from_millis(200));
        sender.send(Event::PrimaryAction(1)).expect("send");
        eventually(|| state(1) == TrackState::Playing, "Master never played");
        assert!(engine.lock().transport().is_established());

        // Track 2 waits for the boundary and stops on its own.
        sender.send(Event::PrimaryAction(2)).expect("send");
        eventually(|| state(2) == TrackState::Recording, "Track 2 never recorded");
        eventually(|| state(2) == TrackState::Playing, "Track 2 never played");
        assert_eq!(2, sink.active());

        // Holding the master's stop control clears everything.
        sender.send(Event::HoldClearStart(1)).expect("send");
        eventually(|| state(1) == TrackState::Ready, "Master never cleared");
        eventually(|| state(2) == TrackState::Ready, "Track 2 never cleared");
        assert!(!engine.lock().snapshot(2).expect("track 2").enabled);
        assert_eq!(0, sink.active());

        drop(sender);
        assert!(
            controller.join().await.is_ok(),
            "Error waiting for controller",
        );
    }
}
