//! Session lifecycle: start, record, stop and save.
//!
//! [`SessionController`] ties the location watch, the distance accumulator
//! and the session timer into a single `Idle → Tracking → Idle` lifecycle.
//! While tracking, [`SessionController::next_event`] multiplexes provider
//! events and timer ticks on the caller's task; every event it returns is
//! also broadcast to [`subscribe_events`](SessionController::subscribe_events)
//! receivers.
//!
//! The active session (watch, timer, draft) is owned by the controller and
//! torn down in [`stop`](SessionController::stop) before anything is awaited,
//! so no provider event can reach the draft afterwards.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use jogtrack_types::{CompletedSession, PositionSample, TrackingState};

use crate::backend::{Credential, SessionStore};
use crate::distance::DistanceAccumulator;
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, TrackingEvent};
use crate::location::{LocationWatch, LocationWatchManager, WatchEvent};
use crate::timer::{Clock, SessionTimer, TokioClock};

/// Minimum number of samples a session needs to be saved.
pub const MIN_SAMPLES: usize = 2;

/// Lifecycle phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// No session is running.
    Idle,
    /// A session is recording.
    Tracking,
}

impl SessionPhase {
    fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Tracking => "tracking",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The in-progress session.
#[derive(Debug, Clone)]
pub struct SessionDraft {
    path: Vec<PositionSample>,
    distance_meters: f64,
    started_at: Instant,
    elapsed_seconds: u64,
}

impl SessionDraft {
    fn new(started_at: Instant) -> Self {
        Self {
            path: Vec::new(),
            distance_meters: 0.0,
            started_at,
            elapsed_seconds: 0,
        }
    }

    /// Samples recorded so far, in arrival order.
    pub fn path(&self) -> &[PositionSample] {
        &self.path
    }

    /// Distance covered so far in meters.
    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    /// When the session started.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Elapsed seconds at the last tick.
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    /// The most recent sample.
    pub fn last_position(&self) -> Option<&PositionSample> {
        self.path.last()
    }
}

struct ActiveSession {
    watch: LocationWatch,
    timer: SessionTimer,
    accumulator: DistanceAccumulator,
    draft: SessionDraft,
    reported_state: TrackingState,
}

enum Input {
    Watch(Option<WatchEvent>),
    Tick(u64),
}

/// Drives one jogging session at a time.
pub struct SessionController {
    watch_manager: LocationWatchManager,
    store: Arc<dyn SessionStore>,
    credential: Credential,
    clock: Arc<dyn Clock>,
    events: EventDispatcher<TrackingEvent>,
    pending: VecDeque<TrackingEvent>,
    active: Option<ActiveSession>,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("phase", &self.phase())
            .field("tracking_state", &self.tracking_state())
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Create an idle controller.
    pub fn new(
        watch_manager: LocationWatchManager,
        store: Arc<dyn SessionStore>,
        credential: Credential,
    ) -> Self {
        Self {
            watch_manager,
            store,
            credential,
            clock: Arc::new(TokioClock),
            events: EventDispatcher::default(),
            pending: VecDeque::new(),
            active: None,
        }
    }

    /// Use a different clock for session timing.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Broadcast events through the given dispatcher.
    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher<TrackingEvent>) -> Self {
        self.events = events;
        self
    }

    /// Replace the credential used for the next save.
    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = credential;
    }

    /// Subscribe to the controller's events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackingEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        if self.active.is_some() {
            SessionPhase::Tracking
        } else {
            SessionPhase::Idle
        }
    }

    /// Whether a session is recording.
    pub fn is_tracking(&self) -> bool {
        self.active.is_some()
    }

    /// Location acquisition state of the running session.
    pub fn tracking_state(&self) -> TrackingState {
        self.active
            .as_ref()
            .map_or(TrackingState::Idle, |active| active.watch.state())
    }

    /// The running session, if any.
    pub fn draft(&self) -> Option<&SessionDraft> {
        self.active.as_ref().map(|active| &active.draft)
    }

    /// Most recent sample of the running session.
    pub fn last_position(&self) -> Option<&PositionSample> {
        self.draft().and_then(SessionDraft::last_position)
    }

    /// Begin recording a session.
    ///
    /// Fails with [`Error::InvalidState`] when a session is already running
    /// and with [`Error::NotSupported`] when the device has no location
    /// provider.
    pub fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(Error::invalid_state("start", SessionPhase::Tracking.as_str()));
        }

        let watch = self.watch_manager.subscribe()?;
        let timer = SessionTimer::start(Arc::clone(&self.clock));
        let draft = SessionDraft::new(timer.started_at());
        let state = watch.state();
        let high_accuracy = watch.mode().is_high();

        self.pending.clear();
        self.active = Some(ActiveSession {
            watch,
            timer,
            accumulator: DistanceAccumulator::new(),
            draft,
            reported_state: state,
        });

        info!("Session started ({})", state);
        self.emit(TrackingEvent::Started { high_accuracy });
        self.emit(TrackingEvent::StateChanged {
            from: TrackingState::Idle,
            to: state,
        });
        Ok(())
    }

    /// Wait for the next event of the running session.
    ///
    /// Returns `None` when no session is running. Location errors, terminal
    /// or not, are reported but never end the session; only
    /// [`stop`](Self::stop) does.
    pub async fn next_event(&mut self) -> Option<TrackingEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let active = self.active.as_mut()?;
            let watching = active.watch.is_active();
            let input = tokio::select! {
                event = active.watch.next_event(), if watching => Input::Watch(event),
                elapsed = active.timer.tick() => Input::Tick(elapsed),
            };

            match input {
                Input::Watch(Some(event)) => self.on_watch_event(event),
                Input::Watch(None) => {}
                Input::Tick(elapsed_seconds) => {
                    active.draft.elapsed_seconds = elapsed_seconds;
                    self.emit(TrackingEvent::Tick { elapsed_seconds });
                }
            }
        }
    }

    fn on_watch_event(&mut self, event: WatchEvent) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let event = match event {
            WatchEvent::Sample(sample) => {
                let increment_meters = active.accumulator.push(sample);
                active.draft.path.push(sample);
                active.draft.distance_meters = active.accumulator.total_meters();
                debug!(
                    "Sample {} (+{:.2} m, total {:.2} m)",
                    sample, increment_meters, active.draft.distance_meters
                );
                TrackingEvent::Sample {
                    sample,
                    increment_meters,
                    distance_meters: active.draft.distance_meters,
                }
            }
            WatchEvent::Error(error) => TrackingEvent::LocationError {
                kind: error.kind,
                message: error.message,
                terminal: error.terminal,
            },
        };

        let from = active.reported_state;
        let to = active.watch.state();
        if from != to {
            active.reported_state = to;
            self.emit(TrackingEvent::StateChanged { from, to });
        }
        self.emit(event);
    }

    /// Stop recording and save the session.
    ///
    /// The location watch and the timer are released first. Sessions with
    /// fewer than two samples are discarded with [`Error::InsufficientData`]
    /// and never reach the store. Whatever the outcome, the controller is
    /// idle afterwards.
    pub async fn stop(&mut self) -> Result<CompletedSession> {
        let Some(active) = self.active.take() else {
            return Err(Error::invalid_state("stop", SessionPhase::Idle.as_str()));
        };
        let ActiveSession {
            mut watch,
            mut timer,
            draft,
            ..
        } = active;

        let state_before = watch.state();
        watch.release();
        drop(watch);
        timer.stop();
        self.pending.clear();

        let duration_seconds = self
            .clock
            .now()
            .saturating_duration_since(draft.started_at)
            .as_secs();
        if !state_before.is_terminal() {
            self.emit_broadcast(TrackingEvent::StateChanged {
                from: state_before,
                to: TrackingState::Stopped,
            });
        }

        let samples = draft.path.len();
        if samples < MIN_SAMPLES {
            warn!("Session stopped with {} sample(s); not saving", samples);
            self.emit_broadcast(TrackingEvent::Discarded { samples });
            return Err(Error::InsufficientData { samples });
        }

        let session = CompletedSession::new(draft.path, draft.distance_meters, duration_seconds);
        info!(
            "Session stopped: {:.2} m in {} s, saving",
            session.distance_meters(),
            session.duration_seconds()
        );

        match self.store.save(&session, &self.credential).await {
            Ok(()) => {
                info!("Session saved");
                self.emit_broadcast(TrackingEvent::Saved {
                    session: session.clone(),
                });
                Ok(session)
            }
            Err(e) => {
                warn!("Failed to save session: {}", e);
                self.emit_broadcast(TrackingEvent::SaveFailed {
                    session,
                    error: e.to_string(),
                });
                Err(Error::PersistenceFailure(e))
            }
        }
    }

    fn emit(&mut self, event: TrackingEvent) {
        self.events.send(event.clone());
        self.pending.push_back(event);
    }

    fn emit_broadcast(&self, event: TrackingEvent) {
        self.events.send(event);
    }
}
