//! Location acquisition with graceful accuracy degradation.
//!
//! [`LocationWatchManager`] opens watches on the device provider. Each
//! [`LocationWatch`] starts in high accuracy and, the first time the provider
//! reports that no position is available, re-subscribes once with high
//! accuracy disabled:
//!
//! ```text
//!                    sample                    sample
//! AcquiringHigh ───────────────► Tracking ◄─────────────── AcquiringLow
//!      │                          │  (high)                    ▲  │
//!      │ unavailable              │ unavailable                │  │ unavailable
//!      └──────────────────────────┴──────── re-watch ──────────┘  ▼
//!                                                      Error(PositionUnavailable)
//! ```
//!
//! Permission denied is terminal from every state. Timeouts and unknown
//! provider codes are reported but leave the subscription and state as they
//! are. The whole policy is the pure [`transition`] function.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use jogtrack_types::{AccuracyMode, LocationErrorKind, PositionSample, TrackingState};

use crate::error::{Error, RecoveryAction, Result};
use crate::provider::{ProviderEvent, ProviderFailure, ProviderSubscription, WatchOptions};
use crate::traits::LocationProvider;

/// Input to the fallback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchInput {
    /// The provider delivered a fix.
    Sample,
    /// The provider reported a failure of this kind.
    Failure(LocationErrorKind),
}

/// What the watch does in response to an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Forward the sample and move to `Tracking`.
    Track,
    /// Cancel the subscription and re-watch with high accuracy disabled.
    Downgrade,
    /// Release the subscription and enter `Error(kind)`.
    Fail(LocationErrorKind),
    /// Report the failure; state and subscription are unchanged.
    Report,
    /// The watch is no longer live; drop the input.
    Ignore,
}

/// The accuracy-fallback transition table.
///
/// A downgrade is only possible while the mode is [`AccuracyMode::High`], so
/// at most one happens per watch.
pub fn transition(state: TrackingState, mode: AccuracyMode, input: WatchInput) -> Transition {
    use LocationErrorKind as Kind;
    use TrackingState as State;

    match (state, input) {
        (State::Idle | State::Stopped | State::Error(_), _) => Transition::Ignore,
        (_, WatchInput::Sample) => Transition::Track,
        (_, WatchInput::Failure(Kind::PermissionDenied)) => {
            Transition::Fail(Kind::PermissionDenied)
        }
        (
            State::AcquiringHighAccuracy | State::Tracking,
            WatchInput::Failure(Kind::PositionUnavailable),
        ) if mode.is_high() => Transition::Downgrade,
        (_, WatchInput::Failure(Kind::PositionUnavailable)) => {
            Transition::Fail(Kind::PositionUnavailable)
        }
        (_, WatchInput::Failure(Kind::Timeout | Kind::Unknown)) => Transition::Report,
    }
}

/// Message used when the provider did not supply one.
pub fn default_message(kind: LocationErrorKind) -> &'static str {
    match kind {
        LocationErrorKind::PermissionDenied => {
            "Permission denied. Please allow location access in your device settings."
        }
        LocationErrorKind::PositionUnavailable => {
            "Location information is unavailable. Ensure location services are enabled and \
             try moving to an area with better GPS or Wi-Fi signal."
        }
        LocationErrorKind::Timeout => {
            "The request to get location timed out. Try again or check your connection."
        }
        LocationErrorKind::Unknown => "An unknown error occurred while getting location.",
    }
}

const FEED_CLOSED_MESSAGE: &str = "The location provider stopped delivering positions.";

/// A failure reported to the watch owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationError {
    /// Classified error kind.
    pub kind: LocationErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Whether the watch has stopped delivering samples.
    pub terminal: bool,
}

impl LocationError {
    fn from_failure(failure: ProviderFailure, terminal: bool) -> Self {
        let message = if failure.message.trim().is_empty() {
            default_message(failure.kind).to_string()
        } else {
            failure.message
        };
        Self {
            kind: failure.kind,
            message,
            terminal,
        }
    }

    /// Suggested recovery for this failure.
    pub fn recovery(&self) -> RecoveryAction {
        crate::error::ErrorKind::from(self.kind).recovery()
    }

    /// Convert into the crate error type.
    pub fn into_error(self) -> Error {
        Error::location(self.kind, self.message)
    }
}

impl fmt::Display for LocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Event delivered by a [`LocationWatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A position fix, forwarded unchanged.
    Sample(PositionSample),
    /// A provider failure after the fallback policy was applied.
    Error(LocationError),
}

/// Opens location watches with the configured options.
#[derive(Clone)]
pub struct LocationWatchManager {
    provider: Arc<dyn LocationProvider>,
    options: WatchOptions,
}

impl fmt::Debug for LocationWatchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationWatchManager")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl LocationWatchManager {
    /// Create a manager for the given provider.
    pub fn new(provider: Arc<dyn LocationProvider>, options: WatchOptions) -> Self {
        Self { provider, options }
    }

    /// The options used for new watches.
    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// Start watching the device position.
    ///
    /// The watch begins in high accuracy unless the options disable it, in
    /// which case it starts directly in low accuracy with no fallback left.
    pub fn subscribe(&self) -> Result<LocationWatch> {
        self.options.validate()?;

        let mode = if self.options.high_accuracy {
            AccuracyMode::High
        } else {
            AccuracyMode::Low
        };
        let subscription = self.provider.watch(&self.options)?;
        let state = match mode {
            AccuracyMode::High => TrackingState::AcquiringHighAccuracy,
            AccuracyMode::Low => TrackingState::AcquiringLowAccuracy,
        };
        info!(
            "Location watch {} started in {}",
            subscription.id(),
            mode
        );

        Ok(LocationWatch {
            provider: Arc::clone(&self.provider),
            options: self.options.clone(),
            subscription: Some(subscription),
            state,
            mode,
        })
    }

    /// Release a watch. Equivalent to dropping it.
    pub fn unsubscribe(&self, mut watch: LocationWatch) {
        watch.release();
    }
}

/// A live location watch.
///
/// Owns the provider subscription; releasing or dropping the watch cancels
/// it, after which no provider event is observed.
pub struct LocationWatch {
    provider: Arc<dyn LocationProvider>,
    options: WatchOptions,
    subscription: Option<ProviderSubscription>,
    state: TrackingState,
    mode: AccuracyMode,
}

impl fmt::Debug for LocationWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationWatch")
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("subscription", &self.subscription)
            .finish()
    }
}

impl LocationWatch {
    /// Current acquisition state.
    pub fn state(&self) -> TrackingState {
        self.state
    }

    /// Accuracy mode of the live subscription.
    pub fn mode(&self) -> AccuracyMode {
        self.mode
    }

    /// Whether a provider subscription is still open.
    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Wait for the next sample or error.
    ///
    /// A provider that closes its feed ends the watch with a terminal
    /// [`LocationErrorKind::Unknown`] error. Returns `None` once the watch
    /// holds no subscription: after release or after a terminal error.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        loop {
            let subscription = self.subscription.as_mut()?;
            match subscription.next_event().await {
                Some(event) => {
                    if let Some(event) = self.apply(event) {
                        return Some(event);
                    }
                }
                None => return Some(WatchEvent::Error(self.on_feed_closed())),
            }
        }
    }

    /// Apply one provider event to the state machine.
    ///
    /// Returns the event to surface, if any.
    pub fn apply(&mut self, event: ProviderEvent) -> Option<WatchEvent> {
        match event {
            ProviderEvent::Position(sample) => {
                match transition(self.state, self.mode, WatchInput::Sample) {
                    Transition::Ignore => None,
                    _ => {
                        if self.state != TrackingState::Tracking {
                            info!("Location fix acquired in {}", self.mode);
                            self.state = TrackingState::Tracking;
                        }
                        Some(WatchEvent::Sample(sample))
                    }
                }
            }
            ProviderEvent::Failure(failure) => self.on_failure(failure),
        }
    }

    fn on_failure(&mut self, failure: ProviderFailure) -> Option<WatchEvent> {
        let kind = failure.kind;
        match transition(self.state, self.mode, WatchInput::Failure(kind)) {
            Transition::Ignore => None,
            Transition::Track | Transition::Report => {
                let error = LocationError::from_failure(failure, false);
                warn!("Location provider reported {} (transient)", error);
                Some(WatchEvent::Error(error))
            }
            Transition::Fail(kind) => {
                self.cancel_subscription();
                self.state = TrackingState::Error(kind);
                let error = LocationError::from_failure(failure, true);
                warn!("Location watch failed: {}", error);
                Some(WatchEvent::Error(error))
            }
            Transition::Downgrade => Some(WatchEvent::Error(self.downgrade(failure))),
        }
    }

    fn downgrade(&mut self, failure: ProviderFailure) -> LocationError {
        self.cancel_subscription();
        self.mode = AccuracyMode::Low;
        self.options.high_accuracy = false;

        match self.provider.watch(&self.options) {
            Ok(subscription) => {
                info!(
                    "Position unavailable; retrying with low accuracy as watch {}",
                    subscription.id()
                );
                self.subscription = Some(subscription);
                self.state = TrackingState::AcquiringLowAccuracy;
                LocationError::from_failure(failure, false)
            }
            Err(e) => {
                warn!("Low-accuracy re-watch failed: {}", e);
                self.state = TrackingState::Error(LocationErrorKind::PositionUnavailable);
                let mut error = LocationError::from_failure(failure, true);
                error.message = format!("{} ({})", error.message, e);
                error
            }
        }
    }

    fn on_feed_closed(&mut self) -> LocationError {
        self.cancel_subscription();
        self.state = TrackingState::Error(LocationErrorKind::Unknown);
        let error = LocationError {
            kind: LocationErrorKind::Unknown,
            message: FEED_CLOSED_MESSAGE.to_string(),
            terminal: true,
        };
        warn!("Location watch failed: {}", error);
        error
    }

    fn cancel_subscription(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }

    /// Release the provider subscription and enter `Stopped`.
    ///
    /// A watch that already failed keeps its `Error` state. Releasing twice
    /// is a no-op.
    pub fn release(&mut self) {
        if self.subscription.is_some() {
            debug!("Releasing location watch");
        }
        self.cancel_subscription();
        if !matches!(self.state, TrackingState::Error(_)) {
            self.state = TrackingState::Stopped;
        }
    }
}

impl Drop for LocationWatch {
    fn drop(&mut self) {
        self.cancel_subscription();
    }
}
