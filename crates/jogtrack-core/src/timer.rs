//! Wall-clock session timing.
//!
//! [`SessionTimer`] ticks once per second, but the reported value is always
//! recomputed from the clock (`floor(now - start)`), so late or coalesced
//! ticks never make the elapsed time drift.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::debug;

/// Source of the current instant.
///
/// The engine never calls `Instant::now()` directly so tests can substitute
/// a manually driven clock (see [`crate::mock::ManualClock`]).
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by tokio's time source (virtual when the runtime is paused).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Tick period of the session timer.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Elapsed-time ticker for a running session.
///
/// The timer is the handle: it is created by [`SessionTimer::start`] and the
/// periodic tick is released by [`SessionTimer::stop`] (or by dropping it).
pub struct SessionTimer {
    clock: Arc<dyn Clock>,
    started_at: Instant,
    ticker: Option<Interval>,
}

impl fmt::Debug for SessionTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTimer")
            .field("started_at", &self.started_at)
            .field("running", &self.is_running())
            .finish()
    }
}

impl SessionTimer {
    /// Start timing from the clock's current instant.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("Session timer started");
        Self {
            clock,
            started_at,
            ticker: Some(ticker),
        }
    }

    /// The instant the timer was started.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Whole seconds elapsed since start, according to the clock.
    pub fn elapsed_seconds(&self) -> u64 {
        self.clock
            .now()
            .saturating_duration_since(self.started_at)
            .as_secs()
    }

    /// Whether the periodic tick is still active.
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Wait for the next tick and return the elapsed seconds at that moment.
    ///
    /// After [`stop`](Self::stop) this never completes, so it can sit in a
    /// `select!` next to other event sources.
    pub async fn tick(&mut self) -> u64 {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
                self.elapsed_seconds()
            }
            None => std::future::pending().await,
        }
    }

    /// Release the periodic tick. Stopping twice is a no-op.
    pub fn stop(&mut self) {
        if self.ticker.take().is_some() {
            debug!(
                "Session timer stopped after {}s",
                self.elapsed_seconds()
            );
        }
    }
}
