//! Live tracking engine for jogging sessions.
//!
//! This crate turns a device location stream into a recorded jogging
//! session: it acquires positions with graceful accuracy degradation,
//! accumulates great-circle distance, times the session from the wall clock,
//! hands the finished session to a backend, and pages through past sessions
//! on demand.
//!
//! # Features
//!
//! - **Location fallback**: high-accuracy watch, one automatic downgrade to low accuracy
//! - **Distance**: haversine accumulation over samples in arrival order
//! - **Timing**: one-second ticks whose value always comes from the clock
//! - **Session lifecycle**: `start`/`stop` with typed errors for misuse
//! - **Persistence**: one-shot save through a [`SessionStore`]
//! - **History**: cursor pagination driven by a [`VisibilitySensor`]
//! - **Events**: serializable [`TrackingEvent`]s and [`HistoryEvent`]s over broadcast channels
//!
//! # Components
//!
//! | Component | Module |
//! |-----------|--------|
//! | [`LocationWatchManager`] | [`location`] |
//! | [`DistanceAccumulator`] | [`distance`] |
//! | [`SessionTimer`] | [`timer`] |
//! | [`SessionController`] | [`session`] |
//! | [`SessionApiClient`](api_client::SessionApiClient) | `api_client` (feature `api-client`) |
//! | [`HistoryPaginator`] | [`history`] |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use jogtrack_core::api_client::SessionApiClient;
//! use jogtrack_core::{
//!     Config, Credential, LocationProvider, LocationWatchManager, SessionController,
//!     TrackingEvent,
//! };
//!
//! async fn record(provider: Arc<dyn LocationProvider>) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default()?;
//!     let manager = LocationWatchManager::new(provider, config.location.watch_options());
//!     let store = Arc::new(SessionApiClient::new(&config.api.base_url)?);
//!     let mut controller = SessionController::new(manager, store, Credential::new("token"));
//!
//!     controller.start()?;
//!     while let Some(event) = controller.next_event().await {
//!         if let TrackingEvent::Tick { elapsed_seconds: 600 } = event {
//!             break;
//!         }
//!     }
//!     let session = controller.stop().await?;
//!     println!("{:.2} m in {} s", session.distance_meters(), session.duration_seconds());
//!     Ok(())
//! }
//! ```

#[cfg(feature = "api-client")]
pub mod api_client;
pub mod backend;
pub mod config;
pub mod distance;
pub mod error;
pub mod events;
pub mod format;
pub mod history;
pub mod location;
pub mod mock;
pub mod provider;
pub mod session;
pub mod timer;
pub mod traits;
mod util;

// Re-export the types module from jogtrack-types
pub use jogtrack_types::types;

// Core exports
pub use backend::{Credential, SessionHistorySource, SessionStore};
pub use config::{Config, ConfigError, ValidationError};
pub use distance::{DistanceAccumulator, EARTH_RADIUS_METERS, add_sample, haversine_meters};
pub use error::{BackendError, Error, ErrorKind, RecoveryAction, Result};
pub use events::{EventDispatcher, HistoryEvent, TrackingEvent};
pub use history::{AttachedPaginator, FetchOutcome, HistoryPaginator, HistoryState};
pub use location::{
    LocationError, LocationWatch, LocationWatchManager, Transition, WatchEvent, WatchInput,
    transition,
};
pub use mock::{ManualClock, MockHistorySource, MockLocationProvider, MockSessionStore};
pub use provider::{
    ProviderEvent, ProviderFailure, ProviderSubscription, SubscriptionFeed, SubscriptionId,
    WatchOptions, subscription_channel,
};
pub use session::{SessionController, SessionDraft, SessionPhase};
pub use timer::{Clock, SessionTimer, TokioClock};
pub use traits::{LocationProvider, VisibilitySensor};

#[cfg(feature = "api-client")]
pub use api_client::SessionApiClient;

// Re-export from jogtrack-types
pub use jogtrack_types::{
    AccuracyMode, CompletedSession, LocationErrorKind, PositionSample, StoredSession,
    TrackingState, average_speed,
};
