//! Platform-agnostic types for jogging session tracking.
//!
//! This crate holds the plain data shared by the tracking engine
//! (`jogtrack-core`) and anything that talks to the session backend.
//!
//! # Features
//!
//! - Position samples and finished sessions
//! - Location acquisition state and error kinds
//! - The backend JSON wire shape (behind the default `serde` feature)
//!
//! # Example
//!
//! ```
//! use jogtrack_types::{CompletedSession, PositionSample};
//!
//! let path = vec![PositionSample::new(0.0, 0.0), PositionSample::new(0.0, 0.001)];
//! let session = CompletedSession::new(path, 111.2, 10);
//! assert!((session.average_speed_mps() - 11.12).abs() < 1e-9);
//! ```

pub mod types;

pub use types::{
    AccuracyMode, CompletedSession, LocationErrorKind, PositionSample, StoredSession,
    TrackingState, average_speed,
};
