//! Core types for jogging session data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// A single position fix, in WGS84 degrees.
///
/// Samples are kept in arrival order; nothing in the engine reorders them
/// once they have been ingested.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PositionSample {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl PositionSample {
    /// Create a sample from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for PositionSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Accuracy mode requested from the device location provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AccuracyMode {
    /// GNSS-grade precision; may be unavailable indoors or under cover.
    High,
    /// Relaxed precision (network/Wi-Fi assisted).
    Low,
}

impl AccuracyMode {
    /// Whether this is the high-accuracy mode.
    #[must_use]
    pub fn is_high(&self) -> bool {
        matches!(self, AccuracyMode::High)
    }
}

impl fmt::Display for AccuracyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccuracyMode::High => write!(f, "high accuracy"),
            AccuracyMode::Low => write!(f, "low accuracy"),
        }
    }
}

/// Kind of failure reported by the device location provider.
///
/// The numeric values follow the geolocation error codes most providers
/// use (1 = permission denied, 2 = position unavailable, 3 = timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum LocationErrorKind {
    /// Unrecognized provider error code.
    Unknown = 0,
    /// The user or platform refused access to location.
    PermissionDenied = 1,
    /// No position could be determined.
    PositionUnavailable = 2,
    /// The provider did not deliver a fix within the wait timeout.
    Timeout = 3,
}

impl From<u8> for LocationErrorKind {
    fn from(value: u8) -> Self {
        match value {
            1 => LocationErrorKind::PermissionDenied,
            2 => LocationErrorKind::PositionUnavailable,
            3 => LocationErrorKind::Timeout,
            _ => LocationErrorKind::Unknown,
        }
    }
}

impl fmt::Display for LocationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationErrorKind::Unknown => write!(f, "unknown location error"),
            LocationErrorKind::PermissionDenied => write!(f, "permission denied"),
            LocationErrorKind::PositionUnavailable => write!(f, "position unavailable"),
            LocationErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// State of the location acquisition for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrackingState {
    /// No subscription exists.
    Idle,
    /// Waiting for the first fix in high-accuracy mode.
    AcquiringHighAccuracy,
    /// Waiting for a fix after downgrading to low accuracy.
    AcquiringLowAccuracy,
    /// Fixes are flowing.
    Tracking,
    /// Terminal failure; the caller must restart tracking explicitly.
    Error(LocationErrorKind),
    /// The subscription was released by the caller.
    Stopped,
}

impl TrackingState {
    /// Whether the state is terminal (no further provider events are processed).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackingState::Error(_) | TrackingState::Stopped)
    }

    /// Whether the watch is still waiting for its first fix.
    #[must_use]
    pub fn is_acquiring(&self) -> bool {
        matches!(
            self,
            TrackingState::AcquiringHighAccuracy | TrackingState::AcquiringLowAccuracy
        )
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingState::Idle => write!(f, "idle"),
            TrackingState::AcquiringHighAccuracy => write!(f, "acquiring (high accuracy)"),
            TrackingState::AcquiringLowAccuracy => write!(f, "acquiring (low accuracy)"),
            TrackingState::Tracking => write!(f, "tracking"),
            TrackingState::Error(kind) => write!(f, "error: {}", kind),
            TrackingState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Average speed in meters per second.
///
/// A zero duration yields 0 rather than an infinite or NaN speed.
#[must_use]
pub fn average_speed(distance_meters: f64, duration_seconds: u64) -> f64 {
    if duration_seconds == 0 {
        0.0
    } else {
        distance_meters / duration_seconds as f64
    }
}

/// A finished jogging session, as sent to the backend.
///
/// Fields are private so a constructed session cannot be altered; the
/// average speed is derived from distance and duration at construction.
///
/// On the wire the session is
/// `{ "path": [{lat,lng}], "distance": m, "duration": s, "averageSpeed": m/s }`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompletedSession {
    #[cfg_attr(feature = "serde", serde(default))]
    path: Vec<PositionSample>,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "distance", default, deserialize_with = "null_as_default")
    )]
    distance_meters: f64,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "duration", default, deserialize_with = "null_as_default")
    )]
    duration_seconds: u64,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "averageSpeed", default, deserialize_with = "null_as_default")
    )]
    average_speed_mps: f64,
}

impl CompletedSession {
    /// Build a session from its recorded path, distance and duration.
    ///
    /// Negative or non-finite distances are clamped to 0.
    #[must_use]
    pub fn new(path: Vec<PositionSample>, distance_meters: f64, duration_seconds: u64) -> Self {
        let distance_meters = if distance_meters.is_finite() && distance_meters > 0.0 {
            distance_meters
        } else {
            0.0
        };
        Self {
            path,
            distance_meters,
            duration_seconds,
            average_speed_mps: average_speed(distance_meters, duration_seconds),
        }
    }

    /// The recorded path in arrival order.
    pub fn path(&self) -> &[PositionSample] {
        &self.path
    }

    /// Total distance in meters.
    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    /// Duration in whole seconds.
    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    /// Average speed in meters per second.
    pub fn average_speed_mps(&self) -> f64 {
        self.average_speed_mps
    }

    /// Last recorded position, if any.
    pub fn last_position(&self) -> Option<&PositionSample> {
        self.path.last()
    }
}

/// A session as listed by the backend history endpoint.
///
/// The backend adds its own identifier and recording date; older records may
/// lack numeric fields, which decode to 0.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StoredSession {
    /// Backend identifier.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "_id", default, skip_serializing_if = "Option::is_none")
    )]
    pub id: Option<String>,
    /// When the session was recorded.
    #[cfg_attr(
        feature = "serde",
        serde(
            default,
            with = "time::serde::rfc3339::option",
            skip_serializing_if = "Option::is_none"
        )
    )]
    pub date: Option<OffsetDateTime>,
    /// The session itself.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub session: CompletedSession,
}

impl StoredSession {
    /// Wrap a session without backend metadata.
    pub fn new(session: CompletedSession) -> Self {
        Self {
            id: None,
            date: None,
            session,
        }
    }
}

#[cfg(feature = "serde")]
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
