//! Display helpers for sessions and live metrics.

use time::OffsetDateTime;
use time::macros::format_description;

use jogtrack_types::{PositionSample, StoredSession};

use crate::error::{Error, Result};

/// Distance in kilometers with two decimals, e.g. `"1.50 km"`.
pub fn format_distance_km(meters: f64) -> String {
    let meters = if meters.is_finite() { meters } else { 0.0 };
    format!("{:.2} km", meters / 1000.0)
}

/// Speed in meters per second with two decimals, e.g. `"2.50 m/s"`.
pub fn format_speed(mps: f64) -> String {
    let mps = if mps.is_finite() { mps } else { 0.0 };
    format!("{:.2} m/s", mps)
}

/// Elapsed time as `H:MM:SS`.
pub fn format_elapsed(seconds: u64) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Recording date as `YYYY-MM-DD HH:MM` (UTC), or `"Unknown Date"`.
pub fn format_date(date: Option<OffsetDateTime>) -> String {
    date.and_then(|date| {
        date.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
            .ok()
    })
    .unwrap_or_else(|| "Unknown Date".to_string())
}

/// One-line summary of a history entry.
pub fn session_summary(stored: &StoredSession) -> String {
    let session = &stored.session;
    format!(
        "{} | {} | {} | {}",
        format_date(stored.date),
        format_distance_km(session.distance_meters()),
        format_elapsed(session.duration_seconds()),
        format_speed(session.average_speed_mps())
    )
}

/// Map link for a position.
pub fn map_url(position: &PositionSample) -> String {
    format!("https://maps.google.com/?q={},{}", position.lat, position.lng)
}

/// Share link carrying an emergency message with the runner's position.
///
/// Fails with [`Error::InsufficientData`] when no position was recorded.
pub fn emergency_share_url(last: Option<&PositionSample>) -> Result<String> {
    let position = last.ok_or(Error::InsufficientData { samples: 0 })?;
    let text = format!("Emergency! I am here: {}", map_url(position));
    Ok(format!("https://wa.me/?text={}", urlencoding::encode(&text)))
}
