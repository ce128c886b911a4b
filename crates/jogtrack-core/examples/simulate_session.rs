//! Record a short simulated run and page through the resulting history.
//!
//! Run with: `cargo run -p jogtrack-core --example simulate_session`
//!
//! Set `RUST_LOG=jogtrack_core=trace` for more detail.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use jogtrack_core::{
    Config, Credential, HistoryPaginator, LocationErrorKind, LocationWatchManager,
    MockHistorySource, MockLocationProvider, MockSessionStore, SessionController, StoredSession,
    TrackingEvent, format,
};

/// Points along the Seine, roughly 60 m apart.
const ROUTE: &[(f64, f64)] = &[
    (48.85837, 2.29448),
    (48.85870, 2.29510),
    (48.85903, 2.29572),
    (48.85936, 2.29634),
    (48.85969, 2.29696),
    (48.86002, 2.29758),
    (48.86035, 2.29820),
    (48.86068, 2.29882),
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("jogtrack_core=debug".parse()?),
        )
        .init();

    let config = Config::default();
    let provider = Arc::new(MockLocationProvider::new());
    let store = Arc::new(MockSessionStore::new());
    let manager = LocationWatchManager::new(provider.clone(), config.location.watch_options());
    let mut controller = SessionController::new(manager, store.clone(), Credential::new("demo"))
        .with_events(config.events.dispatcher());

    controller.start()?;
    println!("Recording ({})", controller.tracking_state());

    // The high-accuracy fix never arrives; the watch falls back and carries on.
    let feeder = {
        let provider = provider.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            provider.push_failure(LocationErrorKind::PositionUnavailable, "");
            for &(lat, lng) in ROUTE {
                tokio::time::sleep(Duration::from_millis(700)).await;
                provider.push_position(lat, lng);
            }
        })
    };

    let deadline = tokio::time::sleep(Duration::from_secs(6));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = controller.next_event() => match event {
                Some(TrackingEvent::Tick { elapsed_seconds }) => {
                    let distance = controller.draft().map(|d| d.distance_meters()).unwrap_or(0.0);
                    println!(
                        "  {}  {}",
                        format::format_elapsed(elapsed_seconds),
                        format::format_distance_km(distance)
                    );
                }
                Some(TrackingEvent::StateChanged { from, to }) => println!("  {from} -> {to}"),
                Some(TrackingEvent::LocationError { message, terminal, .. }) => {
                    println!("  location error ({}): {message}", if terminal { "terminal" } else { "retrying" });
                }
                Some(_) => {}
                None => break,
            },
        }
    }
    feeder.abort();

    if let Ok(url) = format::emergency_share_url(controller.last_position()) {
        println!("Share link: {url}");
    }

    let session = controller.stop().await?;
    println!(
        "Saved: {} in {} at {}",
        format::format_distance_km(session.distance_meters()),
        format::format_elapsed(session.duration_seconds()),
        format::format_speed(session.average_speed_mps())
    );

    // Serve what the store accepted as page one of the history.
    let saved: Vec<StoredSession> = store
        .saved_sessions()
        .await
        .into_iter()
        .map(StoredSession::new)
        .collect();
    let history = HistoryPaginator::new(
        Arc::new(MockHistorySource::with_pages(vec![saved])),
        Credential::new("demo"),
    );
    while history.has_more() {
        history.load_next().await?;
    }
    println!("History:");
    for stored in history.loaded_sessions() {
        println!("  {}", format::session_summary(&stored));
    }

    Ok(())
}
