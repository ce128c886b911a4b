//! End-to-end session recording against the mock provider and store.
//!
//! Runs on paused tokio time so wall-clock durations are exact.

use std::sync::Arc;
use std::time::Duration;

use jogtrack_core::{
    Credential, Error, LocationErrorKind, LocationWatchManager, MockLocationProvider,
    MockSessionStore, SessionController, SessionPhase, TrackingEvent, TrackingState, WatchOptions,
    format,
};

struct Harness {
    provider: Arc<MockLocationProvider>,
    store: Arc<MockSessionStore>,
    controller: SessionController,
}

fn harness(options: WatchOptions) -> Harness {
    let provider = Arc::new(MockLocationProvider::new());
    let store = Arc::new(MockSessionStore::new());
    let manager = LocationWatchManager::new(provider.clone(), options);
    let controller = SessionController::new(manager, store.clone(), Credential::new("jwt"));
    Harness {
        provider,
        store,
        controller,
    }
}

/// Pull events until the pushed sample has been ingested.
async fn ingest(harness: &mut Harness, lat: f64, lng: f64) {
    assert!(harness.provider.push_position(lat, lng));
    loop {
        match harness.controller.next_event().await {
            Some(TrackingEvent::Sample { sample, .. }) if sample.lat == lat && sample.lng == lng => {
                return;
            }
            Some(_) => continue,
            None => panic!("session ended before the sample arrived"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn records_and_saves_a_ten_second_run() {
    let mut h = harness(WatchOptions::default());
    h.controller.start().unwrap();

    ingest(&mut h, 0.0, 0.0).await;
    tokio::time::advance(Duration::from_secs(5)).await;
    ingest(&mut h, 0.0, 0.001).await;
    tokio::time::advance(Duration::from_secs(5)).await;
    ingest(&mut h, 0.0, 0.002).await;

    let draft = h.controller.draft().unwrap();
    assert_eq!(format::format_distance_km(draft.distance_meters()), "0.22 km");

    let session = h.controller.stop().await.unwrap();
    assert_eq!(session.duration_seconds(), 10);
    assert!((session.distance_meters() - 222.64).abs() < 0.5);
    assert!((session.average_speed_mps() - 22.264).abs() < 0.05);

    let saved = h.store.saved_sessions().await;
    assert_eq!(saved.len(), 1);
    let body = serde_json::to_value(&saved[0]).unwrap();
    assert_eq!(body["duration"], 10);
    assert_eq!(body["path"].as_array().unwrap().len(), 3);
    assert_eq!(body["path"][2]["lng"], 0.002);
    assert!(body["averageSpeed"].as_f64().unwrap() > 22.0);

    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert_eq!(h.provider.active_watches(), 0);
}

#[tokio::test(start_paused = true)]
async fn broadcast_events_follow_the_lifecycle() {
    let mut h = harness(WatchOptions::default());
    let mut events = h.controller.subscribe_events();
    h.controller.start().unwrap();

    ingest(&mut h, 10.0, 10.0).await;
    ingest(&mut h, 10.0, 10.0).await;
    h.controller.stop().await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert_eq!(received[0], TrackingEvent::Started { high_accuracy: true });
    assert_eq!(
        received[1],
        TrackingEvent::StateChanged {
            from: TrackingState::Idle,
            to: TrackingState::AcquiringHighAccuracy,
        }
    );
    assert_eq!(
        received[2],
        TrackingEvent::StateChanged {
            from: TrackingState::AcquiringHighAccuracy,
            to: TrackingState::Tracking,
        }
    );
    // Identical consecutive samples add nothing.
    assert!(matches!(
        received[4],
        TrackingEvent::Sample { increment_meters, distance_meters, .. }
            if increment_meters == 0.0 && distance_meters == 0.0
    ));
    assert_eq!(
        received[received.len() - 2],
        TrackingEvent::StateChanged {
            from: TrackingState::Tracking,
            to: TrackingState::Stopped,
        }
    );
    assert!(matches!(received.last(), Some(TrackingEvent::Saved { .. })));
}

#[tokio::test(start_paused = true)]
async fn accuracy_fallback_then_terminal_failure_keeps_recording() {
    let mut h = harness(WatchOptions::default());
    h.controller.start().unwrap();

    h.provider
        .push_failure(LocationErrorKind::PositionUnavailable, "");
    loop {
        if let Some(TrackingEvent::LocationError { terminal, .. }) = h.controller.next_event().await
        {
            assert!(!terminal);
            break;
        }
    }
    assert_eq!(h.controller.tracking_state(), TrackingState::AcquiringLowAccuracy);
    assert!(!h.provider.watch_options(1).unwrap().high_accuracy);

    // Fixes keep flowing on the low-accuracy watch.
    ingest(&mut h, 1.0, 1.0).await;
    ingest(&mut h, 1.0, 1.0001).await;

    h.provider
        .push_failure(LocationErrorKind::PositionUnavailable, "");
    loop {
        if let Some(TrackingEvent::LocationError { terminal, .. }) = h.controller.next_event().await
        {
            assert!(terminal);
            break;
        }
    }
    assert_eq!(
        h.controller.tracking_state(),
        TrackingState::Error(LocationErrorKind::PositionUnavailable)
    );
    assert_eq!(h.provider.watch_count(), 2);
    assert_eq!(h.controller.phase(), SessionPhase::Tracking);

    tokio::time::advance(Duration::from_secs(3)).await;
    let session = h.controller.stop().await.unwrap();
    assert_eq!(session.path().len(), 2);
    assert_eq!(session.duration_seconds(), 3);
}

#[tokio::test(start_paused = true)]
async fn zero_duration_session_has_zero_speed() {
    let mut h = harness(WatchOptions::default());
    h.controller.start().unwrap();

    ingest(&mut h, 0.0, 0.0).await;
    ingest(&mut h, 0.0, 0.001).await;

    let session = h.controller.stop().await.unwrap();
    assert_eq!(session.duration_seconds(), 0);
    assert_eq!(session.average_speed_mps(), 0.0);
    assert!(session.distance_meters() > 100.0);
}

#[tokio::test(start_paused = true)]
async fn short_session_is_discarded_and_store_untouched() {
    let mut h = harness(WatchOptions::default());
    let mut events = h.controller.subscribe_events();
    h.controller.start().unwrap();
    ingest(&mut h, 0.0, 0.0).await;

    let err = h.controller.stop().await.unwrap_err();
    assert!(matches!(err, Error::InsufficientData { samples: 1 }));
    assert_eq!(h.store.save_calls(), 0);

    let mut discarded = false;
    while let Ok(event) = events.try_recv() {
        discarded |= event == TrackingEvent::Discarded { samples: 1 };
    }
    assert!(discarded);
}

#[tokio::test(start_paused = true)]
async fn failed_save_can_be_followed_by_a_new_session() {
    let mut h = harness(WatchOptions::default());
    h.store.set_transient_failures(1);

    h.controller.start().unwrap();
    ingest(&mut h, 0.0, 0.0).await;
    ingest(&mut h, 0.0, 0.001).await;
    let err = h.controller.stop().await.unwrap_err();
    assert!(matches!(err, Error::PersistenceFailure(_)));
    assert_eq!(h.controller.phase(), SessionPhase::Idle);

    h.controller.start().unwrap();
    ingest(&mut h, 0.0, 0.0).await;
    ingest(&mut h, 0.001, 0.0).await;
    h.controller.stop().await.unwrap();

    assert_eq!(h.store.save_calls(), 2);
    assert_eq!(h.store.saved_sessions().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn emergency_link_uses_latest_position() {
    let mut h = harness(WatchOptions::default());
    assert!(format::emergency_share_url(h.controller.last_position()).is_err());

    h.controller.start().unwrap();
    ingest(&mut h, 48.8566, 2.3522).await;

    let url = format::emergency_share_url(h.controller.last_position()).unwrap();
    assert!(url.starts_with("https://wa.me/?text=Emergency%21"));
    assert!(url.ends_with("48.8566%2C2.3522"));
}

#[tokio::test(start_paused = true)]
async fn lost_location_source_is_reported_and_session_can_still_stop() {
    let mut h = harness(WatchOptions::default());
    h.controller.start().unwrap();
    ingest(&mut h, 0.0, 0.0).await;
    ingest(&mut h, 0.0, 0.001).await;

    h.provider.end_watch(0);
    let mut state_change = None;
    loop {
        match h.controller.next_event().await {
            Some(TrackingEvent::StateChanged { from, to }) => state_change = Some((from, to)),
            Some(TrackingEvent::LocationError { kind, terminal, .. }) => {
                assert_eq!(kind, LocationErrorKind::Unknown);
                assert!(terminal);
                break;
            }
            Some(_) => continue,
            None => panic!("session ended before the error was reported"),
        }
    }
    assert_eq!(
        state_change,
        Some((
            TrackingState::Tracking,
            TrackingState::Error(LocationErrorKind::Unknown)
        ))
    );
    assert_eq!(h.controller.phase(), SessionPhase::Tracking);

    let session = h.controller.stop().await.unwrap();
    assert_eq!(session.path().len(), 2);
}
