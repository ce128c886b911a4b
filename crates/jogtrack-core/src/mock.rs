//! Test doubles for the engine's collaborators.
//!
//! Everything here drives the real engine code without a device, a GPS fix
//! or a backend:
//!
//! - [`ManualClock`]: a [`Clock`] that only moves when told to
//! - [`MockLocationProvider`]: records watches and lets tests push fixes and failures
//! - [`MockSessionStore`]: records saved sessions, with failure injection
//! - [`MockHistorySource`]: serves scripted history pages, with failure injection
//!   and simulated latency

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use jogtrack_types::{CompletedSession, LocationErrorKind, PositionSample, StoredSession};

use crate::backend::{Credential, SessionHistorySource, SessionStore};
use crate::error::{BackendError, Error, Result};
use crate::provider::{
    DEFAULT_BUFFER_SIZE, ProviderEvent, ProviderFailure, ProviderSubscription, SubscriptionFeed,
    WatchOptions, subscription_channel,
};
use crate::timer::Clock;
use crate::traits::LocationProvider;
use crate::util::lock;

/// A clock that advances only when [`advance`](Self::advance) is called.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }

    /// Total time advanced since creation.
    pub fn offset(&self) -> Duration {
        *lock(&self.offset)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *lock(&self.offset)
    }
}

struct WatchRecord {
    options: WatchOptions,
    feed: Option<SubscriptionFeed>,
    cancel_token: CancellationToken,
}

/// A scripted device location provider.
///
/// Every [`watch`](LocationProvider::watch) call is recorded. Events pushed
/// by the test go to the most recent watch.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use jogtrack_core::{LocationWatchManager, MockLocationProvider, WatchEvent, WatchOptions};
///
/// #[tokio::main]
/// async fn main() {
///     let provider = Arc::new(MockLocationProvider::new());
///     let manager = LocationWatchManager::new(provider.clone(), WatchOptions::default());
///     let mut watch = manager.subscribe().unwrap();
///
///     provider.push_position(51.5, -0.12);
///     assert!(matches!(watch.next_event().await, Some(WatchEvent::Sample(_))));
/// }
/// ```
pub struct MockLocationProvider {
    watches: Mutex<Vec<WatchRecord>>,
    unsupported: AtomicBool,
}

impl std::fmt::Debug for MockLocationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLocationProvider")
            .field("watch_count", &self.watch_count())
            .field("active_watches", &self.active_watches())
            .field("unsupported", &self.unsupported.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLocationProvider {
    /// Create a provider with no watches.
    pub fn new() -> Self {
        Self {
            watches: Mutex::new(Vec::new()),
            unsupported: AtomicBool::new(false),
        }
    }

    /// Make subsequent `watch` calls fail with [`Error::NotSupported`].
    pub fn set_unsupported(&self, unsupported: bool) {
        self.unsupported.store(unsupported, Ordering::Relaxed);
    }

    /// Push an event to the most recent watch.
    ///
    /// Returns `false` when there is no watch or it was cancelled.
    pub fn push_event(&self, event: ProviderEvent) -> bool {
        match self.latest_feed() {
            Some(feed) => feed.try_send(event),
            None => false,
        }
    }

    /// Push a position fix to the most recent watch.
    pub fn push_position(&self, lat: f64, lng: f64) -> bool {
        self.push_event(ProviderEvent::Position(PositionSample::new(lat, lng)))
    }

    /// Push a failure to the most recent watch.
    pub fn push_failure(&self, kind: LocationErrorKind, message: &str) -> bool {
        self.push_event(ProviderEvent::Failure(ProviderFailure::new(kind, message)))
    }

    /// Feed of the most recent watch, unless it was ended.
    pub fn latest_feed(&self) -> Option<SubscriptionFeed> {
        lock(&self.watches)
            .last()
            .and_then(|record| record.feed.clone())
    }

    /// Drop the provider side of the `index`-th watch, as a platform does
    /// when its location service goes away.
    pub fn end_watch(&self, index: usize) {
        if let Some(record) = lock(&self.watches).get_mut(index) {
            record.feed = None;
        }
    }

    /// Number of `watch` calls that succeeded.
    pub fn watch_count(&self) -> usize {
        lock(&self.watches).len()
    }

    /// Options passed to the `index`-th watch.
    pub fn watch_options(&self, index: usize) -> Option<WatchOptions> {
        lock(&self.watches)
            .get(index)
            .map(|record| record.options.clone())
    }

    /// Whether the `index`-th watch was cancelled by its consumer.
    pub fn is_cancelled(&self, index: usize) -> bool {
        lock(&self.watches)
            .get(index)
            .is_some_and(|record| record.cancel_token.is_cancelled())
    }

    /// Number of watches not yet cancelled.
    pub fn active_watches(&self) -> usize {
        lock(&self.watches)
            .iter()
            .filter(|record| !record.cancel_token.is_cancelled())
            .count()
    }
}

impl LocationProvider for MockLocationProvider {
    fn watch(&self, options: &WatchOptions) -> Result<ProviderSubscription> {
        if self.unsupported.load(Ordering::Relaxed) {
            return Err(Error::NotSupported);
        }
        let (feed, subscription) = subscription_channel(DEFAULT_BUFFER_SIZE);
        lock(&self.watches).push(WatchRecord {
            options: options.clone(),
            feed: Some(feed),
            cancel_token: subscription.cancellation_token(),
        });
        Ok(subscription)
    }
}

/// A recording session store.
#[derive(Debug, Default)]
pub struct MockSessionStore {
    saved: RwLock<Vec<CompletedSession>>,
    credentials: RwLock<Vec<Credential>>,
    failure: RwLock<Option<(u16, String)>>,
    save_calls: AtomicU32,
    remaining_failures: AtomicU32,
    latency_ms: AtomicU64,
}

impl MockSessionStore {
    /// Create a store that accepts every session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every save with the given status and message.
    pub async fn fail_with(&self, status: u16, message: &str) {
        *self.failure.write().await = Some((status, message.to_string()));
    }

    /// Accept saves again.
    pub async fn clear_failure(&self) {
        *self.failure.write().await = None;
    }

    /// Reject the next `count` saves with a 503, then accept.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Delay every save by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of `save` calls, successful or not.
    pub fn save_calls(&self) -> u32 {
        self.save_calls.load(Ordering::Relaxed)
    }

    /// Sessions accepted so far.
    pub async fn saved_sessions(&self) -> Vec<CompletedSession> {
        self.saved.read().await.clone()
    }

    /// Credential passed to the most recent `save` call.
    pub async fn last_credential(&self) -> Option<Credential> {
        self.credentials.read().await.last().cloned()
    }
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn save(
        &self,
        session: &CompletedSession,
        credential: &Credential,
    ) -> std::result::Result<(), BackendError> {
        self.save_calls.fetch_add(1, Ordering::Relaxed);
        self.credentials.write().await.push(credential.clone());

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(BackendError::Api {
                status: 503,
                message: "Service unavailable".to_string(),
            });
        }
        if let Some((status, message)) = self.failure.read().await.clone() {
            return Err(BackendError::Api { status, message });
        }

        self.saved.write().await.push(session.clone());
        Ok(())
    }
}

/// A history source serving scripted pages.
///
/// Pages that were never scripted come back empty, which ends pagination.
#[derive(Debug, Default)]
pub struct MockHistorySource {
    pages: RwLock<HashMap<u32, Vec<StoredSession>>>,
    failing_pages: RwLock<HashSet<u32>>,
    requests: RwLock<Vec<u32>>,
    request_count: AtomicU32,
    latency_ms: AtomicU64,
}

impl MockHistorySource {
    /// Create a source with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source serving `pages[0]` as page 1, `pages[1]` as page 2, and so on.
    pub fn with_pages(pages: Vec<Vec<StoredSession>>) -> Self {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, sessions)| (index as u32 + 1, sessions))
            .collect();
        Self {
            pages: RwLock::new(pages),
            ..Self::default()
        }
    }

    /// Replace the sessions served for `page`.
    pub async fn set_page(&self, page: u32, sessions: Vec<StoredSession>) {
        self.pages.write().await.insert(page, sessions);
    }

    /// Fail the next request for `page` with a 500.
    pub async fn fail_next(&self, page: u32) {
        self.failing_pages.write().await.insert(page);
    }

    /// Delay every fetch by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Pages requested so far, in request order.
    pub async fn requests(&self) -> Vec<u32> {
        self.requests.read().await.clone()
    }

    /// Number of fetches issued.
    pub fn request_count(&self) -> u32 {
        self.request_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SessionHistorySource for MockHistorySource {
    async fn fetch_page(
        &self,
        page: u32,
        _credential: &Credential,
    ) -> std::result::Result<Vec<StoredSession>, BackendError> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.requests.write().await.push(page);

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.failing_pages.write().await.remove(&page) {
            return Err(BackendError::Api {
                status: 500,
                message: "Server Error".to_string(),
            });
        }

        Ok(self
            .pages
            .read()
            .await
            .get(&page)
            .cloned()
            .unwrap_or_default())
    }
}

/// A stored session with a recognizable id, for history tests.
pub fn stored_session(id: &str, distance_meters: f64, duration_seconds: u64) -> StoredSession {
    let path = vec![PositionSample::new(0.0, 0.0), PositionSample::new(0.0, 0.001)];
    let mut stored = StoredSession::new(CompletedSession::new(
        path,
        distance_meters,
        duration_seconds,
    ));
    stored.id = Some(id.to_string());
    stored
}
