//! Incremental loading of past sessions.
//!
//! [`HistoryPaginator`] walks the backend's session list one page at a time.
//! Each request is for the page under the cursor; a non-empty page is
//! appended and advances the cursor, an empty page ends pagination for good,
//! and a failure leaves everything as it was so the same page is requested
//! again on the next trigger.
//!
//! Triggers normally come from a [`VisibilitySensor`] via
//! [`HistoryPaginator::attach`]; [`HistoryPaginator::load_next`] is the
//! manual equivalent (used for "retry" buttons).
//!
//! Only one fetch runs at a time. Triggers arriving while a fetch is in
//! flight, or after the history is exhausted, return [`FetchOutcome::Ignored`]
//! without contacting the backend.

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::stream::{FuturesUnordered, Stream, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jogtrack_types::StoredSession;

use crate::backend::{Credential, SessionHistorySource};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, HistoryEvent};
use crate::traits::VisibilitySensor;
use crate::util::lock;

/// First page of the history list.
pub const FIRST_PAGE: u32 = 1;

/// Snapshot of the pagination state.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryState {
    /// Sessions loaded so far, in server order.
    pub loaded_sessions: Vec<StoredSession>,
    /// Next page to request.
    pub cursor: u32,
    /// Whether more pages may exist.
    pub has_more: bool,
    /// Whether a fetch is in flight.
    pub is_fetching: bool,
}

impl Default for HistoryState {
    fn default() -> Self {
        Self {
            loaded_sessions: Vec::new(),
            cursor: FIRST_PAGE,
            has_more: true,
            is_fetching: false,
        }
    }
}

/// Result of a single trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A non-empty page was appended.
    Loaded {
        /// The page that was fetched.
        page: u32,
        /// Number of sessions it contained.
        count: usize,
    },
    /// The page was empty; pagination is over.
    Exhausted {
        /// The empty page.
        page: u32,
    },
    /// A fetch was already in flight or the history is exhausted.
    Ignored,
}

struct Inner {
    source: Arc<dyn SessionHistorySource>,
    credential: Mutex<Credential>,
    state: Mutex<HistoryState>,
    events: EventDispatcher<HistoryEvent>,
}

/// Cursor-based pager over the session history.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct HistoryPaginator {
    inner: Arc<Inner>,
}

impl fmt::Debug for HistoryPaginator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("HistoryPaginator")
            .field("loaded", &state.loaded_sessions.len())
            .field("cursor", &state.cursor)
            .field("has_more", &state.has_more)
            .field("is_fetching", &state.is_fetching)
            .finish()
    }
}

/// Clears `is_fetching` however the fetch ends, including when the future
/// is dropped mid-request.
struct FetchGuard<'a> {
    state: &'a Mutex<HistoryState>,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).is_fetching = false;
    }
}

impl HistoryPaginator {
    /// Create a pager positioned at the first page.
    pub fn new(source: Arc<dyn SessionHistorySource>, credential: Credential) -> Self {
        Self::with_events(source, credential, EventDispatcher::default())
    }

    /// Create a pager that broadcasts through the given dispatcher.
    pub fn with_events(
        source: Arc<dyn SessionHistorySource>,
        credential: Credential,
        events: EventDispatcher<HistoryEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                credential: Mutex::new(credential),
                state: Mutex::new(HistoryState::default()),
                events,
            }),
        }
    }

    /// Replace the credential used for later fetches.
    pub fn set_credential(&self, credential: Credential) {
        *lock(&self.inner.credential) = credential;
    }

    /// Subscribe to pagination events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<HistoryEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> HistoryState {
        lock(&self.inner.state).clone()
    }

    /// Sessions loaded so far.
    pub fn loaded_sessions(&self) -> Vec<StoredSession> {
        lock(&self.inner.state).loaded_sessions.clone()
    }

    /// Next page to request.
    pub fn cursor(&self) -> u32 {
        lock(&self.inner.state).cursor
    }

    /// Whether more pages may exist.
    pub fn has_more(&self) -> bool {
        lock(&self.inner.state).has_more
    }

    /// Whether a fetch is in flight.
    pub fn is_fetching(&self) -> bool {
        lock(&self.inner.state).is_fetching
    }

    /// Fetch the page under the cursor.
    ///
    /// Returns [`FetchOutcome::Ignored`] when a fetch is already in flight or
    /// the history is exhausted. A failed fetch returns
    /// [`Error::FetchFailure`] and leaves the cursor where it was.
    pub async fn load_next(&self) -> Result<FetchOutcome> {
        let page = {
            let mut state = lock(&self.inner.state);
            if state.is_fetching || !state.has_more {
                debug!(
                    "History trigger ignored (fetching: {}, has_more: {})",
                    state.is_fetching, state.has_more
                );
                return Ok(FetchOutcome::Ignored);
            }
            state.is_fetching = true;
            state.cursor
        };
        let _guard = FetchGuard {
            state: &self.inner.state,
        };

        let credential = lock(&self.inner.credential).clone();
        debug!("Fetching history page {}", page);
        let result = self.inner.source.fetch_page(page, &credential).await;

        match result {
            Ok(sessions) if sessions.is_empty() => {
                {
                    let mut state = lock(&self.inner.state);
                    state.has_more = false;
                    state.is_fetching = false;
                }
                info!("History exhausted at page {}", page);
                self.inner.events.send(HistoryEvent::Exhausted { page });
                Ok(FetchOutcome::Exhausted { page })
            }
            Ok(sessions) => {
                let count = sessions.len();
                {
                    let mut state = lock(&self.inner.state);
                    state.loaded_sessions.extend(sessions.iter().cloned());
                    state.cursor = page + 1;
                    state.is_fetching = false;
                }
                debug!("Loaded {} session(s) from page {}", count, page);
                self.inner
                    .events
                    .send(HistoryEvent::PageLoaded { page, sessions });
                Ok(FetchOutcome::Loaded { page, count })
            }
            Err(e) => {
                lock(&self.inner.state).is_fetching = false;
                warn!("Failed to fetch history page {}: {}", page, e);
                self.inner.events.send(HistoryEvent::FetchFailed {
                    page,
                    error: e.to_string(),
                });
                Err(Error::FetchFailure { page, source: e })
            }
        }
    }

    /// Drive pagination from a visibility sensor.
    ///
    /// Every time the sensor reports the sentinel visible, a
    /// [`load_next`](Self::load_next) is issued on a background task.
    /// Outcomes other than [`FetchOutcome::Ignored`] are delivered through
    /// the returned handle. The sensor is unobserved when the history is
    /// exhausted, when it closes, or when the handle is detached or dropped.
    ///
    /// Must be called within a tokio runtime.
    pub fn attach<S: VisibilitySensor>(&self, mut sensor: S) -> AttachedPaginator {
        let (tx, rx) = mpsc::channel(16);
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let paginator = self.clone();

        let handle = tokio::spawn(async move {
            let mut in_flight = FuturesUnordered::new();
            let mut sensor_open = true;

            loop {
                if in_flight.is_empty() && (!sensor_open || !paginator.has_more()) {
                    break;
                }

                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("History sensor detached");
                        break;
                    }
                    visible = sensor.visible(), if sensor_open => {
                        if visible {
                            let paginator = paginator.clone();
                            in_flight.push(async move { paginator.load_next().await });
                        } else {
                            debug!("History visibility sensor closed");
                            sensor_open = false;
                        }
                    }
                    Some(result) = in_flight.next() => {
                        if matches!(result, Ok(FetchOutcome::Ignored)) {
                            continue;
                        }
                        if tx.send(result).await.is_err() {
                            break;
                        }
                    }
                }
            }

            sensor.unobserve();
        });

        AttachedPaginator {
            receiver: rx,
            handle,
            cancel_token,
        }
    }
}

/// Handle to a paginator driven by a visibility sensor.
///
/// Dropping the handle detaches the sensor.
pub struct AttachedPaginator {
    receiver: mpsc::Receiver<Result<FetchOutcome>>,
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl fmt::Debug for AttachedPaginator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedPaginator")
            .field("running", &self.is_running())
            .finish()
    }
}

impl AttachedPaginator {
    /// Wait for the next fetch outcome.
    ///
    /// Returns `None` once the sensor is detached and no fetch is pending.
    pub async fn next_outcome(&mut self) -> Option<Result<FetchOutcome>> {
        self.receiver.recv().await
    }

    /// Whether the background task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop observing the sensor and wait for the background task to finish.
    pub async fn detach(mut self) {
        self.cancel_token.cancel();
        // Aborting would skip `unobserve`; the task exits promptly on cancel.
        let _ = (&mut self.handle).await;
    }
}

impl Drop for AttachedPaginator {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Stream for AttachedPaginator {
    type Item = Result<FetchOutcome>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{MockHistorySource, stored_session};

    fn page(prefix: &str, count: usize) -> Vec<StoredSession> {
        (1..=count)
            .map(|i| stored_session(&format!("{}{}", prefix, i), 1000.0, 600))
            .collect()
    }

    fn paginator(source: &Arc<MockHistorySource>) -> HistoryPaginator {
        HistoryPaginator::new(source.clone(), Credential::new("token"))
    }

    #[tokio::test]
    async fn test_initial_state() {
        let source = Arc::new(MockHistorySource::new());
        let paginator = paginator(&source);
        let state = paginator.state();
        assert_eq!(state.cursor, 1);
        assert!(state.has_more);
        assert!(!state.is_fetching);
        assert!(state.loaded_sessions.is_empty());
    }

    #[tokio::test]
    async fn test_pages_until_empty() {
        let source = Arc::new(MockHistorySource::with_pages(vec![
            page("a", 5),
            page("b", 3),
        ]));
        let paginator = paginator(&source);

        assert_eq!(
            paginator.load_next().await.unwrap(),
            FetchOutcome::Loaded { page: 1, count: 5 }
        );
        assert_eq!(
            paginator.load_next().await.unwrap(),
            FetchOutcome::Loaded { page: 2, count: 3 }
        );
        assert_eq!(
            paginator.load_next().await.unwrap(),
            FetchOutcome::Exhausted { page: 3 }
        );

        let ids: Vec<_> = paginator
            .loaded_sessions()
            .into_iter()
            .filter_map(|s| s.id)
            .collect();
        assert_eq!(ids, ["a1", "a2", "a3", "a4", "a5", "b1", "b2", "b3"]);
        assert!(!paginator.has_more());
        assert_eq!(paginator.cursor(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_triggers_issue_no_fetch() {
        let source = Arc::new(MockHistorySource::new());
        let paginator = paginator(&source);

        assert_eq!(
            paginator.load_next().await.unwrap(),
            FetchOutcome::Exhausted { page: 1 }
        );
        assert_eq!(paginator.load_next().await.unwrap(), FetchOutcome::Ignored);
        assert_eq!(paginator.load_next().await.unwrap(), FetchOutcome::Ignored);
        assert_eq!(source.request_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_retries_same_page() {
        let source = Arc::new(MockHistorySource::with_pages(vec![page("a", 5), page("b", 2)]));
        let paginator = paginator(&source);
        paginator.load_next().await.unwrap();

        source.fail_next(2).await;
        let err = paginator.load_next().await.unwrap_err();
        assert!(matches!(err, Error::FetchFailure { page: 2, .. }));
        assert_eq!(paginator.cursor(), 2);
        assert!(paginator.has_more());
        assert!(!paginator.is_fetching());
        assert_eq!(paginator.loaded_sessions().len(), 5);

        assert_eq!(
            paginator.load_next().await.unwrap(),
            FetchOutcome::Loaded { page: 2, count: 2 }
        );
        assert_eq!(source.requests().await, vec![1, 2, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_trigger_is_ignored() {
        let source = Arc::new(MockHistorySource::with_pages(vec![page("a", 5)]));
        source.set_latency(Duration::from_millis(200));
        let paginator = paginator(&source);

        let (first, second) = tokio::join!(paginator.load_next(), paginator.load_next());
        assert_eq!(first.unwrap(), FetchOutcome::Loaded { page: 1, count: 5 });
        assert_eq!(second.unwrap(), FetchOutcome::Ignored);
        assert_eq!(source.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_fetch_clears_flag() {
        let source = Arc::new(MockHistorySource::with_pages(vec![page("a", 5)]));
        source.set_latency(Duration::from_secs(10));
        let paginator = paginator(&source);

        let result =
            tokio::time::timeout(Duration::from_millis(50), paginator.load_next()).await;
        assert!(result.is_err());
        assert!(!paginator.is_fetching());
        assert_eq!(paginator.cursor(), 1);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let source = Arc::new(MockHistorySource::with_pages(vec![page("a", 2)]));
        let paginator = paginator(&source);
        let mut events = paginator.subscribe_events();

        paginator.load_next().await.unwrap();
        paginator.load_next().await.unwrap();

        match events.recv().await.unwrap() {
            HistoryEvent::PageLoaded { page, sessions } => {
                assert_eq!(page, 1);
                assert_eq!(sessions.len(), 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(
            events.recv().await.unwrap(),
            HistoryEvent::Exhausted { page: 2 }
        );
    }

    #[tokio::test]
    async fn test_attached_sensor_drives_fetches() {
        let source = Arc::new(MockHistorySource::with_pages(vec![page("a", 5), page("b", 3)]));
        let paginator = paginator(&source);
        let (visibility, sensor) = mpsc::channel(8);
        let mut attached = paginator.attach(sensor);

        visibility.send(true).await.unwrap();
        assert_eq!(
            attached.next_outcome().await.unwrap().unwrap(),
            FetchOutcome::Loaded { page: 1, count: 5 }
        );
        visibility.send(false).await.unwrap();
        visibility.send(true).await.unwrap();
        assert_eq!(
            attached.next_outcome().await.unwrap().unwrap(),
            FetchOutcome::Loaded { page: 2, count: 3 }
        );
        visibility.send(true).await.unwrap();
        assert_eq!(
            attached.next_outcome().await.unwrap().unwrap(),
            FetchOutcome::Exhausted { page: 3 }
        );

        // Exhaustion unobserves the sensor and ends the handle.
        assert!(attached.next_outcome().await.is_none());
        assert!(visibility.send(true).await.is_err());
        assert_eq!(paginator.loaded_sessions().len(), 8);
    }

    #[tokio::test]
    async fn test_detach_unobserves_sensor() {
        let source = Arc::new(MockHistorySource::with_pages(vec![page("a", 5)]));
        let paginator = paginator(&source);
        let (visibility, sensor) = mpsc::channel(8);
        let attached = paginator.attach(sensor);

        attached.detach().await;
        assert!(visibility.send(true).await.is_err());
        assert_eq!(source.request_count(), 0);
    }

    #[tokio::test]
    async fn test_detach_after_loading_stops_further_fetches() {
        let source = Arc::new(MockHistorySource::with_pages(vec![page("a", 5), page("b", 5)]));
        let paginator = paginator(&source);
        let (visibility, sensor) = mpsc::channel(8);
        let mut attached = paginator.attach(sensor);

        visibility.send(true).await.unwrap();
        assert_eq!(
            attached.next_outcome().await.unwrap().unwrap(),
            FetchOutcome::Loaded { page: 1, count: 5 }
        );
        assert!(attached.is_running());

        attached.detach().await;
        assert!(visibility.send(true).await.is_err());
        assert_eq!(source.request_count(), 1);
        assert_eq!(paginator.cursor(), 2);
        assert!(paginator.has_more());
    }

    #[tokio::test]
    async fn test_attached_failure_is_delivered() {
        let source = Arc::new(MockHistorySource::with_pages(vec![page("a", 5)]));
        source.fail_next(1).await;
        let paginator = paginator(&source);
        let (visibility, sensor) = mpsc::channel(8);
        let mut attached = paginator.attach(sensor);

        visibility.send(true).await.unwrap();
        assert!(matches!(
            attached.next_outcome().await.unwrap(),
            Err(Error::FetchFailure { page: 1, .. })
        ));

        visibility.send(true).await.unwrap();
        assert_eq!(
            attached.next_outcome().await.unwrap().unwrap(),
            FetchOutcome::Loaded { page: 1, count: 5 }
        );
    }
}
