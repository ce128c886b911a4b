//! Push-source model of a device location provider.
//!
//! A provider turns a [`LocationProvider::watch`](crate::traits::LocationProvider::watch)
//! call into a [`ProviderSubscription`]: a channel of [`ProviderEvent`]s paired
//! with a cancellation token. The provider keeps the matching
//! [`SubscriptionFeed`] and pushes fixes and failures into it until the
//! subscription is cancelled.
//!
//! Cancelling (or dropping) the subscription closes the channel, so no event
//! queued by the provider can be observed after release.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use jogtrack_types::{LocationErrorKind, PositionSample};

use crate::error::{Error, Result};

/// Options passed to the device provider for one watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    /// Request high-accuracy (GNSS) fixes.
    pub high_accuracy: bool,
    /// Oldest cached fix the provider may hand back.
    pub max_sample_age: Duration,
    /// How long the provider waits for a fix before reporting a timeout.
    pub wait_timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            max_sample_age: Duration::from_millis(1000),
            wait_timeout: Duration::from_millis(20_000),
        }
    }
}

impl WatchOptions {
    /// Same options with a different accuracy mode.
    #[must_use]
    pub fn with_high_accuracy(mut self, high_accuracy: bool) -> Self {
        self.high_accuracy = high_accuracy;
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.wait_timeout.is_zero() {
            return Err(Error::invalid_config("wait_timeout must be > 0"));
        }
        Ok(())
    }
}

/// Failure reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Classified error kind.
    pub kind: LocationErrorKind,
    /// Provider message; may be empty.
    pub message: String,
}

impl ProviderFailure {
    /// Create a failure of the given kind.
    pub fn new(kind: LocationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a failure from a raw provider error code.
    pub fn from_code(code: u8, message: impl Into<String>) -> Self {
        Self::new(LocationErrorKind::from(code), message)
    }
}

/// Event delivered by a provider subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// A new position fix.
    Position(PositionSample),
    /// The provider could not deliver a fix.
    Failure(ProviderFailure),
}

/// Identifier of a provider subscription, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Default buffer size for provider channels.
pub const DEFAULT_BUFFER_SIZE: usize = 64;

/// Create a connected feed/subscription pair.
///
/// Providers call this from their `watch` implementation, keep the feed and
/// return the subscription.
pub fn subscription_channel(buffer_size: usize) -> (SubscriptionFeed, ProviderSubscription) {
    let (sender, receiver) = mpsc::channel(buffer_size.max(1));
    let cancel_token = CancellationToken::new();
    let id = SubscriptionId::next();
    (
        SubscriptionFeed {
            id,
            sender,
            cancel_token: cancel_token.clone(),
        },
        ProviderSubscription {
            id,
            receiver,
            cancel_token,
        },
    )
}

/// Provider-side half of a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionFeed {
    id: SubscriptionId,
    sender: mpsc::Sender<ProviderEvent>,
    cancel_token: CancellationToken,
}

impl SubscriptionFeed {
    /// The subscription this feed belongs to.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Push an event, waiting for buffer space. Returns `false` once the
    /// subscription has been cancelled.
    pub async fn send(&self, event: ProviderEvent) -> bool {
        if self.cancel_token.is_cancelled() {
            return false;
        }
        self.sender.send(event).await.is_ok()
    }

    /// Push an event without waiting. Returns `false` when cancelled or full.
    pub fn try_send(&self, event: ProviderEvent) -> bool {
        if self.cancel_token.is_cancelled() {
            return false;
        }
        self.sender.try_send(event).is_ok()
    }

    /// Whether the consumer cancelled the subscription.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves when the consumer cancels; providers use this to stop the
    /// platform watch.
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await
    }
}

/// Consumer-side handle of a provider watch.
///
/// The handle is the only way to receive events for this watch. Dropping it
/// cancels the watch.
pub struct ProviderSubscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<ProviderEvent>,
    cancel_token: CancellationToken,
}

impl fmt::Debug for ProviderSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSubscription")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl ProviderSubscription {
    /// Identifier of this watch.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receive the next event. Returns `None` once cancelled or when the
    /// provider dropped its feed.
    pub async fn next_event(&mut self) -> Option<ProviderEvent> {
        if self.cancel_token.is_cancelled() {
            return None;
        }
        self.receiver.recv().await
    }

    /// Cancel the watch. Events still queued are discarded.
    pub fn cancel(&mut self) {
        if !self.cancel_token.is_cancelled() {
            debug!("Cancelling provider subscription {}", self.id);
            self.cancel_token.cancel();
        }
        self.receiver.close();
    }

    /// Whether the watch has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// A token that cancels this watch when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

impl Drop for ProviderSubscription {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Stream for ProviderSubscription {
    type Item = ProviderEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel_token.is_cancelled() {
            return Poll::Ready(None);
        }
        self.receiver.poll_recv(cx)
    }
}
