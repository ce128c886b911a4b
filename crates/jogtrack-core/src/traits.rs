//! Trait abstractions for the device-side collaborators.
//!
//! [`LocationProvider`] abstracts the platform location service and
//! [`VisibilitySensor`] abstracts the viewport sentinel that drives history
//! loading. Both have test doubles in [`crate::mock`]; backend-side seams live
//! in [`crate::backend`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::provider::{ProviderSubscription, WatchOptions};

/// A device location service.
///
/// # Example
///
/// ```ignore
/// use jogtrack_core::{LocationProvider, WatchOptions};
///
/// fn first_watch<P: LocationProvider>(provider: &P) -> jogtrack_core::Result<()> {
///     let mut subscription = provider.watch(&WatchOptions::default())?;
///     subscription.cancel();
///     Ok(())
/// }
/// ```
pub trait LocationProvider: Send + Sync {
    /// Begin watching the device position.
    ///
    /// The returned subscription delivers fixes and failures until it is
    /// cancelled or dropped. Implementations return
    /// [`Error::NotSupported`](crate::Error::NotSupported) when the device has
    /// no location capability.
    fn watch(&self, options: &WatchOptions) -> Result<ProviderSubscription>;
}

/// A viewport sentinel reporting when the end of the history list is visible.
#[async_trait]
pub trait VisibilitySensor: Send + 'static {
    /// Wait until the sentinel becomes visible.
    ///
    /// Returns `false` once the sensor can no longer report anything.
    async fn visible(&mut self) -> bool;

    /// Stop observing. Later calls to [`visible`](Self::visible) return `false`.
    fn unobserve(&mut self);
}

/// Visibility changes delivered over a channel; `true` means visible.
#[async_trait]
impl VisibilitySensor for mpsc::Receiver<bool> {
    async fn visible(&mut self) -> bool {
        while let Some(visible) = self.recv().await {
            if visible {
                return true;
            }
        }
        false
    }

    fn unobserve(&mut self) {
        self.close();
    }
}
