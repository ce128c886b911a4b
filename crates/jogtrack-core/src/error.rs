//! Error types for jogtrack-core.
//!
//! # Recovery Strategies
//!
//! Every error maps to an [`ErrorKind`] and a [`RecoveryAction`] so a UI can
//! offer the right next step instead of a generic failure message.
//!
//! | Error | Terminal? | Recovery |
//! |-------|-----------|----------|
//! | [`Error::PermissionDenied`] | Yes | Ask the user to grant location access |
//! | [`Error::PositionUnavailable`] | After the accuracy downgrade | Retry acquisition (move outdoors) |
//! | [`Error::Timeout`] | No | Keep waiting; the provider retries on its own |
//! | [`Error::NotSupported`] | Yes | No location provider on this device |
//! | [`Error::InsufficientData`] | n/a | Record longer before stopping |
//! | [`Error::PersistenceFailure`] | n/a | Retry the save manually (no resend queue) |
//! | [`Error::FetchFailure`] | n/a | Retry the same history page |
//! | [`Error::InvalidState`] | n/a | Caller bug: fix the start/stop sequencing |
//!
//! Location errors reported while a session is running never stop the
//! session by themselves; the caller decides whether to stop or restart.

use thiserror::Error;

use jogtrack_types::LocationErrorKind;

/// Errors produced by the tracking engine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Location access was refused.
    #[error("Location permission denied: {message}")]
    PermissionDenied {
        /// Human-readable detail.
        message: String,
    },

    /// No position could be determined, even after relaxing accuracy.
    #[error("Position unavailable: {message}")]
    PositionUnavailable {
        /// Human-readable detail.
        message: String,
    },

    /// The provider did not deliver a fix in time.
    #[error("Location request timed out: {message}")]
    Timeout {
        /// Human-readable detail.
        message: String,
    },

    /// The provider reported an error code it did not classify.
    #[error("Location error: {message}")]
    UnknownLocation {
        /// Human-readable detail.
        message: String,
    },

    /// No location provider is present.
    #[error("Location tracking is not supported: no location provider available")]
    NotSupported,

    /// Too few samples were recorded to make a session.
    #[error("Insufficient data to save session: {samples} position sample(s), need at least 2")]
    InsufficientData {
        /// Number of samples recorded.
        samples: usize,
    },

    /// The backend did not accept the finished session.
    #[error("Failed to save session: {0}")]
    PersistenceFailure(#[source] BackendError),

    /// A history page could not be fetched.
    #[error("Failed to fetch history page {page}: {source}")]
    FetchFailure {
        /// The page that was requested.
        page: u32,
        /// The underlying backend error.
        #[source]
        source: BackendError,
    },

    /// A lifecycle operation was called in the wrong state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The state the controller was in.
        state: &'static str,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors returned by the session backend collaborator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("Backend not reachable at {url}: {source}")]
    NotReachable {
        /// The URL that was requested.
        url: String,
        /// Transport-level cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend answered with a non-success status.
    #[error("Backend rejected request ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the `error` field of the body, or the status text.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    /// The configured base URL is unusable.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl BackendError {
    /// Whether the backend rejected the credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BackendError::Api { status: 401, .. })
    }
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum ErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    UnknownLocation,
    NotSupported,
    InsufficientData,
    PersistenceFailure,
    FetchFailure,
    InvalidState,
    InvalidConfig,
}

/// What the caller should offer the user after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum RecoveryAction {
    /// Grant location access in the platform settings, then start again.
    GrantPermission,
    /// Restart acquisition, ideally somewhere with better sky view.
    RetryAcquisition,
    /// Nothing to do; the provider keeps trying.
    KeepWaiting,
    /// Use a device that has a location provider.
    UseSupportedDevice,
    /// Record more of the run before stopping.
    KeepRecording,
    /// Try saving the session again.
    RetrySave,
    /// Request the same history page again.
    RetryFetch,
    /// Fix the calling code.
    FixUsage,
    /// Fix the configuration file.
    FixConfiguration,
}

impl ErrorKind {
    /// Suggested recovery for this kind of error.
    pub fn recovery(&self) -> RecoveryAction {
        match self {
            ErrorKind::PermissionDenied => RecoveryAction::GrantPermission,
            ErrorKind::PositionUnavailable | ErrorKind::UnknownLocation => {
                RecoveryAction::RetryAcquisition
            }
            ErrorKind::Timeout => RecoveryAction::KeepWaiting,
            ErrorKind::NotSupported => RecoveryAction::UseSupportedDevice,
            ErrorKind::InsufficientData => RecoveryAction::KeepRecording,
            ErrorKind::PersistenceFailure => RecoveryAction::RetrySave,
            ErrorKind::FetchFailure => RecoveryAction::RetryFetch,
            ErrorKind::InvalidState => RecoveryAction::FixUsage,
            ErrorKind::InvalidConfig => RecoveryAction::FixConfiguration,
        }
    }
}

impl From<LocationErrorKind> for ErrorKind {
    fn from(kind: LocationErrorKind) -> Self {
        match kind {
            LocationErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            LocationErrorKind::PositionUnavailable => ErrorKind::PositionUnavailable,
            LocationErrorKind::Timeout => ErrorKind::Timeout,
            LocationErrorKind::Unknown => ErrorKind::UnknownLocation,
        }
    }
}

impl Error {
    /// Build the error matching a provider failure.
    pub fn location(kind: LocationErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            LocationErrorKind::PermissionDenied => Error::PermissionDenied { message },
            LocationErrorKind::PositionUnavailable => Error::PositionUnavailable { message },
            LocationErrorKind::Timeout => Error::Timeout { message },
            LocationErrorKind::Unknown => Error::UnknownLocation { message },
        }
    }

    /// Create a lifecycle violation error.
    pub fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        Error::InvalidState { operation, state }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Error::PositionUnavailable { .. } => ErrorKind::PositionUnavailable,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::UnknownLocation { .. } => ErrorKind::UnknownLocation,
            Error::NotSupported => ErrorKind::NotSupported,
            Error::InsufficientData { .. } => ErrorKind::InsufficientData,
            Error::PersistenceFailure(_) => ErrorKind::PersistenceFailure,
            Error::FetchFailure { .. } => ErrorKind::FetchFailure,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Suggested recovery for this error.
    pub fn recovery(&self) -> RecoveryAction {
        self.kind().recovery()
    }
}

/// Result type alias using jogtrack-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InsufficientData { samples: 1 };
        assert!(err.to_string().contains("1 position sample"));

        let err = Error::invalid_state("stop", "idle");
        assert_eq!(err.to_string(), "Cannot stop while idle");

        let err = Error::NotSupported;
        assert!(err.to_string().contains("not supported"));

        let err = Error::FetchFailure {
            page: 3,
            source: BackendError::Api {
                status: 500,
                message: "boom".to_string(),
            },
        };
        assert!(err.to_string().contains("page 3"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_location_constructor_maps_kind() {
        let err = Error::location(LocationErrorKind::PermissionDenied, "denied");
        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err = Error::location(LocationErrorKind::Timeout, "slow");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("slow"));
    }

    #[test]
    fn test_recovery_actions() {
        assert_eq!(
            Error::location(LocationErrorKind::PermissionDenied, "").recovery(),
            RecoveryAction::GrantPermission
        );
        assert_eq!(
            Error::location(LocationErrorKind::PositionUnavailable, "").recovery(),
            RecoveryAction::RetryAcquisition
        );
        assert_eq!(
            Error::location(LocationErrorKind::Timeout, "").recovery(),
            RecoveryAction::KeepWaiting
        );
        assert_eq!(
            Error::InsufficientData { samples: 0 }.recovery(),
            RecoveryAction::KeepRecording
        );
        assert_eq!(
            Error::PersistenceFailure(BackendError::InvalidResponse("x".into())).recovery(),
            RecoveryAction::RetrySave
        );
    }

    #[test]
    fn test_backend_error_unauthorized() {
        let err = BackendError::Api {
            status: 401,
            message: "Token is not valid".to_string(),
        };
        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("Token is not valid"));

        let err = BackendError::Api {
            status: 500,
            message: "Internal".to_string(),
        };
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_backend_error_source_chain() {
        use std::error::Error as _;

        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = Error::PersistenceFailure(BackendError::NotReachable {
            url: "http://localhost:5000/api/sessions".to_string(),
            source: Box::new(io_err),
        });
        let source = err.source().expect("persistence failure has a source");
        assert!(source.to_string().contains("refused"));
    }
}
