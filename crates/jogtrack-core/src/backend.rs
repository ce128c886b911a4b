//! Backend session API seams.
//!
//! The engine never talks HTTP directly. Finished sessions go through a
//! [`SessionStore`] and history pages come from a [`SessionHistorySource`];
//! [`SessionApiClient`](crate::api_client::SessionApiClient) implements both
//! against the REST backend, and [`crate::mock`] provides scripted doubles.

use std::fmt;

use async_trait::async_trait;

use jogtrack_types::{CompletedSession, StoredSession};

use crate::error::BackendError;

/// Opaque bearer credential issued by the authentication collaborator.
///
/// The token is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    pub fn token(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Persists finished sessions.
///
/// One attempt per call. Failures are returned verbatim; nothing is queued
/// for a later resend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Submit a finished session on behalf of the credential's owner.
    async fn save(
        &self,
        session: &CompletedSession,
        credential: &Credential,
    ) -> Result<(), BackendError>;
}

/// Serves previously recorded sessions one page at a time.
#[async_trait]
pub trait SessionHistorySource: Send + Sync {
    /// Fetch page `page` (1-based), newest sessions first.
    ///
    /// An empty page means there is nothing further.
    async fn fetch_page(
        &self,
        page: u32,
        credential: &Credential,
    ) -> Result<Vec<StoredSession>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("eyJhbGciOiJIUzI1NiJ9.secret");
        let debug = format!("{:?}", credential);
        assert_eq!(debug, "Credential(***)");
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_credential_bearer_header() {
        let credential = Credential::new("abc");
        assert_eq!(credential.token(), "abc");
        assert_eq!(credential.bearer_header(), "Bearer abc");
    }
}
