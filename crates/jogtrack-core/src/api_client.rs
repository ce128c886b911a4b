//! HTTP client for the session backend REST API.
//!
//! [`SessionApiClient`] implements [`SessionStore`] and
//! [`SessionHistorySource`] against:
//!
//! - `POST {base}/sessions` with the session JSON body
//! - `GET {base}/sessions?page=N`, newest first, `[]` past the last page
//!
//! Both send `Authorization: Bearer <token>`. Error bodies of the form
//! `{"error": "..."}` are surfaced as [`BackendError::Api`].
//!
//! # Example
//!
//! ```no_run
//! use jogtrack_core::api_client::SessionApiClient;
//! use jogtrack_core::backend::{Credential, SessionHistorySource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SessionApiClient::new("http://localhost:5000/api")?;
//! let credential = Credential::new("token");
//!
//! let first_page = client.fetch_page(1, &credential).await?;
//! println!("{} session(s)", first_page.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use jogtrack_types::{CompletedSession, StoredSession};

use crate::backend::{Credential, SessionHistorySource, SessionStore};
use crate::error::BackendError;
use crate::util::normalize_base_url;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

type Result<T> = std::result::Result<T, BackendError>;

/// HTTP client for the session backend.
#[derive(Debug, Clone)]
pub struct SessionApiClient {
    client: Client,
    base_url: String,
}

impl SessionApiClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The API root, including any path prefix (e.g. "http://localhost:5000/api")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::NotReachable {
                url: base_url.to_string(),
                source: Box::new(e),
            })?;
        Self::with_client(base_url, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        let base_url = normalize_base_url(base_url).ok_or_else(|| {
            BackendError::InvalidUrl(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            ))
        })?;
        Ok(Self { client, base_url })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn sessions_url(&self) -> String {
        format!("{}/sessions", self.base_url)
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse(e.to_string()))
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: Response) -> BackendError {
        let status = response.status();
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or_else(|| status.to_string());

        BackendError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl SessionStore for SessionApiClient {
    async fn save(&self, session: &CompletedSession, credential: &Credential) -> Result<()> {
        let url = self.sessions_url();
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, credential.bearer_header())
            .json(session)
            .send()
            .await
            .map_err(|e| BackendError::NotReachable {
                url: url.clone(),
                source: Box::new(e),
            })?;

        if response.status().is_success() {
            // The body echoes the stored record; nothing in it is needed.
            Ok(())
        } else {
            Err(Self::api_error(response).await)
        }
    }
}

#[async_trait]
impl SessionHistorySource for SessionApiClient {
    async fn fetch_page(&self, page: u32, credential: &Credential) -> Result<Vec<StoredSession>> {
        let url = self.sessions_url();
        debug!("GET {}?page={}", url, page);
        let response = self
            .client
            .get(&url)
            .query(&[("page", page)])
            .header(reqwest::header::AUTHORIZATION, credential.bearer_header())
            .send()
            .await
            .map_err(|e| BackendError::NotReachable {
                url: url.clone(),
                source: Box::new(e),
            })?;

        Self::handle_response(response).await
    }
}
