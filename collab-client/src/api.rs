//! Session management over HTTP.
//!
//! Three stateless calls against the collaboration API:
//!
//! - `POST /collaboration/sessions`
//! - `GET /collaboration/sessions/{id}`
//! - `POST /collaboration/sessions/{id}/invitations`
//!
//! Each has a `try_*` form returning [`ApiError`] and a plain form that logs
//! the failure and returns `None`. Nothing is retried.

use std::sync::Arc;

use collab_core::{
    api_endpoint, CollaborationSession, CreateSessionRequest, Invitation, InvitationRequest,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::config::ClientConfig;
use crate::metrics;

/// Longest response body kept in [`ApiError::Status`].
const MAX_ERROR_BODY: usize = 1024;

/// Errors returned by the `try_*` calls of [`SessionApi`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// The endpoint URL could not be built.
    #[error("invalid collaboration API URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed (connection, timeout, etc.).
    #[error("collaboration API request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-2xx status.
    #[error("collaboration API returned {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body, truncated.
        body: String,
    },
    /// The response body was not the expected JSON.
    #[error("failed to parse collaboration API payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Returns true for failures that may succeed if repeated: transport
    /// errors and 5xx statuses.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { code, .. } => *code >= 500,
            Self::InvalidUrl(_) | Self::Json(_) => false,
        }
    }

    const fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_url",
            Self::Http(_) => "transport",
            Self::Status { .. } => "status",
            Self::Json(_) => "decode",
        }
    }
}

/// HTTP client for session management.
#[derive(Clone)]
pub struct SessionApi {
    inner: Arc<InnerApi>,
}

struct InnerApi {
    http: Client,
    base: Url,
    auth_token: Option<String>,
}

impl std::fmt::Debug for SessionApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionApi")
            .field("base", &self.inner.base.as_str())
            .field("authenticated", &self.inner.auth_token.is_some())
            .finish()
    }
}

impl SessionApi {
    /// Build a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the HTTP client fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            inner: Arc::new(InnerApi {
                http: builder.build()?,
                base: config.api_url.clone(),
                auth_token: config.auth_token.clone(),
            }),
        })
    }

    /// Create a session.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn try_create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CollaborationSession, ApiError> {
        let url = self.endpoint("create_session", &["collaboration", "sessions"])?;
        self.execute("create_session", self.inner.http.post(url).json(request))
            .await
    }

    /// Create a session, logging failures.
    pub async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Option<CollaborationSession> {
        log_failure("create_session", self.try_create_session(request).await)
    }

    /// Fetch a session snapshot.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn try_get_session(
        &self,
        session_id: &str,
    ) -> Result<CollaborationSession, ApiError> {
        let url = self.endpoint("get_session", &["collaboration", "sessions", session_id])?;
        self.execute("get_session", self.inner.http.get(url)).await
    }

    /// Fetch a session snapshot, logging failures.
    pub async fn get_session(&self, session_id: &str) -> Option<CollaborationSession> {
        log_failure("get_session", self.try_get_session(session_id).await)
    }

    /// Invite someone to a session.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn try_invite_participant(
        &self,
        session_id: &str,
        invitation: &InvitationRequest,
    ) -> Result<Invitation, ApiError> {
        let url = self.endpoint(
            "invite_participant",
            &["collaboration", "sessions", session_id, "invitations"],
        )?;
        self.execute(
            "invite_participant",
            self.inner.http.post(url).json(invitation),
        )
        .await
    }

    /// Invite someone to a session, logging failures.
    pub async fn invite_participant(
        &self,
        session_id: &str,
        invitation: &InvitationRequest,
    ) -> Option<Invitation> {
        log_failure(
            "invite_participant",
            self.try_invite_participant(session_id, invitation).await,
        )
    }

    fn endpoint(&self, endpoint: &'static str, segments: &[&str]) -> Result<Url, ApiError> {
        api_endpoint(&self.inner.base, segments).map_err(|e| {
            let err = ApiError::InvalidUrl(e.to_string());
            metrics::record_http_request(endpoint, err.outcome());
            err
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        mut request: RequestBuilder,
    ) -> Result<T, ApiError> {
        if let Some(token) = &self.inner.auth_token {
            request = request.bearer_auth(token);
        }

        let result = match request.send().await {
            Ok(response) => decode(response).await,
            Err(e) => Err(ApiError::Http(e)),
        };

        metrics::record_http_request(
            endpoint,
            result.as_ref().map_or_else(ApiError::outcome, |_| "success"),
        );
        result
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let mut body = String::from_utf8_lossy(&bytes).into_owned();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(ApiError::Status {
            code: status.as_u16(),
            body,
        });
    }

    Ok(serde_json::from_slice(&bytes)?)
}

fn log_failure<T>(operation: &str, result: Result<T, ApiError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(
                operation,
                retryable = e.is_retryable(),
                "Collaboration API call failed: {}",
                e
            );
            None
        }
    }
}
