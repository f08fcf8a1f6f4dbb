//! Client configuration.
//!
//! Values come from code, from the environment ([`ClientConfig::from_env`])
//! or from the CLI flags in `collab-cli`.

use std::time::Duration;

use collab_core::ReconnectPolicy;
use thiserror::Error;
use url::Url;

/// API base used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

/// Environment variable holding the API base URL.
pub const ENV_API_URL: &str = "COLLAB_API_URL";
/// Environment variable holding the bearer token.
pub const ENV_TOKEN: &str = "COLLAB_TOKEN";
/// Environment variable holding the reconnect delay unit in milliseconds.
pub const ENV_RECONNECT_BASE_MS: &str = "COLLAB_RECONNECT_BASE_MS";
/// Environment variable holding the reconnect attempt ceiling.
pub const ENV_RECONNECT_MAX_ATTEMPTS: &str = "COLLAB_RECONNECT_MAX_ATTEMPTS";
/// Environment variable holding the HTTP request timeout in seconds.
pub const ENV_HTTP_TIMEOUT_SECS: &str = "COLLAB_HTTP_TIMEOUT_SECS";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The API base URL does not parse.
    #[error("invalid API URL {value:?}: {source}")]
    InvalidApiUrl {
        /// Offending value.
        value: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },
}

/// Settings shared by [`CollaborationClient`](crate::CollaborationClient)
/// and [`SessionApi`](crate::SessionApi).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base, e.g. `https://connect.example/api`.
    pub api_url: Url,
    /// Bearer token for the socket handshake and HTTP calls.
    pub auth_token: Option<String>,
    /// Reconnect policy after unclean closes.
    pub reconnect: ReconnectPolicy,
    /// Per-request HTTP timeout. `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,
    /// `User-Agent` for HTTP calls.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(Url::parse(DEFAULT_API_URL).expect("default API URL is valid"))
    }
}

impl ClientConfig {
    /// Config for `api_url` with default reconnect policy and no token.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            auth_token: None,
            reconnect: ReconnectPolicy::default(),
            request_timeout: None,
            user_agent: format!("collab-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Parse `api_url` and build a config for it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidApiUrl`] if the URL does not parse.
    pub fn parse(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_api_url(api_url)?))
    }

    /// Read the configuration from `COLLAB_*` environment variables.
    ///
    /// Unset or unparseable numeric values fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidApiUrl`] if `COLLAB_API_URL` is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let mut config = Self::parse(&api_url)?;

        config.auth_token = lookup(ENV_TOKEN).filter(|t| !t.is_empty());
        if let Some(ms) = lookup(ENV_RECONNECT_BASE_MS).and_then(|v| v.parse().ok()) {
            config.reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = lookup(ENV_RECONNECT_MAX_ATTEMPTS).and_then(|v| v.parse().ok()) {
            config.reconnect.max_attempts = attempts;
        }
        config.request_timeout = lookup(ENV_HTTP_TIMEOUT_SECS)
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(config)
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

fn parse_api_url(value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidApiUrl {
        value: value.to_string(),
        source,
    })
}
