//! Client Configuration Settings
//!
//! Configuration types for the quote client, loaded from environment variables.

use crate::application::ports::ConnectRequest;
use crate::infrastructure::quote_feed::ANONYMOUS_AUTH_TOKEN;

/// Default quote service endpoint.
pub const DEFAULT_URL: &str = "wss://data.tradingview.com/socket.io/websocket";

/// Default `Origin` header. The service rejects connections without it.
pub const DEFAULT_ORIGIN: &str = "https://www.tradingview.com";

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/86.0.4240.193 Safari/537.36";

const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9,es;q=0.8";
const NO_CACHE: &str = "no-cache";

/// Session authentication token.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Create a new token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if this is the anonymous token.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_AUTH_TOKEN
    }
}

impl Default for AuthToken {
    fn default() -> Self {
        Self::new(ANONYMOUS_AUTH_TOKEN)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_anonymous() {
            f.debug_tuple("AuthToken").field(&self.0).finish()
        } else {
            f.debug_tuple("AuthToken").field(&"[REDACTED]").finish()
        }
    }
}

/// Endpoint and opening-handshake headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    /// WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    /// `Origin` header.
    pub origin: String,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Endpoint settings.
    pub endpoint: EndpointSettings,
    /// Token sent with `set_auth_token`.
    pub auth_token: AuthToken,
    /// Symbols subscribed right after the handshake.
    pub symbols: Vec<String>,
    /// Capacity of the event channel used by the binary.
    pub event_capacity: usize,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointSettings::default(),
            auth_token: AuthToken::default(),
            symbols: Vec::new(),
            event_capacity: 1024,
            metrics_port: 0,
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let endpoint = EndpointSettings {
            url: parse_env_string(&lookup, "QUOTE_STREAM_URL", &defaults.endpoint.url),
            origin: parse_env_string(&lookup, "QUOTE_STREAM_ORIGIN", &defaults.endpoint.origin),
            user_agent: parse_env_string(
                &lookup,
                "QUOTE_STREAM_USER_AGENT",
                &defaults.endpoint.user_agent,
            ),
        };

        let auth_token = match lookup("QUOTE_STREAM_AUTH_TOKEN") {
            Some(token) if token.trim().is_empty() => {
                return Err(ConfigError::EmptyValue(
                    "QUOTE_STREAM_AUTH_TOKEN".to_string(),
                ));
            }
            Some(token) => AuthToken::new(token.trim()),
            None => defaults.auth_token,
        };

        let config = Self {
            endpoint,
            auth_token,
            symbols: parse_env_list(&lookup, "QUOTE_STREAM_SYMBOLS"),
            event_capacity: parse_env_usize(
                &lookup,
                "QUOTE_STREAM_EVENT_CAPACITY",
                defaults.event_capacity,
            ),
            metrics_port: parse_env_u16(&lookup, "QUOTE_STREAM_METRICS_PORT", defaults.metrics_port),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can be used to connect.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL scheme is not `ws`/`wss`, the token is
    /// empty, or the event capacity is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.endpoint.url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_STREAM_URL".to_string(),
                reason: format!("expected a ws:// or wss:// URL, got {url:?}"),
            });
        }
        if self.auth_token.expose().is_empty() {
            return Err(ConfigError::EmptyValue(
                "QUOTE_STREAM_AUTH_TOKEN".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_STREAM_EVENT_CAPACITY".to_string(),
                reason: "capacity must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Replace the endpoint URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint.url = url.into();
        self
    }

    /// Replace the initial symbol list.
    #[must_use]
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the auth token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = AuthToken::new(token);
        self
    }

    /// Build the transport request with browser-like headers.
    #[must_use]
    pub fn connect_request(&self) -> ConnectRequest {
        ConnectRequest::new(&self.endpoint.url)
            .with_header("Origin", &self.endpoint.origin)
            .with_header("User-Agent", &self.endpoint.user_agent)
            .with_header("Accept-Language", ACCEPT_LANGUAGE)
            .with_header("Cache-Control", NO_CACHE)
            .with_header("Pragma", NO_CACHE)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong.
        reason: String,
    },
}

fn parse_env_string<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_list<F>(lookup: &F, key: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_env_u16<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize<F>(lookup: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
