//! Client Configuration Settings
//!
//! Configuration types for the trade API client, loaded from environment
//! variables.

use std::time::Duration;

/// Default broker endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://trade-api.finam.ru";

/// How the outbound half of the event stream is closed at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Cancel both halves at once; queued commands are discarded.
    Immediate,
    /// Forward every queued command, then half-close the outbound stream.
    #[default]
    Drain,
}

impl ShutdownPolicy {
    /// Parse policy from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "immediate" => Self::Immediate,
            _ => Self::Drain,
        }
    }

    /// Get the policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Drain => "drain",
        }
    }
}

/// What happens when a user handler panics during dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackPanicPolicy {
    /// Log the panic and keep dispatching later events.
    #[default]
    Isolate,
    /// Terminate the stream and report the panic as a failure.
    Propagate,
}

impl CallbackPanicPolicy {
    /// Parse policy from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "propagate" => Self::Propagate,
            _ => Self::Isolate,
        }
    }

    /// Get the policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Isolate => "isolate",
            Self::Propagate => "propagate",
        }
    }
}

/// Broker API credentials.
#[derive(Clone)]
pub struct Credentials {
    access_token: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(access_token: String) -> Self {
        Self { access_token }
    }

    /// Get the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Event stream settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Close behavior of the outbound half.
    pub shutdown_policy: ShutdownPolicy,
    /// How often the writer re-checks the command queue.
    pub drain_poll_interval: Duration,
    /// Upper bound on draining queued commands at shutdown.
    pub drain_timeout: Duration,
    /// Capacity of the channel between the writer task and the transport.
    pub outbound_buffer: usize,
    /// Handling of panics raised by user handlers.
    pub callback_panic_policy: CallbackPanicPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            shutdown_policy: ShutdownPolicy::Drain,
            drain_poll_interval: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(5),
            outbound_buffer: 64,
            callback_panic_policy: CallbackPanicPolicy::Isolate,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker gRPC endpoint.
    pub endpoint: String,
    /// API credentials.
    pub credentials: Credentials,
    /// Transport connect timeout.
    pub connect_timeout: Duration,
    /// Event stream settings.
    pub stream: StreamSettings,
}

impl ClientConfig {
    /// Create a configuration for the default endpoint.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials: Credentials::new(access_token.into()),
            connect_timeout: Duration::from_secs(10),
            stream: StreamSettings::default(),
        }
    }

    /// Override the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the event stream settings.
    #[must_use]
    pub const fn with_stream(mut self, stream: StreamSettings) -> Self {
        self.stream = stream;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_token = std::env::var("FINAM_ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("FINAM_ACCESS_TOKEN".to_string()))?;

        if access_token.is_empty() {
            return Err(ConfigError::EmptyValue("FINAM_ACCESS_TOKEN".to_string()));
        }

        let endpoint =
            std::env::var("FINAM_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "FINAM_ENDPOINT".to_string(),
                value: endpoint,
            });
        }

        let defaults = StreamSettings::default();
        let stream = StreamSettings {
            shutdown_policy: std::env::var("FINAM_SHUTDOWN_POLICY")
                .map(|s| ShutdownPolicy::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            drain_poll_interval: parse_env_duration_millis(
                "FINAM_DRAIN_POLL_MS",
                defaults.drain_poll_interval,
            ),
            drain_timeout: parse_env_duration_secs(
                "FINAM_DRAIN_TIMEOUT_SECS",
                defaults.drain_timeout,
            ),
            outbound_buffer: parse_env_usize("FINAM_OUTBOUND_BUFFER", defaults.outbound_buffer)
                .max(1),
            callback_panic_policy: std::env::var("FINAM_CALLBACK_PANIC_POLICY")
                .map(|s| CallbackPanicPolicy::from_str_case_insensitive(&s))
                .unwrap_or_default(),
        };

        Ok(Self {
            endpoint,
            credentials: Credentials::new(access_token),
            connect_timeout: parse_env_duration_secs(
                "FINAM_CONNECT_TIMEOUT_SECS",
                Duration::from_secs(10),
            ),
            stream,
        })
    }

    /// Check whether the endpoint uses TLS.
    #[must_use]
    pub fn uses_tls(&self) -> bool {
        self.endpoint.starts_with("https://")
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value that cannot be used.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
