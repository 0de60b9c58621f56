use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Alertmanager operations
pub type Result<T> = std::result::Result<T, AlertmanagerError>;

/// Errors that can occur when configuring a client or emitting alerts
#[derive(Debug, Error)]
pub enum AlertmanagerError {
    /// No endpoint was provided, or emission was attempted without one
    #[error("invalid Alertmanager config: endpoint required")]
    EndpointRequired,

    /// The endpoint could not be parsed or lacks a scheme or host
    #[error("invalid Alertmanager config: endpoint {endpoint:?} is invalid: {reason}")]
    InvalidEndpoint {
        /// Endpoint as supplied by the caller
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },

    /// The proxy URL could not be parsed
    #[error("invalid proxy URL {proxy:?}: {source}")]
    InvalidProxy {
        /// Proxy URL as supplied by the caller
        proxy: String,
        /// Parser failure
        #[source]
        source: url::ParseError,
    },

    /// Only one of username and password was provided
    #[error("both basic auth username and password must be provided together")]
    PartialBasicAuth,

    /// A TLS version string was not on the allow-list
    #[error("invalid TLS version {value:?}: {reason}")]
    InvalidTlsVersion {
        /// Version string as supplied by the caller
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The CA certificate file could not be read
    #[error("failed to read CA cert {}: {source}", .path.display())]
    ReadCaCert {
        /// Path that was read
        path: PathBuf,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A secret entry held a value that could not be interpreted
    #[error("invalid Alertmanager config: failed to parse {key}: {reason}")]
    InvalidSecretValue {
        /// Secret key holding the value
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// Transport options were combined with a caller-supplied HTTP client
    #[error("transport options cannot be applied to a caller-supplied HTTP client")]
    CustomClientTransport,

    /// Failed to build HTTP client
    #[error("Failed to build HTTP client: {0}")]
    BuildHttpClient(#[source] reqwest::Error),

    /// Failed to serialize alerts
    #[error("Failed to serialize alerts: {0}")]
    Serialize(#[source] serde_json::Error),

    /// HTTP request failed before a response was received
    #[error("failed to post alerts to {endpoint}: {source}")]
    Request {
        /// Endpoint the POST was sent to
        endpoint: String,
        /// Transport failure from the HTTP client
        #[source]
        source: reqwest_middleware::Error,
    },

    /// Alertmanager answered with a status other than 200
    #[error("Alertmanager API error: HTTP {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body returned by Alertmanager
        message: String,
    },
}

impl AlertmanagerError {
    /// Check if the error is retryable
    ///
    /// Returns `true` for:
    /// - Network/connection errors
    /// - Timeout errors
    /// - Server errors (5xx status codes)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { source, .. } => match source {
                reqwest_middleware::Error::Reqwest(err) => err.is_connect() || err.is_timeout(),
                reqwest_middleware::Error::Middleware(err) => err
                    .chain()
                    .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
                    .any(|err| err.is_connect() || err.is_timeout()),
            },
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if the error was raised while building or reconfiguring a client
    ///
    /// Configuration errors are never fixed by retrying.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::EndpointRequired
                | Self::InvalidEndpoint { .. }
                | Self::InvalidProxy { .. }
                | Self::PartialBasicAuth
                | Self::InvalidTlsVersion { .. }
                | Self::ReadCaCert { .. }
                | Self::InvalidSecretValue { .. }
                | Self::CustomClientTransport
                | Self::BuildHttpClient(_)
        )
    }

    pub(crate) fn invalid_endpoint(endpoint: &str, reason: impl ToString) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}
