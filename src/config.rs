use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use crate::client::AlertmanagerClient;
use crate::errors::{AlertmanagerError, Result};
use crate::options::{ClientOption, TlsVersion};

/// Timeout used by [`AlertmanagerArgs`] when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Flat client configuration, e.g. a section of a config file
///
/// Optional string fields treat an empty value the same as an absent one.
///
/// ```toml
/// enabled = true
/// alertmanager_url = "https://alertmanager.example.com:9093"
/// username = "bob"
/// password = "frogs"
/// tls_min_version = "TLS12"
/// timeout_ms = 5000
/// ```
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertmanagerArgs {
    /// When false no client is created
    pub enabled: bool,

    /// Base URL of the Alertmanager instance
    pub alertmanager_url: String,

    pub username: Option<String>,
    pub password: Option<String>,

    /// PEM file trusted in addition to the platform roots
    pub tls_ca_cert_path: Option<PathBuf>,

    pub tls_insecure_skip_verify: bool,

    /// `TLS12` or `TLS13`
    pub tls_min_version: Option<String>,

    /// `TLS12` or `TLS13`
    pub tls_max_version: Option<String>,

    pub proxy_url: Option<String>,

    /// Request timeout in milliseconds; unset or zero means [`DEFAULT_TIMEOUT`]
    pub timeout_ms: Option<u64>,
}

impl AlertmanagerArgs {
    pub fn timeout(&self) -> Duration {
        match self.timeout_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => DEFAULT_TIMEOUT,
        }
    }

    /// Translate the flat record into the option list used by
    /// [`AlertmanagerClient::new`]
    ///
    /// The `enabled` flag is not consulted here.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty, only one of username and
    /// password is set, the CA file cannot be read, or a TLS version is not
    /// `TLS12`/`TLS13`.
    pub fn to_options(&self) -> Result<Vec<ClientOption>> {
        if self.alertmanager_url.is_empty() {
            return Err(AlertmanagerError::EndpointRequired);
        }

        let mut options = vec![
            ClientOption::endpoint(self.alertmanager_url.as_str()),
            ClientOption::timeout(self.timeout()),
        ];

        match (non_empty(&self.username), non_empty(&self.password)) {
            (Some(username), Some(password)) => {
                options.push(ClientOption::basic_auth(username, password));
            }
            (None, None) => {}
            _ => return Err(AlertmanagerError::PartialBasicAuth),
        }

        if let Some(path) = self.tls_ca_cert_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            let pem = std::fs::read(path).map_err(|source| AlertmanagerError::ReadCaCert {
                path: path.clone(),
                source,
            })?;
            options.push(ClientOption::custom_ca(pem));
        }

        if self.tls_insecure_skip_verify {
            options.push(ClientOption::insecure_skip_verify(true));
        }

        if let Some(proxy) = non_empty(&self.proxy_url) {
            options.push(ClientOption::proxy_url(proxy));
        }

        if let Some(version) = non_empty(&self.tls_min_version) {
            options.push(ClientOption::min_tls_version(version.parse()?));
        }

        if let Some(version) = non_empty(&self.tls_max_version) {
            options.push(ClientOption::max_tls_version(TlsVersion::parse_secure(version)?));
        }

        Ok(options)
    }
}

impl Debug for AlertmanagerArgs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertmanagerArgs")
            .field("enabled", &self.enabled)
            .field("alertmanager_url", &self.alertmanager_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tls_ca_cert_path", &self.tls_ca_cert_path)
            .field("tls_insecure_skip_verify", &self.tls_insecure_skip_verify)
            .field("tls_min_version", &self.tls_min_version)
            .field("tls_max_version", &self.tls_max_version)
            .field("proxy_url", &self.proxy_url)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Translate a byte-valued secret into client options
///
/// Recognized keys: `endpoint` (required), `username`, `password`, `caCert`
/// (inline PEM) and `insecureSkipVerify`. TLS is always configured with a
/// TLS 1.2 floor.
pub fn secret_options(secret: &HashMap<String, Vec<u8>>) -> Result<Vec<ClientOption>> {
    let endpoint = secret
        .get("endpoint")
        .ok_or(AlertmanagerError::EndpointRequired)?;
    let endpoint = std::str::from_utf8(endpoint).map_err(|err| AlertmanagerError::InvalidSecretValue {
        key: "endpoint".to_string(),
        reason: err.to_string(),
    })?;

    let text = |key: &str| {
        secret
            .get(key)
            .map(|value| String::from_utf8_lossy(value).into_owned())
            .unwrap_or_default()
    };

    let insecure = match secret.get("insecureSkipVerify") {
        Some(raw) => parse_bool(raw).ok_or_else(|| AlertmanagerError::InvalidSecretValue {
            key: "insecureSkipVerify".to_string(),
            reason: format!("{:?} is not a boolean", String::from_utf8_lossy(raw)),
        })?,
        None => false,
    };

    let mut options = vec![
        ClientOption::endpoint(endpoint),
        ClientOption::basic_auth(text("username"), text("password")),
        ClientOption::insecure_skip_verify(insecure),
    ];
    if let Some(ca) = secret.get("caCert") {
        options.push(ClientOption::custom_ca(ca.clone()));
    }

    Ok(options)
}

fn parse_bool(raw: &[u8]) -> Option<bool> {
    match raw {
        b"1" | b"t" | b"T" | b"true" | b"TRUE" | b"True" => Some(true),
        b"0" | b"f" | b"F" | b"false" | b"FALSE" | b"False" => Some(false),
        _ => None,
    }
}

impl AlertmanagerClient {
    /// Build a client from a flat [`AlertmanagerArgs`] record
    ///
    /// Returns `Ok(None)` when `args.enabled` is false.
    ///
    /// # Example
    ///
    /// ```rust
    /// use alertmanager_emitter::{AlertmanagerArgs, AlertmanagerClient};
    ///
    /// let args = AlertmanagerArgs {
    ///     enabled: true,
    ///     alertmanager_url: "http://localhost:9093".to_string(),
    ///     ..Default::default()
    /// };
    ///
    /// let client = AlertmanagerClient::from_args(&args).unwrap().expect("enabled");
    /// assert_eq!(client.transport().timeout(), Some(std::time::Duration::from_secs(2)));
    /// ```
    pub fn from_args(args: &AlertmanagerArgs) -> Result<Option<Self>> {
        if !args.enabled {
            return Ok(None);
        }

        Self::new(args.to_options()?).map(Some)
    }

    /// Build a client from a byte-valued secret; see [`secret_options`]
    pub fn from_secret(secret: &HashMap<String, Vec<u8>>) -> Result<Self> {
        Self::new(secret_options(secret)?)
    }
}
