use reqwest::{Certificate, Client, ClientBuilder, Proxy};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::errors::{AlertmanagerError, Result};

/// Path every endpoint is rewritten to
pub const ALERTS_API_PATH: &str = "/api/v2/alerts";

/// TLS protocol versions accepted by [`ClientOption::min_tls_version`] and
/// [`ClientOption::max_tls_version`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Parse a version name, accepting only `TLS12` and `TLS13`
    ///
    /// Older protocol versions are rejected with a message naming the floor.
    pub fn parse_secure(value: &str) -> Result<Self> {
        let reject = |reason: &str| AlertmanagerError::InvalidTlsVersion {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match value {
            "TLS10" => Err(reject("TLS 1.0 is not allowed (minimum: TLS 1.2)")),
            "TLS11" => Err(reject("TLS 1.1 is not allowed (minimum: TLS 1.2)")),
            "TLS12" => Ok(Self::Tls12),
            "TLS13" => Ok(Self::Tls13),
            _ => Err(reject("must be one of: TLS12, TLS13")),
        }
    }
}

impl FromStr for TlsVersion {
    type Err = AlertmanagerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_secure(s)
    }
}

impl Display for TlsVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsVersion::Tls10 => write!(f, "TLS10"),
            TlsVersion::Tls11 => write!(f, "TLS11"),
            TlsVersion::Tls12 => write!(f, "TLS12"),
            TlsVersion::Tls13 => write!(f, "TLS13"),
        }
    }
}

impl From<TlsVersion> for reqwest::tls::Version {
    fn from(version: TlsVersion) -> Self {
        match version {
            TlsVersion::Tls10 => reqwest::tls::Version::TLS_1_0,
            TlsVersion::Tls11 => reqwest::tls::Version::TLS_1_1,
            TlsVersion::Tls12 => reqwest::tls::Version::TLS_1_2,
            TlsVersion::Tls13 => reqwest::tls::Version::TLS_1_3,
        }
    }
}

/// TLS settings shared by the custom CA, skip-verify and version options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    custom_ca_pem: Option<Vec<u8>>,
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
    insecure_skip_verify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            custom_ca_pem: None,
            min_version: Some(TlsVersion::Tls12),
            max_version: None,
            insecure_skip_verify: false,
        }
    }
}

impl TlsConfig {
    /// PEM bundle trusted on top of the platform roots, if a custom CA was set
    pub fn custom_ca_pem(&self) -> Option<&[u8]> {
        self.custom_ca_pem.as_deref()
    }

    pub fn min_version(&self) -> Option<TlsVersion> {
        self.min_version
    }

    pub fn max_version(&self) -> Option<TlsVersion> {
        self.max_version
    }

    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure_skip_verify
    }

    /// Certificates from the custom CA bundle that the TLS backend accepts
    ///
    /// Each PEM block is loaded on its own; blocks that fail to parse or that
    /// the backend refuses as a trust anchor are skipped with a warning.
    pub(crate) fn trusted_certificates(&self) -> Vec<Certificate> {
        const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
        const END: &str = "-----END CERTIFICATE-----";

        let Some(pem) = &self.custom_ca_pem else {
            return Vec::new();
        };

        String::from_utf8_lossy(pem)
            .split_inclusive(END)
            .filter(|block| block.contains(BEGIN))
            .flat_map(|block| {
                Certificate::from_pem_bundle(block.as_bytes()).unwrap_or_else(|err| {
                    warn!(error = %err, "ignoring unparseable PEM certificate block");
                    Vec::new()
                })
            })
            .filter(|certificate| {
                // rustls only validates a root when the client is built
                let accepted = tls_builder()
                    .tls_built_in_root_certs(false)
                    .add_root_certificate(certificate.clone())
                    .build();
                if let Err(err) = &accepted {
                    warn!(error = %err, "ignoring CA certificate rejected by TLS backend");
                }
                accepted.is_ok()
            })
            .collect()
    }
}

fn tls_builder() -> ClientBuilder {
    let builder = Client::builder();
    #[cfg(feature = "rustls-tls")]
    let builder = builder.use_rustls_tls();
    builder
}

/// Transport settings accumulated by options, turned into a reqwest client
/// once configuration is finished
///
/// Every option only touches its own fields, so unrelated settings survive
/// in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportConfig {
    tls: Option<TlsConfig>,
    proxy: Option<Url>,
    timeout: Option<Duration>,
}

impl TransportConfig {
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    pub fn proxy(&self) -> Option<&Url> {
        self.proxy.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn is_default(&self) -> bool {
        *self == Self::default()
    }

    fn tls_mut(&mut self) -> &mut TlsConfig {
        self.tls.get_or_insert_with(TlsConfig::default)
    }

    /// Build a fresh reqwest client holding only this transport's settings
    ///
    /// A zero timeout means no timeout.
    pub(crate) fn http_client(&self) -> Result<Client> {
        let mut builder = tls_builder();

        if let Some(timeout) = self.timeout.filter(|timeout| !timeout.is_zero()) {
            builder = builder.timeout(timeout);
        }

        if let Some(proxy) = &self.proxy {
            let proxy = Proxy::all(proxy.clone()).map_err(AlertmanagerError::BuildHttpClient)?;
            builder = builder.proxy(proxy);
        }

        if let Some(tls) = &self.tls {
            if let Some(min) = tls.min_version {
                builder = builder.min_tls_version(min.into());
            }
            // TLS 1.3 is the newest version, so as a ceiling it bounds nothing
            if let Some(max) = tls.max_version.filter(|max| *max < TlsVersion::Tls13) {
                builder = builder.max_tls_version(max.into());
            }
            builder = builder.danger_accept_invalid_certs(tls.insecure_skip_verify);

            for certificate in tls.trusted_certificates() {
                builder = builder.add_root_certificate(certificate);
            }
        }

        builder.build().map_err(AlertmanagerError::BuildHttpClient)
    }
}

/// Everything the client needs, as accumulated by [`ClientOption`]s
#[derive(Debug, Clone, Default)]
pub(crate) struct ClientConfig {
    pub(crate) endpoint: Option<Url>,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) labels: HashMap<String, String>,
    pub(crate) annotations: HashMap<String, String>,
    pub(crate) transport: TransportConfig,
}

impl ClientConfig {
    /// Fold `options` left to right, stopping at the first failure
    pub(crate) fn from_options(options: impl IntoIterator<Item = ClientOption>) -> Result<Self> {
        options
            .into_iter()
            .try_fold(Self::default(), |config, option| option.apply(config))
    }
}

/// One validated configuration step for [`AlertmanagerClient`](crate::AlertmanagerClient)
///
/// # Example
///
/// ```rust
/// use alertmanager_emitter::{ClientOption, TlsVersion};
/// use std::time::Duration;
///
/// let options = vec![
///     ClientOption::endpoint("https://alertmanager.example.com:9093"),
///     ClientOption::basic_auth("bob", "frogs"),
///     ClientOption::min_tls_version(TlsVersion::Tls12),
///     ClientOption::timeout(Duration::from_secs(5)),
///     ClientOption::base_label("service", "billing"),
/// ];
/// # let _ = options;
/// ```
#[derive(Clone)]
pub enum ClientOption {
    Endpoint(String),
    BasicAuth { username: String, password: String },
    CustomCa(Vec<u8>),
    InsecureSkipVerify(bool),
    MinTlsVersion(TlsVersion),
    MaxTlsVersion(TlsVersion),
    ProxyUrl(String),
    Timeout(Duration),
    BaseLabel(String, String),
    BaseAnnotation(String, String),
}

impl ClientOption {
    /// Base URL of the Alertmanager; any path is replaced with `/api/v2/alerts`
    pub fn endpoint(url: impl Into<String>) -> Self {
        Self::Endpoint(url.into())
    }

    /// Credentials are only sent when both are non-empty
    pub fn basic_auth(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::BasicAuth {
            username: username.into(),
            password: password.into(),
        }
    }

    /// PEM bundle trusted in addition to the platform roots
    ///
    /// Blocks that cannot be decoded are ignored with a warning.
    pub fn custom_ca(pem: impl Into<Vec<u8>>) -> Self {
        Self::CustomCa(pem.into())
    }

    pub fn insecure_skip_verify(skip: bool) -> Self {
        Self::InsecureSkipVerify(skip)
    }

    pub fn min_tls_version(version: TlsVersion) -> Self {
        Self::MinTlsVersion(version)
    }

    pub fn max_tls_version(version: TlsVersion) -> Self {
        Self::MaxTlsVersion(version)
    }

    /// An empty URL leaves the proxy untouched
    pub fn proxy_url(url: impl Into<String>) -> Self {
        Self::ProxyUrl(url.into())
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout(timeout)
    }

    pub fn base_label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::BaseLabel(key.into(), value.into())
    }

    pub fn base_annotation(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::BaseAnnotation(key.into(), value.into())
    }

    pub(crate) fn apply(self, mut config: ClientConfig) -> Result<ClientConfig> {
        match self {
            Self::Endpoint(endpoint) => config.endpoint = Some(parse_endpoint(&endpoint)?),
            Self::BasicAuth { username, password } => {
                config.username = username;
                config.password = password;
            }
            Self::CustomCa(pem) => {
                config.transport.tls_mut().custom_ca_pem = Some(pem);
            }
            Self::InsecureSkipVerify(skip) => config.transport.tls_mut().insecure_skip_verify = skip,
            Self::MinTlsVersion(version) => config.transport.tls_mut().min_version = Some(version),
            Self::MaxTlsVersion(version) => config.transport.tls_mut().max_version = Some(version),
            Self::ProxyUrl(proxy) => {
                if !proxy.is_empty() {
                    let url = Url::parse(&proxy)
                        .map_err(|source| AlertmanagerError::InvalidProxy { proxy, source })?;
                    config.transport.proxy = Some(url);
                }
            }
            Self::Timeout(timeout) => config.transport.timeout = Some(timeout),
            Self::BaseLabel(key, value) => {
                config.labels.insert(key, value);
            }
            Self::BaseAnnotation(key, value) => {
                config.annotations.insert(key, value);
            }
        }
        Ok(config)
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    if endpoint.is_empty() {
        return Err(AlertmanagerError::EndpointRequired);
    }

    let mut url = Url::parse(endpoint)
        .map_err(|err| AlertmanagerError::invalid_endpoint(endpoint, err))?;
    if url.scheme().is_empty() || url.host_str().map_or(true, str::is_empty) {
        return Err(AlertmanagerError::invalid_endpoint(
            endpoint,
            "endpoint scheme and host are required",
        ));
    }

    if !matches!(url.path(), "" | "/") {
        debug!(path = url.path(), "stripping path from Alertmanager endpoint");
    }
    url.set_query(None);
    url.set_fragment(None);
    url.set_path(ALERTS_API_PATH);

    Ok(url)
}
