use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use tracing::{debug, error, info, instrument, warn, Span};
use url::Url;

use crate::errors::{AlertmanagerError, Result};
use crate::options::{ClientConfig, ClientOption, TransportConfig};
use crate::types::Alert;

/// Client for emitting alerts to Alertmanager
///
/// Base labels and annotations configured on the client are merged into
/// every emitted alert; the alert's own values win on key collision.
///
/// Configuration is finished before the client is shared: [`apply`](Self::apply)
/// takes `&mut self`, emission only needs `&self`.
///
/// # Example
///
/// ```rust,no_run
/// use alertmanager_emitter::{Alert, AlertmanagerClient, AlertSeverity, ClientOption};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = AlertmanagerClient::new([
///         ClientOption::endpoint("http://localhost:9093"),
///         ClientOption::timeout(Duration::from_secs(10)),
///         ClientOption::base_label("service", "my-service"),
///     ])?;
///
///     let alert = Alert::named("TestAlert").with_severity(AlertSeverity::Info);
///
///     let response = client.emit([&alert]).await?;
///     println!("Alertmanager answered {}", response.status());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct AlertmanagerClient {
    client: ClientWithMiddleware,
    custom_client: bool,
    config: ClientConfig,
}

impl AlertmanagerClient {
    /// Create a client by applying `options` in order
    ///
    /// # Errors
    ///
    /// Returns the first option's validation error, or an error if the HTTP
    /// client cannot be built from the resulting transport settings.
    pub fn new(options: impl IntoIterator<Item = ClientOption>) -> Result<Self> {
        let config = ClientConfig::from_options(options)?;
        let client = ClientBuilder::new(config.transport.http_client()?).build();

        Ok(Self {
            client,
            custom_client: false,
            config,
        })
    }

    /// Create a client around a caller-supplied reqwest middleware client
    ///
    /// This allows you to add custom middleware (retry, logging, etc.).
    /// Transport options (TLS, proxy, timeout) must be configured on the
    /// supplied client itself.
    ///
    /// # Errors
    ///
    /// Returns [`AlertmanagerError::CustomClientTransport`] if any option
    /// changes transport settings.
    pub fn with_client(
        client: ClientWithMiddleware,
        options: impl IntoIterator<Item = ClientOption>,
    ) -> Result<Self> {
        let config = ClientConfig::from_options(options)?;
        if !config.transport.is_default() {
            return Err(AlertmanagerError::CustomClientTransport);
        }

        Ok(Self {
            client,
            custom_client: true,
            config,
        })
    }

    /// Apply one more option to an existing client
    ///
    /// The HTTP client is rebuilt when transport settings change. On error
    /// the client is left as it was.
    pub fn apply(&mut self, option: ClientOption) -> Result<()> {
        let config = option.apply(self.config.clone())?;

        if config.transport != self.config.transport {
            if self.custom_client {
                return Err(AlertmanagerError::CustomClientTransport);
            }
            self.client = ClientBuilder::new(config.transport.http_client()?).build();
        }

        self.config = config;
        Ok(())
    }

    /// Emit alerts in a single POST and return Alertmanager's response
    ///
    /// `None` entries are skipped. The payload is always a JSON array, even
    /// for one alert. Any HTTP status, including errors, is returned as a
    /// response; use [`push_alerts`](Self::push_alerts) to treat non-200
    /// statuses as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No endpoint is configured (no request is made)
    /// - The alerts cannot be serialized
    /// - The HTTP request fails before a response arrives
    #[instrument(
        name = "AlertmanagerClient::emit",
        skip_all,
        fields(alert_count = tracing::field::Empty)
    )]
    pub async fn emit<'a, I, A>(&self, alerts: I) -> Result<Response>
    where
        I: IntoIterator<Item = A>,
        A: Into<Option<&'a Alert>>,
    {
        let endpoint = self
            .config
            .endpoint
            .as_ref()
            .ok_or(AlertmanagerError::EndpointRequired)?;

        let merged: Vec<Alert> = alerts
            .into_iter()
            .filter_map(Into::<Option<&'a Alert>>::into)
            .map(|alert| alert.merged_with(&self.config.labels, &self.config.annotations))
            .collect();
        Span::current().record("alert_count", merged.len());

        let body = serde_json::to_vec(&merged).map_err(AlertmanagerError::Serialize)?;
        debug!(payload = %String::from_utf8_lossy(&body), "Alertmanager message");

        let mut request = self
            .client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(auth) = self.authorization_header() {
            request = request.header(AUTHORIZATION, auth);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::OK {
                    info!(%endpoint, %status, "Successfully posted alerts to Alertmanager");
                } else {
                    warn!(%endpoint, %status, "Alertmanager did not accept alerts");
                }
                Ok(response)
            }
            Err(source) => {
                error!(%endpoint, error = %source, "failed to post alerts");
                Err(AlertmanagerError::Request {
                    endpoint: endpoint.to_string(),
                    source,
                })
            }
        }
    }

    /// Push one or more alerts to Alertmanager
    ///
    /// Alertmanager deduplicates alerts by their labels.
    /// Alerts with identical labels are considered the same alert.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No endpoint is configured
    /// - The HTTP request fails
    /// - Alertmanager answers with any status other than 200
    pub async fn push_alerts(&self, alerts: Vec<Alert>) -> Result<()> {
        if self.config.endpoint.is_none() {
            return Err(AlertmanagerError::EndpointRequired);
        }
        if alerts.is_empty() {
            debug!("No alerts to push");
            return Ok(());
        }

        let response = self.emit(&alerts).await?;
        let status = response.status();

        if status != StatusCode::OK {
            let message = response.text().await.unwrap_or_default();
            return Err(AlertmanagerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }

    /// Push a single alert
    ///
    /// Convenience method that wraps `push_alerts` for a single alert.
    pub async fn push_alert(&self, alert: Alert) -> Result<()> {
        self.push_alerts(vec![alert]).await
    }

    /// Final submission URL, if an endpoint was configured
    pub fn endpoint(&self) -> Option<&Url> {
        self.config.endpoint.as_ref()
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }

    /// Labels merged into every emitted alert
    pub fn base_labels(&self) -> &HashMap<String, String> {
        &self.config.labels
    }

    /// Annotations merged into every emitted alert
    pub fn base_annotations(&self) -> &HashMap<String, String> {
        &self.config.annotations
    }

    /// Transport settings the HTTP client was built from
    ///
    /// Always default for clients created with [`with_client`](Self::with_client).
    pub fn transport(&self) -> &TransportConfig {
        &self.config.transport
    }

    /// `Authorization` header value, present only when both username and
    /// password are non-empty
    pub fn authorization_header(&self) -> Option<String> {
        let (username, password) = (&self.config.username, &self.config.password);
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(basic_auth_header(username, password))
    }
}

impl Debug for AlertmanagerClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertmanagerClient")
            .field("endpoint", &self.config.endpoint.as_ref().map(Url::as_str))
            .field("username", &self.config.username)
            .field("labels", &self.config.labels)
            .field("annotations", &self.config.annotations)
            .field("transport", &self.config.transport)
            .field("custom_client", &self.custom_client)
            .finish_non_exhaustive()
    }
}

fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TlsVersion;
    use crate::types::AlertSeverity;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_CA: &[u8] = include_bytes!("testdata/ca.pem");

    fn client_for(server: &MockServer, extra: Vec<ClientOption>) -> AlertmanagerClient {
        let mut options = vec![
            ClientOption::endpoint(server.uri()),
            ClientOption::timeout(Duration::from_secs(10)),
        ];
        options.extend(extra);
        AlertmanagerClient::new(options).unwrap()
    }

    async fn received_payload(server: &MockServer) -> serde_json::Value {
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        serde_json::from_slice(&requests[0].body).unwrap()
    }

    #[test]
    fn test_basic_auth_header_encoding() {
        assert_eq!(basic_auth_header("bob", "frogs"), "Basic Ym9iOmZyb2dz");
    }

    #[test]
    fn test_authorization_header_requires_both() {
        let cases = [("bob", "frogs", true), ("bob", "", false), ("", "frogs", false), ("", "", false)];

        for (username, password, expected) in cases {
            let client = AlertmanagerClient::new([
                ClientOption::endpoint("http://example.com"),
                ClientOption::basic_auth(username, password),
            ])
            .unwrap();
            assert_eq!(client.authorization_header().is_some(), expected);
            assert_eq!(client.username(), username);
        }
    }

    #[test]
    fn test_new_without_endpoint_is_allowed() {
        let client = AlertmanagerClient::new(Vec::new()).unwrap();
        assert!(client.endpoint().is_none());
        assert!(client.base_labels().is_empty());
        assert!(client.transport().is_default());
    }

    #[test]
    fn test_construction_stops_at_first_error() {
        let err = AlertmanagerClient::new([
            ClientOption::base_label("a", "b"),
            ClientOption::endpoint("not a url"),
            ClientOption::endpoint("http://example.com"),
        ])
        .unwrap_err();
        assert!(matches!(err, AlertmanagerError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_transport_options_compose() {
        let client = AlertmanagerClient::new([
            ClientOption::endpoint("https://example.com"),
            ClientOption::custom_ca(TEST_CA),
            ClientOption::proxy_url("http://proxy.example.com:8080"),
            ClientOption::min_tls_version(TlsVersion::Tls12),
        ])
        .unwrap();

        let transport = client.transport();
        let tls = transport.tls().unwrap();
        assert_eq!(tls.trusted_certificates().len(), 1);
        assert_eq!(tls.min_version(), Some(TlsVersion::Tls12));
        assert_eq!(
            transport.proxy().map(Url::as_str),
            Some("http://proxy.example.com:8080/")
        );
    }

    #[test]
    fn test_tls_version_bounds_build_client() {
        for version in [TlsVersion::Tls12, TlsVersion::Tls13] {
            let client = AlertmanagerClient::new([
                ClientOption::endpoint("https://example.com"),
                ClientOption::min_tls_version(version),
            ])
            .unwrap_or_else(|err| panic!("min {version}: {err}"));
            assert_eq!(client.transport().tls().unwrap().min_version(), Some(version));

            let client = AlertmanagerClient::new([
                ClientOption::endpoint("https://example.com"),
                ClientOption::max_tls_version(version),
            ])
            .unwrap_or_else(|err| panic!("max {version}: {err}"));
            assert_eq!(client.transport().tls().unwrap().max_version(), Some(version));
        }
    }

    #[test]
    fn test_apply_after_construction() {
        let mut client = AlertmanagerClient::new([ClientOption::endpoint("http://example.com")]).unwrap();

        client.apply(ClientOption::base_label("env", "prod")).unwrap();
        client.apply(ClientOption::insecure_skip_verify(true)).unwrap();
        client.apply(ClientOption::timeout(Duration::from_secs(1))).unwrap();

        assert_eq!(client.base_labels()["env"], "prod");
        assert!(client.transport().tls().unwrap().insecure_skip_verify());
        assert_eq!(client.transport().timeout(), Some(Duration::from_secs(1)));

        let err = client.apply(ClientOption::endpoint("")).unwrap_err();
        assert!(matches!(err, AlertmanagerError::EndpointRequired));
        assert_eq!(
            client.endpoint().map(Url::as_str),
            Some("http://example.com/api/v2/alerts")
        );
    }

    #[test]
    fn test_custom_client_rejects_transport_options() {
        let custom = ClientBuilder::new(reqwest::Client::new()).build();
        let client = AlertmanagerClient::with_client(
            custom.clone(),
            [
                ClientOption::endpoint("http://example.com"),
                ClientOption::base_label("service", "custom"),
                ClientOption::proxy_url(""),
            ],
        );
        let mut client = client.unwrap();

        let err = client.apply(ClientOption::timeout(Duration::from_secs(1))).unwrap_err();
        assert!(matches!(err, AlertmanagerError::CustomClientTransport));
        assert!(client.transport().is_default());

        let err = AlertmanagerClient::with_client(custom, [ClientOption::insecure_skip_verify(true)])
            .unwrap_err();
        assert!(matches!(err, AlertmanagerError::CustomClientTransport));
    }

    #[tokio::test]
    async fn test_emit_without_endpoint_makes_no_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = AlertmanagerClient::new([ClientOption::base_label("service", "test")]).unwrap();
        let alert = Alert::named("TestAlert");

        let err = client.emit([&alert]).await.unwrap_err();
        assert!(matches!(err, AlertmanagerError::EndpointRequired));

        let err = client.push_alerts(vec![]).await.unwrap_err();
        assert!(matches!(err, AlertmanagerError::EndpointRequired));
    }

    #[tokio::test]
    async fn test_emit_returns_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, vec![]);
        let alert = Alert::named("TestAlert").with_severity(AlertSeverity::Info);

        let response = client.emit([&alert]).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let payload = received_payload(&mock_server).await;
        assert!(payload.is_array());
        assert_eq!(payload[0]["labels"]["alertname"], "TestAlert");
    }

    #[tokio::test]
    async fn test_emit_surfaces_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, vec![]);
        let alert = Alert::named("TestAlert");

        let response = client.emit([&alert]).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.text().await.unwrap(), "boom");
    }

    #[tokio::test]
    async fn test_emit_merges_base_fields() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = client_for(
            &mock_server,
            vec![
                ClientOption::base_label("service", "base"),
                ClientOption::base_label("env", "prod"),
                ClientOption::base_annotation("team", "platform"),
            ],
        );

        let starts = "2024-05-01T12:00:00Z".parse().unwrap();
        let alert = Alert::named("Merge")
            .with_label("service", "override")
            .with_annotation("summary", "merged")
            .with_starts_at(starts);

        client.emit([&alert]).await.unwrap();

        let payload = received_payload(&mock_server).await;
        assert_eq!(
            payload,
            serde_json::json!([{
                "labels": { "alertname": "Merge", "service": "override", "env": "prod" },
                "annotations": { "team": "platform", "summary": "merged" },
                "startsAt": "2024-05-01T12:00:00Z"
            }])
        );
    }

    #[tokio::test]
    async fn test_emit_skips_missing_alerts() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .and(body_json(serde_json::json!([
                { "labels": { "alertname": "One" }, "annotations": {} },
                { "labels": { "alertname": "Two" }, "annotations": {} }
            ])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, vec![]);
        let one = Alert::named("One");
        let two = Alert::named("Two");

        let response = client.emit([None, Some(&one), None, Some(&two)]).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_emit_sends_basic_auth() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .and(header("Authorization", "Basic Ym9iOmZyb2dz"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, vec![ClientOption::basic_auth("bob", "frogs")]);

        client.push_alert(Alert::named("Auth")).await.unwrap();
    }

    #[tokio::test]
    async fn test_emit_without_auth_sends_no_header() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, vec![ClientOption::basic_auth("bob", "")]);
        client.push_alert(Alert::named("NoAuth")).await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_emit_endpoint_path_stripped() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = AlertmanagerClient::new([ClientOption::endpoint(format!(
            "{}/some/path",
            mock_server.uri()
        ))])
        .unwrap();

        client.push_alert(Alert::named("Path")).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_alert_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, vec![]);

        let alert = Alert::named("TestAlert")
            .with_severity(AlertSeverity::Info)
            .with_label("service", "test");

        let result = client.push_alert(alert).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_push_alert_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, vec![]);

        let result = client.push_alert(Alert::named("TestAlert")).await;

        if let Err(AlertmanagerError::Api { status, message }) = result {
            assert_eq!(status, 401);
            assert_eq!(message, "Unauthorized");
        } else {
            panic!("Expected Api error");
        }
    }

    #[tokio::test]
    async fn test_push_alert_non_200_success_status_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, vec![]);

        let err = client.push_alert(Alert::named("TestAlert")).await.unwrap_err();
        assert!(matches!(err, AlertmanagerError::Api { status: 202, .. }));
    }

    #[tokio::test]
    async fn test_push_alert_server_error_is_retryable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service unavailable"))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, vec![]);

        let err = client.push_alert(Alert::named("TestAlert")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_push_empty_alerts() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, vec![]);

        let result = client.push_alerts(vec![]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_push_multiple_alerts_single_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/alerts"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, vec![]);

        let alerts = vec![
            Alert::named("Alert1").with_severity(AlertSeverity::Info),
            Alert::named("Alert2").with_severity(AlertSeverity::Warning),
        ];

        client.push_alerts(alerts).await.unwrap();

        let payload = received_payload(&mock_server).await;
        assert_eq!(payload.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_connection_refused_is_request_error() {
        let client = AlertmanagerClient::new([
            ClientOption::endpoint("http://127.0.0.1:1"),
            ClientOption::timeout(Duration::from_secs(2)),
        ])
        .unwrap();

        let err = client.emit([&Alert::named("Down")]).await.unwrap_err();
        match err {
            AlertmanagerError::Request { endpoint, .. } => {
                assert!(endpoint.ends_with("/api/v2/alerts"));
            }
            other => panic!("Expected Request error, got {other:?}"),
        }
    }
}
