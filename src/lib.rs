//! # Alertmanager Emitter
//!
//! A Rust client library for emitting alerts to [Prometheus Alertmanager](https://prometheus.io/docs/alerting/latest/alertmanager/)
//! or any receiver speaking its `/api/v2/alerts` API.
//!
//! ## Features
//!
//! - Alerts built from options or with a builder chain
//! - Client configured from an ordered list of validated [`ClientOption`]s
//! - Base labels and annotations merged into every alert (alert values win)
//! - Basic auth, custom CA, TLS version bounds, skip-verify, proxy and timeout
//! - Flat [`AlertmanagerArgs`] record (config files) and secret-map constructors
//!
//! Each emission is a single POST. The library never retries, batches across
//! calls or adds uniqueness labels; Alertmanager deduplicates alerts with
//! identical label sets.
//!
//! ## Example
//!
//! ```rust,no_run
//! use alertmanager_emitter::{Alert, AlertOption, AlertmanagerClient, AlertSeverity, ClientOption};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AlertmanagerClient::new([
//!         ClientOption::endpoint("http://localhost:9093"),
//!         ClientOption::timeout(Duration::from_secs(10)),
//!         ClientOption::base_label("service", "my-app"),
//!     ])?;
//!
//!     let memory = Alert::named("HighMemoryUsage")
//!         .with_severity(AlertSeverity::Warning)
//!         .with_label("instance", "localhost:8080")
//!         .with_summary("Memory usage is above 90%");
//!
//!     let disk = Alert::from_options([
//!         AlertOption::label("alertname", "DiskFull"),
//!         AlertOption::annotation("summary", "Disk usage is above 95%"),
//!     ]);
//!
//!     // Response-returning contract: status interpretation is up to the caller.
//!     let response = client.emit([&memory, &disk]).await?;
//!     println!("status: {}", response.status());
//!
//!     // Collapsed contract: anything but HTTP 200 is an error.
//!     client.push_alert(memory).await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod errors;
mod options;
mod types;

pub use client::AlertmanagerClient;
pub use config::{secret_options, AlertmanagerArgs, DEFAULT_TIMEOUT};
pub use errors::{AlertmanagerError, Result};
pub use options::{ClientOption, TlsConfig, TlsVersion, TransportConfig, ALERTS_API_PATH};
pub use types::{Alert, AlertOption, AlertSeverity};
