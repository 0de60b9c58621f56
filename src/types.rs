use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Alert severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl Display for AlertSeverity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Critical => write!(f, "critical"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Info => write!(f, "info"),
        }
    }
}

/// Alertmanager alert payload
///
/// Alerts are identified by their labels. Two alerts with identical labels
/// are considered the same alert by Alertmanager and will be deduplicated.
/// Callers that need every emission recorded separately must add a unique
/// label themselves.
///
/// See: <https://prometheus.io/docs/alerting/latest/clients/>
///
/// # Example
///
/// ```rust
/// use alertmanager_emitter::{Alert, AlertSeverity};
///
/// let alert = Alert::named("HighCPUUsage")
///     .with_severity(AlertSeverity::Warning)
///     .with_label("service", "api-server")
///     .with_label("instance", "prod-1")
///     .with_summary("CPU usage above 80%")
///     .with_description("The API server CPU usage has exceeded the warning threshold");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Labels identify the alert (used for deduplication and routing)
    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Annotations contain additional information (not used for dedup)
    #[serde(default)]
    pub annotations: HashMap<String, String>,

    /// Start time of the alert; Alertmanager uses the receive time when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,

    /// End time; Alertmanager applies its resolve timeout when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,

    /// Generator URL (link back to source)
    #[serde(
        default,
        rename = "generatorURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub generator_url: Option<String>,
}

/// A single step applied by [`Alert::from_options`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOption {
    Label(String, String),
    Annotation(String, String),
    StartsAt(DateTime<Utc>),
    EndsAt(DateTime<Utc>),
}

impl AlertOption {
    pub fn label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Label(key.into(), value.into())
    }

    pub fn annotation(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Annotation(key.into(), value.into())
    }

    pub fn starts_at(time: DateTime<Utc>) -> Self {
        Self::StartsAt(time)
    }

    pub fn ends_at(time: DateTime<Utc>) -> Self {
        Self::EndsAt(time)
    }

    fn apply(self, alert: &mut Alert) {
        match self {
            Self::Label(key, value) => alert.add_label(key, value),
            Self::Annotation(key, value) => alert.add_annotation(key, value),
            Self::StartsAt(time) => alert.set_starts_at(time),
            Self::EndsAt(time) => alert.set_ends_at(time),
        }
    }
}

impl Alert {
    /// Create an alert with no labels, annotations or timestamps
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an alert and apply `options` in order
    ///
    /// A key written twice keeps the last value.
    pub fn from_options(options: impl IntoIterator<Item = AlertOption>) -> Self {
        let mut alert = Self::new();
        for option in options {
            option.apply(&mut alert);
        }
        alert
    }

    /// Create a new alert with the given name
    ///
    /// The `alertname` label is set; no timestamps are filled in.
    pub fn named(alertname: &str) -> Self {
        Self::new().with_label("alertname", alertname)
    }

    /// Insert or replace a label
    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    /// Insert or replace an annotation
    pub fn add_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.annotations.insert(key.into(), value.into());
    }

    pub fn set_starts_at(&mut self, time: DateTime<Utc>) {
        self.starts_at = Some(time);
    }

    /// No ordering against `starts_at` is checked.
    pub fn set_ends_at(&mut self, time: DateTime<Utc>) {
        self.ends_at = Some(time);
    }

    /// Add a label to the alert
    ///
    /// Labels are used for routing and deduplication.
    /// Alerts with identical labels are considered the same alert.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_label(key, value);
        self
    }

    /// Add severity label
    ///
    /// This is a convenience method that adds a "severity" label.
    pub fn with_severity(self, severity: AlertSeverity) -> Self {
        self.with_label("severity", severity.to_string())
    }

    /// Add an annotation
    ///
    /// Annotations provide additional context but are not used for deduplication.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_annotation(key, value);
        self
    }

    /// Add summary annotation
    pub fn with_summary(self, summary: &str) -> Self {
        self.with_annotation("summary", summary)
    }

    /// Add description annotation
    pub fn with_description(self, description: &str) -> Self {
        self.with_annotation("description", description)
    }

    /// Set generator URL
    ///
    /// This URL can link back to the source that generated the alert.
    pub fn with_generator_url(mut self, url: &str) -> Self {
        self.generator_url = Some(url.to_string());
        self
    }

    pub fn with_starts_at(mut self, time: DateTime<Utc>) -> Self {
        self.set_starts_at(time);
        self
    }

    pub fn with_ends_at(mut self, time: DateTime<Utc>) -> Self {
        self.set_ends_at(time);
        self
    }

    /// Mark the alert as resolved at `time`
    pub fn resolve_at(self, time: DateTime<Utc>) -> Self {
        self.with_ends_at(time)
    }

    /// Get the alertname label
    pub fn alertname(&self) -> Option<&str> {
        self.labels.get("alertname").map(|s| s.as_str())
    }

    /// Layer this alert on top of a client's base labels and annotations
    ///
    /// The alert's own values win on key collision. Timestamps and the
    /// generator URL are carried over unchanged.
    pub(crate) fn merged_with(
        &self,
        base_labels: &HashMap<String, String>,
        base_annotations: &HashMap<String, String>,
    ) -> Alert {
        let mut labels = base_labels.clone();
        labels.extend(self.labels.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut annotations = base_annotations.clone();
        annotations.extend(
            self.annotations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        Alert {
            labels,
            annotations,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            generator_url: self.generator_url.clone(),
        }
    }
}
