//! Metrics API payloads and the assertions made about them.

pub mod api;
pub mod exposition;

pub use exposition::Exposition;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::ProbeError;
use crate::verify;

/// Metric emitted by the statsd-emitter test binary.
pub const STATSD_UPTIME_METRIC: &str = "statsd_tester.time.uptime";

/// Tags the metrics pipeline adds to every application datapoint.
pub const APP_DATAPOINT_TAGS: [&str; 4] =
    ["dcos_cluster_id", "test_tag_key", "dcos_cluster_name", "host"];

const DATAPOINT_KEYS: [&str; 5] = ["name", "value", "unit", "timestamp", "tags"];

/// A key that is present maps to `Some`, even when its value is `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub unit: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub timestamp: Option<Value>,
    pub tags: Option<BTreeMap<String, String>>,
}

impl Datapoint {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_ref()?.get(key).map(String::as_str)
    }

    pub fn has_key(&self, key: &str) -> bool {
        match key {
            "name" => self.name.is_some(),
            "value" => self.value.is_some(),
            "unit" => self.unit.is_some(),
            "timestamp" => self.timestamp.is_some(),
            "tags" => self.tags.is_some(),
            _ => false,
        }
    }

    pub fn numeric_value(&self) -> Option<f64> {
        self.value.as_ref()?.as_f64()
    }
}

/// Body of `/node`, `/containers/<id>` and `/containers/<id>/app`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub datapoints: Option<Vec<Datapoint>>,
    pub dimensions: Option<Map<String, Value>>,
}

impl MetricsResponse {
    pub fn datapoints(&self) -> &[Datapoint] {
        self.datapoints.as_deref().unwrap_or_default()
    }

    pub fn dimension(&self, key: &str) -> Option<&Value> {
        self.dimensions.as_ref()?.get(key)
    }

    pub fn dimension_str(&self, key: &str) -> Option<&str> {
        self.dimension(key)?.as_str()
    }

    pub fn find(&self, name: &str) -> Option<&Datapoint> {
        self.datapoints().iter().find(|dp| dp.name() == name)
    }

    pub fn matching(&self, name: &str) -> Vec<&Datapoint> {
        self.datapoints()
            .iter()
            .filter(|dp| dp.name() == name)
            .collect()
    }

    /// Both top-level sections must be present.
    pub fn require_shape(&self) -> Result<(), ProbeError> {
        verify!(
            self.datapoints.is_some(),
            "metrics must include datapoints. Got: {:?}",
            self
        );
        verify!(
            self.dimensions.is_some(),
            "metrics must include dimensions. Got: {:?}",
            self
        );
        Ok(())
    }
}

/// Tags hold exactly `expected` keys, none with an empty value.
pub fn check_tags(
    tags: &BTreeMap<String, String>,
    expected: &BTreeSet<&str>,
) -> Result<(), ProbeError> {
    let actual: BTreeSet<&str> = tags.keys().map(String::as_str).collect();
    verify!(&actual == expected, "expected tags {expected:?}, got {actual:?}");
    for (name, value) in tags {
        verify!(!value.is_empty(), "Value for tag \"{name}\" must not be empty");
    }
    Ok(())
}

/// Numeric values compare as numbers (`100 == 100.0`); everything else must be identical.
pub fn value_matches(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

/// Validates the uptime datapoint statsd-emitter reports through the app metrics pipeline.
pub fn check_statsd_uptime(app_metrics: &MetricsResponse) -> Result<(), ProbeError> {
    verify!(app_metrics.datapoints.is_some(), "got {app_metrics:?}");

    // If this metric is missing, statsd-emitter's metrics were not received
    let uptime = match app_metrics.find(STATSD_UPTIME_METRIC) {
        Some(dp) => dp,
        None => return Err(ProbeError::assertion(format!("got {app_metrics:?}"))),
    };

    for key in DATAPOINT_KEYS {
        verify!(uptime.has_key(key), "missing {key}, got {uptime:?}");
    }

    let tags = uptime.tags.clone().unwrap_or_default();
    let expected: BTreeSet<&str> = APP_DATAPOINT_TAGS.into_iter().collect();
    check_tags(&tags, &expected)?;
    verify!(
        uptime.tag("test_tag_key") == Some("test_tag_value"),
        "got {uptime:?}"
    );
    verify!(
        uptime.numeric_value().is_some_and(|v| v > 0.0),
        "uptime must be positive, got {uptime:?}"
    );
    Ok(())
}

/// Validates container resource datapoints and returns the container ID they share.
///
/// Every datapoint carries a `container_id` tag, a `blkio_device` tag for `blkio.*`
/// metrics, and, when `allow_executor_name` is set, an optional non-empty `executor_name`.
pub fn check_container_datapoints(
    container_metrics: &MetricsResponse,
    allow_executor_name: bool,
) -> Result<String, ProbeError> {
    let mut container_ids = BTreeSet::new();

    for dp in container_metrics.datapoints() {
        let tags = match &dp.tags {
            Some(tags) => tags,
            None => return Err(ProbeError::assertion(format!("got {dp:?}"))),
        };

        let mut expected: BTreeSet<&str> = ["container_id"].into_iter().collect();
        if allow_executor_name && tags.contains_key("executor_name") {
            expected.insert("executor_name");
        }
        if dp.name().starts_with("blkio.") {
            expected.insert("blkio_device");
        }
        check_tags(tags, &expected)?;

        if let Some(cid) = tags.get("container_id") {
            container_ids.insert(cid.clone());
        }
    }

    verify!(
        container_ids.len() == 1,
        "Not all container IDs in the metrics response are equal: {container_ids:?}"
    );
    Ok(container_ids.into_iter().next().unwrap_or_default())
}
