//! OTLP/HTTP JSON encoding of metric readings.
//!
//! Each push carries exactly one metric with exactly one data point:
//!
//! ```text
//! {"resourceMetrics":[{"resource":{...},"scopeMetrics":[{"metrics":[
//!     {"name":..,"unit":..,"sum":{"dataPoints":[..],
//!         "aggregationTemporality":"AGGREGATION_TEMPORALITY_CUMULATIVE","isMonotonic":true}}
//! ]}]}]}
//! ```
//!
//! Gauges carry a `gauge` block with `dataPoints` only.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::telemetry::series::{MetricKind, MetricReading};

/// Top-level ingest envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricBatch {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeMetrics {
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub unit: String,
    #[serde(flatten)]
    pub data: MetricData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricData {
    Sum(Sum),
    Gauge(Gauge),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sum {
    pub data_points: Vec<NumberDataPoint>,
    pub aggregation_temporality: AggregationTemporality,
    pub is_monotonic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gauge {
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationTemporality {
    #[serde(rename = "AGGREGATION_TEMPORALITY_CUMULATIVE")]
    Cumulative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDataPoint {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<KeyValue>,
    pub as_int: i64,
    pub time_unix_nano: u64,
}

impl MetricBatch {
    /// Name of the (single) metric in this batch.
    pub fn metric_name(&self) -> Option<&str> {
        self.metrics().next().map(|m| m.name.as_str())
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.resource_metrics
            .iter()
            .flat_map(|r| r.scope_metrics.iter())
            .flat_map(|s| s.metrics.iter())
    }
}

impl Metric {
    pub fn data_points(&self) -> &[NumberDataPoint] {
        match &self.data {
            MetricData::Sum(sum) => &sum.data_points,
            MetricData::Gauge(gauge) => &gauge.data_points,
        }
    }
}

fn key_value(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: AnyValue {
            string_value: value.to_string(),
        },
    }
}

/// Builds single-metric envelopes tagged with the service's source label.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    source: Option<String>,
}

impl Encoder {
    /// `source` becomes the `service.name` resource attribute; empty means none.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            source: (!source.is_empty()).then_some(source),
        }
    }

    /// Encode `reading` stamped with the current wall clock time.
    pub fn encode_now(&self, reading: &MetricReading) -> MetricBatch {
        self.encode(reading, unix_nanos_now())
    }

    /// Encode `reading` with an explicit timestamp. Pure.
    pub fn encode(&self, reading: &MetricReading, time_unix_nano: u64) -> MetricBatch {
        let data_points = vec![NumberDataPoint {
            attributes: reading
                .attributes
                .iter()
                .map(|(k, v)| key_value(k, v))
                .collect(),
            as_int: reading.value,
            time_unix_nano,
        }];

        let data = match reading.kind {
            MetricKind::Counter => MetricData::Sum(Sum {
                data_points,
                aggregation_temporality: AggregationTemporality::Cumulative,
                is_monotonic: true,
            }),
            MetricKind::Gauge => MetricData::Gauge(Gauge { data_points }),
        };

        MetricBatch {
            resource_metrics: vec![ResourceMetrics {
                resource: self.source.as_deref().map(|source| Resource {
                    attributes: vec![key_value("service.name", source)],
                }),
                scope_metrics: vec![ScopeMetrics {
                    metrics: vec![Metric {
                        name: reading.name.clone(),
                        unit: reading.unit.to_string(),
                        data,
                    }],
                }],
            }],
        }
    }
}

/// Nanoseconds since the Unix epoch.
pub fn unix_nanos_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::series::{self, MetricReading};
    use serde_json::json;

    #[test]
    fn test_counter_wire_shape() {
        let encoder = Encoder::new("");
        let reading = MetricReading::counter(series::PIZZA_PURCHASES_TOTAL, 7);
        let body = serde_json::to_value(encoder.encode(&reading, 1_700_000_000_000_000_000)).unwrap();

        assert_eq!(
            body,
            json!({
                "resourceMetrics": [{
                    "scopeMetrics": [{
                        "metrics": [{
                            "name": "pizza_purchases_total",
                            "unit": "1",
                            "sum": {
                                "dataPoints": [{
                                    "asInt": 7,
                                    "timeUnixNano": 1_700_000_000_000_000_000u64
                                }],
                                "aggregationTemporality": "AGGREGATION_TEMPORALITY_CUMULATIVE",
                                "isMonotonic": true
                            }
                        }]
                    }]
                }]
            })
        );
    }

    #[test]
    fn test_gauge_has_no_aggregation_metadata() {
        let encoder = Encoder::new("jwt-pizza-service");
        let reading = MetricReading::gauge(series::CPU_USAGE_PERCENTAGE, 142, series::UNIT_PERCENT);
        let body = serde_json::to_value(encoder.encode(&reading, 5)).unwrap();

        let metric = &body["resourceMetrics"][0]["scopeMetrics"][0]["metrics"][0];
        assert_eq!(metric["unit"], "%");
        assert!(metric.get("sum").is_none());
        assert!(metric["gauge"].get("aggregationTemporality").is_none());
        assert!(metric["gauge"].get("isMonotonic").is_none());
        assert_eq!(metric["gauge"]["dataPoints"][0]["asInt"], 142);

        let resource = &body["resourceMetrics"][0]["resource"]["attributes"][0];
        assert_eq!(resource["key"], "service.name");
        assert_eq!(resource["value"]["stringValue"], "jwt-pizza-service");
    }

    #[test]
    fn test_data_point_attributes() {
        let reading = MetricReading::counter(series::HTTP_REQUESTS_TOTAL, 3)
            .with_attribute("http.method", "POST")
            .with_attribute("http.route", "/api/order");
        let batch = Encoder::default().encode(&reading, 1);

        let metric = batch.metrics().next().unwrap();
        let point = &metric.data_points()[0];
        assert_eq!(point.attributes.len(), 2);
        assert_eq!(point.attributes[1].value.string_value, "/api/order");
        assert_eq!(batch.metric_name(), Some("http_requests_total"));
    }

    #[test]
    fn test_timestamp_is_nanoseconds() {
        let before = unix_nanos_now();
        let batch = Encoder::default().encode_now(&MetricReading::gauge("g", 1, "ms"));
        let ts = batch.metrics().next().unwrap().data_points()[0].time_unix_nano;
        assert!(ts >= before);
        // Sanity: after 2001 in nanoseconds.
        assert!(ts > 1_000_000_000_000_000_000);
    }
}
