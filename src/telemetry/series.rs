//! Exported metric series.
//!
//! Every value the service pushes is described by a [`MetricReading`]: the
//! series name, its kind, its unit and the integer value read at one instant.

/// How the remote backend should interpret a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonic cumulative sum since process start.
    Counter,
    /// Instantaneous value, replaced on every reading.
    Gauge,
}

/// Dimensionless unit used for counts.
pub const UNIT_COUNT: &str = "1";
pub const UNIT_MILLIS: &str = "ms";
pub const UNIT_PERCENT: &str = "%";
pub const UNIT_USERS: &str = "users";

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_LATENCY_MS: &str = "http_request_latency_ms";
pub const PIZZA_ORDER_LATENCY_MS: &str = "pizza_order_latency_ms";
pub const CPU_USAGE_PERCENTAGE: &str = "cpu_usage_percentage";
pub const MEMORY_USAGE_PERCENTAGE: &str = "memory_usage_percentage";
pub const ACTIVE_USERS: &str = "active_users";
pub const PIZZA_PURCHASES_TOTAL: &str = "pizza_purchases_total";
pub const PIZZA_REVENUE_TOTAL: &str = "pizza_revenue_total";

/// Per-method request counter name, e.g. `http_post_requests_total`.
pub fn method_requests_total(method: &str) -> String {
    format!("http_{}_requests_total", method.to_ascii_lowercase())
}

/// One named value ready for encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricReading {
    pub name: String,
    pub value: i64,
    pub kind: MetricKind,
    pub unit: &'static str,
    /// Data point attributes (`key`, `value`).
    pub attributes: Vec<(&'static str, String)>,
}

impl MetricReading {
    pub fn counter(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value: i64::try_from(value).unwrap_or(i64::MAX),
            kind: MetricKind::Counter,
            unit: UNIT_COUNT,
            attributes: Vec::new(),
        }
    }

    pub fn gauge(name: impl Into<String>, value: i64, unit: &'static str) -> Self {
        Self {
            name: name.into(),
            value,
            kind: MetricKind::Gauge,
            unit,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attributes.push((key, value.into()));
        self
    }
}
