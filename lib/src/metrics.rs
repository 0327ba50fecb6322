use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Latency and success statistics gathered while exercising a ring.
///
/// Lookups count as successful when they resolve to the expected owner;
/// stabilization events measure how long the ring took to heal after churn.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LookupMetrics {
    /// Sum of all lookup latencies.
    #[serde(with = "humantime_serde")]
    pub total_latency: Duration,

    /// Number of lookups issued.
    pub total_queries: u64,

    /// Number of lookups that resolved to the expected node.
    pub successful_queries: u64,

    /// Sum of the time spent waiting for the ring to heal.
    #[serde(with = "humantime_serde")]
    pub total_stabilization_time: Duration,

    /// Number of healing periods measured.
    pub stabilization_events: u64,
}

/// Derived view of [`LookupMetrics`], what gets printed.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    #[serde(with = "humantime_serde")]
    pub average_latency: Duration,
    pub success_rate_percent: f64,
    #[serde(with = "humantime_serde")]
    pub average_stabilization_time: Duration,
    pub raw: LookupMetrics,
}

impl LookupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lookup(&mut self, latency: Duration, success: bool) {
        self.total_latency += latency;
        self.total_queries += 1;
        if success {
            self.successful_queries += 1;
        }
    }

    pub fn record_stabilization(&mut self, elapsed: Duration) {
        if elapsed > Duration::ZERO {
            self.total_stabilization_time += elapsed;
            self.stabilization_events += 1;
        }
    }

    pub fn average_latency(&self) -> Duration {
        average(self.total_latency, self.total_queries)
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_queries == 0 {
            return 0.0;
        }
        self.successful_queries as f64 / self.total_queries as f64 * 100.0
    }

    pub fn average_stabilization_time(&self) -> Duration {
        average(self.total_stabilization_time, self.stabilization_events)
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            average_latency: self.average_latency(),
            success_rate_percent: self.success_rate(),
            average_stabilization_time: self.average_stabilization_time(),
            raw: self.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.summary())
    }
}

fn average(total: Duration, count: u64) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(n) => total / n,
        Err(_) => Duration::from_secs_f64(total.as_secs_f64() / count as f64),
    }
}
