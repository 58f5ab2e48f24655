//! Decision metrics for the authorization pipeline

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::policy::PolicyOrigin;

/// Maximum latency samples kept for percentiles
const MAX_SAMPLES: usize = 10_000;

/// Pipeline metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Total number of authorization requests
    pub total_requests: u64,

    /// Number of allowed decisions
    pub allowed_decisions: u64,

    /// Number of denied decisions
    pub denied_decisions: u64,

    /// Requests served by a statically registered policy
    pub static_resolutions: u64,

    /// Requests served by a synthesized policy
    pub synthesized_resolutions: u64,

    /// Requests that failed before a decision (bad names, unknown operations)
    pub error_count: u64,

    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
    pub avg_latency_ms: f64,
}

impl EngineMetrics {
    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / total as f64
        }
    }
}

/// Collects decision counts and latency samples
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,

    /// Latency samples for percentile calculation
    latency_samples: Arc<RwLock<Vec<f64>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(1_024))),
        }
    }

    /// Record an authorization decision
    pub async fn record_decision(&self, allowed: bool, origin: PolicyOrigin) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;

        if allowed {
            metrics.allowed_decisions += 1;
        } else {
            metrics.denied_decisions += 1;
        }

        match origin {
            PolicyOrigin::Static => metrics.static_resolutions += 1,
            PolicyOrigin::Synthesized => metrics.synthesized_resolutions += 1,
        }
    }

    /// Record request latency
    ///
    /// Only appends the sample; percentiles are computed when a snapshot is
    /// taken.
    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);
        if samples.len() > MAX_SAMPLES {
            samples.drain(0..MAX_SAMPLES / 10);
        }
    }

    /// Record an error
    pub async fn record_error(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        metrics.error_count += 1;
    }

    /// Get current metrics snapshot, with latency statistics
    pub async fn get_metrics(&self) -> EngineMetrics {
        let mut snapshot = self.metrics.read().await.clone();

        let mut sorted = self.latency_samples.read().await.clone();
        if !sorted.is_empty() {
            sorted.sort_by(|a, b| a.total_cmp(b));
            snapshot.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
            snapshot.latency_p50_ms = Self::percentile(&sorted, 0.50);
            snapshot.latency_p99_ms = Self::percentile(&sorted, 0.99);
        }

        snapshot
    }

    /// Export metrics in Prometheus text format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.get_metrics().await;

        format!(
            r#"# HELP permission_requests_total Total number of authorization requests
# TYPE permission_requests_total counter
permission_requests_total {}

# HELP permission_allowed_total Number of allowed decisions
# TYPE permission_allowed_total counter
permission_allowed_total {}

# HELP permission_denied_total Number of denied decisions
# TYPE permission_denied_total counter
permission_denied_total {}

# HELP permission_resolutions_total Resolved policies by origin
# TYPE permission_resolutions_total counter
permission_resolutions_total{{origin="static"}} {}
permission_resolutions_total{{origin="synthesized"}} {}

# HELP permission_latency_seconds Request latency percentiles
# TYPE permission_latency_seconds summary
permission_latency_seconds{{quantile="0.5"}} {}
permission_latency_seconds{{quantile="0.99"}} {}

# HELP permission_errors_total Error count
# TYPE permission_errors_total counter
permission_errors_total {}
"#,
            metrics.total_requests,
            metrics.allowed_decisions,
            metrics.denied_decisions,
            metrics.static_resolutions,
            metrics.synthesized_resolutions,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
            metrics.error_count,
        )
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
