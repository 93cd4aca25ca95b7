//! Observability infrastructure for the terminator
//!
//! Provides:
//! - Prometheus metrics (iteration latency, pods evaluated, tracked streaks, kills)
//! - Structured JSON logging of terminator decisions with tracing

use prometheus::proto::MetricFamily;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for iteration latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<TerminatorMetricsInner> = OnceLock::new();

struct TerminatorMetricsInner {
    iteration_latency_seconds: Histogram,
    iterations: IntCounter,
    pods_found: IntGauge,
    pods_sampled: IntGauge,
    pods_over_limit: IntGauge,
    tracked_pods: IntGauge,
    kills: IntCounterVec,
    expired_records: IntCounter,
}

impl TerminatorMetricsInner {
    fn new() -> Self {
        Self {
            iteration_latency_seconds: register_histogram!(
                "oom_terminator_iteration_latency_seconds",
                "Time spent resolving, sampling and deciding in one loop iteration",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register iteration_latency_seconds"),

            iterations: register_int_counter!(
                "oom_terminator_iterations_total",
                "Completed loop iterations"
            )
            .expect("Failed to register iterations_total"),

            pods_found: register_int_gauge!(
                "oom_terminator_pods_found",
                "Candidate pods resolved in the last iteration"
            )
            .expect("Failed to register pods_found"),

            pods_sampled: register_int_gauge!(
                "oom_terminator_pods_sampled",
                "Pods with a usable memory sample in the last iteration"
            )
            .expect("Failed to register pods_sampled"),

            pods_over_limit: register_int_gauge!(
                "oom_terminator_pods_over_limit",
                "Pods at or above the memory threshold in the last iteration"
            )
            .expect("Failed to register pods_over_limit"),

            tracked_pods: register_int_gauge!(
                "oom_terminator_tracked_pods",
                "Pods with an open over-limit streak"
            )
            .expect("Failed to register tracked_pods"),

            kills: register_int_counter_vec!(
                "oom_terminator_kills_total",
                "Pods terminated (or that would have been, in dry-run mode)",
                &["mode"]
            )
            .expect("Failed to register kills_total"),

            expired_records: register_int_counter!(
                "oom_terminator_expired_records_total",
                "Over-limit streaks forgotten without a kill"
            )
            .expect("Failed to register expired_records_total"),
        }
    }
}

/// Terminator metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct TerminatorMetrics {
    _private: (),
}

impl Default for TerminatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminatorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(TerminatorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &TerminatorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record the outcome of one completed iteration
    pub fn observe_iteration(
        &self,
        duration_secs: f64,
        pods_found: usize,
        pods_sampled: usize,
        pods_over_limit: usize,
        tracked_pods: usize,
    ) {
        let inner = self.inner();
        inner.iteration_latency_seconds.observe(duration_secs);
        inner.iterations.inc();
        inner.pods_found.set(pods_found as i64);
        inner.pods_sampled.set(pods_sampled as i64);
        inner.pods_over_limit.set(pods_over_limit as i64);
        inner.tracked_pods.set(tracked_pods as i64);
    }

    pub fn inc_kills(&self, dry_run: bool) {
        let mode = if dry_run { "dry_run" } else { "live" };
        self.inner().kills.with_label_values(&[mode]).inc();
    }

    pub fn inc_expired(&self, count: usize) {
        self.inner().expired_records.inc_by(count as u64);
    }

    pub fn kills(&self, dry_run: bool) -> u64 {
        let mode = if dry_run { "dry_run" } else { "live" };
        self.inner().kills.with_label_values(&[mode]).get()
    }

    /// Snapshot of the default registry, for exposition
    pub fn gather(&self) -> Vec<MetricFamily> {
        prometheus::gather()
    }
}

/// Structured logger for terminator decisions
///
/// Every event carries an `event` field and the run's `dry_run` flag so kills
/// and would-be kills can be told apart in aggregated logs.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    dry_run: bool,
}

impl StructuredLogger {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Log the terminator starting up with its effective settings
    pub fn log_startup(
        &self,
        version: &str,
        namespace: Option<&str>,
        services: &[String],
        deployments: &[String],
    ) {
        warn!(
            event = "terminator_started",
            version = %version,
            namespace = namespace.unwrap_or("<all>"),
            services = ?services,
            deployments = ?deployments,
            dry_run = self.dry_run,
            "Checking for pods"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "terminator_shutdown",
            reason = %reason,
            "OOM terminator shutting down"
        );
    }

    /// Log a usage sample
    pub fn log_sample(&self, pod_name: &str, usage_bytes: u64, limit_bytes: u64, percentage: f64) {
        debug!(
            event = "pod_sampled",
            pod_name = %pod_name,
            usage_bytes = usage_bytes,
            limit_bytes = limit_bytes,
            percentage = percentage,
            "Pod memory usage"
        );
    }

    /// Log a pod at or above the threshold
    pub fn log_over_limit(
        &self,
        pod_name: &str,
        namespace: &str,
        percentage: f64,
        consecutive_count: u32,
    ) {
        warn!(
            event = "pod_over_limit",
            pod_name = %pod_name,
            namespace = %namespace,
            percentage = percentage,
            consecutive_count = consecutive_count,
            "Pod over the memory limit"
        );
    }

    /// Log a kill decision
    pub fn log_kill(
        &self,
        pod_name: &str,
        namespace: &str,
        consecutive_count: u32,
        grace_period_seconds: Option<u32>,
    ) {
        if self.dry_run {
            warn!(
                event = "pod_kill",
                pod_name = %pod_name,
                namespace = %namespace,
                consecutive_count = consecutive_count,
                dry_run = true,
                "Would delete pod, it exceeded the memory limit"
            );
        } else {
            warn!(
                event = "pod_kill",
                pod_name = %pod_name,
                namespace = %namespace,
                consecutive_count = consecutive_count,
                grace_period_seconds = ?grace_period_seconds,
                dry_run = false,
                "Deleting pod, it exceeded the memory limit"
            );
        }
    }

    /// Log a streak forgotten by the expiry sweep
    pub fn log_expired(&self, pod_name: &str) {
        info!(
            event = "record_expired",
            pod_name = %pod_name,
            "Pod is not over limit anymore or has already terminated"
        );
    }
}
