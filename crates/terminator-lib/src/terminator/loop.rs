//! Terminator control loop
//!
//! Each iteration resolves the candidate pods, samples their memory usage,
//! feeds the samples to the [`OverageTracker`] and terminates at most one
//! pod. Iterations are separated by the poll interval; a kill is followed by
//! the kill-sleep before the iteration completes.

use crate::cluster::ClusterApi;
use crate::error::{Result, TerminatorError};
use crate::health::LoopHealth;
use crate::models::{container_count, is_running, pod_name, pod_namespace};
use crate::observability::{StructuredLogger, TerminatorMetrics};
use crate::resolver::{PodFilter, PodResolver};
use crate::sampler::MetricSampler;
use crate::tracker::{Decision, OverageTracker};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

/// Configuration for the terminator loop
#[derive(Debug, Clone, PartialEq)]
pub struct TerminatorConfig {
    /// Which pods to evaluate
    pub filter: PodFilter,
    /// Memory threshold in percent of the limit (inclusive, default: 95)
    pub memory_limit: u32,
    /// Over-limit observations after the first before a kill (default: 1)
    pub kill_after: u32,
    /// Pause between iterations (default: 1 second)
    pub poll_interval: Duration,
    /// Pause after a kill, also the base of the expiry window (default: 1 second)
    pub kill_sleep: Duration,
    /// Decide and log, but never delete
    pub dry_run: bool,
}

impl Default for TerminatorConfig {
    fn default() -> Self {
        Self {
            filter: PodFilter::default(),
            memory_limit: 95,
            kill_after: 1,
            poll_interval: Duration::from_millis(1000),
            kill_sleep: Duration::from_millis(1000),
            dry_run: false,
        }
    }
}

/// What happened during one iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationReport {
    pub pods_found: usize,
    pub pods_sampled: usize,
    pub pods_over_limit: usize,
    /// Pod terminated (or selected, in dry-run mode) this iteration
    pub killed: Option<String>,
    /// Streaks forgotten by the expiry sweep
    pub expired: Vec<String>,
}

/// The terminator control loop
pub struct TerminatorLoop {
    api: Arc<dyn ClusterApi>,
    resolver: PodResolver,
    sampler: MetricSampler,
    tracker: OverageTracker,
    config: TerminatorConfig,
    logger: StructuredLogger,
    metrics: TerminatorMetrics,
    health: Option<LoopHealth>,
}

impl TerminatorLoop {
    pub fn new(api: Arc<dyn ClusterApi>, config: TerminatorConfig) -> Self {
        Self {
            resolver: PodResolver::new(api.clone(), config.filter.clone()),
            sampler: MetricSampler::new(api.clone()),
            tracker: OverageTracker::new(config.memory_limit, config.kill_after, config.kill_sleep),
            logger: StructuredLogger::new(config.dry_run),
            metrics: TerminatorMetrics::new(),
            health: None,
            api,
            config,
        }
    }

    /// Log decisions through `logger` instead of one derived from the config
    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Report iterations to a shared heartbeat
    pub fn with_health(mut self, health: LoopHealth) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(&self) -> &TerminatorConfig {
        &self.config
    }

    pub fn tracker(&self) -> &OverageTracker {
        &self.tracker
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Run until `shutdown` fires or an iteration fails.
    ///
    /// Shutdown cancels the in-flight iteration, including pending API calls
    /// and sleeps.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            kill_sleep_ms = self.config.kill_sleep.as_millis() as u64,
            memory_limit = self.config.memory_limit,
            kill_after = self.config.kill_after,
            "Starting terminator loop"
        );

        if let Some(health) = &self.health {
            health.set_ready(true).await;
        }

        loop {
            tokio::select! {
                result = self.run_iteration() => {
                    let report = result?;
                    debug!(
                        pods = report.pods_found,
                        sampled = report.pods_sampled,
                        over_limit = report.pods_over_limit,
                        killed = ?report.killed,
                        expired = report.expired.len(),
                        "Iteration complete"
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutting down terminator loop");
                    return Ok(());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down terminator loop");
                    return Ok(());
                }
            }
        }
    }

    /// Run a single iteration: resolve, sample, decide, expire
    pub async fn run_iteration(&mut self) -> Result<IterationReport> {
        let start = Instant::now();
        let pods = self.resolver.resolve().await?;
        debug!(pods = pods.len(), "Found pods");

        let mut report = IterationReport {
            pods_found: pods.len(),
            ..IterationReport::default()
        };

        for pod in &pods {
            if container_count(pod) == 0 || !is_running(pod) {
                continue;
            }

            let Some(sample) = self.sampler.sample(pod).await? else {
                continue;
            };
            report.pods_sampled += 1;
            self.logger.log_sample(
                &sample.pod_name,
                sample.usage_bytes,
                sample.limit_bytes,
                sample.percentage,
            );

            match self
                .tracker
                .observe(&sample.pod_name, sample.percentage, Instant::now())
            {
                Decision::Below => {}
                Decision::Tracking { consecutive_count } => {
                    report.pods_over_limit += 1;
                    self.logger.log_over_limit(
                        &sample.pod_name,
                        &sample.namespace,
                        sample.percentage,
                        consecutive_count,
                    );
                }
                Decision::Kill { consecutive_count } => {
                    report.pods_over_limit += 1;
                    self.logger.log_over_limit(
                        &sample.pod_name,
                        &sample.namespace,
                        sample.percentage,
                        consecutive_count,
                    );
                    self.terminate(pod, consecutive_count).await?;
                    report.killed = Some(sample.pod_name);
                    tokio::time::sleep(self.config.kill_sleep).await;
                    // One kill per iteration
                    break;
                }
            }
        }

        let expired = self.tracker.expire(Instant::now());
        for name in &expired {
            self.logger.log_expired(name);
        }
        self.metrics.inc_expired(expired.len());
        report.expired = expired;

        self.metrics.observe_iteration(
            start.elapsed().as_secs_f64(),
            report.pods_found,
            report.pods_sampled,
            report.pods_over_limit,
            self.tracker.len(),
        );
        if let Some(health) = &self.health {
            health.record_iteration().await;
        }

        Ok(report)
    }

    /// Gracefully delete a pod, keeping any grace period already set on it
    async fn terminate(&self, pod: &Pod, consecutive_count: u32) -> Result<()> {
        let name = pod_name(pod);
        let namespace = pod_namespace(pod);
        let grace_period_seconds = pod
            .metadata
            .deletion_grace_period_seconds
            .and_then(|s| u32::try_from(s).ok());

        self.logger
            .log_kill(name, namespace, consecutive_count, grace_period_seconds);

        if !self.config.dry_run {
            self.api
                .delete_pod(namespace, name, grace_period_seconds)
                .await?;
        }

        self.metrics.inc_kills(self.config.dry_run);
        Ok(())
    }
}

/// Builder for creating the terminator loop
pub struct TerminatorLoopBuilder {
    api: Option<Arc<dyn ClusterApi>>,
    health: Option<LoopHealth>,
    logger: Option<StructuredLogger>,
    config: TerminatorConfig,
}

impl TerminatorLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            api: None,
            health: None,
            logger: None,
            config: TerminatorConfig::default(),
        }
    }

    /// Set the cluster API
    pub fn api(mut self, api: Arc<dyn ClusterApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Restrict to a namespace; empty means all namespaces
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.config.filter.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    pub fn services(mut self, services: Vec<String>) -> Self {
        self.config.filter.services = services;
        self
    }

    pub fn deployments(mut self, deployments: Vec<String>) -> Self {
        self.config.filter.deployments = deployments;
        self
    }

    /// Cap on the unfiltered pod listing
    pub fn page_limit(mut self, limit: u32) -> Self {
        self.config.filter.page_limit = limit;
        self
    }

    /// Memory threshold in percent
    pub fn memory_limit(mut self, percent: u32) -> Self {
        self.config.memory_limit = percent;
        self
    }

    pub fn kill_after(mut self, count: u32) -> Self {
        self.config.kill_after = count;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn kill_sleep(mut self, sleep: Duration) -> Self {
        self.config.kill_sleep = sleep;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn health(mut self, health: LoopHealth) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the terminator loop
    pub fn build(self) -> Result<TerminatorLoop> {
        let api = self
            .api
            .ok_or(TerminatorError::MissingComponent("Cluster API"))?;

        let mut terminator = TerminatorLoop::new(api, self.config);
        if let Some(logger) = self.logger {
            terminator = terminator.with_logger(logger);
        }
        if let Some(health) = self.health {
            terminator = terminator.with_health(health);
        }
        Ok(terminator)
    }
}

impl Default for TerminatorLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
