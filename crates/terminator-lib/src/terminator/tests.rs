//! Loop tests against an in-memory cluster
//!
//! These drive whole iterations through the resolver, sampler and tracker
//! and check what the loop asks the cluster to delete.

use super::*;
use crate::error::TerminatorError;
use crate::health::LoopHealth;
use crate::observability::StructuredLogger;
use crate::testing::{self, FakeCluster};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

fn builder(cluster: &Arc<FakeCluster>) -> TerminatorLoopBuilder {
    TerminatorLoopBuilder::new()
        .api(cluster.clone())
        .poll_interval(Duration::ZERO)
        .kill_sleep(Duration::ZERO)
}

/// Cluster with one running pod per `(name, usage)` pair, each limited to 1000Mi
fn cluster_with(pods: &[(&str, &str)]) -> Arc<FakeCluster> {
    let cluster = Arc::new(FakeCluster::new());
    for (name, usage) in pods {
        cluster.add_pod(testing::pod(name, "default", "1000Mi", &[]));
        cluster.set_usage(name, usage);
    }
    cluster
}

#[test]
fn test_terminator_config_default() {
    let config = TerminatorConfig::default();
    assert_eq!(config.memory_limit, 95);
    assert_eq!(config.kill_after, 1);
    assert_eq!(config.poll_interval, Duration::from_millis(1000));
    assert_eq!(config.kill_sleep, Duration::from_millis(1000));
    assert!(!config.dry_run);
    assert_eq!(config.filter.page_limit, 10);
}

#[test]
fn test_builder_missing_api() {
    let result = TerminatorLoopBuilder::new().build();
    assert!(matches!(result, Err(TerminatorError::MissingComponent(_))));
}

#[test]
fn test_builder_empty_namespace_means_all() {
    let cluster = cluster_with(&[]);
    let terminator = builder(&cluster).namespace("").build().unwrap();
    assert_eq!(terminator.config().filter.namespace, None);

    let terminator = builder(&cluster).namespace("prod").build().unwrap();
    assert_eq!(terminator.config().filter.namespace.as_deref(), Some("prod"));
}

#[tokio::test]
async fn test_below_threshold_never_tracked() {
    let cluster = cluster_with(&[("web-1", "500Mi"), ("web-2", "949Mi")]);
    let mut terminator = builder(&cluster).kill_after(0).build().unwrap();

    for _ in 0..5 {
        let report = terminator.run_iteration().await.unwrap();
        assert_eq!(report.pods_sampled, 2);
        assert_eq!(report.pods_over_limit, 0);
        assert_eq!(report.killed, None);
    }

    assert!(terminator.tracker().is_empty());
    assert!(cluster.deleted_names().is_empty());
}

// Paused time keeps the sweep from expiring the streak between iterations
#[tokio::test(start_paused = true)]
async fn test_kill_on_k_plus_one_iteration() {
    let cluster = cluster_with(&[("web-1", "990Mi")]);
    let mut terminator = builder(&cluster).kill_after(2).build().unwrap();

    // Observations #1 and #2 only build the streak
    for expected_count in 0..2 {
        let report = terminator.run_iteration().await.unwrap();
        assert_eq!(report.killed, None);
        assert_eq!(
            terminator.tracker().get("web-1").unwrap().consecutive_count,
            expected_count
        );
    }

    let report = terminator.run_iteration().await.unwrap();
    assert_eq!(report.killed.as_deref(), Some("web-1"));
    assert_eq!(cluster.deleted_names(), vec!["web-1".to_string()]);
    assert!(terminator.tracker().get("web-1").is_none());
}

#[tokio::test]
async fn test_default_threshold_inclusive() {
    let cluster = cluster_with(&[("web-1", "950Mi")]);
    let mut terminator = builder(&cluster).kill_after(0).build().unwrap();

    let report = terminator.run_iteration().await.unwrap();
    assert_eq!(report.pods_over_limit, 1);
    assert_eq!(report.killed.as_deref(), Some("web-1"));
}

#[tokio::test]
async fn test_one_kill_per_iteration() {
    let cluster = cluster_with(&[("web-1", "999Mi"), ("web-2", "999Mi"), ("web-3", "999Mi")]);
    let mut terminator = builder(&cluster).kill_after(0).build().unwrap();

    let report = terminator.run_iteration().await.unwrap();
    assert_eq!(report.killed.as_deref(), Some("web-1"));
    assert_eq!(cluster.deleted_names().len(), 1);
    // The scan stopped at the kill, later pods were not sampled
    assert_eq!(report.pods_sampled, 1);

    let report = terminator.run_iteration().await.unwrap();
    assert_eq!(report.killed.as_deref(), Some("web-1"));
    assert_eq!(cluster.deleted_names().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_never_deletes() {
    let cluster = cluster_with(&[("web-1", "990Mi")]);
    let mut terminator = builder(&cluster).kill_after(1).dry_run(true).build().unwrap();

    let first = terminator.run_iteration().await.unwrap();
    assert_eq!(first.killed, None);

    let second = terminator.run_iteration().await.unwrap();
    assert_eq!(second.killed.as_deref(), Some("web-1"));
    assert!(terminator.tracker().get("web-1").is_none());
    assert!(cluster.deleted_names().is_empty());
}

#[tokio::test]
async fn test_kill_keeps_grace_period_hint() {
    let cluster = Arc::new(FakeCluster::new());
    let mut pod = testing::pod("web-1", "shop", "1Gi", &[]);
    pod.metadata.deletion_grace_period_seconds = Some(45);
    cluster.add_pod(pod);
    cluster.add_pod(testing::pod("web-2", "shop", "1Gi", &[]));
    cluster.set_usage("web-1", "1Gi");
    cluster.set_usage("web-2", "1Gi");

    let mut terminator = builder(&cluster).kill_after(0).build().unwrap();
    terminator.run_iteration().await.unwrap();
    terminator.run_iteration().await.unwrap();

    let deleted = cluster.deleted.lock().unwrap().clone();
    assert_eq!(
        deleted,
        vec![
            ("shop".to_string(), "web-1".to_string(), Some(45)),
            ("shop".to_string(), "web-1".to_string(), Some(45)),
        ]
    );
}

#[tokio::test]
async fn test_non_running_pods_ignored() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.add_pod(testing::with_phase(
        testing::pod("job-1", "default", "1Gi", &[]),
        "Succeeded",
    ));
    cluster.set_usage("job-1", "1Gi");

    let mut terminator = builder(&cluster).kill_after(0).build().unwrap();
    let report = terminator.run_iteration().await.unwrap();

    assert_eq!(report.pods_found, 1);
    assert_eq!(report.pods_sampled, 0);
    assert!(cluster.deleted_names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_kill_sleep_after_kill() {
    let cluster = cluster_with(&[("web-1", "999Mi")]);
    let mut terminator = builder(&cluster)
        .kill_after(0)
        .kill_sleep(Duration::from_secs(5))
        .build()
        .unwrap();

    let start = Instant::now();
    terminator.run_iteration().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_stale_record_expired_by_sweep() {
    let cluster = cluster_with(&[("web-1", "990Mi")]);
    let mut terminator = builder(&cluster)
        .kill_after(5)
        .kill_sleep(Duration::from_secs(1))
        .build()
        .unwrap();

    let report = terminator.run_iteration().await.unwrap();
    assert!(report.expired.is_empty());
    assert!(terminator.tracker().get("web-1").is_some());

    // Usage drops; the record survives until its window passes
    cluster.set_usage("web-1", "100Mi");
    let report = terminator.run_iteration().await.unwrap();
    assert!(report.expired.is_empty());

    tokio::time::advance(Duration::from_millis(1001)).await;
    let report = terminator.run_iteration().await.unwrap();
    assert_eq!(report.expired, vec!["web-1".to_string()]);
    assert!(terminator.tracker().is_empty());
}

#[tokio::test]
async fn test_api_error_is_fatal() {
    let cluster = cluster_with(&[("web-1", "990Mi")]);
    cluster.fail("apiserver unavailable");

    let terminator = builder(&cluster).build().unwrap();
    let (_tx, rx) = broadcast::channel(1);

    let result = terminator.run(rx).await;
    assert!(matches!(result, Err(TerminatorError::Kube(_))));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_loop() {
    let cluster = cluster_with(&[("web-1", "100Mi")]);
    let health = LoopHealth::new(Duration::from_secs(60));
    let terminator = builder(&cluster)
        .poll_interval(Duration::from_secs(3600))
        .health(health.clone())
        .build()
        .unwrap();

    let (tx, rx) = broadcast::channel(1);
    let handle = tokio::spawn(terminator.run(rx));

    // Let the first iteration complete and the loop park in its poll sleep
    tokio::task::yield_now().await;
    tx.send(()).unwrap();

    let result = handle.await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_iteration_updates_health() {
    let cluster = cluster_with(&[("web-1", "100Mi")]);
    let health = LoopHealth::new(Duration::from_secs(60));
    let mut terminator = builder(&cluster).health(health.clone()).build().unwrap();

    assert!(health.health().await.last_iteration_timestamp.is_none());
    terminator.run_iteration().await.unwrap();
    assert!(health.health().await.last_iteration_timestamp.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failed_delete_is_fatal() {
    let cluster = cluster_with(&[("web-1", "990Mi")]);
    cluster.fail_delete("forbidden");
    let mut terminator = builder(&cluster).kill_after(0).build().unwrap();

    let result = terminator.run_iteration().await;
    assert!(matches!(result, Err(TerminatorError::Kube(_))));
    assert!(cluster.deleted_names().is_empty());
}

#[test]
fn test_builder_uses_given_logger() {
    let cluster = cluster_with(&[]);
    let terminator = builder(&cluster)
        .logger(StructuredLogger::new(true))
        .build()
        .unwrap();
    assert!(terminator.logger().dry_run());

    let terminator = builder(&cluster).dry_run(true).build().unwrap();
    assert!(terminator.logger().dry_run());
}
