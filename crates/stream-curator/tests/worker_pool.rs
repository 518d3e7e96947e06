mod common;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use common::{TestHarness, collaborators, harness, harness_with, seed_basic, test_config};
use stream_curator::automation::{
    AutomationEngine, AutomationToggles, DeadStreamConfig, EnqueueOutcome, QueueLimits, TriggerSource,
};
use stream_curator::database::Database;
use stream_curator::errors::AppResult;
use stream_curator::models::{ChangelogAction, StreamProbeInfo};
use stream_curator::platform::memory::live_probe;
use stream_curator::platform::{InMemoryPlatform, StreamProbe};

/// Stream analysis that crashes the check it runs in
struct CrashingDecoder;

#[async_trait]
impl StreamProbe for CrashingDecoder {
    async fn probe(&self, url: &str, _timeout: Duration) -> AppResult<StreamProbeInfo> {
        panic!("decoder crashed on {url}");
    }
}

async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn processed_reaches(h: &TestHarness, expected: u64) -> impl FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send>> {
    let queue = h.engine.queue();
    move || {
        let queue = queue.clone();
        Box::pin(async move { queue.stats().await.total_processed == expected })
    }
}

fn in_flight_reaches(h: &TestHarness, expected: usize) -> impl FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send>> {
    let queue = h.engine.queue();
    move || {
        let queue = queue.clone();
        Box::pin(async move { queue.in_flight_count().await == expected })
    }
}

#[tokio::test]
async fn batch_checks_queued_channels_and_reorders_streams() {
    let h = harness().await;
    seed_basic(&h.platform).await;
    h.platform.add_stream(11, "BBC One FHD", Some(1)).await;
    h.platform.add_channel(1, "BBC One", Some(100), &[10, 11]).await;
    h.platform.set_probe_result(10, Ok(live_probe(1280, 720, 3000))).await;

    let service = h.engine.service();
    let report = service.enqueue_channels(&[1, 2], false).await.unwrap();
    assert_eq!(report.enqueued, vec![1, 2]);

    assert_eq!(h.engine.pool().process_batch().await, 2);

    assert_eq!(h.platform.channel(1).await.unwrap().stream_ids, vec![11, 10]);
    assert_eq!(h.platform.probe_count().await, 3);

    let immunity = h.engine.immunity();
    assert!(immunity.is_immune(1));
    assert!(immunity.is_immune(2));
    assert!(!immunity.is_immune(3));

    let stats = h.engine.queue().stats().await;
    assert_eq!(stats.total_processed, 2);
    assert_eq!(stats.total_failed, 0);
    assert_eq!(stats.in_flight, 0);

    let checks = h
        .engine
        .service()
        .recent_changelog(10)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.action == ChangelogAction::ChannelCheck)
        .count();
    assert_eq!(checks, 2);

    // Freshly checked channels are now skipped unless bypassed
    let report = service.enqueue_channels(&[1], false).await.unwrap();
    assert_eq!(report.skipped_immune, vec![1]);
}

#[tokio::test]
async fn dead_streams_are_removed_only_while_a_live_one_remains() {
    let h = harness().await;
    seed_basic(&h.platform).await;
    h.platform.add_stream(21, "CNN Backup", Some(2)).await;
    h.platform.add_channel(2, "CNN", Some(100), &[21, 20]).await;
    h.platform.set_probe_result(21, Err("403 Forbidden".to_string())).await;
    h.engine
        .service()
        .update_dead_stream_config(DeadStreamConfig {
            remove_dead_streams: true,
            ..Default::default()
        })
        .await
        .unwrap();

    h.engine.service().enqueue_channels(&[2], true).await.unwrap();
    h.engine.pool().process_batch().await;
    assert_eq!(h.platform.channel(2).await.unwrap().stream_ids, vec![20]);

    // With every stream dead nothing is removed
    h.platform.set_probe_result(20, Err("timeout".to_string())).await;
    h.engine.service().enqueue_channels(&[2], true).await.unwrap();
    h.engine.pool().process_batch().await;
    assert_eq!(h.platform.channel(2).await.unwrap().stream_ids, vec![20]);
}

#[tokio::test]
async fn failed_checks_are_counted_and_grant_no_immunity() {
    let h = harness().await;
    seed_basic(&h.platform).await;

    h.engine
        .queue()
        .enqueue(404, true, TriggerSource::ManualCheck)
        .await
        .unwrap();
    assert_eq!(h.engine.pool().process_batch().await, 1);

    let stats = h.engine.queue().stats().await;
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.total_failed, 1);
    assert!(!h.engine.immunity().is_immune(404));

    let log = h.engine.service().recent_changelog(5).await.unwrap();
    assert!(log.iter().any(|e| e.action == ChangelogAction::ChannelCheckFailed));
}

#[tokio::test]
async fn immunity_gained_while_queued_is_honored_at_dequeue() {
    let h = harness().await;
    seed_basic(&h.platform).await;

    h.engine.service().enqueue_channels(&[3], false).await.unwrap();
    h.engine.service().enqueue_channels(&[2], true).await.unwrap();
    h.engine.immunity().mark_checked(3, Utc::now());
    h.engine.immunity().mark_checked(2, Utc::now());

    // Channel 2 was enqueued with bypass, channel 3 was not
    assert_eq!(h.engine.pool().process_batch().await, 1);
    assert_eq!(h.platform.probe_count().await, 1);

    let status = h.engine.pool().status();
    assert_eq!(status.skipped_immune_total, 1);
    assert_eq!(status.dispatched_total, 1);
    assert_eq!(h.engine.queue().stats().await.total_abandoned, 1);
    assert!(!h.engine.queue().contains(3).await);
}

#[tokio::test]
async fn per_run_budget_limits_a_batch() {
    let mut config = test_config(AutomationToggles::default());
    config.automation.queue.max_channels_per_run = 2;
    let h = harness_with(config).await;
    seed_basic(&h.platform).await;

    h.engine.service().enqueue_channels(&[1, 2, 3], false).await.unwrap();

    assert_eq!(h.engine.pool().process_batch().await, 2);
    assert_eq!(h.engine.queue().len().await, 1);
    assert_eq!(h.engine.pool().process_batch().await, 1);
    assert!(h.engine.queue().is_empty().await);
}

#[tokio::test]
async fn running_pool_drains_the_queue_and_stops_on_cancel() {
    let h = harness().await;
    seed_basic(&h.platform).await;

    let token = CancellationToken::new();
    let pool = h.engine.pool();
    let worker = tokio::spawn({
        let pool = pool.clone();
        let token = token.clone();
        async move { pool.run(token).await }
    });

    h.engine.service().enqueue_channels(&[1, 2, 3], false).await.unwrap();
    wait_for(processed_reaches(&h, 3)).await;
    assert!(pool.status().running);
    assert!(pool.status().last_dispatch_at.is_some());

    token.cancel();
    worker.await.unwrap();
    assert!(!pool.status().running);
}

#[tokio::test]
async fn shutdown_waits_for_running_checks() {
    let h = harness().await;
    seed_basic(&h.platform).await;
    h.platform.set_probe_delay(Duration::from_millis(300)).await;

    let token = CancellationToken::new();
    let pool = h.engine.pool();
    let worker = tokio::spawn({
        let pool = pool.clone();
        let token = token.clone();
        async move { pool.run(token).await }
    });

    h.engine.service().enqueue_channels(&[1], false).await.unwrap();
    wait_for(in_flight_reaches(&h, 1)).await;

    // In-flight channels are not enqueued twice
    let outcome = h
        .engine
        .queue()
        .enqueue(1, true, TriggerSource::ManualCheck)
        .await
        .unwrap();
    assert_eq!(outcome, EnqueueOutcome::InFlight);

    token.cancel();
    worker.await.unwrap();

    let stats = h.engine.queue().stats().await;
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(pool.status().active_workers, 0);
}

#[tokio::test]
async fn runtime_limit_changes_apply_to_queue_and_pool() {
    let h = harness().await;
    seed_basic(&h.platform).await;
    let service = h.engine.service();

    service.enqueue_channels(&[1, 2], false).await.unwrap();
    service
        .update_queue_limits(QueueLimits {
            max_size: 1,
            max_channels_per_run: 10,
        })
        .await
        .unwrap();

    // Entries beyond the lowered ceiling stay queued
    assert_eq!(h.engine.queue().len().await, 2);
    assert_eq!(h.engine.queue().max_size(), 1);
    assert!(service.enqueue_channels(&[3], false).await.is_err());
    assert_eq!(h.engine.pool().status().max_channels_per_run, 10);

    let mut concurrency = service.concurrency_limits().await;
    concurrency.global_limit = 8;
    service.update_concurrency_limits(concurrency).await.unwrap();
    assert_eq!(h.engine.pool().status().global_limit, 8);

    concurrency.global_limit = 0;
    assert!(service.update_concurrency_limits(concurrency).await.is_err());
    assert_eq!(service.concurrency_limits().await.global_limit, 8);
}

#[tokio::test]
async fn panicking_check_releases_the_channel() {
    let database = Database::new_in_memory().await.unwrap();
    database.migrate().await.unwrap();
    let platform = Arc::new(InMemoryPlatform::new());
    seed_basic(&platform).await;

    let mut collaborators = collaborators(&platform);
    collaborators.probe = Arc::new(CrashingDecoder);
    let engine = AutomationEngine::build(&test_config(AutomationToggles::default()), &database, collaborators)
        .await
        .unwrap();

    engine.service().enqueue_channels(&[1], false).await.unwrap();
    assert_eq!(engine.pool().process_batch().await, 1);

    let stats = engine.queue().stats().await;
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.total_failed, 1);
    assert_eq!(engine.pool().status().active_workers, 0);
    assert!(!engine.immunity().is_immune(1));

    let outcome = engine
        .queue()
        .enqueue(1, true, TriggerSource::GlobalSweep)
        .await
        .unwrap();
    assert_eq!(outcome, EnqueueOutcome::Enqueued);
}

#[tokio::test]
async fn concurrent_checks_stay_within_the_global_limit() {
    let mut config = test_config(AutomationToggles::default());
    config.automation.concurrency.global_limit = 2;
    let h = harness_with(config).await;
    seed_basic(&h.platform).await;
    for id in 4..=6 {
        h.platform.add_stream(id * 10, "Extra", Some(1)).await;
        h.platform.add_channel(id, "Extra", None, &[id * 10]).await;
    }
    h.platform.set_probe_delay(Duration::from_millis(100)).await;

    h.engine
        .service()
        .enqueue_channels(&[1, 2, 3, 4, 5, 6], false)
        .await
        .unwrap();
    assert_eq!(h.engine.pool().process_batch().await, 6);

    assert_eq!(h.platform.probe_count().await, 6);
    assert_eq!(h.platform.peak_concurrent_probes().await, 2);
    assert_eq!(h.engine.pool().status().active_workers, 0);
}

#[tokio::test]
async fn stagger_delay_spaces_out_streams_of_one_channel() {
    let mut config = test_config(AutomationToggles::default());
    config.automation.concurrency.stagger_delay = Duration::from_millis(60);
    let h = harness_with(config).await;
    seed_basic(&h.platform).await;
    h.platform.add_stream(11, "BBC One FHD", Some(1)).await;
    h.platform.add_stream(12, "BBC One SD", Some(1)).await;
    h.platform.add_channel(1, "BBC One", Some(100), &[10, 11, 12]).await;

    h.engine.service().enqueue_channels(&[1], false).await.unwrap();
    let started = Instant::now();
    assert_eq!(h.engine.pool().process_batch().await, 1);

    assert!(started.elapsed() >= Duration::from_millis(120));
    assert_eq!(h.platform.probe_count().await, 3);
    assert_eq!(h.platform.peak_concurrent_probes().await, 1);
}

#[tokio::test]
async fn shutdown_aborts_checks_that_outlast_the_grace_period() {
    let mut config = test_config(AutomationToggles::default());
    config.automation.shutdown_grace_period = Duration::from_millis(100);
    let h = harness_with(config).await;
    seed_basic(&h.platform).await;
    h.platform.set_probe_delay(Duration::from_secs(1)).await;

    let token = CancellationToken::new();
    let pool = h.engine.pool();
    let worker = tokio::spawn({
        let pool = pool.clone();
        let token = token.clone();
        async move { pool.run(token).await }
    });

    h.engine.service().enqueue_channels(&[1], false).await.unwrap();
    wait_for(in_flight_reaches(&h, 1)).await;

    let started = Instant::now();
    token.cancel();
    worker.await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    let stats = h.engine.queue().stats().await;
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.total_processed, 0);
    assert_eq!(stats.total_abandoned, 1);
    assert_eq!(pool.status().active_workers, 0);
    assert!(!h.engine.immunity().is_immune(1));

    // The aborted channel is eligible again
    let report = h.engine.service().enqueue_channels(&[1], false).await.unwrap();
    assert_eq!(report.enqueued, vec![1]);
}
