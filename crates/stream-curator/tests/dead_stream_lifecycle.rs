mod common;

use common::{TestHarness, harness, seed_basic};
use stream_curator::automation::DeadStreamConfig;
use stream_curator::automation::lifecycle::LifecycleTransition;
use stream_curator::errors::AppError;
use stream_curator::models::{ChangelogAction, ChannelId};
use stream_curator::platform::memory::live_probe;

const PROFILE: i64 = 7;

async fn lifecycle_harness() -> TestHarness {
    let h = harness().await;
    seed_basic(&h.platform).await;
    h.platform
        .add_profile(PROFILE, "Living Room", &[(1, true), (2, true), (3, false)])
        .await;
    h.engine
        .service()
        .update_dead_stream_config(DeadStreamConfig {
            enabled: true,
            target_profile_id: Some(PROFILE),
            min_height: 720,
            ..Default::default()
        })
        .await
        .unwrap();
    h
}

async fn check_now(h: &TestHarness, channel_id: ChannelId) {
    h.engine.service().enqueue_channels(&[channel_id], true).await.unwrap();
    assert_eq!(h.engine.pool().process_batch().await, 1);
}

async fn enabled_in_profile(h: &TestHarness, channel_id: ChannelId) -> Option<bool> {
    h.platform.profile(PROFILE).await.unwrap().channel_state(channel_id)
}

#[tokio::test]
async fn dead_channel_is_disabled_after_snapshot_and_restored_when_alive() {
    let h = lifecycle_harness().await;
    h.platform.set_probe_result(10, Err("connection refused".to_string())).await;

    check_now(&h, 1).await;

    assert_eq!(enabled_in_profile(&h, 1).await, Some(false));
    let snapshot = h.engine.service().get_snapshot(PROFILE).await.unwrap();
    assert_eq!(snapshot.state_of(1), Some(true));
    assert_eq!(snapshot.state_of(3), Some(false));

    let records = h.engine.service().lifecycle_records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].channel_id, 1);
    assert!(records[0].prior_enabled);

    let actions: Vec<_> = h
        .engine
        .service()
        .recent_changelog(20)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert!(actions.contains(&ChangelogAction::SnapshotCaptured));
    assert!(actions.contains(&ChangelogAction::ChannelDisabled));

    h.platform.set_probe_result(10, Ok(live_probe(1920, 1080, 8000))).await;
    check_now(&h, 1).await;

    assert_eq!(enabled_in_profile(&h, 1).await, Some(true));
    assert!(h.engine.service().lifecycle_records().await.unwrap().is_empty());
}

#[tokio::test]
async fn streams_below_thresholds_count_as_dead() {
    let h = lifecycle_harness().await;
    h.platform.set_probe_result(20, Ok(live_probe(720, 576, 2500))).await;

    check_now(&h, 2).await;

    assert_eq!(enabled_in_profile(&h, 2).await, Some(false));
    assert_eq!(h.engine.lifecycle().last_live_count(2), Some(0));
}

#[tokio::test]
async fn channels_already_disabled_are_left_alone() {
    let h = lifecycle_harness().await;
    h.platform.set_probe_result(30, Err("404".to_string())).await;

    check_now(&h, 3).await;

    assert_eq!(enabled_in_profile(&h, 3).await, Some(false));
    assert!(h.engine.service().lifecycle_records().await.unwrap().is_empty());
    // Nothing was disabled, so no snapshot was needed
    assert!(matches!(
        h.engine.service().get_snapshot(PROFILE).await,
        Err(AppError::NotFound { .. })
    ));
}

#[tokio::test]
async fn existing_snapshot_decides_the_restored_state() {
    let h = lifecycle_harness().await;
    let service = h.engine.service();

    // Captured while channel 3 was still switched off by the user
    service.capture_snapshot(PROFILE).await.unwrap();
    h.platform.add_profile(PROFILE, "Living Room", &[(1, true), (2, true), (3, true)]).await;

    h.platform.set_probe_result(30, Err("timeout".to_string())).await;
    check_now(&h, 3).await;
    assert_eq!(enabled_in_profile(&h, 3).await, Some(false));

    let lifecycle = h.engine.lifecycle();
    h.platform.set_probe_result(30, Ok(live_probe(1280, 720, 3000))).await;
    h.engine.service().enqueue_channels(&[3], true).await.unwrap();
    h.engine.pool().process_batch().await;

    // The snapshot, not the state seen at disable time, wins
    assert_eq!(enabled_in_profile(&h, 3).await, Some(false));
    assert!(lifecycle.list_records().await.unwrap().is_empty());
}

#[tokio::test]
async fn lifecycle_is_inert_when_disabled() {
    let h = harness().await;
    seed_basic(&h.platform).await;
    h.platform.add_profile(PROFILE, "Living Room", &[(1, true)]).await;
    h.platform.set_probe_result(10, Err("gone".to_string())).await;

    check_now(&h, 1).await;

    assert_eq!(enabled_in_profile(&h, 1).await, Some(true));
    assert!(h.engine.service().list_snapshots().await.unwrap().is_empty());
}

#[tokio::test]
async fn disable_empty_channels_covers_unassigned_and_dead_channels() {
    let h = lifecycle_harness().await;
    h.platform.add_channel(4, "Empty", None, &[]).await;
    h.platform
        .add_profile(PROFILE, "Living Room", &[(1, true), (2, true), (3, false), (4, true)])
        .await;

    let report = h.engine.service().disable_empty_channels().await.unwrap();

    assert_eq!(report.profile_id, PROFILE);
    assert_eq!(report.evaluated, 3);
    assert_eq!(report.disabled, vec![4]);
    assert!(report.snapshot_captured);
    assert_eq!(enabled_in_profile(&h, 4).await, Some(false));
    assert_eq!(enabled_in_profile(&h, 1).await, Some(true));

    // A second pass finds nothing new
    let report = h.engine.service().disable_empty_channels().await.unwrap();
    assert!(report.disabled.is_empty());
    assert!(!report.snapshot_captured);
}

#[tokio::test]
async fn disable_empty_channels_requires_a_target_profile() {
    let h = harness().await;
    let err = h.engine.service().disable_empty_channels().await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}

#[tokio::test]
async fn enabling_without_a_target_profile_is_rejected() {
    let h = harness().await;
    let err = h
        .engine
        .service()
        .update_dead_stream_config(DeadStreamConfig {
            enabled: true,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    assert!(!h.engine.service().dead_stream_config().await.enabled);
}

#[tokio::test]
async fn manual_snapshot_lifecycle() {
    let h = lifecycle_harness().await;
    let service = h.engine.service();

    let snapshot = service.capture_snapshot(PROFILE).await.unwrap();
    assert_eq!(snapshot.profile_name, "Living Room");
    assert_eq!(snapshot.channel_states.len(), 3);
    assert_eq!(service.list_snapshots().await.unwrap().len(), 1);

    service.delete_snapshot(PROFILE).await.unwrap();
    assert!(matches!(
        service.delete_snapshot(PROFILE).await,
        Err(AppError::NotFound { .. })
    ));
    assert!(matches!(
        service.capture_snapshot(999).await,
        Err(AppError::NotFound { .. })
    ));
}

#[tokio::test]
async fn transitions_are_reported() {
    let h = lifecycle_harness().await;
    h.platform.set_probe_result(10, Err("dead".to_string())).await;
    let report = stream_curator::models::ChannelCheckReport {
        channel_id: 1,
        channel_name: "BBC One".to_string(),
        checked_at: chrono::Utc::now(),
        streams: Vec::new(),
        total_streams: 1,
        live_streams: 0,
        dead_streams: 1,
        most_common_resolution: None,
        average_bitrate_kbps: None,
        best_score: None,
        reordered: false,
        removed_streams: Vec::new(),
    };

    let lifecycle = h.engine.lifecycle();
    let transition = lifecycle.on_channel_checked(&report).await.unwrap();
    assert_eq!(
        transition,
        Some(LifecycleTransition::Disabled {
            profile_id: PROFILE,
            channel_id: 1,
            snapshot_captured: true,
        })
    );
    // Already disabled by the lifecycle manager: no second transition
    assert_eq!(lifecycle.on_channel_checked(&report).await.unwrap(), None);

    let revived = stream_curator::models::ChannelCheckReport {
        live_streams: 1,
        dead_streams: 0,
        ..report
    };
    assert_eq!(
        lifecycle.on_channel_checked(&revived).await.unwrap(),
        Some(LifecycleTransition::Restored {
            profile_id: PROFILE,
            channel_id: 1,
            enabled: true,
        })
    );
}
