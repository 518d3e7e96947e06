//! Dead-stream lifecycle management
//!
//! Per (profile, channel) the manager moves between `enabled` and
//! `disabled-by-lifecycle`. A channel is disabled in the target profile once a
//! check finds no live stream; a lifecycle record remembers that the manager
//! owns the disablement. When a later check finds a live stream again, the
//! channel's pre-disablement state is restored from the profile snapshot, or
//! from the record when no snapshot covers the channel.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::types::DeadStreamConfig;
use crate::database::repositories::{LifecycleRecordRepository, SettingsRepository};
use crate::errors::{AppError, AppResult};
use crate::models::{
    ChangelogAction, ChangelogEntry, ChannelCheckReport, ChannelId, LifecycleRecord, ProfileId,
    ProfileSnapshot, StreamProbeInfo, StreamStatus,
};
use crate::platform::{ChangelogSink, ChannelDirectory, ProfileStore, SnapshotStore};

const DEAD_STREAM_SETTINGS_KEY: &str = "dead_streams";

/// Classify a probed stream.
///
/// Zero resolution or zero bitrate is dead regardless of thresholds. Each
/// nonzero threshold then marks streams below it as dead. An unknown bitrate
/// does not fail the bitrate threshold.
pub fn classify_stream(config: &DeadStreamConfig, info: &StreamProbeInfo, score: f64) -> StreamStatus {
    let resolution_zero = info.resolution.is_none_or(|r| r.is_zero());
    let bitrate_zero = info.bitrate_kbps == Some(0);
    if resolution_zero || bitrate_zero {
        return StreamStatus::Dead;
    }

    if let Some(resolution) = info.resolution {
        if config.min_width > 0 && resolution.width < config.min_width {
            return StreamStatus::Dead;
        }
        if config.min_height > 0 && resolution.height < config.min_height {
            return StreamStatus::Dead;
        }
    }

    if config.min_bitrate_kbps > 0 {
        if let Some(bitrate) = info.bitrate_kbps {
            if bitrate < config.min_bitrate_kbps {
                return StreamStatus::Dead;
            }
        }
    }

    if config.min_score > 0.0 && score < config.min_score {
        return StreamStatus::Dead;
    }

    StreamStatus::Live
}

/// State change applied by the lifecycle manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "transition")]
pub enum LifecycleTransition {
    Disabled {
        profile_id: ProfileId,
        channel_id: ChannelId,
        snapshot_captured: bool,
    },
    Restored {
        profile_id: ProfileId,
        channel_id: ChannelId,
        enabled: bool,
    },
}

/// Result of the manual "disable empty channels" action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyChannelsReport {
    pub profile_id: ProfileId,
    pub evaluated: usize,
    pub disabled: Vec<ChannelId>,
    pub snapshot_captured: bool,
}

pub struct DeadStreamLifecycleManager {
    config: RwLock<DeadStreamConfig>,
    settings: SettingsRepository,
    records: LifecycleRecordRepository,
    profiles: Arc<dyn ProfileStore>,
    snapshots: Arc<dyn SnapshotStore>,
    directory: Arc<dyn ChannelDirectory>,
    changelog: Arc<dyn ChangelogSink>,
    /// Live stream count seen at each channel's latest check
    last_live_counts: DashMap<ChannelId, usize>,
    /// Serializes transitions so the first-disable snapshot is captured once
    transitions: Mutex<()>,
}

impl DeadStreamLifecycleManager {
    /// Build the manager, preferring stored configuration over `seed`
    #[allow(clippy::too_many_arguments)]
    pub async fn load(
        seed: DeadStreamConfig,
        settings: SettingsRepository,
        records: LifecycleRecordRepository,
        profiles: Arc<dyn ProfileStore>,
        snapshots: Arc<dyn SnapshotStore>,
        directory: Arc<dyn ChannelDirectory>,
        changelog: Arc<dyn ChangelogSink>,
    ) -> AppResult<Self> {
        let config = match settings.get::<DeadStreamConfig>(DEAD_STREAM_SETTINGS_KEY).await? {
            Some(stored) => stored,
            None => {
                settings.put(DEAD_STREAM_SETTINGS_KEY, &seed).await?;
                seed
            }
        };

        info!(
            "Dead-stream handling {} (target profile: {:?}, snapshots: {})",
            if config.enabled { "enabled" } else { "disabled" },
            config.target_profile_id,
            config.use_snapshot
        );

        Ok(Self {
            config: RwLock::new(config),
            settings,
            records,
            profiles,
            snapshots,
            directory,
            changelog,
            last_live_counts: DashMap::new(),
            transitions: Mutex::new(()),
        })
    }

    pub async fn config(&self) -> DeadStreamConfig {
        self.config.read().await.clone()
    }

    pub async fn update_config(&self, config: DeadStreamConfig) -> AppResult<DeadStreamConfig> {
        config.validate().map_err(AppError::validation)?;
        let mut current = self.config.write().await;
        self.settings.put(DEAD_STREAM_SETTINGS_KEY, &config).await?;
        *current = config.clone();
        info!("Dead-stream configuration updated");
        Ok(config)
    }

    /// Live stream count from the channel's latest check, if it was checked
    pub fn last_live_count(&self, channel_id: ChannelId) -> Option<usize> {
        self.last_live_counts.get(&channel_id).map(|count| *count)
    }

    /// React to a finished channel check
    pub async fn on_channel_checked(&self, report: &ChannelCheckReport) -> AppResult<Option<LifecycleTransition>> {
        self.last_live_counts.insert(report.channel_id, report.live_streams);

        let config = self.config().await;
        if !config.enabled {
            return Ok(None);
        }
        let Some(profile_id) = config.target_profile_id else {
            return Ok(None);
        };

        if report.live_streams == 0 {
            let reason = format!(
                "no live streams ({} of {} dead)",
                report.dead_streams, report.total_streams
            );
            self.disable_channel(&config, profile_id, report.channel_id, &reason).await
        } else {
            self.restore_channel(profile_id, report.channel_id).await
        }
    }

    async fn disable_channel(
        &self,
        config: &DeadStreamConfig,
        profile_id: ProfileId,
        channel_id: ChannelId,
        reason: &str,
    ) -> AppResult<Option<LifecycleTransition>> {
        let _guard = self.transitions.lock().await;

        if self.records.find(profile_id, channel_id).await?.is_some() {
            debug!("Channel {} already disabled by lifecycle in profile {}", channel_id, profile_id);
            return Ok(None);
        }

        let profile = self.profiles.get_profile(profile_id).await?;
        match profile.channel_state(channel_id) {
            Some(true) => {}
            Some(false) => {
                debug!("Channel {} already disabled in profile {}, leaving it alone", channel_id, profile_id);
                return Ok(None);
            }
            None => {
                debug!("Channel {} is not a member of profile {}", channel_id, profile_id);
                return Ok(None);
            }
        }

        let mut snapshot_captured = false;
        if config.use_snapshot && self.snapshots.get(profile_id).await?.is_none() {
            let snapshot = ProfileSnapshot::capture(&profile, Utc::now());
            self.snapshots.save(&snapshot).await?;
            snapshot_captured = true;
            info!(
                "Captured snapshot of profile {} ({} channels) before first disablement",
                profile_id,
                snapshot.channel_states.len()
            );
            self.record(
                ChangelogAction::SnapshotCaptured,
                format!("Captured snapshot of profile '{}'", profile.name),
                json!({ "profile_id": profile_id, "channels": snapshot.channel_states.len(), "automatic": true }),
            )
            .await;
        }

        self.profiles.set_channel_enabled(profile_id, channel_id, false).await?;
        self.records
            .insert(&LifecycleRecord {
                profile_id,
                channel_id,
                prior_enabled: true,
                reason: reason.to_string(),
                disabled_at: Utc::now(),
            })
            .await?;

        warn!("Disabled channel {} in profile {}: {}", channel_id, profile_id, reason);
        self.record(
            ChangelogAction::ChannelDisabled,
            format!("Disabled channel {channel_id} in profile '{}'", profile.name),
            json!({ "profile_id": profile_id, "channel_id": channel_id, "reason": reason }),
        )
        .await;

        Ok(Some(LifecycleTransition::Disabled {
            profile_id,
            channel_id,
            snapshot_captured,
        }))
    }

    async fn restore_channel(&self, profile_id: ProfileId, channel_id: ChannelId) -> AppResult<Option<LifecycleTransition>> {
        let _guard = self.transitions.lock().await;

        let Some(record) = self.records.find(profile_id, channel_id).await? else {
            return Ok(None);
        };

        let restored = match self.snapshots.get(profile_id).await? {
            Some(snapshot) => snapshot.state_of(channel_id).unwrap_or(record.prior_enabled),
            None => record.prior_enabled,
        };

        if restored {
            self.profiles.set_channel_enabled(profile_id, channel_id, true).await?;
        }
        self.records.delete(profile_id, channel_id).await?;

        info!(
            "Channel {} has live streams again, restored enabled={} in profile {}",
            channel_id, restored, profile_id
        );
        self.record(
            ChangelogAction::ChannelReenabled,
            format!("Restored channel {channel_id} in profile {profile_id}"),
            json!({ "profile_id": profile_id, "channel_id": channel_id, "enabled": restored }),
        )
        .await;

        Ok(Some(LifecycleTransition::Restored {
            profile_id,
            channel_id,
            enabled: restored,
        }))
    }

    /// Disable every enabled channel of the target profile that has no
    /// assigned streams or had no live stream at its latest check
    pub async fn disable_empty_channels_now(&self) -> AppResult<EmptyChannelsReport> {
        let config = self.config().await;
        let profile_id = config.target_profile_id.ok_or_else(|| {
            AppError::validation("dead-stream target profile is not configured")
        })?;

        let profile = self.profiles.get_profile(profile_id).await?;
        let candidates: Vec<ChannelId> = profile.enabled_channels().collect();
        let mut report = EmptyChannelsReport {
            profile_id,
            evaluated: candidates.len(),
            ..Default::default()
        };

        for channel_id in candidates {
            let streams = self.directory.channel_streams(channel_id).await?;
            let reason = if streams.is_empty() {
                "no streams assigned"
            } else if self.last_live_count(channel_id) == Some(0) {
                "no live streams at last check"
            } else {
                continue;
            };

            if let Some(LifecycleTransition::Disabled { snapshot_captured, .. }) =
                self.disable_channel(&config, profile_id, channel_id, reason).await?
            {
                report.disabled.push(channel_id);
                report.snapshot_captured |= snapshot_captured;
            }
        }

        info!(
            "Disable-empty pass over profile {}: {} of {} channels disabled",
            profile_id,
            report.disabled.len(),
            report.evaluated
        );
        self.record(
            ChangelogAction::EmptyChannelsDisabled,
            format!("Disabled {} empty channels in profile '{}'", report.disabled.len(), profile.name),
            serde_json::to_value(&report)?,
        )
        .await;

        Ok(report)
    }

    /// Capture (or replace) the snapshot of a profile on demand
    pub async fn capture_snapshot(&self, profile_id: ProfileId) -> AppResult<ProfileSnapshot> {
        let _guard = self.transitions.lock().await;
        let profile = self.profiles.get_profile(profile_id).await?;
        let snapshot = ProfileSnapshot::capture(&profile, Utc::now());
        self.snapshots.save(&snapshot).await?;

        info!("Captured snapshot of profile {} ({} channels)", profile_id, snapshot.channel_states.len());
        self.record(
            ChangelogAction::SnapshotCaptured,
            format!("Captured snapshot of profile '{}'", profile.name),
            json!({ "profile_id": profile_id, "channels": snapshot.channel_states.len(), "automatic": false }),
        )
        .await;

        Ok(snapshot)
    }

    pub async fn get_snapshot(&self, profile_id: ProfileId) -> AppResult<Option<ProfileSnapshot>> {
        self.snapshots.get(profile_id).await
    }

    pub async fn list_snapshots(&self) -> AppResult<Vec<ProfileSnapshot>> {
        self.snapshots.list().await
    }

    pub async fn delete_snapshot(&self, profile_id: ProfileId) -> AppResult<bool> {
        let deleted = self.snapshots.delete(profile_id).await?;
        if deleted {
            self.record(
                ChangelogAction::SnapshotDeleted,
                format!("Deleted snapshot of profile {profile_id}"),
                json!({ "profile_id": profile_id }),
            )
            .await;
        }
        Ok(deleted)
    }

    /// Channels currently disabled by the lifecycle manager
    pub async fn list_records(&self) -> AppResult<Vec<LifecycleRecord>> {
        self.records.list().await
    }

    async fn record(&self, action: ChangelogAction, summary: String, details: serde_json::Value) {
        if let Err(e) = self.changelog.append(ChangelogEntry::new(action, summary, details)).await {
            warn!("Failed to write {} changelog entry: {}", action, e);
        }
    }
}
