//! Facade exposing every automation capability to the web layer

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::check_queue::{CheckQueue, CheckQueueEntry, CheckQueueStats};
use super::controller::{PipelineController, RunSummary, TriggerHandle};
use super::epg_rules::{EpgRuleService, RegenerationReport};
use super::immunity::ImmunityTracker;
use super::lifecycle::{DeadStreamLifecycleManager, EmptyChannelsReport};
use super::overrides::OverrideResolver;
use super::scheduler::AutomationScheduler;
use super::settings::{AutomationSettingsStore, PipelineSettingsInput, PipelineSettingsView};
use super::types::{
    ChannelScope, ConcurrencyLimits, DeadStreamConfig, EnqueueOutcome, QueueLimits,
    TriggerRequest, TriggerSource,
};
use super::worker_pool::{WorkerPool, WorkerPoolStatus};
use crate::database::repositories::ChangelogRepository;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AutoCreateRule, AutoCreateRuleRequest, ChangelogEntry, ChannelId, CreateScheduledEventRequest,
    EffectiveSettings, GroupId, LifecycleRecord, ModeOverride, Profile, ProfileId, ProfileSnapshot,
    RuleMatch, RuleTestRequest, ScheduledEvent,
};
use crate::platform::{ChannelDirectory, ProfileStore};

/// Running status of the automation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationStatus {
    pub pipeline: PipelineSettingsView,
    pub queue: CheckQueueStats,
    pub workers: WorkerPoolStatus,
    pub marked_channels: Vec<ChannelId>,
    pub immune_channels: usize,
    pub global_schedule: String,
    pub next_global_sweep: Option<DateTime<Utc>>,
    pub next_scheduled_event: Option<DateTime<Utc>>,
    pub pending_events: usize,
    pub lifecycle_disabled_channels: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalScheduleView {
    pub expression: String,
    pub timezone: String,
    pub enabled: bool,
    pub next_run: Option<DateTime<Utc>>,
}

/// Stored override plus the resolved values of a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettingsView {
    pub channel_id: ChannelId,
    pub group_id: Option<GroupId>,
    #[serde(rename = "override")]
    pub stored: ModeOverride,
    pub effective: EffectiveSettings,
}

/// Result of a direct enqueue request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueReport {
    pub enqueued: Vec<ChannelId>,
    pub already_queued: Vec<ChannelId>,
    pub skipped_immune: Vec<ChannelId>,
    pub skipped_disabled: Vec<ChannelId>,
}

pub struct AutomationService {
    pub(super) settings: Arc<AutomationSettingsStore>,
    pub(super) queue: Arc<CheckQueue>,
    pub(super) immunity: Arc<ImmunityTracker>,
    pub(super) pool: Arc<WorkerPool>,
    pub(super) controller: Arc<PipelineController>,
    pub(super) triggers: TriggerHandle,
    pub(super) scheduler: Arc<AutomationScheduler>,
    pub(super) rules: Arc<EpgRuleService>,
    pub(super) lifecycle: Arc<DeadStreamLifecycleManager>,
    pub(super) overrides: OverrideResolver,
    pub(super) directory: Arc<dyn ChannelDirectory>,
    pub(super) profiles: Arc<dyn ProfileStore>,
    pub(super) changelog: ChangelogRepository,
    pub(super) timezone: Tz,
}

impl AutomationService {
    // Pipeline configuration

    pub async fn pipeline_settings(&self) -> PipelineSettingsView {
        self.settings.pipeline().await
    }

    pub async fn update_pipeline_settings(&self, input: PipelineSettingsInput) -> AppResult<PipelineSettingsView> {
        self.settings.update_pipeline(input).await
    }

    pub async fn queue_limits(&self) -> QueueLimits {
        self.settings.snapshot().await.queue
    }

    pub async fn update_queue_limits(&self, limits: QueueLimits) -> AppResult<QueueLimits> {
        let limits = self.settings.update_queue_limits(limits).await?;
        self.pool.update_queue_limits(&limits);
        Ok(limits)
    }

    pub async fn concurrency_limits(&self) -> ConcurrencyLimits {
        self.settings.snapshot().await.concurrency
    }

    pub async fn update_concurrency_limits(&self, limits: ConcurrencyLimits) -> AppResult<ConcurrencyLimits> {
        let limits = self.settings.update_concurrency(limits).await?;
        self.pool.update_concurrency(&limits);
        Ok(limits)
    }

    pub async fn global_schedule(&self) -> GlobalScheduleView {
        let settings = self.settings.snapshot().await;
        GlobalScheduleView {
            expression: settings.global_schedule,
            timezone: self.timezone.to_string(),
            enabled: settings.toggles.scheduled_global_action,
            next_run: self.scheduler.next_global_sweep().await,
        }
    }

    pub async fn update_global_schedule(&self, expression: &str) -> AppResult<GlobalScheduleView> {
        self.settings.update_global_schedule(expression).await?;
        info!("Global sweep schedule set to '{}'", expression.trim());
        Ok(self.global_schedule().await)
    }

    // Triggers and queue

    /// Full update, match and check cycle over every channel, bypassing immunity
    pub async fn trigger_global_action(&self) -> AppResult<RunSummary> {
        self.triggers.request(TriggerRequest::global_sweep()).await
    }

    pub async fn check_channel(&self, channel_id: ChannelId, bypass_immunity: bool) -> AppResult<RunSummary> {
        self.triggers
            .request(TriggerRequest::manual_check(vec![channel_id], bypass_immunity))
            .await
    }

    /// Match streams and mark changed channels without checking them now
    pub async fn discover_streams(&self, scope: ChannelScope) -> AppResult<RunSummary> {
        self.triggers.request(TriggerRequest::discovery(scope)).await
    }

    /// Enqueue channels directly. Unknown channels fail the whole request
    /// before anything is queued; channels whose checking is disabled are
    /// reported and skipped. A full queue is reported to the caller;
    /// channels enqueued before it filled stay queued.
    pub async fn enqueue_channels(&self, channel_ids: &[ChannelId], bypass_immunity: bool) -> AppResult<EnqueueReport> {
        let mut channels = Vec::with_capacity(channel_ids.len());
        for &channel_id in channel_ids {
            channels.push(self.directory.get_channel(channel_id).await?);
        }

        let mut report = EnqueueReport::default();
        let now = Utc::now();
        for channel in &channels {
            let channel_id = channel.id;
            if !self.overrides.effective_for(channel).await?.checking.is_enabled() {
                debug!("Checking disabled for channel {}, not enqueuing", channel_id);
                report.skipped_disabled.push(channel_id);
                continue;
            }
            if !bypass_immunity && self.immunity.is_immune_at(channel_id, now) {
                report.skipped_immune.push(channel_id);
                continue;
            }
            match self
                .queue
                .enqueue(channel_id, bypass_immunity, TriggerSource::ManualCheck)
                .await?
            {
                EnqueueOutcome::Enqueued => report.enqueued.push(channel_id),
                EnqueueOutcome::AlreadyQueued | EnqueueOutcome::InFlight => report.already_queued.push(channel_id),
            }
        }
        Ok(report)
    }

    pub async fn clear_queue(&self) -> usize {
        self.queue.clear().await
    }

    pub async fn list_queue(&self) -> Vec<CheckQueueEntry> {
        self.queue.list().await
    }

    pub async fn status(&self) -> AppResult<AutomationStatus> {
        let settings = self.settings.snapshot().await;
        let events = self.rules.list_events().await?;
        Ok(AutomationStatus {
            pipeline: settings.toggles.into(),
            queue: self.queue.stats().await,
            workers: self.pool.status(),
            marked_channels: self.controller.marked_channels().await,
            immune_channels: self.immunity.immune_count_at(Utc::now()),
            global_schedule: settings.global_schedule,
            next_global_sweep: self.scheduler.next_global_sweep().await,
            next_scheduled_event: events.iter().map(|e| e.check_time).min(),
            pending_events: events.len(),
            lifecycle_disabled_channels: self.lifecycle.list_records().await?.len(),
        })
    }

    // Overrides

    pub async fn channel_settings(&self, channel_id: ChannelId) -> AppResult<ChannelSettingsView> {
        let channel = self.directory.get_channel(channel_id).await?;
        Ok(ChannelSettingsView {
            channel_id,
            group_id: channel.group_id,
            stored: self.overrides.channel_override(channel_id).await?,
            effective: self.overrides.effective_for(&channel).await?,
        })
    }

    pub async fn set_channel_override(&self, channel_id: ChannelId, value: ModeOverride) -> AppResult<ChannelSettingsView> {
        self.directory.get_channel(channel_id).await?;
        self.overrides.set_channel_override(channel_id, value).await?;
        self.channel_settings(channel_id).await
    }

    pub async fn group_override(&self, group_id: GroupId) -> AppResult<ModeOverride> {
        self.overrides.group_override(group_id).await
    }

    pub async fn set_group_override(&self, group_id: GroupId, value: ModeOverride) -> AppResult<ModeOverride> {
        self.overrides.set_group_override(group_id, value).await
    }

    // Scheduled events and auto-create rules

    pub async fn list_events(&self) -> AppResult<Vec<ScheduledEvent>> {
        self.rules.list_events().await
    }

    pub async fn create_event(&self, request: CreateScheduledEventRequest) -> AppResult<ScheduledEvent> {
        self.rules.create_event(request).await
    }

    pub async fn delete_event(&self, id: Uuid) -> AppResult<()> {
        self.rules.delete_event(id).await
    }

    pub async fn list_rules(&self) -> AppResult<Vec<AutoCreateRule>> {
        self.rules.list_rules().await
    }

    pub async fn get_rule(&self, id: Uuid) -> AppResult<AutoCreateRule> {
        self.rules.get_rule(id).await
    }

    pub async fn create_rule(&self, request: AutoCreateRuleRequest) -> AppResult<AutoCreateRule> {
        self.rules.create_rule(request).await
    }

    pub async fn update_rule(&self, id: Uuid, request: AutoCreateRuleRequest) -> AppResult<AutoCreateRule> {
        self.rules.update_rule(id, request).await
    }

    pub async fn delete_rule(&self, id: Uuid) -> AppResult<()> {
        self.rules.delete_rule(id).await
    }

    pub async fn test_rule(&self, request: RuleTestRequest) -> AppResult<Vec<RuleMatch>> {
        self.rules.test_rule(request).await
    }

    pub async fn regenerate_rules(&self) -> AppResult<RegenerationReport> {
        self.rules.regenerate_all(Utc::now()).await
    }

    // Dead-stream lifecycle and profiles

    pub async fn dead_stream_config(&self) -> DeadStreamConfig {
        self.lifecycle.config().await
    }

    pub async fn update_dead_stream_config(&self, config: DeadStreamConfig) -> AppResult<DeadStreamConfig> {
        if let Some(profile_id) = config.target_profile_id {
            self.profiles.get_profile(profile_id).await?;
        }
        self.lifecycle.update_config(config).await
    }

    pub async fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        self.profiles.list_profiles().await
    }

    pub async fn capture_snapshot(&self, profile_id: ProfileId) -> AppResult<ProfileSnapshot> {
        self.lifecycle.capture_snapshot(profile_id).await
    }

    pub async fn get_snapshot(&self, profile_id: ProfileId) -> AppResult<ProfileSnapshot> {
        self.lifecycle
            .get_snapshot(profile_id)
            .await?
            .ok_or_else(|| AppError::not_found("profile_snapshot", profile_id))
    }

    pub async fn list_snapshots(&self) -> AppResult<Vec<ProfileSnapshot>> {
        self.lifecycle.list_snapshots().await
    }

    pub async fn delete_snapshot(&self, profile_id: ProfileId) -> AppResult<()> {
        if !self.lifecycle.delete_snapshot(profile_id).await? {
            return Err(AppError::not_found("profile_snapshot", profile_id));
        }
        Ok(())
    }

    pub async fn disable_empty_channels(&self) -> AppResult<EmptyChannelsReport> {
        self.lifecycle.disable_empty_channels_now().await
    }

    pub async fn lifecycle_records(&self) -> AppResult<Vec<LifecycleRecord>> {
        self.lifecycle.list_records().await
    }

    pub async fn recent_changelog(&self, limit: u64) -> AppResult<Vec<ChangelogEntry>> {
        self.changelog.list_recent(limit).await
    }
}
