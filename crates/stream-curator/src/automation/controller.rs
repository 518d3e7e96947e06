//! Pipeline controller
//!
//! Every trigger source (automatic cycle, manual discovery, cron sweep, EPG
//! event, manual check) sends the same [`TriggerRequest`] through one intake.
//! The controller executes requests one at a time and runs the update, match
//! and check stages the request's source and the current toggles call for.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::check_queue::CheckQueue;
use super::immunity::ImmunityTracker;
use super::overrides::OverrideResolver;
use super::settings::AutomationSettingsStore;
use super::types::{AutomationError, ChannelScope, EnqueueOutcome, StagePlan, TriggerRequest, TriggerSource};
use crate::errors::{AppError, AppResult};
use crate::models::{
    AccountId, ChangelogAction, ChangelogEntry, Channel, ChannelId, EffectiveSettings, Stream, StreamId,
};
use crate::platform::{ChangelogSink, ChannelDirectory, MatchProvider};

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source: TriggerSource,
    pub scope: ChannelScope,
    pub bypass_immunity: bool,
    pub stages: StagePlan,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub accounts_refreshed: Vec<AccountId>,
    pub accounts_failed: Vec<AccountId>,
    pub channels_matched: usize,
    pub channels_marked: Vec<ChannelId>,
    pub streams_added: usize,
    pub streams_removed: usize,
    pub enqueued: Vec<ChannelId>,
    pub already_queued: usize,
    pub skipped_immune: usize,
    pub skipped_disabled: usize,
    pub skipped_upstream: Vec<ChannelId>,
    pub dropped_queue_full: usize,
    pub errors: Vec<String>,
}

impl RunSummary {
    fn new(request: &TriggerRequest, stages: StagePlan) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            source: request.source,
            scope: request.scope.clone(),
            bypass_immunity: request.effective_bypass(),
            stages,
            started_at: now,
            finished_at: now,
            accounts_refreshed: Vec::new(),
            accounts_failed: Vec::new(),
            channels_matched: 0,
            channels_marked: Vec::new(),
            streams_added: 0,
            streams_removed: 0,
            enqueued: Vec::new(),
            already_queued: 0,
            skipped_immune: 0,
            skipped_disabled: 0,
            skipped_upstream: Vec::new(),
            dropped_queue_full: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.accounts_failed.is_empty() && self.dropped_queue_full == 0
    }

    fn changelog_summary(&self) -> String {
        format!(
            "{} run: {} refreshed, {} matched, {} enqueued{}",
            self.source,
            self.accounts_refreshed.len(),
            self.channels_matched,
            self.enqueued.len(),
            if self.is_clean() {
                String::new()
            } else {
                format!(", {} problems", self.errors.len())
            }
        )
    }
}

/// New stream assignment for a channel after matching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchPlan {
    pub assignment: Vec<StreamId>,
    pub added: Vec<StreamId>,
    pub removed: Vec<StreamId>,
}

impl MatchPlan {
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Merge matched streams into the current assignment.
///
/// Existing streams keep their order, new matches are appended in match
/// order. Current streams that no longer match are dropped only when
/// `remove_non_matching` is set.
pub fn plan_assignment(current: &[StreamId], matched: &[StreamId], remove_non_matching: bool) -> MatchPlan {
    let matched_set: HashSet<StreamId> = matched.iter().copied().collect();
    let mut plan = MatchPlan::default();

    for &stream_id in current {
        if remove_non_matching && !matched_set.contains(&stream_id) {
            plan.removed.push(stream_id);
        } else {
            plan.assignment.push(stream_id);
        }
    }

    let mut present: HashSet<StreamId> = current.iter().copied().collect();
    for &stream_id in matched {
        if present.insert(stream_id) {
            plan.assignment.push(stream_id);
            plan.added.push(stream_id);
        }
    }

    plan
}

/// A trigger travelling through the controller intake
pub struct TriggerMessage {
    pub request: TriggerRequest,
    pub reply: Option<oneshot::Sender<AppResult<RunSummary>>>,
}

/// Sending side of the controller intake
#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<TriggerMessage>,
}

impl TriggerHandle {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<TriggerMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Queue a trigger without waiting for the run
    pub async fn send(&self, request: TriggerRequest) -> AppResult<()> {
        self.tx
            .send(TriggerMessage { request, reply: None })
            .await
            .map_err(|_| AppError::internal("pipeline controller is not running"))
    }

    /// Queue a trigger and wait for its run summary
    pub async fn request(&self, request: TriggerRequest) -> AppResult<RunSummary> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(TriggerMessage {
                request,
                reply: Some(reply),
            })
            .await
            .map_err(|_| AppError::internal("pipeline controller is not running"))?;
        rx.await
            .map_err(|_| AppError::internal("pipeline controller stopped before replying"))?
    }
}

pub struct PipelineController {
    directory: Arc<dyn ChannelDirectory>,
    matcher: Arc<dyn MatchProvider>,
    settings: Arc<AutomationSettingsStore>,
    overrides: OverrideResolver,
    queue: Arc<CheckQueue>,
    immunity: Arc<ImmunityTracker>,
    changelog: Arc<dyn ChangelogSink>,
    /// Channels whose streams changed and that wait for the next check stage
    marked: Mutex<BTreeSet<ChannelId>>,
}

impl PipelineController {
    pub fn new(
        directory: Arc<dyn ChannelDirectory>,
        matcher: Arc<dyn MatchProvider>,
        settings: Arc<AutomationSettingsStore>,
        overrides: OverrideResolver,
        queue: Arc<CheckQueue>,
        immunity: Arc<ImmunityTracker>,
        changelog: Arc<dyn ChangelogSink>,
    ) -> Self {
        Self {
            directory,
            matcher,
            settings,
            overrides,
            queue,
            immunity,
            changelog,
            marked: Mutex::new(BTreeSet::new()),
        }
    }

    /// Consume the intake until cancelled or every sender is gone
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<TriggerMessage>, cancellation_token: CancellationToken) {
        info!("Starting pipeline controller");
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Pipeline controller received cancellation signal");
                    break;
                }
                message = rx.recv() => {
                    let Some(message) = message else {
                        debug!("Trigger intake closed");
                        break;
                    };
                    let result = self.trigger(message.request).await;
                    if let Err(e) = &result {
                        warn!("Pipeline run failed: {}", e);
                    }
                    if let Some(reply) = message.reply {
                        let _ = reply.send(result);
                    }
                }
            }
        }
        info!("Pipeline controller stopped");
    }

    pub async fn marked_channels(&self) -> Vec<ChannelId> {
        self.marked.lock().await.iter().copied().collect()
    }

    /// Execute one pipeline run
    pub async fn trigger(&self, request: TriggerRequest) -> AppResult<RunSummary> {
        let toggles = self.settings.toggles().await;
        let stages = StagePlan::for_trigger(request.source, &toggles);
        let mut summary = RunSummary::new(&request, stages);

        info!(
            "Pipeline run {} started (source: {}, bypass: {}, update: {}, match: {}, check: {})",
            summary.run_id, request.source, summary.bypass_immunity, stages.update, stages.matching, stages.check
        );

        let mut outcome = Ok(());
        if !stages.is_empty() {
            outcome = self
                .execute(&request, stages, toggles.remove_non_matching_streams, &mut summary)
                .await;
        } else {
            debug!("No stages enabled for {} trigger", request.source);
        }
        if let Err(e) = &outcome {
            summary.errors.push(format!("run aborted: {e}"));
        }

        summary.finished_at = Utc::now();
        if summary.is_clean() {
            info!("Pipeline run {} finished: {}", summary.run_id, summary.changelog_summary());
        } else {
            warn!(
                "Pipeline run {} finished with problems: {:?}",
                summary.run_id, summary.errors
            );
        }

        let details = serde_json::to_value(&summary)?;
        let entry = ChangelogEntry::new(ChangelogAction::PipelineRun, summary.changelog_summary(), details);
        if let Err(e) = self.changelog.append(entry).await {
            error!("Failed to record pipeline run {}: {}", summary.run_id, e);
        }

        outcome.map(|()| summary)
    }

    async fn execute(
        &self,
        request: &TriggerRequest,
        stages: StagePlan,
        remove_non_matching: bool,
        summary: &mut RunSummary,
    ) -> AppResult<()> {
        let channels = match self.directory.list_channels().await {
            Ok(channels) => channels,
            Err(e) if e.is_upstream_unavailable() => {
                summary.errors.push(format!("channel directory: {e}"));
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let channels: Vec<Channel> = channels
            .into_iter()
            .filter(|c| request.scope.contains(c.id))
            .collect();

        if request.source == TriggerSource::ManualCheck {
            if let ChannelScope::Channels(ids) = &request.scope {
                if let Some(missing) = ids.iter().find(|id| !channels.iter().any(|c| c.id == **id)) {
                    return Err(AppError::not_found("channel", missing));
                }
            }
        }

        let mut streams: Option<Vec<Stream>> = None;

        if stages.update {
            self.update_stage(request, &channels, summary).await;
        }

        if !summary.accounts_failed.is_empty() {
            let all_streams = self.load_streams(&mut streams, summary).await;
            let failed: HashSet<AccountId> = summary.accounts_failed.iter().copied().collect();
            let stream_accounts: HashMap<StreamId, AccountId> = all_streams
                .iter()
                .filter_map(|s| s.account_id.map(|a| (s.id, a)))
                .collect();
            summary.skipped_upstream = channels
                .iter()
                .filter(|c| {
                    c.stream_ids
                        .iter()
                        .any(|s| stream_accounts.get(s).is_some_and(|a| failed.contains(a)))
                })
                .map(|c| c.id)
                .collect();
            if !summary.skipped_upstream.is_empty() {
                warn!(
                    "Skipping {} channels fed by failed accounts {:?}",
                    summary.skipped_upstream.len(),
                    summary.accounts_failed
                );
            }
        }

        let skipped: HashSet<ChannelId> = summary.skipped_upstream.iter().copied().collect();
        let channels: Vec<Channel> = channels.into_iter().filter(|c| !skipped.contains(&c.id)).collect();
        let effective = self.overrides.resolve_many(&channels).await?;

        if stages.matching {
            let all_streams = self.load_streams(&mut streams, summary).await.to_vec();
            self.match_stage(&channels, &effective, &all_streams, remove_non_matching, summary)
                .await;
        }

        if stages.check {
            self.check_stage(request, &channels, &effective, summary).await;
        }

        Ok(())
    }

    async fn load_streams<'a>(&self, cache: &'a mut Option<Vec<Stream>>, summary: &mut RunSummary) -> &'a [Stream] {
        if cache.is_none() {
            let loaded = match self.directory.list_streams().await {
                Ok(streams) => streams,
                Err(e) => {
                    summary.errors.push(format!("stream listing: {e}"));
                    Vec::new()
                }
            };
            *cache = Some(loaded);
        }
        cache.as_deref().unwrap_or_default()
    }

    async fn update_stage(&self, request: &TriggerRequest, channels: &[Channel], summary: &mut RunSummary) {
        let accounts = match self.directory.list_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!("Account listing failed, skipping playlist updates: {}", e);
                summary.errors.push(format!("account listing: {e}"));
                return;
            }
        };

        let mut targets: Vec<AccountId> = accounts.iter().filter(|a| a.is_active).map(|a| a.id).collect();

        if request.source == TriggerSource::EpgEvent {
            let mut feeding = BTreeSet::new();
            for channel in channels {
                match self.directory.channel_streams(channel.id).await {
                    Ok(streams) => feeding.extend(streams.iter().filter_map(|s| s.account_id)),
                    Err(e) => summary.errors.push(format!("streams of channel {}: {e}", channel.id)),
                }
            }
            targets.retain(|id| feeding.contains(id));
            if targets.is_empty() {
                debug!("No active account feeds the event's channels, skipping playlist refresh");
                return;
            }
        }

        let refreshes = targets.into_iter().map(|account_id| async move {
            (account_id, self.directory.refresh_account(account_id).await)
        });
        for (account_id, result) in join_all(refreshes).await {
            match result {
                Ok(()) => {
                    debug!("Refreshed playlist of account {}", account_id);
                    summary.accounts_refreshed.push(account_id);
                }
                Err(e) => {
                    warn!("Playlist refresh of account {} failed: {}", account_id, e);
                    summary.accounts_failed.push(account_id);
                    summary.errors.push(format!("account {account_id}: {e}"));
                }
            }
        }
    }

    async fn match_stage(
        &self,
        channels: &[Channel],
        effective: &HashMap<ChannelId, EffectiveSettings>,
        streams: &[Stream],
        remove_non_matching: bool,
        summary: &mut RunSummary,
    ) {
        for channel in channels {
            let Some(settings) = effective.get(&channel.id) else {
                continue;
            };
            if !settings.matching.is_enabled() {
                continue;
            }
            if !self.matcher.has_patterns(channel.id).await {
                continue;
            }

            let matched = match self.matcher.match_streams(channel, streams).await {
                Ok(matched) => matched,
                Err(e) => {
                    summary.errors.push(format!("matching channel {}: {e}", channel.id));
                    continue;
                }
            };
            summary.channels_matched += 1;

            let plan = plan_assignment(&channel.stream_ids, &matched, remove_non_matching);
            if !plan.changed() {
                continue;
            }

            if let Err(e) = self.directory.set_channel_streams(channel.id, &plan.assignment).await {
                warn!("Updating streams of channel {} failed: {}", channel.id, e);
                summary.errors.push(format!("assigning streams to channel {}: {e}", channel.id));
                continue;
            }

            debug!(
                "Channel {} matched: {} added, {} removed",
                channel.id,
                plan.added.len(),
                plan.removed.len()
            );
            summary.streams_added += plan.added.len();
            summary.streams_removed += plan.removed.len();

            if !plan.added.is_empty() {
                self.marked.lock().await.insert(channel.id);
                summary.channels_marked.push(channel.id);
            }
        }
    }

    async fn check_stage(
        &self,
        request: &TriggerRequest,
        channels: &[Channel],
        effective: &HashMap<ChannelId, EffectiveSettings>,
        summary: &mut RunSummary,
    ) {
        let bypass = request.effective_bypass();
        let marked = self.marked.lock().await.clone();

        let (mut candidates, rest): (Vec<&Channel>, Vec<&Channel>) =
            channels.iter().partition(|c| marked.contains(&c.id));
        candidates.extend(rest);

        let now = Utc::now();
        let mut remaining = candidates.len();
        for channel in candidates {
            remaining -= 1;

            let checking = effective.get(&channel.id).is_some_and(|s| s.checking.is_enabled());
            if !checking {
                summary.skipped_disabled += 1;
                self.marked.lock().await.remove(&channel.id);
                continue;
            }

            if !bypass && self.immunity.is_immune_at(channel.id, now) {
                summary.skipped_immune += 1;
                continue;
            }

            match self.queue.enqueue(channel.id, bypass, request.source).await {
                Ok(EnqueueOutcome::Enqueued) => {
                    summary.enqueued.push(channel.id);
                    self.marked.lock().await.remove(&channel.id);
                }
                Ok(EnqueueOutcome::AlreadyQueued | EnqueueOutcome::InFlight) => {
                    summary.already_queued += 1;
                    self.marked.lock().await.remove(&channel.id);
                }
                Err(e @ AutomationError::QueueFull { .. }) => {
                    summary.dropped_queue_full = remaining + 1;
                    summary.errors.push(e.to_string());
                    warn!(
                        "Check queue full, dropping {} remaining candidates of this run",
                        summary.dropped_queue_full
                    );
                    break;
                }
                Err(e) => summary.errors.push(e.to_string()),
            }
        }
    }
}
