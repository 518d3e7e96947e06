//! In-memory platform
//!
//! Implements every collaborator trait over shared in-process state so the
//! engine can run without the real platform, ffprobe or a pattern file.
//! Outages, failing playlist refreshes and slow probes can be switched on to
//! exercise failure paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

use super::traits::{
    ChangelogSink, ChannelDirectory, EpgProvider, MatchProvider, ProfileStore, SnapshotStore, StreamProbe,
};
use crate::automation::AutomationError;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AccountId, ChangelogEntry, Channel, ChannelGroup, ChannelId, EpgProgram, GroupId, M3uAccount, Profile,
    ProfileChannel, ProfileId, ProfileSnapshot, Resolution, Stream, StreamId, StreamProbeInfo,
};

#[derive(Default)]
struct PlatformState {
    channels: BTreeMap<ChannelId, Channel>,
    groups: BTreeMap<GroupId, ChannelGroup>,
    streams: BTreeMap<StreamId, Stream>,
    accounts: BTreeMap<AccountId, M3uAccount>,
    profiles: BTreeMap<ProfileId, Profile>,
    programs: Vec<EpgProgram>,
    patterns: HashMap<ChannelId, Vec<Regex>>,
    /// Probe answers keyed by stream URL; missing URLs fail
    probe_results: HashMap<String, Result<StreamProbeInfo, String>>,
    probe_delay: Duration,
    probe_count: usize,
    active_probes: usize,
    peak_active_probes: usize,
    failing_accounts: HashSet<AccountId>,
    directory_down: bool,
    epg_down: bool,
    refreshed_accounts: Vec<AccountId>,
    stream_updates: Vec<(ChannelId, Vec<StreamId>)>,
    snapshots: BTreeMap<ProfileId, ProfileSnapshot>,
    changelog: Vec<ChangelogEntry>,
}

/// Probe result of a healthy stream
pub fn live_probe(width: u32, height: u32, bitrate_kbps: u64) -> StreamProbeInfo {
    StreamProbeInfo {
        resolution: Some(Resolution { width, height }),
        bitrate_kbps: Some(bitrate_kbps),
        fps: Some(25.0),
        video_codec: Some("h264".to_string()),
        audio_codec: Some("aac".to_string()),
    }
}

/// URL the in-memory platform gives a stream
pub fn stream_url(stream_id: StreamId) -> String {
    format!("memory://streams/{}", stream_id)
}

#[derive(Default)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    // Setup

    pub async fn add_group(&self, id: GroupId, name: &str) {
        self.state.lock().await.groups.insert(
            id,
            ChannelGroup {
                id,
                name: name.to_string(),
            },
        );
    }

    pub async fn add_account(&self, id: AccountId, name: &str, is_active: bool) {
        self.state.lock().await.accounts.insert(
            id,
            M3uAccount {
                id,
                name: name.to_string(),
                is_active,
            },
        );
    }

    /// Add a stream that probes live at 1080p unless told otherwise
    pub async fn add_stream(&self, id: StreamId, name: &str, account_id: Option<AccountId>) {
        let mut state = self.state.lock().await;
        let url = stream_url(id);
        state
            .probe_results
            .insert(url.clone(), Ok(live_probe(1920, 1080, 6000)));
        state.streams.insert(
            id,
            Stream {
                id,
                name: name.to_string(),
                url,
                account_id,
            },
        );
    }

    pub async fn add_channel(&self, id: ChannelId, name: &str, group_id: Option<GroupId>, stream_ids: &[StreamId]) {
        self.state.lock().await.channels.insert(
            id,
            Channel {
                id,
                name: name.to_string(),
                channel_number: Some(id as f64),
                group_id,
                stream_ids: stream_ids.to_vec(),
            },
        );
    }

    pub async fn add_profile(&self, id: ProfileId, name: &str, channels: &[(ChannelId, bool)]) {
        self.state.lock().await.profiles.insert(
            id,
            Profile {
                id,
                name: name.to_string(),
                channels: channels
                    .iter()
                    .map(|&(channel_id, enabled)| ProfileChannel { channel_id, enabled })
                    .collect(),
            },
        );
    }

    pub async fn add_program(&self, channel_id: ChannelId, title: &str, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.state.lock().await.programs.push(EpgProgram {
            channel_id,
            title: title.to_string(),
            description: None,
            start_time: start,
            end_time: end,
        });
    }

    /// Case-insensitive stream-name patterns for a channel
    pub async fn set_patterns(&self, channel_id: ChannelId, patterns: &[&str]) -> AppResult<()> {
        let compiled = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| AppError::validation(format!("Invalid pattern '{}': {}", p, e)))
            })
            .collect::<AppResult<Vec<_>>>()?;
        self.state.lock().await.patterns.insert(channel_id, compiled);
        Ok(())
    }

    pub async fn set_probe_result(&self, stream_id: StreamId, result: Result<StreamProbeInfo, String>) {
        self.state
            .lock()
            .await
            .probe_results
            .insert(stream_url(stream_id), result);
    }

    /// Delay applied to every probe before it answers
    pub async fn set_probe_delay(&self, delay: Duration) {
        self.state.lock().await.probe_delay = delay;
    }

    pub async fn set_account_failing(&self, account_id: AccountId, failing: bool) {
        let mut state = self.state.lock().await;
        if failing {
            state.failing_accounts.insert(account_id);
        } else {
            state.failing_accounts.remove(&account_id);
        }
    }

    pub async fn set_directory_available(&self, available: bool) {
        self.state.lock().await.directory_down = !available;
    }

    pub async fn set_epg_available(&self, available: bool) {
        self.state.lock().await.epg_down = !available;
    }

    // Inspection

    pub async fn channel(&self, channel_id: ChannelId) -> Option<Channel> {
        self.state.lock().await.channels.get(&channel_id).cloned()
    }

    pub async fn profile(&self, profile_id: ProfileId) -> Option<Profile> {
        self.state.lock().await.profiles.get(&profile_id).cloned()
    }

    pub async fn refreshed_accounts(&self) -> Vec<AccountId> {
        self.state.lock().await.refreshed_accounts.clone()
    }

    /// Every `set_channel_streams` call in order
    pub async fn stream_updates(&self) -> Vec<(ChannelId, Vec<StreamId>)> {
        self.state.lock().await.stream_updates.clone()
    }

    /// Most probes that were running at the same time
    pub async fn peak_concurrent_probes(&self) -> usize {
        self.state.lock().await.peak_active_probes
    }

    pub async fn probe_count(&self) -> usize {
        self.state.lock().await.probe_count
    }

    pub async fn changelog(&self) -> Vec<ChangelogEntry> {
        self.state.lock().await.changelog.clone()
    }
}

fn directory_unavailable() -> AppError {
    AppError::upstream("platform", "in-memory directory switched off")
}

#[async_trait]
impl ChannelDirectory for InMemoryPlatform {
    async fn list_channels(&self) -> AppResult<Vec<Channel>> {
        let state = self.state.lock().await;
        if state.directory_down {
            return Err(directory_unavailable());
        }
        Ok(state.channels.values().cloned().collect())
    }

    async fn list_groups(&self) -> AppResult<Vec<ChannelGroup>> {
        let state = self.state.lock().await;
        if state.directory_down {
            return Err(directory_unavailable());
        }
        Ok(state.groups.values().cloned().collect())
    }

    async fn get_channel(&self, channel_id: ChannelId) -> AppResult<Channel> {
        let state = self.state.lock().await;
        if state.directory_down {
            return Err(directory_unavailable());
        }
        state
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("channel", channel_id))
    }

    async fn channel_streams(&self, channel_id: ChannelId) -> AppResult<Vec<Stream>> {
        let state = self.state.lock().await;
        if state.directory_down {
            return Err(directory_unavailable());
        }
        let channel = state
            .channels
            .get(&channel_id)
            .ok_or_else(|| AppError::not_found("channel", channel_id))?;
        Ok(channel
            .stream_ids
            .iter()
            .filter_map(|id| state.streams.get(id).cloned())
            .collect())
    }

    async fn list_streams(&self) -> AppResult<Vec<Stream>> {
        let state = self.state.lock().await;
        if state.directory_down {
            return Err(directory_unavailable());
        }
        Ok(state.streams.values().cloned().collect())
    }

    async fn set_channel_streams(&self, channel_id: ChannelId, stream_ids: &[StreamId]) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.directory_down {
            return Err(directory_unavailable());
        }
        let channel = state
            .channels
            .get_mut(&channel_id)
            .ok_or_else(|| AppError::not_found("channel", channel_id))?;
        channel.stream_ids = stream_ids.to_vec();
        state.stream_updates.push((channel_id, stream_ids.to_vec()));
        Ok(())
    }

    async fn list_accounts(&self) -> AppResult<Vec<M3uAccount>> {
        let state = self.state.lock().await;
        if state.directory_down {
            return Err(directory_unavailable());
        }
        Ok(state.accounts.values().cloned().collect())
    }

    async fn refresh_account(&self, account_id: AccountId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.directory_down || state.failing_accounts.contains(&account_id) {
            return Err(AppError::upstream(
                "platform",
                format!("refresh of account {} failed", account_id),
            ));
        }
        if !state.accounts.contains_key(&account_id) {
            return Err(AppError::not_found("m3u_account", account_id));
        }
        state.refreshed_accounts.push(account_id);
        Ok(())
    }
}

#[async_trait]
impl MatchProvider for InMemoryPlatform {
    async fn match_streams(&self, channel: &Channel, candidates: &[Stream]) -> AppResult<Vec<StreamId>> {
        let state = self.state.lock().await;
        let Some(patterns) = state.patterns.get(&channel.id) else {
            return Ok(Vec::new());
        };
        Ok(candidates
            .iter()
            .filter(|s| patterns.iter().any(|re| re.is_match(&s.name)))
            .map(|s| s.id)
            .collect())
    }

    async fn has_patterns(&self, channel_id: ChannelId) -> bool {
        self.state
            .lock()
            .await
            .patterns
            .get(&channel_id)
            .is_some_and(|p| !p.is_empty())
    }
}

#[async_trait]
impl StreamProbe for InMemoryPlatform {
    async fn probe(&self, url: &str, timeout: Duration) -> AppResult<StreamProbeInfo> {
        let (delay, result) = {
            let mut state = self.state.lock().await;
            state.probe_count += 1;
            state.active_probes += 1;
            state.peak_active_probes = state.peak_active_probes.max(state.active_probes);
            (state.probe_delay, state.probe_results.get(url).cloned())
        };

        let timed_out = delay > timeout;
        let waited = if timed_out { timeout } else { delay };
        if !waited.is_zero() {
            tokio::time::sleep(waited).await;
        }
        self.state.lock().await.active_probes -= 1;

        if timed_out {
            return Err(AutomationError::ProbeTimeout {
                url: url.to_string(),
                timeout,
            }
            .into());
        }

        match result {
            Some(Ok(info)) => Ok(info),
            Some(Err(message)) => Err(AutomationError::ProbeFailed {
                url: url.to_string(),
                message,
            }
            .into()),
            None => Err(AutomationError::ProbeFailed {
                url: url.to_string(),
                message: "unknown stream".to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl EpgProvider for InMemoryPlatform {
    async fn programs(
        &self,
        channel_id: ChannelId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<EpgProgram>> {
        let state = self.state.lock().await;
        if state.epg_down {
            return Err(AppError::upstream("epg", "in-memory EPG switched off"));
        }
        Ok(state
            .programs
            .iter()
            .filter(|p| p.channel_id == channel_id && p.end_time > from && p.start_time < to)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProfileStore for InMemoryPlatform {
    async fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        Ok(self.state.lock().await.profiles.values().cloned().collect())
    }

    async fn get_profile(&self, profile_id: ProfileId) -> AppResult<Profile> {
        self.state
            .lock()
            .await
            .profiles
            .get(&profile_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("profile", profile_id))
    }

    async fn set_channel_enabled(
        &self,
        profile_id: ProfileId,
        channel_id: ChannelId,
        enabled: bool,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let profile = state
            .profiles
            .get_mut(&profile_id)
            .ok_or_else(|| AppError::not_found("profile", profile_id))?;
        match profile.channels.iter_mut().find(|c| c.channel_id == channel_id) {
            Some(member) => member.enabled = enabled,
            None => profile.channels.push(ProfileChannel { channel_id, enabled }),
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for InMemoryPlatform {
    async fn save(&self, snapshot: &ProfileSnapshot) -> AppResult<()> {
        self.state
            .lock()
            .await
            .snapshots
            .insert(snapshot.profile_id, snapshot.clone());
        Ok(())
    }

    async fn get(&self, profile_id: ProfileId) -> AppResult<Option<ProfileSnapshot>> {
        Ok(self.state.lock().await.snapshots.get(&profile_id).cloned())
    }

    async fn delete(&self, profile_id: ProfileId) -> AppResult<bool> {
        Ok(self.state.lock().await.snapshots.remove(&profile_id).is_some())
    }

    async fn list(&self) -> AppResult<Vec<ProfileSnapshot>> {
        Ok(self.state.lock().await.snapshots.values().cloned().collect())
    }
}

#[async_trait]
impl ChangelogSink for InMemoryPlatform {
    async fn append(&self, entry: ChangelogEntry) -> AppResult<()> {
        self.state.lock().await.changelog.push(entry);
        Ok(())
    }
}
