//! Automation engine type definitions

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};

use crate::config::duration_serde;
use crate::config::defaults::{
    DEFAULT_GLOBAL_LIMIT, DEFAULT_MAX_CHANNELS_PER_RUN, DEFAULT_QUEUE_MAX_SIZE,
    DEFAULT_STAGGER_DELAY_MS,
};
use crate::models::{ChannelId, ProfileId};

use super::settings::AutomationToggles;

/// Errors raised by the automation engine
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    /// Enqueue rejected because the check queue reached its ceiling
    #[error("Check queue is full (max size {max_size})")]
    QueueFull { max_size: usize },

    /// A stream probe did not answer within its timeout
    #[error("Probe of {url} timed out after {timeout:?}")]
    ProbeTimeout { url: String, timeout: Duration },

    /// A stream probe ran but could not read the stream
    #[error("Probe of {url} failed: {message}")]
    ProbeFailed { url: String, message: String },

    /// The channel directory, EPG provider or profile store could not be reached
    #[error("{service} unavailable: {message}")]
    UpstreamUnavailable { service: String, message: String },

    /// Malformed auto-create rule, rejected at create/update time
    #[error("Invalid auto-create rule: {message}")]
    InvalidRule { message: String },

    /// Legacy pipeline mode and independent toggles were both supplied
    #[error("Conflicting pipeline configuration: {message}")]
    ConfigConflict { message: String },
}

/// What caused a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerSource {
    /// Periodic automatic cycle
    PlaylistUpdate,
    /// Manual "discover streams" action
    Discovery,
    /// Cron-driven or manually requested global action
    GlobalSweep,
    /// Scheduled EPG event reaching its check time
    EpgEvent,
    /// Explicit check of selected channels
    ManualCheck,
}

impl TriggerSource {
    /// Sources that always ignore the immunity window
    pub fn forces_bypass(self) -> bool {
        matches!(self, TriggerSource::GlobalSweep | TriggerSource::EpgEvent)
    }
}

/// Channels a trigger applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "channel_ids")]
pub enum ChannelScope {
    All,
    Channels(Vec<ChannelId>),
}

impl ChannelScope {
    pub fn contains(&self, channel_id: ChannelId) -> bool {
        match self {
            ChannelScope::All => true,
            ChannelScope::Channels(ids) => ids.contains(&channel_id),
        }
    }
}

/// Trigger message accepted by the pipeline controller regardless of its origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub source: TriggerSource,
    pub scope: ChannelScope,
    pub bypass_immunity: bool,
}

impl TriggerRequest {
    pub fn playlist_update() -> Self {
        Self {
            source: TriggerSource::PlaylistUpdate,
            scope: ChannelScope::All,
            bypass_immunity: false,
        }
    }

    pub fn discovery(scope: ChannelScope) -> Self {
        Self {
            source: TriggerSource::Discovery,
            scope,
            bypass_immunity: false,
        }
    }

    pub fn global_sweep() -> Self {
        Self {
            source: TriggerSource::GlobalSweep,
            scope: ChannelScope::All,
            bypass_immunity: true,
        }
    }

    pub fn epg_event(channel_id: ChannelId) -> Self {
        Self {
            source: TriggerSource::EpgEvent,
            scope: ChannelScope::Channels(vec![channel_id]),
            bypass_immunity: true,
        }
    }

    pub fn manual_check(channel_ids: Vec<ChannelId>, bypass_immunity: bool) -> Self {
        Self {
            source: TriggerSource::ManualCheck,
            scope: ChannelScope::Channels(channel_ids),
            bypass_immunity,
        }
    }

    /// Effective bypass flag once source rules are applied
    pub fn effective_bypass(&self) -> bool {
        self.bypass_immunity || self.source.forces_bypass()
    }
}

/// Stages a pipeline run executes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlan {
    pub update: bool,
    pub matching: bool,
    pub check: bool,
}

impl StagePlan {
    pub fn for_trigger(source: TriggerSource, toggles: &AutomationToggles) -> Self {
        match source {
            TriggerSource::PlaylistUpdate => Self {
                update: toggles.auto_m3u_updates,
                matching: toggles.auto_stream_matching,
                check: toggles.auto_quality_checking,
            },
            TriggerSource::Discovery => Self {
                update: false,
                matching: true,
                check: false,
            },
            TriggerSource::GlobalSweep => Self {
                update: true,
                matching: true,
                check: true,
            },
            TriggerSource::EpgEvent => Self {
                update: true,
                matching: false,
                check: true,
            },
            TriggerSource::ManualCheck => Self {
                update: false,
                matching: false,
                check: true,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.update && !self.matching && !self.check
    }
}

/// Result of a single enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Enqueued,
    /// Channel already waiting in the queue; nothing was added
    AlreadyQueued,
    /// Channel is being checked right now; nothing was added
    InFlight,
}

/// Queue ceiling and per-run dispatch budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLimits {
    #[serde(default = "default_queue_max_size")]
    pub max_size: usize,
    #[serde(default = "default_max_channels_per_run")]
    pub max_channels_per_run: usize,
}

fn default_queue_max_size() -> usize {
    DEFAULT_QUEUE_MAX_SIZE
}

fn default_max_channels_per_run() -> usize {
    DEFAULT_MAX_CHANNELS_PER_RUN
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_QUEUE_MAX_SIZE,
            max_channels_per_run: DEFAULT_MAX_CHANNELS_PER_RUN,
        }
    }
}

impl QueueLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("queue max_size must be greater than 0".to_string());
        }
        if self.max_channels_per_run == 0 {
            return Err("max_channels_per_run must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Worker parallelism and per-channel probe pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyLimits {
    #[serde(default = "default_global_limit")]
    pub global_limit: usize,
    #[serde(default = "default_stagger_delay", with = "duration_serde::duration")]
    pub stagger_delay: Duration,
}

fn default_global_limit() -> usize {
    DEFAULT_GLOBAL_LIMIT
}

fn default_stagger_delay() -> Duration {
    Duration::from_millis(DEFAULT_STAGGER_DELAY_MS)
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            global_limit: DEFAULT_GLOBAL_LIMIT,
            stagger_delay: default_stagger_delay(),
        }
    }
}

impl ConcurrencyLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.global_limit == 0 {
            return Err("global_limit must be greater than 0".to_string());
        }
        if self.global_limit > u32::MAX as usize {
            return Err("global_limit is too large".to_string());
        }
        Ok(())
    }
}

/// Dead-stream lifecycle configuration for the designated profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadStreamConfig {
    pub enabled: bool,
    pub target_profile_id: Option<ProfileId>,
    pub use_snapshot: bool,
    /// Minimum width in pixels, 0 disables the threshold
    pub min_width: u32,
    /// Minimum height in pixels, 0 disables the threshold
    pub min_height: u32,
    /// Minimum bitrate in kbps, 0 disables the threshold
    pub min_bitrate_kbps: u64,
    /// Minimum quality score in [0, 1], 0 disables the threshold
    pub min_score: f64,
    /// Drop dead streams from channels after a check, as long as one live stream remains
    pub remove_dead_streams: bool,
}

impl Default for DeadStreamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_profile_id: None,
            use_snapshot: true,
            min_width: 0,
            min_height: 0,
            min_bitrate_kbps: 0,
            min_score: 0.0,
            remove_dead_streams: false,
        }
    }
}

impl DeadStreamConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.target_profile_id.is_none() {
            return Err("target_profile_id is required when dead-stream handling is enabled".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(format!("min_score must be within 0..=1, got {}", self.min_score));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bypass_rules_per_source() {
        assert!(TriggerRequest::global_sweep().effective_bypass());
        assert!(TriggerRequest::epg_event(7).effective_bypass());
        assert!(!TriggerRequest::discovery(ChannelScope::All).effective_bypass());
        assert!(!TriggerRequest::playlist_update().effective_bypass());
        assert!(TriggerRequest::manual_check(vec![1], true).effective_bypass());
        assert!(!TriggerRequest::manual_check(vec![1], false).effective_bypass());
    }

    #[test]
    fn test_stage_plan_for_sources() {
        let toggles = AutomationToggles {
            auto_m3u_updates: true,
            auto_stream_matching: false,
            auto_quality_checking: true,
            scheduled_global_action: false,
            remove_non_matching_streams: false,
        };

        let cycle = StagePlan::for_trigger(TriggerSource::PlaylistUpdate, &toggles);
        assert!(cycle.update && !cycle.matching && cycle.check);

        let discovery = StagePlan::for_trigger(TriggerSource::Discovery, &toggles);
        assert!(!discovery.update && discovery.matching && !discovery.check);

        let sweep = StagePlan::for_trigger(TriggerSource::GlobalSweep, &toggles);
        assert!(sweep.update && sweep.matching && sweep.check);

        let epg = StagePlan::for_trigger(TriggerSource::EpgEvent, &toggles);
        assert!(epg.update && !epg.matching && epg.check);
    }

    #[test]
    fn test_limits_validation() {
        assert!(QueueLimits::default().validate().is_ok());
        assert!(QueueLimits { max_size: 0, max_channels_per_run: 1 }.validate().is_err());
        assert!(ConcurrencyLimits { global_limit: 0, stagger_delay: Duration::ZERO }.validate().is_err());

        let config = DeadStreamConfig { enabled: true, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scope_membership() {
        assert!(ChannelScope::All.contains(42));
        assert!(ChannelScope::Channels(vec![1, 2]).contains(2));
        assert!(!ChannelScope::Channels(vec![1, 2]).contains(3));
    }
}
