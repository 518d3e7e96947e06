use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ChannelId;

/// Largest accepted minutes-before offset (one day)
pub const MAX_MINUTES_BEFORE: u32 = 24 * 60;

/// A program listed in the EPG for a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpgProgram {
    pub channel_id: ChannelId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// One-off check scheduled relative to a program start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub id: Uuid,
    pub channel_id: ChannelId,
    pub program_title: String,
    pub program_start: DateTime<Utc>,
    pub program_end: DateTime<Utc>,
    pub minutes_before: u32,
    pub check_time: DateTime<Utc>,
    /// Rule that generated this event; `None` for manually created events
    pub rule_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledEvent {
    pub fn compute_check_time(program_start: DateTime<Utc>, minutes_before: u32) -> DateTime<Utc> {
        program_start - Duration::minutes(i64::from(minutes_before))
    }

    pub fn is_manual(&self) -> bool {
        self.rule_id.is_none()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.check_time <= now
    }

    /// The program already finished, so a freshness check is pointless
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.program_end <= now
    }
}

/// Request to create a manual scheduled event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduledEventRequest {
    pub channel_id: ChannelId,
    pub program_title: String,
    pub program_start: DateTime<Utc>,
    pub program_end: DateTime<Utc>,
    #[serde(default)]
    pub minutes_before: u32,
}

/// Regex-over-EPG-titles rule generating scheduled events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoCreateRule {
    pub id: Uuid,
    pub name: String,
    pub channel_ids: Vec<ChannelId>,
    pub regex_pattern: String,
    pub minutes_before: u32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/update payload for an auto-create rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoCreateRuleRequest {
    pub name: String,
    pub channel_ids: Vec<ChannelId>,
    pub regex_pattern: String,
    #[serde(default)]
    pub minutes_before: u32,
    #[serde(default = "default_rule_enabled")]
    pub enabled: bool,
}

fn default_rule_enabled() -> bool {
    true
}

/// Dry-run request evaluating a pattern against live EPG data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTestRequest {
    pub regex_pattern: String,
    pub channel_ids: Vec<ChannelId>,
    #[serde(default)]
    pub minutes_before: u32,
}

/// A program that a rule (or rule test) matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub channel_id: ChannelId,
    pub program_title: String,
    pub program_start: DateTime<Utc>,
    pub program_end: DateTime<Utc>,
    pub check_time: DateTime<Utc>,
}
