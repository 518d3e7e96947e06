use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{AccountId, ChannelId, GroupId, StreamId};

/// A channel as known to the channel-management platform.
///
/// `stream_ids` is ordered; the first entry is the stream clients receive first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub channel_number: Option<f64>,
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub stream_ids: Vec<StreamId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGroup {
    pub id: GroupId,
    pub name: String,
}

/// A stream that can be assigned to channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub id: StreamId,
    pub name: String,
    pub url: String,
    pub account_id: Option<AccountId>,
}

/// A playlist provider account whose playlist the platform can refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct M3uAccount {
    pub id: AccountId,
    pub name: String,
    pub is_active: bool,
}

/// Per-feature switch stored on channels and groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeatureMode {
    Enabled,
    Disabled,
}

impl FeatureMode {
    pub fn is_enabled(self) -> bool {
        matches!(self, FeatureMode::Enabled)
    }
}

/// Explicitly stored matching/checking values for a channel or a group.
/// `None` means the value is not set at this level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeOverride {
    #[serde(default)]
    pub matching_mode: Option<FeatureMode>,
    #[serde(default)]
    pub checking_mode: Option<FeatureMode>,
}

impl ModeOverride {
    pub fn is_empty(&self) -> bool {
        self.matching_mode.is_none() && self.checking_mode.is_none()
    }
}

/// Where an effective value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingSource {
    Channel,
    Group,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveMode {
    pub mode: FeatureMode,
    pub source: SettingSource,
}

impl EffectiveMode {
    pub fn is_enabled(&self) -> bool {
        self.mode.is_enabled()
    }

    /// True when the channel itself carries the value rather than inheriting it
    pub fn is_explicit(&self) -> bool {
        self.source == SettingSource::Channel
    }
}

/// Resolved matching/checking settings for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveSettings {
    pub matching: EffectiveMode,
    pub checking: EffectiveMode,
}

impl EffectiveSettings {
    /// Channels with both features disabled are hidden from matching and checking entirely
    pub fn is_excluded(&self) -> bool {
        !self.matching.is_enabled() && !self.checking.is_enabled()
    }
}

/// Level an override is stored at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OverrideTarget {
    Channel,
    Group,
}
