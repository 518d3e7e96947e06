use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChannelId, ProfileId};

/// Channel membership entry of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChannel {
    pub channel_id: ChannelId,
    pub enabled: bool,
}

/// A platform profile: an independent enabled/disabled view over channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    #[serde(default)]
    pub channels: Vec<ProfileChannel>,
}

impl Profile {
    /// Enabled state of a channel, `None` when the channel is not a member
    pub fn channel_state(&self, channel_id: ChannelId) -> Option<bool> {
        self.channels
            .iter()
            .find(|c| c.channel_id == channel_id)
            .map(|c| c.enabled)
    }

    pub fn enabled_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.channel_id)
    }
}

/// Point-in-time capture of a profile's channel enabled flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub profile_id: ProfileId,
    pub profile_name: String,
    pub captured_at: DateTime<Utc>,
    pub channel_states: Vec<ProfileChannel>,
}

impl ProfileSnapshot {
    pub fn capture(profile: &Profile, captured_at: DateTime<Utc>) -> Self {
        Self {
            profile_id: profile.id,
            profile_name: profile.name.clone(),
            captured_at,
            channel_states: profile.channels.clone(),
        }
    }

    pub fn state_of(&self, channel_id: ChannelId) -> Option<bool> {
        self.channel_states
            .iter()
            .find(|c| c.channel_id == channel_id)
            .map(|c| c.enabled)
    }
}

/// Marker that the lifecycle manager disabled a channel in a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub profile_id: ProfileId,
    pub channel_id: ChannelId,
    /// Enabled state observed right before the lifecycle manager disabled the channel
    pub prior_enabled: bool,
    pub reason: String,
    pub disabled_at: DateTime<Utc>,
}
