//! Per-channel and per-group matching/checking overrides
//!
//! Effective values are resolved at read time: channel override, then group
//! override, then the `Enabled` default. Nothing is stored denormalized, so a
//! group change applies to every inheriting channel on the next read.

use std::collections::HashMap;
use tracing::info;

use crate::database::repositories::OverrideRepository;
use crate::errors::AppResult;
use crate::models::{
    Channel, ChannelId, EffectiveMode, EffectiveSettings, FeatureMode, GroupId, ModeOverride,
    OverrideTarget, SettingSource,
};

fn resolve_mode(channel: Option<FeatureMode>, group: Option<FeatureMode>) -> EffectiveMode {
    match (channel, group) {
        (Some(mode), _) => EffectiveMode { mode, source: SettingSource::Channel },
        (None, Some(mode)) => EffectiveMode { mode, source: SettingSource::Group },
        (None, None) => EffectiveMode {
            mode: FeatureMode::Enabled,
            source: SettingSource::Default,
        },
    }
}

/// Resolve effective settings from the overrides present at each level
pub fn resolve(channel: Option<&ModeOverride>, group: Option<&ModeOverride>) -> EffectiveSettings {
    EffectiveSettings {
        matching: resolve_mode(
            channel.and_then(|o| o.matching_mode),
            group.and_then(|o| o.matching_mode),
        ),
        checking: resolve_mode(
            channel.and_then(|o| o.checking_mode),
            group.and_then(|o| o.checking_mode),
        ),
    }
}

#[derive(Clone)]
pub struct OverrideResolver {
    repository: OverrideRepository,
}

impl OverrideResolver {
    pub fn new(repository: OverrideRepository) -> Self {
        Self { repository }
    }

    pub async fn channel_override(&self, channel_id: ChannelId) -> AppResult<ModeOverride> {
        Ok(self
            .repository
            .get(OverrideTarget::Channel, channel_id)
            .await?
            .unwrap_or_default())
    }

    pub async fn group_override(&self, group_id: GroupId) -> AppResult<ModeOverride> {
        Ok(self
            .repository
            .get(OverrideTarget::Group, group_id)
            .await?
            .unwrap_or_default())
    }

    /// Store a channel override; an empty override clears it
    pub async fn set_channel_override(&self, channel_id: ChannelId, value: ModeOverride) -> AppResult<ModeOverride> {
        self.repository.put(OverrideTarget::Channel, channel_id, &value).await?;
        info!(
            "Channel {} override set (matching: {:?}, checking: {:?})",
            channel_id, value.matching_mode, value.checking_mode
        );
        Ok(value)
    }

    /// Store a group override; an empty override clears it
    pub async fn set_group_override(&self, group_id: GroupId, value: ModeOverride) -> AppResult<ModeOverride> {
        self.repository.put(OverrideTarget::Group, group_id, &value).await?;
        info!(
            "Group {} override set (matching: {:?}, checking: {:?})",
            group_id, value.matching_mode, value.checking_mode
        );
        Ok(value)
    }

    pub async fn effective_for(&self, channel: &Channel) -> AppResult<EffectiveSettings> {
        let channel_override = self.repository.get(OverrideTarget::Channel, channel.id).await?;
        let group_override = match channel.group_id {
            Some(group_id) => self.repository.get(OverrideTarget::Group, group_id).await?,
            None => None,
        };
        Ok(resolve(channel_override.as_ref(), group_override.as_ref()))
    }

    /// Effective settings for many channels with two repository reads
    pub async fn resolve_many(&self, channels: &[Channel]) -> AppResult<HashMap<ChannelId, EffectiveSettings>> {
        let channel_overrides = self.repository.list(OverrideTarget::Channel).await?;
        let group_overrides = self.repository.list(OverrideTarget::Group).await?;

        Ok(channels
            .iter()
            .map(|channel| {
                let group = channel.group_id.and_then(|g| group_overrides.get(&g));
                (channel.id, resolve(channel_overrides.get(&channel.id), group))
            })
            .collect())
    }
}
