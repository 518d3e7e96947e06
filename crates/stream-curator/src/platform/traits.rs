//! Collaborator contracts consumed by the automation engine
//!
//! Each trait is a narrow view over an external system. The REST client in
//! [`super::client`] implements the platform-facing ones, the regex matcher
//! implements [`MatchProvider`], ffprobe implements [`StreamProbe`], and the
//! database repositories implement [`SnapshotStore`] and [`ChangelogSink`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::errors::AppResult;
use crate::models::{
    AccountId, Channel, ChannelGroup, ChannelId, ChangelogEntry, EpgProgram, M3uAccount, Profile,
    ProfileId, ProfileSnapshot, Stream, StreamId, StreamProbeInfo,
};

/// Channel, group, stream and account directory of the platform
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn list_channels(&self) -> AppResult<Vec<Channel>>;

    async fn list_groups(&self) -> AppResult<Vec<ChannelGroup>>;

    async fn get_channel(&self, channel_id: ChannelId) -> AppResult<Channel>;

    /// Streams assigned to a channel, in assignment order
    async fn channel_streams(&self, channel_id: ChannelId) -> AppResult<Vec<Stream>>;

    /// Every stream known to the platform
    async fn list_streams(&self) -> AppResult<Vec<Stream>>;

    /// Replace a channel's stream assignment with `stream_ids`, in order
    async fn set_channel_streams(&self, channel_id: ChannelId, stream_ids: &[StreamId]) -> AppResult<()>;

    async fn list_accounts(&self) -> AppResult<Vec<M3uAccount>>;

    /// Ask the platform to refresh one account's playlist
    async fn refresh_account(&self, account_id: AccountId) -> AppResult<()>;
}

/// Stream-name pattern matching for channels
#[async_trait]
pub trait MatchProvider: Send + Sync {
    /// Ids of the candidate streams that belong to `channel`.
    /// Never mutates assignments; applying the result is the caller's decision.
    async fn match_streams(&self, channel: &Channel, candidates: &[Stream]) -> AppResult<Vec<StreamId>>;

    /// Whether any pattern exists for the channel
    async fn has_patterns(&self, channel_id: ChannelId) -> bool;
}

/// Stream probing with an explicit timeout
#[async_trait]
pub trait StreamProbe: Send + Sync {
    /// Returns `ProbeTimeout` or `ProbeFailed` when the stream cannot be read
    async fn probe(&self, url: &str, timeout: Duration) -> AppResult<StreamProbeInfo>;
}

/// Per-channel program listings
#[async_trait]
pub trait EpgProvider: Send + Sync {
    async fn programs(
        &self,
        channel_id: ChannelId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<EpgProgram>>;
}

/// Profile membership and enabled flags on the platform
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn list_profiles(&self) -> AppResult<Vec<Profile>>;

    async fn get_profile(&self, profile_id: ProfileId) -> AppResult<Profile>;

    async fn set_channel_enabled(
        &self,
        profile_id: ProfileId,
        channel_id: ChannelId,
        enabled: bool,
    ) -> AppResult<()>;
}

/// Persistence of profile snapshots, at most one per profile
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert or replace the snapshot of `snapshot.profile_id`
    async fn save(&self, snapshot: &ProfileSnapshot) -> AppResult<()>;

    async fn get(&self, profile_id: ProfileId) -> AppResult<Option<ProfileSnapshot>>;

    async fn delete(&self, profile_id: ProfileId) -> AppResult<bool>;

    async fn list(&self) -> AppResult<Vec<ProfileSnapshot>>;
}

/// Append-only audit trail
#[async_trait]
pub trait ChangelogSink: Send + Sync {
    async fn append(&self, entry: ChangelogEntry) -> AppResult<()>;
}
