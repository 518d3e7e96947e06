//! Domain models shared by the automation engine, the platform collaborators
//! and the web layer.

pub mod changelog;
pub mod channel;
pub mod check;
pub mod profile;
pub mod scheduling;

pub use changelog::*;
pub use channel::*;
pub use check::*;
pub use profile::*;
pub use scheduling::*;

/// Identifier of a channel on the channel-management platform
pub type ChannelId = i64;
/// Identifier of a channel group on the platform
pub type GroupId = i64;
/// Identifier of a stream on the platform
pub type StreamId = i64;
/// Identifier of an M3U account (playlist provider) on the platform
pub type AccountId = i64;
/// Identifier of a channel profile on the platform
pub type ProfileId = i64;
