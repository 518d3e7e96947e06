use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ChannelId, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Characteristics reported by a stream probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamProbeInfo {
    pub resolution: Option<Resolution>,
    pub bitrate_kbps: Option<u64>,
    pub fps: Option<f64>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Live,
    Dead,
}

/// Outcome of probing one stream during a channel check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamCheckResult {
    pub stream_id: StreamId,
    pub stream_name: String,
    pub status: StreamStatus,
    pub info: Option<StreamProbeInfo>,
    pub score: f64,
    pub error: Option<String>,
}

impl StreamCheckResult {
    pub fn is_live(&self) -> bool {
        self.status == StreamStatus::Live
    }
}

/// Channel-level rollup produced by one worker unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCheckReport {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub checked_at: DateTime<Utc>,
    pub streams: Vec<StreamCheckResult>,
    pub total_streams: usize,
    pub live_streams: usize,
    pub dead_streams: usize,
    pub most_common_resolution: Option<String>,
    pub average_bitrate_kbps: Option<u64>,
    pub best_score: Option<f64>,
    pub reordered: bool,
    pub removed_streams: Vec<StreamId>,
}
