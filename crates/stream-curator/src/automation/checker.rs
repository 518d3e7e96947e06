//! Channel checks: probe every stream of a channel, score and classify the
//! results, reorder the assignment and hand the outcome to the lifecycle
//! manager.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::immunity::ImmunityTracker;
use super::lifecycle::{DeadStreamLifecycleManager, classify_stream};
use super::types::{AutomationError, DeadStreamConfig};
use crate::errors::{AppError, AppResult};
use crate::models::{
    ChangelogAction, ChangelogEntry, Channel, ChannelCheckReport, ChannelId, Stream,
    StreamCheckResult, StreamId, StreamProbeInfo, StreamStatus,
};
use crate::platform::{ChangelogSink, ChannelDirectory, StreamProbe};

const RESOLUTION_WEIGHT: f64 = 0.40;
const BITRATE_WEIGHT: f64 = 0.35;
const FPS_WEIGHT: f64 = 0.15;
const CODEC_WEIGHT: f64 = 0.10;

const REFERENCE_HEIGHT: f64 = 1080.0;
const REFERENCE_BITRATE_KBPS: f64 = 8000.0;
const REFERENCE_FPS: f64 = 60.0;

/// Quality score in `[0, 1]` from probed characteristics
pub fn score_stream(info: &StreamProbeInfo) -> f64 {
    let resolution = info
        .resolution
        .map(|r| (r.height as f64 / REFERENCE_HEIGHT).min(1.0))
        .unwrap_or(0.0);
    let bitrate = info
        .bitrate_kbps
        .map(|kbps| (kbps as f64 / REFERENCE_BITRATE_KBPS).min(1.0))
        .unwrap_or(0.0);
    let fps = info
        .fps
        .map(|fps| (fps / REFERENCE_FPS).clamp(0.0, 1.0))
        .unwrap_or(0.0);
    let codec = info.video_codec.as_deref().map(codec_quality).unwrap_or(0.0);

    resolution * RESOLUTION_WEIGHT + bitrate * BITRATE_WEIGHT + fps * FPS_WEIGHT + codec * CODEC_WEIGHT
}

fn codec_quality(codec: &str) -> f64 {
    match codec.to_lowercase().as_str() {
        "hevc" | "h265" | "av1" => 1.0,
        "h264" | "avc" | "avc1" => 0.8,
        "mpeg2video" | "mpeg2" => 0.5,
        _ => 0.4,
    }
}

/// New assignment order for a checked channel.
///
/// Live streams come first by descending score (stable for ties), dead
/// streams keep their relative order at the end. Dead streams are dropped
/// only when `remove_dead` is set and at least one live stream remains.
pub fn plan_stream_order(results: &[StreamCheckResult], remove_dead: bool) -> (Vec<StreamId>, Vec<StreamId>) {
    let mut live: Vec<&StreamCheckResult> = results.iter().filter(|r| r.is_live()).collect();
    live.sort_by(|a, b| b.score.total_cmp(&a.score));
    let dead: Vec<StreamId> = results.iter().filter(|r| !r.is_live()).map(|r| r.stream_id).collect();

    let mut order: Vec<StreamId> = live.iter().map(|r| r.stream_id).collect();
    if remove_dead && !order.is_empty() {
        (order, dead)
    } else {
        order.extend(dead);
        (order, Vec::new())
    }
}

/// Channel-level rollup of per-stream results
pub fn summarize(channel: &Channel, streams: Vec<StreamCheckResult>, checked_at: DateTime<Utc>) -> ChannelCheckReport {
    let live: Vec<&StreamCheckResult> = streams.iter().filter(|s| s.is_live()).collect();

    let mut resolution_counts: HashMap<String, (usize, u64)> = HashMap::new();
    for info in live.iter().filter_map(|s| s.info.as_ref()) {
        if let Some(resolution) = info.resolution {
            let pixels = resolution.width as u64 * resolution.height as u64;
            resolution_counts.entry(resolution.to_string()).or_insert((0, pixels)).0 += 1;
        }
    }
    let most_common_resolution = resolution_counts
        .into_iter()
        .max_by(|(_, a), (_, b)| a.0.cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(resolution, _)| resolution);

    let bitrates: Vec<u64> = live
        .iter()
        .filter_map(|s| s.info.as_ref().and_then(|i| i.bitrate_kbps))
        .collect();
    let average_bitrate_kbps = if bitrates.is_empty() {
        None
    } else {
        Some(bitrates.iter().sum::<u64>() / bitrates.len() as u64)
    };

    let best_score = live.iter().map(|s| s.score).max_by(|a, b| a.total_cmp(b));

    ChannelCheckReport {
        channel_id: channel.id,
        channel_name: channel.name.clone(),
        checked_at,
        total_streams: streams.len(),
        live_streams: live.len(),
        dead_streams: streams.len() - live.len(),
        most_common_resolution,
        average_bitrate_kbps,
        best_score,
        streams,
        reordered: false,
        removed_streams: Vec::new(),
    }
}

pub struct ChannelChecker {
    directory: Arc<dyn ChannelDirectory>,
    probe: Arc<dyn StreamProbe>,
    immunity: Arc<ImmunityTracker>,
    lifecycle: Arc<DeadStreamLifecycleManager>,
    changelog: Arc<dyn ChangelogSink>,
    probe_timeout: Duration,
    stagger_delay_ms: AtomicU64,
}

impl ChannelChecker {
    pub fn new(
        directory: Arc<dyn ChannelDirectory>,
        probe: Arc<dyn StreamProbe>,
        immunity: Arc<ImmunityTracker>,
        lifecycle: Arc<DeadStreamLifecycleManager>,
        changelog: Arc<dyn ChangelogSink>,
        probe_timeout: Duration,
        stagger_delay: Duration,
    ) -> Self {
        Self {
            directory,
            probe,
            immunity,
            lifecycle,
            changelog,
            probe_timeout,
            stagger_delay_ms: AtomicU64::new(stagger_delay.as_millis() as u64),
        }
    }

    pub fn stagger_delay(&self) -> Duration {
        Duration::from_millis(self.stagger_delay_ms.load(Ordering::Relaxed))
    }

    pub fn set_stagger_delay(&self, delay: Duration) {
        self.stagger_delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Check a channel and record the outcome; returns whether the check succeeded.
    /// Failed checks do not grant immunity.
    pub async fn run_check(&self, channel_id: ChannelId) -> bool {
        match self.check_channel(channel_id).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Check of channel {} failed: {}", channel_id, e);
                self.record(
                    ChangelogAction::ChannelCheckFailed,
                    format!("Check of channel {channel_id} failed"),
                    json!({ "channel_id": channel_id, "error": e.to_string() }),
                )
                .await;
                false
            }
        }
    }

    /// Probe every stream of the channel and apply the results
    pub async fn check_channel(&self, channel_id: ChannelId) -> AppResult<ChannelCheckReport> {
        let channel = self.directory.get_channel(channel_id).await?;
        let streams = self.directory.channel_streams(channel_id).await?;
        let config = self.lifecycle.config().await;

        debug!("Checking channel {} ({}) with {} streams", channel.id, channel.name, streams.len());

        let stagger = self.stagger_delay();
        let mut results = Vec::with_capacity(streams.len());
        for (index, stream) in streams.iter().enumerate() {
            if index > 0 && !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
            results.push(self.check_stream(stream, &config).await);
        }

        let checked_at = Utc::now();
        let mut report = summarize(&channel, results, checked_at);

        let current: Vec<StreamId> = streams.iter().map(|s| s.id).collect();
        let (order, removed) = plan_stream_order(&report.streams, config.remove_dead_streams);
        if order != current {
            self.directory.set_channel_streams(channel_id, &order).await?;
            report.reordered = true;
            report.removed_streams = removed;
        }

        self.immunity.mark_checked(channel_id, checked_at);

        if let Err(e) = self.lifecycle.on_channel_checked(&report).await {
            warn!("Dead-stream handling for channel {} failed: {}", channel_id, e);
        }

        info!(
            "Checked channel {} ({}): {}/{} live, best score {:.2}{}",
            channel.id,
            channel.name,
            report.live_streams,
            report.total_streams,
            report.best_score.unwrap_or(0.0),
            if report.reordered { ", streams reordered" } else { "" }
        );
        self.record(
            ChangelogAction::ChannelCheck,
            format!("Checked channel '{}'", channel.name),
            json!({
                "channel_id": channel.id,
                "total_streams": report.total_streams,
                "live_streams": report.live_streams,
                "dead_streams": report.dead_streams,
                "most_common_resolution": report.most_common_resolution,
                "average_bitrate_kbps": report.average_bitrate_kbps,
                "reordered": report.reordered,
                "removed_streams": report.removed_streams,
            }),
        )
        .await;

        Ok(report)
    }

    async fn check_stream(&self, stream: &Stream, config: &DeadStreamConfig) -> StreamCheckResult {
        // The outer timeout also bounds probes that ignore their own deadline
        let outcome = match tokio::time::timeout(self.probe_timeout, self.probe.probe(&stream.url, self.probe_timeout)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::from(AutomationError::ProbeTimeout {
                url: stream.url.clone(),
                timeout: self.probe_timeout,
            })),
        };

        match outcome {
            Ok(info) => {
                let score = score_stream(&info);
                let status = classify_stream(config, &info, score);
                if status == StreamStatus::Dead {
                    debug!("Stream {} ({}) classified dead", stream.id, stream.name);
                }
                StreamCheckResult {
                    stream_id: stream.id,
                    stream_name: stream.name.clone(),
                    status,
                    info: Some(info),
                    score,
                    error: None,
                }
            }
            Err(e) => {
                debug!("Probe of stream {} ({}) failed: {}", stream.id, stream.name, e);
                StreamCheckResult {
                    stream_id: stream.id,
                    stream_name: stream.name.clone(),
                    status: StreamStatus::Dead,
                    info: None,
                    score: 0.0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn record(&self, action: ChangelogAction, summary: String, details: serde_json::Value) {
        if let Err(e) = self.changelog.append(ChangelogEntry::new(action, summary, details)).await {
            warn!("Failed to write {} changelog entry: {}", action, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resolution;

    fn result(stream_id: StreamId, status: StreamStatus, score: f64, resolution: Option<(u32, u32)>, kbps: Option<u64>) -> StreamCheckResult {
        StreamCheckResult {
            stream_id,
            stream_name: format!("stream-{stream_id}"),
            status,
            info: Some(StreamProbeInfo {
                resolution: resolution.map(|(width, height)| Resolution { width, height }),
                bitrate_kbps: kbps,
                ..Default::default()
            }),
            score,
            error: None,
        }
    }

    fn channel() -> Channel {
        Channel {
            id: 7,
            name: "News HD".to_string(),
            channel_number: Some(7.0),
            group_id: None,
            stream_ids: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_score_weights() {
        let full = StreamProbeInfo {
            resolution: Some(Resolution { width: 3840, height: 2160 }),
            bitrate_kbps: Some(20_000),
            fps: Some(60.0),
            video_codec: Some("hevc".to_string()),
            audio_codec: None,
        };
        assert!((score_stream(&full) - 1.0).abs() < 1e-9);

        let hd = StreamProbeInfo {
            resolution: Some(Resolution { width: 1920, height: 1080 }),
            bitrate_kbps: Some(4000),
            fps: Some(30.0),
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
        };
        let expected = 0.40 + 0.5 * 0.35 + 0.5 * 0.15 + 0.8 * 0.10;
        assert!((score_stream(&hd) - expected).abs() < 1e-9);

        assert_eq!(score_stream(&StreamProbeInfo::default()), 0.0);
    }

    #[test]
    fn test_plan_order_live_first_by_score() {
        let results = vec![
            result(1, StreamStatus::Dead, 0.0, None, None),
            result(2, StreamStatus::Live, 0.5, Some((1280, 720)), Some(3000)),
            result(3, StreamStatus::Live, 0.9, Some((1920, 1080)), Some(6000)),
        ];

        let (order, removed) = plan_stream_order(&results, false);
        assert_eq!(order, vec![3, 2, 1]);
        assert!(removed.is_empty());

        let (order, removed) = plan_stream_order(&results, true);
        assert_eq!(order, vec![3, 2]);
        assert_eq!(removed, vec![1]);
    }

    #[test]
    fn test_plan_order_keeps_dead_when_nothing_live() {
        let results = vec![
            result(1, StreamStatus::Dead, 0.0, None, None),
            result(2, StreamStatus::Dead, 0.0, None, None),
        ];
        let (order, removed) = plan_stream_order(&results, true);
        assert_eq!(order, vec![1, 2]);
        assert!(removed.is_empty());
    }

    #[test]
    fn test_summarize_rollup() {
        let results = vec![
            result(1, StreamStatus::Live, 0.7, Some((1920, 1080)), Some(5000)),
            result(2, StreamStatus::Live, 0.6, Some((1920, 1080)), Some(3000)),
            result(3, StreamStatus::Live, 0.4, Some((1280, 720)), None),
            result(4, StreamStatus::Dead, 0.0, Some((0, 0)), Some(0)),
        ];
        let report = summarize(&channel(), results, Utc::now());

        assert_eq!(report.total_streams, 4);
        assert_eq!(report.live_streams, 3);
        assert_eq!(report.dead_streams, 1);
        assert_eq!(report.most_common_resolution.as_deref(), Some("1920x1080"));
        assert_eq!(report.average_bitrate_kbps, Some(4000));
        assert_eq!(report.best_score, Some(0.7));
        assert!(!report.reordered);
    }

    #[test]
    fn test_summarize_empty_channel() {
        let report = summarize(&channel(), Vec::new(), Utc::now());
        assert_eq!(report.total_streams, 0);
        assert_eq!(report.live_streams, 0);
        assert!(report.most_common_resolution.is_none());
        assert!(report.average_bitrate_kbps.is_none());
        assert!(report.best_score.is_none());
    }
}
