//! Stream probing through ffprobe
//!
//! Runs ffprobe against a stream URL and reduces its JSON report to the
//! resolution, bitrate, frame rate and codecs the quality checker scores.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::automation::AutomationError;
use crate::config::ProbeConfig;
use crate::errors::AppResult;
use crate::models::{Resolution, StreamProbeInfo};
use crate::platform::StreamProbe;

/// [`StreamProbe`] backed by an ffprobe executable
pub struct FfprobeStreamProbe {
    ffprobe_command: String,
    analyze_duration: Duration,
}

impl FfprobeStreamProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            ffprobe_command: config.ffprobe_command.clone(),
            analyze_duration: config.analyze_duration,
        }
    }

    fn command(&self, url: &str) -> Command {
        let mut cmd = Command::new(&self.ffprobe_command);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_error",
            "-show_entries",
            "stream=codec_type,codec_name,bit_rate,width,height,r_frame_rate,avg_frame_rate:format=bit_rate",
            "-analyzeduration",
        ]);
        cmd.arg(self.analyze_duration.as_micros().to_string());
        cmd.args(["-probesize", "5000000", url]);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl StreamProbe for FfprobeStreamProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> AppResult<StreamProbeInfo> {
        debug!("Probing stream: {}", url);

        let output = tokio::time::timeout(timeout, self.command(url).output())
            .await
            .map_err(|_| AutomationError::ProbeTimeout {
                url: url.to_string(),
                timeout,
            })?
            .map_err(|e| AutomationError::ProbeFailed {
                url: url.to_string(),
                message: format!("failed to execute {}: {}", self.ffprobe_command, e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AutomationError::ProbeFailed {
                url: url.to_string(),
                message: format!(
                    "no output (exit code {:?}): {}",
                    output.status.code(),
                    stderr.trim()
                ),
            }
            .into());
        }

        let report: Value = serde_json::from_str(&stdout).map_err(|e| AutomationError::ProbeFailed {
            url: url.to_string(),
            message: format!("unparseable ffprobe output: {}", e),
        })?;

        let info = parse_probe_report(&report).map_err(|message| {
            warn!("ffprobe reported an error for {}: {}", url, message);
            AutomationError::ProbeFailed {
                url: url.to_string(),
                message,
            }
        })?;

        debug!(
            "Probed {}: resolution {:?}, bitrate {:?} kbps, fps {:?}, codec {:?}",
            url, info.resolution, info.bitrate_kbps, info.fps, info.video_codec
        );
        Ok(info)
    }
}

/// Reduce an ffprobe JSON report. Returns the ffprobe error message when the
/// report carries one or describes no stream at all.
pub fn parse_probe_report(report: &Value) -> Result<StreamProbeInfo, String> {
    if let Some(error) = report.get("error") {
        let message = error
            .get("string")
            .and_then(Value::as_str)
            .unwrap_or("unknown ffprobe error");
        let code = error.get("code").and_then(Value::as_i64);
        return Err(format!("{} (code: {:?})", message, code));
    }

    let streams = report
        .get("streams")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if streams.is_empty() {
        return Err("no streams found".to_string());
    }

    let of_type = |kind: &str| {
        streams
            .iter()
            .find(|s| s.get("codec_type").and_then(Value::as_str) == Some(kind))
    };
    let video = of_type("video");
    let audio = of_type("audio");

    let resolution = video.and_then(|v| {
        let width = v.get("width").and_then(Value::as_u64)?;
        let height = v.get("height").and_then(Value::as_u64)?;
        Some(Resolution {
            width: u32::try_from(width).ok()?,
            height: u32::try_from(height).ok()?,
        })
    });

    let fps = video.and_then(|v| {
        ["avg_frame_rate", "r_frame_rate"]
            .iter()
            .filter_map(|key| v.get(*key).and_then(Value::as_str))
            .find_map(parse_frame_rate)
    });

    // ffprobe reports bit rates as strings in bits per second
    let bits_per_second = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|bps| *bps > 0)
    };
    let bitrate_kbps = bits_per_second(video.and_then(|v| v.get("bit_rate")))
        .or_else(|| bits_per_second(report.get("format").and_then(|f| f.get("bit_rate"))))
        .map(|bps| bps / 1000);

    let codec = |stream: Option<&Value>| {
        stream
            .and_then(|s| s.get("codec_name"))
            .and_then(Value::as_str)
            .map(normalize_codec_name)
    };

    Ok(StreamProbeInfo {
        resolution,
        bitrate_kbps,
        fps,
        video_codec: codec(video),
        audio_codec: codec(audio),
    })
}

/// Parse ffprobe rates such as "30000/1001" or "25"
fn parse_frame_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((numerator, denominator)) => {
            let denominator: f64 = denominator.parse().ok()?;
            if denominator == 0.0 {
                return None;
            }
            numerator.parse::<f64>().ok()? / denominator
        }
        None => value.parse().ok()?,
    };
    (rate > 0.0).then_some(rate)
}

/// Normalize codec names for comparison
pub fn normalize_codec_name(codec: &str) -> String {
    match codec.to_lowercase().as_str() {
        "h264" | "avc" | "avc1" => "h264".to_string(),
        "h265" | "hevc" | "hev1" => "hevc".to_string(),
        "mpeg2video" | "mpeg2" => "mpeg2".to_string(),
        "aac" | "mp4a" => "aac".to_string(),
        "mp3" | "mp3float" => "mp3".to_string(),
        "ac3" | "ac-3" => "ac3".to_string(),
        "eac3" | "eac-3" => "eac3".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_codec_name() {
        assert_eq!(normalize_codec_name("avc"), "h264");
        assert_eq!(normalize_codec_name("H265"), "hevc");
        assert_eq!(normalize_codec_name("mpeg2video"), "mpeg2");
        assert_eq!(normalize_codec_name("mp4a"), "aac");
    }

    #[test]
    fn test_parse_frame_rate() {
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn test_parse_probe_report() {
        let report = json!({
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "avg_frame_rate": "0/0",
                    "r_frame_rate": "50/1"
                }
            ],
            "format": {"bit_rate": "6500000"}
        });

        let info = parse_probe_report(&report).unwrap();
        assert_eq!(info.resolution, Some(Resolution { width: 1920, height: 1080 }));
        assert_eq!(info.bitrate_kbps, Some(6500));
        assert_eq!(info.fps, Some(50.0));
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.audio_codec.as_deref(), Some("aac"));
    }

    #[test]
    fn test_parse_probe_report_with_error() {
        let report = json!({
            "error": {"code": -2, "string": "No such file or directory"}
        });
        let message = parse_probe_report(&report).unwrap_err();
        assert!(message.contains("No such file or directory"));

        assert!(parse_probe_report(&json!({"streams": []})).is_err());
    }

    #[test]
    fn test_audio_only_stream_has_no_resolution() {
        let report = json!({
            "streams": [{"codec_type": "audio", "codec_name": "mp3", "bit_rate": "128000"}]
        });
        let info = parse_probe_report(&report).unwrap();
        assert_eq!(info.resolution, None);
        assert_eq!(info.bitrate_kbps, None);
    }

    #[tokio::test]
    async fn test_missing_executable_is_probe_failure() {
        let probe = FfprobeStreamProbe::new(&ProbeConfig {
            ffprobe_command: "/nonexistent/ffprobe-binary".to_string(),
            ..ProbeConfig::default()
        });
        let error = probe
            .probe("http://127.0.0.1:9/stream.ts", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            crate::errors::AppError::Automation(AutomationError::ProbeFailed { .. })
        ));
    }
}
