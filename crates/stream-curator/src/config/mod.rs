use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use crate::automation::settings::{AutomationToggles, PipelineSettingsInput};
use crate::automation::types::{ConcurrencyLimits, DeadStreamConfig, QueueLimits};
use crate::utils::cron_helper;
use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub epg: EpgConfig,
    #[serde(default)]
    pub dead_streams: DeadStreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    pub max_connections: Option<u32>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: Some(DEFAULT_MAX_CONNECTIONS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Connection settings for the channel-management platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_url")]
    pub base_url: String,
    /// Static bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default = "default_platform_request_timeout", with = "duration_serde::duration")]
    pub request_timeout: Duration,
    /// JSON file holding per-channel stream-name regex patterns
    #[serde(default = "default_patterns_file")]
    pub patterns_file: PathBuf,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_url(),
            api_token: None,
            request_timeout: default_platform_request_timeout(),
            patterns_file: default_patterns_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// IANA timezone the global schedule is evaluated in
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Either `mode = "pipeline_1_5"` or a `[automation.pipeline.toggles]` table
    #[serde(default = "default_pipeline")]
    pub pipeline: PipelineSettingsInput,
    /// Standard 5-field cron expression for the global sweep
    #[serde(default = "default_global_schedule")]
    pub global_schedule: String,
    /// Period of the automatic playlist-update cycle
    #[serde(default = "default_automation_interval", with = "duration_serde::duration")]
    pub automation_interval: Duration,
    #[serde(default = "default_dispatch_interval", with = "duration_serde::duration")]
    pub dispatch_interval: Duration,
    #[serde(default = "default_shutdown_grace_period", with = "duration_serde::duration")]
    pub shutdown_grace_period: Duration,
    #[serde(default)]
    pub queue: QueueLimits,
    #[serde(default)]
    pub concurrency: ConcurrencyLimits,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            pipeline: default_pipeline(),
            global_schedule: default_global_schedule(),
            automation_interval: default_automation_interval(),
            dispatch_interval: default_dispatch_interval(),
            shutdown_grace_period: default_shutdown_grace_period(),
            queue: QueueLimits::default(),
            concurrency: ConcurrencyLimits::default(),
        }
    }
}

impl AutomationConfig {
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", self.timezone, e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_ffprobe_command")]
    pub ffprobe_command: String,
    #[serde(default = "default_probe_timeout", with = "duration_serde::duration")]
    pub timeout: Duration,
    #[serde(default = "default_analyze_duration", with = "duration_serde::duration")]
    pub analyze_duration: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffprobe_command: default_ffprobe_command(),
            timeout: default_probe_timeout(),
            analyze_duration: default_analyze_duration(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgConfig {
    /// How often auto-create rules are regenerated from fresh EPG data
    #[serde(default = "default_epg_refresh_interval", with = "duration_serde::duration")]
    pub refresh_interval: Duration,
    /// How far ahead programs are considered when generating events
    #[serde(default = "default_epg_lookahead", with = "duration_serde::duration")]
    pub lookahead: Duration,
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_epg_refresh_interval(),
            lookahead: default_epg_lookahead(),
        }
    }
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_platform_url() -> String {
    DEFAULT_PLATFORM_URL.to_string()
}

fn default_platform_request_timeout() -> Duration {
    duration_serde::parse_default(DEFAULT_PLATFORM_REQUEST_TIMEOUT)
}

fn default_patterns_file() -> PathBuf {
    PathBuf::from(DEFAULT_PATTERNS_FILE)
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_pipeline() -> PipelineSettingsInput {
    PipelineSettingsInput::from_toggles(AutomationToggles::default())
}

fn default_global_schedule() -> String {
    DEFAULT_GLOBAL_SCHEDULE.to_string()
}

fn default_automation_interval() -> Duration {
    duration_serde::parse_default(DEFAULT_AUTOMATION_INTERVAL)
}

fn default_dispatch_interval() -> Duration {
    duration_serde::parse_default(DEFAULT_DISPATCH_INTERVAL)
}

fn default_shutdown_grace_period() -> Duration {
    duration_serde::parse_default(DEFAULT_SHUTDOWN_GRACE_PERIOD)
}

fn default_ffprobe_command() -> String {
    DEFAULT_FFPROBE_COMMAND.to_string()
}

fn default_probe_timeout() -> Duration {
    duration_serde::parse_default(DEFAULT_PROBE_TIMEOUT)
}

fn default_analyze_duration() -> Duration {
    duration_serde::parse_default(DEFAULT_ANALYZE_DURATION)
}

fn default_epg_refresh_interval() -> Duration {
    duration_serde::parse_default(DEFAULT_EPG_REFRESH_INTERVAL)
}

fn default_epg_lookahead() -> Duration {
    duration_serde::parse_default(DEFAULT_EPG_LOOKAHEAD)
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    /// Load the TOML file merged with `STREAM_CURATOR_*` environment overrides.
    /// A default file is written when none exists.
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let path = Path::new(config_file);
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let contents = toml::to_string_pretty(&Self::default())?;
            std::fs::write(path, contents)?;
            info!("Created default config file: {}", config_file);
        }

        let config: Config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later at runtime
    pub fn validate(&self) -> Result<()> {
        self.automation.timezone()?;
        cron_helper::parse_schedule(&self.automation.global_schedule)
            .map_err(|e| anyhow::anyhow!("automation.global_schedule: {}", e))?;
        self.automation
            .pipeline
            .resolve()
            .map_err(|e| anyhow::anyhow!("automation.pipeline: {}", e))?;
        self.automation
            .queue
            .validate()
            .map_err(|e| anyhow::anyhow!("automation.queue: {}", e))?;
        self.automation
            .concurrency
            .validate()
            .map_err(|e| anyhow::anyhow!("automation.concurrency: {}", e))?;
        self.dead_streams
            .validate()
            .map_err(|e| anyhow::anyhow!("dead_streams: {}", e))?;
        url::Url::parse(&self.platform.base_url)
            .map_err(|e| anyhow::anyhow!("platform.base_url '{}': {}", self.platform.base_url, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::settings::LegacyPipelineMode;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.automation.global_schedule, "0 3 * * *");
        assert_eq!(config.automation.queue.max_size, DEFAULT_QUEUE_MAX_SIZE);
        assert_eq!(config.automation.shutdown_grace_period, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path_str = path.to_str().unwrap();

        let config = Config::load_from_file(path_str).unwrap();
        assert!(path.exists());
        assert_eq!(config.web.port, DEFAULT_PORT);

        // The written file must load back to the same settings
        let reloaded = Config::load_from_file(path_str).unwrap();
        assert_eq!(reloaded.automation.pipeline, config.automation.pipeline);
    }

    #[test]
    fn test_legacy_mode_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[automation]
timezone = "Europe/London"
global_schedule = "30 4 * * 1-5"
automation_interval = "10m"

[automation.pipeline]
mode = "pipeline_2_5"

[automation.concurrency]
global_limit = 2
stagger_delay = "250ms"
"#,
        )
        .unwrap();

        let config = Config::load_from_file(path.to_str().unwrap()).unwrap();
        let toggles = config.automation.pipeline.resolve().unwrap();
        assert_eq!(toggles.legacy_mode(), LegacyPipelineMode::Pipeline2_5);
        assert_eq!(config.automation.automation_interval, Duration::from_secs(600));
        assert_eq!(config.automation.concurrency.global_limit, 2);
        assert_eq!(config.automation.concurrency.stagger_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_conflicting_pipeline_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[automation.pipeline]
mode = "pipeline_1"

[automation.pipeline.toggles]
auto_m3u_updates = true
"#,
        )
        .unwrap();

        let error = Config::load_from_file(path.to_str().unwrap()).unwrap_err();
        assert!(error.to_string().contains("automation.pipeline"));
    }

    #[test]
    fn test_invalid_schedule_is_rejected() {
        let mut config = Config::default();
        config.automation.global_schedule = "0 3 * *".to_string();
        assert!(config.validate().is_err());
    }
}
