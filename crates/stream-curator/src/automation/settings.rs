//! Pipeline toggles, legacy mode derivation and the persisted automation settings

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::AutomationConfig;
use crate::database::repositories::SettingsRepository;
use crate::errors::{AppError, AppResult};
use crate::utils::cron_helper;

use super::types::{AutomationError, ConcurrencyLimits, QueueLimits};

const AUTOMATION_SETTINGS_KEY: &str = "automation";

/// Independent automation switches. This is the only representation that drives behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationToggles {
    pub auto_m3u_updates: bool,
    pub auto_stream_matching: bool,
    pub auto_quality_checking: bool,
    pub scheduled_global_action: bool,
    pub remove_non_matching_streams: bool,
}

impl Default for AutomationToggles {
    fn default() -> Self {
        Self {
            auto_m3u_updates: true,
            auto_stream_matching: true,
            auto_quality_checking: true,
            scheduled_global_action: true,
            remove_non_matching_streams: false,
        }
    }
}

impl AutomationToggles {
    pub fn disabled() -> Self {
        Self {
            auto_m3u_updates: false,
            auto_stream_matching: false,
            auto_quality_checking: false,
            scheduled_global_action: false,
            remove_non_matching_streams: false,
        }
    }

    /// Legacy label for display, derived from the toggle combination
    pub fn legacy_mode(&self) -> LegacyPipelineMode {
        match (
            self.auto_m3u_updates,
            self.auto_stream_matching,
            self.auto_quality_checking,
            self.scheduled_global_action,
        ) {
            (false, false, false, false) => LegacyPipelineMode::Disabled,
            (true, true, true, false) => LegacyPipelineMode::Pipeline1,
            (true, true, true, true) => LegacyPipelineMode::Pipeline1_5,
            (true, true, false, false) => LegacyPipelineMode::Pipeline2,
            (true, true, false, true) => LegacyPipelineMode::Pipeline2_5,
            (false, false, false, true) => LegacyPipelineMode::Pipeline3,
            _ => LegacyPipelineMode::Custom,
        }
    }

    /// Whether the periodic cycle has any stage to run
    pub fn has_automatic_stage(&self) -> bool {
        self.auto_m3u_updates || self.auto_stream_matching || self.auto_quality_checking
    }
}

/// Named stage bundles from the older configuration model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum LegacyPipelineMode {
    #[serde(rename = "disabled")]
    #[strum(serialize = "disabled")]
    Disabled,
    #[serde(rename = "pipeline_1")]
    #[strum(serialize = "pipeline_1")]
    Pipeline1,
    #[serde(rename = "pipeline_1_5")]
    #[strum(serialize = "pipeline_1_5")]
    Pipeline1_5,
    #[serde(rename = "pipeline_2")]
    #[strum(serialize = "pipeline_2")]
    Pipeline2,
    #[serde(rename = "pipeline_2_5")]
    #[strum(serialize = "pipeline_2_5")]
    Pipeline2_5,
    #[serde(rename = "pipeline_3")]
    #[strum(serialize = "pipeline_3")]
    Pipeline3,
    /// Toggle combination without a legacy name; display only
    #[serde(rename = "custom")]
    #[strum(serialize = "custom")]
    Custom,
}

impl LegacyPipelineMode {
    /// One-time migration of a stored legacy mode into toggles
    fn migrate(self) -> Option<AutomationToggles> {
        let (update, matching, check, scheduled) = match self {
            LegacyPipelineMode::Disabled => (false, false, false, false),
            LegacyPipelineMode::Pipeline1 => (true, true, true, false),
            LegacyPipelineMode::Pipeline1_5 => (true, true, true, true),
            LegacyPipelineMode::Pipeline2 => (true, true, false, false),
            LegacyPipelineMode::Pipeline2_5 => (true, true, false, true),
            LegacyPipelineMode::Pipeline3 => (false, false, false, true),
            LegacyPipelineMode::Custom => return None,
        };
        Some(AutomationToggles {
            auto_m3u_updates: update,
            auto_stream_matching: matching,
            auto_quality_checking: check,
            scheduled_global_action: scheduled,
            remove_non_matching_streams: false,
        })
    }
}

/// Pipeline configuration as supplied by a config file or an API caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettingsInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<LegacyPipelineMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggles: Option<AutomationToggles>,
}

impl PipelineSettingsInput {
    pub fn from_toggles(toggles: AutomationToggles) -> Self {
        Self {
            mode: None,
            toggles: Some(toggles),
        }
    }

    /// Resolve to toggles; supplying both representations is a conflict
    pub fn resolve(&self) -> AppResult<AutomationToggles> {
        match (self.mode, self.toggles) {
            (Some(mode), Some(_)) => Err(AutomationError::ConfigConflict {
                message: format!(
                    "legacy mode '{mode}' and independent toggles were both supplied; set only one"
                ),
            }
            .into()),
            (Some(mode), None) => mode.migrate().ok_or_else(|| {
                AppError::validation("'custom' is a derived label and cannot be selected")
            }),
            (None, Some(toggles)) => Ok(toggles),
            (None, None) => Err(AppError::validation(
                "pipeline settings require either a mode or toggles",
            )),
        }
    }
}

/// Pipeline settings as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettingsView {
    pub mode: LegacyPipelineMode,
    pub toggles: AutomationToggles,
}

impl From<AutomationToggles> for PipelineSettingsView {
    fn from(toggles: AutomationToggles) -> Self {
        Self {
            mode: toggles.legacy_mode(),
            toggles,
        }
    }
}

/// Runtime-mutable automation settings persisted across restarts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationSettings {
    pub toggles: AutomationToggles,
    pub queue: QueueLimits,
    pub concurrency: ConcurrencyLimits,
    pub global_schedule: String,
}

impl AutomationSettings {
    pub fn from_config(config: &AutomationConfig) -> AppResult<Self> {
        Ok(Self {
            toggles: config.pipeline.resolve()?,
            queue: config.queue,
            concurrency: config.concurrency,
            global_schedule: config.global_schedule.clone(),
        })
    }
}

/// Owner of the current automation settings
pub struct AutomationSettingsStore {
    repository: SettingsRepository,
    current: RwLock<AutomationSettings>,
}

impl AutomationSettingsStore {
    /// Load stored settings, seeding them from `seed` on first start
    pub async fn load(repository: SettingsRepository, seed: AutomationSettings) -> AppResult<Self> {
        let current = match repository.get::<AutomationSettings>(AUTOMATION_SETTINGS_KEY).await? {
            Some(stored) => {
                info!(
                    "Loaded stored automation settings (pipeline: {})",
                    stored.toggles.legacy_mode()
                );
                stored
            }
            None => {
                repository.put(AUTOMATION_SETTINGS_KEY, &seed).await?;
                info!(
                    "Seeded automation settings from configuration (pipeline: {})",
                    seed.toggles.legacy_mode()
                );
                seed
            }
        };

        Ok(Self {
            repository,
            current: RwLock::new(current),
        })
    }

    pub async fn snapshot(&self) -> AutomationSettings {
        self.current.read().await.clone()
    }

    pub async fn toggles(&self) -> AutomationToggles {
        self.current.read().await.toggles
    }

    pub async fn pipeline(&self) -> PipelineSettingsView {
        self.toggles().await.into()
    }

    pub async fn update_pipeline(&self, input: PipelineSettingsInput) -> AppResult<PipelineSettingsView> {
        let toggles = input.resolve()?;
        self.update(|settings| settings.toggles = toggles).await?;
        info!("Pipeline settings updated (pipeline: {})", toggles.legacy_mode());
        Ok(toggles.into())
    }

    pub async fn update_queue_limits(&self, limits: QueueLimits) -> AppResult<QueueLimits> {
        limits.validate().map_err(AppError::validation)?;
        self.update(|settings| settings.queue = limits).await?;
        Ok(limits)
    }

    pub async fn update_concurrency(&self, limits: ConcurrencyLimits) -> AppResult<ConcurrencyLimits> {
        limits.validate().map_err(AppError::validation)?;
        self.update(|settings| settings.concurrency = limits).await?;
        Ok(limits)
    }

    pub async fn update_global_schedule(&self, expression: &str) -> AppResult<String> {
        cron_helper::parse_schedule(expression).map_err(AppError::validation)?;
        let expression = expression.trim().to_string();
        let stored = expression.clone();
        self.update(move |settings| settings.global_schedule = stored).await?;
        Ok(expression)
    }

    async fn update<F>(&self, apply: F) -> AppResult<()>
    where
        F: FnOnce(&mut AutomationSettings),
    {
        let mut current = self.current.write().await;
        let mut next = current.clone();
        apply(&mut next);
        self.repository.put(AUTOMATION_SETTINGS_KEY, &next).await?;
        *current = next;
        Ok(())
    }
}
