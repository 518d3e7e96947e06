//! Construction and lifecycle of the automation engine
//!
//! [`AutomationEngine::build`] wires the settings store, queue, worker pool,
//! controller, scheduler and lifecycle manager over the supplied platform
//! collaborators. [`AutomationEngine::spawn`] starts the background loops;
//! all of them stop when the cancellation token fires.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::check_queue::CheckQueue;
use super::checker::ChannelChecker;
use super::controller::{PipelineController, TriggerHandle, TriggerMessage};
use super::epg_rules::EpgRuleService;
use super::immunity::ImmunityTracker;
use super::lifecycle::DeadStreamLifecycleManager;
use super::overrides::OverrideResolver;
use super::scheduler::AutomationScheduler;
use super::service::AutomationService;
use super::settings::{AutomationSettings, AutomationSettingsStore};
use super::worker_pool::WorkerPool;
use crate::config::Config;
use crate::database::Database;
use crate::database::repositories::{
    AutoCreateRuleRepository, ChangelogRepository, LifecycleRecordRepository, OverrideRepository,
    ProfileSnapshotRepository, ScheduledEventRepository, SettingsRepository,
};
use crate::errors::{AppError, AppResult};
use crate::platform::{ChangelogSink, ChannelDirectory, EpgProvider, MatchProvider, ProfileStore, SnapshotStore, StreamProbe};

/// Pending trigger messages the controller has not consumed yet
const TRIGGER_BUFFER: usize = 64;

/// External systems the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn ChannelDirectory>,
    pub matcher: Arc<dyn MatchProvider>,
    pub probe: Arc<dyn StreamProbe>,
    pub epg: Arc<dyn EpgProvider>,
    pub profiles: Arc<dyn ProfileStore>,
}

pub struct AutomationEngine {
    service: Arc<AutomationService>,
    trigger_rx: Mutex<Option<mpsc::Receiver<TriggerMessage>>>,
}

impl AutomationEngine {
    /// Build every component. Stored runtime settings win over `config`,
    /// which only seeds them on first start.
    pub async fn build(config: &Config, database: &Database, collaborators: Collaborators) -> AppResult<Self> {
        let connection = database.connection();
        let timezone = config
            .automation
            .timezone()
            .map_err(|e| AppError::configuration(e.to_string()))?;

        let settings_repository = SettingsRepository::new(connection.clone());
        let settings = Arc::new(
            AutomationSettingsStore::load(
                settings_repository.clone(),
                AutomationSettings::from_config(&config.automation)?,
            )
            .await?,
        );
        let current = settings.snapshot().await;

        let changelog = ChangelogRepository::new(connection.clone());
        let changelog_sink: Arc<dyn ChangelogSink> = Arc::new(changelog.clone());
        let snapshots: Arc<dyn SnapshotStore> = Arc::new(ProfileSnapshotRepository::new(connection.clone()));

        let lifecycle = Arc::new(
            DeadStreamLifecycleManager::load(
                config.dead_streams.clone(),
                settings_repository,
                LifecycleRecordRepository::new(connection.clone()),
                collaborators.profiles.clone(),
                snapshots,
                collaborators.directory.clone(),
                changelog_sink.clone(),
            )
            .await?,
        );

        let queue = Arc::new(CheckQueue::new(current.queue.max_size));
        let immunity = Arc::new(ImmunityTracker::new());
        let overrides = OverrideResolver::new(OverrideRepository::new(connection.clone()));

        let checker = Arc::new(ChannelChecker::new(
            collaborators.directory.clone(),
            collaborators.probe.clone(),
            immunity.clone(),
            lifecycle.clone(),
            changelog_sink.clone(),
            config.probe.timeout,
            current.concurrency.stagger_delay,
        ));

        let pool = Arc::new(WorkerPool::new(
            queue.clone(),
            checker,
            immunity.clone(),
            &current.queue,
            &current.concurrency,
            config.automation.dispatch_interval,
            config.automation.shutdown_grace_period,
        ));

        let controller = Arc::new(PipelineController::new(
            collaborators.directory.clone(),
            collaborators.matcher.clone(),
            settings.clone(),
            overrides.clone(),
            queue.clone(),
            immunity.clone(),
            changelog_sink,
        ));

        let (triggers, trigger_rx) = TriggerHandle::channel(TRIGGER_BUFFER);

        let rules = Arc::new(EpgRuleService::new(
            AutoCreateRuleRepository::new(connection.clone()),
            ScheduledEventRepository::new(connection),
            collaborators.epg.clone(),
            config.epg.lookahead,
        ));

        let scheduler = Arc::new(AutomationScheduler::new(
            settings.clone(),
            rules.clone(),
            triggers.clone(),
            timezone,
            config.automation.automation_interval,
            config.epg.refresh_interval,
            Utc::now(),
        ));

        info!(
            "Automation engine built (queue max {}, {} workers, schedule '{}' in {})",
            current.queue.max_size, current.concurrency.global_limit, current.global_schedule, timezone
        );

        Ok(Self {
            service: Arc::new(AutomationService {
                settings,
                queue,
                immunity,
                pool,
                controller,
                triggers,
                scheduler,
                rules,
                lifecycle,
                overrides,
                directory: collaborators.directory,
                profiles: collaborators.profiles,
                changelog,
                timezone,
            }),
            trigger_rx: Mutex::new(Some(trigger_rx)),
        })
    }

    pub fn service(&self) -> Arc<AutomationService> {
        self.service.clone()
    }

    pub fn triggers(&self) -> TriggerHandle {
        self.service.triggers.clone()
    }

    pub fn queue(&self) -> Arc<CheckQueue> {
        self.service.queue.clone()
    }

    pub fn immunity(&self) -> Arc<ImmunityTracker> {
        self.service.immunity.clone()
    }

    pub fn pool(&self) -> Arc<WorkerPool> {
        self.service.pool.clone()
    }

    pub fn controller(&self) -> Arc<PipelineController> {
        self.service.controller.clone()
    }

    pub fn scheduler(&self) -> Arc<AutomationScheduler> {
        self.service.scheduler.clone()
    }

    pub fn lifecycle(&self) -> Arc<DeadStreamLifecycleManager> {
        self.service.lifecycle.clone()
    }

    pub fn rules(&self) -> Arc<EpgRuleService> {
        self.service.rules.clone()
    }

    /// Start only the controller loop. Useful when timing sources and
    /// workers are driven by hand.
    pub async fn spawn_controller(&self, cancellation_token: CancellationToken) -> Option<JoinHandle<()>> {
        let Some(rx) = self.trigger_rx.lock().await.take() else {
            warn!("Pipeline controller already started");
            return None;
        };
        let controller = self.service.controller.clone();
        Some(tokio::spawn(controller.run(rx, cancellation_token)))
    }

    /// Start the controller, worker pool and scheduler loops
    pub async fn spawn(&self, cancellation_token: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(3);
        if let Some(handle) = self.spawn_controller(cancellation_token.clone()).await {
            handles.push(handle);
        }

        let pool = self.service.pool.clone();
        let pool_token = cancellation_token.clone();
        handles.push(tokio::spawn(async move { pool.run(pool_token).await }));

        let scheduler = self.service.scheduler.clone();
        handles.push(tokio::spawn(async move { scheduler.run(cancellation_token).await }));

        info!("Automation engine started");
        handles
    }
}
