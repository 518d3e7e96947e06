//! Automation scheduler
//!
//! Produces triggers for the pipeline controller from four timing sources:
//! the cron-based global sweep, the periodic automatic cycle, due EPG events
//! and the EPG refresh that regenerates auto-create rules. Everything is
//! evaluated in `tick`, so tests can drive the scheduler with explicit times.

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::controller::TriggerHandle;
use super::epg_rules::EpgRuleService;
use super::settings::AutomationSettingsStore;
use super::types::TriggerRequest;
use crate::errors::AppResult;
use crate::models::ChannelId;
use crate::utils::cron_helper;

/// Longest the scheduler sleeps between evaluations, in seconds
const MAX_SLEEP_SECS: i64 = 60;

/// What one evaluation produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerTickReport {
    pub global_sweep: bool,
    pub playlist_cycle: bool,
    pub rules_regenerated: bool,
    pub event_channels: Vec<ChannelId>,
    pub events_expired: usize,
}

#[derive(Debug)]
struct SchedulerState {
    last_evaluated: DateTime<Utc>,
    next_cycle: DateTime<Utc>,
    next_epg_refresh: DateTime<Utc>,
}

pub struct AutomationScheduler {
    settings: Arc<AutomationSettingsStore>,
    rules: Arc<EpgRuleService>,
    triggers: TriggerHandle,
    timezone: Tz,
    automation_interval: TimeDelta,
    epg_refresh_interval: TimeDelta,
    state: Mutex<SchedulerState>,
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::seconds(MAX_SLEEP_SECS))
}

impl AutomationScheduler {
    /// Create a scheduler whose evaluation window starts at `started_at`.
    /// The first automatic cycle runs one interval later; rules are
    /// regenerated on the first tick.
    pub fn new(
        settings: Arc<AutomationSettingsStore>,
        rules: Arc<EpgRuleService>,
        triggers: TriggerHandle,
        timezone: Tz,
        automation_interval: Duration,
        epg_refresh_interval: Duration,
        started_at: DateTime<Utc>,
    ) -> Self {
        let automation_interval = to_delta(automation_interval);
        Self {
            settings,
            rules,
            triggers,
            timezone,
            automation_interval,
            epg_refresh_interval: to_delta(epg_refresh_interval),
            state: Mutex::new(SchedulerState {
                last_evaluated: started_at,
                next_cycle: started_at + automation_interval,
                next_epg_refresh: started_at,
            }),
        }
    }

    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!("Starting automation scheduler (timezone: {})", self.timezone);

        loop {
            let now = Utc::now();
            if let Err(e) = self.tick(now).await {
                error!("Scheduler evaluation failed: {}", e);
            }

            let wake = self.next_wake(Utc::now()).await;
            let sleep_for = (wake - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            debug!("Scheduler sleeping {:?} until {}", sleep_for, wake);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = cancellation_token.cancelled() => {
                    info!("Automation scheduler received cancellation signal");
                    break;
                }
            }
        }

        info!("Automation scheduler stopped");
    }

    /// Evaluate every timing source at `now`. The state lock only covers
    /// the timing decisions; triggers and rule regeneration run after it is
    /// released.
    pub async fn tick(&self, now: DateTime<Utc>) -> AppResult<SchedulerTickReport> {
        let mut report = SchedulerTickReport::default();
        let settings = self.settings.snapshot().await;

        let (sweep_due, cycle_due, refresh_due) = {
            let mut state = self.state.lock().await;

            let mut sweep_due = false;
            if settings.toggles.scheduled_global_action {
                match cron_helper::parse_schedule(&settings.global_schedule) {
                    Ok(schedule) => {
                        sweep_due = cron_helper::fires_between(&schedule, state.last_evaluated, now, self.timezone);
                    }
                    Err(e) => warn!("Ignoring invalid global schedule: {}", e),
                }
            }
            state.last_evaluated = now;

            let cycle_due = now >= state.next_cycle;
            if cycle_due {
                state.next_cycle = now + self.automation_interval;
            }

            let refresh_due = now >= state.next_epg_refresh;
            if refresh_due {
                state.next_epg_refresh = now + self.epg_refresh_interval;
            }
            (sweep_due, cycle_due, refresh_due)
        };

        if sweep_due {
            info!("Global sweep schedule '{}' fired", settings.global_schedule);
            self.triggers.send(TriggerRequest::global_sweep()).await?;
            report.global_sweep = true;
        }

        if cycle_due && settings.toggles.has_automatic_stage() {
            debug!("Automatic cycle due");
            self.triggers.send(TriggerRequest::playlist_update()).await?;
            report.playlist_cycle = true;
        }

        if refresh_due {
            match self.rules.regenerate_all(now).await {
                Ok(_) => report.rules_regenerated = true,
                Err(e) => warn!("EPG rule regeneration failed, retrying next refresh: {}", e),
            }
        }

        self.fire_due_events(now, &mut report).await?;
        Ok(report)
    }

    async fn fire_due_events(&self, now: DateTime<Utc>, report: &mut SchedulerTickReport) -> AppResult<()> {
        let due = self.rules.due_events(now).await?;
        if due.is_empty() {
            return Ok(());
        }

        let (expired, live): (Vec<_>, Vec<_>) = due.into_iter().partition(|e| e.is_expired(now));
        if !expired.is_empty() {
            let ids: Vec<Uuid> = expired.iter().map(|e| e.id).collect();
            self.rules.remove_events(&ids).await?;
            debug!("Discarded {} expired scheduled events", ids.len());
            report.events_expired = ids.len();
        }

        // Coinciding events of one channel collapse into a single trigger
        let channels: BTreeSet<ChannelId> = live.iter().map(|e| e.channel_id).collect();
        for &channel_id in &channels {
            info!("Scheduled EPG check for channel {} is due", channel_id);
            self.triggers.send(TriggerRequest::epg_event(channel_id)).await?;
        }

        let fired: Vec<Uuid> = live.iter().map(|e| e.id).collect();
        self.rules.remove_events(&fired).await?;
        report.event_channels = channels.into_iter().collect();
        Ok(())
    }

    /// Earliest instant any timing source needs attention, at most a minute away
    pub async fn next_wake(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut wake = now + TimeDelta::seconds(MAX_SLEEP_SECS);
        {
            let state = self.state.lock().await;
            wake = wake.min(state.next_cycle).min(state.next_epg_refresh);
        }
        if let Some(sweep) = self.next_global_sweep().await {
            wake = wake.min(sweep);
        }
        match self.rules.next_check_time().await {
            Ok(Some(check_time)) => wake = wake.min(check_time),
            Ok(None) => {}
            Err(e) => debug!("Could not read next scheduled event: {}", e),
        }
        wake.max(now)
    }

    /// Next global sweep, when scheduled sweeps are enabled
    pub async fn next_global_sweep(&self) -> Option<DateTime<Utc>> {
        let settings = self.settings.snapshot().await;
        if !settings.toggles.scheduled_global_action {
            return None;
        }
        let schedule = cron_helper::parse_schedule(&settings.global_schedule).ok()?;
        let last = self.state.lock().await.last_evaluated;
        cron_helper::next_fire_after(&schedule, last, self.timezone)
    }
}
