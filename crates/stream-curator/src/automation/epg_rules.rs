//! Auto-create rules and scheduled EPG events
//!
//! A rule matches a case-insensitive regex against program titles on its
//! channels and produces one scheduled event per matching program. Events a
//! rule generated carry its id, so regeneration and deletion touch exactly
//! those events; manual events have no rule id and are never pruned here.

use chrono::{DateTime, TimeDelta, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::AutomationError;
use crate::database::repositories::{AutoCreateRuleRepository, ScheduledEventRepository};
use crate::errors::{AppError, AppResult};
use crate::models::{
    AutoCreateRule, AutoCreateRuleRequest, ChannelId, CreateScheduledEventRequest, EpgProgram,
    MAX_MINUTES_BEFORE, RuleMatch, RuleTestRequest, ScheduledEvent,
};
use crate::platform::EpgProvider;

/// Result of regenerating every rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationReport {
    pub rules_processed: usize,
    pub events_created: usize,
    pub failed_rules: Vec<Uuid>,
}

fn invalid_rule<S: Into<String>>(message: S) -> AppError {
    AutomationError::InvalidRule {
        message: message.into(),
    }
    .into()
}

/// Compile a title pattern the way rules evaluate it
pub fn compile_pattern(pattern: &str) -> AppResult<Regex> {
    if pattern.trim().is_empty() {
        return Err(invalid_rule("regex pattern must not be empty"));
    }
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| invalid_rule(format!("invalid regex '{pattern}': {e}")))
}

fn validate_minutes_before(minutes_before: u32) -> AppResult<()> {
    if minutes_before > MAX_MINUTES_BEFORE {
        return Err(AppError::validation(format!(
            "minutes_before must be between 0 and {MAX_MINUTES_BEFORE}"
        )));
    }
    Ok(())
}

/// Validate a rule payload, returning its compiled pattern
pub fn validate_rule(request: &AutoCreateRuleRequest) -> AppResult<Regex> {
    if request.name.trim().is_empty() {
        return Err(invalid_rule("name must not be empty"));
    }
    if request.channel_ids.is_empty() {
        return Err(invalid_rule("at least one channel is required"));
    }
    validate_minutes_before(request.minutes_before)?;
    compile_pattern(&request.regex_pattern)
}

/// Programs in `programs` whose title matches and whose check time is after `now`
pub fn match_programs(
    pattern: &Regex,
    programs: &[EpgProgram],
    minutes_before: u32,
    now: DateTime<Utc>,
) -> Vec<RuleMatch> {
    let mut seen = HashSet::new();
    programs
        .iter()
        .filter(|p| pattern.is_match(&p.title))
        .filter_map(|p| {
            let check_time = ScheduledEvent::compute_check_time(p.start_time, minutes_before);
            (check_time > now && seen.insert((p.channel_id, p.start_time))).then(|| RuleMatch {
                channel_id: p.channel_id,
                program_title: p.title.clone(),
                program_start: p.start_time,
                program_end: p.end_time,
                check_time,
            })
        })
        .collect()
}

pub struct EpgRuleService {
    rules: AutoCreateRuleRepository,
    events: ScheduledEventRepository,
    epg: Arc<dyn EpgProvider>,
    lookahead: TimeDelta,
}

impl EpgRuleService {
    pub fn new(
        rules: AutoCreateRuleRepository,
        events: ScheduledEventRepository,
        epg: Arc<dyn EpgProvider>,
        lookahead: Duration,
    ) -> Self {
        Self {
            rules,
            events,
            epg,
            lookahead: TimeDelta::from_std(lookahead).unwrap_or(TimeDelta::hours(24)),
        }
    }

    pub async fn list_rules(&self) -> AppResult<Vec<AutoCreateRule>> {
        self.rules.list().await
    }

    pub async fn get_rule(&self, id: Uuid) -> AppResult<AutoCreateRule> {
        self.rules
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("auto_create_rule", id))
    }

    pub async fn create_rule(&self, request: AutoCreateRuleRequest) -> AppResult<AutoCreateRule> {
        validate_rule(&request)?;
        let now = Utc::now();
        let rule = AutoCreateRule {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            channel_ids: request.channel_ids,
            regex_pattern: request.regex_pattern,
            minutes_before: request.minutes_before,
            enabled: request.enabled,
            created_at: now,
            updated_at: now,
        };
        self.rules.insert(&rule).await?;
        info!("Created auto-create rule '{}' ({})", rule.name, rule.id);

        if let Err(e) = self.regenerate_rule(&rule, now).await {
            warn!("Initial event generation for rule {} failed: {}", rule.id, e);
        }
        Ok(rule)
    }

    pub async fn update_rule(&self, id: Uuid, request: AutoCreateRuleRequest) -> AppResult<AutoCreateRule> {
        validate_rule(&request)?;
        let existing = self.get_rule(id).await?;
        let now = Utc::now();
        let rule = AutoCreateRule {
            name: request.name.trim().to_string(),
            channel_ids: request.channel_ids,
            regex_pattern: request.regex_pattern,
            minutes_before: request.minutes_before,
            enabled: request.enabled,
            updated_at: now,
            ..existing
        };
        self.rules.update(&rule).await?;
        info!("Updated auto-create rule '{}' ({})", rule.name, rule.id);

        if let Err(e) = self.regenerate_rule(&rule, now).await {
            // Events of the old definition must not survive the edit
            warn!("Event regeneration for rule {} failed, removing its events: {}", rule.id, e);
            self.events.delete_by_rule(rule.id).await?;
        }
        Ok(rule)
    }

    /// Delete a rule together with the events it generated
    pub async fn delete_rule(&self, id: Uuid) -> AppResult<()> {
        let removed = self.events.delete_by_rule(id).await?;
        if !self.rules.delete(id).await? {
            return Err(AppError::not_found("auto_create_rule", id));
        }
        info!("Deleted auto-create rule {} and {} generated events", id, removed);
        Ok(())
    }

    /// Evaluate a pattern against current EPG data without writing anything
    pub async fn test_rule(&self, request: RuleTestRequest) -> AppResult<Vec<RuleMatch>> {
        if request.channel_ids.is_empty() {
            return Err(invalid_rule("at least one channel is required"));
        }
        validate_minutes_before(request.minutes_before)?;
        let pattern = compile_pattern(&request.regex_pattern)?;

        let now = Utc::now();
        let programs = self.fetch_programs(&request.channel_ids, now).await?;
        Ok(match_programs(&pattern, &programs, request.minutes_before, now))
    }

    /// Replace the events of one rule with its current matches.
    /// Programs are fetched before anything is deleted, so an unreachable
    /// EPG provider leaves the existing events in place.
    pub async fn regenerate_rule(&self, rule: &AutoCreateRule, now: DateTime<Utc>) -> AppResult<usize> {
        if !rule.enabled {
            let removed = self.events.delete_by_rule(rule.id).await?;
            debug!("Rule {} disabled, removed {} events", rule.id, removed);
            return Ok(0);
        }

        let pattern = compile_pattern(&rule.regex_pattern)?;
        let programs = self.fetch_programs(&rule.channel_ids, now).await?;
        let matches = match_programs(&pattern, &programs, rule.minutes_before, now);

        self.events.delete_by_rule(rule.id).await?;
        let events: Vec<ScheduledEvent> = matches
            .into_iter()
            .map(|m| ScheduledEvent {
                id: Uuid::new_v4(),
                channel_id: m.channel_id,
                program_title: m.program_title,
                program_start: m.program_start,
                program_end: m.program_end,
                minutes_before: rule.minutes_before,
                check_time: m.check_time,
                rule_id: Some(rule.id),
                created_at: now,
            })
            .collect();
        self.events.insert_many(&events).await?;

        debug!("Rule '{}' generated {} events", rule.name, events.len());
        Ok(events.len())
    }

    /// Regenerate every rule; a failing rule does not stop the others
    pub async fn regenerate_all(&self, now: DateTime<Utc>) -> AppResult<RegenerationReport> {
        let mut report = RegenerationReport::default();
        for rule in self.rules.list().await? {
            report.rules_processed += 1;
            match self.regenerate_rule(&rule, now).await {
                Ok(created) => report.events_created += created,
                Err(e) => {
                    warn!("Regenerating rule '{}' ({}) failed: {}", rule.name, rule.id, e);
                    report.failed_rules.push(rule.id);
                }
            }
        }
        info!(
            "Regenerated {} auto-create rules: {} events, {} failures",
            report.rules_processed,
            report.events_created,
            report.failed_rules.len()
        );
        Ok(report)
    }

    pub async fn list_events(&self) -> AppResult<Vec<ScheduledEvent>> {
        self.events.list().await
    }

    pub async fn create_event(&self, request: CreateScheduledEventRequest) -> AppResult<ScheduledEvent> {
        validate_minutes_before(request.minutes_before)?;
        if request.program_end <= request.program_start {
            return Err(AppError::validation("program_end must be after program_start"));
        }
        if request.program_title.trim().is_empty() {
            return Err(AppError::validation("program_title must not be empty"));
        }

        let event = ScheduledEvent {
            id: Uuid::new_v4(),
            channel_id: request.channel_id,
            program_title: request.program_title,
            program_start: request.program_start,
            program_end: request.program_end,
            minutes_before: request.minutes_before,
            check_time: ScheduledEvent::compute_check_time(request.program_start, request.minutes_before),
            rule_id: None,
            created_at: Utc::now(),
        };
        self.events.insert(&event).await?;
        info!(
            "Scheduled check of channel {} at {} for '{}'",
            event.channel_id, event.check_time, event.program_title
        );
        Ok(event)
    }

    pub async fn delete_event(&self, id: Uuid) -> AppResult<()> {
        if !self.events.delete(id).await? {
            return Err(AppError::not_found("scheduled_event", id));
        }
        Ok(())
    }

    /// Events whose check time has been reached
    pub async fn due_events(&self, now: DateTime<Utc>) -> AppResult<Vec<ScheduledEvent>> {
        self.events.due(now).await
    }

    pub async fn remove_events(&self, ids: &[Uuid]) -> AppResult<u64> {
        self.events.delete_many(ids).await
    }

    pub async fn next_check_time(&self) -> AppResult<Option<DateTime<Utc>>> {
        self.events.earliest_check_time().await
    }

    async fn fetch_programs(&self, channel_ids: &[ChannelId], now: DateTime<Utc>) -> AppResult<Vec<EpgProgram>> {
        let until = now + self.lookahead;
        let mut programs = Vec::new();
        for &channel_id in channel_ids {
            programs.extend(self.epg.programs(channel_id, now, until).await?);
        }
        Ok(programs)
    }
}
