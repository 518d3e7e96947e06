//! Scheduled EPG check events

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{prelude::ScheduledEvents, scheduled_events};
use crate::errors::AppResult;
use crate::models::ScheduledEvent;

fn model_to_domain(model: scheduled_events::Model) -> ScheduledEvent {
    ScheduledEvent {
        id: model.id,
        channel_id: model.channel_id,
        program_title: model.program_title,
        program_start: model.program_start,
        program_end: model.program_end,
        minutes_before: u32::try_from(model.minutes_before).unwrap_or_default(),
        check_time: model.check_time,
        rule_id: model.rule_id,
        created_at: model.created_at,
    }
}

fn to_active_model(event: &ScheduledEvent) -> scheduled_events::ActiveModel {
    scheduled_events::ActiveModel {
        id: Set(event.id),
        channel_id: Set(event.channel_id),
        program_title: Set(event.program_title.clone()),
        program_start: Set(event.program_start),
        program_end: Set(event.program_end),
        minutes_before: Set(event.minutes_before as i32),
        check_time: Set(event.check_time),
        rule_id: Set(event.rule_id),
        created_at: Set(event.created_at),
    }
}

#[derive(Clone)]
pub struct ScheduledEventRepository {
    connection: Arc<DatabaseConnection>,
}

impl ScheduledEventRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// All events ordered by check time
    pub async fn list(&self) -> AppResult<Vec<ScheduledEvent>> {
        let models = ScheduledEvents::find()
            .order_by_asc(scheduled_events::Column::CheckTime)
            .all(&*self.connection)
            .await?;
        let mut events: Vec<ScheduledEvent> = models.into_iter().map(model_to_domain).collect();
        // Stored timestamps are text on SQLite; sort on the parsed values
        events.sort_by_key(|e| e.check_time);
        Ok(events)
    }

    pub async fn list_by_rule(&self, rule_id: Uuid) -> AppResult<Vec<ScheduledEvent>> {
        let models = ScheduledEvents::find()
            .filter(scheduled_events::Column::RuleId.eq(rule_id))
            .all(&*self.connection)
            .await?;
        Ok(models.into_iter().map(model_to_domain).collect())
    }

    pub async fn insert(&self, event: &ScheduledEvent) -> AppResult<()> {
        to_active_model(event).insert(&*self.connection).await?;
        Ok(())
    }

    pub async fn insert_many(&self, events: &[ScheduledEvent]) -> AppResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        ScheduledEvents::insert_many(events.iter().map(to_active_model))
            .exec_without_returning(&*self.connection)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let result = ScheduledEvents::delete_by_id(id).exec(&*self.connection).await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn delete_many(&self, ids: &[Uuid]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = ScheduledEvents::delete_many()
            .filter(scheduled_events::Column::Id.is_in(ids.iter().copied()))
            .exec(&*self.connection)
            .await?;
        Ok(result.rows_affected)
    }

    /// Delete the events a rule generated; manual events have no rule id
    pub async fn delete_by_rule(&self, rule_id: Uuid) -> AppResult<u64> {
        let result = ScheduledEvents::delete_many()
            .filter(scheduled_events::Column::RuleId.eq(rule_id))
            .exec(&*self.connection)
            .await?;
        Ok(result.rows_affected)
    }

    /// Events whose check time is at or before `now`
    pub async fn due(&self, now: DateTime<Utc>) -> AppResult<Vec<ScheduledEvent>> {
        Ok(self.list().await?.into_iter().filter(|e| e.is_due(now)).collect())
    }

    pub async fn earliest_check_time(&self) -> AppResult<Option<DateTime<Utc>>> {
        Ok(self.list().await?.first().map(|e| e.check_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::test_support;
    use chrono::{Duration, TimeZone};

    fn event(channel_id: i64, rule_id: Option<Uuid>, start_hour: u32) -> ScheduledEvent {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, start_hour, 0, 0).unwrap();
        ScheduledEvent {
            id: Uuid::new_v4(),
            channel_id,
            program_title: "Match".to_string(),
            program_start: start,
            program_end: start + Duration::hours(2),
            minutes_before: 5,
            check_time: ScheduledEvent::compute_check_time(start, 5),
            rule_id,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_delete_by_rule_spares_manual_events() {
        let repo = ScheduledEventRepository::new(test_support::connection().await);
        let rule_id = Uuid::new_v4();
        let manual = event(1, None, 20);
        repo.insert(&manual).await.unwrap();
        repo.insert_many(&[event(1, Some(rule_id), 18), event(2, Some(rule_id), 19)])
            .await
            .unwrap();

        assert_eq!(repo.list_by_rule(rule_id).await.unwrap().len(), 2);
        assert_eq!(repo.delete_by_rule(rule_id).await.unwrap(), 2);

        let remaining = repo.list().await.unwrap();
        assert_eq!(remaining, vec![manual]);
    }

    #[tokio::test]
    async fn test_due_and_earliest() {
        let repo = ScheduledEventRepository::new(test_support::connection().await);
        let early = event(1, None, 10);
        let late = event(2, None, 22);
        repo.insert(&late).await.unwrap();
        repo.insert(&early).await.unwrap();

        assert_eq!(repo.earliest_check_time().await.unwrap(), Some(early.check_time));
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let due = repo.due(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, early.id);
    }
}
