use sea_orm_migration::prelude::*;

use super::m20251001_000001_automation_schema::{ChangelogEntries, ScheduledEvents};

/// Lookup indexes for the scheduler and the changelog listing:
/// events by generating rule and by channel, changelog by creation time.
pub struct Migration;
folder_migration_name!();

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_scheduled_events_rule_id")
                    .table(ScheduledEvents::Table)
                    .col(ScheduledEvents::RuleId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_scheduled_events_channel_id")
                    .table(ScheduledEvents::Table)
                    .col(ScheduledEvents::ChannelId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_changelog_entries_created_at")
                    .table(ChangelogEntries::Table)
                    .col(ChangelogEntries::CreatedAt)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, table) in [
            ("idx_changelog_entries_created_at", ChangelogEntries::Table.into_iden()),
            ("idx_scheduled_events_channel_id", ScheduledEvents::Table.into_iden()),
            ("idx_scheduled_events_rule_id", ScheduledEvents::Table.into_iden()),
        ] {
            manager
                .drop_index(Index::drop().name(name).table(table).to_owned())
                .await?;
        }
        Ok(())
    }
}
