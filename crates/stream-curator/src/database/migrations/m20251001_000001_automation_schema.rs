use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_automation_settings_table(manager).await?;
        self.create_automation_overrides_table(manager).await?;
        self.create_auto_create_rules_table(manager).await?;
        self.create_scheduled_events_table(manager).await?;
        self.create_profile_snapshots_table(manager).await?;
        self.create_lifecycle_records_table(manager).await?;
        self.create_changelog_entries_table(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChangelogEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LifecycleRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProfileSnapshots::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ScheduledEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AutoCreateRules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AutomationOverrides::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AutomationSettings::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    fn create_id_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.uuid().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    fn create_nullable_uuid_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.uuid(),
            _ => col.string(),
        };
        col
    }

    fn create_timestamp_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.timestamp_with_time_zone().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    async fn create_automation_settings_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AutomationSettings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AutomationSettings::Key).string().not_null().primary_key())
                    .col(ColumnDef::new(AutomationSettings::ValueJson).text().not_null())
                    .col(self.create_timestamp_column(manager, AutomationSettings::UpdatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn create_automation_overrides_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AutomationOverrides::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AutomationOverrides::TargetType).string().not_null())
                    .col(ColumnDef::new(AutomationOverrides::TargetId).big_integer().not_null())
                    .col(ColumnDef::new(AutomationOverrides::MatchingMode).string())
                    .col(ColumnDef::new(AutomationOverrides::CheckingMode).string())
                    .col(self.create_timestamp_column(manager, AutomationOverrides::UpdatedAt))
                    .primary_key(
                        Index::create()
                            .col(AutomationOverrides::TargetType)
                            .col(AutomationOverrides::TargetId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_auto_create_rules_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AutoCreateRules::Table)
                    .if_not_exists()
                    .col(self.create_id_column(manager, AutoCreateRules::Id).primary_key())
                    .col(ColumnDef::new(AutoCreateRules::Name).string().not_null())
                    .col(ColumnDef::new(AutoCreateRules::ChannelIdsJson).text().not_null())
                    .col(ColumnDef::new(AutoCreateRules::RegexPattern).text().not_null())
                    .col(ColumnDef::new(AutoCreateRules::MinutesBefore).integer().not_null().default(0))
                    .col(ColumnDef::new(AutoCreateRules::Enabled).boolean().not_null().default(true))
                    .col(self.create_timestamp_column(manager, AutoCreateRules::CreatedAt))
                    .col(self.create_timestamp_column(manager, AutoCreateRules::UpdatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn create_scheduled_events_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScheduledEvents::Table)
                    .if_not_exists()
                    .col(self.create_id_column(manager, ScheduledEvents::Id).primary_key())
                    .col(ColumnDef::new(ScheduledEvents::ChannelId).big_integer().not_null())
                    .col(ColumnDef::new(ScheduledEvents::ProgramTitle).string().not_null())
                    .col(self.create_timestamp_column(manager, ScheduledEvents::ProgramStart))
                    .col(self.create_timestamp_column(manager, ScheduledEvents::ProgramEnd))
                    .col(ColumnDef::new(ScheduledEvents::MinutesBefore).integer().not_null().default(0))
                    .col(self.create_timestamp_column(manager, ScheduledEvents::CheckTime))
                    .col(self.create_nullable_uuid_column(manager, ScheduledEvents::RuleId))
                    .col(self.create_timestamp_column(manager, ScheduledEvents::CreatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn create_profile_snapshots_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProfileSnapshots::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ProfileSnapshots::ProfileId).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(ProfileSnapshots::ProfileName).string().not_null())
                    .col(self.create_timestamp_column(manager, ProfileSnapshots::CapturedAt))
                    .col(ColumnDef::new(ProfileSnapshots::ChannelStatesJson).text().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn create_lifecycle_records_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LifecycleRecords::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(LifecycleRecords::ProfileId).big_integer().not_null())
                    .col(ColumnDef::new(LifecycleRecords::ChannelId).big_integer().not_null())
                    .col(ColumnDef::new(LifecycleRecords::PriorEnabled).boolean().not_null())
                    .col(ColumnDef::new(LifecycleRecords::Reason).string().not_null())
                    .col(self.create_timestamp_column(manager, LifecycleRecords::DisabledAt))
                    .primary_key(
                        Index::create()
                            .col(LifecycleRecords::ProfileId)
                            .col(LifecycleRecords::ChannelId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_changelog_entries_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChangelogEntries::Table)
                    .if_not_exists()
                    .col(self.create_id_column(manager, ChangelogEntries::Id).primary_key())
                    .col(ColumnDef::new(ChangelogEntries::Action).string().not_null())
                    .col(ColumnDef::new(ChangelogEntries::Summary).text().not_null())
                    .col(ColumnDef::new(ChangelogEntries::DetailsJson).text().not_null())
                    .col(self.create_timestamp_column(manager, ChangelogEntries::CreatedAt))
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
pub enum AutomationSettings {
    Table,
    Key,
    ValueJson,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum AutomationOverrides {
    Table,
    TargetType,
    TargetId,
    MatchingMode,
    CheckingMode,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum AutoCreateRules {
    Table,
    Id,
    Name,
    ChannelIdsJson,
    RegexPattern,
    MinutesBefore,
    Enabled,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum ScheduledEvents {
    Table,
    Id,
    ChannelId,
    ProgramTitle,
    ProgramStart,
    ProgramEnd,
    MinutesBefore,
    CheckTime,
    RuleId,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum ProfileSnapshots {
    Table,
    ProfileId,
    ProfileName,
    CapturedAt,
    ChannelStatesJson,
}

#[derive(DeriveIden)]
pub enum LifecycleRecords {
    Table,
    ProfileId,
    ChannelId,
    PriorEnabled,
    Reason,
    DisabledAt,
}

#[derive(DeriveIden)]
pub enum ChangelogEntries {
    Table,
    Id,
    Action,
    Summary,
    DetailsJson,
    CreatedAt,
}
