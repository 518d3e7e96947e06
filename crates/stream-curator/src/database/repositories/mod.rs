//! SeaORM repository implementations for the automation tables

pub mod auto_create_rule;
pub mod changelog;
pub mod lifecycle_record;
pub mod overrides;
pub mod profile_snapshot;
pub mod scheduled_event;
pub mod settings;

pub use auto_create_rule::AutoCreateRuleRepository;
pub use changelog::ChangelogRepository;
pub use lifecycle_record::LifecycleRecordRepository;
pub use overrides::OverrideRepository;
pub use profile_snapshot::ProfileSnapshotRepository;
pub use scheduled_event::ScheduledEventRepository;
pub use settings::SettingsRepository;

#[cfg(test)]
pub(crate) mod test_support {
    use sea_orm::DatabaseConnection;
    use std::sync::Arc;

    use crate::database::Database;

    pub async fn connection() -> Arc<DatabaseConnection> {
        let db = Database::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.connection()
    }
}
