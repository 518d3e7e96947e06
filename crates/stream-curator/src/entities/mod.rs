//! SeaORM entity definitions

pub mod prelude;

pub mod auto_create_rules;
pub mod automation_overrides;
pub mod automation_settings;
pub mod changelog_entries;
pub mod lifecycle_records;
pub mod profile_snapshots;
pub mod scheduled_events;
