pub use super::auto_create_rules::Entity as AutoCreateRules;
pub use super::automation_overrides::Entity as AutomationOverrides;
pub use super::automation_settings::Entity as AutomationSettings;
pub use super::changelog_entries::Entity as ChangelogEntries;
pub use super::lifecycle_records::Entity as LifecycleRecords;
pub use super::profile_snapshots::Entity as ProfileSnapshots;
pub use super::scheduled_events::Entity as ScheduledEvents;
